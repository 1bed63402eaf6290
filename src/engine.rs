// Copyright 2020 Joyent, Inc.

//! The calculation engine: a pure factorial function with explicit fault
//! reporting for invalid or out-of-range input. The engine holds no state
//! and performs no I/O; concurrent invocations never interact.

use std::fmt;

use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

/// The largest n for which n! is representable as a u64.
pub const MAX_FACTORIAL_INPUT: u64 = 20;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FaultName {
    InvalidArgument,
    OutOfRange,
}

/// A structured failure value, distinct from a successful result. Faults are
/// serialized as-is onto the protocol's error channel.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Fault {
    pub name: FaultName,
    pub message: String,
}

impl Fault {
    pub fn invalid_argument(message: String) -> Fault {
        Fault {
            name: FaultName::InvalidArgument,
            message,
        }
    }

    pub fn out_of_range(message: String) -> Fault {
        Fault {
            name: FaultName::OutOfRange,
            message,
        }
    }
}

impl fmt::Display for FaultName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultName::InvalidArgument => write!(f, "InvalidArgument"),
            FaultName::OutOfRange => write!(f, "OutOfRange"),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Validate an RPC-supplied argument as a non-negative integer. Negative,
/// fractional, and non-numeric values are all InvalidArgument faults naming
/// the offending value.
pub fn validate_arg(arg: &Value) -> Result<u64, Fault> {
    arg.as_u64().ok_or_else(|| {
        Fault::invalid_argument(format!(
            "factorial requires a non-negative integer, got {}",
            arg
        ))
    })
}

/// Compute n! iteratively. Inputs larger than [`MAX_FACTORIAL_INPUT`] would
/// overflow the u64 result and report an OutOfRange fault instead.
pub fn factorial(n: u64) -> Result<u64, Fault> {
    if n > MAX_FACTORIAL_INPUT {
        return Err(Fault::out_of_range(format!(
            "factorial of {} exceeds the 64-bit result range (largest \
             supported input: {})",
            n, MAX_FACTORIAL_INPUT
        )));
    }

    let mut result: u64 = 1;
    for i in 2..=n {
        result *= i;
    }
    Ok(result)
}
