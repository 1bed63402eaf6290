// Copyright 2020 Joyent, Inc.

//! factorial-rpc: a small request/response calculation service exposed over
//! a streaming JSON RPC protocol on TCP.
//!
//! The service exposes a single method, `calculateFactorial`, whose argument
//! is a JSON array containing one request object with a `number` field and
//! whose response payload is a JSON array containing one object with a
//! `result` field. Invalid input is reported as a structured fault
//! (`InvalidArgument` for negative or non-integral numbers, `OutOfRange` when
//! the result would not fit a 64-bit unsigned integer) carried on the
//! protocol's error channel; the connection remains usable afterwards.
//!
//! Protocol definition
//!
//! Messages have the following structure:
//!
//! * VERSION   1-byte integer.  The only supported value is "1".
//!
//! * TYPE      1-byte integer.  The only supported value is TYPE_JSON (0x1),
//!           indicating that the data payload is an encoded JSON object.
//!
//! * STATUS    1-byte integer.  The only supported values are:
//!
//!     * STATUS_DATA  0x1  indicates a "data" message
//!
//!     * STATUS_END   0x2  indicates an "end" message
//!
//!     * STATUS_ERROR 0x3  indicates an "error" message
//!
//! * MSGID1...MSGID4    4-byte big-endian unsigned integer, a unique identifier
//!                    for this message
//!
//! * CRC1...CRC4        4-byte big-endian unsigned integer representing the CRC16
//!                     value of the data payload
//!
//! * DLEN0...DLEN4      4-byte big-endian unsigned integer representing the number
//!                    of bytes of data payload that follow
//!
//! * DATA0...DATAN      Data payload.  This is a JSON-encoded object (for TYPE =
//!                    TYPE_JSON).  The encoding length in bytes is given by the
//!                    DLEN0...DLEN4 bytes.
//!
//! Message IDs: each message has a message id, which is scoped to the
//! connection.  These are allocated sequentially from a circular 31-bit space.
//!
//! A request is a single data message; the server replies with zero or more
//! data messages sharing the request's message id, terminated by an end
//! message, or with a single error message whose payload describes the fault.

#![allow(missing_docs)]

pub mod client;
pub mod endpoint;
pub mod engine;
pub mod protocol;
pub mod server;
