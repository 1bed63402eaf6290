// Copyright 2020 Joyent, Inc.

//! The RPC service endpoint: method dispatch, argument extraction, and
//! response/fault shaping for the calculateFactorial method.

use std::io::{Error, ErrorKind};

use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use slog::{debug, Logger};

use crate::engine::{self, Fault};
use crate::protocol::{Message, MessageData};

pub const METHOD_CALCULATE_FACTORIAL: &str = "calculateFactorial";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FactorialRequest {
    pub number: Value,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FactorialResponse {
    pub result: u64,
}

/// A configured factorial service instance. The service holds no state; each
/// request is handled independently.
#[derive(Clone, Copy, Debug, Default)]
pub struct FactorialService;

impl FactorialService {
    pub fn new() -> FactorialService {
        FactorialService
    }

    /// Handle one decoded request message, producing the response messages
    /// for the connection task to send. Faults become error messages on the
    /// wire; only an unsupported method is a connection-level error.
    pub fn handle(
        &self,
        msg: &Message,
        log: &Logger,
    ) -> Result<Vec<Message>, Error> {
        match msg.data.m.name.as_str() {
            METHOD_CALCULATE_FACTORIAL => self.calculate_factorial(msg, log),
            name => Err(Error::new(
                ErrorKind::Other,
                format!("unsupported method: {}", name),
            )),
        }
    }

    fn calculate_factorial(
        &self,
        msg: &Message,
        log: &Logger,
    ) -> Result<Vec<Message>, Error> {
        debug!(log, "handling calculateFactorial request";
               "msg_id" => msg.id);

        let outcome = parse_request(&msg.data.d)
            .and_then(|req| engine::validate_arg(&req.number))
            .and_then(engine::factorial);

        match outcome {
            Ok(result) => {
                let payload =
                    serde_json::to_value(vec![FactorialResponse { result }])
                        .map_err(|e| Error::new(ErrorKind::Other, e))?;
                let data = MessageData::new(
                    msg.data.m.name.clone(),
                    payload,
                );
                Ok(vec![Message::data(msg.id, data)])
            }
            Err(fault) => {
                debug!(log, "calculateFactorial request faulted";
                       "msg_id" => msg.id, "fault" => %fault);
                let payload = serde_json::to_value(&fault)
                    .map_err(|e| Error::new(ErrorKind::Other, e))?;
                let data = MessageData::new(
                    msg.data.m.name.clone(),
                    payload,
                );
                Ok(vec![Message::error(msg.id, data)])
            }
        }
    }
}

fn parse_request(args: &Value) -> Result<FactorialRequest, Fault> {
    let mut requests: Vec<FactorialRequest> =
        serde_json::from_value(args.clone()).map_err(|_| {
            Fault::invalid_argument(String::from(
                "expected a JSON array containing one factorial request",
            ))
        })?;
    if requests.len() != 1 {
        return Err(Fault::invalid_argument(format!(
            "expected exactly one factorial request, got {}",
            requests.len()
        )));
    }
    Ok(requests.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use slog::o;

    use crate::engine::FaultName;
    use crate::protocol::MessageStatus;

    fn test_log() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn request(args: Value) -> Message {
        Message::data(
            7,
            MessageData::new(METHOD_CALCULATE_FACTORIAL.to_string(), args),
        )
    }

    fn handle(args: Value) -> Vec<Message> {
        FactorialService::new()
            .handle(&request(args), &test_log())
            .expect("handler failed")
    }

    fn response_result(msg: &Message) -> u64 {
        let payloads: Vec<FactorialResponse> =
            serde_json::from_value(msg.data.d.clone()).unwrap();
        assert_eq!(payloads.len(), 1);
        payloads[0].result
    }

    fn response_fault(msg: &Message) -> Fault {
        assert_eq!(msg.status, MessageStatus::Error);
        serde_json::from_value(msg.data.d.clone()).unwrap()
    }

    #[test]
    fn computes_factorial() {
        let responses = handle(json!([{ "number": 5 }]));
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, MessageStatus::Data);
        assert_eq!(responses[0].id, 7);
        assert_eq!(response_result(&responses[0]), 120);
    }

    #[test]
    fn zero_and_one_yield_one() {
        assert_eq!(response_result(&handle(json!([{ "number": 0 }]))[0]), 1);
        assert_eq!(response_result(&handle(json!([{ "number": 1 }]))[0]), 1);
    }

    #[test]
    fn negative_number_is_a_fault() {
        let responses = handle(json!([{ "number": -3 }]));
        assert_eq!(responses.len(), 1);
        let fault = response_fault(&responses[0]);
        assert_eq!(fault.name, FaultName::InvalidArgument);
        assert!(fault.message.contains("-3"));
    }

    #[test]
    fn overflowing_number_is_a_fault() {
        let responses = handle(json!([{ "number": 21 }]));
        let fault = response_fault(&responses[0]);
        assert_eq!(fault.name, FaultName::OutOfRange);
    }

    #[test]
    fn missing_number_field_is_a_fault() {
        let responses = handle(json!([{}]));
        let fault = response_fault(&responses[0]);
        assert_eq!(fault.name, FaultName::InvalidArgument);
    }

    #[test]
    fn malformed_argument_shape_is_a_fault() {
        let responses = handle(json!({ "number": 5 }));
        let fault = response_fault(&responses[0]);
        assert_eq!(fault.name, FaultName::InvalidArgument);
    }

    #[test]
    fn unsupported_method_is_an_error() {
        let msg = Message::data(
            1,
            MessageData::new(String::from("date"), json!([])),
        );
        let result = FactorialService::new().handle(&msg, &test_log());
        assert!(result.is_err());
    }
}
