// Copyright 2020 Joyent, Inc.

use std::io::{Error, ErrorKind};
use std::str;

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use chrono::Utc;
use crc16::{State, ARC};
use num::FromPrimitive as _;
use num::ToPrimitive as _;
use num_derive::{FromPrimitive, ToPrimitive};
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

/*
 * Message ids are scoped to a connection and allocated sequentially from a
 * circular 31-bit space.
 */
const MSGID_MAX: u32 = i32::max_value() as u32;

const OFF_VERSION: usize = 0x0;
const OFF_TYPE: usize = 0x1;
const OFF_STATUS: usize = 0x2;
const OFF_MSGID: usize = 0x3;
const OFF_CRC: usize = 0x7;
const OFF_DATALEN: usize = 0xb;
const OFF_DATA: usize = 0xf;

const HEADER_SZ: usize = OFF_DATA;

const VERSION_1: u8 = 0x1;
const VERSION_CURRENT: u8 = VERSION_1;

#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq, ToPrimitive)]
pub enum MessageType {
    Json = 1,
}

#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq, ToPrimitive)]
pub enum MessageStatus {
    Data = 1,
    End = 2,
    Error = 3,
}

struct MessageHeader {
    msg_type: MessageType,
    status: MessageStatus,
    id: u32,
    crc: u32,
    data_len: usize,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MessageMetaData {
    pub uts: u64,
    pub name: String,
}

impl MessageMetaData {
    pub fn new(name: String) -> MessageMetaData {
        let now = Utc::now();
        let uts = now.timestamp() as u64 * 1_000_000
            + u64::from(now.timestamp_subsec_micros());
        MessageMetaData { uts, name }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MessageData {
    pub m: MessageMetaData,
    pub d: Value,
}

impl MessageData {
    pub fn new(name: String, d: Value) -> MessageData {
        MessageData {
            m: MessageMetaData::new(name),
            d,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub msg_type: MessageType,
    pub status: MessageStatus,
    pub id: u32,
    pub data: MessageData,
}

/// Allocator for per-connection message ids.
pub struct MessageId(u32);

impl MessageId {
    pub fn new() -> MessageId {
        MessageId(0)
    }
}

impl Default for MessageId {
    fn default() -> MessageId {
        MessageId::new()
    }
}

impl Iterator for MessageId {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let id = self.0;
        self.0 = if self.0 == MSGID_MAX { 0 } else { self.0 + 1 };
        Some(id)
    }
}

#[derive(Debug)]
pub enum ParseError {
    /// The buffer does not yet hold a complete message; the payload is the
    /// minimum number of additional bytes required.
    NotEnoughBytes(usize),
    IoError(Error),
}

impl Message {
    /// Parse one message from the front of `buf`, returning the message and
    /// the number of bytes it occupied.
    pub fn parse(buf: &[u8]) -> Result<(Message, usize), ParseError> {
        if buf.len() < HEADER_SZ {
            return Err(ParseError::NotEnoughBytes(HEADER_SZ - buf.len()));
        }

        let header = Message::parse_header(buf).map_err(ParseError::IoError)?;
        let frame_sz = HEADER_SZ + header.data_len;
        if buf.len() < frame_sz {
            return Err(ParseError::NotEnoughBytes(frame_sz - buf.len()));
        }

        let raw_data = &buf[OFF_DATA..frame_sz];
        Message::validate_crc(raw_data, header.crc)
            .map_err(ParseError::IoError)?;
        let data = Message::parse_data(raw_data).map_err(ParseError::IoError)?;

        Ok((
            Message {
                msg_type: header.msg_type,
                status: header.status,
                id: header.id,
                data,
            },
            frame_sz,
        ))
    }

    fn parse_header(buf: &[u8]) -> Result<MessageHeader, Error> {
        if buf[OFF_VERSION] != VERSION_CURRENT {
            let msg = format!(
                "unsupported protocol version: {}",
                buf[OFF_VERSION]
            );
            return Err(Error::new(ErrorKind::Other, msg));
        }
        let msg_type =
            MessageType::from_u8(buf[OFF_TYPE]).ok_or_else(|| {
                Error::new(ErrorKind::Other, "failed to parse message type")
            })?;
        let status =
            MessageStatus::from_u8(buf[OFF_STATUS]).ok_or_else(|| {
                Error::new(ErrorKind::Other, "failed to parse message status")
            })?;
        let id = BigEndian::read_u32(&buf[OFF_MSGID..OFF_MSGID + 4]);
        let crc = BigEndian::read_u32(&buf[OFF_CRC..OFF_CRC + 4]);
        let data_len =
            BigEndian::read_u32(&buf[OFF_DATALEN..OFF_DATALEN + 4]) as usize;

        Ok(MessageHeader {
            msg_type,
            status,
            id,
            crc,
            data_len,
        })
    }

    fn validate_crc(data_buf: &[u8], crc: u32) -> Result<(), Error> {
        let calculated = u32::from(State::<ARC>::calculate(data_buf));
        if crc != calculated {
            let msg = "calculated CRC does not match the provided CRC";
            Err(Error::new(ErrorKind::Other, msg))
        } else {
            Ok(())
        }
    }

    fn parse_data(data_buf: &[u8]) -> Result<MessageData, Error> {
        let data_str = str::from_utf8(data_buf).map_err(|_| {
            Error::new(
                ErrorKind::Other,
                "failed to parse data payload as UTF-8",
            )
        })?;
        serde_json::from_str(data_str).map_err(|_| {
            Error::new(ErrorKind::Other, "failed to parse data payload as JSON")
        })
    }

    pub fn data(msg_id: u32, data: MessageData) -> Message {
        Message {
            msg_type: MessageType::Json,
            status: MessageStatus::Data,
            id: msg_id,
            data,
        }
    }

    pub fn error(msg_id: u32, data: MessageData) -> Message {
        Message {
            msg_type: MessageType::Json,
            status: MessageStatus::Error,
            id: msg_id,
            data,
        }
    }

    pub fn end(msg_id: u32) -> Message {
        Message {
            msg_type: MessageType::Json,
            status: MessageStatus::End,
            id: msg_id,
            data: MessageData::new(
                String::from("end"),
                Value::Array(vec![]),
            ),
        }
    }
}

pub fn encode_msg(msg: &Message, buf: &mut BytesMut) -> Result<(), String> {
    let msg_type_u8 = msg
        .msg_type
        .to_u8()
        .ok_or_else(|| String::from("invalid message type"))?;
    let status_u8 = msg
        .status
        .to_u8()
        .ok_or_else(|| String::from("invalid message status"))?;
    let data_str = serde_json::to_string(&msg.data)
        .map_err(|e| format!("failed to encode data payload as JSON: {}", e))?;
    let data_len = data_str.len();

    buf.reserve(HEADER_SZ + data_len);
    buf.put_u8(VERSION_CURRENT);
    buf.put_u8(msg_type_u8);
    buf.put_u8(status_u8);
    buf.put_u32(msg.id);
    buf.put_u32(u32::from(State::<ARC>::calculate(data_str.as_bytes())));
    buf.put_u32(data_len as u32);
    buf.put_slice(data_str.as_bytes());
    Ok(())
}

/// Codec carrying batches of messages over a framed TCP stream.
pub struct RpcCodec;

impl Decoder for RpcCodec {
    type Item = Vec<Message>;
    type Error = Error;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<Vec<Message>>, Error> {
        let mut msgs = Vec::new();

        loop {
            if buf.is_empty() {
                break;
            }
            match Message::parse(&buf[..]) {
                Ok((msg, consumed)) => {
                    let _ = buf.split_to(consumed);
                    msgs.push(msg);
                }
                // Partial frame: wait for more bytes.
                Err(ParseError::NotEnoughBytes(_)) => break,
                Err(ParseError::IoError(e)) => return Err(e),
            }
        }

        if msgs.is_empty() {
            Ok(None)
        } else {
            Ok(Some(msgs))
        }
    }
}

impl Encoder for RpcCodec {
    type Item = Vec<Message>;
    type Error = Error;

    fn encode(
        &mut self,
        item: Vec<Message>,
        buf: &mut BytesMut,
    ) -> Result<(), Error> {
        item.iter().try_for_each(|msg| {
            encode_msg(msg, buf).map_err(|e| Error::new(ErrorKind::Other, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use quickcheck::{quickcheck, TestResult};
    use rand::Rng;
    use serde_json::json;

    fn encode_one(msg: &Message) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_msg(msg, &mut buf).expect("failed to encode message");
        buf
    }

    fn request_msg(id: u32) -> Message {
        let data = MessageData::new(
            String::from("calculateFactorial"),
            json!([{ "number": 5 }]),
        );
        Message::data(id, data)
    }

    #[test]
    fn message_roundtrip() {
        let mut rng = rand::thread_rng();
        let id = rng.gen_range(0, MSGID_MAX);
        let msg = request_msg(id);
        let buf = encode_one(&msg);

        let (parsed, consumed) =
            Message::parse(&buf).expect("failed to parse message");
        assert_eq!(consumed, buf.len());
        assert_eq!(parsed, msg);
    }

    #[test]
    fn parse_incomplete_header() {
        match Message::parse(&[VERSION_CURRENT, 0x1]) {
            Err(ParseError::NotEnoughBytes(n)) => {
                assert_eq!(n, HEADER_SZ - 2)
            }
            _ => panic!("expected NotEnoughBytes"),
        }
    }

    #[test]
    fn parse_incomplete_payload() {
        let buf = encode_one(&request_msg(1));
        match Message::parse(&buf[..buf.len() - 1]) {
            Err(ParseError::NotEnoughBytes(n)) => assert_eq!(n, 1),
            _ => panic!("expected NotEnoughBytes"),
        }
    }

    #[test]
    fn parse_rejects_crc_mismatch() {
        let mut buf = encode_one(&request_msg(1));
        let last = buf.len() - 1;
        buf[last] ^= 0xff;
        match Message::parse(&buf) {
            Err(ParseError::IoError(_)) => (),
            _ => panic!("expected IoError for corrupted payload"),
        }
    }

    #[test]
    fn parse_rejects_unknown_version() {
        let mut buf = encode_one(&request_msg(1));
        buf[OFF_VERSION] = 0x2;
        match Message::parse(&buf) {
            Err(ParseError::IoError(_)) => (),
            _ => panic!("expected IoError for unknown version"),
        }
    }

    #[test]
    fn decode_multiple_frames() {
        let mut codec = RpcCodec;
        let mut buf = BytesMut::new();
        encode_msg(&request_msg(1), &mut buf).unwrap();
        encode_msg(&Message::end(1), &mut buf).unwrap();

        let msgs = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].status, MessageStatus::Data);
        assert_eq!(msgs[1].status, MessageStatus::End);
        assert!(buf.is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_retains_partial_frame() {
        let mut codec = RpcCodec;
        let encoded = encode_one(&request_msg(1));
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encoded[..encoded.len() - 4]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&encoded[encoded.len() - 4..]);
        let msgs = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, 1);
    }

    #[test]
    fn msg_id_allocation_wraps() {
        let mut msg_id = MessageId(MSGID_MAX);
        assert_eq!(msg_id.next(), Some(MSGID_MAX));
        assert_eq!(msg_id.next(), Some(0));
    }

    quickcheck! {
        fn roundtrip_preserves_payload(n: i64) -> TestResult {
            let data = MessageData::new(
                String::from("calculateFactorial"),
                json!([{ "number": n }]),
            );
            let msg = Message::data(1, data);
            let mut buf = BytesMut::new();
            if encode_msg(&msg, &mut buf).is_err() {
                return TestResult::failed();
            }
            match Message::parse(&buf) {
                Ok((parsed, _)) => {
                    TestResult::from_bool(parsed.data.d == msg.data.d)
                }
                Err(_) => TestResult::failed(),
            }
        }
    }
}
