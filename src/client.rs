// Copyright 2020 Joyent, Inc.

use std::io::{Error, ErrorKind};

use bytes::BytesMut;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::engine::Fault;
use crate::protocol::{
    self, Message, MessageData, MessageId, MessageStatus, ParseError,
};

enum BufferAction {
    Keep,
    Trim(usize),
    Done,
}

/// Send one RPC request on the stream, returning the number of bytes
/// written.
pub async fn send(
    method: String,
    args: Value,
    msg_id: &mut MessageId,
    stream: &mut TcpStream,
) -> Result<usize, Error> {
    let id = msg_id.next().unwrap_or(0);
    let msg = Message::data(id, MessageData::new(method, args));
    let mut write_buf = BytesMut::new();
    protocol::encode_msg(&msg, &mut write_buf)
        .map_err(|e| Error::new(ErrorKind::Other, e))?;
    stream.write_all(write_buf.as_ref()).await?;
    Ok(write_buf.len())
}

/// Read response messages for one request, handing each data message to the
/// response handler until the end message arrives. An error message is
/// decoded into its fault and surfaced as an `InvalidInput` error; the
/// stream remains usable for further requests in either case.
pub async fn receive<F>(
    stream: &mut TcpStream,
    response_handler: F,
) -> Result<usize, Error>
where
    F: Fn(&Message) -> Result<(), Error>,
{
    let mut msg_buf: Vec<u8> = Vec::new();
    let mut total_bytes = 0;

    loop {
        let mut read_buf = [0; 1024];
        let byte_count = stream.read(&mut read_buf).await?;
        if byte_count == 0 {
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                "connection closed before end of response",
            ));
        }
        total_bytes += byte_count;
        msg_buf.extend_from_slice(&read_buf[0..byte_count]);

        match parse_and_handle_messages(
            msg_buf.as_slice(),
            &response_handler,
        )? {
            BufferAction::Keep => (),
            BufferAction::Trim(rest_offset) => {
                let truncate_bytes = msg_buf.len() - rest_offset;
                msg_buf.rotate_left(rest_offset);
                msg_buf.truncate(truncate_bytes);
            }
            BufferAction::Done => return Ok(total_bytes),
        }
    }
}

fn parse_and_handle_messages<F>(
    read_buf: &[u8],
    response_handler: &F,
) -> Result<BufferAction, Error>
where
    F: Fn(&Message) -> Result<(), Error>,
{
    let mut offset = 0;

    loop {
        match Message::parse(&read_buf[offset..]) {
            Ok((ref msg, _)) if msg.status == MessageStatus::End => {
                return Ok(BufferAction::Done);
            }
            Ok((ref msg, _)) if msg.status == MessageStatus::Error => {
                return Err(fault_error(msg));
            }
            Ok((msg, consumed)) => {
                offset += consumed;
                response_handler(&msg)?;
            }
            Err(ParseError::NotEnoughBytes(_)) => {
                return Ok(if offset > 0 {
                    BufferAction::Trim(offset)
                } else {
                    BufferAction::Keep
                });
            }
            Err(ParseError::IoError(e)) => return Err(e),
        }
    }
}

fn fault_error(msg: &Message) -> Error {
    match serde_json::from_value::<Fault>(msg.data.d.clone()) {
        Ok(fault) => Error::new(ErrorKind::InvalidInput, fault.to_string()),
        Err(_) => Error::new(
            ErrorKind::Other,
            format!("malformed error response: {}", msg.data.d),
        ),
    }
}
