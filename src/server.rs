// Copyright 2020 Joyent, Inc.

use std::io::Error;

use futures::{SinkExt, StreamExt};
use slog::{debug, error, o, Drain, Logger};
use tokio::net::TcpStream;
use tokio_util::codec::Decoder;

use crate::protocol::{Message, MessageStatus, RpcCodec};

/// Handle one RPC connection: decode incoming messages, hand each one to the
/// response handler, and write the responses back out. Successful responses
/// are terminated with an end message; error responses terminate the request
/// on their own. Transport or handler failures end the connection.
pub async fn make_task<H>(
    socket: TcpStream,
    response_handler: H,
    log: Option<&Logger>,
) where
    H: Fn(&Message, &Logger) -> Result<Vec<Message>, Error>,
{
    let log = log
        .cloned()
        .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));
    let mut framed = RpcCodec.framed(socket);

    while let Some(decode_result) = framed.next().await {
        let msgs = match decode_result {
            Ok(msgs) => msgs,
            Err(e) => {
                error!(log, "failed to decode message"; "err" => %e);
                return;
            }
        };

        for msg in &msgs {
            let responses = match respond(msg, &response_handler, &log) {
                Ok(responses) => responses,
                Err(e) => {
                    error!(log, "failed to handle message";
                           "msg_id" => msg.id, "err" => %e);
                    return;
                }
            };
            if let Err(e) = framed.send(responses).await {
                error!(log, "failed to send response";
                       "msg_id" => msg.id, "err" => %e);
                return;
            }
        }
    }

    debug!(log, "connection closed");
}

fn respond<H>(
    msg: &Message,
    response_handler: &H,
    log: &Logger,
) -> Result<Vec<Message>, Error>
where
    H: Fn(&Message, &Logger) -> Result<Vec<Message>, Error>,
{
    let mut responses = response_handler(msg, log)?;
    let errored = responses
        .last()
        .map(|m| m.status == MessageStatus::Error)
        .unwrap_or(false);
    if !errored {
        responses.push(Message::end(msg.id));
    }
    Ok(responses)
}
