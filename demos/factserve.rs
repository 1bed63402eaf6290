// Copyright 2020 Joyent, Inc.

use std::env;
use std::net::SocketAddr;
use std::process;
use std::sync::Mutex;

use futures::StreamExt;
use slog::{error, info, o, Drain, Logger};
use tokio::net::TcpListener;

use factorial_rpc::endpoint::FactorialService;
use factorial_rpc::server;

#[tokio::main]
async fn main() {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let root_log = Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!("build-id" => "0.1.0"),
    );

    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:2030".to_string());
    let addr = addr.parse::<SocketAddr>().unwrap_or_else(|e| {
        eprintln!("Failed to parse listen address: {}", e);
        process::exit(1)
    });

    let mut listener = TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        error!(root_log, "failed to bind"; "address" => %addr, "err" => %e);
        process::exit(1)
    });
    let mut incoming = listener.incoming();
    info!(root_log, "listening for factorial requests"; "address" => %addr);

    let service = FactorialService::new();

    while let Some(Ok(socket)) = incoming.next().await {
        let process_log = root_log.clone();
        tokio::spawn(async move {
            server::make_task(
                socket,
                move |msg, log| service.handle(msg, log),
                Some(&process_log),
            )
            .await;
        });
    }
}
