// Copyright 2020 Joyent, Inc.

use std::io::Error;
use std::net::SocketAddr;
use std::process;

use clap::{crate_version, value_t, App, Arg, ArgMatches};
use serde_json::{json, Value};
use tokio::net::TcpStream;

use factorial_rpc::client;
use factorial_rpc::endpoint::METHOD_CALCULATE_FACTORIAL;
use factorial_rpc::protocol::{Message, MessageId};

static APP: &str = "factcall";
static DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u32 = 2030;

fn parse_opts<'a>(app: String) -> ArgMatches<'a> {
    App::new(app)
        .about("Command-line tool for calling the factorial RPC service")
        .version(crate_version!())
        .arg(
            Arg::with_name("host")
                .help("DNS name or IP address for remote server")
                .long("host")
                .short("h")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("port")
                .help("TCP port for remote server (Default: 2030)")
                .long("port")
                .short("p")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("number")
                .help("Number to compute the factorial of")
                .long("number")
                .short("n")
                .takes_value(true)
                .required(true),
        )
        .get_matches()
}

fn response_handler(msg: &Message) -> Result<(), Error> {
    println!("{}", msg.data.d);
    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = parse_opts(APP.to_string());
    let host = String::from(matches.value_of("host").unwrap_or(DEFAULT_HOST));
    let port = value_t!(matches, "port", u32).unwrap_or(DEFAULT_PORT);
    let addr = [host, String::from(":"), port.to_string()]
        .concat()
        .parse::<SocketAddr>()
        .unwrap_or_else(|e| {
            eprintln!(
                "Failed to parse host and port as valid socket address: \
                 {}",
                e
            );
            process::exit(1)
        });
    let number = matches.value_of("number").unwrap_or_else(|| {
        eprintln!("Failed to parse number argument as String");
        process::exit(1)
    });
    let number: Value = serde_json::from_str(number).unwrap_or_else(|e| {
        eprintln!("Failed to parse number argument as JSON: {}", e);
        process::exit(1)
    });
    let args = json!([{ "number": number }]);

    let mut stream = TcpStream::connect(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to connect to server: {}", e);
        process::exit(1)
    });

    let mut msg_id = MessageId::new();

    let result = match client::send(
        METHOD_CALCULATE_FACTORIAL.to_string(),
        args,
        &mut msg_id,
        &mut stream,
    )
    .await
    {
        Ok(_bytes_written) => {
            client::receive(&mut stream, response_handler).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }
}
