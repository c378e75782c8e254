// Copyright 2024 Task Fabric Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! A tiny CLI for firing a single ad-hoc packet at an address, useful for
//! manually prodding a running dispatcher or worker. Grounded on
//! `sendudp.py`.

use std::net::SocketAddr;

use clap::Parser;
use fabric_proto::{Method, Packet};
use serde_json::Value;
use tokio::net::UdpSocket;

#[derive(Parser, Debug)]
#[command(name = "fabric-sendpkt")]
struct Args {
    /// Destination address, e.g. 127.0.0.1:9000
    #[arg(long, short = 'a')]
    address: SocketAddr,

    /// Method to send: add_task, perform_task, completed_task, notify_task, heartbeat, status
    #[arg(long, short = 'm')]
    method: String,

    /// Params as a JSON object, e.g. '{"task_id": 7}'
    #[arg(long, short = 'd', default_value = "{}")]
    params: String,

    /// Send as a no_answer packet instead of a request awaiting an ack.
    #[arg(long)]
    no_answer: bool,

    /// Number of times to send.
    #[arg(long, short = 'c', default_value_t = 1)]
    count: u32,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let method: Method = serde_json::from_value(Value::String(args.method.clone()))
        .unwrap_or_else(|_| panic!("unknown method {}", args.method));
    let params: Value = serde_json::from_str(&args.params).expect("--params must be valid JSON");

    let socket = UdpSocket::bind("0.0.0.0:0").await.expect("failed to bind ephemeral socket");

    for i in 0..args.count {
        let packet = if args.no_answer {
            Packet::no_answer(method, params.clone())
        } else {
            Packet::request(i as u64 + 1, method, params.clone())
        };
        let bytes = packet.encode().expect("packet too large to send");
        socket.send_to(&bytes, args.address).await.expect("send failed");
        println!("sent {:?} to {}", packet, args.address);
    }
}
