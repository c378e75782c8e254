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

use std::sync::Arc;

use clap::Parser;
use fabric::config::ClientConfig;
use fabric::Client;
use fabric_proto::NetworkAddress;
use fabric_transport::{TransportOptions, UdpTransportEngine};

#[tokio::main]
async fn main() {
    env_logger::init();
    let config = ClientConfig::parse();
    let settings = config.resolve().expect("invalid client configuration");

    let options = TransportOptions { max_attempts: settings.max_attempts, ..TransportOptions::default() };
    let bind_address = ([0, 0, 0, 0], settings.client_port).into();
    let engine = UdpTransportEngine::bind(bind_address, options)
        .await
        .expect("failed to bind client socket");
    log::info!("client listening on {}", engine.local_addr().expect("local_addr"));

    let dispatcher_address = NetworkAddress::from(settings.dispatcher_address);
    let client = Client::new(Arc::new(engine), &settings, dispatcher_address);

    tokio::select! {
        _ = client.run() => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("ctrl+c received, shutting down");
            client.shutdown(false);
        }
    }
}
