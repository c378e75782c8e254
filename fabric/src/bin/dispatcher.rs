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
use fabric::config::DispatcherConfig;
use fabric::Dispatcher;
use fabric_transport::{TransportOptions, UdpTransportEngine};

#[tokio::main]
async fn main() {
    env_logger::init();
    let config = DispatcherConfig::parse();
    let settings = config.resolve().expect("invalid dispatcher configuration");

    let options = TransportOptions { max_attempts: settings.max_attempts, ..TransportOptions::default() };
    let engine = UdpTransportEngine::bind(settings.bind_address, options)
        .await
        .expect("failed to bind dispatcher socket");
    log::info!("dispatcher listening on {}", settings.bind_address);

    let dispatcher = Dispatcher::new(Arc::new(engine), settings);

    tokio::select! {
        _ = dispatcher.run() => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("ctrl+c received, shutting down");
            dispatcher.shutdown(false);
        }
    }
}
