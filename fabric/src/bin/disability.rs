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

use std::time::Duration;

use clap::Parser;
use fabric::disability::DisabilitySupervisor;

/// Restarts `fabric-worker` after random "crash" delays, to give the
/// dispatcher's liveness/retry logic something real to tolerate.
#[derive(Parser, Debug)]
#[command(name = "fabric-disability")]
struct Args {
    /// Extra arguments forwarded verbatim to `fabric-worker`.
    #[arg(long, value_delimiter = ' ')]
    worker_args: Vec<String>,

    #[arg(long, default_value_t = 0.05)]
    disability_probability: f64,

    #[arg(long, default_value_t = 2.0)]
    disability_duration_min_secs: f64,

    #[arg(long, default_value_t = 8.0)]
    disability_duration_max_secs: f64,

    #[arg(long, default_value_t = 1.0)]
    poll_interval_secs: f64,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut worker_command = vec!["fabric-worker".to_string()];
    worker_command.extend(args.worker_args);

    let supervisor = DisabilitySupervisor::new(
        worker_command,
        args.disability_probability,
        (args.disability_duration_min_secs, args.disability_duration_max_secs),
        Duration::from_secs_f64(args.poll_interval_secs),
    );

    supervisor.serve_forever().await;
}
