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

//! A process-level supervisor that kills and restarts the worker binary
//! after a random "crash" delay, to give the dispatcher's liveness/retry
//! logic something real to tolerate during manual testing. Grounded on
//! `calculator/disability_runner.py`'s `DisabilityRunner`; a process-level
//! wrapper around the worker binary rather than part of its state machine,
//! per §12 of the expanded spec.

use std::time::Duration;

use rand::Rng;
use tokio::process::{Child, Command};
use tokio::time::sleep;

pub struct DisabilitySupervisor {
    worker_command: Vec<String>,
    probability: f64,
    duration: (f64, f64),
    poll_interval: Duration,
}

impl DisabilitySupervisor {
    pub fn new(worker_command: Vec<String>, probability: f64, duration: (f64, f64), poll_interval: Duration) -> Self {
        DisabilitySupervisor { worker_command, probability, duration, poll_interval }
    }

    pub async fn serve_forever(&self) -> ! {
        loop {
            let mut child = self.start_worker();
            loop {
                sleep(self.poll_interval).await;
                if let Ok(Some(status)) = child.try_wait() {
                    log::warn!("worker process exited on its own with {}", status);
                    break;
                }
                if self.is_disability_chance() {
                    log::debug!("entering disability mode; killing the worker");
                    self.stop_worker(&mut child).await;
                    self.go_disability_mode().await;
                    break;
                }
            }
        }
    }

    fn start_worker(&self) -> Child {
        let (program, args) = self.worker_command.split_first().expect("worker command must not be empty");
        Command::new(program)
            .args(args)
            .spawn()
            .expect("failed to spawn worker process")
    }

    async fn stop_worker(&self, child: &mut Child) {
        if let Err(error) = child.kill().await {
            log::warn!("failed to kill worker process: {}", error);
        }
        let _ = child.wait().await;
    }

    async fn go_disability_mode(&self) {
        let (low, high) = self.duration;
        let delay = Duration::from_secs_f64(rand::thread_rng().gen_range(low..=high));
        log::debug!("disability mode active for {:.2}s", delay.as_secs_f64());
        sleep(delay).await;
    }

    fn is_disability_chance(&self) -> bool {
        self.probability >= rand::thread_rng().gen_range(0.0..1.0)
    }
}
