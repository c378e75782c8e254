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

//! The worker ("calculator") role (§4.3): a small `{ready, busy,
//! not_available}` state machine that heartbeats to the dispatcher and
//! executes at most one task at a time. Grounded on
//! `calculator/calculator.py`'s `Calculator` and `calculator_task.py`'s
//! `CalculatorTask`, with the execution delay modeled as a spawned tokio
//! task instead of a daemon thread.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fabric_proto::{Method, NetworkAddress, Packet, WorkerStateCode};
use fabric_transport::{CommandStatus, TransportEngine};
use rand::Rng;
use serde_json::{json, Value};

use crate::config::WorkerSettings;

pub struct Worker {
    engine: Arc<dyn TransportEngine>,
    dispatcher_address: NetworkAddress,
    state: Mutex<WorkerStateCode>,
    current_task: Mutex<Option<Value>>,
    task_duration: (f64, f64),
    heartbeat_interval: Duration,
}

impl Worker {
    pub fn new(engine: Arc<dyn TransportEngine>, settings: &WorkerSettings, dispatcher_address: NetworkAddress) -> Arc<Self> {
        Arc::new(Worker {
            engine,
            dispatcher_address,
            state: Mutex::new(WorkerStateCode::Ready),
            current_task: Mutex::new(None),
            task_duration: settings.task_duration,
            heartbeat_interval: settings.heartbeat,
        })
    }

    pub async fn run(self: &Arc<Self>) {
        self.install_handler();
        self.heartbeat();
        let heartbeat_handle = self.spawn_heartbeat();
        self.engine.serve_forever().await;
        heartbeat_handle.abort();
    }

    pub fn shutdown(&self, immediate: bool) {
        if immediate {
            *self.current_task.lock().expect("current task lock poisoned") = None;
        }
        self.engine.shutdown(immediate);
    }

    fn install_handler(self: &Arc<Self>) {
        let worker = self.clone();
        self.engine.add_handler_request(Box::new(move |address, packet| worker.handle_message(address, packet)));
    }

    fn handle_message(self: &Arc<Self>, _address: NetworkAddress, packet: Packet) -> Option<Value> {
        match packet.method {
            Method::PerformTask => self.perform_task_handler(packet.params.unwrap_or(Value::Null)),
            Method::Status => {
                let state: i64 = (*self.state.lock().expect("state lock poisoned")).into();
                Some(json!({ "status": state }))
            }
            other => {
                log::warn!("worker has no handler for method {}", other);
                None
            }
        }
    }

    fn perform_task_handler(self: &Arc<Self>, params: Value) -> Option<Value> {
        let mut state = self.state.lock().expect("state lock poisoned");
        if *state == WorkerStateCode::Ready {
            *state = WorkerStateCode::Busy;
            drop(state);
            *self.current_task.lock().expect("current task lock poisoned") = Some(params.clone());
            self.spawn_task(params);
            return Some(Value::Null);
        }
        drop(state);

        let current = self.current_task.lock().expect("current task lock poisoned");
        let same_task = current
            .as_ref()
            .and_then(|current| current.get("task_uuid"))
            .zip(params.get("task_uuid"))
            .map(|(a, b)| a == b)
            .unwrap_or(false);

        if same_task {
            log::warn!("received a task that is already in progress");
            Some(Value::Null)
        } else {
            log::warn!("received a task while not ready; leaving it unacknowledged for the dispatcher to retry elsewhere");
            None
        }
    }

    fn spawn_task(self: &Arc<Self>, params: Value) {
        let worker = self.clone();
        let (low, high) = self.task_duration;
        tokio::spawn(async move {
            let duration = Duration::from_secs_f64(rand::thread_rng().gen_range(low..=high));
            log::debug!("task will complete in {:.2}s", duration.as_secs_f64());
            tokio::time::sleep(duration).await;
            worker.task_completed(params);
        });
    }

    fn task_completed(self: &Arc<Self>, params: Value) {
        log::debug!("task completed: {}", params);
        *self.current_task.lock().expect("current task lock poisoned") = None;
        let worker = self.clone();
        self.engine.send_command(
            self.dispatcher_address,
            Method::CompletedTask,
            params,
            Box::new(move |address, transmission_id, status| worker.confirmation_echo(address, transmission_id, status)),
        );
    }

    /// Whether the send of `completed_task` succeeded or was finally
    /// abandoned, the worker becomes available again here (§4.3).
    fn confirmation_echo(&self, address: NetworkAddress, transmission_id: u64, status: CommandStatus) {
        match status {
            CommandStatus::Success => log::debug!("task result delivered to dispatcher"),
            CommandStatus::Failure => log::error!(
                "failed to deliver task result to {} (transmission {})",
                address,
                transmission_id
            ),
        }
        *self.state.lock().expect("state lock poisoned") = WorkerStateCode::Ready;
    }

    fn heartbeat(&self) {
        let state: i64 = (*self.state.lock().expect("state lock poisoned")).into();
        self.engine
            .send_command_without_confirmation(self.dispatcher_address, Method::Heartbeat, json!({ "status": state }));
    }

    fn spawn_heartbeat(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(worker.heartbeat_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                worker.heartbeat();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_transport::{LoopbackNetwork, LoopbackTransportEngine, TransportOptions};
    use serde_json::json;

    fn test_worker() -> Arc<Worker> {
        let network = LoopbackNetwork::new();
        let engine = Arc::new(LoopbackTransportEngine::bind(&network, TransportOptions::default()));
        let settings = WorkerSettings {
            dispatcher_address: "127.0.0.1:9000".parse().unwrap(),
            listen_port: 0,
            heartbeat: Duration::from_secs(5),
            task_duration: (0.01, 0.02),
            max_attempts: 3,
        };
        Worker::new(engine, &settings, NetworkAddress::resolve("127.0.0.1:9000").unwrap())
    }

    #[test]
    fn accepts_a_task_while_ready_and_switches_busy() {
        let worker = test_worker();
        let ack = worker.perform_task_handler(json!({ "task_uuid": "a:1:1" }));
        assert_eq!(ack, Some(Value::Null));
        assert_eq!(*worker.state.lock().unwrap(), WorkerStateCode::Busy);
    }

    #[test]
    fn reacknowledges_a_duplicate_delivery_of_the_in_progress_task() {
        let worker = test_worker();
        worker.perform_task_handler(json!({ "task_uuid": "a:1:1" }));
        let ack = worker.perform_task_handler(json!({ "task_uuid": "a:1:1" }));
        assert_eq!(ack, Some(Value::Null));
    }

    #[test]
    fn stays_silent_on_a_different_task_while_busy() {
        let worker = test_worker();
        worker.perform_task_handler(json!({ "task_uuid": "a:1:1" }));
        let ack = worker.perform_task_handler(json!({ "task_uuid": "a:1:2" }));
        assert_eq!(ack, None);
    }

    #[test]
    fn status_reports_the_current_state_code() {
        let worker = test_worker();
        let address = NetworkAddress::resolve("127.0.0.1:1").unwrap();
        let packet = Packet::request(1, Method::Status, Value::Null);
        let result = worker.handle_message(address, packet);
        assert_eq!(result, Some(json!({ "status": 0 })));
    }
}
