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

//! The dispatcher role (§4.2): matches incoming client tasks to ready
//! workers, tracks worker liveness, and shepherds tasks through the state
//! machine of §3. Grounded on `dispatcher.py`'s `Dispatcher`, generalized
//! from its Python dict-of-dicts registries to [`registry::WorkerRegistry`]
//! / [`registry::TaskRegistry`].

mod registry;
mod sweeps;

use std::sync::{Arc, Mutex};

use fabric_proto::{Method, NetworkAddress, Packet, TaskUuid, WorkerStateCode};
use fabric_transport::{CommandStatus, TransportEngine};
use serde_json::{json, Value};

pub use registry::{TaskRecord, TaskRegistry, TaskStatus, WorkerRecord, WorkerRegistry};

use crate::config::DispatcherSettings;

pub struct Dispatcher {
    engine: Arc<dyn TransportEngine>,
    workers: Mutex<WorkerRegistry>,
    tasks: Mutex<TaskRegistry>,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(engine: Arc<dyn TransportEngine>, settings: DispatcherSettings) -> Arc<Self> {
        Arc::new(Dispatcher {
            engine,
            workers: Mutex::new(WorkerRegistry::new()),
            tasks: Mutex::new(TaskRegistry::new()),
            settings,
        })
    }

    /// Installs the inbound handler and starts the retry/liveness sweeps,
    /// then runs the transport's I/O loop until shutdown.
    pub async fn run(self: &Arc<Self>) {
        self.install_handler();
        let sweep_handles = sweeps::spawn(self.clone());
        self.engine.serve_forever().await;
        for handle in sweep_handles {
            handle.abort();
        }
    }

    pub fn shutdown(&self, immediate: bool) {
        self.engine.shutdown(immediate);
    }

    fn install_handler(self: &Arc<Self>) {
        let dispatcher = self.clone();
        self.engine.add_handler_request(Box::new(move |address, packet| {
            dispatcher.handle_message(address, packet)
        }));
    }

    fn handle_message(self: &Arc<Self>, address: NetworkAddress, packet: Packet) -> Option<Value> {
        log::debug!("address: {} method: {}", address, packet.method);
        match packet.method {
            Method::AddTask => self.add_task_handler(address, packet.params.unwrap_or(Value::Null)),
            Method::Heartbeat => self.heartbeat_handler(address, packet.params.unwrap_or(Value::Null)),
            Method::CompletedTask => self.completed_task_handler(address, packet.params.unwrap_or(Value::Null)),
            other => {
                log::warn!("dispatcher has no handler for method {}", other);
                None
            }
        }
    }

    fn heartbeat_handler(&self, address: NetworkAddress, params: Value) -> Option<Value> {
        let state = params
            .get("status")
            .and_then(Value::as_i64)
            .and_then(|code| WorkerStateCode::try_from(code).ok())
            .unwrap_or(WorkerStateCode::Ready);

        let mut workers = self.workers.lock().expect("worker registry lock poisoned");
        workers
            .entry(address)
            .and_modify(|record| {
                record.state = state;
                record.touch();
            })
            .or_insert_with(|| WorkerRecord::new(state));
        Some(Value::Null)
    }

    fn completed_task_handler(&self, address: NetworkAddress, params: Value) -> Option<Value> {
        let task_uuid = match params.get("task_uuid").and_then(Value::as_str).and_then(|s| s.parse::<TaskUuid>().ok()) {
            Some(uuid) => uuid,
            None => {
                log::error!("completed_task from {} missing a valid task_uuid: {}", address, params);
                return Some(Value::Null);
            }
        };

        let (client_address, task_params) = {
            let mut tasks = self.tasks.lock().expect("task registry lock poisoned");
            match tasks.get_mut(&task_uuid) {
                Some(task) => {
                    task.status = TaskStatus::Solved;
                    task.calculator_address = None;
                    (task.client_address, task.task_params.clone())
                }
                None => {
                    log::error!("no task {} known, notification from {}: {}", task_uuid, address, params);
                    return Some(Value::Null);
                }
            }
        };

        {
            let mut workers = self.workers.lock().expect("worker registry lock poisoned");
            workers
                .entry(address)
                .and_modify(|record| {
                    record.state = WorkerStateCode::Ready;
                    record.touch();
                })
                .or_insert_with(|| WorkerRecord::new(WorkerStateCode::Ready));
        }

        let mut notify_params = task_params;
        if let Value::Object(ref mut map) = notify_params {
            map.insert("status".to_string(), json!("success"));
        }
        self.engine.send_command(client_address, Method::NotifyTask, notify_params, Box::new(|_, _, _| {}));

        if let Some(task) = self.tasks.lock().expect("task registry lock poisoned").get_mut(&task_uuid) {
            task.status = TaskStatus::SentToClient;
        }

        Some(Value::Null)
    }

    fn add_task_handler(self: &Arc<Self>, address: NetworkAddress, params: Value) -> Option<Value> {
        let task_id = params.get("task_id").and_then(Value::as_i64).unwrap_or(0);
        let task_uuid = TaskUuid::new(address.host(), address.port(), task_id);

        {
            let tasks = self.tasks.lock().expect("task registry lock poisoned");
            if tasks.contains_key(&task_uuid) {
                log::warn!("add_task for {} from {} already on file", task_uuid, address);
                return Some(Value::Null);
            }
        }

        {
            let mut tasks = self.tasks.lock().expect("task registry lock poisoned");
            tasks.insert(task_uuid.clone(), TaskRecord::new(address, params));
        }

        self.find_calculator_for_task(&task_uuid);
        Some(Value::Null)
    }

    /// Placement algorithm (§4.2): scan worker records in insertion order,
    /// pick the first `ready` one, flip it to `busy`, and send `perform_task`.
    pub(crate) fn find_calculator_for_task(self: &Arc<Self>, task_uuid: &TaskUuid) {
        let candidate = {
            let mut workers = self.workers.lock().expect("worker registry lock poisoned");
            let ready_addr = workers
                .iter()
                .find(|(_, record)| record.state == WorkerStateCode::Ready)
                .map(|(addr, _)| *addr);
            if let Some(addr) = ready_addr {
                if let Some(record) = workers.get_mut(&addr) {
                    record.state = WorkerStateCode::Busy;
                }
            }
            ready_addr
        };

        let Some(calculator_address) = candidate else {
            let mut tasks = self.tasks.lock().expect("task registry lock poisoned");
            if let Some(task) = tasks.get_mut(task_uuid) {
                task.status = TaskStatus::ErrorAcceptedCalculator;
            }
            log::warn!("no ready worker available for task {}", task_uuid);
            return;
        };

        {
            let mut tasks = self.tasks.lock().expect("task registry lock poisoned");
            if let Some(task) = tasks.get_mut(task_uuid) {
                task.calculator_address = Some(calculator_address);
                task.status = TaskStatus::SentToCalculator;
            }
        }

        let params = json!({ "task_uuid": task_uuid.to_string() });
        let callback_uuid = task_uuid.clone();
        let dispatcher = self.clone();
        self.engine.send_command(
            calculator_address,
            Method::PerformTask,
            params,
            Box::new(move |address, _transmission_id, status| {
                let mut workers = dispatcher.workers.lock().expect("worker registry lock poisoned");
                let mut tasks = dispatcher.tasks.lock().expect("task registry lock poisoned");
                match status {
                    CommandStatus::Success => {
                        if let Some(record) = workers.get_mut(&address) {
                            record.touch();
                        }
                        if let Some(task) = tasks.get_mut(&callback_uuid) {
                            task.status = TaskStatus::AcceptedForExecutionCalculator;
                        }
                    }
                    CommandStatus::Failure => {
                        if let Some(record) = workers.get_mut(&address) {
                            record.state = WorkerStateCode::NotAvailable;
                            record.touch();
                        }
                        if let Some(task) = tasks.get_mut(&callback_uuid) {
                            task.status = TaskStatus::ErrorAcceptedCalculator;
                        }
                    }
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_transport::{LoopbackNetwork, LoopbackTransportEngine, TransportOptions};

    fn test_dispatcher() -> Arc<Dispatcher> {
        let network = LoopbackNetwork::new();
        let engine = Arc::new(LoopbackTransportEngine::bind(&network, TransportOptions::default()));
        let settings = DispatcherSettings {
            bind_address: "127.0.0.1:9000".parse().unwrap(),
            timeout_task_placement: std::time::Duration::from_secs(120),
            repeater_unsuccessful_tasks_interval: std::time::Duration::from_secs(1),
            activity_poll: std::time::Duration::from_secs(10),
            inactivity_timeout: std::time::Duration::from_secs(10),
            max_attempts: 3,
        };
        Dispatcher::new(engine, settings)
    }

    fn client_addr() -> NetworkAddress {
        NetworkAddress::resolve("10.0.0.1:4000").unwrap()
    }

    #[test]
    fn add_task_with_no_ready_worker_fails_placement() {
        let dispatcher = test_dispatcher();
        dispatcher.add_task_handler(client_addr(), json!({ "task_id": 1 }));

        let task_uuid = TaskUuid::new(client_addr().host(), client_addr().port(), 1);
        let tasks = dispatcher.tasks.lock().unwrap();
        assert_eq!(tasks.get(&task_uuid).unwrap().status, TaskStatus::ErrorAcceptedCalculator);
    }

    #[test]
    fn add_task_is_idempotent_for_the_same_client_and_task_id() {
        let dispatcher = test_dispatcher();
        dispatcher.add_task_handler(client_addr(), json!({ "task_id": 1 }));
        dispatcher.add_task_handler(client_addr(), json!({ "task_id": 1 }));
        assert_eq!(dispatcher.tasks.lock().unwrap().len(), 1);
    }

    #[test]
    fn add_task_places_onto_a_ready_worker() {
        let dispatcher = test_dispatcher();
        let worker_addr = NetworkAddress::resolve("10.0.0.2:5000").unwrap();
        dispatcher.heartbeat_handler(worker_addr, json!({ "status": 0 }));

        dispatcher.add_task_handler(client_addr(), json!({ "task_id": 1 }));

        let task_uuid = TaskUuid::new(client_addr().host(), client_addr().port(), 1);
        let tasks = dispatcher.tasks.lock().unwrap();
        let task = tasks.get(&task_uuid).unwrap();
        assert_eq!(task.status, TaskStatus::SentToCalculator);
        assert_eq!(task.calculator_address, Some(worker_addr));

        let workers = dispatcher.workers.lock().unwrap();
        assert_eq!(workers.get(&worker_addr).unwrap().state, WorkerStateCode::Busy);
    }

    #[test]
    fn heartbeat_registers_an_unknown_worker() {
        let dispatcher = test_dispatcher();
        let worker_addr = NetworkAddress::resolve("10.0.0.3:5001").unwrap();
        dispatcher.heartbeat_handler(worker_addr, json!({ "status": 1 }));

        let workers = dispatcher.workers.lock().unwrap();
        assert_eq!(workers.get(&worker_addr).unwrap().state, WorkerStateCode::Busy);
    }
}
