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

//! The two cooperative timers of §4.2: the retry sweep that re-places
//! unplaced tasks and expires stale ones, and the liveness sweep that probes
//! workers gone quiet. Mirrors `dispatcher.py`'s `repeat_unsuccessful_tasks`
//! / `activity_poll`, run here as independent tokio tasks rather than
//! `call_repeatedly`'s dedicated threads.

use std::sync::Arc;

use fabric_proto::Method;
use fabric_transport::CommandStatus;
use serde_json::json;
use tokio::task::JoinHandle;

use super::registry::{TaskStatus, WorkerRecord};
use super::Dispatcher;
use fabric_proto::WorkerStateCode;

pub(crate) fn spawn(dispatcher: Arc<Dispatcher>) -> Vec<JoinHandle<()>> {
    vec![spawn_retry_sweep(dispatcher.clone()), spawn_liveness_sweep(dispatcher)]
}

fn spawn_retry_sweep(dispatcher: Arc<Dispatcher>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(dispatcher.settings.repeater_unsuccessful_tasks_interval);
        loop {
            ticker.tick().await;
            retry_unsuccessful_tasks(&dispatcher);
        }
    })
}

fn retry_unsuccessful_tasks(dispatcher: &Arc<Dispatcher>) {
    let task_uuids: Vec<_> = dispatcher.tasks.lock().expect("task registry lock poisoned").keys().cloned().collect();

    for task_uuid in task_uuids {
        let should_place = {
            let mut tasks = dispatcher.tasks.lock().expect("task registry lock poisoned");
            let Some(task) = tasks.get_mut(&task_uuid) else { continue };

            if task.created.elapsed() >= dispatcher.settings.timeout_task_placement {
                log::error!(
                    "failed to place task {} from {}, expiring: {:?}",
                    task_uuid,
                    task.client_address,
                    task.task_params
                );
                task.status = TaskStatus::ErrorPlacementTimeout;
                false
            } else {
                matches!(task.status, TaskStatus::AcceptedFromClient | TaskStatus::ErrorAcceptedCalculator)
            }
        };

        if should_place {
            dispatcher.find_calculator_for_task(&task_uuid);
        }
    }
}

fn spawn_liveness_sweep(dispatcher: Arc<Dispatcher>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(dispatcher.settings.activity_poll);
        loop {
            ticker.tick().await;
            poll_activity(&dispatcher);
        }
    })
}

fn poll_activity(dispatcher: &Arc<Dispatcher>) {
    let stale: Vec<_> = {
        let workers = dispatcher.workers.lock().expect("worker registry lock poisoned");
        workers
            .iter()
            .filter(|(_, record): &(_, &WorkerRecord)| record.last_update.elapsed() >= dispatcher.settings.inactivity_timeout)
            .map(|(addr, _)| *addr)
            .collect()
    };

    for address in stale {
        let callback_dispatcher = dispatcher.clone();
        dispatcher.engine.send_command(
            address,
            Method::Status,
            json!({}),
            Box::new(move |address, _transmission_id, status| {
                let mut workers = callback_dispatcher.workers.lock().expect("worker registry lock poisoned");
                match status {
                    CommandStatus::Success => {
                        if let Some(record) = workers.get_mut(&address) {
                            record.touch();
                        }
                    }
                    CommandStatus::Failure => {
                        if let Some(record) = workers.get_mut(&address) {
                            record.state = WorkerStateCode::NotAvailable;
                            record.touch();
                        }
                        log::debug!("worker {} is not responding", address);
                    }
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatcherSettings;
    use fabric_proto::NetworkAddress;
    use fabric_transport::{LoopbackNetwork, LoopbackTransportEngine, TransportOptions};
    use std::time::Duration;

    fn test_dispatcher(timeout_task_placement: Duration) -> Arc<Dispatcher> {
        let network = LoopbackNetwork::new();
        let engine = Arc::new(LoopbackTransportEngine::bind(&network, TransportOptions::default()));
        let settings = DispatcherSettings {
            bind_address: "127.0.0.1:9000".parse().unwrap(),
            timeout_task_placement,
            repeater_unsuccessful_tasks_interval: Duration::from_millis(10),
            activity_poll: Duration::from_secs(10),
            inactivity_timeout: Duration::from_secs(10),
            max_attempts: 3,
        };
        Dispatcher::new(engine, settings)
    }

    #[test]
    fn an_unplaced_task_past_its_timeout_expires() {
        let dispatcher = test_dispatcher(Duration::from_millis(0));
        let client_addr = NetworkAddress::resolve("10.0.0.1:4000").unwrap();
        dispatcher.add_task_handler(client_addr, json!({ "task_id": 1 }));

        std::thread::sleep(Duration::from_millis(5));
        retry_unsuccessful_tasks(&dispatcher);

        let task_uuid = fabric_proto::TaskUuid::new(client_addr.host(), client_addr.port(), 1);
        let tasks = dispatcher.tasks.lock().unwrap();
        assert_eq!(tasks.get(&task_uuid).unwrap().status, TaskStatus::ErrorPlacementTimeout);
    }

    #[test]
    fn an_unplaced_task_is_retried_once_a_worker_becomes_ready() {
        let dispatcher = test_dispatcher(Duration::from_secs(120));
        let client_addr = NetworkAddress::resolve("10.0.0.1:4000").unwrap();
        dispatcher.add_task_handler(client_addr, json!({ "task_id": 1 }));

        let worker_addr = NetworkAddress::resolve("10.0.0.2:5000").unwrap();
        dispatcher.heartbeat_handler(worker_addr, json!({ "status": 0 }));

        retry_unsuccessful_tasks(&dispatcher);

        let task_uuid = fabric_proto::TaskUuid::new(client_addr.host(), client_addr.port(), 1);
        let tasks = dispatcher.tasks.lock().unwrap();
        assert_eq!(tasks.get(&task_uuid).unwrap().status, TaskStatus::SentToCalculator);
    }

    /// Open Question decision recorded in DESIGN.md: a task already placed
    /// with a calculator is never re-placed by the retry sweep just because
    /// that calculator is later found unresponsive by the liveness sweep.
    #[tokio::test]
    async fn a_task_sent_to_calculator_is_untouched_when_its_worker_goes_not_available() {
        use super::registry::TaskRecord;

        let network = LoopbackNetwork::new();
        let engine = Arc::new(LoopbackTransportEngine::bind(
            &network,
            TransportOptions { max_attempts: 1, timeout: Duration::from_millis(5) },
        ));
        let settings = DispatcherSettings {
            bind_address: "127.0.0.1:9000".parse().unwrap(),
            timeout_task_placement: Duration::from_secs(120),
            repeater_unsuccessful_tasks_interval: Duration::from_secs(120),
            activity_poll: Duration::from_secs(120),
            inactivity_timeout: Duration::from_millis(0),
            max_attempts: 1,
        };
        let dispatcher = Dispatcher::new(engine, settings);

        // A worker the liveness probe will never reach: no peer is ever
        // registered at this address on the loopback network.
        let worker_addr = NetworkAddress::resolve("10.0.0.9:6000").unwrap();
        dispatcher.heartbeat_handler(worker_addr, json!({ "status": 1 }));

        let client_addr = NetworkAddress::resolve("10.0.0.1:4000").unwrap();
        let task_uuid = fabric_proto::TaskUuid::new(client_addr.host(), client_addr.port(), 1);
        dispatcher.tasks.lock().unwrap().insert(
            task_uuid.clone(),
            TaskRecord {
                client_address: client_addr,
                calculator_address: Some(worker_addr),
                status: TaskStatus::SentToCalculator,
                task_params: json!({ "task_id": 1 }),
                created: std::time::Instant::now(),
            },
        );

        let loop_engine = dispatcher.engine.clone();
        let loop_handle = tokio::spawn(async move { loop_engine.serve_forever().await });

        poll_activity(&dispatcher);
        // Give the pump a few ticks to exhaust the unreachable worker's
        // status probe and fire its failure callback.
        tokio::time::sleep(Duration::from_millis(50)).await;

        dispatcher.shutdown(false);
        let _ = loop_handle.await;

        let workers = dispatcher.workers.lock().unwrap();
        assert_eq!(workers.get(&worker_addr).unwrap().state, WorkerStateCode::NotAvailable);
        drop(workers);

        retry_unsuccessful_tasks(&dispatcher);

        let tasks = dispatcher.tasks.lock().unwrap();
        assert_eq!(tasks.get(&task_uuid).unwrap().status, TaskStatus::SentToCalculator);
    }
}
