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

//! The client role (§4.4): generates tasks with monotonically increasing
//! ids, submits them via `add_task`, and resolves them on `notify_task`.
//! Grounded on `client.py`'s `Client`, including the supplemented
//! `print_stat` aggregate report (§12 of the expanded spec) that the
//! distillation filed as out of scope for the core state machine.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fabric_proto::{Method, NetworkAddress, Packet};
use fabric_transport::{CommandStatus, TransportEngine};
use indexmap::IndexMap;
use rand::Rng;
use serde_json::{json, Value};

use crate::config::ClientSettings;

#[derive(Debug, Clone)]
struct ClientTask {
    created: Instant,
    done: Option<Instant>,
}

pub struct Client {
    engine: Arc<dyn TransportEngine>,
    dispatcher_address: NetworkAddress,
    next_task_id: AtomicI64,
    tasks: Mutex<IndexMap<i64, ClientTask>>,
    task_generation_interval: (f64, f64),
}

impl Client {
    pub fn new(engine: Arc<dyn TransportEngine>, settings: &ClientSettings, dispatcher_address: NetworkAddress) -> Arc<Self> {
        Arc::new(Client {
            engine,
            dispatcher_address,
            next_task_id: AtomicI64::new(0),
            tasks: Mutex::new(IndexMap::new()),
            task_generation_interval: settings.task_generation_interval,
        })
    }

    pub async fn run(self: &Arc<Self>) {
        self.install_handler();
        let generator = self.spawn_generator();
        self.engine.serve_forever().await;
        generator.abort();
    }

    pub fn shutdown(&self, immediate: bool) {
        self.engine.shutdown(immediate);
        self.print_stat();
    }

    fn install_handler(self: &Arc<Self>) {
        let client = self.clone();
        self.engine.add_handler_request(Box::new(move |address, packet| client.handle_message(address, packet)));
    }

    fn handle_message(&self, address: NetworkAddress, packet: Packet) -> Option<Value> {
        match packet.method {
            Method::NotifyTask => self.notify_task_handler(packet.params.unwrap_or(Value::Null)),
            other => {
                log::warn!("unexpected request from {}: {}", address, other);
                None
            }
        }
    }

    fn notify_task_handler(&self, params: Value) -> Option<Value> {
        let Some(task_id) = params.get("task_id").and_then(Value::as_i64) else {
            log::error!("notify_task missing task_id: {}", params);
            return Some(Value::Null);
        };

        let mut tasks = self.tasks.lock().expect("task table lock poisoned");
        match tasks.get_mut(&task_id) {
            Some(task) => {
                task.done = Some(Instant::now());
                log::debug!("task {} resolved", task_id);
            }
            None => log::error!("notify_task for unknown task {}: {}", task_id, params),
        }
        Some(Value::Null)
    }

    fn spawn_generator(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                let (low, high) = client.task_generation_interval;
                let delay = Duration::from_secs_f64(rand::thread_rng().gen_range(low..=high));
                tokio::time::sleep(delay).await;
                client.generate_task();
            }
        })
    }

    fn generate_task(self: &Arc<Self>) {
        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        self.tasks
            .lock()
            .expect("task table lock poisoned")
            .insert(task_id, ClientTask { created: Instant::now(), done: None });

        let client = self.clone();
        self.engine.send_command(
            self.dispatcher_address,
            Method::AddTask,
            json!({ "task_id": task_id }),
            Box::new(move |address, transmission_id, status| client.add_task_callback(address, transmission_id, task_id, status)),
        );
        log::debug!("submitted task {}", task_id);
    }

    fn add_task_callback(&self, address: NetworkAddress, transmission_id: u64, task_id: i64, status: CommandStatus) {
        match status {
            CommandStatus::Success => log::debug!("task {} accepted by dispatcher", task_id),
            CommandStatus::Failure => log::debug!(
                "failed to hand task {} to {} (transmission {})",
                task_id,
                address,
                transmission_id
            ),
        }
    }

    /// Number of tasks generated so far.
    pub fn created_count(&self) -> usize {
        self.tasks.lock().expect("task table lock poisoned").len()
    }

    /// Number of generated tasks that have received a `notify_task`.
    pub fn solved_count(&self) -> usize {
        self.tasks.lock().expect("task table lock poisoned").values().filter(|task| task.done.is_some()).count()
    }

    /// Logs count created/solved/unsolved and min/avg/max resolution time
    /// (`client.py::print_stat`).
    pub fn print_stat(&self) {
        let tasks = self.tasks.lock().expect("task table lock poisoned");
        let resolutions: Vec<Duration> = tasks
            .values()
            .filter_map(|task| task.done.map(|done| done.duration_since(task.created)))
            .collect();

        let created = tasks.len();
        let solved = resolutions.len();
        log::info!("tasks created: {}", created);
        log::info!("tasks solved: {}", solved);
        log::info!("tasks unsolved: {}", created - solved);

        if solved > 0 {
            let min = resolutions.iter().min().unwrap();
            let max = resolutions.iter().max().unwrap();
            let avg = resolutions.iter().sum::<Duration>() / solved as u32;
            log::info!(
                "min/avg/max resolution: {:.2}/{:.2}/{:.2}s",
                min.as_secs_f64(),
                avg.as_secs_f64(),
                max.as_secs_f64()
            );
        } else {
            log::info!("min/avg/max unavailable: no tasks solved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_transport::{LoopbackNetwork, LoopbackTransportEngine, TransportOptions};

    fn test_client() -> Arc<Client> {
        let network = LoopbackNetwork::new();
        let engine = Arc::new(LoopbackTransportEngine::bind(&network, TransportOptions::default()));
        let settings = ClientSettings {
            dispatcher_address: "127.0.0.1:9000".parse().unwrap(),
            client_port: 0,
            task_generation_interval: (10.0, 10.0),
            max_attempts: 3,
        };
        Client::new(engine, &settings, NetworkAddress::resolve("127.0.0.1:9000").unwrap())
    }

    #[test]
    fn generated_task_counts_as_created_but_not_solved() {
        let client = test_client();
        client.generate_task();
        assert_eq!(client.created_count(), 1);
        assert_eq!(client.solved_count(), 0);
    }

    #[test]
    fn notify_task_marks_the_matching_task_solved() {
        let client = test_client();
        client.generate_task();
        let ack = client.notify_task_handler(json!({ "task_id": 0, "status": "success" }));
        assert_eq!(ack, Some(Value::Null));
        assert_eq!(client.solved_count(), 1);
    }

    #[test]
    fn notify_task_for_an_unknown_id_does_not_panic() {
        let client = test_client();
        let ack = client.notify_task_handler(json!({ "task_id": 999 }));
        assert_eq!(ack, Some(Value::Null));
        assert_eq!(client.solved_count(), 0);
    }
}
