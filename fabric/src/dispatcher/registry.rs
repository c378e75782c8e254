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

use std::time::Instant;

use fabric_proto::{NetworkAddress, TaskUuid, WorkerStateCode};
use indexmap::IndexMap;
use serde_json::Value;

/// Worker record (§3), keyed by worker address. Created on first heartbeat
/// or first directed command.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub state: WorkerStateCode,
    pub last_update: Instant,
}

impl WorkerRecord {
    pub fn new(state: WorkerStateCode) -> Self {
        WorkerRecord { state, last_update: Instant::now() }
    }

    pub fn touch(&mut self) {
        self.last_update = Instant::now();
    }
}

pub type WorkerRegistry = IndexMap<NetworkAddress, WorkerRecord>;

/// Dispatcher-side task state machine (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    AcceptedFromClient,
    SentToCalculator,
    AcceptedForExecutionCalculator,
    ErrorAcceptedCalculator,
    ErrorPlacementTimeout,
    Solved,
    SentToClient,
}

/// Task record (§3), keyed by the structured [`TaskUuid`].
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub client_address: NetworkAddress,
    pub calculator_address: Option<NetworkAddress>,
    pub status: TaskStatus,
    pub task_params: Value,
    pub created: Instant,
}

impl TaskRecord {
    pub fn new(client_address: NetworkAddress, task_params: Value) -> Self {
        TaskRecord {
            client_address,
            calculator_address: None,
            status: TaskStatus::AcceptedFromClient,
            task_params,
            created: Instant::now(),
        }
    }
}

pub type TaskRegistry = IndexMap<TaskUuid, TaskRecord>;
