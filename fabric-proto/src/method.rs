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

use serde::{Deserialize, Serialize};

/// The application-level operations carried by a [`crate::Packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    AddTask,
    PerformTask,
    CompletedTask,
    NotifyTask,
    Heartbeat,
    Status,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::AddTask => "add_task",
            Method::PerformTask => "perform_task",
            Method::CompletedTask => "completed_task",
            Method::NotifyTask => "notify_task",
            Method::Heartbeat => "heartbeat",
            Method::Status => "status",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker state codes as carried on the wire (§6): `ready=0, busy=1, not_available=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum WorkerStateCode {
    Ready = 0,
    Busy = 1,
    NotAvailable = 2,
}

impl From<WorkerStateCode> for i64 {
    fn from(code: WorkerStateCode) -> Self {
        code as i64
    }
}

impl TryFrom<i64> for WorkerStateCode {
    type Error = crate::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WorkerStateCode::Ready),
            1 => Ok(WorkerStateCode::Busy),
            2 => Ok(WorkerStateCode::NotAvailable),
            _ => Err(crate::Error::ParseFailure),
        }
    }
}
