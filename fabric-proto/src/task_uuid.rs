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

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::Error;

/// The dispatcher-wide task identifier.
///
/// Design Notes §9 flags `"host:port:client_task_id"` as conflating identity
/// with locator; we keep the structured triple as the real key and only
/// serialise it to a string at the wire boundary (`Display`/`FromStr`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskUuid {
    pub client_host: String,
    pub client_port: u16,
    pub client_task_id: i64,
}

impl TaskUuid {
    pub fn new(client_host: impl Into<String>, client_port: u16, client_task_id: i64) -> Self {
        TaskUuid {
            client_host: client_host.into(),
            client_port,
            client_task_id,
        }
    }
}

impl Display for TaskUuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.client_host, self.client_port, self.client_task_id)
    }
}

impl FromStr for TaskUuid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, ':');
        let task_id = parts.next().ok_or(Error::ParseFailure)?;
        let port = parts.next().ok_or(Error::ParseFailure)?;
        let host = parts.next().ok_or(Error::ParseFailure)?;
        Ok(TaskUuid {
            client_host: host.to_string(),
            client_port: port.parse().map_err(|_| Error::ParseFailure)?,
            client_task_id: task_id.parse().map_err(|_| Error::ParseFailure)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let uuid = TaskUuid::new("10.0.0.1", 9001, 7);
        let s = uuid.to_string();
        assert_eq!(s, "10.0.0.1:9001:7");
        assert_eq!(s.parse::<TaskUuid>().unwrap(), uuid);
    }

    #[test]
    fn is_stable_for_repeated_add_task() {
        let a = TaskUuid::new("host", 1, 7);
        let b = TaskUuid::new("host", 1, 7);
        assert_eq!(a, b);
    }
}
