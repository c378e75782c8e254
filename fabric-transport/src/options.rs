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

/// Tunables for a [`crate::TransportEngine`] (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    /// How long the I/O loop blocks on a single receive before running the
    /// next outbound pump tick. Also the de facto pacing interval between
    /// retransmissions of any one command.
    pub timeout: Duration,

    /// Number of transmissions (the first send plus retransmissions) after
    /// which an unacknowledged command's callback fires with `failure`.
    pub max_attempts: u32,
}

impl Default for TransportOptions {
    fn default() -> Self {
        TransportOptions {
            timeout: Duration::from_millis(50),
            max_attempts: 3,
        }
    }
}
