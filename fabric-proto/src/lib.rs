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

//! Wire protocol types shared by the dispatcher, worker and client roles:
//! the [`Packet`] envelope, the [`Method`] and [`WorkerStateCode`] vocabulary,
//! the resolved [`NetworkAddress`] endpoint type, and the structured
//! [`TaskUuid`] task identifier.

mod address;
mod error;
mod method;
mod packet;
mod task_uuid;

pub use address::NetworkAddress;
pub use error::Error;
pub use method::{Method, WorkerStateCode};
pub use packet::{Packet, PacketType};
pub use task_uuid::TaskUuid;

/// Largest encoded packet the transport will send or accept, per §3.
pub const MAX_PAYLOAD_BYTES: usize = 1024;
