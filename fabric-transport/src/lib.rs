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

//! The reliable, callback-delivered command transport described in §4.1:
//! a correlation-ID-based ack/retransmit engine with bounded attempts, used
//! identically by the dispatcher, worker and client roles.

mod engine;
mod options;
mod outstanding;

pub mod loopback;
pub mod udp;

pub use engine::{BoxFuture, CommandCallback, CommandStatus, HandlerCallback, TransportEngine};
pub use loopback::{LoopbackNetwork, LoopbackTransportEngine};
pub use options::TransportOptions;
pub use udp::UdpTransportEngine;
