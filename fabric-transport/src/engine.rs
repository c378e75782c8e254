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

use std::future::Future;
use std::pin::Pin;

use fabric_proto::{Method, NetworkAddress, Packet};
use serde_json::Value;

/// Outcome delivered to a [`send_command`](TransportEngine::send_command)
/// callback, exactly once, per §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure,
}

/// `callback(address, transmission_id, status)`, invoked exactly once.
pub type CommandCallback = Box<dyn Fn(NetworkAddress, u64, CommandStatus) + Send + Sync>;

/// The single registered inbound handler: `callback(address, message)`.
/// A `Some` return becomes the `result` of a `response` sent back for
/// `request` packets; it is ignored for `no_answer` packets.
pub type HandlerCallback = Box<dyn Fn(NetworkAddress, Packet) -> Option<Value> + Send + Sync>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The capability contract shared by every transport backend (Design Notes
/// §9): `serve_forever`, `shutdown`, `send_command`,
/// `send_command_without_confirmation`, `add_handler_request`. The rest of
/// the system (dispatcher, worker, client) depends only on this trait, so a
/// loopback backend can stand in for tests without the rest of the code
/// noticing.
pub trait TransportEngine: Send + Sync {
    /// Runs the I/O loop until [`shutdown`](Self::shutdown) is called. Each
    /// tick pumps at most one outstanding command, then attempts a receive
    /// within the configured timeout.
    fn serve_forever(&self) -> BoxFuture<'_, ()>;

    /// Stops the loop and releases the underlying socket/channel.
    /// `immediate` has no transport-level meaning; it is threaded through so
    /// callers (e.g. the worker) can record that in-flight completions were
    /// abandoned.
    fn shutdown(&self, immediate: bool);

    /// Enqueues an acknowledged command. Returns immediately; `callback`
    /// fires exactly once with `success` or `failure`.
    fn send_command(&self, address: NetworkAddress, method: Method, params: Value, callback: CommandCallback);

    /// Sends a `no_answer` packet once, with no retry and no callback.
    /// Socket errors are logged and swallowed.
    fn send_command_without_confirmation(&self, address: NetworkAddress, method: Method, params: Value);

    /// Installs the single inbound request handler, replacing any previous
    /// one.
    fn add_handler_request(&self, handler: HandlerCallback);
}
