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

use std::net::SocketAddr;
use std::sync::Mutex;

use fabric_proto::{Method, Packet};
use indexmap::IndexMap;
use serde_json::Value;

use crate::engine::{CommandCallback, CommandStatus};

/// One in-flight `request` awaiting its `response` (§3 "Outstanding command").
pub(crate) struct OutstandingCommand {
    pub(crate) address: SocketAddr,
    pub(crate) transmission_id: u64,
    pub(crate) method: Method,
    pub(crate) params: Value,
    pub(crate) callback: CommandCallback,
    pub(crate) attempts: u32,
}

/// Keyed by `(resolved_host, port, transmission_id)`; an [`IndexMap`] so the
/// outbound pump can always pick "the oldest in insertion order" (§4.1).
pub(crate) type OutstandingTable = Mutex<IndexMap<(SocketAddr, u64), OutstandingCommand>>;

pub(crate) fn new_table() -> OutstandingTable {
    Mutex::new(IndexMap::new())
}

pub(crate) fn insert(
    table: &OutstandingTable,
    address: SocketAddr,
    transmission_id: u64,
    method: Method,
    params: Value,
    callback: CommandCallback,
) {
    let command = OutstandingCommand {
        address,
        transmission_id,
        method,
        params,
        callback,
        attempts: 0,
    };
    table
        .lock()
        .expect("outstanding table lock poisoned")
        .insert((address, transmission_id), command);
}

/// Ack processing (§4.1): look up `(address, transmission_id)`, remove it and
/// hand back its callback for the caller to invoke with `success` outside the
/// lock. Absent entries (unsolicited responses) yield `None` and are dropped.
pub(crate) fn take_for_ack(
    table: &OutstandingTable,
    address: SocketAddr,
    transmission_id: u64,
) -> Option<CommandCallback> {
    table
        .lock()
        .expect("outstanding table lock poisoned")
        .shift_remove(&(address, transmission_id))
        .map(|command| command.callback)
}

/// The result of one outbound pump tick: at most one command serialised for
/// transmission, plus any commands that exhausted `max_attempts` this tick
/// (their callbacks are returned for the caller to invoke outside the lock).
pub(crate) struct PumpResult {
    pub(crate) transmit: Option<(SocketAddr, Vec<u8>)>,
    pub(crate) exhausted: Vec<(SocketAddr, u64, CommandCallback)>,
}

/// Processes **at most one** outstanding command per tick (§4.1's "Outbound
/// pump"): the oldest entry either gets retransmitted, or — if it has already
/// exhausted `max_attempts` — is dropped and its callback queued for
/// `failure`. Any other entries already past `max_attempts` are swept out in
/// the same pass so they don't linger across ticks.
pub(crate) fn pump_tick(table: &OutstandingTable, max_attempts: u32) -> PumpResult {
    let mut guard = table.lock().expect("outstanding table lock poisoned");

    let mut exhausted_keys = Vec::new();
    let mut transmit = None;

    for (key, command) in guard.iter_mut() {
        if command.attempts >= max_attempts {
            exhausted_keys.push(*key);
            continue;
        }
        if transmit.is_none() {
            let packet = Packet::request(command.transmission_id, command.method, command.params.clone());
            if let Ok(bytes) = packet.encode() {
                command.attempts += 1;
                transmit = Some((command.address, bytes));
            } else {
                log::warn!("failed to encode outstanding command {:?}, dropping", key);
                exhausted_keys.push(*key);
            }
            break;
        }
    }

    let mut exhausted = Vec::with_capacity(exhausted_keys.len());
    for key in exhausted_keys {
        if let Some(command) = guard.shift_remove(&key) {
            exhausted.push((command.address, command.transmission_id, command.callback));
        }
    }

    PumpResult { transmit, exhausted }
}

/// Invokes a `send_command` callback inside an exception barrier (§4.1):
/// a panicking application callback is logged and swallowed rather than
/// unwinding into the transport's `run()` loop (§7 "callback exception").
pub(crate) fn invoke(
    callback: &CommandCallback,
    address: fabric_proto::NetworkAddress,
    transmission_id: u64,
    status: CommandStatus,
) {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        (callback)(address, transmission_id, status)
    }));
    if outcome.is_err() {
        log::error!(
            "command callback panicked for {} (transmission {}), status {:?}",
            address,
            transmission_id,
            status
        );
    }
}
