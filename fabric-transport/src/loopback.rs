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

use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use fabric_proto::{Method, NetworkAddress, Packet, PacketType, MAX_PAYLOAD_BYTES};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::engine::{BoxFuture, CommandCallback, CommandStatus, HandlerCallback, TransportEngine};
use crate::options::TransportOptions;
use crate::outstanding::{self, OutstandingTable};

/// Shared in-process medium every [`LoopbackTransportEngine`] in a test
/// registers with, playing the role a real link layer plays for
/// [`crate::UdpTransportEngine`] — grounded on `async-coap`'s channel-backed
/// `LoopbackSocket`/`NullSocket`, generalized from a single self-loop to a
/// many-node fabric so a dispatcher/worker/client trio can be wired up
/// without a socket.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    nodes: Arc<Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>>>>,
    next_port: Arc<AtomicU16>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        LoopbackNetwork {
            nodes: Arc::new(Mutex::new(HashMap::new())),
            next_port: Arc::new(AtomicU16::new(1)),
        }
    }

    fn register(&self) -> (SocketAddr, mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>) {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.nodes.lock().expect("loopback registry lock poisoned").insert(addr, sender);
        (addr, receiver)
    }

    fn send(&self, from: SocketAddr, to: SocketAddr, bytes: Vec<u8>) -> Result<(), ()> {
        let nodes = self.nodes.lock().expect("loopback registry lock poisoned");
        match nodes.get(&to) {
            Some(sender) => sender.send((from, bytes)).map_err(|_| ()),
            None => Err(()),
        }
    }
}

/// A [`TransportEngine`] that exchanges datagrams through a [`LoopbackNetwork`]
/// instead of a real socket, for deterministic tests of the §8 end-to-end
/// scenarios.
pub struct LoopbackTransportEngine {
    network: LoopbackNetwork,
    local_addr: SocketAddr,
    inbound: Mutex<mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>>,
    options: TransportOptions,
    table: OutstandingTable,
    handler: Mutex<Option<HandlerCallback>>,
    next_transmission_id: AtomicU64,
    stopped: AtomicBool,
}

impl LoopbackTransportEngine {
    pub fn bind(network: &LoopbackNetwork, options: TransportOptions) -> Self {
        let (local_addr, inbound) = network.register();
        LoopbackTransportEngine {
            network: network.clone(),
            local_addr,
            inbound: Mutex::new(inbound),
            options,
            table: outstanding::new_table(),
            handler: Mutex::new(None),
            next_transmission_id: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn next_transmission_id(&self) -> u64 {
        self.next_transmission_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn run(&self) {
        while !self.stopped.load(Ordering::Acquire) {
            let result = outstanding::pump_tick(&self.table, self.options.max_attempts);

            if let Some((addr, bytes)) = result.transmit {
                if self.network.send(self.local_addr, addr, bytes).is_err() {
                    log::warn!("transmit to {} failed: peer not registered", addr);
                }
            }

            for (addr, transmission_id, callback) in result.exhausted {
                outstanding::invoke(&callback, addr.into(), transmission_id, CommandStatus::Failure);
            }

            let received = {
                let mut guard = self.inbound.lock().expect("inbound lock poisoned");
                tokio::time::timeout(self.options.timeout, guard.recv()).await
            };

            match received {
                Ok(Some((addr, bytes))) => self.handle_inbound(&bytes, addr).await,
                Ok(None) => break,
                Err(_elapsed) => {}
            }
        }
    }

    async fn handle_inbound(&self, bytes: &[u8], addr: SocketAddr) {
        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(error) => {
                log::debug!("dropping malformed datagram from {}: {}", addr, error);
                return;
            }
        };

        if packet.packet_type == PacketType::Response {
            let Some(transmission_id) = packet.transmission_id else {
                return;
            };
            match outstanding::take_for_ack(&self.table, addr, transmission_id) {
                Some(callback) => {
                    outstanding::invoke(&callback, addr.into(), transmission_id, CommandStatus::Success)
                }
                None => log::debug!(
                    "unsolicited response from {} for transmission {}, dropping",
                    addr,
                    transmission_id
                ),
            }
            return;
        }

        let outcome = {
            let guard = self.handler.lock().expect("handler lock poisoned");
            match guard.as_ref() {
                Some(handler) => {
                    std::panic::catch_unwind(AssertUnwindSafe(|| (handler)(addr.into(), packet.clone())))
                }
                None => Ok(None),
            }
        };

        let result = match outcome {
            Ok(result) => result,
            Err(_payload) => {
                log::error!("inbound handler panicked on {} from {}, no ack sent", packet.method, addr);
                return;
            }
        };

        if packet.packet_type == PacketType::Request {
            let Some(transmission_id) = packet.transmission_id else {
                return;
            };
            let response = Packet::response(transmission_id, packet.method, result.unwrap_or(Value::Null));
            match response.encode() {
                Ok(bytes) => {
                    if self.network.send(self.local_addr, addr, bytes).is_err() {
                        log::warn!("failed to send response to {}: peer not registered", addr);
                    }
                }
                Err(error) => log::error!("failed to encode response to {}: {}", addr, error),
            }
        }
    }
}

impl TransportEngine for LoopbackTransportEngine {
    fn serve_forever(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.run())
    }

    fn shutdown(&self, immediate: bool) {
        log::info!("shutting down loopback transport (immediate={})", immediate);
        self.stopped.store(true, Ordering::Release);
    }

    fn send_command(&self, address: NetworkAddress, method: Method, params: Value, callback: CommandCallback) {
        let transmission_id = self.next_transmission_id();
        outstanding::insert(&self.table, address.socket_addr(), transmission_id, method, params, callback);
    }

    fn send_command_without_confirmation(&self, address: NetworkAddress, method: Method, params: Value) {
        let packet = Packet::no_answer(method, params);
        match packet.encode() {
            Ok(bytes) => {
                if bytes.len() > MAX_PAYLOAD_BYTES {
                    log::warn!("unacknowledged command to {} exceeds payload limit, dropped", address);
                } else if self.network.send(self.local_addr, address.socket_addr(), bytes).is_err() {
                    log::warn!("unacknowledged send to {} dropped: peer not registered", address);
                }
            }
            Err(error) => log::warn!("failed to encode unacknowledged command to {}: {}", address, error),
        }
    }

    fn add_handler_request(&self, handler: HandlerCallback) {
        *self.handler.lock().expect("handler lock poisoned") = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn delivers_a_command_between_two_nodes() {
        let network = LoopbackNetwork::new();
        let server = Arc::new(LoopbackTransportEngine::bind(&network, TransportOptions::default()));
        let client = Arc::new(LoopbackTransportEngine::bind(&network, TransportOptions::default()));
        let server_addr = NetworkAddress::from(server.local_addr());

        server.add_handler_request(Box::new(|_addr, _packet| Some(json!({"status": 0}))));

        let server_task = server.clone();
        let server_handle = tokio::spawn(async move { server_task.serve_forever().await });
        let client_task = client.clone();
        let client_handle = tokio::spawn(async move { client_task.serve_forever().await });

        let successes = Arc::new(AtomicU32::new(0));
        let counted = successes.clone();
        client.send_command(
            server_addr,
            Method::Status,
            json!({}),
            Box::new(move |_addr, _id, status| {
                if status == CommandStatus::Success {
                    counted.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        server.shutdown(false);
        client.shutdown(false);
        let _ = server_handle.await;
        let _ = client_handle.await;

        assert_eq!(successes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_callback_fires_when_peer_never_registers() {
        let network = LoopbackNetwork::new();
        let client = Arc::new(LoopbackTransportEngine::bind(
            &network,
            TransportOptions { max_attempts: 1, timeout: std::time::Duration::from_millis(5) },
        ));
        let unknown = NetworkAddress::from(SocketAddr::from(([127, 0, 0, 1], 65000)));

        let client_task = client.clone();
        let handle = tokio::spawn(async move { client_task.serve_forever().await });

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let collected = statuses.clone();
        client.send_command(
            unknown,
            Method::Status,
            json!({}),
            Box::new(move |_addr, _id, status| collected.lock().unwrap().push(status)),
        );

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        client.shutdown(false);
        let _ = handle.await;

        assert_eq!(*statuses.lock().unwrap(), vec![CommandStatus::Failure]);
    }
}
