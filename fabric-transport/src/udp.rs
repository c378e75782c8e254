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
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use fabric_proto::{Error, Method, NetworkAddress, Packet, PacketType, MAX_PAYLOAD_BYTES};
use serde_json::Value;
use tokio::net::UdpSocket;

use crate::engine::{BoxFuture, CommandCallback, CommandStatus, HandlerCallback, TransportEngine};
use crate::options::TransportOptions;
use crate::outstanding::{self, OutstandingTable};

/// A [`TransportEngine`] backed by a real `tokio::net::UdpSocket`.
pub struct UdpTransportEngine {
    socket: UdpSocket,
    options: TransportOptions,
    table: OutstandingTable,
    handler: Mutex<Option<HandlerCallback>>,
    next_transmission_id: AtomicU64,
    stopped: AtomicBool,
}

impl UdpTransportEngine {
    /// Binds a datagram socket at `bind_address` (§4.1 `construct`).
    pub async fn bind(bind_address: SocketAddr, options: TransportOptions) -> Result<Self, Error> {
        let socket = UdpSocket::bind(bind_address).await?;
        Ok(UdpTransportEngine {
            socket,
            options,
            table: outstanding::new_table(),
            handler: Mutex::new(None),
            next_transmission_id: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn next_transmission_id(&self) -> u64 {
        self.next_transmission_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn run(&self) {
        let mut buf = vec![0u8; MAX_PAYLOAD_BYTES];

        while !self.stopped.load(Ordering::Acquire) {
            let result = outstanding::pump_tick(&self.table, self.options.max_attempts);

            if let Some((addr, bytes)) = result.transmit {
                if let Err(error) = self.socket.send_to(&bytes, addr).await {
                    log::warn!("transmit to {} failed: {}", addr, error);
                }
            }

            for (addr, transmission_id, callback) in result.exhausted {
                outstanding::invoke(&callback, addr.into(), transmission_id, CommandStatus::Failure);
            }

            match tokio::time::timeout(self.options.timeout, self.socket.recv_from(&mut buf)).await {
                Ok(Ok((len, addr))) => self.handle_inbound(&buf[..len], addr).await,
                Ok(Err(error)) => log::warn!("recv_from failed: {}", error),
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
                    if let Err(error) = self.socket.send_to(&bytes, addr).await {
                        log::warn!("failed to send response to {}: {}", addr, error);
                    }
                }
                Err(error) => log::error!("failed to encode response to {}: {}", addr, error),
            }
        }
    }
}

impl TransportEngine for UdpTransportEngine {
    fn serve_forever(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.run())
    }

    fn shutdown(&self, immediate: bool) {
        log::info!("shutting down transport (immediate={})", immediate);
        self.stopped.store(true, Ordering::Release);
    }

    fn send_command(&self, address: NetworkAddress, method: Method, params: Value, callback: CommandCallback) {
        let transmission_id = self.next_transmission_id();
        outstanding::insert(&self.table, address.socket_addr(), transmission_id, method, params, callback);
    }

    fn send_command_without_confirmation(&self, address: NetworkAddress, method: Method, params: Value) {
        let packet = Packet::no_answer(method, params);
        match packet.encode() {
            Ok(bytes) => match self.socket.try_send_to(&bytes, address.socket_addr()) {
                Ok(_) => {}
                Err(error) => log::warn!("unacknowledged send to {} dropped: {}", address, error),
            },
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
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn round_trips_a_command_against_itself() {
        let engine = Arc::new(
            UdpTransportEngine::bind("127.0.0.1:0".parse().unwrap(), TransportOptions::default())
                .await
                .unwrap(),
        );
        let addr = NetworkAddress::from(engine.local_addr().unwrap());

        engine.add_handler_request(Box::new(|_addr, _packet| Some(json!({"ok": true}))));

        let loop_engine = engine.clone();
        let handle = tokio::spawn(async move { loop_engine.serve_forever().await });

        let successes = Arc::new(AtomicU32::new(0));
        let counted = successes.clone();
        engine.send_command(
            addr,
            Method::Status,
            json!({}),
            Box::new(move |_addr, _id, status| {
                if status == CommandStatus::Success {
                    counted.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        engine.shutdown(false);
        let _ = handle.await;

        assert_eq!(successes.load(Ordering::SeqCst), 1);
    }
}
