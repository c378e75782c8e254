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
use serde_json::Value;

use crate::{Error, Method, MAX_PAYLOAD_BYTES};

/// Distinguishes a fire-and-forget datagram from a request awaiting a
/// matching response, and a response from one carrying an unused
/// `transmission_id` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketType {
    NoAnswer,
    Request,
    Response,
}

/// A single datagram on the wire.
///
/// `transmission_id` is the correlation id a [`Request`](PacketType::Request)
/// is tagged with and the matching [`Response`](PacketType::Response) echoes
/// back; `no_answer` packets carry none. `params` holds the method's
/// arguments on a request, `result` holds its outcome on a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub packet_type: PacketType,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transmission_id: Option<u64>,

    pub method: Method,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub params: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
}

impl Packet {
    pub fn request(transmission_id: u64, method: Method, params: Value) -> Self {
        Packet {
            packet_type: PacketType::Request,
            transmission_id: Some(transmission_id),
            method,
            params: Some(params),
            result: None,
        }
    }

    pub fn response(transmission_id: u64, method: Method, result: Value) -> Self {
        Packet {
            packet_type: PacketType::Response,
            transmission_id: Some(transmission_id),
            method,
            params: None,
            result: Some(result),
        }
    }

    pub fn no_answer(method: Method, params: Value) -> Self {
        Packet {
            packet_type: PacketType::NoAnswer,
            transmission_id: None,
            method,
            params: Some(params),
            result: None,
        }
    }

    /// Enforces the one cross-field invariant in §3: every packet except
    /// `no_answer` must carry a `transmission_id`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.packet_type != PacketType::NoAnswer && self.transmission_id.is_none() {
            return Err(Error::MissingTransmissionId);
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        self.validate()?;
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_PAYLOAD_BYTES {
            return Err(Error::PayloadTooLarge);
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() > MAX_PAYLOAD_BYTES {
            return Err(Error::PayloadTooLarge);
        }
        let packet: Packet = serde_json::from_slice(bytes)?;
        packet.validate()?;
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_a_request() {
        let packet = Packet::request(42, Method::AddTask, json!({"a": 1, "b": 2}));
        let bytes = packet.encode().unwrap();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(packet, decoded);
    }

    #[test]
    fn no_answer_packets_need_no_transmission_id() {
        let packet = Packet::no_answer(Method::Heartbeat, json!({"state": 0}));
        assert!(packet.validate().is_ok());
        let bytes = packet.encode().unwrap();
        assert!(Packet::decode(&bytes).unwrap().transmission_id.is_none());
    }

    #[test]
    fn rejects_a_request_missing_its_transmission_id() {
        let packet = Packet {
            packet_type: PacketType::Request,
            transmission_id: None,
            method: Method::AddTask,
            params: Some(json!({})),
            result: None,
        };
        assert_eq!(packet.validate(), Err(Error::MissingTransmissionId));
        assert_eq!(packet.encode(), Err(Error::MissingTransmissionId));
    }

    #[test]
    fn rejects_oversized_payloads() {
        let huge = json!({"blob": "x".repeat(MAX_PAYLOAD_BYTES)});
        let packet = Packet::request(1, Method::AddTask, huge);
        assert_eq!(packet.encode(), Err(Error::PayloadTooLarge));
    }

    #[test]
    fn rejects_garbage_bytes() {
        assert!(matches!(Packet::decode(b"not json"), Err(Error::ParseFailure)));
    }
}
