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

use std::fmt::{Debug, Display, Formatter};

/// Errors encountered while building, encoding or decoding a [`crate::Packet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `packet_type` was missing or did not match one of the known variants.
    InvalidPacketType,

    /// The packet requires a `transmission_id` (any type other than `no_answer`)
    /// but none was present.
    MissingTransmissionId,

    /// `method` was missing or did not name a known operation.
    UnknownMethod,

    /// The encoded payload would exceed [`crate::MAX_PAYLOAD_BYTES`].
    PayloadTooLarge,

    /// The datagram was not valid UTF-8 / JSON.
    ParseFailure,

    /// An I/O error occurred while transmitting or receiving.
    IoError,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <Self as Debug>::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        Error::IoError
    }
}

impl From<serde_json::Error> for Error {
    fn from(_: serde_json::Error) -> Self {
        Error::ParseFailure
    }
}
