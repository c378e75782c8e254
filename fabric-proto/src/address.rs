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
use std::net::{SocketAddr, ToSocketAddrs};

use crate::Error;

/// A resolved `(host, port)` endpoint.
///
/// Hostnames are resolved to numeric form once, at construction, per
/// Design §9 — this is what lets a reply's source address compare equal to
/// the address a command was originally sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkAddress(SocketAddr);

impl NetworkAddress {
    /// Resolves `host_port` (anything implementing [`ToSocketAddrs`], e.g.
    /// `"127.0.0.1:9000"` or `"localhost:9000"`) to its numeric form.
    pub fn resolve(host_port: impl ToSocketAddrs) -> Result<Self, Error> {
        host_port
            .to_socket_addrs()?
            .next()
            .map(NetworkAddress)
            .ok_or(Error::IoError)
    }

    pub fn host(&self) -> String {
        self.0.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for NetworkAddress {
    fn from(addr: SocketAddr) -> Self {
        NetworkAddress(addr)
    }
}

impl Display for NetworkAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_stable() {
        let a = NetworkAddress::resolve("127.0.0.1:9000").unwrap();
        let b = NetworkAddress::resolve("127.0.0.1:9000").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.port(), 9000);
    }
}
