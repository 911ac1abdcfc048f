//
// Copyright 2026 the Mudnet Authors. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! The set of listening sockets.

use crate::config::PortConfig;
use crate::error::{EngineError, EngineResult};
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpListener;

/// One bound listener.
#[derive(Debug)]
pub struct ListenerEntry {
    /// The socket, nonblocking and reuse-addr via tokio.
    pub listener: TcpListener,
    /// The resolved local address, with any ephemeral port filled in.
    pub local: SocketAddr,
    /// Whether accepted connections start inside TLS.
    pub tls: bool,
    /// Reconcile mark; entries left unmarked are closed.
    wanted: bool,
}

/// Bind one endpoint.
pub async fn bind_and_listen(addr: IpAddr, port: u16, tls: bool) -> EngineResult<ListenerEntry> {
    let listener = TcpListener::bind(SocketAddr::new(addr, port)).await?;
    let local = listener.local_addr()?;
    tracing::info!(%local, tls, "listening");
    Ok(ListenerEntry {
        listener,
        local,
        tls,
        wanted: true,
    })
}

/// All live listeners.
#[derive(Debug, Default)]
pub struct ListenerSet {
    entries: Vec<ListenerEntry>,
}

impl ListenerSet {
    /// Bind every configured port.
    ///
    /// Individual failures are logged and skipped; ending up with zero
    /// listeners when at least one was requested is a startup error.
    pub async fn open(ports: &[PortConfig]) -> EngineResult<ListenerSet> {
        let mut entries = Vec::with_capacity(ports.len());
        for port in ports {
            match bind_and_listen(port.addr, port.port, port.tls).await {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    tracing::error!(addr = %port.addr, port = port.port, error = %err, "bind failed");
                }
            }
        }
        if entries.is_empty() && !ports.is_empty() {
            return Err(EngineError::NoListeners);
        }
        Ok(ListenerSet { entries })
    }

    /// Match the live set to a new configuration: close entries no longer
    /// wanted, open newly wanted ones, keep the rest untouched.
    pub async fn reconcile(&mut self, configured: &[PortConfig]) {
        for entry in &mut self.entries {
            entry.wanted = configured.iter().any(|p| {
                entry.local.ip() == p.addr && entry.local.port() == p.port && entry.tls == p.tls
            });
        }
        self.entries.retain(|entry| {
            if !entry.wanted {
                tracing::info!(local = %entry.local, "closing listener");
            }
            entry.wanted
        });
        for port in configured {
            let already = self.entries.iter().any(|entry| {
                entry.local.ip() == port.addr
                    && entry.local.port() == port.port
                    && entry.tls == port.tls
            });
            if already {
                continue;
            }
            match bind_and_listen(port.addr, port.port, port.tls).await {
                Ok(entry) => {
                    // An ephemeral request can resolve onto an address we
                    // already hold; never keep duplicates.
                    if self.entries.iter().any(|e| e.local == entry.local) {
                        continue;
                    }
                    self.entries.push(entry);
                }
                Err(err) => {
                    tracing::error!(addr = %port.addr, port = port.port, error = %err, "bind failed");
                }
            }
        }
    }

    /// The live listeners.
    pub fn entries(&self) -> &[ListenerEntry] {
        &self.entries
    }

    /// Resolved local addresses, for tests and status output.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.entries.iter().map(|e| e.local).collect()
    }

    /// Listener count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No listeners bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn loopback(port: u16) -> PortConfig {
        PortConfig::plain(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[tokio::test]
    async fn open_binds_requested_ports() {
        let set = ListenerSet::open(&[loopback(0), loopback(0)]).await.unwrap();
        assert_eq!(set.len(), 2);
        for addr in set.local_addrs() {
            assert_ne!(addr.port(), 0);
        }
    }

    #[tokio::test]
    async fn open_with_no_ports_is_empty_not_error() {
        let set = ListenerSet::open(&[]).await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn reconcile_closes_unwanted_and_opens_new() {
        let mut set = ListenerSet::open(&[loopback(0)]).await.unwrap();
        let old = set.local_addrs()[0];

        // Keep the existing port, add another.
        let keep = PortConfig::plain(old.ip(), old.port());
        set.reconcile(&[keep.clone(), loopback(0)]).await;
        assert_eq!(set.len(), 2);
        assert!(set.local_addrs().contains(&old));

        // Drop everything but the original.
        set.reconcile(&[keep]).await;
        assert_eq!(set.local_addrs(), vec![old]);
    }
}
