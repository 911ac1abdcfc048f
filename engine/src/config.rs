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

//! Engine configuration.

use crate::access::SiteRules;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// One listening endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    /// Address to bind.
    pub addr: IpAddr,
    /// Port to bind. Zero asks the OS for an ephemeral port.
    pub port: u16,
    /// Whether connections on this port start inside TLS.
    pub tls: bool,
}

impl PortConfig {
    /// A plaintext port on the given address.
    pub fn plain(addr: IpAddr, port: u16) -> Self {
        PortConfig {
            addr,
            port,
            tls: false,
        }
    }

    /// A TLS port on the given address.
    pub fn tls(addr: IpAddr, port: u16) -> Self {
        PortConfig {
            addr,
            port,
            tls: true,
        }
    }
}

/// Which event loop drives the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopModel {
    /// Single-task readiness loop over nonblocking sockets.
    #[default]
    Readiness,
    /// Reader/writer tasks feeding one completion channel.
    Completion,
}

/// Full engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Listening endpoints.
    pub ports: Vec<PortConfig>,
    /// Event loop selection.
    pub loop_model: LoopModel,
    /// Idle limit for connections bound to a player.
    pub idle_timeout: Duration,
    /// Idle limit for connections still at the login screen.
    pub unconnected_timeout: Duration,
    /// Command quota burst per connection.
    pub command_burst: u32,
    /// Quota refill per second.
    pub commands_per_second: u32,
    /// Output bytes queued before the engine considers the peer stalled.
    pub output_high_water: usize,
    /// DNS worker tasks.
    pub dns_workers: usize,
    /// DNS request queue capacity.
    pub dns_queue: usize,
    /// Site access rules, consulted at accept time.
    pub access: SiteRules,
    /// PEM certificate chain for TLS ports and START-TLS.
    pub tls_cert: Option<PathBuf>,
    /// PEM private key matching `tls_cert`.
    pub tls_key: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            ports: vec![PortConfig::plain(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 4201)],
            loop_model: LoopModel::default(),
            idle_timeout: Duration::from_secs(3600),
            unconnected_timeout: Duration::from_secs(300),
            command_burst: 100,
            commands_per_second: 10,
            output_high_water: 1 << 20,
            dns_workers: 2,
            dns_queue: 64,
            access: SiteRules::default(),
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl EngineConfig {
    /// A configuration with defaults and the given ports.
    pub fn new(ports: Vec<PortConfig>) -> Self {
        EngineConfig {
            ports,
            ..Default::default()
        }
    }

    /// Select the event loop model.
    pub fn with_loop_model(mut self, model: LoopModel) -> Self {
        self.loop_model = model;
        self
    }

    /// Set the idle limit for logged-in connections.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the idle limit for login-screen connections.
    pub fn with_unconnected_timeout(mut self, timeout: Duration) -> Self {
        self.unconnected_timeout = timeout;
        self
    }

    /// Set the command quota burst and refill rate.
    pub fn with_command_quota(mut self, burst: u32, per_second: u32) -> Self {
        self.command_burst = burst;
        self.commands_per_second = per_second;
        self
    }

    /// Set the output queue high-water mark in bytes.
    pub fn with_output_high_water(mut self, bytes: usize) -> Self {
        self.output_high_water = bytes;
        self
    }

    /// Size the DNS offload pool.
    pub fn with_dns_pool(mut self, workers: usize, queue: usize) -> Self {
        self.dns_workers = workers;
        self.dns_queue = queue;
        self
    }

    /// Install site access rules.
    pub fn with_access(mut self, access: SiteRules) -> Self {
        self.access = access;
        self
    }

    /// Install TLS material, enabling TLS ports and START-TLS.
    pub fn with_tls(mut self, cert: PathBuf, key: PathBuf) -> Self {
        self.tls_cert = Some(cert);
        self.tls_key = Some(key);
        self
    }
}
