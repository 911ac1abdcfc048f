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

//! Engine assembly and the public control surface.

use crate::config::{EngineConfig, LoopModel, PortConfig};
use crate::error::{EngineError, EngineResult};
use crate::event_loop::{Control, EngineCore, EventLoop};
use crate::handler::SessionHandler;
use crate::listener::ListenerSet;
use crate::metrics::EngineMetrics;
use crate::proactor::Proactor;
use crate::reactor::Reactor;
use crate::registry::Registry;
use crate::resolver::ResolverPool;
use crate::scheduler::{Scheduler, TaskQueue};
use crate::tls::TlsContext;
use crate::types::{ConnectionId, DisconnectReason, PlayerRef};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Cloneable handle for driving a running engine from other tasks.
///
/// Every method queues a command on the engine's control channel; the
/// engine applies it on its next loop pass.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Control>,
}

impl EngineHandle {
    async fn command(&self, ctrl: Control) -> EngineResult<()> {
        self.tx
            .send(ctrl)
            .await
            .map_err(|_| EngineError::ChannelClosed { name: "control" })
    }

    /// Queue raw, already-framed bytes to one connection.
    pub async fn send(&self, id: ConnectionId, bytes: Bytes) -> EngineResult<()> {
        self.command(Control::Send(id, bytes)).await
    }

    /// Queue a text line to one connection, encoded per its charset.
    pub async fn send_line(&self, id: ConnectionId, line: impl Into<String>) -> EngineResult<()> {
        self.command(Control::SendLine(id, line.into())).await
    }

    /// Bind a connection to a player, moving it to the connected state.
    pub async fn bind_player(&self, id: ConnectionId, player: PlayerRef) -> EngineResult<()> {
        self.command(Control::BindPlayer(id, player)).await
    }

    /// Disconnect one connection for the given reason.
    pub async fn boot(&self, id: ConnectionId, reason: DisconnectReason) -> EngineResult<()> {
        self.command(Control::Boot(id, reason)).await
    }

    /// Queue a text line to every open connection.
    pub async fn broadcast(&self, line: impl Into<String>) -> EngineResult<()> {
        self.command(Control::Broadcast(line.into())).await
    }

    /// Re-match the listener set to a new port list without touching
    /// established connections.
    pub async fn reconfigure_ports(&self, ports: Vec<PortConfig>) -> EngineResult<()> {
        self.command(Control::ReconfigurePorts(ports)).await
    }

    /// Ask the engine to stop. Open connections are booted with
    /// [`DisconnectReason::GameShutdown`] and the loop exits once they
    /// drain.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.command(Control::Shutdown).await
    }
}

/// The engine, before its sockets exist.
pub struct Server {
    config: EngineConfig,
    handler: Arc<dyn SessionHandler>,
    scheduler: Box<dyn Scheduler>,
    metrics: Arc<EngineMetrics>,
    control_tx: mpsc::Sender<Control>,
    control_rx: mpsc::Receiver<Control>,
}

impl Server {
    /// Assemble an engine from a configuration and a session handler.
    pub fn new<H>(config: EngineConfig, handler: H) -> Server
    where
        H: SessionHandler + 'static,
    {
        let (control_tx, control_rx) = mpsc::channel(256);
        Server {
            config,
            handler: Arc::new(handler),
            scheduler: Box::new(TaskQueue::new()),
            metrics: Arc::new(EngineMetrics::default()),
            control_tx,
            control_rx,
        }
    }

    /// Replace the default task queue with a custom scheduler.
    pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler>) -> Server {
        self.scheduler = scheduler;
        self
    }

    /// A handle for driving the engine once it runs.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.control_tx.clone(),
        }
    }

    /// Shared counters, readable from any task.
    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Bind listeners, load TLS material, and start the DNS pool.
    ///
    /// Split from [`BoundServer::run`] so callers can learn the resolved
    /// addresses, which matters when ports were configured as zero.
    pub async fn bind(self) -> EngineResult<BoundServer> {
        let tls = match (&self.config.tls_cert, &self.config.tls_key) {
            (Some(cert), Some(key)) => Some(TlsContext::load(cert, key)?),
            (None, None) => None,
            _ => {
                return Err(EngineError::Tls {
                    reason: "certificate and key must be configured together".into(),
                })
            }
        };
        if tls.is_none() && self.config.ports.iter().any(|p| p.tls) {
            return Err(EngineError::Tls {
                reason: "a TLS port is configured but no TLS material is".into(),
            });
        }
        let listeners = ListenerSet::open(&self.config.ports).await?;
        let resolver = ResolverPool::start(
            self.config.dns_workers,
            self.config.dns_queue,
            Arc::clone(&self.metrics),
        );
        let loop_model = self.config.loop_model;
        let core = EngineCore {
            config: self.config,
            registry: Registry::new(),
            handler: self.handler,
            scheduler: self.scheduler,
            metrics: self.metrics,
            resolver,
            tls,
            listeners,
        };
        Ok(BoundServer {
            core,
            control_tx: self.control_tx,
            control_rx: self.control_rx,
            loop_model,
        })
    }
}

/// The engine with sockets bound, ready to run.
pub struct BoundServer {
    core: EngineCore,
    control_tx: mpsc::Sender<Control>,
    control_rx: mpsc::Receiver<Control>,
    loop_model: LoopModel,
}

impl BoundServer {
    /// Resolved listener addresses.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.core.listeners.local_addrs()
    }

    /// A handle for driving the running engine.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.control_tx.clone(),
        }
    }

    /// Shared counters, readable from any task.
    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.core.metrics)
    }

    /// Drive the engine until shutdown.
    pub async fn run(self) -> EngineResult<()> {
        let event_loop: Box<dyn EventLoop> = match self.loop_model {
            LoopModel::Readiness => Box::new(Reactor::new(self.core, self.control_rx)),
            LoopModel::Completion => Box::new(Proactor::new(self.core, self.control_rx)),
        };
        event_loop.run().await
    }
}
