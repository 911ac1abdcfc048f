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

//! Event loop seam and shared dispatch logic.
//!
//! Two loop models drive the engine; everything that is not raw socket
//! I/O lives in [`EngineCore`] so session and negotiation behavior cannot
//! diverge between them.

use crate::config::{EngineConfig, PortConfig};
use crate::error::EngineResult;
use crate::handler::SessionHandler;
use crate::listener::ListenerSet;
use crate::metrics::EngineMetrics;
use crate::registry::Registry;
use crate::resolver::{ResolveResult, ResolverPool};
use crate::scheduler::{Scheduler, Task};
use crate::session::SessionAction;
use crate::tls::TlsContext;
use crate::types::{ConnectionId, DisconnectReason};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_rustls::server::TlsStream;

/// Ceiling on the loop's sleep so idle sweeps run even with an empty
/// scheduler.
pub(crate) const WAKE_CEILING: Duration = Duration::from_secs(1);

/// Delay before retrying a close that is waiting on output drain.
pub(crate) const CLOSE_RETRY: Duration = Duration::from_millis(250);

/// A running event loop.
#[async_trait]
pub trait EventLoop: Send {
    /// Drive the engine until shutdown. An error return is fatal to the
    /// process.
    async fn run(self: Box<Self>) -> EngineResult<()>;
}

/// External commands accepted while running.
#[derive(Debug)]
pub(crate) enum Control {
    /// Queue raw bytes to one connection.
    Send(ConnectionId, Bytes),
    /// Queue an encoded text line to one connection.
    SendLine(ConnectionId, String),
    /// Bind a connection to a player.
    BindPlayer(ConnectionId, crate::types::PlayerRef),
    /// Disconnect one connection.
    Boot(ConnectionId, DisconnectReason),
    /// Queue a text line to every open connection.
    Broadcast(String),
    /// Re-match the listener set to a new port list.
    ReconfigurePorts(Vec<PortConfig>),
    /// Stop the engine.
    Shutdown,
}

/// I/O completions from helper tasks.
#[derive(Debug)]
pub(crate) enum Completion {
    /// A socket came out of a listener.
    Accepted {
        stream: TcpStream,
        peer: SocketAddr,
        tls: bool,
    },
    /// A TLS-port handshake finished.
    TlsAccepted {
        stream: Box<TlsStream<TcpStream>>,
        peer: SocketAddr,
    },
    /// A START-TLS handshake finished for a live session.
    Upgraded {
        id: ConnectionId,
        stream: Box<TlsStream<TcpStream>>,
    },
    /// A START-TLS handshake failed; the connection is dead.
    UpgradeFailed { id: ConnectionId },
    /// Bytes read from a connection.
    Read { id: ConnectionId, data: Bytes },
    /// Peer closed its end.
    Eof { id: ConnectionId },
    /// Read side failed.
    ReadErr {
        id: ConnectionId,
        kind: io::ErrorKind,
    },
    /// An async write of `n` bytes finished.
    WriteDone { id: ConnectionId, n: usize },
    /// Write side failed.
    WriteErr {
        id: ConnectionId,
        kind: io::ErrorKind,
    },
    /// A listener failed unrecoverably.
    AcceptFatal { error: io::Error },
}

/// What to do with a connection after a close request.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CloseDisposition {
    /// Logout: session recycled, socket stays.
    Recycled,
    /// Output still queued; retry after [`CLOSE_RETRY`].
    DrainThenClose,
    /// Nothing queued; tear the socket down now.
    CloseNow,
    /// No such connection.
    Gone,
}

/// Everything the loops share: registry, collaborators, and the dispatch
/// rules. Wholly owned by the loop task.
pub(crate) struct EngineCore {
    pub config: EngineConfig,
    pub registry: Registry,
    pub handler: Arc<dyn SessionHandler>,
    pub scheduler: Box<dyn Scheduler>,
    pub metrics: Arc<EngineMetrics>,
    pub resolver: ResolverPool,
    pub tls: Option<TlsContext>,
    pub listeners: ListenerSet,
}

impl EngineCore {
    /// Admit an accepted socket: access check, session setup, default
    /// offers, DNS request, handler callback.
    ///
    /// `None` means the peer was refused and the socket should simply be
    /// dropped; the registry is untouched in that case.
    pub(crate) async fn admit(&mut self, peer: SocketAddr, tls: bool) -> Option<ConnectionId> {
        let access = self.config.access.classify(peer.ip());
        if access.forbidden {
            tracing::info!(%peer, "connection refused by site rules");
            self.metrics.connection_refused();
            return None;
        }
        if access.suspect {
            tracing::info!(%peer, "connection from suspect site");
        }
        let id = self.registry.allocate_id();
        let mut session =
            crate::session::Session::new(id, peer, tls, self.tls.is_some(), &self.config);
        session.begin_negotiation();
        let info = session.info();
        self.registry.insert(session);
        self.metrics.connection_accepted();
        self.resolver.request(id, peer.ip());
        tracing::info!(%id, %peer, tls, "connection accepted");
        self.handler.on_connect(id, &info).await;
        Some(id)
    }

    /// Feed inbound bytes to a session.
    pub(crate) fn feed(&mut self, id: ConnectionId, data: &[u8]) -> Vec<SessionAction> {
        self.metrics.add_bytes_in(data.len() as u64);
        match self.registry.get_mut(id) {
            Some(session) => session.feed(data),
            None => Vec::new(),
        }
    }

    /// Deliver non-I/O actions to the handler. Returns true when the
    /// session asked for a START-TLS upgrade.
    pub(crate) async fn deliver(&mut self, id: ConnectionId, actions: Vec<SessionAction>) -> bool {
        let mut upgrade = false;
        for action in actions {
            match action {
                SessionAction::Line(line) => {
                    self.handler.on_line(id, line).await;
                }
                SessionAction::StartTls => upgrade = true,
                SessionAction::Option(event) => {
                    self.handler.on_option(id, &event).await;
                }
            }
        }
        upgrade
    }

    /// Decide how to honor a disconnect request.
    pub(crate) fn begin_close(
        &mut self,
        id: ConnectionId,
        reason: DisconnectReason,
    ) -> CloseDisposition {
        let Some(session) = self.registry.get_mut(id) else {
            return CloseDisposition::Gone;
        };
        if reason.keeps_connection() {
            session.recycle();
            return CloseDisposition::Recycled;
        }
        session.begin_close(reason);
        if session.outqueue().is_empty() {
            CloseDisposition::CloseNow
        } else {
            CloseDisposition::DrainThenClose
        }
    }

    /// Remove a session and deliver its accounting record. Safe to call
    /// twice; the second call is a no-op.
    pub(crate) async fn finish_close(&mut self, id: ConnectionId, fallback: DisconnectReason) {
        let Some(session) = self.registry.remove(id) else {
            return;
        };
        let reason = session.close_reason().unwrap_or(fallback);
        let record = session.record(reason);
        self.metrics.connection_closed();
        tracing::info!(
            %id,
            peer = %record.peer,
            host = %record.display_addr,
            reason = %record.reason,
            commands = record.commands,
            seconds = record.duration.as_secs(),
            bytes_in = record.bytes_in,
            bytes_out = record.bytes_out,
            "connection closed"
        );
        self.handler.on_disconnect(&record).await;
    }

    /// Apply one finished DNS lookup.
    pub(crate) fn apply_dns(&mut self, result: ResolveResult) {
        if let Some(session) = self.registry.get_mut(result.id) {
            session.set_display_addr(result.hostname);
        }
    }

    /// Apply every finished DNS lookup without blocking.
    pub(crate) fn drain_dns(&mut self) {
        for result in self.resolver.drain() {
            self.apply_dns(result);
        }
    }

    /// Pop due scheduler work. Engine tasks come back for the loop to
    /// execute; custom tasks run here.
    pub(crate) fn due_engine_tasks(&mut self, now: Instant) -> Vec<Task> {
        let mut engine = Vec::new();
        for task in self.scheduler.run_due_tasks(now) {
            match task {
                Task::Custom(work) => work(),
                other => engine.push(other),
            }
        }
        engine
    }

    /// Connections idle past their limit.
    pub(crate) fn idle_connections(&self, now: Instant) -> Vec<ConnectionId> {
        self.registry
            .ids()
            .into_iter()
            .filter(|&id| {
                self.registry
                    .get(id)
                    .is_some_and(|s| s.is_idle(&self.config, now))
            })
            .collect()
    }

    /// When the loop should wake at the latest.
    pub(crate) fn next_wake(&self, now: Instant) -> Instant {
        let ceiling = now + WAKE_CEILING;
        match self.scheduler.time_of_next_task() {
            Some(due) => due.min(ceiling),
            None => ceiling,
        }
    }

    /// Schedule a close retry for a draining connection.
    pub(crate) fn defer_close_retry(&mut self, id: ConnectionId) {
        let tag = format!("close-{id}");
        self.scheduler
            .defer_task(Instant::now() + CLOSE_RETRY, &tag, Task::CloseRetry(id));
    }
}

/// Read side helper task for completion-path connections.
///
/// Returns the read half when stopped via the watch channel so the socket
/// can be reunited for a START-TLS upgrade; returns `None` once the
/// stream is finished.
pub(crate) async fn read_task<R>(
    id: ConnectionId,
    mut half: R,
    tx: mpsc::Sender<Completion>,
    mut stop: watch::Receiver<bool>,
) -> Option<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = bytes::BytesMut::with_capacity(8 * 1024);
    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => return Some(half),
            result = half.read_buf(&mut buf) => match result {
                Ok(0) => {
                    let _ = tx.send(Completion::Eof { id }).await;
                    return None;
                }
                Ok(_) => {
                    let data = buf.split().freeze();
                    if tx.send(Completion::Read { id, data }).await.is_err() {
                        return None;
                    }
                }
                Err(err) => {
                    let _ = tx
                        .send(Completion::ReadErr { id, kind: err.kind() })
                        .await;
                    return None;
                }
            },
        }
    }
}

/// Write side helper task for completion-path connections.
///
/// Exits when its channel closes; that is how the dispatch task asks for
/// the write half back.
pub(crate) async fn write_task<W>(
    id: ConnectionId,
    mut half: W,
    mut rx: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<Completion>,
) -> Option<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    while let Some(chunk) = rx.recv().await {
        if let Err(err) = half.write_all(&chunk).await {
            let _ = tx
                .send(Completion::WriteErr { id, kind: err.kind() })
                .await;
            return None;
        }
        if tx
            .send(Completion::WriteDone { id, n: chunk.len() })
            .await
            .is_err()
        {
            return None;
        }
    }
    Some(half)
}

/// Whether an accept error dooms the listener or is routine churn.
pub(crate) fn accept_error_is_fatal(err: &io::Error) -> bool {
    !matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_task_reports_data_then_eof() {
        let half = tokio_test::io::Builder::new().read(b"hello").build();
        let (tx, mut rx) = mpsc::channel(8);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let returned = read_task(ConnectionId(1), half, tx, stop_rx).await;
        assert!(returned.is_none(), "EOF consumes the half");

        match rx.recv().await.unwrap() {
            Completion::Read { id, data } => {
                assert_eq!(id, ConnectionId(1));
                assert_eq!(&data[..], b"hello");
            }
            other => panic!("expected read, got {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), Completion::Eof { .. }));
    }

    #[tokio::test]
    async fn read_task_returns_half_when_stopped() {
        let half = tokio_test::io::Builder::new().build();
        let (tx, _rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();

        let returned = read_task(ConnectionId(2), half, tx, stop_rx).await;
        assert!(returned.is_some(), "stop hands the half back");
    }

    #[tokio::test]
    async fn write_task_reports_done_and_returns_half_on_close() {
        let half = tokio_test::io::Builder::new().write(b"chunk").build();
        let (write_tx, write_rx) = mpsc::channel(1);
        let (tx, mut rx) = mpsc::channel(8);

        write_tx.send(Bytes::from_static(b"chunk")).await.unwrap();
        drop(write_tx);

        let returned = write_task(ConnectionId(3), half, write_rx, tx).await;
        assert!(returned.is_some(), "channel close hands the half back");
        assert!(matches!(
            rx.recv().await.unwrap(),
            Completion::WriteDone { n: 5, .. }
        ));
    }

    #[test]
    fn connection_churn_is_not_a_fatal_accept_error() {
        let churn = io::Error::new(io::ErrorKind::ConnectionAborted, "reset in backlog");
        assert!(!accept_error_is_fatal(&churn));
        let fatal = io::Error::other("out of file descriptors");
        assert!(accept_error_is_fatal(&fatal));
    }
}
