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

//! Readiness-driven event loop.
//!
//! One task owns every socket. Each pass polls listeners and connections
//! for readiness and moves bytes with `try_read`/`try_write`; `WouldBlock`
//! just means "again on the next readiness". TLS sessions are the
//! exception: rustls offers no nonblocking try-API, so they ride helper
//! reader/writer tasks feeding the completion channel, with all state
//! still mutated here.

use crate::error::EngineResult;
use crate::event_loop::{
    accept_error_is_fatal, read_task, write_task, CloseDisposition, Completion, Control,
    EngineCore, EventLoop,
};
use crate::listener::ListenerSet;
use crate::registry::Registry;
use crate::scheduler::Task;
use crate::types::{ConnectionId, DisconnectReason};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::poll_fn;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_rustls::server::TlsStream;

type TlsIo = TlsStream<TcpStream>;

/// Cap on consecutive `try_read` calls against one socket.
const READ_ROUNDS: usize = 16;

/// Transport state for one connection.
enum Conn {
    /// Plaintext socket, readiness-driven.
    Plain(TcpStream),
    /// TLS socket behind helper tasks.
    Tls(TlsConn),
    /// Handshake task in flight; no socket to poll.
    Upgrading,
}

struct TlsConn {
    write_tx: mpsc::Sender<Bytes>,
    /// One async write outstanding; the queue head is locked meanwhile.
    inflight: bool,
    /// Held so the reader's stop channel stays open for the lifetime of
    /// the connection.
    _stop: watch::Sender<bool>,
    reader: JoinHandle<Option<ReadHalf<TlsIo>>>,
    writer: JoinHandle<Option<WriteHalf<TlsIo>>>,
}

impl TlsConn {
    fn abort(&self) {
        // Helper tasks die before their socket halves drop.
        self.reader.abort();
        self.writer.abort();
    }
}

/// Something a readiness pass found to do.
enum Wire {
    Incoming {
        result: io::Result<(TcpStream, SocketAddr)>,
        tls: bool,
    },
    Readable(ConnectionId),
    Writable(ConnectionId),
}

pub(crate) struct Reactor {
    core: EngineCore,
    control_rx: mpsc::Receiver<Control>,
    conns: HashMap<ConnectionId, Conn>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    shutting_down: bool,
}

impl Reactor {
    pub(crate) fn new(core: EngineCore, control_rx: mpsc::Receiver<Control>) -> Reactor {
        let (completion_tx, completion_rx) = mpsc::channel(256);
        Reactor {
            core,
            control_rx,
            conns: HashMap::new(),
            completion_tx,
            completion_rx,
            shutting_down: false,
        }
    }
}

#[async_trait]
impl EventLoop for Reactor {
    async fn run(mut self: Box<Self>) -> EngineResult<()> {
        tracing::info!("readiness loop running");
        loop {
            let now = Instant::now();
            for task in self.core.due_engine_tasks(now) {
                self.handle_task(task).await;
            }
            for id in self.core.idle_connections(now) {
                tracing::info!(%id, "idle timeout");
                self.request_close(id, DisconnectReason::IdleTimeout).await;
            }
            self.core.drain_dns();
            if self.shutting_down && self.conns.is_empty() {
                tracing::info!("readiness loop stopped");
                return Ok(());
            }

            let deadline = self.core.next_wake(now);
            enum Step {
                Control(Option<Control>),
                Completion(Completion),
                Wire(Wire),
                Tick,
            }
            let step = {
                let Reactor {
                    core,
                    control_rx,
                    conns,
                    completion_rx,
                    ..
                } = &mut *self;
                tokio::select! {
                    biased;
                    ctrl = control_rx.recv() => Step::Control(ctrl),
                    Some(comp) = completion_rx.recv() => Step::Completion(comp),
                    wire = poll_fn(|cx| {
                        poll_wire(&core.listeners, &core.registry, conns, cx)
                    }) => Step::Wire(wire),
                    _ = tokio::time::sleep_until(deadline.into()) => Step::Tick,
                }
            };
            match step {
                Step::Control(None) => {
                    // Every handle dropped; nothing can reach us anymore.
                    self.begin_shutdown().await;
                }
                Step::Control(Some(ctrl)) => self.handle_control(ctrl).await,
                Step::Completion(comp) => self.handle_completion(comp).await,
                Step::Wire(wire) => self.handle_wire(wire).await?,
                Step::Tick => {}
            }
        }
    }
}

/// Poll every listener and plaintext socket for one actionable readiness.
fn poll_wire(
    listeners: &ListenerSet,
    registry: &Registry,
    conns: &HashMap<ConnectionId, Conn>,
    cx: &mut Context<'_>,
) -> Poll<Wire> {
    for entry in listeners.entries() {
        if let Poll::Ready(result) = entry.listener.poll_accept(cx) {
            return Poll::Ready(Wire::Incoming {
                result,
                tls: entry.tls,
            });
        }
    }
    for (&id, conn) in conns {
        let Conn::Plain(stream) = conn else { continue };
        let wants_write = registry.get(id).is_some_and(|s| s.has_output());
        if wants_write && stream.poll_write_ready(cx).is_ready() {
            return Poll::Ready(Wire::Writable(id));
        }
        if stream.poll_read_ready(cx).is_ready() {
            return Poll::Ready(Wire::Readable(id));
        }
    }
    Poll::Pending
}

impl Reactor {
    async fn handle_wire(&mut self, wire: Wire) -> EngineResult<()> {
        match wire {
            Wire::Incoming { result, tls } => match result {
                Ok((stream, peer)) => {
                    self.handle_accept(stream, peer, tls).await;
                    Ok(())
                }
                Err(err) if accept_error_is_fatal(&err) => {
                    tracing::error!(error = %err, "listener failed");
                    Err(err.into())
                }
                Err(err) => {
                    tracing::debug!(error = %err, "transient accept error");
                    Ok(())
                }
            },
            Wire::Readable(id) => {
                self.handle_readable(id).await;
                Ok(())
            }
            Wire::Writable(id) => {
                self.service_plain(id).await;
                Ok(())
            }
        }
    }

    async fn handle_accept(&mut self, stream: TcpStream, peer: SocketAddr, tls: bool) {
        if self.shutting_down {
            return;
        }
        let Some(id) = self.core.admit(peer, tls).await else {
            // Refused: dropping the socket closes it.
            return;
        };
        if tls {
            let Some(ctx) = &self.core.tls else {
                tracing::error!(%id, "TLS port accept without TLS context");
                self.core.finish_close(id, DisconnectReason::NetFailure).await;
                return;
            };
            self.conns.insert(id, Conn::Upgrading);
            let acceptor = ctx.acceptor().clone();
            let tx = self.completion_tx.clone();
            tokio::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        let _ = tx
                            .send(Completion::Upgraded {
                                id,
                                stream: Box::new(tls_stream),
                            })
                            .await;
                    }
                    Err(err) => {
                        tracing::warn!(%id, error = %err, "TLS handshake failed");
                        let _ = tx.send(Completion::UpgradeFailed { id }).await;
                    }
                }
            });
        } else {
            self.conns.insert(id, Conn::Plain(stream));
            // The default offers are already queued; get them moving.
            self.service_plain(id).await;
        }
    }

    async fn handle_readable(&mut self, id: ConnectionId) {
        let mut data = Vec::new();
        let mut outcome: Option<DisconnectReason> = None;
        if let Some(Conn::Plain(stream)) = self.conns.get_mut(&id) {
            let mut buf = [0u8; 4096];
            // Bounded rounds so one chatty peer cannot starve the rest.
            for _ in 0..READ_ROUNDS {
                match stream.try_read(&mut buf) {
                    Ok(0) => {
                        outcome = Some(DisconnectReason::Unspecified);
                        break;
                    }
                    Ok(n) => data.extend_from_slice(&buf[..n]),
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) => {
                        tracing::debug!(%id, error = %err, "read failed");
                        outcome = Some(DisconnectReason::NetFailure);
                        break;
                    }
                }
            }
        } else {
            return;
        }
        if !data.is_empty() {
            let actions = self.core.feed(id, &data);
            let upgrade = self.core.deliver(id, actions).await;
            if upgrade {
                self.start_upgrade(id).await;
            }
        }
        match outcome {
            Some(reason) => self.close_now(id, reason).await,
            None => self.service_plain(id).await,
        }
    }

    /// Drain the plaintext output queue as far as the socket allows.
    async fn service_plain(&mut self, id: ConnectionId) {
        let Some(Conn::Plain(stream)) = self.conns.get_mut(&id) else {
            self.ensure_tls_write(id);
            self.finish_if_drained(id).await;
            return;
        };
        let Some(session) = self.core.registry.get_mut(id) else {
            return;
        };
        match session.outqueue().service(stream) {
            Ok(n) if n > 0 => self.core.metrics.add_bytes_out(n as u64),
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(%id, error = %err, "write failed");
                self.close_now(id, DisconnectReason::NetFailure).await;
                return;
            }
        }
        self.finish_if_drained(id).await;
    }

    /// Submit the next block to a TLS writer task when none is in flight.
    fn ensure_tls_write(&mut self, id: ConnectionId) {
        let Some(Conn::Tls(tls)) = self.conns.get_mut(&id) else {
            return;
        };
        if tls.inflight {
            return;
        }
        let Some(session) = self.core.registry.get_mut(id) else {
            return;
        };
        let Some(chunk) = session.outqueue().lock_head_for_async() else {
            return;
        };
        match tls.write_tx.try_send(chunk) {
            Ok(()) => tls.inflight = true,
            Err(_) => {
                // Writer gone or busy; unlock with no progress.
                session.outqueue().complete_async(0);
            }
        }
    }

    /// Close the socket once a closing session has drained.
    async fn finish_if_drained(&mut self, id: ConnectionId) {
        let drained = self.core.registry.get(id).is_some_and(|s| {
            s.state() == crate::types::SessionState::Closing && !s.has_output()
        });
        let inflight = matches!(self.conns.get(&id), Some(Conn::Tls(t)) if t.inflight);
        if drained && !inflight {
            self.close_now(id, DisconnectReason::Unspecified).await;
        }
    }

    async fn handle_completion(&mut self, comp: Completion) {
        match comp {
            Completion::Read { id, data } => {
                let actions = self.core.feed(id, &data);
                // TLS sessions never upgrade again; the codec refuses.
                let _ = self.core.deliver(id, actions).await;
                self.ensure_tls_write(id);
                self.finish_if_drained(id).await;
            }
            Completion::Eof { id } => self.close_now(id, DisconnectReason::Unspecified).await,
            Completion::ReadErr { id, kind } => {
                tracing::debug!(%id, ?kind, "TLS read failed");
                self.close_now(id, DisconnectReason::NetFailure).await;
            }
            Completion::WriteDone { id, n } => {
                self.core.metrics.add_bytes_out(n as u64);
                if let Some(session) = self.core.registry.get_mut(id) {
                    session.outqueue().complete_async(n);
                }
                if let Some(Conn::Tls(tls)) = self.conns.get_mut(&id) {
                    tls.inflight = false;
                }
                self.ensure_tls_write(id);
                self.finish_if_drained(id).await;
            }
            Completion::WriteErr { id, kind } => {
                tracing::debug!(%id, ?kind, "TLS write failed");
                self.close_now(id, DisconnectReason::NetFailure).await;
            }
            Completion::Upgraded { id, stream } => {
                self.install_tls(id, *stream);
                if let Some(session) = self.core.registry.get_mut(id) {
                    session.set_tls();
                }
                self.ensure_tls_write(id);
            }
            Completion::UpgradeFailed { id } => {
                self.conns.remove(&id);
                self.core.finish_close(id, DisconnectReason::NetFailure).await;
            }
            Completion::Accepted { .. } | Completion::TlsAccepted { .. } => {
                // Only the completion loop produces these.
                tracing::error!("unexpected accept completion on readiness loop");
            }
            Completion::AcceptFatal { error } => {
                tracing::error!(error = %error, "unexpected accept failure completion");
            }
        }
    }

    /// Flush, then hand the socket to a handshake task.
    async fn start_upgrade(&mut self, id: ConnectionId) {
        let Some(ctx) = &self.core.tls else {
            tracing::warn!(%id, "START-TLS requested without TLS context");
            return;
        };
        let acceptor = ctx.acceptor().clone();
        let Some(Conn::Plain(mut stream)) = self.conns.remove(&id) else {
            return;
        };
        // The FOLLOWS reply and anything queued behind it must precede
        // the handshake bytes.
        if let Some(session) = self.core.registry.get_mut(id) {
            while let Some(chunk) = session.outqueue().lock_head_for_async() {
                if let Err(err) = stream.write_all(&chunk).await {
                    tracing::debug!(%id, error = %err, "flush before handshake failed");
                    self.core.finish_close(id, DisconnectReason::NetFailure).await;
                    return;
                }
                session.outqueue().complete_async(chunk.len());
                self.core.metrics.add_bytes_out(chunk.len() as u64);
            }
        }
        self.conns.insert(id, Conn::Upgrading);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            match acceptor.accept(stream).await {
                Ok(tls_stream) => {
                    let _ = tx
                        .send(Completion::Upgraded {
                            id,
                            stream: Box::new(tls_stream),
                        })
                        .await;
                }
                Err(err) => {
                    tracing::warn!(%id, error = %err, "START-TLS handshake failed");
                    let _ = tx.send(Completion::UpgradeFailed { id }).await;
                }
            }
        });
    }

    fn install_tls(&mut self, id: ConnectionId, stream: TlsIo) {
        let (read_half, write_half) = tokio::io::split(stream);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (write_tx, write_rx) = mpsc::channel(1);
        let reader = tokio::spawn(read_task(id, read_half, self.completion_tx.clone(), stop_rx));
        let writer = tokio::spawn(write_task(
            id,
            write_half,
            write_rx,
            self.completion_tx.clone(),
        ));
        self.conns.insert(
            id,
            Conn::Tls(TlsConn {
                write_tx,
                inflight: false,
                _stop: stop_tx,
                reader,
                writer,
            }),
        );
    }

    async fn handle_control(&mut self, ctrl: Control) {
        match ctrl {
            Control::Send(id, bytes) => {
                if let Some(session) = self.core.registry.get_mut(id) {
                    session.send_raw(bytes);
                }
                self.service_plain(id).await;
            }
            Control::SendLine(id, line) => {
                if let Some(session) = self.core.registry.get_mut(id) {
                    session.send_line(&line);
                }
                self.service_plain(id).await;
            }
            Control::BindPlayer(id, player) => {
                if let Some(session) = self.core.registry.get_mut(id) {
                    session.bind_player(player);
                }
            }
            Control::Boot(id, reason) => self.request_close(id, reason).await,
            Control::Broadcast(line) => {
                for id in self.core.registry.ids() {
                    if let Some(session) = self.core.registry.get_mut(id) {
                        session.send_line(&line);
                    }
                    self.service_plain(id).await;
                }
            }
            Control::ReconfigurePorts(ports) => {
                self.core.listeners.reconcile(&ports).await;
            }
            Control::Shutdown => self.begin_shutdown().await,
        }
    }

    async fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        tracing::info!("shutdown requested");
        for id in self.core.registry.ids() {
            self.request_close(id, DisconnectReason::GameShutdown).await;
        }
    }

    async fn handle_task(&mut self, task: Task) {
        match task {
            Task::CloseRetry(id) => {
                let still_queued = self.core.registry.get(id).is_some_and(|s| s.has_output());
                if still_queued {
                    // Give the drain one more service attempt, then wait
                    // again.
                    self.service_plain(id).await;
                    if self.core.registry.get(id).is_some_and(|s| s.has_output()) {
                        self.core.defer_close_retry(id);
                        return;
                    }
                }
                if self.core.registry.get(id).is_some() {
                    self.close_now(id, DisconnectReason::Unspecified).await;
                }
            }
            Task::Boot(id, reason) => self.request_close(id, reason).await,
            Task::Custom(work) => work(),
        }
    }

    async fn request_close(&mut self, id: ConnectionId, reason: DisconnectReason) {
        match self.core.begin_close(id, reason) {
            CloseDisposition::Recycled | CloseDisposition::Gone => {}
            CloseDisposition::CloseNow => self.close_now(id, reason).await,
            CloseDisposition::DrainThenClose => {
                self.service_plain(id).await;
                if self.core.registry.get(id).is_some() {
                    self.core.defer_close_retry(id);
                }
            }
        }
    }

    async fn close_now(&mut self, id: ConnectionId, reason: DisconnectReason) {
        match self.conns.remove(&id) {
            Some(Conn::Tls(tls)) => tls.abort(),
            Some(Conn::Plain(mut stream)) => {
                // Closing with unread input in the kernel buffer turns the
                // close into an RST, which can destroy a farewell still in
                // flight. Drain what is buffered, then FIN.
                let mut scratch = [0u8; 512];
                for _ in 0..READ_ROUNDS {
                    match stream.try_read(&mut scratch) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                let _ = stream.shutdown().await;
            }
            _ => {}
        }
        self.core.finish_close(id, reason).await;
    }
}
