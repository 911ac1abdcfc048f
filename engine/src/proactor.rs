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

//! Completion-driven event loop.
//!
//! An accept task owns the listeners and a pair of helper tasks owns each
//! socket. All of them report finished I/O on one completion channel; a
//! single dispatch task owns every session and never touches a socket
//! directly. Writes run as a chain: one block in flight per connection,
//! the next submitted when `WriteDone` lands.

use crate::error::EngineResult;
use crate::event_loop::{
    accept_error_is_fatal, read_task, write_task, CloseDisposition, Completion, Control,
    EngineCore, EventLoop,
};
use crate::listener::ListenerSet;
use crate::scheduler::Task;
use crate::types::{ConnectionId, DisconnectReason, SessionState};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::poll_fn;
use std::collections::HashMap;
use std::mem;
use std::net::SocketAddr;
use std::task::Poll;
use std::time::Instant;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

type TlsIo = TlsStream<TcpStream>;

/// Helper-task handles for one socket.
struct Pipe<R, W> {
    write_tx: mpsc::Sender<Bytes>,
    /// Length of the block in flight, if any. The queue head stays locked
    /// until its `WriteDone` arrives.
    inflight: Option<usize>,
    stop: watch::Sender<bool>,
    reader: JoinHandle<Option<R>>,
    writer: JoinHandle<Option<W>>,
}

impl<R, W> Pipe<R, W> {
    fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

enum ConnTasks {
    Plain(Pipe<OwnedReadHalf, OwnedWriteHalf>),
    Tls(Pipe<ReadHalf<TlsIo>, WriteHalf<TlsIo>>),
    /// Handshake task in flight.
    Upgrading {
        /// A stale `WriteDone` from the retired writer may still be
        /// queued; it was already accounted for during the upgrade.
        swallow_write_done: bool,
    },
}

pub(crate) struct Proactor {
    core: EngineCore,
    control_rx: mpsc::Receiver<Control>,
    conns: HashMap<ConnectionId, ConnTasks>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    /// Closing this channel stops the accept task.
    reconfigure_tx: Option<mpsc::Sender<Vec<crate::config::PortConfig>>>,
    shutting_down: bool,
}

impl Proactor {
    pub(crate) fn new(mut core: EngineCore, control_rx: mpsc::Receiver<Control>) -> Proactor {
        let (completion_tx, completion_rx) = mpsc::channel(256);
        let (reconfigure_tx, reconfigure_rx) = mpsc::channel(4);
        let listeners = mem::take(&mut core.listeners);
        let acceptor = core.tls.as_ref().map(|ctx| ctx.acceptor().clone());
        tokio::spawn(accept_task(
            listeners,
            reconfigure_rx,
            completion_tx.clone(),
            acceptor,
        ));
        Proactor {
            core,
            control_rx,
            conns: HashMap::new(),
            completion_tx,
            completion_rx,
            reconfigure_tx: Some(reconfigure_tx),
            shutting_down: false,
        }
    }
}

/// Owns the listeners. Accepts sockets, runs TLS-port handshakes, and
/// reports everything as completions. Exits when the reconfigure channel
/// closes.
async fn accept_task(
    mut listeners: ListenerSet,
    mut reconfigure_rx: mpsc::Receiver<Vec<crate::config::PortConfig>>,
    tx: mpsc::Sender<Completion>,
    acceptor: Option<TlsAcceptor>,
) {
    loop {
        let accepted = tokio::select! {
            cmd = reconfigure_rx.recv() => match cmd {
                Some(ports) => {
                    listeners.reconcile(&ports).await;
                    continue;
                }
                None => return,
            },
            accepted = poll_fn(|cx| {
                for entry in listeners.entries() {
                    if let Poll::Ready(result) = entry.listener.poll_accept(cx) {
                        return Poll::Ready((result, entry.tls));
                    }
                }
                Poll::Pending
            }) => accepted,
        };
        match accepted {
            (Ok((stream, peer)), false) => {
                if tx
                    .send(Completion::Accepted {
                        stream,
                        peer,
                        tls: false,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            (Ok((stream, peer)), true) => {
                let Some(acceptor) = acceptor.clone() else {
                    tracing::error!(%peer, "TLS port accept without TLS context");
                    continue;
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            let _ = tx
                                .send(Completion::TlsAccepted {
                                    stream: Box::new(tls_stream),
                                    peer,
                                })
                                .await;
                        }
                        Err(err) => {
                            tracing::warn!(%peer, error = %err, "TLS handshake failed");
                        }
                    }
                });
            }
            (Err(err), _) if accept_error_is_fatal(&err) => {
                tracing::error!(error = %err, "listener failed");
                let _ = tx.send(Completion::AcceptFatal { error: err }).await;
                return;
            }
            (Err(err), _) => {
                tracing::debug!(error = %err, "transient accept error");
            }
        }
    }
}

#[async_trait]
impl EventLoop for Proactor {
    async fn run(mut self: Box<Self>) -> EngineResult<()> {
        tracing::info!("completion loop running");
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
                tracing::info!("completion loop stopped");
                return Ok(());
            }

            let deadline = self.core.next_wake(now);
            tokio::select! {
                biased;
                ctrl = self.control_rx.recv() => match ctrl {
                    Some(ctrl) => self.handle_control(ctrl).await,
                    None => self.begin_shutdown().await,
                },
                Some(comp) = self.completion_rx.recv() => {
                    self.handle_completion(comp).await?;
                }
                _ = tokio::time::sleep_until(deadline.into()) => {}
            }
        }
    }
}

impl Proactor {
    async fn handle_completion(&mut self, comp: Completion) -> EngineResult<()> {
        match comp {
            Completion::Accepted { stream, peer, .. } => {
                self.handle_accept(stream, peer).await;
            }
            Completion::TlsAccepted { stream, peer } => {
                self.handle_tls_accept(*stream, peer).await;
            }
            Completion::Read { id, data } => {
                let actions = self.core.feed(id, &data);
                let upgrade = self.core.deliver(id, actions).await;
                if upgrade {
                    self.start_upgrade(id).await;
                }
                self.ensure_write(id);
                self.finish_if_drained(id).await;
            }
            Completion::Eof { id } => {
                self.close_now(id, DisconnectReason::Unspecified).await;
            }
            Completion::ReadErr { id, kind } => {
                tracing::debug!(%id, ?kind, "read failed");
                self.close_now(id, DisconnectReason::NetFailure).await;
            }
            Completion::WriteDone { id, n } => {
                if let Some(ConnTasks::Upgrading { swallow_write_done }) = self.conns.get_mut(&id)
                {
                    if *swallow_write_done {
                        *swallow_write_done = false;
                        return Ok(());
                    }
                }
                self.core.metrics.add_bytes_out(n as u64);
                if let Some(session) = self.core.registry.get_mut(id) {
                    session.outqueue().complete_async(n);
                }
                match self.conns.get_mut(&id) {
                    Some(ConnTasks::Plain(pipe)) => pipe.inflight = None,
                    Some(ConnTasks::Tls(pipe)) => pipe.inflight = None,
                    _ => {}
                }
                self.ensure_write(id);
                self.finish_if_drained(id).await;
            }
            Completion::WriteErr { id, kind } => {
                tracing::debug!(%id, ?kind, "write failed");
                self.close_now(id, DisconnectReason::NetFailure).await;
            }
            Completion::Upgraded { id, stream } => {
                self.install_tls(id, *stream);
                if let Some(session) = self.core.registry.get_mut(id) {
                    session.set_tls();
                }
                self.ensure_write(id);
            }
            Completion::UpgradeFailed { id } => {
                self.conns.remove(&id);
                self.core
                    .finish_close(id, DisconnectReason::NetFailure)
                    .await;
            }
            Completion::AcceptFatal { error } => {
                tracing::error!(error = %error, "listener failed");
                return Err(error.into());
            }
        }
        Ok(())
    }

    async fn handle_accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        if self.shutting_down {
            return;
        }
        let Some(id) = self.core.admit(peer, false).await else {
            return;
        };
        let (read_half, write_half) = stream.into_split();
        let pipe = self.spawn_pipe(id, read_half, write_half);
        self.conns.insert(id, ConnTasks::Plain(pipe));
        self.ensure_write(id);
    }

    async fn handle_tls_accept(&mut self, stream: TlsIo, peer: SocketAddr) {
        if self.shutting_down {
            return;
        }
        let Some(id) = self.core.admit(peer, true).await else {
            return;
        };
        let (read_half, write_half) = tokio::io::split(stream);
        let pipe = self.spawn_pipe(id, read_half, write_half);
        self.conns.insert(id, ConnTasks::Tls(pipe));
        self.ensure_write(id);
    }

    fn spawn_pipe<R, W>(&self, id: ConnectionId, read_half: R, write_half: W) -> Pipe<R, W>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (write_tx, write_rx) = mpsc::channel(1);
        let reader = tokio::spawn(read_task(id, read_half, self.completion_tx.clone(), stop_rx));
        let writer = tokio::spawn(write_task(
            id,
            write_half,
            write_rx,
            self.completion_tx.clone(),
        ));
        Pipe {
            write_tx,
            inflight: None,
            stop: stop_tx,
            reader,
            writer,
        }
    }

    /// Submit the next queued block to the writer when none is in flight.
    fn ensure_write(&mut self, id: ConnectionId) {
        let Some(session) = self.core.registry.get_mut(id) else {
            return;
        };
        let (write_tx, inflight) = match self.conns.get_mut(&id) {
            Some(ConnTasks::Plain(pipe)) => (&pipe.write_tx, &mut pipe.inflight),
            Some(ConnTasks::Tls(pipe)) => (&pipe.write_tx, &mut pipe.inflight),
            _ => return,
        };
        if inflight.is_some() {
            return;
        }
        let Some(chunk) = session.outqueue().lock_head_for_async() else {
            return;
        };
        let n = chunk.len();
        match write_tx.try_send(chunk) {
            Ok(()) => *inflight = Some(n),
            Err(_) => {
                session.outqueue().complete_async(0);
            }
        }
    }

    /// Close the socket once a closing session has drained.
    async fn finish_if_drained(&mut self, id: ConnectionId) {
        let drained = self
            .core
            .registry
            .get(id)
            .is_some_and(|s| s.state() == SessionState::Closing && !s.has_output());
        let inflight = match self.conns.get(&id) {
            Some(ConnTasks::Plain(pipe)) => pipe.inflight.is_some(),
            Some(ConnTasks::Tls(pipe)) => pipe.inflight.is_some(),
            _ => false,
        };
        if drained && !inflight {
            self.close_now(id, DisconnectReason::Unspecified).await;
        }
    }

    /// Reclaim the socket from its helper tasks, flush the queue, and hand
    /// it to a handshake task.
    async fn start_upgrade(&mut self, id: ConnectionId) {
        let Some(ctx) = &self.core.tls else {
            tracing::warn!(%id, "START-TLS requested without TLS context");
            return;
        };
        let acceptor = ctx.acceptor().clone();
        let Some(ConnTasks::Plain(pipe)) = self.conns.remove(&id) else {
            return;
        };
        let _ = pipe.stop.send(true);
        let Pipe {
            write_tx,
            inflight,
            reader,
            writer,
            ..
        } = pipe;
        // Closing the write channel makes the writer finish its block and
        // return the half.
        drop(write_tx);
        let (read_half, write_half) = match (reader.await, writer.await) {
            (Ok(Some(r)), Ok(Some(w))) => (r, w),
            _ => {
                // A read or write failure beat the upgrade.
                self.close_now(id, DisconnectReason::NetFailure).await;
                return;
            }
        };
        let mut swallow = false;
        if let Some(session) = self.core.registry.get_mut(id) {
            // The writer finished the in-flight block before exiting; its
            // WriteDone is still in the completion queue.
            if let Some(n) = inflight {
                session.outqueue().complete_async(n);
                self.core.metrics.add_bytes_out(n as u64);
                swallow = true;
            }
        }
        let Ok(mut stream) = read_half.reunite(write_half) else {
            self.core
                .finish_close(id, DisconnectReason::NetFailure)
                .await;
            return;
        };
        // The FOLLOWS reply and anything behind it must reach the wire
        // before the handshake starts.
        if let Some(session) = self.core.registry.get_mut(id) {
            while let Some(chunk) = session.outqueue().lock_head_for_async() {
                if let Err(err) = stream.write_all(&chunk).await {
                    tracing::debug!(%id, error = %err, "flush before handshake failed");
                    self.core
                        .finish_close(id, DisconnectReason::NetFailure)
                        .await;
                    return;
                }
                session.outqueue().complete_async(chunk.len());
                self.core.metrics.add_bytes_out(chunk.len() as u64);
            }
        }
        self.conns.insert(
            id,
            ConnTasks::Upgrading {
                swallow_write_done: swallow,
            },
        );
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
        let pipe = self.spawn_pipe(id, read_half, write_half);
        self.conns.insert(id, ConnTasks::Tls(pipe));
    }

    async fn handle_control(&mut self, ctrl: Control) {
        match ctrl {
            Control::Send(id, bytes) => {
                if let Some(session) = self.core.registry.get_mut(id) {
                    session.send_raw(bytes);
                }
                self.ensure_write(id);
            }
            Control::SendLine(id, line) => {
                if let Some(session) = self.core.registry.get_mut(id) {
                    session.send_line(&line);
                }
                self.ensure_write(id);
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
                    self.ensure_write(id);
                }
            }
            Control::ReconfigurePorts(ports) => {
                if let Some(tx) = &self.reconfigure_tx {
                    if tx.send(ports).await.is_err() {
                        tracing::error!("accept task is gone; cannot reconfigure ports");
                    }
                }
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
        // Stops the accept task.
        self.reconfigure_tx = None;
        for id in self.core.registry.ids() {
            self.request_close(id, DisconnectReason::GameShutdown).await;
        }
    }

    async fn handle_task(&mut self, task: Task) {
        match task {
            Task::CloseRetry(id) => {
                if self.core.registry.get(id).is_some_and(|s| s.has_output()) {
                    self.ensure_write(id);
                    self.core.defer_close_retry(id);
                    return;
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
                self.ensure_write(id);
                self.core.defer_close_retry(id);
            }
        }
    }

    async fn close_now(&mut self, id: ConnectionId, reason: DisconnectReason) {
        match self.conns.remove(&id) {
            Some(ConnTasks::Plain(pipe)) => pipe.abort(),
            Some(ConnTasks::Tls(pipe)) => pipe.abort(),
            _ => {}
        }
        self.core.finish_close(id, reason).await;
    }
}
