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

//! End-to-end tests over real loopback sockets, driving both event loop
//! models through the public API.

use async_trait::async_trait;
use mudnet_engine::{
    ConnectionId, ConnectionInfo, DisconnectReason, DisconnectRecord, EngineConfig, EngineHandle,
    EngineMetrics, LoopModel, NullHandler, PortConfig, Server, SessionHandler, SiteClass,
    SiteRules, Subnet,
};
use mudnet_telnetcodec::consts::{self, option};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[derive(Debug, PartialEq)]
enum Event {
    Connect(ConnectionId),
    Line(ConnectionId, String),
    Disconnect(DisconnectReason),
}

struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
}

#[async_trait]
impl SessionHandler for Recorder {
    async fn on_connect(&self, id: ConnectionId, _info: &ConnectionInfo) {
        let _ = self.tx.send(Event::Connect(id));
    }

    async fn on_line(&self, id: ConnectionId, line: String) {
        let _ = self.tx.send(Event::Line(id, line));
    }

    async fn on_disconnect(&self, record: &DisconnectRecord) {
        let _ = self.tx.send(Event::Disconnect(record.reason));
    }
}

struct Running {
    handle: EngineHandle,
    metrics: Arc<EngineMetrics>,
    addr: SocketAddr,
    join: JoinHandle<mudnet_engine::EngineResult<()>>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn start(model: LoopModel, config: EngineConfig) -> (Running, mpsc::UnboundedReceiver<Event>) {
    init_tracing();
    let (tx, rx) = mpsc::unbounded_channel();
    let server = Server::new(config.with_loop_model(model), Recorder { tx });
    let metrics = server.metrics();
    let bound = server.bind().await.unwrap();
    let addr = bound.local_addrs()[0];
    let handle = bound.handle();
    let join = tokio::spawn(bound.run());
    (
        Running {
            handle,
            metrics,
            addr,
            join,
        },
        rx,
    )
}

fn loopback_config() -> EngineConfig {
    EngineConfig::new(vec![PortConfig::plain(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        0,
    )])
    .with_dns_pool(1, 8)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for handler event")
        .expect("handler channel closed")
}

/// Read the engine's opening negotiation and answer every offer with a
/// refusal, leaving the connection in plain NVT mode.
async fn refuse_greeting(client: &mut TcpStream) {
    let mut greeting = [0u8; 21];
    timeout(Duration::from_secs(5), client.read_exact(&mut greeting))
        .await
        .expect("timed out reading greeting")
        .unwrap();
    let mut refusals = Vec::with_capacity(21);
    for chunk in greeting.chunks(3) {
        assert_eq!(chunk[0], consts::IAC);
        let answer = match chunk[1] {
            consts::WILL => consts::DONT,
            consts::DO => consts::WONT,
            other => panic!("unexpected greeting command {other}"),
        };
        refusals.extend_from_slice(&[consts::IAC, answer, chunk[2]]);
    }
    client.write_all(&refusals).await.unwrap();
}

async fn read_line(client: &mut TcpStream) -> String {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        timeout(Duration::from_secs(5), client.read_exact(&mut byte))
            .await
            .expect("timed out reading line")
            .unwrap();
        line.push(byte[0]);
        if line.ends_with(b"\r\n") {
            line.truncate(line.len() - 2);
            return String::from_utf8(line).unwrap();
        }
    }
}

async fn read_eof(client: &mut TcpStream) {
    let mut buf = [0u8; 64];
    loop {
        let n = timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .expect("timed out waiting for close")
            .unwrap();
        if n == 0 {
            return;
        }
    }
}

async fn negotiate_and_echo(model: LoopModel) {
    let (running, mut rx) = start(model, loopback_config()).await;
    let mut client = TcpStream::connect(running.addr).await.unwrap();

    let id = match next_event(&mut rx).await {
        Event::Connect(id) => id,
        other => panic!("expected connect, got {other:?}"),
    };
    refuse_greeting(&mut client).await;

    client.write_all(b"look around\r\n").await.unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        Event::Line(id, "look around".into())
    );

    // A reply straight after proves no stray negotiation bytes snuck in
    // between the greeting and here.
    running.handle.send_line(id, "You see nothing.").await.unwrap();
    assert_eq!(read_line(&mut client).await, "You see nothing.");

    let snap = running.metrics.snapshot();
    assert_eq!(snap.accepted, 1);
    assert_eq!(snap.active, 1);
    assert!(snap.bytes_in > 0);
    assert!(snap.bytes_out > 0);

    running.handle.shutdown().await.unwrap();
    read_eof(&mut client).await;
    assert_eq!(
        next_event(&mut rx).await,
        Event::Disconnect(DisconnectReason::GameShutdown)
    );
    running.join.await.unwrap().unwrap();
}

#[tokio::test]
async fn readiness_loop_negotiates_and_echoes() {
    negotiate_and_echo(LoopModel::Readiness).await;
}

#[tokio::test]
async fn completion_loop_negotiates_and_echoes() {
    negotiate_and_echo(LoopModel::Completion).await;
}

async fn forbidden_site_is_refused(model: LoopModel) {
    let config = loopback_config().with_access(
        SiteRules::new().with_rule(Subnet::parse("127.0.0.0/8").unwrap(), SiteClass::Forbid),
    );
    let (running, mut rx) = start(model, config).await;

    let mut client = TcpStream::connect(running.addr).await.unwrap();
    read_eof(&mut client).await;

    let snap = running.metrics.snapshot();
    assert_eq!(snap.refused, 1);
    assert_eq!(snap.accepted, 0);
    assert_eq!(snap.active, 0);

    running.handle.shutdown().await.unwrap();
    running.join.await.unwrap().unwrap();
    // The handler never saw the connection.
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn readiness_loop_refuses_forbidden_site() {
    forbidden_site_is_refused(LoopModel::Readiness).await;
}

#[tokio::test]
async fn completion_loop_refuses_forbidden_site() {
    forbidden_site_is_refused(LoopModel::Completion).await;
}

async fn boot_flushes_queued_output(model: LoopModel) {
    let (running, mut rx) = start(model, loopback_config()).await;
    let mut client = TcpStream::connect(running.addr).await.unwrap();

    let id = match next_event(&mut rx).await {
        Event::Connect(id) => id,
        other => panic!("expected connect, got {other:?}"),
    };
    refuse_greeting(&mut client).await;

    running.handle.send_line(id, "You have been booted.").await.unwrap();
    running.handle.boot(id, DisconnectReason::Booted).await.unwrap();

    // The farewell must reach the wire before the socket closes.
    assert_eq!(read_line(&mut client).await, "You have been booted.");
    read_eof(&mut client).await;
    assert_eq!(
        next_event(&mut rx).await,
        Event::Disconnect(DisconnectReason::Booted)
    );

    running.handle.shutdown().await.unwrap();
    running.join.await.unwrap().unwrap();
}

#[tokio::test]
async fn readiness_loop_boot_flushes_queued_output() {
    boot_flushes_queued_output(LoopModel::Readiness).await;
}

#[tokio::test]
async fn completion_loop_boot_flushes_queued_output() {
    boot_flushes_queued_output(LoopModel::Completion).await;
}

async fn logout_keeps_the_socket(model: LoopModel) {
    let (running, mut rx) = start(model, loopback_config()).await;
    let mut client = TcpStream::connect(running.addr).await.unwrap();

    let id = match next_event(&mut rx).await {
        Event::Connect(id) => id,
        other => panic!("expected connect, got {other:?}"),
    };
    refuse_greeting(&mut client).await;

    running
        .handle
        .bind_player(id, mudnet_engine::PlayerRef(7))
        .await
        .unwrap();
    running.handle.boot(id, DisconnectReason::Logout).await.unwrap();

    // The session dropped to the login screen but the wire survived.
    running.handle.send_line(id, "Welcome back.").await.unwrap();
    assert_eq!(read_line(&mut client).await, "Welcome back.");
    assert_eq!(running.metrics.snapshot().active, 1);

    running.handle.shutdown().await.unwrap();
    read_eof(&mut client).await;
    running.join.await.unwrap().unwrap();
}

#[tokio::test]
async fn readiness_loop_logout_keeps_the_socket() {
    logout_keeps_the_socket(LoopModel::Readiness).await;
}

#[tokio::test]
async fn completion_loop_logout_keeps_the_socket() {
    logout_keeps_the_socket(LoopModel::Completion).await;
}

async fn broadcast_reaches_every_client(model: LoopModel) {
    let (running, mut rx) = start(model, loopback_config()).await;
    let mut first = TcpStream::connect(running.addr).await.unwrap();
    let _ = next_event(&mut rx).await;
    refuse_greeting(&mut first).await;
    let mut second = TcpStream::connect(running.addr).await.unwrap();
    let _ = next_event(&mut rx).await;
    refuse_greeting(&mut second).await;

    running.handle.broadcast("The game saves in 5 minutes.").await.unwrap();
    assert_eq!(read_line(&mut first).await, "The game saves in 5 minutes.");
    assert_eq!(read_line(&mut second).await, "The game saves in 5 minutes.");

    running.handle.shutdown().await.unwrap();
    running.join.await.unwrap().unwrap();
}

#[tokio::test]
async fn readiness_loop_broadcast_reaches_every_client() {
    broadcast_reaches_every_client(LoopModel::Readiness).await;
}

#[tokio::test]
async fn completion_loop_broadcast_reaches_every_client() {
    broadcast_reaches_every_client(LoopModel::Completion).await;
}

#[tokio::test]
async fn reconfigure_ports_opens_and_closes_listeners() {
    let (running, _rx) = start(LoopModel::Readiness, loopback_config()).await;

    // Swap the listener set to a fresh ephemeral port. The old port must
    // stop accepting; existing behavior is covered elsewhere.
    running
        .handle
        .reconfigure_ports(vec![PortConfig::plain(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            0,
        )])
        .await
        .unwrap();

    // Give the loop a pass to apply the change, then the old address
    // should refuse new connections.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let old = TcpStream::connect(running.addr).await;
    assert!(old.is_err() || {
        // Some platforms accept into the backlog of a closed listener;
        // reads then fail immediately.
        let mut s = old.unwrap();
        let mut buf = [0u8; 1];
        matches!(s.read(&mut buf).await, Ok(0) | Err(_))
    });

    running.handle.shutdown().await.unwrap();
    running.join.await.unwrap().unwrap();
}

#[tokio::test]
async fn naws_subnegotiation_reaches_the_handler() {
    struct WidthRecorder {
        tx: mpsc::UnboundedSender<(u16, u16)>,
    }

    #[async_trait]
    impl SessionHandler for WidthRecorder {
        async fn on_option(&self, _id: ConnectionId, event: &mudnet_telnetcodec::TelnetEvent) {
            if let mudnet_telnetcodec::TelnetEvent::Subnegotiation(
                mudnet_telnetcodec::SubArg::Naws(size),
            ) = event
            {
                let _ = self.tx.send((size.cols, size.rows));
            }
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = Server::new(loopback_config(), WidthRecorder { tx });
    let bound = server.bind().await.unwrap();
    let addr = bound.local_addrs()[0];
    let handle = bound.handle();
    let join = tokio::spawn(bound.run());

    let mut client = TcpStream::connect(addr).await.unwrap();
    refuse_greeting(&mut client).await;
    // Volunteer NAWS after the refusal; the engine accepts a fresh WILL.
    client
        .write_all(&[consts::IAC, consts::WILL, option::NAWS])
        .await
        .unwrap();
    client
        .write_all(&[
            consts::IAC,
            consts::SB,
            option::NAWS,
            0,
            80,
            0,
            24,
            consts::IAC,
            consts::SE,
        ])
        .await
        .unwrap();

    let size = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for NAWS")
        .unwrap();
    assert_eq!(size, (80, 24));

    handle.shutdown().await.unwrap();
    join.await.unwrap().unwrap();
}

#[tokio::test]
async fn binding_two_ports_resolves_both() {
    let config = EngineConfig::new(vec![
        PortConfig::plain(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        PortConfig::plain(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
    ]);
    let server = Server::new(config, NullHandler);
    let bound = server.bind().await.unwrap();
    let addrs = bound.local_addrs();
    assert_eq!(addrs.len(), 2);
    assert_ne!(addrs[0].port(), 0);
    assert_ne!(addrs[1].port(), 0);
}
