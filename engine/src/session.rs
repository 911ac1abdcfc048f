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

//! Per-connection protocol state.
//!
//! A session owns everything about one connection except the socket: the
//! Telnet codec, the charset pipeline, the output queue, counters, and the
//! negotiation follow-ups. Event loops push raw bytes in with
//! [`Session::feed`] and act on the returned [`SessionAction`]s; which
//! loop model is driving is invisible from here.

use crate::config::EngineConfig;
use crate::outqueue::OutputQueue;
use crate::types::{
    ConnectionId, ConnectionInfo, DisconnectReason, DisconnectRecord, PlayerRef, SessionState,
};
use bytes::{BufMut, Bytes, BytesMut};
use mudnet_charset::{Encoding, LineDecoder, NEGOTIABLE};
use mudnet_telnetcodec::args::{CharsetCmd, EnvironCmd, StartTls, TtypeCmd, WindowSize};
use mudnet_telnetcodec::{
    OptionPolicy, SubArg, TelnetCodec, TelnetEvent, TelnetOption, TelnetSide,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::codec::Decoder;

/// Work the event loop must do on the session's behalf.
#[derive(Debug)]
pub enum SessionAction {
    /// A complete command line, decoded to UTF-8.
    Line(String),
    /// START-TLS agreed; flush output and run the handshake next.
    StartTls,
    /// A protocol event the handler may care about.
    Option(TelnetEvent),
}

/// State for one live connection.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    peer: SocketAddr,
    display_addr: String,
    codec: TelnetCodec,
    line: LineDecoder,
    outqueue: OutputQueue,
    state: SessionState,
    player: Option<PlayerRef>,
    window: Option<WindowSize>,
    terminal: Option<String>,
    tls: bool,
    start_tls_available: bool,
    charset_offered: bool,
    close_reason: Option<DisconnectReason>,
    connected_wall: SystemTime,
    connected_at: Instant,
    last_activity: Instant,
    bytes_in: u64,
    commands: u64,
    quota: u32,
    quota_burst: u32,
    quota_refill: u32,
    last_refill: Instant,
}

impl Session {
    /// A fresh session for an accepted socket.
    ///
    /// `tls` marks a connection that is already inside TLS (dedicated TLS
    /// port); `start_tls_available` whether an upgrade can be offered.
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        tls: bool,
        start_tls_available: bool,
        config: &EngineConfig,
    ) -> Session {
        let now = Instant::now();
        Session {
            id,
            peer,
            display_addr: peer.ip().to_string(),
            codec: TelnetCodec::new(OptionPolicy {
                allow_start_tls: start_tls_available && !tls,
            }),
            line: LineDecoder::new(Encoding::default()),
            outqueue: OutputQueue::new(),
            state: SessionState::Login,
            player: None,
            window: None,
            terminal: None,
            tls,
            start_tls_available,
            charset_offered: false,
            close_reason: None,
            connected_wall: SystemTime::now(),
            connected_at: now,
            last_activity: now,
            bytes_in: 0,
            commands: 0,
            quota: config.command_burst,
            quota_burst: config.command_burst,
            quota_refill: config.commands_per_second,
            last_refill: now,
        }
    }

    /// The connection's id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bound player, if any.
    pub fn player(&self) -> Option<PlayerRef> {
        self.player
    }

    /// Bind a player and move to the connected state.
    pub fn bind_player(&mut self, player: PlayerRef) {
        self.player = Some(player);
        self.state = SessionState::Connected;
    }

    /// The output queue, for service and async write bookkeeping.
    pub fn outqueue(&mut self) -> &mut OutputQueue {
        &mut self.outqueue
    }

    /// Whether any output is waiting.
    pub fn has_output(&self) -> bool {
        !self.outqueue.is_empty()
    }

    /// Whether this session runs inside TLS.
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Mark the transport as upgraded to TLS.
    pub fn set_tls(&mut self) {
        self.tls = true;
    }

    /// Record the resolved hostname.
    pub fn set_display_addr(&mut self, hostname: String) {
        tracing::debug!(id = %self.id, hostname, "hostname resolved");
        self.display_addr = hostname;
    }

    /// Queue the engine's default option offers. Call once, right after
    /// accept.
    pub fn begin_negotiation(&mut self) {
        self.codec
            .offer_initial(self.start_tls_available && !self.tls);
        self.flush_protocol();
    }

    /// Run inbound bytes through the codec and charset pipeline.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SessionAction> {
        self.bytes_in += bytes.len() as u64;
        self.last_activity = Instant::now();
        let mut src = BytesMut::from(bytes);
        let mut actions = Vec::new();
        loop {
            let event = match self.codec.decode(&mut src) {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(id = %self.id, error = %err, "decode error, byte discarded");
                    continue;
                }
            };
            self.handle_event(event, &mut actions);
        }
        self.flush_protocol();
        actions
    }

    fn handle_event(&mut self, event: TelnetEvent, actions: &mut Vec<SessionAction>) {
        match &event {
            TelnetEvent::Data(byte) => {
                self.line.push_byte(*byte);
                return;
            }
            TelnetEvent::EraseChar => {
                self.line.erase_char();
                return;
            }
            TelnetEvent::EndOfLine => {
                self.finish_line(actions);
                return;
            }
            // A bare LF is not a line terminator; CR is.
            TelnetEvent::LineFeed => {
                return;
            }
            TelnetEvent::AreYouThere => {
                self.send_line("[yes]");
                return;
            }
            TelnetEvent::Negotiation {
                side,
                option,
                enabled,
            } => {
                self.on_option_settled(*side, *option, *enabled);
            }
            TelnetEvent::Subnegotiation(arg) => {
                if let Some(action) = self.on_subnegotiation(arg) {
                    actions.push(action);
                }
            }
        }
        actions.push(SessionAction::Option(event));
    }

    fn finish_line(&mut self, actions: &mut Vec<SessionAction>) {
        if self.line.is_truncated() {
            tracing::warn!(id = %self.id, "input line truncated at length cap");
        }
        let text = self.line.take_line();
        if self.state == SessionState::Closing {
            return;
        }
        if !self.take_quota() {
            tracing::warn!(id = %self.id, "command quota exhausted, line dropped");
            return;
        }
        self.commands += 1;
        actions.push(SessionAction::Line(text));
    }

    fn on_option_settled(&mut self, side: TelnetSide, option: TelnetOption, enabled: bool) {
        if !enabled {
            return;
        }
        match (side, option) {
            (TelnetSide::Remote, TelnetOption::TerminalType) => {
                self.codec
                    .queue_subnegotiation(&SubArg::Ttype(TtypeCmd::Send));
            }
            (TelnetSide::Remote, TelnetOption::NewEnviron) => {
                // Empty SEND asks for everything the client will share.
                self.codec
                    .queue_subnegotiation(&SubArg::Environ(EnvironCmd::Send(vec![])));
            }
            (TelnetSide::Local, TelnetOption::Charset) => {
                if !self.charset_offered {
                    self.charset_offered = true;
                    let names = NEGOTIABLE.iter().map(|e| e.label().to_string()).collect();
                    self.codec
                        .queue_subnegotiation(&SubArg::Charset(CharsetCmd::Request(names)));
                }
            }
            _ => {}
        }
    }

    fn on_subnegotiation(&mut self, arg: &SubArg) -> Option<SessionAction> {
        match arg {
            SubArg::Naws(size) => {
                self.window = Some(*size);
            }
            SubArg::Ttype(TtypeCmd::Is(name)) => {
                if self.terminal.is_none() {
                    self.terminal = Some(name.clone());
                }
            }
            SubArg::Ttype(TtypeCmd::Send) => {}
            SubArg::Environ(cmd) | SubArg::OldEnviron(cmd) => {
                if cmd.utf8_locale() && self.line.encoding() != Encoding::Utf8 {
                    tracing::debug!(id = %self.id, "utf-8 locale reported, promoting encoding");
                    self.line.set_encoding(Encoding::Utf8);
                }
            }
            SubArg::Charset(CharsetCmd::Request(names)) => {
                // First mutually supported candidate in the client's order.
                let choice = names.iter().find_map(|name| {
                    Encoding::from_label(name)
                        .filter(|enc| NEGOTIABLE.contains(enc))
                        .map(|enc| (name.clone(), enc))
                });
                match choice {
                    Some((name, encoding)) => {
                        self.codec
                            .queue_subnegotiation(&SubArg::Charset(CharsetCmd::Accepted(name)));
                        self.line.set_encoding(encoding);
                    }
                    None => {
                        self.codec
                            .queue_subnegotiation(&SubArg::Charset(CharsetCmd::Rejected));
                    }
                }
            }
            SubArg::Charset(CharsetCmd::Accepted(name)) => match Encoding::from_label(name) {
                Some(encoding) => self.line.set_encoding(encoding),
                None => {
                    tracing::warn!(id = %self.id, name, "peer accepted a charset we never offered");
                }
            },
            SubArg::Charset(CharsetCmd::Rejected) => {}
            SubArg::StartTls(StartTls) => {
                if self.tls || !self.start_tls_available {
                    tracing::warn!(id = %self.id, "unexpected START-TLS FOLLOWS ignored");
                } else {
                    self.codec.queue_subnegotiation(&SubArg::StartTls(StartTls));
                    return Some(SessionAction::StartTls);
                }
            }
            SubArg::Unknown(option, _) => {
                tracing::debug!(id = %self.id, option = %option, "unhandled subnegotiation");
            }
        }
        None
    }

    /// Move the codec's queued protocol bytes onto the output queue.
    fn flush_protocol(&mut self) {
        if let Some(bytes) = self.codec.take_pending() {
            let _ = self.outqueue.enqueue(bytes);
        }
    }

    /// Queue game text. Encodes to the session charset, escapes IAC, and
    /// appends the network line ending.
    pub fn send_line(&mut self, text: &str) {
        let encoded = self.line.encoding().encode(text);
        let mut wire = BytesMut::with_capacity(encoded.len() + 2);
        for &b in &encoded {
            if b == mudnet_telnetcodec::consts::IAC {
                wire.put_u8(b);
            }
            wire.put_u8(b);
        }
        wire.put_slice(b"\r\n");
        let _ = self.outqueue.enqueue(wire.freeze());
    }

    /// Queue raw, already-framed bytes.
    pub fn send_raw(&mut self, bytes: Bytes) {
        let _ = self.outqueue.enqueue(bytes);
    }

    /// Session charset.
    pub fn encoding(&self) -> Encoding {
        self.line.encoding()
    }

    /// Force the session charset outside CHARSET negotiation. This is how
    /// encodings with no standard wire name, like CP437, get selected.
    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.line.set_encoding(encoding);
    }

    /// Begin closing: the connection dies once output drains.
    pub fn begin_close(&mut self, reason: DisconnectReason) {
        if self.state != SessionState::Closing {
            self.state = SessionState::Closing;
            self.close_reason = Some(reason);
        }
    }

    /// The reason recorded by [`Session::begin_close`].
    pub fn close_reason(&self) -> Option<DisconnectReason> {
        self.close_reason
    }

    /// Drop back to the login screen, keeping the connection. Implements
    /// the logout disconnect reason.
    pub fn recycle(&mut self) {
        tracing::info!(id = %self.id, "session recycled to login");
        self.player = None;
        self.state = SessionState::Login;
        self.close_reason = None;
        let _ = self.line.take_line();
        self.quota = self.quota_burst;
        self.last_activity = Instant::now();
    }

    /// Whether the session has idled past its limit.
    pub fn is_idle(&self, config: &EngineConfig, now: Instant) -> bool {
        let limit = match self.state {
            SessionState::Login => config.unconnected_timeout,
            SessionState::Connected => config.idle_timeout,
            SessionState::Closing => return false,
        };
        now.duration_since(self.last_activity) >= limit
    }

    fn take_quota(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs();
        if elapsed > 0 {
            let refill = (elapsed as u32).saturating_mul(self.quota_refill);
            self.quota = self.quota.saturating_add(refill).min(self.quota_burst);
            self.last_refill = now;
        }
        if self.quota == 0 {
            return false;
        }
        self.quota -= 1;
        true
    }

    /// Snapshot for the handler and status output.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            peer: self.peer,
            display_addr: self.display_addr.clone(),
            encoding: self.line.encoding(),
            window: self.window.map(|w| (w.cols, w.rows)),
            terminal: self.terminal.clone(),
            tls: self.tls,
            state: self.state,
            bytes_in: self.bytes_in,
            bytes_out: self.outqueue.total_written(),
            commands: self.commands,
            connected_at: self.connected_wall,
        }
    }

    /// Final accounting record for disconnect delivery.
    pub fn record(&self, reason: DisconnectReason) -> DisconnectRecord {
        DisconnectRecord {
            id: self.id,
            player: self.player,
            reason,
            peer: self.peer,
            display_addr: self.display_addr.clone(),
            commands: self.commands,
            duration: self.connected_at.elapsed(),
            bytes_in: self.bytes_in,
            bytes_out: self.outqueue.total_written(),
        }
    }

    /// Time since the last inbound activity.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mudnet_telnetcodec::consts::{self, option};
    use std::net::{IpAddr, Ipv4Addr};

    fn session() -> Session {
        let config = EngineConfig::default();
        Session::new(
            ConnectionId(1),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000),
            false,
            false,
            &config,
        )
    }

    fn drain_queue(session: &mut Session) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = session.outqueue().lock_head_for_async() {
            out.extend_from_slice(&chunk);
            let n = chunk.len();
            session.outqueue().complete_async(n);
        }
        out
    }

    #[test]
    fn line_is_delivered_on_crlf() {
        let mut s = session();
        let actions = s.feed(b"look\r\n");
        assert!(matches!(&actions[..], [SessionAction::Line(l)] if l == "look"));
    }

    #[test]
    fn session_debug_includes_the_connection_id() {
        let s = session();
        assert!(format!("{s:?}").contains("ConnectionId(1)"));
    }

    #[test]
    fn bare_lf_does_not_terminate_a_line() {
        let mut s = session();
        let actions = s.feed(b"hello\n");
        assert!(actions.is_empty(), "unexpected actions: {actions:?}");
        let actions = s.feed(b" world\r");
        assert!(matches!(&actions[..], [SessionAction::Line(l)] if l == "hello world"));
    }

    #[test]
    fn erase_char_edits_the_pending_line() {
        let mut s = session();
        let actions = s.feed(b"lok\x08ok\r\n");
        assert!(matches!(&actions[..], [SessionAction::Line(l)] if l == "look"));
    }

    #[test]
    fn charset_request_picks_first_supported_in_client_order() {
        let mut s = session();
        // Enable CHARSET both ways first.
        s.begin_negotiation();
        s.feed(&[consts::IAC, consts::DO, option::CHARSET]);
        s.feed(&[consts::IAC, consts::WILL, option::CHARSET]);
        drain_queue(&mut s);

        let mut wire = vec![consts::IAC, consts::SB, option::CHARSET, 1];
        wire.extend(b";ISO-8859-2;UTF-8");
        wire.extend([consts::IAC, consts::SE]);
        s.feed(&wire);

        assert_eq!(s.encoding(), Encoding::Latin2);
        let out = drain_queue(&mut s);
        let mut expect = vec![consts::IAC, consts::SB, option::CHARSET, 2];
        expect.extend(b"ISO-8859-2");
        expect.extend([consts::IAC, consts::SE]);
        assert_eq!(out, expect);

        // Subsequent input decodes as Latin-2.
        let actions = s.feed(b"\xB9kola\r\n");
        assert!(matches!(&actions[..], [SessionAction::Line(l)] if l == "škola"));
    }

    #[test]
    fn charset_request_with_nothing_usable_is_rejected() {
        let mut s = session();
        s.begin_negotiation();
        s.feed(&[consts::IAC, consts::DO, option::CHARSET]);
        drain_queue(&mut s);

        let mut wire = vec![consts::IAC, consts::SB, option::CHARSET, 1];
        wire.extend(b";KOI8-R");
        wire.extend([consts::IAC, consts::SE]);
        s.feed(&wire);

        assert_eq!(s.encoding(), Encoding::Ascii);
        let out = drain_queue(&mut s);
        assert_eq!(
            out,
            vec![consts::IAC, consts::SB, option::CHARSET, 3, consts::IAC, consts::SE]
        );
    }

    #[test]
    fn will_ttype_draws_do_then_send_request() {
        let mut s = session();
        s.begin_negotiation();
        drain_queue(&mut s);

        s.feed(&[consts::IAC, consts::WILL, option::TTYPE]);
        let out = drain_queue(&mut s);
        // Our DO went out with the initial offers; the acceptance settles
        // silently and the TTYPE SEND follows immediately.
        let expect = vec![consts::IAC, consts::SB, option::TTYPE, 1, consts::IAC, consts::SE];
        assert_eq!(out, expect);
    }

    #[test]
    fn environ_utf8_locale_promotes_encoding() {
        let mut s = session();
        assert_eq!(s.encoding(), Encoding::Ascii);
        let mut wire = vec![consts::IAC, consts::SB, option::NEW_ENVIRON, 0, 0];
        wire.extend(b"LANG");
        wire.push(1);
        wire.extend(b"cs_CZ.UTF-8");
        wire.extend([consts::IAC, consts::SE]);
        s.feed(&wire);
        assert_eq!(s.encoding(), Encoding::Utf8);
    }

    #[test]
    fn naws_updates_window() {
        let mut s = session();
        s.feed(&[
            consts::IAC,
            consts::SB,
            option::NAWS,
            0,
            100,
            0,
            40,
            consts::IAC,
            consts::SE,
        ]);
        assert_eq!(s.info().window, Some((100, 40)));
    }

    #[test]
    fn ayt_answers_inline() {
        let mut s = session();
        s.feed(&[consts::IAC, consts::AYT]);
        assert_eq!(drain_queue(&mut s), b"[yes]\r\n");
    }

    #[test]
    fn send_line_applies_charset_and_iac_escape() {
        let mut s = session();
        s.set_encoding(Encoding::Latin1);
        s.send_line("caf\u{e9}\u{ff}");
        // U+00FF is 0xFF in Latin-1 and must be doubled on the wire.
        assert_eq!(drain_queue(&mut s), b"caf\xe9\xff\xff\r\n");
    }

    #[tracing_test::traced_test]
    #[test]
    fn recycle_returns_to_login_and_keeps_connection() {
        let mut s = session();
        s.bind_player(PlayerRef(42));
        assert_eq!(s.state(), SessionState::Connected);
        s.recycle();
        assert_eq!(s.state(), SessionState::Login);
        assert!(s.player().is_none());
        assert!(logs_contain("session recycled"));
        let actions = s.feed(b"connect guest\r\n");
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn quota_drops_floods_but_refills() {
        let config = EngineConfig::default().with_command_quota(2, 1);
        let mut s = Session::new(
            ConnectionId(7),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000),
            false,
            false,
            &config,
        );
        let actions = s.feed(b"a\r\nb\r\nc\r\n");
        assert_eq!(actions.len(), 2, "third line exceeds the burst");
    }

    #[test]
    fn closing_session_swallows_lines() {
        let mut s = session();
        s.begin_close(DisconnectReason::Booted);
        assert!(s.feed(b"still here\r\n").is_empty());
    }
}
