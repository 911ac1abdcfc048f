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

//! Shared connection types.

use mudnet_charset::Encoding;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

/// Opaque connection identity. Monotonic, never reused for the lifetime
/// of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl ConnectionId {
    /// The raw id, for logs and the game layer.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A reference to a game-layer player bound to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerRef(pub u64);

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// No better reason known.
    Unspecified,
    /// The player quit cleanly.
    Quit,
    /// Idle past the configured limit.
    IdleTimeout,
    /// Kicked by an administrator or the game layer.
    Booted,
    /// The socket failed mid-session.
    NetFailure,
    /// The whole game is shutting down.
    GameShutdown,
    /// Too many failed login attempts.
    LoginRetryLimit,
    /// Logins are administratively disabled.
    LoginsDisabled,
    /// Logged out back to the login screen; the connection survives.
    Logout,
    /// The game is at its connection cap.
    GameFull,
    /// Engine restart; sockets are preserved or dropped by the restart
    /// machinery, not by the session.
    Restart,
}

impl DisconnectReason {
    /// Stable label used in accounting logs.
    pub fn label(self) -> &'static str {
        match self {
            DisconnectReason::Unspecified => "unspecified",
            DisconnectReason::Quit => "quit",
            DisconnectReason::IdleTimeout => "idle timeout",
            DisconnectReason::Booted => "booted",
            DisconnectReason::NetFailure => "network failure",
            DisconnectReason::GameShutdown => "game shutdown",
            DisconnectReason::LoginRetryLimit => "login retry limit",
            DisconnectReason::LoginsDisabled => "logins disabled",
            DisconnectReason::Logout => "logout",
            DisconnectReason::GameFull => "game full",
            DisconnectReason::Restart => "restart",
        }
    }

    /// Logout recycles the connection instead of closing it.
    pub fn keeps_connection(self) -> bool {
        self == DisconnectReason::Logout
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, not yet bound to a player.
    Login,
    /// Bound to a player and playing.
    Connected,
    /// Disconnect decided; waiting for the output queue to drain.
    Closing,
}

/// Point-in-time snapshot of one connection, safe to hand across tasks.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// The connection's id.
    pub id: ConnectionId,
    /// Peer socket address.
    pub peer: SocketAddr,
    /// Resolved hostname when DNS has answered, else the numeric address.
    pub display_addr: String,
    /// Session charset.
    pub encoding: Encoding,
    /// Last reported NAWS dimensions, when the client sent any.
    pub window: Option<(u16, u16)>,
    /// Negotiated terminal type, when the client reported one.
    pub terminal: Option<String>,
    /// Whether the transport is TLS.
    pub tls: bool,
    /// Lifecycle state.
    pub state: SessionState,
    /// Bytes received from the peer.
    pub bytes_in: u64,
    /// Bytes queued toward the peer.
    pub bytes_out: u64,
    /// Complete lines delivered to the game layer.
    pub commands: u64,
    /// Wall-clock time the connection was accepted.
    pub connected_at: SystemTime,
}

/// Final accounting for a finished connection, handed to the handler
/// exactly once.
#[derive(Debug, Clone)]
pub struct DisconnectRecord {
    /// The connection that ended.
    pub id: ConnectionId,
    /// Player bound at disconnect time, if any.
    pub player: Option<PlayerRef>,
    /// Why it ended.
    pub reason: DisconnectReason,
    /// Peer socket address.
    pub peer: SocketAddr,
    /// Resolved hostname or numeric address.
    pub display_addr: String,
    /// Commands executed over the whole session.
    pub commands: u64,
    /// Session duration.
    pub duration: Duration,
    /// Bytes received from the peer.
    pub bytes_in: u64,
    /// Bytes written toward the peer.
    pub bytes_out: u64,
}
