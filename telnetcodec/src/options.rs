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

//! RFC 1143 "Q method" option negotiation.
//!
//! Each option carries an independent six-state machine per side of the
//! connection. The tables here guarantee two properties no matter what the
//! peer sends: negotiation never loops (at most one corrective message per
//! received message), and an option is only reported enabled once both sides
//! have agreed.

use crate::consts::option;
use crate::event::{TelnetEvent, TelnetSide};
use crate::frame::TelnetFrame;
use std::fmt;

/// Telnet options this engine knows by name.
///
/// Anything else decodes as [`TelnetOption::Unknown`] and is refused during
/// negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetOption {
    /// Option 0, 8-bit clean transmission.
    TransmitBinary,
    /// Option 3, suppress go-ahead.
    SuppressGoAhead,
    /// Option 24, terminal type (RFC 1091).
    TerminalType,
    /// Option 25, end-of-record prompt marker.
    EndOfRecord,
    /// Option 31, window size (RFC 1073).
    Naws,
    /// Option 36, the original environment option (RFC 1408).
    OldEnviron,
    /// Option 39, new environment option (RFC 1572).
    NewEnviron,
    /// Option 42, charset negotiation (RFC 2066).
    Charset,
    /// Option 46, TLS upgrade.
    StartTls,
    /// Any option code not listed above.
    Unknown(u8),
}

impl TelnetOption {
    /// The wire byte for this option.
    pub fn as_byte(self) -> u8 {
        match self {
            TelnetOption::TransmitBinary => option::BINARY,
            TelnetOption::SuppressGoAhead => option::SGA,
            TelnetOption::TerminalType => option::TTYPE,
            TelnetOption::EndOfRecord => option::EOR,
            TelnetOption::Naws => option::NAWS,
            TelnetOption::OldEnviron => option::OLD_ENVIRON,
            TelnetOption::NewEnviron => option::NEW_ENVIRON,
            TelnetOption::Charset => option::CHARSET,
            TelnetOption::StartTls => option::START_TLS,
            TelnetOption::Unknown(code) => code,
        }
    }
}

impl From<u8> for TelnetOption {
    fn from(code: u8) -> Self {
        match code {
            option::BINARY => TelnetOption::TransmitBinary,
            option::SGA => TelnetOption::SuppressGoAhead,
            option::TTYPE => TelnetOption::TerminalType,
            option::EOR => TelnetOption::EndOfRecord,
            option::NAWS => TelnetOption::Naws,
            option::OLD_ENVIRON => TelnetOption::OldEnviron,
            option::NEW_ENVIRON => TelnetOption::NewEnviron,
            option::CHARSET => TelnetOption::Charset,
            option::START_TLS => TelnetOption::StartTls,
            other => TelnetOption::Unknown(other),
        }
    }
}

impl fmt::Display for TelnetOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelnetOption::TransmitBinary => write!(f, "TRANSMIT-BINARY"),
            TelnetOption::SuppressGoAhead => write!(f, "SUPPRESS-GO-AHEAD"),
            TelnetOption::TerminalType => write!(f, "TERMINAL-TYPE"),
            TelnetOption::EndOfRecord => write!(f, "END-OF-RECORD"),
            TelnetOption::Naws => write!(f, "NAWS"),
            TelnetOption::OldEnviron => write!(f, "OLD-ENVIRON"),
            TelnetOption::NewEnviron => write!(f, "NEW-ENVIRON"),
            TelnetOption::Charset => write!(f, "CHARSET"),
            TelnetOption::StartTls => write!(f, "START-TLS"),
            TelnetOption::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// Which options each side of the connection is willing to run.
///
/// `us` answers incoming DO, `him` answers incoming WILL.
#[derive(Debug, Clone, Copy)]
pub struct OptionPolicy {
    /// Whether START-TLS may be accepted (requires a loaded TLS context).
    pub allow_start_tls: bool,
}

impl Default for OptionPolicy {
    fn default() -> Self {
        OptionPolicy {
            allow_start_tls: false,
        }
    }
}

impl OptionPolicy {
    /// Whether we are willing to enable `opt` on our own side.
    pub fn support_local(&self, opt: TelnetOption) -> bool {
        match opt {
            TelnetOption::TransmitBinary
            | TelnetOption::SuppressGoAhead
            | TelnetOption::EndOfRecord
            | TelnetOption::Charset => true,
            TelnetOption::StartTls => self.allow_start_tls,
            _ => false,
        }
    }

    /// Whether we are willing to let the peer enable `opt` on their side.
    pub fn support_remote(&self, opt: TelnetOption) -> bool {
        matches!(
            opt,
            TelnetOption::TransmitBinary
                | TelnetOption::SuppressGoAhead
                | TelnetOption::TerminalType
                | TelnetOption::Naws
                | TelnetOption::OldEnviron
                | TelnetOption::NewEnviron
                | TelnetOption::Charset
        )
    }
}

/// Per-option negotiation state, RFC 1143 section 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QState {
    /// Disabled, no request in flight.
    #[default]
    No,
    /// We asked to disable and are waiting for the acknowledgement.
    WantNoEmpty,
    /// Disabling, but the application queued a re-enable behind it.
    WantNoOpposite,
    /// Enabled on this side.
    Yes,
    /// We asked to enable and are waiting for the acknowledgement.
    WantYesEmpty,
    /// Enabling, but the application queued a disable behind it.
    WantYesOpposite,
}

impl QState {
    /// True when this side of the option is settled enabled.
    pub fn is_enabled(self) -> bool {
        self == QState::Yes
    }
}

/// Negotiation state for all 256 options on both sides of one connection.
pub struct OptionTable {
    policy: OptionPolicy,
    us: [QState; 256],
    him: [QState; 256],
}

impl fmt::Debug for OptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionTable")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for OptionTable {
    fn default() -> Self {
        Self::new(OptionPolicy::default())
    }
}

impl OptionTable {
    /// Create a table with every option disabled on both sides.
    pub fn new(policy: OptionPolicy) -> Self {
        OptionTable {
            policy,
            us: [QState::No; 256],
            him: [QState::No; 256],
        }
    }

    /// Current state of `opt` on our side.
    pub fn us(&self, opt: TelnetOption) -> QState {
        self.us[opt.as_byte() as usize]
    }

    /// Current state of `opt` on the peer's side.
    pub fn him(&self, opt: TelnetOption) -> QState {
        self.him[opt.as_byte() as usize]
    }

    /// True when `opt` is settled enabled on our side.
    pub fn local_enabled(&self, opt: TelnetOption) -> bool {
        self.us(opt).is_enabled()
    }

    /// True when `opt` is settled enabled on the peer's side.
    pub fn remote_enabled(&self, opt: TelnetOption) -> bool {
        self.him(opt).is_enabled()
    }

    /// Ask the peer to enable `opt` on their side (sends DO when needed).
    pub fn enable_remote(&mut self, opt: TelnetOption) -> Option<TelnetFrame> {
        let slot = &mut self.him[opt.as_byte() as usize];
        match *slot {
            QState::No => {
                *slot = QState::WantYesEmpty;
                Some(TelnetFrame::Do(opt))
            }
            QState::WantNoEmpty => {
                *slot = QState::WantNoOpposite;
                None
            }
            QState::WantYesOpposite => {
                *slot = QState::WantYesEmpty;
                None
            }
            QState::Yes | QState::WantNoOpposite | QState::WantYesEmpty => None,
        }
    }

    /// Ask the peer to disable `opt` on their side (sends DONT when needed).
    pub fn disable_remote(&mut self, opt: TelnetOption) -> Option<TelnetFrame> {
        let slot = &mut self.him[opt.as_byte() as usize];
        match *slot {
            QState::Yes => {
                *slot = QState::WantNoEmpty;
                Some(TelnetFrame::Dont(opt))
            }
            QState::WantNoOpposite => {
                *slot = QState::WantNoEmpty;
                None
            }
            QState::WantYesEmpty => {
                *slot = QState::WantYesOpposite;
                None
            }
            QState::No | QState::WantNoEmpty | QState::WantYesOpposite => None,
        }
    }

    /// Offer to enable `opt` on our side (sends WILL when needed).
    pub fn enable_local(&mut self, opt: TelnetOption) -> Option<TelnetFrame> {
        let slot = &mut self.us[opt.as_byte() as usize];
        match *slot {
            QState::No => {
                *slot = QState::WantYesEmpty;
                Some(TelnetFrame::Will(opt))
            }
            QState::WantNoEmpty => {
                *slot = QState::WantNoOpposite;
                None
            }
            QState::WantYesOpposite => {
                *slot = QState::WantYesEmpty;
                None
            }
            QState::Yes | QState::WantNoOpposite | QState::WantYesEmpty => None,
        }
    }

    /// Withdraw `opt` on our side (sends WONT when needed).
    pub fn disable_local(&mut self, opt: TelnetOption) -> Option<TelnetFrame> {
        let slot = &mut self.us[opt.as_byte() as usize];
        match *slot {
            QState::Yes => {
                *slot = QState::WantNoEmpty;
                Some(TelnetFrame::Wont(opt))
            }
            QState::WantNoOpposite => {
                *slot = QState::WantNoEmpty;
                None
            }
            QState::WantYesEmpty => {
                *slot = QState::WantYesOpposite;
                None
            }
            QState::No | QState::WantNoEmpty | QState::WantYesOpposite => None,
        }
    }

    /// Peer sent WILL `opt`.
    ///
    /// Returns any corrective reply and, when the option settles, the state
    /// change event to surface to the session.
    pub fn recv_will(
        &mut self,
        opt: TelnetOption,
    ) -> (Option<TelnetFrame>, Option<TelnetEvent>) {
        let support = self.policy.support_remote(opt);
        let slot = &mut self.him[opt.as_byte() as usize];
        match *slot {
            QState::No => {
                if support {
                    *slot = QState::Yes;
                    (
                        Some(TelnetFrame::Do(opt)),
                        Some(remote_change(opt, true)),
                    )
                } else {
                    (Some(TelnetFrame::Dont(opt)), None)
                }
            }
            QState::Yes => (None, None),
            QState::WantNoEmpty => {
                // Peer answered our DONT with WILL. Treat the option as off
                // rather than fight about it.
                tracing::warn!(option = %opt, "WILL answered DONT, option stays disabled");
                *slot = QState::No;
                (None, None)
            }
            QState::WantNoOpposite => {
                *slot = QState::Yes;
                (None, Some(remote_change(opt, true)))
            }
            QState::WantYesEmpty => {
                *slot = QState::Yes;
                (None, Some(remote_change(opt, true)))
            }
            QState::WantYesOpposite => {
                *slot = QState::WantNoEmpty;
                (Some(TelnetFrame::Dont(opt)), None)
            }
        }
    }

    /// Peer sent WONT `opt`.
    pub fn recv_wont(
        &mut self,
        opt: TelnetOption,
    ) -> (Option<TelnetFrame>, Option<TelnetEvent>) {
        let slot = &mut self.him[opt.as_byte() as usize];
        match *slot {
            QState::No => (None, None),
            QState::Yes => {
                *slot = QState::No;
                (
                    Some(TelnetFrame::Dont(opt)),
                    Some(remote_change(opt, false)),
                )
            }
            QState::WantNoEmpty => {
                *slot = QState::No;
                (None, Some(remote_change(opt, false)))
            }
            QState::WantNoOpposite => {
                *slot = QState::WantYesEmpty;
                (Some(TelnetFrame::Do(opt)), None)
            }
            QState::WantYesEmpty => {
                *slot = QState::No;
                (None, None)
            }
            QState::WantYesOpposite => {
                *slot = QState::No;
                (None, Some(remote_change(opt, false)))
            }
        }
    }

    /// Peer sent DO `opt`.
    pub fn recv_do(
        &mut self,
        opt: TelnetOption,
    ) -> (Option<TelnetFrame>, Option<TelnetEvent>) {
        let support = self.policy.support_local(opt);
        let slot = &mut self.us[opt.as_byte() as usize];
        match *slot {
            QState::No => {
                if support {
                    *slot = QState::Yes;
                    (
                        Some(TelnetFrame::Will(opt)),
                        Some(local_change(opt, true)),
                    )
                } else {
                    (Some(TelnetFrame::Wont(opt)), None)
                }
            }
            QState::Yes => (None, None),
            QState::WantNoEmpty => {
                tracing::warn!(option = %opt, "DO answered WONT, option stays disabled");
                *slot = QState::No;
                (None, None)
            }
            QState::WantNoOpposite => {
                *slot = QState::Yes;
                (None, Some(local_change(opt, true)))
            }
            QState::WantYesEmpty => {
                *slot = QState::Yes;
                (None, Some(local_change(opt, true)))
            }
            QState::WantYesOpposite => {
                *slot = QState::WantNoEmpty;
                (Some(TelnetFrame::Wont(opt)), None)
            }
        }
    }

    /// Peer sent DONT `opt`.
    pub fn recv_dont(
        &mut self,
        opt: TelnetOption,
    ) -> (Option<TelnetFrame>, Option<TelnetEvent>) {
        let slot = &mut self.us[opt.as_byte() as usize];
        match *slot {
            QState::No => (None, None),
            QState::Yes => {
                *slot = QState::No;
                (
                    Some(TelnetFrame::Wont(opt)),
                    Some(local_change(opt, false)),
                )
            }
            QState::WantNoEmpty => {
                *slot = QState::No;
                (None, Some(local_change(opt, false)))
            }
            QState::WantNoOpposite => {
                *slot = QState::WantYesEmpty;
                (Some(TelnetFrame::Will(opt)), None)
            }
            QState::WantYesEmpty => {
                *slot = QState::No;
                (None, None)
            }
            QState::WantYesOpposite => {
                *slot = QState::No;
                (None, Some(local_change(opt, false)))
            }
        }
    }
}

fn remote_change(option: TelnetOption, enabled: bool) -> TelnetEvent {
    TelnetEvent::Negotiation {
        side: TelnetSide::Remote,
        option,
        enabled,
    }
}

fn local_change(option: TelnetOption, enabled: bool) -> TelnetEvent {
    TelnetEvent::Negotiation {
        side: TelnetSide::Local,
        option,
        enabled,
    }
}
