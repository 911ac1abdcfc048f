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

//! Decoded Telnet events.

use crate::args::SubArg;
use crate::options::TelnetOption;

/// Which side of the connection an option state change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetSide {
    /// Our end of the link (WILL/WONT territory).
    Local,
    /// The peer's end of the link (DO/DONT territory).
    Remote,
}

/// A single decoded event from the inbound Telnet stream.
///
/// Negotiation traffic that merely confirms an in-flight request is absorbed
/// by the option table and never surfaces here; only settled state changes
/// are reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    /// One byte of ordinary session data, with IAC escaping already removed.
    Data(u8),
    /// An erase-character request (IAC EC, or a bare BS/DEL in the stream).
    EraseChar,
    /// A CR that terminates a line (CR LF or CR NUL on the wire).
    EndOfLine,
    /// A bare LF not preceded by CR.
    LineFeed,
    /// IAC AYT; the session should answer with a short liveness string.
    AreYouThere,
    /// An option reached a settled enabled/disabled state on one side.
    Negotiation {
        /// Which side the state change applies to.
        side: TelnetSide,
        /// The option that changed state.
        option: TelnetOption,
        /// Whether the option is now enabled.
        enabled: bool,
    },
    /// A complete, parsed subnegotiation payload.
    Subnegotiation(SubArg),
}
