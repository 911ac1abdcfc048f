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

//! Telnet protocol byte constants (RFC 854 and friends).

/// End of subnegotiation parameters.
pub const SE: u8 = 240;
/// No operation.
pub const NOP: u8 = 241;
/// Data Mark: the data stream portion of a Synch.
pub const DM: u8 = 242;
/// NVT character BRK.
pub const BRK: u8 = 243;
/// Interrupt Process.
pub const IP: u8 = 244;
/// Abort Output.
pub const AO: u8 = 245;
/// Are You There.
pub const AYT: u8 = 246;
/// Erase Character.
pub const EC: u8 = 247;
/// Erase Line.
pub const EL: u8 = 248;
/// Go Ahead.
pub const GA: u8 = 249;
/// Subnegotiation begin.
pub const SB: u8 = 250;
/// Option negotiation: sender wants to enable an option on its side.
pub const WILL: u8 = 251;
/// Option negotiation: sender refuses to enable an option on its side.
pub const WONT: u8 = 252;
/// Option negotiation: sender wants the peer to enable an option.
pub const DO: u8 = 253;
/// Option negotiation: sender wants the peer to disable an option.
pub const DONT: u8 = 254;
/// Interpret As Command escape byte.
pub const IAC: u8 = 255;
/// End of Record command (RFC 885).
pub const EOR_CMD: u8 = 239;

/// Carriage return: the line terminator on the wire.
pub const CR: u8 = b'\r';
/// Line feed: ignored as a line terminator.
pub const LF: u8 = b'\n';
/// Backspace: erases one character.
pub const BS: u8 = 0x08;
/// Delete: erases one character.
pub const DEL: u8 = 0x7F;

/// Telnet option codes for the set this engine negotiates.
pub mod option {
    /// Binary Transmission (RFC 856).
    pub const BINARY: u8 = 0;
    /// Suppress Go Ahead (RFC 858).
    pub const SGA: u8 = 3;
    /// Terminal Type (RFC 1091).
    pub const TTYPE: u8 = 24;
    /// End of Record (RFC 885).
    pub const EOR: u8 = 25;
    /// Negotiate About Window Size (RFC 1073).
    pub const NAWS: u8 = 31;
    /// Environment, old style (RFC 1408).
    pub const OLD_ENVIRON: u8 = 36;
    /// Environment, new style (RFC 1572).
    pub const NEW_ENVIRON: u8 = 39;
    /// Charset (RFC 2066).
    pub const CHARSET: u8 = 42;
    /// Start-TLS (draft-altman-telnet-starttls).
    pub const START_TLS: u8 = 46;
}

/// Subnegotiation payloads longer than this are truncated, never overflowed.
pub const MAX_SUBNEG_LEN: usize = 256;
