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

//! Typed subnegotiation payloads.
//!
//! Each supported option gets its own parse/encode module; anything the
//! engine does not understand is carried as [`SubArg::Unknown`] so the
//! session layer can log and drop it.

use crate::options::TelnetOption;
use crate::result::{CodecError, CodecResult};
use bytes::Bytes;

pub mod charset;
pub mod environ;
pub mod naws;
pub mod starttls;
pub mod ttype;

pub use charset::CharsetCmd;
pub use environ::{EnvironCmd, EnvironVar};
pub use naws::WindowSize;
pub use starttls::StartTls;
pub use ttype::TtypeCmd;

/// A parsed subnegotiation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubArg {
    /// NAWS window dimensions.
    Naws(WindowSize),
    /// TERMINAL-TYPE IS/SEND exchange.
    Ttype(TtypeCmd),
    /// NEW-ENVIRON variable transfer.
    Environ(EnvironCmd),
    /// OLD-ENVIRON variable transfer, parsed with the same grammar.
    OldEnviron(EnvironCmd),
    /// CHARSET negotiation round.
    Charset(CharsetCmd),
    /// START-TLS FOLLOWS marker.
    StartTls(StartTls),
    /// Payload for an option we carry but do not interpret.
    Unknown(TelnetOption, Bytes),
}

impl SubArg {
    /// Parse the payload between IAC SB and IAC SE, with IAC escaping
    /// already removed. The first byte is the option code.
    ///
    /// `truncated` marks a payload that overran the decoder's cap; such
    /// payloads are never parsed, only reported.
    pub fn parse(raw: &[u8], truncated: bool) -> CodecResult<SubArg> {
        let (&code, payload) = raw.split_first().ok_or_else(|| CodecError::Negotiation {
            reason: "empty subnegotiation".into(),
        })?;
        let option = TelnetOption::from(code);
        if truncated {
            return Ok(SubArg::Unknown(option, Bytes::copy_from_slice(payload)));
        }
        match option {
            TelnetOption::Naws => Ok(SubArg::Naws(naws::decode(option, payload)?)),
            TelnetOption::TerminalType => Ok(SubArg::Ttype(ttype::decode(option, payload)?)),
            TelnetOption::NewEnviron => Ok(SubArg::Environ(environ::decode(option, payload)?)),
            TelnetOption::OldEnviron => {
                Ok(SubArg::OldEnviron(environ::decode(option, payload)?))
            }
            TelnetOption::Charset => Ok(SubArg::Charset(charset::decode(option, payload)?)),
            TelnetOption::StartTls => Ok(SubArg::StartTls(starttls::decode(option, payload)?)),
            _ => Ok(SubArg::Unknown(option, Bytes::copy_from_slice(payload))),
        }
    }

    /// The option this payload belongs to.
    pub fn option(&self) -> TelnetOption {
        match self {
            SubArg::Naws(_) => TelnetOption::Naws,
            SubArg::Ttype(_) => TelnetOption::TerminalType,
            SubArg::Environ(_) => TelnetOption::NewEnviron,
            SubArg::OldEnviron(_) => TelnetOption::OldEnviron,
            SubArg::Charset(_) => TelnetOption::Charset,
            SubArg::StartTls(_) => TelnetOption::StartTls,
            SubArg::Unknown(option, _) => *option,
        }
    }

    /// Encode back to a raw payload (without option code or IAC escaping).
    pub fn encode_payload(&self) -> Bytes {
        match self {
            SubArg::Naws(size) => naws::encode(size),
            SubArg::Ttype(cmd) => ttype::encode(cmd),
            SubArg::Environ(cmd) | SubArg::OldEnviron(cmd) => environ::encode(cmd),
            SubArg::Charset(cmd) => charset::encode(cmd),
            SubArg::StartTls(cmd) => starttls::encode(cmd),
            SubArg::Unknown(_, payload) => payload.clone(),
        }
    }
}
