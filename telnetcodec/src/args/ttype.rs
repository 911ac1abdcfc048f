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

//! TERMINAL-TYPE payloads (RFC 1091).

use crate::options::TelnetOption;
use crate::result::{CodecError, CodecResult};
use bytes::{BufMut, Bytes, BytesMut};

const IS: u8 = 0;
const SEND: u8 = 1;

/// Maximum accepted terminal name length. Anything longer is hostile.
const MAX_NAME_LEN: usize = 40;

/// One round of the TERMINAL-TYPE exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtypeCmd {
    /// Client reports a terminal name, already validated printable ASCII.
    Is(String),
    /// Server asks for the next terminal name.
    Send,
}

pub(crate) fn decode(option: TelnetOption, payload: &[u8]) -> CodecResult<TtypeCmd> {
    match payload.split_first() {
        Some((&SEND, [])) => Ok(TtypeCmd::Send),
        Some((&IS, name)) => {
            if name.len() > MAX_NAME_LEN {
                return Err(CodecError::Subnegotiation {
                    option,
                    reason: format!("terminal name of {} bytes", name.len()),
                });
            }
            if !name.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
                return Err(CodecError::Subnegotiation {
                    option,
                    reason: "non-printable byte in terminal name".into(),
                });
            }
            // Safe: printable ASCII only.
            Ok(TtypeCmd::Is(String::from_utf8_lossy(name).into_owned()))
        }
        _ => Err(CodecError::Subnegotiation {
            option,
            reason: "expected IS <name> or SEND".into(),
        }),
    }
}

pub(crate) fn encode(cmd: &TtypeCmd) -> Bytes {
    match cmd {
        TtypeCmd::Send => Bytes::from_static(&[SEND]),
        TtypeCmd::Is(name) => {
            let mut buf = BytesMut::with_capacity(1 + name.len());
            buf.put_u8(IS);
            buf.put_slice(name.as_bytes());
            buf.freeze()
        }
    }
}
