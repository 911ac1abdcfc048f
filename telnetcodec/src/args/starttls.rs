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

//! START-TLS payloads.
//!
//! The only defined payload is a single FOLLOWS byte; once both sides have
//! sent it, the very next bytes on the wire are the TLS handshake.

use crate::options::TelnetOption;
use crate::result::{CodecError, CodecResult};
use bytes::Bytes;

const FOLLOWS: u8 = 1;

/// The START-TLS FOLLOWS marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartTls;

pub(crate) fn decode(option: TelnetOption, payload: &[u8]) -> CodecResult<StartTls> {
    match payload {
        [FOLLOWS] => Ok(StartTls),
        _ => Err(CodecError::Subnegotiation {
            option,
            reason: "expected single FOLLOWS byte".into(),
        }),
    }
}

pub(crate) fn encode(_: &StartTls) -> Bytes {
    Bytes::from_static(&[FOLLOWS])
}
