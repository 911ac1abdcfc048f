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

//! CHARSET payloads (RFC 2066).
//!
//! Only the REQUEST/ACCEPTED/REJECTED core is implemented. TTABLE transfer
//! is refused by skipping the version byte and treating the rest as a plain
//! request, which RFC 2066 permits.

use crate::options::TelnetOption;
use crate::result::{CodecError, CodecResult};
use bytes::{BufMut, Bytes, BytesMut};

const REQUEST: u8 = 1;
const ACCEPTED: u8 = 2;
const REJECTED: u8 = 3;

const TTABLE_PREFIX: &[u8] = b"[TTABLE]";

/// One round of the CHARSET exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharsetCmd {
    /// Offered charset names, in the sender's preference order.
    Request(Vec<String>),
    /// The charset the responder picked.
    Accepted(String),
    /// None of the offered charsets were acceptable.
    Rejected,
}

pub(crate) fn decode(option: TelnetOption, payload: &[u8]) -> CodecResult<CharsetCmd> {
    let (&cmd, rest) = payload.split_first().ok_or_else(|| CodecError::Subnegotiation {
        option,
        reason: "empty payload".into(),
    })?;
    match cmd {
        REQUEST => {
            // "[TTABLE]" plus a version byte may precede the charset list.
            let rest = match rest.strip_prefix(TTABLE_PREFIX) {
                Some([_version, tail @ ..]) => tail,
                Some([]) => {
                    return Err(CodecError::Subnegotiation {
                        option,
                        reason: "TTABLE marker without version".into(),
                    });
                }
                None => rest,
            };
            let (&sep, names) = rest.split_first().ok_or_else(|| CodecError::Subnegotiation {
                option,
                reason: "request carries no charsets".into(),
            })?;
            let names: Vec<String> = names
                .split(|&b| b == sep)
                .filter(|chunk| !chunk.is_empty())
                .map(|chunk| charset_name(option, chunk))
                .collect::<CodecResult<_>>()?;
            if names.is_empty() {
                return Err(CodecError::Subnegotiation {
                    option,
                    reason: "request carries no charsets".into(),
                });
            }
            Ok(CharsetCmd::Request(names))
        }
        ACCEPTED => Ok(CharsetCmd::Accepted(charset_name(option, rest)?)),
        REJECTED => Ok(CharsetCmd::Rejected),
        other => Err(CodecError::Subnegotiation {
            option,
            reason: format!("unknown command byte {other}"),
        }),
    }
}

fn charset_name(option: TelnetOption, raw: &[u8]) -> CodecResult<String> {
    if raw.is_empty() || raw.len() > 40 {
        return Err(CodecError::Subnegotiation {
            option,
            reason: format!("charset name of {} bytes", raw.len()),
        });
    }
    if !raw.iter().all(u8::is_ascii_graphic) {
        return Err(CodecError::Subnegotiation {
            option,
            reason: "non-printable byte in charset name".into(),
        });
    }
    Ok(String::from_utf8_lossy(raw).into_owned())
}

pub(crate) fn encode(cmd: &CharsetCmd) -> Bytes {
    match cmd {
        CharsetCmd::Request(names) => {
            let mut buf = BytesMut::new();
            buf.put_u8(REQUEST);
            for name in names {
                buf.put_u8(b';');
                buf.put_slice(name.as_bytes());
            }
            buf.freeze()
        }
        CharsetCmd::Accepted(name) => {
            let mut buf = BytesMut::with_capacity(1 + name.len());
            buf.put_u8(ACCEPTED);
            buf.put_slice(name.as_bytes());
            buf.freeze()
        }
        CharsetCmd::Rejected => Bytes::from_static(&[REJECTED]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_with_semicolon_separator_parses() {
        let cmd = decode(TelnetOption::Charset, b"\x01;UTF-8;ISO-8859-2").unwrap();
        assert_eq!(
            cmd,
            CharsetCmd::Request(vec!["UTF-8".into(), "ISO-8859-2".into()])
        );
    }

    #[test]
    fn request_honors_any_separator_byte() {
        let cmd = decode(TelnetOption::Charset, b"\x01 UTF-8 LATIN-1").unwrap();
        assert_eq!(
            cmd,
            CharsetCmd::Request(vec!["UTF-8".into(), "LATIN-1".into()])
        );
    }

    #[test]
    fn ttable_prefix_is_skipped() {
        let mut payload = vec![REQUEST];
        payload.extend(TTABLE_PREFIX);
        payload.push(1); // table version
        payload.extend(b";UTF-8");
        let cmd = decode(TelnetOption::Charset, &payload).unwrap();
        assert_eq!(cmd, CharsetCmd::Request(vec!["UTF-8".into()]));
    }

    #[test]
    fn accepted_and_rejected_parse() {
        assert_eq!(
            decode(TelnetOption::Charset, b"\x02UTF-8").unwrap(),
            CharsetCmd::Accepted("UTF-8".into())
        );
        assert_eq!(
            decode(TelnetOption::Charset, &[REJECTED]).unwrap(),
            CharsetCmd::Rejected
        );
    }

    #[test]
    fn empty_request_rejected() {
        assert!(decode(TelnetOption::Charset, &[REQUEST]).is_err());
        assert!(decode(TelnetOption::Charset, b"\x01;").is_err());
    }
}
