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

//! NEW-ENVIRON and OLD-ENVIRON payloads (RFC 1572 / RFC 1408).
//!
//! Both options share the same grammar here. The engine only ever asks for
//! well-known variables and uses the answers to sniff the client's locale,
//! so values are kept as raw byte strings.

use crate::options::TelnetOption;
use crate::result::{CodecError, CodecResult};
use bytes::{BufMut, Bytes, BytesMut};

const IS: u8 = 0;
const SEND: u8 = 1;
const INFO: u8 = 2;

const VAR: u8 = 0;
const VALUE: u8 = 1;
const ESC: u8 = 2;
const USERVAR: u8 = 3;

/// One transferred environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironVar {
    /// Variable name, ESC-unquoted.
    pub name: Vec<u8>,
    /// Value when the client sent one; `None` means defined-but-empty.
    pub value: Option<Vec<u8>>,
    /// True for USERVAR entries.
    pub user: bool,
}

/// One round of the environment exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironCmd {
    /// Client answers a SEND with its variables.
    Is(Vec<EnvironVar>),
    /// Server requests variables; empty list means "send everything".
    Send(Vec<EnvironVar>),
    /// Client pushes an unsolicited update.
    Info(Vec<EnvironVar>),
}

impl EnvironCmd {
    /// The variables carried by this round.
    pub fn vars(&self) -> &[EnvironVar] {
        match self {
            EnvironCmd::Is(vars) | EnvironCmd::Send(vars) | EnvironCmd::Info(vars) => vars,
        }
    }

    /// Look up a variable's value by case-sensitive name.
    pub fn get(&self, name: &[u8]) -> Option<&[u8]> {
        self.vars()
            .iter()
            .find(|v| v.name == name)
            .and_then(|v| v.value.as_deref())
    }

    /// Whether LANG, LC_CTYPE, or LC_ALL names a UTF-8 locale.
    pub fn utf8_locale(&self) -> bool {
        [b"LC_ALL".as_slice(), b"LC_CTYPE".as_slice(), b"LANG".as_slice()]
            .iter()
            .filter_map(|name| self.get(name))
            .any(|value| {
                let upper: Vec<u8> = value.iter().map(|b| b.to_ascii_uppercase()).collect();
                upper.ends_with(b"UTF-8") || upper.ends_with(b"UTF8")
            })
    }
}

pub(crate) fn decode(option: TelnetOption, payload: &[u8]) -> CodecResult<EnvironCmd> {
    let (&cmd, rest) = payload.split_first().ok_or_else(|| CodecError::Subnegotiation {
        option,
        reason: "empty payload".into(),
    })?;
    let vars = parse_vars(option, rest)?;
    match cmd {
        IS => Ok(EnvironCmd::Is(vars)),
        SEND => Ok(EnvironCmd::Send(vars)),
        INFO => Ok(EnvironCmd::Info(vars)),
        other => Err(CodecError::Subnegotiation {
            option,
            reason: format!("unknown command byte {other}"),
        }),
    }
}

fn parse_vars(option: TelnetOption, mut rest: &[u8]) -> CodecResult<Vec<EnvironVar>> {
    let mut vars = Vec::new();
    while let Some((&kind, tail)) = rest.split_first() {
        if kind != VAR && kind != USERVAR {
            return Err(CodecError::Subnegotiation {
                option,
                reason: format!("expected VAR or USERVAR, got {kind}"),
            });
        }
        let (name, after_name) = take_token(tail);
        let (value, after_value) = if let Some((&VALUE, tail)) = after_name.split_first() {
            let (value, after) = take_token(tail);
            (Some(value), after)
        } else {
            (None, after_name)
        };
        vars.push(EnvironVar {
            name,
            value,
            user: kind == USERVAR,
        });
        rest = after_value;
    }
    Ok(vars)
}

/// Consume bytes up to the next unescaped VAR/VALUE/USERVAR marker,
/// unquoting ESC as it goes.
fn take_token(input: &[u8]) -> (Vec<u8>, &[u8]) {
    let mut out = Vec::new();
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            ESC if i + 1 < input.len() => {
                out.push(input[i + 1]);
                i += 2;
            }
            VAR | VALUE | USERVAR => break,
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    (out, &input[i..])
}

pub(crate) fn encode(cmd: &EnvironCmd) -> Bytes {
    let (code, vars) = match cmd {
        EnvironCmd::Is(vars) => (IS, vars),
        EnvironCmd::Send(vars) => (SEND, vars),
        EnvironCmd::Info(vars) => (INFO, vars),
    };
    let mut buf = BytesMut::new();
    buf.put_u8(code);
    for var in vars {
        buf.put_u8(if var.user { USERVAR } else { VAR });
        put_escaped(&mut buf, &var.name);
        if let Some(value) = &var.value {
            buf.put_u8(VALUE);
            put_escaped(&mut buf, value);
        }
    }
    buf.freeze()
}

fn put_escaped(buf: &mut BytesMut, bytes: &[u8]) {
    for &b in bytes {
        if matches!(b, VAR | VALUE | ESC | USERVAR) {
            buf.put_u8(ESC);
        }
        buf.put_u8(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &[u8], value: Option<&[u8]>) -> EnvironVar {
        EnvironVar {
            name: name.to_vec(),
            value: value.map(|v| v.to_vec()),
            user: false,
        }
    }

    #[test]
    fn is_with_lang_parses() {
        // IS VAR "LANG" VALUE "en_US.UTF-8"
        let mut payload = vec![IS, VAR];
        payload.extend(b"LANG");
        payload.push(VALUE);
        payload.extend(b"en_US.UTF-8");
        let cmd = decode(TelnetOption::NewEnviron, &payload).unwrap();
        assert_eq!(cmd.get(b"LANG"), Some(b"en_US.UTF-8".as_slice()));
        assert!(cmd.utf8_locale());
    }

    #[test]
    fn lc_ctype_promotes_utf8() {
        let mut payload = vec![IS, VAR];
        payload.extend(b"LC_CTYPE");
        payload.push(VALUE);
        payload.extend(b"en_US.UTF-8");
        let cmd = decode(TelnetOption::NewEnviron, &payload).unwrap();
        assert!(cmd.utf8_locale());
    }

    #[test]
    fn utf8_must_be_a_suffix_of_the_locale() {
        let cmd = EnvironCmd::Is(vec![var(b"LANG", Some(b"utf-8.fake_custom"))]);
        assert!(!cmd.utf8_locale());
        let cmd = EnvironCmd::Is(vec![var(b"LANG", Some(b"cs_CZ.utf8"))]);
        assert!(cmd.utf8_locale());
    }

    #[test]
    fn send_with_no_vars_means_send_everything() {
        let cmd = decode(TelnetOption::NewEnviron, &[SEND]).unwrap();
        assert_eq!(cmd, EnvironCmd::Send(vec![]));
    }

    #[test]
    fn escaped_markers_inside_value_survive() {
        let mut payload = vec![IS, VAR];
        payload.extend(b"X");
        payload.push(VALUE);
        payload.extend([b'a', ESC, VALUE, b'b']);
        let cmd = decode(TelnetOption::NewEnviron, &payload).unwrap();
        assert_eq!(cmd.get(b"X"), Some([b'a', VALUE, b'b'].as_slice()));
    }

    #[test]
    fn uservar_flag_is_kept() {
        let mut payload = vec![INFO, USERVAR];
        payload.extend(b"CHARSET");
        payload.push(VALUE);
        payload.extend(b"UTF-8");
        let cmd = decode(TelnetOption::NewEnviron, &payload).unwrap();
        assert!(cmd.vars()[0].user);
    }

    #[test]
    fn stray_value_marker_rejected() {
        assert!(decode(TelnetOption::NewEnviron, &[IS, VALUE, b'x']).is_err());
    }

    #[test]
    fn roundtrip_preserves_vars() {
        let cmd = EnvironCmd::Is(vec![
            var(b"LANG", Some(b"cs_CZ.UTF-8")),
            var(b"TERM", None),
        ]);
        let encoded = encode(&cmd);
        assert_eq!(decode(TelnetOption::NewEnviron, &encoded).unwrap(), cmd);
    }
}
