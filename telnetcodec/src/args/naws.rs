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

//! NAWS window size payloads (RFC 1073).

use crate::options::TelnetOption;
use crate::result::{CodecError, CodecResult};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

/// Terminal dimensions reported by the client.
///
/// A zero in either field means "unspecified" per RFC 1073; sessions keep
/// their previous value for that axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    /// Columns, 0 meaning unspecified.
    pub cols: u16,
    /// Rows, 0 meaning unspecified.
    pub rows: u16,
}

pub(crate) fn decode(option: TelnetOption, payload: &[u8]) -> CodecResult<WindowSize> {
    if payload.len() != 4 {
        return Err(CodecError::Subnegotiation {
            option,
            reason: format!("expected 4 bytes, got {}", payload.len()),
        });
    }
    Ok(WindowSize {
        cols: BigEndian::read_u16(&payload[0..2]),
        rows: BigEndian::read_u16(&payload[2..4]),
    })
}

pub(crate) fn encode(size: &WindowSize) -> Bytes {
    let mut buf = [0u8; 4];
    BigEndian::write_u16(&mut buf[0..2], size.cols);
    BigEndian::write_u16(&mut buf[2..4], size.rows);
    Bytes::copy_from_slice(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_eighty_by_twenty_four() {
        let size = decode(TelnetOption::Naws, &[0, 80, 0, 24]).unwrap();
        assert_eq!(size, WindowSize { cols: 80, rows: 24 });
    }

    #[test]
    fn rejects_short_payload() {
        assert!(decode(TelnetOption::Naws, &[0, 80, 0]).is_err());
    }

    #[test]
    fn wide_terminal_roundtrips() {
        let size = WindowSize { cols: 511, rows: 0 };
        let encoded = encode(&size);
        assert_eq!(decode(TelnetOption::Naws, &encoded).unwrap(), size);
    }
}
