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

//! Per-session line assembly.
//!
//! The line decoder turns raw data bytes into a canonical UTF-8 line,
//! applying the session's negotiated charset and honoring erase-character
//! editing. Lines are bounded; overflow drops input and flags the line as
//! truncated rather than growing without limit.

use crate::tables;
use crate::utf8::{Utf8Acceptor, Utf8Step};
use crate::Encoding;

/// Longest accepted line in UTF-8 bytes. Matches a generous command length
/// while keeping a hostile sender from ballooning the buffer.
pub const MAX_LINE_LEN: usize = 4096;

/// What happened to a pushed byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Byte accepted into the current line (possibly as part of a pending
    /// multibyte sequence).
    Stored,
    /// Byte discarded as non-printable or malformed for the charset.
    Dropped,
    /// Byte discarded because the line is full; the line is now flagged.
    Truncated,
}

/// Assembles one inbound line in the session's charset.
#[derive(Debug)]
pub struct LineDecoder {
    encoding: Encoding,
    acceptor: Utf8Acceptor,
    line: String,
    truncated: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(Encoding::default())
    }
}

impl LineDecoder {
    /// A decoder starting with an empty line in `encoding`.
    pub fn new(encoding: Encoding) -> Self {
        LineDecoder {
            encoding,
            acceptor: Utf8Acceptor::new(),
            line: String::new(),
            truncated: false,
        }
    }

    /// The charset currently applied to inbound bytes.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Switch charset mid-session. Any partial UTF-8 sequence is dropped;
    /// the assembled line so far is kept.
    pub fn set_encoding(&mut self, encoding: Encoding) {
        tracing::debug!(from = %self.encoding.label(), to = %encoding.label(), "charset switched");
        self.encoding = encoding;
        self.acceptor.reset();
    }

    /// Whether the current line overflowed and lost input.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Feed one data byte.
    pub fn push_byte(&mut self, byte: u8) -> PushOutcome {
        match self.encoding {
            Encoding::Utf8 => self.push_utf8(byte),
            Encoding::Latin1 => self.push_decoded(tables::decode_latin1(byte)),
            Encoding::Latin2 => self.push_decoded(tables::decode_latin2(byte)),
            Encoding::Cp437 => self.push_decoded(tables::decode_cp437(byte)),
            Encoding::Ascii => self.push_decoded(tables::decode_ascii(byte)),
        }
    }

    fn push_utf8(&mut self, byte: u8) -> PushOutcome {
        // A rejected byte may still open a fresh sequence; try it once.
        for attempt in 0..2 {
            match self.acceptor.push(byte) {
                Utf8Step::Incomplete => return PushOutcome::Stored,
                Utf8Step::Complete(seq) => {
                    let c = std::str::from_utf8(seq)
                        .ok()
                        .and_then(|s| s.chars().next());
                    let Some(c) = c else {
                        return PushOutcome::Dropped;
                    };
                    return self.push_char(c);
                }
                Utf8Step::Reject if attempt == 0 => continue,
                Utf8Step::Reject => return PushOutcome::Dropped,
            }
        }
        PushOutcome::Dropped
    }

    fn push_decoded(&mut self, decoded: Option<char>) -> PushOutcome {
        match decoded {
            Some(c) => self.push_char(c),
            None => PushOutcome::Dropped,
        }
    }

    fn push_char(&mut self, c: char) -> PushOutcome {
        if c != '\t' && c.is_control() {
            return PushOutcome::Dropped;
        }
        if self.line.len() + c.len_utf8() > MAX_LINE_LEN {
            if !self.truncated {
                tracing::debug!("line hit the length cap, dropping input");
            }
            self.truncated = true;
            return PushOutcome::Truncated;
        }
        self.line.push(c);
        PushOutcome::Stored
    }

    /// Erase one input position: a pending partial sequence if one exists,
    /// otherwise the last decoded code point.
    pub fn erase_char(&mut self) {
        if self.acceptor.mid_sequence() {
            self.acceptor.reset();
        } else {
            self.line.pop();
        }
    }

    /// Take the assembled line and start a new one.
    ///
    /// Also clears the truncation flag and any partial sequence; check
    /// [`LineDecoder::is_truncated`] before calling.
    pub fn take_line(&mut self) -> String {
        self.truncated = false;
        self.acceptor.reset();
        std::mem::take(&mut self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_all(decoder: &mut LineDecoder, bytes: &[u8]) {
        for &b in bytes {
            decoder.push_byte(b);
        }
    }

    #[test]
    fn utf8_line_passes_through() {
        let mut decoder = LineDecoder::new(Encoding::Utf8);
        push_all(&mut decoder, "příliš žluťoučký".as_bytes());
        assert_eq!(decoder.take_line(), "příliš žluťoučký");
    }

    #[test]
    fn malformed_utf8_drops_only_the_bad_sequence() {
        let mut decoder = LineDecoder::new(Encoding::Utf8);
        push_all(&mut decoder, b"ok\xE2\x28ay");
        // 0xE2 started a sequence, 0x28 '(' broke it; '(' itself survives.
        assert_eq!(decoder.take_line(), "ok(ay");
    }

    #[test]
    fn latin2_bytes_decode_to_unicode() {
        let mut decoder = LineDecoder::new(Encoding::Latin2);
        push_all(&mut decoder, b"\xB9\xE8");
        assert_eq!(decoder.take_line(), "šč");
    }

    #[test]
    fn ascii_session_drops_high_bytes() {
        let mut decoder = LineDecoder::new(Encoding::Ascii);
        push_all(&mut decoder, b"hi\xE9!");
        assert_eq!(decoder.take_line(), "hi!");
    }

    #[test]
    fn erase_removes_whole_code_point() {
        let mut decoder = LineDecoder::new(Encoding::Utf8);
        push_all(&mut decoder, "ař".as_bytes());
        decoder.erase_char();
        assert_eq!(decoder.take_line(), "a");
    }

    #[test]
    fn erase_mid_sequence_cancels_the_partial() {
        let mut decoder = LineDecoder::new(Encoding::Utf8);
        decoder.push_byte(b'a');
        decoder.push_byte(0xC5); // first byte of a two-byte sequence
        decoder.erase_char();
        assert_eq!(decoder.take_line(), "a");
    }

    #[test]
    fn overflow_flags_truncation_and_stops_growing() {
        let mut decoder = LineDecoder::new(Encoding::Ascii);
        for _ in 0..MAX_LINE_LEN {
            assert_eq!(decoder.push_byte(b'x'), PushOutcome::Stored);
        }
        assert_eq!(decoder.push_byte(b'y'), PushOutcome::Truncated);
        assert!(decoder.is_truncated());
        let line = decoder.take_line();
        assert_eq!(line.len(), MAX_LINE_LEN);
        assert!(!decoder.is_truncated(), "flag resets with the line");
    }

    #[test]
    fn switching_encoding_keeps_line_drops_partial() {
        let mut decoder = LineDecoder::new(Encoding::Utf8);
        push_all(&mut decoder, "ab".as_bytes());
        decoder.push_byte(0xC5); // pending partial sequence
        decoder.set_encoding(Encoding::Latin2);
        decoder.push_byte(0xB9);
        assert_eq!(decoder.take_line(), "abš");
    }

    #[test]
    fn tab_is_kept_other_controls_dropped() {
        let mut decoder = LineDecoder::new(Encoding::Utf8);
        push_all(&mut decoder, b"a\tb\x07c");
        assert_eq!(decoder.take_line(), "a\tbc");
    }

    proptest::proptest! {
        /// Any printable text survives a bytewise trip through the UTF-8
        /// path unchanged.
        #[test]
        fn printable_utf8_roundtrips(s in "\\PC{0,200}") {
            let mut decoder = LineDecoder::new(Encoding::Utf8);
            push_all(&mut decoder, s.as_bytes());
            proptest::prop_assert_eq!(decoder.take_line(), s);
        }
    }
}
