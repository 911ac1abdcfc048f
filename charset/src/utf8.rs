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

//! Incremental UTF-8 validation.
//!
//! Network reads split code points at arbitrary byte boundaries, so the
//! acceptor holds at most one partial sequence between calls. A rejected
//! sequence rolls back only itself; bytes accepted earlier are untouched.

/// Result of feeding one byte to the acceptor.
#[derive(Debug, PartialEq, Eq)]
pub enum Utf8Step<'a> {
    /// The byte extends a partial sequence; keep feeding.
    Incomplete,
    /// One whole code point, as its UTF-8 bytes.
    Complete(&'a [u8]),
    /// The partial sequence was invalid and has been discarded.
    ///
    /// The acceptor is reset; the offending byte may be re-fed once if it
    /// could begin a fresh sequence.
    Reject,
}

/// A strict UTF-8 sequence validator fed one byte at a time.
///
/// Overlong encodings, surrogates, and code points beyond U+10FFFF are
/// rejected, matching `str::from_utf8`.
#[derive(Debug, Default)]
pub struct Utf8Acceptor {
    buf: [u8; 4],
    len: usize,
    /// Continuation bytes still expected.
    needed: usize,
    /// Allowed range for the next continuation byte. The first byte after
    /// a lead narrows this to exclude overlongs and surrogates.
    next_min: u8,
    next_max: u8,
}

impl Utf8Acceptor {
    /// A fresh acceptor with no partial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a partial sequence is buffered.
    pub fn mid_sequence(&self) -> bool {
        self.needed > 0
    }

    /// Drop any partial sequence.
    pub fn reset(&mut self) {
        self.len = 0;
        self.needed = 0;
    }

    /// Feed one byte.
    pub fn push(&mut self, byte: u8) -> Utf8Step<'_> {
        if self.needed == 0 {
            return self.start(byte);
        }
        if byte < self.next_min || byte > self.next_max {
            self.reset();
            return Utf8Step::Reject;
        }
        self.buf[self.len] = byte;
        self.len += 1;
        self.needed -= 1;
        // All trailing continuations use the full range.
        self.next_min = 0x80;
        self.next_max = 0xBF;
        if self.needed == 0 {
            let done = self.len;
            self.len = 0;
            Utf8Step::Complete(&self.buf[..done])
        } else {
            Utf8Step::Incomplete
        }
    }

    fn start(&mut self, byte: u8) -> Utf8Step<'_> {
        let (needed, min, max) = match byte {
            0x00..=0x7F => {
                self.buf[0] = byte;
                return Utf8Step::Complete(&self.buf[..1]);
            }
            0xC2..=0xDF => (1, 0x80, 0xBF),
            0xE0 => (2, 0xA0, 0xBF),
            0xE1..=0xEC | 0xEE..=0xEF => (2, 0x80, 0xBF),
            0xED => (2, 0x80, 0x9F),
            0xF0 => (3, 0x90, 0xBF),
            0xF1..=0xF3 => (3, 0x80, 0xBF),
            0xF4 => (3, 0x80, 0x8F),
            _ => return Utf8Step::Reject,
        };
        self.buf[0] = byte;
        self.len = 1;
        self.needed = needed;
        self.next_min = min;
        self.next_max = max;
        Utf8Step::Incomplete
    }
}
