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

//! Character encodings for client sessions.
//!
//! Sessions decode inbound bytes to UTF-8 lines and encode outbound text
//! back to the client's negotiated charset. Everything internal is UTF-8;
//! the encodings here only exist at the wire boundary.

pub mod decoder;
pub mod tables;
pub mod utf8;

pub use decoder::{LineDecoder, PushOutcome, MAX_LINE_LEN};
pub use utf8::{Utf8Acceptor, Utf8Step};

/// A charset a session can run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// UTF-8, the preferred and internal encoding.
    Utf8,
    /// ISO-8859-1.
    Latin1,
    /// ISO-8859-2.
    Latin2,
    /// IBM code page 437. Heuristic fallback only, never offered on the
    /// wire.
    Cp437,
    /// Plain 7-bit ASCII, the safe default before negotiation.
    #[default]
    Ascii,
}

/// Encodings offered in CHARSET REQUEST, server preference order.
pub const NEGOTIABLE: &[Encoding] = &[
    Encoding::Utf8,
    Encoding::Latin1,
    Encoding::Latin2,
    Encoding::Ascii,
];

impl Encoding {
    /// Canonical name used on the wire.
    pub fn label(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Latin1 => "ISO-8859-1",
            Encoding::Latin2 => "ISO-8859-2",
            Encoding::Cp437 => "CP437",
            Encoding::Ascii => "US-ASCII",
        }
    }

    /// Parse a negotiated name, accepting the common aliases clients send.
    pub fn from_label(label: &str) -> Option<Encoding> {
        match label.to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Some(Encoding::Utf8),
            "ISO-8859-1" | "ISO_8859-1" | "LATIN-1" | "LATIN1" => Some(Encoding::Latin1),
            "ISO-8859-2" | "ISO_8859-2" | "LATIN-2" | "LATIN2" => Some(Encoding::Latin2),
            "CP437" | "IBM437" => Some(Encoding::Cp437),
            "US-ASCII" | "ASCII" => Some(Encoding::Ascii),
            _ => None,
        }
    }

    /// Encode one UTF-8 string into this charset for output.
    ///
    /// Characters the charset cannot represent become `?`, matching what
    /// clients of these terminals expect from lossy output.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Latin1 => text
                .chars()
                .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
                .collect(),
            Encoding::Latin2 => text.chars().map(tables::latin2_byte).collect(),
            Encoding::Cp437 => text.chars().map(tables::cp437_byte).collect(),
            Encoding::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_roundtrip() {
        for &enc in NEGOTIABLE {
            assert_eq!(Encoding::from_label(enc.label()), Some(enc));
        }
        assert_eq!(Encoding::from_label(Encoding::Cp437.label()), Some(Encoding::Cp437));
    }

    #[test]
    fn aliases_are_case_insensitive() {
        assert_eq!(Encoding::from_label("latin-2"), Some(Encoding::Latin2));
        assert_eq!(Encoding::from_label("utf8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_label("ibm437"), Some(Encoding::Cp437));
        assert_eq!(Encoding::from_label("KOI8-R"), None);
    }

    #[test]
    fn cp437_is_not_offered() {
        assert!(!NEGOTIABLE.contains(&Encoding::Cp437));
    }

    #[test]
    fn latin1_output_maps_directly() {
        assert_eq!(Encoding::Latin1.encode("caf\u{e9}"), b"caf\xe9");
        assert_eq!(Encoding::Latin1.encode("\u{2014}"), b"?");
    }

    #[test]
    fn ascii_output_strips_high_chars() {
        assert_eq!(Encoding::Ascii.encode("na\u{ef}ve"), b"na?ve");
    }
}
