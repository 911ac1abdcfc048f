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

//! High-byte translation tables for the single-byte charsets.
//!
//! Each table maps bytes 0x80..=0xFF to their Unicode code point. Decode
//! helpers return `None` for bytes the charset treats as non-printable so
//! the line decoder can drop them.

/// ISO-8859-1 high half. Identity with Unicode; 0x80..0x9F are C1 controls.
pub const LATIN1: [char; 128] = {
    let mut table = ['\0'; 128];
    let mut i = 0;
    while i < 128 {
        table[i] = (0x80 + i as u32) as u8 as char;
        i += 1;
    }
    table
};

/// ISO-8859-2 high half.
pub const LATIN2: [char; 128] = [
    // 0x80..=0x9F, C1 controls kept for table completeness.
    '\u{80}', '\u{81}', '\u{82}', '\u{83}', '\u{84}', '\u{85}', '\u{86}', '\u{87}',
    '\u{88}', '\u{89}', '\u{8A}', '\u{8B}', '\u{8C}', '\u{8D}', '\u{8E}', '\u{8F}',
    '\u{90}', '\u{91}', '\u{92}', '\u{93}', '\u{94}', '\u{95}', '\u{96}', '\u{97}',
    '\u{98}', '\u{99}', '\u{9A}', '\u{9B}', '\u{9C}', '\u{9D}', '\u{9E}', '\u{9F}',
    // 0xA0..=0xAF
    '\u{A0}', 'Ą', '˘', 'Ł', '¤', 'Ľ', 'Ś', '§',
    '¨', 'Š', 'Ş', 'Ť', 'Ź', '\u{AD}', 'Ž', 'Ż',
    // 0xB0..=0xBF
    '°', 'ą', '˛', 'ł', '´', 'ľ', 'ś', 'ˇ',
    '¸', 'š', 'ş', 'ť', 'ź', '˝', 'ž', 'ż',
    // 0xC0..=0xCF
    'Ŕ', 'Á', 'Â', 'Ă', 'Ä', 'Ĺ', 'Ć', 'Ç',
    'Č', 'É', 'Ę', 'Ë', 'Ě', 'Í', 'Î', 'Ď',
    // 0xD0..=0xDF
    'Đ', 'Ń', 'Ň', 'Ó', 'Ô', 'Ő', 'Ö', '×',
    'Ř', 'Ů', 'Ú', 'Ű', 'Ü', 'Ý', 'Ţ', 'ß',
    // 0xE0..=0xEF
    'ŕ', 'á', 'â', 'ă', 'ä', 'ĺ', 'ć', 'ç',
    'č', 'é', 'ę', 'ë', 'ě', 'í', 'î', 'ď',
    // 0xF0..=0xFF
    'đ', 'ń', 'ň', 'ó', 'ô', 'ő', 'ö', '÷',
    'ř', 'ů', 'ú', 'ű', 'ü', 'ý', 'ţ', '˙',
];

/// IBM code page 437 high half.
pub const CP437: [char; 128] = [
    // 0x80..=0x8F
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç',
    'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    // 0x90..=0x9F
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù',
    'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    // 0xA0..=0xAF
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º',
    '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    // 0xB0..=0xBF
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖',
    '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    // 0xC0..=0xCF
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟',
    '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    // 0xD0..=0xDF
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫',
    '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    // 0xE0..=0xEF
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ',
    'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    // 0xF0..=0xFF
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈',
    '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{A0}',
];

fn ascii_printable(byte: u8) -> Option<char> {
    if byte == b'\t' || (0x20..0x7F).contains(&byte) {
        Some(byte as char)
    } else {
        None
    }
}

/// Decode one ISO-8859-1 byte; `None` when non-printable.
pub fn decode_latin1(byte: u8) -> Option<char> {
    match byte {
        0x00..=0x7F => ascii_printable(byte),
        0x80..=0x9F => None,
        _ => Some(LATIN1[byte as usize - 0x80]),
    }
}

/// Decode one ISO-8859-2 byte; `None` when non-printable.
pub fn decode_latin2(byte: u8) -> Option<char> {
    match byte {
        0x00..=0x7F => ascii_printable(byte),
        0x80..=0x9F => None,
        _ => Some(LATIN2[byte as usize - 0x80]),
    }
}

/// Decode one CP437 byte; `None` when non-printable. High bytes are all
/// printable glyphs in this set.
pub fn decode_cp437(byte: u8) -> Option<char> {
    match byte {
        0x00..=0x7F => ascii_printable(byte),
        _ => Some(CP437[byte as usize - 0x80]),
    }
}

/// Decode one US-ASCII byte; `None` for high or control bytes.
pub fn decode_ascii(byte: u8) -> Option<char> {
    if byte < 0x80 {
        ascii_printable(byte)
    } else {
        None
    }
}

/// Encode one char as ISO-8859-2, `?` when unrepresentable.
pub fn latin2_byte(c: char) -> u8 {
    if c.is_ascii() {
        return c as u8;
    }
    match LATIN2[32..].iter().position(|&t| t == c) {
        Some(i) => (i + 0xA0) as u8,
        None => b'?',
    }
}

/// Encode one char as CP437, `?` when unrepresentable.
pub fn cp437_byte(c: char) -> u8 {
    if c.is_ascii() {
        return c as u8;
    }
    match CP437.iter().position(|&t| t == c) {
        Some(i) => (i + 0x80) as u8,
        None => b'?',
    }
}
