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

//! Outbound Telnet frames.

use crate::options::TelnetOption;
use bytes::Bytes;

/// A single outbound unit handed to the encoder.
///
/// Application text goes out as [`TelnetFrame::Data`] and gets IAC-escaped;
/// everything else is protocol machinery emitted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetFrame {
    /// Raw application bytes. Any 0xFF inside is doubled on the wire.
    Data(Bytes),
    /// IAC WILL `option`.
    Will(TelnetOption),
    /// IAC WONT `option`.
    Wont(TelnetOption),
    /// IAC DO `option`.
    Do(TelnetOption),
    /// IAC DONT `option`.
    Dont(TelnetOption),
    /// IAC SB `option` `payload` IAC SE. Payload 0xFF bytes are doubled.
    Subnegotiate(TelnetOption, Bytes),
    /// IAC NOP, used as a keepalive probe.
    Nop,
    /// IAC GA.
    GoAhead,
    /// IAC EOR, the end-of-record prompt marker.
    EndOfRecord,
    /// IAC AYT.
    AreYouThere,
}
