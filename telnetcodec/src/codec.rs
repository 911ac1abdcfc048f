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

//! The Telnet wire codec.
//!
//! [`TelnetCodec`] is a [`Decoder`]/[`Encoder`] pair for use with
//! `tokio_util::codec`. Decoding classifies each byte and steps a small
//! state machine; negotiation answers are produced inline and buffered in
//! the codec until the caller drains them with [`TelnetCodec::take_pending`].

use crate::args::SubArg;
use crate::consts::{self, MAX_SUBNEG_LEN};
use crate::event::TelnetEvent;
use crate::frame::TelnetFrame;
use crate::options::{OptionPolicy, OptionTable, TelnetOption};
use crate::result::CodecError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// How a single inbound byte is interpreted.
///
/// Command classes only take effect after an IAC; in the normal data state
/// every byte except IAC, CR, LF, BS and DEL is [`ByteClass::Ordinary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteClass {
    /// Plain session data.
    Ordinary,
    /// BS or DEL in the data stream.
    Erase,
    /// LF.
    LineFeed,
    /// CR.
    CarriageReturn,
    /// SE, only meaningful inside a subnegotiation.
    SubEnd,
    /// NOP.
    Nop,
    /// AYT.
    AreYouThere,
    /// EC.
    EraseChar,
    /// Commands acknowledged but discarded (DM, BRK, IP, AO, EL, GA, EOR).
    Ignore,
    /// SB.
    SubBegin,
    /// WILL.
    Will,
    /// WONT.
    Wont,
    /// DO.
    Do,
    /// DONT.
    Dont,
    /// IAC itself.
    Iac,
}

/// Classify a raw inbound byte.
pub fn classify(byte: u8) -> ByteClass {
    match byte {
        consts::IAC => ByteClass::Iac,
        consts::CR => ByteClass::CarriageReturn,
        consts::LF => ByteClass::LineFeed,
        consts::BS | consts::DEL => ByteClass::Erase,
        consts::SE => ByteClass::SubEnd,
        consts::NOP => ByteClass::Nop,
        consts::AYT => ByteClass::AreYouThere,
        consts::EC => ByteClass::EraseChar,
        consts::SB => ByteClass::SubBegin,
        consts::WILL => ByteClass::Will,
        consts::WONT => ByteClass::Wont,
        consts::DO => ByteClass::Do,
        consts::DONT => ByteClass::Dont,
        consts::DM
        | consts::BRK
        | consts::IP
        | consts::AO
        | consts::EL
        | consts::GA
        | consts::EOR_CMD => ByteClass::Ignore,
        _ => ByteClass::Ordinary,
    }
}

/// Decoder position in the Telnet grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecoderState {
    /// Plain data flow.
    #[default]
    Normal,
    /// Saw IAC, expecting a command byte.
    HaveIac,
    /// Saw IAC WILL, expecting an option byte.
    HaveWill,
    /// Saw IAC WONT, expecting an option byte.
    HaveWont,
    /// Saw IAC DO, expecting an option byte.
    HaveDo,
    /// Saw IAC DONT, expecting an option byte.
    HaveDont,
    /// Inside IAC SB, collecting the payload.
    HaveSub,
    /// Saw IAC inside a subnegotiation payload.
    HaveSubIac,
}

/// Stateful Telnet codec for one connection.
#[derive(Debug)]
pub struct TelnetCodec {
    state: DecoderState,
    options: OptionTable,
    /// Collected subnegotiation payload; first byte is the option code.
    sub_buffer: BytesMut,
    /// Set when the current payload overran [`MAX_SUBNEG_LEN`].
    sub_truncated: bool,
    /// Swallow the LF/NUL that pairs with a just-seen CR.
    skip_line_pad: bool,
    /// Outbound protocol bytes produced during decode.
    pending: BytesMut,
}

impl TelnetCodec {
    /// Create a codec with the given option policy.
    pub fn new(policy: OptionPolicy) -> Self {
        TelnetCodec {
            state: DecoderState::Normal,
            options: OptionTable::new(policy),
            sub_buffer: BytesMut::new(),
            sub_truncated: false,
            skip_line_pad: false,
            pending: BytesMut::new(),
        }
    }

    /// The negotiation table, for state inspection.
    pub fn options(&self) -> &OptionTable {
        &self.options
    }

    /// Drain protocol bytes queued during decoding or by `offer_*` calls.
    ///
    /// The caller must transmit these promptly; until it does, the peer is
    /// waiting on our half of a negotiation.
    pub fn take_pending(&mut self) -> Option<Bytes> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.split().freeze())
        }
    }

    /// Open the standard negotiation for a fresh connection.
    ///
    /// Offers SGA and EOR on our side and asks the client for TTYPE, NAWS,
    /// NEW-ENVIRON and CHARSET. START-TLS is offered only when the policy
    /// allows it.
    pub fn offer_initial(&mut self, offer_start_tls: bool) {
        let local = [
            TelnetOption::SuppressGoAhead,
            TelnetOption::EndOfRecord,
            TelnetOption::Charset,
        ];
        for opt in local {
            if let Some(frame) = self.options.enable_local(opt) {
                self.queue_frame(&frame);
            }
        }
        if offer_start_tls {
            if let Some(frame) = self.options.enable_local(TelnetOption::StartTls) {
                self.queue_frame(&frame);
            }
        }
        let remote = [
            TelnetOption::TerminalType,
            TelnetOption::Naws,
            TelnetOption::NewEnviron,
            TelnetOption::Charset,
        ];
        for opt in remote {
            if let Some(frame) = self.options.enable_remote(opt) {
                self.queue_frame(&frame);
            }
        }
    }

    /// Ask the peer to enable an option, queuing the DO when needed.
    pub fn offer_remote(&mut self, opt: TelnetOption) {
        if let Some(frame) = self.options.enable_remote(opt) {
            self.queue_frame(&frame);
        }
    }

    /// Offer an option on our side, queuing the WILL when needed.
    pub fn offer_local(&mut self, opt: TelnetOption) {
        if let Some(frame) = self.options.enable_local(opt) {
            self.queue_frame(&frame);
        }
    }

    /// Queue a subnegotiation to the peer.
    pub fn queue_subnegotiation(&mut self, arg: &SubArg) {
        let frame = TelnetFrame::Subnegotiate(arg.option(), arg.encode_payload());
        self.queue_frame(&frame);
    }

    fn queue_frame(&mut self, frame: &TelnetFrame) {
        encode_frame(frame, &mut self.pending);
    }

    fn finish_subnegotiation(&mut self) -> Option<TelnetEvent> {
        let raw = self.sub_buffer.split();
        let truncated = std::mem::take(&mut self.sub_truncated);
        if truncated {
            tracing::warn!(
                len = raw.len(),
                "oversized subnegotiation truncated at {MAX_SUBNEG_LEN} bytes"
            );
        }
        match SubArg::parse(&raw, truncated) {
            Ok(arg) => Some(TelnetEvent::Subnegotiation(arg)),
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed subnegotiation");
                None
            }
        }
    }

    fn push_sub_byte(&mut self, byte: u8) {
        if self.sub_buffer.len() < MAX_SUBNEG_LEN {
            self.sub_buffer.put_u8(byte);
        } else {
            self.sub_truncated = true;
        }
    }

    /// Step the state machine over one byte; `Some` yields an event to the
    /// caller, `None` means the byte was consumed internally.
    fn step(&mut self, byte: u8) -> Option<TelnetEvent> {
        let class = classify(byte);
        match self.state {
            DecoderState::Normal => {
                if self.skip_line_pad {
                    self.skip_line_pad = false;
                    // LF or NUL directly after CR belongs to the line end.
                    if byte == consts::LF || byte == 0 {
                        return None;
                    }
                }
                match class {
                    ByteClass::Iac => {
                        self.state = DecoderState::HaveIac;
                        None
                    }
                    ByteClass::CarriageReturn => {
                        self.skip_line_pad = true;
                        Some(TelnetEvent::EndOfLine)
                    }
                    ByteClass::LineFeed => Some(TelnetEvent::LineFeed),
                    ByteClass::Erase => Some(TelnetEvent::EraseChar),
                    // Command classes are data outside an IAC context.
                    _ => Some(TelnetEvent::Data(byte)),
                }
            }
            DecoderState::HaveIac => self.step_command(byte, class),
            DecoderState::HaveWill => {
                self.state = DecoderState::Normal;
                let (reply, event) = self.options.recv_will(TelnetOption::from(byte));
                if let Some(frame) = reply {
                    self.queue_frame(&frame);
                }
                event
            }
            DecoderState::HaveWont => {
                self.state = DecoderState::Normal;
                let (reply, event) = self.options.recv_wont(TelnetOption::from(byte));
                if let Some(frame) = reply {
                    self.queue_frame(&frame);
                }
                event
            }
            DecoderState::HaveDo => {
                self.state = DecoderState::Normal;
                let (reply, event) = self.options.recv_do(TelnetOption::from(byte));
                if let Some(frame) = reply {
                    self.queue_frame(&frame);
                }
                event
            }
            DecoderState::HaveDont => {
                self.state = DecoderState::Normal;
                let (reply, event) = self.options.recv_dont(TelnetOption::from(byte));
                if let Some(frame) = reply {
                    self.queue_frame(&frame);
                }
                event
            }
            DecoderState::HaveSub => match class {
                ByteClass::Iac => {
                    self.state = DecoderState::HaveSubIac;
                    None
                }
                _ => {
                    self.push_sub_byte(byte);
                    None
                }
            },
            DecoderState::HaveSubIac => match class {
                ByteClass::SubEnd => {
                    self.state = DecoderState::Normal;
                    self.finish_subnegotiation()
                }
                ByteClass::Iac => {
                    // Escaped 0xFF inside the payload.
                    self.state = DecoderState::HaveSub;
                    self.push_sub_byte(consts::IAC);
                    None
                }
                _ => {
                    // The peer broke out of the subnegotiation without SE.
                    // Drop the partial payload and honor the new command.
                    tracing::warn!(byte, "subnegotiation aborted by IAC command");
                    self.sub_buffer.clear();
                    self.sub_truncated = false;
                    self.step_command(byte, class)
                }
            },
        }
    }

    /// Handle the byte that follows an IAC.
    fn step_command(&mut self, byte: u8, class: ByteClass) -> Option<TelnetEvent> {
        self.state = DecoderState::Normal;
        match class {
            ByteClass::Iac => Some(TelnetEvent::Data(consts::IAC)),
            ByteClass::Will => {
                self.state = DecoderState::HaveWill;
                None
            }
            ByteClass::Wont => {
                self.state = DecoderState::HaveWont;
                None
            }
            ByteClass::Do => {
                self.state = DecoderState::HaveDo;
                None
            }
            ByteClass::Dont => {
                self.state = DecoderState::HaveDont;
                None
            }
            ByteClass::SubBegin => {
                self.state = DecoderState::HaveSub;
                self.sub_buffer.clear();
                self.sub_truncated = false;
                None
            }
            ByteClass::Nop | ByteClass::Ignore => None,
            ByteClass::AreYouThere => Some(TelnetEvent::AreYouThere),
            ByteClass::EraseChar => Some(TelnetEvent::EraseChar),
            ByteClass::SubEnd => {
                // SE without a matching SB. Ignore it.
                tracing::debug!("stray IAC SE outside subnegotiation");
                None
            }
            _ => {
                tracing::debug!(byte, "unknown command after IAC ignored");
                None
            }
        }
    }
}

impl Default for TelnetCodec {
    fn default() -> Self {
        Self::new(OptionPolicy::default())
    }
}

impl Decoder for TelnetCodec {
    type Item = TelnetEvent;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<TelnetEvent>, CodecError> {
        while src.has_remaining() {
            let byte = src.get_u8();
            if let Some(event) = self.step(byte) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }
}

impl Encoder<TelnetFrame> for TelnetCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: TelnetFrame, dst: &mut BytesMut) -> Result<(), CodecError> {
        encode_frame(&frame, dst);
        Ok(())
    }
}

impl Encoder<&[u8]> for TelnetCodec {
    type Error = CodecError;

    /// Encode application bytes, doubling any IAC.
    fn encode(&mut self, data: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
        put_escaped(data, dst);
        Ok(())
    }
}

fn put_escaped(data: &[u8], dst: &mut BytesMut) {
    dst.reserve(data.len());
    for &b in data {
        if b == consts::IAC {
            dst.put_u8(consts::IAC);
        }
        dst.put_u8(b);
    }
}

fn encode_frame(frame: &TelnetFrame, dst: &mut BytesMut) {
    match frame {
        TelnetFrame::Data(data) => put_escaped(data, dst),
        TelnetFrame::Will(opt) => {
            dst.put_slice(&[consts::IAC, consts::WILL, opt.as_byte()]);
        }
        TelnetFrame::Wont(opt) => {
            dst.put_slice(&[consts::IAC, consts::WONT, opt.as_byte()]);
        }
        TelnetFrame::Do(opt) => {
            dst.put_slice(&[consts::IAC, consts::DO, opt.as_byte()]);
        }
        TelnetFrame::Dont(opt) => {
            dst.put_slice(&[consts::IAC, consts::DONT, opt.as_byte()]);
        }
        TelnetFrame::Subnegotiate(opt, payload) => {
            dst.put_slice(&[consts::IAC, consts::SB, opt.as_byte()]);
            put_escaped(payload, dst);
            dst.put_slice(&[consts::IAC, consts::SE]);
        }
        TelnetFrame::Nop => dst.put_slice(&[consts::IAC, consts::NOP]),
        TelnetFrame::GoAhead => dst.put_slice(&[consts::IAC, consts::GA]),
        TelnetFrame::EndOfRecord => dst.put_slice(&[consts::IAC, consts::EOR_CMD]),
        TelnetFrame::AreYouThere => dst.put_slice(&[consts::IAC, consts::AYT]),
    }
}
