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

//! Telnet protocol codec for the mudnet engine.
//!
//! Implements the RFC 854 wire grammar as a byte-classifying state machine,
//! RFC 1143 option negotiation, and typed payloads for the subnegotiations
//! a text-game server cares about: NAWS, TERMINAL-TYPE, NEW-ENVIRON and
//! OLD-ENVIRON, CHARSET, and START-TLS.
//!
//! The central type is [`TelnetCodec`], a `tokio_util::codec` decoder and
//! encoder. Decoding yields [`TelnetEvent`]s; negotiation answers the codec
//! generates on its own are buffered and drained with
//! [`TelnetCodec::take_pending`].

pub mod args;
pub mod codec;
pub mod consts;
pub mod event;
pub mod frame;
pub mod options;
pub mod result;

pub use args::{CharsetCmd, EnvironCmd, EnvironVar, StartTls, SubArg, TtypeCmd, WindowSize};
pub use codec::{classify, ByteClass, TelnetCodec};
pub use event::{TelnetEvent, TelnetSide};
pub use frame::TelnetFrame;
pub use options::{OptionPolicy, OptionTable, QState, TelnetOption};
pub use result::{CodecError, CodecResult};
