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

//! Error types for codec operations.
//!
//! Most malformed input is handled in-line (discarded with a warning) per the
//! engine's error taxonomy; `CodecError` covers the cases that genuinely stop
//! a decode or encode.

use crate::options::TelnetOption;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors produced while encoding or decoding the Telnet stream.
#[derive(Debug, Error)]
pub enum CodecError {
    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Option negotiation reached an impossible state.
    #[error("negotiation error: {reason}")]
    Negotiation {
        /// What went wrong.
        reason: String,
    },

    /// A subnegotiation payload could not be parsed.
    #[error("bad {option} subnegotiation: {reason}")]
    Subnegotiation {
        /// The option whose payload was malformed.
        option: TelnetOption,
        /// What was wrong with the payload.
        reason: String,
    },
}
