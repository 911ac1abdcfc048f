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

//! Engine error types.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors the engine can produce.
///
/// Per-connection I/O failures are handled inline by disconnecting the
/// affected session; errors of this type ending up at the top of `run()`
/// are fatal to the whole engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O error outside any single connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error reported by the codec.
    #[error("codec error: {0}")]
    Codec(#[from] mudnet_telnetcodec::CodecError),

    /// A site rule's subnet specification could not be parsed.
    #[error("invalid site mask {spec:?}: {reason}")]
    InvalidSiteMask {
        /// The specification as written.
        spec: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Ports were configured but none could be bound.
    #[error("no listener could be opened for any configured port")]
    NoListeners,

    /// TLS material could not be loaded or used.
    #[error("TLS error: {reason}")]
    Tls {
        /// What went wrong.
        reason: String,
    },

    /// A control or completion channel closed while the engine still
    /// needed it.
    #[error("internal channel closed: {name}")]
    ChannelClosed {
        /// The channel that closed.
        name: &'static str,
    },
}

impl From<tokio_rustls::rustls::Error> for EngineError {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        EngineError::Tls {
            reason: err.to_string(),
        }
    }
}
