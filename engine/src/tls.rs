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

//! TLS acceptor setup.
//!
//! One loaded context serves both dedicated TLS ports and in-place
//! START-TLS upgrades of plaintext sessions.

use crate::error::{EngineError, EngineResult};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

/// Server-side TLS state shared by all listeners.
#[derive(Clone)]
pub struct TlsContext {
    acceptor: TlsAcceptor,
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext").finish_non_exhaustive()
    }
}

impl TlsContext {
    /// Load a PEM certificate chain and private key.
    pub fn load(cert_pem: &Path, key_pem: &Path) -> EngineResult<TlsContext> {
        let certs = read_certs(cert_pem)?;
        let key = read_key(key_pem)?;
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(TlsContext {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }

    /// The acceptor used for handshakes.
    pub fn acceptor(&self) -> &TlsAcceptor {
        &self.acceptor
    }
}

fn read_certs(path: &Path) -> EngineResult<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut reader).collect::<Result<_, _>>()?;
    if certs.is_empty() {
        return Err(EngineError::Tls {
            reason: format!("no certificates in {}", path.display()),
        });
    }
    Ok(certs)
}

fn read_key(path: &Path) -> EngineResult<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| EngineError::Tls {
        reason: format!("no private key in {}", path.display()),
    })
}
