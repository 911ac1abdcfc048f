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

//! Engine-to-game callback seam.

use crate::types::{ConnectionId, ConnectionInfo, DisconnectRecord};
use async_trait::async_trait;
use mudnet_telnetcodec::TelnetEvent;

/// Callbacks the engine invokes on the dispatch task.
///
/// Every method has a no-op default so a handler implements only what it
/// needs. Implementations must not block; long work belongs behind the
/// game's own scheduler.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// A connection passed the access check and is registered.
    async fn on_connect(&self, id: ConnectionId, info: &ConnectionInfo) {
        let _ = (id, info);
    }

    /// One complete command line arrived.
    async fn on_line(&self, id: ConnectionId, line: String) {
        let _ = (id, line);
    }

    /// A connection ended; `record` is the final accounting and is
    /// delivered exactly once.
    async fn on_disconnect(&self, record: &DisconnectRecord) {
        let _ = record;
    }

    /// A protocol option settled or a subnegotiation arrived, for
    /// handlers that care about terminal capabilities.
    async fn on_option(&self, id: ConnectionId, event: &TelnetEvent) {
        let _ = (id, event);
    }
}

/// Handler that ignores everything, for tests and tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

#[async_trait]
impl SessionHandler for NullHandler {}
