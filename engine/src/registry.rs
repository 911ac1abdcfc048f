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

//! Connection registry.
//!
//! Owned exclusively by the dispatch task, so plain collections suffice.
//! Ids are monotonic and never reused; removal happens exactly once per
//! connection.

use crate::session::Session;
use crate::types::ConnectionId;
use std::collections::HashMap;

/// All live sessions, keyed by id.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: HashMap<ConnectionId, Session>,
    next_id: u64,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id. Ids are handed out exactly once.
    pub fn allocate_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId(self.next_id)
    }

    /// Register a session under its id.
    pub fn insert(&mut self, session: Session) {
        let id = session.id();
        let prior = self.sessions.insert(id, session);
        debug_assert!(prior.is_none(), "connection id reused");
    }

    /// Borrow a session mutably.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Borrow a session.
    pub fn get(&self, id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Remove a session, returning it for final accounting.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Snapshot of live ids, safe to iterate while mutating the registry.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.sessions.keys().copied().collect()
    }

    /// Live session count.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// No live sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn session(id: ConnectionId) -> Session {
        Session::new(
            id,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000),
            false,
            false,
            &EngineConfig::default(),
        )
    }

    #[test]
    fn ids_are_monotonic_and_unique() {
        let mut registry = Registry::new();
        let a = registry.allocate_id();
        let b = registry.allocate_id();
        assert!(b > a);

        registry.insert(session(a));
        registry.insert(session(b));
        assert!(registry.remove(a).is_some());
        let c = registry.allocate_id();
        assert!(c > b, "removed ids are never reissued");
    }

    #[test]
    fn ids_snapshot_allows_mutation_during_iteration() {
        let mut registry = Registry::new();
        for _ in 0..3 {
            let id = registry.allocate_id();
            registry.insert(session(id));
        }
        for id in registry.ids() {
            registry.remove(id);
        }
        assert!(registry.is_empty());
    }
}
