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

//! Connection engine for the mudnet server.
//!
//! Owns everything between the listening sockets and the game: accepting
//! and refusing connections, telnet negotiation and charset decoding via
//! the codec crates, per-connection output queues, hostname resolution,
//! and the disconnect lifecycle. The game plugs in through
//! [`SessionHandler`] callbacks and an [`EngineHandle`] for outbound
//! traffic.
//!
//! Two interchangeable event loops drive the same session machinery: a
//! single-task readiness loop and a completion loop built from helper
//! tasks, selected with [`LoopModel`]. Behavior on the wire is identical
//! either way.
//!
//! ```no_run
//! use mudnet_engine::{EngineConfig, NullHandler, Server};
//!
//! # async fn demo() -> mudnet_engine::EngineResult<()> {
//! let server = Server::new(EngineConfig::default(), NullHandler);
//! let bound = server.bind().await?;
//! bound.run().await
//! # }
//! ```

pub mod access;
pub mod config;
pub mod error;
mod event_loop;
pub mod handler;
pub mod listener;
pub mod metrics;
pub mod outqueue;
mod proactor;
mod reactor;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod tls;
pub mod types;

pub use access::{SiteAccess, SiteClass, SiteRule, SiteRules, Subnet};
pub use config::{EngineConfig, LoopModel, PortConfig};
pub use error::{EngineError, EngineResult};
pub use handler::{NullHandler, SessionHandler};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use outqueue::{OutputQueue, WriteSink};
pub use scheduler::{Scheduler, Task, TaskQueue};
pub use server::{BoundServer, EngineHandle, Server};
pub use session::{Session, SessionAction};
pub use types::{
    ConnectionId, ConnectionInfo, DisconnectReason, DisconnectRecord, PlayerRef, SessionState,
};
