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

//! Reverse-DNS offload pool.
//!
//! Hostname lookups block, so they run on a small fixed pool behind a
//! bounded queue. Resolution is cosmetic: a full queue drops the request
//! and the connection keeps its numeric address. Nothing here may ever
//! stall the event loop.

use crate::metrics::EngineMetrics;
use crate::types::ConnectionId;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Restarts granted to each worker before the pool degrades.
const RESTART_BUDGET: u32 = 3;
const RESTART_DELAY: Duration = Duration::from_secs(1);

struct ResolveRequest {
    id: ConnectionId,
    addr: IpAddr,
}

/// A finished lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveResult {
    /// The connection that asked.
    pub id: ConnectionId,
    /// The resolved hostname.
    pub hostname: String,
}

/// Handle to the running pool.
pub struct ResolverPool {
    tx: mpsc::Sender<ResolveRequest>,
    results: mpsc::Receiver<ResolveResult>,
    metrics: Arc<EngineMetrics>,
}

impl std::fmt::Debug for ResolverPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverPool").finish_non_exhaustive()
    }
}

impl ResolverPool {
    /// Spawn `workers` lookup workers behind a queue of `queue` requests.
    pub fn start(workers: usize, queue: usize, metrics: Arc<EngineMetrics>) -> ResolverPool {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let (result_tx, results) = mpsc::channel(queue.max(1));
        let rx = Arc::new(Mutex::new(rx));
        for worker in 0..workers.max(1) {
            tokio::spawn(supervise(
                worker,
                rx.clone(),
                result_tx.clone(),
                metrics.clone(),
            ));
        }
        ResolverPool {
            tx,
            results,
            metrics,
        }
    }

    /// Ask for the hostname of `addr`. A full queue drops the request;
    /// the caller keeps the numeric address either way.
    pub fn request(&self, id: ConnectionId, addr: IpAddr) {
        if self.tx.try_send(ResolveRequest { id, addr }).is_err() {
            self.metrics.dns_dropped();
            tracing::debug!(%id, %addr, "dns queue full, keeping numeric address");
        }
    }

    /// Await the next finished lookup. Pends forever once the pool has
    /// fully degraded, which is safe inside `select!`.
    pub async fn next(&mut self) -> Option<ResolveResult> {
        self.results.recv().await
    }

    /// Collect every finished lookup without waiting.
    pub fn drain(&mut self) -> Vec<ResolveResult> {
        let mut out = Vec::new();
        while let Ok(result) = self.results.try_recv() {
            out.push(result);
        }
        out
    }
}

async fn supervise(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<ResolveRequest>>>,
    result_tx: mpsc::Sender<ResolveResult>,
    metrics: Arc<EngineMetrics>,
) {
    let mut restarts = 0u32;
    loop {
        let handle = tokio::spawn(run_worker(rx.clone(), result_tx.clone(), metrics.clone()));
        match handle.await {
            // Normal exit: the request channel closed.
            Ok(()) => return,
            Err(err) if err.is_panic() => {
                restarts += 1;
                if restarts > RESTART_BUDGET {
                    tracing::error!(
                        worker,
                        "dns worker exceeded restart budget, lookups degraded to numeric"
                    );
                    return;
                }
                tracing::warn!(worker, restarts, "dns worker panicked, restarting");
                tokio::time::sleep(RESTART_DELAY).await;
            }
            Err(_) => return,
        }
    }
}

async fn run_worker(
    rx: Arc<Mutex<mpsc::Receiver<ResolveRequest>>>,
    result_tx: mpsc::Sender<ResolveResult>,
    metrics: Arc<EngineMetrics>,
) {
    loop {
        // Hold the lock only for the recv so workers share the queue.
        let request = { rx.lock().await.recv().await };
        let Some(request) = request else {
            return;
        };
        let addr = request.addr;
        let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr)).await;
        match lookup {
            Ok(Ok(hostname)) => {
                metrics.dns_resolved();
                let result = ResolveResult {
                    id: request.id,
                    hostname,
                };
                // The loop drains results each pass; a full channel only
                // means it is behind, and the name is expendable.
                if result_tx.try_send(result).is_err() {
                    metrics.dns_dropped();
                }
            }
            Ok(Err(err)) => {
                tracing::debug!(%addr, error = %err, "reverse lookup failed");
            }
            Err(join_err) => {
                tracing::warn!(%addr, error = %join_err, "lookup task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saturated_queue_drops_not_errors() {
        let metrics = Arc::new(EngineMetrics::default());
        // Single-threaded test runtime and no await between sends, so the
        // worker never gets to drain the queue.
        let pool = ResolverPool::start(1, 2, metrics.clone());
        for n in 0..50u64 {
            pool.request(ConnectionId(n), IpAddr::from([127, 0, 0, 1]));
        }
        assert!(metrics.snapshot().dns_dropped >= 48);
    }

    #[tokio::test]
    async fn drain_is_nonblocking_when_empty() {
        let metrics = Arc::new(EngineMetrics::default());
        let mut pool = ResolverPool::start(1, 4, metrics);
        assert!(pool.drain().is_empty());
    }
}
