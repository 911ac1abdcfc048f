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

//! Per-connection output queue.
//!
//! Output is a chain of byte blocks drained strictly in order. Short
//! writes advance a cursor inside the head block; a block submitted to an
//! async writer is locked until its completion arrives so the same bytes
//! are never written twice.
//!
//! Liveness: [`OutputQueue::enqueue`] reports when it made an empty queue
//! non-empty. The caller must then schedule a service pass; nothing else
//! will.

use bytes::Bytes;
use std::collections::VecDeque;
use std::io;

/// Destination for queue service. `TcpStream::try_write` in production,
/// scripted sinks in tests.
pub trait WriteSink {
    /// Attempt one nonblocking write, returning bytes accepted.
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl WriteSink for tokio::net::TcpStream {
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_write(self, buf)
    }
}

#[derive(Debug)]
struct OutputBlock {
    data: Bytes,
    /// Bytes already written out of `data`.
    start: usize,
    /// An async write of the remainder is in flight.
    locked: bool,
}

impl OutputBlock {
    fn remaining(&self) -> &[u8] {
        &self.data[self.start..]
    }
}

/// Ordered outbound byte blocks for one connection.
#[derive(Debug, Default)]
pub struct OutputQueue {
    blocks: VecDeque<OutputBlock>,
    queued: usize,
    total_enqueued: u64,
    total_written: u64,
}

impl OutputQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block.
    ///
    /// Returns true when the queue was empty, in which case the caller
    /// must schedule a service pass.
    #[must_use = "an enqueue onto an empty queue must schedule service"]
    pub fn enqueue(&mut self, data: Bytes) -> bool {
        if data.is_empty() {
            return false;
        }
        let was_empty = self.blocks.is_empty();
        self.queued += data.len();
        self.total_enqueued += data.len() as u64;
        self.blocks.push_back(OutputBlock {
            data,
            start: 0,
            locked: false,
        });
        was_empty
    }

    /// Write as much as the sink will take right now.
    ///
    /// Stops on a locked head, a short write, or `WouldBlock`. A hard
    /// error is returned for the caller to treat as a dead connection.
    pub fn service(&mut self, sink: &mut dyn WriteSink) -> io::Result<usize> {
        let mut written = 0;
        while let Some(head) = self.blocks.front_mut() {
            if head.locked {
                break;
            }
            let n = match sink.try_write(head.remaining()) {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err),
            };
            written += n;
            self.queued -= n;
            self.total_written += n as u64;
            head.start += n;
            if head.start < head.data.len() {
                // Short write; the socket buffer is full.
                break;
            }
            self.blocks.pop_front();
        }
        Ok(written)
    }

    /// Lock the head block and hand out its remainder for an async write.
    ///
    /// Returns `None` when the queue is empty or the head is already out
    /// with a writer.
    pub fn lock_head_for_async(&mut self) -> Option<Bytes> {
        let head = self.blocks.front_mut()?;
        if head.locked {
            return None;
        }
        head.locked = true;
        Some(head.data.slice(head.start..))
    }

    /// Record completion of an async write of `n` bytes of the locked
    /// head.
    pub fn complete_async(&mut self, n: usize) {
        let Some(head) = self.blocks.front_mut() else {
            return;
        };
        debug_assert!(head.locked, "completion without a locked head");
        head.locked = false;
        let n = n.min(head.data.len() - head.start);
        head.start += n;
        self.queued -= n;
        self.total_written += n as u64;
        if head.start >= head.data.len() {
            self.blocks.pop_front();
        }
    }

    /// Blocks in the chain.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// No blocks queued.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Bytes currently queued.
    pub fn queued_bytes(&self) -> usize {
        self.queued
    }

    /// Lifetime bytes accepted into the queue.
    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued
    }

    /// Lifetime bytes drained to a sink.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink following a script of per-call results.
    struct ScriptedSink {
        script: VecDeque<io::Result<usize>>,
        accepted: Vec<u8>,
    }

    impl ScriptedSink {
        fn new(script: Vec<io::Result<usize>>) -> Self {
            ScriptedSink {
                script: script.into(),
                accepted: Vec::new(),
            }
        }
    }

    impl WriteSink for ScriptedSink {
        fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Ok(n)) => {
                    let n = n.min(buf.len());
                    self.accepted.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
                Some(Err(err)) => Err(err),
                None => Ok(buf.len()),
            }
        }
    }

    fn would_block() -> io::Error {
        io::Error::new(io::ErrorKind::WouldBlock, "full")
    }

    #[test]
    fn enqueue_reports_empty_to_nonempty_edge() {
        let mut queue = OutputQueue::new();
        assert!(queue.enqueue(Bytes::from_static(b"a")));
        assert!(!queue.enqueue(Bytes::from_static(b"b")));
        assert!(!queue.enqueue(Bytes::new()), "empty block is a no-op");
    }

    #[test]
    fn ordering_survives_short_writes_and_would_block() {
        let mut queue = OutputQueue::new();
        let _ = queue.enqueue(Bytes::from_static(b"hello "));
        let _ = queue.enqueue(Bytes::from_static(b"world"));

        let mut sink = ScriptedSink::new(vec![
            Ok(3),              // short write inside "hello "
            Ok(3),              // finishes "hello "
            Err(would_block()), // socket full
            Ok(5),              // "world"
        ]);
        assert_eq!(queue.service(&mut sink).unwrap(), 3);
        assert_eq!(queue.service(&mut sink).unwrap(), 3);
        assert!(!queue.is_empty());
        assert_eq!(queue.service(&mut sink).unwrap(), 5);
        assert!(queue.is_empty());
        assert_eq!(sink.accepted, b"hello world");
        assert_eq!(queue.total_written(), 11);
    }

    #[test]
    fn hard_error_propagates() {
        let mut queue = OutputQueue::new();
        let _ = queue.enqueue(Bytes::from_static(b"x"));
        let mut sink = ScriptedSink::new(vec![Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "gone",
        ))]);
        assert!(queue.service(&mut sink).is_err());
    }

    #[test]
    fn locked_head_is_never_serviced_or_resubmitted() {
        let mut queue = OutputQueue::new();
        let _ = queue.enqueue(Bytes::from_static(b"async"));
        let _ = queue.enqueue(Bytes::from_static(b"later"));

        let chunk = queue.lock_head_for_async().unwrap();
        assert_eq!(&chunk[..], b"async");
        assert!(queue.lock_head_for_async().is_none(), "head already out");

        // Sync service must not touch the locked head.
        let mut sink = ScriptedSink::new(vec![]);
        assert_eq!(queue.service(&mut sink).unwrap(), 0);

        queue.complete_async(chunk.len());
        assert_eq!(queue.lock_head_for_async().unwrap(), &b"later"[..]);
    }

    #[test]
    fn partial_async_completion_advances_cursor() {
        let mut queue = OutputQueue::new();
        let _ = queue.enqueue(Bytes::from_static(b"abcdef"));
        let chunk = queue.lock_head_for_async().unwrap();
        assert_eq!(chunk.len(), 6);
        queue.complete_async(2);
        assert_eq!(queue.queued_bytes(), 4);
        assert_eq!(queue.lock_head_for_async().unwrap(), &b"cdef"[..]);
    }

    #[test]
    fn counters_track_lifetime_totals() {
        let mut queue = OutputQueue::new();
        let _ = queue.enqueue(Bytes::from_static(b"12345"));
        let mut sink = ScriptedSink::new(vec![]);
        queue.service(&mut sink).unwrap();
        assert_eq!(queue.total_enqueued(), 5);
        assert_eq!(queue.total_written(), 5);
        assert_eq!(queue.queued_bytes(), 0);
    }
}
