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

//! Deferred task scheduling.
//!
//! The event loop wakes when the next task is due; the game layer brings
//! its own scheduler implementation, and [`TaskQueue`] is a minimal one
//! for tests and standalone use. The loop clamps the wait to a one second
//! ceiling so idle sweeps run even with an empty queue.

use crate::types::{ConnectionId, DisconnectReason};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

/// A deferred unit of work.
pub enum Task {
    /// Retry closing a connection whose output has not drained yet.
    CloseRetry(ConnectionId),
    /// Disconnect a connection at a scheduled time.
    Boot(ConnectionId, DisconnectReason),
    /// Arbitrary game-layer work run on the dispatch task.
    Custom(Box<dyn FnOnce() + Send>),
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::CloseRetry(id) => write!(f, "CloseRetry({id})"),
            Task::Boot(id, reason) => write!(f, "Boot({id}, {reason})"),
            Task::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Time-ordered task source driven by the event loop.
pub trait Scheduler: Send {
    /// Remove and return every task due at or before `now`.
    fn run_due_tasks(&mut self, now: Instant) -> Vec<Task>;

    /// When the earliest task is due, if any.
    fn time_of_next_task(&self) -> Option<Instant>;

    /// Defer `task` until `when`, under `tag` for cancellation.
    fn defer_task(&mut self, when: Instant, tag: &str, task: Task);

    /// Drop every pending task carrying `tag`.
    fn cancel_task(&mut self, tag: &str);
}

struct Entry {
    when: Instant,
    seq: u64,
    tag: String,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.when, self.seq).cmp(&(other.when, other.seq))
    }
}

/// Heap-backed [`Scheduler`] good enough for production defaults.
#[derive(Default)]
pub struct TaskQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    seq: u64,
}

impl TaskQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending task count.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// No pending tasks.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Scheduler for TaskQueue {
    fn run_due_tasks(&mut self, now: Instant) -> Vec<Task> {
        let mut due = Vec::new();
        while let Some(Reverse(head)) = self.heap.peek() {
            if head.when > now {
                break;
            }
            let Reverse(entry) = self.heap.pop().expect("peeked entry");
            due.push(entry.task);
        }
        due
    }

    fn time_of_next_task(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.when)
    }

    fn defer_task(&mut self, when: Instant, tag: &str, task: Task) {
        self.seq += 1;
        self.heap.push(Reverse(Entry {
            when,
            seq: self.seq,
            tag: tag.to_string(),
            task,
        }));
    }

    fn cancel_task(&mut self, tag: &str) {
        let kept: Vec<Reverse<Entry>> = self
            .heap
            .drain()
            .filter(|Reverse(entry)| entry.tag != tag)
            .collect();
        self.heap = kept.into();
    }
}
