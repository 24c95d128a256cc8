// connector.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::frame::FrameRef;
use crate::util::ThreadSafeQueue;

/// Input side of a module: one bounded conveyor per worker.
pub struct Connector {
    conveyors: Vec<ThreadSafeQueue<FrameRef>>,
    stopped: AtomicBool,
}

impl Connector {
    pub fn new(conveyor_count: usize, capacity: usize) -> Self {
        Self {
            conveyors: (0..conveyor_count)
                .map(|_| ThreadSafeQueue::bounded(capacity))
                .collect(),
            stopped: AtomicBool::new(true),
        }
    }

    pub fn conveyor_count(&self) -> usize {
        self.conveyors.len()
    }

    /// Conveyor serving the stream with this index.
    pub fn conveyor_for(&self, stream_index: u32) -> usize {
        stream_index as usize % self.conveyors.len().max(1)
    }

    pub fn start(&self) {
        self.stopped.store(false, Ordering::Release);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for room on `conveyor`. The frame is handed
    /// back when the conveyor stayed full.
    pub fn push(&self, conveyor: usize, frame: FrameRef, timeout: Duration) -> Result<(), FrameRef> {
        match self.conveyors.get(conveyor) {
            Some(queue) => queue.push_timeout(frame, timeout),
            None => Err(frame),
        }
    }

    pub fn pop(&self, conveyor: usize, timeout: Duration) -> Option<FrameRef> {
        self.conveyors.get(conveyor)?.wait_and_try_pop(timeout)
    }

    /// Drop every queued frame, returns how many were dropped.
    pub fn empty(&self) -> usize {
        self.conveyors.iter().map(|q| q.clear()).sum()
    }

    /// Frames waiting on each conveyor.
    pub fn cache_sizes(&self) -> Vec<usize> {
        self.conveyors.iter().map(|q| q.len()).collect()
    }
}
