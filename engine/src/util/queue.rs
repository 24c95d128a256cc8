// queue.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Blocking FIFO shared between producer and consumer threads.
///
/// An unbounded queue never blocks on push. A bounded queue blocks
/// producers while it holds `capacity` items.
pub struct ThreadSafeQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

impl<T> Default for ThreadSafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ThreadSafeQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: None,
        }
    }

    /// A zero capacity is bumped to one so that a push can ever succeed.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: Some(capacity.max(1)),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn is_full(&self, items: &VecDeque<T>) -> bool {
        matches!(self.capacity, Some(cap) if items.len() >= cap)
    }

    /// Push, waiting for free space on a bounded queue.
    pub fn push(&self, value: T) {
        let mut items = self.items.lock();
        while self.is_full(&items) {
            self.not_full.wait(&mut items);
        }
        items.push_back(value);
        drop(items);
        self.not_empty.notify_one();
    }

    /// Push without waiting. The value is handed back when the queue is full.
    pub fn try_push(&self, value: T) -> std::result::Result<(), T> {
        let mut items = self.items.lock();
        if self.is_full(&items) {
            return Err(value);
        }
        items.push_back(value);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Push, waiting at most `timeout` for free space.
    pub fn push_timeout(&self, value: T, timeout: Duration) -> std::result::Result<(), T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        while self.is_full(&items) {
            if self.not_full.wait_until(&mut items, deadline).timed_out() && self.is_full(&items) {
                return Err(value);
            }
        }
        items.push_back(value);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }

    pub fn try_pop(&self) -> Option<T> {
        let value = self.items.lock().pop_front();
        if value.is_some() {
            self.not_full.notify_one();
        }
        value
    }

    pub fn wait_and_pop(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(value) = items.pop_front() {
                drop(items);
                self.not_full.notify_one();
                return value;
            }
            self.not_empty.wait(&mut items);
        }
    }

    /// Pop, waiting at most `timeout` for an item.
    pub fn wait_and_try_pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        loop {
            if let Some(value) = items.pop_front() {
                drop(items);
                self.not_full.notify_one();
                return Some(value);
            }
            if self.not_empty.wait_until(&mut items, deadline).timed_out() {
                let value = items.pop_front();
                if value.is_some() {
                    drop(items);
                    self.not_full.notify_one();
                }
                return value;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drop every queued item and wake blocked producers.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut items = self.items.lock();
            let n = items.len();
            items.clear();
            n
        };
        self.not_full.notify_all();
        removed
    }
}
