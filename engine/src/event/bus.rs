// bus.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use super::event::{Event, EventHandleFlag};
use super::BUS_POLL_INTERVAL_MS;
use crate::error::{Result, StreamDagError};
use crate::util::ThreadSafeQueue;

pub type BusWatcher = Box<dyn Fn(&Event) -> EventHandleFlag + Send + Sync>;

/// Serializes events posted from any worker and hands them to the
/// registered watchers on one dedicated thread.
pub struct EventBus {
    queue: ThreadSafeQueue<Event>,
    // Kept apart from the queue lock so posting never waits on watcher updates
    watchers: Mutex<Vec<BusWatcher>>,
    running: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            queue: ThreadSafeQueue::new(),
            watchers: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            thread: Mutex::new(None),
        }
    }

    /// Watchers run in registration order. Returns the watcher count.
    pub fn add_bus_watch<F>(&self, watcher: F) -> usize
    where
        F: Fn(&Event) -> EventHandleFlag + Send + Sync + 'static,
    {
        let mut watchers = self.watchers.lock();
        watchers.push(Box::new(watcher));
        watchers.len()
    }

    pub fn clear_all_watchers(&self) {
        self.watchers.lock().clear();
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.thread.lock();
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // A loop stopped by a watcher leaves a finished handle behind
        if let Some(handle) = slot.take() {
            let _ = handle.join();
        }
        let bus = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("sd-eventbus".to_string())
            .spawn(move || bus.event_loop())
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                StreamDagError::Io(e)
            })?;
        *slot = Some(handle);
        debug!("Event bus started");
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Called from a watcher, the loop exits on its own
                return;
            }
            if handle.join().is_err() {
                warn!("Event bus thread panicked");
            }
            debug!("Event bus stopped");
        }
        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!("Dropped {} pending events", dropped);
        }
    }

    /// Queue `event` for the bus thread. Fails when the bus is not running.
    pub fn post_event(&self, event: Event) -> Result<()> {
        if !self.is_running() {
            return Err(StreamDagError::BusNotRunning);
        }
        self.queue.push(event);
        Ok(())
    }

    fn event_loop(&self) {
        let timeout = Duration::from_millis(BUS_POLL_INTERVAL_MS);
        while self.is_running() {
            let Some(event) = self.queue.wait_and_try_pop(timeout) else {
                continue;
            };
            if self.dispatch(&event) == EventHandleFlag::Stop {
                debug!(
                    "Event bus loop stopped by a watcher on {} event from '{}'",
                    event.kind, event.module_name
                );
                self.running.store(false, Ordering::Release);
            }
        }
    }

    fn dispatch(&self, event: &Event) -> EventHandleFlag {
        let watchers = self.watchers.lock();
        for watcher in watchers.iter() {
            match watcher(event) {
                EventHandleFlag::Intercepted => return EventHandleFlag::Intercepted,
                EventHandleFlag::Stop => return EventHandleFlag::Stop,
                EventHandleFlag::Null | EventHandleFlag::Synced => {}
            }
        }
        EventHandleFlag::Synced
    }
}
