// scheduler.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use super::connector::Connector;
use super::message::{MessageHub, StreamMsg, StreamMsgType};
use super::profiler::{PipelineProfiler, RecordKey};
use super::stream_index::StreamIndexAllocator;
use crate::error::{Result, StreamDagError};
use crate::event::{Event, EventBus, EventType};
use crate::frame::{FrameFlag, FrameRef, ModuleMask};
use crate::graph::ModuleConfig;
use crate::module::{Module, ModuleHandle, ProcessOutcome};

/// How long a worker waits on its conveyor before re-checking the stop flag
pub const POP_TIMEOUT_MS: u64 = 20;
/// How long a push waits for room before re-checking the stop flag
pub const PUSH_TIMEOUT_MS: u64 = 20;

pub type FrameDoneCallback = Arc<dyn Fn(&FrameRef) + Send + Sync>;

/// Everything the pipeline knows about one module once built.
pub(crate) struct ModuleSlot {
    pub(crate) name: String,
    pub(crate) config: ModuleConfig,
    pub(crate) module: RwLock<Box<dyn Module>>,
    pub(crate) transmits_itself: bool,
    pub(crate) is_head: bool,
    /// Modules feeding this one
    pub(crate) parents_mask: ModuleMask,
    /// Preset on frames entering through this head: the modules they never visit
    pub(crate) route_mask: ModuleMask,
    pub(crate) down: Vec<usize>,
    /// `None` for heads
    pub(crate) connector: Option<Connector>,
    pub(crate) handle: ModuleHandle,
}

/// Slot description handed over by the pipeline builder.
pub(crate) struct SlotSetup {
    pub(crate) name: String,
    pub(crate) config: ModuleConfig,
    pub(crate) module: Box<dyn Module>,
    pub(crate) parents_mask: ModuleMask,
    pub(crate) route_mask: ModuleMask,
    pub(crate) down: Vec<usize>,
}

#[derive(Debug, Default)]
struct StreamState {
    allocator: StreamIndexAllocator,
    /// EOS frames that went through the whole graph, per stream
    eos_counts: HashMap<String, usize>,
    removed: HashSet<String>,
    finished: HashSet<String>,
}

/// Shared state of a built pipeline, driven by the worker threads.
pub(crate) struct PipelineCore {
    name: String,
    slots: Vec<ModuleSlot>,
    index_by_name: HashMap<String, usize>,
    head_count: usize,
    all_mask: ModuleMask,
    bus: Arc<EventBus>,
    messages: Arc<MessageHub>,
    frame_done: Arc<RwLock<Option<FrameDoneCallback>>>,
    profiler: PipelineProfiler,
    streams: Mutex<StreamState>,
    eos_reached: Condvar,
    running: AtomicBool,
}

impl PipelineCore {
    pub(crate) fn new(
        name: &str,
        setups: Vec<SlotSetup>,
        bus: Arc<EventBus>,
        messages: Arc<MessageHub>,
        frame_done: Arc<RwLock<Option<FrameDoneCallback>>>,
        profiler: PipelineProfiler,
    ) -> Arc<Self> {
        let all_mask = ModuleMask::with_first(setups.len());
        Arc::new_cyclic(|core| {
            let slots: Vec<ModuleSlot> = setups
                .into_iter()
                .enumerate()
                .map(|(index, setup)| {
                    let is_head = setup.parents_mask.is_empty();
                    let connector = (!is_head).then(|| {
                        Connector::new(
                            setup.config.parallelism as usize,
                            setup.config.max_input_queue_size,
                        )
                    });
                    let transmits_itself = setup.module.transmits_itself();
                    ModuleSlot {
                        handle: ModuleHandle::new(core.clone(), index, &setup.name),
                        name: setup.name,
                        config: setup.config,
                        module: RwLock::new(setup.module),
                        transmits_itself,
                        is_head,
                        parents_mask: setup.parents_mask,
                        route_mask: setup.route_mask,
                        down: setup.down,
                        connector,
                    }
                })
                .collect();
            let index_by_name = slots
                .iter()
                .enumerate()
                .map(|(i, slot)| (slot.name.clone(), i))
                .collect();
            let head_count = slots.iter().filter(|slot| slot.is_head).count();
            Self {
                name: name.to_string(),
                slots,
                index_by_name,
                head_count,
                all_mask,
                bus,
                messages,
                frame_done,
                profiler,
                streams: Mutex::new(StreamState::default()),
                eos_reached: Condvar::new(),
                running: AtomicBool::new(false),
            }
        })
    }

    pub(crate) fn slots(&self) -> &[ModuleSlot] {
        &self.slots
    }

    pub(crate) fn index_of(&self, full_name: &str) -> Option<usize> {
        self.index_by_name.get(full_name).copied()
    }

    pub(crate) fn module_name(&self, index: usize) -> &str {
        &self.slots[index].name
    }

    pub(crate) fn all_mask(&self) -> &ModuleMask {
        &self.all_mask
    }

    pub(crate) fn profiler(&self) -> &PipelineProfiler {
        &self.profiler
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::AcqRel)
    }

    pub(crate) fn may_transmit(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|slot| slot.is_head || slot.transmits_itself)
    }

    pub(crate) fn post_event(&self, event: Event) -> Result<()> {
        self.bus.post_event(event)
    }

    pub(crate) fn post_message(&self, msg: StreamMsg) {
        self.messages.post(msg);
    }

    fn post_event_or_log(&self, event: Event) {
        let kind = event.kind;
        if let Err(e) = self.bus.post_event(event) {
            debug!("[{}] {} event not posted: {}", self.name, kind, e);
        }
    }

    pub(crate) fn remove_stream(&self, stream_id: &str) {
        self.streams.lock().removed.insert(stream_id.to_string());
    }

    /// Forget every stream: indexes, partial EOS counts, removed and
    /// finished marks. Only valid once the workers are joined.
    pub(crate) fn reset_streams(&self) -> usize {
        let mut streams = self.streams.lock();
        let live = streams.allocator.len();
        *streams = StreamState::default();
        self.eos_reached.notify_all();
        live
    }

    pub(crate) fn is_stream_removed(&self, stream_id: &str) -> bool {
        self.streams.lock().removed.contains(stream_id)
    }

    /// Block until the EOS message of `stream_id` went out, or `timeout`.
    pub(crate) fn wait_for_stream_eos(&self, stream_id: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut streams = self.streams.lock();
        while !streams.finished.contains(stream_id) {
            if self
                .eos_reached
                .wait_until(&mut streams, deadline)
                .timed_out()
            {
                return streams.finished.contains(stream_id);
            }
        }
        true
    }

    /// Bookkeeping for a frame entering through head `index`.
    fn enter(&self, index: usize, frame: &FrameRef) -> Result<()> {
        let slot = &self.slots[index];
        let stream_id = frame.stream_id();
        {
            let mut streams = self.streams.lock();
            let stream_index = streams.allocator.get_or_allocate(stream_id)?;
            if !frame.is_eos() {
                streams.finished.remove(stream_id);
                if streams.removed.contains(stream_id) {
                    frame.set_flag(FrameFlag::Removed);
                }
            }
            frame.set_stream_index(stream_index);
        }
        frame.set_modules_mask(slot.route_mask.clone());
        if frame.is_eos() {
            debug!("[{}] EOS of stream '{}' entered at '{}'", self.name, stream_id, slot.name);
        } else {
            self.profiler.record_input(&record_key(frame));
        }
        Ok(())
    }

    /// Mark `frame` as passed by module `index` and hand it to every
    /// downstream module whose parents are all done with it.
    pub(crate) fn transmit(&self, index: usize, frame: FrameRef) -> Result<()> {
        let slot = self
            .slots
            .get(index)
            .ok_or_else(|| StreamDagError::ModuleNotFound(index.to_string()))?;
        if slot.is_head {
            self.enter(index, &frame)?;
        }

        let passed = frame.mark_passed(index);
        let complete = passed == self.all_mask;
        if frame.is_eos() {
            self.post_event_or_log(
                Event::new(EventType::Eos, slot.name.clone(), "EOS reached").with_stream(frame.stream_id()),
            );
            if complete {
                self.on_eos_complete(slot, &frame);
            }
        } else {
            if frame.is_removed() || self.is_stream_removed(frame.stream_id()) {
                trace!("[{}] Dropping frame of removed stream '{}'", slot.name, frame.stream_id());
                return Ok(());
            }
            if frame.is_invalid() && frame.claim_error_report() {
                warn!(
                    "[{}] Invalid frame on stream '{}' at {}",
                    slot.name,
                    frame.stream_id(),
                    frame.timestamp()
                );
                let mut msg = StreamMsg::new(StreamMsgType::FrameError, frame.stream_id(), slot.name.clone());
                msg.pts = frame.timestamp();
                self.messages.post(msg);
            }
            if complete {
                self.profiler.record_output(&record_key(&frame));
                let callback = self.frame_done.read().clone();
                if let Some(callback) = callback {
                    callback(&frame);
                }
            }
        }

        for &down in &slot.down {
            let target = &self.slots[down];
            if !passed.contains_all(&target.parents_mask) {
                continue;
            }
            self.push_to(target, down, &frame);
        }
        Ok(())
    }

    fn push_to(&self, target: &ModuleSlot, index: usize, frame: &FrameRef) {
        let Some(connector) = &target.connector else {
            return;
        };
        let conveyor = connector.conveyor_for(frame.stream_index());
        if !frame.is_eos() {
            if let Some(profiler) = self.profiler.module(index) {
                profiler.input_queue.record_start(&record_key(frame));
            }
        }
        let timeout = Duration::from_millis(PUSH_TIMEOUT_MS);
        let mut pending = Arc::clone(frame);
        loop {
            match connector.push(conveyor, pending, timeout) {
                Ok(()) => return,
                Err(back) => {
                    if connector.is_stopped() {
                        debug!(
                            "[{}] Connector stopped, dropping frame of stream '{}'",
                            target.name,
                            back.stream_id()
                        );
                        return;
                    }
                    pending = back;
                }
            }
        }
    }

    fn on_eos_complete(&self, slot: &ModuleSlot, frame: &FrameRef) {
        let stream_id = frame.stream_id();
        {
            let mut streams = self.streams.lock();
            let count = streams.eos_counts.entry(stream_id.to_string()).or_insert(0);
            *count += 1;
            if *count < self.head_count {
                debug!(
                    "[{}] EOS of stream '{}' completed {}/{} times",
                    self.name, stream_id, count, self.head_count
                );
                return;
            }
            streams.eos_counts.remove(stream_id);
            streams.allocator.release(stream_id);
            streams.removed.remove(stream_id);
            streams.finished.insert(stream_id.to_string());
        }
        self.eos_reached.notify_all();
        self.profiler.on_stream_eos(stream_id);
        info!("[{}] Stream '{}' reached EOS", self.name, stream_id);
        self.messages
            .post(StreamMsg::new(StreamMsgType::Eos, stream_id, slot.name.clone()));
    }

    fn report_process_error(&self, slot: &ModuleSlot, frame: &FrameRef, err: StreamDagError) {
        error!(
            "[{}] Process failed on stream '{}': {}",
            slot.name,
            frame.stream_id(),
            err
        );
        self.post_event_or_log(
            Event::new(EventType::StreamError, slot.name.clone(), err.to_string())
                .with_stream(frame.stream_id()),
        );
    }

    fn do_process(&self, index: usize, frame: FrameRef) {
        let slot = &self.slots[index];
        let profiler = self.profiler.module(index);
        let key = (!frame.is_eos()).then(|| record_key(&frame));
        if let (Some(profiler), Some(key)) = (profiler, &key) {
            profiler.input_queue.record_end(key);
        }

        if slot.transmits_itself {
            if self.is_stream_removed(frame.stream_id()) {
                frame.set_flag(FrameFlag::Removed);
            }
            if let (Some(profiler), Some(key)) = (profiler, &key) {
                profiler.process.record_start(key);
            }
            let result = slot.module.read().process(&frame, &slot.handle);
            if let (Some(profiler), Some(key)) = (profiler, &key) {
                profiler.process.record_end(key);
            }
            match result {
                Ok(ProcessOutcome::Forwarded) => {}
                Ok(ProcessOutcome::Forward) => self.transmit_or_log(index, frame),
                Err(e) => self.report_process_error(slot, &frame, e),
            }
            return;
        }

        if frame.is_eos() {
            slot.module.read().on_eos(frame.stream_id());
            self.transmit_or_log(index, frame);
            return;
        }
        if frame.is_removed() || self.is_stream_removed(frame.stream_id()) {
            return;
        }
        if frame.is_invalid() {
            self.transmit_or_log(index, frame);
            return;
        }

        if let (Some(profiler), Some(key)) = (profiler, &key) {
            profiler.process.record_start(key);
        }
        let result = slot.module.read().process(&frame, &slot.handle);
        match result {
            Ok(ProcessOutcome::Forward) => {
                if let (Some(profiler), Some(key)) = (profiler, &key) {
                    profiler.process.record_end(key);
                }
                self.transmit_or_log(index, frame);
            }
            Ok(ProcessOutcome::Forwarded) => {
                let err = StreamDagError::ProcessFailed {
                    module: slot.name.clone(),
                    message: "returned Forwarded but does not transmit by itself".to_string(),
                };
                self.report_process_error(slot, &frame, err);
            }
            Err(e) => self.report_process_error(slot, &frame, e),
        }
    }

    fn transmit_or_log(&self, index: usize, frame: FrameRef) {
        if let Err(e) = self.transmit(index, frame) {
            error!("[{}] Transmit failed: {}", self.slots[index].name, e);
        }
    }

    /// Body of the worker thread serving `conveyor` of module `index`.
    pub(crate) fn worker_loop(&self, index: usize, conveyor: usize) {
        let slot = &self.slots[index];
        let Some(connector) = &slot.connector else {
            return;
        };
        debug!("[{}] Worker {} started", slot.name, conveyor);
        let timeout = Duration::from_millis(POP_TIMEOUT_MS);
        while !connector.is_stopped() {
            if let Some(frame) = connector.pop(conveyor, timeout) {
                self.do_process(index, frame);
            }
        }
        debug!("[{}] Worker {} exited", slot.name, conveyor);
    }
}

fn record_key(frame: &FrameRef) -> RecordKey {
    (frame.stream_id().to_string(), frame.timestamp())
}
