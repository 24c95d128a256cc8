// profiler.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::graph::ProfilerConfig;

/// Identifies one frame: stream id and timestamp.
pub type RecordKey = (String, i64);

pub const INPUT_QUEUE_PROCESS: &str = "input_queue";
pub const PROCESS_PROCESS: &str = "process";
pub const OVERALL_PROCESS: &str = "overall";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    Pipeline,
    Module,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceEventType {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub stream_id: String,
    pub timestamp: i64,
    pub module_name: String,
    pub process_name: String,
    /// Microseconds since the tracer was created
    pub time_us: u64,
    pub level: TraceLevel,
    pub kind: TraceEventType,
}

/// Ring buffer of the latest trace events of a pipeline.
#[derive(Debug)]
pub struct PipelineTracer {
    capacity: usize,
    origin: Instant,
    events: Mutex<VecDeque<TraceEvent>>,
}

impl PipelineTracer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            origin: Instant::now(),
            events: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn record(&self, mut event: TraceEvent, at: Instant) {
        if self.capacity == 0 {
            return;
        }
        event.time_us = at.saturating_duration_since(self.origin).as_micros() as u64;
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Buffered events, oldest first.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamProfile {
    pub stream_name: String,
    pub counter: u64,
    pub completed: u64,
    pub dropped: u64,
    /// Average latency in milliseconds, -1 when nothing completed
    pub latency: f64,
    pub maximum_latency: f64,
    pub minimum_latency: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessProfile {
    pub process_name: String,
    pub counter: u64,
    pub completed: u64,
    pub dropped: u64,
    pub ongoing: u64,
    pub latency: f64,
    pub maximum_latency: f64,
    pub minimum_latency: f64,
    /// Frames per second over the span between the first start and last end
    pub fps: f64,
    pub stream_profiles: Vec<StreamProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModuleProfile {
    pub module_name: String,
    pub process_profiles: Vec<ProcessProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineProfile {
    pub pipeline_name: String,
    pub module_profiles: Vec<ModuleProfile>,
    pub overall_profile: ProcessProfile,
}

#[derive(Debug, Default)]
struct LatencyStats {
    completed: u64,
    dropped: u64,
    total: Duration,
    max: Duration,
    min: Option<Duration>,
}

impl LatencyStats {
    fn add(&mut self, latency: Duration) {
        self.completed += 1;
        self.total += latency;
        self.max = self.max.max(latency);
        self.min = Some(self.min.map_or(latency, |min| min.min(latency)));
    }

    fn average_ms(&self) -> f64 {
        if self.completed == 0 {
            return -1.0;
        }
        self.total.as_secs_f64() * 1e3 / self.completed as f64
    }

    fn max_ms(&self) -> f64 {
        if self.completed == 0 {
            return -1.0;
        }
        self.max.as_secs_f64() * 1e3
    }

    fn min_ms(&self) -> f64 {
        self.min.map_or(-1.0, |min| min.as_secs_f64() * 1e3)
    }
}

#[derive(Debug, Default)]
struct ProcessState {
    /// Pending start times per stream, oldest first
    starts: BTreeMap<String, VecDeque<(i64, Instant)>>,
    streams: BTreeMap<String, LatencyStats>,
    overall: LatencyStats,
    first_start: Option<Instant>,
    last_end: Option<Instant>,
}

/// Latency of one step (`input_queue`, `process` or `overall`) keyed by frame.
#[derive(Debug)]
pub struct ProcessProfiler {
    module_name: String,
    process_name: String,
    level: TraceLevel,
    profiling: bool,
    tracer: Option<Arc<PipelineTracer>>,
    state: Mutex<ProcessState>,
}

impl ProcessProfiler {
    pub fn new(
        module_name: &str,
        process_name: &str,
        config: &ProfilerConfig,
        tracer: Option<Arc<PipelineTracer>>,
    ) -> Self {
        let level = if module_name.is_empty() {
            TraceLevel::Pipeline
        } else {
            TraceLevel::Module
        };
        Self {
            module_name: module_name.to_string(),
            process_name: process_name.to_string(),
            level,
            profiling: config.enable_profiling,
            tracer: if config.enable_tracing { tracer } else { None },
            state: Mutex::new(ProcessState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.process_name
    }

    fn trace(&self, key: &RecordKey, kind: TraceEventType, at: Instant) {
        if let Some(tracer) = &self.tracer {
            tracer.record(
                TraceEvent {
                    stream_id: key.0.clone(),
                    timestamp: key.1,
                    module_name: self.module_name.clone(),
                    process_name: self.process_name.clone(),
                    time_us: 0,
                    level: self.level,
                    kind,
                },
                at,
            );
        }
    }

    pub fn record_start(&self, key: &RecordKey) {
        if !self.profiling && self.tracer.is_none() {
            return;
        }
        let now = Instant::now();
        self.trace(key, TraceEventType::Start, now);
        if !self.profiling {
            return;
        }
        let mut state = self.state.lock();
        state.first_start.get_or_insert(now);
        state
            .starts
            .entry(key.0.clone())
            .or_default()
            .push_back((key.1, now));
    }

    pub fn record_end(&self, key: &RecordKey) {
        if !self.profiling && self.tracer.is_none() {
            return;
        }
        let now = Instant::now();
        self.trace(key, TraceEventType::End, now);
        if !self.profiling {
            return;
        }
        let mut state = self.state.lock();
        let started = state.starts.get_mut(&key.0).and_then(|pending| {
            let position = pending.iter().position(|(ts, _)| *ts == key.1)?;
            pending.remove(position).map(|(_, at)| at)
        });
        let Some(started) = started else {
            return;
        };
        let latency = now.saturating_duration_since(started);
        state.overall.add(latency);
        state.streams.entry(key.0.clone()).or_default().add(latency);
        state.last_end = Some(now);
    }

    /// Starts of `stream_id` still waiting for their end are counted as dropped.
    pub fn on_stream_eos(&self, stream_id: &str) {
        if !self.profiling {
            return;
        }
        let mut state = self.state.lock();
        let dropped = state
            .starts
            .remove(stream_id)
            .map_or(0, |pending| pending.len() as u64);
        if dropped > 0 {
            state.overall.dropped += dropped;
            state.streams.entry(stream_id.to_string()).or_default().dropped += dropped;
        }
    }

    pub fn profile(&self) -> ProcessProfile {
        let state = self.state.lock();
        let ongoing = state.starts.values().map(|p| p.len() as u64).sum();
        let counter = state.overall.completed + state.overall.dropped;
        let fps = match (state.first_start, state.last_end) {
            (Some(first), Some(last)) if last > first => {
                counter as f64 / last.duration_since(first).as_secs_f64()
            }
            _ => -1.0,
        };
        ProcessProfile {
            process_name: self.process_name.clone(),
            counter,
            completed: state.overall.completed,
            dropped: state.overall.dropped,
            ongoing,
            latency: state.overall.average_ms(),
            maximum_latency: state.overall.max_ms(),
            minimum_latency: state.overall.min_ms(),
            fps,
            stream_profiles: state
                .streams
                .iter()
                .map(|(name, stats)| StreamProfile {
                    stream_name: name.clone(),
                    counter: stats.completed + stats.dropped,
                    completed: stats.completed,
                    dropped: stats.dropped,
                    latency: stats.average_ms(),
                    maximum_latency: stats.max_ms(),
                    minimum_latency: stats.min_ms(),
                })
                .collect(),
        }
    }
}

/// The two steps measured for each module.
#[derive(Debug)]
pub struct ModuleProfiler {
    module_name: String,
    pub input_queue: ProcessProfiler,
    pub process: ProcessProfiler,
}

impl ModuleProfiler {
    pub fn new(module_name: &str, config: &ProfilerConfig, tracer: Option<Arc<PipelineTracer>>) -> Self {
        Self {
            module_name: module_name.to_string(),
            input_queue: ProcessProfiler::new(module_name, INPUT_QUEUE_PROCESS, config, tracer.clone()),
            process: ProcessProfiler::new(module_name, PROCESS_PROCESS, config, tracer),
        }
    }

    pub fn on_stream_eos(&self, stream_id: &str) {
        self.input_queue.on_stream_eos(stream_id);
        self.process.on_stream_eos(stream_id);
    }

    pub fn profile(&self) -> ModuleProfile {
        ModuleProfile {
            module_name: self.module_name.clone(),
            process_profiles: vec![self.input_queue.profile(), self.process.profile()],
        }
    }
}

/// Per-module profilers plus the end-to-end latency of the pipeline.
#[derive(Debug)]
pub struct PipelineProfiler {
    pipeline_name: String,
    config: ProfilerConfig,
    tracer: Option<Arc<PipelineTracer>>,
    overall: ProcessProfiler,
    modules: Vec<ModuleProfiler>,
}

impl PipelineProfiler {
    /// `module_names` in pipeline module index order.
    pub fn new(pipeline_name: &str, config: &ProfilerConfig, module_names: &[String]) -> Self {
        let tracer = config
            .enable_tracing
            .then(|| Arc::new(PipelineTracer::new(config.trace_event_capacity)));
        Self {
            pipeline_name: pipeline_name.to_string(),
            config: config.clone(),
            overall: ProcessProfiler::new("", OVERALL_PROCESS, config, tracer.clone()),
            modules: module_names
                .iter()
                .map(|name| ModuleProfiler::new(name, config, tracer.clone()))
                .collect(),
            tracer,
        }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.config.enable_profiling || self.config.enable_tracing
    }

    pub fn tracer(&self) -> Option<&Arc<PipelineTracer>> {
        self.tracer.as_ref()
    }

    pub fn module(&self, index: usize) -> Option<&ModuleProfiler> {
        self.modules.get(index)
    }

    /// A frame entered the pipeline through a head.
    pub fn record_input(&self, key: &RecordKey) {
        self.overall.record_start(key);
    }

    /// A frame went through every module.
    pub fn record_output(&self, key: &RecordKey) {
        self.overall.record_end(key);
    }

    pub fn on_stream_eos(&self, stream_id: &str) {
        self.overall.on_stream_eos(stream_id);
        for module in &self.modules {
            module.on_stream_eos(stream_id);
        }
    }

    pub fn profile(&self) -> PipelineProfile {
        PipelineProfile {
            pipeline_name: self.pipeline_name.clone(),
            module_profiles: self.modules.iter().map(ModuleProfiler::profile).collect(),
            overall_profile: self.overall.profile(),
        }
    }

    pub fn trace(&self) -> Vec<TraceEvent> {
        self.tracer.as_ref().map(|t| t.events()).unwrap_or_default()
    }
}
