// pipeline.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::message::{MessageHub, StreamMsg, StreamMsgObserver, StreamMsgType};
use super::profiler::{PipelineProfile, PipelineProfiler, TraceEvent};
use super::scheduler::{FrameDoneCallback, PipelineCore, SlotSetup};
use crate::error::{Result, StreamDagError};
use crate::event::{Event, EventBus, EventHandleFlag, EventType};
use crate::frame::{FrameRef, ModuleMask};
use crate::graph::{Graph, GraphConfig, ModuleConfig};
use crate::module::{ModuleHandle, Registry};

/// Separator of the two module names in a link id
pub const LINK_SEPARATOR: &str = "-->";

/// State of the conveyors between two linked modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub stopped: bool,
    /// Frames waiting on each conveyor of the downstream module
    pub cache_size: Vec<usize>,
}

/// Turns bus events into stream messages for the observer.
fn default_bus_watch(pipeline: &str, messages: &MessageHub, event: &Event) -> EventHandleFlag {
    match event.kind {
        EventType::Error => {
            error!(
                "[{}] Error from '{}': {}",
                pipeline, event.module_name, event.message
            );
            messages.post(StreamMsg::new(
                StreamMsgType::Error,
                event.stream_id.clone(),
                event.module_name.clone(),
            ));
            EventHandleFlag::Stop
        }
        EventType::Warning => {
            warn!(
                "[{}] Warning from '{}': {}",
                pipeline, event.module_name, event.message
            );
            EventHandleFlag::Synced
        }
        EventType::Eos => {
            debug!(
                "[{}] '{}' reached EOS on stream '{}'",
                pipeline, event.module_name, event.stream_id
            );
            EventHandleFlag::Synced
        }
        EventType::StreamError => {
            error!(
                "[{}] Stream '{}' failed in '{}': {}",
                pipeline, event.stream_id, event.module_name, event.message
            );
            messages.post(StreamMsg::new(
                StreamMsgType::StreamError,
                event.stream_id.clone(),
                event.module_name.clone(),
            ));
            EventHandleFlag::Synced
        }
        EventType::Stop => {
            info!("[{}] Stop requested by '{}'", pipeline, event.module_name);
            EventHandleFlag::Stop
        }
        EventType::Invalid => {
            error!(
                "[{}] Invalid event from '{}': {}",
                pipeline, event.module_name, event.message
            );
            EventHandleFlag::Null
        }
    }
}

/// A graph of modules driven by worker threads.
///
/// Build it once from a [`GraphConfig`], then `start`, feed the head
/// modules with [`Pipeline::provide_data`] and `stop`.
pub struct Pipeline {
    name: String,
    bus: Arc<EventBus>,
    messages: Arc<MessageHub>,
    frame_done: Arc<RwLock<Option<FrameDoneCallback>>>,
    graph: Option<Graph>,
    core: Option<Arc<PipelineCore>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let bus = Arc::new(EventBus::new());
        let messages = Arc::new(MessageHub::new());
        let watch_messages = Arc::clone(&messages);
        let watch_name = name.clone();
        bus.add_bus_watch(move |event| default_bus_watch(&watch_name, &watch_messages, event));
        Self {
            name,
            bus,
            messages,
            frame_done: Arc::new(RwLock::new(None)),
            graph: None,
            core: None,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bus receiving the events posted by the modules. The pipeline
    /// registers its own watcher first.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.core.as_ref().is_some_and(|core| core.is_running())
    }

    fn core(&self) -> Result<&Arc<PipelineCore>> {
        self.core
            .as_ref()
            .ok_or_else(|| StreamDagError::NotBuilt(self.name.clone()))
    }

    pub fn build_from_json_file(&mut self, path: impl AsRef<Path>, registry: &Registry) -> Result<()> {
        let config = GraphConfig::from_json_file(path)?;
        self.build(config, registry)
    }

    /// Create every module of the graph and wire the connectors.
    /// A previous build is replaced.
    pub fn build(&mut self, mut config: GraphConfig, registry: &Registry) -> Result<()> {
        if self.is_running() {
            return Err(StreamDagError::AlreadyRunning(self.name.clone()));
        }
        if config.name.is_empty() {
            config.name = self.name.clone();
        }
        let mut graph = Graph::new(config);
        graph.init()?;

        let order = graph.topo_sort();
        if order.is_empty() {
            return Err(StreamDagError::InvalidConfig(format!(
                "pipeline '{}' has no module",
                self.name
            )));
        }
        let index_of = |full_name: &str| order.iter().position(|n| n == full_name);

        let mut setups = Vec::with_capacity(order.len());
        for full_name in &order {
            let node = graph
                .node_by_full_name(full_name)
                .ok_or_else(|| StreamDagError::ModuleNotFound(full_name.clone()))?;
            let config = node.config().clone();
            let module = registry.create(&config.class_name, full_name)?;
            if !module.check_params(&config.parameters) {
                error!("[{}] Parameters of '{}' rejected", self.name, full_name);
                return Err(StreamDagError::InvalidParams(full_name.clone()));
            }
            let down = node
                .next()
                .iter()
                .map(|next| index_of(next.as_str()).ok_or_else(|| StreamDagError::ModuleNotFound(next.clone())))
                .collect::<Result<Vec<usize>>>()?;
            info!(
                "[{}] Add module '{}' ({}), parallelism {}, max input queue size {}",
                self.name, full_name, config.class_name, config.parallelism, config.max_input_queue_size
            );
            setups.push(SlotSetup {
                name: full_name.clone(),
                config,
                module,
                parents_mask: ModuleMask::new(),
                route_mask: ModuleMask::new(),
                down,
            });
        }

        for up in 0..setups.len() {
            for down in setups[up].down.clone() {
                setups[down].parents_mask.set(up);
                debug!(
                    "[{}] Link {}{}{}",
                    self.name, setups[up].name, LINK_SEPARATOR, setups[down].name
                );
            }
        }

        let all_mask = ModuleMask::with_first(setups.len());
        for head in 0..setups.len() {
            if !setups[head].parents_mask.is_empty() {
                if setups[head].config.parallelism == 0 {
                    return Err(StreamDagError::InvalidConfig(format!(
                        "[{}] parallelism must be greater than 0",
                        setups[head].name
                    )));
                }
                continue;
            }
            let mut route_mask = all_mask.clone();
            let mut queue = VecDeque::from([head]);
            while let Some(index) = queue.pop_front() {
                if !route_mask.contains(index) {
                    continue;
                }
                route_mask.clear(index);
                queue.extend(setups[index].down.iter().copied());
            }
            setups[head].route_mask = route_mask;
        }

        let profiler = PipelineProfiler::new(&self.name, graph.profiler_config(), &order);
        let core = PipelineCore::new(
            &self.name,
            setups,
            Arc::clone(&self.bus),
            Arc::clone(&self.messages),
            Arc::clone(&self.frame_done),
            profiler,
        );
        self.graph = Some(graph);
        self.core = Some(core);
        Ok(())
    }

    /// Open the modules in dependency order and spawn the workers.
    pub fn start(&self) -> Result<()> {
        let core = Arc::clone(self.core()?);
        if core.is_running() {
            return Err(StreamDagError::AlreadyRunning(self.name.clone()));
        }
        self.messages.start(&self.name)?;

        for (index, slot) in core.slots().iter().enumerate() {
            if let Err(e) = slot.module.write().open(&slot.config.parameters) {
                error!("[{}] Failed to open module '{}': {}", self.name, slot.name, e);
                for opened in core.slots()[..index].iter().rev() {
                    opened.module.write().close();
                }
                return Err(StreamDagError::ModuleOpen(format!("{}: {}", slot.name, e)));
            }
        }

        if let Err(e) = self.bus.start() {
            self.close_modules(&core);
            return Err(e);
        }
        core.set_running(true);

        let mut workers = self.workers.lock();
        for (index, slot) in core.slots().iter().enumerate() {
            let Some(connector) = &slot.connector else {
                continue;
            };
            connector.start();
            for conveyor in 0..connector.conveyor_count() {
                let worker_core = Arc::clone(&core);
                let spawned = thread::Builder::new()
                    .name(format!("sd-{}-{}", slot.config.name, conveyor))
                    .spawn(move || worker_core.worker_loop(index, conveyor));
                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        error!("[{}] Failed to spawn worker for '{}': {}", self.name, slot.name, e);
                        drop(workers);
                        self.stop();
                        return Err(StreamDagError::Io(e));
                    }
                }
            }
        }
        info!(
            "[{}] Pipeline started with {} modules and {} workers",
            self.name,
            core.slots().len(),
            workers.len()
        );
        Ok(())
    }

    /// Stop the workers, drop queued frames, forget unfinished streams and
    /// close the modules in reverse dependency order. Messages already
    /// posted are still delivered.
    pub fn stop(&self) {
        let Some(core) = &self.core else {
            return;
        };
        if !core.set_running(false) {
            return;
        }
        let mut dropped = 0;
        for slot in core.slots() {
            if let Some(connector) = &slot.connector {
                connector.stop();
                dropped += connector.empty();
            }
        }
        if dropped > 0 {
            debug!("[{}] Dropped {} queued frames", self.name, dropped);
        }
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                warn!("[{}] A worker thread panicked", self.name);
            }
        }
        let live = core.reset_streams();
        if live > 0 {
            debug!("[{}] Released {} unfinished streams", self.name, live);
        }
        self.bus.stop();
        self.close_modules(core);
        info!("[{}] Pipeline stopped", self.name);
    }

    fn close_modules(&self, core: &PipelineCore) {
        for slot in core.slots().iter().rev() {
            slot.module.write().close();
        }
    }

    fn find_index(&self, name: &str) -> Result<usize> {
        let core = self.core()?;
        if let Some(index) = core.index_of(name) {
            return Ok(index);
        }
        self.graph
            .as_ref()
            .and_then(|graph| graph.get_node_by_name(name))
            .and_then(|node| core.index_of(node.full_name()))
            .ok_or_else(|| StreamDagError::ModuleNotFound(name.to_string()))
    }

    /// Feed `frame` into the pipeline through module `module_name`, a head
    /// or a module transmitting by itself. Bare names resolve to the first
    /// module of that name in depth first order.
    pub fn provide_data(&self, module_name: &str, frame: FrameRef) -> Result<()> {
        let core = self.core()?;
        if !core.is_running() {
            return Err(StreamDagError::NotRunning(self.name.clone()));
        }
        let index = self.find_index(module_name)?;
        if !core.may_transmit(index) {
            return Err(StreamDagError::NotSource(core.module_name(index).to_string()));
        }
        core.transmit(index, frame)
    }

    pub fn module_handle(&self, module_name: &str) -> Option<ModuleHandle> {
        let index = self.find_index(module_name).ok()?;
        Some(self.core.as_ref()?.slots()[index].handle.clone())
    }

    /// Full names of the modules, in dependency order.
    pub fn module_names(&self) -> Vec<String> {
        self.core
            .as_ref()
            .map(|core| core.slots().iter().map(|slot| slot.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Full names of the modules without upstream.
    pub fn head_names(&self) -> Vec<String> {
        self.core
            .as_ref()
            .map(|core| {
                core.slots()
                    .iter()
                    .filter(|slot| slot.is_head)
                    .map(|slot| slot.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_module_config(&self, module_name: &str) -> Option<ModuleConfig> {
        let index = self.find_index(module_name).ok()?;
        Some(self.core.as_ref()?.slots()[index].config.clone())
    }

    /// Link ids are `"<upstream>--><downstream>"` with full module names.
    pub fn link_ids(&self) -> Vec<String> {
        let Some(core) = &self.core else {
            return Vec::new();
        };
        core.slots()
            .iter()
            .flat_map(|slot| {
                slot.down.iter().map(move |down| {
                    format!("{}{}{}", slot.name, LINK_SEPARATOR, core.module_name(*down))
                })
            })
            .collect()
    }

    pub fn query_link_status(&self, link_id: &str) -> Result<LinkStatus> {
        let core = self.core()?;
        let not_found = || StreamDagError::LinkNotFound(link_id.to_string());
        let (up, down) = link_id.split_once(LINK_SEPARATOR).ok_or_else(not_found)?;
        let up = core.index_of(up).ok_or_else(not_found)?;
        let down = core.index_of(down).ok_or_else(not_found)?;
        if !core.slots()[up].down.contains(&down) {
            return Err(not_found());
        }
        let connector = core.slots()[down].connector.as_ref().ok_or_else(not_found)?;
        Ok(LinkStatus {
            stopped: connector.is_stopped(),
            cache_size: connector.cache_sizes(),
        })
    }

    /// Data frames of `stream_id` stop being processed until its EOS went through.
    pub fn remove_stream(&self, stream_id: &str) -> Result<()> {
        let core = self.core()?;
        info!("[{}] Removing stream '{}'", self.name, stream_id);
        core.remove_stream(stream_id);
        Ok(())
    }

    /// `true` once the EOS message of `stream_id` was raised, `false` on timeout.
    pub fn wait_for_stream_eos(&self, stream_id: &str, timeout: Duration) -> bool {
        match &self.core {
            Some(core) => core.wait_for_stream_eos(stream_id, timeout),
            None => false,
        }
    }

    pub fn set_stream_msg_observer(&self, observer: Option<Arc<dyn StreamMsgObserver>>) {
        self.messages.set_observer(observer);
    }

    pub fn has_stream_msg_observer(&self) -> bool {
        self.messages.has_observer()
    }

    /// Called once for every data frame that went through all the modules.
    pub fn set_frame_done_callback<F>(&self, callback: F)
    where
        F: Fn(&FrameRef) + Send + Sync + 'static,
    {
        *self.frame_done.write() = Some(Arc::new(callback));
    }

    /// Latency statistics, `None` unless profiling is enabled.
    pub fn profile(&self) -> Option<PipelineProfile> {
        let profiler = self.core.as_ref()?.profiler();
        profiler
            .config()
            .enable_profiling
            .then(|| profiler.profile())
    }

    /// Buffered trace events, empty unless tracing is enabled.
    pub fn trace(&self) -> Vec<TraceEvent> {
        self.core
            .as_ref()
            .map(|core| core.profiler().trace())
            .unwrap_or_default()
    }

    /// Mask a data frame reaches once every module saw it.
    pub fn all_modules_mask(&self) -> Option<ModuleMask> {
        self.core.as_ref().map(|core| core.all_mask().clone())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
        self.messages.stop();
    }
}
