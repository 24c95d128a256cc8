// module.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use std::sync::{Arc, Weak};

use crate::error::{Result, StreamDagError};
use crate::event::{Event, EventType};
use crate::frame::FrameRef;
use crate::graph::ModuleParamSet;
use crate::pipeline::scheduler::PipelineCore;
use crate::pipeline::{StreamMsg, StreamMsgType};

/// What the framework does with a frame once `process` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Send the frame to every declared downstream module.
    Forward,
    /// The module transmitted the frame itself through its handle.
    Forwarded,
}

/// A processing unit of the pipeline.
///
/// `process` runs concurrently on every worker of the module, so mutable
/// state needs interior locking. `open` and `close` run with exclusive
/// access while no worker is alive.
pub trait Module: Send + Sync {
    fn open(&mut self, params: &ModuleParamSet) -> Result<()>;

    /// Called once per successful `open`, in reverse dependency order.
    fn close(&mut self) {}

    fn process(&self, frame: &FrameRef, handle: &ModuleHandle) -> Result<ProcessOutcome>;

    /// End of stream reached this module. Not called for modules that
    /// transmit by themselves, those get the EOS frame in `process`.
    fn on_eos(&self, _stream_id: &str) {}

    /// Modules answering `true` may return [`ProcessOutcome::Forwarded`] and
    /// are in charge of calling [`ModuleHandle::transmit`], EOS frames included.
    fn transmits_itself(&self) -> bool {
        false
    }

    /// Checked while building the pipeline, before `open`.
    fn check_params(&self, _params: &ModuleParamSet) -> bool {
        true
    }
}

/// A module's view on the pipeline it runs in.
#[derive(Clone)]
pub struct ModuleHandle {
    core: Weak<PipelineCore>,
    index: usize,
    name: String,
}

impl ModuleHandle {
    pub(crate) fn new(core: Weak<PipelineCore>, index: usize, name: &str) -> Self {
        Self {
            core,
            index,
            name: name.to_string(),
        }
    }

    /// Handle bound to no pipeline, every pipeline call fails with `NotBuilt`.
    pub fn detached(name: &str) -> Self {
        Self {
            core: Weak::new(),
            index: 0,
            name: name.to_string(),
        }
    }

    /// Full name of the module in the pipeline graph.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn core(&self) -> Result<Arc<PipelineCore>> {
        self.core
            .upgrade()
            .ok_or_else(|| StreamDagError::NotBuilt(self.name.clone()))
    }

    /// Hand `frame` to the downstream modules. Only source modules and
    /// modules transmitting by themselves may call this.
    pub fn transmit(&self, frame: FrameRef) -> Result<()> {
        let core = self.core()?;
        if !core.may_transmit(self.index) {
            return Err(StreamDagError::ProcessFailed {
                module: self.name.clone(),
                message: "module is not allowed to transmit frames".to_string(),
            });
        }
        core.transmit(self.index, frame)
    }

    /// Post an event to the pipeline bus on behalf of this module.
    pub fn post_event(&self, kind: EventType, message: impl Into<String>) -> Result<()> {
        self.post_stream_event(kind, "", message)
    }

    pub fn post_stream_event(
        &self,
        kind: EventType,
        stream_id: &str,
        message: impl Into<String>,
    ) -> Result<()> {
        let event = Event::new(kind, self.name.clone(), message).with_stream(stream_id);
        self.core()?.post_event(event)
    }

    /// Send a user defined message (`StreamMsgType::User`) to the observer.
    pub fn post_stream_message(&self, kind: StreamMsgType, stream_id: &str, pts: i64) -> Result<()> {
        if !kind.is_user() {
            return Err(StreamDagError::InvalidParams(format!(
                "{}: only user messages can be posted, got {:?}",
                self.name, kind
            )));
        }
        let msg = StreamMsg {
            kind,
            stream_id: stream_id.to_string(),
            module_name: self.name.clone(),
            pts,
        };
        self.core()?.post_message(msg);
        Ok(())
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.name)
            .field("index", &self.index)
            .finish()
    }
}
