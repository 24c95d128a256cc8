// builtin.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

//! Generic modules usable from any configuration.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::module::{Module, ModuleHandle, ProcessOutcome};
use super::registry::Registry;
use crate::error::{Result, StreamDagError};
use crate::frame::FrameRef;
use crate::graph::ModuleParamSet;

pub const SOURCE_CLASS: &str = "Source";
pub const PASSTHROUGH_CLASS: &str = "Passthrough";
pub const DELAY_CLASS: &str = "Delay";
pub const ERROR_INJECTOR_CLASS: &str = "ErrorInjector";
pub const TAGGER_CLASS: &str = "Tagger";

pub fn register_builtins(registry: &mut Registry) {
    registry.register(SOURCE_CLASS, |name| Box::new(Source::new(name)));
    registry.register(PASSTHROUGH_CLASS, |name| Box::new(Passthrough::new(name)));
    registry.register(DELAY_CLASS, |name| Box::new(Delay::new(name)));
    registry.register(ERROR_INJECTOR_CLASS, |name| Box::new(ErrorInjector::new(name)));
    registry.register(TAGGER_CLASS, |name| Box::new(Tagger::new(name)));
}

/// Head module; frames enter through `Pipeline::provide_data`.
#[derive(Debug)]
pub struct Source {
    name: String,
}

impl Source {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Module for Source {
    fn open(&mut self, _params: &ModuleParamSet) -> Result<()> {
        debug!("Source '{}' opened", self.name);
        Ok(())
    }

    fn process(&self, _frame: &FrameRef, _handle: &ModuleHandle) -> Result<ProcessOutcome> {
        Ok(ProcessOutcome::Forward)
    }
}

#[derive(Debug)]
pub struct Passthrough {
    name: String,
}

impl Passthrough {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Module for Passthrough {
    fn open(&mut self, _params: &ModuleParamSet) -> Result<()> {
        debug!("Passthrough '{}' opened", self.name);
        Ok(())
    }

    fn process(&self, _frame: &FrameRef, _handle: &ModuleHandle) -> Result<ProcessOutcome> {
        Ok(ProcessOutcome::Forward)
    }
}

/// Sleeps `delay_ms` milliseconds on every frame.
#[derive(Debug)]
pub struct Delay {
    name: String,
    delay: Duration,
}

impl Delay {
    pub const DELAY_PARAM: &'static str = "delay_ms";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
        }
    }

    fn parse_delay(params: &ModuleParamSet) -> Option<u64> {
        match params.get(Self::DELAY_PARAM) {
            Some(value) => value.trim().parse().ok(),
            None => Some(0),
        }
    }
}

impl Module for Delay {
    fn open(&mut self, params: &ModuleParamSet) -> Result<()> {
        let delay = Self::parse_delay(params).ok_or_else(|| {
            StreamDagError::InvalidParams(format!("{}: {}", self.name, Self::DELAY_PARAM))
        })?;
        self.delay = Duration::from_millis(delay);
        Ok(())
    }

    fn process(&self, _frame: &FrameRef, _handle: &ModuleHandle) -> Result<ProcessOutcome> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(ProcessOutcome::Forward)
    }

    fn check_params(&self, params: &ModuleParamSet) -> bool {
        let valid = Self::parse_delay(params).is_some();
        if !valid {
            warn!("{}: '{}' must be an unsigned integer", self.name, Self::DELAY_PARAM);
        }
        valid
    }
}

/// Fails `process` for every frame of the streams listed in `fail_streams`.
#[derive(Debug)]
pub struct ErrorInjector {
    name: String,
    fail_streams: HashSet<String>,
}

impl ErrorInjector {
    pub const FAIL_STREAMS_PARAM: &'static str = "fail_streams";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_streams: HashSet::new(),
        }
    }
}

impl Module for ErrorInjector {
    fn open(&mut self, params: &ModuleParamSet) -> Result<()> {
        self.fail_streams = params
            .get(Self::FAIL_STREAMS_PARAM)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(())
    }

    fn process(&self, frame: &FrameRef, _handle: &ModuleHandle) -> Result<ProcessOutcome> {
        if self.fail_streams.contains(frame.stream_id()) {
            return Err(StreamDagError::ProcessFailed {
                module: self.name.clone(),
                message: format!("injected failure on stream '{}'", frame.stream_id()),
            });
        }
        Ok(ProcessOutcome::Forward)
    }
}

/// Stores its own name in the frame collection under `tag`.
#[derive(Debug)]
pub struct Tagger {
    name: String,
    tag: String,
}

impl Tagger {
    pub const TAG_PARAM: &'static str = "tag";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tag: String::new(),
        }
    }
}

impl Module for Tagger {
    fn open(&mut self, params: &ModuleParamSet) -> Result<()> {
        self.tag = params
            .get(Self::TAG_PARAM)
            .cloned()
            .unwrap_or_else(|| self.name.clone());
        Ok(())
    }

    fn process(&self, frame: &FrameRef, _handle: &ModuleHandle) -> Result<ProcessOutcome> {
        frame.collection().add(&self.tag, self.name.clone())?;
        Ok(ProcessOutcome::Forward)
    }

    fn check_params(&self, params: &ModuleParamSet) -> bool {
        params
            .get(Self::TAG_PARAM)
            .map_or(true, |tag| !tag.trim().is_empty())
    }
}
