// event.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use std::thread::{self, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Invalid,
    Error,
    Warning,
    /// A module saw the end of a stream
    Eos,
    /// Ask the bus loop to stop
    Stop,
    /// A failure scoped to one stream
    StreamError,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Invalid => write!(f, "invalid"),
            EventType::Error => write!(f, "error"),
            EventType::Warning => write!(f, "warning"),
            EventType::Eos => write!(f, "eos"),
            EventType::Stop => write!(f, "stop"),
            EventType::StreamError => write!(f, "stream_error"),
        }
    }
}

/// What a bus watcher did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventHandleFlag {
    /// Not handled, keep going
    Null,
    /// Handled, later watchers are skipped
    Intercepted,
    /// Handled, later watchers still run
    Synced,
    /// Handled and the bus loop must stop
    Stop,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventType,
    pub stream_id: String,
    pub message: String,
    pub module_name: String,
    pub thread_id: ThreadId,
}

impl Event {
    /// Event stamped with the calling thread id.
    pub fn new(kind: EventType, module_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            stream_id: String::new(),
            message: message.into(),
            module_name: module_name.into(),
            thread_id: thread::current().id(),
        }
    }

    pub fn with_stream(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = stream_id.into();
        self
    }
}
