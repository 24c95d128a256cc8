// message.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, StreamDagError};
use crate::util::ThreadSafeQueue;

/// Number of user message kinds, `User(0)` to `User(9)`.
pub const USER_MESSAGE_COUNT: u8 = 10;

const MESSAGE_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMsgType {
    /// Every head sent the end of stream and it went through the graph
    Eos,
    /// A module posted an error event, the pipeline can not go on
    Error,
    /// A module failed on one frame of the stream
    StreamError,
    /// A frame flagged invalid went through the pipeline
    FrameError,
    User(u8),
}

impl StreamMsgType {
    pub fn is_user(&self) -> bool {
        matches!(self, StreamMsgType::User(n) if *n < USER_MESSAGE_COUNT)
    }
}

impl std::fmt::Display for StreamMsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamMsgType::Eos => write!(f, "eos"),
            StreamMsgType::Error => write!(f, "error"),
            StreamMsgType::StreamError => write!(f, "stream_error"),
            StreamMsgType::FrameError => write!(f, "frame_error"),
            StreamMsgType::User(n) => write!(f, "user{}", n),
        }
    }
}

/// Message delivered to the pipeline observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMsg {
    pub kind: StreamMsgType,
    pub stream_id: String,
    pub module_name: String,
    pub pts: i64,
}

impl StreamMsg {
    pub fn new(kind: StreamMsgType, stream_id: impl Into<String>, module_name: impl Into<String>) -> Self {
        Self {
            kind,
            stream_id: stream_id.into(),
            module_name: module_name.into(),
            pts: -1,
        }
    }
}

/// Receives the stream messages of a pipeline, on a dedicated thread.
pub trait StreamMsgObserver: Send + Sync {
    fn update(&self, msg: &StreamMsg);
}

impl<F> StreamMsgObserver for F
where
    F: Fn(&StreamMsg) + Send + Sync,
{
    fn update(&self, msg: &StreamMsg) {
        self(msg)
    }
}

pub type MessageSender = tokio::sync::broadcast::Sender<StreamMsg>;
pub type MessageReceiver = tokio::sync::broadcast::Receiver<StreamMsg>;

pub fn create_message_channel() -> (MessageSender, MessageReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Observer forwarding every message into a broadcast channel.
pub struct BroadcastObserver {
    tx: MessageSender,
}

impl BroadcastObserver {
    pub fn new(tx: MessageSender) -> Self {
        Self { tx }
    }
}

impl StreamMsgObserver for BroadcastObserver {
    fn update(&self, msg: &StreamMsg) {
        if self.tx.send(msg.clone()).is_err() {
            debug!("Dropped {} message for '{}': no receivers", msg.kind, msg.stream_id);
        }
    }
}

/// Queue plus thread delivering stream messages to the observer, so module
/// workers never run observer code.
pub(crate) struct MessageHub {
    queue: ThreadSafeQueue<StreamMsg>,
    observer: RwLock<Option<Arc<dyn StreamMsgObserver>>>,
    running: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MessageHub {
    pub(crate) fn new() -> Self {
        Self {
            queue: ThreadSafeQueue::new(),
            observer: RwLock::new(None),
            running: AtomicBool::new(false),
            thread: Mutex::new(None),
        }
    }

    pub(crate) fn start(self: &Arc<Self>, pipeline_name: &str) -> Result<()> {
        let mut slot = self.thread.lock();
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let hub = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("sd-msg-{}", pipeline_name))
            .spawn(move || hub.message_loop())
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                StreamDagError::Io(e)
            })?;
        *slot = Some(handle);
        Ok(())
    }

    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                warn!("Stream message thread panicked");
            }
        }
    }

    pub(crate) fn set_observer(&self, observer: Option<Arc<dyn StreamMsgObserver>>) {
        *self.observer.write() = observer;
    }

    pub(crate) fn has_observer(&self) -> bool {
        self.observer.read().is_some()
    }

    pub(crate) fn post(&self, msg: StreamMsg) {
        if !self.running.load(Ordering::Acquire) {
            debug!("Stream message thread stopped, dropping {} message", msg.kind);
            return;
        }
        self.queue.push(msg);
    }

    fn deliver(&self, msg: &StreamMsg) {
        let observer = self.observer.read().clone();
        match observer {
            Some(observer) => observer.update(msg),
            None => debug!(
                "No observer for {} message of stream '{}'",
                msg.kind, msg.stream_id
            ),
        }
    }

    fn message_loop(&self) {
        let timeout = Duration::from_millis(MESSAGE_POLL_INTERVAL_MS);
        while self.running.load(Ordering::Acquire) {
            if let Some(msg) = self.queue.wait_and_try_pop(timeout) {
                self.deliver(&msg);
            }
        }
        // Deliver what was posted before stop
        while let Some(msg) = self.queue.try_pop() {
            self.deliver(&msg);
        }
    }
}
