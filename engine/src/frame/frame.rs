// frame.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use super::collection::Collection;
use super::mask::ModuleMask;
use crate::error::{Result, StreamDagError};

/// Frames are shared by every consumer after a fan-out.
pub type FrameRef = Arc<Frame>;

/// Stream index of a frame that has not entered a pipeline yet.
pub const INVALID_STREAM_INDEX: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FrameFlag {
    /// End of stream marker, carries no data
    Eos = 1 << 0,
    /// Data of this frame can not be used
    Invalid = 1 << 1,
    /// The stream was removed while the frame was in flight
    Removed = 1 << 2,
}

/// Unit of work flowing through a pipeline.
pub struct Frame {
    stream_id: String,
    timestamp: i64,
    flags: AtomicU32,
    stream_index: AtomicU32,
    modules_mask: Mutex<ModuleMask>,
    error_reported: AtomicBool,
    collection: Collection,
}

impl Frame {
    pub fn new(stream_id: impl Into<String>) -> Result<FrameRef> {
        Self::with_timestamp(stream_id, 0)
    }

    pub fn with_timestamp(stream_id: impl Into<String>, timestamp: i64) -> Result<FrameRef> {
        Self::create(stream_id.into(), timestamp, 0)
    }

    /// End of stream marker for `stream_id`.
    pub fn eos(stream_id: impl Into<String>) -> Result<FrameRef> {
        Self::create(stream_id.into(), 0, FrameFlag::Eos as u32)
    }

    fn create(stream_id: String, timestamp: i64, flags: u32) -> Result<FrameRef> {
        if stream_id.is_empty() {
            return Err(StreamDagError::InvalidFrame(
                "stream id can not be empty".to_string(),
            ));
        }
        Ok(Arc::new(Self {
            stream_id,
            timestamp,
            flags: AtomicU32::new(flags),
            stream_index: AtomicU32::new(INVALID_STREAM_INDEX),
            modules_mask: Mutex::new(ModuleMask::new()),
            error_reported: AtomicBool::new(false),
            collection: Collection::new(),
        }))
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn has_flag(&self, flag: FrameFlag) -> bool {
        self.flags.load(Ordering::Acquire) & flag as u32 != 0
    }

    pub fn set_flag(&self, flag: FrameFlag) {
        self.flags.fetch_or(flag as u32, Ordering::AcqRel);
    }

    pub fn is_eos(&self) -> bool {
        self.has_flag(FrameFlag::Eos)
    }

    pub fn is_invalid(&self) -> bool {
        self.has_flag(FrameFlag::Invalid)
    }

    pub fn is_removed(&self) -> bool {
        self.has_flag(FrameFlag::Removed)
    }

    pub fn stream_index(&self) -> u32 {
        self.stream_index.load(Ordering::Acquire)
    }

    pub(crate) fn set_stream_index(&self, index: u32) {
        self.stream_index.store(index, Ordering::Release);
    }

    pub fn modules_mask(&self) -> ModuleMask {
        self.modules_mask.lock().clone()
    }

    pub fn set_modules_mask(&self, mask: ModuleMask) {
        *self.modules_mask.lock() = mask;
    }

    /// Mark module `index` as done with this frame and return the mask as
    /// it is right after the update.
    pub fn mark_passed(&self, index: usize) -> ModuleMask {
        let mut mask = self.modules_mask.lock();
        mask.set(index);
        mask.clone()
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// `true` for the first caller only.
    pub(crate) fn claim_error_report(&self) -> bool {
        !self.error_reported.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("stream_id", &self.stream_id)
            .field("timestamp", &self.timestamp)
            .field("flags", &self.flags.load(Ordering::Relaxed))
            .field("stream_index", &self.stream_index())
            .finish()
    }
}
