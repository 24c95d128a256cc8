// mod.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

pub mod connector;
pub mod message;
pub mod pipeline;
pub mod profiler;
pub(crate) mod scheduler;
pub mod stream_index;

pub use connector::Connector;
pub use message::{
    create_message_channel, BroadcastObserver, MessageReceiver, MessageSender, StreamMsg,
    StreamMsgObserver, StreamMsgType, USER_MESSAGE_COUNT,
};
pub use pipeline::{LinkStatus, Pipeline, LINK_SEPARATOR};
pub use profiler::{
    ModuleProfile, PipelineProfile, ProcessProfile, StreamProfile, TraceEvent, TraceEventType,
    TraceLevel,
};
pub use scheduler::FrameDoneCallback;
pub use stream_index::{StreamIndexAllocator, MAX_STREAM_NUM};
