// lib.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

pub mod error;
pub mod event;
pub mod frame;
pub mod graph;
pub mod module;
pub mod pipeline;
pub mod util;

pub use error::{Result, StreamDagError};
pub use event::{Event, EventBus, EventHandleFlag, EventType};
pub use frame::{Collection, Frame, FrameFlag, FrameRef, ModuleMask};
pub use graph::{Graph, GraphConfig, ModuleConfig, ModuleParamSet, ProfilerConfig, SubgraphConfig};
pub use module::{register_builtins, Module, ModuleHandle, ProcessOutcome, Registry};
pub use pipeline::{
    create_message_channel, BroadcastObserver, LinkStatus, Pipeline, StreamMsg,
    StreamMsgObserver, StreamMsgType,
};
