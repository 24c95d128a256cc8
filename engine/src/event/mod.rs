// mod.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

pub mod bus;
pub mod event;

pub use bus::{BusWatcher, EventBus};
pub use event::{Event, EventHandleFlag, EventType};

/// Interval the bus loop waits for an event before re-checking its running flag
pub const BUS_POLL_INTERVAL_MS: u64 = 100;

#[cfg(test)]
mod bus_tests;
