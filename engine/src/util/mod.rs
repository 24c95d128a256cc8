// mod.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

pub mod queue;

pub use queue::ThreadSafeQueue;

#[cfg(test)]
mod queue_tests;
