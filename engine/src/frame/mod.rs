// mod.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

pub mod collection;
pub mod frame;
pub mod mask;

pub use collection::Collection;
pub use frame::{Frame, FrameFlag, FrameRef, INVALID_STREAM_INDEX};
pub use mask::ModuleMask;

#[cfg(test)]
mod collection_tests;
