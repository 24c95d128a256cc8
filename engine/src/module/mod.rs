// mod.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

pub mod builtin;
pub mod module;
pub mod registry;

pub use builtin::register_builtins;
pub use module::{Module, ModuleHandle, ProcessOutcome};
pub use registry::{ModuleConstructor, Registry};
