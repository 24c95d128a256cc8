// mod.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

pub mod config;
pub mod dag;
pub mod graph;

pub use config::{
    path_relative_to_config, GraphConfig, ModuleConfig, ModuleParamSet, ProfilerConfig,
    SubgraphConfig, JSON_FILE_DIR_PARAM, PROFILER_CONFIG_KEY, SUBGRAPH_PREFIX,
};
pub use dag::{Dag, DfsIter};
pub use graph::{Graph, GraphDfs, Node};

#[cfg(test)]
mod config_tests;
