// error.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamDagError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid node name '{0}': names can not contain '/' or ':'")]
    InvalidName(String),

    #[error("Duplicate node name: {0}")]
    DuplicateName(String),

    #[error("Unable to find a downstream node named '{next}' for '{node}'")]
    MissingTarget { node: String, next: String },

    #[error("Graph '{graph}' contains a cycle through: {}", nodes.join(", "))]
    CycleDetected { graph: String, nodes: Vec<String> },

    #[error("Sub-graph loop detected while parsing '{0}'")]
    SubgraphLoop(String),

    #[error("Failed to parse sub-graph '{name}': {reason}")]
    SubgraphParse { name: String, reason: String },

    #[error("Module class not registered: {0}")]
    UnknownModuleClass(String),

    #[error("Module open failed: {0}")]
    ModuleOpen(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Invalid parameters for module '{0}'")]
    InvalidParams(String),

    #[error("Module '{module}' failed processing: {message}")]
    ProcessFailed { module: String, message: String },

    #[error("Pipeline '{0}' has not been built")]
    NotBuilt(String),

    #[error("Pipeline '{0}' is running")]
    AlreadyRunning(String),

    #[error("Pipeline '{0}' is not running")]
    NotRunning(String),

    #[error("Module '{0}' can not provide data, it is neither a head nor transmitting by itself")]
    NotSource(String),

    #[error("Event bus is not running")]
    BusNotRunning,

    #[error("No data tagged by '{0}' has been added")]
    TagNotFound(String),

    #[error("Data tagged by '{tag}' is not of type {expected}")]
    TypeMismatch { tag: String, expected: &'static str },

    #[error("Data tagged by '{0}' has already been added")]
    TagExists(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Link not found: {0}")]
    LinkNotFound(String),

    #[error("Stream limit reached, can not register stream '{0}'")]
    StreamLimit(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StreamDagError>;
