// config.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Result, StreamDagError};

/// Name prefix marking a sub-graph entry
pub const SUBGRAPH_PREFIX: &str = "subgraph:";

/// Reserved top-level key holding the profiler settings
pub const PROFILER_CONFIG_KEY: &str = "profiler_config";

/// Parameter set to the directory of the configuration file a module was loaded from
pub const JSON_FILE_DIR_PARAM: &str = "json_file_dir";

pub const DEFAULT_PARALLELISM: u32 = 1;
pub const DEFAULT_MAX_INPUT_QUEUE_SIZE: usize = 20;
pub const DEFAULT_TRACE_EVENT_CAPACITY: usize = 100_000;

/// Free-form module parameters, values kept as strings.
pub type ModuleParamSet = HashMap<String, String>;

pub fn is_subgraph_item(name: &str) -> bool {
    name.len() > SUBGRAPH_PREFIX.len() && name.starts_with(SUBGRAPH_PREFIX)
}

/// `"subgraph:x"` -> `"x"`, other names unchanged.
pub fn strip_subgraph_prefix(name: &str) -> &str {
    if is_subgraph_item(name) {
        &name[SUBGRAPH_PREFIX.len()..]
    } else {
        name
    }
}

/// Resolve `path` against the `json_file_dir` parameter. Absolute paths
/// are returned unchanged.
pub fn path_relative_to_config(path: &str, params: &ModuleParamSet) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let base = params
        .get(JSON_FILE_DIR_PARAM)
        .map(String::as_str)
        .unwrap_or("./");
    Path::new(base).join(path)
}

fn config_dir_of(path: &Path) -> String {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => format!("{}/", dir.display()),
        _ => "./".to_string(),
    }
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| StreamDagError::InvalidConfig(format!("{} must be an object", what)))
}

fn parse_next(entry: &Map<String, Value>, owner: &str) -> Result<BTreeSet<String>> {
    let Some(next) = entry.get("next_modules") else {
        return Ok(BTreeSet::new());
    };
    let values = next.as_array().ok_or_else(|| {
        StreamDagError::InvalidConfig(format!("[{}] next_modules must be array type", owner))
    })?;
    values
        .iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                StreamDagError::InvalidConfig(format!(
                    "[{}] next_modules must be an array of strings",
                    owner
                ))
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfilerConfig {
    pub enable_profiling: bool,
    pub enable_tracing: bool,
    pub trace_event_capacity: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enable_profiling: false,
            enable_tracing: false,
            trace_event_capacity: DEFAULT_TRACE_EVENT_CAPACITY,
        }
    }
}

impl ProfilerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(&value)
    }

    pub fn from_json_value(value: &Value) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in as_object(value, PROFILER_CONFIG_KEY)? {
            match key.as_str() {
                "enable_profiling" => {
                    config.enable_profiling = value.as_bool().ok_or_else(|| {
                        StreamDagError::InvalidConfig(
                            "enable_profiling must be boolean type".to_string(),
                        )
                    })?;
                }
                "enable_tracing" => {
                    config.enable_tracing = value.as_bool().ok_or_else(|| {
                        StreamDagError::InvalidConfig(
                            "enable_tracing must be boolean type".to_string(),
                        )
                    })?;
                }
                "trace_event_capacity" => {
                    config.trace_event_capacity = value
                        .as_u64()
                        .and_then(|v| usize::try_from(v).ok())
                        .ok_or_else(|| {
                            StreamDagError::InvalidConfig(
                                "trace_event_capacity must be uint64 type".to_string(),
                            )
                        })?;
                }
                other => {
                    return Err(StreamDagError::InvalidConfig(format!(
                        "Unknown parameter named [{}] for {}",
                        other, PROFILER_CONFIG_KEY
                    )));
                }
            }
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub name: String,
    pub class_name: String,
    /// Worker count. Zero is only meaningful for source modules.
    pub parallelism: u32,
    /// Capacity of each input conveyor
    pub max_input_queue_size: usize,
    pub next: BTreeSet<String>,
    pub parameters: ModuleParamSet,
}

impl ModuleConfig {
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            parallelism: DEFAULT_PARALLELISM,
            max_input_queue_size: DEFAULT_MAX_INPUT_QUEUE_SIZE,
            next: BTreeSet::new(),
            parameters: ModuleParamSet::new(),
        }
    }

    pub fn with_next<I, S>(mut self, next: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next = next.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_max_input_queue_size(mut self, size: usize) -> Self {
        self.max_input_queue_size = size;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn from_json_str(name: &str, json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(name, &value)
    }

    pub fn from_json_value(name: &str, value: &Value) -> Result<Self> {
        let entry = as_object(value, &format!("Module [{}]", name))?;
        let invalid = |msg: &str| StreamDagError::InvalidConfig(format!("[{}] {}", name, msg));

        let class_name = entry
            .get("class_name")
            .ok_or_else(|| invalid("Module has to have a class_name"))?
            .as_str()
            .ok_or_else(|| invalid("class_name must be string type"))?;
        let mut config = ModuleConfig::new(name, class_name);

        if let Some(parallelism) = entry.get("parallelism") {
            config.parallelism = parallelism
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| invalid("parallelism must be uint type"))?;
        }

        if let Some(size) = entry.get("max_input_queue_size") {
            config.max_input_queue_size = size
                .as_u64()
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| invalid("max_input_queue_size must be uint type"))?;
        }

        config.next = parse_next(entry, name)?;

        if let Some(params) = entry.get("custom_params") {
            let params = params
                .as_object()
                .ok_or_else(|| invalid("custom_params must be an object"))?;
            for (key, value) in params {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                config.parameters.insert(key.clone(), value);
            }
        }
        Ok(config)
    }

    fn set_config_dir(&mut self, dir: &str) {
        if self.parameters.contains_key(JSON_FILE_DIR_PARAM) {
            warn!(
                "Parameter [{}] of module [{}] does not take effect, it is set to the directory of the configuration file",
                JSON_FILE_DIR_PARAM, self.name
            );
        }
        self.parameters
            .insert(JSON_FILE_DIR_PARAM.to_string(), dir.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgraphConfig {
    /// Entry name, including the `subgraph:` prefix
    pub name: String,
    pub config_path: PathBuf,
    pub next: BTreeSet<String>,
}

impl SubgraphConfig {
    pub fn new(name: impl Into<String>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            config_path: config_path.into(),
            next: BTreeSet::new(),
        }
    }

    pub fn with_next<I, S>(mut self, next: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next = next.into_iter().map(Into::into).collect();
        self
    }

    /// Relative `config_path` values are resolved against `base_dir`.
    pub fn from_json_value(name: &str, value: &Value, base_dir: Option<&Path>) -> Result<Self> {
        let entry = as_object(value, &format!("Subgraph [{}]", name))?;
        let path = entry
            .get("config_path")
            .ok_or_else(|| {
                StreamDagError::InvalidConfig(format!("[{}] Subgraph has to have a config_path", name))
            })?
            .as_str()
            .ok_or_else(|| {
                StreamDagError::InvalidConfig(format!("[{}] config_path must be string type", name))
            })?;
        let mut config_path = PathBuf::from(path);
        if let Some(base) = base_dir {
            if config_path.is_relative() {
                config_path = base.join(config_path);
            }
        }
        Ok(Self {
            name: name.to_string(),
            config_path,
            next: parse_next(entry, name)?,
        })
    }
}

/// Module and sub-graph entries of one graph, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphConfig {
    pub name: String,
    pub profiler_config: ProfilerConfig,
    pub module_configs: Vec<ModuleConfig>,
    pub subgraph_configs: Vec<SubgraphConfig>,
    /// File this configuration was read from, if any
    pub config_path: Option<PathBuf>,
}

impl GraphConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_module(mut self, config: ModuleConfig) -> Self {
        self.module_configs.push(config);
        self
    }

    pub fn with_subgraph(mut self, config: SubgraphConfig) -> Self {
        self.subgraph_configs.push(config);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::parse(json, None)
    }

    /// Parse a configuration file. The graph takes the file stem as its
    /// name and every module gets a `json_file_dir` parameter.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let mut config = Self::parse(&json, path.parent())?;
        config.name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = config_dir_of(path);
        for module in &mut config.module_configs {
            module.set_config_dir(&dir);
        }
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(json: &str, base_dir: Option<&Path>) -> Result<Self> {
        let doc: Value = serde_json::from_str(json)?;
        let items = as_object(&doc, "Graph configuration")?;
        let mut config = Self::default();
        // serde_json keeps the last duplicate key, so names are unique here
        for (name, value) in items {
            if name == PROFILER_CONFIG_KEY {
                config.profiler_config = ProfilerConfig::from_json_value(value)?;
            } else if is_subgraph_item(name) {
                config
                    .subgraph_configs
                    .push(SubgraphConfig::from_json_value(name, value, base_dir)?);
            } else {
                config
                    .module_configs
                    .push(ModuleConfig::from_json_value(name, value)?);
            }
        }
        Ok(config)
    }
}
