// registry.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;
use tracing::{debug, warn};

use super::module::Module;
use crate::error::{Result, StreamDagError};

/// Builds a module instance, given the module name from the configuration.
pub type ModuleConstructor = Box<dyn Fn(&str) -> Box<dyn Module> + Send + Sync>;

/// Maps the `class_name` of a configuration entry to a constructor.
#[derive(Default)]
pub struct Registry {
    constructors: HashMap<String, ModuleConstructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the builtin module classes already registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtin::register_builtins(&mut registry);
        registry
    }

    /// Register `class_name`. A previous constructor of the same class is replaced.
    pub fn register<F>(&mut self, class_name: &str, constructor: F)
    where
        F: Fn(&str) -> Box<dyn Module> + Send + Sync + 'static,
    {
        if self
            .constructors
            .insert(class_name.to_string(), Box::new(constructor))
            .is_some()
        {
            warn!("Module class '{}' registered twice, keeping the last one", class_name);
        } else {
            debug!("Registered module class '{}'", class_name);
        }
    }

    pub fn create(&self, class_name: &str, name: &str) -> Result<Box<dyn Module>> {
        let constructor = self
            .constructors
            .get(class_name)
            .ok_or_else(|| StreamDagError::UnknownModuleClass(class_name.to_string()))?;
        Ok(constructor(name))
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.constructors.contains_key(class_name)
    }

    /// Registered class names, sorted.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("classes", &self.class_names())
            .finish()
    }
}
