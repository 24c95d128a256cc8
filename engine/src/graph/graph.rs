// graph.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::ptr;
use tracing::{debug, error};

use super::config::{
    is_subgraph_item, strip_subgraph_prefix, GraphConfig, ModuleConfig, ProfilerConfig,
    SubgraphConfig, SUBGRAPH_PREFIX,
};
use super::dag::{Dag, DfsIter};
use crate::error::{Result, StreamDagError};

/// A module entry of a graph.
#[derive(Debug, Clone)]
pub struct Node {
    config: ModuleConfig,
    full_name: String,
    /// Full names of the modules this node feeds, sub-graphs expanded
    next: BTreeSet<String>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Slash separated path from the root graph, e.g. `root/sub/module`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn next(&self) -> &BTreeSet<String> {
        &self.next
    }
}

#[derive(Debug, Clone, Copy)]
enum Vertex {
    Module(usize),
    Subgraph(usize),
}

#[derive(Debug)]
struct SubgraphNode {
    config: SubgraphConfig,
    vertex: usize,
    graph: Box<Graph>,
}

/// Graph of modules built from a [`GraphConfig`], sub-graphs included.
///
/// Sub-graphs are parsed from their own configuration files and kept as
/// nested graphs. Edges to and from a sub-graph are wired to its heads and
/// tails so the modules form one flat DAG.
#[derive(Debug)]
pub struct Graph {
    config: GraphConfig,
    full_name: String,
    dag: Dag,
    vertices: Vec<Vertex>,
    modules: Vec<Node>,
    module_vertices: Vec<usize>,
    subgraphs: Vec<SubgraphNode>,
    module_index: HashMap<String, usize>,
    subgraph_index: HashMap<String, usize>,
    heads: Vec<String>,
    tails: Vec<String>,
}

fn is_node_name_valid(name: &str) -> bool {
    let name = strip_subgraph_prefix(name);
    !name.contains('/') && !name.contains(':')
}

impl Graph {
    pub fn new(config: GraphConfig) -> Self {
        let full_name = config.name.clone();
        Self {
            config,
            full_name,
            dag: Dag::new(),
            vertices: Vec::new(),
            modules: Vec::new(),
            module_vertices: Vec::new(),
            subgraphs: Vec::new(),
            module_index: HashMap::new(),
            subgraph_index: HashMap::new(),
            heads: Vec::new(),
            tails: Vec::new(),
        }
    }

    /// Replace the configuration and initialize.
    pub fn init_with(&mut self, config: GraphConfig) -> Result<()> {
        self.config = config;
        self.init()
    }

    /// Build the graph from its configuration, recursively parsing every
    /// sub-graph. Fails on invalid or duplicate names, unknown downstream
    /// nodes, sub-graph loops and cycles.
    pub fn init(&mut self) -> Result<()> {
        let mut in_progress = HashSet::new();
        if let Some(path) = &self.config.config_path {
            if let Ok(real) = fs::canonicalize(path) {
                in_progress.insert(real);
            }
        }
        let result = self.init_inner(None, &mut in_progress);
        if result.is_err() {
            self.clear();
        }
        result
    }

    fn init_inner(&mut self, parent: Option<&str>, in_progress: &mut HashSet<PathBuf>) -> Result<()> {
        self.clear();
        self.full_name = match parent {
            Some(parent) => format!("{}/{}", parent, self.config.name),
            None => self.config.name.clone(),
        };

        let entries = self.config.module_configs.len() + self.config.subgraph_configs.len();
        self.dag.reserve(entries);

        let module_configs = self.config.module_configs.clone();
        for config in module_configs {
            self.add_module_vertex(config)?;
        }
        let subgraph_configs = self.config.subgraph_configs.clone();
        for config in subgraph_configs {
            self.add_subgraph_vertex(config, in_progress)?;
        }

        self.init_edges()?;
        self.find_heads_and_tails();

        let (_, unsorted) = self.dag.topo_sort();
        if !unsorted.is_empty() {
            let nodes: Vec<String> = unsorted.iter().map(|v| self.vertex_name(*v)).collect();
            error!("{}Ring detected through {:?}", self.log_prefix(), nodes);
            return Err(StreamDagError::CycleDetected {
                graph: self.full_name.clone(),
                nodes,
            });
        }
        debug!(
            "{}Initialized with {} modules and {} sub-graphs",
            self.log_prefix(),
            self.modules.len(),
            self.subgraphs.len()
        );
        Ok(())
    }

    pub fn clear(&mut self) {
        self.dag = Dag::new();
        self.vertices.clear();
        self.modules.clear();
        self.module_vertices.clear();
        self.subgraphs.clear();
        self.module_index.clear();
        self.subgraph_index.clear();
        self.heads.clear();
        self.tails.clear();
    }

    fn log_prefix(&self) -> String {
        format!("[Graph:{}]: ", self.full_name)
    }

    fn vertex_name(&self, vertex: usize) -> String {
        match self.vertices[vertex] {
            Vertex::Module(i) => self.modules[i].config.name.clone(),
            Vertex::Subgraph(i) => self.subgraphs[i].config.name.clone(),
        }
    }

    fn add_module_vertex(&mut self, config: ModuleConfig) -> Result<()> {
        if !is_node_name_valid(&config.name) {
            error!("{}Module [{}] name invalid", self.log_prefix(), config.name);
            return Err(StreamDagError::InvalidName(config.name));
        }
        if self.module_index.contains_key(&config.name) {
            error!("{}Module [{}] name duplicated", self.log_prefix(), config.name);
            return Err(StreamDagError::DuplicateName(config.name));
        }
        let vertex = self.dag.add_vertex();
        let index = self.modules.len();
        self.vertices.push(Vertex::Module(index));
        self.module_vertices.push(vertex);
        self.module_index.insert(config.name.clone(), index);
        self.modules.push(Node {
            full_name: format!("{}/{}", self.full_name, config.name),
            config,
            next: BTreeSet::new(),
        });
        Ok(())
    }

    fn add_subgraph_vertex(
        &mut self,
        config: SubgraphConfig,
        in_progress: &mut HashSet<PathBuf>,
    ) -> Result<()> {
        if !is_subgraph_item(&config.name) {
            error!(
                "{}Subgraph's name must start with [{}], wrong name: {}",
                self.log_prefix(),
                SUBGRAPH_PREFIX,
                config.name
            );
            return Err(StreamDagError::InvalidName(config.name));
        }
        if !is_node_name_valid(&config.name) {
            error!("{}Subgraph [{}] name invalid", self.log_prefix(), config.name);
            return Err(StreamDagError::InvalidName(config.name));
        }
        if self.subgraph_index.contains_key(&config.name) {
            error!("{}Subgraph [{}] name duplicated", self.log_prefix(), config.name);
            return Err(StreamDagError::DuplicateName(config.name));
        }

        let parse_error = |reason: String| StreamDagError::SubgraphParse {
            name: config.name.clone(),
            reason,
        };
        let real_path = fs::canonicalize(&config.config_path).map_err(|e| {
            error!(
                "{}Can not resolve sub-graph path {}: {}",
                self.log_prefix(),
                config.config_path.display(),
                e
            );
            parse_error(e.to_string())
        })?;
        if !in_progress.insert(real_path.clone()) {
            error!(
                "{}A graph analysis loop was detected when parsing the subgraph named [{}]",
                self.log_prefix(),
                config.name
            );
            return Err(StreamDagError::SubgraphLoop(config.name));
        }

        let result = GraphConfig::from_json_file(&real_path)
            .map_err(|e| parse_error(e.to_string()))
            .and_then(|mut graph_config| {
                graph_config.name = strip_subgraph_prefix(&config.name).to_string();
                let mut subgraph = Graph::new(graph_config);
                subgraph.init_inner(Some(&self.full_name), in_progress)?;
                Ok(subgraph)
            });
        in_progress.remove(&real_path);
        let subgraph = result.map_err(|e| {
            error!("{}Init subgraph [{}] failed: {}", self.log_prefix(), config.name, e);
            e
        })?;

        let vertex = self.dag.add_vertex();
        let index = self.subgraphs.len();
        self.vertices.push(Vertex::Subgraph(index));
        self.subgraph_index.insert(config.name.clone(), index);
        self.subgraphs.push(SubgraphNode {
            config,
            vertex,
            graph: Box::new(subgraph),
        });
        Ok(())
    }

    fn resolve_target(&self, owner: &str, next: &str) -> Result<Vertex> {
        let found = if is_subgraph_item(next) {
            self.subgraph_index.get(next).map(|i| Vertex::Subgraph(*i))
        } else {
            self.module_index.get(next).map(|i| Vertex::Module(*i))
        };
        found.ok_or_else(|| {
            error!(
                "{}Unable to find a downstream node named [{}] for [{}]",
                self.log_prefix(),
                next,
                owner
            );
            StreamDagError::MissingTarget {
                node: owner.to_string(),
                next: next.to_string(),
            }
        })
    }

    /// Full names a downstream vertex resolves to.
    fn entry_names(&self, vertex: Vertex) -> Vec<String> {
        match vertex {
            Vertex::Module(i) => vec![self.modules[i].full_name.clone()],
            Vertex::Subgraph(i) => self.subgraphs[i].graph.heads.clone(),
        }
    }

    fn vertex_id(&self, vertex: Vertex) -> usize {
        match vertex {
            Vertex::Module(i) => self.module_vertices[i],
            Vertex::Subgraph(i) => self.subgraphs[i].vertex,
        }
    }

    fn init_edges(&mut self) -> Result<()> {
        for index in 0..self.modules.len() {
            let owner = self.modules[index].config.name.clone();
            let next_names = self.modules[index].config.next.clone();
            for next in &next_names {
                let target = self.resolve_target(&owner, next)?;
                let names = self.entry_names(target);
                let to = self.vertex_id(target);
                self.modules[index].next.extend(names);
                self.dag.add_edge(self.module_vertices[index], to);
            }
        }

        for index in 0..self.subgraphs.len() {
            let owner = self.subgraphs[index].config.name.clone();
            let next_names = self.subgraphs[index].config.next.clone();
            for next in &next_names {
                let target = self.resolve_target(&owner, next)?;
                let names = self.entry_names(target);
                let to = self.vertex_id(target);
                let subgraph = &mut self.subgraphs[index].graph;
                for tail in subgraph.tails.clone() {
                    if let Some(node) = subgraph.node_by_full_name_mut(&tail) {
                        node.next.extend(names.iter().cloned());
                    }
                }
                let from = self.subgraphs[index].vertex;
                self.dag.add_edge(from, to);
            }
        }
        Ok(())
    }

    fn find_heads_and_tails(&mut self) {
        let mut heads = Vec::new();
        for vertex in self.dag.heads() {
            heads.extend(self.vertex_heads(vertex));
        }
        let mut tails = Vec::new();
        for vertex in self.dag.tails() {
            match self.vertices[vertex] {
                Vertex::Module(i) => tails.push(self.modules[i].full_name.clone()),
                Vertex::Subgraph(i) => tails.extend(self.subgraphs[i].graph.tails.iter().cloned()),
            }
        }
        self.heads = heads;
        self.tails = tails;
    }

    fn vertex_heads(&self, vertex: usize) -> Vec<String> {
        self.entry_names(self.vertices[vertex])
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Graph name prefixed with its parents, e.g. `root/sub`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn profiler_config(&self) -> &ProfilerConfig {
        &self.config.profiler_config
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertex level view of this graph, sub-graphs count as one vertex.
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Modules without upstream, sub-graph heads resolved recursively.
    pub fn heads(&self) -> Vec<&Node> {
        self.heads
            .iter()
            .filter_map(|name| self.node_by_full_name(name))
            .collect()
    }

    /// Modules without downstream, sub-graph tails resolved recursively.
    pub fn tails(&self) -> Vec<&Node> {
        self.tails
            .iter()
            .filter_map(|name| self.node_by_full_name(name))
            .collect()
    }

    /// Look a module up by name.
    ///
    /// A bare name returns the first match in depth first order over the
    /// whole graph. A slash separated path has to start with this graph's
    /// name and walks down the named sub-graphs.
    pub fn get_node_by_name(&self, name: &str) -> Option<&Node> {
        let segments: Vec<&str> = name.split('/').collect();
        if segments.len() == 1 {
            return self.dfs().find(|node| node.name() == name);
        }
        if segments[0] != self.name() {
            debug!(
                "{}Node named [{}] does not belong to this graph",
                self.log_prefix(),
                name
            );
            return None;
        }
        let mut graph = self;
        for segment in &segments[1..segments.len() - 1] {
            let key = format!("{}{}", SUBGRAPH_PREFIX, segment);
            let index = graph.subgraph_index.get(&key)?;
            graph = &graph.subgraphs[*index].graph;
        }
        let last = segments[segments.len() - 1];
        graph
            .module_index
            .get(last)
            .map(|index| &graph.modules[*index])
    }

    /// Look a module up by the full name the graph gave it.
    pub fn node_by_full_name(&self, full_name: &str) -> Option<&Node> {
        let rest = self.strip_own_prefix(full_name)?;
        match rest.split_once('/') {
            None => self.module_index.get(rest).map(|i| &self.modules[*i]),
            Some((segment, _)) => {
                let key = format!("{}{}", SUBGRAPH_PREFIX, segment);
                let index = self.subgraph_index.get(&key)?;
                self.subgraphs[*index].graph.node_by_full_name(full_name)
            }
        }
    }

    fn node_by_full_name_mut(&mut self, full_name: &str) -> Option<&mut Node> {
        let rest = self.strip_own_prefix(full_name)?.to_string();
        match rest.split_once('/') {
            None => {
                let index = *self.module_index.get(&rest)?;
                self.modules.get_mut(index)
            }
            Some((segment, _)) => {
                let key = format!("{}{}", SUBGRAPH_PREFIX, segment);
                let index = *self.subgraph_index.get(&key)?;
                self.subgraphs[index].graph.node_by_full_name_mut(full_name)
            }
        }
    }

    fn strip_own_prefix<'n>(&self, full_name: &'n str) -> Option<&'n str> {
        full_name
            .strip_prefix(self.full_name.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }

    /// Full names of every module in dependency order, sub-graphs inlined.
    pub fn topo_sort(&self) -> Vec<String> {
        let (sorted, _) = self.dag.topo_sort();
        let mut result = Vec::with_capacity(sorted.len());
        for vertex in sorted {
            match self.vertices[vertex] {
                Vertex::Module(i) => result.push(self.modules[i].full_name.clone()),
                Vertex::Subgraph(i) => result.extend(self.subgraphs[i].graph.topo_sort()),
            }
        }
        result
    }

    pub fn dfs(&self) -> GraphDfs<'_> {
        let mut iter = GraphDfs {
            graph: self,
            dag_iter: self.dag.dfs_begin(),
            sub: None,
        };
        while !iter.enter_current() {
            iter.dag_iter.advance();
        }
        iter
    }

    /// Depth first walk starting at the module with this full name.
    pub fn dfs_from(&self, full_name: &str) -> Option<GraphDfs<'_>> {
        let rest = self.strip_own_prefix(full_name)?;
        match rest.split_once('/') {
            None => {
                let index = self.module_index.get(rest)?;
                Some(GraphDfs {
                    graph: self,
                    dag_iter: self.dag.dfs_begin_from(self.module_vertices[*index]),
                    sub: None,
                })
            }
            Some((segment, _)) => {
                let key = format!("{}{}", SUBGRAPH_PREFIX, segment);
                let subgraph = &self.subgraphs[*self.subgraph_index.get(&key)?];
                let sub = subgraph.graph.dfs_from(full_name)?;
                Some(GraphDfs {
                    graph: self,
                    dag_iter: self.dag.dfs_begin_from(subgraph.vertex),
                    sub: Some(Box::new(sub)),
                })
            }
        }
    }

    pub fn dfs_end(&self) -> GraphDfs<'_> {
        GraphDfs {
            graph: self,
            dag_iter: self.dag.dfs_end(),
            sub: None,
        }
    }
}

/// Depth first cursor over every module of a graph, descending into
/// sub-graphs in place of their vertex.
pub struct GraphDfs<'a> {
    graph: &'a Graph,
    dag_iter: DfsIter<'a>,
    sub: Option<Box<GraphDfs<'a>>>,
}

impl<'a> GraphDfs<'a> {
    pub fn current(&self) -> Option<&'a Node> {
        if let Some(sub) = &self.sub {
            return sub.current();
        }
        let graph = self.graph;
        match graph.vertices.get(self.dag_iter.current()?)? {
            Vertex::Module(i) => graph.modules.get(*i),
            Vertex::Subgraph(_) => None,
        }
    }

    pub fn is_end(&self) -> bool {
        self.dag_iter.is_end()
    }

    /// Open the sub-graph under the cursor. `false` when it has nothing
    /// to visit and the cursor has to move on.
    fn enter_current(&mut self) -> bool {
        let graph = self.graph;
        let Some(vertex) = self.dag_iter.current() else {
            return true;
        };
        match graph.vertices[vertex] {
            Vertex::Module(_) => true,
            Vertex::Subgraph(i) => {
                let subgraph = &graph.subgraphs[i].graph;
                if subgraph.is_empty() {
                    return false;
                }
                let sub = subgraph.dfs();
                if sub.is_end() {
                    return false;
                }
                self.sub = Some(Box::new(sub));
                true
            }
        }
    }

    fn dag_step(&mut self) -> bool {
        self.dag_iter.advance();
        self.sub = None;
        self.enter_current()
    }

    pub fn advance(&mut self) {
        while !self.dag_iter.is_end() {
            let sub_finished = match self.sub.as_mut() {
                Some(sub) => {
                    sub.advance();
                    sub.is_end()
                }
                None => true,
            };
            if !sub_finished || self.dag_step() {
                break;
            }
        }
    }
}

impl PartialEq for GraphDfs<'_> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.graph, other.graph)
            && self.dag_iter == other.dag_iter
            && match (&self.sub, &other.sub) {
                (None, None) => true,
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
    }
}

impl<'a> Iterator for GraphDfs<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        let node = self.current()?;
        self.advance();
        Some(node)
    }
}
