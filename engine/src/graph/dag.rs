// dag.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;
use std::ptr;

/// Directed graph over dense vertex ids `0..vertex_count()`.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    edges: Vec<BTreeSet<usize>>,
    indegrees: Vec<usize>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.edges.reserve(additional);
        self.indegrees.reserve(additional);
    }

    pub fn add_vertex(&mut self) -> usize {
        self.edges.push(BTreeSet::new());
        self.indegrees.push(0);
        self.edges.len() - 1
    }

    pub fn vertex_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns `false` when either vertex does not exist or the edge is
    /// already present.
    pub fn add_edge(&mut self, from: usize, to: usize) -> bool {
        if from >= self.edges.len() || to >= self.edges.len() {
            return false;
        }
        if !self.edges[from].insert(to) {
            return false;
        }
        self.indegrees[to] += 1;
        true
    }

    /// -1 when `vertex` is out of range.
    pub fn indegree(&self, vertex: usize) -> i64 {
        self.indegrees.get(vertex).map_or(-1, |d| *d as i64)
    }

    /// -1 when `vertex` is out of range.
    pub fn outdegree(&self, vertex: usize) -> i64 {
        self.edges.get(vertex).map_or(-1, |e| e.len() as i64)
    }

    pub fn successors(&self, vertex: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges.get(vertex).into_iter().flatten().copied()
    }

    pub fn heads(&self) -> Vec<usize> {
        (0..self.edges.len()).filter(|v| self.indegrees[*v] == 0).collect()
    }

    pub fn tails(&self) -> Vec<usize> {
        (0..self.edges.len()).filter(|v| self.edges[*v].is_empty()).collect()
    }

    /// Kahn style sort. Each pass removes every vertex whose indegree
    /// dropped to zero, scanning ids in order. Vertices never removed sit on
    /// or behind a cycle and are returned as the second list.
    pub fn topo_sort(&self) -> (Vec<usize>, Vec<usize>) {
        let mut indegrees: Vec<i64> = self.indegrees.iter().map(|d| *d as i64).collect();
        let mut sorted = Vec::with_capacity(indegrees.len());
        let mut removed_any = true;
        while removed_any {
            removed_any = false;
            for vertex in 0..indegrees.len() {
                if indegrees[vertex] != 0 {
                    continue;
                }
                sorted.push(vertex);
                for next in &self.edges[vertex] {
                    indegrees[*next] -= 1;
                }
                indegrees[vertex] = -1;
                removed_any = true;
            }
        }
        let unsorted = (0..indegrees.len())
            .filter(|v| indegrees[*v] != -1)
            .collect();
        (sorted, unsorted)
    }

    /// Cursor seeded with every head. With several heads the last one is
    /// visited first.
    pub fn dfs_begin(&self) -> DfsIter<'_> {
        let mut iter = DfsIter::new(self);
        iter.stack = self.heads();
        if let Some(top) = iter.stack.last() {
            iter.visited[*top] = true;
        }
        iter
    }

    /// Cursor seeded with `vertex` alone, or the end cursor when out of range.
    pub fn dfs_begin_from(&self, vertex: usize) -> DfsIter<'_> {
        if vertex >= self.edges.len() {
            return self.dfs_end();
        }
        let mut iter = DfsIter::new(self);
        iter.stack.push(vertex);
        iter.visited[vertex] = true;
        iter
    }

    pub fn dfs_end(&self) -> DfsIter<'_> {
        DfsIter {
            dag: self,
            stack: Vec::new(),
            visited: Vec::new(),
        }
    }
}

/// Restartable depth first cursor over a [`Dag`].
///
/// `current` is the vertex under the cursor, `advance` moves to the next
/// unvisited vertex. The `Iterator` impl yields the current vertex then
/// advances.
#[derive(Debug, Clone)]
pub struct DfsIter<'a> {
    dag: &'a Dag,
    stack: Vec<usize>,
    visited: Vec<bool>,
}

impl<'a> DfsIter<'a> {
    fn new(dag: &'a Dag) -> Self {
        Self {
            dag,
            stack: Vec::new(),
            visited: vec![false; dag.vertex_count()],
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.stack.last().copied()
    }

    pub fn is_end(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn advance(&mut self) {
        let dag = self.dag;
        while let Some(&top) = self.stack.last() {
            // Remaining heads are pushed up front but not visited yet
            if !self.visited[top] {
                break;
            }
            let visited = &self.visited;
            match dag.edges[top].iter().copied().find(|v| !visited[*v]) {
                Some(next) => {
                    self.stack.push(next);
                    break;
                }
                None => {
                    self.stack.pop();
                }
            }
        }
        if let Some(&top) = self.stack.last() {
            self.visited[top] = true;
        }
    }
}

impl PartialEq for DfsIter<'_> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.dag, other.dag)
            && self.stack.len() == other.stack.len()
            && self.stack.last() == other.stack.last()
    }
}

impl Iterator for DfsIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let vertex = self.current()?;
        self.advance();
        Some(vertex)
    }
}
