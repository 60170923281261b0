// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Dynamic data dependence graph.
//!
//! Nodes live in an arena indexed by vertex number. Edges are stored
//! twice in CSR form (predecessors and successors), each list keeping
//! the order in which edges were given.

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::base_addr::{BaseAddress, GepTable};
use crate::error::{Result, SimError};
use crate::node::{ExecNode, MemAccess};
use crate::opcode::Opcode;

/// A node as exchanged with the trace front-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDesc {
    pub id: u32,
    pub opcode: Opcode,
    #[serde(default)]
    pub method: CompactString,
    #[serde(default)]
    pub basic_block: CompactString,
    #[serde(default)]
    pub inst_id: CompactString,
    #[serde(default)]
    pub invocation: u32,
    #[serde(default = "unknown_line")]
    pub line: i32,
    #[serde(default)]
    pub mem: Option<MemAccess>,
    #[serde(default)]
    pub double_precision: bool,
    #[serde(default)]
    pub dynamic_mem_op: bool,
    #[serde(default)]
    pub inductive: bool,
}

fn unknown_line() -> i32 {
    -1
}

/// One row of the address calculation table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GepEntry {
    pub node: u32,
    pub label: CompactString,
    pub addr: i64,
}

/// The graph interchange format produced by the trace front-end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDesc {
    pub nodes: Vec<NodeDesc>,
    /// `(parent, child)` node id pairs.
    pub edges: Vec<(u32, u32)>,
    #[serde(default)]
    pub gep: Vec<GepEntry>,
}

impl GraphDesc {
    pub fn load(path: impl AsRef<Path>) -> Result<GraphDesc> {
        let f = std::fs::File::open(path)?;
        let rd = std::io::BufReader::new(f);
        Ok(serde_json::from_reader(rd)?)
    }

    pub fn gep_table(&self) -> GepTable {
        self.gep.iter().map(|e| (e.node, BaseAddress {
            label: e.label.clone(),
            addr: e.addr
        })).collect()
    }
}

/// An arena of instruction nodes plus their dependence edges.
#[derive(Debug, Default)]
pub struct DepGraph {
    nodes: Vec<ExecNode>,
    id2vertex: IndexMap<u32, usize>,
    /// `(parent, child)` vertex pairs in the order given.
    edges: Vec<(usize, usize)>,
    preds_start: Vec<usize>,
    preds: Vec<usize>,
    succs_start: Vec<usize>,
    succs: Vec<usize>,
}

/// Build an order-preserving CSR of `(key, item)` pairs.
fn build_csr(num_keys: usize, pairs: impl Iterator<Item = (usize, usize)> + Clone)
             -> (Vec<usize>, Vec<usize>) {
    let mut start = vec![0; num_keys + 1];
    for (k, _) in pairs.clone() {
        start[k + 1] += 1;
    }
    for i in 1..num_keys + 1 {
        start[i] += start[i - 1];
    }
    let mut cursor = start.clone();
    let mut items = vec![0; start[num_keys]];
    for (k, v) in pairs {
        items[cursor[k]] = v;
        cursor[k] += 1;
    }
    (start, items)
}

impl DepGraph {
    /// Place nodes in the arena (in the given order) and connect them.
    ///
    /// Sets each node's vertex, parent count and isolated flag.
    /// Rejects duplicate ids, dangling edges, memory ops without a
    /// memory access and cyclic dependences.
    pub fn from_nodes_edges(
        mut nodes: Vec<ExecNode>, edges: &[(u32, u32)]
    ) -> Result<DepGraph> {
        let mut id2vertex = IndexMap::with_capacity(nodes.len());
        for (v, node) in nodes.iter_mut().enumerate() {
            if id2vertex.insert(node.node_id(), v).is_some() {
                return Err(SimError::DuplicateNode { node_id: node.node_id() })
            }
            if node.is_memory_op() && node.mem_access().is_none() {
                return Err(SimError::MissingMemAccess {
                    node_id: node.node_id(), opcode: node.opcode()
                })
            }
            node.set_vertex(v);
        }
        let mut vedges = Vec::with_capacity(edges.len());
        for &(from, to) in edges {
            let vfrom = *id2vertex.get(&from)
                .ok_or(SimError::UnknownNode { node_id: from })?;
            let vto = *id2vertex.get(&to)
                .ok_or(SimError::UnknownNode { node_id: to })?;
            vedges.push((vfrom, vto));
        }
        let n = nodes.len();
        let mut graph = DepGraph {
            nodes, id2vertex,
            edges: vedges,
            ..Default::default()
        };
        graph.rebuild_topology();
        graph.check_acyclic()?;
        clilog::debug!("dependence graph: {} nodes, {} edges",
                       n, graph.preds.len());
        Ok(graph)
    }

    pub fn from_desc(desc: &GraphDesc) -> Result<DepGraph> {
        let mut nodes = Vec::with_capacity(desc.nodes.len());
        for nd in &desc.nodes {
            let mut node = ExecNode::new(nd.id, nd.opcode);
            node.static_method = nd.method.clone();
            node.basic_block_id = nd.basic_block.clone();
            node.inst_id = nd.inst_id.clone();
            node.dynamic_invocation = nd.invocation;
            node.line_num = nd.line;
            node.double_precision = nd.double_precision;
            node.dynamic_mem_op = nd.dynamic_mem_op;
            node.inductive = nd.inductive;
            if let Some(mem) = nd.mem {
                node.set_mem_access(mem.vaddr, mem.size, mem.value)?;
            }
            nodes.push(node);
        }
        DepGraph::from_nodes_edges(nodes, &desc.edges)
    }

    /// Rebuild both CSRs from the edge list, then reset parent counts
    /// and isolated flags.
    fn rebuild_topology(&mut self) {
        let n = self.nodes.len();
        (self.preds_start, self.preds) = build_csr(
            n, self.edges.iter().map(|&(a, b)| (b, a)));
        (self.succs_start, self.succs) = build_csr(
            n, self.edges.iter().copied());
        self.reset_num_parents();
        for v in 0..n {
            let isolated = self.degree(v) == 0;
            self.nodes[v].isolated = isolated;
        }
    }

    fn vertex_or_err(&self, node_id: u32) -> Result<usize> {
        self.vertex_of(node_id).ok_or(SimError::UnknownNode { node_id })
    }

    /// Remove every `parent -> child` edge.
    ///
    /// Parent counts and isolated flags are recomputed for the whole
    /// graph. Returns the number of removed edges.
    pub fn remove_edge(&mut self, parent: u32, child: u32) -> Result<usize> {
        let (vp, vc) = (self.vertex_or_err(parent)?, self.vertex_or_err(child)?);
        let before = self.edges.len();
        self.edges.retain(|&e| e != (vp, vc));
        let num_removed = before - self.edges.len();
        if num_removed > 0 {
            self.rebuild_topology();
        }
        Ok(num_removed)
    }

    /// Disconnect a node from all its parents and children. The node
    /// stays in the arena, isolated, and is never scheduled.
    ///
    /// Returns the number of removed edges.
    pub fn isolate_node(&mut self, node_id: u32) -> Result<usize> {
        let v = self.vertex_or_err(node_id)?;
        let before = self.edges.len();
        self.edges.retain(|&(a, b)| a != v && b != v);
        let num_removed = before - self.edges.len();
        if num_removed > 0 {
            self.rebuild_topology();
        }
        clilog::trace!("isolated node {} ({} edges)", node_id, num_removed);
        Ok(num_removed)
    }

    /// Reset every parent count to the node's in-degree.
    pub fn reset_num_parents(&mut self) {
        for v in 0..self.nodes.len() {
            let in_degree = self.in_degree(v) as u32;
            self.nodes[v].set_num_parents(in_degree);
        }
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut indeg = (0..self.nodes.len())
            .map(|v| self.in_degree(v)).collect::<Vec<_>>();
        let mut stack = (0..self.nodes.len())
            .filter(|&v| indeg[v] == 0).collect::<Vec<_>>();
        let mut visited = 0;
        while let Some(v) = stack.pop() {
            visited += 1;
            for &c in self.successors(v) {
                indeg[c] -= 1;
                if indeg[c] == 0 {
                    stack.push(c);
                }
            }
        }
        if visited == self.nodes.len() {
            return Ok(())
        }
        let v = (0..self.nodes.len()).find(|&v| indeg[v] != 0)
            .unwrap_or_default();
        Err(SimError::CyclicGraph { node_id: self.nodes[v].node_id() })
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn num_edges(&self) -> usize {
        self.preds.len()
    }

    #[inline]
    pub fn node(&self, v: usize) -> &ExecNode {
        &self.nodes[v]
    }

    #[inline]
    pub fn node_mut(&mut self, v: usize) -> &mut ExecNode {
        &mut self.nodes[v]
    }

    pub fn nodes(&self) -> &[ExecNode] {
        &self.nodes
    }

    #[inline]
    pub fn vertex_of(&self, node_id: u32) -> Option<usize> {
        self.id2vertex.get(&node_id).copied()
    }

    pub fn opcode_of(&self, node_id: u32) -> Option<Opcode> {
        self.vertex_of(node_id).map(|v| self.nodes[v].opcode())
    }

    /// Direct parents of `v`, in edge order.
    #[inline]
    pub fn predecessors(&self, v: usize) -> &[usize] {
        &self.preds[self.preds_start[v]..self.preds_start[v + 1]]
    }

    /// Direct children of `v`, in edge order.
    #[inline]
    pub fn successors(&self, v: usize) -> &[usize] {
        &self.succs[self.succs_start[v]..self.succs_start[v + 1]]
    }

    #[inline]
    pub fn in_degree(&self, v: usize) -> usize {
        self.preds_start[v + 1] - self.preds_start[v]
    }

    #[inline]
    pub fn out_degree(&self, v: usize) -> usize {
        self.succs_start[v + 1] - self.succs_start[v]
    }

    #[inline]
    pub fn degree(&self, v: usize) -> usize {
        self.in_degree(v) + self.out_degree(v)
    }
}
