// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Cycle-level scheduler of an accelerator datapath backed by a
//! scratchpad.
//!
//! Every connected node goes through three states: waiting for
//! parents, admitted (in flight, then in the executing queue), and
//! retired. A retired node notifies its children; a child whose last
//! parent retired is admitted for the next cycle.
//!
//! Memory nodes in the executing queue compete for scratchpad
//! bandwidth and stay queued, in order, until their partition can
//! take the request.

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use crate::base_addr::BaseAddressMap;
use crate::graph::DepGraph;
use crate::scratchpad::{AccessCounts, ScratchpadModel};

/// Nodes retired in one cycle, by kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleActivity {
    pub cycle: u64,
    pub loads: u32,
    pub stores: u32,
    pub int_ops: u32,
    pub fp_ops: u32,
    pub other_ops: u32,
}

/// Summary of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatapathStats {
    pub cycles: u64,
    /// Clock period in ns.
    pub cycle_time: f32,
    pub executed_nodes: usize,
    /// Connected nodes in the graph.
    pub total_nodes: usize,
    /// Accesses served per scratchpad partition.
    pub partitions: IndexMap<CompactString, AccessCounts>,
    pub activity: Vec<CycleActivity>,
}

impl DatapathStats {
    pub fn runtime_ns(&self) -> f32 {
        self.cycles as f32 * self.cycle_time
    }

    pub fn peak_memory_ops_per_cycle(&self) -> u32 {
        self.activity.iter().map(|a| a.loads + a.stores).max().unwrap_or(0)
    }
}

pub struct Datapath<S: ScratchpadModel> {
    graph: DepGraph,
    base_addr: BaseAddressMap,
    spad: S,
    cycle_time: f32,
    initialized: bool,
    /// admitted nodes not due yet, as (due cycle, vertex), in
    /// admission order.
    in_flight: VecDeque<(u64, usize)>,
    executing_queue: VecDeque<usize>,
    /// children whose last parent retired, not admitted yet.
    ready_children: Vec<usize>,
    /// retirement cycle of each vertex.
    new_level: Vec<Option<u64>>,
    num_cycles: u64,
    executed_nodes: usize,
    total_connected_nodes: usize,
    access_counts: IndexMap<CompactString, AccessCounts>,
    cur_activity: CycleActivity,
    activity: Vec<CycleActivity>,
}

impl<S: ScratchpadModel> Datapath<S> {
    /// Take over a graph whose passes have all run, with the final
    /// base address map and a scratchpad holding the declared
    /// partitions.
    pub fn new(graph: DepGraph, base_addr: BaseAddressMap, spad: S, cycle_time: f32) -> Self {
        let total_connected_nodes = graph.nodes().iter()
            .filter(|n| !n.isolated).count();
        let num_vertices = graph.num_vertices();
        Datapath {
            graph, base_addr, spad, cycle_time,
            initialized: false,
            in_flight: VecDeque::new(),
            executing_queue: VecDeque::new(),
            ready_children: Vec::new(),
            new_level: vec![None; num_vertices],
            num_cycles: 0,
            executed_nodes: 0,
            total_connected_nodes,
            access_counts: IndexMap::new(),
            cur_activity: CycleActivity::default(),
            activity: Vec::new(),
        }
    }

    pub fn graph(&self) -> &DepGraph {
        &self.graph
    }

    pub fn base_address(&self) -> &BaseAddressMap {
        &self.base_addr
    }

    pub fn scratchpad(&self) -> &S {
        &self.spad
    }

    pub fn scratchpad_mut(&mut self) -> &mut S {
        &mut self.spad
    }

    #[inline]
    pub fn num_cycles(&self) -> u64 {
        self.num_cycles
    }

    #[inline]
    pub fn executed_nodes(&self) -> usize {
        self.executed_nodes
    }

    /// Vertices in the executing queue, front first.
    pub fn executing_queue(&self) -> impl Iterator<Item = usize> + '_ {
        self.executing_queue.iter().copied()
    }

    /// The cycle vertex `v` retired in.
    #[inline]
    pub fn completion_cycle(&self, v: usize) -> Option<u64> {
        self.new_level[v]
    }

    /// Admit every connected node without parents at cycle 0.
    pub fn init_executing_queue(&mut self) {
        if self.initialized {
            return
        }
        self.initialized = true;
        for v in 0..self.graph.num_vertices() {
            let node = self.graph.node(v);
            if !node.isolated && node.num_parents() == 0 {
                self.admit(v, 0);
            }
        }
        clilog::debug!("{} nodes initially ready", self.in_flight.len());
    }

    /// Start vertex `v` at `cycle`. A memory node is queued at once,
    /// other nodes when their functional unit is done.
    fn admit(&mut self, v: usize, cycle: u64) {
        let cycle_time = self.cycle_time;
        let node = self.graph.node_mut(v);
        let due = match node.is_memory_op() {
            true => cycle,
            false => cycle + node.fu_node_cycles(cycle_time) - 1,
        };
        node.start_execution_cycle = cycle;
        node.complete_execution_cycle = due;
        node.time_before_execution = cycle as f32 * cycle_time;
        self.in_flight.push_back((due, v));
    }

    /// Move in-flight nodes due by now to the executing queue, keeping
    /// their admission order.
    fn promote_due(&mut self) {
        let now = self.num_cycles;
        let mut later = VecDeque::with_capacity(self.in_flight.len());
        for (due, v) in self.in_flight.drain(..) {
            if due <= now {
                self.executing_queue.push_back(v);
            }
            else {
                later.push_back((due, v));
            }
        }
        self.in_flight = later;
    }

    /// Try to get scratchpad bandwidth for memory vertex `v` and
    /// account for the access. Grant check and reservation happen
    /// together.
    fn try_memory_access(&mut self, v: usize) -> bool {
        let node = self.graph.node(v);
        let label = match self.base_addr.label_of(node.node_id()) {
            Some(label) if self.spad.is_declared(label) => label,
            other => {
                clilog::warn!(SPAD_UNMAPPED,
                              "memory op {} accesses undeclared partition {:?}, \
                               serving it without a port",
                              node.node_id(), other);
                return true
            }
        };
        if !self.spad.can_service(label) {
            return false
        }
        let granted = self.spad.reserve(label);
        debug_assert!(granted, "reserve failed right after can_service on {}", label);
        let counts = self.access_counts.entry(label.into()).or_default();
        if node.is_load_op() {
            self.spad.record_load(label);
            counts.loads += 1;
        }
        else {
            self.spad.record_store(label);
            counts.stores += 1;
        }
        true
    }

    fn retire(&mut self, v: usize) {
        let now = self.num_cycles;
        self.new_level[v] = Some(now);
        self.executed_nodes += 1;
        let node = self.graph.node_mut(v);
        node.complete_execution_cycle = now;
        let a = &mut self.cur_activity;
        if node.is_load_op() {
            a.loads += 1;
        }
        else if node.is_store_op() {
            a.stores += 1;
        }
        else if node.is_fp_op() {
            a.fp_ops += 1;
        }
        else if node.is_compute_op() {
            a.int_ops += 1;
        }
        else {
            a.other_ops += 1;
        }
        self.update_children(v);
    }

    fn update_children(&mut self, v: usize) {
        for i in 0..self.graph.out_degree(v) {
            let c = self.graph.successors(v)[i];
            if self.graph.node_mut(c).decr_num_parents() {
                self.ready_children.push(c);
            }
        }
    }

    /// Scan the executing queue once, in order, at the current cycle.
    ///
    /// Non-memory nodes always retire. Memory nodes retire if their
    /// partition takes the request, otherwise they keep their place
    /// relative to the other waiting nodes. Children made ready are
    /// collected for the caller to admit.
    ///
    /// Returns the number of retired nodes.
    pub fn step_executing_queue(&mut self) -> usize {
        let queue = std::mem::take(&mut self.executing_queue);
        let mut waiting = VecDeque::with_capacity(queue.len());
        let mut num_retired = 0;
        for v in queue {
            let done = match self.graph.node(v).is_memory_op() {
                true => self.try_memory_access(v),
                false => true,
            };
            if done {
                self.retire(v);
                num_retired += 1;
            }
            else {
                waiting.push_back(v);
            }
        }
        self.executing_queue = waiting;
        num_retired
    }

    /// Simulate one cycle. Returns whether any node is left.
    ///
    /// The first call admits the initially ready nodes if
    /// [`Self::init_executing_queue`] has not been called yet.
    pub fn step(&mut self) -> bool {
        self.init_executing_queue();
        self.spad.new_cycle();
        let now = self.num_cycles;
        self.cur_activity = CycleActivity { cycle: now, ..Default::default() };
        self.promote_due();
        let num_retired = self.step_executing_queue();
        for c in std::mem::take(&mut self.ready_children) {
            self.admit(c, now + 1);
        }
        clilog::trace!("cycle {}: retired {}, {} queued, {} in flight",
                       now, num_retired, self.executing_queue.len(),
                       self.in_flight.len());
        self.activity.push(self.cur_activity);
        self.num_cycles += 1;
        self.executed_nodes < self.total_connected_nodes
    }

    /// Run until every connected node has retired.
    pub fn run(&mut self) -> DatapathStats {
        let timer_sim = clilog::stimer!("datapath simulation");
        self.init_executing_queue();
        if self.executed_nodes < self.total_connected_nodes {
            while self.step() {
                if self.num_cycles % 100000 == 0 {
                    clilog::debug!("cycle {}: {}/{} nodes executed",
                                   self.num_cycles, self.executed_nodes,
                                   self.total_connected_nodes);
                }
            }
        }
        clilog::finish!(timer_sim);
        clilog::info!("{} nodes executed in {} cycles",
                      self.executed_nodes, self.num_cycles);
        self.stats()
    }

    pub fn stats(&self) -> DatapathStats {
        DatapathStats {
            cycles: self.num_cycles,
            cycle_time: self.cycle_time,
            executed_nodes: self.executed_nodes,
            total_nodes: self.total_connected_nodes,
            partitions: self.access_counts.clone(),
            activity: self.activity.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_addr::BaseAddress;
    use crate::latency::FP_LATENCY_IN_CYCLES;
    use crate::node::ExecNode;
    use crate::opcode::Opcode;
    use crate::scratchpad::Scratchpad;

    fn mem(id: u32, op: Opcode) -> ExecNode {
        let mut n = ExecNode::new(id, op);
        n.set_mem_access(0, 32, 0).unwrap();
        n
    }

    fn map_of(entries: &[(u32, &str)]) -> BaseAddressMap {
        let mut map = BaseAddressMap::default();
        for &(id, label) in entries {
            map.insert(id, BaseAddress { label: label.into(), addr: 0 });
        }
        map
    }

    /// A partition that is either open to everything or closed.
    #[derive(Default)]
    struct Gate {
        open: bool,
        armed: bool,
        loads: u32,
    }

    impl ScratchpadModel for Gate {
        fn declare_complete(&mut self, _: &str, _: u32) {}
        fn declare_banked(&mut self, _: &str, _: u32, _: u32) {}
        fn is_declared(&self, _: &str) -> bool { true }
        fn new_cycle(&mut self) {}
        fn can_service(&mut self, _: &str) -> bool {
            self.armed = self.open;
            self.open
        }
        fn reserve(&mut self, _: &str) -> bool {
            std::mem::take(&mut self.armed)
        }
        fn record_load(&mut self, _: &str) { self.loads += 1; }
        fn record_store(&mut self, _: &str) {}
    }

    #[test]
    fn ready_node_retires_when_scanned() {
        let nodes = vec![ExecNode::new(0, Opcode::Add), ExecNode::new(1, Opcode::Mul),
                         ExecNode::new(2, Opcode::Sub)];
        let g = DepGraph::from_nodes_edges(nodes, &[(0, 1), (0, 2), (1, 2)]).unwrap();
        let mut dp = Datapath::new(g, BaseAddressMap::default(), Scratchpad::new(1), 6.0);
        dp.init_executing_queue();
        dp.promote_due();
        assert_eq!(dp.step_executing_queue(), 1);
        assert_eq!(dp.completion_cycle(0), Some(0));
        assert_eq!(dp.graph().node(1).num_parents(), 0);
        assert_eq!(dp.graph().node(2).num_parents(), 1);
        assert_eq!(dp.ready_children, vec![1]);
        // promotion is the caller's job
        assert_eq!(dp.executing_queue().count(), 0);
    }

    #[test]
    fn blocked_access_waits_in_place() {
        let nodes = vec![mem(0, Opcode::Load), ExecNode::new(1, Opcode::Add)];
        let g = DepGraph::from_nodes_edges(nodes, &[(0, 1)]).unwrap();
        let mut dp = Datapath::new(g, map_of(&[(0, "a-0")]), Gate::default(), 6.0);
        dp.init_executing_queue();
        for _ in 0..3 {
            assert!(dp.step());
            assert_eq!(dp.executing_queue().collect::<Vec<_>>(), vec![0]);
            assert_eq!(dp.completion_cycle(0), None);
            assert_eq!(dp.graph().node(1).num_parents(), 1);
        }
        dp.scratchpad_mut().open = true;
        assert!(dp.step());
        assert_eq!(dp.completion_cycle(0), Some(3));
        assert_eq!(dp.scratchpad().loads, 1);
        assert!(!dp.step());
        assert_eq!(dp.completion_cycle(1), Some(4));
    }

    #[test]
    fn bank_conflicts_keep_queue_order() {
        // four loads on two banks, one port each, all feeding one add
        let nodes = vec![mem(0, Opcode::Load), mem(1, Opcode::Load),
                         mem(2, Opcode::Load), mem(3, Opcode::Store),
                         ExecNode::new(4, Opcode::Add)];
        let edges = [(0, 4), (1, 4), (2, 4), (3, 4)];
        let g = DepGraph::from_nodes_edges(nodes, &edges).unwrap();
        let mut spad = Scratchpad::new(1);
        spad.declare_banked("a-0", 64, 4);
        spad.declare_banked("a-1", 64, 4);
        let map = map_of(&[(0, "a-0"), (1, "a-0"), (2, "a-1"), (3, "a-0")]);
        let mut dp = Datapath::new(g, map, spad, 6.0);
        dp.init_executing_queue();

        dp.step();
        assert_eq!(dp.executing_queue().collect::<Vec<_>>(), vec![1, 3]);
        dp.step();
        assert_eq!(dp.executing_queue().collect::<Vec<_>>(), vec![3]);
        let stats = dp.run();
        assert_eq!(dp.completion_cycle(0), Some(0));
        assert_eq!(dp.completion_cycle(2), Some(0));
        assert_eq!(dp.completion_cycle(1), Some(1));
        assert_eq!(dp.completion_cycle(3), Some(2));
        assert_eq!(dp.completion_cycle(4), Some(3));
        assert_eq!(stats.cycles, 4);
        assert_eq!(stats.partitions["a-0"], AccessCounts { loads: 2, stores: 1 });
        assert_eq!(dp.scratchpad().counts_of("a-1"), Some(AccessCounts { loads: 1, stores: 0 }));
        assert_eq!(stats.peak_memory_ops_per_cycle(), 2);
    }

    #[test]
    fn more_ports_more_throughput() {
        let nodes = (0..4).map(|i| mem(i, Opcode::Load))
            .chain([ExecNode::new(9, Opcode::Add)]).collect::<Vec<_>>();
        let edges = (0..4).map(|i| (i, 9)).collect::<Vec<_>>();
        let map = map_of(&[(0, "a-0"), (1, "a-0"), (2, "a-0"), (3, "a-0")]);
        let mut cycles = Vec::new();
        for ports in [1, 2, 4] {
            let g = DepGraph::from_nodes_edges(nodes.clone(), &edges).unwrap();
            let mut spad = Scratchpad::new(ports);
            spad.declare_banked("a-0", 64, 4);
            cycles.push(Datapath::new(g, map.clone(), spad, 6.0).run().cycles);
        }
        assert_eq!(cycles, vec![5, 3, 2]);
    }

    #[test]
    fn fp_ops_take_multiple_cycles() {
        let nodes = vec![ExecNode::new(0, Opcode::FMul), ExecNode::new(1, Opcode::Add),
                         ExecNode::new(2, Opcode::Ret)];
        let g = DepGraph::from_nodes_edges(nodes, &[(0, 1)]).unwrap();
        let mut dp = Datapath::new(g, BaseAddressMap::default(), Scratchpad::new(1), 6.0);
        let stats = dp.run();
        let fp = FP_LATENCY_IN_CYCLES as u64;
        assert_eq!(dp.completion_cycle(0), Some(fp - 1));
        assert_eq!(dp.graph().node(0).start_execution_cycle, 0);
        assert_eq!(dp.graph().node(1).start_execution_cycle, fp);
        assert_eq!(dp.completion_cycle(1), Some(fp));
        // the ret has no edges and is never scheduled
        assert_eq!(dp.completion_cycle(2), None);
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.cycles, fp + 1);
        assert_eq!(stats.activity.iter().map(|a| a.fp_ops).sum::<u32>(), 1);
    }

    #[test]
    fn unmapped_access_is_not_blocked() {
        let nodes = vec![mem(0, Opcode::Store), ExecNode::new(1, Opcode::Add)];
        let g = DepGraph::from_nodes_edges(nodes, &[(1, 0)]).unwrap();
        let mut dp = Datapath::new(g, map_of(&[(0, "nowhere")]), Scratchpad::new(1), 6.0);
        let stats = dp.run();
        assert_eq!(stats.cycles, 2);
        assert!(stats.partitions.is_empty());
    }

    #[test]
    fn stepping_alone_runs_to_completion() {
        let nodes = vec![ExecNode::new(0, Opcode::Add), ExecNode::new(1, Opcode::Add)];
        let g = DepGraph::from_nodes_edges(nodes, &[(0, 1)]).unwrap();
        let mut dp = Datapath::new(g, BaseAddressMap::default(), Scratchpad::new(1), 6.0);
        let mut num_steps = 0;
        while dp.step() {
            num_steps += 1;
            assert!(num_steps < 10);
        }
        assert_eq!(dp.executed_nodes(), 2);
        assert_eq!(dp.num_cycles(), 2);
        assert_eq!(dp.completion_cycle(1), Some(1));
        // a later run finds nothing left to do
        let stats = dp.run();
        assert_eq!(stats.executed_nodes, 2);
        assert_eq!(stats.cycles, 2);
    }

    #[test]
    fn empty_graph_takes_no_cycles() {
        let g = DepGraph::from_nodes_edges(vec![ExecNode::new(0, Opcode::Add)], &[]).unwrap();
        let stats = Datapath::new(g, BaseAddressMap::default(), Scratchpad::new(1), 6.0).run();
        assert_eq!(stats.cycles, 0);
        assert_eq!(stats.executed_nodes, 0);
    }
}
