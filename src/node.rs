// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! The dynamic instruction node.

use compact_str::{format_compact, CompactString};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use crate::error::{Result, SimError};
use crate::latency::fu_latency;
use crate::opcode::Opcode;

/// All information about one memory access.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemAccess {
    /// Address read from the trace.
    pub vaddr: u64,
    /// Physical address. Only used by cache models, zero otherwise.
    #[serde(default)]
    pub paddr: u64,
    /// Size of the access in BITS.
    pub size: u32,
    /// The stored value. Meaningless for loads.
    #[serde(default)]
    pub value: u64,
}

impl MemAccess {
    /// Size of the access in bytes, rounded down.
    #[inline]
    pub fn size_bytes(&self) -> u32 {
        self.size / 8
    }
}

/// One dynamic instance of an IR instruction.
///
/// Nodes compare, order and hash by id only.
#[derive(Debug, Clone)]
pub struct ExecNode {
    node_id: u32,
    opcode: Opcode,
    /// Name of the function this node belongs to.
    pub static_method: CompactString,
    pub basic_block_id: CompactString,
    /// Identifier of the static instruction that produced this node.
    pub inst_id: CompactString,
    /// This node came from the i-th invocation of its function.
    pub dynamic_invocation: u32,
    /// Source line, -1 if unknown.
    pub line_num: i32,
    pub start_execution_cycle: u64,
    /// Equal to the start cycle except for multi-cycle ops.
    pub complete_execution_cycle: u64,
    /// Elapsed time before this node executes, can be a fraction
    /// of a cycle.
    pub time_before_execution: f32,
    num_parents: u32,
    /// No parents and no children.
    pub isolated: bool,
    /// Inductive, or only has inductive parents.
    pub inductive: bool,
    pub dynamic_mem_op: bool,
    pub double_precision: bool,
    array_label: CompactString,
    mem_access: Option<MemAccess>,
    vertex: Option<usize>,
}

impl PartialEq for ExecNode {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }
}

impl Eq for ExecNode {}

impl PartialOrd for ExecNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExecNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.node_id.cmp(&other.node_id)
    }
}

impl Hash for ExecNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node_id.hash(state);
    }
}

impl ExecNode {
    pub fn new(node_id: u32, opcode: Opcode) -> ExecNode {
        ExecNode {
            node_id,
            opcode,
            static_method: CompactString::default(),
            basic_block_id: CompactString::default(),
            inst_id: CompactString::default(),
            dynamic_invocation: 0,
            line_num: -1,
            start_execution_cycle: 0,
            complete_execution_cycle: 0,
            time_before_execution: 0.,
            num_parents: 0,
            isolated: true,
            inductive: false,
            dynamic_mem_op: false,
            double_precision: false,
            array_label: CompactString::default(),
            mem_access: None,
            vertex: None,
        }
    }

    #[inline]
    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    #[inline]
    pub fn num_parents(&self) -> u32 {
        self.num_parents
    }

    pub fn set_num_parents(&mut self, num_parents: u32) {
        self.num_parents = num_parents;
    }

    /// Mark one parent as retired. Saturates at zero.
    ///
    /// Returns true when this was the last outstanding parent.
    pub fn decr_num_parents(&mut self) -> bool {
        if self.num_parents == 0 {
            return false
        }
        self.num_parents -= 1;
        self.num_parents == 0
    }

    /// The graph arena index, once this node has been placed in a graph.
    #[inline]
    pub fn vertex(&self) -> Option<usize> {
        self.vertex
    }

    #[inline]
    pub fn has_vertex(&self) -> bool {
        self.vertex.is_some()
    }

    pub(crate) fn set_vertex(&mut self, vertex: usize) {
        self.vertex = Some(vertex);
    }

    pub fn array_label(&self) -> &str {
        &self.array_label
    }

    pub fn has_array_label(&self) -> bool {
        !self.array_label.is_empty()
    }

    pub fn set_array_label(&mut self, label: impl Into<CompactString>) {
        self.array_label = label.into();
    }

    #[inline]
    pub fn mem_access(&self) -> Option<&MemAccess> {
        self.mem_access.as_ref()
    }

    /// Attach the memory access of a load or store.
    pub fn set_mem_access(&mut self, vaddr: u64, size: u32, value: u64) -> Result<()> {
        if !self.is_memory_op() {
            return Err(SimError::UnexpectedMemAccess {
                node_id: self.node_id, opcode: self.opcode
            })
        }
        self.mem_access = Some(MemAccess { vaddr, paddr: 0, size, value });
        Ok(())
    }

    /// `<method>-<invocation>`
    pub fn dynamic_method(&self) -> CompactString {
        format_compact!("{}-{}", self.static_method, self.dynamic_invocation)
    }

    /// `<method>-<invocation>-<static inst id>`
    pub fn static_node_id(&self) -> CompactString {
        format_compact!("{}-{}-{}", self.static_method,
                        self.dynamic_invocation, self.inst_id)
    }

    /// Critical path delay of this node's functional unit.
    ///
    /// See [`fu_latency`]. Should not be called for memory ops.
    pub fn fu_node_latency(&self, cycle_time: f32) -> f32 {
        fu_latency(self.opcode, cycle_time)
    }

    /// Number of cycles between admission and retirement of a
    /// non-memory node. At least one.
    pub fn fu_node_cycles(&self, cycle_time: f32) -> u64 {
        let cycles = (self.fu_node_latency(cycle_time) / cycle_time).ceil();
        (cycles as u64).max(1)
    }

    pub fn is_memory_op(&self) -> bool { self.opcode.is_memory_op() }
    pub fn is_load_op(&self) -> bool { self.opcode.is_load_op() }
    pub fn is_store_op(&self) -> bool { self.opcode.is_store_op() }
    pub fn is_compute_op(&self) -> bool { self.opcode.is_compute_op() }
    pub fn is_shifter_op(&self) -> bool { self.opcode.is_shifter_op() }
    pub fn is_bit_op(&self) -> bool { self.opcode.is_bit_op() }
    pub fn is_control_op(&self) -> bool { self.opcode.is_control_op() }
    pub fn is_branch_op(&self) -> bool { self.opcode.is_branch_op() }
    pub fn is_call_op(&self) -> bool { self.opcode.is_call_op() }
    pub fn is_index_op(&self) -> bool { self.opcode.is_index_op() }
    pub fn is_convert_op(&self) -> bool { self.opcode.is_convert_op() }
    pub fn is_dma_load(&self) -> bool { self.opcode.is_dma_load() }
    pub fn is_dma_store(&self) -> bool { self.opcode.is_dma_store() }
    pub fn is_dma_op(&self) -> bool { self.opcode.is_dma_op() }
    pub fn is_int_mul_op(&self) -> bool { self.opcode.is_int_mul_op() }
    pub fn is_int_add_op(&self) -> bool { self.opcode.is_int_add_op() }
    pub fn is_fp_op(&self) -> bool { self.opcode.is_fp_op() }
    pub fn is_fp_mul_op(&self) -> bool { self.opcode.is_fp_mul_op() }
    pub fn is_fp_add_op(&self) -> bool { self.opcode.is_fp_add_op() }
    pub fn is_associative(&self) -> bool { self.opcode.is_associative() }
}
