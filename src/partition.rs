// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Array partitioning onto scratchpad banks.
//!
//! A banked array `a` with factor F becomes F scratchpad partitions
//! named `a-0` .. `a-{F-1}`. Every access previously attributed to `a`
//! is moved to the bank holding its element.

use compact_str::{format_compact, CompactString};
use rayon::prelude::*;
use crate::base_addr::BaseAddressMap;
use crate::config::{PartitionLayout, SimConfig};
use crate::graph::DepGraph;
use crate::scratchpad::ScratchpadModel;

/// Smallest power of two not below `n`. Zero rounds to one.
#[inline]
pub fn next_power_of_two(n: u64) -> u64 {
    n.max(1).next_power_of_two()
}

/// Name of bank `bank` of array `base`.
#[inline]
pub fn bank_label(base: &str, bank: u32) -> CompactString {
    format_compact!("{}-{}", base, bank)
}

/// Element index of `abs_addr` relative to the array base.
///
/// Saturates for addresses more than `i64::MAX` elements away, which
/// the bank functions clamp or wrap like any other outlier.
#[inline]
pub fn relative_index(abs_addr: u64, base_addr: i64, element_size: u32) -> i64 {
    let rel = (abs_addr as i128 - base_addr as i128)
        .div_euclid(element_size.max(1) as i128);
    rel.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Block layout: the element count is rounded up to a power of two
/// first, as the hardware rounds bank widths.
///
/// Indices outside the array land in the first or last bank.
pub fn block_bank(rel: i64, num_elements: u64, factor: u32) -> u32 {
    let factor = factor.max(1);
    let per_bank = next_power_of_two(num_elements).div_ceil(factor as u64).max(1);
    rel.div_euclid(per_bank as i64).clamp(0, factor as i64 - 1) as u32
}

/// Cyclic layout: round-robin over banks.
#[inline]
pub fn cyclic_bank(rel: i64, factor: u32) -> u32 {
    rel.rem_euclid(factor.max(1) as i64) as u32
}

pub fn bank_index(layout: PartitionLayout, rel: i64, num_elements: u64, factor: u32) -> u32 {
    match layout {
        PartitionLayout::Block => block_bank(rel, num_elements, factor),
        PartitionLayout::Cyclic => cyclic_bank(rel, factor),
    }
}

/// Turn every completely partitioned array into register storage.
///
/// Returns the number of declared regions; zero when nothing is
/// configured.
pub fn complete_partition(config: &SimConfig, spad: &mut dyn ScratchpadModel) -> usize {
    if config.complete.is_empty() {
        return 0
    }
    clilog::info!("mem to reg conversion: {} arrays", config.complete.len());
    for (name, &size) in &config.complete {
        spad.declare_complete(name, size);
    }
    config.complete.len()
}

/// Split banked arrays and move their accesses to the right bank.
///
/// Returns the number of rewritten map entries.
pub fn scratchpad_partition(
    graph: &DepGraph,
    map: &mut BaseAddressMap,
    config: &SimConfig,
    spad: &mut dyn ScratchpadModel,
) -> usize {
    if config.scratchpad.is_empty() {
        return 0
    }
    clilog::info!("scratchpad partition: {} arrays", config.scratchpad.len());
    for (name, part) in &config.scratchpad {
        let bank_size = part.bank_size();
        for i in 0..part.factor {
            spad.declare_banked(&bank_label(name, i), bank_size, part.word_size);
        }
    }

    let relabels = (0..graph.num_vertices()).into_par_iter().filter_map(|v| {
        let node = graph.node(v);
        if !node.is_memory_op() {
            return None
        }
        let base = map.get(node.node_id())?;
        let part = config.scratchpad.get(&base.label)?;
        let mem = node.mem_access()?;
        let element_size = match mem.size_bytes() {
            0 => part.word_size,
            s => s,
        };
        let rel = relative_index(mem.vaddr, base.addr, element_size);
        let bank = bank_index(part.layout, rel, part.num_elements(), part.factor);
        Some((node.node_id(), bank_label(&base.label, bank)))
    }).collect::<Vec<_>>();

    for (node_id, label) in &relabels {
        clilog::trace!("inst {} -> {}", node_id, label);
        map.set_label(*node_id, label.clone());
    }
    clilog::info!("moved {} accesses onto banks", relabels.len());
    relabels.len()
}
