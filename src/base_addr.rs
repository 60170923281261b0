// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Attributing memory operations to the arrays they access.
//!
//! The trace front-end gives us an address calculation table: for
//! every address-producing node, the array (partition) name and the
//! absolute address it computed. A load or store usually does not
//! appear in that table with a useful name itself, so we walk up its
//! address calculation chain to find the array it really touches.

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::graph::DepGraph;
use crate::opcode::Opcode;

/// A partition name with an absolute address inside it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseAddress {
    pub label: CompactString,
    pub addr: i64,
}

/// The external address calculation table, by node id.
pub type GepTable = IndexMap<u32, BaseAddress>;

/// Node id -> the partition and base address it accesses.
///
/// Built by [`init_base_address`], then only rewritten by the
/// scratchpad partitioner.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BaseAddressMap {
    entries: IndexMap<u32, BaseAddress>,
}

impl BaseAddressMap {
    #[inline]
    pub fn get(&self, node_id: u32) -> Option<&BaseAddress> {
        self.entries.get(&node_id)
    }

    pub fn label_of(&self, node_id: u32) -> Option<&str> {
        self.entries.get(&node_id).map(|b| b.label.as_str())
    }

    pub fn insert(&mut self, node_id: u32, base: BaseAddress) {
        self.entries.insert(node_id, base);
    }

    pub(crate) fn set_label(&mut self, node_id: u32, label: CompactString) {
        if let Some(b) = self.entries.get_mut(&node_id) {
            b.label = label;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &BaseAddress)> {
        self.entries.iter().map(|(&id, b)| (id, b))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write(&self, w: impl Write) -> Result<()> {
        let rows = self.entries.iter()
            .map(|(&id, b)| (id, b.clone()))
            .collect::<Vec<_>>();
        serde_bare::to_writer(w, &rows)?;
        Ok(())
    }

    pub fn read(r: impl Read) -> Result<BaseAddressMap> {
        let rows: Vec<(u32, BaseAddress)> = serde_bare::from_reader(r)?;
        Ok(BaseAddressMap { entries: rows.into_iter().collect() })
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let f = std::fs::File::create(path.as_ref())?;
        let mut buf = BufWriter::new(f);
        self.write(&mut buf)?;
        buf.flush()?;
        clilog::info!("base address map ({} entries) written to {}",
                      self.len(), path.as_ref().display());
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<BaseAddressMap> {
        let f = std::fs::File::open(path)?;
        BaseAddressMap::read(BufReader::new(f))
    }
}

/// Walk up the address calculation chain of vertex `v`.
///
/// Returns the entry adopted last and the number of levels climbed,
/// or None when no ancestor computes an address.
fn trace_address_root<'g>(
    graph: &DepGraph, gep: &'g GepTable, v: usize
) -> Option<(Option<&'g BaseAddress>, usize)> {
    let mut cur = v;
    let mut found = None;
    let mut hops = 0;
    loop {
        let mut next = None;
        for &p in graph.predecessors(cur) {
            let parent = graph.node(p);
            match parent.opcode() {
                op if op.is_address_source() => {
                    found = Some(gep.get(&parent.node_id()));
                    next = Some(p);
                    break
                },
                Opcode::Alloca => {
                    found = Some(gep.get(&parent.node_id()));
                    break
                },
                _ => {}
            }
        }
        match next {
            Some(p) => {
                hops += 1;
                debug_assert!(hops <= graph.num_vertices());
                cur = p;
            },
            None => break
        }
    }
    found.map(|f| (f, hops))
}

/// Resolve the partition and base address of every connected memory
/// operation.
///
/// The label of an entry found through the address calculation chain
/// must name a configured partition. A node with no such ancestor falls
/// back to its own table entry, which is taken as-is.
pub fn init_base_address(
    graph: &mut DepGraph, gep: &GepTable, config: &SimConfig
) -> Result<BaseAddressMap> {
    let mut map = BaseAddressMap::default();
    let mut num_fallback = 0;
    for v in 0..graph.num_vertices() {
        if graph.degree(v) == 0 || !graph.node(v).is_memory_op() {
            continue
        }
        let node_id = graph.node(v).node_id();
        let base = match trace_address_root(graph, gep, v) {
            Some((entry, hops)) => {
                let base = entry.cloned().unwrap_or_default();
                if !config.has_partition(&base.label) {
                    clilog::error!("unknown partition: {} @inst: {}",
                                   base.label, node_id);
                    return Err(SimError::UnknownPartition {
                        node_id, partition: base.label
                    })
                }
                clilog::trace!("inst {} -> {}@{:#x} ({} levels)",
                               node_id, base.label, base.addr, hops);
                base
            },
            None => {
                num_fallback += 1;
                match gep.get(&node_id) {
                    Some(base) => base.clone(),
                    None => {
                        clilog::warn!("memory op {} has no address entry", node_id);
                        continue
                    }
                }
            }
        };
        graph.node_mut(v).set_array_label(base.label.clone());
        map.insert(node_id, base);
    }
    clilog::info!("resolved {} memory ops ({} from their own address entry)",
                  map.len(), num_fallback);
    Ok(map)
}
