// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Scratchpad memory resource model.
//!
//! The scheduler only talks to memory through [`ScratchpadModel`]:
//! it asks whether a partition can take a request this cycle and then
//! reserves it in the same step.

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub trait ScratchpadModel {
    /// Register a fully mapped (register-like) region.
    fn declare_complete(&mut self, name: &str, size: u32);

    /// Register one bank of a partitioned array.
    fn declare_banked(&mut self, name: &str, per_bank_size: u32, word_size: u32);

    fn is_declared(&self, name: &str) -> bool;

    /// Start a new cycle, releasing all bandwidth.
    fn new_cycle(&mut self);

    /// Whether `name` has spare bandwidth this cycle.
    fn can_service(&mut self, name: &str) -> bool;

    /// Consume one unit of bandwidth of `name`.
    ///
    /// Fails unless the immediately preceding [`Self::can_service`]
    /// call was for the same name and succeeded.
    fn reserve(&mut self, name: &str) -> bool;

    fn record_load(&mut self, name: &str);

    fn record_store(&mut self, name: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    /// No addressing, no bandwidth limit.
    Complete,
    Banked,
}

/// Load/store counters of one partition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCounts {
    pub loads: u64,
    pub stores: u64,
}

#[derive(Debug, Clone)]
struct SpadPartition {
    kind: StorageKind,
    size: u32,
    word_size: u32,
    counts: AccessCounts,
    occupied: u32,
}

/// Banked scratchpad with a fixed number of ports per bank.
#[derive(Debug)]
pub struct Scratchpad {
    partitions: IndexMap<CompactString, SpadPartition>,
    ports_per_bank: u32,
    /// index of the partition granted by the last `can_service`.
    armed: Option<usize>,
}

impl Scratchpad {
    pub fn new(ports_per_bank: u32) -> Scratchpad {
        Scratchpad {
            partitions: IndexMap::new(),
            ports_per_bank: ports_per_bank.max(1),
            armed: None,
        }
    }

    #[inline]
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn kind_of(&self, name: &str) -> Option<StorageKind> {
        self.partitions.get(name).map(|p| p.kind)
    }

    /// `(size, word_size)` of a declared partition.
    pub fn geometry_of(&self, name: &str) -> Option<(u32, u32)> {
        self.partitions.get(name).map(|p| (p.size, p.word_size))
    }

    pub fn counts_of(&self, name: &str) -> Option<AccessCounts> {
        self.partitions.get(name).map(|p| p.counts)
    }

    /// Access counters of all partitions, in declaration order.
    pub fn access_counts(&self) -> IndexMap<CompactString, AccessCounts> {
        self.partitions.iter()
            .map(|(name, p)| (name.clone(), p.counts))
            .collect()
    }

    fn declare(&mut self, name: &str, kind: StorageKind, size: u32, word_size: u32) {
        let prev = self.partitions.insert(name.into(), SpadPartition {
            kind, size, word_size,
            counts: AccessCounts::default(),
            occupied: 0,
        });
        if prev.is_some() {
            clilog::warn!("scratchpad partition {} redeclared", name);
        }
        self.armed = None;
    }
}

impl ScratchpadModel for Scratchpad {
    fn declare_complete(&mut self, name: &str, size: u32) {
        clilog::debug!("complete partition {}: {} bytes", name, size);
        self.declare(name, StorageKind::Complete, size, 0);
    }

    fn declare_banked(&mut self, name: &str, per_bank_size: u32, word_size: u32) {
        clilog::debug!("scratchpad bank {}: {} bytes, word {} bytes",
                       name, per_bank_size, word_size);
        self.declare(name, StorageKind::Banked, per_bank_size, word_size);
    }

    fn is_declared(&self, name: &str) -> bool {
        self.partitions.contains_key(name)
    }

    fn new_cycle(&mut self) {
        for p in self.partitions.values_mut() {
            p.occupied = 0;
        }
        self.armed = None;
    }

    fn can_service(&mut self, name: &str) -> bool {
        self.armed = None;
        let Some((idx, _, p)) = self.partitions.get_full(name) else {
            return false
        };
        let ok = match p.kind {
            StorageKind::Complete => true,
            StorageKind::Banked => p.occupied < self.ports_per_bank,
        };
        if ok {
            self.armed = Some(idx);
        }
        ok
    }

    fn reserve(&mut self, name: &str) -> bool {
        let Some(armed) = self.armed.take() else {
            return false
        };
        let ports = self.ports_per_bank;
        match self.partitions.get_full_mut(name) {
            Some((idx, _, p)) if idx == armed => {
                if p.kind == StorageKind::Banked {
                    if p.occupied >= ports {
                        return false
                    }
                    p.occupied += 1;
                }
                true
            },
            _ => false
        }
    }

    fn record_load(&mut self, name: &str) {
        if let Some(p) = self.partitions.get_mut(name) {
            p.counts.loads += 1;
        }
    }

    fn record_store(&mut self, name: &str) {
        if let Some(p) = self.partitions.get_mut(name) {
            p.counts.stores += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_bandwidth_per_cycle() {
        let mut spad = Scratchpad::new(1);
        spad.declare_banked("a-0", 64, 4);
        assert!(spad.can_service("a-0"));
        assert!(spad.reserve("a-0"));
        assert!(!spad.can_service("a-0"));
        spad.new_cycle();
        assert!(spad.can_service("a-0"));
    }

    #[test]
    fn reserve_requires_grant() {
        let mut spad = Scratchpad::new(2);
        spad.declare_banked("a-0", 64, 4);
        spad.declare_banked("a-1", 64, 4);
        assert!(!spad.reserve("a-0"));
        assert!(spad.can_service("a-0"));
        assert!(!spad.reserve("a-1"));
        // the failed reserve consumed the grant
        assert!(!spad.reserve("a-0"));
        assert!(spad.can_service("a-0"));
        assert!(spad.reserve("a-0"));
        assert!(!spad.reserve("a-0"));
    }

    #[test]
    fn complete_is_unlimited() {
        let mut spad = Scratchpad::new(1);
        spad.declare_complete("idx", 16);
        for _ in 0..8 {
            assert!(spad.can_service("idx"));
            assert!(spad.reserve("idx"));
        }
        assert_eq!(spad.kind_of("idx"), Some(StorageKind::Complete));
        assert!(!spad.can_service("missing"));
        assert!(!spad.is_declared("missing"));
    }

    #[test]
    fn counters() {
        let mut spad = Scratchpad::new(1);
        spad.declare_banked("b-1", 32, 8);
        spad.record_load("b-1");
        spad.record_load("b-1");
        spad.record_store("b-1");
        spad.record_store("nope");
        assert_eq!(spad.counts_of("b-1"), Some(AccessCounts { loads: 2, stores: 1 }));
        assert_eq!(spad.geometry_of("b-1"), Some((32, 8)));
        assert_eq!(spad.access_counts().len(), 1);
    }
}
