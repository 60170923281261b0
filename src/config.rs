// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Accelerator memory and timing configuration.

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, SimError};

/// How array elements are spread over the banks of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionLayout {
    /// Contiguous element ranges go to successive banks.
    Block,
    /// Elements go to banks round-robin.
    Cyclic,
}

/// A banked scratchpad array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchpadPartition {
    pub layout: PartitionLayout,
    /// Total array size in bytes.
    pub size: u32,
    /// Number of banks.
    pub factor: u32,
    /// Element size in bytes.
    pub word_size: u32,
}

impl ScratchpadPartition {
    /// Capacity of one bank in bytes.
    pub fn bank_size(&self) -> u32 {
        self.size.div_ceil(self.factor)
    }

    pub fn num_elements(&self) -> u64 {
        (self.size / self.word_size) as u64
    }
}

/// How a named array is mapped to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind<'c> {
    /// Fully mapped to registers, size in bytes.
    Complete(u32),
    Scratchpad(&'c ScratchpadPartition),
}

fn default_cycle_time() -> f32 {
    6.0
}

fn default_ports_per_bank() -> u32 {
    1
}

/// The complete simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Clock period in ns.
    #[serde(default = "default_cycle_time")]
    pub cycle_time: f32,
    /// Requests one scratchpad bank serves per cycle.
    #[serde(default = "default_ports_per_bank")]
    pub ports_per_bank: u32,
    /// Where to persist the base address map, if anywhere.
    #[serde(default)]
    pub base_address_dump: Option<PathBuf>,
    /// Arrays converted to registers: name -> size in bytes.
    #[serde(default)]
    pub complete: IndexMap<CompactString, u32>,
    /// Banked arrays.
    #[serde(default)]
    pub scratchpad: IndexMap<CompactString, ScratchpadPartition>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            cycle_time: default_cycle_time(),
            ports_per_bank: default_ports_per_bank(),
            base_address_dump: None,
            complete: IndexMap::new(),
            scratchpad: IndexMap::new(),
        }
    }
}

impl SimConfig {
    pub fn from_toml_str(s: &str) -> Result<SimConfig> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<SimConfig> {
        let s = std::fs::read_to_string(path)?;
        SimConfig::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.cycle_time > 0.) {
            return Err(SimError::InvalidConfig(
                format!("cycle_time must be positive, got {}", self.cycle_time)))
        }
        if self.ports_per_bank == 0 {
            return Err(SimError::InvalidConfig(
                "ports_per_bank must be at least 1".into()))
        }
        for (name, part) in &self.scratchpad {
            if part.factor == 0 {
                return Err(SimError::InvalidConfig(
                    format!("partition {} has a zero partition factor", name)))
            }
            if part.word_size == 0 {
                return Err(SimError::InvalidConfig(
                    format!("partition {} has a zero word size", name)))
            }
            if self.complete.contains_key(name) {
                return Err(SimError::InvalidConfig(
                    format!("partition {} is both complete and banked", name)))
            }
        }
        Ok(())
    }

    /// Look up a partition name in both configurations.
    pub fn partition(&self, name: &str) -> Option<PartitionKind<'_>> {
        if let Some(part) = self.scratchpad.get(name) {
            return Some(PartitionKind::Scratchpad(part))
        }
        self.complete.get(name).map(|&size| PartitionKind::Complete(size))
    }

    #[inline]
    pub fn has_partition(&self, name: &str) -> bool {
        self.partition(name).is_some()
    }
}
