// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! The global optimization pass pipeline.
//!
//! Passes run once, before scheduling, in stage order. Node removals
//! change the dependence topology the address resolver walks, and
//! partitioning rewrites the map the resolver builds, so a pipeline
//! refuses to take a pass from an earlier stage than the last one.

use std::fmt::Debug;
use crate::base_addr::{init_base_address, BaseAddressMap, GepTable};
use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::graph::DepGraph;
use crate::partition::{complete_partition, scratchpad_partition};
use crate::scratchpad::ScratchpadModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassStage {
    /// Induction dependence and phi node removal.
    NodeRemoval,
    AddressInit,
    Partitioning,
    /// Unrolling, disambiguation, load/store buffers, tree height
    /// reduction.
    Dependence,
    /// Must come last, after all dependences are fixed.
    Pipelining,
}

/// Everything a pass may read or transform.
pub struct PassContext<'a> {
    pub graph: &'a mut DepGraph,
    pub config: &'a SimConfig,
    pub gep: &'a GepTable,
    pub base_addr: BaseAddressMap,
    pub spad: &'a mut dyn ScratchpadModel,
}

impl<'a> PassContext<'a> {
    pub fn new(
        graph: &'a mut DepGraph,
        config: &'a SimConfig,
        gep: &'a GepTable,
        spad: &'a mut dyn ScratchpadModel,
    ) -> Self {
        PassContext { graph, config, gep, base_addr: BaseAddressMap::default(), spad }
    }

    fn dump_base_address(&self) -> Result<()> {
        if let Some(path) = &self.config.base_address_dump {
            self.base_addr.write_to(path)?;
        }
        Ok(())
    }
}

/// A transformation of the graph and maps, in place.
pub trait Pass: Debug {
    fn name(&self) -> &str;

    fn stage(&self) -> PassStage;

    fn run(&self, ctx: &mut PassContext<'_>) -> Result<()>;
}

/// Attribute every memory op to a configured partition.
#[derive(Debug)]
pub struct InitBaseAddress;

impl Pass for InitBaseAddress {
    fn name(&self) -> &str {
        "init base address"
    }

    fn stage(&self) -> PassStage {
        PassStage::AddressInit
    }

    fn run(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        ctx.base_addr = init_base_address(&mut *ctx.graph, ctx.gep, ctx.config)?;
        ctx.dump_base_address()
    }
}

/// Declare completely partitioned arrays as registers.
#[derive(Debug)]
pub struct CompletePartition;

impl Pass for CompletePartition {
    fn name(&self) -> &str {
        "complete partition"
    }

    fn stage(&self) -> PassStage {
        PassStage::Partitioning
    }

    fn run(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        complete_partition(ctx.config, &mut *ctx.spad);
        Ok(())
    }
}

/// Split banked arrays and move accesses to their banks.
#[derive(Debug)]
pub struct ScratchpadPartition;

impl Pass for ScratchpadPartition {
    fn name(&self) -> &str {
        "scratchpad partition"
    }

    fn stage(&self) -> PassStage {
        PassStage::Partitioning
    }

    fn run(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        let num_moved = scratchpad_partition(
            &*ctx.graph, &mut ctx.base_addr, ctx.config, &mut *ctx.spad);
        if num_moved > 0 {
            ctx.dump_base_address()?;
        }
        Ok(())
    }
}

/// An ordered list of passes.
#[derive(Debug, Default)]
pub struct PassPipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl PassPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address initialization followed by both partitioning passes.
    pub fn scratchpad_default() -> Self {
        let mut pipeline = PassPipeline::new();
        pipeline.passes.push(Box::new(InitBaseAddress));
        pipeline.passes.push(Box::new(CompletePartition));
        pipeline.passes.push(Box::new(ScratchpadPartition));
        pipeline
    }

    /// Append a pass. Its stage must not precede the last pass's.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) -> Result<&mut Self> {
        if let Some(last) = self.passes.last() {
            if pass.stage() < last.stage() {
                return Err(SimError::PassOrder {
                    pass: pass.name().to_string(),
                    stage: pass.stage(),
                    after: last.stage(),
                })
            }
        }
        self.passes.push(pass);
        Ok(self)
    }

    pub fn names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run all passes in order. Stops at the first error.
    pub fn run(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        let timer_passes = clilog::stimer!("global optimization passes");
        for pass in &self.passes {
            clilog::info!("running pass: {} ({:?})", pass.name(), pass.stage());
            pass.run(ctx)?;
        }
        clilog::finish!(timer_passes);
        Ok(())
    }
}
