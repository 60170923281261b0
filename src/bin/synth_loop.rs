// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Generates the dependence graph of a fully unrolled vector add
//! loop, `c[i] = a[j] + b[j]` with `j = i` or `j = idx[i]`.

use std::path::PathBuf;
use std::io::{BufWriter, Write};
use compact_str::CompactString;
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use spadsim::config::{PartitionLayout, ScratchpadPartition, SimConfig};
use spadsim::error::{Result, SimError};
use spadsim::graph::{GepEntry, GraphDesc, NodeDesc};
use spadsim::node::MemAccess;
use spadsim::opcode::Opcode;

#[derive(clap::Parser, Debug)]
struct SynthArgs {
    /// Output graph path (JSON).
    output: PathBuf,
    /// Number of loop iterations.
    #[clap(long)]
    trip_count: u32,
    /// Read `a` and `b` through a random index array.
    #[clap(long)]
    gather: bool,
    /// Seed of the gather indices.
    #[clap(long, default_value_t = 8026727)]
    seed: u64,
    /// Also write a matching configuration here (TOML).
    #[clap(long)]
    config_out: Option<PathBuf>,
    /// Partition factor of the arrays in the written configuration.
    #[clap(long, default_value_t = 4)]
    factor: u32,
    /// Use block instead of cyclic partitioning in the written
    /// configuration.
    #[clap(long)]
    block: bool,
}

const WORD: u32 = 4;

/// Byte offset of element `i`.
#[inline]
fn word_offset(i: u32) -> u64 {
    i as u64 * WORD as u64
}

struct LoopBuilder {
    desc: GraphDesc,
}

impl LoopBuilder {
    fn node(&mut self, opcode: Opcode, inst: &str, mem: Option<MemAccess>) -> u32 {
        let id = self.desc.nodes.len() as u32;
        self.desc.nodes.push(NodeDesc {
            id, opcode,
            method: "vadd".into(),
            basic_block: "for.body".into(),
            inst_id: inst.into(),
            invocation: 0,
            line: -1,
            mem,
            double_precision: false,
            dynamic_mem_op: false,
            inductive: false,
        });
        id
    }

    fn edge(&mut self, parent: u32, child: u32) {
        self.desc.edges.push((parent, child));
    }

    fn gep(&mut self, inst: &str, label: &str, base: u64) -> u32 {
        let id = self.node(Opcode::GetElementPtr, inst, None);
        self.desc.gep.push(GepEntry { node: id, label: label.into(), addr: base as i64 });
        id
    }

    fn access(&mut self, opcode: Opcode, inst: &str, addr: u64) -> u32 {
        let mem = MemAccess { vaddr: addr, paddr: 0, size: WORD * 8, value: 0 };
        self.node(opcode, inst, Some(mem))
    }
}

fn array_bases(n: u32) -> [u64; 4] {
    let stride = (word_offset(n) + 0xfff) & !0xfff;
    let stride = stride.max(0x1000);
    [0x10000, 0x10000 + stride, 0x10000 + 2 * stride, 0x10000 + 3 * stride]
}

fn build_loop(args: &SynthArgs) -> GraphDesc {
    let n = args.trip_count;
    let [base_a, base_b, base_c, base_idx] = array_bases(n);
    let mut rng = ChaCha20Rng::seed_from_u64(args.seed);
    let mut b = LoopBuilder { desc: GraphDesc::default() };

    let mut prev_iv = None;
    for i in 0..n {
        let iv = b.node(Opcode::Add, "indvars.iv.next", None);
        if let Some(p) = prev_iv {
            b.edge(p, iv);
        }
        prev_iv = Some(iv);

        let (j, offset_src) = match args.gather {
            true => {
                let gep_idx = b.gep("arrayidx.idx", "idx", base_idx);
                b.edge(iv, gep_idx);
                let ld_idx = b.access(Opcode::Load, "idx.load",
                                      base_idx + word_offset(i));
                b.edge(gep_idx, ld_idx);
                let shl = b.node(Opcode::Shl, "idxprom", None);
                b.edge(ld_idx, shl);
                (rng.gen_range(0..n), shl)
            },
            false => (i, iv),
        };

        let mut sum_inputs = Vec::with_capacity(2);
        for (label, base, inst) in [("a", base_a, "a"), ("b", base_b, "b")] {
            let gep = b.gep(&format!("arrayidx.{}", inst), label, base);
            b.edge(offset_src, gep);
            let ld = b.access(Opcode::Load, &format!("{}.load", inst),
                              base + word_offset(j));
            b.edge(gep, ld);
            sum_inputs.push(ld);
        }
        let fadd = b.node(Opcode::FAdd, "add", None);
        for ld in sum_inputs {
            b.edge(ld, fadd);
        }
        let gep_c = b.gep("arrayidx.c", "c", base_c);
        b.edge(iv, gep_c);
        let st = b.access(Opcode::Store, "c.store", base_c + word_offset(i));
        b.edge(gep_c, st);
        b.edge(fadd, st);
    }
    b.desc
}

fn build_config(args: &SynthArgs) -> Result<SimConfig> {
    let mut config = SimConfig::default();
    let layout = match args.block {
        true => PartitionLayout::Block,
        false => PartitionLayout::Cyclic,
    };
    let size = args.trip_count.checked_mul(WORD)
        .ok_or_else(|| SimError::InvalidConfig(format!(
            "{} elements of {} bytes do not fit a partition", args.trip_count, WORD)))?
        .max(WORD);
    for name in ["a", "b", "c"] {
        config.scratchpad.insert(CompactString::from(name), ScratchpadPartition {
            layout, size,
            factor: args.factor.max(1),
            word_size: WORD,
        });
    }
    if args.gather {
        config.complete.insert("idx".into(), size);
    }
    config.validate()?;
    Ok(config)
}

fn synthesize(args: &SynthArgs) -> Result<()> {
    let desc = build_loop(args);
    clilog::info!("generated {} nodes, {} edges", desc.nodes.len(), desc.edges.len());
    let f = std::fs::File::create(&args.output)?;
    let mut buf = BufWriter::new(f);
    serde_json::to_writer(&mut buf, &desc)?;
    buf.flush()?;

    if let Some(path) = &args.config_out {
        let config = build_config(args)?;
        let s = toml::to_string(&config)
            .map_err(|e| SimError::InvalidConfig(e.to_string()))?;
        std::fs::write(path, s)?;
        clilog::info!("configuration written to {}", path.display());
    }
    Ok(())
}

fn main() {
    clilog::init_stderr_color_debug();
    let args = <SynthArgs as clap::Parser>::parse();
    clilog::info!("Synth args:\n{:#?}", args);
    if let Err(e) = synthesize(&args) {
        clilog::error!("{}", e);
        std::process::exit(1);
    }
}
