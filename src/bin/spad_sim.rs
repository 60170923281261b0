// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::io::{BufWriter, Write};
use itertools::Itertools;
use spadsim::config::SimConfig;
use spadsim::datapath::{Datapath, DatapathStats};
use spadsim::error::Result;
use spadsim::graph::{DepGraph, GraphDesc};
use spadsim::passes::{PassContext, PassPipeline};
use spadsim::scratchpad::Scratchpad;

#[derive(clap::Parser, Debug)]
struct SimulatorArgs {
    /// Partition and timing configuration (TOML).
    config: PathBuf,
    /// Dependence graph with its address calculation table (JSON).
    graph: PathBuf,
    /// Write the run statistics here as JSON.
    #[clap(long)]
    stats_out: Option<PathBuf>,
    /// Write the final base address map here.
    ///
    /// Overrides `base_address_dump` in the configuration.
    #[clap(long)]
    base_address_out: Option<PathBuf>,
    /// Override the clock period (ns) of the configuration.
    #[clap(long)]
    cycle_time: Option<f32>,
}

fn simulate(args: &SimulatorArgs) -> Result<DatapathStats> {
    let mut config = SimConfig::load(&args.config)?;
    if let Some(ct) = args.cycle_time {
        config.cycle_time = ct;
    }
    if let Some(path) = &args.base_address_out {
        config.base_address_dump = Some(path.clone());
    }
    config.validate()?;
    clilog::info!("config: {} ns clock, {} ports per bank, \
                   {} complete and {} banked arrays",
                  config.cycle_time, config.ports_per_bank,
                  config.complete.len(), config.scratchpad.len());

    let timer_load = clilog::stimer!("load graph");
    let desc = GraphDesc::load(&args.graph)?;
    let gep = desc.gep_table();
    let mut graph = DepGraph::from_desc(&desc)?;
    drop(desc);
    clilog::finish!(timer_load);
    clilog::info!("graph: {} nodes, {} edges, {} address entries",
                  graph.num_vertices(), graph.num_edges(), gep.len());

    let mut spad = Scratchpad::new(config.ports_per_bank);
    let pipeline = PassPipeline::scratchpad_default();
    let mut ctx = PassContext::new(&mut graph, &config, &gep, &mut spad);
    pipeline.run(&mut ctx)?;
    let base_addr = std::mem::take(&mut ctx.base_addr);
    drop(ctx);

    let mut datapath = Datapath::new(graph, base_addr, spad, config.cycle_time);
    let stats = datapath.run();

    if let Some(path) = &args.stats_out {
        let f = std::fs::File::create(path)?;
        let mut buf = BufWriter::new(f);
        serde_json::to_writer_pretty(&mut buf, &stats)?;
        buf.flush()?;
        clilog::info!("stats written to {}", path.display());
    }
    Ok(stats)
}

fn main() {
    clilog::init_stderr_color_debug();
    clilog::enable_timer("spad_sim");
    clilog::enable_timer("spadsim");
    clilog::set_max_print_count(clilog::Level::Warn, "SPAD_UNMAPPED", 10);
    let args = <SimulatorArgs as clap::Parser>::parse();
    clilog::info!("Simulator args:\n{:#?}", args);

    let stats = match simulate(&args) {
        Ok(stats) => stats,
        Err(e) => {
            clilog::error!("{}", e);
            std::process::exit(1);
        }
    };

    println!("cycles: {}", stats.cycles);
    println!("runtime: {:.2} ns", stats.runtime_ns());
    println!("executed nodes: {}/{}", stats.executed_nodes, stats.total_nodes);
    println!("peak memory ops per cycle: {}", stats.peak_memory_ops_per_cycle());
    println!("partitions: {}", stats.partitions.iter()
             .map(|(name, c)| format!("{}(ld {}, st {})", name, c.loads, c.stores))
             .format(", "));
}
