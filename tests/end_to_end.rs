// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
use spadsim::base_addr::BaseAddressMap;
use spadsim::config::SimConfig;
use spadsim::datapath::{Datapath, DatapathStats};
use spadsim::error::SimError;
use spadsim::graph::{DepGraph, GraphDesc};
use spadsim::passes::{PassContext, PassPipeline};
use spadsim::scratchpad::{AccessCounts, Scratchpad, StorageKind};
use tempdir::TempDir;

/// `c[0] = a[0] + a[2]`, with `a` and `c` at 0x100 and 0x200.
const VADD_JSON: &str = r#"{
    "nodes": [
        {"id": 0, "opcode": "GetElementPtr"},
        {"id": 1, "opcode": "Load", "mem": {"vaddr": 256, "size": 32}},
        {"id": 2, "opcode": "GetElementPtr"},
        {"id": 3, "opcode": "Load", "mem": {"vaddr": 264, "size": 32}},
        {"id": 4, "opcode": "FAdd"},
        {"id": 5, "opcode": "GetElementPtr"},
        {"id": 6, "opcode": "Store", "mem": {"vaddr": 512, "size": 32, "value": 7}},
        {"id": 7, "opcode": "Ret"}
    ],
    "edges": [[0, 1], [2, 3], [1, 4], [3, 4], [5, 6], [4, 6]],
    "gep": [
        {"node": 0, "label": "a", "addr": 256},
        {"node": 2, "label": "a", "addr": 256},
        {"node": 5, "label": "c", "addr": 512}
    ]
}"#;

const VADD_TOML: &str = r#"
    cycle_time = 6.0

    [complete]
    c = 16

    [scratchpad.a]
    layout = "cyclic"
    size = 16
    factor = 2
    word_size = 4
"#;

fn prepare(
    desc: &GraphDesc, config: &SimConfig
) -> spadsim::error::Result<(DepGraph, BaseAddressMap, Scratchpad)> {
    let gep = desc.gep_table();
    let mut graph = DepGraph::from_desc(desc)?;
    let mut spad = Scratchpad::new(config.ports_per_bank);
    let mut ctx = PassContext::new(&mut graph, config, &gep, &mut spad);
    PassPipeline::scratchpad_default().run(&mut ctx)?;
    let base_addr = std::mem::take(&mut ctx.base_addr);
    drop(ctx);
    Ok((graph, base_addr, spad))
}

fn simulate(desc: &GraphDesc, config: &SimConfig) -> (DatapathStats, Datapath<Scratchpad>) {
    let (graph, base_addr, spad) = prepare(desc, config).unwrap();
    let mut dp = Datapath::new(graph, base_addr, spad, config.cycle_time);
    let stats = dp.run();
    (stats, dp)
}

#[test]
fn cyclic_factor_two_alternates_banks() {
    let desc: GraphDesc = serde_json::from_str(r#"{
        "nodes": [
            {"id": 0, "opcode": "GetElementPtr"},
            {"id": 1, "opcode": "Store", "mem": {"vaddr": 4096, "size": 32}},
            {"id": 2, "opcode": "Store", "mem": {"vaddr": 4100, "size": 32}},
            {"id": 3, "opcode": "Store", "mem": {"vaddr": 4104, "size": 32}}
        ],
        "edges": [[0, 1], [0, 2], [0, 3]],
        "gep": [{"node": 0, "label": "a", "addr": 4096}]
    }"#).unwrap();
    let config = SimConfig::from_toml_str(VADD_TOML).unwrap();
    let (_, base_addr, spad) = prepare(&desc, &config).unwrap();
    assert_eq!(base_addr.label_of(1), Some("a-0"));
    assert_eq!(base_addr.label_of(2), Some("a-1"));
    assert_eq!(base_addr.label_of(3), Some("a-0"));
    assert_eq!(spad.kind_of("a-1"), Some(StorageKind::Banked));
    assert_eq!(spad.kind_of("a-2"), None);
}

#[test]
fn unknown_partition_is_fatal() {
    let mut desc: GraphDesc = serde_json::from_str(VADD_JSON).unwrap();
    desc.gep[2].label = "d".into();
    let config = SimConfig::from_toml_str(VADD_TOML).unwrap();
    match prepare(&desc, &config) {
        Err(SimError::UnknownPartition { node_id, partition }) => {
            assert_eq!(node_id, 6);
            assert_eq!(partition, "d");
        },
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("resolved an unknown partition"),
    }
}

#[test]
fn bank_conflict_delays_the_loop_body() {
    let desc: GraphDesc = serde_json::from_str(VADD_JSON).unwrap();
    let config = SimConfig::from_toml_str(VADD_TOML).unwrap();
    let (stats, dp) = simulate(&desc, &config);
    // a[0] and a[2] share bank a-0 and load in cycles 1 and 2, the
    // fadd takes three cycles and the store retires one cycle later
    assert_eq!(stats.cycles, 7);
    assert_eq!(stats.executed_nodes, 7);
    assert_eq!(stats.total_nodes, 7);
    let vertex = |id| dp.graph().vertex_of(id).unwrap();
    assert_eq!(dp.completion_cycle(vertex(1)), Some(1));
    assert_eq!(dp.completion_cycle(vertex(3)), Some(2));
    assert_eq!(dp.completion_cycle(vertex(4)), Some(5));
    assert_eq!(dp.completion_cycle(vertex(6)), Some(6));
    assert_eq!(dp.completion_cycle(vertex(7)), None);
    assert_eq!(stats.partitions["a-0"], AccessCounts { loads: 2, stores: 0 });
    assert_eq!(stats.partitions["c"], AccessCounts { loads: 0, stores: 1 });
    assert_eq!(dp.scratchpad().counts_of("a-1"), Some(AccessCounts::default()));

    let mut config = config;
    config.ports_per_bank = 2;
    let (stats, _) = simulate(&desc, &config);
    assert_eq!(stats.cycles, 6);
}

#[test]
fn files_in_and_out() {
    let dir = TempDir::new("spadsim").unwrap();
    let graph_path = dir.path().join("vadd.json");
    let config_path = dir.path().join("vadd.toml");
    let dump_path = dir.path().join("base_address.bare");
    std::fs::write(&graph_path, VADD_JSON).unwrap();
    std::fs::write(&config_path, format!(
        "base_address_dump = {:?}\n{}", dump_path.to_str().unwrap(), VADD_TOML
    )).unwrap();

    let desc = GraphDesc::load(&graph_path).unwrap();
    let config = SimConfig::load(&config_path).unwrap();
    assert_eq!(config.base_address_dump.as_deref(), Some(dump_path.as_path()));
    let (_, base_addr, _) = prepare(&desc, &config).unwrap();

    let dumped = BaseAddressMap::read_from(&dump_path).unwrap();
    assert_eq!(dumped, base_addr);
    assert_eq!(dumped.label_of(1), Some("a-0"));
    assert_eq!(dumped.label_of(3), Some("a-0"));
    assert_eq!(dumped.label_of(6), Some("c"));
    assert_eq!(dumped.get(6).unwrap().addr, 512);
}

#[test]
fn ancestor_without_address_entry_is_unknown() {
    let mut desc: GraphDesc = serde_json::from_str(VADD_JSON).unwrap();
    desc.gep.retain(|e| e.node != 2);
    let config = SimConfig::from_toml_str(VADD_TOML).unwrap();
    match prepare(&desc, &config) {
        Err(SimError::UnknownPartition { node_id, partition }) => {
            assert_eq!(node_id, 3);
            assert!(partition.is_empty());
        },
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("resolved a load without an address entry"),
    }
}
