// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Errors that abort a simulation run.

use compact_str::CompactString;
use crate::opcode::Opcode;
use crate::passes::PassStage;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A memory access resolved to a partition that no configuration
    /// declares.
    #[error("unknown partition `{partition}` @inst {node_id}")]
    UnknownPartition { node_id: u32, partition: CompactString },

    #[error("edge refers to unknown node {node_id}")]
    UnknownNode { node_id: u32 },

    #[error("node id {node_id} appears more than once")]
    DuplicateNode { node_id: u32 },

    #[error("memory op {opcode:?} @inst {node_id} has no memory access")]
    MissingMemAccess { node_id: u32, opcode: Opcode },

    #[error("non-memory op {opcode:?} @inst {node_id} cannot carry a memory access")]
    UnexpectedMemAccess { node_id: u32, opcode: Opcode },

    #[error("dependency graph has a cycle through node {node_id}")]
    CyclicGraph { node_id: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("pass `{pass}` ({stage:?}) cannot run after a {after:?} pass")]
    PassOrder { pass: String, stage: PassStage, after: PassStage },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Bare(#[from] serde_bare::error::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
