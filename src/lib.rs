// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Cycle-level performance model of an accelerator datapath backed
//! by a banked scratchpad.

pub mod error;

pub mod opcode;

pub mod latency;

pub mod node;

pub mod graph;

pub mod config;

pub mod scratchpad;

pub mod base_addr;

pub mod partition;

pub mod passes;

pub mod datapath;
