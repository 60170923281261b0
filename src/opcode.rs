// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! The micro-op set of the traced intermediate representation.
//!
//! Every dynamic instruction carries exactly one [`Opcode`]. The
//! classification predicates here are pure functions of the opcode
//! and are the only place the accelerator model decides what kind of
//! hardware an instruction maps to.

use serde::{Deserialize, Serialize};

/// A low-level IR micro-op.
///
/// The discriminants are the codes used in dynamic traces and must
/// stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Move = 0,
    Ret,
    Br,
    Switch,
    IndirectBr,
    Invoke,
    Resume,
    Unreachable,
    Add,
    FAdd,
    Sub,
    FSub,
    Mul,
    FMul,
    UDiv,
    SDiv,
    FDiv,
    URem,
    SRem,
    FRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    Alloca,
    Load,
    Store,
    GetElementPtr,
    Fence,
    AtomicCmpXchg,
    AtomicRMW,
    Trunc,
    ZExt,
    SExt,
    FPToUI,
    FPToSI,
    UIToFP,
    SIToFP,
    FPTrunc,
    FPExt,
    PtrToInt,
    IntToPtr,
    BitCast,
    AddrSpaceCast,
    ICmp,
    FCmp,
    PHI,
    Call,
    Select,
    VAArg,
    ExtractElement,
    InsertElement,
    ShuffleVector,
    ExtractValue,
    InsertValue,
    LandingPad,
    IndexAdd,
    SilentStore,
    Sine,
    Cosine,
    DMAFence,
    DMAStore,
    DMALoad,
}

impl Opcode {
    /// All opcodes in code order.
    pub const ALL: [Opcode; 65] = {
        use Opcode::*;
        [
            Move, Ret, Br, Switch, IndirectBr, Invoke, Resume, Unreachable,
            Add, FAdd, Sub, FSub, Mul, FMul, UDiv, SDiv, FDiv, URem, SRem,
            FRem, Shl, LShr, AShr, And, Or, Xor, Alloca, Load, Store,
            GetElementPtr, Fence, AtomicCmpXchg, AtomicRMW, Trunc, ZExt,
            SExt, FPToUI, FPToSI, UIToFP, SIToFP, FPTrunc, FPExt, PtrToInt,
            IntToPtr, BitCast, AddrSpaceCast, ICmp, FCmp, PHI, Call, Select,
            VAArg, ExtractElement, InsertElement, ShuffleVector,
            ExtractValue, InsertValue, LandingPad, IndexAdd, SilentStore,
            Sine, Cosine, DMAFence, DMAStore, DMALoad,
        ]
    };

    /// Decode a trace micro-op code.
    pub fn from_code(code: u8) -> Option<Opcode> {
        Self::ALL.get(code as usize).copied()
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn is_memory_op(self) -> bool {
        matches!(self, Opcode::Load | Opcode::Store)
    }

    #[inline]
    pub fn is_load_op(self) -> bool {
        self == Opcode::Load
    }

    #[inline]
    pub fn is_store_op(self) -> bool {
        self == Opcode::Store
    }

    /// Operations that occupy an arithmetic functional unit.
    pub fn is_compute_op(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Add | FAdd | Sub | FSub | Mul | FMul | UDiv | SDiv | FDiv |
            URem | SRem | FRem | Shl | LShr | AShr | And | Or | Xor |
            IndexAdd
        )
    }

    pub fn is_shifter_op(self) -> bool {
        matches!(self, Opcode::Shl | Opcode::LShr | Opcode::AShr)
    }

    pub fn is_bit_op(self) -> bool {
        matches!(self, Opcode::And | Opcode::Or | Opcode::Xor)
    }

    /// PHI nodes and everything that is a branch.
    pub fn is_control_op(self) -> bool {
        self == Opcode::PHI || self.is_branch_op()
    }

    /// Branches, switches and everything that is a call.
    pub fn is_branch_op(self) -> bool {
        matches!(self, Opcode::Br | Opcode::Switch) || self.is_call_op()
    }

    /// Calls, including DMA transfers.
    pub fn is_call_op(self) -> bool {
        self == Opcode::Call || self.is_dma_op()
    }

    #[inline]
    pub fn is_index_op(self) -> bool {
        self == Opcode::IndexAdd
    }

    pub fn is_convert_op(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Trunc | ZExt | SExt | FPToUI | FPToSI | UIToFP | SIToFP |
            FPTrunc | FPExt | PtrToInt | IntToPtr | BitCast | AddrSpaceCast
        )
    }

    #[inline]
    pub fn is_dma_load(self) -> bool {
        self == Opcode::DMALoad
    }

    #[inline]
    pub fn is_dma_store(self) -> bool {
        self == Opcode::DMAStore
    }

    #[inline]
    pub fn is_dma_op(self) -> bool {
        self.is_dma_load() || self.is_dma_store()
    }

    pub fn is_int_mul_op(self) -> bool {
        use Opcode::*;
        matches!(self, Mul | UDiv | SDiv | URem | SRem)
    }

    pub fn is_int_add_op(self) -> bool {
        matches!(self, Opcode::Add | Opcode::Sub)
    }

    pub fn is_fp_op(self) -> bool {
        use Opcode::*;
        matches!(self, FAdd | FSub | FMul | FDiv | FRem)
    }

    pub fn is_fp_mul_op(self) -> bool {
        matches!(self, Opcode::FMul | Opcode::FDiv | Opcode::FRem)
    }

    pub fn is_fp_add_op(self) -> bool {
        matches!(self, Opcode::FAdd | Opcode::FSub)
    }

    /// Whether a chain of this op may be rebalanced into a tree.
    pub fn is_associative(self) -> bool {
        self.is_int_add_op() || self.is_fp_add_op()
    }

    /// Whether this op produces an address the base-address resolver
    /// can follow upward.
    #[inline]
    pub fn is_address_source(self) -> bool {
        matches!(self, Opcode::GetElementPtr | Opcode::Load)
    }
}
