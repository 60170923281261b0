// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Functional unit timing characterization.
//!
//! Integer units were characterized at discrete target clock periods
//! of 1 to 6 ns. The critical path delay (in ns) of each operation
//! class is stored per period; any other period uses the 6 ns row.

use crate::opcode::Opcode;

/// Number of cycles a floating-point op occupies, at any period.
pub const FP_LATENCY_IN_CYCLES: u32 = 3;

/// The integer functional unit classes with characterized delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuClass {
    Mul = 0,
    Add,
    Shifter,
    Bit,
}

impl FuClass {
    /// Classify an op. Multipliers take precedence over adders,
    /// adders over shifters, shifters over bitwise logic.
    pub fn of(op: Opcode) -> Option<FuClass> {
        if op.is_int_mul_op() {
            Some(FuClass::Mul)
        }
        else if op.is_int_add_op() {
            Some(FuClass::Add)
        }
        else if op.is_shifter_op() {
            Some(FuClass::Shifter)
        }
        else if op.is_bit_op() {
            Some(FuClass::Bit)
        }
        else {
            None
        }
    }
}

/// Row used for any clock period outside 1..=6 ns.
pub const DEFAULT_BUCKET_NS: usize = 6;

/// Critical path delays in ns, indexed by `[period_ns - 1][FuClass]`.
///
/// Columns: mul, add, shifter, bit.
pub const LATENCY_TABLE: [[f32; 4]; 6] = [
    [0.98, 0.40, 0.31, 0.05],
    [1.92, 0.72, 0.48, 0.06],
    [2.81, 1.04, 0.62, 0.06],
    [3.58, 1.19, 0.71, 0.06],
    [3.93, 1.26, 0.78, 0.06],
    [4.02, 1.28, 0.80, 0.06],
];

/// The table row for a clock period. Fractional periods are
/// truncated towards zero first.
pub fn bucket_of(cycle_time: f32) -> usize {
    let ns = cycle_time as i64;
    if (1..=6).contains(&ns) {
        ns as usize
    }
    else {
        DEFAULT_BUCKET_NS
    }
}

/// Critical path delay of `op` at the given clock period, in the same
/// unit as `cycle_time`.
///
/// Only meaningful for non-memory ops; memory latency comes from the
/// memory model. Unclassified ops take no time.
pub fn fu_latency(op: Opcode, cycle_time: f32) -> f32 {
    if op == Opcode::Ret {
        return cycle_time
    }
    if op.is_fp_op() {
        return FP_LATENCY_IN_CYCLES as f32 * cycle_time
    }
    match FuClass::of(op) {
        Some(class) => LATENCY_TABLE[bucket_of(cycle_time) - 1][class as usize],
        None => 0.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets() {
        assert_eq!(bucket_of(1.0), 1);
        assert_eq!(bucket_of(4.7), 4);
        assert_eq!(bucket_of(6.0), 6);
        assert_eq!(bucket_of(0.5), DEFAULT_BUCKET_NS);
        assert_eq!(bucket_of(10.0), DEFAULT_BUCKET_NS);
        assert_eq!(bucket_of(-3.0), DEFAULT_BUCKET_NS);
    }

    #[test]
    fn ret_and_fp() {
        assert_eq!(fu_latency(Opcode::Ret, 5.0), 5.0);
        assert_eq!(fu_latency(Opcode::FMul, 2.0), 6.0);
        assert_eq!(fu_latency(Opcode::FAdd, 10.0), 30.0);
    }

    #[test]
    fn table_lookup_and_default_row() {
        assert_eq!(fu_latency(Opcode::Mul, 1.0), LATENCY_TABLE[0][0]);
        assert_eq!(fu_latency(Opcode::Sub, 3.0), LATENCY_TABLE[2][1]);
        assert_eq!(fu_latency(Opcode::AShr, 2.0), LATENCY_TABLE[1][2]);
        assert_eq!(fu_latency(Opcode::Xor, 5.0), LATENCY_TABLE[4][3]);
        assert_eq!(fu_latency(Opcode::Mul, 8.0), fu_latency(Opcode::Mul, 6.0));
    }

    #[test]
    fn unclassified_is_zero() {
        for op in [Opcode::GetElementPtr, Opcode::Call, Opcode::ICmp,
                   Opcode::IndexAdd, Opcode::BitCast] {
            assert_eq!(fu_latency(op, 6.0), 0.0, "{:?}", op);
        }
    }

    #[test]
    fn delays_fit_their_period() {
        for (i, row) in LATENCY_TABLE.iter().enumerate() {
            for &d in row {
                assert!(d < (i + 1) as f32);
            }
        }
    }
}
