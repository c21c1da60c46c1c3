//! VISA instruction set and 64-bit encoding
//!
//! Every instruction is 64 bits: a 10-bit opcode at the top, with one of
//! three payload forms packed below it.
//!
//! | Bits 63-54 | 53-48 | 47-42 | 41-36  | 35-0   | form             |
//! |------------|-------|-------|--------|--------|------------------|
//! | opcode     | r0    | r1    | r2     | unused | three-register   |
//! | opcode     | r0    | r1    | 32-bit immediate (31-0) | register+immediate |
//! | opcode     | 54-bit immediate (53-0)         || single immediate |

use serde::{Deserialize, Serialize};
use std::fmt;

/// The first three bytes of every output image.
pub const MAGIC: [u8; 3] = [0x7E, b'N', b'J'];

/// Start of the text segment in the address space.
pub const PC_START: u64 = 0x8000_0000;
/// Load address of the data segment.
pub const DATA_START: u64 = 0x8C00_0000;

/// Register roles are fixed by convention.
pub const REG_ZERO: u8 = 0;
/// Scratch / syscall argument registers occupy 1..=9.
pub const REG_SCRATCH: u8 = 1;
pub const REG_RETURN_VALUE: u8 = 10;
pub const PARAM_START: u8 = 13;
/// At most 7 parameter registers, 13..=19.
pub const MAX_PARAMS: usize = 7;
pub const TEMP_START: u8 = 20;
/// First register past the caller-allocated temporaries.
pub const TEMP_END: u8 = 61;
pub const REG_SP: u8 = 61;
pub const REG_FP: u8 = 62;
pub const REG_RA: u8 = 63;

/// Syscall numbers
pub const SYSCALL_PRINT_I32: u32 = 1;
pub const SYSCALL_PRINT_STR: u32 = 4;
pub const SYSCALL_EXIT: u32 = 5;
pub const SYSCALL_PRINT_I64: u32 = 5;

/// VISA opcodes, grouped by hundreds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Opcode {
    Syscall = 0,
    Add = 1,
    Sub = 2,
    Or = 3,
    Ori = 4,
    Sl = 5,
    Sr = 6,
    Lui = 7,
    Sli = 8,
    Sri = 9,
    Slt = 10,
    Slti = 11,
    Addi = 12,
    Mul = 13,
    Jmp = 100,
    Jal = 101,
    Jeq = 102,
    Jne = 103,
    Jr = 104,
    Lw = 200,
    Sw = 201,
    Ldw = 202,
    Sdw = 203,
    Lqw = 204,
    Sqw = 205,
    Lb = 206,
    Sb = 207,
}

/// Payload form of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    ThreeReg,
    RegImm,
    SingleImm,
}

impl Opcode {
    pub fn from_raw(raw: u16) -> Option<Self> {
        use Opcode::*;
        Some(match raw {
            0 => Syscall,
            1 => Add,
            2 => Sub,
            3 => Or,
            4 => Ori,
            5 => Sl,
            6 => Sr,
            7 => Lui,
            8 => Sli,
            9 => Sri,
            10 => Slt,
            11 => Slti,
            12 => Addi,
            13 => Mul,
            100 => Jmp,
            101 => Jal,
            102 => Jeq,
            103 => Jne,
            104 => Jr,
            200 => Lw,
            201 => Sw,
            202 => Ldw,
            203 => Sdw,
            204 => Lqw,
            205 => Sqw,
            206 => Lb,
            207 => Sb,
            _ => return None,
        })
    }

    pub fn format(self) -> Format {
        use Opcode::*;
        match self {
            Add | Sub | Or | Sl | Sr | Slt | Mul | Jr => Format::ThreeReg,
            Syscall | Ori | Lui | Sli | Sri | Slti | Addi | Jeq | Jne | Lw | Sw | Ldw | Sdw
            | Lqw | Sqw | Lb | Sb => Format::RegImm,
            Jmp | Jal => Format::SingleImm,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Syscall => "syscall",
            Add => "add",
            Sub => "sub",
            Or => "or",
            Ori => "ori",
            Sl => "sl",
            Sr => "sr",
            Lui => "lui",
            Sli => "sli",
            Sri => "sri",
            Slt => "slt",
            Slti => "slti",
            Addi => "addi",
            Mul => "mul",
            Jmp => "jmp",
            Jal => "jal",
            Jeq => "jeq",
            Jne => "jne",
            Jr => "jr",
            Lw => "lw",
            Sw => "sw",
            Ldw => "ldw",
            Sdw => "sdw",
            Lqw => "lqw",
            Sqw => "sqw",
            Lb => "lb",
            Sb => "sb",
        }
    }
}

/// Instruction payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpData {
    /// Three 6-bit register indices.
    Registers([u8; 3]),
    /// Two 6-bit register indices plus a 32-bit immediate.
    RegImm { registers: [u8; 2], immediate: u32 },
    /// A single 54-bit immediate (unconditional jump targets).
    Immediate(u64),
}

/// A single VISA operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub code: Opcode,
    pub data: OpData,
}

const REG_MASK: u64 = 0x3F;
const IMM54_MASK: u64 = (1 << 54) - 1;

impl Operation {
    pub fn three_reg(code: Opcode, r0: u8, r1: u8, r2: u8) -> Self {
        Self { code, data: OpData::Registers([r0, r1, r2]) }
    }

    pub fn reg_imm(code: Opcode, r0: u8, r1: u8, immediate: u32) -> Self {
        Self { code, data: OpData::RegImm { registers: [r0, r1], immediate } }
    }

    pub fn single_imm(code: Opcode, immediate: u64) -> Self {
        Self { code, data: OpData::Immediate(immediate & IMM54_MASK) }
    }

    /// The semantic 64-bit form: opcode in the top 10 bits, payload below.
    pub fn encode(&self) -> u64 {
        let mut raw = (self.code as u64) << 54;
        match self.data {
            OpData::Registers([r0, r1, r2]) => {
                raw |= (u64::from(r0) & REG_MASK) << 48;
                raw |= (u64::from(r1) & REG_MASK) << 42;
                raw |= (u64::from(r2) & REG_MASK) << 36;
            }
            OpData::RegImm { registers: [r0, r1], immediate } => {
                raw |= (u64::from(r0) & REG_MASK) << 48;
                raw |= (u64::from(r1) & REG_MASK) << 42;
                raw |= u64::from(immediate);
            }
            OpData::Immediate(imm) => {
                raw |= imm & IMM54_MASK;
            }
        }
        raw
    }

    /// Inverse of [`encode`](Self::encode); `None` for an unknown opcode.
    pub fn decode(raw: u64) -> Option<Self> {
        let code = Opcode::from_raw((raw >> 54) as u16)?;
        let data = match code.format() {
            Format::ThreeReg => OpData::Registers([
                ((raw >> 48) & REG_MASK) as u8,
                ((raw >> 42) & REG_MASK) as u8,
                ((raw >> 36) & REG_MASK) as u8,
            ]),
            Format::RegImm => OpData::RegImm {
                registers: [((raw >> 48) & REG_MASK) as u8, ((raw >> 42) & REG_MASK) as u8],
                immediate: raw as u32,
            },
            Format::SingleImm => OpData::Immediate(raw & IMM54_MASK),
        };
        Some(Self { code, data })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data {
            OpData::Registers([r0, r1, r2]) => {
                write!(f, "{} r{}, r{}, r{}", self.code.mnemonic(), r0, r1, r2)
            }
            OpData::RegImm { registers: [r0, r1], immediate } => {
                write!(f, "{} r{}, r{}, {}", self.code.mnemonic(), r0, r1, immediate as i32)
            }
            OpData::Immediate(imm) => write!(f, "{} {:#x}", self.code.mnemonic(), imm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn three_register_packing() {
        let op = Operation::three_reg(Opcode::Add, 20, 13, 14);
        let raw = op.encode();
        assert_eq!(raw >> 54, 1);
        assert_eq!((raw >> 48) & 0x3F, 20);
        assert_eq!((raw >> 42) & 0x3F, 13);
        assert_eq!((raw >> 36) & 0x3F, 14);
        assert_eq!(Operation::decode(raw), Some(op));
    }

    #[test]
    fn reg_imm_packing_keeps_low_32_bits() {
        let op = Operation::reg_imm(Opcode::Ori, 13, 0, 0xDEAD_BEEF);
        let raw = op.encode();
        assert_eq!(raw as u32, 0xDEAD_BEEF);
        assert_eq!(Operation::decode(raw), Some(op));
    }

    #[test]
    fn single_imm_truncates_to_54_bits() {
        let op = Operation::single_imm(Opcode::Jmp, PC_START >> 3);
        assert_eq!(Operation::decode(op.encode()), Some(op));
    }

    #[test]
    fn unknown_opcode_decodes_to_none() {
        assert_eq!(Operation::decode(u64::MAX), None);
    }
}
