//! # EVM Opcodes
//!
//! Opcode constants and the per-rule-set dispatch table.
//!
//! The [`OpcodeTable`] is resolved once when the VM is constructed: for
//! every byte it holds either nothing (undefined, traps as `INVALID`) or an
//! [`OpcodeInfo`] descriptor with the mnemonic, static fee, whether the
//! handler reaches the state backend, whether a dynamic fee applies, and an
//! optional custom handler. Nothing is looked up by hardfork during a step.

use crate::config::{Hardfork, RuleSet};
use crate::errors::VmError;
use crate::evm::memory::Memory;
use crate::evm::stack::Stack;
use std::fmt;
use std::sync::Arc;

/// One-byte instruction code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Opcode(pub u8);

#[allow(missing_docs)]
impl Opcode {
    pub const STOP: Opcode = Opcode(0x00);
    pub const ADD: Opcode = Opcode(0x01);
    pub const MUL: Opcode = Opcode(0x02);
    pub const SUB: Opcode = Opcode(0x03);
    pub const DIV: Opcode = Opcode(0x04);
    pub const SDIV: Opcode = Opcode(0x05);
    pub const MOD: Opcode = Opcode(0x06);
    pub const SMOD: Opcode = Opcode(0x07);
    pub const ADDMOD: Opcode = Opcode(0x08);
    pub const MULMOD: Opcode = Opcode(0x09);
    pub const EXP: Opcode = Opcode(0x0a);
    pub const SIGNEXTEND: Opcode = Opcode(0x0b);

    pub const LT: Opcode = Opcode(0x10);
    pub const GT: Opcode = Opcode(0x11);
    pub const SLT: Opcode = Opcode(0x12);
    pub const SGT: Opcode = Opcode(0x13);
    pub const EQ: Opcode = Opcode(0x14);
    pub const ISZERO: Opcode = Opcode(0x15);
    pub const AND: Opcode = Opcode(0x16);
    pub const OR: Opcode = Opcode(0x17);
    pub const XOR: Opcode = Opcode(0x18);
    pub const NOT: Opcode = Opcode(0x19);
    pub const BYTE: Opcode = Opcode(0x1a);
    pub const SHL: Opcode = Opcode(0x1b);
    pub const SHR: Opcode = Opcode(0x1c);
    pub const SAR: Opcode = Opcode(0x1d);

    pub const KECCAK256: Opcode = Opcode(0x20);

    pub const ADDRESS: Opcode = Opcode(0x30);
    pub const BALANCE: Opcode = Opcode(0x31);
    pub const ORIGIN: Opcode = Opcode(0x32);
    pub const CALLER: Opcode = Opcode(0x33);
    pub const CALLVALUE: Opcode = Opcode(0x34);
    pub const CALLDATALOAD: Opcode = Opcode(0x35);
    pub const CALLDATASIZE: Opcode = Opcode(0x36);
    pub const CALLDATACOPY: Opcode = Opcode(0x37);
    pub const CODESIZE: Opcode = Opcode(0x38);
    pub const CODECOPY: Opcode = Opcode(0x39);
    pub const GASPRICE: Opcode = Opcode(0x3a);
    pub const EXTCODESIZE: Opcode = Opcode(0x3b);
    pub const EXTCODECOPY: Opcode = Opcode(0x3c);
    pub const RETURNDATASIZE: Opcode = Opcode(0x3d);
    pub const RETURNDATACOPY: Opcode = Opcode(0x3e);
    pub const EXTCODEHASH: Opcode = Opcode(0x3f);

    pub const BLOCKHASH: Opcode = Opcode(0x40);
    pub const COINBASE: Opcode = Opcode(0x41);
    pub const TIMESTAMP: Opcode = Opcode(0x42);
    pub const NUMBER: Opcode = Opcode(0x43);
    /// DIFFICULTY before EIP-4399.
    pub const PREVRANDAO: Opcode = Opcode(0x44);
    pub const GASLIMIT: Opcode = Opcode(0x45);
    pub const CHAINID: Opcode = Opcode(0x46);
    pub const SELFBALANCE: Opcode = Opcode(0x47);
    pub const BASEFEE: Opcode = Opcode(0x48);

    pub const POP: Opcode = Opcode(0x50);
    pub const MLOAD: Opcode = Opcode(0x51);
    pub const MSTORE: Opcode = Opcode(0x52);
    pub const MSTORE8: Opcode = Opcode(0x53);
    pub const SLOAD: Opcode = Opcode(0x54);
    pub const SSTORE: Opcode = Opcode(0x55);
    pub const JUMP: Opcode = Opcode(0x56);
    pub const JUMPI: Opcode = Opcode(0x57);
    pub const PC: Opcode = Opcode(0x58);
    pub const MSIZE: Opcode = Opcode(0x59);
    pub const GAS: Opcode = Opcode(0x5a);
    pub const JUMPDEST: Opcode = Opcode(0x5b);
    /// EIP-2315; shares its byte with TLOAD.
    pub const BEGINSUB: Opcode = Opcode(0x5c);
    /// EIP-2315; shares its byte with TSTORE.
    pub const RETURNSUB: Opcode = Opcode(0x5d);
    /// EIP-2315; shares its byte with MCOPY.
    pub const JUMPSUB: Opcode = Opcode(0x5e);
    pub const TLOAD: Opcode = Opcode(0x5c);
    pub const TSTORE: Opcode = Opcode(0x5d);
    pub const MCOPY: Opcode = Opcode(0x5e);
    pub const PUSH0: Opcode = Opcode(0x5f);

    pub const PUSH1: Opcode = Opcode(0x60);
    pub const PUSH32: Opcode = Opcode(0x7f);
    pub const DUP1: Opcode = Opcode(0x80);
    pub const DUP16: Opcode = Opcode(0x8f);
    pub const SWAP1: Opcode = Opcode(0x90);
    pub const SWAP16: Opcode = Opcode(0x9f);
    pub const LOG0: Opcode = Opcode(0xa0);
    pub const LOG4: Opcode = Opcode(0xa4);

    pub const CREATE: Opcode = Opcode(0xf0);
    pub const CALL: Opcode = Opcode(0xf1);
    pub const CALLCODE: Opcode = Opcode(0xf2);
    pub const RETURN: Opcode = Opcode(0xf3);
    pub const DELEGATECALL: Opcode = Opcode(0xf4);
    pub const CREATE2: Opcode = Opcode(0xf5);
    pub const STATICCALL: Opcode = Opcode(0xfa);
    pub const REVERT: Opcode = Opcode(0xfd);
    pub const INVALID: Opcode = Opcode(0xfe);
    pub const SELFDESTRUCT: Opcode = Opcode(0xff);
}

impl Opcode {
    /// Number of immediate bytes for PUSH1..PUSH32.
    #[must_use]
    pub const fn push_size(self) -> Option<usize> {
        if self.0 >= 0x60 && self.0 <= 0x7f {
            Some((self.0 - 0x5f) as usize)
        } else {
            None
        }
    }

    /// Returns true for JUMP, JUMPI and JUMPSUB, the opcodes that need jump analysis.
    #[must_use]
    pub const fn needs_jump_analysis(self) -> bool {
        matches!(self.0, 0x56 | 0x57 | 0x5e)
    }

    /// Convert opcode to u8.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

// =============================================================================
// CUSTOM OPCODES
// =============================================================================

/// Machine state a custom opcode handler may touch.
pub struct CustomStep<'a> {
    /// Operand stack.
    pub stack: &'a mut Stack,
    /// Frame memory. Handlers must `extend` before writing.
    pub memory: &'a mut Memory,
    /// Program counter of the byte after the opcode.
    pub pc: usize,
    /// Gas left after the static fee was charged.
    pub gas_left: u64,
}

/// Handler of an embedder-defined opcode.
pub type CustomHandler = Arc<dyn Fn(&mut CustomStep<'_>) -> Result<(), VmError> + Send + Sync>;

/// An entry of the extension table given at VM construction.
#[derive(Clone)]
pub enum CustomOpcode {
    /// Defines (or redefines) an opcode.
    Add {
        /// Opcode byte.
        opcode: u8,
        /// Mnemonic.
        name: &'static str,
        /// Static fee.
        fee: u64,
        /// Handler.
        handler: CustomHandler,
    },
    /// Undefines an opcode; it then traps as `INVALID`.
    Remove {
        /// Opcode byte.
        opcode: u8,
    },
}

impl fmt::Debug for CustomOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add {
                opcode, name, fee, ..
            } => f
                .debug_struct("Add")
                .field("opcode", opcode)
                .field("name", name)
                .field("fee", fee)
                .finish_non_exhaustive(),
            Self::Remove { opcode } => f.debug_struct("Remove").field("opcode", opcode).finish(),
        }
    }
}

// =============================================================================
// DISPATCH TABLE
// =============================================================================

/// Descriptor of one defined opcode.
#[derive(Clone)]
pub struct OpcodeInfo {
    /// Opcode byte.
    pub opcode: Opcode,
    /// Mnemonic.
    pub name: &'static str,
    /// Static fee charged before any dynamic fee.
    pub fee: u64,
    /// True if the handler awaits the state backend.
    pub is_async: bool,
    /// True if a dynamic fee is computed on top of `fee`.
    pub dynamic_gas: bool,
    /// Embedder handler replacing the built-in one.
    pub custom: Option<CustomHandler>,
}

impl fmt::Debug for OpcodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcodeInfo")
            .field("opcode", &self.opcode)
            .field("name", &self.name)
            .field("fee", &self.fee)
            .field("is_async", &self.is_async)
            .field("dynamic_gas", &self.dynamic_gas)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// Immutable opcode dispatch table of one rule-set.
#[derive(Clone, Debug)]
pub struct OpcodeTable {
    entries: Vec<Option<OpcodeInfo>>,
}

impl OpcodeTable {
    /// Builds the table for `rules`, then applies the extension table in order.
    #[must_use]
    pub fn new(rules: &RuleSet, custom: &[CustomOpcode]) -> Self {
        let mut entries: Vec<Option<OpcodeInfo>> = (0..=255u8)
            .map(|byte| {
                builtin(byte, rules).map(|(name, fee, is_async, dynamic_gas)| OpcodeInfo {
                    opcode: Opcode(byte),
                    name,
                    fee,
                    is_async,
                    dynamic_gas,
                    custom: None,
                })
            })
            .collect();

        for entry in custom {
            match entry {
                CustomOpcode::Add {
                    opcode,
                    name,
                    fee,
                    handler,
                } => {
                    entries[usize::from(*opcode)] = Some(OpcodeInfo {
                        opcode: Opcode(*opcode),
                        name,
                        fee: *fee,
                        is_async: false,
                        dynamic_gas: false,
                        custom: Some(handler.clone()),
                    });
                }
                CustomOpcode::Remove { opcode } => entries[usize::from(*opcode)] = None,
            }
        }
        Self { entries }
    }

    /// Descriptor of `opcode`, `None` if undefined.
    #[must_use]
    pub fn get(&self, opcode: u8) -> Option<&OpcodeInfo> {
        self.entries[usize::from(opcode)].as_ref()
    }

    /// Number of defined opcodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Returns true if no opcode is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// (name, static fee, is_async, dynamic gas) of a built-in opcode.
type Builtin = (&'static str, u64, bool, bool);

#[allow(clippy::too_many_lines)]
fn builtin(byte: u8, rules: &RuleSet) -> Option<Builtin> {
    let gas = rules.gas();
    let fork = |h: Hardfork| rules.gte(h);
    let eip = |n: u32| rules.is_activated(n);

    let info: Builtin = match byte {
        0x00 => ("STOP", 0, false, false),
        0x01 => ("ADD", 3, false, false),
        0x02 => ("MUL", 5, false, false),
        0x03 => ("SUB", 3, false, false),
        0x04 => ("DIV", 5, false, false),
        0x05 => ("SDIV", 5, false, false),
        0x06 => ("MOD", 5, false, false),
        0x07 => ("SMOD", 5, false, false),
        0x08 => ("ADDMOD", 8, false, false),
        0x09 => ("MULMOD", 8, false, false),
        0x0a => ("EXP", 10, false, true),
        0x0b => ("SIGNEXTEND", 5, false, false),

        0x10 => ("LT", 3, false, false),
        0x11 => ("GT", 3, false, false),
        0x12 => ("SLT", 3, false, false),
        0x13 => ("SGT", 3, false, false),
        0x14 => ("EQ", 3, false, false),
        0x15 => ("ISZERO", 3, false, false),
        0x16 => ("AND", 3, false, false),
        0x17 => ("OR", 3, false, false),
        0x18 => ("XOR", 3, false, false),
        0x19 => ("NOT", 3, false, false),
        0x1a => ("BYTE", 3, false, false),
        0x1b if fork(Hardfork::Constantinople) => ("SHL", 3, false, false),
        0x1c if fork(Hardfork::Constantinople) => ("SHR", 3, false, false),
        0x1d if fork(Hardfork::Constantinople) => ("SAR", 3, false, false),

        0x20 => ("KECCAK256", 30, false, true),

        0x30 => ("ADDRESS", 2, false, false),
        0x31 => ("BALANCE", gas.balance, true, true),
        0x32 => ("ORIGIN", 2, false, false),
        0x33 => ("CALLER", 2, false, false),
        0x34 => ("CALLVALUE", 2, false, false),
        0x35 => ("CALLDATALOAD", 3, false, false),
        0x36 => ("CALLDATASIZE", 2, false, false),
        0x37 => ("CALLDATACOPY", 3, false, true),
        0x38 => ("CODESIZE", 2, false, false),
        0x39 => ("CODECOPY", 3, false, true),
        0x3a => ("GASPRICE", 2, false, false),
        0x3b => ("EXTCODESIZE", gas.ext_code_size, true, true),
        0x3c => ("EXTCODECOPY", gas.ext_code_copy, true, true),
        0x3d if fork(Hardfork::Byzantium) => ("RETURNDATASIZE", 2, false, false),
        0x3e if fork(Hardfork::Byzantium) => ("RETURNDATACOPY", 3, false, true),
        0x3f if fork(Hardfork::Constantinople) => ("EXTCODEHASH", gas.ext_code_hash, true, true),

        0x40 => ("BLOCKHASH", 20, true, false),
        0x41 => ("COINBASE", 2, false, false),
        0x42 => ("TIMESTAMP", 2, false, false),
        0x43 => ("NUMBER", 2, false, false),
        0x44 if eip(4399) => ("PREVRANDAO", 2, false, false),
        0x44 => ("DIFFICULTY", 2, false, false),
        0x45 => ("GASLIMIT", 2, false, false),
        0x46 if fork(Hardfork::Istanbul) => ("CHAINID", 2, false, false),
        0x47 if fork(Hardfork::Istanbul) => ("SELFBALANCE", 5, true, false),
        0x48 if eip(3198) => ("BASEFEE", 2, false, false),

        0x50 => ("POP", 2, false, false),
        0x51 => ("MLOAD", 3, false, true),
        0x52 => ("MSTORE", 3, false, true),
        0x53 => ("MSTORE8", 3, false, true),
        0x54 => ("SLOAD", gas.sload, true, true),
        0x55 => ("SSTORE", 0, true, true),
        0x56 => ("JUMP", 8, false, false),
        0x57 => ("JUMPI", 10, false, false),
        0x58 => ("PC", 2, false, false),
        0x59 => ("MSIZE", 2, false, false),
        0x5a => ("GAS", 2, false, false),
        0x5b => ("JUMPDEST", 1, false, false),
        0x5c if eip(2315) => ("BEGINSUB", 2, false, false),
        0x5d if eip(2315) => ("RETURNSUB", 5, false, false),
        0x5e if eip(2315) => ("JUMPSUB", 10, false, false),
        0x5c if eip(1153) => ("TLOAD", 100, false, false),
        0x5d if eip(1153) => ("TSTORE", 100, false, false),
        0x5e if eip(5656) => ("MCOPY", 3, false, true),
        0x5f if eip(3855) => ("PUSH0", 2, false, false),

        0x60..=0x7f => (PUSH_NAMES[usize::from(byte - 0x60)], 3, false, false),
        0x80..=0x8f => (DUP_NAMES[usize::from(byte - 0x80)], 3, false, false),
        0x90..=0x9f => (SWAP_NAMES[usize::from(byte - 0x90)], 3, false, false),
        0xa0..=0xa4 => (LOG_NAMES[usize::from(byte - 0xa0)], gas.log, false, true),

        0xf0 => ("CREATE", gas.create, true, true),
        0xf1 => ("CALL", gas.call, true, true),
        0xf2 => ("CALLCODE", gas.call, true, true),
        0xf3 => ("RETURN", 0, false, true),
        0xf4 if fork(Hardfork::Homestead) => ("DELEGATECALL", gas.call, true, true),
        0xf5 if fork(Hardfork::Constantinople) => ("CREATE2", gas.create, true, true),
        0xfa if fork(Hardfork::Byzantium) => ("STATICCALL", gas.staticcall, true, true),
        0xfd if fork(Hardfork::Byzantium) => ("REVERT", 0, false, true),
        0xfe => ("INVALID", 0, false, false),
        0xff => ("SELFDESTRUCT", gas.selfdestruct, true, true),
        _ => return None,
    };
    Some(info)
}

const PUSH_NAMES: [&str; 32] = [
    "PUSH1", "PUSH2", "PUSH3", "PUSH4", "PUSH5", "PUSH6", "PUSH7", "PUSH8", "PUSH9", "PUSH10",
    "PUSH11", "PUSH12", "PUSH13", "PUSH14", "PUSH15", "PUSH16", "PUSH17", "PUSH18", "PUSH19",
    "PUSH20", "PUSH21", "PUSH22", "PUSH23", "PUSH24", "PUSH25", "PUSH26", "PUSH27", "PUSH28",
    "PUSH29", "PUSH30", "PUSH31", "PUSH32",
];

const DUP_NAMES: [&str; 16] = [
    "DUP1", "DUP2", "DUP3", "DUP4", "DUP5", "DUP6", "DUP7", "DUP8", "DUP9", "DUP10", "DUP11",
    "DUP12", "DUP13", "DUP14", "DUP15", "DUP16",
];

const SWAP_NAMES: [&str; 16] = [
    "SWAP1", "SWAP2", "SWAP3", "SWAP4", "SWAP5", "SWAP6", "SWAP7", "SWAP8", "SWAP9", "SWAP10",
    "SWAP11", "SWAP12", "SWAP13", "SWAP14", "SWAP15", "SWAP16",
];

const LOG_NAMES: [&str; 5] = ["LOG0", "LOG1", "LOG2", "LOG3", "LOG4"];

// =============================================================================
// TESTS
// =============================================================================
