//! # EOF Container Checks (EIP-3540 / EIP-3670)
//!
//! Version 1 containers carry one code section and an optional data section:
//!
//! ```text
//! EF 00 01 | 01 <code size: u16> | [02 <data size: u16>] | 00 | code | [data]
//! ```

use crate::evm::opcodes::{Opcode, OpcodeTable};

/// First byte of every EOF container (reserved by EIP-3541).
pub const FORMAT: u8 = 0xef;
/// Second byte of every EOF container.
pub const MAGIC: u8 = 0x00;
/// Only supported container version.
pub const VERSION: u8 = 0x01;

const KIND_CODE: u8 = 0x01;
const KIND_DATA: u8 = 0x02;
const TERMINATOR: u8 = 0x00;

/// Section sizes of a well-formed container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EofSections {
    /// Code section size.
    pub code: usize,
    /// Data section size, zero when absent.
    pub data: usize,
}

impl EofSections {
    /// Offset of the code section inside the container.
    #[must_use]
    pub const fn code_start(&self) -> usize {
        if self.data > 0 {
            10
        } else {
            7
        }
    }

    /// The code section of `container`.
    #[must_use]
    pub fn code_section<'c>(&self, container: &'c [u8]) -> &'c [u8] {
        let start = self.code_start();
        container.get(start..start + self.code).unwrap_or(&[])
    }
}

/// Parses the header of `container`, `None` if it is not a valid EOF1 container.
#[must_use]
pub fn code_analysis(container: &[u8]) -> Option<EofSections> {
    if container.len() < 3 || container[1] != MAGIC || container[2] != VERSION {
        return None;
    }
    let size = |at: usize| usize::from(u16::from_be_bytes([container[at], container[at + 1]]));

    let (sections, total) = if container.len() > 7
        && container[3] == KIND_CODE
        && container[6] == TERMINATOR
    {
        let code = size(4);
        if code < 1 {
            return None;
        }
        (EofSections { code, data: 0 }, 7 + code)
    } else if container.len() > 10
        && container[3] == KIND_CODE
        && container[6] == KIND_DATA
        && container[9] == TERMINATOR
    {
        let code = size(4);
        let data = size(7);
        if code < 1 || data < 1 {
            return None;
        }
        (EofSections { code, data }, 10 + code + data)
    } else {
        return None;
    };

    (container.len() == total).then_some(sections)
}

/// EIP-3670: every opcode must be defined, PUSH data must be complete and
/// the section must end in a terminating instruction.
#[must_use]
pub fn valid_opcodes(code: &[u8], table: &OpcodeTable) -> bool {
    let mut i = 0;
    while i < code.len() {
        let opcode = Opcode(code[i]);
        if table.get(opcode.as_u8()).is_none() && opcode != Opcode::INVALID {
            return false;
        }
        if let Some(size) = opcode.push_size() {
            i += size;
            if i >= code.len() {
                return false;
            }
        }
        i += 1;
    }
    matches!(
        code.last().copied().map(Opcode),
        Some(Opcode::STOP | Opcode::RETURN | Opcode::REVERT | Opcode::INVALID | Opcode::SELFDESTRUCT)
    )
}
