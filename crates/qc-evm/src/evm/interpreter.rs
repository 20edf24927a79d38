//! # EVM Interpreter
//!
//! The fetch-decode-execute loop of one call frame.
//!
//! ## Step
//!
//! 1. look the opcode up in the rule-set's dispatch table (`INVALID` if absent)
//! 2. static fee, plus the dynamic fee from [`gas`](crate::evm::gas)
//! 3. observer step event, `trace!` event
//! 4. deduct the fee (out of gas clamps `gas_left` to zero)
//! 5. run the custom or built-in handler
//!
//! A frame ends when the program counter runs off the code, on STOP /
//! RETURN / REVERT / SELFDESTRUCT, or on any trap. Nested CALL and CREATE
//! re-enter the orchestrator through the EEI in [`eei`](crate::evm::eei).

use crate::domain::entities::{Log, SelfDestructSet};
use crate::domain::services::keccak256;
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue, U256};
use crate::errors::{EvmError, Fault, VmError};
use crate::evm::eei::CallKind;
use crate::evm::engine::Evm;
use crate::evm::eof;
use crate::evm::memory::Memory;
use crate::evm::opcodes::{CustomStep, Opcode, OpcodeTable};
use crate::evm::stack::Stack;
use crate::config::RuleSet;
use crate::ports::outbound::{StateBackend, StepEvent};
use primitive_types::U512;
use std::sync::Arc;
use tracing::trace;

/// RETURNSUB targets kept at most (EIP-2315).
const RETURN_STACK_LIMIT: usize = 1023;

/// Jump bitmap marker of a JUMPDEST.
const JUMPDEST_MARK: u8 = 1;
/// Jump bitmap marker of a BEGINSUB.
const BEGINSUB_MARK: u8 = 2;

// =============================================================================
// FRAME STATE
// =============================================================================

/// Read-only environment of one frame.
#[derive(Clone, Debug, Default)]
pub struct Env {
    /// Executing account (storage, logs, balance context).
    pub address: Address,
    /// Sender of the frame's message.
    pub caller: Address,
    /// Calldata.
    pub call_data: Bytes,
    /// Value carried by the message.
    pub call_value: U256,
    /// Full code container (CODESIZE / CODECOPY see this).
    pub code: Bytes,
    /// True inside STATICCALL.
    pub is_static: bool,
    /// Call depth.
    pub depth: usize,
    /// Account the code was loaded from.
    pub code_address: Address,
}

/// Mutable machine state of one run.
#[derive(Debug)]
pub(crate) struct RunState {
    pub(crate) pc: usize,
    /// Code being executed (the code section of an EOF container).
    pub(crate) code: Bytes,
    pub(crate) stack: Stack,
    pub(crate) return_stack: Vec<usize>,
    pub(crate) memory: Memory,
    pub(crate) memory_word_count: u64,
    pub(crate) highest_mem_cost: u64,
    pub(crate) gas_left: u64,
    /// Return data of the last nested call.
    pub(crate) return_data: Bytes,
    /// RETURN / REVERT payload of this frame.
    pub(crate) return_value: Bytes,
    /// Lazily computed jump bitmap.
    pub(crate) valid_jumps: Option<Vec<u8>>,
    /// Gas limit of the pending nested CALL/CREATE, set by the dynamic fee pass.
    pub(crate) message_gas_limit: Option<u64>,
    pub(crate) logs: Vec<Log>,
    pub(crate) selfdestruct: SelfDestructSet,
}

/// How a frame's run ended.
#[derive(Clone, Debug, Default)]
pub struct InterpreterResult {
    /// Gas left when the frame halted.
    pub gas_left: u64,
    /// RETURN / REVERT payload.
    pub return_value: Bytes,
    /// Trap, `None` on STOP / RETURN / SELFDESTRUCT / end of code.
    pub exception_error: Option<VmError>,
    /// Logs of this frame and its committed children.
    pub logs: Vec<Log>,
    /// Self-destructs of this frame and its committed children.
    pub selfdestruct: SelfDestructSet,
}

// =============================================================================
// INTERPRETER
// =============================================================================

/// One frame's interpreter, borrowing the VM for state and nested calls.
pub(crate) struct Interpreter<'e, B> {
    pub(crate) evm: &'e mut Evm<B>,
    pub(crate) rules: Arc<RuleSet>,
    opcodes: Arc<OpcodeTable>,
    pub(crate) env: Env,
    pub(crate) run: RunState,
}

impl<'e, B: StateBackend> Interpreter<'e, B> {
    pub(crate) fn new(
        evm: &'e mut Evm<B>,
        env: Env,
        gas_limit: u64,
        selfdestruct: SelfDestructSet,
    ) -> Self {
        let rules = Arc::clone(&evm.rules);
        let opcodes = Arc::clone(&evm.opcodes);
        let run = RunState {
            pc: 0,
            code: env.code.clone(),
            stack: Stack::with_limit(rules.config().stack_limit),
            return_stack: Vec::new(),
            memory: Memory::new(),
            memory_word_count: 0,
            highest_mem_cost: 0,
            gas_left: gas_limit,
            return_data: Bytes::new(),
            return_value: Bytes::new(),
            valid_jumps: None,
            message_gas_limit: None,
            logs: Vec::new(),
            selfdestruct,
        };
        Self {
            evm,
            rules,
            opcodes,
            env,
            run,
        }
    }

    /// Runs the frame starting at `pc`.
    ///
    /// # Errors
    ///
    /// Only fatal errors are returned; traps end up in the result.
    pub(crate) async fn run(mut self, pc: usize) -> Result<InterpreterResult, EvmError> {
        let outcome = match self.select_code(pc) {
            Ok(()) => self.run_loop().await,
            Err(fault) => Err(fault),
        };

        let exception_error = match outcome {
            Ok(()) | Err(Fault::Trap(VmError::Stop)) => None,
            Err(Fault::Trap(error)) => Some(error),
            Err(Fault::Fatal(error)) => return Err(error),
        };

        Ok(InterpreterResult {
            gas_left: self.run.gas_left,
            return_value: self.run.return_value,
            exception_error,
            logs: self.run.logs,
            selfdestruct: self.run.selfdestruct,
        })
    }

    /// Picks the code to run: the container itself, or its code section
    /// when EOF is active.
    fn select_code(&mut self, pc: usize) -> Result<(), Fault> {
        let container = self.env.code.clone();
        if self.rules.is_activated(3540) && container.as_slice().first() == Some(&eof::FORMAT) {
            let bytes = container.as_slice();
            if bytes.get(1) != Some(&eof::MAGIC) {
                return Err(VmError::InvalidBytecodeResult.into());
            }
            if bytes.get(2) != Some(&eof::VERSION) {
                return Err(VmError::InvalidEofFormat.into());
            }
            let sections = eof::code_analysis(bytes).ok_or(VmError::InvalidEofFormat)?;
            self.run.code = Bytes::from_slice(sections.code_section(bytes));
        }

        if pc != 0 && pc >= self.run.code.len() {
            return Err(EvmError::Internal(format!(
                "start pc {pc} outside code of length {}",
                self.run.code.len()
            ))
            .into());
        }
        self.run.pc = pc;
        Ok(())
    }

    async fn run_loop(&mut self) -> Result<(), Fault> {
        while self.run.pc < self.run.code.len() {
            let byte = self.run.code.as_slice()[self.run.pc];
            if self.run.valid_jumps.is_none() && Opcode(byte).needs_jump_analysis() {
                self.run.valid_jumps = Some(self.jump_analysis());
            }
            self.step(byte).await?;
        }
        Ok(())
    }

    async fn step(&mut self, byte: u8) -> Result<(), Fault> {
        let Some(info) = self.opcodes.get(byte) else {
            return Err(VmError::InvalidOpcode.into());
        };
        let name = info.name;
        let dynamic = info.dynamic_gas;
        let custom = info.custom.clone();
        let opcode = Opcode(byte);

        let mut gas = info.fee;
        if dynamic {
            gas = self.dynamic_gas(opcode, gas).await?;
        }

        if let Some(observer) = &self.evm.observer {
            observer.step(&StepEvent {
                pc: self.run.pc,
                opcode: byte,
                name,
                fee: gas,
                gas_left: self.run.gas_left,
                depth: self.env.depth,
                address: self.env.address,
                stack: self.run.stack.as_slice(),
                memory_size: self.run.memory.len(),
            });
        }
        trace!(
            pc = self.run.pc,
            op = name,
            gas_left = self.run.gas_left,
            depth = self.env.depth,
            "step"
        );

        self.use_gas(gas)?;
        self.run.pc += 1;

        if let Some(handler) = custom {
            let mut step = CustomStep {
                stack: &mut self.run.stack,
                memory: &mut self.run.memory,
                pc: self.run.pc,
                gas_left: self.run.gas_left,
            };
            handler(&mut step)?;
            let (pc, gas_left) = (step.pc, step.gas_left);
            self.run.pc = pc;
            self.run.gas_left = gas_left.min(self.run.gas_left);
            return Ok(());
        }

        self.execute(opcode).await
    }

    // =========================================================================
    // GAS & REFUND
    // =========================================================================

    /// Deducts `amount`, clamping to zero and trapping on a shortfall.
    pub(crate) fn use_gas(&mut self, amount: u64) -> Result<(), Fault> {
        match self.run.gas_left.checked_sub(amount) {
            Some(left) => {
                self.run.gas_left = left;
                Ok(())
            }
            None => {
                self.run.gas_left = 0;
                Err(VmError::OutOfGas.into())
            }
        }
    }

    pub(crate) fn refund_gas(&mut self, amount: u64) {
        self.evm.refund = self.evm.refund.saturating_add(amount);
    }

    /// Lowers the refund counter, which must never go negative.
    pub(crate) fn sub_refund(&mut self, amount: u64) -> Result<(), Fault> {
        self.evm.refund = self
            .evm
            .refund
            .checked_sub(amount)
            .ok_or(VmError::RefundExhausted)?;
        Ok(())
    }

    // =========================================================================
    // MEMORY
    // =========================================================================

    /// Reads `len` bytes, growing memory first. Gas was metered already.
    pub(crate) fn memory_read(&mut self, offset: U256, len: U256) -> Result<Vec<u8>, Fault> {
        if len.is_zero() {
            return Ok(Vec::new());
        }
        let (offset, len) = (to_usize(offset)?, to_usize(len)?);
        self.run.memory.extend(offset, len)?;
        Ok(self.run.memory.read(offset, len))
    }

    /// Writes `data` at `offset`, growing memory first.
    pub(crate) fn memory_write(&mut self, offset: U256, data: &[u8]) -> Result<(), Fault> {
        if data.is_empty() {
            return Ok(());
        }
        let offset = to_usize(offset)?;
        self.run.memory.extend(offset, data.len())?;
        self.run.memory.write(offset, data.len(), data)?;
        Ok(())
    }

    // =========================================================================
    // CONTROL FLOW
    // =========================================================================

    /// Marks JUMPDESTs (and BEGINSUBs under EIP-2315) outside PUSH data.
    fn jump_analysis(&self) -> Vec<u8> {
        let code = self.run.code.as_slice();
        let subroutines = self.rules.is_activated(2315);
        let mut marks = vec![0u8; code.len()];

        let mut i = 0;
        while i < code.len() {
            let opcode = Opcode(code[i]);
            if opcode == Opcode::JUMPDEST {
                marks[i] = JUMPDEST_MARK;
            } else if subroutines && opcode == Opcode::BEGINSUB {
                marks[i] = BEGINSUB_MARK;
            } else if let Some(size) = opcode.push_size() {
                i += size;
            }
            i += 1;
        }
        marks
    }

    fn jump_mark(&self, dest: U256) -> Option<(usize, u8)> {
        if dest > U256::from(self.env.code.len()) {
            return None;
        }
        let dest = dest.as_usize();
        let mark = *self.run.valid_jumps.as_ref()?.get(dest)?;
        Some((dest, mark))
    }

    fn jump(&mut self, dest: U256) -> Result<(), Fault> {
        match self.jump_mark(dest) {
            Some((dest, JUMPDEST_MARK)) => {
                self.run.pc = dest;
                Ok(())
            }
            _ => Err(VmError::InvalidJump.into()),
        }
    }

    // =========================================================================
    // OPCODE HANDLERS
    // =========================================================================

    #[allow(clippy::too_many_lines)]
    async fn execute(&mut self, opcode: Opcode) -> Result<(), Fault> {
        match opcode {
            Opcode::STOP => return Err(VmError::Stop.into()),

            // -----------------------------------------------------------------
            // Arithmetic
            // -----------------------------------------------------------------
            Opcode::ADD => self.binary(|a, b| a.overflowing_add(b).0)?,
            Opcode::MUL => self.binary(|a, b| a.overflowing_mul(b).0)?,
            Opcode::SUB => self.binary(|a, b| a.overflowing_sub(b).0)?,
            Opcode::DIV => self.binary(|a, b| if b.is_zero() { U256::zero() } else { a / b })?,
            Opcode::SDIV => {
                self.binary(|a, b| if b.is_zero() { U256::zero() } else { signed_div(a, b) })?;
            }
            Opcode::MOD => self.binary(|a, b| if b.is_zero() { U256::zero() } else { a % b })?,
            Opcode::SMOD => {
                self.binary(|a, b| if b.is_zero() { U256::zero() } else { signed_mod(a, b) })?;
            }
            Opcode::ADDMOD => {
                let [a, b, n] = self.run.stack.pop_n()?;
                let result = if n.is_zero() {
                    U256::zero()
                } else {
                    u512_to_u256((u256_to_u512(a) + u256_to_u512(b)) % u256_to_u512(n))
                };
                self.run.stack.push(result)?;
            }
            Opcode::MULMOD => {
                let [a, b, n] = self.run.stack.pop_n()?;
                let result = if n.is_zero() {
                    U256::zero()
                } else {
                    u512_to_u256((u256_to_u512(a) * u256_to_u512(b)) % u256_to_u512(n))
                };
                self.run.stack.push(result)?;
            }
            Opcode::EXP => self.binary(exp_by_squaring)?,
            Opcode::SIGNEXTEND => self.binary(sign_extend)?,

            // -----------------------------------------------------------------
            // Comparison & bitwise
            // -----------------------------------------------------------------
            Opcode::LT => self.binary(|a, b| bool_word(a < b))?,
            Opcode::GT => self.binary(|a, b| bool_word(a > b))?,
            Opcode::SLT => self.binary(|a, b| bool_word(signed_lt(a, b)))?,
            Opcode::SGT => self.binary(|a, b| bool_word(signed_lt(b, a)))?,
            Opcode::EQ => self.binary(|a, b| bool_word(a == b))?,
            Opcode::ISZERO => {
                let a = self.run.stack.pop()?;
                self.run.stack.push(bool_word(a.is_zero()))?;
            }
            Opcode::AND => self.binary(|a, b| a & b)?,
            Opcode::OR => self.binary(|a, b| a | b)?,
            Opcode::XOR => self.binary(|a, b| a ^ b)?,
            Opcode::NOT => {
                let a = self.run.stack.pop()?;
                self.run.stack.push(!a)?;
            }
            Opcode::BYTE => self.binary(|i, x| {
                if i < U256::from(32) {
                    U256::from(x.byte(31 - i.as_usize()))
                } else {
                    U256::zero()
                }
            })?,
            Opcode::SHL => self.binary(|shift, value| {
                if shift < U256::from(256) {
                    value << shift.as_usize()
                } else {
                    U256::zero()
                }
            })?,
            Opcode::SHR => self.binary(|shift, value| {
                if shift < U256::from(256) {
                    value >> shift.as_usize()
                } else {
                    U256::zero()
                }
            })?,
            Opcode::SAR => self.binary(|shift, value| sar(value, shift))?,

            Opcode::KECCAK256 => {
                let [offset, len] = self.run.stack.pop_n()?;
                let data = self.memory_read(offset, len)?;
                self.run.stack.push(keccak256(&data).to_word())?;
            }

            // -----------------------------------------------------------------
            // Environment
            // -----------------------------------------------------------------
            Opcode::ADDRESS => self.run.stack.push(self.env.address.to_word())?,
            Opcode::BALANCE => {
                let address = Address::from_word(self.run.stack.pop()?);
                let balance = self.balance_of(address).await?;
                self.run.stack.push(balance)?;
            }
            Opcode::ORIGIN => self.run.stack.push(self.evm.tx.origin.to_word())?,
            Opcode::CALLER => self.run.stack.push(self.env.caller.to_word())?,
            Opcode::CALLVALUE => self.run.stack.push(self.env.call_value)?,
            Opcode::CALLDATALOAD => {
                let pos = self.run.stack.pop()?;
                let data = self.env.call_data.as_slice();
                let word = if pos > U256::from(data.len()) {
                    U256::zero()
                } else {
                    U256::from_big_endian(&data_slice(data, pos, 32))
                };
                self.run.stack.push(word)?;
            }
            Opcode::CALLDATASIZE => self.run.stack.push(U256::from(self.env.call_data.len()))?,
            Opcode::CALLDATACOPY => {
                let [mem_offset, data_offset, len] = self.run.stack.pop_n()?;
                if !len.is_zero() {
                    let data = data_slice(self.env.call_data.as_slice(), data_offset, to_usize(len)?);
                    self.memory_write(mem_offset, &data)?;
                }
            }
            Opcode::CODESIZE => self.run.stack.push(U256::from(self.env.code.len()))?,
            Opcode::CODECOPY => {
                let [mem_offset, code_offset, len] = self.run.stack.pop_n()?;
                if !len.is_zero() {
                    let data = data_slice(self.env.code.as_slice(), code_offset, to_usize(len)?);
                    self.memory_write(mem_offset, &data)?;
                }
            }
            Opcode::GASPRICE => self.run.stack.push(self.evm.tx.gas_price)?,
            Opcode::EXTCODESIZE => {
                let address = Address::from_word(self.run.stack.pop()?);
                let code = self.evm.state.get_contract_code(address).await?;
                self.run.stack.push(U256::from(code.len()))?;
            }
            Opcode::EXTCODECOPY => {
                let [address, mem_offset, code_offset, len] = self.run.stack.pop_n()?;
                if !len.is_zero() {
                    let code = self
                        .evm
                        .state
                        .get_contract_code(Address::from_word(address))
                        .await?;
                    let data = data_slice(code.as_slice(), code_offset, to_usize(len)?);
                    self.memory_write(mem_offset, &data)?;
                }
            }
            Opcode::RETURNDATASIZE => {
                self.run.stack.push(U256::from(self.run.return_data.len()))?;
            }
            Opcode::RETURNDATACOPY => {
                let [mem_offset, data_offset, len] = self.run.stack.pop_n()?;
                if !len.is_zero() {
                    let data =
                        data_slice(self.run.return_data.as_slice(), data_offset, to_usize(len)?);
                    self.memory_write(mem_offset, &data)?;
                }
            }
            Opcode::EXTCODEHASH => {
                let address = Address::from_word(self.run.stack.pop()?);
                let hash = match self.evm.state.get_account(address).await? {
                    Some(account) if !account.is_empty() => account.code_hash.to_word(),
                    _ => U256::zero(),
                };
                self.run.stack.push(hash)?;
            }

            // -----------------------------------------------------------------
            // Block
            // -----------------------------------------------------------------
            Opcode::BLOCKHASH => {
                let number = self.run.stack.pop()?;
                let hash = self.block_hash(number).await;
                self.run.stack.push(hash)?;
            }
            Opcode::COINBASE => self.run.stack.push(self.evm.block.coinbase.to_word())?,
            Opcode::TIMESTAMP => self.run.stack.push(U256::from(self.evm.block.timestamp))?,
            Opcode::NUMBER => self.run.stack.push(U256::from(self.evm.block.number))?,
            Opcode::PREVRANDAO => {
                let value = if self.rules.is_activated(4399) {
                    self.evm.block.prev_randao.to_word()
                } else {
                    self.evm.block.difficulty
                };
                self.run.stack.push(value)?;
            }
            Opcode::GASLIMIT => self.run.stack.push(U256::from(self.evm.block.gas_limit))?,
            Opcode::CHAINID => self.run.stack.push(U256::from(self.rules.chain_id()))?,
            Opcode::SELFBALANCE => {
                let balance = self.balance_of(self.env.address).await?;
                self.run.stack.push(balance)?;
            }
            Opcode::BASEFEE => self.run.stack.push(self.evm.block.base_fee)?,

            // -----------------------------------------------------------------
            // Stack, memory, storage, flow
            // -----------------------------------------------------------------
            Opcode::POP => {
                self.run.stack.pop()?;
            }
            Opcode::MLOAD => {
                let offset = self.run.stack.pop()?;
                let word = self.memory_read(offset, U256::from(32))?;
                self.run.stack.push(U256::from_big_endian(&word))?;
            }
            Opcode::MSTORE => {
                let [offset, value] = self.run.stack.pop_n()?;
                let mut word = [0u8; 32];
                value.to_big_endian(&mut word);
                self.memory_write(offset, &word)?;
            }
            Opcode::MSTORE8 => {
                let [offset, value] = self.run.stack.pop_n()?;
                self.memory_write(offset, &[value.byte(0)])?;
            }
            Opcode::SLOAD => {
                let key = StorageKey::from_u256(self.run.stack.pop()?);
                let value = self
                    .evm
                    .state
                    .get_contract_storage(self.env.address, key)
                    .await?;
                self.run.stack.push(value.to_u256())?;
            }
            Opcode::SSTORE => {
                let [key, value] = self.run.stack.pop_n()?;
                self.evm.state.put_contract_storage(
                    self.env.address,
                    StorageKey::from_u256(key),
                    StorageValue::from_u256(value),
                );
            }
            Opcode::JUMP => {
                let dest = self.run.stack.pop()?;
                self.jump(dest)?;
            }
            Opcode::JUMPI => {
                let [dest, condition] = self.run.stack.pop_n()?;
                if !condition.is_zero() {
                    self.jump(dest)?;
                }
            }
            Opcode::PC => self.run.stack.push(U256::from(self.run.pc - 1))?,
            Opcode::MSIZE => {
                let size = U256::from(self.run.memory_word_count) * U256::from(32);
                self.run.stack.push(size)?;
            }
            Opcode::GAS => self.run.stack.push(U256::from(self.run.gas_left))?,
            Opcode::JUMPDEST => {}

            // 0x5c-0x5e are either the EIP-2315 subroutine opcodes or
            // TLOAD / TSTORE / MCOPY; the two sets never coexist
            Opcode(0x5c..=0x5e) if self.rules.is_activated(2315) => self.subroutine(opcode)?,
            Opcode::TLOAD => {
                let key = StorageKey::from_u256(self.run.stack.pop()?);
                let value = self.evm.transient.get(self.env.address, key);
                self.run.stack.push(value.to_u256())?;
            }
            Opcode::TSTORE => {
                if self.env.is_static {
                    return Err(VmError::StaticStateChange.into());
                }
                let [key, value] = self.run.stack.pop_n()?;
                self.evm.transient.put(
                    self.env.address,
                    StorageKey::from_u256(key),
                    StorageValue::from_u256(value),
                );
            }
            Opcode::MCOPY => {
                let [dst, src, len] = self.run.stack.pop_n()?;
                if !len.is_zero() {
                    let (dst, src, len) = (to_usize(dst)?, to_usize(src)?, to_usize(len)?);
                    self.run.memory.extend(src, len)?;
                    self.run.memory.extend(dst, len)?;
                    self.run.memory.copy_within(dst, src, len)?;
                }
            }

            Opcode::PUSH0 => self.run.stack.push(U256::zero())?,
            Opcode(0x60..=0x7f) => self.push_immediate(opcode)?,
            Opcode(byte @ 0x80..=0x8f) => self.run.stack.dup(usize::from(byte - 0x7f))?,
            Opcode(byte @ 0x90..=0x9f) => self.run.stack.swap(usize::from(byte - 0x8f))?,
            Opcode(byte @ 0xa0..=0xa4) => {
                let [offset, len] = self.run.stack.pop_n()?;
                let mut topics = Vec::with_capacity(usize::from(byte - 0xa0));
                for _ in 0..(byte - 0xa0) {
                    topics.push(Hash::from_word(self.run.stack.pop()?));
                }
                let data = self.memory_read(offset, len)?;
                self.log(topics, data);
            }

            // -----------------------------------------------------------------
            // System
            // -----------------------------------------------------------------
            Opcode::CREATE | Opcode::CREATE2 => {
                if self.env.is_static {
                    return Err(VmError::StaticStateChange.into());
                }
                let [value, offset, len] = self.run.stack.pop_n()?;
                let salt = if opcode == Opcode::CREATE2 {
                    Some(Hash::from_word(self.run.stack.pop()?))
                } else {
                    None
                };
                if self.rules.is_activated(3860) {
                    if let Some(max) = self.rules.max_init_code_size() {
                        if len > U256::from(max) {
                            return Err(VmError::InitCodeSizeViolation.into());
                        }
                    }
                }
                let gas_limit = self.take_message_gas_limit()?;
                let data = self.memory_read(offset, len)?;
                let address = self.create(gas_limit, value, Bytes::from(data), salt).await?;
                self.run.stack.push(address)?;
            }
            Opcode::CALL | Opcode::CALLCODE => {
                let [_gas, to, value, in_offset, in_len, out_offset, out_len] =
                    self.run.stack.pop_n()?;
                let kind = if opcode == Opcode::CALL {
                    CallKind::Call
                } else {
                    CallKind::CallCode
                };
                self.call_opcode(kind, to, value, [in_offset, in_len], [out_offset, out_len])
                    .await?;
            }
            Opcode::DELEGATECALL | Opcode::STATICCALL => {
                let [_gas, to, in_offset, in_len, out_offset, out_len] = self.run.stack.pop_n()?;
                let kind = if opcode == Opcode::DELEGATECALL {
                    CallKind::DelegateCall
                } else {
                    CallKind::StaticCall
                };
                self.call_opcode(
                    kind,
                    to,
                    U256::zero(),
                    [in_offset, in_len],
                    [out_offset, out_len],
                )
                .await?;
            }
            Opcode::RETURN | Opcode::REVERT => {
                let [offset, len] = self.run.stack.pop_n()?;
                self.run.return_value = Bytes::from(self.memory_read(offset, len)?);
                let halt = if opcode == Opcode::RETURN {
                    VmError::Stop
                } else {
                    VmError::Revert
                };
                return Err(halt.into());
            }
            Opcode::INVALID => return Err(VmError::InvalidOpcode.into()),
            Opcode::SELFDESTRUCT => {
                let beneficiary = Address::from_word(self.run.stack.pop()?);
                self.selfdestruct(beneficiary).await?;
            }

            _ => return Err(VmError::InvalidOpcode.into()),
        }
        Ok(())
    }

    fn binary(&mut self, op: impl FnOnce(U256, U256) -> U256) -> Result<(), Fault> {
        let [a, b] = self.run.stack.pop_n()?;
        self.run.stack.push(op(a, b))?;
        Ok(())
    }

    fn push_immediate(&mut self, opcode: Opcode) -> Result<(), Fault> {
        let size = opcode.push_size().unwrap_or(0);
        let code = self.run.code.as_slice();
        let start = self.run.pc;
        if self.rules.is_activated(3540) && start + size > code.len() {
            return Err(VmError::OutOfRange.into());
        }
        // a PUSH cut short by the end of code reads as if zero-padded
        let mut immediate = vec![0u8; size];
        let available = code.len().saturating_sub(start).min(size);
        immediate[..available].copy_from_slice(&code[start..start + available]);

        self.run.stack.push(U256::from_big_endian(&immediate))?;
        self.run.pc += size;
        Ok(())
    }

    fn subroutine(&mut self, opcode: Opcode) -> Result<(), Fault> {
        match opcode {
            Opcode::BEGINSUB => Err(VmError::InvalidBeginSub.into()),
            Opcode::RETURNSUB => {
                let pc = self
                    .run
                    .return_stack
                    .pop()
                    .ok_or(VmError::InvalidReturnSub)?;
                self.run.pc = pc;
                Ok(())
            }
            _ => {
                let dest = self.run.stack.pop()?;
                let Some((dest, BEGINSUB_MARK)) = self.jump_mark(dest) else {
                    return Err(VmError::InvalidJumpSub.into());
                };
                if self.run.return_stack.len() >= RETURN_STACK_LIMIT {
                    return Err(VmError::StackOverflow.into());
                }
                self.run.return_stack.push(self.run.pc);
                self.run.pc = dest + 1;
                Ok(())
            }
        }
    }

    /// Gas limit recorded by the dynamic fee pass for the pending nested frame.
    fn take_message_gas_limit(&mut self) -> Result<u64, Fault> {
        self.run.message_gas_limit.take().ok_or_else(|| {
            Fault::Fatal(EvmError::Internal(
                "nested message without a metered gas limit".into(),
            ))
        })
    }

    async fn call_opcode(
        &mut self,
        kind: CallKind,
        to: U256,
        value: U256,
        input: [U256; 2],
        output: [U256; 2],
    ) -> Result<(), Fault> {
        let [in_offset, in_len] = input;
        let [out_offset, out_len] = output;
        let data = self.memory_read(in_offset, in_len)?;
        let gas_limit = self.take_message_gas_limit()?;
        let status = self
            .call(kind, gas_limit, Address::from_word(to), value, Bytes::from(data))
            .await?;
        self.write_call_output(out_offset, out_len)?;
        self.run.stack.push(status)?;
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Converts a metered offset or length; anything past the address space is
/// out of gas.
pub(crate) fn to_usize(value: U256) -> Result<usize, Fault> {
    if value > U256::from(usize::MAX) {
        return Err(VmError::OutOfGas.into());
    }
    Ok(value.as_usize())
}

/// `data[offset..offset + len]`, clamped to the data and right-padded with zeros.
pub(crate) fn data_slice(data: &[u8], offset: U256, len: usize) -> Vec<u8> {
    let start = if offset > U256::from(data.len()) {
        data.len()
    } else {
        offset.as_usize()
    };
    let mut out = vec![0u8; len];
    let available = (data.len() - start).min(len);
    out[..available].copy_from_slice(&data[start..start + available]);
    out
}

fn bool_word(value: bool) -> U256 {
    if value {
        U256::one()
    } else {
        U256::zero()
    }
}

fn negate(value: U256) -> U256 {
    (!value).overflowing_add(U256::one()).0
}

fn abs(value: U256) -> U256 {
    if value.bit(255) {
        negate(value)
    } else {
        value
    }
}

/// Signed less than comparison.
fn signed_lt(a: U256, b: U256) -> bool {
    match (a.bit(255), b.bit(255)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

/// Signed division, truncating toward zero. `MIN / -1` wraps to `MIN`.
fn signed_div(a: U256, b: U256) -> U256 {
    let result = abs(a) / abs(b);
    if a.bit(255) == b.bit(255) {
        result
    } else {
        negate(result)
    }
}

/// Signed modulo; the result takes the sign of the dividend.
fn signed_mod(a: U256, b: U256) -> U256 {
    let result = abs(a) % abs(b);
    if a.bit(255) {
        negate(result)
    } else {
        result
    }
}

/// Extends the sign bit of byte `k` (counted from the least significant).
fn sign_extend(k: U256, x: U256) -> U256 {
    if k >= U256::from(31) {
        return x;
    }
    let bit_index = 8 * k.as_usize() + 7;
    let mask = (U256::one() << (bit_index + 1)) - 1;
    if x.bit(bit_index) {
        x | !mask
    } else {
        x & mask
    }
}

/// Arithmetic shift right.
fn sar(value: U256, shift: U256) -> U256 {
    let negative = value.bit(255);
    if shift >= U256::from(256) {
        return if negative { U256::MAX } else { U256::zero() };
    }
    let shift = shift.as_usize();
    if shift == 0 {
        return value;
    }
    let shifted = value >> shift;
    if negative {
        shifted | (U256::MAX << (256 - shift))
    } else {
        shifted
    }
}

/// Exponentiation by squaring, modulo 2^256.
fn exp_by_squaring(base: U256, mut exp: U256) -> U256 {
    let mut result = U256::one();
    let mut base = base;
    while !exp.is_zero() {
        if exp.bit(0) {
            result = result.overflowing_mul(base).0;
        }
        exp >>= 1;
        base = base.overflowing_mul(base).0;
    }
    result
}

fn u256_to_u512(value: U256) -> U512 {
    let mut bytes = [0u8; 64];
    value.to_big_endian(&mut bytes[32..]);
    U512::from_big_endian(&bytes)
}

/// Low 256 bits; callers only pass values already reduced below a U256 modulus.
fn u512_to_u256(value: U512) -> U256 {
    let mut bytes = [0u8; 64];
    value.to_big_endian(&mut bytes);
    U256::from_big_endian(&bytes[32..])
}

// =============================================================================
// TESTS
// =============================================================================
