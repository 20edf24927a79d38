//! # EVM Gas Metering
//!
//! Static fees live in the [`OpcodeTable`](crate::evm::opcodes::OpcodeTable).
//! This module holds everything on top of them:
//!
//! - pure cost formulas (memory expansion, copies, EXP, the 63/64 rule)
//! - the three SSTORE rule generations (legacy, EIP-1283, EIP-2200)
//! - the dynamic-fee pass run by the interpreter before an opcode executes
//!
//! The dynamic pass only peeks at the stack. It may trap (static-context
//! writes, out of gas) and it records side effects the handler relies on:
//! memory high-water mark, warm entries, refund deltas and the gas limit
//! forwarded to a nested CALL/CREATE.

use crate::config::{GasSchedule, Hardfork};
use crate::domain::value_objects::{Address, StorageKey, U256};
use crate::errors::{Fault, VmError};
use crate::evm::interpreter::Interpreter;
use crate::evm::opcodes::Opcode;
use crate::ports::outbound::StateBackend;

// =============================================================================
// PURE FORMULAS
// =============================================================================

/// Number of 32-byte words needed to hold `len` bytes.
#[must_use]
pub const fn words(len: u64) -> u64 {
    len.div_ceil(32)
}

/// Total cost of a memory of `words` words: `words * memory + words² / divisor`.
///
/// Returns `None` when the cost does not fit 64 bits.
#[must_use]
pub fn memory_cost(words: u64, schedule: &GasSchedule) -> Option<u64> {
    let words = u128::from(words);
    let linear = words * u128::from(schedule.memory);
    let quadratic = words * words / u128::from(schedule.quad_coeff_div.max(1));
    u64::try_from(linear + quadratic).ok()
}

/// Per-word fee for copying `len` bytes.
#[must_use]
pub fn copy_cost(len: u64, schedule: &GasSchedule) -> u64 {
    words(len).saturating_mul(schedule.copy)
}

/// Dynamic part of EXP: `exp_byte` per significant byte of the exponent.
#[must_use]
pub fn exp_cost(exponent: U256, schedule: &GasSchedule) -> u64 {
    if exponent.is_zero() {
        return 0;
    }
    let byte_len = (exponent.bits() as u64).div_ceil(8);
    byte_len * schedule.exp_byte
}

/// Gas forwarded to a nested frame.
///
/// From TangerineWhistle the request is capped at `available - available / 64`.
/// Before that the request passes through unchanged and may exceed what is
/// available; callers trap on that.
#[must_use]
pub fn max_call_gas(requested: U256, available: u64, tangerine_whistle: bool) -> U256 {
    if !tangerine_whistle {
        return requested;
    }
    let allowed = U256::from(available - available / 64);
    requested.min(allowed)
}

/// Clamps a stack word to `u64`, saturating.
pub(crate) fn saturating_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}

// =============================================================================
// SSTORE RULES
// =============================================================================

/// Refund counter adjustment produced by one SSTORE.
///
/// `removed` is applied before `added`; removing more than the counter
/// holds traps with `RefundExhausted`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefundDelta {
    /// Added to the refund counter.
    pub added: u64,
    /// Taken from the refund counter.
    pub removed: u64,
}

/// Charge and refund of one SSTORE, before any cold-slot surcharge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SstoreCharge {
    /// Gas charged.
    pub gas: u64,
    /// Refund adjustment.
    pub refund: RefundDelta,
}

impl SstoreCharge {
    const fn flat(gas: u64) -> Self {
        Self {
            gas,
            refund: RefundDelta {
                added: 0,
                removed: 0,
            },
        }
    }
}

/// Pre-Constantinople rule: only the current and new values matter.
#[must_use]
pub fn sstore_legacy(schedule: &GasSchedule, current: U256, new: U256) -> SstoreCharge {
    match (current.is_zero(), new.is_zero()) {
        (true, false) => SstoreCharge::flat(schedule.sstore_set),
        (false, true) => SstoreCharge {
            gas: schedule.sstore_reset,
            refund: RefundDelta {
                added: schedule.sstore_refund,
                removed: 0,
            },
        },
        _ => SstoreCharge::flat(schedule.sstore_reset),
    }
}

/// Net metering tiers shared by EIP-1283 and EIP-2200.
struct NetTiers {
    noop: u64,
    init: u64,
    clean: u64,
    dirty: u64,
    clear_refund: u64,
    reset_refund: u64,
    reset_clear_refund: u64,
}

fn net_metered(tiers: &NetTiers, original: U256, current: U256, new: U256) -> SstoreCharge {
    if current == new {
        return SstoreCharge::flat(tiers.noop);
    }

    if original == current {
        if original.is_zero() {
            return SstoreCharge::flat(tiers.init);
        }
        let added = if new.is_zero() { tiers.clear_refund } else { 0 };
        return SstoreCharge {
            gas: tiers.clean,
            refund: RefundDelta { added, removed: 0 },
        };
    }

    let mut refund = RefundDelta::default();
    if !original.is_zero() {
        if current.is_zero() {
            refund.removed += tiers.clear_refund;
        } else if new.is_zero() {
            refund.added += tiers.clear_refund;
        }
    }
    if original == new {
        refund.added += if original.is_zero() {
            tiers.reset_clear_refund
        } else {
            tiers.reset_refund
        };
    }
    SstoreCharge {
        gas: tiers.dirty,
        refund,
    }
}

/// Constantinople net metering (EIP-1283).
#[must_use]
pub fn sstore_eip1283(
    schedule: &GasSchedule,
    original: U256,
    current: U256,
    new: U256,
) -> SstoreCharge {
    let tiers = NetTiers {
        noop: schedule.net_sstore_noop,
        init: schedule.net_sstore_init,
        clean: schedule.net_sstore_clean,
        dirty: schedule.net_sstore_dirty,
        clear_refund: schedule.net_sstore_clear_refund,
        reset_refund: schedule.net_sstore_reset_refund,
        reset_clear_refund: schedule.net_sstore_reset_clear_refund,
    };
    net_metered(&tiers, original, current, new)
}

/// Istanbul net metering (EIP-2200), EIP-2929 adjusted when active.
///
/// The sentry check (`gas_left <= sstore_sentry`) is done by the caller.
#[must_use]
pub fn sstore_eip2200(
    schedule: &GasSchedule,
    original: U256,
    current: U256,
    new: U256,
) -> SstoreCharge {
    let tiers = NetTiers {
        noop: schedule.sstore_noop,
        init: schedule.sstore_init,
        clean: schedule.sstore_clean,
        dirty: schedule.sstore_dirty,
        clear_refund: schedule.sstore_clear_refund,
        reset_refund: schedule.sstore_clean_refund,
        reset_clear_refund: schedule.sstore_init_refund,
    };
    net_metered(&tiers, original, current, new)
}

// =============================================================================
// DYNAMIC FEES
// =============================================================================

impl<B: StateBackend> Interpreter<'_, B> {
    /// Charges memory growth to cover `[offset, offset + len)`.
    ///
    /// Returns the delta above the current high-water cost and records the
    /// new word count.
    pub(crate) fn sub_mem_usage(&mut self, offset: U256, len: U256) -> Result<u64, Fault> {
        if len.is_zero() {
            return Ok(0);
        }
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= U256::from(u64::MAX))
            .ok_or(VmError::OutOfGas)?;
        let new_words = words(end.as_u64());
        if new_words <= self.run.memory_word_count {
            return Ok(0);
        }
        let cost = memory_cost(new_words, self.rules.gas()).ok_or(VmError::OutOfGas)?;
        let delta = cost.saturating_sub(self.run.highest_mem_cost);
        self.run.highest_mem_cost = self.run.highest_mem_cost.max(cost);
        self.run.memory_word_count = new_words;
        Ok(delta)
    }

    /// EIP-2929 account access: warms `address` and returns its surcharge.
    ///
    /// With `charge` unset the address is only warmed. SELFDESTRUCT pays
    /// nothing for a warm beneficiary.
    pub(crate) fn access_address(
        &mut self,
        address: Address,
        charge: bool,
        is_selfdestruct: bool,
    ) -> u64 {
        if !self.rules.is_activated(2929) {
            return 0;
        }
        let was_cold = self.evm.access.warm_address(address);
        let gas = self.rules.gas();
        if was_cold {
            if charge {
                return gas.cold_account_access;
            }
        } else if charge && !is_selfdestruct {
            return gas.warm_storage_read;
        }
        0
    }

    /// EIP-2929 slot access of the executing contract.
    pub(crate) fn access_storage(&mut self, key: StorageKey, is_sstore: bool) -> u64 {
        if !self.rules.is_activated(2929) {
            return 0;
        }
        let address = self.env.address;
        let gas = self.rules.gas();
        if self.evm.access.warm_slot(address, key) {
            gas.cold_sload
        } else if is_sstore {
            0
        } else {
            gas.warm_storage_read
        }
    }

    /// Gas left once `gas` has been charged, or `OutOfGas`.
    fn left_after(&self, gas: u64) -> Result<u64, Fault> {
        Ok(self
            .run
            .gas_left
            .checked_sub(gas)
            .ok_or(VmError::OutOfGas)?)
    }

    fn require_non_static(&self) -> Result<(), Fault> {
        if self.env.is_static {
            return Err(VmError::StaticStateChange.into());
        }
        Ok(())
    }

    /// Returns the total fee of `opcode`, starting from its static `fee`.
    #[allow(clippy::too_many_lines)]
    pub(crate) async fn dynamic_gas(&mut self, opcode: Opcode, fee: u64) -> Result<u64, Fault> {
        let rules = self.rules.clone();
        let schedule = rules.gas();
        let mut gas = fee;

        match opcode {
            Opcode::EXP => {
                let [_base, exponent] = self.run.stack.peek_n()?;
                gas = gas.saturating_add(exp_cost(exponent, schedule));
            }

            Opcode::KECCAK256 => {
                let [offset, len] = self.run.stack.peek_n()?;
                gas = gas.saturating_add(self.sub_mem_usage(offset, len)?);
                let hash_words = words(saturating_u64(len));
                gas = gas.saturating_add(schedule.keccak256_word.saturating_mul(hash_words));
            }

            Opcode::BALANCE | Opcode::EXTCODESIZE | Opcode::EXTCODEHASH => {
                let [address] = self.run.stack.peek_n()?;
                gas = gas.saturating_add(self.access_address(Address::from_word(address), true, false));
            }

            Opcode::CALLDATACOPY | Opcode::CODECOPY => {
                let [mem_offset, _data_offset, len] = self.run.stack.peek_n()?;
                gas = gas.saturating_add(self.sub_mem_usage(mem_offset, len)?);
                if !len.is_zero() {
                    gas = gas.saturating_add(copy_cost(saturating_u64(len), schedule));
                }
            }

            Opcode::EXTCODECOPY => {
                let [address, mem_offset, _code_offset, len] = self.run.stack.peek_n()?;
                gas = gas.saturating_add(self.sub_mem_usage(mem_offset, len)?);
                gas = gas.saturating_add(self.access_address(Address::from_word(address), true, false));
                if !len.is_zero() {
                    gas = gas.saturating_add(copy_cost(saturating_u64(len), schedule));
                }
            }

            Opcode::RETURNDATACOPY => {
                let [mem_offset, data_offset, len] = self.run.stack.peek_n()?;
                let end = data_offset.checked_add(len).ok_or(VmError::OutOfGas)?;
                if end > U256::from(self.run.return_data.len()) {
                    return Err(VmError::OutOfGas.into());
                }
                gas = gas.saturating_add(self.sub_mem_usage(mem_offset, len)?);
                if !len.is_zero() {
                    gas = gas.saturating_add(copy_cost(saturating_u64(len), schedule));
                }
            }

            Opcode::MLOAD | Opcode::MSTORE => {
                let [offset] = self.run.stack.peek_n()?;
                gas = gas.saturating_add(self.sub_mem_usage(offset, U256::from(32))?);
            }

            Opcode::MSTORE8 => {
                let [offset] = self.run.stack.peek_n()?;
                gas = gas.saturating_add(self.sub_mem_usage(offset, U256::one())?);
            }

            Opcode::SLOAD => {
                let [key] = self.run.stack.peek_n()?;
                gas = gas.saturating_add(self.access_storage(StorageKey::from_u256(key), false));
            }

            Opcode::SSTORE => {
                self.require_non_static()?;
                let [key, new] = self.run.stack.peek_n()?;
                let key = StorageKey::from_u256(key);
                let address = self.env.address;
                let current = self
                    .evm
                    .state
                    .get_contract_storage(address, key)
                    .await?
                    .to_u256();
                let original = self
                    .evm
                    .state
                    .get_original_contract_storage(address, key)
                    .await?
                    .to_u256();

                let charge = if rules.hardfork() == Hardfork::Constantinople {
                    sstore_eip1283(schedule, original, current, new)
                } else if rules.gte(Hardfork::Istanbul) {
                    if self.run.gas_left <= schedule.sstore_sentry {
                        return Err(VmError::OutOfGas.into());
                    }
                    sstore_eip2200(schedule, original, current, new)
                } else {
                    sstore_legacy(schedule, current, new)
                };
                self.sub_refund(charge.refund.removed)?;
                self.refund_gas(charge.refund.added);
                gas = gas.saturating_add(charge.gas);
                gas = gas.saturating_add(self.access_storage(key, true));
            }

            Opcode::MCOPY => {
                let [dst, src, len] = self.run.stack.peek_n()?;
                gas = gas.saturating_add(copy_cost(saturating_u64(len), schedule));
                gas = gas.saturating_add(self.sub_mem_usage(src, len)?);
                gas = gas.saturating_add(self.sub_mem_usage(dst, len)?);
            }

            Opcode(byte @ 0xa0..=0xa4) => {
                self.require_non_static()?;
                let [offset, len] = self.run.stack.peek_n()?;
                let topics = u64::from(byte - 0xa0);
                gas = gas.saturating_add(self.sub_mem_usage(offset, len)?);
                gas = gas.saturating_add(schedule.log_topic * topics);
                gas = gas.saturating_add(schedule.log_data.saturating_mul(saturating_u64(len)));
            }

            Opcode::CREATE | Opcode::CREATE2 => {
                self.require_non_static()?;
                let [_value, offset, len] = self.run.stack.peek_n()?;
                if opcode == Opcode::CREATE2 && self.run.stack.len() < 4 {
                    return Err(VmError::StackUnderflow.into());
                }
                let address = self.env.address;
                self.access_address(address, false, false);
                let init_words = words(saturating_u64(len));
                if rules.is_activated(3860) {
                    gas = gas.saturating_add(schedule.init_code_word.saturating_mul(init_words));
                }
                if opcode == Opcode::CREATE2 {
                    gas = gas.saturating_add(
                        schedule.keccak256_word_create2.saturating_mul(init_words),
                    );
                }
                gas = gas.saturating_add(self.sub_mem_usage(offset, len)?);

                let available = self.left_after(gas)?;
                let limit = max_call_gas(
                    U256::from(available),
                    available,
                    rules.gte(Hardfork::TangerineWhistle),
                );
                self.run.message_gas_limit = Some(limit.as_u64());
            }

            Opcode::CALL | Opcode::CALLCODE => {
                let [requested, to, value, in_offset, in_len, out_offset, out_len] =
                    self.run.stack.peek_n()?;
                let to = Address::from_word(to);
                if opcode == Opcode::CALL && self.env.is_static && !value.is_zero() {
                    return Err(VmError::StaticStateChange.into());
                }
                gas = gas.saturating_add(self.sub_mem_usage(in_offset, in_len)?);
                gas = gas.saturating_add(self.sub_mem_usage(out_offset, out_len)?);
                gas = gas.saturating_add(self.access_address(to, true, false));
                if !value.is_zero() {
                    gas = gas.saturating_add(schedule.call_value_transfer);
                }
                if opcode == Opcode::CALL {
                    let new_account = if rules.gte(Hardfork::SpuriousDragon) {
                        !value.is_zero() && self.evm.state.account_is_empty(to).await?
                    } else {
                        !self.evm.state.account_exists(to).await?
                    };
                    if new_account {
                        gas = gas.saturating_add(schedule.call_new_account);
                    }
                }

                let available = self.left_after(gas)?;
                let limit = max_call_gas(requested, available, rules.gte(Hardfork::TangerineWhistle));
                if limit > U256::from(available) {
                    return Err(VmError::OutOfGas.into());
                }
                let mut limit = limit.as_u64();
                if !value.is_zero() {
                    self.run.gas_left = self.run.gas_left.saturating_add(schedule.call_stipend);
                    limit = limit.saturating_add(schedule.call_stipend);
                }
                self.run.message_gas_limit = Some(limit);
            }

            Opcode::DELEGATECALL | Opcode::STATICCALL => {
                let [requested, to, in_offset, in_len, out_offset, out_len] =
                    self.run.stack.peek_n()?;
                gas = gas.saturating_add(self.sub_mem_usage(in_offset, in_len)?);
                gas = gas.saturating_add(self.sub_mem_usage(out_offset, out_len)?);
                gas = gas.saturating_add(self.access_address(Address::from_word(to), true, false));

                let available = self.left_after(gas)?;
                let limit = max_call_gas(requested, available, rules.gte(Hardfork::TangerineWhistle));
                if limit > U256::from(available) {
                    return Err(VmError::OutOfGas.into());
                }
                self.run.message_gas_limit = Some(limit.as_u64());
            }

            Opcode::RETURN | Opcode::REVERT => {
                let [offset, len] = self.run.stack.peek_n()?;
                gas = gas.saturating_add(self.sub_mem_usage(offset, len)?);
            }

            Opcode::SELFDESTRUCT => {
                self.require_non_static()?;
                let [beneficiary] = self.run.stack.peek_n()?;
                let beneficiary = Address::from_word(beneficiary);
                let new_account = if rules.gte(Hardfork::SpuriousDragon) {
                    let balance = self
                        .evm
                        .state
                        .get_account_or_default(self.env.address)
                        .await?
                        .balance;
                    !balance.is_zero() && self.evm.state.account_is_empty(beneficiary).await?
                } else if rules.gte(Hardfork::TangerineWhistle) {
                    !self.evm.state.account_exists(beneficiary).await?
                } else {
                    false
                };
                if new_account {
                    gas = gas.saturating_add(schedule.call_new_account);
                }
                gas = gas.saturating_add(self.access_address(beneficiary, true, true));
            }

            _ => {}
        }
        Ok(gas)
    }
}

// =============================================================================
// TESTS
// =============================================================================
