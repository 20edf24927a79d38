//! # Rule-Set Configuration
//!
//! Hardfork selection, extra EIP activation and the resolved gas schedule.
//!
//! A [`VmConfig`] is plain data (serde, TOML-loadable). It is resolved once
//! at VM construction into a [`RuleSet`], which every opcode handler and gas
//! function consults. Nothing in a `RuleSet` changes while a transaction runs.
//!
//! ## Config File Format
//!
//! ```toml
//! hardfork = "london"
//! eips = [1153, 5656]
//! chain_id = 1
//! max_call_depth = 1024
//! ```

use crate::errors::EvmError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// HARDFORKS
// =============================================================================

/// Protocol upgrade, in activation order.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Hardfork {
    /// Frontier launch rules.
    #[serde(alias = "frontier")]
    Chainstart,
    /// DELEGATECALL, code-deposit failure becomes out-of-gas.
    Homestead,
    /// DAO fork (no EVM changes).
    Dao,
    /// EIP-150 IO repricing and the 63/64 rule.
    TangerineWhistle,
    /// EIP-161 state clearing, EIP-170 code size limit.
    SpuriousDragon,
    /// REVERT, STATICCALL, RETURNDATA, bn128 and modexp precompiles.
    Byzantium,
    /// Shifts, CREATE2, EXTCODEHASH, EIP-1283 net metering.
    Constantinople,
    /// Constantinople without EIP-1283.
    Petersburg,
    /// CHAINID, SELFBALANCE, EIP-2200, BLAKE2F.
    Istanbul,
    /// Difficulty bomb delay.
    MuirGlacier,
    /// EIP-2929 access lists.
    Berlin,
    /// BASEFEE, EIP-3529 refund reduction, EIP-3541.
    London,
    /// Difficulty bomb delay.
    ArrowGlacier,
    /// Difficulty bomb delay.
    GrayGlacier,
    /// Proof of stake, PREVRANDAO.
    #[serde(alias = "merge")]
    Paris,
    /// PUSH0, warm coinbase, init code metering.
    #[default]
    Shanghai,
}

impl Hardfork {
    /// EIPs switched on by this hardfork and every earlier one.
    #[must_use]
    pub fn implied_eips(self) -> BTreeSet<u32> {
        let mut eips = BTreeSet::new();
        if self >= Self::Berlin {
            eips.extend([2565, 2929, 2930]);
        }
        if self >= Self::London {
            eips.extend([1559, 3198, 3529, 3541]);
        }
        if self >= Self::Paris {
            eips.extend([3675, 4399]);
        }
        if self >= Self::Shanghai {
            eips.extend([3651, 3855, 3860]);
        }
        eips
    }
}

/// EIPs that can be switched on through [`VmConfig::eips`], with the EIPs
/// each one requires.
const SUPPORTED_EIPS: &[(u32, &[u32])] = &[
    (1153, &[]),
    (1559, &[]),
    (2315, &[]),
    (2537, &[]),
    (2565, &[]),
    (2929, &[]),
    (2930, &[2929]),
    (3198, &[]),
    (3529, &[]),
    (3540, &[3541]),
    (3541, &[]),
    (3651, &[]),
    (3670, &[3540]),
    (3675, &[]),
    (3855, &[]),
    (3860, &[]),
    (4399, &[]),
    (5656, &[]),
];

// =============================================================================
// VM CONFIGURATION
// =============================================================================

/// User-facing VM configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    /// Active hardfork.
    pub hardfork: Hardfork,
    /// Extra EIPs on top of the hardfork's own.
    pub eips: Vec<u32>,
    /// Lift the EIP-170 deployed code size ceiling.
    pub allow_unlimited_contract_size: bool,
    /// Lift the EIP-3860 init code size ceiling.
    pub allow_unlimited_init_code_size: bool,
    /// Maximum call depth before CALL/CREATE return 0.
    pub max_call_depth: usize,
    /// Stack height bound per frame.
    pub stack_limit: usize,
    /// Value pushed by CHAINID.
    pub chain_id: u64,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            hardfork: Hardfork::default(),
            eips: Vec::new(),
            allow_unlimited_contract_size: false,
            allow_unlimited_init_code_size: false,
            max_call_depth: 1024,
            stack_limit: 1024,
            chain_id: 1,
        }
    }
}

impl VmConfig {
    /// Creates a default config for `hardfork`.
    #[must_use]
    pub fn for_hardfork(hardfork: Hardfork) -> Self {
        Self {
            hardfork,
            ..Self::default()
        }
    }

    /// Adds extra EIPs.
    #[must_use]
    pub fn with_eips(mut self, eips: impl IntoIterator<Item = u32>) -> Self {
        self.eips.extend(eips);
        self
    }

    /// Parses a config from TOML.
    ///
    /// # Errors
    ///
    /// Returns `EvmError::Config` if the document is malformed.
    pub fn from_toml_str(input: &str) -> Result<Self, EvmError> {
        toml::from_str(input).map_err(|e| EvmError::Config(e.to_string()))
    }

    /// Parses a config from JSON.
    ///
    /// # Errors
    ///
    /// Returns `EvmError::Config` if the document is malformed.
    pub fn from_json_str(input: &str) -> Result<Self, EvmError> {
        serde_json::from_str(input).map_err(|e| EvmError::Config(e.to_string()))
    }
}

// =============================================================================
// GAS SCHEDULE
// =============================================================================

/// Every fee, refund and limit that depends on the rule-set.
///
/// Values that EIP-2929 adjusts (SSTORE tiers, base fees of account
/// access opcodes) are already adjusted here.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct GasSchedule {
    pub exp_byte: u64,
    pub keccak256_word: u64,
    pub copy: u64,
    pub memory: u64,
    pub quad_coeff_div: u64,

    pub balance: u64,
    pub ext_code_size: u64,
    pub ext_code_copy: u64,
    pub ext_code_hash: u64,
    pub sload: u64,
    pub call: u64,
    pub staticcall: u64,
    pub selfdestruct: u64,

    pub cold_sload: u64,
    pub cold_account_access: u64,
    pub warm_storage_read: u64,

    /// Legacy SSTORE.
    pub sstore_set: u64,
    pub sstore_reset: u64,
    pub sstore_refund: u64,

    /// EIP-1283 SSTORE.
    pub net_sstore_noop: u64,
    pub net_sstore_init: u64,
    pub net_sstore_clean: u64,
    pub net_sstore_dirty: u64,
    pub net_sstore_clear_refund: u64,
    pub net_sstore_reset_refund: u64,
    pub net_sstore_reset_clear_refund: u64,

    /// EIP-2200 SSTORE.
    pub sstore_sentry: u64,
    pub sstore_noop: u64,
    pub sstore_init: u64,
    pub sstore_clean: u64,
    pub sstore_dirty: u64,
    pub sstore_clear_refund: u64,
    pub sstore_init_refund: u64,
    pub sstore_clean_refund: u64,

    pub log: u64,
    pub log_data: u64,
    pub log_topic: u64,

    pub create: u64,
    pub create_data: u64,
    pub keccak256_word_create2: u64,
    pub init_code_word: u64,

    pub call_stipend: u64,
    pub call_value_transfer: u64,
    pub call_new_account: u64,
    pub selfdestruct_refund: u64,

    /// Divisor of gas used that caps the refund.
    pub max_refund_quotient: u64,
    pub max_code_size: usize,
    pub max_init_code_size: usize,
}

impl GasSchedule {
    /// Resolves the schedule for a hardfork plus active EIPs.
    #[must_use]
    pub fn resolve(hardfork: Hardfork, eips: &BTreeSet<u32>) -> Self {
        let tangerine = hardfork >= Hardfork::TangerineWhistle;
        let istanbul = hardfork >= Hardfork::Istanbul;
        let access_lists = eips.contains(&2929);
        let reduced_refunds = eips.contains(&3529);

        let pick = |legacy: u64, tw: u64, ist: u64| {
            if access_lists {
                0
            } else if istanbul {
                ist
            } else if tangerine {
                tw
            } else {
                legacy
            }
        };

        let cold_sload = 2100;
        let warm = 100;
        let sstore_reset = 5000;
        let sstore_init = 20000;

        let mut gas = Self {
            exp_byte: if hardfork >= Hardfork::SpuriousDragon { 50 } else { 10 },
            keccak256_word: 6,
            copy: 3,
            memory: 3,
            quad_coeff_div: 512,

            balance: pick(20, 400, 700),
            ext_code_size: pick(20, 700, 700),
            ext_code_copy: pick(20, 700, 700),
            ext_code_hash: pick(400, 400, 700),
            sload: pick(50, 200, 800),
            call: pick(40, 700, 700),
            staticcall: pick(700, 700, 700),
            selfdestruct: if tangerine { 5000 } else { 0 },

            cold_sload,
            cold_account_access: 2600,
            warm_storage_read: warm,

            sstore_set: sstore_init,
            sstore_reset,
            sstore_refund: 15000,

            net_sstore_noop: 200,
            net_sstore_init: sstore_init,
            net_sstore_clean: sstore_reset,
            net_sstore_dirty: 200,
            net_sstore_clear_refund: 15000,
            net_sstore_reset_refund: 4800,
            net_sstore_reset_clear_refund: 19800,

            sstore_sentry: 2300,
            sstore_noop: 800,
            sstore_init,
            sstore_clean: sstore_reset,
            sstore_dirty: 800,
            sstore_clear_refund: if reduced_refunds { 4800 } else { 15000 },
            sstore_init_refund: 19200,
            sstore_clean_refund: 4200,

            log: 375,
            log_data: 8,
            log_topic: 375,

            create: 32000,
            create_data: 200,
            keccak256_word_create2: 6,
            init_code_word: 2,

            call_stipend: 2300,
            call_value_transfer: 9000,
            call_new_account: 25000,
            selfdestruct_refund: if reduced_refunds { 0 } else { 24000 },

            max_refund_quotient: if reduced_refunds { 5 } else { 2 },
            max_code_size: 24576,
            max_init_code_size: 49152,
        };

        if access_lists {
            gas.sstore_noop = warm;
            gas.sstore_dirty = warm;
            gas.sstore_clean = sstore_reset - cold_sload;
            gas.sstore_init_refund = sstore_init - warm;
            gas.sstore_clean_refund = sstore_reset - cold_sload - warm;
        }
        gas
    }
}

// =============================================================================
// RULE SET
// =============================================================================

/// Resolved, immutable rule-set of one VM instance.
#[derive(Clone, Debug)]
pub struct RuleSet {
    hardfork: Hardfork,
    eips: BTreeSet<u32>,
    gas: GasSchedule,
    config: VmConfig,
}

impl RuleSet {
    /// Resolves a config.
    ///
    /// # Errors
    ///
    /// Returns `EvmError::Config` for unknown EIPs, missing required EIPs,
    /// or EIP 2315 combined with 1153/5656 (they share opcodes 0x5c-0x5e).
    pub fn new(config: VmConfig) -> Result<Self, EvmError> {
        let mut eips = config.hardfork.implied_eips();
        for eip in &config.eips {
            if !SUPPORTED_EIPS.iter().any(|(supported, _)| supported == eip) {
                return Err(EvmError::Config(format!("EIP-{eip} is not supported")));
            }
            eips.insert(*eip);
        }
        for (eip, requires) in SUPPORTED_EIPS {
            if !eips.contains(eip) {
                continue;
            }
            if let Some(missing) = requires.iter().find(|r| !eips.contains(r)) {
                return Err(EvmError::Config(format!(
                    "EIP-{eip} requires EIP-{missing}"
                )));
            }
        }
        if eips.contains(&2315) && (eips.contains(&1153) || eips.contains(&5656)) {
            return Err(EvmError::Config(
                "EIP-2315 conflicts with EIP-1153/EIP-5656 on opcodes 0x5c-0x5e".into(),
            ));
        }
        if config.stack_limit == 0 {
            return Err(EvmError::Config("stack_limit must be positive".into()));
        }

        let gas = GasSchedule::resolve(config.hardfork, &eips);
        Ok(Self {
            hardfork: config.hardfork,
            eips,
            gas,
            config,
        })
    }

    /// Active hardfork.
    #[must_use]
    pub fn hardfork(&self) -> Hardfork {
        self.hardfork
    }

    /// Returns true if the active hardfork is `hardfork` or later.
    #[must_use]
    pub fn gte(&self, hardfork: Hardfork) -> bool {
        self.hardfork >= hardfork
    }

    /// Returns true if `eip` is active.
    #[must_use]
    pub fn is_activated(&self, eip: u32) -> bool {
        self.eips.contains(&eip)
    }

    /// Active EIPs in ascending order.
    #[must_use]
    pub fn eips(&self) -> &BTreeSet<u32> {
        &self.eips
    }

    /// Resolved gas schedule.
    #[must_use]
    pub fn gas(&self) -> &GasSchedule {
        &self.gas
    }

    /// The config this rule-set was resolved from.
    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Chain id pushed by CHAINID.
    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Deployed code size ceiling, if one applies.
    #[must_use]
    pub fn max_code_size(&self) -> Option<usize> {
        (self.gte(Hardfork::SpuriousDragon) && !self.config.allow_unlimited_contract_size)
            .then_some(self.gas.max_code_size)
    }

    /// Init code size ceiling, if one applies.
    #[must_use]
    pub fn max_init_code_size(&self) -> Option<usize> {
        (self.is_activated(3860) && !self.config.allow_unlimited_init_code_size)
            .then_some(self.gas.max_init_code_size)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        let config = VmConfig::default();
        let eips = config.hardfork.implied_eips();
        let gas = GasSchedule::resolve(config.hardfork, &eips);
        Self {
            hardfork: config.hardfork,
            eips,
            gas,
            config,
        }
    }
}
