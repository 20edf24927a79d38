//! # VM Orchestrator
//!
//! [`Evm`] owns everything that outlives a single frame: the resolved
//! rule-set and dispatch table, the precompile registry, the checkpointed
//! state caches, the warm sets, transient storage and the refund counter.
//!
//! ## Message lifecycle
//!
//! ```text
//! execute_message
//!   ├─ before_message hook
//!   ├─ checkpoint (state, access list, transient storage)
//!   ├─ call path   : move value, load code, run precompile or interpreter
//!   │  create path : move value, derive address, run init code, deposit code
//!   ├─ error  → restore refund, drop self-destructs and logs, revert
//!   │  success → commit
//!   └─ after_message hook
//! ```
//!
//! Machine traps never leave `execute_message` as `Err`; they are carried in
//! the returned [`ExecResult`]. Only host failures ([`EvmError`]) propagate.

use crate::config::{Hardfork, RuleSet, VmConfig};
use crate::domain::entities::{
    BlockContext, EvmResult, ExecResult, Message, SelfDestructSet, TxContext, EMPTY_CODE_HASH,
};
use crate::domain::services::{generate_address, generate_address2};
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, U256};
use crate::errors::{EvmError, StateError, VmError};
use crate::evm::eof;
use crate::evm::interpreter::{Env, Interpreter};
use crate::evm::opcodes::{CustomOpcode, OpcodeTable};
use crate::evm::precompiles::{Precompile, PrecompileRegistry};
use crate::evm::transient::TransientStorage;
use crate::ports::outbound::{BlockHashOracle, EvmObserver, NoBlockHashes, StateBackend};
use crate::state::{AccessTracker, StateManager};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, debug_span, instrument, Instrument};

/// Gas limit used when the caller does not give one.
pub const DEFAULT_GAS_LIMIT: u64 = 0xff_ffff;

/// Boxed future of one nested message; boxing breaks the call recursion.
pub type MessageFuture<'a> = Pin<Box<dyn Future<Output = Result<EvmResult, EvmError>> + Send + 'a>>;

/// Options of a top-level [`Evm::run_call`].
#[derive(Clone, Debug, Default)]
pub struct RunCallOpts {
    /// Block context; the previous one is kept when `None`.
    pub block: Option<BlockContext>,
    /// Effective gas price (GASPRICE).
    pub gas_price: U256,
    /// Transaction origin; defaults to `caller`.
    pub origin: Option<Address>,
    /// Sender.
    pub caller: Address,
    /// Gas limit; defaults to [`DEFAULT_GAS_LIMIT`].
    pub gas_limit: Option<u64>,
    /// Call target; `None` creates a contract from `data`.
    pub to: Option<Address>,
    /// Value transferred.
    pub value: U256,
    /// Calldata or init code.
    pub data: Bytes,
    /// Code to run instead of the target's stored code.
    pub code: Option<Bytes>,
    /// Call depth of the root message.
    pub depth: usize,
    /// Run the root message as a static call.
    pub is_static: bool,
    /// CREATE2 salt.
    pub salt: Option<Hash>,
    /// Self-destructs carried into the root message.
    pub selfdestruct: SelfDestructSet,
    /// Run as a DELEGATECALL (no value movement).
    pub delegatecall: bool,
    /// Raise the caller's balance to `value` if it is short.
    pub skip_balance: bool,
    /// Declared EIP-2930 access list.
    pub access_list: Vec<(Address, Vec<StorageKey>)>,
}

/// Options of [`Evm::run_code`].
#[derive(Clone, Debug, Default)]
pub struct RunCodeOpts {
    /// Block context; the previous one is kept when `None`.
    pub block: Option<BlockContext>,
    /// Effective gas price (GASPRICE).
    pub gas_price: U256,
    /// Transaction origin (ORIGIN).
    pub origin: Address,
    /// Sender (CALLER).
    pub caller: Address,
    /// Bytecode to run.
    pub code: Bytes,
    /// Calldata.
    pub data: Bytes,
    /// Gas limit; defaults to [`DEFAULT_GAS_LIMIT`].
    pub gas_limit: Option<u64>,
    /// CALLVALUE.
    pub value: U256,
    /// Call depth.
    pub depth: usize,
    /// Disallow state changes.
    pub is_static: bool,
    /// Executing address; zero when `None`.
    pub address: Option<Address>,
    /// Program counter to start at.
    pub pc: usize,
}

/// Embedded EVM over a state backend `B`.
pub struct Evm<B> {
    pub(crate) rules: Arc<RuleSet>,
    pub(crate) opcodes: Arc<OpcodeTable>,
    pub(crate) precompiles: PrecompileRegistry,
    pub(crate) state: StateManager<B>,
    pub(crate) access: AccessTracker,
    pub(crate) transient: TransientStorage,
    pub(crate) block: BlockContext,
    pub(crate) tx: TxContext,
    pub(crate) refund: u64,
    pub(crate) block_hashes: Arc<dyn BlockHashOracle>,
    pub(crate) observer: Option<Arc<dyn EvmObserver>>,
}

/// Code a call resolves to.
enum Program {
    Bytecode(Bytes),
    Native(Arc<dyn Precompile>),
}

impl<B: StateBackend> Evm<B> {
    /// Creates a VM for `config` over `backend`.
    ///
    /// # Errors
    ///
    /// Returns `EvmError::Config` if the config does not resolve to a rule-set.
    pub fn new(config: VmConfig, backend: Arc<B>) -> Result<Self, EvmError> {
        let rules = RuleSet::new(config)?;
        let opcodes = OpcodeTable::new(&rules, &[]);
        let precompiles = PrecompileRegistry::new(&rules);
        debug!(
            hardfork = ?rules.hardfork(),
            eips = ?rules.eips(),
            opcodes = opcodes.len(),
            "evm created"
        );
        Ok(Self {
            rules: Arc::new(rules),
            opcodes: Arc::new(opcodes),
            precompiles,
            state: StateManager::new(backend),
            access: AccessTracker::new(),
            transient: TransientStorage::new(),
            block: BlockContext::default(),
            tx: TxContext::default(),
            refund: 0,
            block_hashes: Arc::new(NoBlockHashes),
            observer: None,
        })
    }

    /// Rebuilds the dispatch table with an extension table applied.
    #[must_use]
    pub fn with_custom_opcodes(mut self, custom: &[CustomOpcode]) -> Self {
        self.opcodes = Arc::new(OpcodeTable::new(&self.rules, custom));
        self
    }

    /// Registers an extra precompile, replacing any at the same address.
    #[must_use]
    pub fn with_precompile(mut self, precompile: Arc<dyn Precompile>) -> Self {
        self.precompiles.register(precompile);
        self
    }

    /// Sets the BLOCKHASH oracle.
    #[must_use]
    pub fn with_block_hashes(mut self, oracle: Arc<dyn BlockHashOracle>) -> Self {
        self.block_hashes = oracle;
        self
    }

    /// Installs an execution observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn EvmObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Active rule-set.
    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Dispatch table in use.
    #[must_use]
    pub fn opcodes(&self) -> &OpcodeTable {
        &self.opcodes
    }

    /// Precompiles in use.
    #[must_use]
    pub fn precompiles(&self) -> &PrecompileRegistry {
        &self.precompiles
    }

    /// Checkpointed state.
    pub fn state(&self) -> &StateManager<B> {
        &self.state
    }

    /// Checkpointed state, for seeding and inspection between runs.
    pub fn state_mut(&mut self) -> &mut StateManager<B> {
        &mut self.state
    }

    /// Block context of the last run.
    #[must_use]
    pub fn block(&self) -> &BlockContext {
        &self.block
    }

    /// Current refund counter.
    #[must_use]
    pub fn refund(&self) -> u64 {
        self.refund
    }

    /// Starts recording every address and slot accessed from now on.
    pub fn enable_access_list_reporting(&mut self) {
        self.access.enable_reporting();
    }

    /// Access list recorded since reporting was enabled.
    #[must_use]
    pub fn access_list(&self) -> Vec<(Address, Vec<StorageKey>)> {
        self.access.access_list()
    }

    // =========================================================================
    // ENTRY POINTS
    // =========================================================================

    /// Runs a top-level message: the state transition of one transaction's
    /// call or creation.
    ///
    /// # Errors
    ///
    /// Returns an error only for host failures; traps are in the result.
    #[instrument(skip(self, opts), fields(caller = %opts.caller, to = ?opts.to, depth = opts.depth))]
    pub async fn run_call(&mut self, opts: RunCallOpts) -> Result<EvmResult, EvmError> {
        if let Some(block) = opts.block {
            self.block = block;
        }
        self.tx = TxContext {
            origin: opts.origin.unwrap_or(opts.caller),
            gas_price: opts.gas_price,
        };
        if opts.depth == 0 {
            self.refund = 0;
        }

        let caller = opts.caller;
        let value = opts.value;
        if opts.skip_balance {
            self.state
                .modify_account_fields(caller, |account| {
                    if account.balance < value {
                        account.balance = value;
                    }
                })
                .await?;
        }
        if opts.depth == 0 {
            self.state
                .modify_account_fields(caller, |account| {
                    account.nonce = account.nonce.saturating_add(1);
                })
                .await?;
        }

        self.access.reset();
        if self.rules.is_activated(2929) {
            self.warm_transaction(opts.to, &opts.access_list);
        }

        let message = Message {
            to: opts.to,
            value,
            caller,
            gas_limit: opts.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT),
            data: opts.data,
            depth: opts.depth,
            code: opts.code,
            is_static: opts.is_static,
            salt: opts.salt,
            selfdestruct: opts.selfdestruct,
            delegatecall: opts.delegatecall,
            gas_refund: self.refund,
            ..Message::default()
        };
        let result = self.execute_message(message).await?;

        if self.rules.gte(Hardfork::SpuriousDragon) {
            self.state.cleanup_touched_accounts().await?;
            self.state.flush().await?;
        } else {
            self.state.clear_touched();
        }
        self.transient.clear();

        debug!(
            gas_used = result.exec.execution_gas_used,
            error = ?result.exec.exception_error,
            "call finished"
        );
        Ok(result)
    }

    /// Runs bytecode directly, without value transfer.
    ///
    /// The run sits inside one checkpoint that is committed when it ends,
    /// whatever the outcome, so nested frames never commit to depth zero
    /// halfway through.
    ///
    /// # Errors
    ///
    /// Returns an error for host failures or a start `pc` outside the code.
    pub async fn run_code(&mut self, opts: RunCodeOpts) -> Result<ExecResult, EvmError> {
        if let Some(block) = opts.block {
            self.block = block;
        }
        self.tx = TxContext {
            origin: opts.origin,
            gas_price: opts.gas_price,
        };
        let message = Message {
            to: Some(opts.address.unwrap_or(Address::ZERO)),
            value: opts.value,
            caller: opts.caller,
            gas_limit: opts.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT),
            data: opts.data,
            depth: opts.depth,
            code: Some(opts.code),
            is_static: opts.is_static,
            ..Message::default()
        };

        self.checkpoint();
        match self.run_interpreter(&message, opts.pc).await {
            Ok(exec) => {
                self.commit().await?;
                Ok(exec)
            }
            Err(error) => {
                self.revert().await?;
                Err(error)
            }
        }
    }

    /// Warms the always-warm addresses and slots of a transaction (EIP-2929).
    fn warm_transaction(&mut self, to: Option<Address>, access_list: &[(Address, Vec<StorageKey>)]) {
        for (address, keys) in access_list {
            self.access.add_always_warm_address(*address);
            for key in keys {
                self.access.add_always_warm_slot(*address, *key);
            }
        }
        for address in self.precompiles.active_precompiles() {
            self.access.add_always_warm_address(address);
        }
        self.access.add_always_warm_address(self.tx.origin);
        if let Some(to) = to {
            self.access.add_always_warm_address(to);
        }
        if self.rules.is_activated(3651) {
            self.access.add_always_warm_address(self.block.coinbase);
        }
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    /// Runs one message inside its own checkpoint.
    ///
    /// Traps are reported in the result; the parent frame's state is left
    /// as it was if the message failed.
    pub fn execute_message(&mut self, message: Message) -> MessageFuture<'_> {
        let span = debug_span!(
            "message",
            depth = message.depth,
            caller = %message.caller,
            to = ?message.to,
        );
        Box::pin(self.dispatch(message).instrument(span))
    }

    async fn dispatch(&mut self, mut message: Message) -> Result<EvmResult, EvmError> {
        if let Some(observer) = &self.observer {
            observer.before_message(&message);
        }

        if message.is_create() && self.rules.is_activated(2929) {
            message.code = Some(message.data.clone());
            let address = self.creation_address(&message).await?;
            self.access.warm_address(address);
        }

        let old_refund = message.gas_refund;
        self.checkpoint();

        let mut result = if message.is_create() {
            self.execute_create(message).await?
        } else {
            self.execute_call(message).await?
        };

        let error = result.exec.exception_error;
        if error.is_some_and(|error| error != VmError::CodeStoreOutOfGas) {
            self.refund = old_refund;
            result.exec.selfdestruct.clear();
        }
        result.exec.gas_refund = self.refund;

        let legacy_commit =
            error == Some(VmError::CodeStoreOutOfGas) && !self.rules.gte(Hardfork::Homestead);
        if error.is_some() && !legacy_commit {
            result.exec.logs.clear();
            self.revert().await?;
        } else {
            self.commit().await?;
        }

        if let Some(observer) = &self.observer {
            observer.after_message(&result);
        }
        Ok(result)
    }

    fn checkpoint(&mut self) {
        self.state.checkpoint();
        self.access.checkpoint();
        self.transient.checkpoint();
        debug!(depth = self.state.depth(), "checkpoint");
    }

    async fn commit(&mut self) -> Result<(), StateError> {
        debug!(depth = self.state.depth(), "commit");
        self.state.commit().await?;
        self.access.commit()?;
        self.transient.commit()
    }

    async fn revert(&mut self) -> Result<(), StateError> {
        debug!(depth = self.state.depth(), "revert");
        self.state.revert().await?;
        self.access.revert()?;
        self.transient.revert()
    }

    /// Moves `value` out of `caller`, `None` if the balance is short.
    async fn debit(&mut self, caller: Address, value: U256) -> Result<Option<()>, EvmError> {
        let mut account = self.state.get_account_or_default(caller).await?;
        let Some(balance) = account.balance.checked_sub(value) else {
            debug!(%caller, %value, "insufficient balance");
            return Ok(None);
        };
        account.balance = balance;
        self.state.put_account(caller, account);
        Ok(Some(()))
    }

    /// Moves `value` into `address`, `None` on balance overflow.
    async fn credit(&mut self, address: Address, value: U256) -> Result<Option<()>, EvmError> {
        let mut account = self.state.get_account_or_default(address).await?;
        let Some(balance) = account.balance.checked_add(value) else {
            return Ok(None);
        };
        account.balance = balance;
        self.state.put_account(address, account);
        Ok(Some(()))
    }

    async fn execute_call(&mut self, mut message: Message) -> Result<EvmResult, EvmError> {
        if !message.delegatecall {
            let to = message.to.unwrap_or(Address::ZERO);
            if self.debit(message.caller, message.value).await?.is_none() {
                return Ok(trapped(VmError::InsufficientBalance, 0));
            }
            if self.credit(to, message.value).await?.is_none() {
                return Ok(trapped(VmError::ValueOverflow, 0));
            }
        }

        let program = match message.code.clone() {
            Some(code) => Program::Bytecode(code),
            None => {
                let code_address = message.code_address();
                match self.precompiles.get(&code_address) {
                    Some(precompile) => {
                        message.is_compiled = true;
                        Program::Native(precompile)
                    }
                    None => Program::Bytecode(self.state.get_contract_code(code_address).await?),
                }
            }
        };

        let exec = match program {
            Program::Native(precompile) => {
                self.run_precompile(precompile.as_ref(), &message.data, message.gas_limit)
            }
            Program::Bytecode(code) if code.is_empty() => ExecResult::default(),
            Program::Bytecode(code) => {
                message.code = Some(code);
                self.run_interpreter(&message, 0).await?
            }
        };
        Ok(EvmResult {
            created_address: None,
            exec,
        })
    }

    /// Address a creation message deploys to.
    async fn creation_address(&mut self, message: &Message) -> Result<Address, EvmError> {
        let init_code = message.code.as_ref().unwrap_or(&message.data);
        if let Some(salt) = message.salt {
            return Ok(generate_address2(message.caller, salt, init_code.as_slice()));
        }
        let nonce = self.state.get_account_or_default(message.caller).await?.nonce;
        Ok(generate_address(message.caller, nonce.saturating_sub(1)))
    }

    #[allow(clippy::too_many_lines)]
    async fn execute_create(&mut self, mut message: Message) -> Result<EvmResult, EvmError> {
        let gas_limit = message.gas_limit;
        if self.debit(message.caller, message.value).await?.is_none() {
            return Ok(trapped(VmError::InsufficientBalance, 0));
        }

        if let Some(max) = self.rules.max_init_code_size() {
            if message.data.len() > max {
                return Ok(trapped(VmError::InitCodeSizeViolation, gas_limit));
            }
        }

        let init_code = std::mem::take(&mut message.data);
        message.code = Some(init_code.clone());
        let address = self.creation_address(&message).await?;

        if let Some(existing) = self.state.get_account(address).await? {
            if existing.nonce > 0 || existing.code_hash != EMPTY_CODE_HASH {
                debug!(%address, "create collision");
                return Ok(EvmResult {
                    created_address: Some(address),
                    exec: ExecResult::trap(VmError::CreateCollision, gas_limit),
                });
            }
        }

        self.state.clear_contract_storage(address);
        if let Some(observer) = &self.observer {
            observer.new_contract(address, init_code.as_slice());
        }

        let mut account = self.state.get_account_or_default(address).await?;
        if self.rules.gte(Hardfork::SpuriousDragon) {
            account.nonce = account.nonce.saturating_add(1);
        }
        let Some(balance) = account.balance.checked_add(message.value) else {
            return Ok(trapped(VmError::ValueOverflow, 0));
        };
        account.balance = balance;
        self.state.put_account(address, account);
        message.to = Some(address);

        if init_code.is_empty() {
            return Ok(EvmResult {
                created_address: Some(address),
                exec: ExecResult::default(),
            });
        }

        let mut exec = self.run_interpreter(&message, 0).await?;
        let mut codestore_oog = false;

        if exec.is_success() {
            let code = exec.return_value.clone();
            let gas = self.rules.gas();
            let deposit_fee = (code.len() as u64).saturating_mul(gas.create_data);
            let total = exec.execution_gas_used.saturating_add(deposit_fee);
            let size_allowed = self
                .rules
                .max_code_size()
                .map_or(true, |max| code.len() <= max);

            if total <= gas_limit && size_allowed {
                match self.rejected_code(code.as_slice()) {
                    Some(error) => exec = ExecResult::trap(error, gas_limit),
                    None => {
                        exec.execution_gas_used = total;
                        exec.gas_left = gas_limit - total;
                    }
                }
            } else if self.rules.gte(Hardfork::Homestead) {
                let error = if size_allowed {
                    VmError::OutOfGas
                } else {
                    VmError::CodeSizeExceedsMaximum
                };
                debug!(%address, ?error, code_len = code.len(), "code deposit failed");
                exec = ExecResult::trap(error, gas_limit);
            } else if total - deposit_fee <= gas_limit {
                exec.exception_error = Some(VmError::CodeStoreOutOfGas);
                codestore_oog = true;
            } else {
                exec = ExecResult::trap(VmError::OutOfGas, gas_limit);
            }

            if exec.is_success() && !code.is_empty() {
                self.state.put_contract_code(address, code).await?;
            } else if codestore_oog {
                // Frontier keeps the value and nonce; only the code is dropped.
                let account = self.state.get_account_or_default(address).await?;
                self.state.put_account(address, account);
            }
        }

        Ok(EvmResult {
            created_address: Some(address),
            exec,
        })
    }

    /// Trap for deployed code that starts with the reserved EOF byte.
    fn rejected_code(&self, code: &[u8]) -> Option<VmError> {
        if !self.rules.is_activated(3541) || code.first() != Some(&eof::FORMAT) {
            return None;
        }
        if !self.rules.is_activated(3540) {
            return Some(VmError::InvalidBytecodeResult);
        }
        let valid = eof::code_analysis(code).is_some_and(|sections| {
            !self.rules.is_activated(3670)
                || eof::valid_opcodes(sections.code_section(code), &self.opcodes)
        });
        (!valid).then_some(VmError::InvalidEofFormat)
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    /// Runs `message.code` in a fresh frame starting at `pc`.
    pub(crate) async fn run_interpreter(
        &mut self,
        message: &Message,
        pc: usize,
    ) -> Result<ExecResult, EvmError> {
        let env = Env {
            address: message.to.unwrap_or(Address::ZERO),
            caller: message.caller,
            call_data: message.data.clone(),
            call_value: message.value,
            code: message.code.clone().unwrap_or_default(),
            is_static: message.is_static,
            depth: message.depth,
            code_address: message.code_address(),
        };
        let gas_limit = message.gas_limit;
        let result = Interpreter::new(self, env, gas_limit, message.selfdestruct.clone())
            .run(pc)
            .await?;

        let mut exec = ExecResult {
            execution_gas_used: gas_limit.saturating_sub(result.gas_left),
            gas_left: result.gas_left,
            return_value: result.return_value,
            exception_error: result.exception_error,
            logs: result.logs,
            selfdestruct: result.selfdestruct,
            gas_refund: 0,
        };
        if let Some(error) = exec.exception_error {
            if !error.preserves_gas() {
                exec.execution_gas_used = gas_limit;
                exec.gas_left = 0;
            }
            exec.logs.clear();
            exec.selfdestruct.clear();
        }
        exec.gas_refund = self.refund;
        Ok(exec)
    }

    #[instrument(skip(self, precompile, input), fields(address = %precompile.address()))]
    fn run_precompile(&self, precompile: &dyn Precompile, input: &Bytes, gas_limit: u64) -> ExecResult {
        match precompile.execute(input.as_slice(), gas_limit, &self.rules) {
            Ok(output) => ExecResult {
                execution_gas_used: output.gas_used,
                gas_left: gas_limit.saturating_sub(output.gas_used),
                return_value: output.output,
                ..ExecResult::default()
            },
            Err(error) => {
                debug!(%error, "precompile failed");
                ExecResult::trap(error.into(), gas_limit)
            }
        }
    }
}

fn trapped(error: VmError, gas_used: u64) -> EvmResult {
    EvmResult {
        created_address: None,
        exec: ExecResult::trap(error, gas_used),
    }
}

// =============================================================================
// TESTS
// =============================================================================
