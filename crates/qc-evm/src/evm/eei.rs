//! # Environment Interface
//!
//! Host operations the interpreter reaches through the VM: balances, block
//! hashes, logs, nested calls and creations, self-destruct.
//!
//! Nested frames are dispatched through [`Evm::execute_message`], which
//! checkpoints, runs and commits or reverts the child. The interpreter only
//! folds the child's outcome back into its own frame here.
//!
//! [`Evm::execute_message`]: crate::evm::engine::Evm::execute_message

use crate::domain::entities::{Log, Message};
use crate::domain::value_objects::{Address, Bytes, Hash, U256};
use crate::errors::{Fault, VmError};
use crate::evm::interpreter::{to_usize, Interpreter};
use crate::ports::outbound::StateBackend;
use tracing::debug;

/// Window of past blocks BLOCKHASH can see.
const BLOCKHASH_WINDOW: u64 = 256;

/// Flavor of a nested message call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// Plain CALL: runs the target's code in the target's context.
    Call,
    /// CALLCODE: runs the target's code in the caller's context.
    CallCode,
    /// DELEGATECALL: like CALLCODE, keeping caller and value.
    DelegateCall,
    /// STATICCALL: plain call that may not modify state.
    StaticCall,
}

impl<B: StateBackend> Interpreter<'_, B> {
    // =========================================================================
    // ENVIRONMENT
    // =========================================================================

    /// Current balance of `address`, zero if it does not exist.
    pub(crate) async fn balance_of(&mut self, address: Address) -> Result<U256, Fault> {
        Ok(self.evm.state.get_account_or_default(address).await?.balance)
    }

    /// Hash of block `number` if it is one of the 256 before the current one.
    pub(crate) async fn block_hash(&self, number: U256) -> U256 {
        let current = self.evm.block.number;
        if number >= U256::from(current) {
            return U256::zero();
        }
        let number = number.as_u64();
        if current - number > BLOCKHASH_WINDOW {
            return U256::zero();
        }
        self.evm
            .block_hashes
            .get_block_hash(number)
            .await
            .map_or_else(U256::zero, |hash| hash.to_word())
    }

    pub(crate) fn log(&mut self, topics: Vec<Hash>, data: Vec<u8>) {
        self.run.logs.push(Log {
            address: self.env.address,
            topics,
            data: Bytes::from(data),
        });
    }

    // =========================================================================
    // NESTED FRAMES
    // =========================================================================

    /// Runs a nested call and returns the status word pushed by the opcode.
    pub(crate) async fn call(
        &mut self,
        kind: CallKind,
        gas_limit: u64,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> Result<U256, Fault> {
        let env = &self.env;
        let mut message = Message {
            gas_limit,
            data,
            depth: env.depth + 1,
            is_static: env.is_static,
            ..Message::default()
        };
        match kind {
            CallKind::Call => {
                message.caller = env.address;
                message.to = Some(target);
                message.value = value;
            }
            CallKind::CallCode => {
                message.caller = env.address;
                message.to = Some(env.address);
                message.code_address = Some(target);
                message.value = value;
            }
            CallKind::DelegateCall => {
                message.caller = env.caller;
                message.to = Some(env.address);
                message.code_address = Some(target);
                message.value = env.call_value;
                message.delegatecall = true;
            }
            CallKind::StaticCall => {
                message.caller = env.address;
                message.to = Some(target);
                message.is_static = true;
            }
        }
        self.base_call(message).await
    }

    async fn base_call(&mut self, mut message: Message) -> Result<U256, Fault> {
        self.run.return_data = Bytes::new();

        if !self.can_send(message.depth, message.value, message.delegatecall).await? {
            return Ok(U256::zero());
        }

        message.selfdestruct = self.run.selfdestruct.clone();
        message.gas_refund = self.evm.refund;
        let result = self.evm.execute_message(message).await?;
        let exec = result.exec;

        self.run.logs.extend(exec.logs);
        self.use_gas(exec.execution_gas_used)?;

        if exec.exception_error.map_or(true, |error| error.keeps_return_data()) {
            self.run.return_data = exec.return_value;
        }
        if exec.exception_error.is_none() {
            self.run.selfdestruct.extend(exec.selfdestruct);
            return Ok(U256::one());
        }
        Ok(U256::zero())
    }

    /// Depth and balance gate shared by calls and creations.
    async fn can_send(&mut self, depth: usize, value: U256, delegatecall: bool) -> Result<bool, Fault> {
        if depth >= self.rules.config().max_call_depth {
            debug!(depth, "nested message refused: call depth exceeded");
            return Ok(false);
        }
        if !delegatecall && self.balance_of(self.env.address).await? < value {
            debug!(address = %self.env.address, "nested message refused: insufficient balance");
            return Ok(false);
        }
        Ok(true)
    }

    /// Runs a CREATE / CREATE2 and returns the new address as a word, or zero.
    pub(crate) async fn create(
        &mut self,
        gas_limit: u64,
        value: U256,
        data: Bytes,
        salt: Option<Hash>,
    ) -> Result<U256, Fault> {
        self.run.return_data = Bytes::new();
        let depth = self.env.depth + 1;

        if !self.can_send(depth, value, false).await? {
            return Ok(U256::zero());
        }

        let address = self.env.address;
        let account = self.evm.state.get_account_or_default(address).await?;
        if account.nonce == u64::MAX {
            return Ok(U256::zero());
        }
        self.evm
            .state
            .modify_account_fields(address, |account| account.nonce += 1)
            .await?;

        if let Some(max) = self.rules.max_init_code_size() {
            if data.len() > max {
                return Ok(U256::zero());
            }
        }

        let message = Message {
            caller: address,
            gas_limit,
            value,
            data,
            salt,
            depth,
            selfdestruct: self.run.selfdestruct.clone(),
            gas_refund: self.evm.refund,
            ..Message::default()
        };
        let result = self.evm.execute_message(message).await?;
        let exec = result.exec;

        self.run.logs.extend(exec.logs);
        self.use_gas(exec.execution_gas_used)?;

        match exec.exception_error {
            Some(VmError::Revert) => {
                self.run.return_data = exec.return_value;
                Ok(U256::zero())
            }
            None | Some(VmError::CodeStoreOutOfGas) => {
                self.run.selfdestruct.extend(exec.selfdestruct);
                Ok(result
                    .created_address
                    .map_or_else(U256::zero, |created| created.to_word()))
            }
            Some(_) => Ok(U256::zero()),
        }
    }

    /// Copies a nested call's return data into the caller's output region.
    pub(crate) fn write_call_output(&mut self, offset: U256, len: U256) -> Result<(), Fault> {
        if self.run.return_data.is_empty() || len.is_zero() {
            return Ok(());
        }
        let len = to_usize(len)?.min(self.run.return_data.len());
        let data = self.run.return_data.as_slice()[..len].to_vec();
        self.memory_write(offset, &data)
    }

    /// Schedules the executing account for deletion and moves its balance.
    ///
    /// Always ends the frame with a successful halt.
    pub(crate) async fn selfdestruct(&mut self, beneficiary: Address) -> Result<(), Fault> {
        let address = self.env.address;
        if !self.run.selfdestruct.contains_key(&address) {
            let refund = self.rules.gas().selfdestruct_refund;
            self.refund_gas(refund);
        }
        self.run.selfdestruct.insert(address, beneficiary);

        let mut account = self.evm.state.get_account_or_default(address).await?;
        if beneficiary != address {
            let mut target = self.evm.state.get_account_or_default(beneficiary).await?;
            target.balance = target
                .balance
                .checked_add(account.balance)
                .ok_or(VmError::ValueOverflow)?;
            self.evm.state.put_account(beneficiary, target);
        }
        account.balance = U256::zero();
        self.evm.state.put_account(address, account);

        Err(VmError::Stop.into())
    }
}
