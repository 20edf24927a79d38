//! # EVM Stack
//!
//! Bounded LIFO container of 256-bit words, one per call frame.
//!
//! Values are fixed-width [`U256`], so the "does not fit 256 bits" check of
//! an arbitrary-precision stack is enforced by the type itself. Every
//! multi-element operation checks its depth before touching the stack, so
//! a failed operation leaves the frame's stack as it was.

use crate::domain::value_objects::U256;
use crate::errors::VmError;

/// Default stack height bound.
pub const MAX_STACK_SIZE: usize = 1024;

/// Operand stack of one interpreter run.
#[derive(Clone, Debug)]
pub struct Stack {
    words: Vec<U256>,
    limit: usize,
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

impl Stack {
    /// Empty stack bounded at [`MAX_STACK_SIZE`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(MAX_STACK_SIZE)
    }

    /// Empty stack bounded at `limit`.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            words: Vec::with_capacity(limit.min(64)),
            limit,
        }
    }

    /// Current height.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True when nothing is on the stack.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Vector index of the element `depth` places below the top.
    fn index_from_top(&self, depth: usize) -> Result<usize, VmError> {
        self.words
            .len()
            .checked_sub(depth + 1)
            .ok_or(VmError::StackUnderflow)
    }

    /// # Errors
    ///
    /// `StackOverflow` once the height bound is reached.
    pub fn push(&mut self, value: U256) -> Result<(), VmError> {
        if self.words.len() >= self.limit {
            return Err(VmError::StackOverflow);
        }
        self.words.push(value);
        Ok(())
    }

    /// # Errors
    ///
    /// `StackUnderflow` on an empty stack.
    pub fn pop(&mut self) -> Result<U256, VmError> {
        self.words.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pops `N` operands, top of stack first.
    ///
    /// # Errors
    ///
    /// `StackUnderflow` if fewer than `N` values are present; nothing is popped.
    pub fn pop_n<const N: usize>(&mut self) -> Result<[U256; N], VmError> {
        let operands = self.peek_n::<N>()?;
        self.words.truncate(self.words.len() - N);
        Ok(operands)
    }

    /// Copies the top `N` operands, top of stack first.
    ///
    /// # Errors
    ///
    /// `StackUnderflow` if fewer than `N` values are present.
    pub fn peek_n<const N: usize>(&self) -> Result<[U256; N], VmError> {
        if N > 0 {
            self.index_from_top(N - 1)?;
        }
        let mut operands = [U256::zero(); N];
        operands
            .iter_mut()
            .zip(self.words.iter().rev())
            .for_each(|(slot, word)| *slot = *word);
        Ok(operands)
    }

    /// Value `depth` places below the top (0 = top).
    ///
    /// # Errors
    ///
    /// `StackUnderflow` if the stack is not that deep.
    pub fn peek_at(&self, depth: usize) -> Result<U256, VmError> {
        Ok(self.words[self.index_from_top(depth)?])
    }

    /// SWAPn: exchanges the top with the element `n` below it.
    ///
    /// # Errors
    ///
    /// `StackUnderflow` if `n` is zero or the stack holds `n` or fewer values.
    pub fn swap(&mut self, n: usize) -> Result<(), VmError> {
        if n == 0 {
            return Err(VmError::StackUnderflow);
        }
        let below = self.index_from_top(n)?;
        let top = self.words.len() - 1;
        self.words.swap(top, below);
        Ok(())
    }

    /// DUPn: pushes a copy of the `n`-th element (1 = top).
    ///
    /// # Errors
    ///
    /// `StackUnderflow` if `n` is zero or too deep, `StackOverflow` if full.
    pub fn dup(&mut self, n: usize) -> Result<(), VmError> {
        let depth = n.checked_sub(1).ok_or(VmError::StackUnderflow)?;
        let value = self.peek_at(depth)?;
        self.push(value)
    }

    /// Stack contents, bottom first.
    #[must_use]
    pub fn as_slice(&self) -> &[U256] {
        &self.words
    }
}

// =============================================================================
// TESTS
// =============================================================================
