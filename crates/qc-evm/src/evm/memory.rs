//! # EVM Memory
//!
//! Byte-addressable scratch buffer of one call frame.
//!
//! Memory grows in 32-byte words and never shrinks. Gas for growth is
//! metered by the gas model before the interpreter calls [`Memory::extend`],
//! so this type only tracks bytes.

use crate::errors::VmError;

/// Word size in bytes (32 bytes = 256 bits).
pub const WORD_SIZE: usize = 32;

/// Frame-local linear memory.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Creates a new empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Returns the current memory size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if memory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Grows memory so that `[offset, offset + size)` is addressable.
    ///
    /// A zero `size` never grows memory. The new length is rounded up to
    /// the next word boundary and the added bytes are zero.
    ///
    /// # Errors
    ///
    /// Returns `OutOfGas` if the end offset does not fit the address space.
    pub fn extend(&mut self, offset: usize, size: usize) -> Result<(), VmError> {
        if size == 0 {
            return Ok(());
        }
        let end = offset.checked_add(size).ok_or(VmError::OutOfGas)?;
        let words = end.div_ceil(WORD_SIZE);
        let new_len = words.checked_mul(WORD_SIZE).ok_or(VmError::OutOfGas)?;
        if new_len > self.data.len() {
            self.data.resize(new_len, 0);
        }
        Ok(())
    }

    /// Writes `value` at `offset`.
    ///
    /// The range must already be inside the buffer and `value` must be
    /// exactly `size` bytes long.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` on a length mismatch or a write past the end.
    pub fn write(&mut self, offset: usize, size: usize, value: &[u8]) -> Result<(), VmError> {
        if size == 0 {
            return Ok(());
        }
        if value.len() != size {
            return Err(VmError::OutOfRange);
        }
        let end = offset.checked_add(size).ok_or(VmError::OutOfRange)?;
        let dest = self.data.get_mut(offset..end).ok_or(VmError::OutOfRange)?;
        dest.copy_from_slice(value);
        Ok(())
    }

    /// Reads exactly `size` bytes starting at `offset`.
    ///
    /// Bytes past the end of the buffer read as zero.
    #[must_use]
    pub fn read(&self, offset: usize, size: usize) -> Vec<u8> {
        let mut out = vec![0u8; size];
        if offset < self.data.len() {
            let available = (self.data.len() - offset).min(size);
            out[..available].copy_from_slice(&self.data[offset..offset + available]);
        }
        out
    }

    /// Copies `size` bytes from `src` to `dst` within memory (MCOPY).
    ///
    /// Overlapping ranges behave as if the source were copied to a
    /// temporary buffer first. Both ranges must already be in bounds.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if either range is past the end.
    pub fn copy_within(&mut self, dst: usize, src: usize, size: usize) -> Result<(), VmError> {
        if size == 0 {
            return Ok(());
        }
        let src_end = src.checked_add(size).ok_or(VmError::OutOfRange)?;
        let dst_end = dst.checked_add(size).ok_or(VmError::OutOfRange)?;
        if src_end > self.data.len() || dst_end > self.data.len() {
            return Err(VmError::OutOfRange);
        }
        self.data.copy_within(src..src_end, dst);
        Ok(())
    }

    /// Get a reference to the underlying data.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

// =============================================================================
// TESTS
// =============================================================================
