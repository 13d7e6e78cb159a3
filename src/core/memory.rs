use super::params::*;
use super::ExecError;
use crate::common::{checked_as_u64, Gas, U256};

pub struct Memory {
    space: Vec<u8>,
    last_gas: Gas,
}

impl Memory {
    #[inline(always)]
    pub fn to_word_size(size: u64) -> u64 {
        if size > u64::MAX - 31 {
            (u64::MAX >> 5) + 1
        } else {
            (size + 31) >> 5
        }
    }

    pub fn new() -> Self {
        Self {
            space: Vec::new(),
            last_gas: 0,
        }
    }

    /// Validate a memory region given by stack operands. Zero-length regions never touch memory
    /// (their offset is ignored) and yield `None`.
    #[inline(always)]
    pub fn region(off: U256, len: U256) -> Result<Option<(usize, usize)>, ExecError> {
        if len.is_zero() {
            return Ok(None)
        }
        let off = checked_as_u64(&off).ok_or(ExecError::OutOfMemory)?;
        let len = checked_as_u64(&len).ok_or(ExecError::OutOfMemory)?;
        let end = off.checked_add(len).ok_or(ExecError::OutOfMemory)?;
        if end > MAX_MEM_SIZE {
            return Err(ExecError::OutOfMemory)
        }
        Ok(Some((off as usize, len as usize)))
    }

    /// Gas to be charged if memory grows to cover `end` bytes. Nothing is allocated.
    #[inline(always)]
    pub fn expansion_gas(&self, end: usize) -> Gas {
        if end <= self.space.len() {
            return 0
        }
        let words = Self::to_word_size(end as u64) as u128;
        let total = words * GAS_MEM_RESIZE_WORD as u128 +
            words * words / QUAD_COEF_DIV as u128;
        let total = u64::try_from(total).unwrap_or(u64::MAX);
        total - self.last_gas
    }

    /// Grow memory to cover `end` bytes (rounded up to a word), must be preceded by charging
    /// `expansion_gas(end)`.
    #[inline(always)]
    pub fn grow(&mut self, end: usize) {
        if end <= self.space.len() {
            return
        }
        let fee = self.expansion_gas(end);
        let words = Self::to_word_size(end as u64) as usize;
        self.space.resize(words << 5, 0);
        self.last_gas += fee;
    }

    #[inline(always)]
    pub fn slice(&self, off: usize, len: usize) -> &[u8] {
        &self.space[off..off + len]
    }

    #[inline(always)]
    pub fn slice_mut(&mut self, off: usize, len: usize) -> &mut [u8] {
        &mut self.space[off..off + len]
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.space.len()
    }
}

#[test]
fn test_memory_expansion_gas() {
    let mut m = Memory::new();
    assert_eq!(Memory::region(1000.into(), U256::zero()).unwrap(), None);
    assert!(Memory::region(U256::MAX, U256::one()).is_err());
    let (off, len) = Memory::region(0.into(), 32.into()).unwrap().unwrap();
    assert_eq!(m.expansion_gas(off + len), 3);
    m.grow(off + len);
    assert_eq!(m.len(), 32);
    // already covered
    assert_eq!(m.expansion_gas(20), 0);
    // one more word: 2 * 3 + 4 / 512 - 3
    assert_eq!(m.expansion_gas(33), 3);
    m.grow(33);
    assert_eq!(m.len(), 64);
}
