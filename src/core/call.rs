use std::sync::Arc;

use log::debug;
use sha3::Digest;

use super::alu;
use super::exec::CallType;
use super::memory::Memory;
use super::params::*;
use super::stack::Stack;
use super::{gas_checked_mul, get_data, ArithMode, ContractCode, ExecError};
use crate::common::{checked_as_u64, Addr, Bytes, Gas, Wei, U256};

pub(super) struct CallFrame {
    /// position of the next instruction
    pub pc: u64,
    pub memory: Memory,
    pub stack: Stack,
    pub code: Arc<ContractCode>,
    /// address of the executing contract
    pub callee: Addr,
    /// address of the caller
    pub caller: Addr,
    pub call_type: CallType,
    input: Box<[u8]>,
    pub value: Wei,
    pub last_returned: Bytes,
    pub unused_gas: Gas,
    pub read_only: bool,
}

macro_rules! make_unary_op {
    ($name: ident, $gas: expr) => {
        #[inline(always)]
        pub fn $name(&mut self) -> Result<(), ExecError> {
            let a = self.stack.consume1()?;
            self.stack.push(alu::$name(a))?;
            self.use_gas($gas)
        }
    };
}

macro_rules! make_binary_op {
    ($name: ident, $gas: expr) => {
        #[inline(always)]
        pub fn $name(&mut self) -> Result<(), ExecError> {
            let (a, b) = self.stack.consume2()?;
            self.stack.push(alu::$name(a, b))?;
            self.use_gas($gas)
        }
    };
}

// arithmetic whose overflow behavior depends on the mode of the executing code
macro_rules! make_arith_op {
    ($name: ident, $checked: ident, $gas: expr) => {
        #[inline(always)]
        pub fn $name(&mut self) -> Result<(), ExecError> {
            self.use_gas($gas)?;
            let (a, b) = self.stack.consume2()?;
            let r = match self.code.arith() {
                ArithMode::Wrapping => alu::$name(a, b),
                ArithMode::Checked => alu::$checked(a, b)
                    .ok_or(ExecError::ArithmeticOverflow)?,
            };
            self.stack.push(r)
        }
    };
}

macro_rules! make_ternary_op {
    ($name: ident, $gas: expr) => {
        #[inline(always)]
        pub fn $name(&mut self) -> Result<(), ExecError> {
            let (a, b, c) = self.stack.consume3()?;
            self.stack.push(alu::$name(a, b, c))?;
            self.use_gas($gas)
        }
    };
}

impl CallFrame {
    #[inline]
    pub fn new(
        code: Arc<ContractCode>, input: Box<[u8]>, value: Wei, callee: Addr,
        caller: Addr, call_type: CallType, gas: Gas, read_only: bool,
    ) -> Self {
        Self {
            pc: 0x0,
            memory: Memory::new(),
            stack: Stack::new(),
            code,
            callee,
            caller,
            call_type,
            input,
            value,
            last_returned: Bytes::empty(),
            unused_gas: gas,
            read_only,
        }
    }

    make_arith_op!(add, checked_add, GAS_FASTEST);
    make_arith_op!(mul, checked_mul, GAS_FAST);
    make_arith_op!(sub, checked_sub, GAS_FASTEST);
    make_binary_op!(div, GAS_FAST);
    make_binary_op!(sdiv, GAS_FAST);
    make_binary_op!(rem, GAS_FAST);
    make_binary_op!(smod, GAS_FAST);
    make_ternary_op!(add_mod, GAS_MID);
    make_ternary_op!(mul_mod, GAS_MID);

    #[inline(always)]
    pub fn exp(&mut self) -> Result<(), ExecError> {
        let (a, b) = self.stack.consume2()?;
        self.use_gas(GAS_EXP)?;
        self.use_gas(gas_checked_mul(
            GAS_EXP_BYTE,
            (b.bits() as u64 + 7) >> 3,
        )?)?;
        let r = match self.code.arith() {
            ArithMode::Wrapping => alu::exp(a, b),
            ArithMode::Checked => {
                alu::checked_exp(a, b).ok_or(ExecError::ArithmeticOverflow)?
            }
        };
        self.stack.push(r)
    }

    make_binary_op!(sign_extend, GAS_FAST);
    make_binary_op!(lt, GAS_FASTEST);
    make_binary_op!(gt, GAS_FASTEST);
    make_binary_op!(slt, GAS_FASTEST);
    make_binary_op!(sgt, GAS_FASTEST);
    make_binary_op!(eq, GAS_FASTEST);
    make_unary_op!(is_zero, GAS_FASTEST);
    make_binary_op!(and, GAS_FASTEST);
    make_binary_op!(or, GAS_FASTEST);
    make_binary_op!(xor, GAS_FASTEST);
    make_unary_op!(not, GAS_FASTEST);
    make_binary_op!(byte, GAS_FASTEST);
    make_binary_op!(shl, GAS_FASTEST);
    make_binary_op!(shr, GAS_FASTEST);
    make_binary_op!(sar, GAS_FASTEST);

    /// Charge for and grow memory to cover the region, returning `None` for empty regions.
    #[inline(always)]
    pub fn mem_region(
        &mut self, off: U256, len: U256,
    ) -> Result<Option<(usize, usize)>, ExecError> {
        let region = Memory::region(off, len)?;
        if let Some((off, len)) = region {
            self.use_gas(self.memory.expansion_gas(off + len))?;
            self.memory.grow(off + len);
        }
        Ok(region)
    }

    #[inline(always)]
    pub fn mem_read(
        &mut self, off: U256, len: U256,
    ) -> Result<Vec<u8>, ExecError> {
        Ok(match self.mem_region(off, len)? {
            Some((off, len)) => self.memory.slice(off, len).to_vec(),
            None => Vec::new(),
        })
    }

    /// Shared implementation of `*COPY` instructions: `src` is right-padded with zeros.
    #[inline(always)]
    pub fn mem_copy_from(
        &mut self, mem_off: U256, src: &[u8], src_off: U256, len: U256,
    ) -> Result<(), ExecError> {
        if let Some((off, len)) = self.mem_region(mem_off, len)? {
            self.use_gas(gas_checked_mul(
                Memory::to_word_size(len as u64),
                GAS_COPY_WORD,
            )?)?;
            let src_off = checked_as_u64(&src_off).unwrap_or(u64::MAX);
            self.memory
                .slice_mut(off, len)
                .copy_from_slice(&get_data(src, src_off, len as u64));
        }
        Ok(())
    }

    #[inline(always)]
    pub fn sha3(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_SHA3)?;
        let (off, len) = self.stack.consume2()?;
        let data = self.mem_read(off, len)?;
        self.use_gas(gas_checked_mul(
            Memory::to_word_size(data.len() as u64),
            GAS_SHA3_WORD,
        )?)?;
        // EVM is big-endian
        self.stack
            .push(U256::from_big_endian(&sha3::Keccak256::digest(&data)))
    }

    #[inline(always)]
    pub fn addr(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_QUICK)?;
        self.stack.push(self.callee.clone().into())
    }

    #[inline(always)]
    pub fn caller(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_QUICK)?;
        self.stack.push(self.caller.clone().into())
    }

    #[inline(always)]
    pub fn call_value(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_QUICK)?;
        self.stack.push(self.value.clone().into())
    }

    #[inline(always)]
    pub fn call_data_load(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_FASTEST)?;
        let data = if let Some(off) = checked_as_u64(&self.stack.consume1()?) {
            U256::from_big_endian(&get_data(&self.input, off, 32))
        } else {
            U256::zero()
        };
        self.stack.push(data)
    }

    #[inline(always)]
    pub fn call_data_size(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_QUICK)?;
        self.stack.push(self.input.len().into())
    }

    #[inline(always)]
    pub fn call_data_copy(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_FASTEST)?;
        let (mem_off, data_off, len) = self.stack.consume3()?;
        let input = std::mem::take(&mut self.input);
        let res = self.mem_copy_from(mem_off, &input, data_off, len);
        self.input = input;
        res
    }

    #[inline(always)]
    pub fn code_size(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_QUICK)?;
        self.stack.push(self.code.as_bytes().len().into())
    }

    #[inline(always)]
    pub fn code_copy(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_FASTEST)?;
        let (mem_off, code_off, len) = self.stack.consume3()?;
        let code = self.code.clone();
        self.mem_copy_from(mem_off, code.as_bytes(), code_off, len)
    }

    #[inline(always)]
    pub fn return_data_size(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_QUICK)?;
        self.stack.push(self.last_returned.len().into())
    }

    #[inline(always)]
    pub fn return_data_copy(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_FASTEST)?;
        let (mem_off, data_off, len) = self.stack.consume3()?;
        // unlike calldatacopy, reading past the end of the return data is an error
        let end = data_off
            .checked_add(len)
            .and_then(|e| checked_as_u64(&e))
            .ok_or(ExecError::ReturnDataOutOfBounds)?;
        if end as usize > self.last_returned.len() {
            return Err(ExecError::ReturnDataOutOfBounds)
        }
        let data = self.last_returned.clone();
        self.mem_copy_from(mem_off, &data, data_off, len)
    }

    #[inline(always)]
    pub fn pop(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_QUICK)?;
        self.stack.consume1().map(|_| ())
    }

    #[inline(always)]
    pub fn mload(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_FASTEST)?;
        let off = self.stack.consume1()?;
        let word = self.mem_read(off, 32.into())?;
        self.stack.push(U256::from_big_endian(&word))
    }

    #[inline(always)]
    pub fn mstore(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_FASTEST)?;
        let (off, val) = self.stack.consume2()?;
        if let Some((off, len)) = self.mem_region(off, 32.into())? {
            val.to_big_endian(self.memory.slice_mut(off, len));
        }
        Ok(())
    }

    #[inline(always)]
    pub fn mstore8(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_FASTEST)?;
        let (off, val) = self.stack.consume2()?;
        if let Some((off, len)) = self.mem_region(off, U256::one())? {
            self.memory.slice_mut(off, len)[0] = val.low_u64() as u8;
        }
        Ok(())
    }

    /// `at` is the position of the `PC` instruction itself.
    #[inline(always)]
    pub fn pc(&mut self, at: u64) -> Result<(), ExecError> {
        self.use_gas(GAS_QUICK)?;
        self.stack.push(at.into())
    }

    #[inline(always)]
    pub fn msize(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_QUICK)?;
        self.stack.push(self.memory.len().into())
    }

    #[inline(always)]
    pub fn gas(&mut self) -> Result<(), ExecError> {
        self.use_gas(GAS_QUICK)?;
        self.stack.push(self.unused_gas.into())
    }

    /// `data` may be shorter than `size` when the code ends in the middle of the immediate, the
    /// missing bytes read as zero.
    #[inline(always)]
    pub fn push(&mut self, data: &[u8], size: usize) -> Result<(), ExecError> {
        if size == 0 {
            self.use_gas(GAS_QUICK)?;
            return self.stack.push(U256::zero())
        }
        self.use_gas(GAS_FASTEST)?;
        // right-aligned, big endian
        let mut word = [0u8; 32];
        let start = 32 - size;
        word[start..start + data.len()].copy_from_slice(data);
        self.stack.push(U256::from_big_endian(&word))
    }

    #[inline(always)]
    pub fn dup(&mut self, pos: usize) -> Result<(), ExecError> {
        self.use_gas(GAS_FASTEST)?;
        self.stack.dup(pos)
    }

    #[inline(always)]
    pub fn swap(&mut self, pos: usize) -> Result<(), ExecError> {
        self.use_gas(GAS_FASTEST)?;
        self.stack.swap(pos)
    }

    #[inline(always)]
    pub fn use_gas(&mut self, gas: Gas) -> Result<(), ExecError> {
        if self.unused_gas < gas {
            debug!("Out of Gas: {} < {}", self.unused_gas, gas);
            return Err(ExecError::OutOfGas)
        }
        self.unused_gas -= gas;
        Ok(())
    }
}
