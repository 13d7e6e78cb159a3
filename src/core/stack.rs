use super::params::*;
use super::ExecError;
use crate::common::U256;

pub struct Stack {
    stack: Vec<U256>,
}

impl Stack {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(32),
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    #[inline(always)]
    pub fn push(&mut self, val: U256) -> Result<(), ExecError> {
        if self.stack.len() == MAX_STACK_DEPTH {
            return Err(ExecError::StackOverflow)
        }
        self.stack.push(val);
        Ok(())
    }

    #[inline(always)]
    pub fn dup(&mut self, pos: usize) -> Result<(), ExecError> {
        let top = self.stack.len();
        if pos == 0 || pos > top {
            return Err(ExecError::StackUnderflow)
        }
        self.push(self.stack[top - pos])
    }

    #[inline(always)]
    pub fn swap(&mut self, pos: usize) -> Result<(), ExecError> {
        let top = self.stack.len();
        if pos + 1 > top {
            return Err(ExecError::StackUnderflow)
        }
        self.stack.swap(top - 1, top - 1 - pos);
        Ok(())
    }

    #[inline(always)]
    pub fn consume1(&mut self) -> Result<U256, ExecError> {
        self.stack.pop().ok_or(ExecError::StackUnderflow)
    }

    #[inline(always)]
    pub fn consume2(&mut self) -> Result<(U256, U256), ExecError> {
        if self.stack.len() < 2 {
            return Err(ExecError::StackUnderflow)
        }
        Ok((self.consume1()?, self.consume1()?))
    }

    #[inline(always)]
    pub fn consume3(&mut self) -> Result<(U256, U256, U256), ExecError> {
        if self.stack.len() < 3 {
            return Err(ExecError::StackUnderflow)
        }
        Ok((self.consume1()?, self.consume1()?, self.consume1()?))
    }

    #[inline(always)]
    pub fn consume4(&mut self) -> Result<(U256, U256, U256, U256), ExecError> {
        if self.stack.len() < 4 {
            return Err(ExecError::StackUnderflow)
        }
        Ok((
            self.consume1()?,
            self.consume1()?,
            self.consume1()?,
            self.consume1()?,
        ))
    }
}

#[test]
fn test_stack_order() {
    let mut s = Stack::new();
    for i in 1..=4u64 {
        s.push(i.into()).unwrap();
    }
    // top of the stack comes first
    let (a, b) = s.consume2().unwrap();
    assert_eq!((a, b), (4.into(), 3.into()));
    s.dup(2).unwrap();
    assert_eq!(s.len(), 3);
    s.swap(2).unwrap();
    assert_eq!(s.consume1().unwrap(), 1.into());
    assert!(s.consume3().is_err());
    assert_eq!(s.len(), 2);
}
