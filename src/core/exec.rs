use std::sync::Arc;

use log::debug;

use super::call::CallFrame;
use super::memory::Memory;
use super::opcode::Opcode;
use super::params::*;
use super::{
    block_hash_visible, gas_checked_mul, ArithMode, ContractCode, ExecError, Log,
    Snapshot, TxExecEnv, WorldState,
};
use crate::common::{
    checked_as_u64, create_addr, create_addr2, encode_word, Addr, Bytes, Gas,
    Hash, Wei, U256,
};

/// Helper trait that adds funds transfer functions to any [WorldState] objects.
pub trait Transferable {
    fn add_balance(&mut self, addr: &Addr, val: &Wei) -> Option<()>;
    fn sub_balance(&mut self, addr: &Addr, val: &Wei) -> Option<()>;
    /// Moves `val` from `from` to `to`. Either both balances change or none does.
    fn transfer_balance(
        &mut self, from: &Addr, to: &Addr, val: &Wei,
    ) -> Option<()>;
}

impl<T> Transferable for T
where
    T: WorldState + ?Sized,
{
    fn add_balance(&mut self, addr: &Addr, val: &Wei) -> Option<()> {
        let balance = self.get_balance(addr).checked_add(val)?;
        self.set_balance(addr, &balance);
        Some(())
    }

    fn sub_balance(&mut self, addr: &Addr, val: &Wei) -> Option<()> {
        let balance = self.get_balance(addr).checked_sub(val)?;
        self.set_balance(addr, &balance);
        Some(())
    }

    fn transfer_balance(
        &mut self, from: &Addr, to: &Addr, val: &Wei,
    ) -> Option<()> {
        let from_balance = self.get_balance(from).checked_sub(val)?;
        if from == to {
            return Some(())
        }
        let to_balance = self.get_balance(to).checked_add(val)?;
        self.set_balance(from, &from_balance);
        self.set_balance(to, &to_balance);
        Some(())
    }
}

enum TxAux {
    Call,
    Contract(Addr),
}

pub(super) struct TxArgs {
    snapshot: Snapshot,
    aux: TxAux,
}

/// How the caller reacts to a failed callee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CallSite {
    /// The failure aborts the caller as well (and so on up the stack).
    Direct,
    /// The failure is reported to the caller as a zero on the stack.
    Protected,
}

pub(super) struct CallArgs {
    snapshot: Snapshot,
    ret_off: usize,
    ret_len: usize,
    site: CallSite,
}

pub(super) struct CreateArgs {
    snapshot: Snapshot,
    contract_addr: Addr,
}

pub(super) enum CallType {
    Tx(TxArgs),
    Call(CallArgs),
    Create(CreateArgs),
}

/// The result of a transaction execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxExecResult {
    /// The execution finishes with some returned data, the unused gas and, for a contract
    /// creation, the address of the created contract.
    Succeeded(Bytes, Gas, Option<Addr>),
    /// The execution fails with some returned data (revert reason or panic code), the unused gas
    /// and the error. None of its state changes survive.
    Reverted(Bytes, Gas, ExecError),
}

impl TxExecResult {
    pub fn unused_gas(&self) -> Gas {
        match self {
            TxExecResult::Succeeded(_, gas, _) => *gas,
            TxExecResult::Reverted(_, gas, _) => *gas,
        }
    }
}

/// What the interpreter needs to know about a transaction after it has been validated and paid for.
#[derive(Debug, Clone)]
pub struct TxInput {
    pub from: Addr,
    /// `None` for contract creation.
    pub to: Option<Addr>,
    pub value: Wei,
    pub data: Bytes,
    /// Gas available for execution (intrinsic gas already deducted).
    pub gas: Gas,
    pub gas_price: Wei,
    /// Nonce of the transaction, used to derive the address of a created contract.
    pub nonce: u64,
    /// Arithmetic mode of the code deployed by a contract creation.
    pub arithmetic: ArithMode,
}

enum TxExecStatus {
    /// The transaction is still being executed.
    Running,
    /// The transaction finished with the result.
    Finished(TxExecResult),
}

/// Failure details that travel with an error up to the frame that handles it.
struct Fault {
    data: Bytes,
    keep_gas: bool,
}

pub struct TxExecContext<'a, S: WorldState> {
    call_stack: Vec<Box<CallFrame>>,
    /// Top of the contract call stack, not included in `call_stack`
    cur_call: Box<CallFrame>,
    state: &'a mut S,
    fault: Option<Fault>,
    status: TxExecStatus,

    // the following fields are immutable throughout the execution
    origin: Addr,
    gas_price: Wei,
    env: &'a TxExecEnv<'a>,
}

/// Execute a transaction to the end. Nested calls run on an explicit frame stack inside a single
/// loop; the state is left with the effects of the transaction (or none of them if it failed).
pub fn execute<S: WorldState>(
    state: &mut S, env: &TxExecEnv, input: TxInput,
) -> TxExecResult {
    let TxInput {
        from,
        to,
        value,
        data,
        gas,
        gas_price,
        nonce,
        arithmetic,
    } = input;
    let mut ctx = TxExecContext {
        call_stack: Vec::new(),
        // placeholder at the bottom of the stack, never executed
        cur_call: Box::new(CallFrame::new(
            ContractCode::empty(),
            Vec::new().into(),
            Wei::zero().clone(),
            Addr::zero().clone(),
            Addr::zero().clone(),
            CallType::Call(CallArgs {
                snapshot: Snapshot::new(0),
                ret_off: 0,
                ret_len: 0,
                site: CallSite::Protected,
            }),
            gas,
            false,
        )),
        state,
        fault: None,
        status: TxExecStatus::Running,
        origin: from.clone(),
        gas_price,
        env,
    };
    let snapshot = ctx.state.snapshot();
    let res = match to {
        Some(to) => ctx.call_(
            to,
            from,
            data.into_inner().into(),
            gas,
            value,
            CallType::Tx(TxArgs {
                snapshot,
                aux: TxAux::Call,
            }),
        ),
        None => {
            let contract_addr = create_addr(&from, nonce);
            ctx.create_(
                contract_addr.clone(),
                from,
                data.into_inner().into(),
                value,
                gas,
                CallType::Tx(TxArgs {
                    snapshot,
                    aux: TxAux::Contract(contract_addr),
                }),
                arithmetic,
            )
        }
    };
    if let Err(err) = res {
        ctx.status = TxExecStatus::Finished(TxExecResult::Reverted(
            Bytes::empty(),
            gas,
            err,
        ));
    }
    ctx.exec()
}

impl<'a, S: WorldState> TxExecContext<'a, S> {
    #[inline(always)]
    fn balance(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_EXT_ACCOUNT)?;
        let addr = call.stack.consume1()?.into();
        call.stack.push(self.state.get_balance(&addr).into())
    }

    #[inline(always)]
    fn origin(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_QUICK)?;
        call.stack.push(self.origin.clone().into())
    }

    #[inline(always)]
    fn ext_code_size(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_EXT_ACCOUNT)?;
        let addr = call.stack.consume1()?.into();
        let code = self.state.get_code(&addr);
        call.stack.push(code.as_bytes().len().into())
    }

    #[inline(always)]
    fn ext_code_copy(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_EXT_ACCOUNT)?;
        let (addr, mem_off, code_off, len) = call.stack.consume4()?;
        let code = self.state.get_code(&addr.into());
        call.mem_copy_from(mem_off, code.as_bytes(), code_off, len)
    }

    #[inline(always)]
    fn ext_code_hash(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_EXT_ACCOUNT)?;
        let addr = call.stack.consume1()?.into();
        call.stack.push(if self.state.exist(&addr) {
            self.state.get_code(&addr).get_hash().clone().into()
        } else {
            U256::zero()
        })
    }

    #[inline(always)]
    fn block_hash(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_EXT)?;
        let number = call.stack.consume1()?;
        let current = self.env.block.number;
        call.stack.push(match checked_as_u64(&number) {
            Some(n) if block_hash_visible(current, n) => {
                (self.env.block_hash)(n).into()
            }
            _ => U256::zero(),
        })
    }

    #[inline(always)]
    fn gas_price(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_QUICK)?;
        call.stack.push(self.gas_price.clone().into())
    }

    #[inline(always)]
    fn coinbase(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_QUICK)?;
        call.stack.push(self.env.block.coinbase.clone().into())
    }

    #[inline(always)]
    fn timestamp(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_QUICK)?;
        call.stack.push(self.env.block.timestamp.into())
    }

    #[inline(always)]
    fn number(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_QUICK)?;
        call.stack.push(self.env.block.number.into())
    }

    #[inline(always)]
    fn prevrandao(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_QUICK)?;
        call.stack.push(self.env.block.prevrandao.clone().into())
    }

    #[inline(always)]
    fn gas_limit(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_QUICK)?;
        call.stack.push(self.env.block.gas_limit.into())
    }

    #[inline(always)]
    fn chain_id(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_QUICK)?;
        call.stack.push(self.env.chain_id)
    }

    #[inline(always)]
    fn self_balance(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_FAST)?;
        call.stack.push(self.state.get_balance(&call.callee).into())
    }

    #[inline(always)]
    fn base_fee(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_QUICK)?;
        call.stack.push(self.env.block.base_fee)
    }

    #[inline(always)]
    fn sload(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_SLOAD)?;
        let key = call.stack.consume1()?.into();
        call.stack.push(self.state.get_state(&call.callee, &key))
    }

    #[inline(always)]
    fn sstore(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        if call.read_only {
            return Err(ExecError::WriteProtection)
        }
        if call.unused_gas <= GAS_SSTORE_SENTRY {
            // not enough gas for re-entrancy sentry
            return Err(ExecError::OutOfGas)
        }
        let (key, val) = call.stack.consume2()?;
        let key: Hash = key.into();
        let cur = self.state.get_state(&call.callee, &key);
        call.use_gas(if cur.is_zero() && !val.is_zero() {
            GAS_SSTORE_SET
        } else {
            GAS_SSTORE_RESET
        })?;
        self.state.set_state(&call.callee, &key, &val);
        Ok(())
    }

    #[inline(always)]
    fn jump(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_MID)?;
        let dest = call.stack.consume1()?;
        if !call.code.is_valid_jumpdest(&dest) {
            return Err(ExecError::InvalidJump)
        }
        call.pc = dest.as_u64();
        Ok(())
    }

    #[inline(always)]
    fn jumpi(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_SLOW)?;
        let (dest, cond) = call.stack.consume2()?;
        if !cond.is_zero() {
            if !call.code.is_valid_jumpdest(&dest) {
                return Err(ExecError::InvalidJump)
            }
            call.pc = dest.as_u64();
        }
        Ok(())
    }

    #[inline(always)]
    fn log(&mut self, num: usize) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        if call.read_only {
            return Err(ExecError::WriteProtection)
        }
        call.use_gas(GAS_LOG)?;
        call.use_gas(gas_checked_mul(num as u64, GAS_LOG_TOPIC)?)?;
        let (off, length) = call.stack.consume2()?;
        call.use_gas(gas_checked_mul(
            checked_as_u64(&length).ok_or(ExecError::OutOfGas)?,
            GAS_LOG_DATA,
        )?)?;

        let mut topics: Vec<Hash> = Vec::new();
        for _ in 0..num {
            topics.push(call.stack.consume1()?.into());
        }
        let data = call.mem_read(off, length)?;
        self.state.add_log(Log {
            address: call.callee.clone(),
            topics,
            data: data.into(),
        });
        Ok(())
    }

    /// Take the all-but-one-64th share of the remaining gas (capped by `requested`) away from the
    /// current frame so that it can be lent to a child frame.
    #[inline(always)]
    fn forward_gas(&mut self, requested: &U256) -> Result<Gas, ExecError> {
        let call = &mut self.cur_call;
        let cap = call.unused_gas - call.unused_gas / 64;
        let gas = match checked_as_u64(requested) {
            Some(gas) if gas < cap => gas,
            _ => cap,
        };
        call.use_gas(gas)?;
        Ok(gas)
    }

    /// Read the common operands of the call family: input region and output region (the latter
    /// is charged and allocated right away).
    #[inline(always)]
    fn call_io(&mut self) -> Result<(Box<[u8]>, (usize, usize)), ExecError> {
        let call = &mut self.cur_call;
        let (in_off, in_len) = call.stack.consume2()?;
        let (ret_off, ret_len) = call.stack.consume2()?;
        let input = call.mem_read(in_off, in_len)?.into_boxed_slice();
        let ret = call.mem_region(ret_off, ret_len)?.unwrap_or((0, 0));
        Ok((input, ret))
    }

    #[inline(always)]
    fn create_(
        &mut self, contract_addr: Addr, caller: Addr, code: Box<[u8]>,
        value: Wei, gas: Gas, args: CallType, arith: ArithMode,
    ) -> Result<(), ExecError> {
        if self.state.get_nonce(&contract_addr) != 0 ||
            !self.state.get_code(&contract_addr).is_empty()
        {
            // a collision burns the gas lent to the creation
            return self.return_without_callstack(
                args,
                Bytes::empty(),
                0,
                Err(ExecError::ContractAddrCollision),
                false,
            )
        }
        self.state.set_nonce(&contract_addr, 1);
        if self
            .state
            .transfer_balance(&caller, &contract_addr, &value)
            .is_none()
        {
            return self.return_without_callstack(
                args,
                Bytes::empty(),
                gas,
                Err(ExecError::InsufficientBalance),
                true,
            )
        }
        let code = Arc::new(ContractCode::new(code, arith));
        self.enter(
            code,
            Vec::new().into(),
            value,
            contract_addr,
            caller,
            args,
            gas,
            false,
        )
    }

    #[inline(always)]
    fn create_begin(&mut self, salted: bool) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_CREATE)?;
        if call.read_only {
            return Err(ExecError::WriteProtection)
        }

        let (value, off, len) = call.stack.consume3()?;
        let salt = if salted {
            Some(call.stack.consume1()?)
        } else {
            None
        };
        let code = call.mem_read(off, len)?;
        if salted {
            // the init code is hashed to derive the address
            call.use_gas(gas_checked_mul(
                Memory::to_word_size(code.len() as u64),
                GAS_SHA3_WORD,
            )?)?;
        }

        // borrow the gas for the nested call, whose residual will be returned when the nested call
        // is finished
        let gas_quota = call.unused_gas - call.unused_gas / 64;
        call.use_gas(gas_quota)?;

        let caller = call.callee.clone();
        let arith = call.code.arith();
        let value: Wei = value.into();

        let nonce = self.state.get_nonce(&caller);
        if self.call_depth() >= MAX_CALL_DEPTH ||
            self.state.get_balance(&caller) < value ||
            nonce == u64::MAX
        {
            // soft failure: nothing happened, the gas goes back to the caller
            let call = &mut self.cur_call;
            call.unused_gas += gas_quota;
            call.last_returned = Bytes::empty();
            return call.stack.push(U256::zero())
        }
        self.state.set_nonce(&caller, nonce + 1);

        let contract_addr = match salt {
            None => create_addr(&caller, nonce),
            Some(salt) => create_addr2(&caller, &encode_word(&salt), &code),
        };
        let snapshot = self.state.snapshot();
        let args = CallType::Create(CreateArgs {
            snapshot,
            contract_addr: contract_addr.clone(),
        });
        self.create_(
            contract_addr,
            caller,
            code.into_boxed_slice(),
            value,
            gas_quota,
            args,
            arith,
        )
    }

    /// Store the code returned by an init frame, returning the gas left after paying for it.
    #[inline(always)]
    fn deposit_code(
        &mut self, contract_addr: &Addr, data: &Bytes, unused_gas: Gas,
        arith: ArithMode,
    ) -> Result<Gas, ExecError> {
        if data.len() > MAX_CODE_SIZE {
            return Err(ExecError::MaxCodeSizeExceeded)
        }
        if data.first() == Some(&0xef) {
            return Err(ExecError::InvalidCode)
        }
        let cost = gas_checked_mul(data.len() as u64, GAS_CREATE_DATA)?;
        if unused_gas < cost {
            return Err(ExecError::CodeStoreOutOfGas)
        }
        self.state.set_code(
            contract_addr,
            Arc::new(ContractCode::new(data.to_vec().into(), arith)),
        );
        Ok(unused_gas - cost)
    }

    #[inline(always)]
    fn create_end(
        &mut self, args: CreateArgs, data: Bytes, unused_gas: Gas,
        ret: Result<(), ExecError>, keep_gas: bool, arith: ArithMode,
    ) -> Result<(), ExecError> {
        let (ret, unused_gas, keep_gas) = match ret {
            Ok(()) => {
                match self.deposit_code(
                    &args.contract_addr,
                    &data,
                    unused_gas,
                    arith,
                ) {
                    Ok(gas) => (Ok(()), gas, true),
                    Err(err) => (Err(err), 0, false),
                }
            }
            Err(err) => (Err(err), unused_gas, keep_gas),
        };
        match ret {
            Ok(()) => self.state.commit(args.snapshot),
            Err(_) => self.state.revert_to(args.snapshot),
        }
        let call = &mut self.cur_call;
        if keep_gas {
            call.unused_gas += unused_gas;
        }
        call.last_returned = match ret {
            Err(_) if keep_gas => data,
            _ => Bytes::empty(),
        };
        call.stack.push(match ret {
            Err(_) => U256::zero(),
            Ok(_) => args.contract_addr.into(),
        })
    }

    /// Resolve the callee code and start a new frame. Calls into accounts without code finish
    /// immediately without a frame.
    #[inline(always)]
    fn enter(
        &mut self, code: Arc<ContractCode>, input: Box<[u8]>, value: Wei,
        callee: Addr, caller: Addr, args: CallType, gas: Gas,
        read_only: bool,
    ) -> Result<(), ExecError> {
        if self.call_depth() >= MAX_CALL_DEPTH {
            return self.return_without_callstack(
                args,
                Bytes::empty(),
                gas,
                Err(ExecError::Depth),
                true,
            )
        }
        if code.is_empty() {
            return self.return_without_callstack(
                args,
                Bytes::empty(),
                gas,
                Ok(()),
                true,
            )
        }
        self.call_push(code, input, value, callee, caller, args, gas, read_only);
        Ok(())
    }

    fn call_(
        &mut self, callee: Addr, caller: Addr, input: Box<[u8]>, gas: Gas,
        value: Wei, args: CallType,
    ) -> Result<(), ExecError> {
        // transfer into the callee
        if self
            .state
            .transfer_balance(&caller, &callee, &value)
            .is_none()
        {
            return self.return_without_callstack(
                args,
                Bytes::empty(),
                gas,
                Err(ExecError::InsufficientBalance),
                true,
            )
        }
        let code = self.state.get_code(&callee);
        self.enter(code, input, value, callee, caller, args, gas, false)
    }

    #[inline(always)]
    fn call_begin(&mut self, site: CallSite) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_CALL)?;
        let (gas, addr, val) = call.stack.consume3()?;
        if call.read_only && !val.is_zero() {
            return Err(ExecError::WriteProtection)
        }
        let (input, (ret_off, ret_len)) = self.call_io()?;
        let addr: Addr = addr.into();
        if !val.is_zero() {
            self.cur_call.use_gas(GAS_CALL_VALUE_TRANS)?;
            if !self.state.exist(&addr) {
                self.cur_call.use_gas(GAS_CALL_NEW_ACCOUNT)?;
            }
        }
        let mut gas_quota = self.forward_gas(&gas)?;
        if !val.is_zero() {
            gas_quota += GAS_CALL_STIPEND
        }

        let caller = self.cur_call.callee.clone();
        let snapshot = self.state.snapshot();
        let args = CallType::Call(CallArgs {
            snapshot,
            ret_off,
            ret_len,
            site,
        });
        self.call_(addr, caller, input, gas_quota, val.into(), args)
    }

    #[inline(always)]
    fn call_end(
        &mut self, args: CallArgs, data: Bytes, unused_gas: Gas,
        ret: Result<(), ExecError>, keep_gas: bool,
    ) -> Result<(), ExecError> {
        match ret {
            Ok(()) => self.state.commit(args.snapshot),
            Err(_) => self.state.revert_to(args.snapshot),
        }
        let call = &mut self.cur_call;
        if ret.is_ok() || keep_gas {
            call.unused_gas += unused_gas;
        }
        let n = std::cmp::min(args.ret_len, data.len());
        call.memory
            .slice_mut(args.ret_off, n)
            .copy_from_slice(&data[..n]);
        call.last_returned = data;
        match ret {
            Ok(()) => call.stack.push(U256::one()),
            Err(err) => match args.site {
                CallSite::Protected => {
                    debug!("call failed: {:?}", err);
                    call.stack.push(U256::zero())
                }
                CallSite::Direct => {
                    debug!("call failed, propagating to the caller: {:?}", err);
                    self.fault = Some(Fault {
                        data: call.last_returned.clone(),
                        keep_gas: err.keeps_gas(),
                    });
                    Err(err)
                }
            },
        }
    }

    #[inline(always)]
    fn delegate_call_begin(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_CALL)?;
        let (gas, addr) = call.stack.consume2()?;
        let (input, (ret_off, ret_len)) = self.call_io()?;
        let addr: Addr = addr.into();
        let gas_quota = self.forward_gas(&gas)?;

        let callee = self.cur_call.callee.clone(); // inherit from the caller
        let caller = self.cur_call.caller.clone(); // inherit from the caller
        let value = self.cur_call.value.clone(); // inherit from the caller
        let read_only = self.cur_call.read_only;

        let snapshot = self.state.snapshot();
        let args = CallType::Call(CallArgs {
            snapshot,
            ret_off,
            ret_len,
            site: CallSite::Protected,
        });
        let code = self.state.get_code(&addr);
        self.enter(code, input, value, callee, caller, args, gas_quota, read_only)
    }

    #[inline(always)]
    fn static_call_begin(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        call.use_gas(GAS_CALL)?;
        let (gas, addr) = call.stack.consume2()?;
        let (input, (ret_off, ret_len)) = self.call_io()?;
        let addr: Addr = addr.into();
        let gas_quota = self.forward_gas(&gas)?;

        let caller = self.cur_call.callee.clone();
        let snapshot = self.state.snapshot();
        let args = CallType::Call(CallArgs {
            snapshot,
            ret_off,
            ret_len,
            site: CallSite::Protected,
        });
        let code = self.state.get_code(&addr);
        self.enter(
            code,
            input,
            Wei::zero().clone(),
            addr,
            caller,
            args,
            gas_quota,
            true, // read only
        )
    }

    #[inline(always)]
    fn return_(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        let (off, len) = call.stack.consume2()?;
        let retval = call.mem_read(off, len)?.into();
        self.finish_call(retval, Ok(()), true)
    }

    #[inline(always)]
    fn revert(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        let (off, len) = call.stack.consume2()?;
        let retval = call.mem_read(off, len)?.into();
        self.fault = Some(Fault {
            data: retval,
            keep_gas: true,
        });
        Err(ExecError::Reverted)
    }

    /// Sends the whole balance to the beneficiary. The account itself (code, storage, nonce) is
    /// left in place.
    #[inline(always)]
    fn self_destruct(&mut self) -> Result<(), ExecError> {
        let call = &mut self.cur_call;
        if call.read_only {
            return Err(ExecError::WriteProtection)
        }
        call.use_gas(GAS_SELF_DESTRUCT)?;
        let beneficiary: Addr = call.stack.consume1()?.into();
        let callee = call.callee.clone();
        let balance = self.state.get_balance(&callee);
        self.state
            .transfer_balance(&callee, &beneficiary, &balance)
            .ok_or(ExecError::InsufficientBalance)?;
        self.finish_call(Bytes::empty(), Ok(()), true)
    }

    // end of instruction impl

    #[inline(always)]
    fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    #[inline(always)]
    fn call_push(
        &mut self, code: Arc<ContractCode>, input: Box<[u8]>, value: Wei,
        callee: Addr, caller: Addr, call_type: CallType, gas: Gas,
        read_only: bool,
    ) {
        let mut old_call = Box::new(CallFrame::new(
            code,
            input,
            value,
            callee,
            caller,
            call_type,
            gas,
            // all child calls become read-only if the parent is read-only
            self.cur_call.read_only || read_only,
        ));
        std::mem::swap(&mut self.cur_call, &mut old_call);
        self.call_stack.push(old_call);
    }

    #[inline(always)]
    fn call_pop(&mut self) -> Option<Box<CallFrame>> {
        let mut frame = self.call_stack.pop()?;
        std::mem::swap(&mut self.cur_call, &mut frame);
        Some(frame)
    }

    /// Feed either a direct result (for calls that did not need a frame) or a finished frame's
    /// result to the frame-type specific epilogue.
    #[inline(always)]
    fn return_without_callstack(
        &mut self, args: CallType, data: Bytes, unused_gas: Gas,
        ret: Result<(), ExecError>, keep_gas: bool,
    ) -> Result<(), ExecError> {
        match args {
            CallType::Tx(args) => {
                self.tx_end(args, data, unused_gas, ret, keep_gas, ArithMode::default());
                Ok(())
            }
            CallType::Call(args) => {
                self.call_end(args, data, unused_gas, ret, keep_gas)
            }
            CallType::Create(args) => self.create_end(
                args,
                data,
                unused_gas,
                ret,
                keep_gas,
                ArithMode::default(),
            ),
        }
    }

    #[inline(always)]
    fn tx_end(
        &mut self, args: TxArgs, data: Bytes, unused_gas: Gas,
        ret: Result<(), ExecError>, keep_gas: bool, arith: ArithMode,
    ) {
        let unused_gas = if ret.is_ok() || keep_gas { unused_gas } else { 0 };
        let (ret, unused_gas, addr) = match (args.aux, ret) {
            (TxAux::Contract(addr), Ok(())) => {
                match self.deposit_code(&addr, &data, unused_gas, arith) {
                    Ok(gas) => (Ok(()), gas, Some(addr)),
                    Err(err) => (Err(err), 0, None),
                }
            }
            (_, ret) => (ret, unused_gas, None),
        };
        self.status = TxExecStatus::Finished(match ret {
            Err(err) => {
                // execution is reverted
                self.state.revert_to(args.snapshot);
                TxExecResult::Reverted(data, unused_gas, err)
            }
            Ok(()) => {
                self.state.commit(args.snapshot);
                TxExecResult::Succeeded(data, unused_gas, addr)
            }
        })
    }

    #[inline(always)]
    fn finish_call(
        &mut self, data: Bytes, ret: Result<(), ExecError>, keep_gas: bool,
    ) -> Result<(), ExecError> {
        let frame = match self.call_pop() {
            Some(frame) => *frame,
            None => return Ok(()),
        };
        let arith = frame.code.arith();
        match frame.call_type {
            CallType::Tx(args) => {
                self.tx_end(args, data, frame.unused_gas, ret, keep_gas, arith);
                Ok(())
            }
            CallType::Create(args) => self.create_end(
                args,
                data,
                frame.unused_gas,
                ret,
                keep_gas,
                arith,
            ),
            CallType::Call(args) => {
                self.call_end(args, data, frame.unused_gas, ret, keep_gas)
            }
        }
    }

    fn exec(mut self) -> TxExecResult {
        use Opcode::*;
        while let TxExecStatus::Running = self.status {
            let call = &mut self.cur_call;
            let _code = call.code.clone();
            let code = _code.as_bytes();
            let pc = call.pc as usize;
            let raw_opcode = code.get(pc).copied().unwrap_or(Stop as u8);
            let opcode = Opcode::from_byte(raw_opcode).unwrap_or(Invalid);
            let size = opcode.push_size();
            let data = &code[std::cmp::min(pc + 1, code.len())..
                std::cmp::min(pc + 1 + size, code.len())];
            // jumps overwrite this
            call.pc = (pc + 1 + size) as u64;
            let mut succ = match raw_opcode {
                // PUSH* case (33)
                0x5f..=0x7f => call.push(data, size),
                // DUP* case (16)
                c @ 0x80..=0x8f => call.dup((c - 0x80 + 1) as usize),
                // SWAP* case (16)
                c @ 0x90..=0x9f => call.swap((c - 0x90 + 1) as usize),
                // LOG* case (5)
                c @ 0xa0..=0xa4 => self.log((c - 0xa0) as usize),
                _ => match opcode {
                    Stop => self.finish_call(Bytes::empty(), Ok(()), true),
                    Add => call.add(),
                    Mul => call.mul(),
                    Sub => call.sub(),
                    Div => call.div(),
                    SDiv => call.sdiv(),
                    Mod => call.rem(),
                    SMod => call.smod(),
                    AddMod => call.add_mod(),
                    MulMod => call.mul_mod(),
                    Exp => call.exp(),
                    SignExtend => call.sign_extend(),
                    Lt => call.lt(),
                    Gt => call.gt(),
                    Slt => call.slt(),
                    Sgt => call.sgt(),
                    Eql => call.eq(),
                    IsZero => call.is_zero(),
                    And => call.and(),
                    Or => call.or(),
                    Xor => call.xor(),
                    Not => call.not(),
                    Byte => call.byte(),
                    Shl => call.shl(),
                    Shr => call.shr(),
                    Sar => call.sar(),
                    Sha3 => call.sha3(),
                    Address => call.addr(),
                    Balance => self.balance(),
                    Origin => self.origin(),
                    Caller => call.caller(),
                    CallValue => call.call_value(),
                    CallDataLoad => call.call_data_load(),
                    CallDataSize => call.call_data_size(),
                    CallDataCopy => call.call_data_copy(),
                    CodeSize => call.code_size(),
                    CodeCopy => call.code_copy(),
                    GasPrice => self.gas_price(),
                    ExtCodeSize => self.ext_code_size(),
                    ExtCodeCopy => self.ext_code_copy(),
                    ReturnDataSize => call.return_data_size(),
                    ReturnDataCopy => call.return_data_copy(),
                    ExtCodeHash => self.ext_code_hash(),
                    BlockHash => self.block_hash(),
                    Coinbase => self.coinbase(),
                    Timestamp => self.timestamp(),
                    Number => self.number(),
                    PrevRandao => self.prevrandao(),
                    GasLimit => self.gas_limit(),
                    ChainId => self.chain_id(),
                    SelfBalance => self.self_balance(),
                    BaseFee => self.base_fee(),
                    Pop => call.pop(),
                    MLoad => call.mload(),
                    MStore => call.mstore(),
                    MStore8 => call.mstore8(),
                    SLoad => self.sload(),
                    SStore => self.sstore(),
                    Jump => self.jump(),
                    JumpI => self.jumpi(),
                    PC => call.pc(pc as u64),
                    MSize => call.msize(),
                    GasLeft => call.gas(),
                    JumpDest => call.use_gas(GAS_JUMPDEST),
                    Create => self.create_begin(false),
                    Create2 => self.create_begin(true),
                    Call => self.call_begin(CallSite::Protected),
                    DirectCall => self.call_begin(CallSite::Direct),
                    DelegateCall => self.delegate_call_begin(),
                    StaticCall => self.static_call_begin(),
                    Return => self.return_(),
                    Revert => self.revert(),
                    SelfDestruct => self.self_destruct(),
                    _ => Err(ExecError::InvalidOpcode),
                },
            };
            while let Err(err) = succ {
                let (data, keep_gas) = match self.fault.take() {
                    Some(fault) => (fault.data, fault.keep_gas),
                    None => (err.output(), err.keeps_gas()),
                };
                debug!("frame failed: {:?}", err);
                succ = self.finish_call(data, Err(err), keep_gas);
            }
        }
        match self.status {
            TxExecStatus::Finished(res) => res,
            // the loop only exits once the transaction frame has finished
            TxExecStatus::Running => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_site_propagation_flag() {
        assert_ne!(CallSite::Direct, CallSite::Protected);
        assert!(ExecError::Reverted.keeps_gas());
        assert!(ExecError::ArithmeticOverflow.keeps_gas());
        assert!(!ExecError::OutOfGas.keeps_gas());
        assert!(!ExecError::InvalidOpcode.keeps_gas());
    }
}
