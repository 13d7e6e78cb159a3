//! Applying a single transaction to the account store.
//!
//! The interpreter only sees the part of a transaction that runs code. Everything around it lives
//! here: validation against the current state, buying the gas up front, bumping the nonce (which
//! survives a failed execution), refunding the unused gas and paying the coinbase.

use log::{debug, warn};

use crate::common::{Addr, Bytes, Gas, Hash, Wei, U256};
use crate::core::{
    execute, ArithMode, Log, Transferable, TxExecEnv,
    TxExecResult, TxInput, WorldState, WorldStateR, WorldStateW,
};
use crate::error::{Result, SimError};
use crate::state::AccountStore;
use crate::tx::{Receipt, Transaction};

/// Everything a block needs to know about an executed transaction.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub result: TxExecResult,
    pub gas_used: Gas,
    pub effective_gas_price: Wei,
    pub logs: Vec<Log>,
}

impl TxOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.result, TxExecResult::Succeeded(..))
    }

    pub fn into_receipt(
        self, tx: &Transaction, block_number: u64, block_hash: &Hash,
        tx_index: usize, cumulative_gas_used: Gas,
    ) -> Receipt {
        let (status, output, contract_address, error) = match self.result {
            TxExecResult::Succeeded(data, _, addr) => (true, data, addr, None),
            TxExecResult::Reverted(data, _, err) => (false, data, None, Some(err)),
        };
        Receipt {
            tx_hash: tx.hash().clone(),
            tx_index,
            block_hash: block_hash.clone(),
            block_number,
            from: tx.from.clone(),
            to: tx.to.clone(),
            status,
            gas_used: self.gas_used,
            cumulative_gas_used,
            effective_gas_price: self.effective_gas_price,
            contract_address,
            logs: self.logs,
            output,
            error,
        }
    }
}

/// Check that `tx` can be included on top of `state` in a block described by `env`. Returns the
/// price per gas the sender will pay.
pub fn validate<S: WorldStateR + ?Sized>(
    state: &S, env: &TxExecEnv, tx: &Transaction,
) -> Result<Wei> {
    let expected = state.get_nonce(&tx.from);
    if tx.nonce != expected {
        return Err(SimError::InvalidNonce {
            sender: tx.from.clone(),
            expected,
            got: tx.nonce,
        })
    }
    if tx.gas_limit > env.block.gas_limit {
        return Err(SimError::GasLimitExceedsBlock {
            limit: tx.gas_limit,
            block_limit: env.block.gas_limit,
        })
    }
    let intrinsic = tx.intrinsic_gas();
    if tx.gas_limit < intrinsic {
        return Err(SimError::IntrinsicGasTooLow {
            required: intrinsic,
            limit: tx.gas_limit,
        })
    }
    let base_fee = Wei::from(env.block.base_fee);
    let price = tx.fee.effective_gas_price(&base_fee).ok_or_else(|| {
        SimError::FeeBelowBaseFee {
            max_fee: tx.fee.max_price().clone(),
            base_fee: base_fee.clone(),
        }
    })?;
    let available = state.get_balance(&tx.from);
    match tx.max_cost() {
        Some(cost) if cost <= available => Ok(price),
        cost => Err(SimError::InsufficientBalance {
            required: cost.unwrap_or_else(|| Wei::from(U256::MAX)),
            available,
        }),
    }
}

/// Validate and execute `tx`. On error nothing in `store` has changed; otherwise the transaction
/// is included, whether or not its execution succeeded.
pub fn apply_transaction(
    store: &mut AccountStore, env: &TxExecEnv, tx: &Transaction,
) -> Result<TxOutcome> {
    let price = validate(&*store, env, tx)?;
    let prepaid = price.times_gas(tx.gas_limit);
    store.sub_balance(&tx.from, &prepaid).ok_or_else(|| {
        SimError::InsufficientBalance {
            required: prepaid.clone(),
            available: store.get_balance(&tx.from),
        }
    })?;
    store.set_nonce(&tx.from, tx.nonce.saturating_add(1));

    let result = execute(
        store,
        env,
        TxInput {
            from: tx.from.clone(),
            to: tx.to.clone(),
            value: tx.value.clone(),
            data: tx.data.clone(),
            gas: tx.gas_limit - tx.intrinsic_gas(),
            gas_price: price.clone(),
            nonce: tx.nonce,
            arithmetic: tx.arithmetic,
        },
    );
    let gas_used = tx.gas_limit - result.unused_gas();
    let refund = price.times_gas(result.unused_gas());
    let tip = price
        .saturating_sub(&Wei::from(env.block.base_fee))
        .times_gas(gas_used);
    if store.add_balance(&tx.from, &refund).is_none() {
        warn!("tx {}: refund of {} overflows the balance of {}", tx.hash(), refund, tx.from);
    }
    if store.add_balance(&env.block.coinbase, &tip).is_none() {
        warn!(
            "tx {}: tip of {} overflows the balance of coinbase {}",
            tx.hash(),
            tip,
            env.block.coinbase
        );
    }
    let logs = store.take_logs();
    if let TxExecResult::Reverted(_, _, err) = &result {
        debug!("tx {} failed: {} (gas used = {})", tx.hash(), err, gas_used);
    }
    Ok(TxOutcome {
        result,
        gas_used,
        effective_gas_price: price,
        logs,
    })
}

/// Arguments of a read-only call.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub from: Addr,
    pub to: Addr,
    pub value: Wei,
    pub data: Bytes,
    pub gas: Gas,
}

/// Run a call against `state` and throw away every change it made.
pub fn simulate_call<S: WorldState>(
    state: &mut S, env: &TxExecEnv, req: CallRequest,
) -> TxExecResult {
    let snapshot = state.snapshot();
    let nonce = state.get_nonce(&req.from);
    let res = execute(
        state,
        env,
        TxInput {
            from: req.from,
            to: Some(req.to),
            value: req.value,
            data: req.data,
            gas: req.gas,
            gas_price: Wei::default(),
            nonce,
            arithmetic: ArithMode::default(),
        },
    );
    state.revert_to(snapshot);
    res
}
