use std::sync::Arc;

use serde::Serialize;
use sha3::Digest;

use crate::common::{Addr, Bytes, Gas, Hash, Wei};
use crate::core::params::{
    GAS_TX, GAS_TX_CREATE, GAS_TX_DATA_NON_ZERO, GAS_TX_DATA_ZERO,
};
use crate::core::{ArithMode, ExecError, Log};

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TxType {
    Legacy = 0x0,
    DynamicFee = 0x2,
}

/// How a transaction pays for its gas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum GasFee {
    /// A single price per gas. Everything above the base fee is tip.
    #[serde(rename_all = "camelCase")]
    Legacy { gas_price: Wei },
    /// A price cap plus the tip offered on top of the base fee.
    #[serde(rename_all = "camelCase")]
    Dynamic { max_fee: Wei, priority_fee: Wei },
}

impl GasFee {
    pub fn type_(&self) -> TxType {
        match self {
            GasFee::Legacy { .. } => TxType::Legacy,
            GasFee::Dynamic { .. } => TxType::DynamicFee,
        }
    }

    /// The most the sender may pay per gas.
    pub fn max_price(&self) -> &Wei {
        match self {
            GasFee::Legacy { gas_price } => gas_price,
            GasFee::Dynamic { max_fee, .. } => max_fee,
        }
    }

    /// Price per gas actually charged under `base_fee`, `None` if the fee cap does not cover it.
    pub fn effective_gas_price(&self, base_fee: &Wei) -> Option<Wei> {
        if self.max_price() < base_fee {
            return None
        }
        Some(match self {
            GasFee::Legacy { gas_price } => gas_price.clone(),
            GasFee::Dynamic {
                max_fee,
                priority_fee,
            } => match base_fee.checked_add(priority_fee) {
                Some(p) if &p < max_fee => p,
                _ => max_fee.clone(),
            },
        })
    }

    /// Tip per gas paid to the coinbase under `base_fee`. This is the mempool's priority key.
    pub fn priority(&self, base_fee: &Wei) -> Wei {
        self.effective_gas_price(base_fee)
            .map(|p| p.saturating_sub(base_fee))
            .unwrap_or_default()
    }
}

/// Gas charged before the first instruction runs.
pub fn intrinsic_gas(data: &[u8], is_create: bool) -> Gas {
    let nz = data.iter().filter(|b| **b != 0).count() as Gas;
    let z = data.len() as Gas - nz;
    let mut gas = GAS_TX + z * GAS_TX_DATA_ZERO + nz * GAS_TX_DATA_NON_ZERO;
    if is_create {
        gas += GAS_TX_CREATE
    }
    gas
}

/// The content of a transaction. Senders are plain addresses: there is no signature scheme, the
/// simulator trusts whoever submits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxBody {
    pub from: Addr,
    /// `None` creates a contract with `data` as init code.
    pub to: Option<Addr>,
    pub value: Wei,
    pub data: Bytes,
    pub gas_limit: Gas,
    pub fee: GasFee,
    pub nonce: u64,
    /// Arithmetic mode of code deployed by a creation transaction.
    pub arithmetic: ArithMode,
}

impl TxBody {
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    pub fn intrinsic_gas(&self) -> Gas {
        intrinsic_gas(&self.data, self.is_create())
    }

    /// Upper bound of what the sender can be charged: `gas_limit * max_price + value`.
    pub fn max_cost(&self) -> Option<Wei> {
        self.fee
            .max_price()
            .checked_mul(&Wei::from(self.gas_limit))?
            .checked_add(&self.value)
    }

    fn encode(&self) -> Vec<u8> {
        let (len, type_) = match self.fee {
            GasFee::Legacy { .. } => (8, TxType::Legacy),
            GasFee::Dynamic { .. } => (9, TxType::DynamicFee),
        };
        let mut stream = rlp::RlpStream::new_list(len);
        stream.append(&self.nonce).append(&self.from);
        match &self.to {
            Some(addr) => stream.append(addr),
            None => stream.append_empty_data(),
        }
        .append(&self.value)
        .append(&self.data)
        .append(&self.gas_limit);
        match &self.fee {
            GasFee::Legacy { gas_price } => stream.append(gas_price),
            GasFee::Dynamic {
                max_fee,
                priority_fee,
            } => stream.append(max_fee).append(priority_fee),
        };
        stream.append(&(self.arithmetic as u8));
        let mut buff = vec![type_ as u8];
        buff.extend_from_slice(stream.out().as_ref());
        buff
    }
}

/// An immutable transaction together with its hash.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    hash: Hash,
    #[serde(flatten)]
    body: TxBody,
}

pub type TxRef = Arc<Transaction>;

impl std::ops::Deref for Transaction {
    type Target = TxBody;
    fn deref(&self) -> &TxBody {
        &self.body
    }
}

impl Transaction {
    pub fn new(body: TxBody) -> Self {
        let hash = Hash::from_slice(
            sha3::Keccak256::digest(&body.encode()).as_slice(),
        );
        Self { hash, body }
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn body(&self) -> &TxBody {
        &self.body
    }
}

/// A transaction under construction. Fields left empty are filled in by the simulator: the nonce
/// from the sender's pending nonce, gas and fee from the configured defaults.
#[derive(Clone, Debug, Default)]
pub struct TxRequest {
    pub from: Addr,
    pub to: Option<Addr>,
    pub value: Wei,
    pub data: Bytes,
    pub gas_limit: Option<Gas>,
    pub fee: Option<GasFee>,
    pub nonce: Option<u64>,
    pub arithmetic: ArithMode,
}

impl TxRequest {
    pub fn new(from: &Addr) -> Self {
        Self {
            from: from.clone(),
            ..Default::default()
        }
    }

    pub fn to(mut self, to: &Addr) -> Self {
        self.to = Some(to.clone());
        self
    }

    pub fn value(mut self, value: Wei) -> Self {
        self.value = value;
        self
    }

    pub fn data<D: Into<Bytes>>(mut self, data: D) -> Self {
        self.data = data.into();
        self
    }

    pub fn gas_limit(mut self, gas: Gas) -> Self {
        self.gas_limit = Some(gas);
        self
    }

    pub fn gas_price(mut self, gas_price: Wei) -> Self {
        self.fee = Some(GasFee::Legacy { gas_price });
        self
    }

    pub fn dynamic_fee(mut self, max_fee: Wei, priority_fee: Wei) -> Self {
        self.fee = Some(GasFee::Dynamic {
            max_fee,
            priority_fee,
        });
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn arithmetic(mut self, mode: ArithMode) -> Self {
        self.arithmetic = mode;
        self
    }

    /// Complete the request with the given defaults for the missing fields.
    pub fn fill(self, nonce: u64, gas_limit: Gas, fee: GasFee) -> Transaction {
        Transaction::new(TxBody {
            from: self.from,
            to: self.to,
            value: self.value,
            data: self.data,
            gas_limit: self.gas_limit.unwrap_or(gas_limit),
            fee: self.fee.unwrap_or(fee),
            nonce: self.nonce.unwrap_or(nonce),
            arithmetic: self.arithmetic,
        })
    }
}

/// Outcome of an included transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(rename = "transactionHash")]
    pub tx_hash: Hash,
    #[serde(rename = "transactionIndex")]
    pub tx_index: usize,
    pub block_hash: Hash,
    pub block_number: u64,
    pub from: Addr,
    pub to: Option<Addr>,
    /// `true` when the top-level frame succeeded.
    pub status: bool,
    pub gas_used: Gas,
    pub cumulative_gas_used: Gas,
    pub effective_gas_price: Wei,
    pub contract_address: Option<Addr>,
    pub logs: Vec<Log>,
    /// Return data, or revert data of a failed transaction.
    pub output: Bytes,
    pub error: Option<ExecError>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::gwei;

    fn body(fee: GasFee) -> TxBody {
        TxBody {
            from: Addr::from_label("alice"),
            to: Some(Addr::from_label("bob")),
            value: Wei::from(1u64),
            data: Bytes::empty(),
            gas_limit: 21000,
            fee,
            nonce: 0,
            arithmetic: ArithMode::Wrapping,
        }
    }

    #[test]
    fn test_effective_price() {
        let base = gwei(10);
        let legacy = GasFee::Legacy {
            gas_price: gwei(15),
        };
        assert_eq!(legacy.effective_gas_price(&base), Some(gwei(15)));
        assert_eq!(legacy.priority(&base), gwei(5));
        let capped = GasFee::Dynamic {
            max_fee: gwei(12),
            priority_fee: gwei(5),
        };
        assert_eq!(capped.effective_gas_price(&base), Some(gwei(12)));
        assert_eq!(capped.priority(&base), gwei(2));
        let low = GasFee::Dynamic {
            max_fee: gwei(9),
            priority_fee: gwei(5),
        };
        assert_eq!(low.effective_gas_price(&base), None);
        assert!(low.priority(&base).is_zero());
    }

    #[test]
    fn test_intrinsic_gas() {
        assert_eq!(intrinsic_gas(&[], false), 21000);
        assert_eq!(intrinsic_gas(&[0, 1, 0, 2], false), 21000 + 8 + 32);
        assert_eq!(intrinsic_gas(&[], true), 53000);
    }

    #[test]
    fn test_tx_hash() {
        let fee = GasFee::Legacy { gas_price: gwei(1) };
        let a = Transaction::new(body(fee.clone()));
        let b = Transaction::new(body(fee));
        assert_eq!(a.hash(), b.hash());
        let mut other = body(GasFee::Legacy { gas_price: gwei(1) });
        other.nonce = 1;
        assert_ne!(a.hash(), Transaction::new(other).hash());
        let dynamic = Transaction::new(body(GasFee::Dynamic {
            max_fee: gwei(1),
            priority_fee: gwei(1),
        }));
        assert_ne!(a.hash(), dynamic.hash());
    }
}
