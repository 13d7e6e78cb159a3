//! Simulator configuration.
//!
//! Keys follow the Hardhat network config, so a JSON blob like
//!
//! ```json
//! {
//!   "chainId": 1337,
//!   "initialBaseFeePerGas": "0x3b9aca00",
//!   "mining": { "auto": false, "interval": 5000, "order": "fifo" }
//! }
//! ```
//!
//! can be fed to [SimConfig::from_json_str]; everything omitted keeps its default.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::common::{ether, gwei, Addr, Bytes, Gas, Hash, Wei};
use crate::core::ArithMode;
use crate::error::{Result, SimError};
use crate::mempool::MempoolOrder;
use crate::tx::GasFee;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SimConfig {
    pub chain_id: u64,
    pub block_gas_limit: Gas,
    /// Base fee of every block. It is burned, never paid to the coinbase.
    pub initial_base_fee_per_gas: Wei,
    pub coinbase: Addr,
    pub genesis_timestamp: u64,
    /// Seconds between consecutive blocks unless time is moved explicitly.
    pub block_time: u64,
    /// Gas limit of transactions that do not set one.
    pub gas: Gas,
    /// Tip per gas of transactions that do not set a fee.
    pub priority_fee: Wei,
    pub max_block_transactions: usize,
    pub mining: MiningConfig,
    pub accounts: AccountsConfig,
    pub alloc: BTreeMap<Addr, GenesisAccount>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct MiningConfig {
    /// Mine one block per submitted transaction.
    pub auto: bool,
    /// Milliseconds between blocks of the interval miner, `None` to disable it.
    pub interval: Option<u64>,
    pub order: MempoolOrder,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct AccountsConfig {
    pub count: usize,
    pub balance: Wei,
}

/// An account present at genesis.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct GenesisAccount {
    pub balance: Wei,
    pub nonce: u64,
    pub code: Bytes,
    pub arithmetic: ArithMode,
    pub storage: BTreeMap<Hash, Hash>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            chain_id: 31337,
            block_gas_limit: 30_000_000,
            initial_base_fee_per_gas: gwei(1),
            coinbase: default_coinbase(),
            genesis_timestamp: 1_700_000_000,
            block_time: 1,
            gas: 3_000_000,
            priority_fee: gwei(1),
            max_block_transactions: 1024,
            mining: MiningConfig::default(),
            accounts: AccountsConfig::default(),
            alloc: BTreeMap::new(),
        }
    }
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            auto: true,
            interval: None,
            order: MempoolOrder::Priority,
        }
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            count: 20,
            balance: ether(10_000),
        }
    }
}

fn default_coinbase() -> Addr {
    Addr::from_str("0xc014ba5ec014ba5ec014ba5ec014ba5ec014ba5e")
        .unwrap_or_else(|_| Addr::from_label("coinbase"))
}

impl SimConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| SimError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|e| {
            SimError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json_str(&s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_gas_limit < crate::core::params::GAS_TX {
            return Err(SimError::InvalidConfig(format!(
                "blockGasLimit {} cannot fit a transfer",
                self.block_gas_limit
            )))
        }
        if self.gas > self.block_gas_limit {
            return Err(SimError::InvalidConfig(format!(
                "gas {} exceeds blockGasLimit {}",
                self.gas, self.block_gas_limit
            )))
        }
        if self.max_block_transactions == 0 {
            return Err(SimError::InvalidConfig(
                "maxBlockTransactions must be positive".into(),
            ))
        }
        if self.mining.interval == Some(0) {
            return Err(SimError::InvalidConfig(
                "mining.interval must be positive".into(),
            ))
        }
        Ok(())
    }

    /// Addresses of the funded development accounts, in a stable order.
    pub fn dev_accounts(&self) -> Vec<Addr> {
        (0..self.accounts.count)
            .map(|i| Addr::from_label(&format!("account{}", i)))
            .collect()
    }

    /// Fee used by transactions that do not choose one.
    pub fn default_fee(&self) -> GasFee {
        GasFee::Dynamic {
            max_fee: self
                .initial_base_fee_per_gas
                .checked_add(&self.initial_base_fee_per_gas)
                .and_then(|b| b.checked_add(&self.priority_fee))
                .unwrap_or_else(|| self.priority_fee.clone()),
            priority_fee: self.priority_fee.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert!(config.mining.auto);
        assert_eq!(config.mining.order, MempoolOrder::Priority);
        assert_eq!(config.dev_accounts().len(), 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let config = SimConfig::from_json_str(
            r#"{
                "chainId": 1,
                "initialBaseFeePerGas": "0x0",
                "mining": { "auto": false, "interval": 100, "order": "fifo" },
                "accounts": { "count": 2, "balance": "1000" },
                "alloc": {
                    "0x00000000000000000000000000000000000000aa": {
                        "balance": "0x10",
                        "code": "0x00",
                        "arithmetic": "checked"
                    }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.chain_id, 1);
        assert!(config.initial_base_fee_per_gas.is_zero());
        assert!(!config.mining.auto);
        assert_eq!(config.mining.interval, Some(100));
        assert_eq!(config.mining.order, MempoolOrder::Fifo);
        assert_eq!(config.accounts.balance, Wei::from(1000u64));
        let (addr, acc) = config.alloc.iter().next().unwrap();
        assert_eq!(addr.as_bytes()[19], 0xaa);
        assert_eq!(acc.balance, Wei::from(16u64));
        assert_eq!(acc.arithmetic, ArithMode::Checked);
        assert_eq!(config.block_gas_limit, 30_000_000);
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            SimConfig::from_json_str(r#"{"maxBlockTransactions": 0}"#),
            Err(SimError::InvalidConfig(_))
        ));
        assert!(matches!(
            SimConfig::from_json_str(r#"{"chainid": 1}"#),
            Err(SimError::InvalidConfig(_))
        ));
    }
}
