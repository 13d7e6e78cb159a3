//! The simulator facade: everything a test harness drives.
//!
//! A [Simulator] is a cheap, clonable handle. Independent instances share nothing, so tests can
//! run side by side. Inside, the ledger (account store, chain and block producer) sits behind a
//! `RwLock`: submissions and queries take the read lock, mining and administrative writes take the
//! write lock. The mempool has its own lock so concurrent submitters only contend on it.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::chain::{Block, BlockHeader, BlockRef, Chain};
use crate::common::{create_addr, encode_word, Addr, Bytes, Hash, Wei, U256};
use crate::config::SimConfig;
use crate::core::{
    ArithMode, ContractCode, TxExecEnv, TxExecResult, WorldStateR,
    WorldStateW,
};
use crate::error::{Result, SimError};
use crate::mempool::{Mempool, MempoolOrder};
use crate::miner::{BlockProducer, IntervalMiner};
use crate::processor::{simulate_call, CallRequest};
use crate::state::{Account, AccountStore};
use crate::tx::{Receipt, TxRef, TxRequest};

struct Ledger {
    config: SimConfig,
    store: AccountStore,
    chain: Chain,
    producer: BlockProducer,
}

impl Ledger {
    fn genesis(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let mut store = AccountStore::new();
        for addr in config.dev_accounts() {
            store.set(&addr, Account::with_balance(config.accounts.balance.clone()));
        }
        for (addr, acc) in config.alloc.iter() {
            let storage = acc
                .storage
                .iter()
                .map(|(k, v)| (k.clone(), U256::from(v.clone())))
                .filter(|(_, v)| !v.is_zero())
                .collect();
            store.set(
                addr,
                Account {
                    balance: acc.balance.clone(),
                    nonce: acc.nonce,
                    code: Arc::new(ContractCode::new(
                        acc.code.to_vec().into(),
                        acc.arithmetic,
                    )),
                    storage,
                },
            );
        }
        let state_root = store.seal();
        let header = BlockHeader {
            number: 0,
            parent_hash: Hash::default(),
            timestamp: config.genesis_timestamp,
            coinbase: config.coinbase.clone(),
            gas_limit: config.block_gas_limit,
            base_fee: config.initial_base_fee_per_gas.clone(),
        };
        let genesis = Block {
            number: 0,
            hash: Block::compute_hash(&header, 0, &state_root, &[]),
            parent_hash: Hash::default(),
            timestamp: header.timestamp,
            coinbase: header.coinbase.clone(),
            gas_limit: header.gas_limit,
            gas_used: 0,
            base_fee: header.base_fee.clone(),
            mix_hash: header.prev_randao(),
            state_root,
            transactions: Vec::new(),
            receipts: Vec::new(),
        };
        info!("genesis {} (chain id = {})", genesis.hash, config.chain_id);
        Ok(Self {
            chain: Chain::new(genesis),
            store,
            producer: BlockProducer::new(),
            config,
        })
    }
}

struct SimInner {
    ledger: RwLock<Ledger>,
    mempool: Mempool,
    head: watch::Sender<u64>,
}

/// What happened to a submitted transaction.
#[derive(Debug, Clone)]
pub enum Submitted {
    /// Automine is on and the transaction made it into a block.
    Mined(Receipt),
    /// The transaction waits in the mempool.
    Pending(TxRef),
}

impl Submitted {
    pub fn receipt(&self) -> Option<&Receipt> {
        match self {
            Submitted::Mined(r) => Some(r),
            Submitted::Pending(_) => None,
        }
    }

    pub fn hash(&self) -> &Hash {
        match self {
            Submitted::Mined(r) => &r.tx_hash,
            Submitted::Pending(tx) => tx.hash(),
        }
    }
}

#[derive(Clone)]
pub struct Simulator {
    inner: Arc<SimInner>,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Result<Self> {
        let mempool = Mempool::new(
            config.mining.order,
            config.initial_base_fee_per_gas.clone(),
        );
        let ledger = Ledger::genesis(config)?;
        let (head, _) = watch::channel(0);
        Ok(Self {
            inner: Arc::new(SimInner {
                ledger: RwLock::new(ledger),
                mempool,
                head,
            }),
        })
    }

    pub fn config(&self) -> SimConfig {
        self.inner.ledger.read().config.clone()
    }

    pub fn chain_id(&self) -> u64 {
        self.inner.ledger.read().config.chain_id
    }

    /// The funded development accounts.
    pub fn accounts(&self) -> Vec<Addr> {
        self.inner.ledger.read().config.dev_accounts()
    }

    // transactions

    /// Complete `req` with the defaults and queue it. With automine on, a block is mined right away.
    pub fn send_transaction(&self, req: TxRequest) -> Result<Submitted> {
        let tx = {
            let ledger = self.inner.ledger.read();
            let (gas, fee) = (ledger.config.gas, ledger.config.default_fee());
            let sender = req.from.clone();
            let tx = self.inner.mempool.submit_with(
                &sender,
                move |nonce| req.fill(nonce, gas, fee),
                &ledger.store,
            )?;
            if !ledger.config.mining.auto {
                return Ok(Submitted::Pending(tx))
            }
            tx
        };
        self.mine_blocks(1)?;
        let ledger = self.inner.ledger.read();
        if let Some(receipt) = ledger.chain.receipt(tx.hash()) {
            return Ok(Submitted::Mined(receipt))
        }
        match ledger.producer.rejection(tx.hash()) {
            Some(err) => Err(err.clone()),
            // did not fit into the block, it stays in the mempool
            None => Ok(Submitted::Pending(tx)),
        }
    }

    /// Send `value` and `data` from `from` to `to`.
    pub fn call(
        &self, from: &Addr, to: &Addr, data: Bytes, value: Wei,
    ) -> Result<Submitted> {
        self.send_transaction(TxRequest::new(from).to(to).data(data).value(value))
    }

    /// Create a contract from `initcode`, appending `args` as 32-byte words. Returns the address
    /// of the contract. With automine on, a failing constructor is an error; otherwise the address
    /// is where the contract will live once the transaction is mined.
    pub fn deploy(
        &self, from: &Addr, initcode: &[u8], args: &[U256], arithmetic: ArithMode,
    ) -> Result<Addr> {
        let mut data = initcode.to_vec();
        for arg in args {
            data.extend_from_slice(&encode_word(arg));
        }
        let req = TxRequest::new(from).data(data).arithmetic(arithmetic);
        match self.send_transaction(req)? {
            Submitted::Mined(receipt) => match (receipt.contract_address, receipt.error) {
                (Some(addr), _) => Ok(addr),
                (None, error) => Err(SimError::ExecutionFailed {
                    hash: receipt.tx_hash,
                    error: error.unwrap_or(crate::core::ExecError::Reverted),
                    output: receipt.output,
                }),
            },
            Submitted::Pending(tx) => Ok(create_addr(&tx.from, tx.nonce)),
        }
    }

    /// Run a call against the current state (including anything written since the last block)
    /// without committing anything.
    pub fn view(&self, from: &Addr, to: &Addr, data: Bytes) -> Result<TxExecResult> {
        let mut ledger = self.inner.ledger.write();
        let Ledger {
            config,
            store,
            chain,
            producer,
        } = &mut *ledger;
        let header = producer.next_header(chain.head(), config);
        let hash_of = |n: u64| chain.raw_hash(n);
        let env = TxExecEnv {
            chain_id: config.chain_id.into(),
            block: BlockProducer::block_info(&header),
            block_hash: &hash_of,
        };
        Ok(simulate_call(
            store,
            &env,
            CallRequest {
                from: from.clone(),
                to: to.clone(),
                value: Wei::default(),
                data,
                gas: config.gas,
            },
        ))
    }

    /// Return data of a successful [Simulator::view], as a single word.
    pub fn view_word(&self, from: &Addr, to: &Addr, data: Bytes) -> Result<U256> {
        match self.view(from, to, data)? {
            TxExecResult::Succeeded(out, _, _) => {
                let mut word = [0u8; 32];
                let n = std::cmp::min(out.len(), 32);
                word[..n].copy_from_slice(&out[..n]);
                Ok(U256::from_big_endian(&word))
            }
            TxExecResult::Reverted(output, _, error) => Err(SimError::ExecutionFailed {
                hash: Hash::default(),
                error,
                output,
            }),
        }
    }

    // mining

    /// Mine `n` blocks right now, regardless of the interval timer. Each block takes whatever the
    /// mempool offers.
    pub fn mine_blocks(&self, n: u64) -> Result<Vec<BlockRef>> {
        let mut blocks = Vec::new();
        {
            let mut ledger = self.inner.ledger.write();
            let Ledger {
                config,
                store,
                chain,
                producer,
            } = &mut *ledger;
            for _ in 0..n {
                blocks.push(producer.produce(store, chain, &self.inner.mempool, config)?);
            }
        }
        if let Some(last) = blocks.last() {
            self.inner.head.send_replace(last.number);
        }
        Ok(blocks)
    }

    pub fn set_automine(&self, enabled: bool) {
        self.inner.ledger.write().config.mining.auto = enabled;
    }

    pub fn automine(&self) -> bool {
        self.inner.ledger.read().config.mining.auto
    }

    pub fn set_mempool_order(&self, order: MempoolOrder) {
        self.inner.ledger.write().config.mining.order = order;
        self.inner.mempool.set_order(order);
    }

    /// Start mining every `period` (or `mining.interval` from the config). Must be called from
    /// within a tokio runtime; mining stops when the returned handle is dropped.
    pub fn start_interval_mining(&self, period: Option<Duration>) -> Option<IntervalMiner> {
        let period = period.or_else(|| {
            self.inner
                .ledger
                .read()
                .config
                .mining
                .interval
                .map(Duration::from_millis)
        })?;
        Some(IntervalMiner::start(self.clone(), period))
    }

    /// Resolves once block `number` has been committed.
    pub async fn wait_for_block(&self, number: u64) -> Result<BlockRef> {
        let mut rx = self.inner.head.subscribe();
        loop {
            let head = *rx.borrow_and_update();
            if head >= number || self.block_number() >= number {
                break
            }
            if rx.changed().await.is_err() {
                break
            }
        }
        self.block(number)
    }

    // time

    /// Move the clock forward: the next block is `seconds` later than it would have been.
    /// Returns the next block's timestamp.
    pub fn increase_time(&self, seconds: u64) -> u64 {
        let mut ledger = self.inner.ledger.write();
        ledger.producer.increase_time(seconds);
        let ledger = &*ledger;
        ledger
            .producer
            .next_header(ledger.chain.head(), &ledger.config)
            .timestamp
    }

    pub fn set_next_block_timestamp(&self, timestamp: u64) -> Result<()> {
        let mut ledger = self.inner.ledger.write();
        let Ledger {
            chain, producer, ..
        } = &mut *ledger;
        producer.set_next_block_timestamp(timestamp, chain.head())
    }

    // administrative overrides, not metered and outside any transaction

    pub fn set_balance(&self, addr: &Addr, balance: Wei) {
        debug!("set_balance {} = {}", addr, balance);
        self.inner.ledger.write().store.set_balance(addr, &balance);
    }

    pub fn set_storage(&self, addr: &Addr, key: &Hash, value: U256) {
        debug!("set_storage {} [{}] = {:x}", addr, key, value);
        self.inner.ledger.write().store.storage_write(addr, key, &value);
    }

    pub fn set_code(&self, addr: &Addr, code: Bytes, arithmetic: ArithMode) {
        debug!("set_code {} ({} bytes)", addr, code.len());
        let code = Arc::new(ContractCode::new(code.into_inner().into(), arithmetic));
        self.inner.ledger.write().store.set_code(addr, code);
    }

    /// Nonces can only move forward.
    pub fn set_nonce(&self, addr: &Addr, nonce: u64) -> Result<()> {
        let mut ledger = self.inner.ledger.write();
        let current = ledger.store.get_nonce(addr);
        if nonce < current {
            return Err(SimError::InvalidNonce {
                sender: addr.clone(),
                expected: current,
                got: nonce,
            })
        }
        debug!("set_nonce {} = {}", addr, nonce);
        ledger.store.set_nonce(addr, nonce);
        Ok(())
    }

    // queries

    pub fn get_account(&self, addr: &Addr) -> Result<Account> {
        self.inner
            .ledger
            .read()
            .store
            .get(addr)
            .ok_or_else(|| SimError::UnknownAccount(addr.clone()))
    }

    /// Storage slot `key` of `addr`, either now or at the end of block `number`.
    pub fn get_storage(&self, addr: &Addr, key: &Hash, number: Option<u64>) -> Result<U256> {
        let ledger = self.inner.ledger.read();
        match number {
            None => Ok(ledger.store.storage_read(addr, key)),
            Some(n) => Ok(ledger.store.at(n)?.get_state(addr, key)),
        }
    }

    pub fn get_balance(&self, addr: &Addr, number: Option<u64>) -> Result<Wei> {
        let ledger = self.inner.ledger.read();
        match number {
            None => Ok(ledger.store.get_balance(addr)),
            Some(n) => Ok(ledger.store.at(n)?.get_balance(addr)),
        }
    }

    pub fn get_nonce(&self, addr: &Addr, number: Option<u64>) -> Result<u64> {
        let ledger = self.inner.ledger.read();
        match number {
            None => Ok(ledger.store.get_nonce(addr)),
            Some(n) => Ok(ledger.store.at(n)?.get_nonce(addr)),
        }
    }

    pub fn get_code(&self, addr: &Addr) -> Bytes {
        self.inner.ledger.read().store.get_code(addr).as_bytes().into()
    }

    /// Hash of block `number` as the next block would see it: zero outside the 256-block window.
    pub fn get_block_hash(&self, number: u64) -> Hash {
        self.inner.ledger.read().chain.block_hash_at(number)
    }

    /// The pending transactions in the order the next block would include them.
    pub fn inspect_pending(&self) -> Vec<TxRef> {
        self.inner.mempool.pending_snapshot()
    }

    /// A pending or mined transaction.
    pub fn transaction(&self, hash: &Hash) -> Option<TxRef> {
        self.inner.mempool.get(hash).or_else(|| {
            self.inner
                .ledger
                .read()
                .chain
                .transaction(hash)
                .map(|(tx, _, _)| tx)
        })
    }

    pub fn receipt(&self, hash: &Hash) -> Option<Receipt> {
        self.inner.ledger.read().chain.receipt(hash)
    }

    /// Why a transaction was rejected by the block producer, if it was.
    pub fn rejection(&self, hash: &Hash) -> Option<SimError> {
        self.inner.ledger.read().producer.rejection(hash).cloned()
    }

    pub fn drop_transaction(&self, hash: &Hash) -> Result<Vec<TxRef>> {
        self.inner.mempool.remove(hash)
    }

    pub fn block(&self, number: u64) -> Result<BlockRef> {
        self.inner.ledger.read().chain.block_at(number)
    }

    pub fn block_by_hash(&self, hash: &Hash) -> Option<BlockRef> {
        self.inner.ledger.read().chain.block_by_hash(hash)
    }

    pub fn latest_block(&self) -> BlockRef {
        self.inner.ledger.read().chain.head().clone()
    }

    pub fn block_number(&self) -> u64 {
        self.inner.ledger.read().chain.height()
    }

    /// Throw the whole chain away and start over from a fresh genesis under `config`.
    pub fn switch_network(&self, config: SimConfig) -> Result<()> {
        let fresh = Ledger::genesis(config)?;
        let mut ledger = self.inner.ledger.write();
        self.inner.mempool.clear();
        self.inner.mempool.set_order(fresh.config.mining.order);
        self.inner
            .mempool
            .set_base_fee(fresh.config.initial_base_fee_per_gas.clone());
        info!("switched to chain id {}", fresh.config.chain_id);
        *ledger = fresh;
        self.inner.head.send_replace(0);
        Ok(())
    }
}
