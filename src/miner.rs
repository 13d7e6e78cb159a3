//! Block production.
//!
//! [BlockProducer] turns the mempool into blocks, one transaction at a time and always in the
//! order the mempool hands them out. [IntervalMiner] drives it from a tokio timer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::chain::{Block, BlockHeader, BlockRef, Chain};
use crate::common::{Addr, Gas, Hash};
use crate::config::SimConfig;
use crate::core::{BlockInfo, TxExecEnv};
use crate::error::{Result, SimError};
use crate::mempool::{Mempool, PoolEntry};
use crate::processor::{apply_transaction, TxOutcome};
use crate::sim::Simulator;
use crate::state::AccountStore;
use crate::tx::TxRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProducerState {
    /// Waiting for a tick or an explicit mine command.
    Idle,
    /// Taking transactions out of the mempool.
    Collecting,
    /// Running the collected transactions one after another.
    Executing,
    /// The block has been appended to the chain.
    Committed,
}

pub struct BlockProducer {
    state: ProducerState,
    /// Seconds added to the next block's timestamp on top of the block time.
    time_increase: u64,
    next_timestamp: Option<u64>,
    rejected: HashMap<Hash, SimError>,
    /// rejected hashes, oldest first
    rejected_order: VecDeque<Hash>,
}

/// Number of rejections remembered; older ones are forgotten first.
pub const MAX_REJECTIONS: usize = 4096;

impl Default for BlockProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockProducer {
    pub fn new() -> Self {
        Self {
            state: ProducerState::Idle,
            time_increase: 0,
            next_timestamp: None,
            rejected: HashMap::new(),
            rejected_order: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ProducerState {
        self.state
    }

    /// Why a transaction was dropped at inclusion time.
    pub fn rejection(&self, hash: &Hash) -> Option<&SimError> {
        self.rejected.get(hash)
    }

    fn record_rejection(&mut self, hash: Hash, err: SimError) {
        if self.rejected.insert(hash.clone(), err).is_none() {
            self.rejected_order.push_back(hash);
        }
        while self.rejected_order.len() > MAX_REJECTIONS {
            if let Some(old) = self.rejected_order.pop_front() {
                self.rejected.remove(&old);
            }
        }
    }

    pub fn increase_time(&mut self, seconds: u64) {
        self.time_increase = self.time_increase.saturating_add(seconds);
    }

    /// Pin the timestamp of the next block. It has to move time forward.
    pub fn set_next_block_timestamp(
        &mut self, timestamp: u64, head: &Block,
    ) -> Result<()> {
        if timestamp <= head.timestamp {
            return Err(SimError::InvalidTimestamp {
                requested: timestamp,
                current: head.timestamp,
            })
        }
        self.next_timestamp = Some(timestamp);
        Ok(())
    }

    /// Header the next block will get.
    pub fn next_header(&self, head: &Block, config: &SimConfig) -> BlockHeader {
        let timestamp = self.next_timestamp.unwrap_or_else(|| {
            head.timestamp
                .saturating_add(config.block_time)
                .saturating_add(self.time_increase)
        });
        BlockHeader {
            number: head.number + 1,
            parent_hash: head.hash.clone(),
            timestamp,
            coinbase: config.coinbase.clone(),
            gas_limit: config.block_gas_limit,
            base_fee: config.initial_base_fee_per_gas.clone(),
        }
    }

    /// Execution environment of a block built on top of `chain`'s head.
    pub fn block_info(header: &BlockHeader) -> BlockInfo {
        BlockInfo {
            coinbase: header.coinbase.clone(),
            timestamp: header.timestamp,
            number: header.number,
            prevrandao: header.prev_randao(),
            gas_limit: header.gas_limit,
            base_fee: header.base_fee.clone().into(),
        }
    }

    /// Mine one block: collect, execute, commit.
    ///
    /// Transactions that fail validation are dropped and remembered as rejected. Transactions that
    /// no longer fit the remaining block gas go back to the mempool, together with the later
    /// transactions of the same sender.
    pub fn produce(
        &mut self, store: &mut AccountStore, chain: &mut Chain,
        mempool: &Mempool, config: &SimConfig,
    ) -> Result<BlockRef> {
        let header = self.next_header(chain.head(), config);

        self.state = ProducerState::Collecting;
        let entries = mempool.drain(config.max_block_transactions);

        self.state = ProducerState::Executing;
        let hash_of = |n: u64| chain.raw_hash(n);
        let env = TxExecEnv {
            chain_id: config.chain_id.into(),
            block: Self::block_info(&header),
            block_hash: &hash_of,
        };
        let mut gas_left: Gas = header.gas_limit;
        let mut deferred: Vec<PoolEntry> = Vec::new();
        let mut deferred_senders: HashSet<Addr> = HashSet::new();
        let mut included: Vec<(TxRef, TxOutcome)> = Vec::new();
        for entry in entries {
            if deferred_senders.contains(&entry.from) {
                deferred.push(entry);
                continue
            }
            if entry.gas_limit > gas_left && entry.gas_limit <= header.gas_limit {
                debug!("tx {} does not fit in block #{}", entry.hash(), header.number);
                deferred_senders.insert(entry.from.clone());
                deferred.push(entry);
                continue
            }
            match apply_transaction(store, &env, &entry) {
                Ok(outcome) => {
                    gas_left -= outcome.gas_used;
                    included.push((entry.into_tx(), outcome));
                }
                Err(err) => {
                    warn!("rejected tx {}: {}", entry.hash(), err);
                    self.record_rejection(entry.hash().clone(), err);
                }
            }
        }
        mempool.requeue(deferred);

        let state_root = store.seal();
        let gas_used = header.gas_limit - gas_left;
        let transactions: Vec<TxRef> =
            included.iter().map(|(tx, _)| tx.clone()).collect();
        let hash =
            Block::compute_hash(&header, gas_used, &state_root, &transactions);
        let mut cumulative = 0;
        let receipts = included
            .into_iter()
            .enumerate()
            .map(|(i, (tx, outcome))| {
                cumulative += outcome.gas_used;
                outcome.into_receipt(&tx, header.number, &hash, i, cumulative)
            })
            .collect();
        let block = Block {
            number: header.number,
            hash,
            parent_hash: header.parent_hash.clone(),
            timestamp: header.timestamp,
            coinbase: header.coinbase.clone(),
            gas_limit: header.gas_limit,
            gas_used,
            base_fee: header.base_fee.clone(),
            mix_hash: header.prev_randao(),
            state_root,
            transactions,
            receipts,
        };
        let block = chain.push(block)?;
        self.time_increase = 0;
        self.next_timestamp = None;
        self.state = ProducerState::Committed;
        info!(
            "mined block #{} {} (txs = {}, gas used = {})",
            block.number,
            block.hash,
            block.transactions.len(),
            block.gas_used
        );
        self.state = ProducerState::Idle;
        Ok(block)
    }
}

/// Mines a block every `period` on a tokio task until stopped or dropped.
pub struct IntervalMiner {
    handle: JoinHandle<()>,
}

impl IntervalMiner {
    /// Must be called from within a tokio runtime.
    pub fn start(sim: Simulator, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = sim.mine_blocks(1) {
                    warn!("interval miner: {}", e);
                }
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for IntervalMiner {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_log_is_bounded() {
        let mut producer = BlockProducer::new();
        for i in 0..(MAX_REJECTIONS as u64 + 10) {
            producer.record_rejection(Hash::from(i), SimError::UnknownTransaction(Hash::from(i)));
        }
        assert_eq!(producer.rejected.len(), MAX_REJECTIONS);
        assert_eq!(producer.rejected_order.len(), MAX_REJECTIONS);
        // the oldest ones went first
        assert!(producer.rejection(&Hash::from(9u64)).is_none());
        assert!(producer.rejection(&Hash::from(10u64)).is_some());
        let last = Hash::from(MAX_REJECTIONS as u64 + 9);
        assert!(producer.rejection(&last).is_some());

        // recording the same hash again does not take a second slot
        producer.record_rejection(last.clone(), SimError::AlreadyKnown(last.clone()));
        assert_eq!(producer.rejected_order.len(), MAX_REJECTIONS);
        assert!(matches!(producer.rejection(&last), Some(SimError::AlreadyKnown(_))));
    }
}
