use std::collections::hash_map::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::common::{Addr, Gas, Hash, Wei};
use crate::core::block_hash_visible;
use crate::error::{Result, SimError};
use crate::tx::{Receipt, TxRef};

/// Fields of a block that are fixed before its transactions run.
#[derive(Clone, Debug)]
pub struct BlockHeader {
    pub number: u64,
    pub parent_hash: Hash,
    pub timestamp: u64,
    pub coinbase: Addr,
    pub gas_limit: Gas,
    pub base_fee: Wei,
}

impl BlockHeader {
    /// Randomness exposed to the block's transactions through `PREVRANDAO`.
    pub fn prev_randao(&self) -> Hash {
        let mut stream = rlp::RlpStream::new_list(2);
        stream.append(&self.parent_hash).append(&self.number);
        Hash::hash(&stream.out())
    }
}

/// A committed block. Immutable once created.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    pub hash: Hash,
    pub parent_hash: Hash,
    pub timestamp: u64,
    #[serde(rename = "miner")]
    pub coinbase: Addr,
    pub gas_limit: Gas,
    pub gas_used: Gas,
    #[serde(rename = "baseFeePerGas")]
    pub base_fee: Wei,
    pub mix_hash: Hash,
    pub state_root: Hash,
    pub transactions: Vec<TxRef>,
    pub receipts: Vec<Receipt>,
}

impl Block {
    /// Hash of the block contents. Receipts are not covered: they embed this hash.
    pub fn compute_hash(
        header: &BlockHeader, gas_used: Gas, state_root: &Hash,
        transactions: &[TxRef],
    ) -> Hash {
        let mut stream = rlp::RlpStream::new_list(9);
        stream
            .append(&header.number)
            .append(&header.parent_hash)
            .append(&header.timestamp)
            .append(&header.coinbase)
            .append(&header.gas_limit)
            .append(&gas_used)
            .append(&header.base_fee)
            .append(state_root);
        stream.begin_list(transactions.len());
        for tx in transactions {
            stream.append(tx.hash());
        }
        Hash::hash(&stream.out())
    }

    pub fn tx_hashes(&self) -> impl Iterator<Item = &Hash> {
        self.transactions.iter().map(|tx| tx.hash())
    }
}

pub struct BlockRef(Arc<Block>);

impl Clone for BlockRef {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl std::ops::Deref for BlockRef {
    type Target = Block;
    fn deref(&self) -> &Block {
        &*self.0
    }
}

impl std::fmt::Debug for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Block#{}({})", self.number, self.hash)
    }
}

impl Serialize for BlockRef {
    fn serialize<S: serde::Serializer>(
        &self, serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Append-only list of blocks, starting with the genesis block. There are no forks.
pub struct Chain {
    head: BlockRef,
    blocks: Vec<BlockRef>,
    by_hash: HashMap<Hash, u64>,
    /// tx hash => (block number, index in block)
    tx_index: HashMap<Hash, (u64, usize)>,
}

impl Chain {
    pub fn new(genesis: Block) -> Self {
        let head = BlockRef(Arc::new(genesis));
        let mut by_hash = HashMap::new();
        by_hash.insert(head.hash.clone(), head.number);
        let mut chain = Chain {
            head: head.clone(),
            blocks: vec![head],
            by_hash,
            tx_index: HashMap::new(),
        };
        chain.index_txs(0);
        chain
    }

    fn index_txs(&mut self, number: u64) {
        let block = self.blocks[number as usize].clone();
        for (i, h) in block.tx_hashes().enumerate() {
            self.tx_index.insert(h.clone(), (number, i));
        }
    }

    /// Append the next block. It must extend the current head.
    pub fn push(&mut self, block: Block) -> Result<BlockRef> {
        if block.number != self.head.number + 1 ||
            block.parent_hash != self.head.hash
        {
            return Err(SimError::BlockNotFound(block.number.saturating_sub(1)))
        }
        let block = BlockRef(Arc::new(block));
        self.by_hash.insert(block.hash.clone(), block.number);
        self.blocks.push(block.clone());
        self.head = block.clone();
        self.index_txs(block.number);
        Ok(block)
    }

    pub fn head(&self) -> &BlockRef {
        &self.head
    }

    pub fn height(&self) -> u64 {
        self.head.number
    }

    pub fn block_at(&self, number: u64) -> Result<BlockRef> {
        self.blocks
            .get(number as usize)
            .cloned()
            .ok_or(SimError::BlockNotFound(number))
    }

    pub fn block_by_hash(&self, hash: &Hash) -> Option<BlockRef> {
        self.by_hash
            .get(hash)
            .and_then(|n| self.blocks.get(*n as usize))
            .cloned()
    }

    /// Hash of block `number` as seen by the next block to be mined: zero unless `number` is one
    /// of the 256 most recent blocks.
    pub fn block_hash_at(&self, number: u64) -> Hash {
        if !block_hash_visible(self.height() + 1, number) {
            return Hash::default()
        }
        self.raw_hash(number)
    }

    /// Hash of block `number` without the visibility window, zero if there is no such block.
    pub fn raw_hash(&self, number: u64) -> Hash {
        self.blocks
            .get(number as usize)
            .map(|b| b.hash.clone())
            .unwrap_or_default()
    }

    /// A mined transaction with its block number and position.
    pub fn transaction(&self, hash: &Hash) -> Option<(TxRef, u64, usize)> {
        let (number, index) = *self.tx_index.get(hash)?;
        let block = self.blocks.get(number as usize)?;
        Some((block.transactions.get(index)?.clone(), number, index))
    }

    pub fn receipt(&self, hash: &Hash) -> Option<Receipt> {
        let (number, index) = *self.tx_index.get(hash)?;
        self.blocks.get(number as usize)?.receipts.get(index).cloned()
    }
}
