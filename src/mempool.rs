//! Pending transactions.
//!
//! Every accepted transaction gets a sequence number from a monotonic arrival counter taken under
//! the pool lock, so racing submitters are serialized in one deterministic order. A sender's
//! transactions are always released in nonce order; the ordering policy only decides which
//! sender's next transaction comes first.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, VecDeque};

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::common::{Addr, Hash, Wei, U256};
use crate::core::WorldStateR;
use crate::error::{Result, SimError};
use crate::tx::{Transaction, TxRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MempoolOrder {
    /// Arrival order.
    Fifo,
    /// Highest tip first, ties broken by arrival order.
    #[default]
    Priority,
}

/// A transaction as held by the pool, tagged with its arrival number.
#[derive(Clone, Debug)]
pub struct PoolEntry {
    seq: u64,
    tx: TxRef,
}

impl PoolEntry {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn tx(&self) -> &TxRef {
        &self.tx
    }

    pub fn into_tx(self) -> TxRef {
        self.tx
    }
}

impl std::ops::Deref for PoolEntry {
    type Target = Transaction;
    fn deref(&self) -> &Transaction {
        &self.tx
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Rank(Wei, Reverse<u64>);

struct MempoolInner {
    next_seq: u64,
    by_hash: HashMap<Hash, TxRef>,
    /// sender => nonce => entry
    by_sender: BTreeMap<Addr, BTreeMap<u64, PoolEntry>>,
    order: MempoolOrder,
    base_fee: Wei,
}

impl MempoolInner {
    fn queued(&self, sender: &Addr) -> usize {
        self.by_sender.get(sender).map(|q| q.len()).unwrap_or(0)
    }

    /// Nonce of the sender's next transaction, counting the ones already queued.
    fn pending_nonce<S: WorldStateR + ?Sized>(&self, sender: &Addr, state: &S) -> u64 {
        state.get_nonce(sender) + self.queued(sender) as u64
    }

    fn rank(&self, e: &PoolEntry) -> Rank {
        let tip = match self.order {
            MempoolOrder::Fifo => Wei::default(),
            MempoolOrder::Priority => e.tx.fee.priority(&self.base_fee),
        };
        Rank(tip, Reverse(e.seq))
    }

    fn insert(&mut self, entry: PoolEntry) {
        self.by_hash.insert(entry.hash().clone(), entry.tx.clone());
        self.by_sender
            .entry(entry.from.clone())
            .or_default()
            .insert(entry.nonce, entry);
    }

    fn remove_entry(&mut self, sender: &Addr, nonce: u64) -> Option<PoolEntry> {
        let queue = self.by_sender.get_mut(sender)?;
        let entry = queue.remove(&nonce)?;
        if queue.is_empty() {
            self.by_sender.remove(sender);
        }
        self.by_hash.remove(entry.hash());
        Some(entry)
    }

    /// Up to `limit` entries in inclusion order, without removing them.
    fn ordered(&self, limit: usize) -> Vec<PoolEntry> {
        let mut queues: Vec<VecDeque<&PoolEntry>> = self
            .by_sender
            .values()
            .map(|q| q.values().collect())
            .collect();
        let mut heads = BinaryHeap::new();
        for (i, q) in queues.iter().enumerate() {
            if let Some(e) = q.front() {
                heads.push((self.rank(e), i));
            }
        }
        let mut out = Vec::new();
        while out.len() < limit {
            let (_, i) = match heads.pop() {
                Some(h) => h,
                None => break,
            };
            if let Some(e) = queues[i].pop_front() {
                out.push(e.clone());
            }
            if let Some(e) = queues[i].front() {
                heads.push((self.rank(e), i));
            }
        }
        out
    }
}

/// The mempool. All operations take `&self` and are safe to call from several threads.
pub struct Mempool {
    inner: Mutex<MempoolInner>,
}

impl Mempool {
    pub fn new(order: MempoolOrder, base_fee: Wei) -> Self {
        Self {
            inner: Mutex::new(MempoolInner {
                next_seq: 0,
                by_hash: HashMap::new(),
                by_sender: BTreeMap::new(),
                order,
                base_fee,
            }),
        }
    }

    /// Validate a transaction against `state` (the current, not yet mined state) and queue it.
    ///
    /// The expected nonce accounts for the sender's transactions already waiting in the pool.
    /// The balance check is a pre-check only: it does not reserve funds, the transaction is
    /// validated again when a block includes it.
    pub fn submit<S: WorldStateR + ?Sized>(
        &self, tx: Transaction, state: &S,
    ) -> Result<TxRef> {
        let sender = tx.from.clone();
        self.submit_with(&sender, move |_| tx, state)
    }

    /// Build the transaction from `sender`'s next pending nonce and queue it, both under the pool
    /// lock. Concurrent callers for the same sender get consecutive nonces in arrival order.
    pub fn submit_with<S, F>(
        &self, sender: &Addr, build: F, state: &S,
    ) -> Result<TxRef>
    where
        S: WorldStateR + ?Sized,
        F: FnOnce(u64) -> Transaction,
    {
        let mut inner = self.inner.lock();
        let tx = build(inner.pending_nonce(sender, state));
        if inner.by_hash.contains_key(tx.hash()) {
            return Err(SimError::AlreadyKnown(tx.hash().clone()))
        }
        let expected = inner.pending_nonce(&tx.from, state);
        if tx.nonce != expected {
            return Err(SimError::InvalidNonce {
                sender: tx.from.clone(),
                expected,
                got: tx.nonce,
            })
        }
        let available = state.get_balance(&tx.from);
        match tx.max_cost() {
            Some(cost) if cost <= available => (),
            cost => {
                return Err(SimError::InsufficientBalance {
                    required: cost.unwrap_or_else(|| Wei::from(U256::MAX)),
                    available,
                })
            }
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let tx = TxRef::new(tx);
        debug!(
            "mempool: accepted {} from {} (nonce = {}, seq = {})",
            tx.hash(),
            tx.from,
            tx.nonce,
            seq
        );
        inner.insert(PoolEntry { seq, tx: tx.clone() });
        Ok(tx)
    }

    /// The pending transactions in the order the next block would include them. Nothing is
    /// removed.
    pub fn pending_snapshot(&self) -> Vec<TxRef> {
        self.inner
            .lock()
            .ordered(usize::MAX)
            .into_iter()
            .map(PoolEntry::into_tx)
            .collect()
    }

    /// Remove and return up to `n` transactions in inclusion order.
    pub fn drain(&self, n: usize) -> Vec<PoolEntry> {
        let mut inner = self.inner.lock();
        let out = inner.ordered(n);
        for e in out.iter() {
            inner.remove_entry(&e.from, e.nonce);
        }
        out
    }

    /// Put drained entries back, keeping their original arrival numbers.
    pub fn requeue<I: IntoIterator<Item = PoolEntry>>(&self, entries: I) {
        let mut inner = self.inner.lock();
        for e in entries {
            if !inner.by_hash.contains_key(e.hash()) {
                inner.insert(e)
            }
        }
    }

    /// Drop a pending transaction together with the sender's later transactions, which could never
    /// execute without it. Returns everything removed.
    pub fn remove(&self, hash: &Hash) -> Result<Vec<TxRef>> {
        let mut inner = self.inner.lock();
        let tx = inner
            .by_hash
            .get(hash)
            .cloned()
            .ok_or_else(|| SimError::UnknownTransaction(hash.clone()))?;
        let nonces: Vec<u64> = inner
            .by_sender
            .get(&tx.from)
            .map(|q| q.range(tx.nonce..).map(|(n, _)| *n).collect())
            .unwrap_or_default();
        let removed: Vec<TxRef> = nonces
            .into_iter()
            .filter_map(|n| inner.remove_entry(&tx.from, n))
            .map(PoolEntry::into_tx)
            .collect();
        debug!("mempool: dropped {} transaction(s) from {}", removed.len(), tx.from);
        Ok(removed)
    }

    pub fn get(&self, hash: &Hash) -> Option<TxRef> {
        self.inner.lock().by_hash.get(hash).cloned()
    }

    /// Number of transactions `sender` has waiting.
    pub fn queued(&self, sender: &Addr) -> usize {
        self.inner.lock().queued(sender)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_hash.clear();
        inner.by_sender.clear();
    }

    pub fn order(&self) -> MempoolOrder {
        self.inner.lock().order
    }

    pub fn set_order(&self, order: MempoolOrder) {
        self.inner.lock().order = order;
    }

    pub fn set_base_fee(&self, base_fee: Wei) {
        self.inner.lock().base_fee = base_fee;
    }
}
