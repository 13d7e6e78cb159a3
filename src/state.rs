//! In-memory account store with state versioning.
//!
//! The state is a stack of delta layers. Every mined block freezes one layer (the *pending* layer)
//! into an immutable, shared [StateLayer]; above the pending layer, each open call frame owns a
//! *scope* layer. Taking a snapshot pushes a scope, reverting drops it, and committing merges it
//! into the layer below. Reads walk the layers from the top until some layer knows the answer, so
//! a frame always sees its own writes while the frozen history stays untouched. Frozen layers are
//! reached through a per-account index of the blocks that wrote the account, so empty blocks add
//! nothing to the cost of a read.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::debug;
use sha3::Digest;

use crate::common::{Addr, Hash, Wei, U256};
use crate::core::{
    ContractCode, Log, Snapshot, Transferable, WorldState, WorldStateR,
    WorldStateW,
};
use crate::error::{Result, SimError};

/// A fully materialized account.
#[derive(Clone, Debug)]
pub struct Account {
    pub balance: Wei,
    pub nonce: u64,
    pub code: Arc<ContractCode>,
    /// Only non-zero slots are listed.
    pub storage: BTreeMap<Hash, U256>,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            balance: Wei::default(),
            nonce: 0,
            code: ContractCode::empty(),
            storage: BTreeMap::new(),
        }
    }
}

impl Account {
    pub fn with_balance(balance: Wei) -> Self {
        Self {
            balance,
            ..Default::default()
        }
    }

    pub fn is_contract(&self) -> bool {
        !self.code.is_empty()
    }
}

/// Changes made to one account within a layer. `reset` hides everything below this layer.
#[derive(Clone, Default, Debug)]
pub struct AccountDelta {
    reset: bool,
    balance: Option<Wei>,
    nonce: Option<u64>,
    code: Option<Arc<ContractCode>>,
    storage: BTreeMap<Hash, U256>,
}

impl AccountDelta {
    fn merge(&mut self, upper: AccountDelta) {
        if upper.reset {
            *self = upper;
            return
        }
        if upper.balance.is_some() {
            self.balance = upper.balance
        }
        if upper.nonce.is_some() {
            self.nonce = upper.nonce
        }
        if upper.code.is_some() {
            self.code = upper.code
        }
        self.storage.extend(upper.storage);
    }
}

/// A set of account deltas plus the logs emitted while the layer was on top.
#[derive(Clone, Default, Debug)]
pub struct StateLayer {
    accounts: BTreeMap<Addr, AccountDelta>,
    logs: Vec<Log>,
}

impl StateLayer {
    fn merge(&mut self, upper: StateLayer) {
        for (addr, delta) in upper.accounts {
            self.accounts.entry(addr).or_default().merge(delta);
        }
        self.logs.extend(upper.logs);
    }

    fn delta_mut(&mut self, addr: &Addr) -> &mut AccountDelta {
        self.accounts.entry(addr.clone()).or_default()
    }

    /// Accounts written in this layer.
    pub fn touched(&self) -> impl Iterator<Item = &Addr> {
        self.accounts.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.logs.is_empty()
    }

    /// Deterministic digest of the account changes (logs are not part of the state).
    pub fn digest(&self) -> Hash {
        let mut hasher = sha3::Keccak256::new();
        let mut word = [0u8; 32];
        for (addr, delta) in self.accounts.iter() {
            hasher.update(addr.as_bytes());
            hasher.update([delta.reset as u8]);
            match &delta.balance {
                Some(balance) => {
                    balance.to_big_endian(&mut word);
                    hasher.update([1]);
                    hasher.update(word);
                }
                None => hasher.update([0]),
            }
            match delta.nonce {
                Some(nonce) => {
                    hasher.update([1]);
                    hasher.update(nonce.to_be_bytes());
                }
                None => hasher.update([0]),
            }
            match &delta.code {
                Some(code) => {
                    hasher.update([1]);
                    hasher.update(code.get_hash().as_bytes());
                }
                None => hasher.update([0]),
            }
            for (key, val) in delta.storage.iter() {
                val.to_big_endian(&mut word);
                hasher.update(key.as_bytes());
                hasher.update(word);
            }
        }
        Hash::from_slice(hasher.finalize().as_slice())
    }
}

/// The stack of layers visible from some point, top first.
#[derive(Clone, Copy)]
struct Layers<'a> {
    scopes: &'a [StateLayer],
    pending: Option<&'a StateLayer>,
    committed: &'a [Arc<StateLayer>],
    /// blocks whose layer wrote each account, ascending
    history: &'a HashMap<Addr, Vec<usize>>,
}

impl<'a> Layers<'a> {
    /// The deltas of `addr`, top first. Frozen layers are looked up through the account's
    /// history, so blocks that never touched it are not visited.
    fn deltas<'b>(
        self, addr: &'b Addr,
    ) -> impl Iterator<Item = &'a AccountDelta> + 'b
    where
        'a: 'b,
    {
        let committed = self.committed;
        let blocks: &'a [usize] = match self.history.get(addr) {
            Some(h) => &h[..h.partition_point(|n| *n < committed.len())],
            None => &[],
        };
        self.scopes
            .iter()
            .rev()
            .chain(self.pending)
            .filter_map(move |l| l.accounts.get(addr))
            .chain(blocks.iter().rev().filter_map(move |n| {
                committed.get(*n).and_then(|l| l.accounts.get(addr))
            }))
    }

    fn find<T>(
        self, addr: &Addr, f: impl Fn(&'a AccountDelta) -> Option<T>,
    ) -> Option<T> {
        for delta in self.deltas(addr) {
            if let Some(v) = f(delta) {
                return Some(v)
            }
            if delta.reset {
                return None
            }
        }
        None
    }

    fn balance(self, addr: &Addr) -> Wei {
        self.find(addr, |d| d.balance.clone()).unwrap_or_default()
    }

    fn nonce(self, addr: &Addr) -> u64 {
        self.find(addr, |d| d.nonce).unwrap_or(0)
    }

    fn code(self, addr: &Addr) -> Arc<ContractCode> {
        self.find(addr, |d| d.code.clone())
            .unwrap_or_else(ContractCode::empty)
    }

    fn storage(self, addr: &Addr, key: &Hash) -> U256 {
        self.find(addr, |d| d.storage.get(key).copied())
            .unwrap_or_default()
    }

    fn exist(self, addr: &Addr) -> bool {
        self.deltas(addr).next().is_some()
    }

    fn account(self, addr: &Addr) -> Option<Account> {
        if !self.exist(addr) {
            return None
        }
        let mut storage = BTreeMap::new();
        for delta in self.deltas(addr) {
            for (key, val) in delta.storage.iter() {
                storage.entry(key.clone()).or_insert(*val);
            }
            if delta.reset {
                break
            }
        }
        storage.retain(|_, v: &mut U256| !v.is_zero());
        Some(Account {
            balance: self.balance(addr),
            nonce: self.nonce(addr),
            code: self.code(addr),
            storage,
        })
    }
}

/// The account store: frozen per-block layers, the pending layer and the open scopes.
pub struct AccountStore {
    /// `committed[n]` holds the changes made by block `n` (block 0 is the genesis allocation).
    committed: Vec<Arc<StateLayer>>,
    history: HashMap<Addr, Vec<usize>>,
    /// state root after each committed block
    roots: Vec<Hash>,
    pending: StateLayer,
    scopes: Vec<StateLayer>,
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore {
    pub fn new() -> Self {
        Self {
            committed: Vec::new(),
            history: HashMap::new(),
            roots: Vec::new(),
            pending: StateLayer::default(),
            scopes: Vec::new(),
        }
    }

    #[inline(always)]
    fn layers(&self) -> Layers<'_> {
        Layers {
            scopes: &self.scopes,
            pending: Some(&self.pending),
            committed: &self.committed,
            history: &self.history,
        }
    }

    #[inline(always)]
    fn top_mut(&mut self) -> &mut StateLayer {
        self.scopes.last_mut().unwrap_or(&mut self.pending)
    }

    /// Current view of an account, `None` if it was never written.
    pub fn get(&self, addr: &Addr) -> Option<Account> {
        self.layers().account(addr)
    }

    /// Replace an account wholesale; whatever was stored before (including storage) is hidden.
    pub fn set(&mut self, addr: &Addr, account: Account) {
        let delta = AccountDelta {
            reset: true,
            balance: Some(account.balance),
            nonce: Some(account.nonce),
            code: Some(account.code),
            storage: account.storage,
        };
        self.top_mut().accounts.insert(addr.clone(), delta);
    }

    /// Move funds between accounts. Fails without touching either balance if `from` cannot cover
    /// `amount`.
    pub fn transfer(&mut self, from: &Addr, to: &Addr, amount: &Wei) -> Result<()> {
        let available = self.get_balance(from);
        if &available < amount {
            return Err(SimError::InsufficientBalance {
                required: amount.clone(),
                available,
            })
        }
        self.transfer_balance(from, to, amount)
            .ok_or_else(|| SimError::InsufficientBalance {
                required: amount.clone(),
                available: self.get_balance(from),
            })
    }

    pub fn storage_read(&self, addr: &Addr, key: &Hash) -> U256 {
        self.get_state(addr, key)
    }

    pub fn storage_write(&mut self, addr: &Addr, key: &Hash, val: &U256) {
        self.set_state(addr, key, val)
    }

    /// Logs recorded in the pending layer since the last call.
    pub fn take_logs(&mut self) -> Vec<Log> {
        std::mem::take(&mut self.top_mut().logs)
    }

    /// Number of open scopes above the pending layer.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Freeze the pending layer as the changes of the next block and return the new state root.
    pub fn seal(&mut self) -> Hash {
        if !self.scopes.is_empty() {
            debug!("sealing with {} open scopes, merging them", self.scopes.len());
            self.commit(Snapshot::new(1));
        }
        let mut layer = std::mem::take(&mut self.pending);
        layer.logs.clear();
        let parent = self.roots.last().cloned().unwrap_or_default();
        let mut hasher = sha3::Keccak256::new();
        hasher.update(parent.as_bytes());
        hasher.update(layer.digest().as_bytes());
        let root = Hash::from_slice(hasher.finalize().as_slice());
        let number = self.committed.len();
        for addr in layer.accounts.keys() {
            self.history.entry(addr.clone()).or_default().push(number);
        }
        self.committed.push(Arc::new(layer));
        self.roots.push(root.clone());
        root
    }

    /// Number of the last sealed block.
    pub fn height(&self) -> Option<u64> {
        (self.committed.len() as u64).checked_sub(1)
    }

    pub fn root_at(&self, number: u64) -> Option<&Hash> {
        self.roots.get(number as usize)
    }

    /// Changes made by block `number`.
    pub fn layer_at(&self, number: u64) -> Option<&Arc<StateLayer>> {
        self.committed.get(number as usize)
    }

    /// The changes waiting for the next block.
    pub fn pending_layer(&self) -> &StateLayer {
        &self.pending
    }

    /// Read-only view of the state as of the end of block `number`.
    pub fn at(&self, number: u64) -> Result<StateAt<'_>> {
        let n = number as usize;
        if n >= self.committed.len() {
            return Err(SimError::BlockNotFound(number))
        }
        Ok(StateAt {
            layers: Layers {
                scopes: &[],
                pending: None,
                committed: &self.committed[..=n],
                history: &self.history,
            },
            number,
        })
    }
}

impl WorldStateR for AccountStore {
    fn get_state(&self, account: &Addr, key: &Hash) -> U256 {
        self.layers().storage(account, key)
    }

    fn get_balance(&self, account: &Addr) -> Wei {
        self.layers().balance(account)
    }

    fn get_code(&self, account: &Addr) -> Arc<ContractCode> {
        self.layers().code(account)
    }

    fn get_nonce(&self, account: &Addr) -> u64 {
        self.layers().nonce(account)
    }

    fn exist(&self, account: &Addr) -> bool {
        self.layers().exist(account)
    }
}

impl WorldStateW for AccountStore {
    fn set_state(&mut self, account: &Addr, key: &Hash, val: &U256) {
        self.top_mut()
            .delta_mut(account)
            .storage
            .insert(key.clone(), *val);
    }

    fn set_balance(&mut self, account: &Addr, balance: &Wei) {
        self.top_mut().delta_mut(account).balance = Some(balance.clone());
    }

    fn set_code(&mut self, account: &Addr, code: Arc<ContractCode>) {
        self.top_mut().delta_mut(account).code = Some(code);
    }

    fn set_nonce(&mut self, account: &Addr, nonce: u64) {
        self.top_mut().delta_mut(account).nonce = Some(nonce);
    }

    fn add_log(&mut self, log: Log) {
        self.top_mut().logs.push(log);
    }
}

impl WorldState for AccountStore {
    fn snapshot(&mut self) -> Snapshot {
        self.scopes.push(StateLayer::default());
        Snapshot::new(self.scopes.len())
    }

    fn revert_to(&mut self, snapshot: Snapshot) {
        self.scopes.truncate(snapshot.depth().saturating_sub(1));
    }

    fn commit(&mut self, snapshot: Snapshot) {
        let keep = snapshot.depth().saturating_sub(1);
        while self.scopes.len() > keep {
            if let Some(top) = self.scopes.pop() {
                self.top_mut().merge(top);
            }
        }
    }
}

/// Historical, read-only view of the state at the end of a mined block.
#[derive(Clone, Copy)]
pub struct StateAt<'a> {
    layers: Layers<'a>,
    number: u64,
}

impl<'a> StateAt<'a> {
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn get(&self, addr: &Addr) -> Option<Account> {
        self.layers.account(addr)
    }
}

impl<'a> WorldStateR for StateAt<'a> {
    fn get_state(&self, account: &Addr, key: &Hash) -> U256 {
        self.layers.storage(account, key)
    }

    fn get_balance(&self, account: &Addr) -> Wei {
        self.layers.balance(account)
    }

    fn get_code(&self, account: &Addr) -> Arc<ContractCode> {
        self.layers.code(account)
    }

    fn get_nonce(&self, account: &Addr) -> u64 {
        self.layers.nonce(account)
    }

    fn exist(&self, account: &Addr) -> bool {
        self.layers.exist(account)
    }
}
