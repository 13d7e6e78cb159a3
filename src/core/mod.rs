//! The call interpreter.
//!
//! A transaction is executed by [execute] against anything that implements [WorldState]. Nested
//! calls are never executed with native recursion: every call level is a heap-allocated frame on
//! an explicit stack, so the depth limit, gas forwarding and rollback at frame boundaries are all
//! handled in one loop.

use std::sync::Arc;

use bitvec::vec::BitVec;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

mod alu;
mod call;
mod exec;
mod memory;
pub mod opcode;
pub mod params;
mod stack;

use crate::common::{checked_as_u64, encode_word, selector, Addr, Bytes, Gas, Hash, U256};
pub use exec::{execute, Transferable, TxExecResult, TxInput};
use opcode::Opcode;

/// How `ADD`, `SUB`, `MUL` and `EXP` treat results that do not fit in 256 bits.
///
/// This is an attribute of the deployed code (older compilers emitted unchecked arithmetic), so
/// two contracts in the same transaction may behave differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArithMode {
    /// Results wrap around modulo 2^256.
    #[default]
    Wrapping,
    /// Overflow aborts the frame with [ExecError::ArithmeticOverflow].
    Checked,
}

/// Immutable code object that can be read-shared by threads. It caches the code hash and the
/// valid jump destinations.
pub struct ContractCode {
    code: Box<[u8]>,
    bitmap: BitVec,
    hash: Hash,
    arith: ArithMode,
}

impl ContractCode {
    pub fn new(code: Box<[u8]>, arith: ArithMode) -> Self {
        let bitmap = crate::common::gen_code_bitmap(&code);
        let hash = Hash::hash(&code);
        Self {
            code,
            bitmap,
            hash,
            arith,
        }
    }

    /// The shared code object of accounts without code.
    pub fn empty() -> Arc<Self> {
        static V: OnceCell<Arc<ContractCode>> = OnceCell::new();
        V.get_or_init(|| Arc::new(Self::new(Vec::new().into(), ArithMode::Wrapping)))
            .clone()
    }

    fn is_opcode(&self, dest: usize) -> bool {
        self.bitmap.get(dest).map(|b| *b).unwrap_or(false)
    }

    pub fn is_valid_jumpdest(&self, dest: &U256) -> bool {
        let dest = match checked_as_u64(dest) {
            Some(dest) => dest as usize,
            None => return false,
        };
        self.is_opcode(dest) && self.code[dest] == Opcode::JumpDest as u8
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    #[inline(always)]
    pub fn get_hash(&self) -> &Hash {
        &self.hash
    }

    #[inline(always)]
    pub fn arith(&self) -> ArithMode {
        self.arith
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

impl std::fmt::Debug for ContractCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractCode")
            .field("hash", &self.hash)
            .field("len", &self.code.len())
            .field("arith", &self.arith)
            .finish()
    }
}

/// A log record emitted by `LOG0..LOG4`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Log {
    pub address: Addr,
    pub topics: Vec<Hash>,
    pub data: Bytes,
}

/// Token returned by [WorldState::snapshot]. Snapshots must be released (reverted or committed) in
/// the reverse order of their creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot(usize);

impl Snapshot {
    pub(crate) fn new(depth: usize) -> Self {
        Self(depth)
    }

    pub(crate) fn depth(&self) -> usize {
        self.0
    }
}

/// Read half of the world state.
pub trait WorldStateR {
    /// Get the value from the `account` state space, indexed by `key`.
    fn get_state(&self, account: &Addr, key: &Hash) -> U256;
    /// Get the balance of the `account`.
    fn get_balance(&self, account: &Addr) -> crate::common::Wei;
    /// Get code of the contract account. Accounts without code return [ContractCode::empty].
    fn get_code(&self, account: &Addr) -> Arc<ContractCode>;
    /// Get nonce of the account.
    fn get_nonce(&self, account: &Addr) -> u64;
    /// Check if an account exists.
    fn exist(&self, account: &Addr) -> bool;
}

/// Write half of the world state. Writes are buffered in the innermost open snapshot.
pub trait WorldStateW {
    fn set_state(&mut self, account: &Addr, key: &Hash, val: &U256);
    fn set_balance(&mut self, account: &Addr, balance: &crate::common::Wei);
    fn set_code(&mut self, account: &Addr, code: Arc<ContractCode>);
    fn set_nonce(&mut self, account: &Addr, nonce: u64);
    fn add_log(&mut self, log: Log);
}

/// A world state with nested, atomically revertible scopes.
pub trait WorldState: WorldStateR + WorldStateW {
    /// Open a new scope; all writes from now on can be undone with [WorldState::revert_to].
    fn snapshot(&mut self) -> Snapshot;
    /// Discard every write (and log) made since `snapshot` was taken.
    fn revert_to(&mut self, snapshot: Snapshot);
    /// Keep the writes made since `snapshot` by merging them into the enclosing scope.
    fn commit(&mut self, snapshot: Snapshot);
}

/// Execution environment: the external information the interpreter needs.
pub struct TxExecEnv<'a> {
    /// Chain ID.
    pub chain_id: U256,
    /// Block-related information.
    pub block: BlockInfo,
    /// Returns the hash of a committed block. Only consulted for numbers inside the 256-block
    /// window of the executing block.
    pub block_hash: &'a dyn Fn(u64) -> Hash,
}

#[derive(Clone, Debug)]
pub struct BlockInfo {
    pub coinbase: Addr,
    pub timestamp: u64,
    pub number: u64,
    pub prevrandao: Hash,
    pub gas_limit: Gas,
    pub base_fee: U256,
}

/// Number of trailing blocks whose hashes stay visible.
pub const BLOCK_HASH_WINDOW: u64 = 256;

/// Whether the hash of block `n` can be read while block `current` is being built. Older hashes
/// (and the hash of `current` itself or later blocks) read as zero.
#[inline(always)]
pub fn block_hash_visible(current: u64, n: u64) -> bool {
    n < current && current - n <= BLOCK_HASH_WINDOW
}

/// Frame-level failures. These never escape a transaction: they are turned into a failed receipt.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
pub enum ExecError {
    #[error("out of gas")]
    OutOfGas,
    #[error("contract creation code storage out of gas")]
    CodeStoreOutOfGas,
    #[error("max call depth exceeded")]
    Depth,
    #[error("insufficient balance for transfer")]
    InsufficientBalance,
    #[error("contract address collision")]
    ContractAddrCollision,
    #[error("execution reverted")]
    Reverted,
    #[error("max code size exceeded")]
    MaxCodeSizeExceeded,
    #[error("invalid jump destination")]
    InvalidJump,
    #[error("write protection")]
    WriteProtection,
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,
    #[error("gas uint64 overflow")]
    GasIntOverflow,
    #[error("invalid code: must not begin with 0xef")]
    InvalidCode,
    #[error("nonce uint64 overflow")]
    NonceIntOverflow,
    #[error("stack limit reached")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("memory limit reached")]
    OutOfMemory,
    #[error("invalid opcode")]
    InvalidOpcode,
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
}

impl ExecError {
    /// Whether the failing frame hands its unused gas back to the caller. Everything else burns
    /// the whole allowance of the frame.
    #[inline(always)]
    pub fn keeps_gas(&self) -> bool {
        matches!(self, ExecError::Reverted | ExecError::ArithmeticOverflow)
    }

    /// Return data produced by the failure itself.
    pub fn output(&self) -> Bytes {
        match self {
            ExecError::ArithmeticOverflow => panic_data(PANIC_ARITHMETIC_OVERFLOW),
            _ => Bytes::empty(),
        }
    }
}

/// Solidity panic code for arithmetic overflow/underflow.
pub const PANIC_ARITHMETIC_OVERFLOW: u64 = 0x11;

/// ABI encoding of `Panic(uint256 code)`.
pub fn panic_data(code: u64) -> Bytes {
    let mut data = selector("Panic(uint256)").to_vec();
    data.extend_from_slice(&encode_word(&code.into()));
    data.into()
}

fn gas_checked_mul(x: Gas, y: Gas) -> Result<Gas, ExecError> {
    x.checked_mul(y).ok_or(ExecError::GasIntOverflow)
}

fn get_data(src: &[u8], mut off: u64, len: u64) -> Vec<u8> {
    let src_len = src.len() as u64;
    if off > src_len {
        off = src_len
    }
    let mut end = off.saturating_add(len);
    if end > src_len {
        end = src_len
    }
    let mut data = src[off as usize..end as usize].to_vec();
    // right-pad bytes
    data.resize(len as usize, 0);
    data
}

#[test]
fn test_get_data() {
    assert_eq!(
        get_data(&hex::decode("00010203").unwrap(), 0, 4),
        hex::decode("00010203").unwrap()
    );
    assert_eq!(
        get_data(&hex::decode("00010203").unwrap(), 2, 4),
        hex::decode("02030000").unwrap()
    );
    assert_eq!(get_data(&[1, 2], u64::MAX, 2), vec![0, 0]);
}

#[test]
fn test_panic_data() {
    let data = panic_data(PANIC_ARITHMETIC_OVERFLOW);
    assert_eq!(hex::encode(&data[..4]), "4e487b71");
    assert_eq!(data.len(), 36);
    assert_eq!(data[35], 0x11);
}

#[test]
fn test_block_hash_window() {
    assert!(block_hash_visible(10, 9));
    assert!(!block_hash_visible(10, 10));
    assert!(block_hash_visible(300, 44));
    assert!(!block_hash_visible(300, 43));
}

#[test]
fn test_jumpdest_in_push_data() {
    // PUSH1 0x5b JUMPDEST
    let code = ContractCode::new(vec![0x60, 0x5b, 0x5b].into(), ArithMode::Wrapping);
    assert!(!code.is_valid_jumpdest(&1.into()));
    assert!(code.is_valid_jumpdest(&2.into()));
    assert!(!code.is_valid_jumpdest(&U256::MAX));
}
