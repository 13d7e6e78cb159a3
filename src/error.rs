use thiserror::Error;

use crate::common::{Addr, Bytes, Gas, Hash, Wei};
use crate::core::ExecError;

/// Errors surfaced by the simulator to its callers.
///
/// Failures that happen *inside* a transaction (out of gas, revert, invalid opcode...) are not
/// errors at this level: they are reported through the receipt of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("invalid nonce for {sender}: expected {expected}, got {got}")]
    InvalidNonce { sender: Addr, expected: u64, got: u64 },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Wei, available: Wei },

    #[error("unknown account {0}")]
    UnknownAccount(Addr),

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("unknown transaction {0}")]
    UnknownTransaction(Hash),

    #[error("intrinsic gas too low: need {required}, limit {limit}")]
    IntrinsicGasTooLow { required: Gas, limit: Gas },

    #[error("max fee per gas {max_fee} below base fee {base_fee}")]
    FeeBelowBaseFee { max_fee: Wei, base_fee: Wei },

    #[error("gas limit {limit} exceeds block gas limit {block_limit}")]
    GasLimitExceedsBlock { limit: Gas, block_limit: Gas },

    #[error("transaction {0} already known")]
    AlreadyKnown(Hash),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("timestamp {requested} must be greater than {current}")]
    InvalidTimestamp { requested: u64, current: u64 },

    /// An included transaction whose execution failed, where the caller needed it to succeed.
    #[error("transaction {hash} failed: {error}")]
    ExecutionFailed { hash: Hash, error: ExecError, output: Bytes },

    #[error("assembler: {0}")]
    Assembler(String),
}

pub type Result<T, E = SimError> = std::result::Result<T, E>;
