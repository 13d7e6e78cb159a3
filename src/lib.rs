//! # qsim: a deterministic, block-structured transaction simulator
//!
//! - In short, qsim = an in-memory chain + an ordered mempool + a re-entrant call interpreter, all
//!   in one process and all under the control of a test harness.
//!
//! - It is meant for the kind of scripts that set up a contract, poke at it and check what
//!   happened: reentrancy, frontrunning, reading "private" storage slots, watching block hashes
//!   disappear, overflowing unchecked arithmetic. Every one of these relies on the simulator
//!   reproducing an exact ordering of state mutations, so nothing here runs concurrently unless it
//!   is explicitly allowed to.
//!
//! # Overview
//! The crate is split into small modules that build on each other (leaves first):
//!
//! - [common]: addresses, hashes, amounts, bytes and a few derivation helpers.
//! - [state]: the account store. Balances, nonces, code and storage, kept as a stack of delta
//!   layers (see *State Versioning* below).
//! - [core]: the call interpreter. It executes one transaction, nested calls included, on an
//!   explicit frame stack.
//! - [tx]: transactions, fees and receipts.
//! - [mempool]: pending transactions, FIFO or by tip, with a non-consuming peek.
//! - [processor]: applies one transaction: validation, gas purchase, execution, refund, fees.
//! - [miner]: the block producer state machine and the tokio interval miner.
//! - [chain]: the append-only list of blocks, the 256-block hash window and the receipt index.
//! - [sim]: [Simulator](sim/struct.Simulator.html), the facade a harness talks to.
//! - [config]: [SimConfig](config/struct.SimConfig.html), loadable from JSON.
//! - [asm]: a label-aware assembler to write contracts without a compiler.
//!
//! Getting a working setup takes a couple of lines:
//!
//! ```
//! use qsim::common::{ether, Bytes};
//! use qsim::config::SimConfig;
//! use qsim::sim::Simulator;
//!
//! let sim = Simulator::new(SimConfig::default()).unwrap();
//! let accounts = sim.accounts();
//! let receipt = sim
//!     .call(&accounts[0], &accounts[1], Bytes::empty(), ether(1))
//!     .unwrap();
//! assert!(receipt.receipt().unwrap().succeeded());
//! assert_eq!(sim.block_number(), 1);
//! ```
//!
//! # On the Data Flow
//! A submitter hands a transaction to the [mempool](mempool/struct.Mempool.html), which checks its
//! nonce and balance and gives it an arrival number. When a block is due (automine, an explicit
//! [mine_blocks](sim/struct.Simulator.html#method.mine_blocks) or an interval tick), the
//! [BlockProducer](miner/struct.BlockProducer.html) drains the mempool in policy order and runs the
//! transactions one by one through [processor::apply_transaction]. Each transaction reads and
//! writes the [AccountStore](state/struct.AccountStore.html) through the
//! [WorldState](core/trait.WorldState.html) traits. Finally the pending state layer is sealed and
//! the block is appended to the [Chain](chain/struct.Chain.html).
//!
//! The interpreter never recurses natively. A `CALL` pushes a new frame on a `Vec` of boxed frames
//! and the main loop simply continues with the callee; a `RETURN` pops it and hands the result to
//! the caller's epilogue. This makes re-entrancy an ordinary event: a contract can be entered again
//! while an older frame of the same contract is still waiting on the stack, and the newer frame
//! sees whatever the older one has written so far.
//!
//! # State Versioning
//! There is no undo journal. Every open call frame owns a delta layer on top of the layers below
//! it, and all writes go to the topmost layer:
//!
//! - snapshot: push an empty layer;
//! - revert: drop the layers above the snapshot, nothing else to undo;
//! - commit: merge the layers above the snapshot into the one below.
//!
//! Reads walk the layers top-down and stop at the first layer that knows the answer. Once a block
//! is mined, its layer is frozen and shared (`Arc`), so historical queries such as "storage of
//! this slot at block 12" are just walks that start at layer 12:
//!
//! ```notrust
//!      [ frame scope ]  <- CALL
//!      [ frame scope ]  <- transaction
//!      [ pending     ]  <- admin overrides, finished transactions of the next block
//!      [ block n     ]  \
//!      [ ...         ]   | frozen, Arc-shared
//!      [ genesis     ]  /
//! ```

#[macro_use]
pub mod common;
pub mod asm;
pub mod chain;
pub mod config;
pub mod core;
pub mod error;
pub mod mempool;
pub mod miner;
pub mod processor;
pub mod sim;
pub mod state;
pub mod tx;

pub use error::{Result, SimError};
