use crate::common::Gas;

pub const MAX_CALL_DEPTH: usize = 1024;
pub const MAX_STACK_DEPTH: usize = 1024;
pub const MAX_CODE_SIZE: usize = 24576;
pub const MAX_MEM_SIZE: u64 = 0x1fffffffe0;

// gas consumption parameters
pub const GAS_QUICK: Gas = 2;
pub const GAS_FASTEST: Gas = 3;
pub const GAS_FAST: Gas = 5;
pub const GAS_SHA3: Gas = 30;
pub const GAS_COPY_WORD: Gas = 3;
pub const GAS_SHA3_WORD: Gas = 6;
pub const GAS_MID: Gas = 8;
pub const GAS_SLOW: Gas = 10;
pub const GAS_EXT: Gas = 20;
pub const GAS_EXT_ACCOUNT: Gas = 700;
pub const GAS_LOG: Gas = 375;
pub const GAS_LOG_TOPIC: Gas = 375;
pub const GAS_LOG_DATA: Gas = 8;
pub const GAS_CREATE: Gas = 32000;
pub const GAS_CALL: Gas = 700;
pub const GAS_CALL_STIPEND: Gas = 2300;
pub const GAS_CALL_NEW_ACCOUNT: Gas = 25000;
pub const GAS_CALL_VALUE_TRANS: Gas = 9000;
pub const GAS_CREATE_DATA: Gas = 200;
pub const GAS_MEM_RESIZE_WORD: Gas = 3;
pub const GAS_JUMPDEST: Gas = 1;
pub const GAS_EXP: Gas = 10;
pub const GAS_EXP_BYTE: Gas = 50;
pub const QUAD_COEF_DIV: Gas = 512;
pub const GAS_SELF_DESTRUCT: Gas = 5000;
pub const GAS_SLOAD: Gas = 800;
pub const GAS_SSTORE_SET: Gas = 20000;
pub const GAS_SSTORE_RESET: Gas = 5000;
pub const GAS_SSTORE_SENTRY: Gas = 2300;

// intrinsic gas of a transaction
pub const GAS_TX: Gas = 21000;
pub const GAS_TX_CREATE: Gas = 32000;
pub const GAS_TX_DATA_ZERO: Gas = 4;
pub const GAS_TX_DATA_NON_ZERO: Gas = 16;
