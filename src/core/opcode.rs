use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

#[derive(FromPrimitive, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Stop = 0x00,
    Add,
    Mul,
    Sub,
    Div,
    SDiv,
    Mod,
    SMod,
    AddMod,
    MulMod,
    Exp,
    SignExtend,

    Lt = 0x10,
    Gt,
    Slt,
    Sgt,
    Eql,
    IsZero,
    And,
    Or,
    Xor,
    Not,
    Byte,
    Shl,
    Shr,
    Sar,

    Sha3 = 0x20,

    Address = 0x30,
    Balance,
    Origin,
    Caller,
    CallValue,
    CallDataLoad,
    CallDataSize,
    CallDataCopy,
    CodeSize,
    CodeCopy,
    GasPrice,
    ExtCodeSize,
    ExtCodeCopy,
    ReturnDataSize,
    ReturnDataCopy,
    ExtCodeHash,

    BlockHash = 0x40,
    Coinbase,
    Timestamp,
    Number,
    PrevRandao,
    GasLimit,
    ChainId,
    SelfBalance,
    BaseFee,

    Pop = 0x50,
    MLoad,
    MStore,
    MStore8,
    SLoad,
    SStore,
    Jump,
    JumpI,
    PC,
    MSize,
    GasLeft,
    JumpDest,
    Push0 = 0x5f,

    Push1 = 0x60,
    Push2,
    Push3,
    Push4,
    Push5,
    Push6,
    Push7,
    Push8,
    Push9,
    Push10,
    Push11,
    Push12,
    Push13,
    Push14,
    Push15,
    Push16,
    Push17,
    Push18,
    Push19,
    Push20,
    Push21,
    Push22,
    Push23,
    Push24,
    Push25,
    Push26,
    Push27,
    Push28,
    Push29,
    Push30,
    Push31,
    Push32,

    Dup1 = 0x80,
    Dup2,
    Dup3,
    Dup4,
    Dup5,
    Dup6,
    Dup7,
    Dup8,
    Dup9,
    Dup10,
    Dup11,
    Dup12,
    Dup13,
    Dup14,
    Dup15,
    Dup16,

    Swap1 = 0x90,
    Swap2,
    Swap3,
    Swap4,
    Swap5,
    Swap6,
    Swap7,
    Swap8,
    Swap9,
    Swap10,
    Swap11,
    Swap12,
    Swap13,
    Swap14,
    Swap15,
    Swap16,

    Log0 = 0xa0,
    Log1,
    Log2,
    Log3,
    Log4,

    Create = 0xf0,
    Call,
    Return = 0xf3,
    DelegateCall,
    Create2,
    /// Like `CALL`, but a failure of the callee aborts the caller as well.
    DirectCall,
    StaticCall = 0xfa,
    Revert = 0xfd,
    Invalid = 0xfe,
    SelfDestruct = 0xff,
}

impl Opcode {
    #[inline(always)]
    pub fn from_byte(b: u8) -> Option<Self> {
        FromPrimitive::from_u8(b)
    }

    /// Number of immediate bytes following a `PUSH*` instruction.
    #[inline(always)]
    pub fn push_size(self) -> usize {
        match self as u8 {
            b @ 0x60..=0x7f => (b - 0x5f) as usize,
            _ => 0,
        }
    }

    /// The `PUSH*` opcode that carries `n` immediate bytes (`1 <= n <= 32`).
    pub fn push_n(n: usize) -> Option<Self> {
        match n {
            1..=32 => Self::from_byte(0x5f + n as u8),
            _ => None,
        }
    }

    pub fn name(self) -> String {
        match self {
            Opcode::Eql => "EQ".into(),
            Opcode::GasLeft => "GAS".into(),
            Opcode::Sha3 => "KECCAK256".into(),
            op => format!("{:?}", op).to_uppercase(),
        }
    }
}

#[test]
fn test_opcode_layout() {
    assert_eq!(Opcode::from_byte(0x5b), Some(Opcode::JumpDest));
    assert_eq!(Opcode::from_byte(0x7f), Some(Opcode::Push32));
    assert_eq!(Opcode::from_byte(0x9f), Some(Opcode::Swap16));
    assert_eq!(Opcode::from_byte(0xf6), Some(Opcode::DirectCall));
    assert_eq!(Opcode::from_byte(0x0c), None);
    assert_eq!(Opcode::Push20.push_size(), 20);
    assert_eq!(Opcode::push_n(2), Some(Opcode::Push2));
    assert_eq!(Opcode::CallDataLoad.name(), "CALLDATALOAD");
}
