//! A tiny assembler for writing contracts by hand.
//!
//! ```
//! use qsim::asm::Asm;
//! use qsim::core::opcode::Opcode::*;
//!
//! // loop forever
//! let code = Asm::new().label("top").jump("top").assemble().unwrap();
//! assert_eq!(code.to_vec(), vec![0x5b, 0x61, 0x00, 0x00, 0x56]);
//! let _ = Asm::new().push(1u64).push(2u64).op(Add).op(Stop);
//! ```

use std::collections::HashMap;
use std::fmt::Write;

use crate::common::{Addr, Bytes, U256};
use crate::core::opcode::Opcode;
use crate::error::{Result, SimError};

#[derive(Clone, Debug)]
enum Item {
    Op(Opcode),
    Push(Vec<u8>),
    Label(String),
    PushLabel(String),
    Raw(Vec<u8>),
}

impl Item {
    fn size(&self) -> usize {
        match self {
            Item::Op(_) | Item::Label(_) => 1,
            Item::Push(v) => 1 + v.len(),
            Item::PushLabel(_) => 3,
            Item::Raw(v) => v.len(),
        }
    }
}

/// Bytecode builder. Labels become `JUMPDEST`s and label references are `PUSH2` immediates.
#[derive(Clone, Debug, Default)]
pub struct Asm {
    items: Vec<Item>,
}

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, op: Opcode) -> Self {
        self.items.push(Item::Op(op));
        self
    }

    /// Push a number with the narrowest `PUSH` (`PUSH0` for zero).
    pub fn push<T: Into<U256>>(mut self, v: T) -> Self {
        let v: U256 = v.into();
        let mut word = [0u8; 32];
        v.to_big_endian(&mut word);
        let skip = 32 - (v.bits() + 7) / 8;
        self.items.push(Item::Push(word[skip..].to_vec()));
        self
    }

    pub fn push_addr(mut self, addr: &Addr) -> Self {
        self.items.push(Item::Push(addr.as_bytes().to_vec()));
        self
    }

    /// Push 1 to 32 raw bytes as they are.
    pub fn push_bytes(mut self, bytes: &[u8]) -> Self {
        self.items.push(Item::Push(bytes.to_vec()));
        self
    }

    pub fn label(mut self, name: &str) -> Self {
        self.items.push(Item::Label(name.into()));
        self
    }

    pub fn push_label(mut self, name: &str) -> Self {
        self.items.push(Item::PushLabel(name.into()));
        self
    }

    pub fn jump(self, name: &str) -> Self {
        self.push_label(name).op(Opcode::Jump)
    }

    pub fn jumpi(self, name: &str) -> Self {
        self.push_label(name).op(Opcode::JumpI)
    }

    /// Splice in already assembled code.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.items.push(Item::Raw(bytes.to_vec()));
        self
    }

    pub fn assemble(&self) -> Result<Bytes> {
        let mut labels = HashMap::new();
        let mut pos = 0;
        for item in self.items.iter() {
            if let Item::Label(name) = item {
                if labels.insert(name.as_str(), pos).is_some() {
                    return Err(SimError::Assembler(format!(
                        "duplicate label `{}`",
                        name
                    )))
                }
            }
            pos += item.size();
        }
        let mut code = Vec::with_capacity(pos);
        for item in self.items.iter() {
            match item {
                Item::Op(op) => code.push(*op as u8),
                Item::Label(_) => code.push(Opcode::JumpDest as u8),
                Item::Push(v) => {
                    let op = match v.len() {
                        0 => Some(Opcode::Push0),
                        n => Opcode::push_n(n),
                    }
                    .ok_or_else(|| {
                        SimError::Assembler(format!(
                            "cannot push {} bytes",
                            v.len()
                        ))
                    })?;
                    code.push(op as u8);
                    code.extend_from_slice(v);
                }
                Item::PushLabel(name) => {
                    let dest = *labels.get(name.as_str()).ok_or_else(|| {
                        SimError::Assembler(format!("unknown label `{}`", name))
                    })?;
                    if dest > 0xffff {
                        return Err(SimError::Assembler(format!(
                            "label `{}` out of PUSH2 range",
                            name
                        )))
                    }
                    code.push(Opcode::Push2 as u8);
                    code.extend_from_slice(&(dest as u16).to_be_bytes());
                }
                Item::Raw(v) => code.extend_from_slice(v),
            }
        }
        Ok(code.into())
    }
}

/// Creation code that runs `constructor` (straight-line code that falls through at its end) and
/// then deploys `runtime`. Constructor arguments, if any, are appended after the runtime and can be
/// read with `CODESIZE`/`CODECOPY`.
pub fn initcode(constructor: &[u8], runtime: &[u8]) -> Result<Bytes> {
    // size of the copy-and-return stub below
    const STUB: usize = 11;
    let offset = constructor.len() + STUB;
    if runtime.len() > 0xffff || offset > 0xffff {
        return Err(SimError::Assembler("code too large for initcode".into()))
    }
    Asm::new()
        .raw(constructor)
        .push_bytes(&(runtime.len() as u16).to_be_bytes())
        .op(Opcode::Dup1)
        .push_bytes(&(offset as u16).to_be_bytes())
        .push(0u64)
        .op(Opcode::CodeCopy)
        .push(0u64)
        .op(Opcode::Return)
        .raw(runtime)
        .assemble()
}

/// One instruction per line: offset, mnemonic and immediate.
pub fn disasm(code: &[u8]) -> String {
    let mut out = String::new();
    let mut pc = 0;
    while pc < code.len() {
        let op = match Opcode::from_byte(code[pc]) {
            Some(op) => op,
            None => {
                let _ = writeln!(out, "{:04x}: INVALID(0x{:02x})", pc, code[pc]);
                pc += 1;
                continue
            }
        };
        let end = std::cmp::min(pc + 1 + op.push_size(), code.len());
        let _ = if op.push_size() > 0 {
            writeln!(
                out,
                "{:04x}: {} 0x{}",
                pc,
                op.name(),
                hex::encode(&code[pc + 1..end])
            )
        } else {
            writeln!(out, "{:04x}: {}", pc, op.name())
        };
        pc = end;
    }
    out
}
