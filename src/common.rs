use bitvec::vec::BitVec;
use hex::{FromHex, ToHex};
use once_cell::sync::OnceCell;
pub use primitive_types::U256;
use primitive_types::{H160, H256};
use serde::{
    de::{self, Deserialize, Deserializer, Visitor},
    Serialize, Serializer,
};
use sha3::Digest;

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Wei(U256);

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Addr(H160);

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Hash(H256);

#[derive(Clone, PartialEq, Eq, Default)]
pub struct Bytes(Vec<u8>);

pub type Gas = u64;

const WEI_PER_GWEI: u64 = 1_000_000_000;

// Wei

impl Wei {
    #[inline(always)]
    pub fn checked_add(&self, other: &Wei) -> Option<Wei> {
        Some(Wei(self.0.checked_add(other.0)?))
    }

    #[inline(always)]
    pub fn checked_sub(&self, other: &Wei) -> Option<Wei> {
        Some(Wei(self.0.checked_sub(other.0)?))
    }

    #[inline(always)]
    pub fn checked_mul(&self, other: &Wei) -> Option<Wei> {
        Some(Wei(self.0.checked_mul(other.0)?))
    }

    /// `self * gas`, saturating at `U256::MAX`.
    #[inline]
    pub fn times_gas(&self, gas: Gas) -> Wei {
        Wei(self.0.saturating_mul(gas.into()))
    }

    #[inline]
    pub fn saturating_sub(&self, other: &Wei) -> Wei {
        Wei(self.0.saturating_sub(other.0))
    }

    #[inline]
    pub fn zero() -> &'static Self {
        static V: OnceCell<Wei> = OnceCell::new();
        V.get_or_init(|| U256::zero().into())
    }

    #[inline(always)]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn to_big_endian(&self, buff: &mut [u8]) {
        self.0.to_big_endian(buff)
    }

    pub fn from_gwei(n: u64) -> Self {
        Self(U256::from(n) * U256::from(WEI_PER_GWEI))
    }

    pub fn from_ether(n: u64) -> Self {
        Self::from_gwei(n).times_gas(WEI_PER_GWEI)
    }
}

/// Shorthand for `n` ether in wei.
pub fn ether(n: u64) -> Wei {
    Wei::from_ether(n)
}

/// Shorthand for `n` gwei in wei.
pub fn gwei(n: u64) -> Wei {
    Wei::from_gwei(n)
}

impl From<U256> for Wei {
    fn from(u: U256) -> Self {
        Self(u)
    }
}

impl From<u64> for Wei {
    fn from(u: u64) -> Self {
        Self(u.into())
    }
}

impl FromStr for Wei {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, ()> {
        parse_quantity(s).map(Self).ok_or(())
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::LowerHex for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Serialize for Wei {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{:x}", &self))
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(deserializer.deserialize_any(QuantityVisitor)?.into())
    }
}

// Addr

impl Addr {
    #[inline]
    pub fn zero() -> &'static Self {
        static V: OnceCell<Addr> = OnceCell::new();
        V.get_or_init(|| U256::zero().into())
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    #[inline(always)]
    pub fn from_slice(s: &[u8]) -> Self {
        Self(H160::from_slice(s))
    }

    /// Derive a stable address from an arbitrary label, e.g. for test actors.
    pub fn from_label(label: &str) -> Self {
        Self::from_slice(&sha3::Keccak256::digest(label.as_bytes())[12..])
    }
}

impl From<U256> for Addr {
    fn from(u: U256) -> Self {
        let mut bytes: [u8; 32] = Default::default();
        u.to_big_endian(&mut bytes);
        Self::from_slice(&bytes[12..])
    }
}

impl From<[u8; 20]> for Addr {
    fn from(bytes: [u8; 20]) -> Self {
        Self(H160(bytes))
    }
}

impl FromStr for Addr {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, ()> {
        Ok(Self(H160::from_str(s).map_err(|_| ())?))
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(self.as_bytes()))
    }
}

impl Serialize for Addr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_hex(self.as_bytes()))
    }
}

impl<'de> Deserialize<'de> for Addr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Addr::from_slice(&hex_field(deserializer, Some(20))?))
    }
}

// U256

impl From<Wei> for U256 {
    fn from(w: Wei) -> Self {
        w.0
    }
}

impl AsRef<U256> for Wei {
    fn as_ref(&self) -> &U256 {
        &self.0
    }
}

impl From<Hash> for U256 {
    fn from(hash: Hash) -> Self {
        U256::from_big_endian(hash.as_bytes())
    }
}

impl From<Addr> for U256 {
    fn from(addr: Addr) -> Self {
        U256::from_big_endian(addr.as_bytes())
    }
}

// Hash

impl Hash {
    #[inline(always)]
    pub fn hash(slice: &[u8]) -> Self {
        Self::from_slice(sha3::Keccak256::digest(slice).as_slice())
    }

    #[inline]
    pub fn zero() -> &'static Self {
        static V: OnceCell<Hash> = OnceCell::new();
        V.get_or_init(|| Self(H256::zero()))
    }

    #[inline(always)]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    #[inline(always)]
    pub fn from_slice(s: &[u8]) -> Self {
        Self(H256::from_slice(s))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(u: [u8; 32]) -> Self {
        Self(u.into())
    }
}

impl From<U256> for Hash {
    fn from(u: U256) -> Self {
        let mut bytes: [u8; 32] = Default::default();
        u.to_big_endian(&mut bytes);
        Self::from_slice(&bytes)
    }
}

impl From<u64> for Hash {
    fn from(u: u64) -> Self {
        U256::from(u).into()
    }
}

impl FromStr for Hash {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, ()> {
        Ok(Self(H256::from_str(s).map_err(|_| ())?))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(self.as_bytes()))
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_hex(self.as_bytes()))
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Hash::from_slice(&hex_field(deserializer, Some(32))?))
    }
}

// Bytes

impl Bytes {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(s: &[u8]) -> Self {
        Self(s.into())
    }
}

impl Deref for Bytes {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(&to_hex(self))
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(&to_hex(self))
    }
}

impl Serialize for Bytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_hex(self))
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(hex_field(deserializer, None)?.into())
    }
}

fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", bytes.encode_hex::<String>())
}

/// Decode a `0x`-prefixed hex string, of exactly `len` bytes when given.
fn hex_field<'de, D>(deserializer: D, len: Option<usize>) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| {
            de::Error::invalid_value(de::Unexpected::Str(&s), &"a `0x` hex string")
        })?;
    let bytes = Vec::from_hex(digits).map_err(de::Error::custom)?;
    match len {
        Some(n) if bytes.len() != n => {
            Err(de::Error::invalid_length(bytes.len(), &"a fixed-size hex string"))
        }
        _ => Ok(bytes),
    }
}

/// Accepts `0x`-prefixed hex strings, decimal strings and plain integers.
struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = U256;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an integer, a decimal string or a `0x` hex string")
    }

    fn visit_u64<E>(self, value: u64) -> Result<U256, E>
    where
        E: de::Error,
    {
        Ok(value.into())
    }

    fn visit_str<E>(self, value: &str) -> Result<U256, E>
    where
        E: de::Error,
    {
        parse_quantity(value).ok_or_else(|| {
            de::Error::invalid_value(de::Unexpected::Str(value), &self)
        })
    }
}

fn parse_quantity(s: &str) -> Option<U256> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => U256::from_dec_str(s).ok(),
    }
}

// NOTE: adapted from https://docs.rs/impl-rlp/latest/src/impl_rlp/lib.rs.html
macro_rules! impl_wrapped_uint_rlp {
    ($wrapper_name: ident, $size: expr) => {
        impl rlp::Encodable for $wrapper_name {
            fn rlp_append(&self, s: &mut rlp::RlpStream) {
                let leading_empty_bytes = $size * 8 - (self.0.bits() + 7) / 8;
                let mut buffer = [0u8; $size * 8];
                self.0.to_big_endian(&mut buffer);
                s.encoder().encode_value(&buffer[leading_empty_bytes..]);
            }
        }
    };
}

macro_rules! impl_wrapped_fixed_hash_rlp {
    ($wrapper_name: ident) => {
        impl rlp::Encodable for $wrapper_name {
            fn rlp_append(&self, s: &mut rlp::RlpStream) {
                s.encoder().encode_value(self.0.as_ref());
            }
        }
    };
}

impl_wrapped_uint_rlp!(Wei, 4);
impl_wrapped_fixed_hash_rlp!(Addr);
impl_wrapped_fixed_hash_rlp!(Hash);

impl rlp::Encodable for Bytes {
    fn rlp_append(&self, s: &mut rlp::RlpStream) {
        s.encoder().encode_value(self)
    }
}

pub fn create_addr(addr: &Addr, nonce: u64) -> Addr {
    let mut rlp_encoded = rlp::RlpStream::new_list(2);
    rlp_encoded.append(&addr.as_bytes()).append(&nonce);
    let rlp_encoded = rlp_encoded.out();
    Addr::from_slice(&sha3::Keccak256::digest(rlp_encoded).as_slice()[12..])
}

#[test]
fn test_create_addr() {
    let addr0 =
        Addr::from_str("0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0").unwrap();
    assert_eq!(
        create_addr(&addr0, 0),
        Addr::from_str("0xcd234a471b72ba2f1ccf0a70fcaba648a5eecd8d").unwrap()
    );
    assert_eq!(
        create_addr(&addr0, 1),
        Addr::from_str("0x343c43a37d37dff08ae8c4a11544c718abb4fcf8").unwrap()
    );
}

/// CREATE2 address: `keccak(0xff ++ creator ++ salt ++ keccak(initcode))[12..]`.
pub fn create_addr2(addr: &Addr, salt: &[u8], init_code: &[u8]) -> Addr {
    let mut hasher = sha3::Keccak256::new();
    hasher.update([0xff]);
    hasher.update(addr.as_bytes());
    hasher.update(salt);
    hasher.update(sha3::Keccak256::digest(init_code));
    Addr::from_slice(&hasher.finalize().as_slice()[12..])
}

#[test]
fn test_create_addr2() {
    let addr0 = Addr::zero();
    assert_eq!(
        create_addr2(addr0, &[0; 32], &hex::decode("00").unwrap()),
        Addr::from_str("0x4D1A2e2bB4F88F0250f26Ffff098B0b30B26BF38").unwrap()
    );
    let addr1 =
        Addr::from_str("0xdeadbeef00000000000000000000000000000000").unwrap();
    assert_eq!(
        create_addr2(&addr1, &hex::decode("000000000000000000000000feed000000000000000000000000000000000000").unwrap(), &hex::decode("00").unwrap()),
        Addr::from_str("0xD04116cDd17beBE565EB2422F2497E06cC1C9833").unwrap()
    );
}

/// Marks every byte of `code` that starts an instruction (i.e. is not PUSH data).
pub fn gen_code_bitmap(code: &[u8]) -> BitVec {
    let mut bitmap = BitVec::repeat(false, code.len());
    let mut nskip = 0;
    for (i, b) in code.iter().enumerate() {
        if nskip > 0 {
            nskip -= 1;
            continue
        }
        bitmap.set(i, true);
        if let 0x60..=0x7f = b {
            nskip = b - 0x60 + 1
        }
    }
    bitmap
}

#[test]
fn test_code_bitmap_skips_push_data() {
    // PUSH2 0x5b5b JUMPDEST
    let bitmap = gen_code_bitmap(&[0x61, 0x5b, 0x5b, 0x5b]);
    assert!(bitmap[0]);
    assert!(!bitmap[1]);
    assert!(!bitmap[2]);
    assert!(bitmap[3]);
}

#[inline(always)]
pub fn checked_as_u64(x: &U256) -> Option<u64> {
    if x > &u64::MAX.into() {
        None
    } else {
        Some(x.as_u64())
    }
}

/// First four bytes of the keccak hash of a function signature such as `"withdraw()"`.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = sha3::Keccak256::digest(signature.as_bytes());
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&digest[..4]);
    sel
}

#[inline]
pub fn encode_word(x: &U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    x.to_big_endian(&mut word);
    word
}

#[test]
fn test_selector() {
    assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
    assert_eq!(encode_word(&U256::from(7))[31], 7);
}

#[test]
fn test_wei_units_and_parsing() {
    assert_eq!(ether(1), Wei::from_gwei(1_000_000_000));
    assert_eq!(Wei::from_str("0x10").unwrap(), Wei::from(16u64));
    assert_eq!(Wei::from_str("1000").unwrap(), Wei::from(1000u64));
    let w: Wei = serde_json::from_str("\"0x3e8\"").unwrap();
    assert_eq!(w, Wei::from(1000u64));
    let w: Wei = serde_json::from_str("42").unwrap();
    assert_eq!(w, Wei::from(42u64));
}

#[test]
fn test_hex_serde() {
    let a = Addr::from_label("a");
    let json = serde_json::to_string(&a).unwrap();
    assert_eq!(json, format!("\"{}\"", a));
    assert_eq!(serde_json::from_str::<Addr>(&json).unwrap(), a);
    // wrong width or missing prefix
    assert!(serde_json::from_str::<Addr>("\"0x1234\"").is_err());
    assert!(serde_json::from_str::<Hash>(&format!("\"{}\"", "00".repeat(32))).is_err());
    let b: Bytes = serde_json::from_str("\"0x00ff\"").unwrap();
    assert_eq!(b.to_vec(), vec![0x00, 0xff]);
    assert_eq!(b.to_string(), "0x00ff");
}
