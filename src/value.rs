//! ABI value model carried on the wire.
//!
//! A [`Value`] holds exactly one ABI primitive. In signature templates only
//! the populated variant matters (it names the ABI type); in decoded events
//! the payload carries the decoded value.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{hex, Address, B256, U256};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::pb::events::{value::Kind, Argument, Value};

impl Value {
    pub fn address(address: Address) -> Self {
        Self::of(Kind::Address(address.to_vec()))
    }

    pub fn bool(value: bool) -> Self {
        Self::of(Kind::Bool(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::of(Kind::String(value.into()))
    }

    pub fn bytes32(value: B256) -> Self {
        Self::of(Kind::Bytes32(value.to_vec()))
    }

    pub fn uint256(value: U256) -> Self {
        Self::of(Kind::Uint256(value.to_be_bytes::<32>().to_vec()))
    }

    pub fn uint8(value: u8) -> Self {
        Self::of(Kind::Uint8(u32::from(value)))
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::of(Kind::Bytes(value.into()))
    }

    fn of(kind: Kind) -> Self {
        Self { kind: Some(kind) }
    }

    /// Empty-payload value of the given canonical ABI type, for use in
    /// signature templates.
    pub fn template(abi_type: &str) -> Result<Self> {
        let kind = match abi_type {
            "address" => Kind::Address(Vec::new()),
            "bool" => Kind::Bool(false),
            "string" => Kind::String(String::new()),
            "bytes32" => Kind::Bytes32(Vec::new()),
            "uint256" => Kind::Uint256(Vec::new()),
            "uint8" => Kind::Uint8(0),
            "bytes" => Kind::Bytes(Vec::new()),
            other => return Err(Error::Abi(format!("unsupported ABI type {other:?}"))),
        };
        Ok(Self::of(kind))
    }

    fn kind(&self) -> Result<&Kind> {
        self.kind
            .as_ref()
            .ok_or_else(|| Error::Abi("value has no ABI type".to_string()))
    }

    /// Canonical lower-case ABI type name of the populated variant.
    pub fn abi_type_name(&self) -> Result<&'static str> {
        Ok(match self.kind()? {
            Kind::Address(_) => "address",
            Kind::Bool(_) => "bool",
            Kind::String(_) => "string",
            Kind::Bytes32(_) => "bytes32",
            Kind::Uint256(_) => "uint256",
            Kind::Uint8(_) => "uint8",
            Kind::Bytes(_) => "bytes",
        })
    }

    pub fn sol_type(&self) -> Result<DynSolType> {
        Ok(match self.kind()? {
            Kind::Address(_) => DynSolType::Address,
            Kind::Bool(_) => DynSolType::Bool,
            Kind::String(_) => DynSolType::String,
            Kind::Bytes32(_) => DynSolType::FixedBytes(32),
            Kind::Uint256(_) => DynSolType::Uint(256),
            Kind::Uint8(_) => DynSolType::Uint(8),
            Kind::Bytes(_) => DynSolType::Bytes,
        })
    }

    /// Whether the ABI type is hashed when used as an indexed argument.
    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, Some(Kind::String(_)) | Some(Kind::Bytes(_)))
    }

    pub fn to_sol(&self) -> Result<DynSolValue> {
        Ok(match self.kind()? {
            Kind::Address(_) => DynSolValue::Address(self.as_address()?),
            Kind::Bool(b) => DynSolValue::Bool(*b),
            Kind::String(s) => DynSolValue::String(s.clone()),
            Kind::Bytes32(_) => DynSolValue::FixedBytes(self.as_bytes32()?, 32),
            Kind::Uint256(_) => DynSolValue::Uint(self.as_uint256()?, 256),
            Kind::Uint8(_) => DynSolValue::Uint(U256::from(self.as_uint8()?), 8),
            Kind::Bytes(b) => DynSolValue::Bytes(b.clone()),
        })
    }

    /// Builds a value of this template's variant from a decoded ABI value.
    pub fn from_sol(&self, decoded: DynSolValue) -> Result<Self> {
        let value = match (self.kind()?, decoded) {
            (Kind::Address(_), DynSolValue::Address(a)) => Self::address(a),
            (Kind::Bool(_), DynSolValue::Bool(b)) => Self::bool(b),
            (Kind::String(_), DynSolValue::String(s)) => Self::string(s),
            (Kind::Bytes32(_), DynSolValue::FixedBytes(word, 32)) => Self::bytes32(word),
            (Kind::Uint256(_), DynSolValue::Uint(u, 256)) => Self::uint256(u),
            (Kind::Uint8(_), DynSolValue::Uint(u, 8)) => {
                let small = u8::try_from(u)
                    .map_err(|_| Error::Abi(format!("uint8 out of range: {u}")))?;
                Self::uint8(small)
            }
            (Kind::Bytes(_), DynSolValue::Bytes(b)) => Self::bytes(b),
            (_, other) => {
                return Err(Error::Abi(format!(
                    "decoded {:?} does not fit {}",
                    other.as_type(),
                    self.abi_type_name()?
                )))
            }
        };
        Ok(value)
    }

    pub fn as_address(&self) -> Result<Address> {
        match self.kind()? {
            Kind::Address(raw) if raw.len() == 20 => Ok(Address::from_slice(raw)),
            Kind::Address(raw) => Err(Error::Abi(format!(
                "address must be 20 bytes, got {}",
                raw.len()
            ))),
            _ => Err(self.mismatch("address")),
        }
    }

    pub fn as_bytes32(&self) -> Result<B256> {
        match self.kind()? {
            Kind::Bytes32(raw) if raw.len() == 32 => Ok(B256::from_slice(raw)),
            Kind::Bytes32(raw) => Err(Error::Abi(format!(
                "bytes32 must be 32 bytes, got {}",
                raw.len()
            ))),
            _ => Err(self.mismatch("bytes32")),
        }
    }

    pub fn as_uint256(&self) -> Result<U256> {
        match self.kind()? {
            Kind::Uint256(raw) => U256::try_from_be_slice(raw).ok_or_else(|| {
                Error::Abi(format!("uint256 must be at most 32 bytes, got {}", raw.len()))
            }),
            _ => Err(self.mismatch("uint256")),
        }
    }

    pub fn as_uint8(&self) -> Result<u8> {
        match self.kind()? {
            Kind::Uint8(v) => {
                u8::try_from(*v).map_err(|_| Error::Abi(format!("uint8 out of range: {v}")))
            }
            _ => Err(self.mismatch("uint8")),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self.kind()? {
            Kind::Bool(b) => Ok(*b),
            _ => Err(self.mismatch("bool")),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self.kind()? {
            Kind::String(s) => Ok(s),
            _ => Err(self.mismatch("string")),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self.kind()? {
            Kind::Bytes(b) => Ok(b),
            _ => Err(self.mismatch("bytes")),
        }
    }

    fn mismatch(&self, wanted: &str) -> Error {
        let got = self.abi_type_name().unwrap_or("unset");
        Error::Abi(format!("expected {wanted} value, got {got}"))
    }

    pub fn to_json(&self) -> JsonValue {
        match &self.kind {
            None => JsonValue::Null,
            Some(Kind::Address(raw)) => match self.as_address() {
                Ok(a) => JsonValue::String(a.to_checksum(None)),
                Err(_) => JsonValue::String(hex::encode_prefixed(raw)),
            },
            Some(Kind::Bool(b)) => JsonValue::Bool(*b),
            Some(Kind::String(s)) => JsonValue::String(s.clone()),
            Some(Kind::Bytes32(raw)) | Some(Kind::Bytes(raw)) => {
                JsonValue::String(hex::encode_prefixed(raw))
            }
            Some(Kind::Uint256(raw)) => match U256::try_from_be_slice(raw) {
                Some(u) => JsonValue::String(u.to_string()),
                None => JsonValue::String(hex::encode_prefixed(raw)),
            },
            Some(Kind::Uint8(v)) => JsonValue::from(*v),
        }
    }
}

impl Argument {
    pub fn new(name: impl Into<String>, value: Value, indexed: bool) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            indexed,
        }
    }

    pub fn value(&self) -> Result<&Value> {
        self.value
            .as_ref()
            .ok_or_else(|| Error::Abi(format!("argument {:?} has no value", self.name)))
    }
}
