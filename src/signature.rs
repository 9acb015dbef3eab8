//! Event signature templates: canonical EVM signature text, topic-0 hash and
//! the ABI argument list used for packing and unpacking.

use std::path::Path;

use alloy_dyn_abi::DynSolType;
use alloy_json_abi::JsonAbi;
use alloy_primitives::{keccak256, Address, B256, U256};
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

use crate::error::{Error, Result};
use crate::extractor::Extractor;
use crate::pb::events::{Argument, Event, Value};

/// Topics hold the signature hash plus at most three indexed arguments.
pub const MAX_INDEXED_ARGUMENTS: usize = 3;

/// One argument of an event as seen by the ABI coder.
#[derive(Debug, Clone, PartialEq)]
pub struct AbiArgument {
    pub name: String,
    pub ty: DynSolType,
    pub indexed: bool,
}

impl Event {
    /// A signature template: name plus typed arguments, no emitter or values.
    pub fn template(name: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            arguments,
            ..Default::default()
        }
    }

    /// `Name(type1,type2,...)`. Argument names and indexed flags do not take part.
    pub fn signature(&self) -> Result<String> {
        let types = self
            .arguments
            .iter()
            .map(|arg| arg.value().and_then(Value::abi_type_name))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{}({})", self.name, types.join(",")))
    }

    pub fn signature_hash(&self) -> Result<B256> {
        Ok(keccak256(self.signature()?.as_bytes()))
    }

    /// ABI arguments in declaration order. Fails if any argument has no ABI type.
    pub fn abi_arguments(&self) -> Result<Vec<AbiArgument>> {
        self.arguments
            .iter()
            .map(|arg| {
                Ok(AbiArgument {
                    name: arg.name.clone(),
                    ty: arg.value()?.sol_type()?,
                    indexed: arg.indexed,
                })
            })
            .collect()
    }

    /// Structural checks on a template beyond what the signature needs.
    pub fn validate_template(&self) -> Result<()> {
        if !is_identifier(&self.name) {
            return Err(Error::invalid(format!(
                "event name {:?} is not a valid identifier",
                self.name
            )));
        }
        let indexed = self.arguments.iter().filter(|a| a.indexed).count();
        if indexed > MAX_INDEXED_ARGUMENTS {
            return Err(Error::invalid(format!(
                "event {} has {indexed} indexed arguments, at most {MAX_INDEXED_ARGUMENTS} allowed",
                self.name
            )));
        }
        for arg in &self.arguments {
            if !arg.name.is_empty() && !is_identifier(&arg.name) {
                return Err(Error::invalid(format!(
                    "argument name {:?} of event {} is not a valid identifier",
                    arg.name, self.name
                )));
            }
        }
        Ok(())
    }

    /// Builds a template from a JSON ABI event entry.
    pub fn from_json_abi(event: &alloy_json_abi::Event) -> Result<Self> {
        if event.anonymous {
            return Err(Error::Abi(format!(
                "anonymous event {} is not supported",
                event.name
            )));
        }
        let arguments = event
            .inputs
            .iter()
            .map(|input| {
                let value = Value::template(&input.ty).map_err(|e| {
                    Error::Abi(format!("event {} argument {:?}: {e}", event.name, input.name))
                })?;
                Ok(Argument::new(input.name.clone(), value, input.indexed))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::template(event.name.clone(), arguments))
    }

    /// Value of the named argument on a decoded event.
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.value.as_ref())
    }

    pub fn to_json(&self) -> JsonValue {
        let mut args = Map::new();
        for (i, arg) in self.arguments.iter().enumerate() {
            let key = if arg.name.is_empty() {
                placeholder_name(i)
            } else {
                arg.name.clone()
            };
            args.insert(
                key,
                arg.value.as_ref().map(Value::to_json).unwrap_or(JsonValue::Null),
            );
        }
        let mut obj = Map::new();
        obj.insert("name".into(), JsonValue::String(self.name.clone()));
        if self.address.len() == 20 {
            let address = Address::from_slice(&self.address);
            obj.insert("address".into(), JsonValue::String(address.to_checksum(None)));
        }
        obj.insert("log_index".into(), JsonValue::from(self.log_index));
        obj.insert("arguments".into(), JsonValue::Object(args));
        JsonValue::Object(obj)
    }
}

/// Lookup key for an unnamed argument at `position`.
pub fn placeholder_name(position: usize) -> String {
    format!("arg{position}")
}

/// `Transfer(address indexed from, address indexed to, uint256 indexed tokenId)`
pub fn erc721_transfer() -> Event {
    Event::template(
        "Transfer",
        vec![
            Argument::new("from", Value::address(Address::ZERO), true),
            Argument::new("to", Value::address(Address::ZERO), true),
            Argument::new("tokenId", Value::uint256(U256::ZERO), true),
        ],
    )
}

/// Loads event templates from a contract JSON ABI file. When `names` is
/// non-empty only those events are returned and each must be present and
/// supported; otherwise unsupported and anonymous events are skipped.
pub fn load_json_abi_events(path: &Path, names: &[String]) -> anyhow::Result<Vec<Event>> {
    let raw = std::fs::read(path)?;
    let abi: JsonAbi = serde_json::from_slice(&raw)?;

    if !names.is_empty() {
        return names
            .iter()
            .map(|name| {
                let event = abi
                    .events
                    .get(name)
                    .and_then(|overloads| overloads.first())
                    .ok_or_else(|| anyhow::anyhow!("event {name} not found in {}", path.display()))?;
                let template = Event::from_json_abi(event)?;
                Extractor::new(template.clone())?;
                Ok(template)
            })
            .collect();
    }

    // Only events an extractor can decode, e.g. no indexed string or bytes
    let mut events = Vec::new();
    for event in abi.events() {
        let template = Event::from_json_abi(event)
            .and_then(|template| Extractor::new(template.clone()).map(|_| template));
        match template {
            Ok(template) => events.push(template),
            Err(e) => warn!("Skipping event {}: {}", event.name, e),
        }
    }
    Ok(events)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
