//! Per-signature log decoder.
//!
//! An [`Extractor`] is built once from a signature template and then decodes
//! every log whose topic 0 matches the template's signature hash. Indexed
//! arguments come from `topics[1..]`, the others from the ABI-encoded data.

use std::collections::HashMap;

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, B256};
use tracing::trace;

use crate::error::{Error, Result};
use crate::pb::eth;
use crate::pb::events::Event;
use crate::signature::placeholder_name;

#[derive(Debug, Clone)]
struct Slot {
    /// Position in the template's argument list
    position: usize,
    name: String,
    ty: DynSolType,
}

#[derive(Debug, Clone)]
pub struct Extractor {
    template: Event,
    signature: String,
    hash: B256,
    indexed: Vec<Slot>,
    non_indexed: Vec<Slot>,
    name_to_index: HashMap<String, usize>,
}

impl Extractor {
    pub fn new(template: Event) -> Result<Self> {
        template.validate_template()?;
        let signature = template.signature()?;
        let hash = template.signature_hash()?;

        let arguments = template.abi_arguments()?;
        let mut name_to_index = HashMap::with_capacity(arguments.len());
        let mut indexed = Vec::new();
        let mut non_indexed = Vec::new();

        for (position, arg) in arguments.into_iter().enumerate() {
            let name = if arg.name.is_empty() {
                placeholder_name(position)
            } else {
                arg.name
            };
            if name_to_index.insert(name.clone(), position).is_some() {
                return Err(Error::invalid(format!(
                    "event {signature} has more than one argument named {name:?}"
                )));
            }
            if arg.indexed && matches!(arg.ty, DynSolType::String | DynSolType::Bytes) {
                return Err(Error::invalid(format!(
                    "event {signature}: indexed {} argument {name:?} only carries a hash and cannot be decoded",
                    arg.ty
                )));
            }

            let slot = Slot {
                position,
                name,
                ty: arg.ty,
            };
            if arg.indexed {
                indexed.push(slot);
            } else {
                non_indexed.push(slot);
            }
        }

        Ok(Self {
            template,
            signature,
            hash,
            indexed,
            non_indexed,
            name_to_index,
        })
    }

    /// Topic 0 of every log this extractor decodes.
    pub fn signature_hash(&self) -> B256 {
        self.hash
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn template(&self) -> &Event {
        &self.template
    }

    /// Whether two templates with the same signature also agree on which
    /// arguments are indexed.
    pub fn same_layout(&self, other: &Extractor) -> bool {
        self.hash == other.hash
            && self.indexed.iter().map(|s| s.position).eq(other.indexed.iter().map(|s| s.position))
    }

    /// Decodes a raw log into a populated copy of the template.
    pub fn decode(&self, log: &eth::Log) -> Result<Event> {
        let topics = log
            .topics
            .iter()
            .map(|t| {
                if t.len() == 32 {
                    Ok(B256::from_slice(t))
                } else {
                    Err(Error::Log(format!("topic must be 32 bytes, got {}", t.len())))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let Some(topic0) = topics.first() else {
            return Err(Error::Log("anonymous events are not supported".into()));
        };
        if *topic0 != self.hash {
            return Err(Error::Log(format!(
                "topic 0 {topic0} does not match {} ({})",
                self.signature, self.hash
            )));
        }
        if topics.len() != self.indexed.len() + 1 {
            return Err(Error::Log(format!(
                "{} expects {} topics, log has {}",
                self.signature,
                self.indexed.len() + 1,
                topics.len()
            )));
        }

        let mut decoded: HashMap<&str, DynSolValue> = HashMap::with_capacity(self.indexed.len());
        for (slot, topic) in self.indexed.iter().zip(&topics[1..]) {
            let value = slot.ty.abi_decode(topic.as_slice()).map_err(|e| {
                Error::Log(format!("{}: indexed argument {}: {e}", self.signature, slot.name))
            })?;
            decoded.insert(slot.name.as_str(), value);
        }

        let data_values = self.decode_data(&log.data)?;

        let mut event = self.template.clone();
        let named = decoded
            .into_iter()
            .chain(self.non_indexed.iter().map(|s| s.name.as_str()).zip(data_values));
        for (name, value) in named {
            let Some(&index) = self.name_to_index.get(name) else {
                return Err(Error::Internal(format!(
                    "{}: decoded unknown argument {name:?}",
                    self.signature
                )));
            };
            trace!(event = %self.signature, argument = name, value = ?value, "decoded argument");
            let argument = &mut event.arguments[index];
            let populated = argument.value()?.from_sol(value)?;
            argument.value = Some(populated);
        }

        event.address = log.address.clone();
        event.log_index = log.block_index;
        Ok(event)
    }

    fn decode_data(&self, data: &[u8]) -> Result<Vec<DynSolValue>> {
        if self.non_indexed.is_empty() {
            return Ok(Vec::new());
        }
        let tuple = DynSolType::Tuple(self.non_indexed.iter().map(|s| s.ty.clone()).collect());
        match tuple.abi_decode_params(data) {
            Ok(DynSolValue::Tuple(values)) => Ok(values),
            Ok(_) => Err(Error::Internal(format!(
                "{}: log data did not decode to a tuple",
                self.signature
            ))),
            Err(e) => Err(Error::Log(format!("{}: log data: {e}", self.signature))),
        }
    }

    /// Encodes a populated event of this signature back into a raw log.
    pub fn encode(&self, event: &Event) -> Result<eth::Log> {
        if event.signature_hash()? != self.hash {
            return Err(Error::Abi(format!(
                "event {} does not have signature {}",
                event.name, self.signature
            )));
        }
        if event.arguments.len() != self.indexed.len() + self.non_indexed.len() {
            return Err(Error::Abi(format!(
                "{} has {} arguments, event carries {}",
                self.signature,
                self.indexed.len() + self.non_indexed.len(),
                event.arguments.len()
            )));
        }

        let mut topics = Vec::with_capacity(self.indexed.len() + 1);
        topics.push(self.hash.to_vec());
        for slot in &self.indexed {
            let value = event.arguments[slot.position].value()?.to_sol()?;
            topics.push(value.abi_encode());
        }

        let data = if self.non_indexed.is_empty() {
            Vec::new()
        } else {
            let values = self
                .non_indexed
                .iter()
                .map(|slot| event.arguments[slot.position].value()?.to_sol())
                .collect::<Result<Vec<_>>>()?;
            DynSolValue::Tuple(values).abi_encode_params()
        };

        Ok(eth::Log {
            address: event.address.clone(),
            topics,
            data,
            block_index: event.log_index,
            ..Default::default()
        })
    }
}

/// Emitter of a raw log, if it is a well-formed 20-byte address.
pub fn log_address(log: &eth::Log) -> Option<Address> {
    (log.address.len() == 20).then(|| Address::from_slice(&log.address))
}
