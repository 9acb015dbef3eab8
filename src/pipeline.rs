//! Block level extraction: walks a raw Firehose Ethereum block and keeps
//! only the logs matching the requested contracts and event signatures.

use std::collections::{BTreeSet, HashMap};

use alloy_primitives::{Address, B256};
use tracing::debug;

use crate::error::{Error, Result};
use crate::extractor::{log_address, Extractor};
use crate::pb::eth;
use crate::pb::events::{Block, Event, Transaction};

/// Contracts whose logs are kept. Repeated addresses collapse.
#[derive(Debug, Clone, Default)]
pub struct ContractSet(BTreeSet<Address>);

impl ContractSet {
    /// Builds the set from raw request bytes; every entry must be 20 bytes.
    pub fn from_raw(contracts: &[Vec<u8>]) -> Result<Self> {
        contracts
            .iter()
            .map(|raw| {
                if raw.len() == 20 {
                    Ok(Address::from_slice(raw))
                } else {
                    Err(Error::invalid(format!(
                        "contract address must be 20 bytes, got {}",
                        raw.len()
                    )))
                }
            })
            .collect::<Result<BTreeSet<_>>>()
            .map(Self)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.0.contains(address)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.0.iter()
    }
}

impl FromIterator<Address> for ContractSet {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Extractors keyed by signature hash (topic 0).
#[derive(Debug, Clone, Default)]
pub struct ExtractorSet(HashMap<B256, Extractor>);

impl ExtractorSet {
    /// Builds one extractor per distinct signature. Identical duplicates
    /// collapse; the same signature with a different indexed layout is a
    /// conflicting request.
    pub fn from_templates(templates: impl IntoIterator<Item = Event>) -> Result<Self> {
        let mut extractors: HashMap<B256, Extractor> = HashMap::new();
        for template in templates {
            let extractor = Extractor::new(template)?;
            let hash = extractor.signature_hash();
            match extractors.get(&hash) {
                Some(existing) if existing.same_layout(&extractor) => {
                    debug!(signature = extractor.signature(), "duplicate signature collapsed");
                }
                Some(existing) => {
                    return Err(Error::invalid(format!(
                        "signature {} requested twice with different indexed arguments",
                        existing.signature()
                    )));
                }
                None => {
                    extractors.insert(hash, extractor);
                }
            }
        }
        Ok(Self(extractors))
    }

    pub fn get(&self, topic0: &B256) -> Option<&Extractor> {
        self.0.get(topic0)
    }

    pub fn hashes(&self) -> impl Iterator<Item = &B256> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Extracts the matching events of a raw block. Transactions without a
/// matching log are left out. The first log that matches but fails to
/// decode aborts the whole block.
pub fn extract(raw: &eth::Block, contracts: &ContractSet, extractors: &ExtractorSet) -> Result<Block> {
    debug!(
        number = raw.number,
        transactions = raw.transaction_traces.len(),
        "extracting block"
    );

    let mut transactions = Vec::new();
    for trace in &raw.transaction_traces {
        let Some(receipt) = &trace.receipt else {
            continue;
        };

        let mut events = Vec::new();
        for log in &receipt.logs {
            let Some(extractor) = matching_extractor(log, contracts, extractors) else {
                continue;
            };
            let event = extractor
                .decode(log)
                .map_err(|e| e.in_transaction(hash_of(&trace.hash), log.block_index))?;
            events.push(event);
        }

        if events.is_empty() {
            continue;
        }
        debug!(
            block = raw.number,
            tx = %hash_of(&trace.hash),
            events = events.len(),
            "matched transaction"
        );
        transactions.push(Transaction {
            hash: trace.hash.clone(),
            events,
        });
    }

    let header = raw.header.as_ref();
    Ok(Block {
        number: raw.number,
        hash: raw.hash.clone(),
        parent_hash: header.map(|h| h.parent_hash.clone()).unwrap_or_default(),
        timestamp: header.and_then(|h| h.timestamp.clone()),
        transactions,
    })
}

fn matching_extractor<'a>(
    log: &eth::Log,
    contracts: &ContractSet,
    extractors: &'a ExtractorSet,
) -> Option<&'a Extractor> {
    let address = log_address(log)?;
    if !contracts.contains(&address) {
        return None;
    }
    // No topics means an anonymous event, which is unsupported
    let topic0 = log.topics.first().filter(|t| t.len() == 32)?;
    extractors.get(&B256::from_slice(topic0))
}

fn hash_of(raw: &[u8]) -> B256 {
    if raw.len() == 32 {
        B256::from_slice(raw)
    } else {
        B256::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb::events::Value;
    use crate::signature::erc721_transfer;
    use alloy_primitives::U256;

    fn transfer_log(extractor: &Extractor, emitter: Address, token: u64, index: u32) -> eth::Log {
        let mut event = erc721_transfer();
        event.arguments[0].value = Some(Value::address(Address::repeat_byte(0x0a)));
        event.arguments[1].value = Some(Value::address(Address::repeat_byte(0x0b)));
        event.arguments[2].value = Some(Value::uint256(U256::from(token)));
        event.address = emitter.to_vec();
        event.log_index = index;
        extractor.encode(&event).unwrap()
    }

    fn trace(hash: u8, logs: Vec<eth::Log>) -> eth::TransactionTrace {
        eth::TransactionTrace {
            hash: B256::repeat_byte(hash).to_vec(),
            receipt: Some(eth::TransactionReceipt {
                logs,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_contract_set() {
        let a = Address::repeat_byte(1);
        let set = ContractSet::from_raw(&[a.to_vec(), a.to_vec()]).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(&a));
        assert!(ContractSet::from_raw(&[vec![0u8; 19]]).is_err());
    }

    #[test]
    fn test_extractor_set_conflicts() {
        let same = ExtractorSet::from_templates([erc721_transfer(), erc721_transfer()]).unwrap();
        assert_eq!(same.len(), 1);

        let mut erc20 = erc721_transfer();
        erc20.arguments[2].indexed = false;
        let err = ExtractorSet::from_templates([erc721_transfer(), erc20]).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_sparse_transactions_and_address_filter() {
        let wanted = Address::repeat_byte(0xaa);
        let other = Address::repeat_byte(0xbb);
        let extractors = ExtractorSet::from_templates([erc721_transfer()]).unwrap();
        let extractor = extractors.get(&extractors.hashes().next().copied().unwrap()).unwrap();

        let block = eth::Block {
            number: 100,
            hash: B256::repeat_byte(0x10).to_vec(),
            transaction_traces: vec![
                trace(1, vec![transfer_log(extractor, wanted, 1, 0)]),
                trace(2, vec![transfer_log(extractor, other, 2, 1)]),
                trace(3, vec![]),
                eth::TransactionTrace::default(),
            ],
            ..Default::default()
        };

        let contracts: ContractSet = [wanted].into_iter().collect();
        let out = extract(&block, &contracts, &extractors).unwrap();
        assert_eq!(out.number, 100);
        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.transactions[0].hash, B256::repeat_byte(1).to_vec());
        assert_eq!(out.transactions[0].events.len(), 1);
        assert_eq!(out.transactions[0].events[0].address, wanted.to_vec());
    }

    #[test]
    fn test_unknown_and_anonymous_logs_skipped() {
        let wanted = Address::repeat_byte(0xaa);
        let extractors = ExtractorSet::from_templates([erc721_transfer()]).unwrap();
        let unknown = eth::Log {
            address: wanted.to_vec(),
            topics: vec![B256::repeat_byte(0x55).to_vec()],
            ..Default::default()
        };
        let anonymous = eth::Log {
            address: wanted.to_vec(),
            ..Default::default()
        };
        let block = eth::Block {
            transaction_traces: vec![trace(1, vec![unknown, anonymous])],
            ..Default::default()
        };
        let contracts: ContractSet = [wanted].into_iter().collect();
        let out = extract(&block, &contracts, &extractors).unwrap();
        assert!(out.transactions.is_empty());
    }

    #[test]
    fn test_decode_failure_aborts_block() {
        let wanted = Address::repeat_byte(0xaa);
        let extractors = ExtractorSet::from_templates([erc721_transfer()]).unwrap();
        let extractor = extractors.get(&extractors.hashes().next().copied().unwrap()).unwrap();

        let good = transfer_log(extractor, wanted, 1, 0);
        let mut bad = transfer_log(extractor, wanted, 2, 3);
        bad.topics.truncate(2);

        let block = eth::Block {
            transaction_traces: vec![trace(1, vec![good]), trace(2, vec![bad])],
            ..Default::default()
        };
        let contracts: ContractSet = [wanted].into_iter().collect();
        match extract(&block, &contracts, &extractors) {
            Err(Error::Decode { tx, log_index, .. }) => {
                assert_eq!(tx, B256::repeat_byte(2));
                assert_eq!(log_index, 3);
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_header_fields_carried() {
        let block = eth::Block {
            number: 7,
            header: Some(eth::BlockHeader {
                parent_hash: vec![9u8; 32],
                timestamp: Some(prost_types::Timestamp { seconds: 1_700_000_000, nanos: 0 }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = extract(&block, &ContractSet::default(), &ExtractorSet::default()).unwrap();
        assert_eq!(out.parent_hash, vec![9u8; 32]);
        assert_eq!(out.timestamp.unwrap().seconds, 1_700_000_000);
    }
}
