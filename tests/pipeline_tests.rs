//! Integration tests for block extraction

mod common;

#[cfg(test)]
mod tests {
    use crate::common::*;
    use alloy_primitives::{B256, U256};
    use firehose_events::{erc721_transfer, extract, ContractSet, Error, ExtractorSet};

    #[test]
    fn test_example_scenario_two_transactions() {
        let extractors = ExtractorSet::from_templates([erc721_transfer(), with_data_template()]).unwrap();
        let contracts: ContractSet = [EMITTER].into_iter().collect();

        let raw = block(
            1,
            vec![
                tx(0xa1, vec![transfer_log(EMITTER, 7, 0)]),
                tx(0xa2, vec![transfer_log(OTHER, 8, 1)]),
                tx(0xa3, vec![with_data_log(EMITTER, 1, b"hello world", 2)]),
            ],
        );

        let out = extract(&raw, &contracts, &extractors).unwrap();
        assert_eq!(out.transactions.len(), 2);
        assert_eq!(out.transactions[0].hash, B256::repeat_byte(0xa1).to_vec());
        assert_eq!(out.transactions[1].hash, B256::repeat_byte(0xa3).to_vec());

        let transfer = &out.transactions[0].events[0];
        assert_eq!(transfer.name, "Transfer");
        assert_eq!(transfer.argument("tokenId").unwrap().as_uint256().unwrap(), U256::from(7));

        let with_data = &out.transactions[1].events[0];
        assert_eq!(with_data.name, "WithData");
        assert_eq!(with_data.argument("data").unwrap().as_bytes().unwrap(), b"hello world");
        assert_eq!(with_data.log_index, 2);
    }

    #[test]
    fn test_two_contracts_same_signature() {
        let extractors = ExtractorSet::from_templates([erc721_transfer()]).unwrap();
        let raw = block(
            2,
            vec![tx(
                0xb1,
                vec![transfer_log(EMITTER, 1, 0), transfer_log(OTHER, 2, 1), transfer_log(EMITTER, 3, 2)],
            )],
        );

        let only_emitter: ContractSet = [EMITTER].into_iter().collect();
        let out = extract(&raw, &only_emitter, &extractors).unwrap();
        let events = &out.transactions[0].events;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.address == EMITTER.to_vec()));
        assert_eq!(
            events.iter().map(|e| e.log_index).collect::<Vec<_>>(),
            vec![0, 2]
        );

        let both: ContractSet = [EMITTER, OTHER].into_iter().collect();
        let out = extract(&raw, &both, &extractors).unwrap();
        assert_eq!(out.transactions[0].events.len(), 3);
    }

    #[test]
    fn test_no_matches_keeps_block_identity() {
        let extractors = ExtractorSet::from_templates([erc721_transfer()]).unwrap();
        let contracts: ContractSet = [EMITTER].into_iter().collect();
        let raw = block(9, vec![tx(0xc1, vec![transfer_log(OTHER, 1, 0)])]);

        let out = extract(&raw, &contracts, &extractors).unwrap();
        assert!(out.transactions.is_empty());
        assert_eq!(out.number, 9);
        assert_eq!(out.hash, raw.hash);
        assert_eq!(out.timestamp, raw.header.unwrap().timestamp);
    }

    #[test]
    fn test_erc20_transfer_layout_is_a_decode_error() {
        // ERC-20 Transfer shares the signature hash but carries the amount in data
        let extractors = ExtractorSet::from_templates([erc721_transfer()]).unwrap();
        let contracts: ContractSet = [EMITTER].into_iter().collect();

        let mut erc20 = transfer_log(EMITTER, 5, 4);
        let amount = erc20.topics.pop().unwrap();
        erc20.data = amount;

        let raw = block(3, vec![tx(0xd1, vec![erc20])]);
        match extract(&raw, &contracts, &extractors) {
            Err(Error::Decode { tx, log_index, .. }) => {
                assert_eq!(tx, B256::repeat_byte(0xd1));
                assert_eq!(log_index, 4);
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}
