//! Packet framing across the whole block index range.

mod common;

use common::random_bytes;

use lmodem_core::block::{Block, BlockIndex, MAX_BLOCKS};
use lmodem_core::file::Fingerprint;
use lmodem_core::protocol::{self, Control, Packet};
use lmodem_core::transfer::Ledger;
use lmodem_core::Error;

#[test]
fn test_every_index_survives_framing() {
    for index in BlockIndex::range(MAX_BLOCKS) {
        let block = Block::new(index, hex::encode(random_bytes(4)));
        let frame = protocol::frame_data(&block);
        assert_eq!(protocol::parse_data(&frame).unwrap(), block);
    }
}

#[test]
fn test_uppercase_radio_output_is_accepted() {
    let block = Block::new(BlockIndex::new(42).unwrap(), "0a1b2c".to_string());
    let frame = protocol::frame_data(&block).to_ascii_uppercase();
    assert_eq!(
        protocol::parse_delivery(&frame).unwrap(),
        Packet::Data(block)
    );

    let eot = protocol::frame_control(&Control::EndOfTransmission).to_ascii_uppercase();
    assert_eq!(
        protocol::parse_delivery(&eot).unwrap(),
        Packet::Control(Control::EndOfTransmission)
    );
}

#[test]
fn test_block_ceiling() {
    let fingerprint = Fingerprint::of_bytes(b"ceiling");
    assert!(Ledger::new(fingerprint, MAX_BLOCKS).is_ok());
    assert!(matches!(
        Ledger::new(fingerprint, MAX_BLOCKS + 1),
        Err(Error::TooManyBlocks { .. })
    ));
    assert!(BlockIndex::new(MAX_BLOCKS).is_none());
}

#[test]
fn test_long_request_is_truncated() {
    let missing: Vec<BlockIndex> = BlockIndex::range(MAX_BLOCKS).skip(1).collect();
    let request = Control::block_request(1, &missing, 127);

    let Control::BlockRequest { received, missing } = &request else {
        panic!("expected a block request");
    };
    assert_eq!(*received, 1);
    assert_eq!(missing.len(), 32);
    assert_eq!(missing[0].get(), 1);

    // Three count digits ahead of a 127 character list.
    let frame = protocol::frame_control(&request);
    assert_eq!(frame.len() / 2, 3 + 127);
    assert_eq!(protocol::parse_control(&frame).unwrap(), request);
}
