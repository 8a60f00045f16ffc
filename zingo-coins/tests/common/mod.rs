#![allow(dead_code)]

use std::sync::Once;

use zcash_primitives::{block::BlockHash, consensus::BlockHeight};
use zingo_coins::{
    primitives::{Anchor, Nullifier, ShieldedType},
    transaction::{OutPoint, SpendDescription, Transaction, TransactionBuilder, TxIn, TxOut},
    tree::{NoteCommitmentTree, SaplingTree},
    undo::{disconnect_tx, update_coins, TxUndo},
    CoinsView, CoinsViewCache,
};

static LOG_INIT: Once = Once::new();

pub fn init_logging() {
    LOG_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub fn block_hash(seed: u8) -> BlockHash {
    BlockHash([seed; 32])
}

pub fn nullifier(seed: u8) -> Nullifier {
    Nullifier::from_bytes([seed; 32])
}

pub fn commitment(seed: u8) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[0] = seed;
    bytes
}

pub fn coinbase(height: u32, value: i64) -> Transaction {
    TransactionBuilder::new()
        .coinbase()
        .lock_time(height)
        .output(TxOut::new(value, vec![0x51]))
        .build()
        .unwrap()
}

pub fn spend(prevouts: &[OutPoint], values: &[i64]) -> TransactionBuilder {
    let builder = prevouts
        .iter()
        .fold(TransactionBuilder::new(), |builder, prevout| {
            builder.input(TxIn::new(*prevout))
        });
    values.iter().fold(builder, |builder, value| {
        builder.output(TxOut::new(*value, vec![0x51]))
    })
}

pub fn sapling_spend(anchor: Anchor, nullifier: Nullifier) -> SpendDescription {
    SpendDescription { anchor, nullifier }
}

pub struct Block {
    pub hash: BlockHash,
    pub height: BlockHeight,
    pub txs: Vec<Transaction>,
}

/// Checks and applies every transaction of `block`, then installs the new
/// sapling tree and best block. Returns one undo entry per transaction.
pub fn connect_block<B: CoinsView>(cache: &mut CoinsViewCache<B>, block: &Block) -> Vec<TxUndo> {
    let root = cache
        .get_best_anchor(ShieldedType::Sapling)
        .expect("store knows the sapling root");
    let mut tree = cache
        .get_anchor_at::<SaplingTree>(&root)
        .expect("best sapling anchor resolves");

    let mut undos = Vec::new();
    for tx in &block.txs {
        assert!(cache.have_inputs(tx), "inputs of {}", tx.txid());
        assert!(cache.have_shielded_requirements(tx), "shielded {}", tx.txid());
        let mut undo = TxUndo::default();
        update_coins(tx, cache, &mut undo, block.height);
        for output in tx.shielded_outputs() {
            tree.append(output.cmu).unwrap();
        }
        undos.push(undo);
    }
    cache.push_anchor(&tree);
    cache.set_best_block(block.hash);
    undos
}

/// Reverses [`connect_block`], returning whether it was clean.
pub fn disconnect_block<B: CoinsView>(
    cache: &mut CoinsViewCache<B>,
    block: &Block,
    undos: &[TxUndo],
    previous: BlockHash,
    previous_sapling_root: Anchor,
) -> bool {
    let mut clean = true;
    for (tx, undo) in block.txs.iter().zip(undos).rev() {
        clean &= disconnect_tx(tx, undo, cache, block.height);
    }
    cache.pop_anchor(&previous_sapling_root, ShieldedType::Sapling);
    cache.set_best_block(previous);
    clean
}
