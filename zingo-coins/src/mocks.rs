//! Tools to facilitate mocks for testing

use rand::{rngs::OsRng, Rng};
use zcash_primitives::{block::BlockHash, consensus::BlockHeight, transaction::TxId};

use crate::{
    coins::CoinRecord,
    error::ViewError,
    primitives::{Anchor, Nullifier, ShieldedType},
    transaction::{OutPoint, Transaction, TransactionBuilder, TxIn, TxOut},
    tree::{SaplingTree, SproutTree},
    view::{CoinsDelta, CoinsView},
};

/// Any old OS randomness
pub fn random_txid() -> TxId {
    let mut rng = OsRng;
    let mut seed = [0u8; 32];
    rng.fill(&mut seed);
    TxId::from_bytes(seed)
}

/// Any old OS randomness
pub fn random_nullifier() -> Nullifier {
    let mut rng = OsRng;
    let mut seed = [0u8; 32];
    rng.fill(&mut seed);
    Nullifier::from_bytes(seed)
}

/// Any old OS randomness
pub fn random_block_hash() -> BlockHash {
    let mut rng = OsRng;
    let mut seed = [0u8; 32];
    rng.fill(&mut seed);
    BlockHash(seed)
}

/// A note commitment valid in both pools.
pub fn commitment(seed: u8) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[0] = seed;
    bytes
}

/// A non-coinbase record with one anyone-can-spend output per value.
pub fn coin_record(values: &[i64], height: u32) -> CoinRecord {
    CoinRecord {
        is_coinbase: false,
        outputs: values
            .iter()
            .map(|value| Some(TxOut::new(*value, vec![0x51])))
            .collect(),
        height: BlockHeight::from_u32(height),
        version: 4,
    }
}

/// A transaction spending `prevouts` into a single output.
pub fn spend_tx(prevouts: &[OutPoint]) -> Transaction {
    prevouts
        .iter()
        .fold(TransactionBuilder::new(), |builder, prevout| {
            builder.input(TxIn::new(*prevout))
        })
        .output(TxOut::new(1, vec![0x51]))
        .build()
        .expect("writing to a Vec does not fail")
}

/// Read counters of a [`CountingView`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadCounts {
    /// Calls to `get_coins`.
    pub coins: usize,
    /// Calls to either anchor read.
    pub anchors: usize,
    /// Calls to `get_nullifier`.
    pub nullifiers: usize,
    /// Calls to `get_best_block` or `get_best_anchor`.
    pub best: usize,
}

/// Wraps a view and counts the reads that reach it.
#[derive(Debug, Default)]
pub struct CountingView<V> {
    /// The wrapped view.
    pub inner: V,
    /// Reads observed so far.
    pub reads: ReadCounts,
}

impl<V: CoinsView> CountingView<V> {
    /// Wraps `inner` with all counters at zero.
    pub fn new(inner: V) -> Self {
        CountingView {
            inner,
            reads: ReadCounts::default(),
        }
    }
}

impl<V: CoinsView> CoinsView for CountingView<V> {
    fn get_coins(&mut self, txid: &TxId) -> Option<CoinRecord> {
        self.reads.coins += 1;
        self.inner.get_coins(txid)
    }

    fn have_coins(&mut self, txid: &TxId) -> bool {
        self.reads.coins += 1;
        self.inner.have_coins(txid)
    }

    fn get_sprout_anchor_at(&mut self, root: &Anchor) -> Option<SproutTree> {
        self.reads.anchors += 1;
        self.inner.get_sprout_anchor_at(root)
    }

    fn get_sapling_anchor_at(&mut self, root: &Anchor) -> Option<SaplingTree> {
        self.reads.anchors += 1;
        self.inner.get_sapling_anchor_at(root)
    }

    fn get_nullifier(&mut self, nullifier: &Nullifier, pool: ShieldedType) -> bool {
        self.reads.nullifiers += 1;
        self.inner.get_nullifier(nullifier, pool)
    }

    fn get_best_block(&mut self) -> Option<BlockHash> {
        self.reads.best += 1;
        self.inner.get_best_block()
    }

    fn get_best_anchor(&mut self, pool: ShieldedType) -> Option<Anchor> {
        self.reads.best += 1;
        self.inner.get_best_anchor(pool)
    }

    fn batch_write(&mut self, delta: &mut CoinsDelta) -> Result<(), ViewError> {
        self.inner.batch_write(delta)
    }
}

/// Wraps a view and rejects batch writes while `failing` is set.
#[derive(Debug, Default)]
pub struct FailingView<V> {
    /// The wrapped view.
    pub inner: V,
    /// Whether the next batch write is rejected.
    pub failing: bool,
}

impl<V: CoinsView> FailingView<V> {
    /// Wraps `inner`, rejecting writes from the start.
    pub fn new(inner: V) -> Self {
        FailingView {
            inner,
            failing: true,
        }
    }
}

impl<V: CoinsView> CoinsView for FailingView<V> {
    fn get_coins(&mut self, txid: &TxId) -> Option<CoinRecord> {
        self.inner.get_coins(txid)
    }

    fn have_coins(&mut self, txid: &TxId) -> bool {
        self.inner.have_coins(txid)
    }

    fn get_sprout_anchor_at(&mut self, root: &Anchor) -> Option<SproutTree> {
        self.inner.get_sprout_anchor_at(root)
    }

    fn get_sapling_anchor_at(&mut self, root: &Anchor) -> Option<SaplingTree> {
        self.inner.get_sapling_anchor_at(root)
    }

    fn get_nullifier(&mut self, nullifier: &Nullifier, pool: ShieldedType) -> bool {
        self.inner.get_nullifier(nullifier, pool)
    }

    fn get_best_block(&mut self) -> Option<BlockHash> {
        self.inner.get_best_block()
    }

    fn get_best_anchor(&mut self, pool: ShieldedType) -> Option<Anchor> {
        self.inner.get_best_anchor(pool)
    }

    fn batch_write(&mut self, delta: &mut CoinsDelta) -> Result<(), ViewError> {
        if self.failing {
            return Err(ViewError::WriteRejected("store offline".to_string()));
        }
        self.inner.batch_write(delta)
    }
}
