//! The backing store interface shared by every layer of the coins view stack.

use std::collections::HashMap;

use zcash_primitives::{block::BlockHash, transaction::TxId};

use crate::{
    coins::CoinRecord,
    error::ViewError,
    primitives::{Anchor, Nullifier, ShieldedType},
    tree::{NoteCommitmentTree, SaplingTree, SproutTree},
};

pub mod backed;

/// A coin record staged in a cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoinsCacheEntry {
    /// The cached record.
    pub coins: CoinRecord,
    /// Differs from the parent and must be written back.
    pub dirty: bool,
    /// The parent does not hold a live copy; may be dropped without a tombstone.
    pub fresh: bool,
}

impl CoinsCacheEntry {
    /// A clean entry holding `coins`.
    pub fn new(coins: CoinRecord) -> Self {
        CoinsCacheEntry {
            coins,
            dirty: false,
            fresh: false,
        }
    }
}

/// A note commitment tree snapshot staged in a cache, keyed by its root.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorsCacheEntry<T> {
    /// Whether the anchor is part of the active chain.
    pub entered: bool,
    /// The tree whose root is the key.
    pub tree: T,
    /// Differs from the parent and must be written back.
    pub dirty: bool,
}

/// A nullifier staged in a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullifiersCacheEntry {
    /// Whether the nullifier is spent.
    pub entered: bool,
    /// Differs from the parent and must be written back.
    pub dirty: bool,
}

/// Coin entries keyed by txid.
pub type CoinsMap = HashMap<TxId, CoinsCacheEntry>;
/// Anchor entries of one pool keyed by root.
pub type AnchorsMap<T> = HashMap<Anchor, AnchorsCacheEntry<T>>;
/// Nullifier entries of one pool.
pub type NullifiersMap = HashMap<Nullifier, NullifiersCacheEntry>;

/// Everything one layer hands to its parent in a batch write.
#[derive(Debug, Clone, Default)]
pub struct CoinsDelta {
    /// Coin entries.
    pub coins: CoinsMap,
    /// Block this state represents.
    pub best_block: Option<BlockHash>,
    /// Current sprout root.
    pub best_sprout_anchor: Option<Anchor>,
    /// Current sapling root.
    pub best_sapling_anchor: Option<Anchor>,
    /// Sprout anchor entries.
    pub sprout_anchors: AnchorsMap<SproutTree>,
    /// Sapling anchor entries.
    pub sapling_anchors: AnchorsMap<SaplingTree>,
    /// Sprout nullifier entries.
    pub sprout_nullifiers: NullifiersMap,
    /// Sapling nullifier entries.
    pub sapling_nullifiers: NullifiersMap,
}

impl CoinsDelta {
    /// Best anchor of `pool`.
    pub fn best_anchor(&self, pool: ShieldedType) -> Option<Anchor> {
        match pool {
            ShieldedType::Sprout => self.best_sprout_anchor,
            ShieldedType::Sapling => self.best_sapling_anchor,
        }
    }

    /// Nullifier entries of `pool`.
    pub fn nullifiers(&self, pool: ShieldedType) -> &NullifiersMap {
        match pool {
            ShieldedType::Sprout => &self.sprout_nullifiers,
            ShieldedType::Sapling => &self.sapling_nullifiers,
        }
    }

    /// Mutable best anchor of `pool`.
    pub fn best_anchor_mut(&mut self, pool: ShieldedType) -> &mut Option<Anchor> {
        match pool {
            ShieldedType::Sprout => &mut self.best_sprout_anchor,
            ShieldedType::Sapling => &mut self.best_sapling_anchor,
        }
    }

    /// Mutable nullifier entries of `pool`.
    pub fn nullifiers_mut(&mut self, pool: ShieldedType) -> &mut NullifiersMap {
        match pool {
            ShieldedType::Sprout => &mut self.sprout_nullifiers,
            ShieldedType::Sapling => &mut self.sapling_nullifiers,
        }
    }

    /// Drops every staged entry, keeping the best block and anchors.
    pub fn clear_entries(&mut self) {
        self.coins.clear();
        self.sprout_anchors.clear();
        self.sapling_anchors.clear();
        self.sprout_nullifiers.clear();
        self.sapling_nullifiers.clear();
    }

    /// True when no entry of any kind is staged.
    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
            && self.sprout_anchors.is_empty()
            && self.sapling_anchors.is_empty()
            && self.sprout_nullifiers.is_empty()
            && self.sapling_nullifiers.is_empty()
    }
}

/// A tree type with its own anchor map in a [`CoinsDelta`] and its own read
/// in [`CoinsView`].
pub trait AnchorPool: NoteCommitmentTree {
    /// Anchor entries of this pool.
    fn anchors(delta: &CoinsDelta) -> &AnchorsMap<Self>;

    /// Mutable anchor entries of this pool.
    fn anchors_mut(delta: &mut CoinsDelta) -> &mut AnchorsMap<Self>;

    /// Read the tree at `root` from `view`.
    fn anchor_at<V: CoinsView + ?Sized>(view: &mut V, root: &Anchor) -> Option<Self>;
}

impl AnchorPool for SproutTree {
    fn anchors(delta: &CoinsDelta) -> &AnchorsMap<Self> {
        &delta.sprout_anchors
    }

    fn anchors_mut(delta: &mut CoinsDelta) -> &mut AnchorsMap<Self> {
        &mut delta.sprout_anchors
    }

    fn anchor_at<V: CoinsView + ?Sized>(view: &mut V, root: &Anchor) -> Option<Self> {
        view.get_sprout_anchor_at(root)
    }
}

impl AnchorPool for SaplingTree {
    fn anchors(delta: &CoinsDelta) -> &AnchorsMap<Self> {
        &delta.sapling_anchors
    }

    fn anchors_mut(delta: &mut CoinsDelta) -> &mut AnchorsMap<Self> {
        &mut delta.sapling_anchors
    }

    fn anchor_at<V: CoinsView + ?Sized>(view: &mut V, root: &Anchor) -> Option<Self> {
        view.get_sapling_anchor_at(root)
    }
}

/// A provider of coins, anchors and nullifiers: a cache layer or a chain store.
///
/// Reads take `&mut self`: a cache answering a read may pull the entry through
/// from its parent and memoize it, so reads are mutations of cached state and
/// fall under the same exclusive access as writes.
///
/// Every method defaults to the degenerate empty view.
pub trait CoinsView {
    /// Record for `txid`, if any. A pruned record may be returned.
    fn get_coins(&mut self, _txid: &TxId) -> Option<CoinRecord> {
        None
    }

    /// Whether a record for `txid` exists.
    fn have_coins(&mut self, _txid: &TxId) -> bool {
        false
    }

    /// Sprout tree whose root is `root`.
    fn get_sprout_anchor_at(&mut self, _root: &Anchor) -> Option<SproutTree> {
        None
    }

    /// Sapling tree whose root is `root`.
    fn get_sapling_anchor_at(&mut self, _root: &Anchor) -> Option<SaplingTree> {
        None
    }

    /// Whether `nullifier` is spent in `pool`.
    fn get_nullifier(&mut self, _nullifier: &Nullifier, _pool: ShieldedType) -> bool {
        false
    }

    /// Block whose state this view represents.
    fn get_best_block(&mut self) -> Option<BlockHash> {
        None
    }

    /// Current root of `pool`'s tree.
    fn get_best_anchor(&mut self, _pool: ShieldedType) -> Option<Anchor> {
        None
    }

    /// Applies `delta` atomically.
    ///
    /// On `Err` the view's visible state and `delta` must be left untouched.
    /// On `Ok` the view may drain the entry maps of `delta`.
    fn batch_write(&mut self, _delta: &mut CoinsDelta) -> Result<(), ViewError> {
        Err(ViewError::Unsupported)
    }
}

/// The view with nothing in it, which refuses every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCoinsView;

impl CoinsView for EmptyCoinsView {}

impl<T: CoinsView + ?Sized> CoinsView for &mut T {
    fn get_coins(&mut self, txid: &TxId) -> Option<CoinRecord> {
        (**self).get_coins(txid)
    }

    fn have_coins(&mut self, txid: &TxId) -> bool {
        (**self).have_coins(txid)
    }

    fn get_sprout_anchor_at(&mut self, root: &Anchor) -> Option<SproutTree> {
        (**self).get_sprout_anchor_at(root)
    }

    fn get_sapling_anchor_at(&mut self, root: &Anchor) -> Option<SaplingTree> {
        (**self).get_sapling_anchor_at(root)
    }

    fn get_nullifier(&mut self, nullifier: &Nullifier, pool: ShieldedType) -> bool {
        (**self).get_nullifier(nullifier, pool)
    }

    fn get_best_block(&mut self) -> Option<BlockHash> {
        (**self).get_best_block()
    }

    fn get_best_anchor(&mut self, pool: ShieldedType) -> Option<Anchor> {
        (**self).get_best_anchor(pool)
    }

    fn batch_write(&mut self, delta: &mut CoinsDelta) -> Result<(), ViewError> {
        (**self).batch_write(delta)
    }
}

impl<T: CoinsView + ?Sized> CoinsView for Box<T> {
    fn get_coins(&mut self, txid: &TxId) -> Option<CoinRecord> {
        (**self).get_coins(txid)
    }

    fn have_coins(&mut self, txid: &TxId) -> bool {
        (**self).have_coins(txid)
    }

    fn get_sprout_anchor_at(&mut self, root: &Anchor) -> Option<SproutTree> {
        (**self).get_sprout_anchor_at(root)
    }

    fn get_sapling_anchor_at(&mut self, root: &Anchor) -> Option<SaplingTree> {
        (**self).get_sapling_anchor_at(root)
    }

    fn get_nullifier(&mut self, nullifier: &Nullifier, pool: ShieldedType) -> bool {
        (**self).get_nullifier(nullifier, pool)
    }

    fn get_best_block(&mut self) -> Option<BlockHash> {
        (**self).get_best_block()
    }

    fn get_best_anchor(&mut self, pool: ShieldedType) -> Option<Anchor> {
        (**self).get_best_anchor(pool)
    }

    fn batch_write(&mut self, delta: &mut CoinsDelta) -> Result<(), ViewError> {
        (**self).batch_write(delta)
    }
}
