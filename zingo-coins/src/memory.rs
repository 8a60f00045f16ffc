//! An in-memory chain store at the bottom of a view stack.

use std::collections::{HashMap, HashSet};

use zcash_primitives::{block::BlockHash, transaction::TxId};

use crate::{
    coins::CoinRecord,
    error::ViewError,
    primitives::{Anchor, Nullifier, ShieldedType},
    tree::{NoteCommitmentTree, SaplingTree, SproutTree},
    view::{AnchorsMap, CoinsDelta, CoinsView, NullifiersMap},
};

/// Durable-store stand-in holding only live state.
///
/// Pruned coins and anchors or nullifiers that are no longer entered are
/// removed rather than stored. The empty tree of each pool is always known.
#[derive(Debug, Clone, Default)]
pub struct MemoryCoinsView {
    coins: HashMap<TxId, CoinRecord>,
    best_block: Option<BlockHash>,
    best_sprout_anchor: Option<Anchor>,
    best_sapling_anchor: Option<Anchor>,
    sprout_anchors: HashMap<Anchor, SproutTree>,
    sapling_anchors: HashMap<Anchor, SaplingTree>,
    sprout_nullifiers: HashSet<Nullifier>,
    sapling_nullifiers: HashSet<Nullifier>,
}

impl MemoryCoinsView {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a coin record directly.
    pub fn insert_coins(&mut self, txid: TxId, coins: CoinRecord) {
        self.coins.insert(txid, coins);
    }

    /// Seeds a spent nullifier directly.
    pub fn insert_nullifier(&mut self, nullifier: Nullifier, pool: ShieldedType) {
        self.nullifiers_mut(pool).insert(nullifier);
    }

    /// Number of stored coin records.
    pub fn coins_count(&self) -> usize {
        self.coins.len()
    }

    fn nullifiers(&self, pool: ShieldedType) -> &HashSet<Nullifier> {
        match pool {
            ShieldedType::Sprout => &self.sprout_nullifiers,
            ShieldedType::Sapling => &self.sapling_nullifiers,
        }
    }

    fn nullifiers_mut(&mut self, pool: ShieldedType) -> &mut HashSet<Nullifier> {
        match pool {
            ShieldedType::Sprout => &mut self.sprout_nullifiers,
            ShieldedType::Sapling => &mut self.sapling_nullifiers,
        }
    }

    /// Rejects a delta whose anchor entries do not match their trees.
    fn validate(delta: &CoinsDelta) -> Result<(), ViewError> {
        fn check<T: NoteCommitmentTree>(anchors: &AnchorsMap<T>) -> Result<(), ViewError> {
            match anchors
                .iter()
                .find(|(root, entry)| entry.dirty && entry.entered && entry.tree.root() != **root)
            {
                Some((root, _)) => Err(ViewError::WriteRejected(format!(
                    "{:?} anchor {root} does not match its tree",
                    T::POOL
                ))),
                None => Ok(()),
            }
        }
        check(&delta.sprout_anchors)?;
        check(&delta.sapling_anchors)
    }
}

fn apply_anchors<T: NoteCommitmentTree>(delta: &mut AnchorsMap<T>, stored: &mut HashMap<Anchor, T>) {
    for (root, entry) in delta.drain() {
        if !entry.dirty {
            continue;
        }
        if entry.entered {
            stored.insert(root, entry.tree);
        } else {
            stored.remove(&root);
        }
    }
}

fn apply_nullifiers(delta: &mut NullifiersMap, stored: &mut HashSet<Nullifier>) {
    for (nullifier, entry) in delta.drain() {
        if !entry.dirty {
            continue;
        }
        if entry.entered {
            stored.insert(nullifier);
        } else {
            stored.remove(&nullifier);
        }
    }
}

impl CoinsView for MemoryCoinsView {
    fn get_coins(&mut self, txid: &TxId) -> Option<CoinRecord> {
        self.coins.get(txid).cloned()
    }

    fn have_coins(&mut self, txid: &TxId) -> bool {
        self.coins.contains_key(txid)
    }

    fn get_sprout_anchor_at(&mut self, root: &Anchor) -> Option<SproutTree> {
        if *root == SproutTree::empty_root() {
            return Some(SproutTree::empty());
        }
        self.sprout_anchors.get(root).cloned()
    }

    fn get_sapling_anchor_at(&mut self, root: &Anchor) -> Option<SaplingTree> {
        if *root == SaplingTree::empty_root() {
            return Some(SaplingTree::empty());
        }
        self.sapling_anchors.get(root).cloned()
    }

    fn get_nullifier(&mut self, nullifier: &Nullifier, pool: ShieldedType) -> bool {
        self.nullifiers(pool).contains(nullifier)
    }

    fn get_best_block(&mut self) -> Option<BlockHash> {
        self.best_block
    }

    fn get_best_anchor(&mut self, pool: ShieldedType) -> Option<Anchor> {
        Some(match pool {
            ShieldedType::Sprout => self
                .best_sprout_anchor
                .unwrap_or_else(SproutTree::empty_root),
            ShieldedType::Sapling => self
                .best_sapling_anchor
                .unwrap_or_else(SaplingTree::empty_root),
        })
    }

    fn batch_write(&mut self, delta: &mut CoinsDelta) -> Result<(), ViewError> {
        Self::validate(delta)?;

        let mut written = 0;
        for (txid, entry) in delta.coins.drain() {
            if !entry.dirty {
                continue;
            }
            written += 1;
            if entry.coins.is_pruned() {
                self.coins.remove(&txid);
            } else {
                self.coins.insert(txid, entry.coins);
            }
        }
        apply_anchors(&mut delta.sprout_anchors, &mut self.sprout_anchors);
        apply_anchors(&mut delta.sapling_anchors, &mut self.sapling_anchors);
        apply_nullifiers(&mut delta.sprout_nullifiers, &mut self.sprout_nullifiers);
        apply_nullifiers(&mut delta.sapling_nullifiers, &mut self.sapling_nullifiers);

        if delta.best_block.is_some() {
            self.best_block = delta.best_block;
        }
        if delta.best_sprout_anchor.is_some() {
            self.best_sprout_anchor = delta.best_sprout_anchor;
        }
        if delta.best_sapling_anchor.is_some() {
            self.best_sapling_anchor = delta.best_sapling_anchor;
        }
        tracing::debug!(written, "committed coins batch");
        Ok(())
    }
}
