//! The overlay cache.
//!
//! A [`CoinsViewCache`] answers reads from its own maps, pulling entries
//! through from its parent on a miss, and stages writes until they are merged
//! into the parent by [`CoinsViewCache::flush`]. Dropping a cache discards
//! everything staged in it.

use std::collections::{hash_map::Entry, HashMap};

use memuse::DynamicUsage;
use zcash_primitives::{block::BlockHash, transaction::TxId};

use crate::{
    coins::CoinRecord,
    error::ViewError,
    primitives::{Anchor, Nullifier, ShieldedType},
    transaction::Transaction,
    tree::{NoteCommitmentTree, SaplingTree, SproutTree},
    view::{
        AnchorPool, AnchorsCacheEntry, AnchorsMap, CoinsCacheEntry, CoinsDelta, CoinsView,
        NullifiersCacheEntry, NullifiersMap,
    },
};

pub mod modifier;
pub mod validation;

pub use modifier::CoinsModifier;

/// In-memory overlay over a parent view `B`.
///
/// `B` is usually `&mut` some other view, so caches can be stacked to any
/// depth over a chain store.
#[derive(Debug)]
pub struct CoinsViewCache<B> {
    base: B,
    delta: CoinsDelta,
    cached_coins_usage: usize,
}

/// Approximate heap footprint of a hash map's table.
fn map_usage<K, V>(map: &HashMap<K, V>) -> usize {
    // one control byte per bucket
    map.capacity() * (std::mem::size_of::<(K, V)>() + 1)
}

impl<B: CoinsView> CoinsViewCache<B> {
    /// An empty cache over `base`.
    pub fn new(base: B) -> Self {
        CoinsViewCache {
            base,
            delta: CoinsDelta::default(),
            cached_coins_usage: 0,
        }
    }

    /// The parent view.
    pub fn base_mut(&mut self) -> &mut B {
        &mut self.base
    }

    /// Discards everything staged and returns the parent view.
    pub fn into_base(self) -> B {
        self.base
    }

    /// Everything currently staged in this cache.
    pub fn delta(&self) -> &CoinsDelta {
        &self.delta
    }

    /// Memory held by cached coin records and anchor trees.
    pub fn cached_coins_usage(&self) -> usize {
        self.cached_coins_usage
    }

    /// Number of cached coin entries.
    pub fn get_cache_size(&self) -> usize {
        self.delta.coins.len()
    }

    /// Estimated memory held by this cache, for an external flush policy.
    pub fn dynamic_memory_usage(&self) -> usize {
        map_usage(&self.delta.coins)
            + map_usage(&self.delta.sprout_anchors)
            + map_usage(&self.delta.sapling_anchors)
            + map_usage(&self.delta.sprout_nullifiers)
            + map_usage(&self.delta.sapling_nullifiers)
            + self.cached_coins_usage
    }

    fn fetch_coins(&mut self, txid: &TxId) -> Option<&CoinsCacheEntry> {
        if !self.delta.coins.contains_key(txid) {
            let coins = self.base.get_coins(txid)?;
            // a pruned record in the parent needs no tombstone here
            let fresh = coins.is_pruned();
            self.cached_coins_usage += coins.dynamic_usage();
            self.delta.coins.insert(
                *txid,
                CoinsCacheEntry {
                    coins,
                    dirty: false,
                    fresh,
                },
            );
        }
        self.delta.coins.get(txid)
    }

    /// Borrow the record for `txid`, pulling it through if needed.
    ///
    /// The borrow ends at the next call taking the cache mutably.
    pub fn access_coins(&mut self, txid: &TxId) -> Option<&CoinRecord> {
        self.fetch_coins(txid).map(|entry| &entry.coins)
    }

    /// Set the block this cache's state represents.
    pub fn set_best_block(&mut self, hash: BlockHash) {
        self.delta.best_block = Some(hash);
    }

    /// Tree at `root` for pool `T`, pulled through and cached on a miss.
    ///
    /// An anchor cached as not entered reads as unknown.
    pub fn get_anchor_at<T: AnchorPool>(&mut self, root: &Anchor) -> Option<T> {
        if let Some(entry) = T::anchors(&self.delta).get(root) {
            return entry.entered.then(|| entry.tree.clone());
        }

        let tree = T::anchor_at(&mut self.base, root)?;
        self.cached_coins_usage += tree.dynamic_usage();
        T::anchors_mut(&mut self.delta).insert(
            *root,
            AnchorsCacheEntry {
                entered: true,
                tree: tree.clone(),
                dirty: false,
            },
        );
        Some(tree)
    }

    /// Mutable handle on the record for `txid`, creating it if needed.
    ///
    /// A missing entry is pulled through from the parent, or created empty.
    /// It is FRESH when the parent has no live record for it. The entry is
    /// always marked DIRTY. Releasing the handle finalizes the entry.
    pub fn modify_coins(&mut self, txid: &TxId) -> CoinsModifier<'_> {
        let usage_before = match self.delta.coins.get(txid) {
            Some(existing) => existing.coins.dynamic_usage(),
            None => {
                let entry = match self.base.get_coins(txid) {
                    Some(coins) => CoinsCacheEntry {
                        fresh: coins.is_pruned(),
                        coins,
                        dirty: false,
                    },
                    None => CoinsCacheEntry {
                        fresh: true,
                        ..Default::default()
                    },
                };
                self.delta.coins.insert(*txid, entry);
                0
            }
        };
        self.modifier_for(txid, usage_before, |entry| entry.dirty = true)
    }

    /// Mutable handle on a new, empty record for `txid`.
    ///
    /// Skips the parent entirely: the entry is reset to empty, FRESH and DIRTY.
    pub fn modify_new_coins(&mut self, txid: &TxId) -> CoinsModifier<'_> {
        let usage_before = self
            .delta
            .coins
            .get(txid)
            .map_or(0, |existing| existing.coins.dynamic_usage());
        self.delta.coins.entry(*txid).or_default();
        self.modifier_for(txid, usage_before, |entry| {
            entry.coins.clear();
            entry.fresh = true;
            entry.dirty = true;
        })
    }

    fn modifier_for(
        &mut self,
        txid: &TxId,
        usage_before: usize,
        prepare: impl FnOnce(&mut CoinsCacheEntry),
    ) -> CoinsModifier<'_> {
        let Entry::Occupied(mut entry) = self.delta.coins.entry(*txid) else {
            unreachable!("entry for {txid} was just ensured");
        };
        prepare(entry.get_mut());
        CoinsModifier::new(entry, &mut self.cached_coins_usage, usage_before)
    }

    /// Marks every nullifier revealed by `tx` as spent or unspent.
    pub fn set_nullifiers(&mut self, tx: &Transaction, spent: bool) {
        let sprout = tx.joinsplits().iter().flat_map(|js| js.nullifiers.iter());
        upsert_nullifiers(&mut self.delta.sprout_nullifiers, sprout, spent);

        let sapling = tx.shielded_spends().iter().map(|spend| &spend.nullifier);
        upsert_nullifiers(&mut self.delta.sapling_nullifiers, sapling, spent);
    }

    /// Installs `tree` as the current tree of its pool.
    ///
    /// A no-op when its root already is the pool's best anchor.
    pub fn push_anchor<T: AnchorPool>(&mut self, tree: &T) {
        let new_root = tree.root();
        if self.get_best_anchor(T::POOL) == Some(new_root) {
            return;
        }

        match T::anchors_mut(&mut self.delta).entry(new_root) {
            Entry::Vacant(vacant) => {
                self.cached_coins_usage += tree.dynamic_usage();
                vacant.insert(AnchorsCacheEntry {
                    entered: true,
                    tree: tree.clone(),
                    dirty: true,
                });
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.entered = true;
                entry.tree = tree.clone();
                entry.dirty = true;
            }
        }
        *self.delta.best_anchor_mut(T::POOL) = Some(new_root);
    }

    /// Reverts `pool`'s current anchor to `new_root`, when disconnecting a block.
    ///
    /// The current anchor is marked as no longer entered.
    ///
    /// # Panics
    ///
    /// If the current anchor cannot be resolved to a tree, which means the
    /// chain state is corrupted.
    pub fn pop_anchor(&mut self, new_root: &Anchor, pool: ShieldedType) {
        match pool {
            ShieldedType::Sprout => self.pop_anchor_in::<SproutTree>(new_root),
            ShieldedType::Sapling => self.pop_anchor_in::<SaplingTree>(new_root),
        }
    }

    fn pop_anchor_in<T: AnchorPool>(&mut self, new_root: &Anchor) {
        let current = self.get_best_anchor(T::POOL);
        if current == Some(*new_root) {
            return;
        }

        let Some(current) = current else {
            panic!("no best {:?} anchor to pop", T::POOL);
        };
        // bring the current tree into this cache
        if self.get_anchor_at::<T>(&current).is_none() {
            panic!("best {:?} anchor {current} is unreachable", T::POOL);
        }
        if let Some(entry) = T::anchors_mut(&mut self.delta).get_mut(&current) {
            entry.entered = false;
            entry.dirty = true;
        }
        *self.delta.best_anchor_mut(T::POOL) = Some(*new_root);
    }

    /// Writes everything staged into the parent.
    ///
    /// Staged entries are cleared only when the parent accepts the write; on
    /// failure they stay cached and the flush can be retried. The best block
    /// and best anchors stay memoized either way.
    pub fn flush(&mut self) -> Result<(), ViewError> {
        let coins = self.delta.coins.len();
        match self.base.batch_write(&mut self.delta) {
            Ok(()) => {
                self.delta.clear_entries();
                self.cached_coins_usage = 0;
                tracing::debug!(coins, "flushed coins cache");
                Ok(())
            }
            Err(e) => {
                tracing::error!(coins, "flush of coins cache failed: {e}");
                Err(e)
            }
        }
    }
}

fn upsert_nullifiers<'a>(
    map: &mut NullifiersMap,
    nullifiers: impl Iterator<Item = &'a Nullifier>,
    spent: bool,
) {
    for nullifier in nullifiers {
        let entry = map.entry(*nullifier).or_default();
        entry.entered = spent;
        entry.dirty = true;
    }
}

fn batch_write_anchors<T: NoteCommitmentTree>(
    child: &mut AnchorsMap<T>,
    ours: &mut AnchorsMap<T>,
    cached_coins_usage: &mut usize,
) {
    for (root, child_entry) in child.drain() {
        if !child_entry.dirty {
            continue;
        }
        match ours.entry(root) {
            Entry::Vacant(vacant) => {
                *cached_coins_usage += child_entry.tree.dynamic_usage();
                vacant.insert(AnchorsCacheEntry {
                    entered: child_entry.entered,
                    tree: child_entry.tree,
                    dirty: true,
                });
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.entered != child_entry.entered {
                    entry.entered = child_entry.entered;
                    entry.dirty = true;
                }
            }
        }
    }
}

fn batch_write_nullifiers(child: &mut NullifiersMap, ours: &mut NullifiersMap) {
    for (nullifier, child_entry) in child.drain() {
        if !child_entry.dirty {
            continue;
        }
        match ours.entry(nullifier) {
            Entry::Vacant(vacant) => {
                vacant.insert(NullifiersCacheEntry {
                    entered: child_entry.entered,
                    dirty: true,
                });
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.entered != child_entry.entered {
                    entry.entered = child_entry.entered;
                    entry.dirty = true;
                }
            }
        }
    }
}

impl<B: CoinsView> CoinsView for CoinsViewCache<B> {
    fn get_coins(&mut self, txid: &TxId) -> Option<CoinRecord> {
        self.fetch_coins(txid).map(|entry| entry.coins.clone())
    }

    fn have_coins(&mut self, txid: &TxId) -> bool {
        // an empty output list, not `is_pruned`: a record left holding only
        // spent outputs still counts as present
        self.fetch_coins(txid)
            .is_some_and(|entry| !entry.coins.outputs.is_empty())
    }

    fn get_sprout_anchor_at(&mut self, root: &Anchor) -> Option<SproutTree> {
        self.get_anchor_at(root)
    }

    fn get_sapling_anchor_at(&mut self, root: &Anchor) -> Option<SaplingTree> {
        self.get_anchor_at(root)
    }

    fn get_nullifier(&mut self, nullifier: &Nullifier, pool: ShieldedType) -> bool {
        if let Some(entry) = self.delta.nullifiers(pool).get(nullifier) {
            return entry.entered;
        }
        let entered = self.base.get_nullifier(nullifier, pool);
        self.delta.nullifiers_mut(pool).insert(
            *nullifier,
            NullifiersCacheEntry {
                entered,
                dirty: false,
            },
        );
        entered
    }

    fn get_best_block(&mut self) -> Option<BlockHash> {
        if self.delta.best_block.is_none() {
            self.delta.best_block = self.base.get_best_block();
        }
        self.delta.best_block
    }

    fn get_best_anchor(&mut self, pool: ShieldedType) -> Option<Anchor> {
        let best = self.delta.best_anchor_mut(pool);
        if best.is_none() {
            *best = self.base.get_best_anchor(pool);
        }
        *best
    }

    /// Merges a child's delta into this cache, draining it.
    ///
    /// Only DIRTY entries are merged. A coin the child created that this
    /// cache has never seen moves up as FRESH and DIRTY; a pruned coin that is
    /// FRESH here is erased outright; anything else overwrites and is marked
    /// DIRTY. Anchors and nullifiers are inserted when absent and otherwise
    /// only updated when `entered` changed. The child's known best block and
    /// best anchors then replace this cache's.
    fn batch_write(&mut self, delta: &mut CoinsDelta) -> Result<(), ViewError> {
        for (txid, child) in delta.coins.drain() {
            if !child.dirty {
                continue;
            }
            match self.delta.coins.entry(txid) {
                Entry::Vacant(vacant) => {
                    if !child.coins.is_pruned() {
                        debug_assert!(child.fresh, "unseen coins {txid} moved up without FRESH");
                        self.cached_coins_usage += child.coins.dynamic_usage();
                        vacant.insert(CoinsCacheEntry {
                            coins: child.coins,
                            dirty: true,
                            fresh: true,
                        });
                    }
                }
                Entry::Occupied(mut occupied) => {
                    if occupied.get().fresh && child.coins.is_pruned() {
                        self.cached_coins_usage -= occupied.get().coins.dynamic_usage();
                        occupied.remove();
                    } else {
                        let entry = occupied.get_mut();
                        self.cached_coins_usage -= entry.coins.dynamic_usage();
                        entry.coins = child.coins;
                        self.cached_coins_usage += entry.coins.dynamic_usage();
                        entry.dirty = true;
                    }
                }
            }
        }

        batch_write_anchors(
            &mut delta.sprout_anchors,
            &mut self.delta.sprout_anchors,
            &mut self.cached_coins_usage,
        );
        batch_write_anchors(
            &mut delta.sapling_anchors,
            &mut self.delta.sapling_anchors,
            &mut self.cached_coins_usage,
        );
        batch_write_nullifiers(
            &mut delta.sprout_nullifiers,
            &mut self.delta.sprout_nullifiers,
        );
        batch_write_nullifiers(
            &mut delta.sapling_nullifiers,
            &mut self.delta.sapling_nullifiers,
        );

        if delta.best_block.is_some() {
            self.delta.best_block = delta.best_block;
        }
        if delta.best_sprout_anchor.is_some() {
            self.delta.best_sprout_anchor = delta.best_sprout_anchor;
        }
        if delta.best_sapling_anchor.is_some() {
            self.delta.best_sapling_anchor = delta.best_sapling_anchor;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
