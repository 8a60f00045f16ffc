//! Scoped mutable access to one cached coin record.

use std::{
    collections::hash_map::OccupiedEntry,
    ops::{Deref, DerefMut},
};

use memuse::DynamicUsage;
use zcash_primitives::transaction::TxId;

use crate::{coins::CoinRecord, view::CoinsCacheEntry};

/// Exclusive write access to one coin record of a
/// [`CoinsViewCache`](super::CoinsViewCache).
///
/// The handle borrows the cache mutably, so only one can be alive at a time:
///
/// ```compile_fail
/// use zcash_primitives::transaction::TxId;
/// use zingo_coins::{CoinsViewCache, EmptyCoinsView};
///
/// let mut cache = CoinsViewCache::new(EmptyCoinsView);
/// let first = cache.modify_coins(&TxId::from_bytes([1; 32]));
/// let second = cache.modify_coins(&TxId::from_bytes([2; 32]));
/// drop(first);
/// drop(second);
/// ```
///
/// Releasing one before acquiring the next is fine:
///
/// ```
/// use zcash_primitives::transaction::TxId;
/// use zingo_coins::{CoinsViewCache, EmptyCoinsView};
///
/// let mut cache = CoinsViewCache::new(EmptyCoinsView);
/// let first = cache.modify_coins(&TxId::from_bytes([1; 32]));
/// drop(first);
/// let second = cache.modify_coins(&TxId::from_bytes([2; 32]));
/// drop(second);
/// ```
///
/// On release the record's trailing spent outputs are trimmed. A record that is
/// then pruned and FRESH is erased from the cache; otherwise the cache's memory
/// accounting is updated with the record's new size.
pub struct CoinsModifier<'a> {
    entry: Option<OccupiedEntry<'a, TxId, CoinsCacheEntry>>,
    cached_coins_usage: &'a mut usize,
    usage_before: usize,
}

impl<'a> CoinsModifier<'a> {
    pub(super) fn new(
        entry: OccupiedEntry<'a, TxId, CoinsCacheEntry>,
        cached_coins_usage: &'a mut usize,
        usage_before: usize,
    ) -> Self {
        CoinsModifier {
            entry: Some(entry),
            cached_coins_usage,
            usage_before,
        }
    }

    fn cache_entry(&self) -> &CoinsCacheEntry {
        self.entry
            .as_ref()
            .expect("entry is held until the modifier drops")
            .get()
    }

    /// The txid of the record being modified.
    pub fn txid(&self) -> &TxId {
        self.entry
            .as_ref()
            .expect("entry is held until the modifier drops")
            .key()
    }

    /// Whether the parent holds no live copy of this record.
    pub fn is_fresh(&self) -> bool {
        self.cache_entry().fresh
    }
}

impl Deref for CoinsModifier<'_> {
    type Target = CoinRecord;

    fn deref(&self) -> &CoinRecord {
        &self.cache_entry().coins
    }
}

impl DerefMut for CoinsModifier<'_> {
    fn deref_mut(&mut self) -> &mut CoinRecord {
        &mut self
            .entry
            .as_mut()
            .expect("entry is held until the modifier drops")
            .get_mut()
            .coins
    }
}

impl Drop for CoinsModifier<'_> {
    fn drop(&mut self) {
        let Some(mut entry) = self.entry.take() else {
            return;
        };
        entry.get_mut().coins.cleanup();
        *self.cached_coins_usage -= self.usage_before;
        if entry.get().fresh && entry.get().coins.is_pruned() {
            entry.remove();
        } else {
            *self.cached_coins_usage += entry.get().coins.dynamic_usage();
        }
    }
}
