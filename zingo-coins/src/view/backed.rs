//! A view that forwards everything to a swappable backend.

use zcash_primitives::{block::BlockHash, transaction::TxId};

use super::{CoinsDelta, CoinsView};
use crate::{
    coins::CoinRecord,
    error::ViewError,
    primitives::{Anchor, Nullifier, ShieldedType},
    tree::{SaplingTree, SproutTree},
};

/// Forwards every call verbatim to the current backend.
///
/// Swapping the backend with [`CoinsViewBacked::set_backend`] does not touch
/// anything cached above this view; callers that swap must discard any stale
/// caches layered on top.
pub struct CoinsViewBacked<'a> {
    base: &'a mut dyn CoinsView,
}

impl<'a> CoinsViewBacked<'a> {
    /// Wrap `base`.
    pub fn new(base: &'a mut dyn CoinsView) -> Self {
        CoinsViewBacked { base }
    }

    /// Redirect every subsequent call to `base`, returning the previous backend.
    pub fn set_backend(&mut self, base: &'a mut dyn CoinsView) -> &'a mut dyn CoinsView {
        std::mem::replace(&mut self.base, base)
    }
}

impl CoinsView for CoinsViewBacked<'_> {
    fn get_coins(&mut self, txid: &TxId) -> Option<CoinRecord> {
        self.base.get_coins(txid)
    }

    fn have_coins(&mut self, txid: &TxId) -> bool {
        self.base.have_coins(txid)
    }

    fn get_sprout_anchor_at(&mut self, root: &Anchor) -> Option<SproutTree> {
        self.base.get_sprout_anchor_at(root)
    }

    fn get_sapling_anchor_at(&mut self, root: &Anchor) -> Option<SaplingTree> {
        self.base.get_sapling_anchor_at(root)
    }

    fn get_nullifier(&mut self, nullifier: &Nullifier, pool: ShieldedType) -> bool {
        self.base.get_nullifier(nullifier, pool)
    }

    fn get_best_block(&mut self) -> Option<BlockHash> {
        self.base.get_best_block()
    }

    fn get_best_anchor(&mut self, pool: ShieldedType) -> Option<Anchor> {
        self.base.get_best_anchor(pool)
    }

    fn batch_write(&mut self, delta: &mut CoinsDelta) -> Result<(), ViewError> {
        self.base.batch_write(delta)
    }
}
