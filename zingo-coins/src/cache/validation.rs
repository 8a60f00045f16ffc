//! Consensus checks answered from a cache.

use std::collections::HashMap;

use zcash_primitives::consensus::BlockHeight;

use super::CoinsViewCache;
use crate::{
    constants::{money_range, MAX_PRIORITY},
    error::{AmountError, UnsatisfiedShieldedReq},
    primitives::{Anchor, ShieldedType},
    transaction::{Transaction, TxIn, TxOut},
    tree::{NoteCommitmentTree, SaplingTree, SproutTree},
    view::CoinsView,
};

impl<B: CoinsView> CoinsViewCache<B> {
    /// The output spent by `input`.
    ///
    /// # Panics
    ///
    /// If the coin is unknown or the output is not available.
    pub fn get_output_for(&mut self, input: &TxIn) -> &TxOut {
        let prevout = input.prevout;
        let coins = self
            .access_coins(&prevout.hash())
            .unwrap_or_else(|| panic!("no coins for {}", prevout.hash()));
        coins.output(prevout.n()).unwrap_or_else(|| {
            panic!(
                "output {} of {} is not available",
                prevout.n(),
                prevout.hash()
            )
        })
    }

    /// Sum of the transparent inputs' values. Zero for a coinbase.
    ///
    /// # Panics
    ///
    /// If any input does not resolve to an available output.
    pub fn get_transparent_value_in(&mut self, tx: &Transaction) -> Result<i64, AmountError> {
        if tx.is_coinbase() {
            return Ok(0);
        }
        tx.vin().iter().try_fold(0i64, |acc, txin| {
            acc.checked_add(self.get_output_for(txin).value)
                .filter(|&value| money_range(value))
                .ok_or(AmountError::ValueInOutOfRange)
        })
    }

    /// Total value entering the transaction: transparent inputs plus the
    /// value the shielded components release.
    ///
    /// # Panics
    ///
    /// If any transparent input does not resolve to an available output.
    pub fn get_value_in(&mut self, tx: &Transaction) -> Result<i64, AmountError> {
        let transparent = self.get_transparent_value_in(tx)?;
        let shielded = tx.shielded_value_in()?;
        transparent
            .checked_add(shielded)
            .ok_or(AmountError::ValueInOutOfRange)
    }

    /// True when every transparent input spends an available output.
    pub fn have_inputs(&mut self, tx: &Transaction) -> bool {
        if tx.is_coinbase() {
            return true;
        }
        tx.vin().iter().all(|txin| {
            self.access_coins(&txin.prevout.hash())
                .is_some_and(|coins| coins.is_available(txin.prevout.n()))
        })
    }

    /// Checks every nullifier is unspent and every anchor is known.
    ///
    /// A joinsplit may use as its anchor the root of the tree produced by an
    /// earlier joinsplit of the same transaction.
    pub fn check_shielded_requirements(
        &mut self,
        tx: &Transaction,
    ) -> Result<(), UnsatisfiedShieldedReq> {
        let mut intermediates: HashMap<Anchor, SproutTree> = HashMap::new();

        for joinsplit in tx.joinsplits() {
            for nullifier in &joinsplit.nullifiers {
                if self.get_nullifier(nullifier, ShieldedType::Sprout) {
                    tracing::warn!(
                        target: "consensus",
                        txid = %tx.txid(),
                        nf = %nullifier,
                        "Sprout double-spend detected"
                    );
                    return Err(UnsatisfiedShieldedReq::SproutDuplicateNullifier);
                }
            }

            let tree = match intermediates.get(&joinsplit.anchor) {
                Some(tree) => Some(tree.clone()),
                None => self.get_anchor_at::<SproutTree>(&joinsplit.anchor),
            };
            let Some(mut tree) = tree else {
                tracing::warn!(
                    target: "consensus",
                    txid = %tx.txid(),
                    anchor = %joinsplit.anchor,
                    "Transaction uses unknown Sprout anchor"
                );
                return Err(UnsatisfiedShieldedReq::SproutUnknownAnchor);
            };

            for commitment in joinsplit.commitments {
                tree.append(commitment)
                    .map_err(|_| UnsatisfiedShieldedReq::SproutTreeFull)?;
            }
            intermediates.insert(tree.root(), tree);
        }

        for spend in tx.shielded_spends() {
            if self.get_nullifier(&spend.nullifier, ShieldedType::Sapling) {
                tracing::warn!(
                    target: "consensus",
                    txid = %tx.txid(),
                    nf = %spend.nullifier,
                    "Sapling double-spend detected"
                );
                return Err(UnsatisfiedShieldedReq::SaplingDuplicateNullifier);
            }

            if self.get_anchor_at::<SaplingTree>(&spend.anchor).is_none() {
                tracing::warn!(
                    target: "consensus",
                    txid = %tx.txid(),
                    anchor = %spend.anchor,
                    "Transaction uses unknown Sapling anchor"
                );
                return Err(UnsatisfiedShieldedReq::SaplingUnknownAnchor);
            }
        }

        Ok(())
    }

    /// Single verdict of [`Self::check_shielded_requirements`].
    pub fn have_shielded_requirements(&mut self, tx: &Transaction) -> bool {
        self.check_shielded_requirements(tx).is_ok()
    }

    /// Coin-age priority of `tx` if mined at `height`.
    ///
    /// Shielded components reveal nothing about the age of their notes, so
    /// any transaction carrying them gets [`MAX_PRIORITY`].
    ///
    /// # Panics
    ///
    /// If an input's coins are unknown.
    pub fn get_priority(&mut self, tx: &Transaction, height: BlockHeight) -> f64 {
        if tx.is_coinbase() {
            return 0.0;
        }
        if tx.has_shielded_components() {
            return MAX_PRIORITY;
        }

        let height = u32::from(height);
        let mut priority = 0.0;
        for txin in tx.vin() {
            let prevout = txin.prevout;
            let coins = self
                .access_coins(&prevout.hash())
                .unwrap_or_else(|| panic!("no coins for {}", prevout.hash()));
            let Some(output) = coins.output(prevout.n()) else {
                continue;
            };
            let coin_height = u32::from(coins.height);
            if coin_height < height {
                priority += output.value as f64 * f64::from(height - coin_height);
            }
        }
        tx.compute_priority(priority, 0)
    }
}
