//! Applying a transaction to a cache, and undoing it on disconnect.

use zcash_primitives::consensus::BlockHeight;

use crate::{
    cache::CoinsViewCache,
    coins::CoinRecord,
    transaction::{OutPoint, Transaction, TxOut},
    view::CoinsView,
};

/// Record metadata saved when a spend prunes the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMeta {
    /// Whether the record came from a coinbase.
    pub is_coinbase: bool,
    /// Height the record was created at.
    pub height: BlockHeight,
    /// Version of the originating transaction.
    pub version: i32,
}

/// What one input spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInUndo {
    /// The spent output.
    pub txout: TxOut,
    /// Present only when this spend was the last one of its record.
    pub record: Option<RecordMeta>,
}

/// Undo data of one transaction, one entry per input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxUndo {
    /// Spent outputs in input order.
    pub prevouts: Vec<TxInUndo>,
}

/// Connects `tx` at `height`: spends its inputs, marks its nullifiers spent
/// and creates its own coins. What was spent is appended to `undo`.
///
/// # Panics
///
/// If an input does not spend an available output. Callers check
/// [`CoinsViewCache::have_inputs`] first.
pub fn update_coins<B: CoinsView>(
    tx: &Transaction,
    cache: &mut CoinsViewCache<B>,
    undo: &mut TxUndo,
    height: BlockHeight,
) {
    if !tx.is_coinbase() {
        for txin in tx.vin() {
            let prevout = txin.prevout;
            let mut coins = cache.modify_coins(&prevout.hash());
            let Some(txout) = coins.take(prevout.n()) else {
                panic!("{}:{} is not available", prevout.hash(), prevout.n());
            };
            let record = coins.is_pruned().then(|| RecordMeta {
                is_coinbase: coins.is_coinbase,
                height: coins.height,
                version: coins.version,
            });
            undo.prevouts.push(TxInUndo { txout, record });
        }
    }

    cache.set_nullifiers(tx, true);

    let mut coins = cache.modify_new_coins(&tx.txid());
    *coins = CoinRecord::from_tx(tx, height);
}

/// Puts back the output `out` recorded in `undo`.
///
/// Returns false when the cache was not in the state the undo data expects,
/// which the caller treats as an unclean disconnect.
pub fn apply_tx_in_undo<B: CoinsView>(
    undo: &TxInUndo,
    cache: &mut CoinsViewCache<B>,
    out: &OutPoint,
) -> bool {
    let mut clean = true;
    let mut coins = cache.modify_coins(&out.hash());
    match undo.record {
        Some(meta) => {
            if !coins.is_pruned() {
                clean = false;
            }
            coins.is_coinbase = meta.is_coinbase;
            coins.height = meta.height;
            coins.version = meta.version;
        }
        None => {
            if coins.is_pruned() {
                clean = false;
            }
        }
    }
    if coins.is_available(out.n()) {
        clean = false;
    }
    let pos = out.n() as usize;
    if coins.outputs.len() <= pos {
        coins.outputs.resize(pos + 1, None);
    }
    coins.outputs[pos] = Some(undo.txout.clone());
    clean
}

/// Reverses [`update_coins`]: removes the coins of `tx`, marks its nullifiers
/// unspent and restores what its inputs spent.
///
/// Returns false when anything did not match what connecting produced.
pub fn disconnect_tx<B: CoinsView>(
    tx: &Transaction,
    undo: &TxUndo,
    cache: &mut CoinsViewCache<B>,
    height: BlockHeight,
) -> bool {
    let mut clean = true;
    {
        let mut outs = cache.modify_coins(&tx.txid());
        let expected = CoinRecord::from_tx(tx, height);
        if *outs != expected {
            tracing::warn!(txid = %tx.txid(), "disconnected coins do not match");
            clean = false;
        }
        outs.clear();
    }

    cache.set_nullifiers(tx, false);

    if !tx.is_coinbase() {
        if undo.prevouts.len() != tx.vin().len() {
            tracing::error!(txid = %tx.txid(), "undo data does not match inputs");
            return false;
        }
        for (txin, spent) in tx.vin().iter().zip(&undo.prevouts).rev() {
            if !apply_tx_in_undo(spent, cache, &txin.prevout) {
                clean = false;
            }
        }
    }
    clean
}
