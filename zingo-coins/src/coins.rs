//! The coin record: the unspent transparent outputs of one transaction.

use memuse::DynamicUsage;
use zcash_primitives::consensus::BlockHeight;

use crate::transaction::{Transaction, TxOut};

pub mod compressor;

/// The outputs of one transaction that are still spendable.
///
/// Spent outputs are kept as `None` tombstones so output indices stay stable;
/// trailing tombstones are always trimmed. A record without any available
/// output is pruned and logically absent.
#[derive(Debug, Clone, Eq)]
pub struct CoinRecord {
    /// Whether the originating transaction is a coinbase.
    pub is_coinbase: bool,
    /// Outputs, `None` once spent.
    pub outputs: Vec<Option<TxOut>>,
    /// Height of the block that created the record.
    pub height: BlockHeight,
    /// Version of the originating transaction.
    pub version: i32,
}

impl Default for CoinRecord {
    fn default() -> Self {
        CoinRecord {
            is_coinbase: false,
            outputs: Vec::new(),
            height: BlockHeight::from_u32(0),
            version: 0,
        }
    }
}

impl CoinRecord {
    /// Record for the outputs of `tx` confirmed at `height`.
    pub fn from_tx(tx: &Transaction, height: BlockHeight) -> Self {
        let mut coins = CoinRecord {
            is_coinbase: tx.is_coinbase(),
            outputs: tx.vout().iter().cloned().map(Some).collect(),
            height,
            version: tx.version(),
        };
        coins.clear_unspendable();
        coins
    }

    /// Empties the record.
    pub fn clear(&mut self) {
        self.is_coinbase = false;
        self.outputs = Vec::new();
        self.height = BlockHeight::from_u32(0);
        self.version = 0;
    }

    /// Drops trailing spent outputs, releasing the list once nothing remains.
    pub fn cleanup(&mut self) {
        while matches!(self.outputs.last(), Some(None)) {
            self.outputs.pop();
        }
        if self.outputs.is_empty() {
            self.outputs = Vec::new();
        }
    }

    /// Spends every output that can never be spent by an input.
    pub fn clear_unspendable(&mut self) {
        for output in self.outputs.iter_mut() {
            if output.as_ref().is_some_and(TxOut::is_unspendable) {
                *output = None;
            }
        }
        self.cleanup();
    }

    /// Marks output `pos` as spent. False when it is out of range or already spent.
    pub fn spend(&mut self, pos: u32) -> bool {
        match self.outputs.get_mut(pos as usize) {
            Some(output @ Some(_)) => {
                *output = None;
                self.cleanup();
                true
            }
            _ => false,
        }
    }

    /// Take output `pos`, marking it spent.
    pub fn take(&mut self, pos: u32) -> Option<TxOut> {
        let taken = self.outputs.get_mut(pos as usize)?.take()?;
        self.cleanup();
        Some(taken)
    }

    /// True when output `pos` exists and is unspent.
    pub fn is_available(&self, pos: u32) -> bool {
        matches!(self.outputs.get(pos as usize), Some(Some(_)))
    }

    /// True when no output is available.
    pub fn is_pruned(&self) -> bool {
        self.outputs.iter().all(Option::is_none)
    }

    /// The available output at `pos`.
    pub fn output(&self, pos: u32) -> Option<&TxOut> {
        self.outputs.get(pos as usize)?.as_ref()
    }

    /// Size of the availability bitmask used by the disk encoding.
    ///
    /// Outputs 0 and 1 are encoded in the header; from index 2 on every 8
    /// outputs share one mask byte. Returns the number of mask bytes up to the
    /// last one with any available output, and how many of them are non-zero.
    pub fn calc_mask_size(&self) -> (usize, usize) {
        let mut last_used_byte = 0;
        let mut nonzero_bytes = 0;
        let mut b = 0;
        while 2 + b * 8 < self.outputs.len() {
            let group = self.outputs.iter().skip(2 + b * 8).take(8);
            if group.into_iter().any(Option::is_some) {
                last_used_byte = b + 1;
                nonzero_bytes += 1;
            }
            b += 1;
        }
        (last_used_byte, nonzero_bytes)
    }
}

impl PartialEq for CoinRecord {
    fn eq(&self, other: &Self) -> bool {
        // pruned records are all equal
        if self.is_pruned() && other.is_pruned() {
            return true;
        }
        self.is_coinbase == other.is_coinbase
            && self.height == other.height
            && self.version == other.version
            && self.outputs == other.outputs
    }
}

impl DynamicUsage for CoinRecord {
    fn dynamic_usage(&self) -> usize {
        self.outputs.dynamic_usage()
    }

    fn dynamic_usage_bounds(&self) -> (usize, Option<usize>) {
        self.outputs.dynamic_usage_bounds()
    }
}
