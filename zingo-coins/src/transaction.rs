//! The transaction data consumed by the coins views.
//!
//! Only the parts the views read are modelled: transparent inputs and outputs,
//! sprout joinsplits and sapling spends/outputs. Script and proof data beyond
//! what is needed for hashing and sizing is out of scope.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use getset::{CopyGetters, Getters};
use memuse::DynamicUsage;
use sha2::{Digest, Sha256};
use zcash_encoding::Vector;
use zcash_primitives::transaction::TxId;

use crate::{
    constants::{
        money_range, MAX_MONEY, MAX_SCRIPT_SIZE, MODIFIED_SIZE_INPUT_OFFSET,
        MODIFIED_SIZE_MAX_SCRIPT_SIG, OP_RETURN,
    },
    error::AmountError,
    primitives::{Anchor, Nullifier},
};

/// Reference to one transparent output of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct OutPoint {
    /// Transaction holding the output.
    hash: TxId,
    /// Index into that transaction's outputs.
    n: u32,
}

impl OutPoint {
    /// Creates a new outpoint.
    pub fn new(hash: TxId, n: u32) -> Self {
        OutPoint { hash, n }
    }

    /// The outpoint spent by a coinbase input.
    pub fn null() -> Self {
        OutPoint {
            hash: TxId::from_bytes([0u8; 32]),
            n: u32::MAX,
        }
    }

    /// True for the outpoint spent by a coinbase input.
    pub fn is_null(&self) -> bool {
        *self.hash.as_ref() == [0u8; 32] && self.n == u32::MAX
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(self.hash.as_ref())?;
        writer.write_u32::<LittleEndian>(self.n)
    }
}

/// A transparent output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOut {
    /// Value in zatoshis.
    pub value: i64,
    /// Spending condition.
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    /// Creates a new output.
    pub fn new(value: i64, script_pubkey: Vec<u8>) -> Self {
        TxOut {
            value,
            script_pubkey,
        }
    }

    /// Outputs that no input can ever spend.
    pub fn is_unspendable(&self) -> bool {
        self.script_pubkey.first() == Some(&OP_RETURN)
            || self.script_pubkey.len() > MAX_SCRIPT_SIZE
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_i64::<LittleEndian>(self.value)?;
        Vector::write(&mut writer, &self.script_pubkey, |w, b| w.write_u8(*b))
    }
}

impl DynamicUsage for TxOut {
    fn dynamic_usage(&self) -> usize {
        self.script_pubkey.dynamic_usage()
    }

    fn dynamic_usage_bounds(&self) -> (usize, Option<usize>) {
        self.script_pubkey.dynamic_usage_bounds()
    }
}

/// A transparent input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    /// The output being spent.
    pub prevout: OutPoint,
    /// Unlocking script.
    pub script_sig: Vec<u8>,
    /// Sequence number.
    pub sequence: u32,
}

impl TxIn {
    /// Creates an input spending `prevout` with an empty script.
    pub fn new(prevout: OutPoint) -> Self {
        TxIn {
            prevout,
            script_sig: Vec::new(),
            sequence: u32::MAX,
        }
    }

    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        self.prevout.write(&mut writer)?;
        Vector::write(&mut writer, &self.script_sig, |w, b| w.write_u8(*b))?;
        writer.write_u32::<LittleEndian>(self.sequence)
    }
}

/// A sprout joinsplit: two nullifiers in, two commitments out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsDescription {
    /// Value leaving the transparent pool.
    pub vpub_old: i64,
    /// Value entering the transparent pool.
    pub vpub_new: i64,
    /// Root of the sprout tree the inputs are proven against.
    pub anchor: Anchor,
    /// Nullifiers of the spent notes.
    pub nullifiers: [Nullifier; 2],
    /// Commitments of the new notes.
    pub commitments: [[u8; 32]; 2],
}

impl JsDescription {
    fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_i64::<LittleEndian>(self.vpub_old)?;
        writer.write_i64::<LittleEndian>(self.vpub_new)?;
        writer.write_all(self.anchor.as_ref())?;
        for nf in &self.nullifiers {
            writer.write_all(nf.as_ref())?;
        }
        for cm in &self.commitments {
            writer.write_all(cm)?;
        }
        Ok(())
    }
}

/// A sapling spend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendDescription {
    /// Root of the sapling tree the spent note is proven against.
    pub anchor: Anchor,
    /// Nullifier of the spent note.
    pub nullifier: Nullifier,
}

/// A sapling output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDescription {
    /// Note commitment, u-coordinate.
    pub cmu: [u8; 32],
}

/// A transaction as seen by the coins views.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Transaction {
    #[getset(get_copy = "pub")]
    /// Transaction version.
    version: i32,
    #[getset(get = "pub")]
    /// Transparent inputs.
    vin: Vec<TxIn>,
    #[getset(get = "pub")]
    /// Transparent outputs.
    vout: Vec<TxOut>,
    #[getset(get_copy = "pub")]
    /// Lock time.
    lock_time: u32,
    #[getset(get = "pub")]
    /// Sprout joinsplits.
    joinsplits: Vec<JsDescription>,
    #[getset(get_copy = "pub")]
    /// Net sapling value entering the transparent pool.
    value_balance: i64,
    #[getset(get = "pub")]
    /// Sapling spends.
    shielded_spends: Vec<SpendDescription>,
    #[getset(get = "pub")]
    /// Sapling outputs.
    shielded_outputs: Vec<OutputDescription>,
    #[getset(get_copy = "pub")]
    /// Double SHA-256 of the serialized transaction.
    txid: TxId,
    #[getset(get_copy = "pub")]
    /// Length of the serialized transaction.
    serialized_size: usize,
}

impl Transaction {
    /// Writes the transaction in its hashing encoding.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(self.version)?;
        Vector::write(&mut writer, &self.vin, |w, txin| txin.write(w))?;
        Vector::write(&mut writer, &self.vout, |w, txout| txout.write(w))?;
        writer.write_u32::<LittleEndian>(self.lock_time)?;
        Vector::write(&mut writer, &self.joinsplits, |w, js| js.write(w))?;
        writer.write_i64::<LittleEndian>(self.value_balance)?;
        Vector::write(&mut writer, &self.shielded_spends, |w, spend| {
            w.write_all(spend.anchor.as_ref())?;
            w.write_all(spend.nullifier.as_ref())
        })?;
        Vector::write(&mut writer, &self.shielded_outputs, |w, output| {
            w.write_all(&output.cmu)
        })
    }

    /// A coinbase has exactly one input, spending the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    /// True when any sprout or sapling component is present.
    pub fn has_shielded_components(&self) -> bool {
        !self.joinsplits.is_empty()
            || !self.shielded_spends.is_empty()
            || !self.shielded_outputs.is_empty()
    }

    /// Value the shielded components contribute to the transparent pool.
    pub fn shielded_value_in(&self) -> Result<i64, AmountError> {
        let mut value = 0i64;

        if self.value_balance >= 0 {
            if self.value_balance > MAX_MONEY {
                return Err(AmountError::ValueBalanceOutOfRange);
            }
            value += self.value_balance;
        }

        for js in &self.joinsplits {
            if !money_range(js.vpub_new) {
                return Err(AmountError::VpubNewOutOfRange);
            }
            value += js.vpub_new;
            if !money_range(value) {
                return Err(AmountError::ValueInOutOfRange);
            }
        }

        Ok(value)
    }

    /// Size used for priority, discounting each input's fixed and scriptSig bytes.
    pub fn calculate_modified_size(&self, tx_size: usize) -> usize {
        let mut size = if tx_size == 0 {
            self.serialized_size
        } else {
            tx_size
        };
        for txin in &self.vin {
            let offset = MODIFIED_SIZE_INPUT_OFFSET
                + txin.script_sig.len().min(MODIFIED_SIZE_MAX_SCRIPT_SIG);
            if size > offset {
                size -= offset;
            }
        }
        size
    }

    /// Priority of the transaction given the summed coin age of its inputs.
    pub fn compute_priority(&self, priority_inputs: f64, tx_size: usize) -> f64 {
        let size = self.calculate_modified_size(tx_size);
        if size == 0 {
            return 0.0;
        }
        priority_inputs / size as f64
    }
}

/// Double SHA-256, as used for transaction ids.
pub(crate) fn sha256d(bytes: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(bytes);
    let second = Sha256::digest(first.as_slice());
    let mut out = [0u8; 32];
    out.copy_from_slice(second.as_slice());
    out
}

macro_rules! build_method_push {
    ($name:ident, $field:ident, $localtype:ty) => {
        #[doc = "Push an item to the builder."]
        pub fn $name(mut self, item: $localtype) -> Self {
            self.$field.push(item);
            self
        }
    };
}

/// Assembles a [`Transaction`] and derives its id.
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    version: Option<i32>,
    vin: Vec<TxIn>,
    vout: Vec<TxOut>,
    lock_time: Option<u32>,
    joinsplits: Vec<JsDescription>,
    value_balance: Option<i64>,
    shielded_spends: Vec<SpendDescription>,
    shielded_outputs: Vec<OutputDescription>,
}

impl TransactionBuilder {
    /// Instantiate an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transaction version.
    pub fn version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the lock time.
    pub fn lock_time(mut self, lock_time: u32) -> Self {
        self.lock_time = Some(lock_time);
        self
    }

    /// Set the sapling value balance.
    pub fn value_balance(mut self, value_balance: i64) -> Self {
        self.value_balance = Some(value_balance);
        self
    }

    build_method_push!(input, vin, TxIn);
    build_method_push!(output, vout, TxOut);
    build_method_push!(joinsplit, joinsplits, JsDescription);
    build_method_push!(shielded_spend, shielded_spends, SpendDescription);
    build_method_push!(shielded_output, shielded_outputs, OutputDescription);

    /// Makes the transaction a coinbase by giving it the single null input.
    pub fn coinbase(mut self) -> Self {
        self.vin = vec![TxIn::new(OutPoint::null())];
        self
    }

    /// Build the transaction, hashing its encoding for the id.
    pub fn build(self) -> io::Result<Transaction> {
        let mut tx = Transaction {
            version: self.version.unwrap_or(4),
            vin: self.vin,
            vout: self.vout,
            lock_time: self.lock_time.unwrap_or(0),
            joinsplits: self.joinsplits,
            value_balance: self.value_balance.unwrap_or(0),
            shielded_spends: self.shielded_spends,
            shielded_outputs: self.shielded_outputs,
            txid: TxId::from_bytes([0u8; 32]),
            serialized_size: 0,
        };
        let mut bytes = Vec::new();
        tx.write(&mut bytes)?;
        tx.txid = TxId::from_bytes(sha256d(&bytes));
        tx.serialized_size = bytes.len();
        Ok(tx)
    }
}
