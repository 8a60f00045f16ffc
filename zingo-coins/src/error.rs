//! Top level error module for the crate

/// Errors reported by a backing store.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// The view cannot accept writes.
    #[error("View does not support batch writes.")]
    Unsupported,
    /// The store refused the delta and left its state untouched.
    #[error("Batch write rejected. {0}")]
    WriteRejected(String),
}

/// Errors from note commitment tree operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The tree has no room left for another commitment.
    #[error("Note commitment tree is full")]
    TreeFull,
    /// The bytes do not encode a valid commitment for this pool.
    #[error("Invalid note commitment")]
    InvalidCommitment,
}

/// Errors decoding the compressed disk encoding of a coin record.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// Underlying read failed, usually a truncated stream.
    #[error("Read error. {0}")]
    Io(#[from] std::io::Error),
    /// A VARINT was not minimally encoded or overflowed.
    #[error("Non-canonical VARINT")]
    NonCanonical,
    /// The script length exceeds what any spendable script may hold.
    #[error("Script of {0} bytes is too large")]
    OversizedScript(u64),
    /// A compressed public key did not decompress to a valid point.
    #[error("Invalid compressed script")]
    InvalidScript,
    /// A height did not fit in a block height.
    #[error("Height out of range")]
    HeightOutOfRange,
}

/// The first shielded requirement a transaction fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UnsatisfiedShieldedReq {
    /// A joinsplit reveals a sprout nullifier that is already spent.
    #[error("Sprout nullifier already spent")]
    SproutDuplicateNullifier,
    /// A joinsplit references an anchor that is neither known nor built earlier in the transaction.
    #[error("Unknown sprout anchor")]
    SproutUnknownAnchor,
    /// Appending a joinsplit's commitments overflowed the sprout tree.
    #[error("Sprout note commitment tree is full")]
    SproutTreeFull,
    /// A spend reveals a sapling nullifier that is already spent.
    #[error("Sapling nullifier already spent")]
    SaplingDuplicateNullifier,
    /// A spend references an unknown sapling anchor.
    #[error("Unknown sapling anchor")]
    SaplingUnknownAnchor,
}

/// A transaction moves a value outside the valid monetary range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The sapling value balance exceeds the money supply.
    #[error("Sapling value balance out of range")]
    ValueBalanceOutOfRange,
    /// A joinsplit's public output value is out of range.
    #[error("Joinsplit vpub_new out of range")]
    VpubNewOutOfRange,
    /// A running sum of input values left the valid range.
    #[error("Value in out of range")]
    ValueInOutOfRange,
}
