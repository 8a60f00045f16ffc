//! Consensus constants and tunables used by the coins views.

/// Number of zatoshis in one coin.
pub const COIN: i64 = 100_000_000;

/// No amount larger than this (in zatoshis) is valid.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// Priority assigned to any transaction carrying shielded components.
pub const MAX_PRIORITY: f64 = 1e16;

/// Depth of the sprout note commitment tree.
pub const SPROUT_TREE_DEPTH: u8 = 29;

/// Depth of the sapling note commitment tree.
pub const SAPLING_TREE_DEPTH: u8 = 32;

/// Scripts longer than this are provably unspendable.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Opcode marking an output as provably unspendable.
pub const OP_RETURN: u8 = 0x6a;

/// Per-input bytes discounted when computing the priority size of a transaction.
pub const MODIFIED_SIZE_INPUT_OFFSET: usize = 41;

/// Largest scriptSig length counted towards the discount.
pub const MODIFIED_SIZE_MAX_SCRIPT_SIG: usize = 110;

/// Check that an amount is within the valid monetary range.
pub fn money_range(value: i64) -> bool {
    (0..=MAX_MONEY).contains(&value)
}
