#![warn(missing_docs)]
//! Layered coins, anchors and nullifiers views.
//!
//! A chain store sits at the bottom of the stack. Above it any number of
//! [`cache::CoinsViewCache`] layers stage the effect of blocks and transactions,
//! pulling state through from their parent on a miss and merging their deltas
//! back down on [`cache::CoinsViewCache::flush`].

pub mod cache;
pub mod coins;
pub mod constants;
pub mod error;
pub mod memory;
pub mod primitives;
pub mod transaction;
pub mod tree;
pub mod undo;
pub mod view;

#[cfg(any(test, feature = "test-features"))]
pub mod mocks;

pub use cache::{CoinsModifier, CoinsViewCache};
pub use coins::CoinRecord;
pub use view::{backed::CoinsViewBacked, CoinsDelta, CoinsView, EmptyCoinsView};
