//! Note commitment trees as consumed by the views.
//!
//! The views only ever need a tree's root, to append commitments to it, and
//! its memory footprint. Each pool has its own tree shape.

use std::fmt;

use incrementalmerkletree::{frontier::CommitmentTree, Hashable, Level};
use memuse::DynamicUsage;
use sha2::digest::{consts::U64, generic_array::GenericArray};

use crate::{
    constants::{SAPLING_TREE_DEPTH, SPROUT_TREE_DEPTH},
    error::TreeError,
    primitives::{Anchor, ShieldedType},
};

/// What the views need from a note commitment tree snapshot.
pub trait NoteCommitmentTree: Clone + fmt::Debug + PartialEq + DynamicUsage {
    /// The pool this tree belongs to.
    const POOL: ShieldedType;

    /// A tree with no commitments.
    fn empty() -> Self;

    /// Current root.
    fn root(&self) -> Anchor;

    /// Root of the empty tree.
    fn empty_root() -> Anchor {
        Self::empty().root()
    }

    /// Append one note commitment.
    fn append(&mut self, commitment: [u8; 32]) -> Result<(), TreeError>;

    /// Number of commitments in the tree.
    fn size(&self) -> usize;
}

/// Node of the sprout tree, combined with the SHA-256 compression function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SproutNode([u8; 32]);

const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

impl SproutNode {
    /// Wrap a commitment.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SproutNode(bytes)
    }

    fn compress(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut block = GenericArray::<u8, U64>::default();
        block[..32].copy_from_slice(left);
        block[32..].copy_from_slice(right);

        let mut state = SHA256_IV;
        sha2::compress256(&mut state, &[block]);

        let mut out = [0u8; 32];
        for (chunk, word) in out.chunks_exact_mut(4).zip(state.iter()) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        out
    }
}

impl Hashable for SproutNode {
    fn empty_leaf() -> Self {
        SproutNode([0u8; 32])
    }

    fn combine(_level: Level, a: &Self, b: &Self) -> Self {
        SproutNode(Self::compress(&a.0, &b.0))
    }
}

fn frontier_usage<H, const DEPTH: u8>(tree: &CommitmentTree<H, DEPTH>) -> usize {
    tree.parents().len() * std::mem::size_of::<Option<H>>()
}

fn frontier_size<H, const DEPTH: u8>(tree: &CommitmentTree<H, DEPTH>) -> usize {
    let leaves = usize::from(tree.left().is_some()) + usize::from(tree.right().is_some());
    tree.parents()
        .iter()
        .enumerate()
        .filter(|(_, parent)| parent.is_some())
        .fold(leaves, |acc, (i, _)| acc + (1usize << (i + 1)))
}

/// Snapshot of the sprout note commitment tree.
#[derive(Clone, Debug, PartialEq)]
pub struct SproutTree(CommitmentTree<SproutNode, SPROUT_TREE_DEPTH>);

impl NoteCommitmentTree for SproutTree {
    const POOL: ShieldedType = ShieldedType::Sprout;

    fn empty() -> Self {
        SproutTree(CommitmentTree::empty())
    }

    fn root(&self) -> Anchor {
        Anchor::from_bytes(self.0.root().0)
    }

    fn append(&mut self, commitment: [u8; 32]) -> Result<(), TreeError> {
        self.0
            .append(SproutNode::from_bytes(commitment))
            .map_err(|_| TreeError::TreeFull)
    }

    fn size(&self) -> usize {
        frontier_size(&self.0)
    }
}

impl DynamicUsage for SproutTree {
    fn dynamic_usage(&self) -> usize {
        frontier_usage(&self.0)
    }

    fn dynamic_usage_bounds(&self) -> (usize, Option<usize>) {
        let usage = self.dynamic_usage();
        (usage, Some(usage))
    }
}

/// Snapshot of the sapling note commitment tree.
#[derive(Clone, Debug, PartialEq)]
pub struct SaplingTree(CommitmentTree<sapling_crypto::Node, SAPLING_TREE_DEPTH>);

impl NoteCommitmentTree for SaplingTree {
    const POOL: ShieldedType = ShieldedType::Sapling;

    fn empty() -> Self {
        SaplingTree(CommitmentTree::empty())
    }

    fn root(&self) -> Anchor {
        Anchor::from_bytes(self.0.root().to_bytes())
    }

    fn append(&mut self, commitment: [u8; 32]) -> Result<(), TreeError> {
        let node: Option<sapling_crypto::Node> =
            sapling_crypto::Node::from_bytes(commitment).into();
        let node = node.ok_or(TreeError::InvalidCommitment)?;
        self.0.append(node).map_err(|_| TreeError::TreeFull)
    }

    fn size(&self) -> usize {
        frontier_size(&self.0)
    }
}

impl DynamicUsage for SaplingTree {
    fn dynamic_usage(&self) -> usize {
        frontier_usage(&self.0)
    }

    fn dynamic_usage_bounds(&self) -> (usize, Option<usize>) {
        let usage = self.dynamic_usage();
        (usage, Some(usage))
    }
}
