//! # Buffer Merkle Tree
//!
//! Commitment over a buffer's leaf hashes.
//!
//! # Construction
//!
//! - Leaves are taken in observation order.
//! - Internal node = `keccak256(left || right)`.
//! - A level with an odd number of nodes duplicates its last node.
//! - One leaf: the root is the leaf hash. No leaves: the root is all zeroes.

use crate::domain::{Hash, Position, ProofNode, RelayError};
use sha3::{Digest, Keccak256};

/// Root of an empty tree.
pub const EMPTY_ROOT: Hash = [0u8; 32];

/// Hash two nodes together.
fn hash_concat(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left); // Duplicate last if odd
            hash_concat(left, right)
        })
        .collect()
}

/// A fully materialized Merkle tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves, the last level holds the root.
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build a tree over `leaves`.
    pub fn build(leaves: &[Hash]) -> Self {
        let mut levels = vec![leaves.to_vec()];
        while let Some(level) = levels.last().filter(|level| level.len() > 1) {
            let next = next_level(level);
            levels.push(next);
        }
        Self { levels }
    }

    /// The commitment.
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(EMPTY_ROOT)
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// Tree depth (number of hashing rounds).
    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Result<Vec<ProofNode>, RelayError> {
        if index >= self.leaf_count() {
            return Err(RelayError::InvalidRequest(format!(
                "leaf {} out of range for tree with {} leaves",
                index,
                self.leaf_count()
            )));
        }

        let mut proof = Vec::with_capacity(self.depth());
        let mut position = index;
        for level in &self.levels[..self.depth()] {
            let node = if position % 2 == 0 {
                // Sibling on the right, or ourselves when the level is odd.
                ProofNode::right(*level.get(position + 1).unwrap_or(&level[position]))
            } else {
                ProofNode::left(level[position - 1])
            };
            proof.push(node);
            position /= 2;
        }
        Ok(proof)
    }
}

/// Merkle root over `leaves`.
pub fn compute_merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return EMPTY_ROOT;
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Inclusion proof for `leaves[index]`.
pub fn build_merkle_proof(leaves: &[Hash], index: usize) -> Result<Vec<ProofNode>, RelayError> {
    MerkleTree::build(leaves).proof(index)
}

/// Verify that `leaf` is committed by `expected_root` via `proof`.
pub fn verify_merkle_proof(leaf: &Hash, proof: &[ProofNode], expected_root: &Hash) -> bool {
    let computed = proof.iter().fold(*leaf, |current, node| match node.position {
        Position::Left => hash_concat(&node.hash, &current),
        Position::Right => hash_concat(&current, &node.hash),
    });
    computed == *expected_root
}
