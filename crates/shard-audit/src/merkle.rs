//! binary Merkle tree over RIPEMD160(SHA256(·)) hashes, the same digest used
//! for node identities and shard keys throughout this core.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

pub type Hash = [u8; 20];

pub fn ripemd160_sha256(bytes: &[u8]) -> Hash {
    let sha = Sha256::digest(bytes);
    Ripemd160::digest(sha).into()
}

pub(crate) fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut buf = Vec::with_capacity(40);
    buf.extend_from_slice(left);
    buf.extend_from_slice(right);
    ripemd160_sha256(&buf)
}

/// RIPEMD160(SHA256(empty string)), used to pad the leaf set to a power of two.
pub fn padding_leaf() -> Hash {
    ripemd160_sha256(&[])
}

pub struct MerkleTree {
    /// layers[0] is the (padded, power-of-two) leaf layer; layers.last() is the root layer.
    pub layers: Vec<Vec<Hash>>,
}

pub fn next_power_of_two(n: usize) -> usize {
    if n <= 1 {
        1
    } else {
        n.next_power_of_two()
    }
}

/// pad `leaves` with [`padding_leaf`] until the count is a power of two.
pub fn pad_leaves(mut leaves: Vec<Hash>) -> Vec<Hash> {
    let target = next_power_of_two(leaves.len());
    leaves.resize(target, padding_leaf());
    leaves
}

impl MerkleTree {
    /// build a tree bottom-up from an already power-of-two-sized leaf layer.
    pub fn build(leaves: Vec<Hash>) -> Self {
        assert!(
            leaves.len().is_power_of_two(),
            "leaf count must be a power of two (pad first)"
        );

        let mut layers = vec![leaves];
        while layers.last().unwrap().len() > 1 {
            let prev = layers.last().unwrap();
            let next: Vec<Hash> = prev.chunks_exact(2).map(|p| hash_pair(&p[0], &p[1])).collect();
            layers.push(next);
        }
        MerkleTree { layers }
    }

    pub fn root(&self) -> Hash {
        self.layers.last().unwrap()[0]
    }

    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    pub fn leaves(&self) -> &[Hash] {
        &self.layers[0]
    }

    /// sibling hashes from leaf level to just below the root, for the leaf at `index`.
    pub fn authentication_path(&self, index: usize) -> Vec<Hash> {
        let mut path = Vec::with_capacity(self.depth());
        let mut idx = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = idx ^ 1;
            path.push(layer[sibling]);
            idx /= 2;
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_tree_has_depth_zero() {
        let tree = MerkleTree::build(pad_leaves(vec![[1u8; 20]]));
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.root(), [1u8; 20]);
    }

    #[test]
    fn depth_matches_log2_leaf_count() {
        let leaves: Vec<Hash> = (0..5u8).map(|i| [i; 20]).collect();
        let tree = MerkleTree::build(pad_leaves(leaves));
        assert_eq!(tree.leaves().len(), 8);
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn authentication_path_reconstructs_root() {
        let leaves: Vec<Hash> = (0..7u8).map(|i| [i; 20]).collect();
        let tree = MerkleTree::build(pad_leaves(leaves));
        for index in 0..tree.leaves().len() {
            let path = tree.authentication_path(index);
            let mut hash = tree.leaves()[index];
            let mut idx = index;
            for sibling in path {
                hash = if idx % 2 == 0 {
                    hash_pair(&hash, &sibling)
                } else {
                    hash_pair(&sibling, &hash)
                };
                idx /= 2;
            }
            assert_eq!(hash, tree.root());
        }
    }
}
