//! Merkle root over block transactions.

use crate::hash::{sha256_concat, Hash};

/// Compute the merkle root of a list of leaf hashes.
///
/// Each level combines pairs as `SHA256(left || right)`. A level with an odd
/// number of nodes pairs its last node with itself, including a lone leaf,
/// so every non-empty tree has at least one combination step.
/// Returns the zero hash if the list is empty.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }

    let mut current_level: Vec<Hash> = leaves.to_vec();

    loop {
        let mut next_level = Vec::with_capacity(current_level.len().div_ceil(2));

        for chunk in current_level.chunks(2) {
            let right = chunk.get(1).unwrap_or(&chunk[0]);
            next_level.push(sha256_concat(&[chunk[0].as_ref(), right.as_ref()]));
        }

        if next_level.len() == 1 {
            return next_level[0];
        }
        current_level = next_level;
    }
}
