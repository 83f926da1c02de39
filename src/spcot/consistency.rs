//! Consistency tags proving that the sender's leaves form one tree.
//!
//! Every leaf `y` is hashed to `p_y = H(session, instance, y, leaf_y)`. The tag
//! consists of `XOR_y p_y` and a digest of `p_0 ‖ … ‖ p_{N-1}`. The receiver
//! knows all `p_y` but `p_α`, recovers it from the XOR and recomputes the
//! digest. Level messages inconsistent with the committed leaves make the
//! recovered `p_α` and hence the digest differ.
//!
//! Follows the all-but-one vector proof of SoftSpoken OT
//! (<https://eprint.iacr.org/2022/192>), instantiated with BLAKE3.
use serde::{Deserialize, Serialize};

use crate::block::Block;

const LEAF_CONTEXT: &str = "ggm-spcot v1 consistency leaf hash";
const DIGEST_CONTEXT: &str = "ggm-spcot v1 consistency digest";

/// Consistency tag of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    xor: [u8; 32],
    digest: [u8; 32],
}

fn leaf_hash(session: u64, instance: usize, index: usize, leaf: Block) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(LEAF_CONTEXT);
    hasher.update(&session.to_le_bytes());
    hasher.update(&(instance as u64).to_le_bytes());
    hasher.update(&(index as u64).to_le_bytes());
    hasher.update(leaf.as_bytes());
    *hasher.finalize().as_bytes()
}

fn xor_into(acc: &mut [u8; 32], other: &[u8; 32]) {
    acc.iter_mut().zip(other).for_each(|(a, b)| *a ^= b);
}

/// Computes the tag of the full leaf vector of `instance`.
pub fn tag(session: u64, instance: usize, leaves: &[Block]) -> Tag {
    let mut xor = [0; 32];
    let mut digest = blake3::Hasher::new_derive_key(DIGEST_CONTEXT);
    for (y, leaf) in leaves.iter().enumerate() {
        let p = leaf_hash(session, instance, y, *leaf);
        xor_into(&mut xor, &p);
        digest.update(&p);
    }
    Tag {
        xor,
        digest: *digest.finalize().as_bytes(),
    }
}

/// Checks `tag` against all leaves but the one at `alpha`.
///
/// The digests are compared in constant time.
pub fn verify(session: u64, instance: usize, leaves: &[Block], alpha: usize, tag: &Tag) -> bool {
    let hashes: Vec<Option<[u8; 32]>> = leaves
        .iter()
        .enumerate()
        .map(|(y, leaf)| (y != alpha).then(|| leaf_hash(session, instance, y, *leaf)))
        .collect();
    let mut punctured = tag.xor;
    hashes
        .iter()
        .flatten()
        .for_each(|p| xor_into(&mut punctured, p));

    let mut digest = blake3::Hasher::new_derive_key(DIGEST_CONTEXT);
    for p in &hashes {
        digest.update(p.as_ref().unwrap_or(&punctured));
    }
    digest.finalize() == blake3::Hash::from(tag.digest)
}

#[cfg(test)]
mod tests {
    use super::{tag, verify};
    use crate::block::Block;

    fn leaves() -> Vec<Block> {
        (0..10).map(|i| Block::pack(i, i * i)).collect()
    }

    #[test]
    fn honest_tag_verifies_for_every_alpha() {
        let leaves = leaves();
        let t = tag(3, 1, &leaves);
        for alpha in 0..leaves.len() {
            let mut known = leaves.clone();
            known[alpha] = Block::ZERO;
            assert!(verify(3, 1, &known, alpha, &t));
        }
    }

    #[test]
    fn modified_leaf_fails() {
        let leaves = leaves();
        let t = tag(3, 1, &leaves);
        let mut known = leaves.clone();
        known[4] ^= Block::ONE;
        assert!(!verify(3, 1, &known, 2, &t));
    }

    #[test]
    fn tag_is_bound_to_instance_and_session() {
        let leaves = leaves();
        let t = tag(3, 1, &leaves);
        assert!(!verify(3, 2, &leaves, 0, &t));
        assert!(!verify(4, 1, &leaves, 0, &t));
    }
}
