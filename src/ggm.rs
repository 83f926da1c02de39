//! Length doubling expansion of GGM tree nodes.
//!
//! A tree is stored level by level in one buffer: the nodes of the current
//! level occupy `tree[..width]` and [`Expand::expand_level`] replaces them with
//! their `2 * width` children, child `2j` and `2j + 1` belonging to node `j`.
use std::sync::LazyLock;

use crate::{
    block::Block,
    crypto::{AesHash, FIXED_KEY_HASH},
};

/// Deterministic length doubling PRG used to derive the children of a node.
pub trait Expand: Send + Sync {
    /// Expands `seed` into its `[left, right]` children.
    fn expand(&self, seed: Block) -> [Block; 2];

    /// Expands the first `width` nodes of `tree` in place into `2 * width`
    /// children and returns the XOR of all left and of all right children.
    ///
    /// Panics if `tree` is shorter than `2 * width`.
    fn expand_level(&self, tree: &mut [Block], width: usize) -> [Block; 2];
}

/// The two fixed AES keys of the naive expander.
static GGM_KEYS: LazyLock<[AesHash; 2]> = LazyLock::new(|| {
    [
        AesHash::with_block_key(Block::ZERO),
        AesHash::with_block_key(Block::ONE),
    ]
});

/// Two-key GGM expansion, `child_b = π_b(seed) ^ seed`.
///
/// Children of a node are independent, so the XOR of a level carries no
/// structure and costs two AES calls per node.
#[derive(Debug, Clone, Copy, Default)]
pub struct GgmExpander;

/// Half-tree expansion (<https://eprint.iacr.org/2022/1431>).
///
/// `left = H(seed)` with the circular correlation robust hash
/// `H(x) = π(σ(x)) ^ σ(x)` and `right = seed ^ left`. Siblings XOR to their
/// parent, so every level of a tree rooted in `(q, q ^ Δ)` XORs to Δ. One AES
/// call per node.
#[derive(Debug, Clone, Copy, Default)]
pub struct HalfTreeExpander;

impl Expand for GgmExpander {
    fn expand(&self, seed: Block) -> [Block; 2] {
        let mut children = [[seed], [seed]];
        GGM_KEYS[0].cr_hash_slice_mut(&mut children[0]);
        GGM_KEYS[1].cr_hash_slice_mut(&mut children[1]);
        [children[0][0], children[1][0]]
    }

    fn expand_level(&self, tree: &mut [Block], width: usize) -> [Block; 2] {
        let mut left = tree[..width].to_vec();
        let mut right = left.clone();
        GGM_KEYS[0].cr_hash_slice_mut(&mut left);
        GGM_KEYS[1].cr_hash_slice_mut(&mut right);
        interleave(tree, &left, &right)
    }
}

impl Expand for HalfTreeExpander {
    fn expand(&self, seed: Block) -> [Block; 2] {
        let left = FIXED_KEY_HASH.ccr_hash_block(seed);
        [left, seed ^ left]
    }

    fn expand_level(&self, tree: &mut [Block], width: usize) -> [Block; 2] {
        let parents = tree[..width].to_vec();
        let mut left = parents.clone();
        FIXED_KEY_HASH.ccr_hash_slice_mut(&mut left);
        let right: Vec<Block> = parents.iter().zip(&left).map(|(p, l)| *p ^ *l).collect();
        interleave(tree, &left, &right)
    }
}

fn interleave(tree: &mut [Block], left: &[Block], right: &[Block]) -> [Block; 2] {
    let mut sums = [Block::ZERO; 2];
    for (children, (l, r)) in tree[..2 * left.len()]
        .chunks_exact_mut(2)
        .zip(left.iter().zip(right))
    {
        children[0] = *l;
        children[1] = *r;
        sums[0] ^= *l;
        sums[1] ^= *r;
    }
    sums
}

/// Height of the tree with at least `bound` leaves, `ceil(log2(bound))`.
pub fn tree_height(bound: usize) -> u32 {
    bound.next_power_of_two().trailing_zeros()
}

/// Folds the leaves of a full tree onto the first `bound` leaves.
///
/// Leaf `j >= bound` is XORed into leaf `j - bound`, then the buffer is
/// truncated. The XOR of all leaves is unchanged.
pub(crate) fn fold_leaves(leaves: &mut Vec<Block>, bound: usize) {
    let (kept, surplus) = leaves.split_at_mut(bound);
    kept.iter_mut()
        .zip(surplus.iter())
        .for_each(|(leaf, extra)| *leaf ^= *extra);
    leaves.truncate(bound);
}
