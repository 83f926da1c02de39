//! Correlation robust hashes from fixed-key AES.
//!
//! The constructions follow <https://eprint.iacr.org/2019/074>:
//!
//! - `cr`: `π(x) ^ x`, the Davies–Meyer style compression used by the two-key
//!   GGM expander,
//! - `ccr`: `π(σ(x)) ^ σ(x)`, circular correlation robust, used by the
//!   half-tree expander where sibling nodes differ by a common offset,
//! - `tccr`: `π(π(x) ^ tweak) ^ π(x)` (TMMO), used to mask OT messages with a
//!   per-transfer tweak.
use std::sync::LazyLock;

use aes::{
    Aes128,
    cipher::{BlockCipherEncrypt, Key, KeyInit},
};

use crate::{block::Block, crypto::AES_PAR_BLOCKS};

/// AES accelerated hashing of [`Block`]s.
#[derive(Clone)]
pub(crate) struct AesHash {
    aes: Aes128,
}

impl AesHash {
    /// Create a new `AesHash` with the given key.
    pub(crate) fn new(key: &Key<Aes128>) -> Self {
        Self {
            aes: Aes128::new(key),
        }
    }

    /// Create a new `AesHash` keyed with a block.
    pub(crate) fn with_block_key(key: Block) -> Self {
        Self::new(&key.into())
    }

    /// Correlation robust hash of a slice of blocks.
    ///
    /// Calculates `π(x) ^ x` in-place, making use of AES instruction-level
    /// parallelism.
    pub(crate) fn cr_hash_slice_mut(&self, x: &mut [Block]) {
        let mut tmp = [aes::Block::default(); AES_PAR_BLOCKS];

        for chunk in x.chunks_mut(AES_PAR_BLOCKS) {
            self.aes
                .encrypt_blocks_b2b(bytemuck::cast_slice(chunk), &mut tmp[..chunk.len()])
                .expect("in and out always have same length");
            chunk
                .iter_mut()
                .zip(tmp)
                .for_each(|(x, x_enc)| *x ^= x_enc.into());
        }
    }

    /// Circular correlation robust hash of a single block.
    ///
    /// Calculates `π(σ(x)) ^ σ(x)`.
    pub(crate) fn ccr_hash_block(&self, x: Block) -> Block {
        let sigma = x.sigma();
        let mut enc = sigma.into();
        self.aes.encrypt_block(&mut enc);
        sigma ^ enc.into()
    }

    /// Circular correlation robust hash of a slice of blocks, in-place.
    pub(crate) fn ccr_hash_slice_mut(&self, x: &mut [Block]) {
        x.iter_mut().for_each(|blk| *blk = blk.sigma());
        self.cr_hash_slice_mut(x);
    }

    /// Tweakable circular correlation robust hash function.
    ///
    /// Calculates `π(π(x) ^ tweak) ^ π(x)` for a single block.
    pub(crate) fn tccr_hash_block(&self, tweak: Block, x: Block) -> Block {
        let mut x_enc = x.into();
        self.aes.encrypt_block(&mut x_enc);
        let mut x_enc_xor_tweak_enc = (Block::from(x_enc) ^ tweak).into();
        self.aes.encrypt_block(&mut x_enc_xor_tweak_enc);

        Block::from(x_enc_xor_tweak_enc) ^ Block::from(x_enc)
    }
}

/// An `AesHash` with a fixed key.
pub(crate) static FIXED_KEY_HASH: LazyLock<AesHash> = LazyLock::new(|| {
    // The key was randomly chosen. Any key would be okay.
    AesHash::with_block_key(Block::from(193502124791825095790518994062991136444_u128))
});

#[cfg(test)]
mod tests {
    use rand::random;

    use super::FIXED_KEY_HASH;
    use crate::block::Block;

    #[test]
    fn ccr_slice_matches_single() {
        let mut blocks: Vec<Block> = (0..23).map(|_| random()).collect();
        let expected: Vec<Block> = blocks
            .iter()
            .map(|b| FIXED_KEY_HASH.ccr_hash_block(*b))
            .collect();
        FIXED_KEY_HASH.ccr_hash_slice_mut(&mut blocks);
        assert_eq!(expected, blocks);
    }

    #[test]
    fn tccr_depends_on_tweak() {
        let x: Block = random();
        let a = FIXED_KEY_HASH.tccr_hash_block(Block::pack(0, 1), x);
        let b = FIXED_KEY_HASH.tccr_hash_block(Block::pack(1, 1), x);
        assert_ne!(a, b);
        assert_eq!(a, FIXED_KEY_HASH.tccr_hash_block(Block::pack(0, 1), x));
    }

    #[test]
    fn ccr_breaks_xor_correlation() {
        let x: Block = random();
        let delta: Block = random();
        let h = |b| FIXED_KEY_HASH.ccr_hash_block(b);
        assert_ne!(h(x) ^ h(x ^ delta), delta);
    }
}
