//! RNG based on AES in CTR mode.
//!
//! Based on the `AesRng` of the
//! [scuttlebutt](https://github.com/GaloisInc/swanky/blob/4455754abadee07f168079ac45ef33535b0df27d/scuttlebutt/src/rand_aes.rs)
//! crate, but using the [aes](`aes`) crate for the block cipher.
//!
//! Every GGM tree draws its root seed from its own [`AesRng`], obtained by
//! [`AesRng::fork`]ing the party generator before instances are handed to the
//! thread pool. Parallel tasks therefore never share generator state.
use std::mem;

use aes::{
    Aes128,
    cipher::{BlockCipherEncrypt, KeyInit},
};
use rand::rand_core::block::{BlockRng, BlockRngCore, CryptoBlockRng};
use rand::{CryptoRng, Rng, RngCore, SeedableRng};

use crate::block::Block;

/// AES-128 in counter mode used as a PRG.
#[derive(Clone, Debug)]
pub struct AesRng(BlockRng<AesRngCore>);

impl RngCore for AesRng {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    #[inline]
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let block_size = mem::size_of::<aes::Block>();
        let block_len = dest.len() / block_size * block_size;
        let (block_bytes, rest_bytes) = dest.split_at_mut(block_len);
        // whole blocks are encrypted in place, skipping the u32 buffer of BlockRng
        let blocks = bytemuck::cast_slice_mut::<_, aes::Block>(block_bytes);
        for chunk in blocks.chunks_mut(AES_PAR_BLOCKS) {
            for block in chunk.iter_mut() {
                *block = aes::cipher::Array(self.0.core.counter.to_le_bytes());
                self.0.core.counter += 1;
            }
            self.0.core.aes.encrypt_blocks(chunk);
        }
        self.0.fill_bytes(rest_bytes)
    }
}

impl SeedableRng for AesRng {
    type Seed = Block;

    #[inline]
    fn from_seed(seed: Self::Seed) -> Self {
        AesRng(BlockRng::<AesRngCore>::from_seed(seed))
    }
}

impl CryptoRng for AesRng {}

impl AesRng {
    /// Create a new random number generator seeded from the thread rng.
    #[inline]
    pub fn new() -> Self {
        AesRng::from_seed(rand::random::<Block>())
    }

    /// Create an independent RNG seeded from this one.
    #[inline]
    pub fn fork(&mut self) -> Self {
        let seed = self.random::<Block>();
        AesRng::from_seed(seed)
    }

    /// Fork `n` independent generators, one per parallel task.
    pub fn fork_many(&mut self, n: usize) -> Vec<Self> {
        (0..n).map(|_| self.fork()).collect()
    }
}

impl Default for AesRng {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// The core of `AesRng`, used with `BlockRng`.
#[derive(Clone)]
pub struct AesRngCore {
    aes: Aes128,
    counter: u128,
}

impl std::fmt::Debug for AesRngCore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "AesRngCore {{}}")
    }
}

impl BlockRngCore for AesRngCore {
    type Item = u32;
    // equivalent to `[Block; AES_PAR_BLOCKS]`
    type Results = hidden::ParBlockWrapper;

    #[inline]
    fn generate(&mut self, results: &mut Self::Results) {
        let blocks = bytemuck::cast_slice_mut::<_, aes::Block>(results.as_mut());
        blocks.iter_mut().for_each(|blk| {
            *blk = aes::cipher::Array(self.counter.to_le_bytes());
            self.counter += 1;
        });
        self.aes.encrypt_blocks(blocks);
    }
}

mod hidden {
    use super::AES_PAR_BLOCKS;

    /// Equivalent to [aes::Block; AES_PAR_BLOCKS]. Large arrays don't impl
    /// Default, hence the wrapper.
    #[derive(Copy, Clone)]
    pub struct ParBlockWrapper([u32; AES_PAR_BLOCKS * 4]);

    impl Default for ParBlockWrapper {
        fn default() -> Self {
            Self([0; AES_PAR_BLOCKS * 4])
        }
    }

    impl AsMut<[u32]> for ParBlockWrapper {
        fn as_mut(&mut self) -> &mut [u32] {
            &mut self.0
        }
    }

    impl AsRef<[u32]> for ParBlockWrapper {
        fn as_ref(&self) -> &[u32] {
            &self.0
        }
    }
}

impl SeedableRng for AesRngCore {
    type Seed = Block;

    #[inline]
    fn from_seed(seed: Self::Seed) -> Self {
        AesRngCore {
            aes: Aes128::new(&seed.into()),
            counter: 0,
        }
    }
}

impl CryptoBlockRng for AesRngCore {}

/// Number of Blocks for which hardware accelerated AES can make use of ILP.
///
/// Mirrors `ParBlocksSize` of the `aes` backend for the target architecture.
/// Only performance depends on it, never outputs or messages.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub const AES_PAR_BLOCKS: usize = 9;
#[cfg(target_arch = "aarch64")]
pub const AES_PAR_BLOCKS: usize = 21;
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
pub const AES_PAR_BLOCKS: usize = 4;

#[cfg(test)]
mod tests {
    use rand::{Rng, RngCore, SeedableRng};

    use super::AesRng;
    use crate::block::Block;

    #[test]
    fn seeded_rng_is_deterministic() {
        let seed = Block::pack(1, 2);
        let a: [Block; 5] = AesRng::from_seed(seed).random();
        let b: [Block; 5] = AesRng::from_seed(seed).random();
        assert_eq!(a, b);
    }

    #[test]
    fn forks_are_independent() {
        let mut rng = AesRng::from_seed(Block::pack(3, 4));
        let mut forks = rng.fork_many(3);
        let outs: Vec<Block> = forks.iter_mut().map(|r| r.random()).collect();
        assert_ne!(outs[0], outs[1]);
        assert_ne!(outs[1], outs[2]);
        assert_ne!(outs[0], outs[2]);
    }

    #[test]
    fn fill_bytes_handles_tail() {
        let mut rng = AesRng::new();
        let mut buf = [0_u8; 16 * 11 + 5];
        rng.fill_bytes(&mut buf);
        assert_ne!(buf[16 * 11..], [0_u8; 5]);
    }
}
