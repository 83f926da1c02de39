mod aes_hash;
mod aes_rng;

pub(crate) use aes_hash::{AesHash, FIXED_KEY_HASH};
pub use aes_rng::AesRng;
pub(crate) use aes_rng::AES_PAR_BLOCKS;
