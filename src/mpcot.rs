//! Multi-point correlated OT with regular noise.
//!
//! The output vector of length `bins * bin_size` is split into `bins`
//! consecutive bins and the receiver's noise has exactly one position per bin.
//! Each bin is one single-point instance, so the whole vector costs a single
//! batch of [`SpcotSender::puncture_batch`] / [`SpcotReceiver::puncture_batch`].
use rand::Rng;
use tracing::{Level, instrument};

use crate::{
    block::Block,
    channel::Channel,
    cot::{CotReceiver, CotSender},
    error::{ConfigError, Error},
    spcot::{SpcotReceiver, SpcotSender},
};

/// Samples one uniformly random position per bin.
///
/// Panics if `bin_size` is zero.
pub fn sample_regular_positions(rng: &mut impl Rng, bins: usize, bin_size: usize) -> Vec<usize> {
    (0..bins)
        .map(|bin| bin * bin_size + rng.random_range(0..bin_size))
        .collect()
}

/// Sender side: returns `v` with `bins * bin_size` blocks.
#[instrument(level = Level::DEBUG, skip(sender, channel, cot), err)]
pub async fn send_regular<C: Channel, S: CotSender>(
    sender: &mut SpcotSender,
    channel: &mut C,
    cot: &mut S,
    bins: usize,
    bin_size: usize,
) -> Result<Vec<Block>, Error> {
    let outputs = sender.puncture_batch(channel, cot, bins, bin_size).await?;
    Ok(outputs.into_iter().flat_map(|o| o.into_leaves()).collect())
}

/// Receiver side: returns `w` with `w[i] ^ v[i] == Δ` exactly for `i` in
/// `positions`, which must contain one position per bin, in bin order.
#[instrument(level = Level::DEBUG, skip(receiver, channel, cot, positions), fields(bins = positions.len()), err)]
pub async fn receive_regular<C: Channel, R: CotReceiver>(
    receiver: &mut SpcotReceiver,
    channel: &mut C,
    cot: &mut R,
    positions: &[usize],
    bin_size: usize,
) -> Result<Vec<Block>, Error> {
    if bin_size == 0 {
        return Err(ConfigError::InvalidBound.into());
    }
    let alphas = positions
        .iter()
        .enumerate()
        .map(|(bin, &position)| {
            if position / bin_size == bin {
                Ok(position % bin_size)
            } else {
                Err(ConfigError::IrregularNoise {
                    position,
                    bin,
                    bin_size,
                })
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    let outputs = receiver
        .puncture_batch(channel, cot, &alphas, bin_size)
        .await?;
    Ok(outputs
        .into_iter()
        .flat_map(|o| o.into_cot_vector())
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{Rng, SeedableRng};
    use rayon::ThreadPoolBuilder;

    use super::{receive_regular, sample_regular_positions, send_regular};
    use crate::{
        block::Block,
        channel::SimpleChannel,
        config::{PprfConfig, Variant, precompute_num},
        cot::ideal_cot,
        crypto::AesRng,
        error::{ConfigError, Error},
        spcot::{SpcotReceiver, SpcotSender},
    };

    #[tokio::test]
    async fn regular_noise_vector() {
        let (bins, bin_size) = (5, 12);
        let mut rng = AesRng::seed_from_u64(21);
        let delta: Block = rng.random();
        let positions = sample_regular_positions(&mut rng, bins, bin_size);
        let count = bins * precompute_num(Variant::HalfTree, bin_size);
        let (mut s_cot, mut r_cot) = ideal_cot(&mut rng, delta, count);

        let pool = Arc::new(ThreadPoolBuilder::new().num_threads(2).build().unwrap());
        let mut sender = SpcotSender::with_rng(PprfConfig::new(0, 1, pool.clone()), delta, rng.fork());
        let mut receiver = SpcotReceiver::new(PprfConfig::new(1, 0, pool));
        let (mut ch_s, mut ch_r) = SimpleChannel::pair();
        let (v, w) = tokio::try_join!(
            send_regular(&mut sender, &mut ch_s, &mut s_cot, bins, bin_size),
            receive_regular(&mut receiver, &mut ch_r, &mut r_cot, &positions, bin_size),
        )
        .unwrap();

        assert_eq!(bins * bin_size, v.len());
        assert_eq!(bins * bin_size, w.len());
        for (i, (v, w)) in v.iter().zip(&w).enumerate() {
            let expected = if positions.contains(&i) { delta } else { Block::ZERO };
            assert_eq!(expected, *v ^ *w, "position {i}");
        }
    }

    #[test]
    fn sampled_positions_are_regular() {
        let mut rng = AesRng::seed_from_u64(22);
        let positions = sample_regular_positions(&mut rng, 50, 7);
        for (bin, p) in positions.into_iter().enumerate() {
            assert_eq!(bin, p / 7);
        }
    }

    #[tokio::test]
    async fn irregular_positions_are_rejected() {
        let pool = Arc::new(ThreadPoolBuilder::new().num_threads(1).build().unwrap());
        let mut receiver = SpcotReceiver::new(PprfConfig::new(1, 0, pool));
        let mut rng = AesRng::seed_from_u64(23);
        let (_, mut r_cot) = ideal_cot(&mut rng, Block::ONES, 100);
        let (_, mut ch) = SimpleChannel::pair();
        let err = receive_regular(&mut receiver, &mut ch, &mut r_cot, &[3, 2], 4)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::IrregularNoise {
                position: 2,
                bin: 1,
                bin_size: 4
            })
        ));
    }
}
