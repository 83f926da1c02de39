//! Receiver role: rebuilds every leaf except the punctured one.
use rayon::prelude::*;
use tracing::{Level, debug, instrument, trace};

use crate::{
    block::Block,
    channel::{Channel, MsgChannel, Route, Step},
    config::{PprfConfig, Security, Variant, precompute_num},
    cot::CotReceiver,
    crypto::FIXED_KEY_HASH,
    error::{Abort, ConfigError, Error},
    ggm::{Expand, fold_leaves},
    spcot::{ReceiverOutput, check_batch, choice_bit, consistency, ot_tweak},
};

/// Receiver of single-point correlated OTs.
#[derive(Debug)]
pub struct SpcotReceiver {
    config: PprfConfig,
}

impl SpcotReceiver {
    /// Creates a receiver.
    pub fn new(config: PprfConfig) -> Self {
        Self { config }
    }

    /// Runs a single instance with `bound` leaves, punctured at `alpha`.
    pub async fn puncture<C: Channel, R: CotReceiver>(
        &mut self,
        channel: &mut C,
        cot: &mut R,
        alpha: usize,
        bound: usize,
    ) -> Result<ReceiverOutput, Error> {
        let outputs = self.puncture_batch(channel, cot, &[alpha], bound).await?;
        Ok(outputs
            .into_iter()
            .next()
            .expect("a batch of one instance has one output"))
    }

    /// Runs one instance per entry of `alphas`, each with `each_num` leaves,
    /// sharing all communication rounds.
    #[instrument(level = Level::DEBUG, skip_all, fields(instances = alphas.len(), bound = each_num), err)]
    pub async fn puncture_batch<C: Channel, R: CotReceiver>(
        &mut self,
        channel: &mut C,
        cot: &mut R,
        alphas: &[usize],
        each_num: usize,
    ) -> Result<Vec<ReceiverOutput>, Error> {
        let instances = alphas.len();
        let height = check_batch(instances, each_num)?;
        if let Some(&alpha) = alphas.iter().find(|&&alpha| alpha >= each_num) {
            return Err(ConfigError::AlphaOutOfRange {
                alpha,
                bound: each_num,
            }
            .into());
        }
        let variant = self.config.variant;
        let per_instance = precompute_num(variant, each_num);
        let required = instances * per_instance;
        if cot.available() < required {
            return Err(Error::PrecomputeInsufficient {
                required,
                available: cot.available(),
            });
        }

        let config = &self.config;
        let mut channel = MsgChannel::new(channel, config.own, config.peer, config.session);
        let choices: Vec<bool> = if height == 0 {
            vec![true; instances]
        } else {
            alphas
                .iter()
                .flat_map(|&alpha| (0..height).map(move |level| choice_bit(alpha, height, level)))
                .collect()
        };
        let t = cot.receive_correlated(&mut channel, &choices).await?;
        debug!(cots = t.len(), "received base correlations");

        if height == 0 {
            return Ok(alphas
                .iter()
                .map(|&alpha| ReceiverOutput {
                    bound: each_num,
                    alpha,
                    leaves: vec![Block::ZERO],
                })
                .collect());
        }

        let descriptor = variant.descriptor();
        let expander = descriptor.expander;
        let protocol = descriptor.protocol_id;
        let session = config.session;
        let pool = &config.pool;
        let mut trees = vec![vec![Block::ZERO; 1 << height]; instances];

        match variant {
            Variant::Ggm => {
                for level in 0..height {
                    let msgs: Vec<[Block; 2]> = channel
                        .recv_vec(Route::level(protocol, level), instances)
                        .await?;
                    trace!(level, "received level sums");
                    pool.install(|| {
                        trees
                            .par_iter_mut()
                            .zip(alphas)
                            .zip(msgs)
                            .enumerate()
                            .for_each(|(instance, ((tree, &alpha), msg))| {
                                let idx = instance * per_instance + level as usize;
                                let c = choice_bit(alpha, height, level);
                                let tweak = ot_tweak(idx, session);
                                let sibling_sum =
                                    msg[usize::from(c)] ^ FIXED_KEY_HASH.tccr_hash_block(tweak, t[idx]);
                                reconstruct_level(expander, tree, height, level, alpha, sibling_sum);
                            })
                    });
                }
            }
            Variant::HalfTree => {
                pool.install(|| {
                    trees
                        .par_iter_mut()
                        .zip(alphas)
                        .enumerate()
                        .for_each(|(instance, (tree, &alpha))| {
                            let sibling = t[instance * per_instance];
                            reconstruct_level(expander, tree, height, 0, alpha, sibling);
                        })
                });
                for level in 1..height {
                    let msgs: Vec<Block> = channel
                        .recv_vec(Route::level(protocol, level), instances)
                        .await?;
                    trace!(level, "received level sums");
                    pool.install(|| {
                        trees
                            .par_iter_mut()
                            .zip(alphas)
                            .zip(msgs)
                            .enumerate()
                            .for_each(|(instance, ((tree, &alpha), msg))| {
                                let sibling_sum = msg ^ t[instance * per_instance + level as usize];
                                reconstruct_level(expander, tree, height, level, alpha, sibling_sum);
                            })
                    });
                }
            }
        }

        pool.install(|| {
            trees.par_iter_mut().zip(alphas).for_each(|(tree, &alpha)| {
                fold_leaves(tree, each_num);
                tree[alpha] = Block::ZERO;
            })
        });

        if variant == Variant::Ggm {
            let corrections: Vec<Block> = channel
                .recv_vec(Route::new(protocol, Step::Correction), instances)
                .await?;
            for ((tree, &alpha), correction) in trees.iter_mut().zip(alphas).zip(corrections) {
                if alpha != 0 {
                    tree[0] ^= correction;
                }
            }
        }

        if config.security == Security::Malicious {
            let tags: Vec<consistency::Tag> = channel
                .recv_vec(Route::new(protocol, Step::Consistency), instances)
                .await?;
            let failed = pool.install(|| {
                trees
                    .par_iter()
                    .zip(alphas)
                    .zip(tags)
                    .enumerate()
                    .filter(|(instance, ((tree, alpha), tag))| {
                        !consistency::verify(session, *instance, tree, **alpha, tag)
                    })
                    .map(|(instance, _)| instance)
                    .min()
            });
            if let Some(instance) = failed {
                return Err(Abort::ConsistencyCheckFailed { instance }.into());
            }
        }

        Ok(trees
            .into_iter()
            .zip(alphas)
            .map(|(leaves, &alpha)| ReceiverOutput {
                bound: each_num,
                alpha,
                leaves,
            })
            .collect())
    }
}

/// Rebuilds `level` of the tree given the XOR of the sibling side.
///
/// Before the call, `tree[..2^level]` holds the known nodes at depth `level`
/// with the node on α's path zeroed (at level 0 nothing is known yet). After
/// the call, `tree[..2^(level+1)]` holds depth `level + 1`, where the only
/// unknown node, α's ancestor, is zero.
fn reconstruct_level(
    expander: &dyn Expand,
    tree: &mut [Block],
    height: u32,
    level: u32,
    alpha: usize,
    sibling_sum: Block,
) {
    let on_path = (alpha >> (height - 1 - level)) & 1;
    let sibling = on_path ^ 1;
    if level == 0 {
        tree[sibling] = sibling_sum;
        tree[on_path] = Block::ZERO;
        return;
    }
    let path = alpha >> (height - level);
    tree[path] = Block::ZERO;
    let sums = expander.expand_level(tree, 1 << level);
    let known = sums[sibling] ^ tree[2 * path + sibling];
    tree[2 * path + sibling] = sibling_sum ^ known;
    tree[2 * path + on_path] = Block::ZERO;
}

#[cfg(test)]
mod tests {
    use super::reconstruct_level;
    use crate::{
        block::Block,
        ggm::{Expand, GgmExpander},
    };

    #[test]
    fn reconstruction_matches_full_tree() {
        let height = 3;
        let alpha = 6;
        let mut full = vec![Block::ZERO; 8];
        full[0] = Block::pack(11, 12);
        let mut sums = Vec::new();
        for level in 0..height {
            sums.push(GgmExpander.expand_level(&mut full, 1 << level));
        }

        let mut tree = vec![Block::ZERO; 8];
        for (level, sum) in sums.iter().enumerate() {
            let sibling = ((alpha >> (height - 1 - level)) & 1) ^ 1;
            reconstruct_level(&GgmExpander, &mut tree, height as u32, level as u32, alpha, sum[sibling]);
        }
        for i in 0..8 {
            let expected = if i == alpha { Block::ZERO } else { full[i] };
            assert_eq!(expected, tree[i], "leaf {i}");
        }
    }
}
