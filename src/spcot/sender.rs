//! Sender role: generates full trees and sends masked level sums.
use rand::Rng;
use rayon::prelude::*;
use tracing::{Level, debug, instrument, trace};

use crate::{
    block::Block,
    channel::{Channel, MsgChannel, Route, Step},
    config::{PprfConfig, Security, Variant, precompute_num},
    cot::CotSender,
    crypto::{AesRng, FIXED_KEY_HASH},
    error::{ConfigError, Error},
    ggm::fold_leaves,
    spcot::{SenderOutput, check_batch, consistency, ot_tweak},
};

/// Sender of single-point correlated OTs, owner of Δ.
#[derive(Debug)]
pub struct SpcotSender {
    config: PprfConfig,
    delta: Block,
    rng: AesRng,
}

impl SpcotSender {
    /// Creates a sender with global offset `delta`, seeding tree roots from
    /// the thread rng.
    pub fn new(config: PprfConfig, delta: Block) -> Self {
        Self::with_rng(config, delta, AesRng::new())
    }

    /// Creates a sender drawing tree roots from `rng`.
    pub fn with_rng(config: PprfConfig, delta: Block, rng: AesRng) -> Self {
        Self { config, delta, rng }
    }

    /// The global offset Δ.
    pub fn delta(&self) -> Block {
        self.delta
    }

    /// Runs a single instance with `bound` leaves.
    pub async fn puncture<C: Channel, S: CotSender>(
        &mut self,
        channel: &mut C,
        cot: &mut S,
        bound: usize,
    ) -> Result<SenderOutput, Error> {
        let outputs = self.puncture_batch(channel, cot, 1, bound).await?;
        Ok(outputs
            .into_iter()
            .next()
            .expect("a batch of one instance has one output"))
    }

    /// Runs `instances` independent instances with `each_num` leaves each,
    /// sharing all communication rounds.
    #[instrument(level = Level::DEBUG, skip_all, fields(instances = instances, bound = each_num), err)]
    pub async fn puncture_batch<C: Channel, S: CotSender>(
        &mut self,
        channel: &mut C,
        cot: &mut S,
        instances: usize,
        each_num: usize,
    ) -> Result<Vec<SenderOutput>, Error> {
        let height = check_batch(instances, each_num)?;
        if cot.delta() != self.delta {
            return Err(ConfigError::DeltaMismatch.into());
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
        let delta = self.delta;
        let mut channel = MsgChannel::new(channel, config.own, config.peer, config.session);
        let q = cot.send_correlated(&mut channel, required).await?;
        debug!(cots = q.len(), "received base correlations");

        if height == 0 {
            return Ok((0..instances)
                .map(|_| SenderOutput {
                    bound: each_num,
                    delta,
                    leaves: vec![delta],
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
                let rngs = self.rng.fork_many(instances);
                pool.install(|| {
                    trees
                        .par_iter_mut()
                        .zip(rngs)
                        .for_each(|(tree, mut rng)| tree[0] = rng.random())
                });
                for level in 0..height {
                    let width = 1 << level;
                    let msgs: Vec<[Block; 2]> = pool.install(|| {
                        trees
                            .par_iter_mut()
                            .enumerate()
                            .map(|(instance, tree)| {
                                let [k0, k1] = expander.expand_level(tree, width);
                                let idx = instance * per_instance + level as usize;
                                let tweak = ot_tweak(idx, session);
                                [
                                    k0 ^ FIXED_KEY_HASH.tccr_hash_block(tweak, q[idx]),
                                    k1 ^ FIXED_KEY_HASH.tccr_hash_block(tweak, q[idx] ^ delta),
                                ]
                            })
                            .collect()
                    });
                    trace!(level, "sending level sums");
                    channel.send(Route::level(protocol, level), &msgs).await?;
                }
            }
            Variant::HalfTree => {
                pool.install(|| {
                    trees.par_iter_mut().enumerate().for_each(|(instance, tree)| {
                        let q = q[instance * per_instance];
                        tree[0] = q;
                        tree[1] = q ^ delta;
                    })
                });
                for level in 1..height {
                    let width = 1 << level;
                    let msgs: Vec<Block> = pool.install(|| {
                        trees
                            .par_iter_mut()
                            .enumerate()
                            .map(|(instance, tree)| {
                                let [k0, _] = expander.expand_level(tree, width);
                                k0 ^ q[instance * per_instance + level as usize]
                            })
                            .collect()
                    });
                    trace!(level, "sending level sums");
                    channel.send(Route::level(protocol, level), &msgs).await?;
                }
            }
        }

        pool.install(|| {
            trees
                .par_iter_mut()
                .for_each(|tree| fold_leaves(tree, each_num))
        });

        if variant == Variant::Ggm {
            let corrections: Vec<Block> = pool.install(|| {
                trees
                    .par_iter_mut()
                    .map(|tree| {
                        let correction = delta ^ Block::xor_all(tree.iter());
                        tree[0] ^= correction;
                        correction
                    })
                    .collect()
            });
            channel
                .send(Route::new(protocol, Step::Correction), &corrections)
                .await?;
        }

        if config.security == Security::Malicious {
            let tags: Vec<consistency::Tag> = pool.install(|| {
                trees
                    .par_iter()
                    .enumerate()
                    .map(|(instance, tree)| consistency::tag(session, instance, tree))
                    .collect()
            });
            channel
                .send(Route::new(protocol, Step::Consistency), &tags)
                .await?;
        }

        Ok(trees
            .into_iter()
            .map(|leaves| SenderOutput {
                bound: each_num,
                delta,
                leaves,
            })
            .collect())
    }
}
