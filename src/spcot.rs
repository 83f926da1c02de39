//! Single-point correlated OT from punctured GGM trees.
//!
//! The sender holds Δ and obtains, per instance, `N` pseudorandom leaves that
//! XOR to Δ. The receiver, holding a secret index `α`, obtains every leaf but
//! the one at `α`. Both parties drive one tree per instance and all instances
//! of a batch share the network rounds: one base COT invocation, one message
//! per tree level, one correction message for [`Variant::Ggm`] and one tag
//! message under [`Security::Malicious`].
//!
//! Levels are processed top-down. At level `i` the receiver's OT choice is the
//! complement of bit `h - 1 - i` of `α` (most significant bit first), so that
//! it learns the XOR of the side of the level opposite to its path.
//!
//! [`Variant::Ggm`]: crate::config::Variant::Ggm
//! [`Security::Malicious`]: crate::config::Security::Malicious
use crate::{block::Block, config::validate_bound, error::ConfigError};

pub mod consistency;
mod receiver;
mod sender;

pub use receiver::SpcotReceiver;
pub use sender::SpcotSender;

/// Leaves of one sender instance.
#[derive(Debug, Clone)]
pub struct SenderOutput {
    bound: usize,
    delta: Block,
    leaves: Vec<Block>,
}

impl SenderOutput {
    /// Number of leaves.
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// The global offset all leaves XOR to.
    pub fn delta(&self) -> Block {
        self.delta
    }

    /// All `bound` leaves.
    pub fn leaves(&self) -> &[Block] {
        &self.leaves
    }

    /// Consumes the output, returning the leaves.
    pub fn into_leaves(self) -> Vec<Block> {
        self.leaves
    }
}

/// Leaves of one receiver instance, all but the punctured one.
#[derive(Debug, Clone)]
pub struct ReceiverOutput {
    bound: usize,
    alpha: usize,
    leaves: Vec<Block>,
}

impl ReceiverOutput {
    /// Number of leaves.
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// The punctured index.
    pub fn alpha(&self) -> usize {
        self.alpha
    }

    /// The leaf at `index`, `None` at the punctured index or out of range.
    pub fn get(&self, index: usize) -> Option<Block> {
        if index == self.alpha {
            None
        } else {
            self.leaves.get(index).copied()
        }
    }

    /// All leaves, the punctured slot holds zero.
    pub fn leaves(&self) -> &[Block] {
        &self.leaves
    }

    /// XOR of all known leaves, equal to the sender's punctured leaf XOR Δ.
    pub fn punctured_correlation(&self) -> Block {
        Block::xor_all(&self.leaves)
    }

    /// Leaves with [`Self::punctured_correlation`] written to the punctured
    /// slot.
    ///
    /// With `v` the sender's leaves, the result `w` satisfies
    /// `w[i] == v[i]` for `i != α` and `w[α] == v[α] ^ Δ`.
    pub fn into_cot_vector(mut self) -> Vec<Block> {
        self.leaves[self.alpha] = self.punctured_correlation();
        self.leaves
    }
}

fn check_instances(instances: usize) -> Result<(), ConfigError> {
    if instances == 0 {
        Err(ConfigError::EmptyBatch)
    } else {
        Ok(())
    }
}

/// Validates the common parameters of a batch and returns the tree height.
fn check_batch(instances: usize, bound: usize) -> Result<u32, ConfigError> {
    check_instances(instances)?;
    validate_bound(bound)
}

/// Choice bit of the receiver at `level` of a tree of `height`.
#[inline]
fn choice_bit(alpha: usize, height: u32, level: u32) -> bool {
    (alpha >> (height - 1 - level)) & 1 == 0
}

/// Tweak of the OT masking the level sums, unique per COT and session.
#[inline]
fn ot_tweak(cot_index: usize, session: u64) -> Block {
    Block::pack(cot_index as u64, session)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{Rng, SeedableRng};
    use rayon::{ThreadPool, ThreadPoolBuilder};

    use super::{ReceiverOutput, SenderOutput, SpcotReceiver, SpcotSender, choice_bit};
    use crate::{
        block::Block,
        channel::SimpleChannel,
        config::{PprfConfig, Security, Variant, precompute_num},
        cot::{
            CotReceiver, CotSender, ideal_cot,
            chou_orlandi::{ChouOrlandiCotReceiver, ChouOrlandiCotSender},
        },
        crypto::AesRng,
        error::{ConfigError, Error},
    };

    const VARIANTS: [Variant; 2] = [Variant::Ggm, Variant::HalfTree];
    const SECURITY: [Security; 2] = [Security::SemiHonest, Security::Malicious];

    fn pool() -> Arc<ThreadPool> {
        Arc::new(ThreadPoolBuilder::new().num_threads(2).build().unwrap())
    }

    fn configs(variant: Variant, security: Security) -> (PprfConfig, PprfConfig) {
        let pool = pool();
        let sender = PprfConfig::new(0, 1, pool.clone())
            .variant(variant)
            .security(security)
            .session(42);
        let receiver = PprfConfig::new(1, 0, pool)
            .variant(variant)
            .security(security)
            .session(42);
        (sender, receiver)
    }

    async fn run_batch(
        variant: Variant,
        security: Security,
        mut sender_cot: impl CotSender,
        mut receiver_cot: impl CotReceiver,
        rng: &mut AesRng,
        alphas: &[usize],
        bound: usize,
    ) -> Result<(Vec<SenderOutput>, Vec<ReceiverOutput>), Error> {
        let (s_config, r_config) = configs(variant, security);
        let delta = sender_cot.delta();
        let mut sender = SpcotSender::with_rng(s_config, delta, rng.fork());
        let mut receiver = SpcotReceiver::new(r_config);
        let (mut ch_s, mut ch_r) = SimpleChannel::pair();
        tokio::try_join!(
            sender.puncture_batch(&mut ch_s, &mut sender_cot, alphas.len(), bound),
            receiver.puncture_batch(&mut ch_r, &mut receiver_cot, alphas, bound),
        )
    }

    fn assert_correlated(sender: &SenderOutput, receiver: &ReceiverOutput, delta: Block) {
        let bound = sender.bound();
        assert_eq!(bound, sender.leaves().len());
        assert_eq!(bound, receiver.leaves().len());
        assert_eq!(delta, Block::xor_all(sender.leaves()));
        for i in 0..bound {
            if i == receiver.alpha() {
                assert_eq!(None, receiver.get(i));
                assert_eq!(Block::ZERO, receiver.leaves()[i]);
            } else {
                assert_eq!(Some(sender.leaves()[i]), receiver.get(i));
            }
        }
        assert_eq!(
            sender.leaves()[receiver.alpha()] ^ delta,
            receiver.punctured_correlation()
        );
    }

    async fn run_precomputed(
        variant: Variant,
        security: Security,
        alphas: &[usize],
        bound: usize,
        seed: u64,
    ) -> (Block, Vec<SenderOutput>, Vec<ReceiverOutput>) {
        let mut rng = AesRng::seed_from_u64(seed);
        let delta: Block = rng.random();
        let count = alphas.len() * precompute_num(variant, bound);
        let (s_cot, r_cot) = ideal_cot(&mut rng, delta, count);
        let (s, r) = run_batch(variant, security, s_cot, r_cot, &mut rng, alphas, bound)
            .await
            .unwrap();
        (delta, s, r)
    }

    #[test]
    fn choice_bits_are_msb_first_complements() {
        // α = 5 = 0b0101 in a tree of height 4
        let bits: Vec<bool> = (0..4).map(|level| choice_bit(5, 4, level)).collect();
        assert_eq!(vec![true, false, true, false], bits);
    }

    #[tokio::test]
    async fn puncture_sixteen_at_five() {
        for variant in VARIANTS {
            for security in SECURITY {
                let (delta, s, r) = run_precomputed(variant, security, &[5], 16, 1).await;
                assert_correlated(&s[0], &r[0], delta);
            }
        }
    }

    #[tokio::test]
    async fn puncture_non_power_of_two() {
        for variant in VARIANTS {
            for security in SECURITY {
                for alpha in [0, 1, 7, 8] {
                    let (delta, s, r) = run_precomputed(variant, security, &[alpha], 9, 2).await;
                    assert_correlated(&s[0], &r[0], delta);
                }
            }
        }
    }

    #[tokio::test]
    async fn puncture_single_leaf() {
        for variant in VARIANTS {
            for security in SECURITY {
                let (delta, s, r) = run_precomputed(variant, security, &[0], 1, 3).await;
                assert_eq!(vec![delta], s[0].leaves());
                assert_eq!(None, r[0].get(0));
                assert_correlated(&s[0], &r[0], delta);
            }
        }
    }

    #[tokio::test]
    async fn batch_shares_rounds() {
        for variant in VARIANTS {
            let (delta, s, r) =
                run_precomputed(variant, Security::Malicious, &[0, 15, 7], 16, 4).await;
            assert_eq!(3, s.len());
            for (s, r) in s.iter().zip(&r) {
                assert_correlated(s, r, delta);
            }
        }
    }

    #[tokio::test]
    async fn instances_are_independent() {
        for variant in VARIANTS {
            let (_, s_a, r_a) = run_precomputed(variant, Security::SemiHonest, &[3, 9], 16, 5).await;
            let (_, s_b, r_b) = run_precomputed(variant, Security::SemiHonest, &[3, 12], 16, 5).await;
            assert_eq!(s_a[0].leaves(), s_b[0].leaves());
            assert_eq!(r_a[0].leaves(), r_b[0].leaves());
            assert_ne!(r_a[1].leaves(), r_b[1].leaves());
        }
    }

    #[tokio::test]
    async fn sessions_are_fresh() {
        let (_, s_a, _) = run_precomputed(Variant::HalfTree, Security::SemiHonest, &[5], 16, 6).await;
        let (_, s_b, _) = run_precomputed(Variant::HalfTree, Security::SemiHonest, &[5], 16, 7).await;
        assert_ne!(s_a[0].leaves(), s_b[0].leaves());
    }

    #[tokio::test]
    async fn online_base_cot() {
        for variant in VARIANTS {
            let mut rng = AesRng::seed_from_u64(8);
            let delta: Block = rng.random();
            let s_cot = ChouOrlandiCotSender::new(delta, rng.fork());
            let r_cot = ChouOrlandiCotReceiver::new(rng.fork());
            let (s, r) = run_batch(
                variant,
                Security::Malicious,
                s_cot,
                r_cot,
                &mut rng,
                &[2, 10],
                13,
            )
            .await
            .unwrap();
            for (s, r) in s.iter().zip(&r) {
                assert_correlated(s, r, delta);
            }
        }
    }

    #[tokio::test]
    async fn cot_vector_has_single_point_correlation() {
        let (delta, s, r) = run_precomputed(Variant::Ggm, Security::SemiHonest, &[6], 11, 9).await;
        let v = s[0].leaves().to_vec();
        let w = r.into_iter().next().unwrap().into_cot_vector();
        for (i, (v, w)) in v.iter().zip(&w).enumerate() {
            let expected = if i == 6 { delta } else { Block::ZERO };
            assert_eq!(expected, *v ^ *w);
        }
    }

    #[tokio::test]
    async fn insufficient_material_fails_before_messages() {
        let mut rng = AesRng::seed_from_u64(10);
        let delta: Block = rng.random();
        let (mut s_cot, mut r_cot) = ideal_cot(&mut rng, delta, 3);
        let (s_config, r_config) = configs(Variant::HalfTree, Security::SemiHonest);
        let mut sender = SpcotSender::new(s_config, delta);
        let mut receiver = SpcotReceiver::new(r_config);
        let (mut ch_s, mut ch_r) = SimpleChannel::pair();
        let err = sender
            .puncture(&mut ch_s, &mut s_cot, 16)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PrecomputeInsufficient {
                required: 4,
                available: 3
            }
        ));
        let err = receiver
            .puncture(&mut ch_r, &mut r_cot, 5, 16)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PrecomputeInsufficient { .. }));
    }

    #[tokio::test]
    async fn invalid_parameters_are_rejected() {
        let mut rng = AesRng::seed_from_u64(11);
        let delta: Block = rng.random();
        let (mut s_cot, mut r_cot) = ideal_cot(&mut rng, delta, 64);
        let (s_config, r_config) = configs(Variant::Ggm, Security::SemiHonest);
        let mut sender = SpcotSender::new(s_config, rng.random());
        let mut receiver = SpcotReceiver::new(r_config);
        let (mut ch_s, mut ch_r) = SimpleChannel::pair();

        let err = sender.puncture(&mut ch_s, &mut s_cot, 16).await.unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::DeltaMismatch)));
        let err = sender
            .puncture_batch(&mut ch_s, &mut s_cot, 2, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidBound)));

        let err = receiver
            .puncture(&mut ch_r, &mut r_cot, 16, 16)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::AlphaOutOfRange {
                alpha: 16,
                bound: 16
            })
        ));
        let err = receiver
            .puncture_batch(&mut ch_r, &mut r_cot, &[], 16)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::EmptyBatch)));
        assert_eq!(64, r_cot.available());
    }
}
