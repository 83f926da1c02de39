//! Base correlated oblivious transfer consumed by the tree protocols.
//!
//! A COT with global offset Δ gives the sender `q_i` and the receiver, for its
//! choice bit `c_i`, the value `t_i = q_i ^ c_i·Δ`.
//!
//! Two sources are provided: precomputed random COTs (for example from the
//! [`ideal_cot`] dealer or an OT extension run earlier), which are
//! derandomized to the receiver's choices with one message of flip bits, and
//! the online [`chou_orlandi`] construction.
use rand::Rng;
use tracing::{Level, instrument};

use crate::{
    block::Block,
    channel::{Channel, MsgChannel, Route, Step},
    config::BASE_COT_PROTOCOL,
    error::Error,
};

pub mod chou_orlandi;

/// Sender side of a correlated OT.
#[allow(async_fn_in_trait)]
pub trait CotSender {
    /// The global offset Δ of all correlations.
    fn delta(&self) -> Block;

    /// Number of correlations that can still be produced.
    fn available(&self) -> usize;

    /// Produces `count` correlations `q`.
    async fn send_correlated<C: Channel>(
        &mut self,
        channel: &mut MsgChannel<'_, C>,
        count: usize,
    ) -> Result<Vec<Block>, Error>;
}

/// Receiver side of a correlated OT.
#[allow(async_fn_in_trait)]
pub trait CotReceiver {
    /// Number of correlations that can still be produced.
    fn available(&self) -> usize;

    /// Produces `t_i = q_i ^ choices[i]·Δ` for every choice.
    async fn receive_correlated<C: Channel>(
        &mut self,
        channel: &mut MsgChannel<'_, C>,
        choices: &[bool],
    ) -> Result<Vec<Block>, Error>;
}

/// Sender half of precomputed random COTs.
///
/// Every correlation is used at most once, consumed correlations are removed.
#[derive(Debug, Clone)]
pub struct PrecomputedCotSender {
    delta: Block,
    correlations: Vec<Block>,
}

/// Receiver half of precomputed random COTs, with random choice bits.
#[derive(Debug, Clone)]
pub struct PrecomputedCotReceiver {
    choices: Vec<bool>,
    correlations: Vec<Block>,
}

impl PrecomputedCotSender {
    /// Wraps random COTs `correlations` with offset `delta`.
    pub fn new(delta: Block, correlations: Vec<Block>) -> Self {
        Self {
            delta,
            correlations,
        }
    }
}

impl PrecomputedCotReceiver {
    /// Wraps random COTs for the random `choices`.
    ///
    /// Panics if the lengths differ.
    pub fn new(choices: Vec<bool>, correlations: Vec<Block>) -> Self {
        assert_eq!(
            choices.len(),
            correlations.len(),
            "one correlation per choice bit"
        );
        Self {
            choices,
            correlations,
        }
    }
}

fn check_available(required: usize, available: usize) -> Result<(), Error> {
    if required > available {
        Err(Error::PrecomputeInsufficient {
            required,
            available,
        })
    } else {
        Ok(())
    }
}

impl CotSender for PrecomputedCotSender {
    fn delta(&self) -> Block {
        self.delta
    }

    fn available(&self) -> usize {
        self.correlations.len()
    }

    #[instrument(level = Level::DEBUG, skip_all, fields(count = count), err)]
    async fn send_correlated<C: Channel>(
        &mut self,
        channel: &mut MsgChannel<'_, C>,
        count: usize,
    ) -> Result<Vec<Block>, Error> {
        check_available(count, self.available())?;
        let flips: Vec<bool> = channel
            .recv_vec(Route::new(BASE_COT_PROTOCOL, Step::ChoiceFlips), count)
            .await?;
        let delta = self.delta;
        Ok(self
            .correlations
            .drain(..count)
            .zip(flips)
            .map(|(q, d)| q ^ delta.const_mul(d))
            .collect())
    }
}

impl CotReceiver for PrecomputedCotReceiver {
    fn available(&self) -> usize {
        self.correlations.len()
    }

    #[instrument(level = Level::DEBUG, skip_all, fields(count = choices.len()), err)]
    async fn receive_correlated<C: Channel>(
        &mut self,
        channel: &mut MsgChannel<'_, C>,
        choices: &[bool],
    ) -> Result<Vec<Block>, Error> {
        let count = choices.len();
        check_available(count, self.available())?;
        let flips: Vec<bool> = self.choices[..count]
            .iter()
            .zip(choices)
            .map(|(r, c)| r ^ c)
            .collect();
        channel
            .send(Route::new(BASE_COT_PROTOCOL, Step::ChoiceFlips), &flips)
            .await?;
        self.choices.drain(..count);
        Ok(self.correlations.drain(..count).collect())
    }
}

/// Ideal dealer of `count` random COTs with offset `delta`.
pub fn ideal_cot(
    rng: &mut impl Rng,
    delta: Block,
    count: usize,
) -> (PrecomputedCotSender, PrecomputedCotReceiver) {
    let q: Vec<Block> = (0..count).map(|_| rng.random()).collect();
    let choices: Vec<bool> = (0..count).map(|_| rng.random()).collect();
    let t = q
        .iter()
        .zip(&choices)
        .map(|(q, c)| *q ^ delta.const_mul(*c))
        .collect();
    (
        PrecomputedCotSender::new(delta, q),
        PrecomputedCotReceiver::new(choices, t),
    )
}
