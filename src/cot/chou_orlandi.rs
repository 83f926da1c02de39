//! Online correlated OT from the Chou-Orlandi oblivious transfer (cf.
//! <https://eprint.iacr.org/2015/267>).
//!
//! The random OT keys `k_0, k_1` of transfer `i` are derived from Ristretto
//! points hashed together with a running counter, so that equal receiver
//! points never produce equal keys. The sender then sends `u = k_0 ^ k_1 ^ Δ`
//! and keeps `q = k_0`, the receiver outputs `t = k_b ^ b·u = q ^ b·Δ`.
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_TABLE,
    ristretto::{CompressedRistretto, RistrettoBasepointTable, RistrettoPoint},
    scalar::Scalar,
};
use rand::RngCore;
use tracing::{Level, instrument};

use crate::{
    block::Block,
    channel::{Channel, MsgChannel, Route, Step},
    config::BASE_COT_PROTOCOL,
    cot::{CotReceiver, CotSender},
    crypto::AesRng,
    error::{Abort, Error},
};

/// Correlated OT sender running Chou-Orlandi for every request.
#[derive(Debug)]
pub struct ChouOrlandiCotSender {
    delta: Block,
    rng: AesRng,
    counter: u128,
}

/// Correlated OT receiver running Chou-Orlandi for every request.
#[derive(Debug)]
pub struct ChouOrlandiCotReceiver {
    rng: AesRng,
    counter: u128,
}

impl ChouOrlandiCotSender {
    /// Creates a sender with global offset `delta`.
    pub fn new(delta: Block, rng: AesRng) -> Self {
        Self {
            delta,
            rng,
            counter: 0,
        }
    }
}

impl ChouOrlandiCotReceiver {
    /// Creates a receiver.
    pub fn new(rng: AesRng) -> Self {
        Self { rng, counter: 0 }
    }
}

impl CotSender for ChouOrlandiCotSender {
    fn delta(&self) -> Block {
        self.delta
    }

    fn available(&self) -> usize {
        usize::MAX
    }

    #[instrument(level = Level::DEBUG, skip_all, fields(count = count), err)]
    async fn send_correlated<C: Channel>(
        &mut self,
        channel: &mut MsgChannel<'_, C>,
        count: usize,
    ) -> Result<Vec<Block>, Error> {
        let y = Scalar::random(&mut DalekRng(&mut self.rng));
        let s = &y * RISTRETTO_BASEPOINT_TABLE;
        channel
            .send(
                Route::new(BASE_COT_PROTOCOL, Step::BaseOtSetup),
                &s.compress().to_bytes(),
            )
            .await?;

        let points: Vec<[u8; 32]> = channel
            .recv_vec(Route::new(BASE_COT_PROTOCOL, Step::BaseOtChoices), count)
            .await?;
        let ys = y * s;
        let mut q = Vec::with_capacity(count);
        let mut corrections = Vec::with_capacity(count);
        for (i, r) in points.into_iter().enumerate() {
            let yr = y * decompress(r)?;
            let tweak = self.counter + i as u128;
            let k0 = hash_pt(tweak, &yr);
            let k1 = hash_pt(tweak, &(yr - ys));
            q.push(k0);
            corrections.push(k0 ^ k1 ^ self.delta);
        }
        self.counter += count as u128;
        channel
            .send(
                Route::new(BASE_COT_PROTOCOL, Step::BaseOtCorrections),
                &corrections,
            )
            .await?;
        Ok(q)
    }
}

impl CotReceiver for ChouOrlandiCotReceiver {
    fn available(&self) -> usize {
        usize::MAX
    }

    #[instrument(level = Level::DEBUG, skip_all, fields(count = choices.len()), err)]
    async fn receive_correlated<C: Channel>(
        &mut self,
        channel: &mut MsgChannel<'_, C>,
        choices: &[bool],
    ) -> Result<Vec<Block>, Error> {
        let s: [u8; 32] = channel
            .recv(Route::new(BASE_COT_PROTOCOL, Step::BaseOtSetup))
            .await?;
        let s = decompress(s)?;
        let s_table = RistrettoBasepointTable::create(&s);

        let mut points = Vec::with_capacity(choices.len());
        let mut keys = Vec::with_capacity(choices.len());
        for (i, b) in choices.iter().enumerate() {
            let x = Scalar::random(&mut DalekRng(&mut self.rng));
            let r = Scalar::from(u8::from(*b)) * s + &x * RISTRETTO_BASEPOINT_TABLE;
            points.push(r.compress().to_bytes());
            keys.push(hash_pt(self.counter + i as u128, &(&x * &s_table)));
        }
        self.counter += choices.len() as u128;
        channel
            .send(Route::new(BASE_COT_PROTOCOL, Step::BaseOtChoices), &points)
            .await?;

        let corrections: Vec<Block> = channel
            .recv_vec(
                Route::new(BASE_COT_PROTOCOL, Step::BaseOtCorrections),
                choices.len(),
            )
            .await?;
        Ok(keys
            .into_iter()
            .zip(corrections)
            .zip(choices)
            .map(|((k, u), b)| k ^ u.const_mul(*b))
            .collect())
    }
}

fn decompress(bytes: [u8; 32]) -> Result<RistrettoPoint, Abort> {
    CompressedRistretto(bytes)
        .decompress()
        .ok_or(Abort::InvalidOtData)
}

fn hash_pt(tweak: u128, pt: &RistrettoPoint) -> Block {
    let h = blake3::keyed_hash(pt.compress().as_bytes(), &tweak.to_le_bytes());
    let mut key = Block::ZERO;
    key.as_mut_bytes()
        .copy_from_slice(&h.as_bytes()[..Block::BYTES]);
    key
}

/// Exposes an [`AesRng`] through the `rand_core` 0.6 traits `curve25519-dalek`
/// expects.
struct DalekRng<'r>(&'r mut AesRng);

impl rand_core_0_6::RngCore for DalekRng<'_> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core_0_6::Error> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl rand_core_0_6::CryptoRng for DalekRng<'_> {}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};

    use super::{ChouOrlandiCotReceiver, ChouOrlandiCotSender};
    use crate::{
        block::Block,
        channel::{MsgChannel, SimpleChannel},
        cot::{CotReceiver, CotSender},
        crypto::AesRng,
    };

    #[tokio::test]
    async fn chou_orlandi_produces_correlations() {
        let mut rng = AesRng::seed_from_u64(5);
        let delta: Block = rng.random();
        let mut sender = ChouOrlandiCotSender::new(delta, rng.fork());
        let mut receiver = ChouOrlandiCotReceiver::new(rng.fork());
        let (mut ch_s, mut ch_r) = SimpleChannel::pair();

        for round in 0..2 {
            let choices: Vec<bool> = (0..17).map(|i| (i + round) % 3 == 0).collect();
            let (q, t) = tokio::try_join!(
                async {
                    let mut ch = MsgChannel::new(&mut ch_s, 0, 1, 9);
                    sender.send_correlated(&mut ch, choices.len()).await
                },
                async {
                    let mut ch = MsgChannel::new(&mut ch_r, 1, 0, 9);
                    receiver.receive_correlated(&mut ch, &choices).await
                }
            )
            .unwrap();
            for ((q, t), c) in q.iter().zip(&t).zip(&choices) {
                assert_eq!(*t, *q ^ delta.const_mul(*c));
            }
            assert_ne!(q[0], q[1]);
        }
    }
}
