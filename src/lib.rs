//! Single-point correlated OT from punctured GGM trees, a distributed
//! puncturable PRF between two parties.
//!
//! The sender holds a global offset Δ and obtains `N` pseudorandom leaves
//! that XOR to Δ. The receiver chooses a secret index `α` and obtains every
//! leaf except the one at `α`, without the sender learning `α`. Many
//! independent instances can be run as one batch that shares all network
//! rounds, and a batch of single-point instances with one index per bin yields
//! a multi-point COT with regular noise, the building block of silent OT
//! extension.
//!
//! ## Main Components
//!
//! * [`spcot`]: [`spcot::SpcotSender`] and [`spcot::SpcotReceiver`] with their
//!   `puncture` and `puncture_batch` operations.
//! * [`mpcot`]: regular-noise multi-point COT on top of a batch.
//! * [`config`]: the tree [`config::Variant`], the [`config::Security`]
//!   setting and the per-party [`config::PprfConfig`].
//! * [`cot`]: the base correlated OT consumed by the trees, either
//!   precomputed or online via Chou-Orlandi.
//! * [`ggm`]: the node expansion of both tree variants.
//! * [`channel`]: the transport abstraction, messages carry a header that is
//!   checked on receipt.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use ggm_spcot::{
//!     block::Block,
//!     channel::SimpleChannel,
//!     config::{PprfConfig, Security, Variant, precompute_num},
//!     cot::ideal_cot,
//!     spcot::{SpcotReceiver, SpcotSender},
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ggm_spcot::error::Error> {
//! let pool = Arc::new(rayon::ThreadPoolBuilder::new().build().unwrap());
//! let delta: Block = rand::random();
//! let (mut sender_cot, mut receiver_cot) =
//!     ideal_cot(&mut rand::rng(), delta, precompute_num(Variant::HalfTree, 16));
//!
//! let config = |own, peer| {
//!     PprfConfig::new(own, peer, pool.clone())
//!         .variant(Variant::HalfTree)
//!         .security(Security::Malicious)
//! };
//! let mut sender = SpcotSender::new(config(0, 1), delta);
//! let mut receiver = SpcotReceiver::new(config(1, 0));
//! let (mut ch_sender, mut ch_receiver) = SimpleChannel::pair();
//!
//! let (s, r) = tokio::try_join!(
//!     sender.puncture(&mut ch_sender, &mut sender_cot, 16),
//!     receiver.puncture(&mut ch_receiver, &mut receiver_cot, 5, 16),
//! )?;
//! assert_eq!(None, r.get(5));
//! assert_eq!(Some(s.leaves()[3]), r.get(3));
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod block;
pub mod channel;
pub mod config;
pub mod cot;
pub(crate) mod crypto;
pub mod error;
pub mod ggm;
pub mod mpcot;
pub mod spcot;

pub use crypto::AesRng;
