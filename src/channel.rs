//! A communication channel used to send/receive messages to/from another party.
//!
//! [`Channel`] only moves bytes. [`MsgChannel`] adds (de-)serialization and
//! wraps every payload in an envelope carrying a [`Header`], so that each
//! received message is checked against the session, protocol, step and level
//! it is expected to belong to before its payload is interpreted.

use std::{fmt, future::Future, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::{
    sync::mpsc::{Receiver, Sender, channel, error::SendError},
    time::timeout,
};
use tracing::trace;

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug, Error)]
#[error("channel error during {phase}: {reason}")]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    #[error("receiving failed: {0}")]
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    #[error("sending failed: {0}")]
    SendError(String),
    /// The message could not be (de-)serialized.
    #[error("malformed message: {0}")]
    SerdeError(String),
    /// The message is a Vec, but not of the expected length.
    #[error("message has invalid length, expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected number of elements.
        expected: usize,
        /// Received number of elements.
        actual: usize,
    },
    /// The message header does not match the expected one.
    #[error("unexpected message header {actual:?}, expected {expected:?}")]
    UnexpectedHeader {
        /// Header the receiver was waiting for.
        expected: Header,
        /// Header found in the envelope.
        actual: Header,
    },
}

/// A communication channel used to send/receive messages to/from another party.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given index.
    fn send_bytes_to(
        &mut self,
        party: usize,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a message from the party with the given index.
    fn recv_bytes_from(
        &mut self,
        party: usize,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// The protocol step a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Chou–Orlandi sender setup point.
    BaseOtSetup,
    /// Chou–Orlandi receiver points, one per choice.
    BaseOtChoices,
    /// Base COT corrections turning random OTs into correlated ones.
    BaseOtCorrections,
    /// Receiver choice flips derandomizing precomputed COTs.
    ChoiceFlips,
    /// Masked level sums of one tree level for all instances.
    Level,
    /// Final leaf corrections of the two-key GGM variant.
    Correction,
    /// Consistency tags for malicious security.
    Consistency,
}

/// Demultiplexing tuple sent in front of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Session identifier both parties agreed on.
    pub session: u64,
    /// Identifier of the tree variant (or base OT) producing the message.
    pub protocol: u16,
    /// Protocol step.
    pub step: Step,
    /// Sending party.
    pub from: usize,
    /// Receiving party.
    pub to: usize,
    /// Tree level, for [`Step::Level`] messages.
    pub index: Option<u32>,
}

/// Where a message is sent from or expected to come from, within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Identifier of the tree variant (or base OT) producing the message.
    pub protocol: u16,
    /// Protocol step.
    pub step: Step,
    /// Tree level, for [`Step::Level`] messages.
    pub index: Option<u32>,
}

impl Route {
    /// A route without a level index.
    pub fn new(protocol: u16, step: Step) -> Self {
        Self {
            protocol,
            step,
            index: None,
        }
    }

    /// Route of the level message with the given index.
    pub fn level(protocol: u16, level: u32) -> Self {
        Self {
            protocol,
            step: Step::Level,
            index: Some(level),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{:?}[{i}] of protocol {}", self.step, self.protocol),
            None => write!(f, "{:?} of protocol {}", self.step, self.protocol),
        }
    }
}

/// A wrapper around [`Channel`] that takes care of (de-)serializing messages
/// and checking their headers.
#[derive(Debug)]
pub struct MsgChannel<'c, C: Channel> {
    inner: &'c mut C,
    own: usize,
    peer: usize,
    session: u64,
}

impl<'c, C: Channel> MsgChannel<'c, C> {
    /// Wraps `inner` for messages between `own` and `peer` in `session`.
    pub fn new(inner: &'c mut C, own: usize, peer: usize, session: u64) -> Self {
        Self {
            inner,
            own,
            peer,
            session,
        }
    }

    /// The session all messages on this channel belong to.
    pub fn session(&self) -> u64 {
        self.session
    }

    fn header(&self, route: Route, from: usize, to: usize) -> Header {
        Header {
            session: self.session,
            protocol: route.protocol,
            step: route.step,
            from,
            to,
            index: route.index,
        }
    }

    /// Serializes and sends a message to the other party.
    pub async fn send(&mut self, route: Route, msg: &impl Serialize) -> Result<(), Error> {
        let phase = route.to_string();
        let payload = bincode::serialize(msg).map_err(|e| Error {
            phase: format!("sending {phase}"),
            reason: ErrorKind::SerdeError(format!("{e:?}")),
        })?;
        let header = self.header(route, self.own, self.peer);
        let envelope = bincode::serialize(&(header, payload)).map_err(|e| Error {
            phase: format!("sending {phase}"),
            reason: ErrorKind::SerdeError(format!("{e:?}")),
        })?;
        trace!(%route, bytes = envelope.len(), "sending message");
        self.inner
            .send_bytes_to(self.peer, envelope)
            .await
            .map_err(|e| Error {
                phase,
                reason: ErrorKind::SendError(format!("{e:?}")),
            })
    }

    /// Receives a message from the other party, checks its header and
    /// deserializes the payload.
    pub async fn recv<T: DeserializeOwned>(&mut self, route: Route) -> Result<T, Error> {
        let phase = route.to_string();
        let envelope = self
            .inner
            .recv_bytes_from(self.peer)
            .await
            .map_err(|e| Error {
                phase: phase.clone(),
                reason: ErrorKind::RecvError(format!("{e:?}")),
            })?;
        let (actual, payload): (Header, Vec<u8>) =
            bincode::deserialize(&envelope).map_err(|e| Error {
                phase: format!("receiving {phase}"),
                reason: ErrorKind::SerdeError(format!("{e:?}")),
            })?;
        let expected = self.header(route, self.peer, self.own);
        if actual != expected {
            return Err(Error {
                phase,
                reason: ErrorKind::UnexpectedHeader { expected, actual },
            });
        }
        trace!(%route, bytes = envelope.len(), "received message");
        bincode::deserialize(&payload).map_err(|e| Error {
            phase: format!("receiving {phase}"),
            reason: ErrorKind::SerdeError(format!("{e:?}")),
        })
    }

    /// Receives and deserializes a Vec from the other party (while checking the length).
    pub async fn recv_vec<T: DeserializeOwned>(
        &mut self,
        route: Route,
        len: usize,
    ) -> Result<Vec<T>, Error> {
        let v: Vec<T> = self.recv(route).await?;
        if v.len() == len {
            Ok(v)
        } else {
            Err(Error {
                phase: route.to_string(),
                reason: ErrorKind::InvalidLength {
                    expected: len,
                    actual: v.len(),
                },
            })
        }
    }
}

/// A simple in-process channel using [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Option<Sender<Vec<u8>>>>,
    r: Vec<Option<Receiver<Vec<u8>>>>,
}

impl SimpleChannel {
    /// Creates channels for N parties to communicate with each other.
    pub fn channels(parties: usize) -> Vec<Self> {
        let buffer_capacity = 1024;
        let mut channels: Vec<_> = (0..parties)
            .map(|_| SimpleChannel {
                s: (0..parties).map(|_| None).collect(),
                r: (0..parties).map(|_| None).collect(),
            })
            .collect();
        for a in 0..parties {
            for b in (a + 1)..parties {
                let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
                let (send_b_to_a, recv_b_to_a) = channel(buffer_capacity);
                channels[a].s[b] = Some(send_a_to_b);
                channels[b].s[a] = Some(send_b_to_a);
                channels[a].r[b] = Some(recv_b_to_a);
                channels[b].r[a] = Some(recv_a_to_b);
            }
        }
        channels
    }

    /// Creates a connected pair of channels, for parties 0 and 1.
    pub fn pair() -> (Self, Self) {
        let mut channels = Self::channels(2);
        let b = channels.pop().expect("two channels were created");
        let a = channels.pop().expect("two channels were created");
        (a, b)
    }
}

/// The error raised by `send` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncSendError {
    /// There is no connection to the given party.
    UnknownParty(usize),
    /// The receiving half has been dropped.
    Closed(SendError<Vec<u8>>),
}

/// The error raised by `recv` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncRecvError {
    /// There is no connection to the given party.
    UnknownParty(usize),
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
}

impl Channel for SimpleChannel {
    type SendError = AsyncSendError;
    type RecvError = AsyncRecvError;

    async fn send_bytes_to(&mut self, p: usize, msg: Vec<u8>) -> Result<(), AsyncSendError> {
        trace!(party = p, bytes = msg.len(), "sending bytes");
        self.s
            .get(p)
            .and_then(Option::as_ref)
            .ok_or(AsyncSendError::UnknownParty(p))?
            .send(msg)
            .await
            .map_err(AsyncSendError::Closed)
    }

    async fn recv_bytes_from(&mut self, p: usize) -> Result<Vec<u8>, AsyncRecvError> {
        let chunk = self
            .r
            .get_mut(p)
            .and_then(Option::as_mut)
            .ok_or(AsyncRecvError::UnknownParty(p))?
            .recv();
        match timeout(Duration::from_secs(10 * 60), chunk).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, MsgChannel, Route, SimpleChannel, Step};
    use crate::block::Block;

    #[tokio::test]
    async fn message_roundtrip_with_header() {
        let (mut a, mut b) = SimpleChannel::pair();
        let mut a = MsgChannel::new(&mut a, 0, 1, 7);
        let mut b = MsgChannel::new(&mut b, 1, 0, 7);
        let msg = vec![Block::pack(1, 2), Block::pack(3, 4)];
        a.send(Route::level(3, 2), &msg).await.unwrap();
        let got: Vec<Block> = b.recv_vec(Route::level(3, 2), 2).await.unwrap();
        assert_eq!(msg, got);
    }

    #[tokio::test]
    async fn wrong_level_is_rejected() {
        let (mut a, mut b) = SimpleChannel::pair();
        let mut a = MsgChannel::new(&mut a, 0, 1, 7);
        let mut b = MsgChannel::new(&mut b, 1, 0, 7);
        a.send(Route::level(3, 1), &vec![Block::ZERO]).await.unwrap();
        let err = b
            .recv_vec::<Block>(Route::level(3, 2), 1)
            .await
            .unwrap_err();
        assert!(matches!(err.reason, ErrorKind::UnexpectedHeader { .. }));
    }

    #[tokio::test]
    async fn wrong_session_is_rejected() {
        let (mut a, mut b) = SimpleChannel::pair();
        let mut a = MsgChannel::new(&mut a, 0, 1, 7);
        let mut b = MsgChannel::new(&mut b, 1, 0, 8);
        let route = Route::new(1, Step::Correction);
        a.send(route, &vec![Block::ZERO]).await.unwrap();
        let err = b.recv_vec::<Block>(route, 1).await.unwrap_err();
        assert!(matches!(err.reason, ErrorKind::UnexpectedHeader { .. }));
    }

    #[tokio::test]
    async fn wrong_length_is_rejected() {
        let (mut a, mut b) = SimpleChannel::pair();
        let mut a = MsgChannel::new(&mut a, 0, 1, 0);
        let mut b = MsgChannel::new(&mut b, 1, 0, 0);
        let route = Route::new(1, Step::Consistency);
        a.send(route, &vec![Block::ZERO; 3]).await.unwrap();
        let err = b.recv_vec::<Block>(route, 4).await.unwrap_err();
        assert!(matches!(
            err.reason,
            ErrorKind::InvalidLength {
                expected: 4,
                actual: 3
            }
        ));
    }
}
