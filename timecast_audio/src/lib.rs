//! Clock-synchronized audio streaming over a timed message bus.
//!
//! A [`Transmitter`] sends mono `f32` PCM to a [`Receiver`] endpoint, as
//! timestamped blocks travelling over any [`Bus`](timecast_bus::Bus)
//! implementation. The receiver mixes the blocks of every stream addressing
//! it into one ring buffer, aligned on a shared stream timeline, and hands a
//! single, gap-free, monotonically advancing stream to its consumer.
//!
//! ```text
//!  Transmitter ──sync/push/close──▶ Bus ──▶ Receiver ──pull──▶ consumer
//!  Transmitter ──sync/push/close──▶  ┘        (mixes)
//! ```
//!
//! ## Endpoint methods
//!
//! A receiver bound to `<service>/<endpoint>` implements:
//!
//! | Method | Typestring | Effect |
//! |---|---|---|
//! | `sync` | `ht` | declares (or realigns) a stream at a point in time |
//! | `push` | `hvf` | mixes a block at the stream's write head |
//! | `close` | `h` | forgets the stream |
//!
//! The mixing core, [`MixingBuffer`], doesn't depend on the bus, and can be
//! fed directly.

pub mod buffer;
pub mod config;
mod error;
pub mod receiver;
pub mod ring;
pub mod timeline;
pub mod transmitter;
pub mod wire;

pub use buffer::{MixingBuffer, Pulled, StreamState};
pub use config::{ReceiverConfig, TransmitterConfig};
pub use error::{ConfigError, Error, Result};
pub use receiver::Receiver;
pub use transmitter::Transmitter;
pub use timecast_bus as bus;

use serde::{Deserialize, Serialize};

/// An audio sample.
pub type Sample = f32;

/// The value of an empty (or consumed) ring slot.
pub const SILENCE: Sample = 0.;

/// Identifies a stream, for the lifetime of its transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub i64);

impl StreamId {
    /// Draws a fresh identity from the thread-local RNG.
    #[inline(always)]
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl core::fmt::Display for StreamId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<i64> for StreamId {
    #[inline(always)]
    fn from(value: i64) -> Self {
        Self(value)
    }
}
