//! Stream events, as they travel over the bus.

use crate::{Sample, StreamId};
use std::borrow::Cow;
use timecast_bus::proto::Arg;

/// The methods implemented by a receiver endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Sync,
    Push,
    Close,
}

impl Method {
    pub const ALL: [Self; 3] = [Self::Sync, Self::Push, Self::Close];

    /// Method path, relative to the endpoint.
    #[inline(always)]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Push => "push",
            Self::Close => "close",
        }
    }

    #[inline(always)]
    pub const fn typestring(self) -> &'static str {
        match self {
            Self::Sync => "ht",
            Self::Push => "hvf",
            Self::Close => "h",
        }
    }

    #[inline(always)]
    const fn arity(self) -> usize {
        match self {
            Self::Sync | Self::Push => 2,
            Self::Close => 1,
        }
    }
}

impl core::fmt::Display for Method {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("{method} takes {expected} arguments, got {found}")]
    Arity {
        method: Method,
        expected: usize,
        found: usize,
    },

    #[error("{method}: unexpected type for argument {position}")]
    Type { method: Method, position: usize },
}

/// An event concerning one stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage<'a> {
    /// Sample index `0` of the stream happens at `time`.
    Sync { id: StreamId, time: f64 },
    /// The next block of the stream.
    Push {
        id: StreamId,
        samples: Cow<'a, [Sample]>,
    },
    /// The stream ended.
    Close { id: StreamId },
}

impl<'a> StreamMessage<'a> {
    #[inline(always)]
    pub fn id(&self) -> StreamId {
        match self {
            Self::Sync { id, .. } | Self::Push { id, .. } | Self::Close { id } => *id,
        }
    }

    #[inline(always)]
    pub fn method(&self) -> Method {
        match self {
            Self::Sync { .. } => Method::Sync,
            Self::Push { .. } => Method::Push,
            Self::Close { .. } => Method::Close,
        }
    }

    /// Reads the arguments of a `method` call, borrowing samples from them.
    pub fn decode(method: Method, args: &'a [Arg<'_>]) -> Result<Self, WireError> {
        if args.len() != method.arity() {
            return Err(WireError::Arity {
                method,
                expected: method.arity(),
                found: args.len(),
            });
        }

        let mismatch = |position| WireError::Type { method, position };

        let id = args[0].as_i64().map(StreamId).ok_or(mismatch(0))?;

        Ok(match method {
            Method::Sync => Self::Sync {
                id,
                time: args[1].as_f64().ok_or(mismatch(1))?,
            },
            Method::Push => Self::Push {
                id,
                samples: Cow::Borrowed(args[1].as_f32_slice().ok_or(mismatch(1))?),
            },
            Method::Close => Self::Close { id },
        })
    }

    /// Arguments for a call to [`method`](Self::method).
    pub fn to_args(&self) -> Vec<Arg<'_>> {
        match self {
            Self::Sync { id, time } => vec![Arg::Int64(id.0), Arg::Time(*time)],
            Self::Push { id, samples } => {
                vec![Arg::Int64(id.0), Arg::FloatVec(Cow::Borrowed(&**samples))]
            }
            Self::Close { id } => vec![Arg::Int64(id.0)],
        }
    }
}
