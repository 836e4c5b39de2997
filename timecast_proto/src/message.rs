//! The bus message envelope.

use crate::types::{Arg, TypeString};
use alloc::{borrow::Cow, vec::Vec};
use serde::{Deserialize, Serialize};

/// A timestamped, addressed list of typed arguments.
///
/// The path and arguments borrow from their source whenever possible: from
/// the sender's buffers when building a message, and from the received frame
/// when decoding one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<'a> {
    /// Delivery time, in seconds of the bus's global clock.
    ///
    /// Non-positive values request immediate delivery.
    pub timestamp: f64,
    /// Full destination path, starting with the service name.
    #[serde(borrow)]
    pub path: Cow<'a, str>,
    #[serde(borrow)]
    pub args: Vec<Arg<'a>>,
}

impl<'a> Message<'a> {
    #[inline(always)]
    pub fn new(timestamp: f64, path: impl Into<Cow<'a, str>>, args: Vec<Arg<'a>>) -> Self {
        Self {
            timestamp,
            path: path.into(),
            args,
        }
    }

    /// Returns whether this message should be delivered as soon as possible.
    #[inline(always)]
    pub fn is_immediate(&self) -> bool {
        // NaN timestamps are treated as immediate too
        !(self.timestamp > 0.)
    }

    /// Returns the name of the service this message is addressed to.
    #[inline(always)]
    pub fn service(&self) -> Option<&str> {
        crate::split_path(&self.path).map(|(service, _)| service)
    }

    /// Returns the typestring describing this message's arguments.
    #[inline(always)]
    pub fn typestring(&self) -> TypeString {
        TypeString::of(&self.args)
    }
}
