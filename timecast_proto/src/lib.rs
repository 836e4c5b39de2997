#![no_std]
//! Message model for a timed, named-service message bus.
//!
//! This crate defines the values that travel over the bus, independently of
//! how the bus itself delivers them.
//!
//! ## Addressing
//!
//! Every message is addressed to a slash-separated **path**. The first
//! segment names a **service** (e.g. `"mixer"`), the remaining segments name a
//! **method** implemented by that service (e.g. `"0/push"`):
//!
//! ```text
//! mixer/0/push
//! ^^^^^ ^^^^^^
//! |     method path
//! service
//! ```
//!
//! ## Typed arguments
//!
//! Each message carries a list of typed [`Arg`]uments. Methods declare the
//! argument types they accept with a compact [`TypeString`], one character per
//! scalar and `v` + element character for vectors:
//!
//! | Code | Type |
//! |---|---|
//! | `i` | 32-bit integer |
//! | `h` | 64-bit integer |
//! | `f` | 32-bit float |
//! | `d` | 64-bit float |
//! | `t` | time, in seconds (64-bit float) |
//! | `B` | boolean |
//! | `s` | string |
//! | `S` | symbol |
//! | `vi`, `vh`, `vf`, `vd` | vectors of the above numeric types |
//!
//! For example, a method taking a stream id and a block of samples declares
//! `"hvf"`.
//!
//! ## Scheduling
//!
//! Every [`Message`] carries a delivery timestamp expressed in seconds of the
//! bus's global clock. A timestamp of `0.0` (or any non-positive value) means
//! "deliver immediately"; any positive value means "deliver no earlier than
//! this time".
//!
//! The types in this crate implement `serde`'s `Serialize` and `Deserialize`
//! traits, for bus implementations to plug into the `serde` backend of their
//! choice.

extern crate alloc;

pub mod message;
pub mod types;

pub use message::Message;
pub use types::{Arg, ArgType, TypeString, TypeStringError};

/// Splits a path into its service name and the method path below it.
///
/// Returns `None` if the path has no method part, or if any segment is empty.
///
/// ```
/// assert_eq!(timecast_proto::split_path("mixer/0/push"), Some(("mixer", "0/push")));
/// assert_eq!(timecast_proto::split_path("mixer"), None);
/// assert_eq!(timecast_proto::split_path("mixer//push"), None);
/// ```
#[inline]
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    if !is_valid_address(path) {
        return None;
    }

    path.split_once('/')
}

/// Returns whether `address` is a non-empty sequence of non-empty,
/// slash-separated segments.
#[inline]
pub fn is_valid_address(address: &str) -> bool {
    !address.is_empty() && address.split('/').all(|segment| !segment.is_empty())
}
