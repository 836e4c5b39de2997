//! Bus adapter for the message model defined in the `timecast_proto` crate.
//!
//! This crate provides the vocabulary endpoints use to talk over a timed,
//! named-service message bus, and an in-process implementation of such a bus.
//!
//! ## Scope
//!
//! - The [`Bus`] trait: the capability object endpoints are constructed with.
//!   It exposes the global clock, per-service synchronization status, method
//!   registration and timestamped sends.
//! - [`Service`]: owns a service name and the methods implemented under it,
//!   and unregisters them when dropped.
//! - [`Client`]: sends typed messages to methods of a remote service.
//! - [`LocalBus`]: a process-local bus, encoding messages using [`serde`] and
//!   [`postcard`], and delivering them in timestamp order from a [`poll`]
//!   entry point, optionally driven by a background [`Poller`].
//!
//! This crate does not redefine the message model, and does not implement
//! any networking or clock synchronization protocol.
//!
//! [`poll`]: LocalBus::poll

pub mod clock;
pub mod local;
mod service;

pub use clock::{Clock, ManualClock, ServiceStatus, SystemClock};
pub use local::{DEFAULT_POLL_RATE_HZ, LocalBus, Poller};
pub use postcard;
pub use serde;
pub use service::{Client, Service};
pub use timecast_proto as proto;

use std::sync::Arc;
use timecast_proto::{Message, TypeString, TypeStringError};

/// A method handler.
///
/// Handlers are invoked from whichever thread delivers messages, and never
/// while the bus holds any of its internal locks.
pub type Handler = Arc<dyn Fn(&Message<'_>) + Send + Sync>;

/// Errors reported by bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] postcard::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] postcard::Error),

    #[error("invalid typestring: {0}")]
    InvalidTypeString(#[from] TypeStringError),

    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    #[error("method already implemented: {0}")]
    MethodExists(String),
}

/// The message bus, as seen by endpoints.
///
/// Implementors provide named services with per-method path dispatch, typed
/// arguments, timestamped delivery and a shared clock. Endpoints receive the
/// bus explicitly at construction, usually as an `Arc<B>`.
pub trait Bus: Send + Sync {
    /// Returns the current global time, in seconds.
    fn now(&self) -> f64;

    /// Returns the name identifying the local peer on the bus.
    fn peer_name(&self) -> &str;

    /// Returns the current status of `service`, as seen from the local peer.
    fn status(&self, service: &str) -> ServiceStatus;

    /// Registers (or takes another reference to) a locally provided service.
    ///
    /// Every successful call must be balanced by a call to
    /// [`release_service`](Bus::release_service).
    fn acquire_service(&self, service: &str) -> Result<(), BusError>;

    /// Releases a reference taken with [`acquire_service`](Bus::acquire_service).
    /// The service disappears once its last reference is released.
    fn release_service(&self, service: &str);

    /// Binds `handler` to the full method `path`.
    ///
    /// Only messages whose arguments match `typestring` are delivered to it.
    fn add_method(
        &self,
        path: &str,
        typestring: TypeString,
        handler: Handler,
    ) -> Result<(), BusError>;

    /// Unbinds the handler at `path`, if any.
    fn remove_method(&self, path: &str);

    /// Schedules `message` for delivery at its timestamp.
    fn send(&self, message: &Message<'_>) -> Result<(), BusError>;
}

impl<B: Bus + ?Sized> Bus for Arc<B> {
    #[inline(always)]
    fn now(&self) -> f64 {
        (**self).now()
    }

    #[inline(always)]
    fn peer_name(&self) -> &str {
        (**self).peer_name()
    }

    #[inline(always)]
    fn status(&self, service: &str) -> ServiceStatus {
        (**self).status(service)
    }

    #[inline(always)]
    fn acquire_service(&self, service: &str) -> Result<(), BusError> {
        (**self).acquire_service(service)
    }

    #[inline(always)]
    fn release_service(&self, service: &str) {
        (**self).release_service(service)
    }

    #[inline(always)]
    fn add_method(
        &self,
        path: &str,
        typestring: TypeString,
        handler: Handler,
    ) -> Result<(), BusError> {
        (**self).add_method(path, typestring, handler)
    }

    #[inline(always)]
    fn remove_method(&self, path: &str) {
        (**self).remove_method(path)
    }

    #[inline(always)]
    fn send(&self, message: &Message<'_>) -> Result<(), BusError> {
        (**self).send(message)
    }
}

/// Encodes a message into an owned frame.
#[inline(always)]
pub fn message_encode(message: &Message<'_>) -> Result<Vec<u8>, BusError> {
    postcard::to_allocvec(message).map_err(BusError::Encode)
}

/// Decodes a message from a frame, borrowing its path and strings from it.
#[inline(always)]
pub fn message_decode(frame: &[u8]) -> Result<Message<'_>, BusError> {
    postcard::from_bytes(frame).map_err(BusError::Decode)
}

/// Joins an address and a relative path with a `/`, validating the result.
#[inline]
pub(crate) fn join_path(address: &str, path: &str) -> Result<String, BusError> {
    let full = format!("{address}/{path}");

    if timecast_proto::is_valid_address(&full) {
        Ok(full)
    } else {
        Err(BusError::InvalidPath(full))
    }
}
