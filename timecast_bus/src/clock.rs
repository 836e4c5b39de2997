//! Global time and synchronization status.

use core::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A source of global time, in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline(always)]
    fn now(&self) -> f64 {
        (**self).now()
    }
}

/// Monotonic seconds elapsed since the clock was created.
#[derive(Debug, Clone)]
pub struct SystemClock(std::time::Instant);

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    #[inline(always)]
    pub fn new() -> Self {
        Self(std::time::Instant::now())
    }
}

impl Clock for SystemClock {
    #[inline(always)]
    fn now(&self) -> f64 {
        self.0.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to.
///
/// Useful to drive scheduled delivery deterministically.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    #[inline(always)]
    pub fn new(now: f64) -> Self {
        Self(AtomicU64::new(now.to_bits()))
    }

    #[inline(always)]
    pub fn set(&self, now: f64) {
        self.0.store(now.to_bits(), Ordering::Release);
    }

    /// Moves the clock forward by `secs`, returning the new time.
    #[inline]
    pub fn advance(&self, secs: f64) -> f64 {
        let mut current = self.0.load(Ordering::Acquire);

        loop {
            let next = f64::from_bits(current) + secs;

            match self.0.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Clock for ManualClock {
    #[inline(always)]
    fn now(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

/// Reachability and clock state of a service, as seen from the local peer.
///
/// Variants are ordered: everything from [`Local`](Self::Local) onwards has a
/// synchronized clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServiceStatus {
    /// The service is unknown.
    Fail,
    /// Provided by the local peer, clock not yet synchronized.
    LocalNoTime,
    /// Provided by a remote peer, clock not yet synchronized.
    RemoteNoTime,
    /// Provided by the local peer, clock synchronized.
    Local,
    /// Provided by a remote peer, clock synchronized.
    Remote,
}

impl ServiceStatus {
    #[inline(always)]
    pub fn is_synchronized(self) -> bool {
        self >= Self::Local
    }

    #[inline(always)]
    pub fn exists(self) -> bool {
        self != Self::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_on_demand() {
        let clock = ManualClock::new(10.);
        assert_eq!(clock.now(), 10.);
        assert_eq!(clock.advance(0.5), 10.5);
        clock.set(2.);
        assert_eq!(clock.now(), 2.);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(a >= 0. && b >= a);
    }

    #[test]
    fn status_ordering() {
        assert!(!ServiceStatus::Fail.is_synchronized());
        assert!(!ServiceStatus::LocalNoTime.is_synchronized());
        assert!(!ServiceStatus::RemoteNoTime.is_synchronized());
        assert!(ServiceStatus::Local.is_synchronized());
        assert!(ServiceStatus::Remote.is_synchronized());
        assert!(!ServiceStatus::Fail.exists());
    }
}
