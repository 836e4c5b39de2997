//! In-process bus implementation.
//!
//! [`LocalBus`] connects services and clients living in the same process. It
//! models the full delivery contract of a timed message bus:
//!
//! - messages are encoded into owned frames when sent, and decoded when
//!   delivered,
//! - delivery happens in timestamp order, immediate messages being due at the
//!   time they were sent, and messages sharing a due time are delivered in
//!   the order they were sent,
//! - a message is only delivered to a method whose typestring matches its
//!   arguments,
//! - delivery only happens from [`LocalBus::poll`], called by the user or by a
//!   background [`Poller`], and never while any internal lock is held.
//!
//! The last point means that handlers may freely lock their own state, even
//! if a thread that is currently holding that state's lock also sends
//! messages: sending never delivers.

use crate::{Bus, BusError, Clock, Handler, ServiceStatus};
use core::{cmp, hash, num, sync::atomic};
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use timecast_proto::{Message, TypeString};

/// Hash map keyed by service name or method path.
type NameMap<V> = rustc_hash::FxHashMap<Box<str>, V>;

/// Priority queue of pending frames, earliest deadline first.
type Schedule = priority_queue::PriorityQueue<Pending, cmp::Reverse<Deadline>, FxBuildHasher>;

/// Default rate at which a [`Poller`] polls the bus.
pub const DEFAULT_POLL_RATE_HZ: num::NonZeroU32 = num::NonZeroU32::new(100).unwrap();

/// A frame waiting for its delivery time.
///
/// Identity is the send sequence number alone, the frame itself doesn't
/// participate in hashing or comparisons.
#[derive(Debug)]
struct Pending {
    seq: u64,
    frame: Box<[u8]>,
}

impl PartialEq for Pending {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Pending {}

impl hash::Hash for Pending {
    #[inline(always)]
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.seq.hash(state);
    }
}

/// Delivery order key: time first, then send order.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    time: f64,
    seq: u64,
}

impl PartialEq for Deadline {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    #[inline(always)]
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    #[inline(always)]
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.seq.cmp(&other.seq))
    }
}

struct Method {
    typestring: TypeString,
    handler: Handler,
}

/// A message bus connecting endpoints of the local process.
///
/// See the [module documentation](self) for the delivery contract.
pub struct LocalBus {
    peer_name: Box<str>,
    clock: Box<dyn Clock>,
    synchronized: atomic::AtomicBool,
    services: Mutex<NameMap<num::NonZeroUsize>>,
    methods: Mutex<NameMap<Arc<Method>>>,
    schedule: Mutex<Schedule>,
    next_seq: atomic::AtomicU64,
}

impl LocalBus {
    /// Creates a bus for the local peer `peer_name`, reading time from `clock`.
    ///
    /// The clock starts out unsynchronized, see
    /// [`set_synchronized`](Self::set_synchronized).
    pub fn new(peer_name: &str, clock: impl Clock + 'static) -> Self {
        Self {
            peer_name: peer_name.into(),
            clock: Box::new(clock),
            synchronized: atomic::AtomicBool::new(false),
            services: Mutex::new(NameMap::default()),
            methods: Mutex::new(NameMap::default()),
            schedule: Mutex::new(Schedule::with_hasher(FxBuildHasher)),
            next_seq: atomic::AtomicU64::new(0),
        }
    }

    /// Marks the local clock as synchronized (or not) with the bus's global
    /// clock. Local services report [`ServiceStatus::Local`] once synchronized.
    #[inline(always)]
    pub fn set_synchronized(&self, synchronized: bool) {
        self.synchronized
            .store(synchronized, atomic::Ordering::Release);
    }

    #[inline(always)]
    pub fn is_synchronized(&self) -> bool {
        self.synchronized.load(atomic::Ordering::Acquire)
    }

    /// Returns the number of messages waiting for delivery.
    #[inline(always)]
    pub fn pending(&self) -> usize {
        self.schedule.lock().len()
    }

    /// Returns the delivery time of the next pending message, if any.
    ///
    /// Immediate messages report the time they were sent at.
    #[inline(always)]
    pub fn next_deadline(&self) -> Option<f64> {
        self.schedule
            .lock()
            .peek()
            .map(|(_, cmp::Reverse(deadline))| deadline.time)
    }

    /// Delivers every message that is due, returning how many were handed to
    /// a handler.
    ///
    /// Messages to unknown methods, or whose arguments don't match the
    /// method's typestring, are dropped.
    pub fn poll(&self) -> usize {
        let now = self.now();

        self.take_due(now)
            .iter()
            .filter(|frame| self.dispatch(frame))
            .count()
    }

    /// Keeps polling until no message is due anymore.
    ///
    /// Useful when handlers send messages of their own.
    pub fn drain(&self) -> usize {
        let mut total = 0;

        loop {
            match self.poll() {
                0 if !self.has_due() => return total,
                n => total += n,
            }
        }
    }

    /// Spawns a [`Poller`] driving this bus `rate_hz` times per second.
    #[inline(always)]
    pub fn spawn_poller(self: &Arc<Self>, rate_hz: num::NonZeroU32) -> std::io::Result<Poller> {
        Poller::spawn(Arc::clone(self), rate_hz)
    }

    fn has_due(&self) -> bool {
        let now = self.now();
        self.next_deadline().is_some_and(|deadline| deadline <= now)
    }

    /// Pops all frames due at `now`, in delivery order.
    fn take_due(&self, now: f64) -> Vec<Box<[u8]>> {
        let mut schedule = self.schedule.lock();
        let mut due = Vec::new();

        while let Some((_, cmp::Reverse(deadline))) = schedule.peek() {
            if deadline.time > now {
                break;
            }

            if let Some((pending, _)) = schedule.pop() {
                due.push(pending.frame);
            }
        }

        due
    }

    fn dispatch(&self, frame: &[u8]) -> bool {
        let message = match crate::message_decode(frame) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("dropping undecodable frame: {e}");
                return false;
            }
        };

        // clone the method out, so the table isn't locked while the handler runs
        let Some(method) = self.methods.lock().get(&*message.path).cloned() else {
            log::warn!("no method at {}, dropping message", message.path);
            return false;
        };

        if !method.typestring.matches(&message.args) {
            log::warn!(
                "{} expects \"{}\", dropping message with \"{}\"",
                message.path,
                method.typestring,
                message.typestring(),
            );
            return false;
        }

        (method.handler)(&message);
        true
    }
}

impl Bus for LocalBus {
    #[inline(always)]
    fn now(&self) -> f64 {
        self.clock.now()
    }

    #[inline(always)]
    fn peer_name(&self) -> &str {
        &self.peer_name
    }

    fn status(&self, service: &str) -> ServiceStatus {
        if !self.services.lock().contains_key(service) {
            ServiceStatus::Fail
        } else if self.is_synchronized() {
            ServiceStatus::Local
        } else {
            ServiceStatus::LocalNoTime
        }
    }

    fn acquire_service(&self, service: &str) -> Result<(), BusError> {
        let mut services = self.services.lock();

        match services.get_mut(service) {
            Some(count) => *count = count.saturating_add(1),
            None => {
                services.insert(service.into(), num::NonZeroUsize::MIN);
                log::debug!("service {service} is now provided by {}", self.peer_name);
            }
        }

        Ok(())
    }

    fn release_service(&self, service: &str) {
        let mut services = self.services.lock();

        let Some(count) = services.get_mut(service) else {
            return;
        };

        match num::NonZeroUsize::new(count.get() - 1) {
            Some(remaining) => *count = remaining,
            None => {
                services.remove(service);
                log::debug!("service {service} removed");
            }
        }
    }

    fn add_method(
        &self,
        path: &str,
        typestring: TypeString,
        handler: Handler,
    ) -> Result<(), BusError> {
        let mut methods = self.methods.lock();

        if methods.contains_key(path) {
            return Err(BusError::MethodExists(path.into()));
        }

        methods.insert(
            path.into(),
            Arc::new(Method {
                typestring,
                handler,
            }),
        );

        Ok(())
    }

    fn remove_method(&self, path: &str) {
        self.methods.lock().remove(path);
    }

    fn send(&self, message: &Message<'_>) -> Result<(), BusError> {
        let frame = crate::message_encode(message)?.into_boxed_slice();
        let seq = self.next_seq.fetch_add(1, atomic::Ordering::Relaxed);

        // never ahead of a message that was already due
        let time = if message.is_immediate() {
            self.now()
        } else {
            message.timestamp
        };

        self.schedule
            .lock()
            .push(Pending { seq, frame }, cmp::Reverse(Deadline { time, seq }));

        Ok(())
    }
}

impl core::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LocalBus")
            .field("peer_name", &self.peer_name)
            .field("synchronized", &self.is_synchronized())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// A background thread polling a [`LocalBus`] at a fixed rate.
///
/// The thread is stopped and joined when the poller is dropped.
#[derive(Debug)]
pub struct Poller {
    stop: Arc<atomic::AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl Poller {
    pub fn spawn(bus: Arc<LocalBus>, rate_hz: num::NonZeroU32) -> std::io::Result<Self> {
        let stop = Arc::new(atomic::AtomicBool::new(false));
        let period = core::time::Duration::from_secs(1) / rate_hz.get();

        let worker = std::thread::Builder::new()
            .name(format!("{}-poll", bus.peer_name()))
            .spawn({
                let stop = Arc::clone(&stop);
                move || {
                    while !stop.load(atomic::Ordering::Acquire) {
                        bus.poll();
                        std::thread::sleep(period);
                    }
                }
            })?;

        Ok(Self {
            stop,
            worker: Some(worker),
        })
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop.store(true, atomic::Ordering::Release);

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("bus poller panicked");
            }
        }
    }
}
