//! The receiving endpoint.

use crate::{
    MixingBuffer, Pulled, ReceiverConfig, Result, Sample,
    wire::{Method, StreamMessage},
};
use core::num;
use std::sync::Arc;
use timecast_bus::{Bus, Service};

/// Receives streams addressed to `<service>/<endpoint>`, mixing them into a
/// [`MixingBuffer`].
///
/// The endpoint's methods stay implemented for as long as the receiver
/// lives. Several receivers may share a service, as long as their endpoints
/// differ (e.g. one endpoint per channel).
pub struct Receiver<B: Bus> {
    buffer: Arc<MixingBuffer>,
    service: Service<B>,
    endpoint: Box<str>,
}

impl<B: Bus> Receiver<B> {
    pub fn new(bus: Arc<B>, service: &str, endpoint: &str, config: &ReceiverConfig) -> Result<Self> {
        let buffer = Arc::new(MixingBuffer::new(config)?);
        let mut service = Service::provide(bus, service)?;

        for method in Method::ALL {
            let path = format!("{endpoint}/{method}");
            let buffer = Arc::clone(&buffer);

            service.implement(&path, method.typestring(), move |message| {
                match StreamMessage::decode(method, &message.args) {
                    Ok(event) => {
                        log::trace!("{method} for stream {}", event.id());
                        buffer.apply(&event)
                    }
                    Err(e) => log::warn!("ignoring call to {}: {e}", message.path),
                }
            })?;
        }

        log::debug!(
            "receiving at {}/{endpoint}, {} Hz, {} samples",
            service.name(),
            config.sample_rate,
            buffer.capacity(),
        );

        Ok(Self {
            buffer,
            service,
            endpoint: endpoint.into(),
        })
    }

    /// The mixing buffer, for consumers that outlive the bus registration or
    /// feed it directly.
    #[inline(always)]
    pub fn buffer(&self) -> &Arc<MixingBuffer> {
        &self.buffer
    }

    #[inline(always)]
    pub fn service(&self) -> &str {
        self.service.name()
    }

    #[inline(always)]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Address transmitters send to, `<service>/<endpoint>`.
    #[inline]
    pub fn address(&self) -> String {
        format!("{}/{}", self.service.name(), self.endpoint)
    }

    #[inline(always)]
    pub fn bus(&self) -> &Arc<B> {
        self.service.bus()
    }

    /// See [`MixingBuffer::pull`].
    #[inline(always)]
    pub fn pull(&self, out: &mut [Sample], max_frames: usize, stride: num::NonZeroUsize) -> Pulled {
        self.buffer.pull(out, max_frames, stride)
    }

    /// See [`MixingBuffer::discard`].
    #[inline(always)]
    pub fn discard(&self, max_frames: usize) -> Pulled {
        self.buffer.discard(max_frames)
    }

    #[inline(always)]
    pub fn gap(&self, frames: u64) {
        self.buffer.gap(frames)
    }

    #[inline(always)]
    pub fn available(&self) -> usize {
        self.buffer.available()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline(always)]
    pub fn is_connected(&self) -> bool {
        self.buffer.is_connected()
    }

    #[inline(always)]
    pub fn set_stream_time(&self, time: f64) {
        self.buffer.set_stream_time(time)
    }

    #[inline(always)]
    pub fn sample_rate(&self) -> num::NonZeroU32 {
        self.buffer.sample_rate()
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    #[inline(always)]
    pub fn read_head(&self) -> u64 {
        self.buffer.read_head()
    }

    #[inline(always)]
    pub fn stream_count(&self) -> usize {
        self.buffer.stream_count()
    }

    #[inline(always)]
    pub const fn num_channels(&self) -> usize {
        1
    }
}

impl<B: Bus> core::fmt::Debug for Receiver<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Receiver")
            .field("service", &self.service)
            .field("endpoint", &self.endpoint)
            .field("buffer", &self.buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, StreamId};
    use timecast_bus::{
        BusError, Client, LocalBus, ManualClock, ServiceStatus,
        proto::{Arg, TypeString},
    };

    const KHZ: num::NonZeroU32 = num::NonZeroU32::new(1000).unwrap();

    fn local_bus() -> Arc<LocalBus> {
        let _ = env_logger::builder().is_test(true).try_init();
        Arc::new(LocalBus::new("rx-test", ManualClock::new(1.)))
    }

    fn receiver(bus: &Arc<LocalBus>, endpoint: &str) -> Receiver<LocalBus> {
        let config = ReceiverConfig::new(KHZ).with_capacity(num::NonZeroUsize::new(64).unwrap());
        Receiver::new(Arc::clone(bus), "mixer", endpoint, &config).unwrap()
    }

    #[test]
    fn endpoint_methods_are_implemented() {
        let bus = local_bus();
        let rx = receiver(&bus, "0");

        assert_eq!(rx.address(), "mixer/0");
        assert_eq!(bus.status("mixer"), ServiceStatus::LocalNoTime);
        assert_eq!(rx.capacity(), 64);
        assert_eq!(rx.num_channels(), 1);

        // sanity check of the typestrings the methods were declared with
        for method in Method::ALL {
            assert!(TypeString::parse(method.typestring()).is_ok());
        }
    }

    #[test]
    fn bus_calls_reach_the_buffer() {
        let bus = local_bus();
        let rx = receiver(&bus, "0");
        let client = Client::new(Arc::clone(&bus), "mixer/0").unwrap();

        let id = StreamId(5);
        for message in [
            StreamMessage::Sync { id, time: 1. },
            StreamMessage::Push {
                id,
                samples: vec![0.5; 4].into(),
            },
        ] {
            client
                .send(0., message.method().name(), message.to_args())
                .unwrap();
        }

        assert_eq!(bus.poll(), 2);
        assert!(rx.is_connected());
        assert_eq!(rx.available(), 4);

        client.send(0., "close", vec![Arg::Int64(id.0)]).unwrap();
        bus.poll();
        assert!(rx.is_empty());

        let mut out = [0.; 4];
        let pulled = rx.pull(&mut out, 4, num::NonZeroUsize::MIN);
        assert_eq!(pulled.frames, 4);
        assert_eq!(out, [0.5; 4]);
    }

    #[test]
    fn endpoints_are_exclusive() {
        let bus = local_bus();
        let _rx = receiver(&bus, "0");
        let _other = receiver(&bus, "1");

        let config = ReceiverConfig::new(KHZ);
        let res = Receiver::new(Arc::clone(&bus), "mixer", "0", &config);
        assert!(matches!(res, Err(Error::Bus(BusError::MethodExists(_)))));

        // the failed attempt didn't take the existing methods down
        assert_eq!(bus.status("mixer"), ServiceStatus::LocalNoTime);
        Client::new(Arc::clone(&bus), "mixer/0")
            .unwrap()
            .send(0., "sync", vec![Arg::Int64(1), Arg::Time(1.)])
            .unwrap();
        assert_eq!(bus.poll(), 1);
    }

    #[test]
    fn dropping_unregisters() {
        let bus = local_bus();
        let rx = receiver(&bus, "0");
        let buffer = Arc::clone(rx.buffer());
        drop(rx);

        assert_eq!(bus.status("mixer"), ServiceStatus::Fail);

        Client::new(Arc::clone(&bus), "mixer/0")
            .unwrap()
            .send(0., "sync", vec![Arg::Int64(1), Arg::Time(1.)])
            .unwrap();
        assert_eq!(bus.poll(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn invalid_configurations_are_refused() {
        let bus = local_bus();
        let config = ReceiverConfig::new(KHZ).with_capacity(num::NonZeroUsize::MIN);

        let res = Receiver::new(Arc::clone(&bus), "mixer", "0", &config);
        assert!(matches!(res, Err(Error::Config(_))));
        assert_eq!(bus.status("mixer"), ServiceStatus::Fail);
    }
}
