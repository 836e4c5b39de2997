//! The transmitting endpoint.
//!
//! A [`Transmitter`] owns one stream. Its samples are laid out on a timeline
//! starting at its stream time, and every block is scheduled for delivery a
//! little ahead ([`transmit_ahead`](TransmitterConfig::transmit_ahead)) of the
//! time it is meant to be heard, leaving the receiver room to mix it in
//! before the consumer gets there.

use crate::{Result, Sample, StreamId, TransmitterConfig, wire::StreamMessage};
use core::num;
use std::{borrow::Cow, sync::Arc};
use timecast_bus::{Bus, BusError, Client};

pub struct Transmitter<B: Bus> {
    client: Client<B>,
    id: StreamId,
    config: TransmitterConfig,
    max_chunk: num::NonZeroUsize,
    sample_rate: f64,
    // stream time of sample 0, and samples sent since
    time: f64,
    sample_counter: u64,
    // delivery timestamp of the latest message sent
    last_deadline: f64,
    has_time: bool,
    announced: bool,
    closed: bool,
}

impl<B: Bus> Transmitter<B> {
    /// Creates a transmitter sending to the receiver at `<service>/<endpoint>`.
    ///
    /// Nothing is sent until the first call to
    /// [`set_stream_time`](Self::set_stream_time) or [`push`](Self::push).
    pub fn new(
        bus: Arc<B>,
        service: &str,
        endpoint: &str,
        config: &TransmitterConfig,
    ) -> Result<Self> {
        config.validate()?;

        let client = Client::new(bus, &format!("{service}/{endpoint}"))?;
        let id = StreamId::random();

        log::debug!("stream {id} will transmit to {}", client.address());

        Ok(Self {
            client,
            id,
            config: *config,
            max_chunk: config.max_chunk(),
            sample_rate: f64::from(config.sample_rate.get()),
            time: 0.,
            sample_counter: 0,
            last_deadline: 0.,
            has_time: false,
            announced: false,
            closed: false,
        })
    }

    #[inline(always)]
    pub fn id(&self) -> StreamId {
        self.id
    }

    #[inline(always)]
    pub fn address(&self) -> &str {
        self.client.address()
    }

    #[inline(always)]
    pub fn config(&self) -> &TransmitterConfig {
        &self.config
    }

    #[inline(always)]
    pub fn has_time(&self) -> bool {
        self.has_time
    }

    #[inline(always)]
    pub fn sample_counter(&self) -> u64 {
        self.sample_counter
    }

    /// Stream time of the next sample to be pushed.
    #[inline(always)]
    pub fn stream_time(&self) -> f64 {
        self.time + self.sample_counter as f64 / self.sample_rate
    }

    #[inline(always)]
    pub fn set_transmit_ahead(&mut self, secs: f64) {
        self.config.transmit_ahead = secs;
    }

    /// Blocks until the bus clock is synchronized for the receiver's service,
    /// then starts the stream at the current time.
    ///
    /// Returns immediately once the transmitter has a time.
    pub fn wait_for_sync(&mut self) {
        if self.has_time {
            return;
        }

        if !self.client.status().is_synchronized() {
            log::debug!("stream {}: waiting for clock sync", self.id);

            while !self.client.status().is_synchronized() {
                std::thread::sleep(self.config.sync_poll_interval);
            }
        }

        self.has_time = true;
        self.time = self.client.bus().now();
        self.sample_counter = 0;

        log::debug!("stream {}: synchronized at {}s", self.id, self.time);
    }

    /// Restarts the stream at `time`: the next sample pushed is meant to be
    /// heard at `time`.
    pub fn set_stream_time(&mut self, time: f64) -> Result<(), BusError> {
        self.wait_for_sync();

        self.time = time;
        self.sample_counter = 0;
        self.announce()
    }

    /// Sends `samples`, split into messages of at most
    /// [`max_chunk`](TransmitterConfig::max_chunk) samples, and returns how
    /// many were sent.
    ///
    /// The stream is announced to the receiver first if needed.
    ///
    /// If sending fails partway through, the chunks sent before the failure
    /// stay counted in [`sample_counter`](Self::sample_counter), and the
    /// next push continues after them.
    pub fn push(&mut self, samples: &[Sample]) -> Result<usize, BusError> {
        if samples.is_empty() {
            return Ok(0);
        }

        self.wait_for_sync();

        if !self.announced {
            self.announce()?;
        }

        for chunk in samples.chunks(self.max_chunk.get()) {
            let timestamp = self.deadline(self.stream_time());

            self.send(
                timestamp,
                &StreamMessage::Push {
                    id: self.id,
                    samples: Cow::Borrowed(chunk),
                },
            )?;

            self.sample_counter += chunk.len() as u64;
        }

        Ok(samples.len())
    }

    /// Ends the stream, once its last pushed sample has been heard.
    ///
    /// Does nothing if the stream was never announced, or is already closed.
    /// Pushing again reopens it.
    pub fn close(&mut self) -> Result<(), BusError> {
        if !self.announced || self.closed {
            return Ok(());
        }

        let end = self.stream_time();
        let timestamp = if end > self.client.bus().now() { end } else { 0. };

        let id = self.id;
        self.send(timestamp, &StreamMessage::Close { id })?;

        self.closed = true;
        self.announced = false;

        log::debug!("stream {} closed at {end}s", self.id);
        Ok(())
    }

    /// Sends `sync` for the current stream time.
    fn announce(&mut self) -> Result<(), BusError> {
        let time = self.stream_time();
        let (id, timestamp) = (self.id, self.deadline(time));

        self.send(timestamp, &StreamMessage::Sync { id, time })?;

        self.announced = true;
        self.closed = false;
        Ok(())
    }

    /// Delivery timestamp for content meant to be heard at `stream_time`.
    ///
    /// `0.0` (immediately) when too close to, or behind, the current time.
    fn deadline(&self, stream_time: f64) -> f64 {
        let target = stream_time - self.config.transmit_ahead;

        if target < self.client.bus().now() + self.config.immediate_cutoff {
            0.
        } else {
            target
        }
    }

    /// Sends `message`, scheduled no sooner than a previous message still
    /// waiting for its delivery time.
    ///
    /// The bus delivers by timestamp, and the receiver places blocks in the
    /// order they arrive.
    fn send(&mut self, timestamp: f64, message: &StreamMessage<'_>) -> Result<(), BusError> {
        let timestamp = if self.last_deadline > self.client.bus().now() {
            timestamp.max(self.last_deadline)
        } else {
            timestamp
        };

        self.client
            .send(timestamp, message.method().name(), message.to_args())?;

        self.last_deadline = timestamp;
        Ok(())
    }
}

impl<B: Bus> Drop for Transmitter<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("stream {}: failed to close: {e}", self.id);
        }
    }
}

impl<B: Bus> core::fmt::Debug for Transmitter<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transmitter")
            .field("id", &self.id)
            .field("address", &self.client.address())
            .field("time", &self.time)
            .field("sample_counter", &self.sample_counter)
            .field("announced", &self.announced)
            .finish_non_exhaustive()
    }
}
