//! The receiver's mixing core.
//!
//! A [`MixingBuffer`] gathers the blocks of every stream addressing one
//! receiver endpoint into a single [`MixRing`], each block landing at the
//! position its stream's timeline assigns to it. It is fed by the three
//! stream events ([`sync`](MixingBuffer::sync), [`push`](MixingBuffer::push)
//! and [`close`](MixingBuffer::close)), usually from bus delivery threads,
//! and drained by one consumer, usually a real-time audio callback.
//!
//! The consumer's view is bounded by the slowest stream: only samples every
//! open stream has written past are [`available`](MixingBuffer::available).
//! When a stream stalls, the consumer may skip ahead with
//! [`gap`](MixingBuffer::gap).

use crate::{
    ConfigError, ReceiverConfig, Sample, StreamId,
    ring::{MixRing, Summation},
    timeline::Timeline,
    wire::StreamMessage,
};
use core::num;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// A stream's position on the receiver's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamState {
    pub id: StreamId,
    /// Absolute index of the stream's next sample.
    pub sample_count: u64,
}

/// The outcome of a [`pull`](MixingBuffer::pull) or a
/// [`discard`](MixingBuffer::discard).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pulled {
    pub frames: usize,
    /// Global time of the first frame, if the timeline is anchored.
    pub start_time: Option<f64>,
}

#[derive(Debug)]
struct BufferState {
    streams: FxHashMap<StreamId, StreamState>,
    ring: MixRing,
    timeline: Timeline,
}

impl BufferState {
    fn available(&self) -> usize {
        let read_head = self.ring.read_head();
        let capacity = self.ring.capacity();

        self.streams
            .values()
            .map(|stream| stream.sample_count.saturating_sub(read_head))
            .min()
            .map_or(capacity, |ahead| {
                usize::try_from(ahead).map_or(capacity, |ahead| ahead.min(capacity))
            })
    }

    #[inline(always)]
    fn start_time(&self) -> Option<f64> {
        self.timeline.time_of(self.ring.read_head())
    }
}

/// A thread-safe, multi-stream mixing ring buffer.
#[derive(Debug)]
pub struct MixingBuffer {
    state: Mutex<BufferState>,
    sample_rate: num::NonZeroU32,
}

impl MixingBuffer {
    pub fn new(config: &ReceiverConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            state: Mutex::new(BufferState {
                streams: FxHashMap::default(),
                ring: MixRing::new(config.capacity()),
                timeline: Timeline::new(config.sample_rate),
            }),
            sample_rate: config.sample_rate,
        })
    }

    #[inline(always)]
    pub fn sample_rate(&self) -> num::NonZeroU32 {
        self.sample_rate
    }

    /// Always `1`, one buffer carrying one channel.
    #[inline(always)]
    pub const fn num_channels(&self) -> usize {
        1
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.state.lock().ring.capacity()
    }

    #[inline(always)]
    pub fn read_head(&self) -> u64 {
        self.state.lock().ring.read_head()
    }

    /// Global time of sample index `0`, once a stream anchored the timeline.
    #[inline(always)]
    pub fn reference(&self) -> Option<f64> {
        self.state.lock().timeline.reference()
    }

    /// Number of frames every open stream has written. The full capacity when
    /// no stream is open.
    #[inline(always)]
    pub fn available(&self) -> usize {
        self.state.lock().available()
    }

    /// Returns whether no stream is open.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.state.lock().streams.is_empty()
    }

    /// Returns whether at least one stream is open.
    #[inline(always)]
    pub fn is_connected(&self) -> bool {
        !self.is_empty()
    }

    #[inline(always)]
    pub fn stream_count(&self) -> usize {
        self.state.lock().streams.len()
    }

    #[inline(always)]
    pub fn stream(&self, id: StreamId) -> Option<StreamState> {
        self.state.lock().streams.get(&id).copied()
    }

    /// Snapshot of the open streams, in no particular order.
    pub fn streams(&self) -> Vec<StreamState> {
        self.state.lock().streams.values().copied().collect()
    }

    /// Moves up to `max_frames` frames into every `stride`-th element of `out`.
    ///
    /// Never reads past what is [`available`](Self::available), nor past
    /// what `out` can hold. Read slots are left silent.
    pub fn pull(&self, out: &mut [Sample], max_frames: usize, stride: num::NonZeroUsize) -> Pulled {
        let mut state = self.state.lock();

        let start_time = state.start_time();
        let frames = max_frames.min(state.available());

        Pulled {
            frames: state.ring.read(out, frames, stride),
            start_time,
        }
    }

    /// Like [`pull`](Self::pull), dropping the frames instead.
    pub fn discard(&self, max_frames: usize) -> Pulled {
        let mut state = self.state.lock();

        let start_time = state.start_time();
        let frames = max_frames.min(state.available());
        state.ring.release(frames as u64);

        Pulled { frames, start_time }
    }

    /// Skips `frames` frames, whether they are available or not.
    pub fn gap(&self, frames: u64) {
        self.state.lock().ring.release(frames);
    }

    /// Anchors the timeline, making the current read head happen at `time`.
    ///
    /// Does nothing if a stream already anchored it.
    pub fn set_stream_time(&self, time: f64) {
        let mut state = self.state.lock();
        let read_head = state.ring.read_head();

        if state.timeline.anchor(time, read_head) {
            log::debug!("timeline anchored at {time}s by the consumer");
        } else {
            log::debug!("timeline already anchored, ignoring stream time {time}s");
        }
    }

    /// Declares stream `id`, its first sample happening at `time`.
    ///
    /// The first stream to do so anchors the timeline at the current read
    /// head. Declaring an open stream again realigns it.
    pub fn sync(&self, id: StreamId, time: f64) {
        let mut state = self.state.lock();
        let BufferState {
            streams,
            ring,
            timeline,
        } = &mut *state;

        let read_head = ring.read_head();

        let sample_count = if timeline.anchor(time, read_head) {
            log::debug!("timeline anchored at {time}s by stream {id}");
            read_head
        } else {
            timeline.index_of(time).unwrap_or(read_head)
        };

        let stream = StreamState { id, sample_count };

        match streams.insert(id, stream) {
            Some(previous) => log::debug!(
                "stream {id} realigned from {} to {sample_count}",
                previous.sample_count,
            ),
            None => log::debug!("stream {id} opened at {sample_count}"),
        }
    }

    /// Mixes the next block of stream `id`.
    ///
    /// Blocks of unknown streams are mixed as if the stream had been
    /// declared at index `0`.
    pub fn push(&self, id: StreamId, samples: &[Sample]) -> Summation {
        let mut state = self.state.lock();
        let BufferState { streams, ring, .. } = &mut *state;

        let stream = streams.entry(id).or_insert_with(|| {
            log::debug!("push from undeclared stream {id}, opening it at 0");
            StreamState { id, sample_count: 0 }
        });

        let start = stream.sample_count;
        let outcome = ring.sum(&mut stream.sample_count, samples);

        if outcome.is_lossy() {
            log::trace!(
                "stream {id}: {outcome:?} writing {} samples at {start}, read head at {}",
                samples.len(),
                ring.read_head(),
            );
        }

        outcome
    }

    /// Forgets stream `id`, returning whether it was open. Mixed samples
    /// stay in the ring.
    pub fn close(&self, id: StreamId) -> bool {
        let closed = self.state.lock().streams.remove(&id).is_some();

        if closed {
            log::debug!("stream {id} closed");
        }

        closed
    }

    /// Applies a stream event.
    pub fn apply(&self, message: &StreamMessage<'_>) {
        match message {
            StreamMessage::Sync { id, time } => self.sync(*id, *time),
            StreamMessage::Push { id, samples } => {
                self.push(*id, samples);
            }
            StreamMessage::Close { id } => {
                self.close(*id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const KHZ: num::NonZeroU32 = num::NonZeroU32::new(1000).unwrap();
    const MONO: num::NonZeroUsize = num::NonZeroUsize::MIN;

    fn buffer(capacity: Option<usize>) -> MixingBuffer {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut config = ReceiverConfig::new(KHZ);
        config.capacity = capacity.and_then(num::NonZeroUsize::new);
        MixingBuffer::new(&config).unwrap()
    }

    fn pull(buffer: &MixingBuffer, frames: usize) -> (Vec<Sample>, Pulled) {
        let mut out = vec![Sample::NAN; frames];
        let pulled = buffer.pull(&mut out, frames, MONO);
        out.truncate(pulled.frames);
        (out, pulled)
    }

    #[test]
    fn first_sync_anchors_the_timeline() {
        let buffer = buffer(Some(1000));

        buffer.sync(StreamId(1), 10.);
        buffer.sync(StreamId(2), 10.1);

        assert_eq!(buffer.reference(), Some(10.));
        assert_eq!(buffer.stream(StreamId(1)).unwrap().sample_count, 0);
        assert_eq!(buffer.stream(StreamId(2)).unwrap().sample_count, 100);
    }

    #[test]
    fn exact_fill() {
        let buffer = buffer(None);
        buffer.sync(StreamId(1), 0.);
        buffer.push(StreamId(1), &[1.; 1000]);

        assert_eq!(buffer.available(), 1000);

        let (out, pulled) = pull(&buffer, 1000);
        assert_eq!(pulled.frames, 1000);
        assert!(out.iter().all(|&s| s == 1.));
        assert_eq!(buffer.available(), 0);
    }

    #[test]
    fn aligned_streams_mix() {
        let buffer = buffer(Some(8));
        buffer.sync(StreamId(1), 3.);
        buffer.sync(StreamId(2), 3.);

        buffer.push(StreamId(1), &[1.; 4]);
        buffer.push(StreamId(2), &[2.; 4]);

        let (out, pulled) = pull(&buffer, 4);
        assert_eq!(out, [3.; 4]);
        assert_eq!(pulled.start_time, Some(3.));
    }

    #[test]
    fn late_joiners_are_placed_on_the_timeline() {
        let buffer = buffer(None);
        buffer.sync(StreamId(1), 1.);
        buffer.push(StreamId(1), &[1.; 8]);

        // starts 3 samples in
        buffer.sync(StreamId(2), 1.003);
        buffer.push(StreamId(2), &[10.; 5]);

        let (out, _) = pull(&buffer, 8);
        assert_eq!(out, [1., 1., 1., 11., 11., 11., 11., 11.]);
    }

    #[test]
    fn slowest_stream_bounds_availability() {
        let buffer = buffer(Some(8));
        assert_eq!(buffer.available(), 8);
        assert!(buffer.is_empty());

        buffer.sync(StreamId(1), 0.);
        buffer.sync(StreamId(2), 0.);
        assert!(buffer.is_connected());
        assert_eq!(buffer.available(), 0);

        buffer.push(StreamId(1), &[1.; 5]);
        buffer.push(StreamId(2), &[1.; 3]);
        assert_eq!(buffer.available(), 3);

        // far ahead, still bounded by the capacity
        buffer.push(StreamId(2), &[1.; 20]);
        assert_eq!(buffer.available(), 5);
        buffer.push(StreamId(1), &[1.; 20]);
        assert_eq!(buffer.available(), 8);

        let mut streams = buffer.streams();
        streams.sort_by_key(|stream| stream.id.0);
        assert_eq!(streams, [
            StreamState {
                id: StreamId(1),
                sample_count: 25
            },
            StreamState {
                id: StreamId(2),
                sample_count: 23
            },
        ]);
    }

    #[test]
    fn discarding_reduces_availability() {
        let buffer = buffer(None);
        buffer.sync(StreamId(1), 2.);
        buffer.push(StreamId(1), &[0.5; 10]);

        let pulled = buffer.discard(4);
        assert_eq!(pulled.frames, 4);
        assert_eq!(pulled.start_time, Some(2.));
        assert_eq!(buffer.available(), 6);

        let pulled = buffer.discard(100);
        assert_eq!(pulled.frames, 6);
        assert_relative_eq!(pulled.start_time.unwrap(), 2.004);
        assert_eq!(buffer.available(), 0);
        assert_eq!(buffer.read_head(), 10);
    }

    #[test]
    fn gaps_skip_unavailable_frames() {
        let buffer = buffer(Some(8));
        buffer.sync(StreamId(1), 0.);
        buffer.push(StreamId(1), &[1.; 3]);

        buffer.gap(5);
        assert_eq!(buffer.read_head(), 5);
        assert_eq!(buffer.available(), 0);

        // the stream is now behind, its next block is trimmed
        assert_eq!(
            buffer.push(StreamId(1), &[2.; 4]),
            Summation::PartiallyOld { late: 2 }
        );
        let (out, _) = pull(&buffer, 8);
        assert_eq!(out, [2., 2.]);
    }

    #[test]
    fn consumed_frames_are_gone() {
        let buffer = buffer(Some(8));
        buffer.sync(StreamId(1), 0.);
        buffer.push(StreamId(1), &[1., 2., 3.]);

        assert_eq!(pull(&buffer, 8).0, [1., 2., 3.]);
        assert_eq!(pull(&buffer, 8).1.frames, 0);

        // a lap later, the same slots hold only the new block
        buffer.push(StreamId(1), &[0.; 5]);
        pull(&buffer, 5);
        buffer.push(StreamId(1), &[4., 4., 4.]);
        assert_eq!(pull(&buffer, 8).0, [4., 4., 4.]);
        assert_eq!(buffer.read_head(), 11);
    }

    #[test]
    fn closing_keeps_mixed_samples() {
        let buffer = buffer(Some(8));
        buffer.sync(StreamId(1), 0.);
        buffer.sync(StreamId(2), 0.);
        buffer.push(StreamId(1), &[1.; 4]);

        assert!(buffer.close(StreamId(2)));
        assert!(!buffer.close(StreamId(2)));
        assert_eq!(buffer.stream_count(), 1);

        assert_eq!(pull(&buffer, 4).0, [1.; 4]);

        assert!(buffer.close(StreamId(1)));
        assert!(buffer.is_empty());
        assert_eq!(buffer.read_head(), 4);
    }

    #[test]
    fn undeclared_streams_start_at_zero() {
        let buffer = buffer(Some(8));
        assert_eq!(buffer.push(StreamId(9), &[1., 1.]), Summation::Mixed);

        assert_eq!(
            buffer.stream(StreamId(9)),
            Some(StreamState {
                id: StreamId(9),
                sample_count: 2
            })
        );
        assert_eq!(pull(&buffer, 8).1, Pulled {
            frames: 2,
            start_time: None
        });
    }

    #[test]
    fn consumer_anchoring_respects_the_read_head() {
        let buffer = buffer(None);
        buffer.gap(500);

        buffer.set_stream_time(5.);
        assert_relative_eq!(buffer.reference().unwrap(), 4.5);

        // write-once
        buffer.set_stream_time(8.);
        buffer.sync(StreamId(1), 9.);
        assert_relative_eq!(buffer.reference().unwrap(), 4.5);
        assert_eq!(buffer.stream(StreamId(1)).unwrap().sample_count, 4500);
    }

    #[test]
    fn streams_anchor_at_the_read_head() {
        let buffer = buffer(None);
        buffer.gap(250);

        buffer.sync(StreamId(1), 3.);
        assert_eq!(buffer.stream(StreamId(1)).unwrap().sample_count, 250);
        assert_relative_eq!(buffer.reference().unwrap(), 2.75);
    }

    #[test]
    fn syncs_in_the_past_clamp_to_zero() {
        let buffer = buffer(None);
        buffer.sync(StreamId(1), 10.);
        buffer.sync(StreamId(2), 9.);

        assert_eq!(buffer.stream(StreamId(2)).unwrap().sample_count, 0);
    }

    #[test]
    fn events_apply() {
        let buffer = buffer(Some(8));

        buffer.apply(&StreamMessage::Sync {
            id: StreamId(4),
            time: 1.,
        });
        buffer.apply(&StreamMessage::Push {
            id: StreamId(4),
            samples: vec![0.25; 2].into(),
        });
        assert_eq!(buffer.available(), 2);

        buffer.apply(&StreamMessage::Close { id: StreamId(4) });
        assert!(buffer.is_empty());
    }

    #[test]
    fn far_away_positions_are_dropped_quietly() {
        let buffer = buffer(Some(8));
        buffer.sync(StreamId(1), 0.);

        // lands past the end of the timeline
        buffer.sync(StreamId(2), 1e300);
        assert_eq!(buffer.stream(StreamId(2)).unwrap().sample_count, u64::MAX);
        assert_eq!(buffer.push(StreamId(2), &[1.; 4]), Summation::EntirelyNew);

        buffer.gap(u64::MAX - 10);
        assert_eq!(buffer.push(StreamId(1), &[1.; 4]), Summation::EntirelyOld);

        buffer.gap(u64::MAX);
        assert_eq!(buffer.read_head(), u64::MAX);
        assert_eq!(
            buffer.push(StreamId(2), &[1.; 4]),
            Summation::PartiallyNew { late: 0, early: 4 }
        );
        assert_eq!(buffer.available(), 0);
    }

    #[test]
    fn concurrent_producers() {
        let buffer = buffer(None);
        let ids: Vec<_> = (0..4).map(StreamId).collect();

        for &id in &ids {
            buffer.sync(id, 0.);
        }

        std::thread::scope(|s| {
            for &id in &ids {
                let buffer = &buffer;
                s.spawn(move || {
                    for _ in 0..100 {
                        buffer.push(id, &[1.; 10]);
                    }
                });
            }
        });

        let (out, pulled) = pull(&buffer, 2000);
        assert_eq!(pulled.frames, 1000);
        assert!(out.iter().all(|&s| s == 4.));
    }

    #[test]
    fn pulls_never_see_half_a_push() {
        let buffer = buffer(None);
        let ids: Vec<_> = (1..=4).map(StreamId).collect();

        for &id in &ids {
            buffer.sync(id, 0.);
        }

        std::thread::scope(|s| {
            for &id in &ids {
                let buffer = &buffer;
                s.spawn(move || {
                    for _ in 0..100 {
                        buffer.push(id, &[id.0 as Sample; 10]);
                    }
                });
            }

            let mut out = [Sample::NAN; 64];
            let mut total = 0;

            while total < 1000 {
                let frames = buffer.pull(&mut out, 64, MONO).frames;
                assert!(out[..frames].iter().all(|&s| s == 10.), "{:?}", &out[..frames]);
                total += frames;
            }

            assert_eq!(buffer.read_head(), 1000);
        });
    }
}
