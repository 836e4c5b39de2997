//! The mixing ring.
//!
//! Positions are absolute sample indices on the receiver's timeline, the
//! physical slot of index `i` being `i % capacity`. At any time, the ring
//! represents the window `[read_head, read_head + capacity)`, and writes are
//! accepted up to (excluding) the last index of that window, so that the
//! newest sample never lands on the slot about to be read.
//!
//! Writes are summed into the slots, and reads take each slot's value,
//! leaving silence behind for the next lap.

use crate::{SILENCE, Sample};
use core::{mem, num};

/// Where a block landed, relative to the ring's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Summation {
    /// The whole block was mixed.
    Mixed,
    /// The first `late` samples were behind the read head and dropped, the
    /// rest was mixed.
    PartiallyOld { late: usize },
    /// The last `early` samples were too far ahead of the read head and
    /// dropped. `late` samples at the front may also have been dropped.
    PartiallyNew { late: usize, early: usize },
    /// The whole block was behind the read head.
    EntirelyOld,
    /// The whole block was beyond the window.
    EntirelyNew,
}

impl Summation {
    /// Returns whether any sample was dropped.
    #[inline(always)]
    pub fn is_lossy(self) -> bool {
        self != Self::Mixed
    }
}

#[derive(Debug, Clone)]
pub struct MixRing {
    slots: Box<[Sample]>,
    read_head: u64,
}

impl MixRing {
    pub fn new(capacity: num::NonZeroUsize) -> Self {
        Self {
            slots: vec![SILENCE; capacity.get()].into_boxed_slice(),
            read_head: 0,
        }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Absolute index of the next sample to be read.
    #[inline(always)]
    pub fn read_head(&self) -> u64 {
        self.read_head
    }

    /// First absolute index outside the window.
    ///
    /// Indices saturate at `u64::MAX`, the window shrinking against it.
    #[inline(always)]
    pub fn limit(&self) -> u64 {
        self.read_head.saturating_add(self.capacity() as u64)
    }

    /// Physical slots, in storage order.
    #[inline(always)]
    pub fn as_slice(&self) -> &[Sample] {
        &self.slots
    }

    /// Sums `samples` into the ring, starting at the absolute index
    /// `write_head`.
    ///
    /// `write_head` always ends up advanced by `samples.len()`, including
    /// when some or all of the samples are dropped, so that the next block
    /// of the same stream stays aligned.
    pub fn sum(&mut self, write_head: &mut u64, samples: &[Sample]) -> Summation {
        let len = samples.len() as u64;
        let limit = self.limit();

        if write_head.saturating_add(len) < self.read_head {
            *write_head += len;
            return Summation::EntirelyOld;
        }

        if *write_head > limit {
            *write_head = write_head.saturating_add(len);
            return Summation::EntirelyNew;
        }

        // write_head + len >= read_head, so this is at most len
        let late = self.read_head.saturating_sub(*write_head) as usize;
        *write_head += late as u64;

        let mut remaining = &samples[late..];
        let capacity = self.capacity();
        let last = limit - 1;

        while !remaining.is_empty() {
            let room = last.saturating_sub(*write_head);

            if room == 0 {
                let early = remaining.len();
                *write_head = write_head.saturating_add(early as u64);
                return Summation::PartiallyNew { late, early };
            }

            let start = (*write_head % capacity as u64) as usize;
            let run = remaining
                .len()
                .min(capacity - start)
                .min(usize::try_from(room).unwrap_or(usize::MAX));

            let (block, rest) = remaining.split_at(run);

            for (slot, &sample) in self.slots[start..start + run].iter_mut().zip(block) {
                *slot += sample;
            }

            *write_head += run as u64;
            remaining = rest;
        }

        if late == 0 {
            Summation::Mixed
        } else {
            Summation::PartiallyOld { late }
        }
    }

    /// Moves up to `frames` samples out of the ring, into every `stride`-th
    /// element of `out`, and returns how many were moved.
    ///
    /// Fewer frames are read if `out` can't hold them, or if `frames`
    /// exceeds the capacity.
    pub fn read(&mut self, out: &mut [Sample], frames: usize, stride: num::NonZeroUsize) -> usize {
        let frames = frames
            .min(out.len().div_ceil(stride.get()))
            .min(self.capacity());

        for (slot, out) in self
            .lap_mut()
            .take(frames)
            .zip(out.iter_mut().step_by(stride.get()))
        {
            *out = mem::take(slot);
        }

        self.read_head = self.read_head.saturating_add(frames as u64);
        frames
    }

    /// Advances the read head by `frames`, silencing the slots left behind.
    pub fn release(&mut self, frames: u64) {
        let silenced = usize::try_from(frames).map_or(usize::MAX, |n| n.min(self.capacity()));

        self.lap_mut()
            .take(silenced)
            .for_each(|slot| *slot = SILENCE);

        self.read_head = self.read_head.saturating_add(frames);
    }

    /// Iterates over one lap of slots, starting at the read head.
    fn lap_mut(&mut self) -> impl Iterator<Item = &mut Sample> {
        let start = (self.read_head % self.capacity() as u64) as usize;
        let (wrapped, ahead) = self.slots.split_at_mut(start);
        ahead.iter_mut().chain(wrapped)
    }
}
