//! Mapping between global time and sample indices.

use core::num;

/// A receiver's stream timeline.
///
/// Unanchored until the first stream declares itself, the timeline is then
/// anchored once and for all: sample index `0` happens at the
/// [`reference`](Self::reference) time, and every later stream is placed
/// relative to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeline {
    reference: Option<f64>,
    sample_rate: f64,
}

impl Timeline {
    #[inline(always)]
    pub fn new(sample_rate: num::NonZeroU32) -> Self {
        Self {
            reference: None,
            sample_rate: f64::from(sample_rate.get()),
        }
    }

    /// Global time of sample index `0`, once anchored.
    #[inline(always)]
    pub fn reference(&self) -> Option<f64> {
        self.reference
    }

    #[inline(always)]
    pub fn is_anchored(&self) -> bool {
        self.reference.is_some()
    }

    #[inline(always)]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Anchors the timeline so that sample index `at` happens at `time`.
    ///
    /// Returns `false`, leaving the timeline untouched, if it was already
    /// anchored.
    #[inline]
    pub fn anchor(&mut self, time: f64, at: u64) -> bool {
        if self.is_anchored() {
            return false;
        }

        self.reference = Some(time - at as f64 / self.sample_rate);
        true
    }

    /// Sample index happening at `time`, to the nearest sample.
    ///
    /// Times before the reference map to index `0`.
    #[inline]
    pub fn index_of(&self, time: f64) -> Option<u64> {
        self.reference
            .map(|reference| ((time - reference) * self.sample_rate).round().max(0.) as u64)
    }

    /// Global time at which sample index `index` happens.
    #[inline]
    pub fn time_of(&self, index: u64) -> Option<f64> {
        self.reference
            .map(|reference| reference + index as f64 / self.sample_rate)
    }
}
