//! Append-only sample buffer for the in-progress stroke.
//!
//! Density is bounded at the source: a sample closer than the minimum
//! sampling distance to the last accepted one is dropped.

use glam::Vec3;
use tracing::trace;

use crate::types::Sample;

/// Ordered raw samples of one in-progress stroke.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a sample at `position` would be accepted.
    pub fn should_accept(&self, position: Vec3, min_distance: f32) -> bool {
        match self.samples.last() {
            Some(last) => last.position.distance(position) >= min_distance,
            None => true,
        }
    }

    /// Append a sample unless it is too close to the last accepted one.
    ///
    /// Returns `true` if the sample was recorded.
    pub fn add(&mut self, sample: Sample, min_distance: f32) -> bool {
        if !self.should_accept(sample.position, min_distance) {
            trace!("SampleBuffer::add: rejected sample at {:?}", sample.position);
            return false;
        }
        self.samples.push(sample);
        true
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Sample positions in recording order.
    pub fn positions(&self) -> Vec<Vec3> {
        self.samples.iter().map(|s| s.position).collect()
    }

    /// Total polyline length through the samples.
    pub fn arc_length(&self) -> f32 {
        self.samples
            .windows(2)
            .map(|w| w[0].position.distance(w[1].position))
            .sum()
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}
