use std::collections::VecDeque;

use lidar_odom_3d::transforms::RigidTransform;

/// Error types for the transform interpolation buffer.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BufferError {
    /// The buffer holds no sample to answer the query.
    #[error("No transform available, the buffer is empty")]
    NotAvailable,

    /// A pushed timestamp is not strictly after the latest sample.
    #[error("Timestamp {timestamp} is not after the latest buffered timestamp {latest}")]
    NonMonotonicTimestamp {
        /// The rejected timestamp.
        timestamp: f64,
        /// The latest timestamp in the buffer.
        latest: f64,
    },
}

/// A pose stamped with the time it was measured at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationSample {
    /// Time in seconds.
    pub timestamp: f64,
    /// The pose at `timestamp`.
    pub transform: RigidTransform,
}

/// Time ordered store of poses answering queries at arbitrary timestamps.
///
/// Timestamps are strictly increasing. Queries between two samples interpolate the
/// translation linearly and the rotation along the shortest arc; queries outside the stored
/// range clamp to the closest sample.
#[derive(Debug, Clone, Default)]
pub struct TransformInterpolationBuffer {
    samples: VecDeque<InterpolationSample>,
    max_len: Option<usize>,
}

impl TransformInterpolationBuffer {
    /// Create an unbounded buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer that evicts its oldest sample once it holds `max_len` samples.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_len),
            max_len: Some(max_len),
        }
    }

    /// Append a sample.
    ///
    /// # Errors
    ///
    /// The timestamp must be finite and strictly greater than the latest stored one.
    pub fn push(&mut self, timestamp: f64, transform: RigidTransform) -> Result<(), BufferError> {
        let latest = self.latest_time().unwrap_or(f64::NEG_INFINITY);
        if !timestamp.is_finite() || timestamp <= latest {
            return Err(BufferError::NonMonotonicTimestamp { timestamp, latest });
        }

        if let Some(max_len) = self.max_len {
            while !self.samples.is_empty() && self.samples.len() >= max_len {
                self.samples.pop_front();
            }
            if max_len == 0 {
                return Ok(());
            }
        }

        self.samples.push_back(InterpolationSample {
            timestamp,
            transform,
        });
        Ok(())
    }

    /// The pose at `timestamp`.
    pub fn lookup(&self, timestamp: f64) -> Result<RigidTransform, BufferError> {
        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(BufferError::NotAvailable),
        };

        if timestamp <= first.timestamp {
            return Ok(first.transform);
        }
        if timestamp >= last.timestamp {
            return Ok(last.transform);
        }

        // index of the first sample after the query, in [1, len - 1] here
        let idx = self.samples.partition_point(|s| s.timestamp <= timestamp);
        let before = &self.samples[idx - 1];
        let after = &self.samples[idx];

        if before.timestamp == timestamp {
            return Ok(before.transform);
        }

        let alpha = (timestamp - before.timestamp) / (after.timestamp - before.timestamp);
        Ok(before.transform.interpolate(&after.transform, alpha))
    }

    /// Whether the buffer holds no sample.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Timestamp of the oldest sample.
    pub fn earliest_time(&self) -> Option<f64> {
        self.samples.front().map(|s| s.timestamp)
    }

    /// Timestamp of the newest sample.
    pub fn latest_time(&self) -> Option<f64> {
        self.samples.back().map(|s| s.timestamp)
    }

    /// Pose of the newest sample.
    pub fn latest_transform(&self) -> Option<RigidTransform> {
        self.samples.back().map(|s| s.transform)
    }

    /// Whether `timestamp` lies within the stored time range, bounds included.
    pub fn is_within_time_bounds(&self, timestamp: f64) -> bool {
        match (self.earliest_time(), self.latest_time()) {
            (Some(earliest), Some(latest)) => earliest <= timestamp && timestamp <= latest,
            _ => false,
        }
    }

    /// Remove every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Iterate over the samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &InterpolationSample> {
        self.samples.iter()
    }
}
