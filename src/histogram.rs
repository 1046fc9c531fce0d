//! A log-scale latency histogram.
//!
//! Values are sorted into a fixed set of buckets whose upper boundaries grow roughly
//! logarithmically, from 1 up to 9x10^9, followed by a catch-all bucket. The table of boundaries
//! ([`BUCKET_LIMITS`]) is shared by every [`Histogram`].
//!
//! Besides the buckets, a histogram keeps exact running totals (`count`, `sum`, `sum_squares`,
//! `min` and `max`), so the average and the standard deviation do not depend on the bucket
//! resolution. Percentiles are estimated from the buckets by linear interpolation.
//!
//! The unit of the values is up to the user. The benchmark harness records microseconds.

/// Number of buckets in a [`Histogram`].
pub const NUM_BUCKETS: usize = 154;

/// The inclusive upper boundary of each bucket, in ascending order. The last entry is the
/// catch-all bucket for values beyond 9x10^9.
pub static BUCKET_LIMITS: [f64; NUM_BUCKETS] = [
    1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 25.0, 30.0,
    35.0, 40.0, 45.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0, 120.0, 140.0, 160.0, 180.0, 200.0,
    250.0, 300.0, 350.0, 400.0, 450.0, 500.0, 600.0, 700.0, 800.0, 900.0, 1e3, 1.2e3, 1.4e3, 1.6e3,
    1.8e3, 2e3, 2.5e3, 3e3, 3.5e3, 4e3, 4.5e3, 5e3, 6e3, 7e3, 8e3, 9e3, 1e4, 1.2e4, 1.4e4, 1.6e4,
    1.8e4, 2e4, 2.5e4, 3e4, 3.5e4, 4e4, 4.5e4, 5e4, 6e4, 7e4, 8e4, 9e4, 1e5, 1.2e5, 1.4e5, 1.6e5,
    1.8e5, 2e5, 2.5e5, 3e5, 3.5e5, 4e5, 4.5e5, 5e5, 6e5, 7e5, 8e5, 9e5, 1e6, 1.2e6, 1.4e6, 1.6e6,
    1.8e6, 2e6, 2.5e6, 3e6, 3.5e6, 4e6, 4.5e6, 5e6, 6e6, 7e6, 8e6, 9e6, 1e7, 1.2e7, 1.4e7, 1.6e7,
    1.8e7, 2e7, 2.5e7, 3e7, 3.5e7, 4e7, 4.5e7, 5e7, 6e7, 7e7, 8e7, 9e7, 1e8, 1.2e8, 1.4e8, 1.6e8,
    1.8e8, 2e8, 2.5e8, 3e8, 3.5e8, 4e8, 4.5e8, 5e8, 6e8, 7e8, 8e8, 9e8, 1e9, 1.2e9, 1.4e9, 1.6e9,
    1.8e9, 2e9, 2.5e9, 3e9, 3.5e9, 4e9, 4.5e9, 5e9, 6e9, 7e9, 8e9, 9e9, 1e200,
];

/// The lower boundary of bucket `b`, which is the upper boundary of the previous one.
pub fn bucket_left(b: usize) -> f64 {
    if b == 0 {
        0.0
    } else {
        BUCKET_LIMITS[b - 1]
    }
}

/// The bucket that holds `value`: the first one whose upper boundary is not below it.
fn bucket_index(value: f64) -> usize {
    BUCKET_LIMITS[..NUM_BUCKETS - 1]
        .iter()
        .position(|limit| value <= *limit)
        .unwrap_or(NUM_BUCKETS - 1)
}

/// A mutable latency accumulator. One is used per benchmark phase.
///
/// Invariant: the sum of all buckets always equals `count`.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    min: f64,
    max: f64,
    count: u64,
    sum: f64,
    sum_squares: f64,
    buckets: [u64; NUM_BUCKETS],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            min: BUCKET_LIMITS[NUM_BUCKETS - 1],
            max: 0.0,
            count: 0,
            sum: 0.0,
            sum_squares: 0.0,
            buckets: [0; NUM_BUCKETS],
        }
    }

    /// Reset to the empty state. `min` starts at the largest boundary and `max` at zero, so the
    /// first value updates both.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn add(&mut self, value: f64) {
        self.buckets[bucket_index(value)] += 1;
        if self.min > value {
            self.min = value;
        }
        if self.max < value {
            self.max = value;
        }
        self.count += 1;
        self.sum += value;
        self.sum_squares += value * value;
    }

    /// Fold `other` into this histogram. The result is the same as if all values added to
    /// `other` had been added here.
    pub fn merge(&mut self, other: &Histogram) {
        if other.min < self.min {
            self.min = other.min;
        }
        if other.max > self.max {
            self.max = other.max;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.sum_squares += other.sum_squares;
        for (b, o) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *b += *o;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn sum_squares(&self) -> f64 {
        self.sum_squares
    }

    /// The smallest value added. Meaningless (the largest boundary) when empty.
    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn buckets(&self) -> &[u64; NUM_BUCKETS] {
        &self.buckets
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Estimate the `p`-th percentile (`p` in `[0, 100]`).
    ///
    /// The bucket holding the target rank is located by walking the cumulative counts, and the
    /// position inside it is interpolated linearly between its boundaries. The result is clamped
    /// to `[min, max]`. An empty histogram yields 0.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let threshold = self.count as f64 * (p / 100.0);
        let mut sum = 0.0;
        for (b, &n) in self.buckets.iter().enumerate() {
            if n == 0 {
                continue;
            }
            let left_sum = sum;
            sum += n as f64;
            if sum >= threshold {
                let left = bucket_left(b);
                let right = BUCKET_LIMITS[b];
                let pos = (threshold - left_sum) / n as f64;
                let r = left + (right - left) * pos;
                return r.clamp(self.min, self.max);
            }
        }
        self.max
    }

    pub fn median(&self) -> f64 {
        self.percentile(50.0)
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    /// Population standard deviation computed from the two running moments.
    pub fn standard_deviation(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        let variance = (self.sum_squares * n - self.sum * self.sum) / (n * n);
        // rounding can leave a tiny negative variance for constant inputs
        variance.max(0.0).sqrt()
    }
}
