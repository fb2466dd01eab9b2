//! Recursive and windowed filters used to condition normalized traces.

use std::collections::VecDeque;

/// First-order Butterworth high-pass filter
///
/// Coefficients come from the bilinear transform of `s / (s + ωc)` with a
/// pre-warped cutoff, matching the classic `butter(1, Wn, "high")` design.
#[derive(Debug, Clone)]
pub struct HighPassFilter {
    cutoff_normalized: f64,
    b: [f64; 2],
    a1: f64,
    x_prev: Option<f64>,
    y_prev: f64,
}

impl HighPassFilter {
    /// Create a new high-pass filter
    ///
    /// # Arguments
    /// * `cutoff_normalized` - Cutoff as a fraction of the Nyquist frequency, in (0, 1);
    ///   `0.1` puts the -3 dB point at one twentieth of the sample rate
    pub fn new(cutoff_normalized: f64) -> Self {
        // Pre-warp the cutoff frequency
        let k = (std::f64::consts::FRAC_PI_2 * cutoff_normalized).tan();
        let b0 = 1.0 / (1.0 + k);

        Self {
            cutoff_normalized,
            b: [b0, -b0],
            a1: (k - 1.0) / (k + 1.0),
            x_prev: None,
            y_prev: 0.0,
        }
    }

    /// Create from a cutoff in Hz and the sampling rate in Hz
    pub fn from_frequency(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        Self::new(cutoff_hz / (sample_rate_hz / 2.0))
    }

    pub fn cutoff_normalized(&self) -> f64 {
        self.cutoff_normalized
    }

    /// Feed-forward and feedback coefficients `(b, a)` with `a[0] = 1`
    pub fn coefficients(&self) -> ([f64; 2], [f64; 2]) {
        (self.b, [1.0, self.a1])
    }

    /// Process a single sample through the filter
    ///
    /// The first sample after a reset primes the state as if the input had
    /// been constant at that value, so DC input produces zero output.
    pub fn filter(&mut self, x: f64) -> f64 {
        let x_prev = *self.x_prev.get_or_insert(x);

        let y = self.b[0] * x + self.b[1] * x_prev - self.a1 * self.y_prev;

        self.x_prev = Some(x);
        self.y_prev = y;
        y
    }

    /// Filter an entire signal
    pub fn filter_signal(&mut self, signal: &[f64]) -> Vec<f64> {
        self.reset();
        signal.iter().map(|&x| self.filter(x)).collect()
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.x_prev = None;
        self.y_prev = 0.0;
    }
}

/// Trailing (right-aligned) moving average
///
/// Output at index `i` averages inputs `i - window + 1 ..= i`; positions
/// without a full window yield `None`.
#[derive(Debug, Clone)]
pub struct MovingAverageFilter {
    window_size: usize,
    buffer: VecDeque<f64>,
    sum: f64,
}

impl MovingAverageFilter {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            buffer: VecDeque::with_capacity(window_size),
            sum: 0.0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn filter(&mut self, x: f64) -> Option<f64> {
        self.buffer.push_back(x);
        self.sum += x;

        if self.buffer.len() > self.window_size {
            if let Some(old) = self.buffer.pop_front() {
                self.sum -= old;
            }
        }

        if self.window_size == 0 || self.buffer.len() < self.window_size {
            return None;
        }

        Some(self.sum / self.window_size as f64)
    }

    pub fn filter_signal(&mut self, signal: &[f64]) -> Vec<Option<f64>> {
        self.reset();
        signal.iter().map(|&x| self.filter(x)).collect()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.sum = 0.0;
    }
}
