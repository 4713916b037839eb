use num_traits::{Float, FloatConst, Zero};

/// Smoothing factor of a first order low pass filter for a sample period of `dt` seconds.
/// A non-positive cutoff or time step disables filtering (alpha of one).
pub fn alpha<T: Float + FloatConst>(dt: T, cutoff_freq: T) -> T {
    if cutoff_freq <= T::zero() || dt <= T::zero() {
        return T::one();
    }

    let rc = T::one() / ((T::PI() + T::PI()) * cutoff_freq);
    (dt / (dt + rc)).min(T::one()).max(T::zero())
}

/// First order low pass filter with a stored cutoff frequency.
/// The first sample after construction or [`clear`](Self::clear) passes through unfiltered.
#[derive(Clone, Copy, Debug)]
pub struct LowPassFilter<T> {
    output: T,
    cutoff_freq: T,
    is_initialised: bool,
}

impl<T: Zero> Default for LowPassFilter<T> {
    fn default() -> Self {
        Self {
            output: T::zero(),
            cutoff_freq: T::zero(),
            is_initialised: false,
        }
    }
}

impl<T> LowPassFilter<T>
where
    T: Float + FloatConst,
{
    pub fn with_cutoff(cutoff_freq: T) -> Self {
        Self {
            output: T::zero(),
            cutoff_freq,
            is_initialised: false,
        }
    }

    pub fn output(&self) -> T {
        self.output
    }

    pub fn cutoff_freq(&self) -> T {
        self.cutoff_freq
    }

    pub fn set_cutoff_freq(&mut self, cutoff_freq: T) {
        self.cutoff_freq = cutoff_freq;
    }

    /// Apply a new sample taken `dt` seconds after the previous one.
    pub fn apply(&mut self, sample: T, dt: T) -> T {
        if self.is_initialised {
            self.output = self.output + (sample - self.output) * alpha(dt, self.cutoff_freq);
        } else {
            self.is_initialised = true;
            self.output = sample;
        }
        self.output
    }

    /// Force the output to `value`.
    pub fn reset(&mut self, value: T) {
        self.is_initialised = true;
        self.output = value;
    }

    /// Forget the output so the next sample initialises the filter.
    pub fn clear(&mut self) {
        self.is_initialised = false;
        self.output = T::zero();
    }
}

/// Slope estimate over the last `N` samples of a signal sampled at a variable rate.
#[derive(Clone, Debug)]
pub struct DerivativeFilter<const N: usize> {
    samples: [f32; N],
    /// Time (in seconds) between each sample and the one before it
    periods: [f32; N],
    idx: usize,
    len: usize,
}

impl<const N: usize> Default for DerivativeFilter<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> DerivativeFilter<N> {
    pub fn new() -> Self {
        Self {
            samples: [0.; N],
            periods: [0.; N],
            idx: 0,
            len: 0,
        }
    }

    /// Push a sample taken `dt` seconds after the previous one.
    pub fn update(&mut self, sample: f32, dt: f32) {
        self.samples[self.idx] = sample;
        self.periods[self.idx] = dt;
        self.idx = (self.idx + 1) % N;
        self.len = (self.len + 1).min(N);
    }

    /// Average slope (units per second) between the oldest and newest stored samples.
    pub fn slope(&self) -> f32 {
        if self.len < 2 {
            return 0.;
        }

        let newest = (self.idx + N - 1) % N;
        let oldest = (self.idx + N - self.len) % N;

        // The oldest sample's own period lies outside the window
        let mut span = 0.;
        for offset in 0..self.len - 1 {
            span += self.periods[(newest + N - offset) % N];
        }

        if span <= 0. {
            return 0.;
        }
        (self.samples[newest] - self.samples[oldest]) / span
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
