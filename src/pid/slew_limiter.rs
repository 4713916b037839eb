use crate::filter::LowPassFilter;
use num_traits::Float;

/// Smallest gain modifier applied while slew limiting
const MODIFIER_MIN: f32 = 0.1;

/// Slew rate limiting filter.
/// Used to prevent oscillation of a controller
/// by modifying the controllers output based on a maximum slew rate.
///
/// `N` exceedance events in each direction must fall within the window before
/// the gain reduction is applied in full.
#[derive(Clone, Debug)]
pub struct SlewLimiter<const N: usize> {
    slew_filter: LowPassFilter<f32>,
    pub output_slew_rate: f32,
    modifier_slew_rate: f32,
    last_sample: f32,
    max_pos_slew_rate: f32,
    max_neg_slew_rate: f32,
    max_pos_slew_event_ms: u32,
    max_neg_slew_event_ms: u32,
    pos_event_index: usize,
    neg_event_index: usize,
    pos_event_ms: [u32; N],
    neg_event_ms: [u32; N],
    pos_event_stored: bool,
    neg_event_stored: bool,
    /// Time since construction, advanced by each sample's `dt`
    now_ms: u32,
    /// Sub-millisecond remainder of the elapsed time (in seconds)
    now_remainder: f32,
    window_ms: u32,
    modifier_gain: f32,
}

impl<const N: usize> Default for SlewLimiter<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SlewLimiter<N> {
    pub fn new() -> Self {
        Self {
            slew_filter: LowPassFilter::with_cutoff(25.),
            output_slew_rate: 0.,
            modifier_slew_rate: 0.,
            last_sample: 0.,
            max_pos_slew_rate: 0.,
            max_neg_slew_rate: 0.,
            max_pos_slew_event_ms: 0,
            max_neg_slew_event_ms: 0,
            pos_event_index: 0,
            neg_event_index: 0,
            pos_event_ms: [0; N],
            neg_event_ms: [0; N],
            pos_event_stored: false,
            neg_event_stored: false,
            now_ms: 0,
            now_remainder: 0.,
            window_ms: 300,
            modifier_gain: 1.5,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn advance_clock(&mut self, dt: f32) {
        self.now_remainder += dt;
        let whole_ms = (self.now_remainder * 1000.) as u32;
        self.now_ms = self.now_ms.wrapping_add(whole_ms);
        self.now_remainder -= whole_ms as f32 * 0.001;
    }

    /// Apply the filter to a sample, returning multiplier between 0 and 1 to keep output within slew rate
    pub fn modifier(&mut self, sample: f32, slew_rate_max: f32, slew_rate_tau: f32, dt: f32) -> f32 {
        if slew_rate_max <= 0. || slew_rate_tau <= 0. || dt <= 0. {
            self.output_slew_rate = 0.;
            return 1.;
        }

        self.advance_clock(dt);
        let now_ms = self.now_ms;

        // Calculate a low pass filtered slew rate
        let slew_rate = self.slew_filter.apply((sample - self.last_sample) / dt, dt);
        self.last_sample = sample;

        let decay_alpha = dt.min(slew_rate_tau) / slew_rate_tau;

        // Store a series of positive slew rate exceedance events
        if !self.pos_event_stored && slew_rate > slew_rate_max {
            if self.pos_event_index >= N {
                self.pos_event_index = 0;
            }
            self.pos_event_ms[self.pos_event_index] = now_ms;
            self.pos_event_index += 1;
            self.pos_event_stored = true;
            self.neg_event_stored = false;
        }

        // Store a series of negative slew rate exceedance events
        if !self.neg_event_stored && slew_rate < -slew_rate_max {
            if self.neg_event_index >= N {
                self.neg_event_index = 0;
            }
            self.neg_event_ms[self.neg_event_index] = now_ms;
            self.neg_event_index += 1;
            self.neg_event_stored = true;
            self.pos_event_stored = false;
        }

        // Find the oldest event time
        let mut oldest_ms = now_ms;
        for index in 0..N {
            if self.pos_event_ms[index] < oldest_ms {
                oldest_ms = self.pos_event_ms[index];
            }
            if self.neg_event_ms[index] < oldest_ms {
                oldest_ms = self.neg_event_ms[index];
            }
        }

        // Decay the peak positive and negative slew rate if they are outside the window
        // Never drop PID gains below 10% of configured value
        if slew_rate > self.max_pos_slew_rate {
            self.max_pos_slew_rate = slew_rate.min(10. * slew_rate_max);
            self.max_pos_slew_event_ms = now_ms;
        } else if now_ms.wrapping_sub(self.max_pos_slew_event_ms) > self.window_ms {
            self.max_pos_slew_rate *= 1. - decay_alpha;
        }

        if slew_rate < -self.max_neg_slew_rate {
            self.max_neg_slew_rate = (-slew_rate).min(10. * slew_rate_max);
            self.max_neg_slew_event_ms = now_ms;
        } else if now_ms.wrapping_sub(self.max_neg_slew_event_ms) > self.window_ms {
            self.max_neg_slew_rate *= 1. - decay_alpha;
        }

        let raw_slew_rate = 0.5 * (self.max_pos_slew_rate + self.max_neg_slew_rate);

        // Decay the slew rate used for gain reduction once the oldest exceedance event is outside the
        // window covering all N events
        let mut modifier_input = raw_slew_rate;
        let event_window_ms = (N as u32 + 1) * self.window_ms;
        let since_oldest_ms = now_ms.wrapping_sub(oldest_ms);
        if since_oldest_ms > event_window_ms {
            let oldest_time_from_window = 0.001 * (since_oldest_ms - event_window_ms) as f32;
            modifier_input *= (-oldest_time_from_window / slew_rate_tau).exp();
        }

        // Apply a filter to increases in slew rate only to reduce the effect of gusts and large controller
        // setpoint changes
        let attack_alpha = (2. * decay_alpha).min(1.);

        self.modifier_slew_rate =
            (1. - attack_alpha) * self.modifier_slew_rate + attack_alpha * modifier_input;
        self.modifier_slew_rate = self.modifier_slew_rate.min(modifier_input);

        self.output_slew_rate =
            (1. - attack_alpha) * self.output_slew_rate + attack_alpha * raw_slew_rate;
        self.output_slew_rate = self.output_slew_rate.min(raw_slew_rate);

        // Calculate the gain adjustment
        if self.modifier_slew_rate > slew_rate_max {
            let modifier = slew_rate_max
                / (slew_rate_max + self.modifier_gain * (self.modifier_slew_rate - slew_rate_max));
            modifier.max(MODIFIER_MIN)
        } else {
            1.
        }
    }
}
