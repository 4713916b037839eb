use crate::{
    config::{GainBoostConfig, GAIN_BOOST_CEILING_MAX},
    filter::{DerivativeFilter, LowPassFilter},
    is_valid_dt,
};
use nalgebra::Vector3;
use num_traits::Float;

/// Boosts the angle P and the roll/pitch rate PD gains during rapid throttle changes.
#[derive(Clone, Debug)]
pub struct GainBooster {
    config: GainBoostConfig,
    /// Throttle output slew detector
    throttle_slew: DerivativeFilter<7>,
    /// Filter for the output of the throttle slew
    throttle_slew_filter: LowPassFilter<f32>,
    throttle_slew_rate: f32,
    multiplier: f32,
}

impl GainBooster {
    pub fn new(config: GainBoostConfig) -> Self {
        Self {
            config,
            throttle_slew: DerivativeFilter::new(),
            throttle_slew_filter: LowPassFilter::with_cutoff(config.slew_filter_hz),
            throttle_slew_rate: 0.,
            multiplier: 1.,
        }
    }

    pub fn config(&self) -> &GainBoostConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: GainBoostConfig) {
        self.config = config;
        self.throttle_slew_filter
            .set_cutoff_freq(config.slew_filter_hz);
    }

    /// Filtered magnitude of the throttle slew rate (per second).
    pub fn throttle_slew_rate(&self) -> f32 {
        self.throttle_slew_rate
    }

    /// Current boost multiplier, at least one.
    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    /// Scale for the roll, pitch and yaw rate P and D terms.
    pub fn pd_scale(&self) -> Vector3<f32> {
        Vector3::new(self.multiplier, self.multiplier, 1.)
    }

    /// Scale for the roll, pitch and yaw angle P gains of the outer loop.
    pub fn angle_p_scale(&self) -> Vector3<f32> {
        let ceiling = self.ceiling();
        let boost = (self.multiplier * self.multiplier).min(ceiling * ceiling);
        Vector3::new(boost, boost, 1.)
    }

    fn ceiling(&self) -> f32 {
        let ceiling = self.config.gain_boost_ceiling;
        if ceiling.is_finite() {
            ceiling.max(1.).min(GAIN_BOOST_CEILING_MAX)
        } else {
            1.
        }
    }

    /// Observe the throttle sent to the motors `dt` seconds after the last update.
    pub fn update(&mut self, throttle_out: f32, dt: f32) -> f32 {
        if !throttle_out.is_finite() || !is_valid_dt(dt) {
            return self.multiplier;
        }

        self.throttle_slew.update(throttle_out, dt);
        let rate = self.throttle_slew.slope().abs();
        self.throttle_slew_rate = self.throttle_slew_filter.apply(rate, dt);

        if self.throttle_slew_rate > self.config.slew_threshold {
            self.multiplier = self.ceiling();
        } else if self.config.decay_tc > 0. {
            let decay = (-dt / self.config.decay_tc).exp();
            self.multiplier = 1. + (self.multiplier - 1.) * decay;
        } else {
            self.multiplier = 1.;
        }

        self.multiplier
    }

    pub fn reset(&mut self) {
        self.throttle_slew.reset();
        self.throttle_slew_filter.clear();
        self.throttle_slew_rate = 0.;
        self.multiplier = 1.;
    }
}
