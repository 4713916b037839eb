use crate::{config::BoostConfig, constrain_float, filter::LowPassFilter, is_valid_dt};
use num_traits::Float;

/// Tilt compensation of the throttle demand and lean angle limiting.
///
/// ```
/// use embedded_flight_rate::{BoostConfig, ThrottleBooster};
///
/// let mut booster = ThrottleBooster::new(BoostConfig::default());
///
/// // Leaning 30 degrees needs more throttle to hold altitude
/// let boosted = booster.boost(0.5, 30f32.to_radians());
/// assert!(boosted > 0.5 && boosted <= 1.);
/// ```
#[derive(Clone, Debug)]
pub struct ThrottleBooster {
    config: BoostConfig,
    throttle_filter: LowPassFilter<f32>,
    /// Throttle demand of the last accepted output
    throttle_in: f32,
    throttle_out: f32,
    /// Throttle added by the last boost, for logging
    angle_boost: f32,
    /// Filtered maximum lean angle (in radians)
    lean_angle_max: f32,
}

impl ThrottleBooster {
    pub fn new(config: BoostConfig) -> Self {
        Self {
            config,
            throttle_filter: LowPassFilter::with_cutoff(0.),
            throttle_in: 0.,
            throttle_out: 0.,
            angle_boost: 0.,
            lean_angle_max: core::f32::consts::FRAC_PI_2,
        }
    }

    pub fn config(&self) -> &BoostConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: BoostConfig) {
        self.config = config;
    }

    pub fn throttle_in(&self) -> f32 {
        self.throttle_in
    }

    /// Filtered throttle sent to the motors.
    pub fn throttle_out(&self) -> f32 {
        self.throttle_out
    }

    pub fn angle_boost(&self) -> f32 {
        self.angle_boost
    }

    pub fn lean_angle_max(&self) -> f32 {
        self.lean_angle_max
    }

    /// Body frame throttle required to produce the earth frame `throttle_in` while tilted by
    /// `tilt_angle` radians. The result fades to zero as the vehicle approaches inverted.
    pub fn boost(&mut self, throttle_in: f32, tilt_angle: f32) -> f32 {
        let throttle_in = constrain_float(throttle_in, 0., 1.);
        if !self.config.angle_boost_enabled || !tilt_angle.is_finite() {
            self.angle_boost = 0.;
            return throttle_in;
        }

        let cos_tilt = tilt_angle.cos();

        // inverted_factor is 1 for tilt angles below about 84 degrees and
        // reduces to 0 as the tilt approaches 90 degrees
        let inverted_factor = constrain_float(10. * cos_tilt, 0., 1.);
        let min_cos = 1. / self.config.angle_boost_max.max(1.);
        let boost_factor = 1. / constrain_float(cos_tilt, min_cos, 1.);

        let throttle_out = constrain_float(throttle_in * inverted_factor * boost_factor, 0., 1.);
        self.angle_boost = throttle_out - throttle_in;
        throttle_out
    }

    /// Set the throttle for the motors, optionally tilt compensated, through a low pass filter
    /// with `filter_cutoff` Hz (zero disables filtering).
    /// A non-finite throttle or non-positive `dt` holds the previous output.
    pub fn set_output(
        &mut self,
        throttle_in: f32,
        apply_boost: bool,
        filter_cutoff: f32,
        tilt_angle: f32,
        dt: f32,
    ) -> f32 {
        if !throttle_in.is_finite() || !is_valid_dt(dt) {
            return self.throttle_out;
        }

        self.throttle_in = constrain_float(throttle_in, 0., 1.);
        let throttle = if apply_boost {
            self.boost(self.throttle_in, tilt_angle)
        } else {
            // Clear angle_boost for logging purposes
            self.angle_boost = 0.;
            self.throttle_in
        };

        self.throttle_filter.set_cutoff_freq(filter_cutoff.max(0.));
        self.throttle_filter.apply(throttle, dt);

        // Constrain filtered throttle
        if self.throttle_filter.output() < 0. {
            self.throttle_filter.reset(0.);
        } else if self.throttle_filter.output() > 1. {
            self.throttle_filter.reset(1.);
        }

        self.throttle_out = self.throttle_filter.output();
        self.throttle_out
    }

    /// Update and return the largest lean angle (in radians) that still leaves throttle headroom
    /// to hold altitude with `throttle_in`, given the motors' maximum thrust.
    pub fn compute_lean_angle_limit(
        &mut self,
        throttle_in: f32,
        throttle_thrust_max: f32,
        dt: f32,
    ) -> f32 {
        // divide by zero check
        if !(throttle_thrust_max > 0.) {
            self.lean_angle_max = 0.;
            return self.lean_angle_max;
        }
        if !throttle_in.is_finite() || !is_valid_dt(dt) {
            return self.lean_angle_max;
        }

        let headroom = self.config.lean_throttle_headroom * throttle_thrust_max;
        let lean_angle_max = if headroom > 0. {
            constrain_float(throttle_in / headroom, 0., 1.).acos()
        } else {
            0.
        };

        let tc = self.config.angle_limit_tc.max(0.);
        self.lean_angle_max += (dt / (dt + tc)) * (lean_angle_max - self.lean_angle_max);
        self.lean_angle_max
    }

    /// Drop the throttle filter to zero, used while disarmed.
    pub fn reset(&mut self) {
        self.throttle_filter.reset(0.);
        self.throttle_in = 0.;
        self.throttle_out = 0.;
        self.angle_boost = 0.;
    }
}

#[cfg(test)]
mod tests {
    use super::ThrottleBooster;
    use crate::config::BoostConfig;
    use approx::assert_relative_eq;
    use core::f32::consts::{FRAC_PI_2, FRAC_PI_3, PI};

    #[test]
    fn boost_compensates_tilt() {
        let mut booster = ThrottleBooster::new(BoostConfig::default());
        assert_relative_eq!(booster.boost(0.4, 0.), 0.4);
        assert_relative_eq!(booster.boost(0.4, FRAC_PI_3), 0.8, epsilon = 1e-5);
        assert_relative_eq!(booster.angle_boost(), 0.4, epsilon = 1e-5);
    }

    #[test]
    fn boost_stays_normalized() {
        let mut booster = ThrottleBooster::new(BoostConfig::default());
        for t in 0..=20 {
            let throttle = t as f32 / 20.;
            for a in 0..=180 {
                let tilt = a as f32 / 180. * PI;
                let out = booster.boost(throttle, tilt);
                assert!((0. ..=1.).contains(&out), "{} at {}", out, tilt);
            }
        }
        assert_eq!(booster.boost(0.5, FRAC_PI_2 + 0.2), 0.);
    }

    #[test]
    fn boost_disabled() {
        let mut booster = ThrottleBooster::new(BoostConfig {
            angle_boost_enabled: false,
            ..BoostConfig::default()
        });
        assert_eq!(booster.boost(0.4, FRAC_PI_3), 0.4);
        assert_eq!(booster.angle_boost(), 0.);
    }

    #[test]
    fn set_output_filters_throttle() {
        let mut booster = ThrottleBooster::new(BoostConfig::default());
        assert_eq!(booster.set_output(0.2, false, 2., 0., 0.0025), 0.2);

        let out = booster.set_output(0.6, false, 2., 0., 0.0025);
        assert!(out > 0.2 && out < 0.6);

        // Held on bad input
        assert_eq!(booster.set_output(f32::NAN, false, 2., 0., 0.0025), out);
        assert_eq!(booster.set_output(0.6, false, 2., 0., 0.), out);

        // Zero cutoff disables filtering
        assert_relative_eq!(booster.set_output(0.6, true, 0., FRAC_PI_3, 0.0025), 1.);
    }

    #[test]
    fn lean_angle_limit_follows_throttle() {
        let mut booster = ThrottleBooster::new(BoostConfig {
            angle_limit_tc: 0.,
            ..BoostConfig::default()
        });
        // Half of the usable thrust allows 60 degrees of lean
        assert_relative_eq!(
            booster.compute_lean_angle_limit(0.4, 1., 0.0025),
            FRAC_PI_3,
            epsilon = 1e-5
        );
        assert_eq!(booster.compute_lean_angle_limit(0.9, 1., 0.0025), 0.);
        assert_eq!(booster.compute_lean_angle_limit(0.4, 0., 0.0025), 0.);
    }

    #[test]
    fn lean_angle_limit_is_filtered() {
        let mut booster = ThrottleBooster::new(BoostConfig::default());
        let first = booster.compute_lean_angle_limit(0.8, 1., 0.0025);
        assert!(first < FRAC_PI_2 && first > 0.);
        for _ in 0..4000 {
            booster.compute_lean_angle_limit(0.8, 1., 0.0025);
        }
        assert!(booster.lean_angle_max() < 1e-3);
    }
}
