use crate::{
    config::{MixConfig, THR_MIX_CEILING, THR_MIX_FLOOR},
    constrain_float, is_valid_dt,
};

/// Whether the mix has reached its desired value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MixPhase {
    Steady,
    Slewing,
}

/// Throttle as seen by the motor mixer, used to find the mix actually in use.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixUsage {
    /// Throttle demand into the mixer
    pub throttle_in: f32,
    /// Throttle after mixing
    pub throttle_out: f32,
    pub throttle_hover: f32,
}

impl MixUsage {
    /// Mix implied by how far the mixer raised the throttle above the demand.
    pub fn mix_used(&self) -> Option<f32> {
        let throttle_in = self.throttle_in;
        let throttle_out = self.throttle_out.max(throttle_in);
        let throttle_hover = self.throttle_hover;

        if throttle_out < throttle_hover {
            // throttle_in <= throttle_out < throttle_hover
            Some((throttle_out - throttle_in) / (throttle_hover - throttle_in))
        } else if throttle_hover > 0. {
            Some(throttle_out / throttle_hover)
        } else {
            None
        }
    }
}

/// Throttle vs attitude mixing.
///
/// The mix is slewed toward the desired preset so the authority given to
/// attitude control never jumps.
///
/// ```
/// use embedded_flight_rate::{MixConfig, ThrottleMixer};
///
/// let mut mixer = ThrottleMixer::new(MixConfig::default());
/// mixer.set_mix_to_min();
/// for _ in 0..100 {
///     mixer.advance(0.02);
/// }
/// assert!(mixer.is_near_min());
/// ```
#[derive(Clone, Debug)]
pub struct ThrottleMixer {
    config: MixConfig,
    mix: f32,
    mix_desired: f32,
}

impl ThrottleMixer {
    /// Create a mixer resting at the active flight preset.
    pub fn new(config: MixConfig) -> Self {
        let mix = bound(config.mix_max).unwrap_or(THR_MIX_FLOOR);
        Self {
            config,
            mix,
            mix_desired: mix,
        }
    }

    pub fn config(&self) -> &MixConfig {
        &self.config
    }

    /// Replace the presets. The current and desired mix are kept.
    pub fn set_config(&mut self, config: MixConfig) {
        self.config = config;
    }

    /// The current mix.
    pub fn mix(&self) -> f32 {
        self.mix
    }

    pub fn desired_mix(&self) -> f32 {
        self.mix_desired
    }

    pub fn phase(&self) -> MixPhase {
        if self.mix == self.mix_desired {
            MixPhase::Steady
        } else {
            MixPhase::Slewing
        }
    }

    /// Returns true if the mix is near the minimum preset (attitude control deprioritised).
    pub fn is_near_min(&self) -> bool {
        self.mix < 1.25 * self.config.mix_min
    }

    /// Slew toward the landing preset.
    pub fn set_mix_to_min(&mut self) {
        self.set_desired(self.config.mix_min);
    }

    /// Slew toward the manual throttle preset.
    pub fn set_mix_to_manual_preset(&mut self) {
        self.set_desired(self.config.mix_man);
    }

    /// Slew toward a blend of the minimum (`ratio` 0) and active flight (`ratio` 1) presets.
    pub fn set_mix_to_max_preset(&mut self, ratio: f32) {
        let ratio = constrain_float(ratio, 0., 1.);
        self.set_desired((1. - ratio) * self.config.mix_min + ratio * self.config.mix_max);
    }

    /// Jump straight to `value` without slewing.
    pub fn set_mix_value(&mut self, value: f32) {
        if let Some(value) = bound(value) {
            self.mix_desired = value;
            self.mix = value;
        }
    }

    fn set_desired(&mut self, value: f32) {
        if let Some(value) = bound(value) {
            self.mix_desired = value;
        }
    }

    /// Move the mix toward the desired value by at most `dt` over the rise or fall time constant.
    pub fn advance(&mut self, dt: f32) {
        self.advance_inner(dt, None);
    }

    /// Like [`advance`](Self::advance), but a falling mix also drops straight to the mix the
    /// motor mixer is actually using, never past the desired value.
    pub fn advance_with_usage(&mut self, dt: f32, usage: MixUsage) {
        self.advance_inner(dt, Some(usage));
    }

    fn advance_inner(&mut self, dt: f32, usage: Option<MixUsage>) {
        if !is_valid_dt(dt) {
            return;
        }

        if self.mix < self.mix_desired {
            let step = step(dt, self.config.rise_tc);
            if step >= self.mix_desired - self.mix {
                self.mix = self.mix_desired;
            } else {
                self.mix += step;
            }
        } else if self.mix > self.mix_desired {
            let step = step(dt, self.config.fall_tc);
            if step >= self.mix - self.mix_desired {
                self.mix = self.mix_desired;
            } else {
                self.mix -= step;
            }

            // if the mix is still higher than that being used, reset immediately
            if let Some(mix_used) = usage.and_then(|usage| usage.mix_used()) {
                if mix_used.is_finite() {
                    self.mix = self.mix_desired.max(self.mix.min(mix_used));
                }
            }
        }

        self.mix = constrain_float(self.mix, THR_MIX_FLOOR, THR_MIX_CEILING);
    }

    /// Throttle the motor mixer may raise the average to while keeping attitude control.
    pub fn throttle_avg_max(&self, throttle_in: f32, throttle_hover: f32) -> f32 {
        let throttle_in = constrain_float(throttle_in, 0., 1.);
        let avg_max = throttle_in * (1. - self.mix).max(0.) + throttle_hover * self.mix;
        constrain_float(throttle_in.max(avg_max), 0., 1.)
    }
}

fn bound(value: f32) -> Option<f32> {
    if value.is_finite() {
        Some(constrain_float(value, THR_MIX_FLOOR, THR_MIX_CEILING))
    } else {
        None
    }
}

fn step(dt: f32, tc: f32) -> f32 {
    if tc > 0. {
        dt / tc
    } else {
        f32::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::{MixPhase, MixUsage, ThrottleMixer};
    use crate::config::MixConfig;
    use approx::assert_relative_eq;

    fn config() -> MixConfig {
        MixConfig {
            mix_min: 0.1,
            mix_man: 0.3,
            mix_max: 0.9,
            rise_tc: 1.5,
            fall_tc: 1.5,
        }
    }

    #[test]
    fn slews_to_min_without_crossing() {
        let mut mixer = ThrottleMixer::new(config());
        assert_eq!(mixer.mix(), 0.9);

        mixer.set_mix_to_min();
        assert_eq!(mixer.phase(), MixPhase::Slewing);

        let mut prev = mixer.mix();
        for _ in 0..200 {
            mixer.advance(0.02);
            let mix = mixer.mix();
            assert!(mix <= prev);
            assert!(mix >= 0.1);
            assert!(prev - mix <= 0.02 / 1.5 + 1e-6);
            prev = mix;
        }
        assert_eq!(mixer.mix(), 0.1);
        assert_eq!(mixer.phase(), MixPhase::Steady);
    }

    #[test]
    fn never_overshoots_changing_targets() {
        let mut mixer = ThrottleMixer::new(MixConfig::default());
        let mut seed = 12345u32;
        for tick in 0..2000 {
            if tick % 37 == 0 {
                seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
                match seed % 4 {
                    0 => mixer.set_mix_to_min(),
                    1 => mixer.set_mix_to_manual_preset(),
                    2 => mixer.set_mix_to_max_preset((seed % 100) as f32 / 100.),
                    _ => mixer.set_mix_to_max_preset(1.),
                }
            }
            let prev = mixer.mix();
            let desired = mixer.desired_mix();
            mixer.advance(0.0025);
            let next = mixer.mix();
            assert!(next >= prev.min(desired));
            assert!(next <= prev.max(desired));
        }
    }

    #[test]
    fn near_min_threshold() {
        let mut mixer = ThrottleMixer::new(config());
        mixer.set_mix_value(0.124);
        assert!(mixer.is_near_min());
        mixer.set_mix_value(0.125);
        assert!(!mixer.is_near_min());
        assert_eq!(mixer.phase(), MixPhase::Steady);
    }

    #[test]
    fn near_min_threshold_for_any_min_preset() {
        for mix_min in [0.1, 0.15, 0.2, 0.3, 0.4, 0.5] {
            let mut mixer = ThrottleMixer::new(MixConfig {
                mix_min,
                ..config()
            });
            let threshold = 1.25 * mix_min;

            mixer.set_mix_value(threshold * 0.99);
            assert!(mixer.is_near_min(), "{} below threshold", mix_min);
            mixer.set_mix_value(threshold);
            assert!(!mixer.is_near_min(), "{} at threshold", mix_min);
            mixer.set_mix_value(threshold * 1.01);
            assert!(!mixer.is_near_min(), "{} above threshold", mix_min);

            // Settling on the minimum preset always reads as near min
            mixer.set_mix_to_min();
            for _ in 0..1000 {
                mixer.advance(0.0025);
            }
            assert_eq!(mixer.mix(), mix_min);
            assert!(mixer.is_near_min());
        }
    }

    #[test]
    fn max_preset_ratio_blends_presets() {
        let mut mixer = ThrottleMixer::new(config());
        mixer.set_mix_to_max_preset(0.5);
        assert_relative_eq!(mixer.desired_mix(), 0.5);
        mixer.set_mix_to_max_preset(7.);
        assert_relative_eq!(mixer.desired_mix(), 0.9);
        mixer.set_mix_to_manual_preset();
        assert_relative_eq!(mixer.desired_mix(), 0.3);
    }

    #[test]
    fn non_finite_inputs_are_ignored() {
        let mut mixer = ThrottleMixer::new(config());
        mixer.set_mix_value(f32::NAN);
        assert_eq!(mixer.mix(), 0.9);
        mixer.set_mix_to_min();
        mixer.advance(-0.01);
        mixer.advance(f32::NAN);
        assert_eq!(mixer.mix(), 0.9);
    }

    #[test]
    fn falling_mix_drops_to_mix_in_use() {
        let mut mixer = ThrottleMixer::new(config());
        mixer.set_mix_to_min();
        let usage = MixUsage {
            throttle_in: 0.2,
            throttle_out: 0.3,
            throttle_hover: 0.4,
        };
        mixer.advance_with_usage(0.0025, usage);
        assert_relative_eq!(mixer.mix(), 0.5, epsilon = 1e-6);

        // Never past the desired mix
        let idle = MixUsage {
            throttle_in: 0.2,
            throttle_out: 0.2,
            throttle_hover: 0.4,
        };
        mixer.advance_with_usage(0.0025, idle);
        assert_relative_eq!(mixer.mix(), 0.1);
    }

    #[test]
    fn throttle_avg_max_blends_hover() {
        let mut mixer = ThrottleMixer::new(config());
        mixer.set_mix_value(0.5);
        assert_relative_eq!(mixer.throttle_avg_max(0.2, 0.4), 0.3, epsilon = 1e-6);
        assert_relative_eq!(mixer.throttle_avg_max(0.8, 0.4), 0.8);
        assert_relative_eq!(mixer.throttle_avg_max(2., 0.4), 1.);
    }
}
