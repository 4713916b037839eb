//! Pre-arm parameter sanity checking.
//!
//! Out of range parameters are never rejected. Each is replaced in place and the
//! replacement is recorded as a [`Correction`] so the caller can report it.

use crate::config::{
    AttitudeControlConfig, Axis, RatePidConfig, LOOP_RATE_HZ, GAIN_BOOST_CEILING_MAX,
    RATE_RPY_FILT_HZ, THR_MIX_CEILING, THR_MIX_FLOOR, THR_MIX_MAN_LIMIT, THR_MIX_MIN_LIMIT,
};
use core::fmt;
use embedded_time::rate::Hertz;
use heapless::Vec;
use thiserror::Error;

/// Most corrections kept in a [`SanityReport`].
pub const MAX_CORRECTIONS: usize = 48;

/// Throttle mix parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MixSetting {
    Min,
    Man,
    Max,
    RiseTc,
    FallTc,
}

impl fmt::Display for MixSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixSetting::Min => write!(f, "minimum mix"),
            MixSetting::Man => write!(f, "manual mix"),
            MixSetting::Max => write!(f, "maximum mix"),
            MixSetting::RiseTc => write!(f, "mix rise time constant"),
            MixSetting::FallTc => write!(f, "mix fall time constant"),
        }
    }
}

/// Rate PID gain or limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PidTerm {
    P,
    I,
    D,
    Ff,
    Imax,
    SlewMax,
    SlewTau,
}

impl fmt::Display for PidTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PidTerm::P => write!(f, "P"),
            PidTerm::I => write!(f, "I"),
            PidTerm::D => write!(f, "D"),
            PidTerm::Ff => write!(f, "FF"),
            PidTerm::Imax => write!(f, "IMAX"),
            PidTerm::SlewMax => write!(f, "slew max"),
            PidTerm::SlewTau => write!(f, "slew tau"),
        }
    }
}

/// Rate PID low pass filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PidFilter {
    Target,
    Error,
    Derivative,
}

impl fmt::Display for PidFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PidFilter::Target => write!(f, "target"),
            PidFilter::Error => write!(f, "error"),
            PidFilter::Derivative => write!(f, "derivative"),
        }
    }
}

/// Angle or gain boost parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BoostSetting {
    AngleBoostMax,
    LeanThrottleHeadroom,
    AngleLimitTc,
    GainBoostCeiling,
    GainBoostThreshold,
    GainBoostDecayTc,
    GainBoostSlewFilter,
}

impl fmt::Display for BoostSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoostSetting::AngleBoostMax => write!(f, "angle boost max"),
            BoostSetting::LeanThrottleHeadroom => write!(f, "lean throttle headroom"),
            BoostSetting::AngleLimitTc => write!(f, "angle limit time constant"),
            BoostSetting::GainBoostCeiling => write!(f, "gain boost ceiling"),
            BoostSetting::GainBoostThreshold => write!(f, "gain boost threshold"),
            BoostSetting::GainBoostDecayTc => write!(f, "gain boost decay time constant"),
            BoostSetting::GainBoostSlewFilter => write!(f, "gain boost slew filter"),
        }
    }
}

/// A parameter replaced by [`ParameterValidator::sanity_check`].
#[derive(Clone, Copy, Debug, Error, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Correction {
    #[error("{setting} {value} out of range, set to {corrected}")]
    Mix {
        setting: MixSetting,
        value: f32,
        corrected: f32,
    },

    #[error("manual mix {value} outside the minimum and maximum mix, set to {corrected}")]
    MixOrder { value: f32, corrected: f32 },

    #[error("{axis} rate {term} {value} invalid, set to {corrected}")]
    PidGain {
        axis: Axis,
        term: PidTerm,
        value: f32,
        corrected: f32,
    },

    #[error("{axis} rate {filter} filter {value} Hz not positive, set to {corrected} Hz")]
    FilterCutoff {
        axis: Axis,
        filter: PidFilter,
        value: f32,
        corrected: f32,
    },

    #[error("{setting} {value} out of range, set to {corrected}")]
    Boost {
        setting: BoostSetting,
        value: f32,
        corrected: f32,
    },

    #[error("loop rate {value} Hz invalid, set to {corrected} Hz")]
    LoopRate { value: u32, corrected: u32 },

    #[error("output limit {value} invalid, set to {corrected}")]
    OutputLimit { value: f32, corrected: f32 },
}

/// Corrections applied by one sanity check.
#[derive(Clone, Debug, Default)]
pub struct SanityReport {
    corrections: Vec<Correction, MAX_CORRECTIONS>,
    /// Corrections applied but not kept once the report was full
    dropped: usize,
}

impl SanityReport {
    /// Returns true if no parameter needed correcting.
    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty() && self.dropped == 0
    }

    pub fn corrections(&self) -> &[Correction] {
        &self.corrections
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.corrections.len() + self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, correction: Correction) {
        warn!("parameter corrected: {}", correction);
        if self.corrections.push(correction).is_err() {
            self.dropped += 1;
        }
    }
}

/// Corrects an [`AttitudeControlConfig`] to sane, consistent values before arming.
///
/// ```
/// use embedded_flight_rate::{AttitudeControlConfig, ParameterValidator};
///
/// let mut config = AttitudeControlConfig::default();
/// config.mix.mix_min = 0.5;
/// config.mix.mix_man = 0.2;
/// config.mix.mix_max = 0.9;
///
/// let report = ParameterValidator::default().sanity_check(&mut config);
/// assert!(!report.is_clean());
/// assert!(config.mix.mix_min <= config.mix.mix_man && config.mix.mix_man <= config.mix.mix_max);
/// ```
#[derive(Clone, Debug)]
pub struct ParameterValidator {
    defaults: AttitudeControlConfig,
}

impl Default for ParameterValidator {
    fn default() -> Self {
        Self {
            defaults: AttitudeControlConfig::default(),
        }
    }
}

impl ParameterValidator {
    /// Create a validator that falls back to `defaults`, themselves corrected against the
    /// compiled-in defaults.
    pub fn new(mut defaults: AttitudeControlConfig) -> Self {
        Self::default().sanity_check(&mut defaults);
        Self { defaults }
    }

    /// Correct `config` in place.
    /// Afterwards `mix_min <= mix_man <= mix_max`, every filter cutoff is positive and every gain
    /// is finite and non-negative.
    pub fn sanity_check(&self, config: &mut AttitudeControlConfig) -> SanityReport {
        let mut report = SanityReport::default();

        for axis in Axis::ALL {
            check_rate_pid(
                axis,
                config.rate_pid_mut(axis),
                self.defaults.rate_pid(axis),
                &mut report,
            );
        }

        self.check_mix(config, &mut report);
        self.check_boost(config, &mut report);

        if config.loop_rate.0 == 0 {
            let corrected = if self.defaults.loop_rate.0 == 0 {
                LOOP_RATE_HZ
            } else {
                self.defaults.loop_rate.0
            };
            report.push(Correction::LoopRate {
                value: config.loop_rate.0,
                corrected,
            });
            config.loop_rate = Hertz(corrected);
        }

        if let Some(value) = correct(&mut config.output_limit, positive, 1.) {
            report.push(Correction::OutputLimit {
                value,
                corrected: config.output_limit,
            });
        }

        report
    }

    fn check_mix(&self, config: &mut AttitudeControlConfig, report: &mut SanityReport) {
        let defaults = &self.defaults.mix;
        let mix = &mut config.mix;

        let presets = [
            (MixSetting::Min, &mut mix.mix_min, defaults.mix_min, THR_MIX_MIN_LIMIT),
            (MixSetting::Man, &mut mix.mix_man, defaults.mix_man, THR_MIX_MAN_LIMIT),
            (MixSetting::Max, &mut mix.mix_max, defaults.mix_max, THR_MIX_CEILING),
        ];
        for (setting, value, default, high) in presets {
            // The maximum preset may never sit below the highest minimum preset
            let low = if setting == MixSetting::Max {
                THR_MIX_MIN_LIMIT
            } else {
                THR_MIX_FLOOR
            };
            let rejected = *value;
            let fallback = if default.is_finite() { default } else { low };
            let corrected = clamp(if rejected.is_finite() { rejected } else { fallback }, low, high);
            if corrected != rejected {
                *value = corrected;
                report.push(Correction::Mix {
                    setting,
                    value: rejected,
                    corrected,
                });
            }
        }

        // mix_min <= THR_MIX_MIN_LIMIT <= mix_max, so only the manual preset can be out of order
        if mix.mix_man < mix.mix_min || mix.mix_man > mix.mix_max {
            let value = mix.mix_man;
            mix.mix_man = clamp(value, mix.mix_min, mix.mix_max);
            report.push(Correction::MixOrder {
                value,
                corrected: mix.mix_man,
            });
        }

        let time_constants = [
            (MixSetting::RiseTc, &mut mix.rise_tc, defaults.rise_tc),
            (MixSetting::FallTc, &mut mix.fall_tc, defaults.fall_tc),
        ];
        for (setting, value, default) in time_constants {
            if let Some(rejected) = correct(value, non_negative, default.max(0.)) {
                report.push(Correction::Mix {
                    setting,
                    value: rejected,
                    corrected: *value,
                });
            }
        }
    }

    fn check_boost(&self, config: &mut AttitudeControlConfig, report: &mut SanityReport) {
        let boost = &mut config.boost;
        let gain_boost = &mut config.gain_boost;
        let defaults = &self.defaults;

        let ceiling = gain_boost.gain_boost_ceiling;
        let corrected = if ceiling.is_finite() {
            clamp(ceiling, 1., GAIN_BOOST_CEILING_MAX)
        } else {
            1.
        };
        if corrected != ceiling {
            gain_boost.gain_boost_ceiling = corrected;
            report.push(Correction::Boost {
                setting: BoostSetting::GainBoostCeiling,
                value: ceiling,
                corrected,
            });
        }

        let settings: [(BoostSetting, &mut f32, f32, fn(f32) -> bool); 6] = [
            (
                BoostSetting::AngleBoostMax,
                &mut boost.angle_boost_max,
                defaults.boost.angle_boost_max.max(1.),
                |v| v >= 1.,
            ),
            (
                BoostSetting::LeanThrottleHeadroom,
                &mut boost.lean_throttle_headroom,
                clamp(defaults.boost.lean_throttle_headroom, 0.1, 1.),
                |v| v > 0. && v <= 1.,
            ),
            (
                BoostSetting::AngleLimitTc,
                &mut boost.angle_limit_tc,
                defaults.boost.angle_limit_tc.max(0.),
                non_negative,
            ),
            (
                BoostSetting::GainBoostThreshold,
                &mut gain_boost.slew_threshold,
                positive_or(defaults.gain_boost.slew_threshold, 1.),
                positive,
            ),
            (
                BoostSetting::GainBoostDecayTc,
                &mut gain_boost.decay_tc,
                defaults.gain_boost.decay_tc.max(0.),
                non_negative,
            ),
            (
                BoostSetting::GainBoostSlewFilter,
                &mut gain_boost.slew_filter_hz,
                positive_or(defaults.gain_boost.slew_filter_hz, 50.),
                positive,
            ),
        ];
        for (setting, value, default, valid) in settings {
            if let Some(rejected) = correct(value, valid, default) {
                report.push(Correction::Boost {
                    setting,
                    value: rejected,
                    corrected: *value,
                });
            }
        }
    }
}

fn check_rate_pid(
    axis: Axis,
    pid: &mut RatePidConfig,
    defaults: &RatePidConfig,
    report: &mut SanityReport,
) {
    let terms = [
        (PidTerm::P, &mut pid.p, defaults.p),
        (PidTerm::I, &mut pid.i, defaults.i),
        (PidTerm::D, &mut pid.d, defaults.d),
        (PidTerm::Ff, &mut pid.ff, defaults.ff),
        (PidTerm::Imax, &mut pid.imax, defaults.imax),
        (PidTerm::SlewMax, &mut pid.slew_max, defaults.slew_max),
    ];
    for (term, value, default) in terms {
        let default = if non_negative(default) { default } else { 0. };
        if let Some(rejected) = correct(value, non_negative, default) {
            report.push(Correction::PidGain {
                axis,
                term,
                value: rejected,
                corrected: *value,
            });
        }
    }

    if let Some(rejected) = correct(&mut pid.slew_tau, positive, positive_or(defaults.slew_tau, 1.)) {
        report.push(Correction::PidGain {
            axis,
            term: PidTerm::SlewTau,
            value: rejected,
            corrected: pid.slew_tau,
        });
    }

    let filters = [
        (PidFilter::Target, &mut pid.filt_t_hz, defaults.filt_t_hz),
        (PidFilter::Error, &mut pid.filt_e_hz, defaults.filt_e_hz),
        (PidFilter::Derivative, &mut pid.filt_d_hz, defaults.filt_d_hz),
    ];
    for (filter, value, default) in filters {
        if let Some(rejected) = correct(value, positive, positive_or(default, RATE_RPY_FILT_HZ)) {
            report.push(Correction::FilterCutoff {
                axis,
                filter,
                value: rejected,
                corrected: *value,
            });
        }
    }
}

/// Replace `value` with `fallback` unless `valid` accepts it, returning the rejected when replaced.
fn correct(value: &mut f32, valid: impl Fn(f32) -> bool, fallback: f32) -> Option<f32> {
    if valid(*value) {
        None
    } else {
        let rejected = *value;
        *value = fallback;
        Some(rejected)
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.
}

fn non_negative(value: f32) -> bool {
    value.is_finite() && value >= 0.
}

fn positive_or(value: f32, fallback: f32) -> f32 {
    if positive(value) {
        value
    } else {
        fallback
    }
}

fn clamp(value: f32, low: f32, high: f32) -> f32 {
    value.max(low).min(high)
}
