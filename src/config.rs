//! Flight parameters for the rate controller, throttle mixing and boosting.
//!
//! These are built once from the vehicle's parameter store and corrected by
//! [`ParameterValidator`](crate::ParameterValidator) before arming.

use core::fmt;
use embedded_time::rate::Hertz;

// Default rate controller PID gains
pub const RATE_RP_P: f32 = 0.135;
pub const RATE_RP_I: f32 = 0.135;
pub const RATE_RP_D: f32 = 0.0036;
pub const RATE_RP_IMAX: f32 = 0.5;
pub const RATE_RPY_FILT_HZ: f32 = 20.;
/// Roll and pitch error filter, kept well above the derivative filter to limit phase lag
pub const RATE_RP_FILT_E_HZ: f32 = 80.;
pub const RATE_YAW_P: f32 = 0.180;
pub const RATE_YAW_I: f32 = 0.018;
pub const RATE_YAW_D: f32 = 0.;
pub const RATE_YAW_IMAX: f32 = 0.5;
pub const RATE_YAW_FILT_HZ: f32 = 2.5;

// Throttle vs attitude mix presets and limits
pub const THR_MIX_MIN_DEFAULT: f32 = 0.1;
pub const THR_MIX_MAN_DEFAULT: f32 = 0.1;
pub const THR_MIX_MAX_DEFAULT: f32 = 0.5;
/// Lowest mix the controller will ever use
pub const THR_MIX_FLOOR: f32 = 0.1;
/// Highest mix the minimum preset may take
pub const THR_MIX_MIN_LIMIT: f32 = 0.5;
/// Highest mix the manual preset may take
pub const THR_MIX_MAN_LIMIT: f32 = 4.0;
/// Highest mix the controller will ever use
pub const THR_MIX_CEILING: f32 = 5.0;

/// Nominal loop rate of the rate controller
pub const LOOP_RATE_HZ: u32 = 400;

/// Highest gain boost multiplier
pub const GAIN_BOOST_CEILING_MAX: f32 = 2.0;

/// Body axis of a rate controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Axis {
    Roll,
    Pitch,
    Yaw,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Roll, Axis::Pitch, Axis::Yaw];

    pub fn index(self) -> usize {
        match self {
            Axis::Roll => 0,
            Axis::Pitch => 1,
            Axis::Yaw => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Roll => write!(f, "roll"),
            Axis::Pitch => write!(f, "pitch"),
            Axis::Yaw => write!(f, "yaw"),
        }
    }
}

/// Gains, filters and slew limiting of one [`AxisRatePid`](crate::AxisRatePid).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatePidConfig {
    pub p: f32,
    pub i: f32,
    pub d: f32,
    /// Feed forward gain applied to the filtered target
    pub ff: f32,
    /// Maximum magnitude of the integrator
    pub imax: f32,
    /// Target filter cutoff (Hz)
    pub filt_t_hz: f32,
    /// Error filter cutoff (Hz). Every pole adds phase lag to the P and D terms,
    /// about 2 ms at 80 Hz and 8 ms at 20 Hz
    pub filt_e_hz: f32,
    /// Derivative filter cutoff (Hz)
    pub filt_d_hz: f32,
    /// Maximum output slew rate before P and D are reduced, zero disables slew limiting
    pub slew_max: f32,
    /// Time constant (in seconds) for the slew rate decay
    pub slew_tau: f32,
}

impl RatePidConfig {
    pub const fn roll_pitch() -> Self {
        Self {
            p: RATE_RP_P,
            i: RATE_RP_I,
            d: RATE_RP_D,
            ff: 0.,
            imax: RATE_RP_IMAX,
            filt_t_hz: RATE_RPY_FILT_HZ,
            filt_e_hz: RATE_RP_FILT_E_HZ,
            filt_d_hz: RATE_RPY_FILT_HZ,
            slew_max: 0.,
            slew_tau: 1.,
        }
    }

    pub const fn yaw() -> Self {
        Self {
            p: RATE_YAW_P,
            i: RATE_YAW_I,
            d: RATE_YAW_D,
            ff: 0.,
            imax: RATE_YAW_IMAX,
            filt_t_hz: RATE_RPY_FILT_HZ,
            filt_e_hz: RATE_YAW_FILT_HZ,
            filt_d_hz: RATE_RPY_FILT_HZ,
            slew_max: 0.,
            slew_tau: 1.,
        }
    }

    /// Compiled-in defaults for `axis`.
    pub const fn for_axis(axis: Axis) -> Self {
        match axis {
            Axis::Roll | Axis::Pitch => Self::roll_pitch(),
            Axis::Yaw => Self::yaw(),
        }
    }
}

/// Throttle vs attitude mixing presets.
/// Higher values prioritise attitude control over throttle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixConfig {
    /// Mix used when landing
    pub mix_min: f32,
    /// Mix used with manual throttle
    pub mix_man: f32,
    /// Mix used during active flight
    pub mix_max: f32,
    /// Time (in seconds) to raise the mix by one
    pub rise_tc: f32,
    /// Time (in seconds) to lower the mix by one
    pub fall_tc: f32,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            mix_min: THR_MIX_MIN_DEFAULT,
            mix_man: THR_MIX_MAN_DEFAULT,
            mix_max: THR_MIX_MAX_DEFAULT,
            // 0.1 to 0.9 in 0.4 seconds
            rise_tc: 0.5,
            // 0.9 to 0.1 in 1.6 seconds
            fall_tc: 2.0,
        }
    }
}

/// Angle boost and lean angle limiting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoostConfig {
    pub angle_boost_enabled: bool,
    /// Largest factor the throttle may be multiplied by to compensate for tilt
    pub angle_boost_max: f32,
    /// Fraction of the maximum thrust that may be spent holding altitude while leaning
    pub lean_throttle_headroom: f32,
    /// Time constant (in seconds) of the lean angle limit filter
    pub angle_limit_tc: f32,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            angle_boost_enabled: true,
            angle_boost_max: 10.,
            lean_throttle_headroom: 0.8,
            angle_limit_tc: 1.,
        }
    }
}

/// Gain boosting on rapid throttle changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainBoostConfig {
    /// Multiplier applied to the P and D gains while boosting, one disables boosting
    pub gain_boost_ceiling: f32,
    /// Throttle slew rate (per second) above which the gains are boosted
    pub slew_threshold: f32,
    /// Time constant (in seconds) of the decay back to unboosted gains
    pub decay_tc: f32,
    /// Cutoff (Hz) of the throttle slew rate filter
    pub slew_filter_hz: f32,
}

impl Default for GainBoostConfig {
    fn default() -> Self {
        Self {
            gain_boost_ceiling: 1.,
            slew_threshold: 1.,
            decay_tc: 0.25,
            slew_filter_hz: 50.,
        }
    }
}

/// Every recognised option of the multi-copter rate controller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttitudeControlConfig {
    pub roll: RatePidConfig,
    pub pitch: RatePidConfig,
    pub yaw: RatePidConfig,
    pub mix: MixConfig,
    pub boost: BoostConfig,
    pub gain_boost: GainBoostConfig,
    /// Nominal rate of the control loop
    pub loop_rate: Hertz<u32>,
    /// Largest magnitude of a normalized torque command
    pub output_limit: f32,
}

impl Default for AttitudeControlConfig {
    fn default() -> Self {
        Self {
            roll: RatePidConfig::roll_pitch(),
            pitch: RatePidConfig::roll_pitch(),
            yaw: RatePidConfig::yaw(),
            mix: MixConfig::default(),
            boost: BoostConfig::default(),
            gain_boost: GainBoostConfig::default(),
            loop_rate: Hertz(LOOP_RATE_HZ),
            output_limit: 1.,
        }
    }
}

impl AttitudeControlConfig {
    pub fn rate_pid(&self, axis: Axis) -> &RatePidConfig {
        match axis {
            Axis::Roll => &self.roll,
            Axis::Pitch => &self.pitch,
            Axis::Yaw => &self.yaw,
        }
    }

    pub fn rate_pid_mut(&mut self, axis: Axis) -> &mut RatePidConfig {
        match axis {
            Axis::Roll => &mut self.roll,
            Axis::Pitch => &mut self.pitch,
            Axis::Yaw => &mut self.yaw,
        }
    }

    /// Nominal time step (in seconds) of the control loop.
    pub fn nominal_dt(&self) -> f32 {
        if self.loop_rate.0 == 0 {
            1. / LOOP_RATE_HZ as f32
        } else {
            1. / self.loop_rate.0 as f32
        }
    }
}
