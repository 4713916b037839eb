//! # embedded-flight-rate
//! The `#![no_std]`, allocation-free rate-domain core of a multi-copter attitude controller.
//!
//! # Controllers
//! [`RateControllerSet`] runs the roll, pitch and yaw [`AxisRatePid`] loops against the gyro
//! and produces normalized torque commands.
//!
//! [`ThrottleMixer`] slews the throttle vs attitude priority used by the motor mixer when
//! outputs saturate.
//!
//! [`ThrottleBooster`] tilt-compensates the throttle demand and limits the lean angle the outer
//! loop may request.
//!
//! [`GainBooster`] sharpens the angle and rate gains during rapid throttle changes.
//!
//! [`ParameterValidator`] corrects the configuration once before arming.
//!
//! # Multi-copter components
//! [`MultiCopterAttitudeControl`] ties the above together behind the [`AttitudeControl`] trait,
//! talking to the motor mixer through [`Motors`](hal::Motors) and to the attitude estimate
//! through [`Ahrs`](hal::Ahrs).

#![no_std]

#[macro_use]
mod fmt;

pub mod attitude;
pub use attitude::{AttitudeControl, MultiCopterAttitudeControl};

pub mod config;
pub use config::{AttitudeControlConfig, Axis, BoostConfig, MixConfig, RatePidConfig};

pub mod filter;

pub mod gain_boost;
pub use gain_boost::GainBooster;

pub mod hal;
pub use hal::{Ahrs, Limit, Motors};

pub mod mix;
pub use mix::ThrottleMixer;

pub mod pid;
pub use pid::AxisRatePid;

pub mod rate;
pub use rate::{MotorOutput, RateControllerSet};

pub mod sanity;
pub use sanity::{Correction, ParameterValidator, SanityReport};

pub mod throttle;
pub use throttle::ThrottleBooster;

/// Constrain `amt` to `low..=high`, returning the midpoint for NaN.
pub(crate) fn constrain_float(amt: f32, low: f32, high: f32) -> f32 {
    if amt.is_nan() {
        return (low + high) / 2.0;
    }

    if amt < low {
        return low;
    }

    if amt > high {
        return high;
    }

    amt
}

/// Returns true if `dt` is a usable, strictly positive time step.
pub(crate) fn is_valid_dt(dt: f32) -> bool {
    dt.is_finite() && dt > 0.
}

#[cfg(test)]
mod tests {
    use super::constrain_float;

    #[test]
    fn constrain_nan_to_midpoint() {
        assert_eq!(constrain_float(f32::NAN, 0., 1.), 0.5);
        assert_eq!(constrain_float(-3., 0., 1.), 0.);
        assert_eq!(constrain_float(3., 0., 1.), 1.);
        assert_eq!(constrain_float(0.25, 0., 1.), 0.25);
    }
}
