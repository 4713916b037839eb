//! Collaborators of the attitude controller: the motor mixer it drives and the attitude
//! estimate it reads.

use crate::{constrain_float, MotorOutput};
use nalgebra::Vector3;
use num_traits::Float;

/// Saturation flags reported by the motor mixer for the last output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Limit {
    pub roll: bool,
    pub pitch: bool,
    pub yaw: bool,
    pub throttle_lower: bool,
    pub throttle_upper: bool,
}

impl Limit {
    /// Roll, pitch and yaw flags, used to stop integrator wind up.
    pub fn rpy(&self) -> [bool; 3] {
        [self.roll, self.pitch, self.yaw]
    }
}

/// Motor mixer fed by the attitude controller.
pub trait Motors {
    /// Set the roll, pitch and yaw torque and feed forward (in -1 ~ +1).
    fn set_rate_output(&mut self, output: &MotorOutput);

    /// Set the filtered, tilt compensated throttle (in 0 ~ 1).
    fn set_throttle(&mut self, throttle: f32);

    /// Set the throttle the mixer may raise the average to while keeping attitude control.
    fn set_throttle_avg_max(&mut self, throttle_avg_max: f32);

    fn limit(&self) -> Limit;

    /// Throttle demand into the mixer.
    fn throttle(&self) -> f32;

    /// Throttle after mixing.
    fn throttle_out(&self) -> f32;

    /// Throttle needed to hover.
    fn throttle_hover(&self) -> f32;

    /// Maximum thrust available as a fraction of full throttle.
    fn throttle_thrust_max(&self) -> f32 {
        1.
    }
}

/// Attitude and heading reference.
pub trait Ahrs {
    /// Latest body rates (in radians per second).
    fn gyro(&self) -> Vector3<f32>;

    fn cos_roll(&self) -> f32;

    fn cos_pitch(&self) -> f32;

    /// Angle (in radians) between the body z axis and vertical.
    fn tilt_angle(&self) -> f32 {
        constrain_float(self.cos_roll() * self.cos_pitch(), -1., 1.).acos()
    }
}

#[cfg(test)]
mod tests {
    use super::{Ahrs, Limit};
    use approx::assert_relative_eq;
    use core::f32::consts::FRAC_PI_3;
    use nalgebra::Vector3;

    struct Level(f32);

    impl Ahrs for Level {
        fn gyro(&self) -> Vector3<f32> {
            Vector3::zeros()
        }

        fn cos_roll(&self) -> f32 {
            self.0.cos()
        }

        fn cos_pitch(&self) -> f32 {
            1.
        }
    }

    #[test]
    fn tilt_from_roll() {
        assert_eq!(Level(0.).tilt_angle(), 0.);
        assert_relative_eq!(Level(FRAC_PI_3).tilt_angle(), FRAC_PI_3, epsilon = 1e-5);
    }

    #[test]
    fn rpy_flags() {
        let limit = Limit {
            pitch: true,
            ..Limit::default()
        };
        assert_eq!(limit.rpy(), [false, true, false]);
    }
}
