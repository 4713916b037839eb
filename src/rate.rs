use crate::{
    config::{AttitudeControlConfig, Axis, RatePidConfig},
    constrain_float, is_valid_dt, AxisRatePid,
};
use nalgebra::Vector3;
use num_traits::Float;

/// Motor output containing the desired roll, pitch, and yaw torque in -1 ~ +1.
/// `feed_forward` is the share of `control` driven directly by the target rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorOutput {
    pub control: Vector3<f32>,
    pub feed_forward: Vector3<f32>,
}

impl Default for MotorOutput {
    fn default() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }
}

impl MotorOutput {
    pub fn new(control: Vector3<f32>, feed_forward: Vector3<f32>) -> Self {
        Self {
            control,
            feed_forward,
        }
    }
}

/// The roll, pitch and yaw rate controllers.
///
/// ```
/// use embedded_flight_rate::{AttitudeControlConfig, RateControllerSet};
/// use nalgebra::Vector3;
///
/// let mut rate = RateControllerSet::new(&AttitudeControlConfig::default());
///
/// // Ask for a roll rate of 1 rad/s while hovering level
/// rate.set_target(Vector3::new(1., 0., 0.));
/// let output = rate.run_dt(Vector3::zeros(), 0.0025);
/// assert!(output.control.x > 0.);
/// ```
#[derive(Clone, Debug)]
pub struct RateControllerSet {
    pub roll: AxisRatePid,
    pub pitch: AxisRatePid,
    pub yaw: AxisRatePid,
    /// Target body rates (rad/s) for the next tick
    target: Vector3<f32>,
    output: MotorOutput,
    output_limit: f32,
    nominal_dt: f32,
}

impl RateControllerSet {
    pub fn new(config: &AttitudeControlConfig) -> Self {
        Self {
            roll: AxisRatePid::new(config.roll),
            pitch: AxisRatePid::new(config.pitch),
            yaw: AxisRatePid::new(config.yaw),
            target: Vector3::zeros(),
            output: MotorOutput::default(),
            output_limit: config.output_limit,
            nominal_dt: config.nominal_dt(),
        }
    }

    pub fn pid(&self, axis: Axis) -> &AxisRatePid {
        match axis {
            Axis::Roll => &self.roll,
            Axis::Pitch => &self.pitch,
            Axis::Yaw => &self.yaw,
        }
    }

    pub fn pid_mut(&mut self, axis: Axis) -> &mut AxisRatePid {
        match axis {
            Axis::Roll => &mut self.roll,
            Axis::Pitch => &mut self.pitch,
            Axis::Yaw => &mut self.yaw,
        }
    }

    /// Replace the gains of every axis and the loop settings without touching controller state.
    pub fn apply_config(&mut self, config: &AttitudeControlConfig) {
        for axis in Axis::ALL {
            self.pid_mut(axis).set_config(*config.rate_pid(axis));
        }
        self.output_limit = config.output_limit;
        self.nominal_dt = config.nominal_dt();
    }

    pub fn rate_pid_configs(&self) -> [RatePidConfig; 3] {
        [*self.roll.config(), *self.pitch.config(), *self.yaw.config()]
    }

    pub fn target(&self) -> Vector3<f32> {
        self.target
    }

    /// Set the body rate target (rad/s) used from the next tick.
    pub fn set_target(&mut self, target: Vector3<f32>) {
        self.target = target;
    }

    /// Output of the last accepted tick.
    pub fn output(&self) -> &MotorOutput {
        &self.output
    }

    pub fn nominal_dt(&self) -> f32 {
        self.nominal_dt
    }

    /// Run the rate controllers at the nominal loop rate.
    pub fn run(&mut self, gyro: Vector3<f32>) -> MotorOutput {
        self.run_dt(gyro, self.nominal_dt)
    }

    /// Run the rate controllers with `dt` seconds since the last tick.
    pub fn run_dt(&mut self, gyro: Vector3<f32>, dt: f32) -> MotorOutput {
        self.run_dt_with_limit(gyro, dt, [false; 3], Vector3::new(1., 1., 1.))
    }

    /// Run the rate controllers with a saturation limit per axis and a P and D scale per axis.
    /// A non-positive `dt` or non-finite input holds the previous output.
    pub fn run_dt_with_limit(
        &mut self,
        gyro: Vector3<f32>,
        dt: f32,
        limit: [bool; 3],
        pd_scale: Vector3<f32>,
    ) -> MotorOutput {
        // take a copy of the target so that it can't be changed from under us.
        let target = self.target;

        if !is_valid_dt(dt)
            || gyro.iter().any(|v| !v.is_finite())
            || target.iter().any(|v| !v.is_finite())
        {
            return self.output;
        }

        let output_limit = self.output_limit.abs();
        let mut control = Vector3::zeros();
        let mut feed_forward = Vector3::zeros();
        for axis in Axis::ALL {
            let i = axis.index();
            let pid = self.pid_mut(axis);
            let out = pid.update(target[i], gyro[i], dt, limit[i], pd_scale[i]);
            control[i] = constrain_float(out, -output_limit, output_limit);
            feed_forward[i] = constrain_float(pid.feed_forward(), -output_limit, output_limit);
        }

        self.output = MotorOutput::new(control, feed_forward);
        self.output
    }

    /// Zero the target and every axis's integrator and filters.
    pub fn reset_targets(&mut self) {
        self.target = Vector3::zeros();
        self.roll.reset();
        self.pitch.reset();
        self.yaw.reset();
        self.output = MotorOutput::default();
    }
}

#[cfg(test)]
mod tests {
    use super::{MotorOutput, RateControllerSet};
    use crate::config::{AttitudeControlConfig, Axis};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn roll_integrator_after_ten_ticks() {
        let mut rate = RateControllerSet::new(&AttitudeControlConfig::default());
        rate.set_target(Vector3::new(1., 0., 0.));
        for _ in 0..10 {
            rate.run_dt(Vector3::zeros(), 0.0025);
        }
        assert_relative_eq!(rate.roll.integrator(), 0.003375, epsilon = 1e-6);
        assert_eq!(rate.pitch.integrator(), 0.);
        assert_eq!(rate.yaw.integrator(), 0.);
    }

    #[test]
    fn negative_dt_is_a_no_op() {
        let mut rate = RateControllerSet::new(&AttitudeControlConfig::default());
        rate.set_target(Vector3::new(1., -0.5, 0.2));
        let before = rate.run_dt(Vector3::new(0.1, 0.1, 0.1), 0.0025);
        let integrators = [
            rate.roll.integrator(),
            rate.pitch.integrator(),
            rate.yaw.integrator(),
        ];

        let after = rate.run_dt(Vector3::new(0.1, 0.1, 0.1), -0.001);
        assert_eq!(after, before);
        assert_eq!(
            [
                rate.roll.integrator(),
                rate.pitch.integrator(),
                rate.yaw.integrator()
            ],
            integrators
        );

        let after = rate.run_dt(Vector3::new(f32::NAN, 0., 0.), 0.0025);
        assert_eq!(after, before);
    }

    #[test]
    fn motor_output_starts_at_zero() {
        let rate = RateControllerSet::new(&AttitudeControlConfig::default());
        let output: MotorOutput = *rate.output();
        assert_eq!(output, MotorOutput::default());
        assert_eq!(output.control, Vector3::zeros());
        assert_eq!(output.feed_forward, Vector3::zeros());
    }

    #[test]
    fn output_is_clamped() {
        let mut rate = RateControllerSet::new(&AttitudeControlConfig::default());
        rate.set_target(Vector3::new(100., -100., 100.));
        let output = rate.run(Vector3::zeros());
        assert_eq!(output.control, Vector3::new(1., -1., 1.));
    }

    #[test]
    fn limit_stops_wind_up() {
        let mut rate = RateControllerSet::new(&AttitudeControlConfig::default());
        rate.set_target(Vector3::new(1., 1., 0.));
        rate.run_dt(Vector3::zeros(), 0.0025);
        let roll = rate.roll.integrator();
        rate.run_dt_with_limit(
            Vector3::zeros(),
            0.0025,
            [true, false, false],
            Vector3::new(1., 1., 1.),
        );
        assert_eq!(rate.roll.integrator(), roll);
        assert!(rate.pitch.integrator() > roll);
    }

    #[test]
    fn reset_targets_is_idempotent() {
        let mut rate = RateControllerSet::new(&AttitudeControlConfig::default());
        rate.set_target(Vector3::new(0.3, 0.2, -0.4));
        for _ in 0..50 {
            rate.run_dt(Vector3::new(0.1, 0., 0.), 0.0025);
        }

        rate.reset_targets();
        let once = (rate.target(), *rate.output(), rate.roll.integrator());
        rate.reset_targets();
        assert_eq!((rate.target(), *rate.output(), rate.roll.integrator()), once);
        for axis in Axis::ALL {
            assert_eq!(rate.pid(axis).integrator(), 0.);
        }
    }
}
