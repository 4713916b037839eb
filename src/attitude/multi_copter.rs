use super::AttitudeControl;
use crate::{
    config::{AttitudeControlConfig, Axis},
    hal::{Ahrs, Motors},
    mix::MixUsage,
    sanity::{ParameterValidator, SanityReport},
    AxisRatePid, GainBooster, RateControllerSet, ThrottleBooster, ThrottleMixer,
};
use embedded_time::rate::Hertz;
use nalgebra::Vector3;

/// Rate control, throttle mixing and boosting of a multi-copter.
///
/// ```
/// use embedded_flight_rate::{
///     hal::{Ahrs, Limit, Motors},
///     AttitudeControl, MotorOutput, MultiCopterAttitudeControl,
/// };
/// use nalgebra::Vector3;
///
/// #[derive(Default)]
/// struct Quad {
///     output: MotorOutput,
///     throttle: f32,
/// }
///
/// impl Motors for Quad {
///     fn set_rate_output(&mut self, output: &MotorOutput) {
///         self.output = *output;
///     }
///     fn set_throttle(&mut self, throttle: f32) {
///         self.throttle = throttle;
///     }
///     fn set_throttle_avg_max(&mut self, _throttle_avg_max: f32) {}
///     fn limit(&self) -> Limit {
///         Limit::default()
///     }
///     fn throttle(&self) -> f32 {
///         self.throttle
///     }
///     fn throttle_out(&self) -> f32 {
///         self.throttle
///     }
///     fn throttle_hover(&self) -> f32 {
///         0.4
///     }
/// }
///
/// struct Level;
///
/// impl Ahrs for Level {
///     fn gyro(&self) -> Vector3<f32> {
///         Vector3::zeros()
///     }
///     fn cos_roll(&self) -> f32 {
///         1.
///     }
///     fn cos_pitch(&self) -> f32 {
///         1.
///     }
/// }
///
/// let mut controller = MultiCopterAttitudeControl::default();
/// let mut motors = Quad::default();
///
/// controller.set_throttle_out(&mut motors, &Level, 0.4, true, 0.);
/// controller.set_rate_target(Vector3::new(0.5, 0., 0.));
/// controller.rate_controller_run(&mut motors, &Level);
///
/// assert_eq!(motors.throttle, 0.4);
/// assert!(motors.output.control.x > 0.);
/// ```
#[derive(Clone, Debug)]
pub struct MultiCopterAttitudeControl {
    pub rate: RateControllerSet,
    pub mixer: ThrottleMixer,
    pub booster: ThrottleBooster,
    pub gain_booster: GainBooster,
    validator: ParameterValidator,
    loop_rate: Hertz<u32>,
    output_limit: f32,
}

impl Default for MultiCopterAttitudeControl {
    fn default() -> Self {
        Self::new(AttitudeControlConfig::default())
    }
}

impl MultiCopterAttitudeControl {
    pub fn new(config: AttitudeControlConfig) -> Self {
        Self {
            rate: RateControllerSet::new(&config),
            mixer: ThrottleMixer::new(config.mix),
            booster: ThrottleBooster::new(config.boost),
            gain_booster: GainBooster::new(config.gain_boost),
            validator: ParameterValidator::default(),
            loop_rate: config.loop_rate,
            output_limit: config.output_limit,
        }
    }

    /// Use `validator` for future sanity checks.
    pub fn with_validator(mut self, validator: ParameterValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Snapshot of the current parameters.
    pub fn config(&self) -> AttitudeControlConfig {
        let [roll, pitch, yaw] = self.rate.rate_pid_configs();
        AttitudeControlConfig {
            roll,
            pitch,
            yaw,
            mix: *self.mixer.config(),
            boost: *self.booster.config(),
            gain_boost: *self.gain_booster.config(),
            loop_rate: self.loop_rate,
            output_limit: self.output_limit,
        }
    }

    /// Replace the parameters, keeping the controller state.
    pub fn apply_config(&mut self, config: &AttitudeControlConfig) {
        self.rate.apply_config(config);
        self.mixer.set_config(config.mix);
        self.booster.set_config(config.boost);
        self.gain_booster.set_config(config.gain_boost);
        self.loop_rate = config.loop_rate;
        self.output_limit = config.output_limit;
    }
}

impl AttitudeControl for MultiCopterAttitudeControl {
    fn rate_controller_run_dt<M: Motors>(&mut self, motors: &mut M, gyro: Vector3<f32>, dt: f32) {
        self.gain_booster.update(motors.throttle_out(), dt);

        // Move throttle vs attitude mixing towards desired.
        // Called from here because this is conveniently called on every iteration
        self.mixer.advance_with_usage(
            dt,
            MixUsage {
                throttle_in: motors.throttle(),
                throttle_out: motors.throttle_out(),
                throttle_hover: motors.throttle_hover(),
            },
        );

        let output = self.rate.run_dt_with_limit(
            gyro,
            dt,
            motors.limit().rpy(),
            self.gain_booster.pd_scale(),
        );
        motors.set_rate_output(&output);
    }

    fn rate_controller_run<M: Motors, A: Ahrs>(&mut self, motors: &mut M, ahrs: &A) {
        let dt = self.rate.nominal_dt();
        self.rate_controller_run_dt(motors, ahrs.gyro(), dt);
    }

    fn rate_controller_target_reset(&mut self) {
        self.rate.reset_targets();
    }

    fn set_rate_target(&mut self, target: Vector3<f32>) {
        self.rate.set_target(target);
    }

    fn rate_target(&self) -> Vector3<f32> {
        self.rate.target()
    }

    fn set_throttle_out<M: Motors, A: Ahrs>(
        &mut self,
        motors: &mut M,
        ahrs: &A,
        throttle_in: f32,
        apply_boost: bool,
        filter_cutoff: f32,
    ) {
        self.update_althold_lean_angle_max(motors, throttle_in);

        let dt = self.rate.nominal_dt();
        let throttle =
            self.booster
                .set_output(throttle_in, apply_boost, filter_cutoff, ahrs.tilt_angle(), dt);
        motors.set_throttle(throttle);

        let throttle_avg_max = self.mixer.throttle_avg_max(
            self.booster.throttle_in().max(throttle),
            motors.throttle_hover(),
        );
        motors.set_throttle_avg_max(throttle_avg_max);
    }

    fn throttle_boosted<A: Ahrs>(&mut self, ahrs: &A, throttle_in: f32) -> f32 {
        self.booster.boost(throttle_in, ahrs.tilt_angle())
    }

    fn angle_boost(&self) -> f32 {
        self.booster.angle_boost()
    }

    fn set_throttle_mix_min(&mut self) {
        self.mixer.set_mix_to_min();
    }

    fn set_throttle_mix_man(&mut self) {
        self.mixer.set_mix_to_manual_preset();
    }

    fn set_throttle_mix_max(&mut self, ratio: f32) {
        self.mixer.set_mix_to_max_preset(ratio);
    }

    fn set_throttle_mix_value(&mut self, value: f32) {
        self.mixer.set_mix_value(value);
    }

    fn throttle_mix(&self) -> f32 {
        self.mixer.mix()
    }

    fn is_throttle_mix_min(&self) -> bool {
        self.mixer.is_near_min()
    }

    fn update_althold_lean_angle_max<M: Motors>(&mut self, motors: &M, throttle_in: f32) -> f32 {
        let dt = self.rate.nominal_dt();
        self.booster
            .compute_lean_angle_limit(throttle_in, motors.throttle_thrust_max(), dt)
    }

    fn althold_lean_angle_max(&self) -> f32 {
        self.booster.lean_angle_max()
    }

    fn angle_p_scale(&self) -> Vector3<f32> {
        self.gain_booster.angle_p_scale()
    }

    fn parameter_sanity_check(&mut self) -> SanityReport {
        let mut config = self.config();
        let report = self.validator.sanity_check(&mut config);
        if report.is_clean() {
            debug!("parameters ok");
        } else {
            warn!("{} parameters corrected", report.len());
            self.apply_config(&config);
        }
        report
    }

    fn rate_pid(&self, axis: Axis) -> &AxisRatePid {
        self.rate.pid(axis)
    }

    fn rate_pid_mut(&mut self, axis: Axis) -> &mut AxisRatePid {
        self.rate.pid_mut(axis)
    }
}

#[cfg(test)]
mod tests {
    use super::MultiCopterAttitudeControl;
    use crate::{
        config::{AttitudeControlConfig, Axis, GainBoostConfig},
        hal::{Ahrs, Limit, Motors},
        AttitudeControl, MotorOutput,
    };
    use approx::assert_relative_eq;
    use core::f32::consts::FRAC_PI_3;
    use nalgebra::Vector3;

    struct TestMotors {
        output: MotorOutput,
        throttle: f32,
        throttle_avg_max: f32,
        hover: f32,
        limit: Limit,
    }

    impl Default for TestMotors {
        fn default() -> Self {
            Self {
                output: MotorOutput::default(),
                throttle: 0.,
                throttle_avg_max: 0.,
                hover: 0.4,
                limit: Limit::default(),
            }
        }
    }

    impl Motors for TestMotors {
        fn set_rate_output(&mut self, output: &MotorOutput) {
            self.output = *output;
        }

        fn set_throttle(&mut self, throttle: f32) {
            self.throttle = throttle;
        }

        fn set_throttle_avg_max(&mut self, throttle_avg_max: f32) {
            self.throttle_avg_max = throttle_avg_max;
        }

        fn limit(&self) -> Limit {
            self.limit
        }

        fn throttle(&self) -> f32 {
            self.throttle
        }

        fn throttle_out(&self) -> f32 {
            self.throttle
        }

        fn throttle_hover(&self) -> f32 {
            self.hover
        }
    }

    struct TestAhrs {
        gyro: Vector3<f32>,
        roll: f32,
    }

    impl TestAhrs {
        fn level() -> Self {
            Self {
                gyro: Vector3::zeros(),
                roll: 0.,
            }
        }
    }

    impl Ahrs for TestAhrs {
        fn gyro(&self) -> Vector3<f32> {
            self.gyro
        }

        fn cos_roll(&self) -> f32 {
            self.roll.cos()
        }

        fn cos_pitch(&self) -> f32 {
            1.
        }
    }

    #[test]
    fn rate_output_reaches_motors() {
        let mut controller = MultiCopterAttitudeControl::default();
        let mut motors = TestMotors::default();
        let ahrs = TestAhrs {
            gyro: Vector3::new(0., 0.2, 0.),
            roll: 0.,
        };

        controller.set_rate_target(Vector3::new(1., 0., 0.));
        for _ in 0..10 {
            controller.rate_controller_run(&mut motors, &ahrs);
        }

        assert!(motors.output.control.x > 0.);
        assert!(motors.output.control.y < 0.);
        assert_relative_eq!(
            controller.rate_pid(Axis::Roll).integrator(),
            0.003375,
            epsilon = 1e-6
        );
    }

    #[test]
    fn saturated_motors_stop_wind_up() {
        let mut controller = MultiCopterAttitudeControl::default();
        let mut motors = TestMotors::default();
        controller.set_rate_target(Vector3::new(1., 0., 0.));
        controller.rate_controller_run_dt(&mut motors, Vector3::zeros(), 0.0025);
        let integrator = controller.rate_pid(Axis::Roll).integrator();

        motors.limit.roll = true;
        for _ in 0..10 {
            controller.rate_controller_run_dt(&mut motors, Vector3::zeros(), 0.0025);
        }
        assert_eq!(controller.rate_pid(Axis::Roll).integrator(), integrator);
    }

    #[test]
    fn invalid_dt_holds_output() {
        let mut controller = MultiCopterAttitudeControl::default();
        let mut motors = TestMotors::default();
        controller.set_rate_target(Vector3::new(0.5, -0.5, 0.1));
        controller.rate_controller_run_dt(&mut motors, Vector3::zeros(), 0.0025);
        let output = motors.output;
        let mix = controller.throttle_mix();

        controller.rate_controller_run_dt(&mut motors, Vector3::zeros(), 0.);
        controller.rate_controller_run_dt(&mut motors, Vector3::zeros(), f32::NAN);
        assert_eq!(motors.output, output);
        assert_eq!(controller.throttle_mix(), mix);
    }

    #[test]
    fn throttle_out_is_tilt_compensated() {
        let mut controller = MultiCopterAttitudeControl::default();
        let mut motors = TestMotors::default();
        let ahrs = TestAhrs {
            gyro: Vector3::zeros(),
            roll: FRAC_PI_3,
        };

        controller.set_throttle_out(&mut motors, &ahrs, 0.3, true, 0.);
        assert_relative_eq!(motors.throttle, 0.6, epsilon = 1e-5);
        assert_relative_eq!(controller.angle_boost(), 0.3, epsilon = 1e-5);
        // Never below the throttle itself
        assert_relative_eq!(motors.throttle_avg_max, 0.6, epsilon = 1e-5);

        controller.set_throttle_out(&mut motors, &ahrs, 0.3, false, 0.);
        assert_relative_eq!(motors.throttle, 0.3);
        assert_eq!(controller.angle_boost(), 0.);
        assert!(controller.althold_lean_angle_max() > 0.);
    }

    #[test]
    fn mix_falls_to_mix_in_use() {
        let mut controller = MultiCopterAttitudeControl::default();
        let mut motors = TestMotors::default();
        controller.set_throttle_out(&mut motors, &TestAhrs::level(), 0.2, false, 0.);
        assert!(!controller.is_throttle_mix_min());

        // The mixer is not raising the throttle at all, so no mix is in use
        controller.set_throttle_mix_min();
        controller.rate_controller_run(&mut motors, &TestAhrs::level());
        assert!(controller.is_throttle_mix_min());
        assert_relative_eq!(controller.throttle_mix(), 0.1);

        controller.set_throttle_mix_max(1.);
        for _ in 0..400 {
            controller.rate_controller_run(&mut motors, &TestAhrs::level());
        }
        assert_relative_eq!(controller.throttle_mix(), 0.5);
    }

    #[test]
    fn throttle_punch_boosts_gains() {
        let mut config = AttitudeControlConfig::default();
        config.gain_boost = GainBoostConfig {
            gain_boost_ceiling: 1.5,
            ..GainBoostConfig::default()
        };
        let mut controller = MultiCopterAttitudeControl::new(config);
        let mut motors = TestMotors::default();
        let ahrs = TestAhrs::level();

        let mut throttle = 0.2;
        for _ in 0..40 {
            throttle += 0.01;
            controller.set_throttle_out(&mut motors, &ahrs, throttle, false, 0.);
            controller.rate_controller_run(&mut motors, &ahrs);
        }
        assert_relative_eq!(controller.angle_p_scale(), Vector3::new(2.25, 2.25, 1.));
    }

    #[test]
    fn sanity_check_applies_corrections() {
        let mut config = AttitudeControlConfig::default();
        config.mix.mix_min = 0.5;
        config.mix.mix_man = 0.2;
        config.mix.mix_max = 0.9;
        config.yaw.filt_e_hz = -1.;
        let mut controller = MultiCopterAttitudeControl::new(config);

        let report = controller.parameter_sanity_check();
        assert_eq!(report.len(), 2);
        assert_eq!(controller.mixer.config().mix_man, 0.5);
        assert!(controller.rate_pid(Axis::Yaw).config().filt_e_hz > 0.);

        assert!(controller.parameter_sanity_check().is_clean());
    }

    #[test]
    fn target_reset_clears_state() {
        let mut controller = MultiCopterAttitudeControl::default();
        let mut motors = TestMotors::default();
        controller.set_rate_target(Vector3::new(1., 1., 1.));
        for _ in 0..20 {
            controller.rate_controller_run(&mut motors, &TestAhrs::level());
        }

        controller.rate_controller_target_reset();
        assert_eq!(controller.rate_target(), Vector3::zeros());
        for axis in Axis::ALL {
            assert_eq!(controller.rate_pid(axis).integrator(), 0.);
        }
    }
}
