use crate::{
    config::Axis,
    hal::{Ahrs, Motors},
    sanity::SanityReport,
    AxisRatePid,
};
use nalgebra::Vector3;

mod multi_copter;
pub use multi_copter::MultiCopterAttitudeControl;

/// Rate-domain attitude control of a vehicle.
///
/// The outer angle loop sets a body rate target and a throttle demand, then every tick
/// [`rate_controller_run`](Self::rate_controller_run) turns them into motor commands.
pub trait AttitudeControl {
    /// Run the rate controllers `dt` seconds after the last tick and send the torque to `motors`.
    fn rate_controller_run_dt<M: Motors>(&mut self, motors: &mut M, gyro: Vector3<f32>, dt: f32);

    /// Run the rate controllers at the nominal loop rate with the latest gyro from `ahrs`.
    fn rate_controller_run<M: Motors, A: Ahrs>(&mut self, motors: &mut M, ahrs: &A);

    /// Zero the rate target, integrators and filters (e.g. while landed).
    fn rate_controller_target_reset(&mut self);

    /// Set the body rate target (in radians per second) for the next tick.
    fn set_rate_target(&mut self, target: Vector3<f32>);

    fn rate_target(&self) -> Vector3<f32>;

    /// Send the throttle demand (in 0 ~ 1) to `motors`, optionally tilt compensated and
    /// filtered with `filter_cutoff` Hz.
    fn set_throttle_out<M: Motors, A: Ahrs>(
        &mut self,
        motors: &mut M,
        ahrs: &A,
        throttle_in: f32,
        apply_boost: bool,
        filter_cutoff: f32,
    );

    /// Tilt compensated `throttle_in` without changing the output.
    fn throttle_boosted<A: Ahrs>(&mut self, ahrs: &A, throttle_in: f32) -> f32;

    /// Throttle added by the last angle boost.
    fn angle_boost(&self) -> f32;

    fn set_throttle_mix_min(&mut self);

    fn set_throttle_mix_man(&mut self);

    /// Blend between the minimum (`ratio` 0) and active flight (`ratio` 1) mix.
    fn set_throttle_mix_max(&mut self, ratio: f32);

    fn set_throttle_mix_value(&mut self, value: f32);

    fn throttle_mix(&self) -> f32;

    /// Returns true if attitude control is deprioritised in favour of throttle.
    fn is_throttle_mix_min(&self) -> bool;

    /// Update the lean angle limit for altitude hold and return it (in radians).
    fn update_althold_lean_angle_max<M: Motors>(&mut self, motors: &M, throttle_in: f32) -> f32;

    fn althold_lean_angle_max(&self) -> f32;

    /// Roll, pitch and yaw scale for the angle P gains of the outer loop.
    fn angle_p_scale(&self) -> Vector3<f32>;

    /// Correct the parameters before arming.
    fn parameter_sanity_check(&mut self) -> SanityReport;

    fn rate_pid(&self, axis: Axis) -> &AxisRatePid;

    fn rate_pid_mut(&mut self, axis: Axis) -> &mut AxisRatePid;
}
