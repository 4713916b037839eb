use crate::{config::RatePidConfig, filter::alpha, is_valid_dt};

mod slew_limiter;
pub use slew_limiter::SlewLimiter;

/// Telemetry snapshot of the last update of a PID.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Info {
    pub target: f32,
    pub actual: f32,
    pub error: f32,
    pub p: f32,
    pub i: f32,
    pub d: f32,
    pub ff: f32,
    pub d_mod: f32,
    pub slew_rate: f32,
    pub limit: bool,
}

/// Single axis rate PID with target, error and derivative filtering,
/// feed forward and slew rate limiting of the P and D terms.
///
/// ```
/// use embedded_flight_rate::{AxisRatePid, RatePidConfig};
///
/// let mut pid = AxisRatePid::new(RatePidConfig::roll_pitch());
///
/// // Target 1 rad/s while the gyro reads 0 rad/s
/// let output = pid.update(1., 0., 0.0025, false, 1.);
/// assert!(output > 0.);
/// ```
#[derive(Clone, Debug)]
pub struct AxisRatePid {
    config: RatePidConfig,
    reset_filter: bool,
    target: f32,
    error: f32,
    derivative: f32,
    integrator: f32,
    output: f32,
    slew_limiter: SlewLimiter<2>,
    info: Info,
}

impl AxisRatePid {
    pub fn new(config: RatePidConfig) -> Self {
        Self {
            config,
            reset_filter: true,
            target: 0.,
            error: 0.,
            derivative: 0.,
            integrator: 0.,
            output: 0.,
            slew_limiter: SlewLimiter::new(),
            info: Info::default(),
        }
    }

    pub fn config(&self) -> &RatePidConfig {
        &self.config
    }

    /// Gains and filters for tuning. Takes effect on the next update.
    pub fn config_mut(&mut self) -> &mut RatePidConfig {
        &mut self.config
    }

    pub fn set_config(&mut self, config: RatePidConfig) {
        self.config = config;
    }

    pub fn integrator(&self) -> f32 {
        self.integrator
    }

    /// Output of the last accepted update.
    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn feed_forward(&self) -> f32 {
        self.target * self.config.ff
    }

    /// Update the integral part of this PID.
    /// If the limit flag is set the integral is only allowed to shrink.
    fn update_integral(&mut self, limit: bool, dt: f32) {
        let imax = self.config.imax.max(0.);
        if self.config.i != 0. && dt > 0. {
            // Ensure that integrator can only be reduced if the output is saturated
            if !limit
                || (self.integrator > 0. && self.error < 0.)
                || (self.integrator < 0. && self.error > 0.)
            {
                self.integrator += self.error * self.config.i * dt;
            }
            // imax may have been lowered since the last update
            self.integrator = self.integrator.max(-imax).min(imax);
        } else {
            self.integrator = 0.;
        }
        self.info.i = self.integrator;
        self.info.limit = limit;
    }

    /// Update target and measured inputs to the PID controller and calculate output.
    /// Target and error are filtered,
    /// then derivative is calculated and filtered,
    /// then the integral is then updated based on the setting of the limit flag.
    ///
    /// `pd_scale` multiplies the P and D terms for this update only.
    /// A non-positive `dt` or non-finite input leaves the state untouched and returns the previous output.
    pub fn update(
        &mut self,
        target: f32,
        measurement: f32,
        dt: f32,
        limit: bool,
        pd_scale: f32,
    ) -> f32 {
        // don't process inf or NaN
        if !is_valid_dt(dt) || !target.is_finite() || !measurement.is_finite() {
            return self.output;
        }

        // reset input filter to value received
        if self.reset_filter {
            self.reset_filter = false;
            self.target = target;
            self.error = self.target - measurement;
            self.derivative = 0.;
        } else {
            let error_last = self.error;
            self.target += alpha(dt, self.config.filt_t_hz) * (target - self.target);
            self.error +=
                alpha(dt, self.config.filt_e_hz) * ((self.target - measurement) - self.error);

            // calculate and filter derivative
            let derivative = (self.error - error_last) / dt;
            self.derivative += alpha(dt, self.config.filt_d_hz) * (derivative - self.derivative);
        }

        // update I term
        self.update_integral(limit, dt);

        let mut p_out = self.error * self.config.p;
        let mut d_out = self.derivative * self.config.d;

        // calculate slew limit modifier for P+D
        self.info.d_mod = self.slew_limiter.modifier(
            self.info.p + self.info.d,
            self.config.slew_max,
            self.config.slew_tau,
            dt,
        );
        self.info.slew_rate = self.slew_limiter.output_slew_rate;

        p_out *= self.info.d_mod * pd_scale;
        d_out *= self.info.d_mod * pd_scale;

        let ff_out = self.feed_forward();

        self.info.target = self.target;
        self.info.actual = measurement;
        self.info.error = self.error;
        self.info.p = p_out;
        self.info.d = d_out;
        self.info.ff = ff_out;

        self.output = p_out + self.integrator + d_out + ff_out;
        self.output
    }

    pub fn reset_integrator(&mut self) {
        self.integrator = 0.;
        self.info.i = 0.;
    }

    /// Zero the integrator, filters and target. The next update re-initialises the filters.
    pub fn reset(&mut self) {
        self.reset_filter = true;
        self.target = 0.;
        self.error = 0.;
        self.derivative = 0.;
        self.integrator = 0.;
        self.output = 0.;
        self.slew_limiter.reset();
        self.info = Info::default();
    }
}
