//! Single axis PID loop.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    integral: f64,
    /// None until the first sample after construction or a reset; the
    /// derivative is zero on that sample.
    prev_error: Option<f64>,
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            prev_error: None,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Accumulated error integral.
    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }

    /// Run one step and return the output clamped to `[-limit, limit]`.
    ///
    /// While the output is saturated and the error pushes further into the
    /// limit, the integral is frozen. A non-positive `dt` returns the
    /// proportional term alone and leaves the state untouched.
    pub fn update(&mut self, error: f64, dt: f64, limit: f64) -> f64 {
        let PidGains { kp, ki, kd } = self.gains;

        if !(dt.is_finite() && dt > 0.0) {
            return (kp * error).clamp(-limit, limit);
        }

        let derivative = match self.prev_error {
            Some(prev) => (error - prev) / dt,
            None => 0.0,
        };
        self.prev_error = Some(error);

        let integral = self.integral + error * dt;
        let unclamped = kp * error + ki * integral + kd * derivative;
        let output = unclamped.clamp(-limit, limit);

        let saturated = output != unclamped;
        if !(saturated && output.signum() == error.signum()) {
            self.integral = integral;
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// First order plant: the rate follows `b * (u - disturbance)`.
    fn settle(gains: PidGains, steps: usize) -> f64 {
        let (b, disturbance, dt, setpoint) = (5.0, 0.5, 0.01, 1.0);
        let mut pid = Pid::new(gains);
        let mut rate = 0.0;
        for _ in 0..steps {
            let u = pid.update(setpoint - rate, dt, 100.0);
            rate += b * (u - disturbance) * dt;
        }
        setpoint - rate
    }

    #[test]
    fn integral_removes_steady_state_error() {
        let error = settle(PidGains::new(2.0, 1.0, 0.0), 5000);
        assert!(error.abs() < 1e-4, "error = {error}");
    }

    #[test]
    fn proportional_only_leaves_disturbance_over_kp() {
        let error = settle(PidGains::new(2.0, 0.0, 0.0), 2000);
        assert!((error - 0.5 / 2.0).abs() < 1e-6, "error = {error}");
    }

    #[test]
    fn first_sample_has_no_derivative_kick() {
        let mut pid = Pid::new(PidGains::new(1.0, 0.0, 10.0));
        assert_eq!(pid.update(0.5, 0.01, 1000.0), 0.5);
        // Second sample sees the change.
        assert!((pid.update(0.6, 0.01, 1000.0) - (0.6 + 10.0 * 10.0)).abs() < 1e-9);

        pid.reset();
        assert_eq!(pid.update(2.0, 0.01, 100.0), 2.0);
    }

    #[test]
    fn saturation_freezes_the_integral() {
        let mut pid = Pid::new(PidGains::new(1.0, 1.0, 0.0));
        for _ in 0..100 {
            assert_eq!(pid.update(10.0, 0.1, 1.0), 1.0);
        }
        assert_eq!(pid.integral(), 0.0);

        // Error reversing out of saturation integrates again.
        pid.update(-0.5, 0.1, 1.0);
        assert!((pid.integral() + 0.05).abs() < 1e-12);
    }

    #[test]
    fn zero_dt_keeps_state() {
        let mut pid = Pid::new(PidGains::new(2.0, 1.0, 1.0));
        pid.update(1.0, 0.1, 10.0);
        let integral = pid.integral();
        assert_eq!(pid.update(3.0, 0.0, 10.0), 6.0);
        assert_eq!(pid.update(3.0, -1.0, 4.0), 4.0);
        assert_eq!(pid.integral(), integral);
    }
}
