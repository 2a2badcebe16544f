//! PID Group: translational and rotational control loops with force-axis
//! coupling on Z (spec §4.3).
//!
//! Each loop has the textbook form `u = Kp*e + Ki*integral(e) + Kd*de/dt`
//! with integrator clamping and output saturation. Timestamps are passed
//! in explicitly rather than read from the wall clock, so that outputs are
//! a pure function of the input sequence (spec §8 invariant 5/6).

use nalgebra::Vector3;

/// Proportional/integral/derivative gains for one loop.
#[derive(Clone, Copy, Debug)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        PidGains { kp: 1.0, ki: 0.0, kd: 0.0 }
    }
}

/// A single PID loop with integrator clamping and output saturation.
#[derive(Clone, Copy, Debug)]
pub struct PidController {
    gains: PidGains,
    setpoint: f64,
    integral: f64,
    prev_error: Option<f64>,
    integral_limit: f64,
    output_limit: f64,
}

impl PidController {
    pub fn new(gains: PidGains, setpoint: f64, integral_limit: f64, output_limit: f64) -> Self {
        PidController {
            gains,
            setpoint,
            integral: 0.0,
            prev_error: None,
            integral_limit,
            output_limit,
        }
    }

    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Advances the loop by `dt` seconds given `process_variable`, returning
    /// the saturated control output. Error is `process_variable - setpoint`
    /// (e.g. with a zero displacement setpoint, error is the displacement
    /// itself, so commanding the output directly closes the gap).
    pub fn update(&mut self, process_variable: f64, dt: f64) -> f64 {
        let error = process_variable - self.setpoint;

        self.integral = (self.integral + error * dt).clamp(-self.integral_limit, self.integral_limit);

        let derivative = match self.prev_error {
            Some(prev) if dt > 0.0 => (error - prev) / dt,
            _ => 0.0,
        };
        self.prev_error = Some(error);

        let output = self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative;
        output.clamp(-self.output_limit, self.output_limit)
    }

    /// Zeroes the integrator and prior-error memory, per spec §4.3.
    pub fn clear(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }
}

/// Bundles the six PID loops (x, y, z, rx, ry, rz) the controller drives
/// each tick.
pub struct PidGroup {
    x: PidController,
    y: PidController,
    z_displacement: PidController,
    z_force: PidController,
    rx: PidController,
    ry: PidController,
    rz: PidController,
    use_force: bool,
    last_translation: Vector3<f64>,
    last_rotation: Vector3<f64>,
}

impl PidGroup {
    pub fn new(gains: PidGains, integral_limit: f64, output_limit: f64, use_force: bool, force_setpoint: f64) -> Self {
        let make = |setpoint: f64| PidController::new(gains, setpoint, integral_limit, output_limit);
        PidGroup {
            x: make(0.0),
            y: make(0.0),
            z_displacement: make(0.0),
            z_force: make(force_setpoint),
            rx: make(0.0),
            ry: make(0.0),
            rz: make(0.0),
            use_force,
            last_translation: Vector3::zeros(),
            last_rotation: Vector3::zeros(),
        }
    }

    /// Updates the x, y, z translational loops for one tick of `dt`
    /// seconds. When a force source is enabled, `force_feedback` drives
    /// the Z loop against the force setpoint instead of the raw Z
    /// displacement.
    pub fn update_translation(&mut self, displacement_xyz: Vector3<f64>, force_feedback: Option<f64>, dt: f64) {
        let out_x = self.x.update(displacement_xyz.x, dt);
        let out_y = self.y.update(displacement_xyz.y, dt);
        let out_z = if self.use_force {
            match force_feedback {
                Some(force) => self.z_force.update(force, dt),
                None => self.z_displacement.update(displacement_xyz.z, dt),
            }
        } else {
            self.z_displacement.update(displacement_xyz.z, dt)
        };
        self.last_translation = Vector3::new(out_x, out_y, out_z);
    }

    /// Updates the rx, ry, rz rotational loops for one tick of `dt` seconds.
    pub fn update_rotation(&mut self, angles_deg: Vector3<f64>, dt: f64) {
        let out_rx = self.rx.update(angles_deg.x, dt);
        let out_ry = self.ry.update(angles_deg.y, dt);
        let out_rz = self.rz.update(angles_deg.z, dt);
        self.last_rotation = Vector3::new(out_rx, out_ry, out_rz);
    }

    pub fn get_outputs(&self) -> (Vector3<f64>, Vector3<f64>) {
        (self.last_translation, self.last_rotation)
    }

    pub fn get_force_setpoint(&self) -> f64 {
        self.z_force.setpoint()
    }

    pub fn set_force_setpoint(&mut self, setpoint: f64) {
        self.z_force.set_setpoint(setpoint);
    }

    /// Zeroes every loop's integrator and prior error, and the last
    /// reported outputs. Called on target change, objective change, or
    /// movement-algorithm reset (spec §4.3).
    pub fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
        self.z_displacement.clear();
        self.z_force.clear();
        self.rx.clear();
        self.ry.clear();
        self.rz.clear();
        self.last_translation = Vector3::zeros();
        self.last_rotation = Vector3::zeros();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_then_zero_input_gives_zero_output() {
        let mut group = PidGroup::new(PidGains { kp: 2.0, ki: 0.5, kd: 0.1 }, 100.0, 50.0, false, 0.0);
        group.update_translation(Vector3::new(5.0, 5.0, 5.0), None, 0.1);
        group.update_translation(Vector3::new(5.0, 5.0, 5.0), None, 0.1);
        group.clear();
        group.update_translation(Vector3::zeros(), None, 0.1);
        let (translation, _) = group.get_outputs();
        assert_eq!(translation, Vector3::zeros());
    }

    #[test]
    fn test_proportional_only_output_matches_error() {
        let mut group = PidGroup::new(PidGains { kp: 1.0, ki: 0.0, kd: 0.0 }, 100.0, 50.0, false, 0.0);
        group.update_translation(Vector3::new(2.0, -3.0, 0.5), None, 0.1);
        let (translation, _) = group.get_outputs();
        assert!((translation.x - 2.0).abs() < 1e-9);
        assert!((translation.y - (-3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_force_axis_couples_z_when_enabled() {
        let mut group = PidGroup::new(PidGains { kp: 1.0, ki: 0.0, kd: 0.0 }, 100.0, 50.0, true, 2.0);
        group.update_translation(Vector3::new(0.0, 0.0, 100.0), Some(1.0), 0.1);
        let (translation, _) = group.get_outputs();
        // error = feedback(1.0) - setpoint(2.0) = -1.0, not the raw 100.0 displacement.
        assert!((translation.z - (-1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_output_saturation() {
        let mut group = PidGroup::new(PidGains { kp: 100.0, ki: 0.0, kd: 0.0 }, 100.0, 5.0, false, 0.0);
        group.update_translation(Vector3::new(10.0, 0.0, 0.0), None, 0.1);
        let (translation, _) = group.get_outputs();
        assert_eq!(translation.x, 5.0);
    }
}
