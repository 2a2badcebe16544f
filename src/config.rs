//! Settings loading for the control core.
//!
//! Layers a bundled default TOML under an optional user-supplied TOML file
//! under environment variables (`TMS_*`), using `figment` the way the
//! teacher's "V5 configuration system" does. This replaces the older
//! `config`-crate based loading still present elsewhere in the dependency
//! tree; new code should only ever reach for `figment`.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ControlError, ControlResult};

/// Which physical robot driver to connect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotKind {
    Elfin,
    Dobot,
    Test,
}

/// Which movement algorithm drives the "move towards target" objective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementAlgorithm {
    RadiallyOutward,
    DirectlyUpward,
    DirectlyPid,
}

/// All configuration recognized by the control core (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub robot: RobotKindSetting,
    pub verbose: bool,
    pub use_force_sensor: bool,
    pub use_pressure_sensor: bool,
    pub com_port_pressure_sensor: Option<String>,
    pub movement_algorithm: MovementAlgorithmSetting,
    pub safe_height: f64,
    pub tuning_interval: Option<f64>,
    pub stop_robot_if_head_not_visible: bool,
    pub wait_for_keypress_before_movement: bool,
    pub dwell_time: f64,
    pub rx_offset: f64,
    pub ry_offset: f64,
    pub rz_offset: f64,
    pub working_space_radius: f64,
    pub robot_speed: f64,
}

/// Wraps [`RobotKind`] so an unrecognized string can be captured and
/// rejected with a proper [`ControlError`] instead of a generic deserialize
/// failure.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RobotKindSetting {
    Known(RobotKind),
    Unknown(String),
}

impl Default for RobotKindSetting {
    fn default() -> Self {
        RobotKindSetting::Known(RobotKind::Test)
    }
}

/// Wraps [`MovementAlgorithm`] the same way [`RobotKindSetting`] wraps
/// [`RobotKind`], so an unrecognized string is captured and rejected with
/// [`ControlError::UnknownAlgorithm`] instead of a generic deserialize
/// failure.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MovementAlgorithmSetting {
    Known(MovementAlgorithm),
    Unknown(String),
}

impl Default for MovementAlgorithm {
    fn default() -> Self {
        MovementAlgorithm::DirectlyPid
    }
}

impl Default for MovementAlgorithmSetting {
    fn default() -> Self {
        MovementAlgorithmSetting::Known(MovementAlgorithm::default())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            robot: RobotKindSetting::default(),
            verbose: false,
            use_force_sensor: false,
            use_pressure_sensor: false,
            com_port_pressure_sensor: None,
            movement_algorithm: MovementAlgorithmSetting::default(),
            safe_height: 150.0,
            tuning_interval: Some(1.0),
            stop_robot_if_head_not_visible: true,
            wait_for_keypress_before_movement: false,
            dwell_time: 1.0,
            rx_offset: 0.0,
            ry_offset: 0.0,
            rz_offset: 0.0,
            working_space_radius: 400.0,
            robot_speed: 10.0,
        }
    }
}

impl Settings {
    /// Loads settings from the bundled default, an optional override file,
    /// and `TMS_`-prefixed environment variables, in that precedence order.
    pub fn load(override_path: Option<&Path>) -> ControlResult<Settings> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        if let Some(path) = override_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("TMS_"));

        let settings: Settings = figment.extract().map_err(ControlError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects unknown `robot` / `movement_algorithm` values as a fatal
    /// configuration error, per spec §7.
    pub fn validate(&self) -> ControlResult<()> {
        if let RobotKindSetting::Unknown(ref name) = self.robot {
            return Err(ControlError::UnknownRobot(name.clone()));
        }
        if let MovementAlgorithmSetting::Unknown(ref name) = self.movement_algorithm {
            return Err(ControlError::UnknownAlgorithm(name.clone()));
        }
        if self.dwell_time < 0.0 {
            return Err(ControlError::Configuration(
                "dwell_time must be non-negative".to_string(),
            ));
        }
        if self.working_space_radius <= 0.0 {
            return Err(ControlError::Configuration(
                "working_space_radius must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn robot_kind(&self) -> ControlResult<RobotKind> {
        match &self.robot {
            RobotKindSetting::Known(kind) => Ok(*kind),
            RobotKindSetting::Unknown(name) => Err(ControlError::UnknownRobot(name.clone())),
        }
    }

    pub fn movement_algorithm_kind(&self) -> ControlResult<MovementAlgorithm> {
        match &self.movement_algorithm {
            MovementAlgorithmSetting::Known(algorithm) => Ok(*algorithm),
            MovementAlgorithmSetting::Unknown(name) => Err(ControlError::UnknownAlgorithm(name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unknown_robot_is_fatal() {
        let mut settings = Settings::default();
        settings.robot = RobotKindSetting::Unknown("acme_arm".to_string());
        assert!(matches!(
            settings.validate(),
            Err(ControlError::UnknownRobot(_))
        ));
    }

    #[test]
    fn test_unknown_movement_algorithm_is_fatal() {
        let mut settings = Settings::default();
        settings.movement_algorithm = MovementAlgorithmSetting::Unknown("acme_algo".to_string());
        assert!(matches!(
            settings.validate(),
            Err(ControlError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_tuning_interval_none_validates() {
        let mut settings = Settings::default();
        settings.tuning_interval = None;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_negative_dwell_time_rejected() {
        let mut settings = Settings::default();
        settings.dwell_time = -1.0;
        assert!(matches!(
            settings.validate(),
            Err(ControlError::Configuration(_))
        ));
    }
}
