use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Drive-train variants the controller can be configured for.
///
/// Selected once from configuration; only [`RobotVariant::Dd`] has a motion
/// profile implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RobotVariant {
    /// Differential drive: forward speed + yaw rate.
    #[default]
    #[serde(rename = "DD", alias = "dd")]
    Dd,
    /// Four-wheel independent steering.  Not implemented.
    #[serde(rename = "FWDIS", alias = "fwdis")]
    Fwdis,
}

impl std::fmt::Display for RobotVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RobotVariant::Dd => write!(f, "DD"),
            RobotVariant::Fwdis => write!(f, "FWDIS"),
        }
    }
}

impl std::str::FromStr for RobotVariant {
    type Err = RoboError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DD" => Ok(RobotVariant::Dd),
            "FWDIS" => Ok(RobotVariant::Fwdis),
            other => Err(RoboError::InvalidConfig(format!(
                "unknown robot variant '{other}' (expected DD or FWDIS)"
            ))),
        }
    }
}

/// Velocity command sent to the drive base once per control tick.
///
/// Mirrors the three fields of a planar `cmd_vel` message.  `linear_y` is
/// always zero for a differential drive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// Forward speed (m/s).
    pub linear_x: f64,
    /// Lateral speed (m/s).
    pub linear_y: f64,
    /// Yaw rate (rad/s).
    pub angular_z: f64,
}

impl VelocityCommand {
    pub fn new(linear_x: f64, linear_y: f64, angular_z: f64) -> Self {
        Self {
            linear_x,
            linear_y,
            angular_z,
        }
    }

    /// The all-zero (stop) command.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Error type shared by the controller, the drive sinks and configuration.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoboError {
    #[error("Unsupported robot variant: {0}")]
    UnsupportedVariant(RobotVariant),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },
}
