//! Configuration Vault – reads/writes `~/.robomech/config.toml`.

use robomech_hal::sim::SimConfig;
use robomech_perception::estimator::YawRateMode;
use robomech_runtime::control_loop::LoopConfig;
use robomech_runtime::controller::MotionProfile;
use robomech_types::{RoboError, RobotVariant};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// `[estimator]` table.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EstimatorSection {
    /// How yaw differences become a rate (`"raw"` or `"wrapped"`).
    #[serde(default)]
    pub yaw_rate: YawRateMode,
}

/// `[sim]` table: the built-in kinematic drive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimSection {
    /// Achieved / commanded linear speed.
    #[serde(default = "default_linear_gain")]
    pub linear_gain: f64,
    /// Ticks before the robot transform first appears.
    #[serde(default = "default_unavailable_ticks")]
    pub unavailable_ticks: u32,
}

impl Default for SimSection {
    fn default() -> Self {
        Self {
            linear_gain: default_linear_gain(),
            unavailable_ticks: default_unavailable_ticks(),
        }
    }
}

/// Persisted configuration stored in `~/.robomech/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Fixed frame the robot pose is looked up in.
    #[serde(default = "default_world_frame")]
    pub world_frame: String,

    /// Body frame of the robot.
    #[serde(default = "default_robot_frame")]
    pub robot_frame: String,

    /// Topic the velocity command is published on.
    #[serde(default = "default_velocity_topic")]
    pub velocity_topic: String,

    /// Drive-train variant.  Only `"DD"` can run.
    #[serde(default)]
    pub robot: RobotVariant,

    /// Consecutive missed samples before a warning (`0` = never warn).
    #[serde(default = "default_dropout_warn_ticks")]
    pub dropout_warn_ticks: u64,

    /// Stop after this many ticks (`0` = run until Ctrl-C).
    #[serde(default)]
    pub max_ticks: u64,

    /// Mirror every published command to the log as a structured event.
    #[serde(default)]
    pub echo_commands: bool,

    #[serde(default)]
    pub profile: MotionProfile,

    #[serde(default)]
    pub estimator: EstimatorSection,

    #[serde(default)]
    pub sim: SimSection,
}

fn default_world_frame() -> String {
    "map".to_string()
}
fn default_robot_frame() -> String {
    "base_link".to_string()
}
fn default_velocity_topic() -> String {
    "/cmd_vel".to_string()
}
fn default_dropout_warn_ticks() -> u64 {
    20
}
fn default_linear_gain() -> f64 {
    1.05
}
fn default_unavailable_ticks() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            world_frame: default_world_frame(),
            robot_frame: default_robot_frame(),
            velocity_topic: default_velocity_topic(),
            robot: RobotVariant::default(),
            dropout_warn_ticks: default_dropout_warn_ticks(),
            max_ticks: 0,
            echo_commands: false,
            profile: MotionProfile::default(),
            estimator: EstimatorSection::default(),
            sim: SimSection::default(),
        }
    }
}

impl Config {
    /// Startup checks.  Anything rejected here must stop the process before
    /// the first command is published.
    pub fn validate(&self) -> Result<(), RoboError> {
        if self.robot == RobotVariant::Fwdis {
            return Err(RoboError::UnsupportedVariant(self.robot));
        }
        for (name, value) in [
            ("world_frame", &self.world_frame),
            ("robot_frame", &self.robot_frame),
            ("velocity_topic", &self.velocity_topic),
        ] {
            if value.trim().is_empty() {
                return Err(RoboError::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        if self.world_frame == self.robot_frame {
            return Err(RoboError::InvalidConfig(format!(
                "world_frame and robot_frame are both '{}'",
                self.world_frame
            )));
        }
        if !self.sim.linear_gain.is_finite() {
            return Err(RoboError::InvalidConfig(format!(
                "sim.linear_gain must be finite, got {}",
                self.sim.linear_gain
            )));
        }
        self.profile.validate()
    }

    pub fn max_ticks(&self) -> Option<u64> {
        (self.max_ticks > 0).then_some(self.max_ticks)
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            world_frame: self.world_frame.clone(),
            robot_frame: self.robot_frame.clone(),
            dropout_warn_ticks: self.dropout_warn_ticks,
        }
    }

    /// Simulator stepped once per tick at the profile rate.
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            world_frame: self.world_frame.clone(),
            robot_frame: self.robot_frame.clone(),
            topic: self.velocity_topic.clone(),
            period: self.profile.period(),
            linear_gain: self.sim.linear_gain,
            unavailable_ticks: self.sim.unavailable_ticks,
            start_time: 0.0,
        }
    }
}

/// Return the active config path: `$ROBOMECH_CONFIG` if set, otherwise
/// `~/.robomech/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("ROBOMECH_CONFIG")
        && !p.trim().is_empty()
    {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".robomech").join("config.toml")
}

/// Load the effective configuration: the file at `path` (or defaults when it
/// does not exist) with `ROBOMECH_*` overrides applied on top.
pub fn load(path: &Path) -> Result<Config, String> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config file itself.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config at {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Apply `ROBOMECH_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `ROBOMECH_WORLD_FRAME` | `world_frame` |
/// | `ROBOMECH_ROBOT_FRAME` | `robot_frame` |
/// | `ROBOMECH_VELOCITY_TOPIC` | `velocity_topic` |
/// | `ROBOMECH_ROBOT` | `robot` |
/// | `ROBOMECH_TICK_RATE` | `profile.tick_rate_hz` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROBOMECH_WORLD_FRAME") {
        cfg.world_frame = v;
    }
    if let Ok(v) = std::env::var("ROBOMECH_ROBOT_FRAME") {
        cfg.robot_frame = v;
    }
    if let Ok(v) = std::env::var("ROBOMECH_VELOCITY_TOPIC") {
        cfg.velocity_topic = v;
    }
    if let Ok(v) = std::env::var("ROBOMECH_ROBOT")
        && let Ok(robot) = v.parse::<RobotVariant>()
    {
        cfg.robot = robot;
    }
    if let Ok(v) = std::env::var("ROBOMECH_TICK_RATE")
        && let Ok(rate) = v.trim().parse::<f64>()
    {
        cfg.profile.tick_rate_hz = rate;
    }
}

/// Save the config to a specific path, creating the parent directory.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.robot, RobotVariant::Dd);
        assert_eq!(loaded.profile.tick_rate_hz, 20.0);
        assert_eq!(loaded.sim.linear_gain, 1.05);
    }

    #[test]
    fn saved_file_uses_wire_names() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        save_to(&Config::default(), &path).expect("save");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("robot = \"DD\""));
        assert!(raw.contains("[profile]"));
        assert!(raw.contains("yaw_rate = \"raw\""));
    }

    #[test]
    fn config_path_points_to_robomech_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".robomech"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            concat!(
                "robot_frame = \"chassis\"\n\n",
                "[profile]\nw_max = 0.4\n\n",
                "[estimator]\nyaw_rate = \"wrapped\"\n",
            ),
        )
        .expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.robot_frame, "chassis");
        assert_eq!(cfg.world_frame, "map");
        assert_eq!(cfg.profile.w_max, 0.4);
        assert_eq!(cfg.profile.v_max, 0.5);
        assert!(cfg.profile.ramp_through_dropouts);
        assert_eq!(cfg.estimator.yaw_rate, YawRateMode::Wrapped);
        assert_eq!(cfg.sim, SimSection::default());
    }

    #[test]
    fn lowercase_variant_is_accepted() {
        let cfg: Config = toml::from_str("robot = \"fwdis\"").expect("parse");
        assert_eq!(cfg.robot, RobotVariant::Fwdis);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "robot = \"TRICYCLE\"").expect("write");
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("Failed to parse config"));
    }

    #[test]
    fn validate_rejects_fwdis() {
        let cfg = Config {
            robot: RobotVariant::Fwdis,
            ..Config::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(RoboError::UnsupportedVariant(RobotVariant::Fwdis))
        );
    }

    #[test]
    fn validate_rejects_bad_profile_and_frames() {
        let mut cfg = Config::default();
        cfg.profile.tick_rate_hz = 0.0;
        assert!(matches!(cfg.validate(), Err(RoboError::InvalidConfig(_))));

        let mut cfg = Config::default();
        cfg.robot_frame = "map".to_string();
        assert!(matches!(cfg.validate(), Err(RoboError::InvalidConfig(_))));

        let mut cfg = Config::default();
        cfg.velocity_topic = "  ".to_string();
        assert!(matches!(cfg.validate(), Err(RoboError::InvalidConfig(_))));

        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn derived_configs_follow_profile_rate() {
        let mut cfg = Config::default();
        cfg.profile.tick_rate_hz = 50.0;
        cfg.velocity_topic = "/base/cmd_vel".to_string();

        let sim = cfg.sim_config();
        assert!((sim.period - 0.02).abs() < 1e-12);
        assert_eq!(sim.topic, "/base/cmd_vel");
        assert_eq!(sim.unavailable_ticks, 3);

        let lc = cfg.loop_config();
        assert_eq!(lc.world_frame, "map");
        assert_eq!(lc.dropout_warn_ticks, 20);
    }

    #[test]
    fn echo_commands_defaults_off() {
        assert!(!Config::default().echo_commands);
        let cfg: Config = toml::from_str("echo_commands = true").expect("parse");
        assert!(cfg.echo_commands);
        assert_eq!(cfg.velocity_topic, "/cmd_vel");
    }

    #[test]
    fn max_ticks_zero_means_unbounded() {
        let mut cfg = Config::default();
        assert_eq!(cfg.max_ticks(), None);
        cfg.max_ticks = 200;
        assert_eq!(cfg.max_ticks(), Some(200));
    }

    // Every test below touches a distinct ROBOMECH_* variable so they stay
    // independent when the harness runs them in parallel.

    #[test]
    fn apply_env_overrides_changes_world_frame() {
        // SAFETY: no other test reads or writes this env-var.
        unsafe { std::env::set_var("ROBOMECH_WORLD_FRAME", "odom") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.world_frame, "odom");
        unsafe { std::env::remove_var("ROBOMECH_WORLD_FRAME") };
    }

    #[test]
    fn apply_env_overrides_changes_robot_frame() {
        // SAFETY: no other test reads or writes this env-var.
        unsafe { std::env::set_var("ROBOMECH_ROBOT_FRAME", "base_footprint") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.robot_frame, "base_footprint");
        unsafe { std::env::remove_var("ROBOMECH_ROBOT_FRAME") };
    }

    #[test]
    fn apply_env_overrides_changes_topic() {
        // SAFETY: no other test reads or writes this env-var.
        unsafe { std::env::set_var("ROBOMECH_VELOCITY_TOPIC", "/mobile_base/cmd_vel") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.velocity_topic, "/mobile_base/cmd_vel");
        unsafe { std::env::remove_var("ROBOMECH_VELOCITY_TOPIC") };
    }

    #[test]
    fn apply_env_overrides_changes_robot_and_ignores_garbage() {
        // SAFETY: no other test reads or writes this env-var.
        unsafe { std::env::set_var("ROBOMECH_ROBOT", "fwdis") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.robot, RobotVariant::Fwdis);

        unsafe { std::env::set_var("ROBOMECH_ROBOT", "hovercraft") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.robot, RobotVariant::Dd);
        unsafe { std::env::remove_var("ROBOMECH_ROBOT") };
    }

    #[test]
    fn apply_env_overrides_changes_tick_rate() {
        // SAFETY: no other test reads or writes this env-var.
        unsafe { std::env::set_var("ROBOMECH_TICK_RATE", "10") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.profile.tick_rate_hz, 10.0);
        assert!((cfg.profile.ramp_step() - 0.1).abs() < 1e-12);

        unsafe { std::env::set_var("ROBOMECH_TICK_RATE", "fast") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.profile.tick_rate_hz, 20.0);
        unsafe { std::env::remove_var("ROBOMECH_TICK_RATE") };
    }
}
