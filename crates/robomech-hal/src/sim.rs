//! In-process kinematic simulation for running the control loop without a
//! robot.
//!
//! [`SimWorld`] integrates a planar unicycle model.  Every command published
//! to its [`SimDrive`] advances simulated time by one nominal period and
//! republishes the `world → robot` transform into an internal
//! [`TfBuffer`], which its [`SimPoseSource`] serves lookups from.
//!
//! # Example
//!
//! ```rust
//! use robomech_hal::sim::{SimConfig, SimWorld};
//! use robomech_hal::sink::CommandSink;
//! use robomech_perception::source::{LookupTime, TransformSource};
//! use robomech_types::VelocityCommand;
//!
//! let world = SimWorld::new(SimConfig::default());
//! let (mut source, mut drive) = world.split();
//!
//! drive.publish(&VelocityCommand::new(0.5, 0.0, 0.0)).unwrap();
//! let sample = source.lookup("map", "base_link", LookupTime::Latest).unwrap();
//! assert!(sample.pose.position.x > 0.0);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use robomech_perception::estimator::PoseSample;
use robomech_perception::source::{LookupError, LookupTime, TransformSource};
use robomech_perception::transform::{Quaternion, TfBuffer, Transform3D, Vec3};
use robomech_types::{RoboError, VelocityCommand};
use tracing::trace;

use crate::sink::CommandSink;

/// Simulation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub world_frame: String,
    pub robot_frame: String,
    pub topic: String,
    /// Simulated seconds per published command.
    pub period: f64,
    /// Ratio of achieved to commanded linear speed (drive calibration
    /// error).  `1.0` is a perfect drive.
    pub linear_gain: f64,
    /// Number of initial ticks without a robot transform.  The transform is
    /// first published by the `unavailable_ticks`-th command; lookups fail
    /// with [`LookupError::UnknownFrame`] until then.
    pub unavailable_ticks: u32,
    /// Simulated time of the initial pose.
    pub start_time: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_frame: "map".to_string(),
            robot_frame: "base_link".to_string(),
            topic: "/cmd_vel".to_string(),
            period: 0.05,
            linear_gain: 1.0,
            unavailable_ticks: 0,
            start_time: 0.0,
        }
    }
}

/// Ground-truth planar pose of the simulated robot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimPose {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

#[derive(Debug)]
struct SimState {
    config: SimConfig,
    pose: SimPose,
    time: f64,
    commands: u32,
    tf: TfBuffer,
}

impl SimState {
    fn publish_transform(&mut self) {
        let transform = Transform3D::new(
            Vec3::new(self.pose.x, self.pose.y, 0.0),
            Quaternion::from_yaw(self.pose.yaw),
        );
        self.tf.set_transform(
            &self.config.world_frame,
            &self.config.robot_frame,
            transform,
            self.time,
        );
    }

    fn step(&mut self, cmd: &VelocityCommand) {
        let dt = self.config.period;
        let v_x = cmd.linear_x * self.config.linear_gain;
        let v_y = cmd.linear_y * self.config.linear_gain;

        // Midpoint heading for the translation step.
        let mid_yaw = self.pose.yaw + 0.5 * cmd.angular_z * dt;
        let (sin, cos) = mid_yaw.sin_cos();
        self.pose.x += (v_x * cos - v_y * sin) * dt;
        self.pose.y += (v_x * sin + v_y * cos) * dt;
        self.pose.yaw += cmd.angular_z * dt;
        self.time += dt;
        self.commands += 1;

        if self.commands >= self.config.unavailable_ticks {
            self.publish_transform();
        }
        trace!(x = self.pose.x, y = self.pose.y, yaw = self.pose.yaw, t = self.time, "sim step");
    }
}

/// Owner of the shared simulation state.
///
/// Single-threaded: the source and drive handles share state through
/// `Rc<RefCell<…>>`, matching the single control-loop thread.
#[derive(Debug, Clone)]
pub struct SimWorld {
    state: Rc<RefCell<SimState>>,
}

impl SimWorld {
    pub fn new(config: SimConfig) -> Self {
        let time = config.start_time;
        let publish_now = config.unavailable_ticks == 0;
        let mut state = SimState {
            config,
            pose: SimPose::default(),
            time,
            commands: 0,
            tf: TfBuffer::new(),
        };
        if publish_now {
            state.publish_transform();
        }
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Hand out the pose source and drive sink for the control loop.
    pub fn split(&self) -> (SimPoseSource, SimDrive) {
        let topic = self.state.borrow().config.topic.clone();
        (
            SimPoseSource {
                state: Rc::clone(&self.state),
            },
            SimDrive {
                topic,
                state: Rc::clone(&self.state),
            },
        )
    }

    /// Ground-truth pose.
    pub fn pose(&self) -> SimPose {
        self.state.borrow().pose
    }

    /// Simulated time in seconds.
    pub fn time(&self) -> f64 {
        self.state.borrow().time
    }

    /// Number of commands the drive has accepted.
    pub fn commands(&self) -> u32 {
        self.state.borrow().commands
    }
}

/// [`TransformSource`] view of a [`SimWorld`].
#[derive(Debug)]
pub struct SimPoseSource {
    state: Rc<RefCell<SimState>>,
}

impl TransformSource for SimPoseSource {
    fn lookup(
        &mut self,
        world_frame: &str,
        robot_frame: &str,
        at: LookupTime,
    ) -> Result<PoseSample, LookupError> {
        TransformSource::lookup(&mut self.state.borrow_mut().tf, world_frame, robot_frame, at)
    }
}

/// [`CommandSink`] view of a [`SimWorld`].  Always succeeds.
#[derive(Debug)]
pub struct SimDrive {
    topic: String,
    state: Rc<RefCell<SimState>>,
}

impl CommandSink for SimDrive {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&mut self, cmd: &VelocityCommand) -> Result<(), RoboError> {
        self.state.borrow_mut().step(cmd);
        Ok(())
    }
}
