//! Pose-to-twist velocity estimation.
//!
//! Two consecutive [`PoseSample`]s are differentiated into a [`Twist`]:
//!
//! ```text
//! v_world  = (p_curr − p_prev) / dt
//! v_body   = q_prev⁻¹ · v_world            (previous sample's body frame)
//! ω_z      = (yaw_curr − yaw_prev) / dt
//! ```
//!
//! The linear part is expressed in the robot frame at the *start* of the
//! interval, so a robot driving straight ahead reports a positive `x` and a
//! near-zero `y` regardless of its heading in the world.
//!
//! # Example
//!
//! ```rust
//! use robomech_perception::estimator::{Pose3D, PoseSample, VelocityEstimator, YawRateMode};
//! use robomech_perception::transform::{Quaternion, Vec3};
//!
//! let mut est = VelocityEstimator::new(YawRateMode::Raw);
//! let at = |x: f64, t: f64| PoseSample::new(
//!     Pose3D::new(Vec3::new(x, 0.0, 0.0), Quaternion::identity()), t);
//!
//! assert!(est.update(at(0.0, 1.0)).is_none()); // nothing to differentiate yet
//! let twist = est.update(at(0.05, 1.1)).unwrap();
//! assert!((twist.linear.x - 0.5).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use tracing::debug;

use crate::transform::{Quaternion, Vec3};

/// Position + orientation of the robot in the world frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose3D {
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl Pose3D {
    pub fn new(position: Vec3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }
}

/// An immutable pose snapshot with its monotonic timestamp (seconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub pose: Pose3D,
    pub timestamp: f64,
}

impl PoseSample {
    pub fn new(pose: Pose3D, timestamp: f64) -> Self {
        Self { pose, timestamp }
    }
}

/// Estimated instantaneous velocity.
///
/// `linear` is expressed in the body frame of the earlier of the two samples
/// it was derived from; `angular_z` is the yaw rate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist {
    pub linear: Vec3,
    pub angular_z: f64,
}

/// How the yaw difference between two samples is turned into a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YawRateMode {
    /// Plain `yaw_curr − yaw_prev`.  Crossing ±π yields a spike of roughly
    /// ±2π/dt.
    #[default]
    Raw,
    /// Difference wrapped into (−π, π] before dividing by `dt`.
    Wrapped,
}

/// Wrap an angle into (−π, π].
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Differentiate two consecutive samples into a body-frame [`Twist`].
///
/// Returns `None` when `curr` is not strictly later than `prev` (or either
/// stamp is not finite).  That is a skip, not an error: the caller simply has
/// no estimate for this tick.
pub fn estimate_twist(
    prev: &PoseSample,
    curr: &PoseSample,
    yaw_mode: YawRateMode,
) -> Option<Twist> {
    let dt = curr.timestamp - prev.timestamp;
    if !dt.is_finite() || dt <= 0.0 {
        return None;
    }

    let prev_q = prev.pose.orientation.normalized();
    let curr_q = curr.pose.orientation.normalized();

    // Planar robot: roll and pitch are discarded.
    let (_, _, prev_yaw) = prev_q.to_euler();
    let (_, _, curr_yaw) = curr_q.to_euler();
    let dyaw = match yaw_mode {
        YawRateMode::Raw => curr_yaw - prev_yaw,
        YawRateMode::Wrapped => wrap_angle(curr_yaw - prev_yaw),
    };

    let v_world = (curr.pose.position - prev.pose.position) / dt;
    let linear = prev_q.inverse().rotate(v_world);

    Some(Twist {
        linear,
        angular_z: dyaw / dt,
    })
}

/// Stateful wrapper around [`estimate_twist`] that remembers the previous
/// sample between ticks.
#[derive(Debug, Clone, Default)]
pub struct VelocityEstimator {
    yaw_mode: YawRateMode,
    last: Option<PoseSample>,
}

impl VelocityEstimator {
    pub fn new(yaw_mode: YawRateMode) -> Self {
        Self {
            yaw_mode,
            last: None,
        }
    }

    /// Feed the next sample and return the twist since the previous one.
    ///
    /// The first sample after construction (or [`reset`][Self::reset]) only
    /// primes the estimator and yields `None`.  A sample that is not newer
    /// than the stored one is dropped and leaves the stored sample in place.
    pub fn update(&mut self, sample: PoseSample) -> Option<Twist> {
        let Some(prev) = self.last else {
            debug!(t = sample.timestamp, "first pose sample, priming estimator");
            self.last = Some(sample);
            return None;
        };

        match estimate_twist(&prev, &sample, self.yaw_mode) {
            Some(twist) => {
                debug!(
                    v_x = twist.linear.x,
                    v_y = twist.linear.y,
                    v_z = twist.linear.z,
                    omega = twist.angular_z,
                    dt = sample.timestamp - prev.timestamp,
                    "velocity estimate"
                );
                self.last = Some(sample);
                Some(twist)
            }
            None => {
                debug!(
                    prev_t = prev.timestamp,
                    curr_t = sample.timestamp,
                    "non-positive dt, skipping estimate"
                );
                None
            }
        }
    }

    /// Forget the stored sample; the next update primes again.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// The sample the next estimate will be differentiated against.
    pub fn last_sample(&self) -> Option<&PoseSample> {
        self.last.as_ref()
    }

    pub fn yaw_mode(&self) -> YawRateMode {
        self.yaw_mode
    }
}
