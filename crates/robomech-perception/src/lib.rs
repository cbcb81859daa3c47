//! `robomech-perception` – pose sampling and velocity estimation.
//!
//! # Modules
//!
//! - [`transform`] – [`TfBuffer`][transform::TfBuffer]: stamped directed graph
//!   of reference frames, plus the [`Vec3`][transform::Vec3] /
//!   [`Quaternion`][transform::Quaternion] primitives.
//! - [`source`] – [`TransformSource`][source::TransformSource]: the lookup
//!   contract the control loop samples poses through.
//! - [`estimator`] – [`VelocityEstimator`][estimator::VelocityEstimator]:
//!   differentiates consecutive pose samples into a body-frame
//!   [`Twist`][estimator::Twist].

pub mod estimator;
pub mod source;
pub mod transform;

pub use estimator::{Pose3D, PoseSample, Twist, VelocityEstimator, YawRateMode, estimate_twist};
pub use source::{LookupError, LookupTime, TransformSource};
pub use transform::{Quaternion, TfBuffer, Transform3D, Vec3};
