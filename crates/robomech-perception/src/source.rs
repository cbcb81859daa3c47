//! Pose sources: anything that can answer "where is the robot frame in the
//! world frame right now?".
//!
//! The control loop only ever talks to the [`TransformSource`] trait.  A
//! failed lookup is never fatal: every [`LookupError`] variant means "no
//! sample this tick, try again next tick".

use thiserror::Error;

use crate::estimator::{Pose3D, PoseSample};
use crate::transform::TfBuffer;

/// Which point in time a lookup asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LookupTime {
    /// The most recent transform available.
    Latest,
    /// A specific time, in seconds.
    At(f64),
}

/// Reasons a transform lookup can come back empty.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    /// The frame has not been published yet.
    #[error("Lookup error: frame '{0}' does not exist")]
    UnknownFrame(String),

    /// Both frames exist but no chain of transforms links them.
    #[error("Connectivity error: no transform chain from '{from}' to '{to}'")]
    Connectivity { from: String, to: String },

    /// The requested time is outside the range the source can serve.
    #[error("Extrapolation error: requested t={requested}, available t={available}")]
    Extrapolation { requested: f64, available: f64 },
}

/// A provider of robot pose samples.
pub trait TransformSource {
    /// Return the pose of `robot_frame` expressed in `world_frame` at `at`.
    ///
    /// # Errors
    ///
    /// Any [`LookupError`]; callers treat all of them as transient.
    fn lookup(
        &mut self,
        world_frame: &str,
        robot_frame: &str,
        at: LookupTime,
    ) -> Result<PoseSample, LookupError>;
}

impl TransformSource for TfBuffer {
    fn lookup(
        &mut self,
        world_frame: &str,
        robot_frame: &str,
        at: LookupTime,
    ) -> Result<PoseSample, LookupError> {
        let stamped = TfBuffer::lookup(self, world_frame, robot_frame, at)?;
        Ok(PoseSample::new(
            Pose3D::new(stamped.transform.translation, stamped.transform.rotation),
            stamped.stamp,
        ))
    }
}
