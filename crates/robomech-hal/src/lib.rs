//! `robomech-hal` – where velocity commands leave the controller.
//!
//! # Modules
//!
//! - [`sink`] – [`CommandSink`][sink::CommandSink]: the publish contract, with
//!   [`LogSink`][sink::LogSink], [`RecordingSink`][sink::RecordingSink] and
//!   the [`Tee`][sink::Tee] combinator.
//! - [`sim`] – [`SimWorld`][sim::SimWorld]: a kinematic differential-drive
//!   simulator exposing both a pose source and a drive sink, so the whole
//!   loop can run headless.

pub mod sim;
pub mod sink;

pub use sim::{SimConfig, SimDrive, SimPose, SimPoseSource, SimWorld};
pub use sink::{CommandLog, CommandSink, LogSink, RecordingSink, Tee};
