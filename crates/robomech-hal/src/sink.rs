//! `CommandSink` trait for anything that accepts velocity commands.
//!
//! The control loop publishes exactly one [`VelocityCommand`] per tick to a
//! sink.  Drivers implement this trait so the loop never needs to know
//! whether commands end up on a bus, in a simulator or in a test log.

use std::cell::RefCell;
use std::rc::Rc;

use robomech_types::{RoboError, VelocityCommand};
use tracing::info;

/// A consumer of velocity commands (drive base, message topic, …).
pub trait CommandSink {
    /// Stable identifier for this sink, e.g. `"/cmd_vel"`.
    fn topic(&self) -> &str;

    /// Deliver one command.
    ///
    /// # Errors
    ///
    /// Returns [`RoboError::HardwareFault`] if the command cannot be
    /// delivered.  The control loop logs the fault and keeps ticking.
    fn publish(&mut self, cmd: &VelocityCommand) -> Result<(), RoboError>;
}

impl<T: CommandSink + ?Sized> CommandSink for Box<T> {
    fn topic(&self) -> &str {
        (**self).topic()
    }

    fn publish(&mut self, cmd: &VelocityCommand) -> Result<(), RoboError> {
        (**self).publish(cmd)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LogSink
// ────────────────────────────────────────────────────────────────────────────

/// Emits every command as a structured `info!` event.  Always succeeds.
#[derive(Debug, Clone)]
pub struct LogSink {
    topic: String,
}

impl LogSink {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}

impl CommandSink for LogSink {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&mut self, cmd: &VelocityCommand) -> Result<(), RoboError> {
        info!(
            topic = %self.topic,
            linear_x = cmd.linear_x,
            linear_y = cmd.linear_y,
            angular_z = cmd.angular_z,
            "cmd_vel"
        );
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RecordingSink
// ────────────────────────────────────────────────────────────────────────────

/// Shared view of every command a [`RecordingSink`] accepted.
pub type CommandLog = Rc<RefCell<Vec<VelocityCommand>>>;

/// Records every published command, optionally rejecting the first few.
///
/// Useful when a test needs to assert on the exact command stream.
#[derive(Debug)]
pub struct RecordingSink {
    topic: String,
    log: CommandLog,
    failures_left: usize,
    attempts: usize,
}

impl RecordingSink {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            log: Rc::new(RefCell::new(Vec::new())),
            failures_left: 0,
            attempts: 0,
        }
    }

    /// Reject the first `n` publishes with a [`RoboError::HardwareFault`].
    pub fn failing_first(mut self, n: usize) -> Self {
        self.failures_left = n;
        self
    }

    /// Handle onto the recorded commands that outlives moving the sink.
    pub fn log(&self) -> CommandLog {
        Rc::clone(&self.log)
    }

    /// Total publish calls, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

impl CommandSink for RecordingSink {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn publish(&mut self, cmd: &VelocityCommand) -> Result<(), RoboError> {
        self.attempts += 1;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(RoboError::HardwareFault {
                component: self.topic.clone(),
                details: "publish rejected".to_string(),
            });
        }
        self.log.borrow_mut().push(*cmd);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tee
// ────────────────────────────────────────────────────────────────────────────

/// Publishes to `primary`, then mirrors accepted commands to `mirror`.
///
/// The topic and the result are the primary's; a mirror fault is returned
/// only when the primary succeeded.
#[derive(Debug)]
pub struct Tee<A, B> {
    primary: A,
    mirror: B,
}

impl<A: CommandSink, B: CommandSink> Tee<A, B> {
    pub fn new(primary: A, mirror: B) -> Self {
        Self { primary, mirror }
    }
}

impl<A: CommandSink, B: CommandSink> CommandSink for Tee<A, B> {
    fn topic(&self) -> &str {
        self.primary.topic()
    }

    fn publish(&mut self, cmd: &VelocityCommand) -> Result<(), RoboError> {
        self.primary.publish(cmd)?;
        self.mirror.publish(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_history() {
        let mut sink = RecordingSink::new("/cmd_vel");
        let log = sink.log();
        sink.publish(&VelocityCommand::new(0.5, 0.0, 0.0)).unwrap();
        sink.publish(&VelocityCommand::new(0.5, 0.0, 0.05)).unwrap();

        assert_eq!(sink.topic(), "/cmd_vel");
        assert_eq!(log.borrow().len(), 2);
        assert!((log.borrow()[1].angular_z - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn recording_sink_rejects_first_publishes() {
        let mut sink = RecordingSink::new("/cmd_vel").failing_first(1);
        let log = sink.log();
        let err = sink.publish(&VelocityCommand::zero()).unwrap_err();
        assert!(matches!(err, RoboError::HardwareFault { .. }));
        sink.publish(&VelocityCommand::zero()).unwrap();
        assert_eq!(sink.attempts(), 2);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn boxed_sink_delegates() {
        let inner = RecordingSink::new("/boxed");
        let log = inner.log();
        let mut sink: Box<dyn CommandSink> = Box::new(inner);
        sink.publish(&VelocityCommand::new(0.1, 0.0, 0.0)).unwrap();
        assert_eq!(sink.topic(), "/boxed");
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn tee_mirrors_only_accepted_commands() {
        let primary = RecordingSink::new("/cmd_vel").failing_first(1);
        let mirror = RecordingSink::new("/echo");
        let (primary_log, mirror_log) = (primary.log(), mirror.log());
        let mut sink = Tee::new(primary, mirror);

        assert!(sink.publish(&VelocityCommand::new(0.5, 0.0, 0.0)).is_err());
        sink.publish(&VelocityCommand::new(0.5, 0.0, 0.05)).unwrap();

        assert_eq!(sink.topic(), "/cmd_vel");
        assert_eq!(*primary_log.borrow(), *mirror_log.borrow());
        assert_eq!(mirror_log.borrow().len(), 1);
    }

    #[test]
    fn tee_into_log_sink_keeps_primary_result() {
        let primary = RecordingSink::new("/cmd_vel");
        let log = primary.log();
        let mut sink = Tee::new(primary, LogSink::new("/cmd_vel"));
        sink.publish(&VelocityCommand::new(0.5, 0.0, 0.8)).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn log_sink_always_succeeds() {
        let mut sink = LogSink::new("/cmd_vel");
        assert!(sink.publish(&VelocityCommand::new(0.5, 0.0, 0.8)).is_ok());
    }
}
