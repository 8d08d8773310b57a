//! Commands
//!
//! A command is what an interaction produces: the binding creates one per
//! run, lets the user callbacks fill it in, executes it when the run stops
//! and hands it to the undo history when it can be undone.
//!
//! The [`Command`] trait only holds the business part. Lifecycle bookkeeping
//! lives in [`TrackedCommand`], which the binding wraps around each command.

use crate::error::CommandError;
use crate::undo::Undoable;
use std::fmt;

/// Lifecycle of a command produced by a binding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    /// Produced, never executed
    #[default]
    Created,
    /// Executed at least once, the run is not over
    Executed,
    /// Discarded before completion
    Cancelled,
    /// Completed; may be undone
    Done,
    /// Released without being kept anywhere
    Flushed,
}

impl CommandStatus {
    /// Whether the command may still be executed
    pub fn is_executable(self) -> bool {
        matches!(self, CommandStatus::Created | CommandStatus::Executed)
    }
}

/// A unit of work produced by an interaction
pub trait Command: 'static {
    /// Name used in logs and error reports
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Whether the command can run with its current data
    ///
    /// A command that cannot run is silently skipped.
    fn can_execute(&self) -> bool {
        true
    }

    /// Run the command
    fn execute(&mut self) -> Result<(), CommandError>;

    /// Whether the last execution changed anything
    fn had_effect(&self) -> bool {
        true
    }

    /// Undo view of the command, if it supports undo
    fn as_undoable_mut(&mut self) -> Option<&mut dyn Undoable> {
        None
    }

    /// Turn the command into an undo history entry, if it supports undo
    fn into_undoable(self: Box<Self>) -> Option<Box<dyn Undoable>> {
        None
    }
}

/// A command together with its lifecycle status
pub struct TrackedCommand<C> {
    command: Box<C>,
    status: CommandStatus,
    executions: usize,
}

impl<C: Command> TrackedCommand<C> {
    pub fn new(command: C) -> Self {
        Self {
            command: Box::new(command),
            status: CommandStatus::Created,
            executions: 0,
        }
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub fn command(&self) -> &C {
        &self.command
    }

    pub fn command_mut(&mut self) -> &mut C {
        &mut self.command
    }

    pub fn name(&self) -> &str {
        self.command.name()
    }

    /// Number of successful executions
    pub fn executions(&self) -> usize {
        self.executions
    }

    /// Execute the command if its status and data allow it
    ///
    /// Returns whether the command ran.
    pub fn execute(&mut self) -> Result<bool, CommandError> {
        if !self.status.is_executable() || !self.command.can_execute() {
            return Ok(false);
        }
        self.command.execute()?;
        self.executions += 1;
        self.status = CommandStatus::Executed;
        Ok(true)
    }

    /// Mark the command as completed
    pub fn done(&mut self) {
        if self.status.is_executable() {
            self.status = CommandStatus::Done;
        }
    }

    pub fn cancel(&mut self) {
        self.status = CommandStatus::Cancelled;
    }

    pub fn flush(&mut self) {
        self.status = CommandStatus::Flushed;
    }

    /// Whether the command ran and reports a change
    pub fn had_effect(&self) -> bool {
        self.executions > 0 && self.command.had_effect()
    }

    pub fn as_undoable_mut(&mut self) -> Option<&mut dyn Undoable> {
        self.command.as_undoable_mut()
    }

    pub fn into_undoable(self) -> Option<Box<dyn Undoable>> {
        self.command.into_undoable()
    }
}

impl<C: Command> fmt::Debug for TrackedCommand<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedCommand")
            .field("name", &self.name())
            .field("status", &self.status)
            .field("executions", &self.executions)
            .finish()
    }
}

// ============================================================================
// Anonymous commands
// ============================================================================

/// Command running a closure
pub struct AnonCommand {
    name: String,
    body: Box<dyn FnMut() -> Result<(), CommandError>>,
}

impl AnonCommand {
    pub fn new(name: impl Into<String>, mut body: impl FnMut() + 'static) -> Self {
        Self {
            name: name.into(),
            body: Box::new(move || {
                body();
                Ok(())
            }),
        }
    }

    pub fn fallible(
        name: impl Into<String>,
        body: impl FnMut() -> Result<(), CommandError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

impl Command for AnonCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self) -> Result<(), CommandError> {
        (self.body)()
    }
}

impl fmt::Debug for AnonCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnonCommand").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Blocked;

    impl Command for Blocked {
        fn can_execute(&self) -> bool {
            false
        }

        fn execute(&mut self) -> Result<(), CommandError> {
            Ok(())
        }
    }

    #[test]
    fn test_lifecycle() {
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        let mut cmd = TrackedCommand::new(AnonCommand::new("count", move || r.set(r.get() + 1)));

        assert_eq!(cmd.status(), CommandStatus::Created);
        assert!(!cmd.had_effect());

        assert!(cmd.execute().unwrap());
        assert!(cmd.execute().unwrap());
        assert_eq!(cmd.status(), CommandStatus::Executed);

        cmd.done();
        assert_eq!(cmd.status(), CommandStatus::Done);
        assert!(!cmd.execute().unwrap());
        assert_eq!(runs.get(), 2);
        assert!(cmd.had_effect());
    }

    #[test]
    fn test_infeasible_command_is_skipped() {
        let mut cmd = TrackedCommand::new(Blocked);
        assert!(!cmd.execute().unwrap());
        assert_eq!(cmd.status(), CommandStatus::Created);
        assert_eq!(cmd.name(), "Blocked");
    }

    #[test]
    fn test_failed_execution_keeps_status() {
        let mut cmd = TrackedCommand::new(AnonCommand::fallible("boom", || {
            Err(CommandError::new("boom", "disk full"))
        }));

        let err = cmd.execute().unwrap_err();
        assert_eq!(err.message(), "disk full");
        assert_eq!(cmd.status(), CommandStatus::Created);
        assert_eq!(cmd.executions(), 0);
    }

    #[test]
    fn test_cancelled_command_cannot_be_done() {
        let mut cmd = TrackedCommand::new(AnonCommand::new("noop", || {}));
        cmd.cancel();
        cmd.done();
        assert_eq!(cmd.status(), CommandStatus::Cancelled);
        assert!(cmd.into_undoable().is_none());
    }
}
