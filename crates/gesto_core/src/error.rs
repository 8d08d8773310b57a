//! Error types and error reporting

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use thiserror::Error;

/// Failure raised by an FSM handler
///
/// Returning an error from `fsm_starts`, `fsm_updates` or `fsm_stops`
/// cancels the running FSM.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler asks for the run to be cancelled
    #[error("run cancelled: {0}")]
    Cancel(Cow<'static, str>),

    /// A command with effects had to be undone but is not undoable
    #[error("command '{0}' had effects but cannot be undone")]
    MustBeUndoable(String),

    /// Shared state was already borrowed when the handler ran
    #[error("handler state already in use: {0}")]
    Busy(&'static str),

    /// A command failed while a handler executed or undid it
    #[error(transparent)]
    Command(#[from] CommandError),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Cancel`]
    pub fn cancel(reason: impl Into<Cow<'static, str>>) -> Self {
        HandlerError::Cancel(reason.into())
    }
}

/// Failure raised by a transition action
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transition action failed: {message}")]
pub struct ActionError {
    message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure raised while executing, undoing or redoing a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("command '{command}' failed: {message}")]
pub struct CommandError {
    command: String,
    message: String,
}

impl CommandError {
    pub fn new(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// FSM engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FsmError {
    /// A handler failed during notification; the run was cancelled
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// A transition action failed; the run was cancelled
    #[error(transparent)]
    Action(#[from] ActionError),

    /// The state does not belong to this FSM
    #[error("unknown state")]
    UnknownState,

    /// The transition does not belong to this FSM
    #[error("unknown transition")]
    UnknownTransition,

    /// Transitions cannot target the initial state
    #[error("the initial state cannot be the target of a transition")]
    InitTarget,

    /// Only the initial state and standard states have outgoing transitions
    #[error("state '{0}' cannot have outgoing transitions")]
    NotOutputState(String),

    /// The current state belongs to another FSM while no sub-FSM is active
    #[error("current state '{0}' belongs to another FSM")]
    ForeignState(String),

    /// Epsilon transitions chained without ever leaving the loop
    #[error("epsilon transitions loop through state '{0}'")]
    EpsilonLoop(String),

    /// An FSM or handler was re-entered while already processing
    #[error("re-entrant call while processing")]
    Reentrant,
}

/// Result type for FSM operations
pub type Result<T> = std::result::Result<T, FsmError>;

// ============================================================================
// Error sinks
// ============================================================================

/// Destination for errors that must not abort the host
///
/// Bindings report failed runs and failed commands here instead of
/// panicking. The sink is injected at construction time.
pub trait ErrorSink {
    fn report(&self, origin: &str, error: &dyn fmt::Display);
}

/// Logs reported errors with `tracing::error!`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, origin: &str, error: &dyn fmt::Display) {
        tracing::error!(target: "gesto::binding", origin, "{}", error);
    }
}

/// Keeps reported errors in memory
#[derive(Debug, Default)]
pub struct CollectingErrorSink {
    errors: RefCell<Vec<String>>,
}

impl CollectingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reported messages, formatted as `origin: error`
    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.errors.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.errors.borrow_mut().clear();
    }
}

impl ErrorSink for CollectingErrorSink {
    fn report(&self, origin: &str, error: &dyn fmt::Display) {
        self.errors.borrow_mut().push(format!("{origin}: {error}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_converts_to_fsm_error() {
        let err: FsmError = HandlerError::cancel("strict start").into();
        assert_eq!(err.to_string(), "run cancelled: strict start");
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingErrorSink::new();
        sink.report("binding", &CommandError::new("move", "out of bounds"));

        assert_eq!(
            sink.errors(),
            vec!["binding: command 'move' failed: out of bounds".to_string()]
        );
        sink.clear();
        assert!(sink.is_empty());
    }
}
