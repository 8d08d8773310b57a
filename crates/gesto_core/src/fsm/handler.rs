//! FSM lifecycle handlers

use crate::error::HandlerError;

/// Receives the lifecycle signals of an FSM run
///
/// Every method defaults to doing nothing. An error returned from
/// `fsm_starts`, `fsm_updates` or `fsm_stops` cancels the run: the FSM
/// notifies `fsm_cancels` (the failing handler included), fully
/// reinitialises, then hands the error back to whoever fed the event.
pub trait FsmHandler {
    /// The starting state of the FSM was reached
    fn fsm_starts(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// A started FSM entered a new standard state
    fn fsm_updates(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// A started FSM reached a terminal state
    fn fsm_stops(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// A started FSM was cancelled
    fn fsm_cancels(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }
}
