//! Double-click interaction
//!
//! Two clicks of the same button, the second one starting less than
//! [`DEFAULT_TIMEOUT`] after the first one ended. Each click is an embedded
//! click machine:
//!
//! ```text
//! init -[click]-> clicked -[click, same button]-> double-clicked
//!                 clicked -timeout--------------> timed-out (cancels)
//! ```
//!
//! The run only starts once the double click is complete, so a lone click
//! never reaches the binding.

use crate::click::click_fsm;
use crate::point::PointData;
use gesto_core::events::UiEvent;
use gesto_core::fsm::{Fsm, Transition};
use gesto_core::interaction::Interaction;
use gesto_core::timer::TimeoutScheduler;
use gesto_core::Result;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Longest pause between the two clicks
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300);

/// State names
pub mod states {
    pub const CLICKED: &str = "clicked";
    pub const DOUBLE_CLICKED: &str = "double-clicked";
    pub const TIMED_OUT: &str = "timed-out";
}

/// Build the double-click machine
pub fn double_click_fsm(
    scheduler: Rc<dyn TimeoutScheduler>,
    data: &Rc<RefCell<PointData>>,
    timeout: Duration,
) -> Result<Fsm<UiEvent>> {
    let first = click_fsm(Rc::clone(&scheduler), data, false)?;
    let second = click_fsm(Rc::clone(&scheduler), data, true)?;

    let mut fsm = Fsm::new(scheduler);
    let clicked = fsm.add_std_state(states::CLICKED);
    let double_clicked = fsm.add_terminal_state(states::DOUBLE_CLICKED);
    let timed_out = fsm.add_cancelling_state(states::TIMED_OUT);

    fsm.add_transition(fsm.init_state(), clicked, Transition::sub_fsm(first))?;
    fsm.add_transition(clicked, double_clicked, Transition::sub_fsm(second))?;
    fsm.add_transition(clicked, timed_out, Transition::after(timeout))?;
    fsm.set_starting_state(double_clicked)?;
    Ok(fsm)
}

/// Double-click interaction with the default timeout
pub fn double_click(
    scheduler: Rc<dyn TimeoutScheduler>,
) -> Result<Interaction<UiEvent, PointData>> {
    double_click_with_timeout(scheduler, DEFAULT_TIMEOUT)
}

/// Double-click interaction with a custom pause between clicks
pub fn double_click_with_timeout(
    scheduler: Rc<dyn TimeoutScheduler>,
    timeout: Duration,
) -> Result<Interaction<UiEvent, PointData>> {
    let data = Rc::new(RefCell::new(PointData::default()));
    let fsm = double_click_fsm(scheduler, &data, timeout)?;
    Ok(Interaction::new("double-click", fsm, data))
}
