//! Click interaction
//!
//! A click is either a native click event or a press followed by a release
//! of the same button:
//!
//! ```text
//! init -click------> clicked
//! init -mouse-down-> pressed -mouse-up (same button)-> clicked
//! ```
//!
//! The click machine is also the building block of [`double_click`].
//!
//! [`double_click`]: crate::double_click

use crate::point::PointData;
use gesto_core::events::{event_types, UiEvent};
use gesto_core::fsm::{Fsm, Transition};
use gesto_core::interaction::Interaction;
use gesto_core::timer::TimeoutScheduler;
use gesto_core::Result;
use std::cell::RefCell;
use std::rc::Rc;

/// State names
pub mod states {
    pub const PRESSED: &str = "pressed";
    pub const CLICKED: &str = "clicked";
}

/// Build the click machine, recording the click into `data`
///
/// With `same_button`, the click must use the button already recorded in
/// `data`, if any.
pub fn click_fsm(
    scheduler: Rc<dyn TimeoutScheduler>,
    data: &Rc<RefCell<PointData>>,
    same_button: bool,
) -> Result<Fsm<UiEvent>> {
    let mut fsm = Fsm::new(scheduler);
    let pressed = fsm.add_std_state(states::PRESSED);
    let clicked = fsm.add_terminal_state(states::CLICKED);
    let init = fsm.init_state();

    let button_ok = {
        let data = Rc::clone(data);
        move |event: &UiEvent| !same_button || data.borrow().same_button(event)
    };

    let d = Rc::clone(data);
    fsm.add_transition(
        init,
        clicked,
        Transition::on([event_types::CLICK])
            .guard(button_ok.clone())
            .action(move |event| d.borrow_mut().record(event)),
    )?;

    let d = Rc::clone(data);
    fsm.add_transition(
        init,
        pressed,
        Transition::on([event_types::MOUSE_DOWN])
            .guard(button_ok)
            .action(move |event| d.borrow_mut().record(event)),
    )?;

    let check = Rc::clone(data);
    let d = Rc::clone(data);
    fsm.add_transition(
        pressed,
        clicked,
        Transition::on([event_types::MOUSE_UP])
            .guard(move |event| check.borrow().same_button(event))
            .action(move |event| d.borrow_mut().record(event)),
    )?;
    Ok(fsm)
}

/// Click interaction
pub fn click(scheduler: Rc<dyn TimeoutScheduler>) -> Result<Interaction<UiEvent, PointData>> {
    let data = Rc::new(RefCell::new(PointData::default()));
    let fsm = click_fsm(scheduler, &data, false)?;
    Ok(Interaction::new("click", fsm, data))
}
