//! Press interaction
//!
//! One mouse button press ends the run: `init -mouse-down-> pressed`.
//! The machine has only two states, so the interaction never tracks state
//! changes.

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
}

/// Build the press machine, recording the pressed point into `data`
pub fn press_fsm(
    scheduler: Rc<dyn TimeoutScheduler>,
    data: &Rc<RefCell<PointData>>,
) -> Result<Fsm<UiEvent>> {
    let mut fsm = Fsm::new(scheduler);
    let pressed = fsm.add_terminal_state(states::PRESSED);

    let data = Rc::clone(data);
    fsm.add_transition(
        fsm.init_state(),
        pressed,
        Transition::on([event_types::MOUSE_DOWN]).action(move |event| data.borrow_mut().record(event)),
    )?;
    Ok(fsm)
}

/// Press interaction
pub fn press(scheduler: Rc<dyn TimeoutScheduler>) -> Result<Interaction<UiEvent, PointData>> {
    let data = Rc::new(RefCell::new(PointData::default()));
    let fsm = press_fsm(scheduler, &data)?;
    Ok(Interaction::new("press", fsm, data))
}
