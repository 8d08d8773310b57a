//! Ctrl + wheel interaction
//!
//! Each wheel step made while Ctrl is held is one run:
//!
//! ```text
//! init -key-down ctrl-------> held -wheel-----> scrolled
//! init -wheel with ctrl-----> scrolled
//!                             held -key-up ctrl-> released (cancels)
//! ```
//!
//! Ctrl stays held after a step, so the step recycles a Ctrl key press: the
//! next run resumes in `held` as soon as the previous one ends.

use crate::point::PointData;
use gesto_core::events::{event_types, Key, Modifiers, UiEvent};
use gesto_core::fsm::{Fsm, Transition};
use gesto_core::interaction::{Interaction, InteractionData};
use gesto_core::timer::TimeoutScheduler;
use gesto_core::Result;
use std::cell::RefCell;
use std::rc::Rc;

/// State names
pub mod states {
    pub const HELD: &str = "held";
    pub const SCROLLED: &str = "scrolled";
    pub const RELEASED: &str = "released";
}

/// Scroll step of a modified wheel run
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WheelData {
    pub delta_x: f32,
    pub delta_y: f32,
    /// Pointer data of the wheel event
    pub point: PointData,
}

impl InteractionData for WheelData {
    fn reset(&mut self) {
        *self = WheelData::default();
    }
}

fn is_ctrl(event: &UiEvent) -> bool {
    event.key() == Some(&Key::Ctrl)
}

fn ctrl_press() -> UiEvent {
    UiEvent::KeyDown {
        key: Key::Ctrl,
        modifiers: Modifiers::CTRL,
    }
}

/// Build the ctrl + wheel machine
pub fn modified_wheel_fsm(
    scheduler: Rc<dyn TimeoutScheduler>,
    data: &Rc<RefCell<WheelData>>,
) -> Result<Fsm<UiEvent>> {
    let mut fsm = Fsm::new(scheduler);
    let held = fsm.add_std_state(states::HELD);
    let scrolled = fsm.add_terminal_state(states::SCROLLED);
    let released = fsm.add_cancelling_state(states::RELEASED);
    let init = fsm.init_state();
    let recycler = fsm.recycler();

    let record = {
        let data = Rc::clone(data);
        move |event: &UiEvent| {
            if let UiEvent::Wheel {
                delta_x, delta_y, ..
            } = event
            {
                let mut data = data.borrow_mut();
                data.delta_x = *delta_x;
                data.delta_y = *delta_y;
                data.point.record(event);
            }
        }
    };

    fsm.add_transition(init, held, Transition::on([event_types::KEY_DOWN]).guard(is_ctrl))?;
    // key repeat
    fsm.add_transition(held, held, Transition::on([event_types::KEY_DOWN]).guard(is_ctrl))?;

    let record_held = record.clone();
    fsm.add_transition(
        held,
        scrolled,
        Transition::on([event_types::WHEEL]).action(move |event| {
            record_held(event);
            tracing::trace!(target: "gesto::widgets", "ctrl still held, recycling key press");
            recycler.recycle(ctrl_press());
        }),
    )?;
    fsm.add_transition(
        init,
        scrolled,
        Transition::on([event_types::WHEEL])
            .guard(|event: &UiEvent| {
                matches!(event, UiEvent::Wheel { modifiers, .. } if modifiers.ctrl_only())
            })
            .action(record),
    )?;
    fsm.add_transition(held, released, Transition::on([event_types::KEY_UP]).guard(is_ctrl))?;
    Ok(fsm)
}

/// Ctrl + wheel interaction
pub fn modified_wheel(
    scheduler: Rc<dyn TimeoutScheduler>,
) -> Result<Interaction<UiEvent, WheelData>> {
    let data = Rc::new(RefCell::new(WheelData::default()));
    let fsm = modified_wheel_fsm(scheduler, &data)?;
    Ok(Interaction::new("modified-wheel", fsm, data))
}
