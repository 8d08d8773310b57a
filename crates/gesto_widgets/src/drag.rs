//! Drag-and-drop interaction
//!
//! ```text
//! init -mouse-down-> pressed -mouse-move-> dragged -mouse-up-> released
//!                    pressed -mouse-up---> aborted
//!                                          dragged -mouse-move-> dragged
//! ```
//!
//! The run starts with the first move, so a plain click is not a drag.
//! When the drag is cancellable, Escape aborts it from `pressed` or
//! `dragged`.

use gesto_core::events::{event_types, Key, MouseButton, UiEvent};
use gesto_core::fsm::{Fsm, Transition};
use gesto_core::interaction::{Interaction, InteractionData};
use gesto_core::timer::TimeoutScheduler;
use gesto_core::Result;
use std::cell::RefCell;
use std::rc::Rc;

/// State names
pub mod states {
    pub const PRESSED: &str = "pressed";
    pub const DRAGGED: &str = "dragged";
    pub const RELEASED: &str = "released";
    pub const ABORTED: &str = "aborted";
}

/// Source and target points of a drag
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DragData {
    /// Button holding the drag
    pub button: Option<MouseButton>,
    /// Where the button was pressed
    pub src: (f32, f32),
    /// Latest pointer position
    pub tgt: (f32, f32),
    /// Number of moves since the press
    pub moves: usize,
}

impl DragData {
    /// Displacement from the source to the target
    pub fn delta(&self) -> (f32, f32) {
        (self.tgt.0 - self.src.0, self.tgt.1 - self.src.1)
    }

    fn same_button(&self, event: &UiEvent) -> bool {
        self.button.is_some() && event.button() == self.button
    }
}

impl InteractionData for DragData {
    fn reset(&mut self) {
        *self = DragData::default();
    }
}

fn is_escape(event: &UiEvent) -> bool {
    event.key() == Some(&Key::Escape)
}

/// Build the drag-and-drop machine
pub fn drag_fsm(
    scheduler: Rc<dyn TimeoutScheduler>,
    data: &Rc<RefCell<DragData>>,
    cancellable: bool,
) -> Result<Fsm<UiEvent>> {
    let mut fsm = Fsm::new(scheduler);
    let pressed = fsm.add_std_state(states::PRESSED);
    let dragged = fsm.add_std_state(states::DRAGGED);
    let released = fsm.add_terminal_state(states::RELEASED);
    let aborted = fsm.add_cancelling_state(states::ABORTED);

    let d = Rc::clone(data);
    fsm.add_transition(
        fsm.init_state(),
        pressed,
        Transition::on([event_types::MOUSE_DOWN]).action(move |event: &UiEvent| {
            let mut data = d.borrow_mut();
            data.button = event.button();
            if let Some(point) = event.position() {
                data.src = point;
                data.tgt = point;
            }
        }),
    )?;

    for src in [pressed, dragged] {
        let d = Rc::clone(data);
        fsm.add_transition(
            src,
            dragged,
            Transition::on([event_types::MOUSE_MOVE]).action(move |event: &UiEvent| {
                let mut data = d.borrow_mut();
                if let Some(point) = event.position() {
                    data.tgt = point;
                }
                data.moves += 1;
            }),
        )?;
    }

    let check = Rc::clone(data);
    let d = Rc::clone(data);
    fsm.add_transition(
        dragged,
        released,
        Transition::on([event_types::MOUSE_UP])
            .guard(move |event| check.borrow().same_button(event))
            .action(move |event: &UiEvent| {
                if let Some(point) = event.position() {
                    d.borrow_mut().tgt = point;
                }
            }),
    )?;

    let check = Rc::clone(data);
    fsm.add_transition(
        pressed,
        aborted,
        Transition::on([event_types::MOUSE_UP]).guard(move |event| check.borrow().same_button(event)),
    )?;

    if cancellable {
        for src in [pressed, dragged] {
            fsm.add_transition(src, aborted, Transition::on([event_types::KEY_DOWN]).guard(is_escape))?;
        }
    }

    fsm.set_starting_state(dragged)?;
    Ok(fsm)
}

/// Drag-and-drop interaction, cancellable with Escape
pub fn drag(scheduler: Rc<dyn TimeoutScheduler>) -> Result<Interaction<UiEvent, DragData>> {
    drag_with(scheduler, true)
}

/// Drag-and-drop interaction
pub fn drag_with(
    scheduler: Rc<dyn TimeoutScheduler>,
    cancellable: bool,
) -> Result<Interaction<UiEvent, DragData>> {
    let data = Rc::new(RefCell::new(DragData::default()));
    let fsm = drag_fsm(scheduler, &data, cancellable)?;
    Ok(Interaction::new("drag", fsm, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gesto_core::events::Modifiers;
    use gesto_core::timer::TimerQueue;

    fn down(x: f32) -> UiEvent {
        UiEvent::MouseDown {
            button: MouseButton::Left,
            x,
            y: 0.0,
        }
    }

    fn up(x: f32) -> UiEvent {
        UiEvent::MouseUp {
            button: MouseButton::Left,
            x,
            y: 0.0,
        }
    }

    fn moved(x: f32) -> UiEvent {
        UiEvent::MouseMove { x, y: 0.0 }
    }

    fn escape() -> UiEvent {
        UiEvent::KeyDown {
            key: Key::Escape,
            modifiers: Modifiers::default(),
        }
    }

    #[test]
    fn test_drag_records_source_and_target() {
        let mut drag = drag(Rc::new(TimerQueue::new())).unwrap();

        drag.process_event(down(10.0)).unwrap();
        assert!(!drag.fsm().is_started());
        drag.process_event(moved(15.0)).unwrap();
        assert!(drag.fsm().is_started());
        drag.process_event(moved(30.0)).unwrap();
        drag.process_event(up(32.0)).unwrap();

        let data = *drag.data().borrow();
        assert_eq!(data.src, (10.0, 0.0));
        assert_eq!(data.tgt, (32.0, 0.0));
        assert_eq!(data.moves, 2);
        assert_eq!(data.delta(), (22.0, 0.0));
        assert!(drag.fsm().current_state().is_init());
    }

    #[test]
    fn test_click_is_not_a_drag() {
        let mut drag = drag(Rc::new(TimerQueue::new())).unwrap();

        drag.process_event(down(1.0)).unwrap();
        assert!(drag.process_event(up(1.0)).unwrap());
        assert!(!drag.fsm().is_started());
        assert!(drag.fsm().current_state().is_init());
    }

    #[test]
    fn test_escape_aborts() {
        let mut drag = drag(Rc::new(TimerQueue::new())).unwrap();

        drag.process_event(down(1.0)).unwrap();
        drag.process_event(moved(2.0)).unwrap();
        assert!(drag.process_event(escape()).unwrap());
        assert!(drag.fsm().current_state().is_init());
    }

    #[test]
    fn test_non_cancellable_ignores_escape() {
        let mut drag = drag_with(Rc::new(TimerQueue::new()), false).unwrap();

        drag.process_event(down(1.0)).unwrap();
        drag.process_event(moved(2.0)).unwrap();
        assert!(!drag.process_event(escape()).unwrap());
        assert_eq!(drag.fsm().current_state().name(), states::DRAGGED);
    }
}
