//! Text-changed interaction
//!
//! Successive edits of a text widget are grouped into one run; the run
//! ends when no edit arrives for the time gap:
//!
//! ```text
//! init -value-changed-> changed -value-changed-> changed
//!                       changed -timeout-------> ended
//! ```

use gesto_core::events::{event_types, UiEvent};
use gesto_core::fsm::{Fsm, Transition};
use gesto_core::interaction::{Interaction, InteractionData};
use gesto_core::timer::TimeoutScheduler;
use gesto_core::Result;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Pause ending a burst of edits
pub const DEFAULT_TIME_GAP: Duration = Duration::from_millis(1000);

/// State names
pub mod states {
    pub const CHANGED: &str = "changed";
    pub const ENDED: &str = "ended";
}

/// Text of the edited widget
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextData {
    /// Latest value
    pub text: String,
    /// Number of edits in the run
    pub changes: usize,
}

impl InteractionData for TextData {
    fn reset(&mut self) {
        self.text.clear();
        self.changes = 0;
    }
}

/// Build the text-changed machine
///
/// `time_gap` is read each time the timeout is armed.
pub fn text_changed_fsm(
    scheduler: Rc<dyn TimeoutScheduler>,
    data: &Rc<RefCell<TextData>>,
    time_gap: impl Fn() -> Duration + 'static,
) -> Result<Fsm<UiEvent>> {
    let mut fsm = Fsm::new(scheduler);
    let changed = fsm.add_std_state(states::CHANGED);
    let ended = fsm.add_terminal_state(states::ENDED);

    for src in [fsm.init_state(), changed] {
        let d = Rc::clone(data);
        fsm.add_transition(
            src,
            changed,
            Transition::on([event_types::VALUE_CHANGED]).action(move |event| {
                if let UiEvent::ValueChanged { value } = event {
                    let mut data = d.borrow_mut();
                    data.text.clone_from(value);
                    data.changes += 1;
                }
            }),
        )?;
    }
    fsm.add_transition(changed, ended, Transition::timeout(time_gap))?;
    Ok(fsm)
}

/// Text-changed interaction with the default time gap
pub fn text_changed(scheduler: Rc<dyn TimeoutScheduler>) -> Result<Interaction<UiEvent, TextData>> {
    text_changed_with_gap(scheduler, DEFAULT_TIME_GAP)
}

/// Text-changed interaction with a custom time gap
pub fn text_changed_with_gap(
    scheduler: Rc<dyn TimeoutScheduler>,
    time_gap: Duration,
) -> Result<Interaction<UiEvent, TextData>> {
    let data = Rc::new(RefCell::new(TextData::default()));
    let fsm = text_changed_fsm(scheduler, &data, move || time_gap)?;
    Ok(Interaction::new("text-changed", fsm, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gesto_core::timer::TimerQueue;

    fn typed(value: &str) -> UiEvent {
        UiEvent::ValueChanged {
            value: value.to_string(),
        }
    }

    #[test]
    fn test_edits_grouped_until_pause() {
        let timers = Rc::new(TimerQueue::new());
        let mut text = text_changed(timers.clone()).unwrap();
        let data = text.data();

        for value in ["h", "he", "hel"] {
            text.process_event(typed(value)).unwrap();
            let tokens = timers.advance(Duration::from_millis(400));
            assert!(tokens.is_empty());
        }
        assert_eq!(timers.scheduled_count(), 3);
        assert_eq!(timers.cancelled_count(), 2);

        for token in timers.advance(DEFAULT_TIME_GAP) {
            text.fire_timeout(token).unwrap();
        }
        assert!(text.fsm().current_state().is_init());
        assert_eq!(data.borrow().text, "hel");
        assert_eq!(data.borrow().changes, 3);
    }

    #[test]
    fn test_custom_gap() {
        let timers = Rc::new(TimerQueue::new());
        let mut text = text_changed_with_gap(timers.clone(), Duration::from_millis(50)).unwrap();

        text.process_event(typed("a")).unwrap();
        assert_eq!(timers.next_deadline(), Some(Duration::from_millis(50)));
    }
}
