//! Interactions
//!
//! An [`Interaction`] owns one FSM and the data record its transitions fill
//! in (pressed button, positions, typed text). It decides whether events reach
//! the FSM at all (activation, throttling) and keeps the event sources it is
//! registered to listening to exactly the event types the current state can
//! consume.
//!
//! ```
//! use gesto_core::events::{event_types, UiEvent};
//! use gesto_core::fsm::{Fsm, Transition};
//! use gesto_core::interaction::{EventSource, Interaction, Widget};
//! use gesto_core::timer::TimerQueue;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let mut fsm = Fsm::<UiEvent>::new(Rc::new(TimerQueue::new()));
//! let end = fsm.add_terminal_state("clicked");
//! fsm.add_transition(fsm.init_state(), end, Transition::on([event_types::CLICK])).unwrap();
//!
//! let mut click = Interaction::new("click", fsm, Rc::new(RefCell::new(())));
//! let button = Rc::new(Widget::new("ok"));
//! click.register_to([button.clone() as Rc<dyn EventSource>]);
//! assert!(button.listens_to(event_types::CLICK));
//! ```

use crate::error::{FsmError, Result};
use crate::events::{EventType, TypedEvent};
use crate::fsm::{Fsm, FsmId, StateRef};
use crate::obs::SubscriptionId;
use crate::timer::TimerToken;
use rustc_hash::FxHashSet;
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

// ============================================================================
// Event sources
// ============================================================================

/// Something that delivers events to registered listeners (a widget, a
/// window, a platform adapter)
///
/// Both operations must be idempotent: registering twice the same
/// `(listener, event_type)` pair is the same as registering it once.
pub trait EventSource {
    fn register(&self, listener: FsmId, event_type: EventType);
    fn unregister(&self, listener: FsmId, event_type: EventType);
}

/// Event source shared between its owner and the interactions listening to it
pub type SharedSource = Rc<dyn EventSource>;

/// In-memory event source keeping track of its listeners
#[derive(Default)]
pub struct Widget {
    name: String,
    listeners: RefCell<FxHashSet<(FsmId, EventType)>>,
}

impl Widget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: RefCell::new(FxHashSet::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of registered `(listener, event type)` pairs
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Whether any listener wants events of this type
    pub fn listens_to(&self, event_type: EventType) -> bool {
        self.listeners
            .borrow()
            .iter()
            .any(|(_, registered)| *registered == event_type)
    }

    /// Whether `listener` wants events of this type
    pub fn is_listening(&self, listener: FsmId, event_type: EventType) -> bool {
        self.listeners.borrow().contains(&(listener, event_type))
    }
}

impl EventSource for Widget {
    fn register(&self, listener: FsmId, event_type: EventType) {
        self.listeners.borrow_mut().insert((listener, event_type));
    }

    fn unregister(&self, listener: FsmId, event_type: EventType) {
        self.listeners.borrow_mut().remove(&(listener, event_type));
    }
}

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Widget")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ============================================================================
// Interaction data
// ============================================================================

/// Data collected by an interaction while it runs
pub trait InteractionData {
    /// Forget the values of the previous run
    fn reset(&mut self);
}

impl InteractionData for () {
    fn reset(&mut self) {}
}

// ============================================================================
// Interaction
// ============================================================================

/// Throttling state: one window per event type
struct Throttle<E> {
    window: Duration,
    token: Option<TimerToken>,
    event_type: Option<EventType>,
    /// Last event suppressed in the current window
    suppressed: Option<E>,
}

enum ThrottleDecision<E> {
    Suppress,
    Process { flushed: Option<E> },
}

/// A reusable user interaction: an FSM plus its data
pub struct Interaction<E: TypedEvent + 'static, D: InteractionData + 'static> {
    name: Cow<'static, str>,
    fsm: Fsm<E>,
    data: Rc<RefCell<D>>,
    activated: bool,
    sources: Rc<RefCell<Vec<SharedSource>>>,
    subscription: Option<SubscriptionId>,
    throttle: Option<Throttle<E>>,
    log: bool,
}

impl<E: TypedEvent + 'static, D: InteractionData + 'static> Interaction<E, D> {
    /// Wrap a fully built FSM
    ///
    /// `data` is usually shared with the transition actions of `fsm`.
    pub fn new(name: impl Into<Cow<'static, str>>, mut fsm: Fsm<E>, data: Rc<RefCell<D>>) -> Self {
        let sources: Rc<RefCell<Vec<SharedSource>>> = Rc::new(RefCell::new(Vec::new()));

        // A two-state machine accepts the same events for its whole life
        let subscription = if fsm.is_trivial() {
            None
        } else {
            let sources = Rc::clone(&sources);
            let owner = fsm.id();
            Some(fsm.subscribe_current(move |old: &StateRef, new: &StateRef| {
                update_registrations(&sources.borrow(), owner, old, new);
            }))
        };

        Self {
            name: name.into(),
            fsm,
            data,
            activated: true,
            sources,
            subscription,
            throttle: None,
            log: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fsm(&self) -> &Fsm<E> {
        &self.fsm
    }

    pub fn fsm_mut(&mut self) -> &mut Fsm<E> {
        &mut self.fsm
    }

    /// Handle to the interaction data
    pub fn data(&self) -> Rc<RefCell<D>> {
        Rc::clone(&self.data)
    }

    /// Whether listener registrations follow state changes
    pub fn tracks_state_changes(&self) -> bool {
        self.subscription.is_some()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Feed an event coming from one of the registered sources
    ///
    /// Deactivated interactions ignore events. Returns whether a transition
    /// fired.
    pub fn process_event(&mut self, event: E) -> Result<bool> {
        if !self.activated {
            return Ok(false);
        }

        let scheduler = self.fsm.scheduler();
        let decision = match self.throttle.as_mut() {
            Some(throttle) if !throttle.window.is_zero() => {
                let event_type = event.event_type();
                if throttle.token.is_some() && throttle.event_type == Some(event_type) {
                    ThrottleDecision::Suppress
                } else {
                    if let Some(token) = throttle.token.take() {
                        scheduler.cancel(token);
                    }
                    throttle.event_type = Some(event_type);
                    throttle.token = Some(scheduler.schedule(throttle.window));
                    ThrottleDecision::Process {
                        flushed: throttle.suppressed.take(),
                    }
                }
            }
            _ => ThrottleDecision::Process { flushed: None },
        };

        match decision {
            ThrottleDecision::Suppress => {
                if let Some(throttle) = self.throttle.as_mut() {
                    throttle.suppressed = Some(event);
                }
                Ok(false)
            }
            ThrottleDecision::Process { flushed } => {
                if let Some(flushed) = flushed {
                    self.direct_process(&flushed)?;
                }
                self.direct_process(&event)
            }
        }
    }

    /// Deliver an expired timer, either a throttling window or an FSM
    /// timeout
    pub fn fire_timeout(&mut self, token: TimerToken) -> Result<bool> {
        let expired = self
            .throttle
            .as_mut()
            .filter(|throttle| throttle.token == Some(token))
            .map(|throttle| {
                throttle.token = None;
                throttle.event_type = None;
                throttle.suppressed.take()
            });

        match expired {
            Some(Some(event)) if self.activated => self.direct_process(&event),
            Some(_) => Ok(false),
            None => self.fsm.fire_timeout(token),
        }
    }

    fn direct_process(&mut self, event: &E) -> Result<bool> {
        if self.fsm.current_state().is_init() && !self.fsm.has_active_sub() {
            self.data
                .try_borrow_mut()
                .map_err(|_| FsmError::Reentrant)?
                .reset();
        }
        if self.log {
            tracing::debug!(target: "gesto::interaction", interaction = %self.name, ?event, "processing event");
        }
        self.fsm.process(event)
    }

    /// Collapse successive events of the same type arriving within `window`
    ///
    /// The first event of a window is processed immediately; the last one
    /// suppressed is processed when the window expires. A zero window
    /// disables throttling.
    pub fn set_throttle_timeout(&mut self, window: Duration) {
        if let Some(token) = self.throttle.take().and_then(|throttle| throttle.token) {
            self.fsm.scheduler().cancel(token);
        }
        if !window.is_zero() {
            self.throttle = Some(Throttle {
                window,
                token: None,
                event_type: None,
                suppressed: None,
            });
        }
    }

    // ========================================================================
    // Sources
    // ========================================================================

    /// Start listening to `sources` for the events the current state accepts
    pub fn register_to(&mut self, sources: impl IntoIterator<Item = SharedSource>) {
        let owner = self.fsm.id();
        let accepted = self.fsm.current_state().accepted_events().clone();
        let mut tracked = self.sources.borrow_mut();

        for source in sources {
            if tracked.iter().any(|known| Rc::ptr_eq(known, &source)) {
                continue;
            }
            for event_type in accepted.iter() {
                source.register(owner, event_type);
            }
            tracked.push(source);
        }
        if self.log {
            tracing::debug!(target: "gesto::interaction", interaction = %self.name, sources = tracked.len(), "registered");
        }
    }

    /// Stop listening to every tracked source
    pub fn unregister_from_all(&mut self) {
        let owner = self.fsm.id();
        let accepted = self.fsm.current_state().accepted_events().clone();
        let sources = std::mem::take(&mut *self.sources.borrow_mut());

        for source in &sources {
            for event_type in accepted.iter() {
                source.unregister(owner, event_type);
            }
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.borrow().len()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Enable or disable the interaction
    ///
    /// Disabling abandons the current run silently: the FSM is fully
    /// reinitialised without cancel notification.
    pub fn set_activated(&mut self, activated: bool) {
        if self.log {
            tracing::debug!(target: "gesto::interaction", interaction = %self.name, activated, "activation");
        }
        self.activated = activated;
        if !activated {
            self.full_reinit();
        }
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.activated && (!self.fsm.current_state().is_init() || self.fsm.has_active_sub())
    }

    /// Abandon the current run and drop throttled events
    pub fn full_reinit(&mut self) {
        if let Some(throttle) = self.throttle.as_mut() {
            if let Some(token) = throttle.token.take() {
                self.fsm.scheduler().cancel(token);
            }
            throttle.event_type = None;
            throttle.suppressed = None;
        }
        self.fsm.full_reinit();
        if let Ok(mut data) = self.data.try_borrow_mut() {
            data.reset();
        }
    }

    /// Toggle debug traces for the interaction and its FSM
    pub fn log(&mut self, log: bool) {
        self.log = log;
        self.fsm.log(log);
    }

    /// Detach the interaction from its sources and dismantle its FSM
    pub fn uninstall(&mut self) {
        self.unregister_from_all();
        self.set_activated(false);
        if let Some(id) = self.subscription.take() {
            self.fsm.unsubscribe_current(id);
        }
        self.fsm.uninstall();
        self.log = false;
    }
}

impl<E: TypedEvent + 'static, D: InteractionData + 'static> fmt::Debug for Interaction<E, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interaction")
            .field("name", &self.name)
            .field("activated", &self.activated)
            .field("current", self.fsm.current_state())
            .field("sources", &self.source_count())
            .finish()
    }
}

/// Register and unregister only what changed between two states
fn update_registrations(sources: &[SharedSource], owner: FsmId, old: &StateRef, new: &StateRef) {
    let (old, new) = (old.accepted_events(), new.accepted_events());
    for event_type in old.difference(new) {
        for source in sources {
            source.unregister(owner, event_type);
        }
    }
    for event_type in new.difference(old) {
        for source in sources {
            source.register(owner, event_type);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{event_types, MouseButton, UiEvent};
    use crate::fsm::{FsmHandler, Transition};
    use crate::error::HandlerError;
    use crate::timer::{TimeoutScheduler, TimerQueue};

    #[derive(Debug, Default)]
    struct DragData {
        moves: usize,
    }

    impl InteractionData for DragData {
        fn reset(&mut self) {
            self.moves = 0;
        }
    }

    fn down() -> UiEvent {
        UiEvent::MouseDown {
            button: MouseButton::Left,
            x: 0.0,
            y: 0.0,
        }
    }

    fn up() -> UiEvent {
        UiEvent::MouseUp {
            button: MouseButton::Left,
            x: 0.0,
            y: 0.0,
        }
    }

    fn moved(x: f32) -> UiEvent {
        UiEvent::MouseMove { x, y: 0.0 }
    }

    /// init -down-> pressed -move-> pressed, pressed -up-> released
    fn press_move_release(timers: &Rc<TimerQueue>) -> Interaction<UiEvent, DragData> {
        let data = Rc::new(RefCell::new(DragData::default()));
        let mut fsm = Fsm::new(timers.clone());
        let pressed = fsm.add_std_state("pressed");
        let released = fsm.add_terminal_state("released");
        fsm.add_transition(fsm.init_state(), pressed, Transition::on([event_types::MOUSE_DOWN]))
            .unwrap();
        let d = data.clone();
        fsm.add_transition(
            pressed,
            pressed,
            Transition::on([event_types::MOUSE_MOVE]).action(move |_| d.borrow_mut().moves += 1),
        )
        .unwrap();
        fsm.add_transition(pressed, released, Transition::on([event_types::MOUSE_UP]))
            .unwrap();
        Interaction::new("press-move-release", fsm, data)
    }

    #[derive(Default)]
    struct RecordingSource {
        calls: RefCell<Vec<(&'static str, EventType)>>,
    }

    impl EventSource for RecordingSource {
        fn register(&self, _listener: FsmId, event_type: EventType) {
            self.calls.borrow_mut().push(("register", event_type));
        }

        fn unregister(&self, _listener: FsmId, event_type: EventType) {
            self.calls.borrow_mut().push(("unregister", event_type));
        }
    }

    #[derive(Default)]
    struct Cancels(usize);

    impl FsmHandler for Cancels {
        fn fsm_cancels(&mut self) -> std::result::Result<(), HandlerError> {
            self.0 += 1;
            Ok(())
        }
    }

    #[test]
    fn test_registration_follows_current_state() {
        let timers = Rc::new(TimerQueue::new());
        let mut interaction = press_move_release(&timers);
        let widget = Rc::new(Widget::new("canvas"));
        interaction.register_to([widget.clone() as SharedSource]);
        let owner = interaction.fsm().id();

        assert!(widget.is_listening(owner, event_types::MOUSE_DOWN));
        assert_eq!(widget.listener_count(), 1);

        interaction.process_event(down()).unwrap();
        assert!(!widget.is_listening(owner, event_types::MOUSE_DOWN));
        assert!(widget.is_listening(owner, event_types::MOUSE_MOVE));
        assert!(widget.is_listening(owner, event_types::MOUSE_UP));

        interaction.process_event(up()).unwrap();
        assert!(widget.is_listening(owner, event_types::MOUSE_DOWN));
        assert_eq!(widget.listener_count(), 1);
    }

    #[test]
    fn test_only_symmetric_difference_is_updated() {
        let timers = Rc::new(TimerQueue::new());
        let mut interaction = press_move_release(&timers);
        let source = Rc::new(RecordingSource::default());
        interaction.register_to([source.clone() as SharedSource]);
        source.calls.borrow_mut().clear();

        interaction.process_event(down()).unwrap();
        source.calls.borrow_mut().clear();

        // pressed -> pressed: nothing changes
        interaction.process_event(moved(1.0)).unwrap();
        assert!(source.calls.borrow().is_empty());

        interaction.process_event(up()).unwrap();
        assert_eq!(
            *source.calls.borrow(),
            vec![
                ("unregister", event_types::MOUSE_UP),
                ("unregister", event_types::MOUSE_MOVE),
                ("register", event_types::MOUSE_DOWN),
            ]
        );
    }

    #[test]
    fn test_register_unregister_cycles_leave_no_listener() {
        let timers = Rc::new(TimerQueue::new());
        let mut interaction = press_move_release(&timers);
        let widgets: Vec<Rc<Widget>> = (0..3).map(|i| Rc::new(Widget::new(format!("w{i}")))).collect();

        for _ in 0..50 {
            interaction.register_to(widgets.iter().map(|w| w.clone() as SharedSource));
            interaction.register_to(widgets.iter().map(|w| w.clone() as SharedSource));
            assert_eq!(interaction.source_count(), 3);
            interaction.unregister_from_all();
        }

        assert_eq!(interaction.source_count(), 0);
        assert!(widgets.iter().all(|w| w.listener_count() == 0));
    }

    #[test]
    fn test_trivial_fsm_skips_state_tracking() {
        let timers = Rc::new(TimerQueue::new());
        let mut fsm = Fsm::<UiEvent>::new(timers);
        let end = fsm.add_terminal_state("clicked");
        fsm.add_transition(fsm.init_state(), end, Transition::on([event_types::CLICK]))
            .unwrap();
        let interaction = Interaction::new("click", fsm, Rc::new(RefCell::new(())));

        assert!(!interaction.tracks_state_changes());
        assert!(press_move_release(&Rc::new(TimerQueue::new())).tracks_state_changes());
    }

    #[test]
    fn test_deactivated_interaction_ignores_events() {
        let timers = Rc::new(TimerQueue::new());
        let mut interaction = press_move_release(&timers);
        interaction.set_activated(false);

        assert!(!interaction.process_event(down()).unwrap());
        assert!(interaction.fsm().current_state().is_init());
        assert!(!interaction.is_running());
    }

    #[test]
    fn test_deactivation_is_silent() {
        let timers = Rc::new(TimerQueue::new());
        let mut interaction = press_move_release(&timers);
        let cancels = Rc::new(RefCell::new(Cancels::default()));
        interaction.fsm_mut().add_handler(cancels.clone());

        interaction.process_event(down()).unwrap();
        assert!(interaction.is_running());

        interaction.set_activated(false);
        assert!(!interaction.is_running());
        assert!(interaction.fsm().current_state().is_init());
        assert_eq!(cancels.borrow().0, 0);

        interaction.set_activated(true);
        assert!(interaction.process_event(down()).unwrap());
    }

    #[test]
    fn test_data_reset_when_new_run_starts() {
        let timers = Rc::new(TimerQueue::new());
        let mut interaction = press_move_release(&timers);
        let data = interaction.data();

        interaction.process_event(down()).unwrap();
        interaction.process_event(moved(1.0)).unwrap();
        interaction.process_event(moved(2.0)).unwrap();
        interaction.process_event(up()).unwrap();
        assert_eq!(data.borrow().moves, 2);

        interaction.process_event(down()).unwrap();
        assert_eq!(data.borrow().moves, 0);
    }

    #[test]
    fn test_throttling_keeps_last_suppressed_event() {
        let timers = Rc::new(TimerQueue::new());
        let mut interaction = press_move_release(&timers);
        interaction.set_throttle_timeout(Duration::from_millis(100));
        let data = interaction.data();

        assert!(interaction.process_event(down()).unwrap());
        // different type: processed, opens a move window
        assert!(interaction.process_event(moved(1.0)).unwrap());
        assert!(!interaction.process_event(moved(2.0)).unwrap());
        assert!(!interaction.process_event(moved(3.0)).unwrap());
        assert_eq!(data.borrow().moves, 1);

        for token in timers.advance(Duration::from_millis(100)) {
            interaction.fire_timeout(token).unwrap();
        }
        assert_eq!(data.borrow().moves, 2);
    }

    #[test]
    fn test_throttled_event_flushed_before_other_type() {
        let timers = Rc::new(TimerQueue::new());
        let mut interaction = press_move_release(&timers);
        interaction.set_throttle_timeout(Duration::from_millis(100));
        let data = interaction.data();

        interaction.process_event(down()).unwrap();
        interaction.process_event(moved(1.0)).unwrap();
        interaction.process_event(moved(2.0)).unwrap();
        assert!(interaction.process_event(up()).unwrap());

        assert_eq!(data.borrow().moves, 2);
        assert!(interaction.fsm().current_state().is_init());
        assert_eq!(timers.pending_count(), 1);
    }

    #[test]
    fn test_throttle_timer_is_not_an_fsm_timeout() {
        let timers = Rc::new(TimerQueue::new());
        let mut interaction = press_move_release(&timers);
        interaction.set_throttle_timeout(Duration::from_millis(50));

        interaction.process_event(down()).unwrap();
        let tokens = timers.advance(Duration::from_millis(50));
        assert_eq!(tokens.len(), 1);
        assert!(!interaction.fire_timeout(tokens[0]).unwrap());
        assert!(interaction.is_running());

        // a foreign token is ignored
        let other = timers.schedule(Duration::from_millis(1));
        assert!(!interaction.fire_timeout(other).unwrap());
    }

    #[test]
    fn test_uninstall_detaches_everything() {
        let timers = Rc::new(TimerQueue::new());
        let mut interaction = press_move_release(&timers);
        let widget = Rc::new(Widget::new("canvas"));
        interaction.register_to([widget.clone() as SharedSource]);
        interaction.process_event(down()).unwrap();

        interaction.uninstall();

        assert_eq!(widget.listener_count(), 0);
        assert!(!interaction.is_activated());
        assert!(!interaction.tracks_state_changes());
        assert_eq!(interaction.fsm().state_count(), 1);
    }
}
