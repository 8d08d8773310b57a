//! FSM transitions
//!
//! A transition is a value: a kind (event-filtered, epsilon, timeout or
//! sub-FSM) plus an optional guard and an optional action. Concrete
//! interactions configure these values instead of defining new types.
//!
//! ```
//! use gesto_core::events::{event_types, MouseButton, UiEvent};
//! use gesto_core::fsm::Transition;
//! use std::time::Duration;
//!
//! let press = Transition::<UiEvent>::on([event_types::MOUSE_DOWN])
//!     .guard(|e| e.button() == Some(MouseButton::Left))
//!     .action(|e| println!("pressed: {e:?}"));
//!
//! let timeout = Transition::<UiEvent>::timeout(|| Duration::from_millis(300));
//! # let _ = (press, timeout);
//! ```

use crate::error::ActionError;
use crate::events::{EventTypes, TypedEvent};
use crate::timer::TimerToken;
use std::fmt;
use std::time::Duration;

use super::Fsm;

pub(crate) type Guard<E> = Box<dyn Fn(&E) -> bool>;
pub(crate) type Action<E> = Box<dyn FnMut(Option<&E>) -> Result<(), ActionError>>;
pub(crate) type DurationFn = Box<dyn Fn() -> Duration>;

/// One-shot timer bookkeeping of a timeout transition
pub(crate) struct TimeoutTimer {
    pub(crate) duration: DurationFn,
    pub(crate) token: Option<TimerToken>,
    pub(crate) timed_out: bool,
}

pub(crate) enum TransitionKind<E: TypedEvent + 'static> {
    Event(EventTypes),
    Epsilon,
    Timeout(TimeoutTimer),
    /// `None` while the sub-FSM is lent out for delegation
    SubFsm(Option<Box<Fsm<E>>>),
}

/// An edge of an FSM, before it is attached with [`Fsm::add_transition`]
pub struct Transition<E: TypedEvent + 'static> {
    pub(crate) kind: TransitionKind<E>,
    pub(crate) guard: Option<Guard<E>>,
    pub(crate) action: Option<Action<E>>,
}

impl<E: TypedEvent + 'static> Transition<E> {
    fn with_kind(kind: TransitionKind<E>) -> Self {
        Self {
            kind,
            guard: None,
            action: None,
        }
    }

    /// Transition triggered by events of the given types
    pub fn on(types: impl Into<EventTypes>) -> Self {
        Self::with_kind(TransitionKind::Event(types.into()))
    }

    /// Transition that fires without consuming an event
    ///
    /// An epsilon leaving a standard state fires as soon as that state is
    /// entered. Guards are not evaluated on epsilon transitions.
    pub fn epsilon() -> Self {
        Self::with_kind(TransitionKind::Epsilon)
    }

    /// Transition that fires when its source state has been current for
    /// `duration()`
    ///
    /// The duration is evaluated each time the timeout is armed. A zero
    /// duration never fires. Guards are not evaluated on timeout transitions.
    pub fn timeout(duration: impl Fn() -> Duration + 'static) -> Self {
        Self::with_kind(TransitionKind::Timeout(TimeoutTimer {
            duration: Box::new(duration),
            token: None,
            timed_out: false,
        }))
    }

    /// Timeout transition with a fixed duration
    pub fn after(duration: Duration) -> Self {
        Self::timeout(move || duration)
    }

    /// Transition delegating to an embedded FSM
    ///
    /// It accepts the events accepted by the initial state of `fsm`. Once
    /// taken, every event goes to `fsm` until it stops or cancels; the
    /// declared target is entered when it stops. The action runs when the
    /// sub-FSM stops, without event.
    pub fn sub_fsm(mut fsm: Fsm<E>) -> Self {
        fsm.inner = true;
        Self::with_kind(TransitionKind::SubFsm(Some(Box::new(fsm))))
    }

    /// Additional condition checked once the event type is accepted
    pub fn guard(mut self, guard: impl Fn(&E) -> bool + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Side effect run on events, between leaving the source and entering
    /// the target
    pub fn action(mut self, mut action: impl FnMut(&E) + 'static) -> Self {
        self.action = Some(Box::new(move |event| {
            if let Some(event) = event {
                action(event);
            }
            Ok(())
        }));
        self
    }

    /// Fallible side effect, also run for event-less firings
    /// (epsilon, timeout, sub-FSM stop)
    ///
    /// An error cancels the run and is returned to the caller.
    pub fn try_action(
        mut self,
        action: impl FnMut(Option<&E>) -> Result<(), ActionError> + 'static,
    ) -> Self {
        self.action = Some(Box::new(action));
        self
    }

    /// Event types that can trigger the transition
    pub(crate) fn accepted_events(&self) -> EventTypes {
        match &self.kind {
            TransitionKind::Event(types) => types.clone(),
            TransitionKind::Epsilon | TransitionKind::Timeout(_) => EventTypes::new(),
            TransitionKind::SubFsm(fsm) => fsm
                .as_ref()
                .map(|fsm| fsm.init_accepted_events())
                .unwrap_or_default(),
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self.kind {
            TransitionKind::Event(_) => "event",
            TransitionKind::Epsilon => "epsilon",
            TransitionKind::Timeout(_) => "timeout",
            TransitionKind::SubFsm(_) => "sub-fsm",
        }
    }

    pub(crate) fn is_timeout(&self) -> bool {
        matches!(self.kind, TransitionKind::Timeout(_))
    }

    pub(crate) fn is_epsilon(&self) -> bool {
        matches!(self.kind, TransitionKind::Epsilon)
    }
}

impl<E: TypedEvent + 'static> fmt::Debug for Transition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("kind", &self.kind_name())
            .field("accepted", &self.accepted_events())
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

/// A transition attached to an FSM
pub(crate) struct TransitionNode<E: TypedEvent + 'static> {
    pub(crate) src: super::StateId,
    pub(crate) tgt: super::StateId,
    pub(crate) transition: Transition<E>,
    pub(crate) accepted: EventTypes,
}
