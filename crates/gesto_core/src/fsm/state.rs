//! FSM states

use crate::events::EventTypes;
use slotmap::new_key_type;
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

use super::{FsmId, TransitionId};

new_key_type! {
    /// Key of a state inside its FSM
    pub struct StateId;
}

/// The role of a state in a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// Where every run begins. Never entered, only left.
    Init,
    /// Intermediate state
    Std,
    /// Entering it completes the run
    Terminal,
    /// Entering it aborts the run
    Cancelling,
}

impl StateKind {
    /// Whether the state can own outgoing transitions
    pub fn is_output(self) -> bool {
        matches!(self, StateKind::Init | StateKind::Std)
    }

    /// Whether the state can be the target of a transition
    pub fn is_input(self) -> bool {
        !matches!(self, StateKind::Init)
    }
}

pub(crate) type StateHook = Box<dyn FnMut()>;

pub(crate) struct StateNode {
    pub(crate) name: Rc<str>,
    pub(crate) kind: StateKind,
    /// Outgoing transitions in insertion order
    pub(crate) transitions: SmallVec<[TransitionId; 4]>,
    /// Union of the accepted event types of `transitions`
    pub(crate) accepted: EventTypes,
    pub(crate) on_enter: Option<StateHook>,
    pub(crate) on_exit: Option<StateHook>,
}

impl StateNode {
    pub(crate) fn new(name: &str, kind: StateKind) -> Self {
        Self {
            name: Rc::from(name),
            kind,
            transitions: SmallVec::new(),
            accepted: EventTypes::new(),
            on_enter: None,
            on_exit: None,
        }
    }
}

/// Snapshot of a state, as published by an FSM's current-state cell
///
/// While a sub-FSM runs, the outer FSM mirrors the sub-FSM's current state,
/// so a `StateRef` may point into another FSM than the one publishing it.
#[derive(Clone)]
pub struct StateRef {
    pub(crate) fsm: FsmId,
    pub(crate) id: StateId,
    pub(crate) kind: StateKind,
    pub(crate) name: Rc<str>,
    pub(crate) accepted: EventTypes,
}

impl StateRef {
    /// FSM the state belongs to
    pub fn fsm(&self) -> FsmId {
        self.fsm
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Event types accepted by the outgoing transitions of the state
    pub fn accepted_events(&self) -> &EventTypes {
        &self.accepted
    }

    pub fn is_init(&self) -> bool {
        self.kind == StateKind::Init
    }
}

impl PartialEq for StateRef {
    fn eq(&self, other: &Self) -> bool {
        self.fsm == other.fsm && self.id == other.id
    }
}

impl Eq for StateRef {}

impl fmt::Debug for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("accepted", &self.accepted)
            .finish()
    }
}
