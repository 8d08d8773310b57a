//! Finite state machines for user interactions
//!
//! An [`Fsm`] recognises one interaction (a click, a drag, ...) from a stream
//! of input events. Every run starts in the initial state and ends when a
//! terminal state (success) or a cancelling state (abort) is entered. Along
//! the way the FSM notifies its [`FsmHandler`]s:
//!
//! - **start** once per run, when the starting state is reached (by default
//!   when the initial state is left)
//! - **update** each time a standard state is entered after the start
//! - **stop** when a terminal state is entered after the start
//! - **cancel** when a cancelling state is entered after the start, or when a
//!   handler or an action fails
//!
//! The state graph is built once and reused across runs. Only the current
//! state, the armed timeout, the active sub-FSM, the started flag and the
//! recycled events change from run to run.
//!
//! # Example
//!
//! ```rust
//! use gesto_core::events::{event_types, MouseButton, UiEvent};
//! use gesto_core::fsm::{Fsm, Transition};
//! use gesto_core::timer::TimerQueue;
//! use std::rc::Rc;
//!
//! let timers = Rc::new(TimerQueue::new());
//! let mut fsm = Fsm::<UiEvent>::new(timers);
//!
//! let pressed = fsm.add_std_state("pressed");
//! let released = fsm.add_terminal_state("released");
//! fsm.add_transition(fsm.init_state(), pressed, Transition::on([event_types::MOUSE_DOWN]))
//!     .unwrap();
//! fsm.add_transition(pressed, released, Transition::on([event_types::MOUSE_UP]))
//!     .unwrap();
//!
//! let down = UiEvent::MouseDown { button: MouseButton::Left, x: 0.0, y: 0.0 };
//! assert!(fsm.process(&down).unwrap());
//! assert_eq!(fsm.current_state().name(), "pressed");
//! ```
//!
//! # Timeouts
//!
//! Entering a standard state arms its first timeout transition on the FSM's
//! [`TimeoutScheduler`]. The host hands expired tokens back through
//! [`Fsm::fire_timeout`]. Any transition fired from the state disarms it.
//!
//! # Sub-FSMs
//!
//! [`Transition::sub_fsm`] embeds a whole FSM in a transition. Once taken,
//! events go to the embedded FSM and its current state is mirrored by the
//! outer one. When the embedded FSM stops, the declared target of the
//! transition is entered; when it cancels, the outer run is cancelled.

mod handler;
mod state;
mod transition;

pub use handler::FsmHandler;
pub use state::{StateId, StateKind, StateRef};
pub use transition::Transition;

use crate::error::{FsmError, Result};
use crate::events::{EventTypes, TypedEvent};
use crate::obs::{ObsValue, SubscriptionId};
use crate::timer::{TimeoutScheduler, TimerToken};
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use state::{StateHook, StateNode};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use transition::{TransitionKind, TransitionNode};

new_key_type! {
    /// Key of a transition inside its FSM
    pub struct TransitionId;
    /// Key of a registered handler
    pub struct HandlerId;
}

/// Unique identifier of an FSM
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FsmId(u64);

impl FsmId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        FsmId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FsmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fsm#{}", self.0)
    }
}

/// A handler shared between an FSM and its owner
pub type SharedHandler = Rc<RefCell<dyn FsmHandler>>;

/// Handle used to push events to be replayed after the current run
///
/// Some events outlive the run that consumed them (a modifier key still held
/// when a wheel interaction completes). Pushing them here replays them, in
/// order, once the run terminates normally. A cancelled run drops them.
pub struct Recycler<E>(Rc<RefCell<VecDeque<E>>>);

impl<E> Recycler<E> {
    fn new() -> Self {
        Recycler(Rc::new(RefCell::new(VecDeque::new())))
    }

    /// Queue an event for replay
    pub fn recycle(&self, event: E) {
        self.0.borrow_mut().push_back(event);
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    fn pop(&self) -> Option<E> {
        self.0.borrow_mut().pop_front()
    }

    fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl<E> Clone for Recycler<E> {
    fn clone(&self) -> Self {
        Recycler(Rc::clone(&self.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Signal {
    Start,
    Update,
    Stop,
    Cancel,
}

// ============================================================================
// Parent link
// ============================================================================

/// How a running sub-FSM reports to the FSM that delegated to it
///
/// The link only lives for the duration of one delegated call, so the
/// sub-FSM never holds a reference to its parent.
pub(crate) trait ParentLink<E: TypedEvent + 'static> {
    fn sub_started(&mut self) -> Result<()>;
    fn sub_updated(&mut self, current: &StateRef) -> Result<()>;
    fn sub_stopped(&mut self) -> Result<()>;
    fn sub_cancelled(&mut self) -> Result<()>;

    /// Whether the stop just reported ended the parent run by cancelling it
    fn run_cancelled(&self) -> bool {
        false
    }
}

/// Parent of a top-level FSM
struct Detached;

impl<E: TypedEvent + 'static> ParentLink<E> for Detached {
    fn sub_started(&mut self) -> Result<()> {
        Ok(())
    }

    fn sub_updated(&mut self, _current: &StateRef) -> Result<()> {
        Ok(())
    }

    fn sub_stopped(&mut self) -> Result<()> {
        Ok(())
    }

    fn sub_cancelled(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Link from a sub-FSM to the outer FSM owning its transition
struct SubFsmLink<'a, E: TypedEvent + 'static> {
    outer: &'a mut Fsm<E>,
    transition: TransitionId,
    parent: &'a mut dyn ParentLink<E>,
    /// Set once the sub-FSM stopped or cancelled, or once the outer FSM
    /// failed. Later signals from the same delegation are ignored.
    detached: bool,
    /// The sub-FSM stop led the outer FSM to a cancelling state
    cancelled: bool,
}

impl<'a, E: TypedEvent + 'static> SubFsmLink<'a, E> {
    fn endpoints(&self) -> Result<(StateId, StateId)> {
        self.outer
            .transitions
            .get(self.transition)
            .map(|node| (node.src, node.tgt))
            .ok_or(FsmError::UnknownTransition)
    }

    fn detach_on_error(&mut self, result: Result<()>) -> Result<()> {
        if result.is_err() {
            self.detached = true;
        }
        result
    }
}

impl<'a, E: TypedEvent + 'static> ParentLink<E> for SubFsmLink<'a, E> {
    fn sub_started(&mut self) -> Result<()> {
        if self.detached {
            return Ok(());
        }
        let (src, _) = self.endpoints()?;
        let result = self.outer.exit_state(src, self.parent);
        self.detach_on_error(result)
    }

    fn sub_updated(&mut self, current: &StateRef) -> Result<()> {
        if self.detached {
            return Ok(());
        }
        self.outer.current.set(current.clone());
        let result = self.outer.on_updating(self.parent);
        self.detach_on_error(result)
    }

    fn sub_stopped(&mut self) -> Result<()> {
        if self.detached {
            return Ok(());
        }
        self.detached = true;
        let (_, tgt) = self.endpoints()?;

        let outcome = self.outer.run_action(self.transition, None);
        self.outer.active_sub = None;
        if let Err(err) = outcome {
            self.cancelled = true;
            self.outer.cancel_after_failure(self.parent);
            return Err(FsmError::Action(err));
        }

        match self.outer.states.get(tgt).map(|node| node.kind) {
            Some(StateKind::Cancelling) => {
                self.cancelled = true;
                self.outer.on_cancelling(self.parent)
            }
            Some(_) => self.outer.enter_state(tgt, self.parent),
            None => Err(FsmError::UnknownState),
        }
    }

    fn sub_cancelled(&mut self) -> Result<()> {
        if self.detached {
            return Ok(());
        }
        self.detached = true;
        self.outer.active_sub = None;
        self.outer.on_cancelling(self.parent)
    }

    fn run_cancelled(&self) -> bool {
        self.cancelled
    }
}

// ============================================================================
// FSM
// ============================================================================

/// A finite state machine driven by events of type `E`
pub struct Fsm<E: TypedEvent + 'static> {
    id: FsmId,
    states: SlotMap<StateId, StateNode>,
    transitions: SlotMap<TransitionId, TransitionNode<E>>,
    init: StateId,
    current: ObsValue<StateRef>,
    starting_state: StateId,
    started: bool,
    /// Embedded in a sub-FSM transition
    inner: bool,
    handlers: SlotMap<HandlerId, SharedHandler>,
    /// Notification order
    handler_order: SmallVec<[HandlerId; 2]>,
    recycled: Recycler<E>,
    current_timeout: Option<TransitionId>,
    active_sub: Option<TransitionId>,
    scheduler: Rc<dyn TimeoutScheduler>,
    epsilon_depth: usize,
    /// Nesting of delegations lending a sub-FSM out of its transition
    delegating: usize,
    /// A termination happened while delegating; its recycled events wait
    /// for the sub-FSM to be back in place
    replay_pending: bool,
    log: bool,
}

impl<E: TypedEvent + 'static> Fsm<E> {
    /// Create an FSM holding only its initial state
    pub fn new(scheduler: Rc<dyn TimeoutScheduler>) -> Self {
        let id = FsmId::next();
        let mut states = SlotMap::with_key();
        let init = states.insert(StateNode::new("init", StateKind::Init));
        let current = ObsValue::new(StateRef {
            fsm: id,
            id: init,
            kind: StateKind::Init,
            name: Rc::from("init"),
            accepted: EventTypes::new(),
        });

        Self {
            id,
            states,
            transitions: SlotMap::with_key(),
            init,
            current,
            starting_state: init,
            started: false,
            inner: false,
            handlers: SlotMap::with_key(),
            handler_order: SmallVec::new(),
            recycled: Recycler::new(),
            current_timeout: None,
            active_sub: None,
            scheduler,
            epsilon_depth: 0,
            delegating: 0,
            replay_pending: false,
            log: false,
        }
    }

    pub fn id(&self) -> FsmId {
        self.id
    }

    /// Scheduler used by the timeout transitions of this FSM
    pub fn scheduler(&self) -> Rc<dyn TimeoutScheduler> {
        Rc::clone(&self.scheduler)
    }

    // ========================================================================
    // Graph construction
    // ========================================================================

    pub fn init_state(&self) -> StateId {
        self.init
    }

    /// Add an intermediate state
    pub fn add_std_state(&mut self, name: &str) -> StateId {
        self.states.insert(StateNode::new(name, StateKind::Std))
    }

    /// Add a state completing the run
    pub fn add_terminal_state(&mut self, name: &str) -> StateId {
        self.states.insert(StateNode::new(name, StateKind::Terminal))
    }

    /// Add a state aborting the run
    pub fn add_cancelling_state(&mut self, name: &str) -> StateId {
        self.states.insert(StateNode::new(name, StateKind::Cancelling))
    }

    /// Run `hook` each time `state` is entered
    pub fn on_enter(&mut self, state: StateId, hook: impl FnMut() + 'static) -> Result<()> {
        let node = self.states.get_mut(state).ok_or(FsmError::UnknownState)?;
        node.on_enter = Some(Box::new(hook) as StateHook);
        Ok(())
    }

    /// Run `hook` each time `state` is left
    pub fn on_exit(&mut self, state: StateId, hook: impl FnMut() + 'static) -> Result<()> {
        let node = self.states.get_mut(state).ok_or(FsmError::UnknownState)?;
        node.on_exit = Some(Box::new(hook) as StateHook);
        Ok(())
    }

    /// Attach a transition from `src` to `tgt`
    ///
    /// `src` must be the initial state or a standard state, and `tgt` cannot
    /// be the initial state. Transitions of a state are tried in the order
    /// they were added.
    pub fn add_transition(
        &mut self,
        src: StateId,
        tgt: StateId,
        transition: Transition<E>,
    ) -> Result<TransitionId> {
        let src_node = self.states.get(src).ok_or(FsmError::UnknownState)?;
        if !src_node.kind.is_output() {
            return Err(FsmError::NotOutputState(src_node.name.to_string()));
        }
        let tgt_node = self.states.get(tgt).ok_or(FsmError::UnknownState)?;
        if !tgt_node.kind.is_input() {
            return Err(FsmError::InitTarget);
        }

        let accepted = transition.accepted_events();
        let id = self.transitions.insert(TransitionNode {
            src,
            tgt,
            transition,
            accepted: accepted.clone(),
        });
        if let Some(node) = self.states.get_mut(src) {
            node.transitions.push(id);
            node.accepted.extend_from(&accepted);
        }

        // Keep the published snapshot in sync with the graph
        if self.current.get().fsm == self.id && self.current.get().id == src {
            if let Some(snapshot) = self.state_ref(src) {
                self.current.set_silent(snapshot);
            }
        }
        Ok(id)
    }

    /// State whose entry signals the start of a run
    pub fn set_starting_state(&mut self, state: StateId) -> Result<()> {
        if !self.states.contains_key(state) {
            return Err(FsmError::UnknownState);
        }
        self.starting_state = state;
        Ok(())
    }

    pub fn starting_state(&self) -> StateId {
        self.starting_state
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current state, mirrored from the active sub-FSM while one runs
    pub fn current_state(&self) -> &StateRef {
        self.current.get()
    }

    /// Snapshot of one of the states of this FSM
    pub fn state_ref(&self, state: StateId) -> Option<StateRef> {
        self.states.get(state).map(|node| StateRef {
            fsm: self.id,
            id: state,
            kind: node.kind,
            name: Rc::clone(&node.name),
            accepted: node.accepted.clone(),
        })
    }

    pub fn state_name(&self, state: StateId) -> Option<&str> {
        self.states.get(state).map(|node| &*node.name)
    }

    pub fn state_kind(&self, state: StateId) -> Option<StateKind> {
        self.states.get(state).map(|node| node.kind)
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Whether the FSM only has an initial and a terminal state
    ///
    /// Such an FSM accepts the same events for its whole life.
    pub fn is_trivial(&self) -> bool {
        self.states.len() == 2
            && self
                .states
                .values()
                .all(|node| matches!(node.kind, StateKind::Init | StateKind::Terminal))
    }

    /// Whether the starting state was reached in the current run
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether this FSM is embedded in a sub-FSM transition
    pub fn is_inner(&self) -> bool {
        self.inner
    }

    /// Timeout transition currently armed
    pub fn armed_timeout(&self) -> Option<TransitionId> {
        self.current_timeout
    }

    /// Whether events are being delegated to a sub-FSM
    pub fn has_active_sub(&self) -> bool {
        self.active_sub.is_some()
    }

    /// Whether a timeout transition has fired and not been executed yet
    pub fn is_timed_out(&self, transition: TransitionId) -> bool {
        matches!(
            self.transitions.get(transition).map(|node| &node.transition.kind),
            Some(TransitionKind::Timeout(timer)) if timer.timed_out
        )
    }

    /// Event types accepted by the outgoing transitions of the initial state
    pub(crate) fn init_accepted_events(&self) -> EventTypes {
        self.states
            .get(self.init)
            .map(|node| node.accepted.clone())
            .unwrap_or_default()
    }

    /// Event types accepted by a transition
    pub fn accepted_events(&self, transition: TransitionId) -> Option<&EventTypes> {
        self.transitions.get(transition).map(|node| &node.accepted)
    }

    /// Whether the transition accepts the type of `event`
    pub fn accepts(&self, transition: TransitionId, event: &E) -> bool {
        let Some(node) = self.transitions.get(transition) else {
            return false;
        };
        match &node.transition.kind {
            TransitionKind::Event(types) => types.contains(event.event_type()),
            TransitionKind::Epsilon => true,
            TransitionKind::Timeout(timer) => timer.timed_out,
            TransitionKind::SubFsm(sub) => sub
                .as_deref()
                .is_some_and(|sub| sub.find_init_transition(event).is_some()),
        }
    }

    /// Whether the guard of the transition passes for `event`
    ///
    /// Only meaningful once [`Fsm::accepts`] holds.
    pub fn guard_ok(&self, transition: TransitionId, event: &E) -> bool {
        let Some(node) = self.transitions.get(transition) else {
            return false;
        };
        let own_guard = node.transition.guard.as_ref().map_or(true, |guard| guard(event));
        match &node.transition.kind {
            TransitionKind::Event(_) => own_guard,
            TransitionKind::Epsilon => true,
            TransitionKind::Timeout(timer) => timer.timed_out,
            TransitionKind::SubFsm(sub) => {
                own_guard
                    && sub.as_deref().is_some_and(|sub| {
                        sub.find_init_transition(event)
                            .is_some_and(|tr| sub.guard_ok(tr, event))
                    })
            }
        }
    }

    fn can_fire(&self, transition: TransitionId, event: Option<&E>) -> bool {
        let Some(node) = self.transitions.get(transition) else {
            return false;
        };
        match &node.transition.kind {
            TransitionKind::Epsilon => true,
            TransitionKind::Timeout(timer) => timer.timed_out,
            TransitionKind::Event(_) | TransitionKind::SubFsm(_) => event
                .is_some_and(|event| self.accepts(transition, event) && self.guard_ok(transition, event)),
        }
    }

    fn find_init_transition(&self, event: &E) -> Option<TransitionId> {
        self.states.get(self.init).and_then(|node| {
            node.transitions
                .iter()
                .copied()
                .find(|tr| self.accepts(*tr, event))
        })
    }

    fn first_transition(
        &self,
        state: StateId,
        pred: impl Fn(&Transition<E>) -> bool,
    ) -> Option<TransitionId> {
        self.states.get(state).and_then(|node| {
            node.transitions.iter().copied().find(|tr| {
                self.transitions
                    .get(*tr)
                    .is_some_and(|node| pred(&node.transition))
            })
        })
    }

    // ========================================================================
    // Observers and handlers
    // ========================================================================

    /// Be notified with `(old, new)` each time the current state changes
    ///
    /// The new state is already current when `callback` runs.
    pub fn subscribe_current(
        &mut self,
        callback: impl FnMut(&StateRef, &StateRef) + 'static,
    ) -> SubscriptionId {
        self.current.subscribe(callback)
    }

    pub fn unsubscribe_current(&mut self, id: SubscriptionId) -> bool {
        self.current.unsubscribe(id)
    }

    /// Register a handler, notified after the handlers already registered
    pub fn add_handler(&mut self, handler: SharedHandler) -> HandlerId {
        let id = self.handlers.insert(handler);
        self.handler_order.push(id);
        id
    }

    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        self.handler_order.retain(|h| *h != id);
        self.handlers.remove(id).is_some()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    // ========================================================================
    // Event recycling
    // ========================================================================

    /// Handle to queue events for replay, usable from transition actions
    pub fn recycler(&self) -> Recycler<E> {
        self.recycled.clone()
    }

    /// Queue an event for replay after the current run terminates
    pub fn add_remaining_event(&mut self, event: E) {
        self.recycled.recycle(event);
    }

    pub fn remaining_event_count(&self) -> usize {
        self.recycled.len()
    }

    // ========================================================================
    // Processing
    // ========================================================================

    /// Feed an event to the FSM
    ///
    /// Returns whether a transition fired. Errors mean the run was cancelled
    /// (a handler or an action failed) and the FSM is back in its initial
    /// state.
    pub fn process(&mut self, event: &E) -> Result<bool> {
        self.process_with(event, &mut Detached)
    }

    /// Deliver an expired timer
    ///
    /// Tokens that do not belong to the armed timeout are ignored.
    pub fn fire_timeout(&mut self, token: TimerToken) -> Result<bool> {
        self.fire_timeout_with(token, &mut Detached)
    }

    /// Execute one transition for `event`
    ///
    /// Returns the entered state, or `None` when the transition does not
    /// accept the event or its guard fails. For a sub-FSM transition the
    /// entered state is the target of the matching transition of the sub-FSM.
    pub fn execute(
        &mut self,
        transition: TransitionId,
        event: Option<&E>,
    ) -> Result<Option<StateRef>> {
        self.execute_with(transition, event, &mut Detached)
    }

    pub(crate) fn process_with(&mut self, event: &E, parent: &mut dyn ParentLink<E>) -> Result<bool> {
        if let Some(sub) = self.active_sub {
            return self
                .delegate(sub, parent, |sub, link| sub.process_with(event, link))
                .map(|fired| fired.unwrap_or(false));
        }

        let current = self.current.get();
        if current.fsm != self.id {
            return Err(FsmError::ForeignState(current.name.to_string()));
        }
        let candidates = self
            .states
            .get(current.id)
            .map(|node| node.transitions.clone())
            .ok_or(FsmError::UnknownState)?;

        for transition in candidates {
            if self.execute_with(transition, Some(event), parent)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) fn fire_timeout_with(
        &mut self,
        token: TimerToken,
        parent: &mut dyn ParentLink<E>,
    ) -> Result<bool> {
        if let Some(sub) = self.active_sub {
            return self
                .delegate(sub, parent, |sub, link| sub.fire_timeout_with(token, link))
                .map(|fired| fired.unwrap_or(false));
        }
        if !self.mark_timeout_fired(token) {
            return Ok(false);
        }
        self.on_timeout(parent)
    }

    /// Flag the armed timeout as fired if `token` is its pending timer
    pub(crate) fn mark_timeout_fired(&mut self, token: TimerToken) -> bool {
        let Some(transition) = self.current_timeout else {
            return false;
        };
        match self
            .transitions
            .get_mut(transition)
            .map(|node| &mut node.transition.kind)
        {
            Some(TransitionKind::Timeout(timer)) if timer.token == Some(token) => {
                timer.token = None;
                timer.timed_out = true;
                true
            }
            _ => false,
        }
    }

    fn on_timeout(&mut self, parent: &mut dyn ParentLink<E>) -> Result<bool> {
        let Some(transition) = self.current_timeout else {
            return Ok(false);
        };
        if self.log {
            tracing::debug!(target: "gesto::fsm", fsm = %self.id, "timeout");
        }
        self.execute_with(transition, None, parent)
            .map(|entered| entered.is_some())
    }

    fn execute_with(
        &mut self,
        transition: TransitionId,
        event: Option<&E>,
        parent: &mut dyn ParentLink<E>,
    ) -> Result<Option<StateRef>> {
        let node = self
            .transitions
            .get(transition)
            .ok_or(FsmError::UnknownTransition)?;
        let (src, tgt) = (node.src, node.tgt);
        let is_timeout = node.transition.is_timeout();
        if matches!(node.transition.kind, TransitionKind::SubFsm(_)) {
            return self.execute_sub(transition, event, parent);
        }
        if !self.can_fire(transition, event) {
            return Ok(None);
        }

        self.stop_current_timeout();
        let result = self.run_transition(transition, src, tgt, event, parent);
        if is_timeout {
            if let Some(TransitionKind::Timeout(timer)) = self
                .transitions
                .get_mut(transition)
                .map(|node| &mut node.transition.kind)
            {
                timer.timed_out = false;
            }
        }
        result?;
        self.state_ref(tgt).map(Some).ok_or(FsmError::UnknownState)
    }

    /// Exit, action, enter
    fn run_transition(
        &mut self,
        transition: TransitionId,
        src: StateId,
        tgt: StateId,
        event: Option<&E>,
        parent: &mut dyn ParentLink<E>,
    ) -> Result<()> {
        self.exit_state(src, parent)?;
        if let Err(err) = self.run_action(transition, event) {
            if self.log {
                tracing::debug!(target: "gesto::fsm", fsm = %self.id, error = %err, "action failed");
            }
            self.cancel_after_failure(parent);
            return Err(FsmError::Action(err));
        }
        self.enter_state(tgt, parent)
    }

    fn run_action(
        &mut self,
        transition: TransitionId,
        event: Option<&E>,
    ) -> std::result::Result<(), crate::error::ActionError> {
        match self
            .transitions
            .get_mut(transition)
            .and_then(|node| node.transition.action.as_mut())
        {
            Some(action) => action(event),
            None => Ok(()),
        }
    }

    fn execute_sub(
        &mut self,
        transition: TransitionId,
        event: Option<&E>,
        parent: &mut dyn ParentLink<E>,
    ) -> Result<Option<StateRef>> {
        let Some(event) = event else {
            return Ok(None);
        };
        if !self.can_fire(transition, Some(event)) {
            return Ok(None);
        }
        let entered = match self.sub_ref(transition) {
            Some(sub) => sub
                .find_init_transition(event)
                .and_then(|tr| sub.transitions.get(tr))
                .and_then(|node| sub.state_ref(node.tgt)),
            None => return Ok(None),
        };

        self.stop_current_timeout();
        self.active_sub = Some(transition);
        if self.log {
            tracing::debug!(target: "gesto::fsm", fsm = %self.id, "delegating to sub-FSM");
        }
        self.delegate(transition, parent, |sub, link| sub.process_with(event, link))?;
        Ok(entered)
    }

    /// Lend the sub-FSM of `transition` to `f`, linked to this FSM
    fn delegate<R>(
        &mut self,
        transition: TransitionId,
        parent: &mut dyn ParentLink<E>,
        f: impl FnOnce(&mut Fsm<E>, &mut dyn ParentLink<E>) -> Result<R>,
    ) -> Result<Option<R>> {
        let Some(mut sub) = self.take_sub(transition) else {
            return Ok(None);
        };
        self.delegating += 1;
        let result = {
            let mut link = SubFsmLink {
                outer: &mut *self,
                transition,
                parent: &mut *parent,
                detached: false,
                cancelled: false,
            };
            let link: &mut dyn ParentLink<E> = &mut link;
            f(sub.as_mut(), link)
        };
        self.delegating -= 1;
        self.restore_sub(transition, sub);

        if self.delegating > 0 {
            return result.map(Some);
        }
        let replay = std::mem::take(&mut self.replay_pending);
        let result = result?;
        if replay {
            self.process_remaining_events(parent)?;
        }
        Ok(Some(result))
    }

    fn sub_ref(&self, transition: TransitionId) -> Option<&Fsm<E>> {
        match self.transitions.get(transition).map(|node| &node.transition.kind) {
            Some(TransitionKind::SubFsm(Some(sub))) => Some(sub.as_ref()),
            _ => None,
        }
    }

    fn sub_mut(&mut self, transition: TransitionId) -> Option<&mut Fsm<E>> {
        match self
            .transitions
            .get_mut(transition)
            .map(|node| &mut node.transition.kind)
        {
            Some(TransitionKind::SubFsm(Some(sub))) => Some(sub.as_mut()),
            _ => None,
        }
    }

    fn take_sub(&mut self, transition: TransitionId) -> Option<Box<Fsm<E>>> {
        match self
            .transitions
            .get_mut(transition)
            .map(|node| &mut node.transition.kind)
        {
            Some(TransitionKind::SubFsm(slot)) => slot.take(),
            _ => None,
        }
    }

    fn restore_sub(&mut self, transition: TransitionId, sub: Box<Fsm<E>>) {
        if let Some(TransitionKind::SubFsm(slot)) = self
            .transitions
            .get_mut(transition)
            .map(|node| &mut node.transition.kind)
        {
            *slot = Some(sub);
        }
    }

    // ========================================================================
    // Entering and leaving states
    // ========================================================================

    fn exit_state(&mut self, state: StateId, parent: &mut dyn ParentLink<E>) -> Result<()> {
        let node = self.states.get_mut(state).ok_or(FsmError::UnknownState)?;
        if let Some(hook) = node.on_exit.as_mut() {
            hook();
        }
        if node.kind == StateKind::Init {
            self.check_starting_state(state, parent)?;
        }
        Ok(())
    }

    fn enter_state(&mut self, state: StateId, parent: &mut dyn ParentLink<E>) -> Result<()> {
        let node = self.states.get_mut(state).ok_or(FsmError::UnknownState)?;
        if let Some(hook) = node.on_enter.as_mut() {
            hook();
        }
        let kind = node.kind;
        if self.log {
            tracing::debug!(
                target: "gesto::fsm",
                fsm = %self.id,
                state = self.state_name(state).unwrap_or_default(),
                "entering state"
            );
        }

        match kind {
            StateKind::Init => Err(FsmError::InitTarget),
            StateKind::Std => {
                self.check_starting_state(state, parent)?;
                self.enter_std_state(state, parent)
            }
            StateKind::Terminal => {
                self.check_starting_state(state, parent)?;
                self.on_terminating(parent)
            }
            StateKind::Cancelling => self.on_cancelling(parent),
        }
    }

    fn check_starting_state(&mut self, state: StateId, parent: &mut dyn ParentLink<E>) -> Result<()> {
        if !self.started && self.starting_state == state {
            self.on_starting(parent)?;
        }
        Ok(())
    }

    fn enter_std_state(&mut self, state: StateId, parent: &mut dyn ParentLink<E>) -> Result<()> {
        let snapshot = self.state_ref(state).ok_or(FsmError::UnknownState)?;
        self.current.set(snapshot);
        self.arm_timeout(state);
        self.on_updating(parent)?;
        self.fire_epsilon(state, parent)
    }

    fn fire_epsilon(&mut self, state: StateId, parent: &mut dyn ParentLink<E>) -> Result<()> {
        let Some(epsilon) = self.first_transition(state, Transition::is_epsilon) else {
            return Ok(());
        };
        if self.epsilon_depth >= self.states.len() {
            let name = self.state_name(state).unwrap_or_default().to_string();
            self.cancel_after_failure(parent);
            return Err(FsmError::EpsilonLoop(name));
        }

        self.epsilon_depth += 1;
        let result = self.execute_with(epsilon, None, parent);
        self.epsilon_depth -= 1;
        result.map(|_| ())
    }

    // ========================================================================
    // Timeouts
    // ========================================================================

    /// Arm the first timeout transition of `state`, replacing the armed one
    fn arm_timeout(&mut self, state: StateId) {
        let Some(transition) = self.first_transition(state, Transition::is_timeout) else {
            return;
        };
        self.stop_current_timeout();

        if let Some(TransitionKind::Timeout(timer)) = self
            .transitions
            .get_mut(transition)
            .map(|node| &mut node.transition.kind)
        {
            timer.timed_out = false;
            let duration = (timer.duration)();
            if !duration.is_zero() {
                timer.token = Some(self.scheduler.schedule(duration));
            }
            if self.log {
                tracing::debug!(target: "gesto::fsm", fsm = %self.id, ?duration, "timeout armed");
            }
        }
        self.current_timeout = Some(transition);
    }

    /// Disarm the current timeout, if any
    pub fn stop_current_timeout(&mut self) {
        let Some(transition) = self.current_timeout.take() else {
            return;
        };
        if let Some(TransitionKind::Timeout(timer)) = self
            .transitions
            .get_mut(transition)
            .map(|node| &mut node.transition.kind)
        {
            if let Some(token) = timer.token.take() {
                self.scheduler.cancel(token);
                if self.log {
                    tracing::debug!(target: "gesto::fsm", fsm = %self.id, "timeout stopped");
                }
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    fn on_starting(&mut self, parent: &mut dyn ParentLink<E>) -> Result<()> {
        if self.log {
            tracing::debug!(target: "gesto::fsm", fsm = %self.id, "FSM started");
        }
        self.started = true;
        let mut result = self.notify(Signal::Start);
        if result.is_ok() {
            result = parent.sub_started();
        }
        self.fail_on_error(result, parent)
    }

    fn on_updating(&mut self, parent: &mut dyn ParentLink<E>) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        if self.log {
            tracing::debug!(target: "gesto::fsm", fsm = %self.id, "FSM updated");
        }
        let mut result = self.notify(Signal::Update);
        if result.is_ok() {
            let current = self.current.get().clone();
            result = parent.sub_updated(&current);
        }
        self.fail_on_error(result, parent)
    }

    fn on_terminating(&mut self, parent: &mut dyn ParentLink<E>) -> Result<()> {
        if self.log {
            tracing::debug!(target: "gesto::fsm", fsm = %self.id, "FSM ended");
        }
        let mut result = if self.started {
            self.notify(Signal::Stop)
        } else {
            Ok(())
        };
        if result.is_ok() {
            result = parent.sub_stopped();
        }
        self.fail_on_error(result, parent)?;

        if parent.run_cancelled() {
            // the outer run is over, nothing may replay inside it
            self.full_reinit();
            return Ok(());
        }
        self.reinit();
        if self.delegating > 0 {
            self.replay_pending = true;
            return Ok(());
        }
        self.process_remaining_events(parent)
    }

    fn on_cancelling(&mut self, parent: &mut dyn ParentLink<E>) -> Result<()> {
        if self.log {
            tracing::debug!(target: "gesto::fsm", fsm = %self.id, "FSM cancelled");
        }
        let handlers = if self.started {
            self.notify(Signal::Cancel)
        } else {
            Ok(())
        };
        let link = parent.sub_cancelled();
        self.full_reinit();
        handlers.and(link)
    }

    /// Cancel the run after a failure, keeping the failure as the reported
    /// error
    fn cancel_after_failure(&mut self, parent: &mut dyn ParentLink<E>) {
        if let Err(err) = self.on_cancelling(parent) {
            tracing::warn!(target: "gesto::fsm", fsm = %self.id, error = %err, "cancel handler failed");
        }
    }

    fn fail_on_error(&mut self, result: Result<()>, parent: &mut dyn ParentLink<E>) -> Result<()> {
        if let Err(err) = result {
            self.cancel_after_failure(parent);
            return Err(err);
        }
        Ok(())
    }

    fn notify(&mut self, signal: Signal) -> Result<()> {
        let handlers: SmallVec<[SharedHandler; 4]> = self
            .handler_order
            .iter()
            .filter_map(|id| self.handlers.get(*id).cloned())
            .collect();

        let mut first_error = None;
        for handler in handlers {
            let result = match handler.try_borrow_mut() {
                Ok(mut handler) => match signal {
                    Signal::Start => handler.fsm_starts(),
                    Signal::Update => handler.fsm_updates(),
                    Signal::Stop => handler.fsm_stops(),
                    Signal::Cancel => handler.fsm_cancels(),
                }
                .map_err(FsmError::from),
                Err(_) => Err(FsmError::Reentrant),
            };
            if let Err(err) = result {
                // Cancellation has no fallback: every handler hears about it
                if signal != Signal::Cancel {
                    return Err(err);
                }
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Replay the events recycled before this termination
    ///
    /// Each event leaves the queue before it is processed, so an event
    /// recycled again by its replay waits for the next termination.
    fn process_remaining_events(&mut self, parent: &mut dyn ParentLink<E>) -> Result<()> {
        let pending = self.recycled.len();
        for _ in 0..pending {
            let Some(event) = self.recycled.pop() else {
                break;
            };
            if self.log {
                tracing::debug!(target: "gesto::fsm", fsm = %self.id, ?event, "recycling event");
            }
            self.process_with(&event, parent)?;
        }
        Ok(())
    }

    /// Back to the initial state without touching recycled events
    pub fn reinit(&mut self) {
        if self.log {
            tracing::debug!(target: "gesto::fsm", fsm = %self.id, "FSM reinitialised");
        }
        self.stop_current_timeout();
        self.started = false;
        if let Some(transition) = self.active_sub.take() {
            if let Some(sub) = self.sub_mut(transition) {
                sub.reinit();
            }
        }
        if let Some(init) = self.state_ref(self.init) {
            self.current.set(init);
        }
    }

    /// Back to the initial state, dropping recycled events and resetting
    /// every sub-FSM
    pub fn full_reinit(&mut self) {
        self.recycled.clear();
        self.replay_pending = false;
        for node in self.transitions.values_mut() {
            if let TransitionKind::SubFsm(Some(sub)) = &mut node.transition.kind {
                sub.full_reinit();
            }
        }
        self.reinit();
    }

    /// Toggle debug traces for this FSM and its sub-FSMs
    pub fn log(&mut self, log: bool) {
        self.log = log;
        for node in self.transitions.values_mut() {
            if let TransitionKind::SubFsm(Some(sub)) = &mut node.transition.kind {
                sub.log(log);
            }
        }
    }

    pub fn is_logging(&self) -> bool {
        self.log
    }

    /// Reset the FSM, drop its observers and handlers, and clear its graph
    pub fn uninstall(&mut self) {
        self.full_reinit();
        self.current.unsubscribe_all();
        self.handlers.clear();
        self.handler_order.clear();
        for node in self.transitions.values_mut() {
            if let TransitionKind::SubFsm(Some(sub)) = &mut node.transition.kind {
                sub.uninstall();
            }
        }
        self.transitions.clear();

        let init = self.init;
        self.states.retain(|id, _| id == init);
        if let Some(node) = self.states.get_mut(init) {
            node.transitions.clear();
            node.accepted = EventTypes::new();
        }
        self.starting_state = init;
        if let Some(snapshot) = self.state_ref(init) {
            self.current.set_silent(snapshot);
        }
    }
}

impl<E: TypedEvent + 'static> fmt::Debug for Fsm<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fsm")
            .field("id", &self.id)
            .field("current", self.current.get())
            .field("states", &self.states.len())
            .field("transitions", &self.transitions.len())
            .field("started", &self.started)
            .field("inner", &self.inner)
            .finish()
    }
}
