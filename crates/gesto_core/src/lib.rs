//! Gesto Core Runtime
//!
//! This crate provides the foundational primitives for Gesto interactions:
//!
//! - **State Machines**: states, guarded transitions, timeouts, epsilon
//!   transitions and embedded sub-FSMs
//! - **Interactions**: FSMs wrapped with their data, activation, throttling
//!   and event-source registration
//! - **Widget Bindings**: commands produced, executed and undone from the
//!   lifecycle of an interaction
//! - **Instruments**: groups of bindings configured lazily and switched on
//!   and off together
//! - **Timers**: a host-driven timer queue with a virtual clock
//!
//! # Example
//!
//! ```rust
//! use gesto_core::events::{event_types, MouseButton, UiEvent};
//! use gesto_core::fsm::{Fsm, Transition};
//! use gesto_core::timer::TimerQueue;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let timers = Rc::new(TimerQueue::new());
//! let mut fsm = Fsm::<UiEvent>::new(timers.clone());
//!
//! let pressed = fsm.add_std_state("pressed");
//! let released = fsm.add_terminal_state("released");
//! let held = fsm.add_terminal_state("held");
//!
//! fsm.add_transition(fsm.init_state(), pressed, Transition::on([event_types::MOUSE_DOWN])).unwrap();
//! fsm.add_transition(pressed, released, Transition::on([event_types::MOUSE_UP])).unwrap();
//! fsm.add_transition(pressed, held, Transition::after(Duration::from_millis(500))).unwrap();
//!
//! fsm.process(&UiEvent::MouseDown { button: MouseButton::Left, x: 0.0, y: 0.0 }).unwrap();
//! assert_eq!(fsm.current_state().name(), "pressed");
//!
//! // The host delivers expired timers back to the FSM
//! for token in timers.advance(Duration::from_millis(500)) {
//!     fsm.fire_timeout(token).unwrap();
//! }
//! assert!(fsm.current_state().is_init());
//! ```

pub mod binding;
pub mod command;
pub mod error;
pub mod events;
pub mod fsm;
pub mod instrument;
pub mod interaction;
pub mod obs;
pub mod timer;
pub mod undo;

pub use binding::{
    BindingBuilder, BindingPhase, BindingStats, CommandEvent, CommandExecutor, CommandJob,
    DeferredExecutor, LogLevel, WidgetBinding,
};
pub use command::{AnonCommand, Command, CommandStatus, TrackedCommand};
pub use error::{
    ActionError, CollectingErrorSink, CommandError, ErrorSink, FsmError, HandlerError, Result,
    TracingErrorSink,
};
pub use events::{EventType, EventTypes, Key, Modifiers, MouseButton, TypedEvent, UiEvent};
pub use fsm::{
    Fsm, FsmHandler, FsmId, HandlerId, Recycler, SharedHandler, StateId, StateKind, StateRef,
    Transition, TransitionId,
};
pub use instrument::{AnyBinding, Instrument};
pub use interaction::{EventSource, Interaction, InteractionData, SharedSource, Widget};
pub use obs::{ObsValue, SubscriptionId};
pub use timer::{TimeoutScheduler, TimerQueue, TimerToken};
pub use undo::{SharedHistory, UndoHistory, Undoable};
