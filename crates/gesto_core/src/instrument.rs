//! Instruments
//!
//! An instrument groups the bindings of one tool (a drawing pen, a selection
//! tool, a zoom control) so they can be switched on and off together. Its
//! bindings are created lazily by a configuration closure the first time the
//! instrument is activated.
//!
//! ```
//! use gesto_core::command::AnonCommand;
//! use gesto_core::events::{event_types, MouseButton, UiEvent};
//! use gesto_core::fsm::{Fsm, Transition};
//! use gesto_core::instrument::Instrument;
//! use gesto_core::interaction::Interaction;
//! use gesto_core::timer::TimerQueue;
//! use gesto_core::WidgetBinding;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let mut pen = Instrument::new("pen", |pen: &mut Instrument<UiEvent>| {
//!     let mut fsm = Fsm::new(Rc::new(TimerQueue::new()));
//!     let end = fsm.add_terminal_state("clicked");
//!     fsm.add_transition(fsm.init_state(), end, Transition::on([event_types::CLICK]))?;
//!     let click = Interaction::new("click", fsm, Rc::new(RefCell::new(())));
//!     pen.add_binding(WidgetBinding::builder(click, |_: &()| AnonCommand::new("dot", || {})).bind());
//!     Ok(())
//! });
//!
//! assert!(!pen.is_configured());
//! pen.set_activated(true);
//! assert_eq!(pen.binding_count(), 1);
//! assert_eq!(pen.process_event(&UiEvent::Click { button: MouseButton::Left, x: 0.0, y: 0.0 }), 1);
//! ```

use crate::binding::{BindingStats, WidgetBinding};
use crate::command::Command;
use crate::error::{ErrorSink, Result, TracingErrorSink};
use crate::events::TypedEvent;
use crate::interaction::InteractionData;
use crate::timer::TimerToken;
use std::fmt;
use std::rc::Rc;

/// A binding seen without its data and command types
pub trait AnyBinding<E> {
    fn name(&self) -> &str;
    fn is_activated(&self) -> bool;
    fn set_activated(&mut self, activated: bool);
    fn is_running(&self) -> bool;
    fn stats(&self) -> BindingStats;
    fn process_event(&mut self, event: E) -> Result<bool>;
    fn fire_timeout(&mut self, token: TimerToken) -> Result<bool>;
    fn clear_events(&mut self);
    fn uninstall(&mut self);
}

impl<E: TypedEvent + 'static, D: InteractionData + 'static, C: Command> AnyBinding<E>
    for WidgetBinding<E, D, C>
{
    fn name(&self) -> &str {
        WidgetBinding::name(self)
    }

    fn is_activated(&self) -> bool {
        WidgetBinding::is_activated(self)
    }

    fn set_activated(&mut self, activated: bool) {
        WidgetBinding::set_activated(self, activated)
    }

    fn is_running(&self) -> bool {
        WidgetBinding::is_running(self)
    }

    fn stats(&self) -> BindingStats {
        WidgetBinding::stats(self)
    }

    fn process_event(&mut self, event: E) -> Result<bool> {
        WidgetBinding::process_event(self, event)
    }

    fn fire_timeout(&mut self, token: TimerToken) -> Result<bool> {
        WidgetBinding::fire_timeout(self, token)
    }

    fn clear_events(&mut self) {
        WidgetBinding::clear_events(self)
    }

    fn uninstall(&mut self) {
        WidgetBinding::uninstall(self)
    }
}

type Configure<E> = Box<dyn FnMut(&mut Instrument<E>) -> Result<()>>;

/// A set of bindings activated and deactivated as one
pub struct Instrument<E: TypedEvent + Clone + 'static> {
    name: String,
    bindings: Vec<Box<dyn AnyBinding<E>>>,
    configure: Option<Configure<E>>,
    configured: bool,
    activated: bool,
    modified: bool,
    error_sink: Rc<dyn ErrorSink>,
}

impl<E: TypedEvent + Clone + 'static> Instrument<E> {
    /// Create an inactive instrument whose bindings `configure` creates on
    /// first activation
    pub fn new(
        name: impl Into<String>,
        configure: impl FnMut(&mut Instrument<E>) -> Result<()> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
            configure: Some(Box::new(configure)),
            configured: false,
            activated: false,
            modified: false,
            error_sink: Rc::new(TracingErrorSink),
        }
    }

    /// Report configuration failures to `sink` instead of the log
    pub fn with_error_sink(mut self, sink: Rc<dyn ErrorSink>) -> Self {
        self.error_sink = sink;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sink bindings created for this instrument should report to
    pub fn error_sink(&self) -> Rc<dyn ErrorSink> {
        Rc::clone(&self.error_sink)
    }

    /// Take ownership of a binding; it follows the instrument's activation
    pub fn add_binding(&mut self, mut binding: impl AnyBinding<E> + 'static) {
        binding.set_activated(self.activated);
        tracing::debug!(target: "gesto::instrument", instrument = %self.name, binding = binding.name(), "binding added");
        self.bindings.push(Box::new(binding));
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn bindings(&self) -> impl Iterator<Item = &dyn AnyBinding<E>> {
        self.bindings.iter().map(|binding| binding.as_ref())
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Switch the instrument and all its bindings on or off
    ///
    /// The first activation with no bindings runs the configuration closure.
    /// A failing configuration is reported to the error sink; the bindings it
    /// added before failing are kept.
    pub fn set_activated(&mut self, activated: bool) {
        if activated == self.activated {
            return;
        }
        self.activated = activated;
        tracing::debug!(target: "gesto::instrument", instrument = %self.name, activated, "activation");

        if activated && !self.configured && self.bindings.is_empty() {
            self.run_configuration();
        }
        for binding in &mut self.bindings {
            binding.set_activated(activated);
        }
    }

    fn run_configuration(&mut self) {
        let Some(mut configure) = self.configure.take() else {
            return;
        };
        self.configured = true;
        if let Err(err) = configure(self) {
            self.error_sink.report(&self.name, &err);
        }
        self.configure = Some(configure);
    }

    /// Dispatch an event to every binding, returning how many accepted it
    ///
    /// Binding failures are already reported to the bindings' sinks.
    pub fn process_event(&mut self, event: &E) -> usize {
        if !self.activated {
            return 0;
        }
        self.bindings
            .iter_mut()
            .map(|binding| binding.process_event(event.clone()))
            .filter(|accepted| matches!(accepted, Ok(true)))
            .count()
    }

    /// Deliver an expired timer to the bindings until one owns it
    pub fn fire_timeout(&mut self, token: TimerToken) -> bool {
        self.bindings
            .iter_mut()
            .any(|binding| matches!(binding.fire_timeout(token), Ok(true)))
    }

    /// Whether any binding is in the middle of a run
    pub fn is_running(&self) -> bool {
        self.bindings.iter().any(|binding| binding.is_running())
    }

    /// Abandon the current runs of all the bindings
    pub fn clear_events(&mut self) {
        for binding in &mut self.bindings {
            binding.clear_events();
        }
    }

    /// Deactivate, then uninstall and drop every binding
    ///
    /// A later activation configures the instrument again.
    pub fn uninstall_bindings(&mut self) {
        self.set_activated(false);
        for binding in &mut self.bindings {
            binding.uninstall();
        }
        self.bindings.clear();
        self.configured = false;
        tracing::debug!(target: "gesto::instrument", instrument = %self.name, "bindings uninstalled");
    }

    /// Whether the instrument changed something since last marked clean
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }
}

impl<E: TypedEvent + Clone + 'static> fmt::Debug for Instrument<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("name", &self.name)
            .field("activated", &self.activated)
            .field("configured", &self.configured)
            .field("bindings", &self.bindings.len())
            .field("modified", &self.modified)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::AnonCommand;
    use crate::error::{CollectingErrorSink, FsmError};
    use crate::events::{event_types, Key, Modifiers, MouseButton, UiEvent};
    use crate::fsm::{Fsm, Transition};
    use crate::interaction::Interaction;
    use crate::timer::TimerQueue;
    use std::cell::RefCell;

    /// init -click-> clicked
    fn click_binding(
        name: &str,
        runs: Rc<RefCell<usize>>,
    ) -> WidgetBinding<UiEvent, (), AnonCommand> {
        let mut fsm = Fsm::new(Rc::new(TimerQueue::new()));
        let end = fsm.add_terminal_state("clicked");
        fsm.add_transition(fsm.init_state(), end, Transition::on([event_types::CLICK]))
            .unwrap();
        let click = Interaction::new("click", fsm, Rc::new(RefCell::new(())));
        WidgetBinding::builder(click, move |_: &()| {
            let runs = runs.clone();
            AnonCommand::new("count", move || *runs.borrow_mut() += 1)
        })
        .name(name)
        .bind()
    }

    /// init -key-> pressed -key-> done
    fn two_key_binding() -> WidgetBinding<UiEvent, (), AnonCommand> {
        let mut fsm = Fsm::new(Rc::new(TimerQueue::new()));
        let pressed = fsm.add_std_state("pressed");
        let end = fsm.add_terminal_state("done");
        fsm.add_transition(fsm.init_state(), pressed, Transition::on([event_types::KEY_DOWN]))
            .unwrap();
        fsm.add_transition(pressed, end, Transition::on([event_types::KEY_DOWN]))
            .unwrap();
        let keys = Interaction::new("keys", fsm, Rc::new(RefCell::new(())));
        WidgetBinding::builder(keys, |_: &()| AnonCommand::new("noop", || {})).bind()
    }

    fn click() -> UiEvent {
        UiEvent::Click {
            button: MouseButton::Left,
            x: 0.0,
            y: 0.0,
        }
    }

    fn key() -> UiEvent {
        UiEvent::KeyDown {
            key: Key::Char('a'),
            modifiers: Modifiers::default(),
        }
    }

    #[test]
    fn test_configured_lazily_once() {
        let configurations = Rc::new(RefCell::new(0));
        let runs = Rc::new(RefCell::new(0));
        let c = configurations.clone();
        let r = runs.clone();
        let mut instrument = Instrument::new("tool", move |tool: &mut Instrument<UiEvent>| {
            *c.borrow_mut() += 1;
            tool.add_binding(click_binding("a", r.clone()));
            tool.add_binding(click_binding("b", r.clone()));
            Ok(())
        });

        assert!(!instrument.is_configured());
        assert_eq!(instrument.binding_count(), 0);

        instrument.set_activated(true);
        instrument.set_activated(false);
        instrument.set_activated(true);

        assert_eq!(*configurations.borrow(), 1);
        assert_eq!(instrument.binding_count(), 2);
        assert_eq!(instrument.process_event(&click()), 2);
        assert_eq!(*runs.borrow(), 2);
    }

    #[test]
    fn test_activation_propagates_to_bindings() {
        let runs = Rc::new(RefCell::new(0));
        let r = runs.clone();
        let mut instrument = Instrument::new("tool", move |tool: &mut Instrument<UiEvent>| {
            tool.add_binding(click_binding("a", r.clone()));
            Ok(())
        });

        instrument.set_activated(true);
        assert!(instrument.bindings().all(|binding| binding.is_activated()));

        instrument.set_activated(false);
        assert!(instrument.bindings().all(|binding| !binding.is_activated()));
        assert_eq!(instrument.process_event(&click()), 0);
        assert_eq!(*runs.borrow(), 0);

        // bindings added while inactive stay inactive
        instrument.add_binding(click_binding("late", runs.clone()));
        assert!(!instrument.bindings().any(|binding| binding.is_activated()));

        instrument.set_activated(true);
        assert_eq!(instrument.process_event(&click()), 2);
        assert_eq!(*runs.borrow(), 2);
    }

    #[test]
    fn test_failed_configuration_reported() {
        let sink = Rc::new(CollectingErrorSink::new());
        let mut instrument = Instrument::<UiEvent>::new("broken", |_| Err(FsmError::InitTarget))
            .with_error_sink(sink.clone());

        instrument.set_activated(true);

        assert!(instrument.is_activated());
        assert!(instrument.is_configured());
        assert_eq!(instrument.binding_count(), 0);
        assert_eq!(sink.len(), 1);
        assert!(sink.errors()[0].starts_with("broken: "));
    }

    #[test]
    fn test_clear_events_and_uninstall() {
        let configurations = Rc::new(RefCell::new(0));
        let c = configurations.clone();
        let mut instrument = Instrument::new("keys", move |tool: &mut Instrument<UiEvent>| {
            *c.borrow_mut() += 1;
            tool.add_binding(two_key_binding());
            Ok(())
        });
        instrument.set_activated(true);

        instrument.process_event(&key());
        assert!(instrument.is_running());
        instrument.clear_events();
        assert!(!instrument.is_running());

        instrument.uninstall_bindings();
        assert!(!instrument.is_activated());
        assert_eq!(instrument.binding_count(), 0);

        instrument.set_activated(true);
        assert_eq!(*configurations.borrow(), 2);
        assert_eq!(instrument.binding_count(), 1);
    }

    #[test]
    fn test_modified_flag() {
        let mut instrument = Instrument::<UiEvent>::new("tool", |_| Ok(()));
        assert!(!instrument.is_modified());
        instrument.set_modified(true);
        assert!(instrument.is_modified());
    }
}
