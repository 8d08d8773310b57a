//! Widget bindings
//!
//! A binding turns the runs of one interaction into commands. It listens to
//! the lifecycle of the interaction's FSM:
//!
//! - **start**: if `when` holds, produce a fresh command and run `first` on it
//!   (with strict start, a failing `when` cancels the run)
//! - **update**: create the command lazily, run `then`, and with continuous
//!   execution execute it right away
//! - **stop**: final `when` check, then execute the command (synchronously or
//!   through a [`CommandExecutor`]), run `end` and register undoable commands
//! - **cancel**: discard the command, undoing it first if continuous execution
//!   already applied it
//!
//! # Example
//!
//! ```
//! use gesto_core::binding::WidgetBinding;
//! use gesto_core::command::AnonCommand;
//! use gesto_core::events::{event_types, MouseButton, UiEvent};
//! use gesto_core::fsm::{Fsm, Transition};
//! use gesto_core::interaction::Interaction;
//! use gesto_core::timer::TimerQueue;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let mut fsm = Fsm::<UiEvent>::new(Rc::new(TimerQueue::new()));
//! let end = fsm.add_terminal_state("clicked");
//! fsm.add_transition(fsm.init_state(), end, Transition::on([event_types::CLICK])).unwrap();
//! let click = Interaction::new("click", fsm, Rc::new(RefCell::new(())));
//!
//! let mut binding = WidgetBinding::builder(click, |_: &()| AnonCommand::new("save", || {}))
//!     .name("save-button")
//!     .bind();
//!
//! binding
//!     .process_event(UiEvent::Click { button: MouseButton::Left, x: 0.0, y: 0.0 })
//!     .unwrap();
//! assert_eq!(binding.stats().executed, 1);
//! ```

use crate::command::{Command, CommandStatus, TrackedCommand};
use crate::error::{ErrorSink, FsmError, HandlerError, Result, TracingErrorSink};
use crate::events::TypedEvent;
use crate::fsm::{FsmHandler, HandlerId, SharedHandler};
use crate::interaction::{Interaction, InteractionData, SharedSource};
use crate::timer::TimerToken;
use crate::undo::SharedHistory;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

// ============================================================================
// Public types
// ============================================================================

/// What a binding can trace
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// Lifecycle of the binding itself
    Binding,
    /// Creation, execution and disposal of commands
    Command,
    /// Events and state changes of the interaction
    Interaction,
}

/// Where the binding is in the current run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BindingPhase {
    #[default]
    Idle,
    /// A command was produced and initialised
    CommandInitialized,
    /// The command is being executed (continuously, or asynchronously)
    CommandExecuting,
    /// The last run executed its command
    Done,
    /// The last run discarded its command
    Cancelled,
}

/// Command lifecycle moments reported to a command observer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandEvent {
    /// The command ran, at stop or continuously during the run
    Executed,
    /// The command completed and its run is over
    Done,
    /// The command is about to enter the undo history
    Added,
    /// The command was discarded
    Cancelled,
}

/// Counters over the life of a binding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BindingStats {
    /// Commands produced
    pub started: usize,
    /// Commands executed to completion
    pub executed: usize,
    /// Commands discarded
    pub cancelled: usize,
}

/// Deferred command execution
pub type CommandJob = Box<dyn FnOnce()>;

/// Runs command executions outside of event processing
pub trait CommandExecutor {
    fn spawn(&self, job: CommandJob);
}

/// Executor queueing jobs until the host runs them
#[derive(Default)]
pub struct DeferredExecutor {
    jobs: RefCell<VecDeque<CommandJob>>,
}

impl DeferredExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.jobs.borrow().len()
    }

    /// Run queued jobs in submission order, including the ones they queue
    ///
    /// Returns the number of jobs run.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        loop {
            let Some(job) = self.jobs.borrow_mut().pop_front() else {
                break;
            };
            job();
            count += 1;
        }
        count
    }
}

impl CommandExecutor for DeferredExecutor {
    fn spawn(&self, job: CommandJob) {
        self.jobs.borrow_mut().push_back(job);
    }
}

impl fmt::Debug for DeferredExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredExecutor")
            .field("pending", &self.pending_count())
            .finish()
    }
}

// ============================================================================
// Binding core
// ============================================================================

type Factory<D, C> = Box<dyn FnMut(&D) -> C>;
type WhenFn<D> = Box<dyn Fn(&D) -> bool>;
type CommandFn<D, C> = Box<dyn FnMut(&mut C, &D)>;
type EndFn<D, C> = Box<dyn FnMut(&C, &D)>;
type DataFn<D> = Box<dyn FnMut(&D)>;
type ObserverFn<C> = Box<dyn FnMut(CommandEvent, &C)>;

struct Callbacks<D, C> {
    when: Option<WhenFn<D>>,
    first: Option<CommandFn<D, C>>,
    then: Option<CommandFn<D, C>>,
    end: Option<EndFn<D, C>>,
    cancel: Option<DataFn<D>>,
    end_or_cancel: Option<DataFn<D>>,
    on_command: Option<ObserverFn<C>>,
}

impl<D, C> Callbacks<D, C> {
    fn observe(&mut self, event: CommandEvent, command: &C) {
        if let Some(observer) = self.on_command.as_mut() {
            observer(event, command);
        }
    }
}

impl<D, C> Default for Callbacks<D, C> {
    fn default() -> Self {
        Self {
            when: None,
            first: None,
            then: None,
            end: None,
            cancel: None,
            end_or_cancel: None,
            on_command: None,
        }
    }
}

/// The FSM handler side of a binding
struct BindingCore<D: InteractionData + 'static, C: Command> {
    name: Rc<str>,
    data: Rc<RefCell<D>>,
    factory: Factory<D, C>,
    callbacks: Callbacks<D, C>,
    command: Option<TrackedCommand<C>>,
    phase: BindingPhase,
    stats: BindingStats,
    continuous: bool,
    strict_start: bool,
    activated: bool,
    executor: Option<Rc<dyn CommandExecutor>>,
    history: Option<SharedHistory>,
    error_sink: Rc<dyn ErrorSink>,
    log_binding: bool,
    log_command: bool,
    self_ref: Weak<RefCell<BindingCore<D, C>>>,
}

fn busy_data<T>(_: T) -> HandlerError {
    HandlerError::Busy("interaction data")
}

impl<D: InteractionData + 'static, C: Command> BindingCore<D, C> {
    fn when(&self, data: &D) -> bool {
        self.callbacks.when.as_ref().map_or(true, |when| when(data))
    }

    fn create_command(&mut self, data: &D) {
        let mut command = (self.factory)(data);
        if let Some(first) = self.callbacks.first.as_mut() {
            first(&mut command, data);
        }
        let command = TrackedCommand::new(command);
        if self.log_command {
            tracing::debug!(target: "gesto::command", binding = %self.name, command = command.name(), "command created");
        }
        self.command = Some(command);
        self.phase = BindingPhase::CommandInitialized;
        self.stats.started += 1;
    }

    fn update_command(&mut self, data: &D) {
        if let (Some(then), Some(command)) = (self.callbacks.then.as_mut(), self.command.as_mut()) {
            then(command.command_mut(), data);
            if self.log_command {
                tracing::debug!(target: "gesto::command", binding = %self.name, command = command.name(), "command updated");
            }
        }
    }

    /// Dispose of a command whose run did not go through
    fn discard(&mut self, mut command: TrackedCommand<C>) {
        command.cancel();
        self.callbacks.observe(CommandEvent::Cancelled, command.command());
        self.phase = BindingPhase::Cancelled;
        self.stats.cancelled += 1;
        if self.log_command {
            tracing::debug!(target: "gesto::command", binding = %self.name, command = command.name(), "command cancelled");
        }
    }

    fn execute_now(&mut self, mut command: TrackedCommand<C>, data: &D) -> std::result::Result<(), HandlerError> {
        match command.execute() {
            Ok(ran) => self.after_executed(command, ran, data),
            Err(err) => {
                self.discard(command);
                Err(err.into())
            }
        }
    }

    fn execute_later(&mut self, executor: Rc<dyn CommandExecutor>, command: TrackedCommand<C>) {
        if self.log_command {
            tracing::debug!(target: "gesto::command", binding = %self.name, command = command.name(), "command execution deferred");
        }
        let core = self.self_ref.clone();
        executor.spawn(Box::new(move || {
            if let Some(core) = core.upgrade() {
                BindingCore::finish_deferred(&core, command);
            }
        }));
    }

    fn finish_deferred(core: &Rc<RefCell<Self>>, mut command: TrackedCommand<C>) {
        let executed = command.execute();
        let Ok(mut core) = core.try_borrow_mut() else {
            tracing::warn!(target: "gesto::binding", command = command.name(), "binding busy, deferred command dropped");
            return;
        };

        let data = Rc::clone(&core.data);
        let outcome = match executed {
            Ok(ran) => match data.try_borrow() {
                Ok(data) => core.after_executed(command, ran, &data),
                Err(err) => Err(busy_data(err)),
            },
            Err(err) => {
                core.discard(command);
                Err(err.into())
            }
        };
        if let Err(err) = outcome {
            core.error_sink.report(&core.name, &err);
        }
    }

    fn after_executed(
        &mut self,
        mut command: TrackedCommand<C>,
        ran: bool,
        data: &D,
    ) -> std::result::Result<(), HandlerError> {
        if self.log_command {
            tracing::debug!(target: "gesto::command", binding = %self.name, command = command.name(), ran, "command executed");
        }
        if !ran {
            command.flush();
            self.phase = BindingPhase::Cancelled;
            return Ok(());
        }

        self.callbacks.observe(CommandEvent::Executed, command.command());
        command.done();
        self.callbacks.observe(CommandEvent::Done, command.command());
        self.phase = BindingPhase::Done;
        self.stats.executed += 1;
        if let Some(end) = self.callbacks.end.as_mut() {
            end(command.command(), data);
        }
        if let Some(end_or_cancel) = self.callbacks.end_or_cancel.as_mut() {
            end_or_cancel(data);
        }

        if !command.had_effect() {
            return Ok(());
        }
        let Some(history) = self.history.as_ref() else {
            return Ok(());
        };
        if command.as_undoable_mut().is_none() {
            return Ok(());
        }
        self.callbacks.observe(CommandEvent::Added, command.command());
        if let Some(undoable) = command.into_undoable() {
            history
                .try_borrow_mut()
                .map_err(|_| HandlerError::Busy("undo history"))?
                .add(undoable);
        }
        Ok(())
    }
}

impl<D: InteractionData + 'static, C: Command> FsmHandler for BindingCore<D, C> {
    fn fsm_starts(&mut self) -> std::result::Result<(), HandlerError> {
        if !self.activated {
            return Ok(());
        }
        self.phase = BindingPhase::Idle;
        let data = Rc::clone(&self.data);
        let data = data.try_borrow().map_err(busy_data)?;
        let ok = self.when(&data);
        if self.log_binding {
            tracing::debug!(target: "gesto::binding", binding = %self.name, ok, "binding starts");
        }

        if ok {
            self.create_command(&data);
        } else if self.strict_start {
            return Err(HandlerError::cancel(format!(
                "binding '{}' cannot start",
                self.name
            )));
        }
        Ok(())
    }

    fn fsm_updates(&mut self) -> std::result::Result<(), HandlerError> {
        if !self.activated {
            return Ok(());
        }
        let data = Rc::clone(&self.data);
        let data = data.try_borrow().map_err(busy_data)?;
        let ok = self.when(&data);
        if self.log_binding {
            tracing::debug!(target: "gesto::binding", binding = %self.name, ok, "binding updates");
        }
        if !ok {
            return Ok(());
        }

        if self.command.is_none() {
            self.create_command(&data);
        }
        self.update_command(&data);

        if self.continuous {
            if let Some(command) = self.command.as_mut() {
                if command.execute()? {
                    self.callbacks.observe(CommandEvent::Executed, command.command());
                    self.phase = BindingPhase::CommandExecuting;
                    if self.log_command {
                        tracing::debug!(target: "gesto::command", binding = %self.name, command = command.name(), "command executed continuously");
                    }
                }
            }
        }
        Ok(())
    }

    fn fsm_stops(&mut self) -> std::result::Result<(), HandlerError> {
        if !self.activated {
            return Ok(());
        }
        let data = Rc::clone(&self.data);
        let data = data.try_borrow().map_err(busy_data)?;
        let ok = self.when(&data);
        if self.log_binding {
            tracing::debug!(target: "gesto::binding", binding = %self.name, ok, "binding stops");
        }

        if !ok {
            if let Some(command) = self.command.take() {
                self.discard(command);
            }
            return Ok(());
        }

        if self.command.is_none() {
            self.create_command(&data);
        }
        if !self.continuous {
            self.update_command(&data);
        }
        let Some(command) = self.command.take() else {
            return Ok(());
        };

        match self.executor.clone() {
            Some(executor) => {
                self.phase = BindingPhase::CommandExecuting;
                self.execute_later(executor, command);
                Ok(())
            }
            None => self.execute_now(command, &data),
        }
    }

    fn fsm_cancels(&mut self) -> std::result::Result<(), HandlerError> {
        let Some(mut command) = self.command.take() else {
            return Ok(());
        };
        if self.log_binding {
            tracing::debug!(target: "gesto::binding", binding = %self.name, "binding cancelled");
        }
        let had_effect = command.had_effect();
        let name = command.name().to_string();
        if self.continuous && had_effect {
            let undoable = command
                .as_undoable_mut()
                .ok_or_else(|| HandlerError::MustBeUndoable(name.clone()))?;
            undoable.undo()?;
            if self.log_command {
                tracing::debug!(target: "gesto::command", binding = %self.name, command = %name, "command undone");
            }
        }
        self.discard(command);

        let data = Rc::clone(&self.data);
        let data = data.try_borrow().map_err(busy_data)?;
        if let Some(cancel) = self.callbacks.cancel.as_mut() {
            cancel(&data);
        }
        if let Some(end_or_cancel) = self.callbacks.end_or_cancel.as_mut() {
            end_or_cancel(&data);
        }
        Ok(())
    }
}

// ============================================================================
// WidgetBinding
// ============================================================================

/// One interaction bound to a command factory
pub struct WidgetBinding<E: TypedEvent + 'static, D: InteractionData + 'static, C: Command> {
    name: Rc<str>,
    interaction: Interaction<E, D>,
    core: Rc<RefCell<BindingCore<D, C>>>,
    handler: Option<HandlerId>,
    error_sink: Rc<dyn ErrorSink>,
}

impl<E: TypedEvent + 'static, D: InteractionData + 'static, C: Command> WidgetBinding<E, D, C> {
    /// Start configuring a binding of `interaction` producing commands with
    /// `factory`
    pub fn builder(
        interaction: Interaction<E, D>,
        factory: impl FnMut(&D) -> C + 'static,
    ) -> BindingBuilder<E, D, C> {
        BindingBuilder {
            interaction,
            factory: Box::new(factory),
            sources: Vec::new(),
            callbacks: Callbacks::default(),
            continuous: false,
            strict_start: false,
            executor: None,
            logs: SmallVec::new(),
            history: None,
            error_sink: None,
            name: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interaction(&self) -> &Interaction<E, D> {
        &self.interaction
    }

    pub fn interaction_mut(&mut self) -> &mut Interaction<E, D> {
        &mut self.interaction
    }

    /// Feed an event to the interaction
    ///
    /// A run refused by a strict start is not an error. Other failures are
    /// reported to the error sink and returned.
    pub fn process_event(&mut self, event: E) -> Result<bool> {
        let result = self.interaction.process_event(event);
        self.report(result)
    }

    /// Deliver an expired timer to the interaction
    pub fn fire_timeout(&mut self, token: TimerToken) -> Result<bool> {
        let result = self.interaction.fire_timeout(token);
        self.report(result)
    }

    fn report(&self, result: Result<bool>) -> Result<bool> {
        match result {
            Err(FsmError::Handler(HandlerError::Cancel(reason))) => {
                if self.core.borrow().log_binding {
                    tracing::debug!(target: "gesto::binding", binding = %self.name, %reason, "run refused");
                }
                Ok(false)
            }
            Err(err) => {
                self.error_sink.report(&self.name, &err);
                Err(err)
            }
            ok => ok,
        }
    }

    pub fn phase(&self) -> BindingPhase {
        self.core.borrow().phase
    }

    pub fn stats(&self) -> BindingStats {
        self.core.borrow().stats
    }

    /// Status of the command of the current run
    pub fn command_status(&self) -> Option<CommandStatus> {
        self.core.borrow().command.as_ref().map(TrackedCommand::status)
    }

    /// Inspect the command of the current run
    pub fn with_command<R>(&self, f: impl FnOnce(&C) -> R) -> Option<R> {
        self.core.borrow().command.as_ref().map(|command| f(command.command()))
    }

    pub fn is_running(&self) -> bool {
        self.interaction.is_running()
    }

    pub fn is_activated(&self) -> bool {
        self.core.borrow().activated
    }

    /// Enable or disable the binding and its interaction
    ///
    /// Disabling drops the command of the current run without notifying the
    /// callbacks.
    pub fn set_activated(&mut self, activated: bool) {
        {
            let mut core = self.core.borrow_mut();
            core.activated = activated;
            if core.log_binding {
                tracing::debug!(target: "gesto::binding", binding = %self.name, activated, "activation");
            }
        }
        self.interaction.set_activated(activated);
        if activated {
            return;
        }

        let mut core = self.core.borrow_mut();
        if let Some(mut command) = core.command.take() {
            command.flush();
            core.phase = BindingPhase::Idle;
        }
    }

    pub fn is_continuous(&self) -> bool {
        self.core.borrow().continuous
    }

    pub fn is_strict_start(&self) -> bool {
        self.core.borrow().strict_start
    }

    pub fn is_async(&self) -> bool {
        self.core.borrow().executor.is_some()
    }

    /// Toggle one family of traces
    pub fn log(&mut self, level: LogLevel, enabled: bool) {
        match level {
            LogLevel::Binding => self.core.borrow_mut().log_binding = enabled,
            LogLevel::Command => self.core.borrow_mut().log_command = enabled,
            LogLevel::Interaction => self.interaction.log(enabled),
        }
    }

    /// Abandon the current run and drop pending events
    pub fn clear_events(&mut self) {
        self.interaction.full_reinit();
    }

    /// Detach the binding from its interaction and sources
    pub fn uninstall(&mut self) {
        self.set_activated(false);
        {
            let mut core = self.core.borrow_mut();
            core.log_binding = false;
            core.log_command = false;
        }
        if let Some(handler) = self.handler.take() {
            self.interaction.fsm_mut().remove_handler(handler);
        }
        self.interaction.uninstall();
    }
}

impl<E: TypedEvent + 'static, D: InteractionData + 'static, C: Command> fmt::Debug
    for WidgetBinding<E, D, C>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetBinding")
            .field("name", &self.name)
            .field("phase", &self.phase())
            .field("stats", &self.stats())
            .field("interaction", &self.interaction)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent configuration of a [`WidgetBinding`]
pub struct BindingBuilder<E: TypedEvent + 'static, D: InteractionData + 'static, C: Command> {
    interaction: Interaction<E, D>,
    factory: Factory<D, C>,
    sources: Vec<SharedSource>,
    callbacks: Callbacks<D, C>,
    continuous: bool,
    strict_start: bool,
    executor: Option<Rc<dyn CommandExecutor>>,
    logs: SmallVec<[LogLevel; 3]>,
    history: Option<SharedHistory>,
    error_sink: Option<Rc<dyn ErrorSink>>,
    name: Option<String>,
}

impl<E: TypedEvent + 'static, D: InteractionData + 'static, C: Command> BindingBuilder<E, D, C> {
    /// Listen to one more event source
    pub fn source(mut self, source: SharedSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Listen to several event sources
    pub fn sources(mut self, sources: impl IntoIterator<Item = SharedSource>) -> Self {
        self.sources.extend(sources);
        self
    }

    /// Initialise each freshly produced command
    pub fn first(mut self, first: impl FnMut(&mut C, &D) + 'static) -> Self {
        self.callbacks.first = Some(Box::new(first));
        self
    }

    /// Update the command while the interaction runs
    pub fn then(mut self, then: impl FnMut(&mut C, &D) + 'static) -> Self {
        self.callbacks.then = Some(Box::new(then));
        self
    }

    /// Condition for producing and executing commands
    pub fn when(mut self, when: impl Fn(&D) -> bool + 'static) -> Self {
        self.callbacks.when = Some(Box::new(when));
        self
    }

    /// Called after the command of a run executed
    pub fn end(mut self, end: impl FnMut(&C, &D) + 'static) -> Self {
        self.callbacks.end = Some(Box::new(end));
        self
    }

    /// Called when a run holding a command is cancelled
    pub fn cancel(mut self, cancel: impl FnMut(&D) + 'static) -> Self {
        self.callbacks.cancel = Some(Box::new(cancel));
        self
    }

    /// Called after `end` or `cancel`
    pub fn end_or_cancel(mut self, end_or_cancel: impl FnMut(&D) + 'static) -> Self {
        self.callbacks.end_or_cancel = Some(Box::new(end_or_cancel));
        self
    }

    /// Observe the commands of this binding as they execute, complete, enter
    /// the undo history or get discarded
    pub fn on_command(mut self, observer: impl FnMut(CommandEvent, &C) + 'static) -> Self {
        self.callbacks.on_command = Some(Box::new(observer));
        self
    }

    /// Execute the command on every update, not only when the run stops
    ///
    /// Cancelled runs undo their command, which must then be undoable.
    pub fn continuous_execution(mut self) -> Self {
        self.continuous = true;
        self
    }

    /// Cancel the run when `when` fails at start
    pub fn strict_start(mut self) -> Self {
        self.strict_start = true;
        self
    }

    /// Execute final commands through `executor`
    pub fn run_async(mut self, executor: Rc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn log(mut self, level: LogLevel) -> Self {
        if !self.logs.contains(&level) {
            self.logs.push(level);
        }
        self
    }

    /// Register executed undoable commands in `history`
    pub fn undo_history(mut self, history: SharedHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Where failed runs are reported, [`TracingErrorSink`] by default
    pub fn error_sink(mut self, sink: Rc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Name used in traces and error reports, the interaction name by default
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Create the binding and register its interaction to the sources
    pub fn bind(self) -> WidgetBinding<E, D, C> {
        let BindingBuilder {
            mut interaction,
            factory,
            sources,
            callbacks,
            continuous,
            strict_start,
            executor,
            logs,
            history,
            error_sink,
            name,
        } = self;

        let name: Rc<str> = match name {
            Some(name) => Rc::from(name),
            None => Rc::from(interaction.name()),
        };
        let error_sink = error_sink.unwrap_or_else(|| Rc::new(TracingErrorSink));
        let log_binding = logs.contains(&LogLevel::Binding);

        let core = Rc::new_cyclic(|self_ref| {
            RefCell::new(BindingCore {
                name: Rc::clone(&name),
                data: interaction.data(),
                factory,
                callbacks,
                command: None,
                phase: BindingPhase::Idle,
                stats: BindingStats::default(),
                continuous,
                strict_start,
                activated: true,
                executor,
                history,
                error_sink: Rc::clone(&error_sink),
                log_binding,
                log_command: logs.contains(&LogLevel::Command),
                self_ref: self_ref.clone(),
            })
        });

        let handler: SharedHandler = core.clone();
        let handler = interaction.fsm_mut().add_handler(handler);
        if logs.contains(&LogLevel::Interaction) {
            interaction.log(true);
        }
        interaction.register_to(sources);
        if log_binding {
            tracing::debug!(target: "gesto::binding", binding = %name, continuous, strict_start, "binding created");
        }

        WidgetBinding {
            name,
            interaction,
            core,
            handler: Some(handler),
            error_sink,
        }
    }
}
