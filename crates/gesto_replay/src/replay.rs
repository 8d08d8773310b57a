//! Scenario replay
//!
//! Plays the role of the native event loop: events of the trace are fed to
//! one binding, waits advance a virtual clock whose expired timers are
//! delivered back to the binding.

use crate::scenario::{BindingConfig, Expectations, InteractionKind, Scenario, Step};
use anyhow::{Context, Result};
use gesto_core::binding::{BindingStats, DeferredExecutor, WidgetBinding};
use gesto_core::command::Command;
use gesto_core::error::{CollectingErrorSink, CommandError};
use gesto_core::events::UiEvent;
use gesto_core::interaction::{Interaction, InteractionData};
use gesto_core::timer::{TimerQueue, TimerToken};
use gesto_core::undo::{SharedHistory, UndoHistory, Undoable};
use gesto_widgets::{DragData, PointData, TextData, WheelData};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, warn};

/// Lines written by the replayed commands
pub type Journal = Rc<RefCell<Vec<String>>>;

// =============================================================================
// Journal command
// =============================================================================

/// Command writing its label to the journal
pub struct Record {
    journal: Journal,
    label: String,
}

impl Command for Record {
    fn name(&self) -> &str {
        &self.label
    }

    fn execute(&mut self) -> Result<(), CommandError> {
        self.journal.borrow_mut().push(self.label.clone());
        Ok(())
    }

    fn as_undoable_mut(&mut self) -> Option<&mut dyn Undoable> {
        Some(self)
    }

    fn into_undoable(self: Box<Self>) -> Option<Box<dyn Undoable>> {
        Some(self)
    }
}

impl Undoable for Record {
    fn undo(&mut self) -> Result<(), CommandError> {
        self.journal.borrow_mut().push(format!("undo {}", self.label));
        Ok(())
    }

    fn redo(&mut self) -> Result<(), CommandError> {
        self.journal.borrow_mut().push(format!("redo {}", self.label));
        Ok(())
    }

    fn undo_name(&self) -> String {
        self.label.clone()
    }
}

// =============================================================================
// Bound interactions
// =============================================================================

/// A binding with its data type erased
trait Replay {
    fn process(&mut self, event: UiEvent) -> gesto_core::Result<bool>;
    fn fire(&mut self, token: TimerToken) -> gesto_core::Result<bool>;
    fn stats(&self) -> BindingStats;
    fn state(&self) -> String;
    fn is_running(&self) -> bool;
    fn uninstall(&mut self);
}

impl<D: InteractionData + 'static> Replay for WidgetBinding<UiEvent, D, Record> {
    fn process(&mut self, event: UiEvent) -> gesto_core::Result<bool> {
        self.process_event(event)
    }

    fn fire(&mut self, token: TimerToken) -> gesto_core::Result<bool> {
        self.fire_timeout(token)
    }

    fn stats(&self) -> BindingStats {
        WidgetBinding::stats(self)
    }

    fn state(&self) -> String {
        self.interaction().fsm().current_state().name().to_string()
    }

    fn is_running(&self) -> bool {
        WidgetBinding::is_running(self)
    }

    fn uninstall(&mut self) {
        WidgetBinding::uninstall(self)
    }
}

/// Per-interaction labelling of the recorded commands
struct Labels<D> {
    describe: fn(&D) -> String,
    changed: fn(&D) -> bool,
}

fn point_labels(kind: InteractionKind) -> impl Fn(&PointData) -> String {
    move |data| format!("{} at ({}, {})", kind, data.x, data.y)
}

/// Shared pieces every binding of a replay is built with
struct Host {
    timers: Rc<TimerQueue>,
    journal: Journal,
    sink: Rc<CollectingErrorSink>,
    history: Option<SharedHistory>,
    executor: Option<Rc<DeferredExecutor>>,
}

impl Host {
    fn new(config: &BindingConfig) -> Self {
        let history = (config.undo_size > 0).then(|| {
            let mut history = UndoHistory::new();
            history.set_size_max(config.undo_size);
            Rc::new(RefCell::new(history))
        });
        Self {
            timers: Rc::new(TimerQueue::new()),
            journal: Rc::new(RefCell::new(Vec::new())),
            sink: Rc::new(CollectingErrorSink::new()),
            history,
            executor: config.deferred.then(|| Rc::new(DeferredExecutor::new())),
        }
    }

    fn bind<D: InteractionData + 'static>(
        &self,
        name: &str,
        mut interaction: Interaction<UiEvent, D>,
        describe: impl Fn(&D) -> String + 'static,
        changed: Option<fn(&D) -> bool>,
        config: &BindingConfig,
    ) -> Box<dyn Replay> {
        interaction.set_throttle_timeout(Duration::from_millis(config.throttle_ms));

        let describe = Rc::new(describe);
        let journal = self.journal.clone();
        let label = describe.clone();
        let mut builder = WidgetBinding::builder(interaction, move |data: &D| Record {
            journal: journal.clone(),
            label: (*label)(data),
        })
        .then(move |cmd, data| cmd.label = (*describe)(data))
        .error_sink(self.sink.clone())
        .name(name);

        if config.continuous {
            builder = builder.continuous_execution();
        }
        if config.strict_start {
            builder = builder.strict_start();
        }
        if config.require_change {
            if let Some(changed) = changed {
                builder = builder.when(changed);
            }
        }
        if let Some(executor) = &self.executor {
            builder = builder.run_async(executor.clone());
        }
        if let Some(history) = &self.history {
            builder = builder.undo_history(history.clone());
        }
        for target in &config.log {
            builder = builder.log((*target).into());
        }
        Box::new(builder.bind())
    }

    fn bind_labelled<D: InteractionData + 'static>(
        &self,
        name: &str,
        interaction: Interaction<UiEvent, D>,
        labels: Labels<D>,
        config: &BindingConfig,
    ) -> Box<dyn Replay> {
        self.bind(name, interaction, labels.describe, Some(labels.changed), config)
    }
}

fn build(scenario: &Scenario, host: &Host) -> Result<Box<dyn Replay>> {
    let config = &scenario.binding;
    let name = scenario.scenario.name.as_str();
    let timeout = config.timeout_ms.map(Duration::from_millis);
    let scheduler = host.timers.clone();
    let kind = scenario.scenario.interaction;

    let replay = match kind {
        InteractionKind::Press => {
            let interaction = gesto_widgets::press(scheduler)?;
            host.bind(name, interaction, point_labels(kind), None, config)
        }
        InteractionKind::Click => {
            let interaction = gesto_widgets::click(scheduler)?;
            host.bind(name, interaction, point_labels(kind), None, config)
        }
        InteractionKind::DoubleClick => {
            let interaction = match timeout {
                Some(timeout) => gesto_widgets::double_click_with_timeout(scheduler, timeout)?,
                None => gesto_widgets::double_click(scheduler)?,
            };
            host.bind(name, interaction, point_labels(kind), None, config)
        }
        InteractionKind::Drag => host.bind_labelled(
            name,
            gesto_widgets::drag_with(scheduler, config.cancellable)?,
            Labels {
                describe: |data: &DragData| {
                    format!(
                        "drag ({}, {}) -> ({}, {})",
                        data.src.0, data.src.1, data.tgt.0, data.tgt.1
                    )
                },
                changed: |data: &DragData| data.delta() != (0.0, 0.0),
            },
            config,
        ),
        InteractionKind::TextChanged => {
            let interaction = match timeout {
                Some(gap) => gesto_widgets::text_changed_with_gap(scheduler, gap)?,
                None => gesto_widgets::text_changed(scheduler)?,
            };
            host.bind_labelled(
                name,
                interaction,
                Labels {
                    describe: |data: &TextData| format!("text '{}'", data.text),
                    changed: |data: &TextData| !data.text.is_empty(),
                },
                config,
            )
        }
        InteractionKind::ModifiedWheel => host.bind_labelled(
            name,
            gesto_widgets::modified_wheel(scheduler)?,
            Labels {
                describe: |data: &WheelData| format!("zoom {}", data.delta_y),
                changed: |data: &WheelData| data.delta_y != 0.0 || data.delta_x != 0.0,
            },
            config,
        ),
    };
    Ok(replay)
}

// =============================================================================
// Running
// =============================================================================

/// State observed once a trace is replayed
#[derive(Debug, Default)]
pub struct Outcome {
    pub stats: BindingStats,
    /// Current state of the interaction
    pub state: String,
    pub running: bool,
    pub journal: Vec<String>,
    pub undo_len: usize,
    /// Errors reported by the binding
    pub errors: Vec<String>,
    /// Events that fired a transition
    pub accepted: usize,
    /// Events fed to the binding
    pub events: usize,
    /// Virtual time elapsed
    pub elapsed: Duration,
}

/// Replay a scenario
pub fn run(scenario: &Scenario) -> Result<Outcome> {
    let host = Host::new(&scenario.binding);
    let mut replay = build(scenario, &host).context("Failed to build the interaction")?;
    let mut outcome = Outcome::default();

    for (index, step) in scenario.steps.iter().enumerate() {
        let number = index + 1;
        if let Some(event) = step.to_event()? {
            outcome.events += 1;
            debug!(step = number, ?event, "replaying event");
            match replay.process(event) {
                Ok(true) => outcome.accepted += 1,
                Ok(false) => {}
                Err(err) => warn!(step = number, error = %err, "run failed"),
            }
            continue;
        }

        match step {
            Step::Wait { ms } => {
                let expired = host.timers.advance(Duration::from_millis(*ms));
                debug!(step = number, ms, timers = expired.len(), "clock advanced");
                for token in expired {
                    if let Err(err) = replay.fire(token) {
                        warn!(step = number, error = %err, "timeout failed");
                    }
                }
            }
            Step::Undo | Step::Redo => {
                let Some(history) = &host.history else {
                    anyhow::bail!("Step {} needs an undo history", number);
                };
                let done = if matches!(step, Step::Undo) {
                    history.borrow_mut().undo()
                } else {
                    history.borrow_mut().redo()
                }
                .with_context(|| format!("Step {} failed", number))?;
                if !done {
                    warn!(step = number, ?step, "history had nothing to replay");
                }
            }
            Step::RunPending => {
                let Some(executor) = &host.executor else {
                    anyhow::bail!("Step {} needs a deferred binding", number);
                };
                let jobs = executor.run_pending();
                debug!(step = number, jobs, "pending commands run");
            }
            _ => {}
        }
    }

    outcome.stats = replay.stats();
    outcome.state = replay.state();
    outcome.running = replay.is_running();
    outcome.journal = host.journal.borrow().clone();
    outcome.undo_len = host
        .history
        .as_ref()
        .map_or(0, |history| history.borrow().undo_len());
    outcome.errors = host.sink.errors();
    outcome.elapsed = host.timers.now();
    replay.uninstall();
    Ok(outcome)
}

// =============================================================================
// Expectations
// =============================================================================

fn check<T: PartialEq + std::fmt::Debug>(
    failures: &mut Vec<String>,
    what: &str,
    expected: &Option<T>,
    actual: &T,
) {
    if let Some(expected) = expected {
        if expected != actual {
            failures.push(format!("{}: expected {:?}, got {:?}", what, expected, actual));
        }
    }
}

impl Expectations {
    /// Describe every expectation the outcome does not meet
    pub fn verify(&self, outcome: &Outcome) -> Vec<String> {
        let mut failures = Vec::new();
        check(&mut failures, "started", &self.started, &outcome.stats.started);
        check(&mut failures, "executed", &self.executed, &outcome.stats.executed);
        check(&mut failures, "cancelled", &self.cancelled, &outcome.stats.cancelled);
        check(&mut failures, "state", &self.state, &outcome.state);
        check(&mut failures, "running", &self.running, &outcome.running);
        check(&mut failures, "journal", &self.journal, &outcome.journal);
        check(&mut failures, "undo_len", &self.undo_len, &outcome.undo_len);
        check(&mut failures, "errors", &self.errors, &outcome.errors.len());
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(content: &str) -> Outcome {
        let scenario = Scenario::from_toml(content).unwrap();
        let outcome = run(&scenario).unwrap();
        let failures = scenario.expect.verify(&outcome);
        assert!(failures.is_empty(), "{failures:?}");
        outcome
    }

    #[test]
    fn test_drag_with_undo() {
        let outcome = replay(
            r#"
            [scenario]
            name = "move"
            interaction = "drag"

            [binding]
            undo_size = 5

            [[steps]]
            do = "mouse-down"
            x = 10.0
            [[steps]]
            do = "mouse-move"
            x = 20.0
            [[steps]]
            do = "mouse-up"
            x = 30.0
            [[steps]]
            do = "undo"
            [[steps]]
            do = "redo"

            [expect]
            executed = 1
            state = "init"
            running = false
            undo_len = 1
            journal = ["drag (10, 0) -> (30, 0)", "undo drag (10, 0) -> (30, 0)", "redo drag (10, 0) -> (30, 0)"]
            "#,
        );
        assert_eq!(outcome.events, 3);
        assert_eq!(outcome.accepted, 3);
    }

    #[test]
    fn test_double_click_timeout() {
        let outcome = replay(
            r#"
            [scenario]
            name = "open"
            interaction = "double-click"

            [binding]
            timeout_ms = 200

            [[steps]]
            do = "mouse-down"
            [[steps]]
            do = "mouse-up"
            [[steps]]
            do = "wait"
            ms = 250
            [[steps]]
            do = "mouse-down"
            x = 4.0
            [[steps]]
            do = "mouse-up"
            x = 4.0
            [[steps]]
            do = "mouse-down"
            x = 4.0
            [[steps]]
            do = "mouse-up"
            x = 4.0

            [expect]
            executed = 1
            journal = ["double-click at (4, 0)"]
            "#,
        );
        assert_eq!(outcome.elapsed, Duration::from_millis(250));
    }

    #[test]
    fn test_deferred_text_changed() {
        replay(
            r#"
            [scenario]
            name = "rename"
            interaction = "text-changed"

            [binding]
            deferred = true
            timeout_ms = 100

            [[steps]]
            do = "type"
            value = "a"
            [[steps]]
            do = "type"
            value = "ab"
            [[steps]]
            do = "wait"
            ms = 100
            [[steps]]
            do = "run-pending"

            [expect]
            journal = ["text 'ab'"]
            errors = 0
            "#,
        );
    }

    #[test]
    fn test_strict_start_refuses_empty_drag() {
        replay(
            r#"
            [scenario]
            name = "strict"
            interaction = "drag"

            [binding]
            strict_start = true
            require_change = true

            [[steps]]
            do = "mouse-down"
            x = 5.0
            [[steps]]
            do = "mouse-move"
            x = 5.0
            [[steps]]
            do = "mouse-up"
            x = 5.0

            [expect]
            started = 0
            executed = 0
            state = "init"
            errors = 0
            journal = []
            "#,
        );
    }

    #[test]
    fn test_unmet_expectation_reported() {
        let scenario = Scenario::from_toml(
            r#"
            [scenario]
            name = "press"
            interaction = "press"

            [[steps]]
            do = "mouse-down"

            [expect]
            executed = 2
            "#,
        )
        .unwrap();
        let outcome = run(&scenario).unwrap();
        let failures = scenario.expect.verify(&outcome);
        assert_eq!(failures, vec!["executed: expected 2, got 1".to_string()]);
    }

    #[test]
    fn test_bundled_scenarios_pass() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
        let mut count = 0;
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }
            let scenario = Scenario::load(&path).unwrap();
            let outcome = run(&scenario).unwrap();
            let failures = scenario.expect.verify(&outcome);
            assert!(failures.is_empty(), "{}: {failures:?}", path.display());
            count += 1;
        }
        assert!(count >= 5);
    }
}
