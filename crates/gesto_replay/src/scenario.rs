//! Scenario file handling
//!
//! A scenario is a TOML file describing one binding and the input trace
//! replayed through it:
//!
//! ```toml
//! [scenario]
//! name = "move a shape"
//! interaction = "drag"
//!
//! [binding]
//! undo_size = 10
//!
//! [[steps]]
//! do = "mouse-down"
//! x = 10.0
//!
//! [[steps]]
//! do = "mouse-move"
//! x = 30.0
//!
//! [[steps]]
//! do = "mouse-up"
//! x = 30.0
//!
//! [expect]
//! executed = 1
//! journal = ["drag (10, 0) -> (30, 0)"]
//! ```

use anyhow::{Context, Result};
use gesto_core::binding::LogLevel;
use gesto_core::events::{Key, Modifiers, MouseButton, UiEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

// =============================================================================
// Scenario
// =============================================================================

/// A scripted replay
#[derive(Debug, Deserialize, Serialize)]
pub struct Scenario {
    pub scenario: ScenarioMetadata,
    #[serde(default)]
    pub binding: BindingConfig,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub expect: Expectations,
}

/// Scenario metadata
#[derive(Debug, Deserialize, Serialize)]
pub struct ScenarioMetadata {
    pub name: String,
    pub interaction: InteractionKind,
    #[serde(default)]
    pub description: Option<String>,
}

/// Interactions a scenario can replay
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    Press,
    Click,
    DoubleClick,
    Drag,
    TextChanged,
    ModifiedWheel,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 6] = [
        InteractionKind::Press,
        InteractionKind::Click,
        InteractionKind::DoubleClick,
        InteractionKind::Drag,
        InteractionKind::TextChanged,
        InteractionKind::ModifiedWheel,
    ];

    /// Name used in scenario files
    pub fn name(self) -> &'static str {
        match self {
            InteractionKind::Press => "press",
            InteractionKind::Click => "click",
            InteractionKind::DoubleClick => "double-click",
            InteractionKind::Drag => "drag",
            InteractionKind::TextChanged => "text-changed",
            InteractionKind::ModifiedWheel => "modified-wheel",
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            InteractionKind::Press => "one button press",
            InteractionKind::Click => "press and release of the same button",
            InteractionKind::DoubleClick => "two clicks within the timeout (timeout_ms)",
            InteractionKind::Drag => "press, move and release; Escape aborts (cancellable)",
            InteractionKind::TextChanged => "edits ended by a pause (timeout_ms)",
            InteractionKind::ModifiedWheel => "wheel steps while Ctrl is held",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the binding is configured
#[derive(Debug, Deserialize, Serialize)]
pub struct BindingConfig {
    /// Execute the command on every update
    #[serde(default)]
    pub continuous: bool,
    /// Refuse runs whose first data does not satisfy the condition
    #[serde(default)]
    pub strict_start: bool,
    /// Queue command executions until a `run-pending` step
    #[serde(default)]
    pub deferred: bool,
    /// Only accept runs whose data is not empty (moved, typed, scrolled)
    #[serde(default)]
    pub require_change: bool,
    /// Throttling window in milliseconds, 0 disables throttling
    #[serde(default)]
    pub throttle_ms: u64,
    /// Double-click timeout or text-changed time gap
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Whether Escape aborts a drag
    #[serde(default = "default_cancellable")]
    pub cancellable: bool,
    /// Undo history bound, 0 disables the history
    #[serde(default)]
    pub undo_size: usize,
    /// What the binding traces
    #[serde(default)]
    pub log: Vec<LogTarget>,
}

fn default_cancellable() -> bool {
    true
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            strict_start: false,
            deferred: false,
            require_change: false,
            throttle_ms: 0,
            timeout_ms: None,
            cancellable: default_cancellable(),
            undo_size: 0,
            log: Vec::new(),
        }
    }
}

/// Tracing toggles of a binding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    Binding,
    Command,
    Interaction,
}

impl From<LogTarget> for LogLevel {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::Binding => LogLevel::Binding,
            LogTarget::Command => LogLevel::Command,
            LogTarget::Interaction => LogLevel::Interaction,
        }
    }
}

// =============================================================================
// Steps
// =============================================================================

/// Mouse buttons as written in scenario files
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    #[default]
    Left,
    Right,
    Middle,
}

impl From<Button> for MouseButton {
    fn from(button: Button) -> Self {
        match button {
            Button::Left => MouseButton::Left,
            Button::Right => MouseButton::Right,
            Button::Middle => MouseButton::Middle,
        }
    }
}

/// One entry of the replayed trace
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "do", rename_all = "kebab-case")]
pub enum Step {
    MouseDown {
        #[serde(default)]
        button: Button,
        #[serde(default)]
        x: f32,
        #[serde(default)]
        y: f32,
    },
    MouseUp {
        #[serde(default)]
        button: Button,
        #[serde(default)]
        x: f32,
        #[serde(default)]
        y: f32,
    },
    MouseMove {
        #[serde(default)]
        x: f32,
        #[serde(default)]
        y: f32,
    },
    Click {
        #[serde(default)]
        button: Button,
        #[serde(default)]
        x: f32,
        #[serde(default)]
        y: f32,
    },
    KeyDown {
        key: String,
        #[serde(default)]
        ctrl: bool,
    },
    KeyUp {
        key: String,
        #[serde(default)]
        ctrl: bool,
    },
    /// New value of a text widget
    Type { value: String },
    Wheel {
        #[serde(default)]
        dx: f32,
        #[serde(default)]
        dy: f32,
        #[serde(default)]
        ctrl: bool,
    },
    /// Advance the virtual clock
    Wait { ms: u64 },
    Undo,
    Redo,
    /// Run the command executions queued by a deferred binding
    RunPending,
}

impl Step {
    /// The input event carried by the step, `None` for control steps
    pub fn to_event(&self) -> Result<Option<UiEvent>> {
        let event = match self {
            Step::MouseDown { button, x, y } => UiEvent::MouseDown {
                button: (*button).into(),
                x: *x,
                y: *y,
            },
            Step::MouseUp { button, x, y } => UiEvent::MouseUp {
                button: (*button).into(),
                x: *x,
                y: *y,
            },
            Step::MouseMove { x, y } => UiEvent::MouseMove { x: *x, y: *y },
            Step::Click { button, x, y } => UiEvent::Click {
                button: (*button).into(),
                x: *x,
                y: *y,
            },
            Step::KeyDown { key, ctrl } => UiEvent::KeyDown {
                key: parse_key(key)?,
                modifiers: modifiers(*ctrl),
            },
            Step::KeyUp { key, ctrl } => UiEvent::KeyUp {
                key: parse_key(key)?,
                modifiers: modifiers(*ctrl),
            },
            Step::Type { value } => UiEvent::ValueChanged {
                value: value.clone(),
            },
            Step::Wheel { dx, dy, ctrl } => UiEvent::Wheel {
                delta_x: *dx,
                delta_y: *dy,
                modifiers: modifiers(*ctrl),
            },
            Step::Wait { .. } | Step::Undo | Step::Redo | Step::RunPending => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn modifiers(ctrl: bool) -> Modifiers {
    if ctrl {
        Modifiers::CTRL
    } else {
        Modifiers::default()
    }
}

/// Parse a key name (`escape`, `ctrl`, `a`, ...)
pub fn parse_key(name: &str) -> Result<Key> {
    let key = match name.to_ascii_lowercase().as_str() {
        "space" => Key::Space,
        "enter" | "return" => Key::Enter,
        "escape" | "esc" => Key::Escape,
        "backspace" => Key::Backspace,
        "tab" => Key::Tab,
        "delete" => Key::Delete,
        "left" => Key::Left,
        "right" => Key::Right,
        "up" => Key::Up,
        "down" => Key::Down,
        "shift" => Key::Shift,
        "ctrl" | "control" => Key::Ctrl,
        "alt" | "option" => Key::Alt,
        "meta" | "cmd" | "super" => Key::Meta,
        _ => {
            let mut chars = name.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Char(c),
                _ => anyhow::bail!("Unknown key '{}'", name),
            }
        }
    };
    Ok(key)
}

// =============================================================================
// Expectations
// =============================================================================

/// Checks applied after a replay; unset fields are not checked
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Expectations {
    #[serde(default)]
    pub started: Option<usize>,
    #[serde(default)]
    pub executed: Option<usize>,
    #[serde(default)]
    pub cancelled: Option<usize>,
    /// Name of the current state once the trace is replayed
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub running: Option<bool>,
    /// Lines written by the executed, undone and redone commands
    #[serde(default)]
    pub journal: Option<Vec<String>>,
    #[serde(default)]
    pub undo_len: Option<usize>,
    /// Number of errors reported by the binding
    #[serde(default)]
    pub errors: Option<usize>,
}

impl Expectations {
    pub fn is_empty(&self) -> bool {
        self.started.is_none()
            && self.executed.is_none()
            && self.cancelled.is_none()
            && self.state.is_none()
            && self.running.is_none()
            && self.journal.is_none()
            && self.undo_len.is_none()
            && self.errors.is_none()
    }
}

// =============================================================================
// Loading
// =============================================================================

impl Scenario {
    /// Load and validate a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let scenario = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(scenario)
    }

    /// Parse and validate a scenario
    pub fn from_toml(content: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check the steps against the binding configuration
    pub fn validate(&self) -> Result<()> {
        if self.scenario.name.trim().is_empty() {
            anyhow::bail!("Scenario name is empty");
        }
        if self.binding.timeout_ms == Some(0) {
            anyhow::bail!("timeout_ms must be greater than 0");
        }
        for (index, step) in self.steps.iter().enumerate() {
            let number = index + 1;
            step.to_event()
                .with_context(|| format!("Invalid step {}", number))?;
            match step {
                Step::Undo | Step::Redo if self.binding.undo_size == 0 => anyhow::bail!(
                    "Step {} uses the undo history but binding.undo_size is 0",
                    number
                ),
                Step::RunPending if !self.binding.deferred => anyhow::bail!(
                    "Step {} runs pending commands but binding.deferred is false",
                    number
                ),
                _ => {}
            }
        }
        Ok(())
    }

    /// Number of steps carrying an input event
    pub fn event_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step.to_event(), Ok(Some(_))))
            .count()
    }
}
