//! Input events and event-type tags
//!
//! State machines never look inside an event to decide whether a transition is
//! a candidate: they compare its [`EventType`] tag against the set declared by
//! the transition. Guards then inspect the payload (which button, which key).
//!
//! [`UiEvent`] is the input model shared by the bundled interactions. Any other
//! event type can drive an FSM as long as it implements [`TypedEvent`].

use smallvec::SmallVec;
use std::fmt;

/// Tag identifying the kind of an event
pub type EventType = u32;

/// Well-known event type tags
pub mod event_types {
    use super::EventType;

    /// A pointer button was pressed
    pub const MOUSE_DOWN: EventType = 1;
    /// A pointer button was released
    pub const MOUSE_UP: EventType = 2;
    /// The pointer moved
    pub const MOUSE_MOVE: EventType = 3;
    /// A native click (press and release delivered as one event)
    pub const CLICK: EventType = 4;
    /// A key was pressed
    pub const KEY_DOWN: EventType = 5;
    /// A key was released
    pub const KEY_UP: EventType = 6;
    /// The value of a widget changed (text field, spinner, slider)
    pub const VALUE_CHANGED: EventType = 7;
    /// Wheel or trackpad scroll
    pub const WHEEL: EventType = 8;

    /// Human readable name of a tag, for logs
    pub fn name(event_type: EventType) -> &'static str {
        match event_type {
            MOUSE_DOWN => "mouse-down",
            MOUSE_UP => "mouse-up",
            MOUSE_MOVE => "mouse-move",
            CLICK => "click",
            KEY_DOWN => "key-down",
            KEY_UP => "key-up",
            VALUE_CHANGED => "value-changed",
            WHEEL => "wheel",
            _ => "custom",
        }
    }
}

/// Events that can be processed by an FSM
pub trait TypedEvent: fmt::Debug {
    /// The tag transitions are filtered on
    fn event_type(&self) -> EventType;
}

/// A small ordered set of event types
///
/// States rarely accept more than a handful of event types, so the set is a
/// sorted inline vector rather than a hash set.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct EventTypes(SmallVec<[EventType; 4]>);

impl EventTypes {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag, returning false if it was already present
    pub fn insert(&mut self, event_type: EventType) -> bool {
        match self.0.binary_search(&event_type) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, event_type);
                true
            }
        }
    }

    /// Check if the set contains a tag
    pub fn contains(&self, event_type: EventType) -> bool {
        self.0.binary_search(&event_type).is_ok()
    }

    /// Add every tag of `other` to this set
    pub fn extend_from(&mut self, other: &EventTypes) {
        for t in other.iter() {
            self.insert(t);
        }
    }

    /// Tags present in `self` but not in `other`
    pub fn difference<'a>(&'a self, other: &'a EventTypes) -> impl Iterator<Item = EventType> + 'a {
        self.iter().filter(move |t| !other.contains(*t))
    }

    /// Iterate over the tags in ascending order
    pub fn iter(&self) -> impl Iterator<Item = EventType> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<EventType> for EventTypes {
    fn from_iter<I: IntoIterator<Item = EventType>>(iter: I) -> Self {
        let mut set = EventTypes::new();
        for t in iter {
            set.insert(t);
        }
        set
    }
}

impl<const N: usize> From<[EventType; N]> for EventTypes {
    fn from(types: [EventType; N]) -> Self {
        types.into_iter().collect()
    }
}

impl fmt::Debug for EventTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.iter().map(event_types::name))
            .finish()
    }
}

// ============================================================================
// UI events
// ============================================================================

/// Input events delivered by widgets
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    /// Mouse button pressed
    MouseDown {
        /// Which button was pressed
        button: MouseButton,
        /// X position in widget coordinates
        x: f32,
        /// Y position in widget coordinates
        y: f32,
    },
    /// Mouse button released
    MouseUp {
        /// Which button was released
        button: MouseButton,
        /// X position in widget coordinates
        x: f32,
        /// Y position in widget coordinates
        y: f32,
    },
    /// Mouse moved to position
    MouseMove {
        /// X position in widget coordinates
        x: f32,
        /// Y position in widget coordinates
        y: f32,
    },
    /// Native click
    Click {
        /// Which button clicked
        button: MouseButton,
        /// X position in widget coordinates
        x: f32,
        /// Y position in widget coordinates
        y: f32,
    },
    /// Key pressed
    KeyDown {
        /// The key
        key: Key,
        /// Modifier keys held during this event
        modifiers: Modifiers,
    },
    /// Key released
    KeyUp {
        /// The key
        key: Key,
        /// Modifier keys held during this event
        modifiers: Modifiers,
    },
    /// Widget value changed
    ValueChanged {
        /// The new value, as text
        value: String,
    },
    /// Wheel/scroll event
    Wheel {
        /// Horizontal scroll delta
        delta_x: f32,
        /// Vertical scroll delta
        delta_y: f32,
        /// Modifier keys held during this event
        modifiers: Modifiers,
    },
}

impl TypedEvent for UiEvent {
    fn event_type(&self) -> EventType {
        match self {
            UiEvent::MouseDown { .. } => event_types::MOUSE_DOWN,
            UiEvent::MouseUp { .. } => event_types::MOUSE_UP,
            UiEvent::MouseMove { .. } => event_types::MOUSE_MOVE,
            UiEvent::Click { .. } => event_types::CLICK,
            UiEvent::KeyDown { .. } => event_types::KEY_DOWN,
            UiEvent::KeyUp { .. } => event_types::KEY_UP,
            UiEvent::ValueChanged { .. } => event_types::VALUE_CHANGED,
            UiEvent::Wheel { .. } => event_types::WHEEL,
        }
    }
}

impl UiEvent {
    /// Get the pointer position (None for keyboard and value events)
    pub fn position(&self) -> Option<(f32, f32)> {
        match self {
            UiEvent::MouseDown { x, y, .. }
            | UiEvent::MouseUp { x, y, .. }
            | UiEvent::MouseMove { x, y }
            | UiEvent::Click { x, y, .. } => Some((*x, *y)),
            _ => None,
        }
    }

    /// Get the button of a button event
    pub fn button(&self) -> Option<MouseButton> {
        match self {
            UiEvent::MouseDown { button, .. }
            | UiEvent::MouseUp { button, .. }
            | UiEvent::Click { button, .. } => Some(*button),
            _ => None,
        }
    }

    /// Get the key of a keyboard event
    pub fn key(&self) -> Option<&Key> {
        match self {
            UiEvent::KeyDown { key, .. } | UiEvent::KeyUp { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Mouse buttons
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left mouse button
    Left,
    /// Right mouse button
    Right,
    /// Middle mouse button (scroll wheel click)
    Middle,
    /// Other button with index
    Other(u16),
}

/// Modifier key state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    /// Shift key is held
    pub shift: bool,
    /// Control key is held
    pub ctrl: bool,
    /// Alt key is held (Option on macOS)
    pub alt: bool,
    /// Meta key is held (Command on macOS, Windows key on Windows)
    pub meta: bool,
}

impl Modifiers {
    /// Only ctrl held
    pub const CTRL: Modifiers = Modifiers {
        shift: false,
        ctrl: true,
        alt: false,
        meta: false,
    };

    /// Check if no modifiers are held
    pub fn is_empty(&self) -> bool {
        !self.shift && !self.ctrl && !self.alt && !self.meta
    }

    /// Check if only ctrl is held
    pub fn ctrl_only(&self) -> bool {
        !self.shift && self.ctrl && !self.alt && !self.meta
    }
}

/// Key codes
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    // Special keys
    Space,
    Enter,
    Escape,
    Backspace,
    Tab,
    Delete,

    // Arrow keys
    Left,
    Right,
    Up,
    Down,

    // Modifier keys (for tracking state)
    Shift,
    Ctrl,
    Alt,
    Meta,

    // Character input (for text input)
    Char(char),

    // Unknown key
    Unknown,
}

impl Key {
    /// Whether the key is a modifier
    pub fn is_modifier(&self) -> bool {
        matches!(self, Key::Shift | Key::Ctrl | Key::Alt | Key::Meta)
    }
}
