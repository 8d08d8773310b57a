//! Gesto Widgets
//!
//! Ready-made interactions built on the `gesto_core` state machines. Each
//! module configures one FSM and the data its transitions record:
//!
//! - **press**: one button press
//! - **click**: press and release of the same button, or a native click
//! - **double_click**: two clicks close in time, built from two click sub-FSMs
//! - **drag**: drag-and-drop starting on the first move, Escape aborts
//! - **text_changed**: a burst of edits ended by a pause
//! - **modified_wheel**: wheel steps while Ctrl is held
//!
//! # Example
//!
//! ```rust
//! use gesto_core::binding::WidgetBinding;
//! use gesto_core::command::AnonCommand;
//! use gesto_core::events::{MouseButton, UiEvent};
//! use gesto_core::timer::TimerQueue;
//! use gesto_widgets::click::click;
//! use std::rc::Rc;
//!
//! let timers = Rc::new(TimerQueue::new());
//! let mut binding = WidgetBinding::builder(click(timers).unwrap(), |data| {
//!     let (x, y) = (data.x, data.y);
//!     AnonCommand::new("select", move || println!("select at {x},{y}"))
//! })
//! .bind();
//!
//! binding.process_event(UiEvent::MouseDown { button: MouseButton::Left, x: 4.0, y: 2.0 }).unwrap();
//! binding.process_event(UiEvent::MouseUp { button: MouseButton::Left, x: 4.0, y: 2.0 }).unwrap();
//! assert_eq!(binding.stats().executed, 1);
//! ```

pub mod click;
pub mod double_click;
pub mod drag;
pub mod modified_wheel;
pub mod point;
pub mod press;
pub mod text_changed;

pub use click::click;
pub use double_click::{double_click, double_click_with_timeout};
pub use drag::{drag, drag_with, DragData};
pub use modified_wheel::{modified_wheel, WheelData};
pub use point::PointData;
pub use press::press;
pub use text_changed::{text_changed, text_changed_with_gap, TextData};
