//! Pointer data shared by the pointer interactions

use gesto_core::events::{Modifiers, MouseButton, UiEvent};
use gesto_core::interaction::InteractionData;

/// Where and with which button a pointer interaction happened
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointData {
    /// Button of the last button event
    pub button: Option<MouseButton>,
    /// X position of the last pointer event
    pub x: f32,
    /// Y position of the last pointer event
    pub y: f32,
    /// Modifiers held during the last keyboard or wheel event
    pub modifiers: Modifiers,
}

impl PointData {
    /// Record the pointer fields carried by `event`
    pub fn record(&mut self, event: &UiEvent) {
        if let Some(button) = event.button() {
            self.button = Some(button);
        }
        if let Some((x, y)) = event.position() {
            self.x = x;
            self.y = y;
        }
        match event {
            UiEvent::KeyDown { modifiers, .. }
            | UiEvent::KeyUp { modifiers, .. }
            | UiEvent::Wheel { modifiers, .. } => self.modifiers = *modifiers,
            _ => {}
        }
    }

    /// Whether `event` uses the recorded button (any button when none is
    /// recorded yet)
    pub fn same_button(&self, event: &UiEvent) -> bool {
        match self.button {
            Some(button) => event.button() == Some(button),
            None => true,
        }
    }
}

impl InteractionData for PointData {
    fn reset(&mut self) {
        *self = PointData::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_last_position_and_button() {
        let mut data = PointData::default();
        data.record(&UiEvent::MouseDown {
            button: MouseButton::Right,
            x: 1.0,
            y: 2.0,
        });
        data.record(&UiEvent::MouseMove { x: 5.0, y: 6.0 });

        assert_eq!(data.button, Some(MouseButton::Right));
        assert_eq!((data.x, data.y), (5.0, 6.0));
        assert!(data.same_button(&UiEvent::MouseUp {
            button: MouseButton::Right,
            x: 0.0,
            y: 0.0
        }));
        assert!(!data.same_button(&UiEvent::MouseMove { x: 0.0, y: 0.0 }));

        data.reset();
        assert_eq!(data, PointData::default());
    }
}
