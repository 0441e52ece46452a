//! Input abstraction layer.
//!
//! Normalizes mouse, touch, and pen events into a unified `InputEvent`
//! enum consumed by the play session. Coordinates are already in the
//! displayed room's local space.

use nw_core::geometry::Point;

/// Which pointer button a press or release came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerButton {
    /// Left mouse button, touch contact, pen tip.
    #[default]
    Primary,
    /// Right mouse button, pen barrel button.
    Secondary,
    Middle,
}

impl PointerButton {
    /// Map a DOM `PointerEvent.button` index.
    pub fn from_index(index: i16) -> Self {
        match index {
            1 => Self::Middle,
            2 => Self::Secondary,
            _ => Self::Primary,
        }
    }
}

/// A normalized input event from any pointing device or the keyboard.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Pointer pressed (mouse down, touch start, pen contact).
    PointerDown { x: f32, y: f32, button: PointerButton },

    /// Pointer moved (mouse move, touch move, pen move).
    PointerMove { x: f32, y: f32 },

    /// Pointer released.
    PointerUp { x: f32, y: f32, button: PointerButton },

    /// Key pressed. `key` follows DOM `KeyboardEvent.key` naming.
    Key { key: String },
}

impl InputEvent {
    pub fn from_pointer_down(x: f32, y: f32, button: PointerButton) -> Self {
        Self::PointerDown { x, y, button }
    }

    pub fn from_pointer_move(x: f32, y: f32) -> Self {
        Self::PointerMove { x, y }
    }

    pub fn from_pointer_up(x: f32, y: f32, button: PointerButton) -> Self {
        Self::PointerUp { x, y, button }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self::Key { key: key.into() }
    }

    /// Extract position if this is a pointer event.
    pub fn position(&self) -> Option<Point> {
        match self {
            Self::PointerDown { x, y, .. } | Self::PointerMove { x, y } | Self::PointerUp { x, y, .. } => {
                Some(Point::new(*x, *y))
            }
            Self::Key { .. } => None,
        }
    }
}
