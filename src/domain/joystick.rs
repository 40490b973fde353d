//! Virtual joystick input state.
//!
//! The touch layer writes raw deflection into a [`Joystick`]; commanders read
//! it back once per tick. Clones share the same underlying state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, Default)]
struct StickState {
    x: f32,
    y: f32,
    activated: bool,
    // Thumb went down or up since the last take_touch_change()
    touch_changed: bool,
}

/// Thread-safe handle to one on-screen joystick
#[derive(Debug, Clone, Default)]
pub struct Joystick {
    state: Arc<Mutex<StickState>>,
    deadband_x: f32,
    deadband_y: f32,
}

impl Joystick {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joystick that ignores small deflections around the center
    pub fn with_deadband(deadband_x: f32, deadband_y: f32) -> Self {
        Self {
            state: Arc::default(),
            deadband_x: deadband_x.clamp(0.0, 0.99),
            deadband_y: deadband_y.clamp(0.0, 0.99),
        }
    }

    /// Update the deflection; marks the stick as held
    pub fn set_position(&self, x: f32, y: f32) {
        let mut state = self.lock();
        state.x = sanitize(x);
        state.y = sanitize(y);
        if !state.activated {
            state.activated = true;
            state.touch_changed = true;
        }
    }

    /// Thumb lifted: spring back to center
    pub fn release(&self) {
        let mut state = self.lock();
        let touch_changed = state.touch_changed || state.activated;
        *state = StickState {
            touch_changed,
            ..StickState::default()
        };
    }

    /// Current deflection with the deadband applied, each axis in [-1, 1]
    pub fn position(&self) -> (f32, f32) {
        let state = *self.lock();
        (
            apply_deadband(state.x, self.deadband_x),
            apply_deadband(state.y, self.deadband_y),
        )
    }

    pub fn is_activated(&self) -> bool {
        self.lock().activated
    }

    /// Whether the thumb touched down or lifted since the last call
    pub fn take_touch_change(&self) -> bool {
        std::mem::take(&mut self.lock().touch_changed)
    }

    fn lock(&self) -> MutexGuard<'_, StickState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sanitize(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Zero inside the band, rescaled outside so full deflection still reaches 1.0
fn apply_deadband(value: f32, band: f32) -> f32 {
    if band <= 0.0 {
        return value;
    }
    if value.abs() <= band {
        0.0
    } else {
        value.signum() * (value.abs() - band) / (1.0 - band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_is_clamped() {
        let stick = Joystick::new();
        stick.set_position(2.0, -3.0);
        assert_eq!(stick.position(), (1.0, -1.0));
        assert!(stick.is_activated());
    }

    #[test]
    fn test_deadband() {
        let stick = Joystick::with_deadband(0.1, 0.0);
        stick.set_position(0.05, 0.05);
        assert_eq!(stick.position(), (0.0, 0.05));

        stick.set_position(1.0, 0.0);
        assert_eq!(stick.position().0, 1.0);

        stick.set_position(-0.55, 0.0);
        assert!((stick.position().0 + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_release_recenters() {
        let stick = Joystick::new();
        let shared = stick.clone();
        shared.set_position(0.4, 0.7);
        assert_eq!(stick.position(), (0.4, 0.7));

        shared.release();
        assert_eq!(stick.position(), (0.0, 0.0));
        assert!(!stick.is_activated());
    }

    #[test]
    fn test_touch_change_tracks_thumb() {
        let stick = Joystick::new();
        assert!(!stick.take_touch_change());

        stick.set_position(0.1, 0.1);
        stick.set_position(0.2, 0.3);
        assert!(stick.take_touch_change());
        // Dragging is not a touch change
        stick.set_position(0.5, 0.5);
        assert!(!stick.take_touch_change());

        stick.release();
        assert!(stick.take_touch_change());
        stick.release();
        assert!(!stick.take_touch_change());
    }
}
