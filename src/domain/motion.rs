//! Device Motion Buffer
//!
//! Collects attitude readings from the motion sensor between ticks so the
//! tilt commander can average them once per tick.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Device attitude in radians
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Attitude {
    pub pitch: f32,
    pub roll: f32,
}

impl Attitude {
    pub fn new(pitch: f32, roll: f32) -> Self {
        Self { pitch, roll }
    }
}

#[derive(Debug)]
struct MotionState {
    pending: VecDeque<Attitude>,
    latest: Option<Attitude>,
    // Zero reference captured by calibrate()
    zero: Attitude,
}

/// Shared buffer between the motion source and the tilt commander
#[derive(Debug, Clone)]
pub struct MotionBuffer {
    state: Arc<Mutex<MotionState>>,
    capacity: usize,
    max_tilt: f32,
}

impl MotionBuffer {
    /// Default number of readings retained between two ticks
    pub const DEFAULT_CAPACITY: usize = 16;

    /// `max_tilt_deg` is the tilt that maps to full deflection
    pub fn new(capacity: usize, max_tilt_deg: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MotionState {
                pending: VecDeque::with_capacity(capacity.max(1)),
                latest: None,
                zero: Attitude::default(),
            })),
            capacity: capacity.max(1),
            max_tilt: max_tilt_deg.abs().max(1.0).to_radians(),
        }
    }

    /// Record a sensor reading. Oldest readings are dropped when full.
    pub fn push(&self, attitude: Attitude) {
        if attitude.pitch.is_nan() || attitude.roll.is_nan() {
            return;
        }
        let mut state = self.lock();
        while state.pending.len() >= self.capacity {
            state.pending.pop_front();
        }
        state.pending.push_back(attitude);
    }

    /// Use the most recent attitude as the new level reference
    pub fn calibrate(&self) {
        let mut state = self.lock();
        let current = state.pending.back().copied().or(state.latest);
        if let Some(current) = current {
            state.zero = current;
            tracing::info!(
                "Motion calibrated. Zero: pitch {:.4}, roll {:.4}",
                current.pitch,
                current.roll
            );
        }
    }

    /// Drain pending readings and return the averaged attitude relative to the
    /// calibrated zero, normalized to [-1, 1]. Holds the previous value when
    /// nothing new arrived; `None` until the first reading.
    pub fn take_normalized(&self) -> Option<Attitude> {
        let mut state = self.lock();

        if !state.pending.is_empty() {
            let count = state.pending.len() as f32;
            let pitch = state.pending.iter().map(|a| a.pitch).sum::<f32>() / count;
            let roll = state.pending.iter().map(|a| a.roll).sum::<f32>() / count;
            state.pending.clear();
            state.latest = Some(Attitude { pitch, roll });
        }

        let latest = state.latest?;
        Some(Attitude {
            pitch: ((latest.pitch - state.zero.pitch) / self.max_tilt).clamp(-1.0, 1.0),
            roll: ((latest.roll - state.zero.roll) / self.max_tilt).clamp(-1.0, 1.0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, MotionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MotionBuffer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, 30.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deg(value: f32) -> f32 {
        value.to_radians()
    }

    #[test]
    fn test_no_reading_yet() {
        let motion = MotionBuffer::default();
        assert_eq!(motion.take_normalized(), None);
    }

    #[test]
    fn test_averages_pending_readings() {
        let motion = MotionBuffer::new(8, 30.0);
        motion.push(Attitude::new(deg(10.0), 0.0));
        motion.push(Attitude::new(deg(20.0), deg(-30.0)));

        let attitude = motion.take_normalized().unwrap();
        assert!((attitude.pitch - 0.5).abs() < 1e-4);
        assert!((attitude.roll + 0.5).abs() < 1e-4);

        // Nothing new: value is held
        assert_eq!(motion.take_normalized(), Some(attitude));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let motion = MotionBuffer::new(2, 30.0);
        motion.push(Attitude::new(deg(30.0), 0.0));
        motion.push(Attitude::new(0.0, 0.0));
        motion.push(Attitude::new(0.0, 0.0));

        let attitude = motion.take_normalized().unwrap();
        assert_eq!(attitude.pitch, 0.0);
    }

    #[test]
    fn test_calibrate_and_clamp() {
        let motion = MotionBuffer::new(4, 30.0);
        motion.push(Attitude::new(deg(5.0), deg(5.0)));
        motion.calibrate();
        assert_eq!(motion.take_normalized(), Some(Attitude::new(0.0, 0.0)));

        motion.push(Attitude::new(deg(90.0), deg(-90.0)));
        let attitude = motion.take_normalized().unwrap();
        assert_eq!(attitude, Attitude::new(1.0, -1.0));
    }
}
