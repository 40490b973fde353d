//! Flight Commanders
//!
//! A commander turns the current control inputs into one normalized
//! pitch/roll/yaw/thrust reading per scheduler tick. Reads are two-phase:
//! [`Commander::prepare_data`] refreshes everything once, then the four
//! accessors return the prepared values.

use crate::domain::joystick::Joystick;
use crate::domain::motion::MotionBuffer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommanderError {
    #[error("no motion data available yet")]
    NoMotionData,
    #[error("input unavailable: {0}")]
    InputUnavailable(String),
}

/// Source of one flight-command reading per tick
pub trait Commander: Send {
    /// Refresh the input aggregation. Called exactly once per tick before
    /// any accessor.
    fn prepare_data(&mut self) -> Result<(), CommanderError>;

    fn pitch(&self) -> f32;
    fn roll(&self) -> f32;
    fn yaw(&self) -> f32;
    fn thrust(&self) -> f32;
}

/// Scaling applied to the normalized inputs, as fractions of full scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivitySettings {
    pub pitch_roll: f32,
    pub yaw: f32,
    pub max_thrust: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Sensitivity {
    #[default]
    Slow,
    Fast,
    Custom(SensitivitySettings),
}

impl Sensitivity {
    pub fn settings(&self) -> SensitivitySettings {
        match self {
            Self::Slow => SensitivitySettings {
                pitch_roll: 0.5,
                yaw: 0.5,
                max_thrust: 0.8,
            },
            Self::Fast => SensitivitySettings {
                pitch_roll: 1.0,
                yaw: 1.0,
                max_thrust: 1.0,
            },
            Self::Custom(settings) => SensitivitySettings {
                pitch_roll: settings.pitch_roll.clamp(0.0, 1.0),
                yaw: settings.yaw.clamp(0.0, 1.0),
                max_thrust: settings.max_thrust.clamp(0.0, 1.0),
            },
        }
    }
}

/// One axis of one on-screen joystick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickAxis {
    LeftX,
    LeftY,
    RightX,
    RightY,
}

/// Which stick axis drives which flight axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisMap {
    pub pitch: StickAxis,
    pub roll: StickAxis,
    pub yaw: StickAxis,
    pub thrust: StickAxis,
}

/// Layout of the controls chosen by the pilot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ControlMode {
    #[default]
    Mode1,
    Mode2,
    Mode3,
    Mode4,
    /// Device tilt for pitch/roll, joysticks for yaw and thrust
    Tilt,
}

impl ControlMode {
    /// Stick assignment. Pitch and roll are unused in tilt mode.
    pub fn axis_map(&self) -> AxisMap {
        use StickAxis::*;
        match self {
            Self::Mode1 => AxisMap {
                yaw: LeftX,
                pitch: LeftY,
                roll: RightX,
                thrust: RightY,
            },
            Self::Mode2 => AxisMap {
                yaw: LeftX,
                thrust: LeftY,
                roll: RightX,
                pitch: RightY,
            },
            Self::Mode3 => AxisMap {
                roll: LeftX,
                pitch: LeftY,
                yaw: RightX,
                thrust: RightY,
            },
            Self::Mode4 => AxisMap {
                roll: LeftX,
                thrust: LeftY,
                yaw: RightX,
                pitch: RightY,
            },
            Self::Tilt => AxisMap {
                yaw: LeftX,
                thrust: RightY,
                pitch: LeftY,
                roll: RightX,
            },
        }
    }

    /// Axis labels in the order left x, left y, right x, right y
    pub fn titles(&self) -> [Option<&'static str>; 4] {
        let map = self.axis_map();
        let mut titles = [None; 4];
        let mut assign = |axis: StickAxis, title: &'static str| {
            let index = match axis {
                StickAxis::LeftX => 0,
                StickAxis::LeftY => 1,
                StickAxis::RightX => 2,
                StickAxis::RightY => 3,
            };
            titles[index] = Some(title);
        };
        assign(map.yaw, "Yaw");
        assign(map.thrust, "Thrust");
        if *self != Self::Tilt {
            assign(map.pitch, "Pitch");
            assign(map.roll, "Roll");
        }
        titles
    }

    /// Build the commander for this mode. Tilt mode needs a motion source and
    /// yields `None` without one.
    pub fn commander(
        &self,
        inputs: &ControlInputs,
        sensitivity: Sensitivity,
    ) -> Option<Box<dyn Commander>> {
        let settings = sensitivity.settings();
        match self {
            Self::Tilt => {
                let motion = inputs.motion.clone()?;
                Some(Box::new(TiltCommander::new(
                    inputs.left.clone(),
                    inputs.right.clone(),
                    motion,
                    settings,
                )))
            }
            _ => Some(Box::new(JoystickCommander::new(
                inputs.left.clone(),
                inputs.right.clone(),
                self.axis_map(),
                settings,
            ))),
        }
    }
}

/// Input sources a commander may read from
#[derive(Debug, Clone, Default)]
pub struct ControlInputs {
    pub left: Joystick,
    pub right: Joystick,
    pub motion: Option<MotionBuffer>,
}

impl ControlInputs {
    pub fn new(right_deadband_x: f32, motion: Option<MotionBuffer>) -> Self {
        Self {
            left: Joystick::new(),
            right: Joystick::with_deadband(right_deadband_x, 0.0),
            motion,
        }
    }

    pub fn both_thumbs_down(&self) -> bool {
        self.left.is_activated() && self.right.is_activated()
    }

    /// Re-level the motion source when a thumb lands or lifts while both
    /// sticks are held in tilt mode. Call after every touch update; returns
    /// whether a calibration happened.
    pub fn calibrate_motion_if_needed(&self, mode: ControlMode) -> bool {
        // Consume both flags on every call
        let left_changed = self.left.take_touch_change();
        let right_changed = self.right.take_touch_change();

        if !(left_changed || right_changed) || !self.both_thumbs_down() {
            return false;
        }
        match (&self.motion, mode) {
            (Some(motion), ControlMode::Tilt) => {
                motion.calibrate();
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Prepared {
    pitch: f32,
    roll: f32,
    yaw: f32,
    thrust: f32,
}

fn read_axis(axis: StickAxis, left: (f32, f32), right: (f32, f32)) -> f32 {
    match axis {
        StickAxis::LeftX => left.0,
        StickAxis::LeftY => left.1,
        StickAxis::RightX => right.0,
        StickAxis::RightY => right.1,
    }
}

/// Thrust stick only pushes up; the lower half of travel is idle
fn thrust_from_stick(value: f32, max_thrust: f32) -> f32 {
    value.max(0.0) * max_thrust
}

/// Both sticks drive all four axes
#[derive(Debug)]
pub struct JoystickCommander {
    left: Joystick,
    right: Joystick,
    map: AxisMap,
    sensitivity: SensitivitySettings,
    prepared: Prepared,
}

impl JoystickCommander {
    pub fn new(
        left: Joystick,
        right: Joystick,
        map: AxisMap,
        sensitivity: SensitivitySettings,
    ) -> Self {
        Self {
            left,
            right,
            map,
            sensitivity,
            prepared: Prepared::default(),
        }
    }
}

impl Commander for JoystickCommander {
    fn prepare_data(&mut self) -> Result<(), CommanderError> {
        let left = self.left.position();
        let right = self.right.position();
        let s = self.sensitivity;

        self.prepared = Prepared {
            pitch: read_axis(self.map.pitch, left, right) * s.pitch_roll,
            roll: read_axis(self.map.roll, left, right) * s.pitch_roll,
            yaw: read_axis(self.map.yaw, left, right) * s.yaw,
            thrust: thrust_from_stick(read_axis(self.map.thrust, left, right), s.max_thrust),
        };
        Ok(())
    }

    fn pitch(&self) -> f32 {
        self.prepared.pitch
    }

    fn roll(&self) -> f32 {
        self.prepared.roll
    }

    fn yaw(&self) -> f32 {
        self.prepared.yaw
    }

    fn thrust(&self) -> f32 {
        self.prepared.thrust
    }
}

/// Pitch and roll from device tilt, yaw and thrust from the sticks
#[derive(Debug)]
pub struct TiltCommander {
    left: Joystick,
    right: Joystick,
    motion: MotionBuffer,
    sensitivity: SensitivitySettings,
    prepared: Prepared,
}

impl TiltCommander {
    pub fn new(
        left: Joystick,
        right: Joystick,
        motion: MotionBuffer,
        sensitivity: SensitivitySettings,
    ) -> Self {
        Self {
            left,
            right,
            motion,
            sensitivity,
            prepared: Prepared::default(),
        }
    }
}

impl Commander for TiltCommander {
    fn prepare_data(&mut self) -> Result<(), CommanderError> {
        let attitude = self
            .motion
            .take_normalized()
            .ok_or(CommanderError::NoMotionData)?;
        let map = ControlMode::Tilt.axis_map();
        let left = self.left.position();
        let right = self.right.position();
        let s = self.sensitivity;

        self.prepared = Prepared {
            pitch: attitude.pitch * s.pitch_roll,
            roll: attitude.roll * s.pitch_roll,
            yaw: read_axis(map.yaw, left, right) * s.yaw,
            thrust: thrust_from_stick(read_axis(map.thrust, left, right), s.max_thrust),
        };
        Ok(())
    }

    fn pitch(&self) -> f32 {
        self.prepared.pitch
    }

    fn roll(&self) -> f32 {
        self.prepared.roll
    }

    fn yaw(&self) -> f32 {
        self.prepared.yaw
    }

    fn thrust(&self) -> f32 {
        self.prepared.thrust
    }
}
