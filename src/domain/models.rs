use std::fmt;
use thiserror::Error;

/// One tick's worth of flight input, normalized.
///
/// Pitch, roll and yaw live in `[-1, 1]`, thrust in `[0, 1]`. Values are
/// clamped on construction and NaN collapses to zero, so a sample can never
/// carry garbage to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlSample {
    pitch: f32,
    roll: f32,
    yaw: f32,
    thrust: f32,
}

impl ControlSample {
    pub fn new(pitch: f32, roll: f32, yaw: f32, thrust: f32) -> Self {
        Self {
            pitch: clamp_axis(pitch, -1.0, 1.0),
            roll: clamp_axis(roll, -1.0, 1.0),
            yaw: clamp_axis(yaw, -1.0, 1.0),
            thrust: clamp_axis(thrust, 0.0, 1.0),
        }
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn roll(&self) -> f32 {
        self.roll
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn thrust(&self) -> f32 {
        self.thrust
    }
}

fn clamp_axis(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(min, max)
    }
}

/// Connection lifecycle of the radio link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Idle,
    Connected,
    Scanning,
    Connecting,
    Services,
    Characteristics,
}

impl LinkState {
    /// Connection progress shown while the handshake runs (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        match self {
            Self::Idle | Self::Scanning => 0.0,
            Self::Connecting => 0.25,
            Self::Services => 0.5,
            Self::Characteristics => 0.75,
            Self::Connected => 1.0,
        }
    }

    /// Label for the connect/cancel toggle
    pub fn action_title(&self) -> &'static str {
        match self {
            Self::Idle => "Connect",
            _ => "Cancel",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Services => "services",
            Self::Characteristics => "characteristics",
        };
        f.write_str(name)
    }
}

/// Terminal link failure reported by the transport (or the connect watchdog).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkFailure {
    #[error("bluetooth is disabled")]
    BluetoothDisabled,
    #[error("connection timed out")]
    Timeout,
    #[error("radio stack error: {0}")]
    Stack(String),
}

impl LinkFailure {
    pub fn title(&self) -> &'static str {
        match self {
            Self::BluetoothDisabled => "Bluetooth disabled",
            Self::Timeout => "Connection timeout",
            Self::Stack(_) => "Error",
        }
    }

    pub fn message(&self) -> Option<String> {
        match self {
            Self::BluetoothDisabled => {
                Some("Please enable Bluetooth to connect a BreezeBlue".to_string())
            }
            Self::Timeout => Some("Could not find BreezeBlue".to_string()),
            Self::Stack(detail) if detail.is_empty() => None,
            Self::Stack(detail) => Some(detail.clone()),
        }
    }
}

/// Events raised by a transport session towards the link core
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    ConnectRequested,
    PeripheralFound,
    LinkEstablished,
    ServiceFound,
    CharacteristicsFound,
    Disconnected,
    Failed(LinkFailure),
}

/// Events delivered to registered observers
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    StateChanged(LinkState),
    Failed {
        title: String,
        message: Option<String>,
    },
    CommandSent {
        sequence: u64,
    },
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_clamps_out_of_range() {
        let sample = ControlSample::new(1.5, -2.0, 0.25, 1.5);
        assert_eq!(sample.pitch(), 1.0);
        assert_eq!(sample.roll(), -1.0);
        assert_eq!(sample.yaw(), 0.25);
        assert_eq!(sample.thrust(), 1.0);

        let sample = ControlSample::new(0.0, 0.0, 0.0, -0.5);
        assert_eq!(sample.thrust(), 0.0);
    }

    #[test]
    fn test_sample_nan_is_zeroed() {
        let sample = ControlSample::new(f32::NAN, 0.5, f32::NAN, f32::NAN);
        assert_eq!(sample.pitch(), 0.0);
        assert_eq!(sample.roll(), 0.5);
        assert_eq!(sample.yaw(), 0.0);
        assert_eq!(sample.thrust(), 0.0);
    }

    #[test]
    fn test_progress_order() {
        let order = [
            LinkState::Scanning,
            LinkState::Connecting,
            LinkState::Services,
            LinkState::Characteristics,
            LinkState::Connected,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].progress() < pair[1].progress());
        }
        assert_eq!(LinkState::Idle.progress(), 0.0);
        assert_eq!(LinkState::Idle.action_title(), "Connect");
        assert_eq!(LinkState::Services.action_title(), "Cancel");
    }

    #[test]
    fn test_failure_titles() {
        assert_eq!(LinkFailure::Timeout.title(), "Connection timeout");
        assert_eq!(
            LinkFailure::Timeout.message().as_deref(),
            Some("Could not find BreezeBlue")
        );
        let stack = LinkFailure::Stack("adapter reset".to_string());
        assert_eq!(stack.title(), "Error");
        assert_eq!(stack.message().as_deref(), Some("adapter reset"));
        assert_eq!(LinkFailure::Stack(String::new()).message(), None);
    }
}
