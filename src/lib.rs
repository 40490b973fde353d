//! BreezeBlue flight link.
//!
//! Control input from joysticks or device tilt is sampled on a fixed cadence,
//! encoded into 15-byte command packets and handed to the radio transport
//! while the link is connected.

pub mod domain;
pub mod infrastructure;

pub use domain::commander::{Commander, ControlInputs, ControlMode, Sensitivity};
pub use domain::models::{AppEvent, ControlSample, LinkEvent, LinkFailure, LinkState};
pub use infrastructure::link::{FlightLink, FlightLinkHandle, LinkConfig};
