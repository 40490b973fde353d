//! Flight Link Module
//!
//! Turns control input into command packets and drives the radio link.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       FlightLink                        │
//! │  (Service task - commands, link events, scheduler tick)  │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┬──────────────┐
//!         │             │             │              │
//!         ▼             ▼             ▼              ▼
//! ┌────────────┐ ┌────────────┐ ┌──────────┐ ┌─────────────┐
//! │   State    │ │ Transport  │ │ Protocol │ │  Observers  │
//! │  Machine   │ │            │ │          │ │             │
//! │ - idle ..  │ │ - connect  │ │ - header │ │ - register  │
//! │  connected │ │ - send     │ │ - encode │ │ - publish   │
//! └────────────┘ └────────────┘ └──────────┘ └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Wire format of the command packet, UUIDs
//! - [`state_machine`] - Connection lifecycle
//! - [`observer`] - Observer registry for [`AppEvent`](crate::domain::models::AppEvent)s
//! - [`transport`] - Transport session boundary
//! - [`simulated`] - In-process transport used by the binary and tests
//! - [`service`] - Service task and its client handle

pub mod observer;
pub mod protocol;
pub mod service;
pub mod simulated;
pub mod state_machine;
pub mod transport;

// Re-export main service for convenience
pub use service::{FlightLink, FlightLinkHandle, LinkConfig};
