//! Transport Session Boundary
//!
//! The physical radio link lives behind [`TransportSession`]. The core calls
//! `connect` / `disconnect` / `send`; the transport reports handshake progress
//! and failures back as [`LinkEvent`]s on the sender it was built with.

use crate::domain::models::{LinkEvent, LinkFailure};
use thiserror::Error;
use tokio::sync::mpsc;

/// Channel a transport uses to raise link events towards the core
pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("bluetooth is disabled")]
    BluetoothDisabled,
    #[error("transport stack error: {0}")]
    Stack(String),
}

impl From<TransportError> for LinkFailure {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::BluetoothDisabled => LinkFailure::BluetoothDisabled,
            TransportError::Stack(detail) => LinkFailure::Stack(detail),
        }
    }
}

pub trait TransportSession: Send {
    /// Begin the connection handshake. Progress arrives as link events;
    /// an immediate error means the handshake never started.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear the link down. Safe to call in any state.
    fn disconnect(&mut self);

    /// Queue one packet for delivery. Fire-and-forget: back-pressure is the
    /// transport's concern.
    fn send(&mut self, packet: &[u8]);
}

impl<T: TransportSession + ?Sized> TransportSession for Box<T> {
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn send(&mut self, packet: &[u8]) {
        (**self).send(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_to_failure() {
        assert_eq!(
            LinkFailure::from(TransportError::BluetoothDisabled),
            LinkFailure::BluetoothDisabled
        );
        let failure = LinkFailure::from(TransportError::Stack("gatt 133".to_string()));
        assert_eq!(failure.title(), "Error");
        assert_eq!(failure.message().as_deref(), Some("gatt 133"));
    }
}
