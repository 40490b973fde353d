//! Link State Machine
//!
//! Tracks the connection handshake and publishes every transition to the
//! observer registry before returning.

use crate::domain::models::{AppEvent, LinkEvent, LinkState};
use crate::infrastructure::link::observer::ObserverRegistry;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("event {event:?} is not valid in state {state}")]
    InvalidTransition { state: LinkState, event: LinkEvent },
}

/// An applied state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: LinkState,
    pub to: LinkState,
}

pub struct LinkStateMachine {
    state: LinkState,
    observers: ObserverRegistry,
}

impl LinkStateMachine {
    pub fn new(observers: ObserverRegistry) -> Self {
        Self {
            state: LinkState::Idle,
            observers,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Next state for a handshake event, if the event is valid here
    fn next_state(state: LinkState, event: &LinkEvent) -> Option<LinkState> {
        use LinkState::*;
        match (state, event) {
            (_, LinkEvent::Disconnected) | (_, LinkEvent::Failed(_)) => Some(Idle),
            (Idle, LinkEvent::ConnectRequested) => Some(Scanning),
            (Scanning, LinkEvent::PeripheralFound) => Some(Connecting),
            (Connecting, LinkEvent::LinkEstablished) => Some(Services),
            (Services, LinkEvent::ServiceFound) => Some(Characteristics),
            (Characteristics, LinkEvent::CharacteristicsFound) => Some(Connected),
            _ => None,
        }
    }

    /// Apply an event. Returns the transition, `None` when the event leaves
    /// the state unchanged (disconnect while idle), or an error for an
    /// out-of-order event.
    ///
    /// A failure is published as [`AppEvent::Failed`] before the forced
    /// transition to idle.
    pub fn apply(&mut self, event: &LinkEvent) -> Result<Option<Transition>, LinkError> {
        let next = Self::next_state(self.state, event).ok_or_else(|| {
            LinkError::InvalidTransition {
                state: self.state,
                event: event.clone(),
            }
        })?;

        if let LinkEvent::Failed(failure) = event {
            error!("Link failure in state {}: {}", self.state, failure);
            self.observers.publish(AppEvent::Failed {
                title: failure.title().to_string(),
                message: failure.message(),
            });
        }

        if next == self.state {
            debug!("Link already {}", self.state);
            return Ok(None);
        }

        let transition = Transition {
            from: self.state,
            to: next,
        };
        self.state = next;
        info!("Link state: {} -> {}", transition.from, transition.to);
        self.observers.publish(AppEvent::StateChanged(next));

        Ok(Some(transition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::LinkFailure;
    use tokio::sync::mpsc::UnboundedReceiver;

    const HANDSHAKE: [LinkEvent; 5] = [
        LinkEvent::ConnectRequested,
        LinkEvent::PeripheralFound,
        LinkEvent::LinkEstablished,
        LinkEvent::ServiceFound,
        LinkEvent::CharacteristicsFound,
    ];

    fn machine() -> (LinkStateMachine, UnboundedReceiver<AppEvent>) {
        let registry = ObserverRegistry::new();
        let (_, rx) = registry.register();
        (LinkStateMachine::new(registry), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<AppEvent>) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_initial_state() {
        let (sm, _) = machine();
        assert_eq!(sm.state(), LinkState::Idle);
        assert!(!sm.is_connected());
    }

    #[test]
    fn test_full_handshake_order() {
        let (mut sm, mut rx) = machine();
        for event in HANDSHAKE.iter() {
            sm.apply(event).unwrap().unwrap();
        }
        assert!(sm.is_connected());

        let states: Vec<AppEvent> = drain(&mut rx);
        assert_eq!(
            states,
            vec![
                AppEvent::StateChanged(LinkState::Scanning),
                AppEvent::StateChanged(LinkState::Connecting),
                AppEvent::StateChanged(LinkState::Services),
                AppEvent::StateChanged(LinkState::Characteristics),
                AppEvent::StateChanged(LinkState::Connected),
            ]
        );
    }

    #[test]
    fn test_out_of_order_event_rejected() {
        let (mut sm, mut rx) = machine();
        let err = sm.apply(&LinkEvent::ServiceFound).unwrap_err();
        assert_eq!(
            err,
            LinkError::InvalidTransition {
                state: LinkState::Idle,
                event: LinkEvent::ServiceFound
            }
        );
        assert_eq!(sm.state(), LinkState::Idle);

        sm.apply(&LinkEvent::ConnectRequested).unwrap();
        assert!(sm.apply(&LinkEvent::ConnectRequested).is_err());
        assert!(sm.apply(&LinkEvent::CharacteristicsFound).is_err());
        assert_eq!(sm.state(), LinkState::Scanning);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_failure_from_every_stage() {
        for stage in 1..=HANDSHAKE.len() {
            let (mut sm, mut rx) = machine();
            for event in HANDSHAKE.iter().take(stage) {
                sm.apply(event).unwrap();
            }
            drain(&mut rx);

            let transition = sm
                .apply(&LinkEvent::Failed(LinkFailure::Timeout))
                .unwrap()
                .unwrap();
            assert_eq!(transition.to, LinkState::Idle);
            assert_eq!(sm.state(), LinkState::Idle);

            assert_eq!(
                drain(&mut rx),
                vec![
                    AppEvent::Failed {
                        title: "Connection timeout".to_string(),
                        message: Some("Could not find BreezeBlue".to_string()),
                    },
                    AppEvent::StateChanged(LinkState::Idle),
                ]
            );
        }
    }

    #[test]
    fn test_disconnect_while_idle_is_noop() {
        let (mut sm, mut rx) = machine();
        assert_eq!(sm.apply(&LinkEvent::Disconnected).unwrap(), None);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_failure_while_idle_still_reported() {
        let (mut sm, mut rx) = machine();
        let failure = LinkFailure::BluetoothDisabled;
        assert_eq!(sm.apply(&LinkEvent::Failed(failure)).unwrap(), None);
        assert_eq!(
            drain(&mut rx),
            vec![AppEvent::Failed {
                title: "Bluetooth disabled".to_string(),
                message: Some("Please enable Bluetooth to connect a BreezeBlue".to_string()),
            }]
        );
    }

    #[test]
    fn test_reconnect_after_disconnect() {
        let (mut sm, _rx) = machine();
        for event in HANDSHAKE.iter() {
            sm.apply(event).unwrap();
        }
        sm.apply(&LinkEvent::Disconnected).unwrap();
        assert_eq!(sm.state(), LinkState::Idle);
        for event in HANDSHAKE.iter() {
            sm.apply(event).unwrap();
        }
        assert!(sm.is_connected());
    }
}
