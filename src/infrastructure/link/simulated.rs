//! Simulated Transport
//!
//! In-process stand-in for the BLE link. Plays the scan / connect / service /
//! characteristic handshake on a timer and records every packet it is given
//! in a bounded drop-oldest queue.

use crate::domain::models::{LinkEvent, LinkFailure};
use crate::infrastructure::link::transport::{LinkEventSender, TransportError, TransportSession};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// How the simulated handshake ends
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SimulatedOutcome {
    #[default]
    Connect,
    /// `connect` fails immediately
    BluetoothDisabled,
    /// Scanning never finds the drone
    NoPeripheral,
    /// The stack errors out after the link is established
    StackError(String),
}

#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Delay between handshake steps
    pub step_delay: Duration,
    /// Packets retained before the oldest is dropped
    pub queue_depth: usize,
    pub outcome: SimulatedOutcome,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(200),
            queue_depth: 32,
            outcome: SimulatedOutcome::Connect,
        }
    }
}

#[derive(Debug)]
struct SentQueue {
    packets: VecDeque<Vec<u8>>,
    capacity: usize,
    total: u64,
    dropped: u64,
}

/// Packets handed to the simulated radio. Clones share the queue.
#[derive(Debug, Clone)]
pub struct SentPackets {
    queue: Arc<Mutex<SentQueue>>,
}

impl SentPackets {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Arc::new(Mutex::new(SentQueue {
                packets: VecDeque::with_capacity(capacity),
                capacity,
                total: 0,
                dropped: 0,
            })),
        }
    }

    fn push(&self, packet: &[u8]) {
        let mut queue = self.lock();
        if queue.packets.len() >= queue.capacity {
            queue.packets.pop_front();
            queue.dropped += 1;
        }
        queue.packets.push_back(packet.to_vec());
        queue.total += 1;
    }

    /// Packets received over the transport's lifetime, dropped ones included
    pub fn total(&self) -> u64 {
        self.lock().total
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn last(&self) -> Option<Vec<u8>> {
        self.lock().packets.back().cloned()
    }

    /// Remove and return the retained packets, oldest first
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.lock().packets.drain(..).collect()
    }

    fn lock(&self) -> MutexGuard<'_, SentQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Injects radio-side events into a running simulated link
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    events: LinkEventSender,
    linked: Arc<AtomicBool>,
}

impl SimulatedLink {
    /// The drone went out of range
    pub fn drop_link(&self) {
        self.linked.store(false, Ordering::SeqCst);
        let _ = self.events.send(LinkEvent::Disconnected);
    }

    pub fn fail(&self, failure: LinkFailure) {
        self.linked.store(false, Ordering::SeqCst);
        let _ = self.events.send(LinkEvent::Failed(failure));
    }

    pub fn is_linked(&self) -> bool {
        self.linked.load(Ordering::SeqCst)
    }
}

pub struct SimulatedTransport {
    events: LinkEventSender,
    config: SimulatedConfig,
    sent: SentPackets,
    linked: Arc<AtomicBool>,
    handshake: Option<JoinHandle<()>>,
}

impl SimulatedTransport {
    pub fn new(events: LinkEventSender, config: SimulatedConfig) -> Self {
        let sent = SentPackets::new(config.queue_depth);
        Self {
            events,
            config,
            sent,
            linked: Arc::new(AtomicBool::new(false)),
            handshake: None,
        }
    }

    pub fn sent(&self) -> SentPackets {
        self.sent.clone()
    }

    pub fn controls(&self) -> SimulatedLink {
        SimulatedLink {
            events: self.events.clone(),
            linked: self.linked.clone(),
        }
    }

    fn abort_handshake(&mut self) {
        if let Some(handshake) = self.handshake.take() {
            handshake.abort();
        }
    }
}

async fn run_handshake(
    events: LinkEventSender,
    step: Duration,
    outcome: SimulatedOutcome,
    linked: Arc<AtomicBool>,
) {
    tokio::time::sleep(step).await;
    if outcome == SimulatedOutcome::NoPeripheral {
        debug!("Simulated scan found nothing");
        return;
    }
    let _ = events.send(LinkEvent::PeripheralFound);

    tokio::time::sleep(step).await;
    let _ = events.send(LinkEvent::LinkEstablished);

    if let SimulatedOutcome::StackError(detail) = outcome {
        tokio::time::sleep(step).await;
        let _ = events.send(LinkEvent::Failed(LinkFailure::Stack(detail)));
        return;
    }

    tokio::time::sleep(step).await;
    let _ = events.send(LinkEvent::ServiceFound);

    tokio::time::sleep(step).await;
    linked.store(true, Ordering::SeqCst);
    let _ = events.send(LinkEvent::CharacteristicsFound);
}

impl TransportSession for SimulatedTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.config.outcome == SimulatedOutcome::BluetoothDisabled {
            warn!("Simulated radio is disabled");
            return Err(TransportError::BluetoothDisabled);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Stack(format!("no async runtime: {}", e)))?;

        self.abort_handshake();
        self.linked.store(false, Ordering::SeqCst);
        info!("Simulated handshake started");

        self.handshake = Some(runtime.spawn(run_handshake(
            self.events.clone(),
            self.config.step_delay,
            self.config.outcome.clone(),
            self.linked.clone(),
        )));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.abort_handshake();
        if self.linked.swap(false, Ordering::SeqCst) {
            info!("Simulated link closed");
        }
    }

    fn send(&mut self, packet: &[u8]) {
        trace!("Simulated send: {:02X?}", packet);
        self.sent.push(packet);
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        self.abort_handshake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_sent_queue_drops_oldest() {
        let sent = SentPackets::new(2);
        sent.push(&[1]);
        sent.push(&[2]);
        sent.push(&[3]);

        assert_eq!(sent.total(), 3);
        assert_eq!(sent.dropped(), 1);
        assert_eq!(sent.last(), Some(vec![3]));
        assert_eq!(sent.drain(), vec![vec![2], vec![3]]);
    }

    #[test]
    fn test_disabled_radio_fails_connect() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = SimulatedTransport::new(
            tx,
            SimulatedConfig {
                outcome: SimulatedOutcome::BluetoothDisabled,
                ..SimulatedConfig::default()
            },
        );
        assert_eq!(transport.connect(), Err(TransportError::BluetoothDisabled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = SimulatedTransport::new(tx, SimulatedConfig::default());
        let link = transport.controls();
        transport.connect().unwrap();

        let mut events = Vec::new();
        for _ in 0..4 {
            events.push(rx.recv().await.unwrap());
        }
        assert_eq!(
            events,
            vec![
                LinkEvent::PeripheralFound,
                LinkEvent::LinkEstablished,
                LinkEvent::ServiceFound,
                LinkEvent::CharacteristicsFound,
            ]
        );
        assert!(link.is_linked());

        transport.disconnect();
        assert!(!link.is_linked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stack_error_outcome() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = SimulatedTransport::new(
            tx,
            SimulatedConfig {
                outcome: SimulatedOutcome::StackError("gatt 133".to_string()),
                ..SimulatedConfig::default()
            },
        );
        transport.connect().unwrap();

        assert_eq!(rx.recv().await, Some(LinkEvent::PeripheralFound));
        assert_eq!(rx.recv().await, Some(LinkEvent::LinkEstablished));
        assert_eq!(
            rx.recv().await,
            Some(LinkEvent::Failed(LinkFailure::Stack("gatt 133".to_string())))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_aborts_handshake() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = SimulatedTransport::new(tx, SimulatedConfig::default());
        transport.connect().unwrap();
        transport.disconnect();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
