//! Flight Link Service
//!
//! Single task that owns the state machine, the commander slot, the tick
//! scheduler and the transport. Transport events, user commands and scheduler
//! ticks are all handled on this task, one at a time, so a tick never sees a
//! half-applied transition.

use crate::domain::commander::{Commander, CommanderError};
use crate::domain::models::{
    AppEvent, ControlSample, LinkEvent, LinkFailure, LinkState, MessageSeverity, StatusMessage,
};
use crate::infrastructure::link::observer::ObserverRegistry;
use crate::infrastructure::link::protocol;
use crate::infrastructure::link::state_machine::{LinkStateMachine, Transition};
use crate::infrastructure::link::transport::{LinkEventSender, TransportSession};
use std::fmt;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Timing of the flight link
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Scheduler period while connected
    pub tick_period: Duration,
    /// Give up if the handshake has not completed in this time. Zero disables
    /// the watchdog.
    pub connect_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(50),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Requests accepted by the running service
pub enum LinkCommand {
    Connect,
    Disconnect,
    /// Connect when idle, otherwise cancel / disconnect
    Toggle,
    SetCommander(Box<dyn Commander>),
    ClearCommander,
    Shutdown,
}

impl fmt::Debug for LinkCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("Connect"),
            Self::Disconnect => f.write_str("Disconnect"),
            Self::Toggle => f.write_str("Toggle"),
            Self::SetCommander(_) => f.write_str("SetCommander(..)"),
            Self::ClearCommander => f.write_str("ClearCommander"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Counters for scheduler ticks while connected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub sent: u64,
    pub skipped: u64,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("flight link service has stopped")]
    Stopped,
    #[error("flight link task failed: {0}")]
    TaskFailed(String),
}

/// Client side of a running [`FlightLink`]
pub struct FlightLinkHandle {
    commands: mpsc::UnboundedSender<LinkCommand>,
    observers: ObserverRegistry,
    state: watch::Receiver<LinkState>,
    stats: watch::Receiver<TickStats>,
    task: JoinHandle<()>,
}

impl FlightLinkHandle {
    fn send(&self, command: LinkCommand) -> Result<(), ServiceError> {
        self.commands
            .send(command)
            .map_err(|_| ServiceError::Stopped)
    }

    pub fn connect(&self) -> Result<(), ServiceError> {
        self.send(LinkCommand::Connect)
    }

    pub fn disconnect(&self) -> Result<(), ServiceError> {
        self.send(LinkCommand::Disconnect)
    }

    pub fn toggle(&self) -> Result<(), ServiceError> {
        self.send(LinkCommand::Toggle)
    }

    /// Replace the active commander. The next tick reads from it.
    pub fn set_commander(&self, commander: Box<dyn Commander>) -> Result<(), ServiceError> {
        self.send(LinkCommand::SetCommander(commander))
    }

    pub fn clear_commander(&self) -> Result<(), ServiceError> {
        self.send(LinkCommand::ClearCommander)
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> TickStats {
        *self.stats.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    pub async fn wait_for_state(&self, target: LinkState) -> Result<(), ServiceError> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| ServiceError::Stopped)
    }

    /// Stop the scheduler, drop the link and wait for the task to finish
    pub async fn shutdown(self) -> Result<(), ServiceError> {
        let _ = self.commands.send(LinkCommand::Shutdown);
        self.task
            .await
            .map_err(|e| ServiceError::TaskFailed(e.to_string()))
    }
}

pub struct FlightLink<T: TransportSession> {
    machine: LinkStateMachine,
    transport: T,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    commander: Option<Box<dyn Commander>>,
    observers: ObserverRegistry,
    config: LinkConfig,
    scheduler: Option<Interval>,
    connect_deadline: Option<Instant>,
    stats: TickStats,
    sequence: u64,
    skips: SkipLog,
    state_tx: watch::Sender<LinkState>,
    stats_tx: watch::Sender<TickStats>,
}

impl<T: TransportSession + 'static> FlightLink<T> {
    /// Build the transport with the link-event sender and start the service
    /// task on the current tokio runtime.
    pub fn spawn<F>(config: LinkConfig, make_transport: F) -> FlightLinkHandle
    where
        F: FnOnce(LinkEventSender) -> T,
    {
        let observers = ObserverRegistry::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LinkState::Idle);
        let (stats_tx, stats_rx) = watch::channel(TickStats::default());

        let link = FlightLink {
            machine: LinkStateMachine::new(observers.clone()),
            transport: make_transport(event_tx),
            events: event_rx,
            commander: None,
            observers: observers.clone(),
            config,
            scheduler: None,
            connect_deadline: None,
            stats: TickStats::default(),
            sequence: 0,
            skips: SkipLog::default(),
            state_tx,
            stats_tx,
        };
        let task = tokio::spawn(link.run(command_rx));

        FlightLinkHandle {
            commands: command_tx,
            observers,
            state: state_rx,
            stats: stats_rx,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<LinkCommand>) {
        info!(
            "Flight link service started (tick period {:?})",
            self.config.tick_period
        );

        loop {
            tokio::select! {
                biased;
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if self.handle_command(command).is_break() {
                        break;
                    }
                }
                Some(event) = self.events.recv() => self.handle_link_event(event),
                _ = next_tick(&mut self.scheduler) => self.tick(),
                _ = wait_deadline(self.connect_deadline) => self.on_connect_timeout(),
            }
        }

        self.teardown();
        info!("Flight link service stopped");
    }

    fn handle_command(&mut self, command: LinkCommand) -> ControlFlow<()> {
        debug!("Link command: {:?}", command);
        match command {
            LinkCommand::Connect => self.connect(),
            LinkCommand::Disconnect => self.disconnect(),
            LinkCommand::Toggle => {
                if self.machine.state() == LinkState::Idle {
                    self.connect();
                } else {
                    self.disconnect();
                }
            }
            LinkCommand::SetCommander(commander) => {
                info!("Commander assigned");
                self.commander = Some(commander);
            }
            LinkCommand::ClearCommander => {
                info!("Commander cleared");
                self.commander = None;
            }
            LinkCommand::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Failed(failure) if self.machine.state() == LinkState::Idle => {
                debug!("Ignoring failure while idle: {}", failure);
            }
            LinkEvent::Failed(failure) => self.fail(failure),
            LinkEvent::Disconnected => self.on_link_lost(),
            event => self.apply(event),
        }
    }

    /// The radio dropped the link. Stop the transport too so it cannot keep
    /// a half-open session while the core is idle.
    fn on_link_lost(&mut self) {
        if self.machine.state() == LinkState::Idle {
            debug!("Ignoring disconnect while idle");
            return;
        }
        self.stop_scheduler();
        self.connect_deadline = None;
        self.transport.disconnect();
        self.apply(LinkEvent::Disconnected);
        self.send_log("Lost connection to BreezeBlue", MessageSeverity::Warning);
    }

    /// Drop events still queued from the previous session
    fn discard_stale_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            debug!("Discarding stale link event {:?}", event);
        }
    }

    fn connect(&mut self) {
        let state = self.machine.state();
        if state != LinkState::Idle {
            warn!("Connect ignored: link is {}", state);
            return;
        }

        self.discard_stale_events();
        self.apply(LinkEvent::ConnectRequested);
        self.send_log("Searching for BreezeBlue...", MessageSeverity::Info);

        let timeout = self.config.connect_timeout;
        self.connect_deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);

        if let Err(e) = self.transport.connect() {
            self.fail(e.into());
        }
    }

    fn disconnect(&mut self) {
        self.stop_scheduler();
        self.connect_deadline = None;
        self.transport.disconnect();
        if self.machine.state() != LinkState::Idle {
            self.apply(LinkEvent::Disconnected);
            self.send_log("Disconnected from BreezeBlue", MessageSeverity::Info);
        }
    }

    /// Report a link failure once and return to idle. No automatic retry.
    fn fail(&mut self, failure: LinkFailure) {
        self.stop_scheduler();
        self.connect_deadline = None;
        self.transport.disconnect();
        self.apply(LinkEvent::Failed(failure));
    }

    fn on_connect_timeout(&mut self) {
        self.connect_deadline = None;
        let state = self.machine.state();
        if state != LinkState::Idle && state != LinkState::Connected {
            warn!("Handshake stalled in state {}", state);
            self.fail(LinkFailure::Timeout);
        }
    }

    fn teardown(&mut self) {
        self.disconnect();
        self.commander = None;
    }

    fn apply(&mut self, event: LinkEvent) {
        match self.machine.apply(&event) {
            Ok(Some(transition)) => self.on_transition(transition),
            Ok(None) => {}
            Err(e) => warn!("Ignoring link event: {}", e),
        }
    }

    fn on_transition(&mut self, transition: Transition) {
        self.state_tx.send_replace(transition.to);

        if transition.to == LinkState::Connected {
            self.connect_deadline = None;
            self.send_log("Connected to BreezeBlue", MessageSeverity::Success);
            self.start_scheduler();
        } else {
            if transition.to == LinkState::Idle {
                self.connect_deadline = None;
            }
            self.stop_scheduler();
        }
    }

    fn start_scheduler(&mut self) {
        let period = self.config.tick_period;
        let mut interval = time::interval_at(Instant::now() + period, period);
        // A late tick pushes the schedule back instead of bursting to catch up
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.scheduler = Some(interval);
        self.skips = SkipLog::default();
        info!("Scheduler started");
    }

    fn stop_scheduler(&mut self) {
        if self.scheduler.take().is_some() {
            info!("Scheduler stopped");
        }
    }

    /// One scheduler tick: prepare, sample, encode, send
    fn tick(&mut self) {
        if !self.machine.is_connected() {
            return;
        }
        self.stats.ticks += 1;

        let Some(commander) = self.commander.as_mut() else {
            trace!("Tick without commander");
            self.stats_tx.send_replace(self.stats);
            return;
        };

        let prepared = panic::catch_unwind(AssertUnwindSafe(
            || -> Result<ControlSample, CommanderError> {
                commander.prepare_data()?;
                Ok(ControlSample::new(
                    commander.pitch(),
                    commander.roll(),
                    commander.yaw(),
                    commander.thrust(),
                ))
            },
        ));

        let sample = match prepared {
            Ok(Ok(sample)) => sample,
            Ok(Err(e)) => return self.skip_tick(e.to_string()),
            Err(_) => return self.skip_tick("commander panicked".to_string()),
        };
        if self.skips.clear() {
            info!("Commander recovered, sending again");
        }

        let packet = protocol::encode(&sample);
        self.transport.send(&packet);

        self.sequence += 1;
        self.stats.sent += 1;
        self.stats_tx.send_replace(self.stats);
        self.observers.publish(AppEvent::CommandSent {
            sequence: self.sequence,
        });
    }

    /// Count a skipped tick. Only the first skip of a run, or a change of
    /// reason, is logged as a warning.
    fn skip_tick(&mut self, reason: String) {
        self.stats.skipped += 1;
        self.stats_tx.send_replace(self.stats);

        if self.skips.record(&reason) {
            warn!("Skipping tick: {}", reason);
        } else {
            debug!("Skipping tick: {}", reason);
        }
    }

    fn send_log(&self, message: &str, severity: MessageSeverity) {
        self.observers.publish(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}

/// Last reason a tick was skipped, so a commander that keeps failing the
/// same way does not flood the warn log
#[derive(Debug, Default)]
struct SkipLog {
    last: Option<String>,
}

impl SkipLog {
    /// Returns true for the first skip of a run or a new reason
    fn record(&mut self, reason: &str) -> bool {
        if self.last.as_deref() == Some(reason) {
            return false;
        }
        self.last = Some(reason.to_string());
        true
    }

    /// End the current run. Returns true if ticks had been skipped.
    fn clear(&mut self) -> bool {
        self.last.take().is_some()
    }
}

async fn next_tick(scheduler: &mut Option<Interval>) {
    match scheduler {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
