//! Relay loop
//!
//! The relay sits between the node process (two local channels) and the
//! broker ([`BrokerLink`]). It owns the device [`StateMachine`] and the
//! [`RetryManager`]; nothing else mutates either.
//!
//! ## Iteration
//!
//! Each call to `step` waits on three sources at once with `select3`:
//!
//! 1. the local event queue,
//! 2. the broker link,
//! 3. a timer set to the earliest retry due time (or one retry interval).
//!
//! A local event is routed first and followed by a zero-timeout poll of the
//! broker. A retry pass runs whenever the iteration saw no broker traffic.
//! This keeps the ordering of a plain polling loop without spinning.
//!
//! `FLASH` is executed inside the iteration: local events, broker frames and
//! retries wait until the build finishes. Together with the two handshakes
//! this is the only place the loop blocks.
//!
//! ## Stopping
//!
//! [`RunFlag::stop`] is checked once at the top of every iteration. An
//! iteration that already started always completes, so stop latency is
//! bounded by the retry interval.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{select, select3, Either, Either3};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use embassy_time::{Instant, Timer};
use hal_abstractions::{ResetLine, Toolchain};
use heapless::Deque;
use log::{debug, error, info, warn};

use crate::command::{OperatorCommand, SystemEvent};
use crate::config::{RelayConfig, SyncPolicy};
use crate::envelope::{Envelope, Frame};
use crate::error::RelayError;
use crate::link::BrokerLink;
use crate::retry::{RetryAction, RetryManager};
use crate::router::{route_inbound, route_outbound, Inbound, Outbound};
use crate::state::{DeviceState, StateMachine, Transition};

/// Capacity of each local channel
pub const QUEUE_DEPTH: usize = 16;

/// Broker frames buffered while a handshake waits for its ack
pub(crate) const BACKLOG_DEPTH: usize = QUEUE_DEPTH;

/// Channel type for both local directions
pub type LocalQueue<M> = Channel<M, Envelope, QUEUE_DEPTH>;

/// Node → relay side of the local queue
pub type EventReceiver<'a, M> = Receiver<'a, M, Envelope, QUEUE_DEPTH>;

/// Relay → node side of the local queue
pub type CommandSender<'a, M> = Sender<'a, M, Envelope, QUEUE_DEPTH>;

/// Cooperative stop flag shared with whoever may stop the relay
pub struct RunFlag {
    running: AtomicBool,
}

impl RunFlag {
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
        }
    }

    /// Ask the relay to stop at the top of its next iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the relay returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RelayOutcome {
    /// Operator sent EXIT
    Exit,
    /// [`RunFlag::stop`] was called
    Stopped,
    /// Fatal local condition; the exit handshake has already run
    Fatal(DeviceState),
    /// SYNC not acknowledged under [`SyncPolicy::Abort`]
    SyncAborted,
    /// Broker link failed
    LinkLost,
}

impl RelayOutcome {
    /// Whether the process should exit with a failure status
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Exit | Self::Stopped)
    }
}

/// Relay counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RelayStats {
    /// Experiment responses forwarded to the broker
    pub forwarded: u32,
    /// Commands delivered to the node process
    pub delivered: u32,
    /// Commands dropped because the local queue was full
    pub dropped: u32,
    /// Envelopes resent by the retry manager
    pub retransmissions: u32,
    /// Envelopes given up on after the retry budget
    pub delivery_failures: u32,
    /// Warnings raised for unsupported payloads
    pub warnings: u32,
}

/// Command relay between the node process and the broker
pub struct Relay<'a, M, L, T, R>
where
    M: RawMutex,
{
    pub(crate) config: RelayConfig,
    pub(crate) link: L,
    toolchain: T,
    reset: R,
    events: EventReceiver<'a, M>,
    commands: CommandSender<'a, M>,
    running: &'a RunFlag,
    pub(crate) machine: StateMachine,
    pub(crate) retry: RetryManager,
    pub(crate) backlog: Deque<Frame, BACKLOG_DEPTH>,
    stats: RelayStats,
}

impl<'a, M, L, T, R> Relay<'a, M, L, T, R>
where
    M: RawMutex,
    L: BrokerLink,
    T: Toolchain,
    R: ResetLine,
{
    pub fn new(
        config: RelayConfig,
        link: L,
        toolchain: T,
        reset: R,
        events: EventReceiver<'a, M>,
        commands: CommandSender<'a, M>,
        running: &'a RunFlag,
    ) -> Self {
        Self {
            machine: StateMachine::new(config.warning_policy),
            retry: RetryManager::new(config.retry_interval, config.max_retries),
            config,
            link,
            toolchain,
            reset,
            events,
            commands,
            running,
            backlog: Deque::new(),
            stats: RelayStats::default(),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.machine.state()
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Envelopes currently awaiting acknowledgement
    pub fn pending(&self) -> &RetryManager {
        &self.retry
    }

    /// Ask the loop to stop (same as stopping the shared [`RunFlag`])
    pub fn stop(&self) {
        self.running.stop();
    }

    /// Sync with the broker, then relay until stopped
    pub async fn run(&mut self) -> RelayOutcome {
        info!("Sync with broker ...");
        match self.sync().await {
            Ok(()) => {}
            Err(RelayError::Link) => {
                error!("{} during sync", RelayError::Link);
                return RelayOutcome::LinkLost;
            }
            Err(e) => match self.config.sync_policy {
                SyncPolicy::Continue => {
                    warn!("{}, continuing without broker confirmation", e);
                }
                SyncPolicy::Abort => {
                    error!("{}, aborting", e);
                    return RelayOutcome::SyncAborted;
                }
            },
        }

        while self.running.is_running() {
            if let Some(outcome) = self.step().await {
                info!("Relay finished: {:?}", outcome);
                return outcome;
            }
        }
        info!("Relay stopped");
        RelayOutcome::Stopped
    }

    /// One loop iteration
    pub(crate) async fn step(&mut self) -> Option<RelayOutcome> {
        if let Some(frame) = self.backlog.pop_front() {
            return self.inbound(frame).await;
        }

        let wake_at = self
            .retry
            .next_due()
            .unwrap_or_else(|| Instant::now() + self.config.retry_interval);

        match select3(
            self.events.receive(),
            self.link.receive(),
            Timer::at(wake_at),
        )
        .await
        {
            Either3::First(envelope) => {
                if let Some(outcome) = self.outbound(envelope).await {
                    return Some(outcome);
                }
                match select(self.link.receive(), core::future::ready(())).await {
                    Either::First(received) => self.received(received).await,
                    Either::Second(()) => {
                        self.retry_pass().await;
                        None
                    }
                }
            }
            Either3::Second(received) => self.received(received).await,
            Either3::Third(()) => {
                self.retry_pass().await;
                None
            }
        }
    }

    async fn received(&mut self, received: Result<Frame, L::Error>) -> Option<RelayOutcome> {
        match received {
            Ok(frame) => self.inbound(frame).await,
            Err(e) => {
                error!("{}: {:?}", RelayError::Link, e);
                Some(RelayOutcome::LinkLost)
            }
        }
    }

    /// Envelope from the node process
    async fn outbound(&mut self, envelope: Envelope) -> Option<RelayOutcome> {
        debug!("Got message from node: {}", envelope);
        match route_outbound(envelope) {
            Outbound::Event(SystemEvent::FatalError) => {
                error!("Node lost its serial link");
                return Some(self.fail(DeviceState::VesnaError).await);
            }
            Outbound::Event(event) => {
                let transition = self.machine.apply(event);
                self.report(transition).await;
            }
            Outbound::Unsupported(envelope) => {
                warn!("Unsupported state {}", envelope.payload());
                self.raise_warning().await;
            }
            Outbound::Forward(envelope) => {
                self.send_tracked(envelope).await;
                self.stats.forwarded += 1;
            }
        }
        None
    }

    /// Frame from the broker
    async fn inbound(&mut self, frame: Frame) -> Option<RelayOutcome> {
        match route_inbound(frame) {
            Inbound::Acknowledged(sequence_id) => {
                if !self.retry.acknowledge(&sequence_id) {
                    debug!("Ack for {} with nothing pending", sequence_id);
                }
                None
            }
            Inbound::Command(command) => {
                info!("Received {} command", command);
                self.execute(command).await
            }
            Inbound::Unsupported(envelope) => {
                warn!("Unsupported command {}", envelope.payload());
                self.raise_warning().await;
                None
            }
            Inbound::Deliver(envelope) => {
                self.deliver(envelope);
                None
            }
        }
    }

    async fn execute(&mut self, command: OperatorCommand) -> Option<RelayOutcome> {
        match command {
            OperatorCommand::Exit => {
                info!("Closing the relay");
                return Some(RelayOutcome::Exit);
            }
            OperatorCommand::State => {
                // Immediate reply, not tracked for retry
                let report = Envelope::from(self.machine.state());
                if let Err(e) = self.link.transmit(&report).await {
                    warn!("State reply failed: {:?}", e);
                }
            }
            OperatorCommand::Flash => {
                let transition = self.machine.set(DeviceState::Compiling);
                self.report(transition).await;
                if let Err(e) = self.build().await {
                    error!("{}", e);
                    return Some(self.fail(DeviceState::CompileError).await);
                }
                info!("Application flashed, waiting for START_APP");
            }
            OperatorCommand::RestartApp => {
                self.deliver(Envelope::from(OperatorCommand::StopApp));
                Timer::after(self.config.restart_delay).await;
                self.deliver(Envelope::from(OperatorCommand::StartApp));
                if let Err(e) = self.reset.reset().await {
                    error!("Hardware reset failed: {:?}", e);
                }
            }
            OperatorCommand::StartApp | OperatorCommand::StopApp => {
                self.deliver(Envelope::from(command));
            }
        }
        None
    }

    async fn build(&mut self) -> Result<(), RelayError> {
        info!("Compile the application ...");
        if let Err(e) = self.toolchain.compile().await {
            debug!("Compile output: {:?}", e);
            return Err(RelayError::Compile);
        }
        info!("Flash the application ...");
        self.toolchain.flash().await.map_err(|e| {
            debug!("Flash output: {:?}", e);
            RelayError::Flash
        })
    }

    /// Push a command to the node process without blocking
    fn deliver(&mut self, envelope: Envelope) {
        match self.commands.try_send(envelope) {
            Ok(()) => self.stats.delivered += 1,
            Err(TrySendError::Full(envelope)) => {
                error!("{}, dropping {}", RelayError::QueueFull, envelope);
                self.stats.dropped += 1;
            }
        }
    }

    /// Transmit and keep retrying until acknowledged
    async fn send_tracked(&mut self, envelope: Envelope) {
        if let Err(e) = self.link.transmit(&envelope).await {
            warn!("Transmit of {} failed: {:?}", envelope, e);
        }
        if let Err(e) = self.retry.track(envelope, Instant::now()) {
            error!("{}, sent without acknowledgement tracking", e);
        }
    }

    /// Publish the state reached by a transition
    async fn report(&mut self, transition: Transition) {
        if !transition.is_expected() {
            debug!(
                "Transition {} -> {} is outside the lifecycle",
                transition.from, transition.to
            );
        }
        info!("State {}", transition.to);
        self.send_tracked(Envelope::from(transition.to)).await;
    }

    async fn raise_warning(&mut self) {
        self.stats.warnings += 1;
        let transition = self.machine.warn();
        self.report(transition).await;
        if let Some(restored) = self.machine.recover() {
            self.report(restored).await;
        }
    }

    /// Enter a fatal state and notify the broker before returning
    async fn fail(&mut self, state: DeviceState) -> RelayOutcome {
        self.machine.set(state);
        // The exit notification doubles as the state report
        if let Err(e) = self.notify_exit(state.as_str()).await {
            warn!("{}, forcing exit", e);
        }
        RelayOutcome::Fatal(self.machine.state())
    }

    async fn retry_pass(&mut self) {
        if self.retry.is_empty() {
            return;
        }
        for action in self.retry.poll(Instant::now()) {
            match action {
                RetryAction::Resend(envelope) => {
                    debug!("Resending {}", envelope);
                    self.stats.retransmissions += 1;
                    if let Err(e) = self.link.transmit(&envelope).await {
                        warn!("Retransmit of {} failed: {:?}", envelope, e);
                    }
                }
                RetryAction::Expired(failure) => {
                    error!(
                        "{}: [{}] dropped after {} retries",
                        RelayError::Transport,
                        failure.sequence_id,
                        failure.retries
                    );
                    self.stats.delivery_failures += 1;
                }
            }
        }
    }
}
