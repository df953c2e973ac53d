//! VESNA experiment supervisor
//!
//! The supervisor is the node process on the far side of the relay's local
//! queues. It owns the serial link to VESNA and the result file, turns
//! operator commands into serial commands, and reports the application's
//! lifecycle back to the relay as system events.
//!
//! ## Serial protocol
//!
//! | line | meaning |
//! |---|---|
//! | `&<seconds>` | run duration, sent once at startup |
//! | `>` | start the application |
//! | `=` | stop the application |
//! | anything else | experiment command; VESNA's next line is the reply |
//!
//! Replies are matched to commands in order: with several commands in flight,
//! the first line VESNA sends answers the oldest one.
//!
//! ## Timers
//!
//! While the application runs, no serial output for `silence_timeout`
//! reports `TIMEOUT` and reaching `duration` reports `END_OF_APP`. Both end
//! the run until the next `START_APP`.

use std::io::Write;

use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_time::{Duration, Instant, Timer};
use heapless::Deque;
use lgtc_core::envelope::{SequenceId, PAYLOAD_LEN};
use lgtc_core::{Envelope, OperatorCommand, RunFlag, SystemEvent, QUEUE_DEPTH};
use tracing::{debug, error, info, warn};

use crate::results::ResultFile;
use crate::serial::{SerialEvent, LINE_DEPTH};

/// Experiment command answered with the stored line count
pub const LINES: &str = "LINES";
/// Experiment command answered with the elapsed run time
pub const SEC: &str = "SEC";

const START: &str = ">";
const STOP: &str = "=";

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Run time announced to VESNA and enforced here
    pub duration: Duration,
    /// Longest serial silence tolerated while running
    pub silence_timeout: Duration,
    /// Upper bound on how long one step waits for input
    pub tick: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(60 * 60),
            silence_timeout: Duration::from_secs(60),
            tick: Duration::from_secs(1),
        }
    }
}

/// Why the supervisor returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Run flag cleared
    Stopped,
    /// Serial link to VESNA lost; `FATAL_ERROR` was reported
    SerialLost,
}

pub struct Supervisor<'a, M, W, F>
where
    M: RawMutex,
{
    config: SupervisorConfig,
    vesna: W,
    results: ResultFile<F>,
    events: Sender<'a, M, Envelope, QUEUE_DEPTH>,
    commands: Receiver<'a, M, Envelope, QUEUE_DEPTH>,
    lines: Receiver<'a, M, SerialEvent, LINE_DEPTH>,
    running: &'a RunFlag,
    started_at: Option<Instant>,
    last_line_at: Instant,
    awaiting_reply: Deque<SequenceId, QUEUE_DEPTH>,
}

impl<'a, M, W, F> Supervisor<'a, M, W, F>
where
    M: RawMutex,
    W: Write,
    F: Write,
{
    pub fn new(
        config: SupervisorConfig,
        vesna: W,
        results: ResultFile<F>,
        events: Sender<'a, M, Envelope, QUEUE_DEPTH>,
        commands: Receiver<'a, M, Envelope, QUEUE_DEPTH>,
        lines: Receiver<'a, M, SerialEvent, LINE_DEPTH>,
        running: &'a RunFlag,
    ) -> Self {
        Self {
            config,
            vesna,
            results,
            events,
            commands,
            lines,
            running,
            started_at: None,
            last_line_at: Instant::now(),
            awaiting_reply: Deque::new(),
        }
    }

    /// Announce the run, then supervise until stopped or VESNA is lost
    pub async fn run(&mut self) -> SupervisorExit {
        if !self.start().await {
            return SupervisorExit::SerialLost;
        }
        while self.running.is_running() {
            if !self.step().await {
                return SupervisorExit::SerialLost;
            }
        }
        SupervisorExit::Stopped
    }

    /// Send the run duration to VESNA and report `SYNCED`
    async fn start(&mut self) -> bool {
        let announce = format!("&{}", self.config.duration.as_secs());
        if !self.send_vesna(&announce).await {
            return false;
        }
        info!("Synced with VESNA");
        self.emit(SystemEvent::Synced).await;
        true
    }

    /// Wait for one command, serial line or tick
    ///
    /// Returns `false` once the serial link is gone.
    async fn step(&mut self) -> bool {
        let keep_going = match select3(
            self.commands.receive(),
            self.lines.receive(),
            Timer::after(self.config.tick),
        )
        .await
        {
            Either3::First(command) => self.command(command).await,
            Either3::Second(SerialEvent::Line(line)) => self.line(line).await,
            Either3::Second(SerialEvent::Closed) => {
                error!("VESNA serial link closed");
                self.lost().await;
                false
            }
            Either3::Third(()) => true,
        };
        if keep_going {
            self.check_deadlines().await;
        }
        keep_going
    }

    async fn command(&mut self, envelope: Envelope) -> bool {
        if envelope.is_system() {
            return match envelope.payload().parse::<OperatorCommand>() {
                Ok(OperatorCommand::StartApp) => self.start_app().await,
                Ok(OperatorCommand::StopApp) => self.stop_app().await,
                _ => {
                    warn!("Ignoring system command {}", envelope);
                    true
                }
            };
        }

        let (sequence_id, payload) = envelope.into_parts();
        match payload.as_str() {
            LINES => {
                let reply = format!("Stored {} lines", self.results.stored());
                self.reply(&sequence_id, &reply).await;
                true
            }
            SEC => {
                let elapsed = self.started_at.map_or(0, |t| t.elapsed().as_secs());
                let reply = format!("{elapsed} seconds");
                self.reply(&sequence_id, &reply).await;
                true
            }
            other => {
                if let Err(e) = self.results.store_note(other) {
                    warn!("Result file write failed: {}", e);
                }
                if let Err(sequence_id) = self.awaiting_reply.push_back(sequence_id) {
                    warn!("Too many commands awaiting VESNA, [{}] gets no reply", sequence_id);
                }
                self.send_vesna(other).await
            }
        }
    }

    async fn start_app(&mut self) -> bool {
        if !self.send_vesna(START).await {
            return false;
        }
        let now = Instant::now();
        self.started_at = Some(now);
        self.last_line_at = now;
        info!("Application started");
        self.emit(SystemEvent::StartApp).await;
        true
    }

    async fn stop_app(&mut self) -> bool {
        if !self.send_vesna(STOP).await {
            return false;
        }
        self.started_at = None;
        info!("Application stopped");
        self.emit(SystemEvent::StopApp).await;
        true
    }

    async fn line(&mut self, line: String) -> bool {
        self.last_line_at = Instant::now();
        if let Some(sequence_id) = self.awaiting_reply.pop_front() {
            if let Err(e) = self.results.store_note(&line) {
                warn!("Result file write failed: {}", e);
            }
            self.reply(&sequence_id, &line).await;
            return true;
        }
        if let Err(e) = self.results.store_line(&line) {
            warn!("Result file write failed: {}", e);
        }
        true
    }

    async fn check_deadlines(&mut self) {
        let Some(started_at) = self.started_at else {
            return;
        };
        if started_at.elapsed() >= self.config.duration {
            info!("Application finished after {} s", self.config.duration.as_secs());
            self.started_at = None;
            self.emit(SystemEvent::EndOfApp).await;
        } else if self.last_line_at.elapsed() >= self.config.silence_timeout {
            warn!("No output from VESNA for {} s", self.config.silence_timeout.as_secs());
            self.started_at = None;
            self.emit(SystemEvent::Timeout).await;
        }
    }

    async fn send_vesna(&mut self, line: &str) -> bool {
        debug!(line, "-> VESNA");
        let written = writeln!(self.vesna, "{line}").and_then(|()| self.vesna.flush());
        if let Err(e) = written {
            error!("VESNA serial write failed: {}", e);
            self.lost().await;
            return false;
        }
        true
    }

    async fn reply(&mut self, sequence_id: &str, text: &str) {
        let text = truncate(text, PAYLOAD_LEN);
        match Envelope::new(sequence_id, text) {
            Ok(reply) => self.events.send(reply).await,
            Err(e) => warn!("Dropping reply for [{}]: {}", sequence_id, e),
        }
    }

    async fn emit(&mut self, event: SystemEvent) {
        self.events.send(event_envelope(event)).await;
    }

    async fn lost(&mut self) {
        self.started_at = None;
        self.emit(SystemEvent::FatalError).await;
    }
}

/// Report a serial link that could not be opened at all
pub async fn report_serial_lost<M: RawMutex>(events: Sender<'_, M, Envelope, QUEUE_DEPTH>) {
    events.send(event_envelope(SystemEvent::FatalError)).await;
}

fn event_envelope(event: SystemEvent) -> Envelope {
    // Event names are a few bytes, far below the payload capacity
    Envelope::system(event.as_str()).expect("event name should fit")
}

/// Longest prefix of `text` that fits in `max` bytes on a char boundary
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
