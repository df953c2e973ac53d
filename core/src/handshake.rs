//! Blocking handshakes with the broker
//!
//! The sync handshake runs once before the relay loop; the exit handshake
//! runs once on a fatal condition. Both transmit a system envelope and wait
//! a bounded time for its acknowledgement. Frames that are not the awaited
//! ack are kept in the relay backlog and routed when the loop resumes.
//!
//! Once the backlog is full the handshake stops reading the link, so later
//! frames stay queued on the link side and are not lost.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{with_timeout, Duration, Instant, Timer};
use hal_abstractions::{ResetLine, Toolchain};
use log::{debug, info, warn};

use crate::envelope::{Envelope, Frame};
use crate::error::RelayError;
use crate::link::BrokerLink;
use crate::relay::Relay;

/// Sync request payload
pub const SYNC: &str = "SYNC";

/// How a handshake ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    Acknowledged,
    TimedOut,
    LinkFailed,
}

impl<M, L, T, R> Relay<'_, M, L, T, R>
where
    M: RawMutex,
    L: BrokerLink,
    T: Toolchain,
    R: ResetLine,
{
    /// Announce the node to the broker and wait for confirmation
    ///
    /// # Errors
    ///
    /// - `RelayError::SyncTimeout` if no ack arrives within the sync timeout
    /// - `RelayError::Link` if the link fails or closes while waiting
    pub(crate) async fn sync(&mut self) -> Result<(), RelayError> {
        let request = Envelope::system_literal(SYNC);
        match self.handshake(&request, self.config.sync_timeout).await {
            Handshake::Acknowledged => {
                info!("Synced with broker");
                Ok(())
            }
            Handshake::TimedOut => Err(RelayError::SyncTimeout),
            Handshake::LinkFailed => Err(RelayError::Link),
        }
    }

    /// Tell the broker why the relay is going down
    ///
    /// # Errors
    ///
    /// `RelayError::ExitTimeout` if no ack arrives within the exit timeout,
    /// `RelayError::Link` if the link is gone. The caller terminates either way.
    pub(crate) async fn notify_exit(&mut self, reason: &'static str) -> Result<(), RelayError> {
        let notice = Envelope::system_literal(reason);
        match self.handshake(&notice, self.config.exit_timeout).await {
            Handshake::Acknowledged => Ok(()),
            Handshake::TimedOut => Err(RelayError::ExitTimeout),
            Handshake::LinkFailed => Err(RelayError::Link),
        }
    }

    /// Transmit `envelope` and wait for its ack until `timeout` elapses
    async fn handshake(&mut self, envelope: &Envelope, timeout: Duration) -> Handshake {
        if let Err(e) = self.link.transmit(envelope).await {
            warn!("Transmit of {} failed: {:?}", envelope, e);
            return Handshake::LinkFailed;
        }

        let deadline = Instant::now() + timeout;
        loop {
            if self.backlog.is_full() {
                warn!(
                    "Handshake backlog full, leaving frames on the link until [{}] times out",
                    envelope.sequence_id()
                );
                Timer::at(deadline).await;
                return Handshake::TimedOut;
            }

            let now = Instant::now();
            if now >= deadline {
                return Handshake::TimedOut;
            }
            let frame = match with_timeout(deadline - now, self.link.receive()).await {
                Ok(Ok(frame)) => frame,
                Ok(Err(e)) => {
                    warn!("Link failed while waiting for [{}]: {:?}", envelope.sequence_id(), e);
                    return Handshake::LinkFailed;
                }
                Err(_) => return Handshake::TimedOut,
            };

            match frame {
                Frame::Ack(id) => {
                    self.retry.acknowledge(&id);
                    if id.as_str() == envelope.sequence_id() {
                        return Handshake::Acknowledged;
                    }
                }
                frame => {
                    // Checked for room at the top of the loop
                    if self.backlog.push_back(frame).is_ok() {
                        debug!("Deferred a frame until the handshake completes");
                    }
                }
            }
        }
    }
}
