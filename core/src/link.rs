//! Broker link abstraction
//!
//! The relay needs only two primitives from the transport: send an envelope,
//! and wait for the next decoded inbound frame. Acknowledgement tracking,
//! handshakes and retry live in the relay, not in the link.

use crate::envelope::{Envelope, Frame};

/// Transport to the central broker
///
/// # Cancel safety
///
/// [`BrokerLink::receive`] is raced against the local queue and the retry
/// timer with `select`, and dropped when another branch wins. Implementations
/// must not lose a frame when the future is dropped before completion.
///
/// # Example Implementation
/// ```ignore
/// struct LoopbackLink { inbound: Deque<Frame, 8> }
///
/// impl BrokerLink for LoopbackLink {
///     type Error = ();
///     async fn transmit(&mut self, envelope: &Envelope) -> Result<(), ()> {
///         Ok(())
///     }
///     async fn receive(&mut self) -> Result<Frame, ()> {
///         // pop the next queued frame, or wait
///     }
/// }
/// ```
pub trait BrokerLink {
    /// Transport error
    type Error: core::fmt::Debug;

    /// Send one envelope (fire and forget)
    async fn transmit(&mut self, envelope: &Envelope) -> Result<(), Self::Error>;

    /// Wait for the next inbound frame
    ///
    /// An error means the link is gone; the relay stops.
    async fn receive(&mut self) -> Result<Frame, Self::Error>;
}
