//! Envelope classification
//!
//! The router decides what an envelope *is*; the relay decides what to do
//! about it. Each direction has its own closed route set so every case is
//! visible to an exhaustive `match` in the relay.
//!
//! | direction | sequence id | payload            | route                    |
//! |-----------|-------------|--------------------|--------------------------|
//! | outbound  | `-1`        | known event        | [`Outbound::Event`]      |
//! | outbound  | `-1`        | anything else      | [`Outbound::Unsupported`]|
//! | outbound  | other       | any                | [`Outbound::Forward`]    |
//! | inbound   | ack         | -                  | [`Inbound::Acknowledged`]|
//! | inbound   | `-1`        | known command      | [`Inbound::Command`]     |
//! | inbound   | `-1`        | anything else      | [`Inbound::Unsupported`] |
//! | inbound   | other       | any                | [`Inbound::Deliver`]     |

use crate::command::{OperatorCommand, SystemEvent};
use crate::envelope::{Envelope, Frame, SequenceId};

/// Route for an envelope coming from the local node process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Lifecycle event for the state machine
    Event(SystemEvent),
    /// System envelope with an unknown payload
    Unsupported(Envelope),
    /// Experiment response, forward to the broker unchanged
    Forward(Envelope),
}

/// Route for a frame coming from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Acknowledgement, only clears retry bookkeeping
    Acknowledged(SequenceId),
    /// Operator command for the relay
    Command(OperatorCommand),
    /// System envelope with an unknown payload
    Unsupported(Envelope),
    /// Experiment command, deliver to the node process unchanged
    Deliver(Envelope),
}

/// Classify an envelope from the local event queue
pub fn route_outbound(envelope: Envelope) -> Outbound {
    if !envelope.is_system() {
        return Outbound::Forward(envelope);
    }
    match envelope.payload().parse::<SystemEvent>() {
        Ok(event) => Outbound::Event(event),
        Err(_) => Outbound::Unsupported(envelope),
    }
}

/// Classify a frame from the broker
pub fn route_inbound(frame: Frame) -> Inbound {
    let envelope = match frame {
        Frame::Ack(sequence_id) => return Inbound::Acknowledged(sequence_id),
        Frame::Message(envelope) => envelope,
    };
    if !envelope.is_system() {
        return Inbound::Deliver(envelope);
    }
    match envelope.payload().parse::<OperatorCommand>() {
        Ok(command) => Inbound::Command(command),
        Err(_) => Inbound::Unsupported(envelope),
    }
}
