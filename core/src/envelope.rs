//! Envelopes and inbound frames
//!
//! An [`Envelope`] is the unit carried on both the local queues and the
//! broker link: a sequence id plus a text payload. The sequence id `"-1"`
//! ([`SYSTEM_SEQUENCE_ID`]) addresses the node controller itself; every other
//! id is an experiment correlation id that the relay never interprets.
//!
//! Both fields are fixed-capacity `heapless` strings so envelopes can move
//! through `embassy-sync` channels without allocation.

use heapless::String;

use crate::error::EnvelopeError;

/// Maximum sequence id length in bytes
pub const SEQUENCE_ID_LEN: usize = 16;

/// Maximum payload length in bytes
pub const PAYLOAD_LEN: usize = 256;

/// Reserved sequence id for system (controller) messages
pub const SYSTEM_SEQUENCE_ID: &str = "-1";

/// Sequence id storage
pub type SequenceId = String<SEQUENCE_ID_LEN>;

/// Payload storage
pub type Payload = String<PAYLOAD_LEN>;

/// Broker-facing message class, derived from the sequence id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Kind {
    /// Addressed to the node controller (`sequence_id == "-1"`)
    System,
    /// Opaque experiment traffic
    Experiment,
}

/// Sequence id plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Envelope {
    sequence_id: SequenceId,
    payload: Payload,
}

impl Envelope {
    /// Build an envelope, rejecting fields that exceed their capacity
    ///
    /// # Example
    ///
    /// ```
    /// use lgtc_core::{Envelope, Kind};
    ///
    /// let env = Envelope::new("42", "LINES").unwrap();
    /// assert_eq!(env.kind(), Kind::Experiment);
    /// ```
    pub fn new(sequence_id: &str, payload: &str) -> Result<Self, EnvelopeError> {
        Ok(Self {
            sequence_id: sequence_id_from(sequence_id)?,
            payload: Payload::try_from(payload).map_err(|_| EnvelopeError::PayloadTooLong)?,
        })
    }

    /// Build a system envelope (`sequence_id == "-1"`)
    pub fn system(payload: &str) -> Result<Self, EnvelopeError> {
        Self::new(SYSTEM_SEQUENCE_ID, payload)
    }

    pub fn sequence_id(&self) -> &str {
        self.sequence_id.as_str()
    }

    pub fn payload(&self) -> &str {
        self.payload.as_str()
    }

    pub fn kind(&self) -> Kind {
        if self.is_system() {
            Kind::System
        } else {
            Kind::Experiment
        }
    }

    pub fn is_system(&self) -> bool {
        self.sequence_id.as_str() == SYSTEM_SEQUENCE_ID
    }

    /// System envelope for a fixed vocabulary word
    ///
    /// Every literal the relay sends (state names, commands, `SYNC`) is far
    /// shorter than `PAYLOAD_LEN`.
    pub(crate) fn system_literal(payload: &'static str) -> Self {
        Self::system(payload).expect("vocabulary word should fit")
    }

    /// Split into owned sequence id and payload
    pub fn into_parts(self) -> (SequenceId, Payload) {
        (self.sequence_id, self.payload)
    }
}

impl core::fmt::Display for Envelope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}, {}]", self.sequence_id, self.payload)
    }
}

/// One decoded item received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
    /// Acknowledgement for a previously transmitted sequence id
    Ack(SequenceId),
    /// System or experiment command
    Message(Envelope),
}

impl Frame {
    /// Build an acknowledgement frame
    pub fn ack(sequence_id: &str) -> Result<Self, EnvelopeError> {
        Ok(Self::Ack(sequence_id_from(sequence_id)?))
    }
}

/// Validate and copy a sequence id
pub fn sequence_id_from(value: &str) -> Result<SequenceId, EnvelopeError> {
    if value.is_empty() {
        return Err(EnvelopeError::EmptySequenceId);
    }
    SequenceId::try_from(value).map_err(|_| EnvelopeError::SequenceIdTooLong)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_kind() {
        let env = Envelope::system("START_APP").unwrap();
        assert!(env.is_system());
        assert_eq!(env.kind(), Kind::System);
        assert_eq!(env.sequence_id(), "-1");
        assert_eq!(env.payload(), "START_APP");
    }

    #[test]
    fn test_experiment_ids_are_opaque() {
        // Only the exact "-1" tag is special
        for id in ["42", "-2", "-10", "1", "sys"] {
            let env = Envelope::new(id, "LINES").unwrap();
            assert_eq!(env.kind(), Kind::Experiment);
        }
    }

    #[test]
    fn test_capacity_limits() {
        let long_id = "0123456789abcdefX";
        assert_eq!(
            Envelope::new(long_id, "x"),
            Err(EnvelopeError::SequenceIdTooLong)
        );
        assert_eq!(Envelope::new("", "x"), Err(EnvelopeError::EmptySequenceId));

        let mut payload = std::string::String::new();
        for _ in 0..=PAYLOAD_LEN {
            payload.push('a');
        }
        assert_eq!(
            Envelope::new("1", &payload),
            Err(EnvelopeError::PayloadTooLong)
        );
        assert!(Envelope::new("1", &payload[..PAYLOAD_LEN]).is_ok());
    }

    #[test]
    fn test_display() {
        let env = Envelope::new("7", "SEC").unwrap();
        assert_eq!(std::format!("{}", env), "[7, SEC]");
    }

    #[test]
    fn test_ack_frame() {
        assert_eq!(
            Frame::ack("-1").unwrap(),
            Frame::Ack(SequenceId::try_from("-1").unwrap())
        );
    }
}
