//! Relay error types

/// Relay operation errors
///
/// None of these unwind the relay loop on their own. The loop decides per
/// variant whether to log and continue, force the `WARNING` state, or run
/// the exit handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RelayError {
    /// Startup SYNC was not acknowledged in time
    SyncTimeout,
    /// Exit notification was not acknowledged in time
    ExitTimeout,
    /// Retry budget exhausted for a sequence id
    Transport,
    /// Experiment application failed to compile
    Compile,
    /// Compiled image could not be flashed
    Flash,
    /// Payload not in the vocabulary for its direction
    UnsupportedCommand,
    /// Broker link failed or closed
    Link,
    /// Local command queue full, command dropped
    QueueFull,
    /// Too many messages awaiting acknowledgement
    RetryQueueFull,
}

impl core::fmt::Display for RelayError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SyncTimeout => write!(f, "Sync with broker timed out"),
            Self::ExitTimeout => write!(f, "Exit notification not acknowledged"),
            Self::Transport => write!(f, "Delivery failed after retries"),
            Self::Compile => write!(f, "Compile error"),
            Self::Flash => write!(f, "Flash error"),
            Self::UnsupportedCommand => write!(f, "Unsupported command"),
            Self::Link => write!(f, "Broker link error"),
            Self::QueueFull => write!(f, "Local queue full"),
            Self::RetryQueueFull => write!(f, "Retry queue full"),
        }
    }
}

impl core::error::Error for RelayError {}

/// Envelope construction errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnvelopeError {
    /// Sequence id longer than `SEQUENCE_ID_LEN`
    SequenceIdTooLong,
    /// Payload longer than `PAYLOAD_LEN`
    PayloadTooLong,
    /// Sequence id is empty
    EmptySequenceId,
}

impl core::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SequenceIdTooLong => write!(f, "Sequence id too long"),
            Self::PayloadTooLong => write!(f, "Payload too long"),
            Self::EmptySequenceId => write!(f, "Empty sequence id"),
        }
    }
}

impl core::error::Error for EnvelopeError {}
