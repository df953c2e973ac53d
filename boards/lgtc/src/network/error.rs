//! Broker link error types

use lgtc_core::EnvelopeError;
use thiserror::Error;

/// Frame decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Blank line on the wire
    #[error("empty frame")]
    Empty,
    /// First field is not a known frame tag
    #[error("unknown frame tag {0:?}")]
    UnknownTag(String),
    /// Too few tab-separated fields for the tag
    #[error("missing field in {0} frame")]
    MissingField(&'static str),
    /// `SYS` frame with a sequence id other than `-1`
    #[error("system frame with sequence id {0:?}")]
    NotSystem(String),
    /// Fields exceed envelope capacity
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Broker link errors
#[derive(Debug, Error)]
pub enum LinkError {
    /// Socket error on connect, read or write
    #[error("broker socket: {0}")]
    Io(#[from] std::io::Error),
    /// Broker closed the connection
    #[error("broker closed the connection")]
    Closed,
}
