//! Node controller errors

use thiserror::Error;

use crate::network::LinkError;

/// Errors that stop the controller before or outside the relay loop
#[derive(Debug, Error)]
pub enum BoardError {
    /// Node identifier does not fit in a node name
    #[error("node identifier {0:?} is too long")]
    NodeIdTooLong(String),
    /// Log filter or subscriber setup failed
    #[error("logging setup failed: {0}")]
    Logging(String),
    /// Broker connection failed
    #[error(transparent)]
    Link(#[from] LinkError),
    /// Serial device could not be opened
    #[error("serial device {device}: {source}")]
    Serial {
        device: String,
        #[source]
        source: serialport::Error,
    },
    /// Result or log file error
    #[error("file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Thread or process spawn failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
