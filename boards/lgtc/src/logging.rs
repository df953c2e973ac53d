//! Log output for the node controller
//!
//! Events go to stderr and to a per-node log file. `RUST_LOG` overrides the
//! configured level. Records from `lgtc-core`, which logs through the `log`
//! facade, are bridged into the same subscriber.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::error::BoardError;

/// Build the filter: `RUST_LOG` if set, else `level`
pub fn filter(level: &str) -> Result<EnvFilter, BoardError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| BoardError::Logging(e.to_string())),
    }
}

/// Install the global subscriber
pub fn init(level: &str, log_file: &Path) -> Result<(), BoardError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|source| BoardError::File {
            path: log_file.display().to_string(),
            source,
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter(level)?)
        .with_ansi(false)
        .with_target(true)
        .with_writer(std::io::stderr.and(Mutex::new(file)))
        .try_init()
        .map_err(|e| BoardError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_directives() {
        assert!(filter("debug,lgtc_core=trace").is_ok());
    }

    #[test]
    fn test_filter_rejects_garbage() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(matches!(filter("lgtc=notalevel"), Err(BoardError::Logging(_))));
        }
    }
}
