//! Platform-agnostic core of the LGTC node relay
//!
//! This crate contains the relay between a node's experiment supervisor and
//! the testbed broker: envelopes, the device lifecycle state machine,
//! acknowledgement tracking with bounded retry, and the relay loop itself.
//! It has NO hardware or operating system dependencies; the transport,
//! toolchain and reset line are injected through traits.
//!
//! # Example
//! ```
//! use lgtc_core::{Envelope, Kind};
//!
//! let report = Envelope::system("RUNNING").unwrap();
//! assert_eq!(report.kind(), Kind::System);
//! assert_eq!(report.sequence_id(), "-1");
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]
#![allow(async_fn_in_trait)]

pub mod command;
pub mod config;
pub mod envelope;
pub mod error;
mod handshake;
pub mod link;
pub mod relay;
pub mod retry;
pub mod router;
pub mod state;

#[cfg(test)]
mod mock;

pub use command::{OperatorCommand, SystemEvent};
pub use config::{RelayConfig, SyncPolicy, WarningPolicy};
pub use envelope::{Envelope, Frame, Kind, SYSTEM_SEQUENCE_ID};
pub use error::{EnvelopeError, RelayError};
pub use link::BrokerLink;
pub use relay::{
    CommandSender, EventReceiver, LocalQueue, Relay, RelayOutcome, RelayStats, RunFlag,
    QUEUE_DEPTH,
};
pub use retry::RetryManager;
pub use state::{DeviceState, StateMachine};
