//! Broker transport
//!
//! - **`broker`**: `TcpBrokerLink`, the [`lgtc_core::BrokerLink`] used on the node
//! - **`codec`**: line framing for envelopes and acknowledgements
//! - **`error`**: codec and socket errors

pub mod broker;
pub mod codec;
pub mod error;

pub use broker::{InboundQueue, TcpBrokerLink};
pub use error::LinkError;
