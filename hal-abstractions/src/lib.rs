//! Hardware abstraction traits for LGTC testbed nodes
//!
//! This crate defines traits that abstract over the hardware attached to a
//! gateway: the toolchain that builds and flashes the experiment image onto
//! the VESNA board, and the line that hard-resets it. Board crates implement
//! these traits; the relay in `lgtc-core` only sees the traits.

#![no_std]
#![deny(unsafe_code)]
#![deny(warnings)]
#![allow(async_fn_in_trait)]

pub mod reset;
pub mod toolchain;

pub use reset::ResetLine;
pub use toolchain::Toolchain;
