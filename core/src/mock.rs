//! Scripted test doubles for the relay's collaborators

use std::collections::VecDeque;
use std::vec::Vec;

use embassy_time::{Duration, Timer};
use hal_abstractions::{ResetLine, Toolchain};

use crate::envelope::{Envelope, Frame};
use crate::link::BrokerLink;

/// Broker link fed from a script of inbound frames
///
/// `receive` never resolves once the script runs dry, like an idle broker.
/// With `hang_up` set, the first receive past the script reports a closed
/// link exactly once and later receives never resolve.
#[derive(Default)]
pub struct ScriptedLink {
    pub inbound: VecDeque<Frame>,
    pub sent: Vec<Envelope>,
    pub fail_transmit: bool,
    pub closed: bool,
    pub hang_up: bool,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            inbound: frames.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.inbound.push_back(frame);
    }

    /// Payloads of every transmitted envelope, in order
    pub fn payloads(&self) -> Vec<&str> {
        self.sent.iter().map(|e| e.payload()).collect()
    }
}

impl BrokerLink for ScriptedLink {
    type Error = &'static str;

    async fn transmit(&mut self, envelope: &Envelope) -> Result<(), Self::Error> {
        self.sent.push(envelope.clone());
        if self.fail_transmit {
            return Err("transmit failed");
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<Frame, Self::Error> {
        if self.closed {
            return Err("link closed");
        }
        match self.inbound.pop_front() {
            Some(frame) => Ok(frame),
            None if self.hang_up => {
                self.hang_up = false;
                Err("peer hung up")
            }
            None => core::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct MockToolchain {
    pub fail_compile: bool,
    pub fail_flash: bool,
    /// How long `compile` takes
    pub build_time: Duration,
    pub compiled: u32,
    pub flashed: u32,
}

impl Toolchain for MockToolchain {
    type Error = &'static str;

    async fn compile(&mut self) -> Result<(), Self::Error> {
        Timer::after(self.build_time).await;
        self.compiled += 1;
        if self.fail_compile {
            return Err("make exited with 2");
        }
        Ok(())
    }

    async fn flash(&mut self) -> Result<(), Self::Error> {
        self.flashed += 1;
        if self.fail_flash {
            return Err("loader exited with 1");
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockReset {
    pub resets: u32,
}

impl ResetLine for MockReset {
    type Error = &'static str;

    async fn reset(&mut self) -> Result<(), Self::Error> {
        self.resets += 1;
        Ok(())
    }
}
