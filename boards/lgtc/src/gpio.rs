//! VESNA reset line over sysfs GPIO
//!
//! The reset pin is driven through the legacy sysfs interface: export the
//! pin (already exported is fine), make it an output, then pulse it low.

use std::fs;
use std::io;
use std::path::PathBuf;

use embassy_time::{Duration, Timer};
use hal_abstractions::ResetLine;
use tracing::{debug, info};

/// Default sysfs GPIO root
pub const SYSFS_GPIO: &str = "/sys/class/gpio";

/// How long the line is held low
const PULSE: Duration = Duration::from_millis(10);

pub struct SysfsReset {
    root: PathBuf,
    pin: u32,
}

impl SysfsReset {
    pub fn new(pin: u32) -> Self {
        Self::with_root(PathBuf::from(SYSFS_GPIO), pin)
    }

    pub fn with_root(root: PathBuf, pin: u32) -> Self {
        Self { root, pin }
    }

    fn pin_file(&self, name: &str) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin)).join(name)
    }
}

impl ResetLine for SysfsReset {
    type Error = io::Error;

    async fn reset(&mut self) -> Result<(), Self::Error> {
        if let Err(e) = fs::write(self.root.join("export"), self.pin.to_string()) {
            debug!(pin = self.pin, "GPIO export: {}", e);
        }
        fs::write(self.pin_file("direction"), "out")?;
        fs::write(self.pin_file("value"), "0")?;
        Timer::after(PULSE).await;
        fs::write(self.pin_file("value"), "1")?;
        info!(pin = self.pin, "VESNA reset");
        Ok(())
    }
}
