//! VESNA build toolchain
//!
//! Compiling and flashing are two `make` invocations in the application
//! directory:
//!
//! 1. `make <app> -j2`
//! 2. `make <app>.logatec3`
//!
//! Each runs on its own thread and hands completion back through a
//! `Signal`. The relay waits for the build, but the supervisor keeps
//! reading VESNA on the same executor meanwhile.

use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::thread;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use hal_abstractions::Toolchain;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ToolchainError {
    /// `make` could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// `make` exited unsuccessfully
    #[error("`{program} {target}` failed with {status}")]
    Failed {
        program: String,
        target: String,
        status: ExitStatus,
    },
}

type Completion = Signal<CriticalSectionRawMutex, Result<(), ToolchainError>>;

/// `make`-driven toolchain for one application
pub struct MakeToolchain {
    program: String,
    app_path: PathBuf,
    app_name: String,
}

impl MakeToolchain {
    pub fn new(app_path: PathBuf, app_name: &str) -> Self {
        Self::with_program("make", app_path, app_name)
    }

    /// Use another build program with the same arguments
    pub fn with_program(program: &str, app_path: PathBuf, app_name: &str) -> Self {
        Self {
            program: program.to_string(),
            app_path,
            app_name: app_name.to_string(),
        }
    }

    async fn make(&self, args: Vec<String>) -> Result<(), ToolchainError> {
        let done = Arc::new(Completion::new());
        let signal = done.clone();
        let program = self.program.clone();
        let dir = self.app_path.clone();

        info!(%program, ?args, dir = %dir.display(), "Running toolchain");
        let spawned = thread::Builder::new()
            .name("toolchain".into())
            .spawn(move || signal.signal(run(&program, &args, dir)));
        if let Err(source) = spawned {
            return Err(ToolchainError::Spawn {
                program: self.program.clone(),
                source,
            });
        }
        done.wait().await
    }
}

impl Toolchain for MakeToolchain {
    type Error = ToolchainError;

    async fn compile(&mut self) -> Result<(), Self::Error> {
        self.make(vec![self.app_name.clone(), "-j2".into()]).await
    }

    async fn flash(&mut self) -> Result<(), Self::Error> {
        self.make(vec![format!("{}.logatec3", self.app_name)]).await
    }
}

fn run(program: &str, args: &[String], dir: PathBuf) -> Result<(), ToolchainError> {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|source| ToolchainError::Spawn {
            program: program.to_string(),
            source,
        })?;

    debug!("{}", String::from_utf8_lossy(&output.stdout));
    if !output.stderr.is_empty() {
        warn!("{}", String::from_utf8_lossy(&output.stderr));
    }
    if output.status.success() {
        Ok(())
    } else {
        Err(ToolchainError::Failed {
            program: program.to_string(),
            target: args.first().cloned().unwrap_or_default(),
            status: output.status,
        })
    }
}
