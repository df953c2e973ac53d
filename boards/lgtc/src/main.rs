#![deny(unsafe_code)]
//! LGTC node controller
//!
//! Runs two cooperative tasks on one executor thread:
//!
//! - the relay (`lgtc-core`), talking to the broker over TCP
//! - the VESNA experiment supervisor, talking to the serial port
//!
//! They share only the two local queues and the run flag. The relay's
//! outcome ends the process: status 0 after an operator EXIT, 1 after any
//! fatal condition.

use core::pin::pin;

use clap::Parser;
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use lgtc_core::{LocalQueue, Relay, RelayOutcome, RunFlag};
use tracing::{error, info, warn};

mod config;
mod device_id;
mod error;
mod gpio;
mod logging;
mod monitor;
mod network;
mod results;
mod serial;
mod toolchain;

use config::NodeConfig;
use error::BoardError;
use gpio::SysfsReset;
use monitor::{Supervisor, SupervisorExit};
use network::{InboundQueue, TcpBrokerLink};
use results::ResultFile;
use serial::{LineQueue, SerialPort};
use toolchain::MakeToolchain;

static RUN: RunFlag = RunFlag::new();
static EVENTS: LocalQueue<CriticalSectionRawMutex> = Channel::new();
static COMMANDS: LocalQueue<CriticalSectionRawMutex> = Channel::new();
static BROKER_INBOUND: InboundQueue = Channel::new();
static SERIAL_LINES: LineQueue = Channel::new();

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let config = NodeConfig::parse();
    let code = match run(config).await {
        Ok(outcome) if !outcome.is_fatal() => 0,
        Ok(_) => 1,
        Err(e) => {
            // Setup can fail before the subscriber exists
            if tracing::dispatcher::has_been_set() {
                error!("{}", e);
            } else {
                eprintln!("lgtc: {e}");
            }
            1
        }
    };
    std::process::exit(code);
}

async fn run(config: NodeConfig) -> Result<RelayOutcome, BoardError> {
    let node = config.node_name()?;
    std::fs::create_dir_all(&config.results_dir)?;
    logging::init(&config.log_level, &config.log_path(&node))?;
    info!(
        node = %node,
        app = config.app_name(),
        minutes = config.duration_min,
        "Testing application"
    );

    let results = ResultFile::open(&config.results_path(&node))?;
    let link = TcpBrokerLink::connect(&config.broker, &node, &BROKER_INBOUND)?;
    let toolchain = MakeToolchain::new(config.app_path(), config.app_name());
    let reset = SysfsReset::new(config.reset_gpio);

    let mut relay = Relay::new(
        config.relay_config(),
        link,
        toolchain,
        reset,
        EVENTS.receiver(),
        COMMANDS.sender(),
        &RUN,
    );

    let supervisor_task = async {
        let port = match SerialPort::open(&config.serial, config.baud, &SERIAL_LINES) {
            Ok(port) => port,
            Err(e) => {
                error!("Couldn't connect to VESNA: {}", e);
                monitor::report_serial_lost(EVENTS.sender()).await;
                return;
            }
        };
        let mut supervisor = Supervisor::new(
            config.supervisor_config(),
            port,
            results,
            EVENTS.sender(),
            COMMANDS.receiver(),
            SERIAL_LINES.receiver(),
            &RUN,
        );
        if supervisor.run().await == SupervisorExit::SerialLost {
            warn!("Supervisor stopped: VESNA lost");
        }
    };

    // The relay decides when the node is done; the supervisor is dropped
    // mid-step if it is still running at that point
    let outcome = {
        let mut relay_task = pin!(relay.run());
        match select(relay_task.as_mut(), supervisor_task).await {
            Either::First(outcome) => outcome,
            Either::Second(()) => relay_task.await,
        }
    };
    info!(?outcome, stats = ?relay.stats(), "Node controller finished");
    Ok(outcome)
}
