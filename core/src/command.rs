//! Closed command vocabularies
//!
//! System traffic (`sequence_id == "-1"`) carries one of two fixed
//! vocabularies depending on its direction:
//!
//! - [`SystemEvent`]: reported by the supervised node process, travels
//!   local → broker and drives the device state machine;
//! - [`OperatorCommand`]: issued by the remote operator, travels
//!   broker → local and is executed by the relay.
//!
//! Parsing is the only place payload strings are compared. Everything after
//! it matches on these enums.

use core::str::FromStr;

use crate::envelope::Envelope;
use crate::error::RelayError;

/// Lifecycle event reported by the supervised node process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemEvent {
    /// Experiment application started
    StartApp,
    /// Experiment application stopped on request
    StopApp,
    /// Serial link to the microcontroller is synchronized
    Synced,
    /// Experiment application reached its end
    EndOfApp,
    /// Microcontroller stopped responding
    Timeout,
    /// Serial link to the microcontroller is down
    FatalError,
}

impl SystemEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartApp => "START_APP",
            Self::StopApp => "STOP_APP",
            Self::Synced => "SYNCED",
            Self::EndOfApp => "END_OF_APP",
            Self::Timeout => "TIMEOUT",
            Self::FatalError => "FATAL_ERROR",
        }
    }
}

impl FromStr for SystemEvent {
    type Err = RelayError;

    /// Parse an event payload
    ///
    /// The older monitor names (`SYNCED_WITH_VESNA`, `VESNA_TIMEOUT`,
    /// `VESNA_ERR`) are still accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "START_APP" => Ok(Self::StartApp),
            "STOP_APP" => Ok(Self::StopApp),
            "SYNCED" | "SYNCED_WITH_VESNA" => Ok(Self::Synced),
            "END_OF_APP" => Ok(Self::EndOfApp),
            "TIMEOUT" | "VESNA_TIMEOUT" => Ok(Self::Timeout),
            "FATAL_ERROR" | "VESNA_ERR" => Ok(Self::FatalError),
            _ => Err(RelayError::UnsupportedCommand),
        }
    }
}

impl core::fmt::Display for SystemEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command issued by the remote operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatorCommand {
    /// Terminate the relay
    Exit,
    /// Report the current device state
    State,
    /// Compile and flash the experiment application
    Flash,
    /// Stop, restart and hard-reset the experiment application
    RestartApp,
    /// Start the experiment application (handled by the node process)
    StartApp,
    /// Stop the experiment application (handled by the node process)
    StopApp,
}

impl OperatorCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exit => "EXIT",
            Self::State => "STATE",
            Self::Flash => "FLASH",
            Self::RestartApp => "RESTART_APP",
            Self::StartApp => "START_APP",
            Self::StopApp => "STOP_APP",
        }
    }
}

impl FromStr for OperatorCommand {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXIT" => Ok(Self::Exit),
            "STATE" => Ok(Self::State),
            "FLASH" => Ok(Self::Flash),
            "RESTART_APP" => Ok(Self::RestartApp),
            "START_APP" => Ok(Self::StartApp),
            "STOP_APP" => Ok(Self::StopApp),
            _ => Err(RelayError::UnsupportedCommand),
        }
    }
}

impl core::fmt::Display for OperatorCommand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<OperatorCommand> for Envelope {
    /// Command addressed to the node process under the system sequence id
    fn from(command: OperatorCommand) -> Self {
        Envelope::system_literal(command.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_event_names_round_trip() {
        let events = [
            SystemEvent::StartApp,
            SystemEvent::StopApp,
            SystemEvent::Synced,
            SystemEvent::EndOfApp,
            SystemEvent::Timeout,
            SystemEvent::FatalError,
        ];
        for event in events {
            assert_eq!(event.as_str().parse::<SystemEvent>(), Ok(event));
        }
    }

    #[test]
    fn test_legacy_event_aliases() {
        assert_eq!("SYNCED_WITH_VESNA".parse(), Ok(SystemEvent::Synced));
        assert_eq!("VESNA_TIMEOUT".parse(), Ok(SystemEvent::Timeout));
        assert_eq!("VESNA_ERR".parse(), Ok(SystemEvent::FatalError));
    }

    #[test]
    fn test_operator_commands() {
        assert_eq!("EXIT".parse(), Ok(OperatorCommand::Exit));
        assert_eq!("STATE".parse(), Ok(OperatorCommand::State));
        assert_eq!("FLASH".parse(), Ok(OperatorCommand::Flash));
        assert_eq!("RESTART_APP".parse(), Ok(OperatorCommand::RestartApp));
        assert_eq!("START_APP".parse(), Ok(OperatorCommand::StartApp));
        assert_eq!("STOP_APP".parse(), Ok(OperatorCommand::StopApp));
    }

    #[test]
    fn test_unknown_payloads_rejected() {
        assert_eq!(
            "SYNC".parse::<OperatorCommand>(),
            Err(RelayError::UnsupportedCommand)
        );
        assert_eq!(
            "state".parse::<OperatorCommand>(),
            Err(RelayError::UnsupportedCommand)
        );
        assert_eq!(
            "EXIT".parse::<SystemEvent>(),
            Err(RelayError::UnsupportedCommand)
        );
    }

    #[test]
    fn test_command_envelope_is_system() {
        let envelope = Envelope::from(OperatorCommand::StopApp);
        assert!(envelope.is_system());
        assert_eq!(envelope.payload(), "STOP_APP");
    }
}
