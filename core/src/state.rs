//! Device lifecycle state machine
//!
//! ```text
//! OFFLINE -> ONLINE -> COMPILING -> { RUNNING, COMPILE_ERROR }
//! RUNNING -> { STOPPED, FINISHED, TIMEOUT }
//! any     -> WARNING
//! any     -> VESNA_ERROR (terminal)
//! ```
//!
//! Transitions are total: every [`SystemEvent`] maps to exactly one state
//! regardless of the current one. Edges outside the diagram are still taken
//! but flagged in the returned [`Transition`] so the relay can log them.
//! `VESNA_ERROR` absorbs every later event.

use crate::command::SystemEvent;
use crate::envelope::Envelope;

/// Node lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    /// Not yet synchronized with the microcontroller
    #[default]
    Offline,
    /// Online and ready
    Online,
    /// Compiling/flashing the experiment application
    Compiling,
    /// Experiment application is running
    Running,
    /// Operator stopped the experiment application
    Stopped,
    /// Experiment application came to its end
    Finished,
    /// Microcontroller not responding
    Timeout,
    /// Something was not as expected
    Warning,
    /// Experiment application could not be built or flashed
    CompileError,
    /// Serial link to the microcontroller failed
    VesnaError,
}

impl DeviceState {
    /// Name reported to the broker
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Online => "ONLINE",
            Self::Compiling => "COMPILING",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Finished => "FINISHED",
            Self::Timeout => "TIMEOUT",
            Self::Warning => "WARNING",
            Self::CompileError => "COMPILE_ERROR",
            Self::VesnaError => "VESNA_ERROR",
        }
    }

    /// State reached by a system event, independent of the current state
    pub fn from_event(event: SystemEvent) -> Self {
        match event {
            SystemEvent::StartApp => Self::Running,
            SystemEvent::StopApp => Self::Stopped,
            SystemEvent::Synced => Self::Online,
            SystemEvent::EndOfApp => Self::Finished,
            SystemEvent::Timeout => Self::Timeout,
            SystemEvent::FatalError => Self::VesnaError,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::VesnaError)
    }

    /// Whether `self -> next` is an edge of the lifecycle diagram
    pub fn expects(&self, next: DeviceState) -> bool {
        use DeviceState::*;

        if *self == next || matches!(next, Warning | VesnaError) {
            return true;
        }
        matches!(
            (*self, next),
            (Offline, Online)
                | (Online, Compiling)
                | (Compiling, Running | CompileError)
                | (Running, Stopped | Finished | Timeout)
                | (Warning, _)
        )
    }
}

impl core::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DeviceState> for Envelope {
    /// State report under the system sequence id
    fn from(state: DeviceState) -> Self {
        Envelope::system_literal(state.as_str())
    }
}

/// What to do with the previous state when a warning is raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WarningPolicy {
    /// WARNING overwrites the previous state and stays until the next event
    #[default]
    Latch,
    /// WARNING is reported, then the previous state is restored and reported
    Restore,
}

/// Result of a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transition {
    pub from: DeviceState,
    pub to: DeviceState,
}

impl Transition {
    /// Whether the edge is part of the lifecycle diagram
    pub fn is_expected(&self) -> bool {
        self.from.expects(self.to)
    }
}

/// Owner of the single [`DeviceState`] of a node
#[derive(Debug, Default)]
pub struct StateMachine {
    state: DeviceState,
    policy: WarningPolicy,
    before_warning: Option<DeviceState>,
}

impl StateMachine {
    pub fn new(policy: WarningPolicy) -> Self {
        Self {
            state: DeviceState::Offline,
            policy,
            before_warning: None,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Apply a system event reported by the node process
    pub fn apply(&mut self, event: SystemEvent) -> Transition {
        self.set(DeviceState::from_event(event))
    }

    /// Force a state (toolchain progress, fatal conditions)
    pub fn set(&mut self, next: DeviceState) -> Transition {
        let from = self.state;
        if !from.is_terminal() {
            self.state = next;
        }
        self.before_warning = None;
        Transition {
            from,
            to: self.state,
        }
    }

    /// Raise a warning
    pub fn warn(&mut self) -> Transition {
        let from = self.state;
        if from.is_terminal() {
            return Transition { from, to: from };
        }
        if self.policy == WarningPolicy::Restore && from != DeviceState::Warning {
            self.before_warning = Some(from);
        }
        self.state = DeviceState::Warning;
        Transition {
            from,
            to: DeviceState::Warning,
        }
    }

    /// Return to the pre-warning state under [`WarningPolicy::Restore`]
    ///
    /// Returns `None` when there is nothing to restore.
    pub fn recover(&mut self) -> Option<Transition> {
        let previous = self.before_warning.take()?;
        let from = self.state;
        self.state = previous;
        Some(Transition { from, to: previous })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS: [SystemEvent; 6] = [
        SystemEvent::StartApp,
        SystemEvent::StopApp,
        SystemEvent::Synced,
        SystemEvent::EndOfApp,
        SystemEvent::Timeout,
        SystemEvent::FatalError,
    ];

    const STATES: [DeviceState; 10] = [
        DeviceState::Offline,
        DeviceState::Online,
        DeviceState::Compiling,
        DeviceState::Running,
        DeviceState::Stopped,
        DeviceState::Finished,
        DeviceState::Timeout,
        DeviceState::Warning,
        DeviceState::CompileError,
        DeviceState::VesnaError,
    ];

    fn machine_in(state: DeviceState) -> StateMachine {
        let mut machine = StateMachine::new(WarningPolicy::Latch);
        machine.state = state;
        machine
    }

    #[test]
    fn test_initial_state_is_offline() {
        assert_eq!(StateMachine::default().state(), DeviceState::Offline);
    }

    #[test]
    fn test_event_table() {
        assert_eq!(DeviceState::from_event(SystemEvent::StartApp), DeviceState::Running);
        assert_eq!(DeviceState::from_event(SystemEvent::StopApp), DeviceState::Stopped);
        assert_eq!(DeviceState::from_event(SystemEvent::Synced), DeviceState::Online);
        assert_eq!(DeviceState::from_event(SystemEvent::EndOfApp), DeviceState::Finished);
        assert_eq!(DeviceState::from_event(SystemEvent::Timeout), DeviceState::Timeout);
        assert_eq!(
            DeviceState::from_event(SystemEvent::FatalError),
            DeviceState::VesnaError
        );
    }

    #[test]
    fn test_transitions_are_total_and_deterministic() {
        for from in STATES {
            for event in EVENTS {
                let first = machine_in(from).apply(event);
                let second = machine_in(from).apply(event);
                assert_eq!(first, second);
                assert_eq!(first.from, from);
                if from.is_terminal() {
                    assert_eq!(first.to, DeviceState::VesnaError);
                } else {
                    assert_eq!(first.to, DeviceState::from_event(event));
                }
            }
        }
    }

    #[test]
    fn test_lifecycle_edges() {
        assert!(DeviceState::Offline.expects(DeviceState::Online));
        assert!(DeviceState::Compiling.expects(DeviceState::Running));
        assert!(DeviceState::Running.expects(DeviceState::Finished));
        assert!(DeviceState::Stopped.expects(DeviceState::Warning));
        assert!(!DeviceState::Offline.expects(DeviceState::Running));
        assert!(!DeviceState::Finished.expects(DeviceState::Online));
    }

    #[test]
    fn test_vesna_error_is_terminal() {
        let mut machine = machine_in(DeviceState::Running);
        machine.apply(SystemEvent::FatalError);
        assert_eq!(machine.state(), DeviceState::VesnaError);

        machine.apply(SystemEvent::Synced);
        machine.warn();
        machine.set(DeviceState::Compiling);
        assert_eq!(machine.state(), DeviceState::VesnaError);
    }

    #[test]
    fn test_latched_warning_forgets_previous_state() {
        let mut machine = machine_in(DeviceState::Running);
        let t = machine.warn();
        assert_eq!(t.to, DeviceState::Warning);
        assert_eq!(machine.recover(), None);
        assert_eq!(machine.state(), DeviceState::Warning);
    }

    #[test]
    fn test_restored_warning_returns_to_previous_state() {
        let mut machine = StateMachine::new(WarningPolicy::Restore);
        machine.apply(SystemEvent::Synced);
        machine.apply(SystemEvent::StartApp);

        machine.warn();
        assert_eq!(machine.state(), DeviceState::Warning);

        let t = machine.recover().unwrap();
        assert_eq!(t.from, DeviceState::Warning);
        assert_eq!(t.to, DeviceState::Running);
        assert_eq!(machine.state(), DeviceState::Running);
        assert_eq!(machine.recover(), None);
    }

    #[test]
    fn test_state_report_envelope() {
        let env = Envelope::from(DeviceState::CompileError);
        assert!(env.is_system());
        assert_eq!(env.payload(), "COMPILE_ERROR");
    }
}
