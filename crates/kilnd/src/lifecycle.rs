//! Firing lifecycle state machine.
//!
//! Session boundaries are detected from the hardware's `state` field: a
//! transition fires only when the observed state differs from the previously
//! observed one, so a controller re-sending its current state cannot open or
//! close sessions twice. The machine is pure - it maps an observed state to
//! a list of actions and never touches I/O - which keeps the transition
//! table testable on its own.

use kiln_core::SessionStatus;
use kiln_protocol::inbound::STARTING_STATE;

/// Coordinator-facing phase of the firing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No firing session is open.
    Idle,
    /// A firing session is open and recording events.
    Active,
}

/// An effect the coordinator must apply after observing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Open a new session.
    StartSession,
    /// Record the observed message in the current session.
    RecordEvent,
    /// Finalize the current session with the given status.
    FinishSession(SessionStatus),
}

/// The state machine: current phase plus the previously observed state.
#[derive(Debug)]
pub struct FiringLifecycle {
    phase: SessionPhase,
    last_state: Option<String>,
}

impl FiringLifecycle {
    /// Starts idle, with no state yet observed.
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            last_state: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Observes a message's `state` field and returns the actions to apply.
    ///
    /// Rules:
    /// - No `state` field: no actions (such messages never touch history).
    /// - Idle + state changed to `STARTING`: start a session, then record
    ///   the triggering message as its first event.
    /// - Active + state changed to a terminal value: finish the session.
    ///   The terminal message itself is NOT recorded - finalization happens
    ///   instead of recording (see DESIGN.md for this policy choice).
    /// - Active + any other state-bearing message: record it, whether or
    ///   not the state changed. Repetition suppresses transitions only.
    pub fn observe(&mut self, state: Option<&str>) -> Vec<LifecycleAction> {
        let Some(state) = state else {
            return Vec::new();
        };

        let changed = self.last_state.as_deref() != Some(state);
        self.last_state = Some(state.to_string());

        if changed {
            match self.phase {
                SessionPhase::Idle => {
                    if state == STARTING_STATE {
                        self.phase = SessionPhase::Active;
                        return vec![LifecycleAction::StartSession, LifecycleAction::RecordEvent];
                    }
                    Vec::new()
                }
                SessionPhase::Active => {
                    if let Some(status) = SessionStatus::from_terminal_state(state) {
                        self.phase = SessionPhase::Idle;
                        return vec![LifecycleAction::FinishSession(status)];
                    }
                    vec![LifecycleAction::RecordEvent]
                }
            }
        } else if self.phase == SessionPhase::Active {
            vec![LifecycleAction::RecordEvent]
        } else {
            Vec::new()
        }
    }
}

impl Default for FiringLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starting_opens_session_and_records_trigger() {
        let mut lifecycle = FiringLifecycle::new();

        let actions = lifecycle.observe(Some("STARTING"));
        assert_eq!(
            actions,
            vec![LifecycleAction::StartSession, LifecycleAction::RecordEvent]
        );
        assert_eq!(lifecycle.phase(), SessionPhase::Active);
    }

    #[test]
    fn test_full_firing_cycle_records_three_events() {
        let mut lifecycle = FiringLifecycle::new();
        let mut recorded = 0;
        let mut finished = None;

        for state in ["STARTING", "RUNNING", "RUNNING", "COMPLETED"] {
            for action in lifecycle.observe(Some(state)) {
                match action {
                    LifecycleAction::RecordEvent => recorded += 1,
                    LifecycleAction::FinishSession(status) => finished = Some(status),
                    LifecycleAction::StartSession => {}
                }
            }
        }

        // STARTING, RUNNING, RUNNING recorded; the COMPLETED message only finalizes
        assert_eq!(recorded, 3);
        assert_eq!(finished, Some(SessionStatus::Completed));
        assert_eq!(lifecycle.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_repeated_state_still_records_but_cannot_retransition() {
        let mut lifecycle = FiringLifecycle::new();
        lifecycle.observe(Some("STARTING"));

        // A re-sent STARTING is recorded but does not re-open anything
        let actions = lifecycle.observe(Some("STARTING"));
        assert_eq!(actions, vec![LifecycleAction::RecordEvent]);
        assert_eq!(lifecycle.phase(), SessionPhase::Active);
    }

    #[test]
    fn test_repeated_terminal_state_is_inert() {
        let mut lifecycle = FiringLifecycle::new();
        lifecycle.observe(Some("STARTING"));
        lifecycle.observe(Some("ABORTED"));

        let actions = lifecycle.observe(Some("ABORTED"));
        assert!(actions.is_empty());
        assert_eq!(lifecycle.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_terminal_state_while_idle_is_ignored() {
        let mut lifecycle = FiringLifecycle::new();

        let actions = lifecycle.observe(Some("EMERGENCY_STOP"));
        assert!(actions.is_empty());
        assert_eq!(lifecycle.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_running_while_idle_does_not_open_session() {
        // Typical after a daemon restart mid-firing: no STARTING was seen
        let mut lifecycle = FiringLifecycle::new();

        let actions = lifecycle.observe(Some("RUNNING"));
        assert!(actions.is_empty());
        assert_eq!(lifecycle.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_missing_state_never_acts() {
        let mut lifecycle = FiringLifecycle::new();
        assert!(lifecycle.observe(None).is_empty());

        lifecycle.observe(Some("STARTING"));
        assert!(lifecycle.observe(None).is_empty());
        assert_eq!(lifecycle.phase(), SessionPhase::Active);
    }

    #[test]
    fn test_each_terminal_status_maps_through() {
        for (state, status) in [
            ("COMPLETED", SessionStatus::Completed),
            ("ABORTED", SessionStatus::Aborted),
            ("EMERGENCY_STOP", SessionStatus::EmergencyStop),
        ] {
            let mut lifecycle = FiringLifecycle::new();
            lifecycle.observe(Some("STARTING"));
            let actions = lifecycle.observe(Some(state));
            assert_eq!(actions, vec![LifecycleAction::FinishSession(status)]);
        }
    }

    #[test]
    fn test_new_cycle_can_start_after_completion() {
        let mut lifecycle = FiringLifecycle::new();
        lifecycle.observe(Some("STARTING"));
        lifecycle.observe(Some("COMPLETED"));

        let actions = lifecycle.observe(Some("STARTING"));
        assert_eq!(
            actions,
            vec![LifecycleAction::StartSession, LifecycleAction::RecordEvent]
        );
        assert_eq!(lifecycle.phase(), SessionPhase::Active);
    }
}
