//! Finite state machine for cluster scaling status.
//!
//! Each pass compares the desired replica count with the current member
//! count and derives an event; the transition table maps (status, event) to
//! the next status.
//!
//! ```text
//! Ready ──ScaleUpDetected──▶ ScalingUp ──ScaleUpComplete (all ready)──▶ Ready
//! Ready ──ScaleDownDetected─▶ ScalingDown ──ScaleDownComplete─────────▶ Ready
//! ```
//!
//! A direction change mid-scale moves straight between the scaling states.

use std::fmt;

use crate::crd::ClusterStatus;

/// Events that trigger status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterEvent {
    /// Desired replicas above current members
    ScaleUpDetected,
    /// Desired replicas below current members
    ScaleDownDetected,
    /// Members match desired after scaling up
    ScaleUpComplete,
    /// Members match desired after scaling down
    ScaleDownComplete,
    /// Members match desired and nothing is in flight
    Steady,
}

impl fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterEvent::ScaleUpDetected => write!(f, "ScaleUpDetected"),
            ClusterEvent::ScaleDownDetected => write!(f, "ScaleDownDetected"),
            ClusterEvent::ScaleUpComplete => write!(f, "ScaleUpComplete"),
            ClusterEvent::ScaleDownComplete => write!(f, "ScaleDownComplete"),
            ClusterEvent::Steady => write!(f, "Steady"),
        }
    }
}

/// Counts observed during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionContext {
    /// Replica count the user asked for
    pub desired: i32,
    /// Replica count currently configured
    pub current: i32,
    /// Nodes observed ready
    pub ready: i32,
}

impl TransitionContext {
    /// Create a new transition context
    pub fn new(desired: i32, current: i32, ready: i32) -> Self {
        Self {
            desired,
            current,
            ready,
        }
    }

    /// Check if every desired node is ready
    pub fn all_ready(&self) -> bool {
        self.ready == self.desired
    }
}

/// A state transition definition
#[derive(Debug)]
pub struct Transition {
    /// Source state
    pub from: ClusterStatus,
    /// Target state
    pub to: ClusterStatus,
    /// Event that triggers this transition
    pub event: ClusterEvent,
    /// Human-readable description of this transition
    pub description: &'static str,
}

impl Transition {
    const fn new(
        from: ClusterStatus,
        to: ClusterStatus,
        event: ClusterEvent,
        description: &'static str,
    ) -> Self {
        Self {
            from,
            to,
            event,
            description,
        }
    }
}

/// Result of attempting a state transition
#[derive(Debug)]
pub enum TransitionResult {
    /// Transition was successful
    Success {
        from: ClusterStatus,
        to: ClusterStatus,
        event: ClusterEvent,
        description: &'static str,
    },
    /// Transition was not valid for current state
    InvalidTransition {
        current: ClusterStatus,
        event: ClusterEvent,
    },
    /// Guard condition prevented the transition
    GuardFailed {
        from: ClusterStatus,
        to: ClusterStatus,
        event: ClusterEvent,
        reason: String,
    },
}

impl TransitionResult {
    /// The status after this result is applied to `current`.
    pub fn next_status(&self, current: ClusterStatus) -> ClusterStatus {
        match self {
            TransitionResult::Success { to, .. } => *to,
            _ => current,
        }
    }
}

/// Scaling status state machine
pub struct ClusterStateMachine {
    transitions: Vec<Transition>,
}

impl Default for ClusterStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterStateMachine {
    /// Create a new state machine with the defined transition table
    pub fn new() -> Self {
        use ClusterEvent::*;
        use ClusterStatus::{Ready, ScalingDown, ScalingUp};

        Self {
            transitions: vec![
                // Ready
                Transition::new(Ready, ScalingUp, ScaleUpDetected, "Scale up required"),
                Transition::new(Ready, ScalingDown, ScaleDownDetected, "Scale down required"),
                Transition::new(Ready, Ready, Steady, "Cluster size unchanged"),
                // ScalingUp
                Transition::new(ScalingUp, ScalingUp, ScaleUpDetected, "Waiting for replicas"),
                Transition::new(
                    ScalingUp,
                    ScalingDown,
                    ScaleDownDetected,
                    "Desired size dropped during scale up",
                ),
                Transition::new(ScalingUp, Ready, ScaleUpComplete, "Cluster scaled up"),
                // ScalingDown
                Transition::new(
                    ScalingDown,
                    ScalingDown,
                    ScaleDownDetected,
                    "Waiting for replicas to shrink",
                ),
                Transition::new(
                    ScalingDown,
                    ScalingUp,
                    ScaleUpDetected,
                    "Desired size grew during scale down",
                ),
                Transition::new(ScalingDown, Ready, ScaleDownComplete, "Cluster scaled down"),
            ],
        }
    }

    /// Attempt to transition to a new state based on an event
    pub fn transition(
        &self,
        current: ClusterStatus,
        event: ClusterEvent,
        ctx: &TransitionContext,
    ) -> TransitionResult {
        let transition = self
            .transitions
            .iter()
            .find(|t| t.from == current && t.event == event);

        match transition {
            Some(t) => {
                if let Some(reason) = self.check_guard(t, ctx) {
                    TransitionResult::GuardFailed {
                        from: t.from,
                        to: t.to,
                        event,
                        reason,
                    }
                } else {
                    TransitionResult::Success {
                        from: t.from,
                        to: t.to,
                        event,
                        description: t.description,
                    }
                }
            }
            None => TransitionResult::InvalidTransition { current, event },
        }
    }

    fn check_guard(&self, transition: &Transition, ctx: &TransitionContext) -> Option<String> {
        match (transition.from, transition.event) {
            // Scale-up is only done once every new node is observed ready
            (ClusterStatus::ScalingUp, ClusterEvent::ScaleUpComplete) if !ctx.all_ready() => {
                Some(format!(
                    "Not all nodes ready: {}/{}",
                    ctx.ready, ctx.desired
                ))
            }
            _ => None,
        }
    }
}

/// Determine the event for a pass from the prior status and counts.
pub fn determine_event(prior: ClusterStatus, ctx: &TransitionContext) -> ClusterEvent {
    if ctx.desired < ctx.current {
        return ClusterEvent::ScaleDownDetected;
    }
    if ctx.desired > ctx.current {
        return ClusterEvent::ScaleUpDetected;
    }
    match prior {
        ClusterStatus::ScalingDown => ClusterEvent::ScaleDownComplete,
        ClusterStatus::ScalingUp => ClusterEvent::ScaleUpComplete,
        ClusterStatus::Ready => ClusterEvent::Steady,
    }
}

/// Project the next status from the prior status and observed counts.
///
/// Pure: no I/O, no side effects.
///
/// ```
/// use valkey_slot_reconciler::controller::cluster_state_machine::project_status;
/// use valkey_slot_reconciler::crd::ClusterStatus;
///
/// assert_eq!(project_status(ClusterStatus::Ready, 5, 3, 3), ClusterStatus::ScalingUp);
/// assert_eq!(project_status(ClusterStatus::ScalingUp, 5, 5, 5), ClusterStatus::Ready);
/// ```
pub fn project_status(
    prior: ClusterStatus,
    desired: i32,
    current: i32,
    ready: i32,
) -> ClusterStatus {
    let ctx = TransitionContext::new(desired, current, ready);
    let event = determine_event(prior, &ctx);
    ClusterStateMachine::new()
        .transition(prior, event, &ctx)
        .next_status(prior)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::crd::ClusterStatus::{Ready, ScalingDown, ScalingUp};

    #[test]
    fn test_scale_up_detected() {
        assert_eq!(project_status(Ready, 5, 3, 3), ScalingUp);
    }

    #[test]
    fn test_scale_up_completes_when_all_ready() {
        assert_eq!(project_status(ScalingUp, 5, 5, 5), Ready);
    }

    #[test]
    fn test_scale_up_waits_for_ready_nodes() {
        assert_eq!(project_status(ScalingUp, 5, 5, 4), ScalingUp);
    }

    #[test]
    fn test_scale_down_detected_and_completed() {
        assert_eq!(project_status(Ready, 3, 5, 5), ScalingDown);
        assert_eq!(project_status(ScalingDown, 3, 3, 5), Ready);
    }

    #[test]
    fn test_direction_change() {
        assert_eq!(project_status(ScalingUp, 2, 5, 3), ScalingDown);
        assert_eq!(project_status(ScalingDown, 6, 5, 5), ScalingUp);
    }

    #[test]
    fn test_steady_ready_stays_ready() {
        assert_eq!(project_status(Ready, 3, 3, 2), Ready);
    }

    #[test]
    fn test_guard_failure_reports_reason() {
        let sm = ClusterStateMachine::new();
        let ctx = TransitionContext::new(5, 5, 3);
        match sm.transition(ScalingUp, ClusterEvent::ScaleUpComplete, &ctx) {
            TransitionResult::GuardFailed { reason, .. } => assert!(reason.contains("3/5")),
            other => panic!("expected guard failure, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_transition() {
        let sm = ClusterStateMachine::new();
        let ctx = TransitionContext::new(3, 3, 3);
        assert!(matches!(
            sm.transition(Ready, ClusterEvent::ScaleDownComplete, &ctx),
            TransitionResult::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_determine_event() {
        let ctx = TransitionContext::new(3, 3, 3);
        assert_eq!(determine_event(ScalingDown, &ctx), ClusterEvent::ScaleDownComplete);
        assert_eq!(determine_event(Ready, &ctx), ClusterEvent::Steady);
        let ctx = TransitionContext::new(4, 3, 3);
        assert_eq!(determine_event(Ready, &ctx), ClusterEvent::ScaleUpDetected);
    }
}
