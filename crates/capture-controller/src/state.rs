//! Capture phase state machine and display state

use object_detection::DetectionOutcome;
use serde::Serialize;

/// Stage of the capture state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    Capturing,
    Classifying,
    Resolved,
}

/// External events driving the phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// User pressed capture
    Trigger,
    /// Still frame arrived from the camera
    FrameReady,
    /// Classification finished
    OutcomeReady,
    /// Capture, decode or detection failed, or the request timed out
    Failed,
}

impl Phase {
    /// Next phase for `event`, or `None` if the event does not apply here
    ///
    /// A trigger while a request is in flight returns `None`.
    pub fn on(self, event: PhaseEvent) -> Option<Phase> {
        match (self, event) {
            (Phase::Idle, PhaseEvent::Trigger) => Some(Phase::Capturing),
            (Phase::Resolved, PhaseEvent::Trigger) => Some(Phase::Capturing),
            (Phase::Capturing, PhaseEvent::FrameReady) => Some(Phase::Classifying),
            (Phase::Classifying, PhaseEvent::OutcomeReady) => Some(Phase::Resolved),
            (Phase::Capturing | Phase::Classifying, PhaseEvent::Failed) => Some(Phase::Resolved),
            _ => None,
        }
    }

    /// A request is running
    pub fn is_in_flight(self) -> bool {
        matches!(self, Phase::Capturing | Phase::Classifying)
    }
}

/// Everything the display layer renders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiState {
    pub phase: Phase,
    /// Outcome of the last successful request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DetectionOutcome>,
    /// Transient message from the last failed request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Request that produced this state (0 before the first trigger)
    pub request_id: u64,
}
