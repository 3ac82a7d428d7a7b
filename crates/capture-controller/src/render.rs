//! Display text derived from the UI state

use crate::state::{Phase, UiState};

/// Capture button caption
pub fn button_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "Capture",
        Phase::Capturing | Phase::Classifying => "Processing...",
        Phase::Resolved => "Capture Again",
    }
}

/// Capture button is disabled while a request runs
pub fn button_enabled(phase: Phase) -> bool {
    !phase.is_in_flight()
}

/// Result panel text
pub fn result_text(state: &UiState) -> String {
    match state.phase {
        Phase::Idle => return "Ready to capture. Press the button below.".to_string(),
        Phase::Capturing | Phase::Classifying => return "Processing...".to_string(),
        Phase::Resolved => {}
    }

    if let Some(error) = &state.error {
        return format!("Capture failed: {}", error);
    }

    let Some(outcome) = &state.outcome else {
        return "No object detected. Try again.".to_string();
    };
    let Some(top) = &outcome.top else {
        return "No object detected. Try again.".to_string();
    };

    let heading = if outcome.matched {
        "Target Object Found!"
    } else {
        "Object Detected (Not a Target)"
    };
    format!(
        "{heading}\nLabel: {label}\nScore: {score:.2}%\nCategory: {label}",
        label = top.label(),
        score = top.score() * 100.0
    )
}
