//! Fusion request orchestration.
//!
//! One `analyze()` per user action: read the sensor snapshot, send one request,
//! apply the response to the display state. Concurrent calls are rejected while
//! a request is outstanding so responses are applied in submission order.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::{FusionRequest, FusionService};
use crate::emotion::{EmotionVector, NO_FACE_LABEL};
use crate::history::History;

/// Overall analyze status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnalyzeStatus {
    Ready,
    AwaitingInput,
    Analyzing,
    AdaptiveMode,
    Error,
}

impl AnalyzeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzeStatus::Ready => "Ready",
            AnalyzeStatus::AwaitingInput => "Awaiting input",
            AnalyzeStatus::Analyzing => "Analyzing",
            AnalyzeStatus::AdaptiveMode => "Adaptive mode",
            AnalyzeStatus::Error => "Error",
        }
    }
}

impl fmt::Display for AnalyzeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest values from both sensors at the moment of the user action
#[derive(Debug, Clone, Default)]
pub struct SensorSnapshot {
    pub text: String,
    pub face: Option<EmotionVector>,
}

/// A fused estimate ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionResult {
    pub fused_label: String,
    pub fused_scores: EmotionVector,
    pub text_label: String,
    /// "Unavailable" when the service had no face signal
    pub face_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FusionOutcome {
    /// Nothing to analyze; no request was sent
    AwaitingInput,
    /// Another request is still outstanding; no request was sent
    Busy,
    Failed,
    Fused(FusionResult),
}

/// What the presentation layer renders
#[derive(Debug, Clone, Serialize)]
pub struct DisplayState {
    pub status: AnalyzeStatus,
    pub result: Option<FusionResult>,
    pub history: History,
}

impl DisplayState {
    fn new(history: History) -> Self {
        Self {
            status: AnalyzeStatus::Ready,
            result: None,
            history,
        }
    }
}

/// Clears the in-flight flag when the request finishes or is dropped
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FusionOrchestrator {
    service: Arc<dyn FusionService>,
    in_flight: AtomicBool,
    display: Mutex<DisplayState>,
}

impl FusionOrchestrator {
    pub fn new(service: Arc<dyn FusionService>, history: History) -> Self {
        Self {
            service,
            in_flight: AtomicBool::new(false),
            display: Mutex::new(DisplayState::new(history)),
        }
    }

    /// Run one fusion cycle for the given snapshot.
    ///
    /// Failures of any kind leave the previous result and history untouched and
    /// only set the status to "Error".
    pub async fn analyze(&self, snapshot: SensorSnapshot) -> FusionOutcome {
        let text = snapshot.text.trim();
        if text.is_empty() {
            debug!("Analyze requested with empty text");
            self.display().status = AnalyzeStatus::AwaitingInput;
            return FusionOutcome::AwaitingInput;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Fusion request already in flight, rejecting analyze");
            return FusionOutcome::Busy;
        }
        let _guard = InFlightGuard(&self.in_flight);

        self.display().status = AnalyzeStatus::Analyzing;
        let request = FusionRequest::new(text, snapshot.face.as_ref());

        let response = match self.service.analyze(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Fusion analyze failed: {}", e);
                self.display().status = AnalyzeStatus::Error;
                return FusionOutcome::Failed;
            }
        };

        let result = FusionResult {
            fused_label: response.fused_label,
            fused_scores: response.fused_scores,
            text_label: response.text_label,
            face_label: response
                .face_label
                .unwrap_or_else(|| NO_FACE_LABEL.to_string()),
        };

        info!(
            "Fused label: {} (text: {}, face: {})",
            result.fused_label, result.text_label, result.face_label
        );

        let mut display = self.display();
        display.history.push(&result.fused_label, text);
        display.result = Some(result.clone());
        display.status = AnalyzeStatus::AdaptiveMode;

        FusionOutcome::Fused(result)
    }

    /// Copy of the current display state
    pub fn display_state(&self) -> DisplayState {
        self.display().clone()
    }

    pub fn status(&self) -> AnalyzeStatus {
        self.display().status
    }

    pub fn is_analyzing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn display(&self) -> MutexGuard<'_, DisplayState> {
        // Recover from poisoning; the state is replaced wholesale
        self.display.lock().unwrap_or_else(|e| e.into_inner())
    }
}
