//! Text + face fusion.
//!
//! The fusion service combines the transcript and the latest face vector into
//! one emotion estimate. This module holds the wire types, the HTTP client, and
//! the orchestrator that drives one request per user action.

mod client;
mod orchestrator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::emotion::{EmotionVector, ScoreMap};

pub use client::FusionClient;
pub use orchestrator::{
    AnalyzeStatus, DisplayState, FusionOrchestrator, FusionOutcome, FusionResult, SensorSnapshot,
};

#[cfg(test)]
pub(crate) use orchestrator::test_support;

/// Fusion request failures. Both collapse to the same "Error" status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FusionError {
    #[error("Fusion service unreachable: {0}")]
    TransportFailure(String),

    #[error("Fusion service error: {0}")]
    ServiceError(String),
}

/// `POST /analyze` request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionRequest {
    pub text: String,
    /// Latest face vector, or `{}` when no face reading exists
    pub face_scores: ScoreMap,
}

impl FusionRequest {
    pub fn new(text: &str, face: Option<&EmotionVector>) -> Self {
        Self {
            text: text.to_string(),
            face_scores: face.map(EmotionVector::to_score_map).unwrap_or_default(),
        }
    }
}

/// Successful `/analyze` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResponse {
    pub fused_label: String,
    pub fused_scores: EmotionVector,
    pub text_label: String,
    #[serde(default)]
    pub face_label: Option<String>,
}

/// Error response body
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServiceErrorBody {
    pub error: String,
}

#[async_trait]
pub trait FusionService: Send + Sync {
    async fn analyze(&self, request: &FusionRequest) -> Result<FusionResponse, FusionError>;
}
