//! Application shell.
//!
//! `FusionApp` owns one speech controller, one face sensor, and the fusion
//! orchestrator, and exposes the user actions a front end wires to its buttons.
//! Every failure is converted into a status string here; nothing propagates to
//! the caller.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::face::{Camera, FaceDetector, FaceReading, FaceSensor, ModelLoader};
use crate::fusion::{
    DisplayState, FusionClient, FusionError, FusionOrchestrator, FusionOutcome, FusionService,
    SensorSnapshot,
};
use crate::history::History;
use crate::speech::{EngineEvent, RecognitionOptions, SpeechCapture, SpeechEngine, StartOutcome};

/// Capabilities supplied by the host environment
pub struct HostCapabilities {
    pub speech_engine: Box<dyn SpeechEngine>,
    pub speech_events: mpsc::UnboundedReceiver<EngineEvent>,
    pub camera: Arc<dyn Camera>,
    pub face_detector: Arc<dyn FaceDetector>,
}

/// The three status lines shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub speech: String,
    pub face: String,
    pub analyze: String,
}

pub struct FusionApp {
    speech: SpeechCapture,
    face: FaceSensor,
    orchestrator: Arc<FusionOrchestrator>,
}

impl FusionApp {
    pub fn new(config: &Config, host: HostCapabilities, service: Arc<dyn FusionService>) -> Self {
        let speech = SpeechCapture::new(
            host.speech_engine,
            host.speech_events,
            RecognitionOptions::for_language(&config.language),
        );

        let models = Arc::new(ModelLoader::new(host.face_detector, &config.face_model_source));
        let face = FaceSensor::new(host.camera, models, config.face_poll_interval());

        let history = History::with_limits(config.history_capacity, config.history_text_limit);
        let orchestrator = Arc::new(FusionOrchestrator::new(service, history));

        info!(
            "Fusion app ready (lang {}, poll {}ms)",
            config.language, config.face_poll_interval_ms
        );

        Self {
            speech,
            face,
            orchestrator,
        }
    }

    /// Build an app that talks to the configured fusion service over HTTP
    pub fn with_http_service(config: &Config, host: HostCapabilities) -> Result<Self, FusionError> {
        let client = FusionClient::new(&config.service_url, config.request_timeout())?;
        Ok(Self::new(config, host, Arc::new(client)))
    }

    pub fn start_mic(&mut self) -> StartOutcome {
        self.speech.start()
    }

    pub fn stop_mic(&mut self) {
        self.speech.stop();
    }

    /// Apply queued speech engine events
    pub fn pump_speech(&mut self) -> usize {
        self.speech.pump()
    }

    /// Typed input replaces the transcript
    pub fn set_text(&mut self, text: &str) {
        self.speech.set_transcript(text);
    }

    /// Start the camera. Failures only show up in the face status.
    pub async fn start_camera(&mut self) {
        if let Err(e) = self.face.start().await {
            warn!("Camera start failed: {}", e);
        }
    }

    pub fn stop_camera(&mut self) {
        self.face.stop();
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            text: self.speech.transcript().to_string(),
            face: self.face.latest_vector(),
        }
    }

    /// Fuse the current transcript and face reading
    pub async fn analyze(&self) -> FusionOutcome {
        self.orchestrator.analyze(self.snapshot()).await
    }

    pub fn status_line(&self) -> StatusLine {
        StatusLine {
            speech: self.speech.status().to_string(),
            face: self.face.status().to_string(),
            analyze: self.orchestrator.status().to_string(),
        }
    }

    pub fn display_state(&self) -> DisplayState {
        self.orchestrator.display_state()
    }

    pub fn face_reading(&self) -> FaceReading {
        self.face.reading()
    }

    pub fn speech(&self) -> &SpeechCapture {
        &self.speech
    }

    pub fn face(&self) -> &FaceSensor {
        &self.face
    }

    /// Shared handle for driving analysis from another task
    pub fn orchestrator(&self) -> Arc<FusionOrchestrator> {
        self.orchestrator.clone()
    }
}
