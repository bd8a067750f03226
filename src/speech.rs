//! Speech capture controller.
//!
//! Wraps a host speech-to-text engine. The controller owns the capture session
//! state machine (Idle → Listening → Idle, with Error reachable from Listening)
//! and the transcript of the current session. Engine callbacks arrive as
//! [`EngineEvent`]s over an unbounded channel and are applied in order. Each
//! event is tagged with the session number handed to the engine on start, so
//! callbacks from a superseded session are dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Speech capture error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpeechError {
    #[error("Speech recognition is not available on this host")]
    CapabilityUnavailable,
    #[error("Speech engine error: {0}")]
    Engine(String),
}

/// Options handed to the engine on every start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOptions {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
}

impl RecognitionOptions {
    pub fn for_language(language: &str) -> Self {
        Self {
            language: language.to_string(),
            continuous: true,
            interim_results: true,
        }
    }
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self::for_language("en-US")
    }
}

/// Host speech-to-text capability.
///
/// Implementations report progress by sending [`EngineEvent`]s on the channel
/// paired with the controller, tagged with the `session` passed to `start`.
pub trait SpeechEngine: Send {
    fn is_available(&self) -> bool;

    fn start(&mut self, options: &RecognitionOptions, session: u64) -> Result<(), SpeechError>;

    /// Ask the engine to finish; it confirms with [`SpeechEvent::End`]
    fn stop(&mut self);
}

/// Callbacks from the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started,
    /// A window of result segments; segments before `result_index` are
    /// already settled and not part of this delivery
    Result {
        result_index: usize,
        results: Vec<String>,
    },
    Error(String),
    End,
}

/// A [`SpeechEvent`] tagged with the session that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub session: u64,
    pub event: SpeechEvent,
}

impl EngineEvent {
    pub fn new(session: u64, event: SpeechEvent) -> Self {
        Self { session, event }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Idle,
    Listening,
    Error,
}

/// Human-readable microphone status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechStatus {
    Idle,
    Listening,
    MicError,
    Unsupported,
}

impl SpeechStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeechStatus::Idle => "Idle",
            SpeechStatus::Listening => "Listening",
            SpeechStatus::MicError => "Mic error",
            SpeechStatus::Unsupported => "Speech API unavailable",
        }
    }
}

impl fmt::Display for SpeechStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A session is already listening; the request was ignored
    AlreadyListening,
    Unsupported,
    Failed(SpeechError),
}

pub struct SpeechCapture {
    engine: Box<dyn SpeechEngine>,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    options: RecognitionOptions,
    /// Number of the latest session handed to the engine
    session: u64,
    state: CaptureState,
    status: SpeechStatus,
    transcript: String,
    stop_requested: bool,
    last_error: Option<String>,
    /// Unique capture session ID for log correlation
    session_id: Option<String>,
}

impl SpeechCapture {
    pub fn new(
        engine: Box<dyn SpeechEngine>,
        events: mpsc::UnboundedReceiver<EngineEvent>,
        options: RecognitionOptions,
    ) -> Self {
        let status = if engine.is_available() {
            SpeechStatus::Idle
        } else {
            SpeechStatus::Unsupported
        };

        Self {
            engine,
            events,
            options,
            session: 0,
            state: CaptureState::Idle,
            status,
            transcript: String::new(),
            stop_requested: false,
            last_error: None,
            session_id: None,
        }
    }

    /// Begin a capture session.
    ///
    /// Without a speech engine this is a no-op that reports "unsupported".
    /// A second start while listening is ignored. Starting from Error needs no
    /// prior cleanup.
    pub fn start(&mut self) -> StartOutcome {
        if !self.engine.is_available() {
            warn!("Speech recognition unavailable, ignoring start");
            self.status = SpeechStatus::Unsupported;
            return StartOutcome::Unsupported;
        }

        if self.state == CaptureState::Listening {
            debug!(
                "Speech capture already listening (session {:?}), ignoring start",
                self.session_id
            );
            return StartOutcome::AlreadyListening;
        }

        // Anything still queued from an earlier session is stale from here on
        self.session += 1;
        if let Err(e) = self.engine.start(&self.options, self.session) {
            self.fail(e.to_string());
            return StartOutcome::Failed(e);
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Speech capture transitioning to Listening (session {}, lang {})",
            session_id, self.options.language
        );
        self.state = CaptureState::Listening;
        self.status = SpeechStatus::Listening;
        self.transcript.clear();
        self.stop_requested = false;
        self.last_error = None;
        self.session_id = Some(session_id);
        StartOutcome::Started
    }

    /// Request graceful termination.
    ///
    /// The state stays Listening until the engine confirms with
    /// [`SpeechEvent::End`]. Without an active session this does nothing.
    pub fn stop(&mut self) {
        if self.state != CaptureState::Listening {
            debug!("Speech capture not listening, ignoring stop");
            return;
        }
        if self.stop_requested {
            return;
        }

        info!("Speech capture stop requested (session {:?})", self.session_id);
        self.stop_requested = true;
        self.engine.stop();
    }

    /// Apply one engine callback. Callbacks from a superseded session are
    /// dropped.
    pub fn handle_event(&mut self, event: EngineEvent) {
        if event.session != self.session {
            debug!(
                "Dropping {:?} from stale session {} (current {})",
                event.event, event.session, self.session
            );
            return;
        }

        match event.event {
            SpeechEvent::Started => {
                if self.state == CaptureState::Listening {
                    self.status = SpeechStatus::Listening;
                }
            }
            SpeechEvent::Result {
                result_index,
                results,
            } => {
                if self.state != CaptureState::Listening {
                    debug!("Dropping recognition result outside a listening session");
                    return;
                }
                let window = results.get(result_index..).unwrap_or_default();
                self.transcript = window.concat().trim().to_string();
                debug!(
                    "Transcript updated: {} chars from {} segments",
                    self.transcript.len(),
                    window.len()
                );
            }
            SpeechEvent::Error(message) => {
                if self.state == CaptureState::Listening {
                    self.fail(message);
                }
            }
            SpeechEvent::End => {
                if self.state == CaptureState::Idle {
                    return;
                }
                info!("Speech capture ended (session {:?})", self.session_id);
                self.state = CaptureState::Idle;
                self.status = SpeechStatus::Idle;
                self.stop_requested = false;
                self.session_id = None;
            }
        }
    }

    /// Apply every event already queued by the engine. Returns how many were
    /// applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next engine event and apply it. Returns `false` once the
    /// engine side of the channel is gone.
    pub async fn next_event(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Apply engine events until the engine side of the channel closes
    pub async fn run_events(&mut self) {
        while self.next_event().await {}
        debug!("Speech event channel closed");
    }

    /// Replace the transcript with typed text
    pub fn set_transcript(&mut self, text: &str) {
        self.transcript = text.to_string();
    }

    fn fail(&mut self, message: String) {
        warn!("Speech capture error: {}", message);
        self.state = CaptureState::Error;
        self.status = SpeechStatus::MicError;
        self.stop_requested = false;
        self.last_error = Some(message);
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn status(&self) -> SpeechStatus {
        self.status
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_listening(&self) -> bool {
        self.state == CaptureState::Listening
    }
}
