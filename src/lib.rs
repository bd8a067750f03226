//! Multimodal emotion fusion.
//!
//! Speech transcript + face expression scores go to a fusion service, which
//! answers with one combined emotion estimate.

pub mod app;
pub mod config;
pub mod emotion;
pub mod face;
pub mod fusion;
pub mod history;
pub mod speech;

pub use app::{FusionApp, HostCapabilities, StatusLine};
pub use config::Config;
pub use emotion::{EmotionLabel, EmotionVector, ScoreMap};
pub use fusion::{FusionClient, FusionOrchestrator, FusionOutcome, SensorSnapshot};
pub use history::{History, HistoryEntry};
