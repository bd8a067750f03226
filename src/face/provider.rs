//! Host camera and face-detection collaborators.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::emotion::EmotionVector;

/// Errors that can occur while starting or running the face sensor
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FaceSensorError {
    #[error("Camera is not available on this host")]
    CapabilityUnavailable,

    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera is blocked by another application")]
    DeviceBlocked,

    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Failed to load face models: {0}")]
    ModelLoadFailure(String),

    #[error("Face detection failed: {0}")]
    Detection(String),
}

/// One video frame handed to the detector
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

/// Live camera stream. Shared between the sensor and its poll task.
pub trait VideoStream: Send + Sync {
    /// Latest decoded frame, or `None` while the stream is not ready yet
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Stop and release every track of the stream
    fn stop_tracks(&self);
}

#[async_trait]
pub trait Camera: Send + Sync {
    fn is_available(&self) -> bool;

    /// Acquire a video stream, prompting for permission if the host requires it
    async fn acquire(&self) -> Result<Arc<dyn VideoStream>, FaceSensorError>;
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn load_models(&self, source: &str) -> Result<(), FaceSensorError>;

    /// Detect a single face with expression scores. `Ok(None)` means no face
    /// in frame, which is a normal reading rather than an error.
    async fn detect_single_face(
        &self,
        frame: &VideoFrame,
    ) -> Result<Option<ExpressionScores>, FaceSensorError>;
}

/// Expression probabilities in the detector's native seven-way taxonomy
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpressionScores {
    pub angry: f64,
    pub disgusted: f64,
    pub fearful: f64,
    pub happy: f64,
    pub sad: f64,
    pub surprised: f64,
    pub neutral: f64,
}

impl ExpressionScores {
    /// Merge into the six-label set (disgust folds into anger) and normalize
    pub fn to_emotion_vector(&self) -> EmotionVector {
        EmotionVector::normalize([
            ("anger", self.angry + self.disgusted),
            ("fear", self.fearful),
            ("joy", self.happy),
            ("sadness", self.sad),
            ("surprise", self.surprised),
            ("neutral", self.neutral),
        ])
    }
}

/// Loads detection models at most once.
///
/// Shared by every sensor built on the same detector. A failed load leaves the
/// loader empty so the next start tries again.
pub struct ModelLoader {
    detector: Arc<dyn FaceDetector>,
    source: String,
    loaded: OnceCell<()>,
}

impl ModelLoader {
    pub fn new(detector: Arc<dyn FaceDetector>, source: &str) -> Self {
        Self {
            detector,
            source: source.to_string(),
            loaded: OnceCell::new(),
        }
    }

    pub async fn ensure_loaded(&self) -> Result<(), FaceSensorError> {
        self.loaded
            .get_or_try_init(|| async {
                info!("Loading face models from {}", self.source);
                self.detector.load_models(&self.source).await.map_err(|e| {
                    warn!("Face model load failed: {}", e);
                    e
                })
            })
            .await
            .map(|_| ())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    pub fn detector(&self) -> &Arc<dyn FaceDetector> {
        &self.detector
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::emotion::EmotionLabel;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_merge_folds_disgust_into_anger() {
        let scores = ExpressionScores {
            angry: 0.2,
            disgusted: 0.3,
            neutral: 0.5,
            ..Default::default()
        };
        let v = scores.to_emotion_vector();
        assert_eq!(v.get(EmotionLabel::Anger), 0.5);
        assert_eq!(v.get(EmotionLabel::Neutral), 0.5);
        // Anger comes first in label order
        assert_eq!(v.top_label(), EmotionLabel::Anger);
    }

    #[test]
    fn test_merge_maps_each_expression() {
        let scores = ExpressionScores {
            angry: 1.0,
            disgusted: 0.0,
            fearful: 2.0,
            happy: 3.0,
            sad: 4.0,
            surprised: 5.0,
            neutral: 5.0,
        };
        let v = scores.to_emotion_vector();
        assert_eq!(v.get(EmotionLabel::Anger), 0.05);
        assert_eq!(v.get(EmotionLabel::Fear), 0.1);
        assert_eq!(v.get(EmotionLabel::Joy), 0.15);
        assert_eq!(v.get(EmotionLabel::Sadness), 0.2);
        assert_eq!(v.get(EmotionLabel::Surprise), 0.25);
        assert_eq!(v.get(EmotionLabel::Neutral), 0.25);
        assert_eq!(v.top_label(), EmotionLabel::Surprise);
    }

    #[test]
    fn test_all_zero_expressions_resolve_neutral() {
        let v = ExpressionScores::default().to_emotion_vector();
        assert!(v.is_zero());
        assert_eq!(v.top_label(), EmotionLabel::Neutral);
    }

    #[tokio::test]
    async fn test_model_loader_loads_once() {
        let detector = FakeDetector::new(None);
        let loader = ModelLoader::new(detector.clone(), "/models");
        assert!(!loader.is_loaded());

        loader.ensure_loaded().await.unwrap();
        loader.ensure_loaded().await.unwrap();

        assert!(loader.is_loaded());
        assert_eq!(detector.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_model_loader_retries_after_failure() {
        let detector = FakeDetector::new(None);
        detector.fail_loads.store(1, Ordering::SeqCst);
        let loader = ModelLoader::new(detector.clone(), "/models");

        let err = loader.ensure_loaded().await.unwrap_err();
        assert!(matches!(err, FaceSensorError::ModelLoadFailure(_)));
        assert!(!loader.is_loaded());

        loader.ensure_loaded().await.unwrap();
        assert!(loader.is_loaded());
        assert_eq!(detector.loads.load(Ordering::SeqCst), 2);
    }
}
