//! Face sensor controller and its detection poll loop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::provider::{Camera, FaceSensorError, ModelLoader, VideoStream};
use crate::emotion::{EmotionLabel, EmotionVector, NO_FACE_LABEL};

/// Default spacing between detection ticks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(900);

/// Shortest accepted tick spacing; tokio intervals reject a zero period
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceSensorState {
    Stopped,
    /// Stream acquired, models loading
    Starting,
    Polling,
}

impl FaceSensorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaceSensorState::Stopped => "stopped",
            FaceSensorState::Starting => "starting",
            FaceSensorState::Polling => "polling",
        }
    }
}

/// Human-readable camera status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceStatus {
    CameraOff,
    LoadingModels,
    CameraOn,
    Failed(FaceSensorError),
}

impl fmt::Display for FaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaceStatus::CameraOff => write!(f, "Camera off"),
            FaceStatus::LoadingModels => write!(f, "Loading models"),
            FaceStatus::CameraOn => write!(f, "Camera on"),
            FaceStatus::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Latest face emotion reading
#[derive(Debug, Clone, PartialEq)]
pub struct FaceReading {
    /// `None` when no face is in frame or the sensor is stopped
    pub vector: Option<EmotionVector>,
    pub label: String,
}

impl FaceReading {
    /// Baseline after a deliberate stop
    pub fn neutral() -> Self {
        Self {
            vector: None,
            label: EmotionLabel::Neutral.as_str().to_string(),
        }
    }

    /// Camera running but no face found
    pub fn unavailable() -> Self {
        Self {
            vector: None,
            label: NO_FACE_LABEL.to_string(),
        }
    }

    pub fn detected(vector: EmotionVector) -> Self {
        Self {
            label: vector.top_label().as_str().to_string(),
            vector: Some(vector),
        }
    }
}

// ============================================================================
// Sensor Handle
// ============================================================================

/// Owns the camera stream and the detection poll task.
///
/// `stop()` is synchronous: it cancels the poll task and releases the stream
/// before returning. A detection still in flight at that point is discarded.
pub struct FaceSensor {
    camera: Arc<dyn Camera>,
    models: Arc<ModelLoader>,
    poll_interval: Duration,
    state: FaceSensorState,
    status: FaceStatus,
    reading_tx: Arc<watch::Sender<FaceReading>>,
    stream: Option<Arc<dyn VideoStream>>,
    cancel_token: Option<CancellationToken>,
    poll_handle: Option<JoinHandle<()>>,
}

impl FaceSensor {
    pub fn new(camera: Arc<dyn Camera>, models: Arc<ModelLoader>, poll_interval: Duration) -> Self {
        if poll_interval < MIN_POLL_INTERVAL {
            warn!(
                "Face poll interval {:?} too short, using {:?}",
                poll_interval, MIN_POLL_INTERVAL
            );
        }
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let (reading_tx, _) = watch::channel(FaceReading::neutral());
        Self {
            camera,
            models,
            poll_interval,
            state: FaceSensorState::Stopped,
            status: FaceStatus::CameraOff,
            reading_tx: Arc::new(reading_tx),
            stream: None,
            cancel_token: None,
            poll_handle: None,
        }
    }

    /// Acquire the camera, load models once, and start polling.
    ///
    /// Failures are also recorded in [`FaceSensor::status`]; the sensor is left
    /// Stopped with no stream held. Calling start while running is ignored.
    ///
    /// If an earlier `start` future was dropped while models were loading, its
    /// stream is released and the start is retried from scratch.
    pub async fn start(&mut self) -> Result<(), FaceSensorError> {
        if self.state == FaceSensorState::Starting {
            warn!("Previous face sensor start was abandoned, releasing its stream");
            if let Some(stream) = self.stream.take() {
                stream.stop_tracks();
            }
            self.state = FaceSensorState::Stopped;
            self.status = FaceStatus::CameraOff;
        }

        if self.state != FaceSensorState::Stopped {
            debug!("Face sensor already {}, ignoring start", self.state.as_str());
            return Ok(());
        }

        if !self.camera.is_available() {
            return Err(self.fail(FaceSensorError::CapabilityUnavailable));
        }

        let stream = match self.camera.acquire().await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(e)),
        };

        info!("Face sensor transitioning to Starting");
        self.stream = Some(stream.clone());
        self.state = FaceSensorState::Starting;
        self.status = FaceStatus::LoadingModels;

        if let Err(e) = self.models.ensure_loaded().await {
            stream.stop_tracks();
            self.stream = None;
            return Err(self.fail(e));
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            stream,
            self.models.clone(),
            self.reading_tx.clone(),
            self.poll_interval,
            cancel_token.clone(),
        ));

        info!(
            "Face sensor polling every {}ms",
            self.poll_interval.as_millis()
        );
        self.cancel_token = Some(cancel_token);
        self.poll_handle = Some(handle);
        self.state = FaceSensorState::Polling;
        self.status = FaceStatus::CameraOn;
        Ok(())
    }

    /// Cancel polling, release the stream, and reset to the neutral baseline.
    /// Safe to call at any time, any number of times.
    pub fn stop(&mut self) {
        if self.state != FaceSensorState::Stopped {
            info!("Stopping face sensor");
        }

        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.poll_handle.take() {
            handle.abort();
        }
        if let Some(stream) = self.stream.take() {
            stream.stop_tracks();
        }

        self.reading_tx.send_replace(FaceReading::neutral());
        self.state = FaceSensorState::Stopped;
        self.status = FaceStatus::CameraOff;
    }

    fn fail(&mut self, error: FaceSensorError) -> FaceSensorError {
        warn!("Face sensor start failed: {}", error);
        self.state = FaceSensorState::Stopped;
        self.status = FaceStatus::Failed(error.clone());
        error
    }

    /// Receiver for reading updates
    pub fn subscribe(&self) -> watch::Receiver<FaceReading> {
        self.reading_tx.subscribe()
    }

    pub fn reading(&self) -> FaceReading {
        self.reading_tx.borrow().clone()
    }

    pub fn latest_vector(&self) -> Option<EmotionVector> {
        self.reading_tx.borrow().vector
    }

    pub fn label(&self) -> String {
        self.reading_tx.borrow().label.clone()
    }

    pub fn state(&self) -> FaceSensorState {
        self.state
    }

    pub fn status(&self) -> &FaceStatus {
        &self.status
    }

    pub fn is_polling(&self) -> bool {
        self.state == FaceSensorState::Polling
    }
}

impl Drop for FaceSensor {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Poll Loop
// ============================================================================

/// Runs detection ticks until cancelled.
///
/// The loop awaits each detection before taking the next tick, so at most one
/// detection is outstanding; ticks missed meanwhile are skipped, not queued.
async fn poll_loop(
    stream: Arc<dyn VideoStream>,
    models: Arc<ModelLoader>,
    reading_tx: Arc<watch::Sender<FaceReading>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            reading = detect_once(stream.as_ref(), &models) => Some(reading),
        };

        let Some(reading) = outcome else { break };
        let Some(reading) = reading else { continue };

        // Publish under the channel lock so a concurrent stop() always wins
        reading_tx.send_if_modified(|current| {
            if cancel.is_cancelled() {
                return false;
            }
            let changed = *current != reading;
            *current = reading;
            changed
        });
    }

    debug!("Face poll loop shutting down");
}

/// One detection tick. `None` means the tick was skipped.
async fn detect_once(stream: &dyn VideoStream, models: &ModelLoader) -> Option<FaceReading> {
    if !models.is_loaded() {
        debug!("Face models not ready, skipping tick");
        return None;
    }
    let Some(frame) = stream.current_frame() else {
        debug!("Video frame not ready, skipping tick");
        return None;
    };

    match models.detector().detect_single_face(&frame).await {
        Ok(Some(scores)) => Some(FaceReading::detected(scores.to_emotion_vector())),
        Ok(None) => Some(FaceReading::unavailable()),
        Err(e) => {
            warn!("Face detection tick failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::provider::test_support::*;
    use super::super::provider::ExpressionScores;
    use super::*;
    use std::sync::atomic::Ordering;

    fn sensor_with(camera: FakeCamera, detector: Arc<FakeDetector>) -> FaceSensor {
        let models = Arc::new(ModelLoader::new(detector, "/models"));
        FaceSensor::new(Arc::new(camera), models, DEFAULT_POLL_INTERVAL)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_polls_and_publishes_reading() {
        let stream = FakeStream::new(true);
        let detector = FakeDetector::new(Some(happy_face()));
        let mut sensor = sensor_with(FakeCamera::new(stream.clone()), detector.clone());
        let mut rx = sensor.subscribe();

        sensor.start().await.unwrap();
        assert_eq!(sensor.state(), FaceSensorState::Polling);
        assert_eq!(sensor.status().to_string(), "Camera on");

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("reading should be published")
            .unwrap();

        let reading = sensor.reading();
        assert_eq!(reading.label, "joy");
        let vector = reading.vector.unwrap();
        assert_eq!(vector.get(EmotionLabel::Joy), 0.9);
        assert_eq!(vector.get(EmotionLabel::Neutral), 0.1);

        sensor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_face_reports_unavailable() {
        let stream = FakeStream::new(true);
        let detector = FakeDetector::new(Some(happy_face()));
        let mut sensor = sensor_with(FakeCamera::new(stream), detector.clone());

        sensor.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(sensor.label(), "joy");

        detector.set_reading(Ok(None));
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(sensor.label(), "Unavailable");
        assert!(sensor.latest_vector().is_none());

        sensor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_skipped_until_frame_ready() {
        let stream = FakeStream::new(false);
        let detector = FakeDetector::new(Some(happy_face()));
        let mut sensor = sensor_with(FakeCamera::new(stream.clone()), detector.clone());

        sensor.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(sensor.label(), "neutral");

        stream.ready.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(detector.calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(sensor.label(), "joy");

        sensor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_error_keeps_previous_reading() {
        let stream = FakeStream::new(true);
        let detector = FakeDetector::new(Some(happy_face()));
        let mut sensor = sensor_with(FakeCamera::new(stream), detector.clone());

        sensor.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        detector.set_reading(Err(FaceSensorError::Detection("backend lost".to_string())));
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(sensor.label(), "joy");
        assert!(sensor.is_polling());
        sensor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_detection_in_flight() {
        let stream = FakeStream::new(true);
        let detector = FakeDetector::new(Some(happy_face()));
        detector.set_latency(Duration::from_millis(2500));
        let mut sensor = sensor_with(FakeCamera::new(stream), detector.clone());

        sensor.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(9000)).await;

        assert_eq!(detector.max_in_flight.load(Ordering::SeqCst), 1);
        // Fire-and-forget ticks would have started ten detections by now
        assert!(detector.calls.load(Ordering::SeqCst) <= 4);
        sensor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_detection() {
        let stream = FakeStream::new(true);
        let detector = FakeDetector::new(Some(ExpressionScores {
            angry: 1.0,
            ..Default::default()
        }));
        detector.set_latency(Duration::from_millis(500));
        let mut sensor = sensor_with(FakeCamera::new(stream.clone()), detector.clone());

        sensor.start().await.unwrap();
        // Tick fires at 900ms, detection resolves at 1400ms
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);

        sensor.stop();
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(sensor.label(), "neutral");
        assert!(sensor.latest_vector().is_none());
        assert_eq!(stream.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_without_start_resets_to_neutral() {
        let stream = FakeStream::new(true);
        let detector = FakeDetector::new(None);
        let mut sensor = sensor_with(FakeCamera::new(stream.clone()), detector);

        sensor.stop();
        sensor.stop();

        assert_eq!(sensor.state(), FaceSensorState::Stopped);
        assert_eq!(sensor.label(), "neutral");
        assert!(sensor.latest_vector().is_none());
        assert_eq!(sensor.status(), &FaceStatus::CameraOff);
        assert_eq!(stream.stopped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_no_face_resets_to_neutral() {
        let stream = FakeStream::new(true);
        let detector = FakeDetector::new(None);
        let mut sensor = sensor_with(FakeCamera::new(stream.clone()), detector);

        sensor.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(sensor.label(), "Unavailable");

        sensor.stop();
        assert_eq!(sensor.label(), "neutral");
        assert_eq!(stream.stopped.load(Ordering::SeqCst), 1);

        // Second stop only re-clears state
        sensor.stop();
        assert_eq!(stream.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_camera_capability_missing() {
        let stream = FakeStream::new(true);
        let mut camera = FakeCamera::new(stream);
        camera.available = false;
        let detector = FakeDetector::new(None);
        let mut sensor = sensor_with(camera, detector.clone());

        let err = sensor.start().await.unwrap_err();
        assert_eq!(err, FaceSensorError::CapabilityUnavailable);
        assert_eq!(sensor.state(), FaceSensorState::Stopped);
        assert_eq!(sensor.status(), &FaceStatus::Failed(FaceSensorError::CapabilityUnavailable));
        assert_eq!(detector.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_permission_denied_reported_in_status() {
        let stream = FakeStream::new(true);
        let mut camera = FakeCamera::new(stream);
        camera.error = Some(FaceSensorError::PermissionDenied);
        let mut sensor = sensor_with(camera, FakeDetector::new(None));

        assert_eq!(sensor.start().await, Err(FaceSensorError::PermissionDenied));
        assert_eq!(sensor.status().to_string(), "Camera permission denied");
        assert_eq!(sensor.state(), FaceSensorState::Stopped);
    }

    #[tokio::test]
    async fn test_model_load_failure_releases_stream() {
        let stream = FakeStream::new(true);
        let detector = FakeDetector::new(None);
        detector.fail_loads.store(1, Ordering::SeqCst);
        let mut sensor = sensor_with(FakeCamera::new(stream.clone()), detector.clone());

        let err = sensor.start().await.unwrap_err();
        assert!(matches!(err, FaceSensorError::ModelLoadFailure(_)));
        assert_eq!(sensor.state(), FaceSensorState::Stopped);
        assert_eq!(stream.stopped.load(Ordering::SeqCst), 1);

        // Retry loads again and succeeds
        sensor.start().await.unwrap();
        assert!(sensor.is_polling());
        assert_eq!(detector.loads.load(Ordering::SeqCst), 2);
        sensor.stop();
    }

    #[tokio::test]
    async fn test_restart_does_not_reload_models() {
        let stream = FakeStream::new(true);
        let detector = FakeDetector::new(None);
        let camera = FakeCamera::new(stream);
        let mut sensor = sensor_with(camera, detector.clone());

        sensor.start().await.unwrap();
        sensor.start().await.unwrap(); // ignored while polling
        sensor.stop();
        sensor.start().await.unwrap();
        sensor.stop();

        assert_eq!(detector.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped_and_polls() {
        let stream = FakeStream::new(true);
        let detector = FakeDetector::new(Some(happy_face()));
        let models = Arc::new(ModelLoader::new(detector.clone(), "/models"));
        let mut sensor = FaceSensor::new(Arc::new(FakeCamera::new(stream)), models, Duration::ZERO);

        sensor.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(sensor.is_polling());
        assert!(detector.calls.load(Ordering::SeqCst) > 0);
        assert_eq!(sensor.label(), "joy");
        sensor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_start_is_recovered() {
        let stream = FakeStream::new(true);
        let detector = FakeDetector::new(Some(happy_face()));
        detector.set_load_latency(Duration::from_secs(30));
        let mut sensor = sensor_with(FakeCamera::new(stream.clone()), detector.clone());

        let timed_out = tokio::time::timeout(Duration::from_secs(1), sensor.start()).await;
        assert!(timed_out.is_err());
        assert_eq!(sensor.state(), FaceSensorState::Starting);

        detector.set_load_latency(Duration::ZERO);
        sensor.start().await.unwrap();

        assert!(sensor.is_polling());
        assert_eq!(*sensor.status(), FaceStatus::CameraOn);
        // The stream held by the dropped start was released first
        assert_eq!(stream.stopped.load(Ordering::SeqCst), 1);
        sensor.stop();
    }

    #[test]
    fn test_face_state_as_str() {
        assert_eq!(FaceSensorState::Stopped.as_str(), "stopped");
        assert_eq!(FaceSensorState::Starting.as_str(), "starting");
        assert_eq!(FaceSensorState::Polling.as_str(), "polling");
    }
}
