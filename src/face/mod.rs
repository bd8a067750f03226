//! Face expression sensing.
//!
//! Architecture:
//!   Camera (acquire stream)
//!       → ModelLoader (load detection models once per process)
//!       → poll loop (900ms ticks, one detection in flight at a time)
//!       → watch channel (FaceReading)

mod provider;
mod sensor;

pub use provider::{
    Camera, ExpressionScores, FaceDetector, FaceSensorError, ModelLoader, VideoFrame, VideoStream,
};
pub use sensor::{
    FaceReading, FaceSensor, FaceSensorState, FaceStatus, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL,
};

#[cfg(test)]
pub(crate) use provider::test_support;
