//! Emotion score codec.
//!
//! Every modality (face detector output, fusion service response) is expressed
//! as an [`EmotionVector`] over the same six labels, so the front end can treat
//! them interchangeably.

mod vector;

pub use vector::{EmotionLabel, EmotionVector, ScoreMap, NO_FACE_LABEL, SCORE_PRECISION};
