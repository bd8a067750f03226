//! Canonical emotion vector over the fixed label set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Loose label → score mapping, as it appears on the wire
pub type ScoreMap = BTreeMap<String, f64>;

/// Decimal digits kept by [`EmotionVector::normalize`]
pub const SCORE_PRECISION: i32 = 4;

/// Label shown when the camera is running but no face is in frame
pub const NO_FACE_LABEL: &str = "Unavailable";

/// The closed set of emotion labels, in tie-breaking order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Neutral,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 6] = [
        EmotionLabel::Joy,
        EmotionLabel::Sadness,
        EmotionLabel::Anger,
        EmotionLabel::Fear,
        EmotionLabel::Surprise,
        EmotionLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Joy => "joy",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Neutral => "neutral",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmotionLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| format!("Unknown emotion label: {}", s))
    }
}

/// Scores for all six labels.
///
/// Vectors produced by [`EmotionVector::normalize`] sum to 1.0 within rounding,
/// or are all zero when the input carried no signal. Vectors are replaced
/// wholesale on every update; there are no mutating accessors.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "ScoreMap", into = "ScoreMap")]
pub struct EmotionVector {
    scores: [f64; 6],
}

impl EmotionVector {
    /// Normalize an arbitrary score mapping into a distribution.
    ///
    /// Unknown labels are dropped, missing labels count as zero, negative and
    /// non-finite values are treated as zero. A zero total yields the zero
    /// vector rather than NaN.
    pub fn normalize<I, K>(raw: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut scores = [0.0_f64; 6];
        for (key, value) in raw {
            if let Ok(label) = key.as_ref().parse::<EmotionLabel>() {
                scores[label.index()] = if value.is_finite() && value > 0.0 {
                    value
                } else {
                    0.0
                };
            }
        }

        let mut total: f64 = scores.iter().sum();
        if total.is_infinite() {
            // Finite scores can still overflow the sum; rescale by the largest
            let max = scores.iter().copied().fold(0.0_f64, f64::max);
            for score in scores.iter_mut() {
                *score /= max;
            }
            total = scores.iter().sum();
        }
        let divisor = if total == 0.0 { 1.0 } else { total };
        for score in scores.iter_mut() {
            *score = round_to_precision(*score / divisor);
        }

        Self { scores }
    }

    /// Build a vector from an authoritative mapping without re-normalizing.
    ///
    /// Used for fused scores returned by the fusion service, which are
    /// displayed exactly as received. Labels outside the fixed set are ignored.
    pub fn from_scores_verbatim<I, K>(raw: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut scores = [0.0_f64; 6];
        for (key, value) in raw {
            if let Ok(label) = key.as_ref().parse::<EmotionLabel>() {
                scores[label.index()] = value;
            }
        }
        Self { scores }
    }

    pub fn get(&self, label: EmotionLabel) -> f64 {
        self.scores[label.index()]
    }

    /// Iterate `(label, score)` in fixed label order
    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f64)> + '_ {
        EmotionLabel::ALL
            .into_iter()
            .map(move |label| (label, self.scores[label.index()]))
    }

    pub fn total(&self) -> f64 {
        self.scores.iter().sum()
    }

    /// True for the degenerate "no signal" vector
    pub fn is_zero(&self) -> bool {
        self.scores.iter().all(|s| *s == 0.0)
    }

    /// Highest-scoring label.
    ///
    /// The accumulator starts at neutral with score zero and is only replaced
    /// by a strictly greater score, so ties go to the earlier label and the
    /// zero vector resolves to neutral.
    pub fn top_label(&self) -> EmotionLabel {
        let mut best = EmotionLabel::Neutral;
        let mut best_score = 0.0;
        for (label, score) in self.iter() {
            if score > best_score {
                best = label;
                best_score = score;
            }
        }
        best
    }

    /// Labels sorted by descending score, equal scores kept in label order
    pub fn ranked(&self) -> Vec<(EmotionLabel, f64)> {
        let mut ranked: Vec<_> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    pub fn to_score_map(&self) -> ScoreMap {
        self.iter()
            .map(|(label, score)| (label.as_str().to_string(), score))
            .collect()
    }
}

impl From<ScoreMap> for EmotionVector {
    fn from(map: ScoreMap) -> Self {
        Self::from_scores_verbatim(map)
    }
}

impl From<EmotionVector> for ScoreMap {
    fn from(vector: EmotionVector) -> Self {
        vector.to_score_map()
    }
}

fn round_to_precision(value: f64) -> f64 {
    let factor = 10_f64.powi(SCORE_PRECISION);
    (value * factor).round() / factor
}
