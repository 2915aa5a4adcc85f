//! Inference gateway boundary
//!
//! The neural stages (palm detector, landmark model, gesture embedder and
//! classifier) live outside this crate. The pipeline only sees the
//! [`InferenceGateway`] trait; a replay implementation is provided for
//! offline runs and tests.

pub mod replay;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::geometry::{BoundingBox, LandmarkSet};

pub use replay::ReplayGateway;

/// Label the external classifier uses for "no gesture"
pub const NO_GESTURE_LABEL: &str = "None";

/// One captured frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    /// Encoded or raw image bytes, opaque to the pipeline
    pub image: Bytes,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(index: u64, image: Bytes, width: u32, height: u32) -> Self {
        Self {
            index,
            image,
            width,
            height,
        }
    }

    /// Frame without pixel data, used when inference results are prerecorded
    pub fn empty(index: u64) -> Self {
        Self::new(index, Bytes::new(), 0, 0)
    }
}

/// Palm detector output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
}

/// Landmark model output for one region of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkEstimate {
    pub landmarks: LandmarkSet,
    /// Landmark presence score
    pub confidence: f32,
    /// Handedness score, > 0.5 is a right hand
    pub handedness: f32,
}

/// Gesture embedding vector
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

/// Classifier output: label → probability
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelScores(pub BTreeMap<String, f32>);

impl LabelScores {
    /// Highest-probability label, if any
    pub fn top(&self) -> Option<(&str, f32)> {
        self.0
            .iter()
            .filter(|(_, p)| p.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(label, p)| (label.as_str(), *p))
    }
}

impl<const N: usize> From<[(&str, f32); N]> for LabelScores {
    fn from(pairs: [(&str, f32); N]) -> Self {
        Self(pairs.iter().map(|(l, p)| (l.to_string(), *p)).collect())
    }
}

/// Gateway failures; the pipeline skips the frame and leaves state untouched
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("malformed frame {index}: {reason}")]
    MalformedFrame { index: u64, reason: String },

    #[error("{stage} inference failed: {message}")]
    Inference { stage: &'static str, message: String },

    #[error("inference source exhausted")]
    Exhausted,
}

/// External inference stages consumed by the pipeline
///
/// Implementations take `&self` so one gateway can be shared; use interior
/// mutability for per-call state.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Gateway name for logs
    fn name(&self) -> &str;

    /// Run the palm detector on the full frame (zero or one hand)
    async fn detect_hand(&self, frame: &Frame) -> Result<Option<Detection>, GatewayError>;

    /// All palm candidates in the frame
    ///
    /// Default: the single result of [`detect_hand`](Self::detect_hand).
    /// Gateways that see several hands per pass override this.
    async fn detect_hands(&self, frame: &Frame) -> Result<Vec<Detection>, GatewayError> {
        Ok(self.detect_hand(frame).await?.into_iter().collect())
    }

    /// Run the landmark model on a region of interest
    async fn locate_landmarks(
        &self,
        frame: &Frame,
        roi: &BoundingBox,
    ) -> Result<Option<LandmarkEstimate>, GatewayError>;

    /// Compute a gesture embedding from landmarks
    async fn embed(&self, estimate: &LandmarkEstimate) -> Result<Embedding, GatewayError>;

    /// Classify an embedding into gesture label probabilities
    async fn classify(&self, embedding: &Embedding) -> Result<LabelScores, GatewayError>;
}
