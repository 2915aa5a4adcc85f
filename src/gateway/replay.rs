//! Replay gateway - serves prerecorded inference results
//!
//! Input is JSON Lines, one object per frame:
//!
//! ```json
//! {"detections":[{"bbox":{"x_min":0.2,"y_min":0.3,"x_max":0.5,"y_max":0.7},"score":0.9}],
//!  "hands":[{"landmarks":[...21 points...],"confidence":0.95,"handedness":0.9,
//!            "labels":{"Closed_Fist":0.8,"None":0.2}}]}
//! ```
//!
//! Every key is optional. A frame with `"error"` set fails the same way a
//! real gateway would on a malformed frame.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    Detection, Embedding, Frame, GatewayError, InferenceGateway, LabelScores, LandmarkEstimate,
};
use crate::geometry::BoundingBox;

/// One hand as recorded by the landmark and gesture models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedHand {
    #[serde(flatten)]
    pub estimate: LandmarkEstimate,
    #[serde(default)]
    pub labels: LabelScores,
}

/// Inference results for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub hands: Vec<RecordedHand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Gateway that answers from a recorded session
pub struct ReplayGateway {
    name: String,
    frames: Vec<RecordedFrame>,
    /// Frame index of the last detector or landmark call
    current: Mutex<u64>,
}

impl ReplayGateway {
    pub fn new(name: impl Into<String>, frames: Vec<RecordedFrame>) -> Self {
        Self {
            name: name.into(),
            frames,
            current: Mutex::new(0),
        }
    }

    /// Load a JSON Lines recording
    pub async fn from_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read replay file: {}", path.display()))?;

        let frames = parse_jsonl(&contents)
            .with_context(|| format!("Invalid replay file: {}", path.display()))?;
        info!("📼 Loaded {} recorded frames from {}", frames.len(), path.display());

        Ok(Self::new(format!("replay:{}", path.display()), frames))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn frame(&self, index: u64) -> Result<&RecordedFrame, GatewayError> {
        let recorded = usize::try_from(index)
            .ok()
            .and_then(|i| self.frames.get(i))
            .ok_or(GatewayError::Exhausted)?;

        if let Some(reason) = &recorded.error {
            return Err(GatewayError::MalformedFrame {
                index,
                reason: reason.clone(),
            });
        }
        Ok(recorded)
    }

    async fn current_frame(&self) -> Result<&RecordedFrame, GatewayError> {
        let index = *self.current.lock().await;
        self.frame(index)
    }
}

/// Parse a JSON Lines recording, skipping blank lines
pub fn parse_jsonl(contents: &str) -> Result<Vec<RecordedFrame>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", n + 1))
        })
        .collect()
}

#[async_trait]
impl InferenceGateway for ReplayGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn detect_hand(&self, frame: &Frame) -> Result<Option<Detection>, GatewayError> {
        Ok(self.detect_hands(frame).await?.into_iter().next())
    }

    async fn detect_hands(&self, frame: &Frame) -> Result<Vec<Detection>, GatewayError> {
        *self.current.lock().await = frame.index;
        Ok(self.frame(frame.index)?.detections.clone())
    }

    async fn locate_landmarks(
        &self,
        frame: &Frame,
        roi: &BoundingBox,
    ) -> Result<Option<LandmarkEstimate>, GatewayError> {
        *self.current.lock().await = frame.index;
        let recorded = self.frame(frame.index)?;

        // The recorded hand whose landmarks overlap the ROI the most
        let best = recorded
            .hands
            .iter()
            .map(|hand| (hand, hand.estimate.landmarks.bounds().iou(roi)))
            .filter(|(_, iou)| *iou > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(hand, _)| hand.estimate.clone());

        if best.is_none() {
            debug!(frame = frame.index, "No recorded hand inside ROI {:?}", roi);
        }
        Ok(best)
    }

    async fn embed(&self, estimate: &LandmarkEstimate) -> Result<Embedding, GatewayError> {
        let recorded = self.current_frame().await?;
        let slot = recorded
            .hands
            .iter()
            .position(|hand| hand.estimate.landmarks == estimate.landmarks)
            .ok_or_else(|| GatewayError::Inference {
                stage: "embed",
                message: "landmarks do not belong to the current frame".to_string(),
            })?;

        // Replay embeddings only carry the slot of the recorded hand
        Ok(Embedding(vec![slot as f32]))
    }

    async fn classify(&self, embedding: &Embedding) -> Result<LabelScores, GatewayError> {
        let recorded = self.current_frame().await?;
        let slot = embedding
            .0
            .first()
            .map(|v| *v as usize)
            .ok_or_else(|| GatewayError::Inference {
                stage: "classify",
                message: "empty embedding".to_string(),
            })?;

        Ok(recorded
            .hands
            .get(slot)
            .map(|hand| hand.labels.clone())
            .unwrap_or_default())
    }
}
