//! Gesture recognition: per-frame labels and debounced events

pub mod classifier;
pub mod debounce;
pub mod fingers;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::geometry::Hand;

pub use classifier::GestureClassifier;
pub use debounce::{DebounceEngine, RuntimeTimers};
pub use fingers::{FingerPoseTracker, FingerReading};

/// Gesture label of one hand in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureObservation {
    pub hand: Hand,
    pub gesture_id: String,
    pub confidence: f32,
    pub ts: Duration,
}

/// Debounced gesture occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub gesture_id: String,
    pub hand: Hand,
    pub ts: Duration,
}
