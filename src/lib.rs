//! Gesture GW - hand gesture tracking to input actions
//!
//! Frames flow through an external [`gateway::InferenceGateway`] (palm
//! detection, landmarks, gesture classification) into the
//! [`pipeline`] worker, which tracks each hand, classifies and debounces
//! gestures and maps them to [`modes::ActionRequest`]s for the active mode.

pub mod clock;
pub mod config;
pub mod gateway;
pub mod geometry;
pub mod gesture;
pub mod modes;
pub mod output;
pub mod paths;
pub mod pipeline;
pub mod tracking;
