//! Hand tracking: per-side track lifecycle and EMA smoothing

pub mod palm;
pub mod smoothing;

pub use palm::{PalmTracker, TrackId, TrackSnapshot, TrackState, TrackerSettings};
pub use smoothing::SmoothingFilter;
