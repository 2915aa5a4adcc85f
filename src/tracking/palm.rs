//! Smart palm tracking state machine
//!
//! One [`PalmTracker`] per hand side. A track is created by a confident palm
//! detection, kept alive by landmark confidence or fresh detections, and
//! survives short dropouts in `Grace` before it is declared `Lost`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::clock::secs;
use crate::config::AppConfig;
use crate::gateway::Detection;
use crate::geometry::{BoundingBox, Hand};

/// Identifier of one continuous track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId {
    pub hand: Hand,
    pub seq: u32,
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.hand {
            Hand::Left => 'L',
            Hand::Right => 'R',
        };
        write!(f, "{}{}", side, self.seq)
    }
}

/// Track lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    Searching,
    Tracking,
    Grace,
    Lost,
}

impl TrackState {
    /// Tracking and Grace are reported as a visible hand
    pub fn is_active(&self) -> bool {
        matches!(self, TrackState::Tracking | TrackState::Grace)
    }
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackState::Searching => "SEARCHING",
            TrackState::Tracking => "TRACKING",
            TrackState::Grace => "GRACE",
            TrackState::Lost => "LOST",
        };
        f.write_str(s)
    }
}

/// State of one tracker after an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub hand: Hand,
    pub id: Option<TrackId>,
    pub state: TrackState,
    pub bbox: Option<BoundingBox>,
    pub last_seen: Option<Duration>,
    pub grace_started: Option<Duration>,
}

/// Tracker settings, copied out of [`AppConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    pub score_threshold: f32,
    pub landmark_threshold: f32,
    pub grace_period: Duration,
    pub periodic_check_interval: u32,
    pub always_detect: bool,
    pub log_transitions: bool,
}

impl From<&AppConfig> for TrackerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            score_threshold: config.detection.score_threshold,
            landmark_threshold: config.detection.landmark_score_for_palm_redetection_threshold,
            grace_period: secs(config.smart_palm.grace_period_duration),
            periodic_check_interval: config.smart_palm.periodic_check_interval.max(1),
            always_detect: config.detection.always_run_palm_detection,
            log_transitions: config.smart_palm.state_transition_debug,
        }
    }
}

#[derive(Debug, Clone)]
struct Track {
    id: TrackId,
    bbox: BoundingBox,
    last_seen: Duration,
    grace_started: Option<Duration>,
}

/// Per-hand track state machine
pub struct PalmTracker {
    hand: Hand,
    settings: TrackerSettings,
    state: TrackState,
    track: Option<Track>,
    next_seq: u32,
    /// Frames since the last qualifying detection while Tracking
    frames_since_detection: u32,
    /// Frames spent in the current Grace period
    grace_frames: u32,
}

impl PalmTracker {
    pub fn new(hand: Hand, settings: TrackerSettings) -> Self {
        Self {
            hand,
            settings,
            state: TrackState::Searching,
            track: None,
            next_seq: 1,
            frames_since_detection: 0,
            grace_frames: 0,
        }
    }

    pub fn hand(&self) -> Hand {
        self.hand
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn track_id(&self) -> Option<TrackId> {
        self.track.as_ref().map(|t| t.id)
    }

    /// Box used as the landmark ROI for the next frame
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.track.as_ref().map(|t| t.bbox)
    }

    pub fn reconfigure(&mut self, settings: TrackerSettings) {
        self.settings = settings;
    }

    /// Whether the palm detector has to run for this hand this frame
    pub fn needs_detection(&self) -> bool {
        if self.settings.always_detect {
            return true;
        }
        match self.state {
            TrackState::Searching | TrackState::Lost => true,
            TrackState::Tracking => {
                self.frames_since_detection >= self.settings.periodic_check_interval
            }
            TrackState::Grace => self.grace_frames % self.settings.periodic_check_interval == 0,
        }
    }

    fn qualifies(&self, detection: Option<&Detection>) -> bool {
        detection.is_some_and(|d| d.score >= self.settings.score_threshold)
    }

    /// Advance the state machine by one frame
    ///
    /// `detection` is the palm detection associated with this hand (if the
    /// detector ran and found one); `landmark_score` is the landmark
    /// confidence from this frame's ROI, if landmarks were located.
    pub fn update(
        &mut self,
        detection: Option<&Detection>,
        landmark_score: Option<f32>,
        now: Duration,
    ) -> TrackSnapshot {
        if self.state == TrackState::Lost {
            self.transition(TrackState::Searching, now);
        }

        let detected = self.qualifies(detection);
        let landmarks_ok = landmark_score.is_some_and(|s| s >= self.settings.landmark_threshold);

        match self.state {
            TrackState::Searching | TrackState::Lost => {
                if let Some(d) = detection.filter(|_| detected) {
                    let id = TrackId {
                        hand: self.hand,
                        seq: self.next_seq,
                    };
                    self.next_seq = self.next_seq.wrapping_add(1);
                    self.track = Some(Track {
                        id,
                        bbox: d.bbox,
                        last_seen: now,
                        grace_started: None,
                    });
                    self.frames_since_detection = 0;
                    debug!(hand = %self.hand, track = %id, score = d.score, "New track");
                    self.transition(TrackState::Tracking, now);
                }
            }
            TrackState::Tracking => {
                if detected || landmarks_ok {
                    self.confirm(detection.filter(|_| detected), now);
                } else {
                    self.grace_frames = 0;
                    if let Some(track) = self.track.as_mut() {
                        track.grace_started = Some(now);
                    }
                    self.transition(TrackState::Grace, now);
                    self.expire_if_due(now);
                }
            }
            TrackState::Grace => {
                self.grace_frames = self.grace_frames.saturating_add(1);
                if detected || landmarks_ok {
                    self.confirm(detection.filter(|_| detected), now);
                    if let Some(track) = self.track.as_mut() {
                        track.grace_started = None;
                    }
                    self.transition(TrackState::Tracking, now);
                } else {
                    self.expire_if_due(now);
                }
            }
        }

        self.snapshot()
    }

    fn confirm(&mut self, detection: Option<&Detection>, now: Duration) {
        if let Some(track) = self.track.as_mut() {
            track.last_seen = now;
            if let Some(d) = detection {
                track.bbox = d.bbox;
            }
        }
        if detection.is_some() {
            self.frames_since_detection = 0;
        } else {
            self.frames_since_detection = self.frames_since_detection.saturating_add(1);
        }
    }

    fn expire_if_due(&mut self, now: Duration) {
        let expired = self
            .track
            .as_ref()
            .map_or(true, |t| now.saturating_sub(t.last_seen) >= self.settings.grace_period);
        if expired {
            self.transition(TrackState::Lost, now);
        }
    }

    /// Replace the ROI box with the smoothed box of this frame
    pub fn record_bbox(&mut self, bbox: BoundingBox) {
        if let Some(track) = self.track.as_mut() {
            track.bbox = bbox;
        }
    }

    fn transition(&mut self, to: TrackState, now: Duration) {
        if self.state == to {
            return;
        }
        if self.settings.log_transitions {
            info!(
                "🖐️ {} hand: {} → {} at {:.3}s",
                self.hand,
                self.state,
                to,
                now.as_secs_f64()
            );
        }
        self.state = to;
    }

    /// Current state; a Lost track is still described once before it is dropped
    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            hand: self.hand,
            id: self.track_id(),
            state: self.state,
            bbox: self.bbox(),
            last_seen: self.track.as_ref().map(|t| t.last_seen),
            grace_started: self.track.as_ref().and_then(|t| t.grace_started),
        }
    }

    /// Forget a Lost track after its snapshot has been published
    pub fn take_lost(&mut self) -> Option<TrackId> {
        if self.state != TrackState::Lost {
            return None;
        }
        self.track.take().map(|t| t.id)
    }
}
