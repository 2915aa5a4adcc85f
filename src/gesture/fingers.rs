//! Finger bend measurement
//!
//! The bend of a finger is the angle at its PIP joint in the triangle
//! (MCP, PIP, TIP): ~180° when straight, smaller as the finger curls.

use std::collections::VecDeque;

use crate::config::{AppConfig, Finger};
use crate::geometry::{direction_angle, joint_angle, joints, LandmarkSet};

/// Below this angle between finger directions the fingers move together
pub const PARALLEL_MAX_DEG: f32 = 30.0;
/// Fingers within this many degrees of 90° are considered perpendicular
pub const PERPENDICULAR_TOLERANCE_DEG: f32 = 20.0;
/// A bent finger stays bent until it leaves the band by more than this
pub const HYSTERESIS_MARGIN_DEG: f32 = 5.0;

/// Raw angles of one landmark set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerReading {
    pub index_angle: f32,
    pub middle_angle: f32,
    /// Angle between the MCP→PIP directions of index and middle
    pub between_angle: f32,
}

impl FingerReading {
    pub fn measure(landmarks: &LandmarkSet) -> Self {
        let p = |i| landmarks.point(i);
        Self {
            index_angle: joint_angle(p(joints::INDEX_MCP), p(joints::INDEX_PIP), p(joints::INDEX_TIP)),
            middle_angle: joint_angle(
                p(joints::MIDDLE_MCP),
                p(joints::MIDDLE_PIP),
                p(joints::MIDDLE_TIP),
            ),
            between_angle: direction_angle(
                p(joints::INDEX_MCP),
                p(joints::INDEX_PIP),
                p(joints::MIDDLE_MCP),
                p(joints::MIDDLE_PIP),
            ),
        }
    }

    pub fn parallel(&self) -> bool {
        self.between_angle < PARALLEL_MAX_DEG
    }

    pub fn perpendicular(&self) -> bool {
        (self.between_angle - 90.0).abs() < PERPENDICULAR_TOLERANCE_DEG
    }
}

/// Angle band in which a finger counts as intentionally bent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BendBand {
    /// Below this the finger is curled (resting fist)
    pub relaxed: f32,
    /// Above this the finger is extended
    pub bent: f32,
}

impl BendBand {
    pub fn is_bent(&self, angle: f32, was_bent: bool) -> bool {
        let margin = if was_bent { HYSTERESIS_MARGIN_DEG } else { 0.0 };
        angle >= self.relaxed - margin && angle <= self.bent + margin
    }
}

/// Per-hand bent state with hysteresis and a short history
#[derive(Debug, Clone)]
pub struct FingerPoseTracker {
    band: BendBand,
    simultaneous: bool,
    window: usize,
    index_bent: bool,
    middle_bent: bool,
    index_history: VecDeque<bool>,
    middle_history: VecDeque<bool>,
}

impl FingerPoseTracker {
    pub fn new(band: BendBand, simultaneous: bool, window: usize) -> Self {
        Self {
            band,
            simultaneous,
            window: window.max(1),
            index_bent: false,
            middle_bent: false,
            index_history: VecDeque::new(),
            middle_history: VecDeque::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mapping = &config.gesture_mapping;
        Self::new(
            BendBand {
                relaxed: mapping.relaxed_threshold,
                bent: mapping.bent_threshold,
            },
            mapping.require_simultaneous_detection,
            mapping.gesture_stability_frames,
        )
    }

    /// Feed one reading, returning the bent fingers that form the current pose
    ///
    /// The pose is `[Index, Middle]` when both are bent and move in
    /// parallel, `[Index]` when only the index is bent (or the fingers are
    /// perpendicular), `[Middle]` for a lone middle finger, and empty when
    /// nothing is bent or the shape is ambiguous.
    pub fn update(&mut self, reading: &FingerReading) -> Vec<Finger> {
        self.index_bent = self.band.is_bent(reading.index_angle, self.index_bent);
        self.middle_bent = self.band.is_bent(reading.middle_angle, self.middle_bent);

        push_bounded(&mut self.index_history, self.index_bent, self.window);
        push_bounded(&mut self.middle_history, self.middle_bent, self.window);

        let (index_counts, middle_counts) = if self.simultaneous {
            (self.index_bent, self.middle_bent)
        } else {
            (
                self.index_history.iter().any(|b| *b),
                self.middle_history.iter().any(|b| *b),
            )
        };

        let any_now = self.index_bent || self.middle_bent;
        if any_now && index_counts && middle_counts && reading.parallel() {
            return vec![Finger::Index, Finger::Middle];
        }
        if self.index_bent {
            if !self.middle_bent || reading.perpendicular() {
                return vec![Finger::Index];
            }
            return Vec::new();
        }
        if self.middle_bent {
            return vec![Finger::Middle];
        }
        Vec::new()
    }
}

fn push_bounded(history: &mut VecDeque<bool>, value: bool, cap: usize) {
    history.push_back(value);
    while history.len() > cap {
        history.pop_front();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::hand_with_angles;
    use super::*;

    fn tracker(simultaneous: bool) -> FingerPoseTracker {
        FingerPoseTracker::new(BendBand { relaxed: 60.0, bent: 160.0 }, simultaneous, 2)
    }

    #[test]
    fn test_measure_matches_constructed_angles() {
        let reading = FingerReading::measure(&hand_with_angles(120.0, 175.0, 0.0));
        assert!((reading.index_angle - 120.0).abs() < 0.5);
        assert!((reading.middle_angle - 175.0).abs() < 0.5);
        assert!(reading.parallel());

        let spread = FingerReading::measure(&hand_with_angles(120.0, 120.0, 90.0));
        assert!(spread.perpendicular());
        assert!(!spread.parallel());
    }

    #[test]
    fn test_band_edges_and_hysteresis() {
        let band = BendBand { relaxed: 60.0, bent: 160.0 };
        assert!(!band.is_bent(170.0, false));
        assert!(band.is_bent(160.0, false));
        assert!(band.is_bent(60.0, false));
        assert!(!band.is_bent(59.0, false));
        // Already bent: stays bent within the margin
        assert!(band.is_bent(164.0, true));
        assert!(!band.is_bent(166.0, true));
        assert!(band.is_bent(56.0, true));
    }

    #[test]
    fn test_pose_from_readings() {
        let mut t = tracker(true);
        assert!(t.update(&FingerReading::measure(&hand_with_angles(175.0, 175.0, 0.0))).is_empty());
        assert_eq!(
            t.update(&FingerReading::measure(&hand_with_angles(120.0, 175.0, 0.0))),
            vec![Finger::Index]
        );
        assert_eq!(
            t.update(&FingerReading::measure(&hand_with_angles(120.0, 120.0, 0.0))),
            vec![Finger::Index, Finger::Middle]
        );
        // Both bent but spread at right angles: index only
        assert_eq!(
            t.update(&FingerReading::measure(&hand_with_angles(120.0, 120.0, 90.0))),
            vec![Finger::Index]
        );
        // Both bent, spread neither parallel nor perpendicular: ambiguous
        assert!(t
            .update(&FingerReading::measure(&hand_with_angles(120.0, 120.0, 50.0)))
            .is_empty());
    }

    #[test]
    fn test_non_simultaneous_counts_recent_bend() {
        let mut strict = tracker(true);
        let mut lenient = tracker(false);

        for t in [&mut strict, &mut lenient] {
            t.update(&FingerReading::measure(&hand_with_angles(175.0, 120.0, 0.0)));
        }
        let later = FingerReading::measure(&hand_with_angles(120.0, 175.0, 0.0));
        assert_eq!(strict.update(&later), vec![Finger::Index]);
        assert_eq!(lenient.update(&later), vec![Finger::Index, Finger::Middle]);
    }
}
