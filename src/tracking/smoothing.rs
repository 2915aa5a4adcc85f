//! Exponential smoothing of boxes and landmarks, keyed by track
//!
//! `smoothed = α·previous + (1 − α)·raw`; the first observation of a track
//! seeds the state directly.

use std::collections::HashMap;

use crate::config::AppConfig;
use crate::geometry::{BoundingBox, LandmarkSet};

use super::TrackId;

#[derive(Debug, Clone)]
struct Smoothed {
    bbox: BoundingBox,
    landmarks: Option<LandmarkSet>,
}

/// Per-track EMA state plus IoU association
#[derive(Debug, Clone)]
pub struct SmoothingFilter {
    bbox_alpha: f32,
    landmark_alpha: f32,
    iou_threshold: f32,
    state: HashMap<TrackId, Smoothed>,
}

impl SmoothingFilter {
    pub fn new(bbox_alpha: f32, landmark_alpha: f32, iou_threshold: f32) -> Self {
        Self {
            bbox_alpha,
            landmark_alpha,
            iou_threshold,
            state: HashMap::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.detection.detection_smoothing_alpha,
            config.detection.smoothing_alpha,
            config.detection.iou_match_threshold,
        )
    }

    /// Apply new coefficients, keeping per-track state
    pub fn reconfigure(&mut self, config: &AppConfig) {
        self.bbox_alpha = config.detection.detection_smoothing_alpha;
        self.landmark_alpha = config.detection.smoothing_alpha;
        self.iou_threshold = config.detection.iou_match_threshold;
    }

    /// Smooth one observation of `track`
    pub fn smooth(
        &mut self,
        track: TrackId,
        raw_bbox: &BoundingBox,
        raw_landmarks: &LandmarkSet,
    ) -> (BoundingBox, LandmarkSet) {
        let Some(entry) = self.state.get_mut(&track) else {
            self.state.insert(
                track,
                Smoothed {
                    bbox: *raw_bbox,
                    landmarks: Some(raw_landmarks.clone()),
                },
            );
            return (*raw_bbox, raw_landmarks.clone());
        };

        entry.bbox = entry.bbox.blend(raw_bbox, self.bbox_alpha);
        let landmarks = match &entry.landmarks {
            Some(prev) => prev.blend(raw_landmarks, self.landmark_alpha),
            None => raw_landmarks.clone(),
        };
        entry.landmarks = Some(landmarks.clone());

        (entry.bbox, landmarks)
    }

    /// Match a raw box to the track with the highest IoU at or above the threshold
    pub fn associate(&self, raw_bbox: &BoundingBox, tracks: &[(TrackId, BoundingBox)]) -> Option<TrackId> {
        tracks
            .iter()
            .map(|(id, bbox)| (*id, raw_bbox.iou(bbox)))
            .filter(|(_, iou)| *iou >= self.iou_threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Drop state of a discarded track
    pub fn forget(&mut self, track: TrackId) {
        self.state.remove(&track);
    }

    pub fn is_tracking(&self, track: TrackId) -> bool {
        self.state.contains_key(&track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Hand, Landmark, LANDMARK_COUNT};
    use proptest::prelude::*;

    fn id(seq: u32) -> TrackId {
        TrackId {
            hand: Hand::Right,
            seq,
        }
    }

    fn uniform_set(x: f32, y: f32) -> LandmarkSet {
        LandmarkSet::new([Landmark::new(x, y, 0.0); LANDMARK_COUNT])
    }

    #[test]
    fn test_first_observation_seeds_directly() {
        let mut filter = SmoothingFilter::new(0.7, 0.8, 0.3);
        let raw = BoundingBox::new(0.1, 0.1, 0.3, 0.4);
        let (bbox, landmarks) = filter.smooth(id(1), &raw, &uniform_set(0.2, 0.2));
        assert_eq!(bbox, raw);
        assert_eq!(landmarks, uniform_set(0.2, 0.2));
    }

    #[test]
    fn test_blend_weights_previous_by_alpha() {
        let mut filter = SmoothingFilter::new(0.5, 0.8, 0.3);
        filter.smooth(id(1), &BoundingBox::new(0.0, 0.0, 0.2, 0.2), &uniform_set(0.0, 0.0));
        let (bbox, landmarks) =
            filter.smooth(id(1), &BoundingBox::new(0.2, 0.2, 0.4, 0.4), &uniform_set(1.0, 0.5));

        assert!((bbox.x_min - 0.1).abs() < 1e-6);
        assert!((bbox.x_max - 0.3).abs() < 1e-6);
        assert!((landmarks.point(8).x - 0.2).abs() < 1e-6);
        assert!((landmarks.point(8).y - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_forget_reseeds() {
        let mut filter = SmoothingFilter::new(0.7, 0.8, 0.3);
        filter.smooth(id(1), &BoundingBox::new(0.0, 0.0, 0.2, 0.2), &uniform_set(0.0, 0.0));
        filter.forget(id(1));
        assert!(!filter.is_tracking(id(1)));

        let raw = BoundingBox::new(0.5, 0.5, 0.7, 0.7);
        let (bbox, _) = filter.smooth(id(1), &raw, &uniform_set(0.6, 0.6));
        assert_eq!(bbox, raw);
    }

    #[test]
    fn test_associate_picks_best_overlap() {
        let filter = SmoothingFilter::new(0.7, 0.8, 0.3);
        let tracks = vec![
            (id(1), BoundingBox::new(0.0, 0.0, 0.2, 0.2)),
            (id(2), BoundingBox::new(0.1, 0.0, 0.3, 0.2)),
        ];
        let raw = BoundingBox::new(0.12, 0.0, 0.32, 0.2);
        assert_eq!(filter.associate(&raw, &tracks), Some(id(2)));

        let far = BoundingBox::new(0.7, 0.7, 0.9, 0.9);
        assert_eq!(filter.associate(&far, &tracks), None);
    }

    proptest! {
        #[test]
        fn prop_constant_input_converges(
            alpha in 0.05f32..0.95,
            start in 0.0f32..1.0,
            target in 0.0f32..1.0,
        ) {
            let mut filter = SmoothingFilter::new(alpha, alpha, 0.3);
            let seed = BoundingBox::new(start, start, start, start);
            filter.smooth(id(1), &seed, &uniform_set(start, start));

            let raw = BoundingBox::new(target, target, target, target);
            let raw_set = uniform_set(target, target);
            let mut prev_err = (start - target).abs();
            for _ in 0..50 {
                let (bbox, landmarks) = filter.smooth(id(1), &raw, &raw_set);
                let err = bbox.max_distance(&raw);
                prop_assert!(err <= prev_err + 1e-6);
                prop_assert!(landmarks.max_distance(&raw_set) <= prev_err * 1.5 + 1e-6);
                prev_err = err;
            }
            prop_assert!(prev_err <= (start - target).abs() * alpha.powi(50) + 1e-4);
        }
    }
}
