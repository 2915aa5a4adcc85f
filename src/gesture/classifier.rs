//! Per-hand gesture classification
//!
//! Combines the finger pose from landmark angles with the external
//! classifier label (majority-voted over a short window) and picks at most
//! one configured gesture per hand per frame.
//!
//! Priority: transition > composite finger > single finger > static label.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::trace;

use crate::config::{AppConfig, Finger, GestureDefinition, GestureDetection};
use crate::gateway::{LabelScores, NO_GESTURE_LABEL};
use crate::geometry::{Hand, LandmarkSet};

use super::fingers::{FingerPoseTracker, FingerReading};
use super::GestureObservation;

/// Fewest samples a majority vote is taken over
const MIN_VOTE_SAMPLES: usize = 3;

/// A definition resolved into what the classifier matches on
#[derive(Debug, Clone)]
enum Matcher {
    Fingers(Vec<Finger>),
    Static(String),
    Transition { from: String, to: String },
}

#[derive(Debug, Clone)]
struct Rule {
    id: String,
    definition: GestureDefinition,
    matcher: Matcher,
}

impl Rule {
    fn applies_to(&self, hand: Hand) -> bool {
        self.definition.enabled && self.definition.hand.matches(hand)
    }
}

/// Majority vote over recent external labels, plus the history of voted labels
#[derive(Debug, Clone, Default)]
pub struct LabelSmoother {
    window: usize,
    samples: VecDeque<Option<(String, f32)>>,
    voted: VecDeque<Option<String>>,
}

impl LabelSmoother {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: VecDeque::new(),
            voted: VecDeque::new(),
        }
    }

    /// Add this frame's top label and return the voted label with its mean confidence
    pub fn push(&mut self, top: Option<(&str, f32)>) -> Option<(String, f32)> {
        let sample = top
            .filter(|(label, _)| !label.is_empty() && *label != NO_GESTURE_LABEL)
            .map(|(label, p)| (label.to_string(), p));
        self.samples.push_back(sample);
        while self.samples.len() > self.window {
            self.samples.pop_front();
        }

        let voted = self.vote();
        self.voted.push_back(voted.as_ref().map(|(l, _)| l.clone()));
        while self.voted.len() > self.window + 1 {
            self.voted.pop_front();
        }
        voted
    }

    fn vote(&self) -> Option<(String, f32)> {
        let needed = MIN_VOTE_SAMPLES.min(self.window);
        if self.samples.len() < needed {
            return None;
        }

        let mut tally: HashMap<&str, (usize, f32)> = HashMap::new();
        for (label, p) in self.samples.iter().flatten() {
            let entry = tally.entry(label.as_str()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += p;
        }

        let (label, (count, sum)) = tally.into_iter().max_by_key(|(_, (count, _))| *count)?;
        if count * 2 > self.samples.len() {
            Some((label.to_string(), sum / count as f32))
        } else {
            None
        }
    }

    /// Voted label `frames_ago` frames back (0 is the current frame)
    pub fn voted_ago(&self, frames_ago: usize) -> Option<&str> {
        let len = self.voted.len();
        if frames_ago >= len {
            return None;
        }
        self.voted[len - 1 - frames_ago].as_deref()
    }
}

#[derive(Debug, Clone)]
struct HandState {
    fingers: FingerPoseTracker,
    labels: LabelSmoother,
}

/// Turns smoothed landmarks and external labels into gesture observations
pub struct GestureClassifier {
    rules: Vec<Rule>,
    finger_detection: bool,
    smoothing_frames: usize,
    template: FingerPoseTracker,
    hands: HashMap<Hand, HandState>,
}

impl GestureClassifier {
    pub fn new(config: &AppConfig) -> Self {
        let mut classifier = Self {
            rules: Vec::new(),
            finger_detection: true,
            smoothing_frames: 1,
            template: FingerPoseTracker::from_config(config),
            hands: HashMap::new(),
        };
        classifier.reconfigure(config);
        classifier
    }

    /// Rebuild rules from a new config; per-hand history restarts
    pub fn reconfigure(&mut self, config: &AppConfig) {
        self.rules = config
            .gesture_mapping
            .gesture_definitions
            .iter()
            .filter_map(|(id, def)| {
                let matcher = match &def.detection {
                    GestureDetection::FingerAngle { .. } => Matcher::Fingers(def.fingers(id)),
                    GestureDetection::MediapipeStatic { .. } => {
                        Matcher::Static(def.static_label(id)?)
                    }
                    GestureDetection::MediapipeTransition { from, to } => Matcher::Transition {
                        from: from.clone(),
                        to: to.clone(),
                    },
                };
                Some(Rule {
                    id: id.clone(),
                    definition: def.clone(),
                    matcher,
                })
            })
            .collect();
        self.finger_detection = config.detection.enable_finger_detection;
        self.smoothing_frames = config.detection.gesture_smoothing_frames.max(1);
        self.template = FingerPoseTracker::from_config(config);
        self.hands.clear();
    }

    /// Definition of a gesture id, if configured
    pub fn definition(&self, id: &str) -> Option<&GestureDefinition> {
        self.rules.iter().find(|r| r.id == id).map(|r| &r.definition)
    }

    fn hand_state(&mut self, hand: Hand) -> &mut HandState {
        let template = &self.template;
        let window = self.smoothing_frames;
        self.hands.entry(hand).or_insert_with(|| HandState {
            fingers: template.clone(),
            labels: LabelSmoother::new(window),
        })
    }

    /// Classify one hand for one frame
    pub fn classify(
        &mut self,
        hand: Hand,
        landmarks: &LandmarkSet,
        external: Option<&LabelScores>,
        landmark_confidence: f32,
        ts: Duration,
    ) -> Option<GestureObservation> {
        let smoothing_frames = self.smoothing_frames;
        let finger_detection = self.finger_detection;
        let state = self.hand_state(hand);

        let reading = FingerReading::measure(landmarks);
        let pose = state.fingers.update(&reading);
        let voted = state.labels.push(external.and_then(LabelScores::top));
        let earlier = state.labels.voted_ago(smoothing_frames).map(str::to_string);

        trace!(
            hand = %hand,
            index = reading.index_angle,
            middle = reading.middle_angle,
            between = reading.between_angle,
            pose = ?pose,
            label = ?voted,
            "Classifier frame"
        );

        let observe = |id: &str, confidence: f32| GestureObservation {
            hand,
            gesture_id: id.to_string(),
            confidence,
            ts,
        };
        let candidates: Vec<&Rule> = self.rules.iter().filter(|r| r.applies_to(hand)).collect();

        if let (Some(earlier), Some((current, confidence))) = (earlier.as_deref(), voted.as_ref()) {
            let transition = candidates.iter().find(|r| {
                matches!(&r.matcher, Matcher::Transition { from, to } if from == earlier && to == current)
            });
            if let Some(rule) = transition {
                return Some(observe(&rule.id, *confidence));
            }
        }

        if finger_detection && !pose.is_empty() {
            // Composite poses come before single-finger ones by construction:
            // the pose itself is exclusive.
            let finger = candidates
                .iter()
                .find(|r| matches!(&r.matcher, Matcher::Fingers(f) if same_fingers(f, &pose)));
            if let Some(rule) = finger {
                return Some(observe(&rule.id, landmark_confidence));
            }
        }

        if let Some((current, confidence)) = voted.as_ref() {
            let static_rule = candidates
                .iter()
                .find(|r| matches!(&r.matcher, Matcher::Static(label) if label == current));
            if let Some(rule) = static_rule {
                return Some(observe(&rule.id, *confidence));
            }
        }

        None
    }

    /// Forget history of a hand that is no longer tracked
    pub fn reset_hand(&mut self, hand: Hand) {
        self.hands.remove(&hand);
    }
}

fn same_fingers(a: &[Finger], b: &[Finger]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    a.dedup();
    b.sort();
    b.dedup();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HandFilter, GestureDefinition};
    use crate::gesture::fingers::test_support::hand_with_angles;

    const FRAME: Duration = Duration::from_millis(100);

    fn labels(label: &str, p: f32) -> LabelScores {
        LabelScores::from([(label, p)])
    }

    #[test]
    fn test_vote_needs_three_samples_and_strict_majority() {
        let mut smoother = LabelSmoother::new(6);
        assert_eq!(smoother.push(Some(("Closed_Fist", 0.9))), None);
        assert_eq!(smoother.push(Some(("Closed_Fist", 0.7))), None);
        let (label, confidence) = smoother.push(Some(("Closed_Fist", 0.8))).unwrap();
        assert_eq!(label, "Closed_Fist");
        assert!((confidence - 0.8).abs() < 1e-6);

        // 3 of 6 is not a strict majority
        smoother.push(Some(("Open_Palm", 0.9)));
        smoother.push(Some(("Open_Palm", 0.9)));
        assert_eq!(smoother.push(Some(("Open_Palm", 0.9))), None);
        assert_eq!(
            smoother.push(Some(("Open_Palm", 0.9))).map(|(l, _)| l),
            Some("Open_Palm".to_string())
        );
    }

    #[test]
    fn test_none_label_never_wins() {
        let mut smoother = LabelSmoother::new(3);
        for _ in 0..5 {
            assert_eq!(smoother.push(Some((NO_GESTURE_LABEL, 0.99))), None);
        }
    }

    #[test]
    fn test_voted_history() {
        let mut smoother = LabelSmoother::new(3);
        for _ in 0..3 {
            smoother.push(Some(("Open_Palm", 0.9)));
        }
        for _ in 0..3 {
            smoother.push(Some(("Closed_Fist", 0.9)));
        }
        assert_eq!(smoother.voted_ago(0), Some("Closed_Fist"));
        assert_eq!(smoother.voted_ago(3), Some("Open_Palm"));
        assert_eq!(smoother.voted_ago(4), None);
    }

    #[test]
    fn test_finger_pose_maps_to_hand_specific_definition() {
        let mut classifier = GestureClassifier::new(&AppConfig::default());
        let bent = hand_with_angles(120.0, 175.0, 0.0);

        let left = classifier.classify(Hand::Left, &bent, None, 0.9, FRAME).unwrap();
        assert_eq!(left.gesture_id, "left_index_bent");
        assert_eq!(left.confidence, 0.9);

        let right = classifier.classify(Hand::Right, &bent, None, 0.9, FRAME).unwrap();
        assert_eq!(right.gesture_id, "right_index_bent");

        let both = hand_with_angles(120.0, 120.0, 0.0);
        let obs = classifier.classify(Hand::Right, &both, None, 0.9, FRAME * 2).unwrap();
        assert_eq!(obs.gesture_id, "right_index_middle_bent");
    }

    #[test]
    fn test_static_label_after_vote() {
        let mut classifier = GestureClassifier::new(&AppConfig::default());
        let open = hand_with_angles(178.0, 178.0, 0.0);
        let fist = labels("Closed_Fist", 0.9);

        assert!(classifier.classify(Hand::Left, &open, Some(&fist), 0.9, FRAME).is_none());
        assert!(classifier.classify(Hand::Left, &open, Some(&fist), 0.9, FRAME * 2).is_none());
        let obs = classifier.classify(Hand::Left, &open, Some(&fist), 0.9, FRAME * 3).unwrap();
        assert_eq!(obs.gesture_id, "fist_gesture");
    }

    #[test]
    fn test_finger_beats_static() {
        let mut classifier = GestureClassifier::new(&AppConfig::default());
        let bent = hand_with_angles(120.0, 175.0, 0.0);
        let fist = labels("Closed_Fist", 0.9);
        let mut last = None;
        for i in 0..4 {
            last = classifier.classify(Hand::Right, &bent, Some(&fist), 0.8, FRAME * i);
        }
        assert_eq!(last.unwrap().gesture_id, "right_index_bent");
    }

    #[test]
    fn test_transition_has_priority() {
        let mut config = AppConfig::default();
        config.detection.gesture_smoothing_frames = 3;
        config.gesture_mapping.gesture_definitions.insert(
            "palm_to_fist".to_string(),
            GestureDefinition {
                name: "Palm to fist".to_string(),
                description: String::new(),
                detection: GestureDetection::MediapipeTransition {
                    from: "Open_Palm".to_string(),
                    to: "Closed_Fist".to_string(),
                },
                hand: HandFilter::Any,
                enabled: true,
                mapped_key: "space".to_string(),
                cooldown: 0.6,
            },
        );
        let mut classifier = GestureClassifier::new(&config);
        let open = hand_with_angles(178.0, 178.0, 0.0);

        let mut ids = Vec::new();
        let sequence = ["Open_Palm"; 3].into_iter().chain(["Closed_Fist"; 4]);
        for (i, label) in sequence.enumerate() {
            let obs = classifier.classify(Hand::Left, &open, Some(&labels(label, 0.9)), 0.9, FRAME * i as u32);
            ids.push(obs.map(|o| o.gesture_id));
        }

        assert_eq!(ids[2].as_deref(), Some("open_palm_gesture"));
        // Vote flips at frame 4, but frame 1 had no voted label yet
        assert_eq!(ids[4].as_deref(), Some("fist_gesture"));
        // Frame 2 voted Open_Palm, three frames before frame 5
        assert_eq!(ids[5].as_deref(), Some("palm_to_fist"));
    }

    #[test]
    fn test_disabled_definitions_and_finger_switch() {
        let mut config = AppConfig::default();
        config
            .gesture_mapping
            .gesture_definitions
            .get_mut("left_index_bent")
            .unwrap()
            .enabled = false;
        let mut classifier = GestureClassifier::new(&config);
        let bent = hand_with_angles(120.0, 175.0, 0.0);
        assert!(classifier.classify(Hand::Left, &bent, None, 0.9, FRAME).is_none());

        config.detection.enable_finger_detection = false;
        classifier.reconfigure(&config);
        assert!(classifier.classify(Hand::Right, &bent, None, 0.9, FRAME).is_none());
    }
}
