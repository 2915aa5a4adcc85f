//! PipelineWorker - sequential per-frame processing
//!
//! Each frame runs in two phases. The gather phase makes every gateway call
//! and touches no state, so a gateway failure skips the frame cleanly. The
//! apply phase then advances trackers, smoothing, classification, debounce
//! and dispatch using a single clock sample.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use super::{HandView, PipelineCommand, PipelineSnapshot, RECENT_EVENTS};
use crate::clock::Clock;
use crate::config::{AppConfig, DISABLED_MODE};
use crate::gateway::{Detection, Frame, GatewayError, InferenceGateway, LabelScores, LandmarkEstimate};
use crate::gesture::{DebounceEngine, GestureClassifier, GestureEvent, GestureObservation};
use crate::geometry::{BoundingBox, Hand};
use crate::modes::{ActionRequest, ContinuousControl, DispatchOutcome, ModeDispatcher, BROWSER_MODE};
use crate::tracking::{PalmTracker, SmoothingFilter, TrackState, TrackerSettings};

/// Static label that flips the browser right-hand mode
const POINTER_TOGGLE_LABEL: &str = "ILoveYou";

/// Where to look for a hand this frame
#[derive(Debug, Clone)]
struct Region {
    /// Known side (associated track); None until handedness is known
    hand: Option<Hand>,
    detection: Option<Detection>,
    roi: BoundingBox,
}

/// Gateway results for one hand
#[derive(Debug, Clone, Default)]
struct Observed {
    detection: Option<Detection>,
    estimate: Option<LandmarkEstimate>,
    labels: Option<LabelScores>,
}

/// Everything one frame produced
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub snapshot: PipelineSnapshot,
    pub events: Vec<GestureEvent>,
    pub actions: Vec<ActionRequest>,
}

/// Owns every pipeline stage; see the module docs for the frame phases
pub struct PipelineWorker {
    config: AppConfig,
    gateway: Arc<dyn InferenceGateway>,
    clock: Arc<dyn Clock>,
    trackers: Vec<PalmTracker>,
    smoothing: SmoothingFilter,
    classifier: GestureClassifier,
    debounce: DebounceEngine,
    dispatcher: ModeDispatcher,
    control: ContinuousControl,
    recent_events: VecDeque<GestureEvent>,
    snapshots: broadcast::Sender<PipelineSnapshot>,
    actions: mpsc::Sender<ActionRequest>,
    frames_processed: u64,
    frames_skipped: u64,
}

impl PipelineWorker {
    pub fn new(
        config: AppConfig,
        gateway: Arc<dyn InferenceGateway>,
        clock: Arc<dyn Clock>,
        snapshots: broadcast::Sender<PipelineSnapshot>,
        actions: mpsc::Sender<ActionRequest>,
    ) -> Self {
        let settings = TrackerSettings::from(&config);
        Self {
            trackers: Hand::BOTH
                .iter()
                .map(|hand| PalmTracker::new(*hand, settings.clone()))
                .collect(),
            smoothing: SmoothingFilter::from_config(&config),
            classifier: GestureClassifier::new(&config),
            debounce: DebounceEngine::new(&config),
            dispatcher: ModeDispatcher::new(&config),
            control: ContinuousControl::new(&config),
            recent_events: VecDeque::with_capacity(RECENT_EVENTS),
            config,
            gateway,
            clock,
            snapshots,
            actions,
            frames_processed: 0,
            frames_skipped: 0,
        }
    }

    pub fn dispatcher(&self) -> &ModeDispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut ModeDispatcher {
        &mut self.dispatcher
    }

    pub fn tracker(&self, hand: Hand) -> Option<&PalmTracker> {
        self.trackers.iter().find(|t| t.hand() == hand)
    }

    /// Command loop; returns on `Stop` or when every handle is dropped
    pub async fn run(mut self, mut commands: mpsc::Receiver<PipelineCommand>) {
        info!(
            "🚀 Pipeline started (gateway: {}, mode: {})",
            self.gateway.name(),
            self.dispatcher.current_mode()
        );

        while let Some(cmd) = commands.recv().await {
            match cmd {
                PipelineCommand::Frame(frame) => match self.process_frame(&frame).await {
                    Ok(report) => self.publish(report),
                    Err(e) => {
                        self.frames_skipped += 1;
                        warn!("Skipping frame {}: {}", frame.index, e);
                    }
                },
                PipelineCommand::SwitchMode { mode, response } => {
                    let result = self.dispatcher.switch_mode(&mode, self.clock.now());
                    if let Err(e) = &result {
                        info!("Mode switch to '{}' rejected: {}", mode, e);
                    }
                    if let Some(response) = response {
                        let _ = response.send(result);
                    }
                }
                PipelineCommand::ReloadConfig { config, response } => {
                    let result = self.apply_config(*config);
                    if let Err(e) = &result {
                        warn!("Config reload rejected (keeping old config): {:#}", e);
                    }
                    if let Some(response) = response {
                        let _ = response.send(result);
                    }
                }
                PipelineCommand::Stop => {
                    debug!("Stop requested");
                    break;
                }
            }
        }

        info!(
            "🛑 Pipeline stopped ({} frames processed, {} skipped)",
            self.frames_processed, self.frames_skipped
        );
    }

    fn publish(&mut self, report: FrameReport) {
        for action in report.actions {
            match self.actions.try_send(action) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(action)) => {
                    warn!("Action queue full, dropping {}", action.action);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!("No action consumer");
                }
            }
        }
        // No subscribers is fine
        let _ = self.snapshots.send(report.snapshot);
    }

    /// Validate and install a new configuration
    pub fn apply_config(&mut self, config: AppConfig) -> anyhow::Result<()> {
        config.validate()?;

        let settings = TrackerSettings::from(&config);
        for tracker in &mut self.trackers {
            tracker.reconfigure(settings.clone());
        }
        self.smoothing.reconfigure(&config);
        self.classifier.reconfigure(&config);
        self.debounce.reconfigure(&config);
        self.dispatcher.reconfigure(&config);
        self.control.reconfigure(&config);
        self.config = config;

        info!("🔄 Configuration applied (mode: {})", self.dispatcher.current_mode());
        Ok(())
    }

    /// Run one frame through every stage
    ///
    /// On a gateway error nothing has been modified and the frame is dropped.
    pub async fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport, GatewayError> {
        let now = self.clock.now();
        let mut observed = self.gather(frame).await?;
        let report = self.apply(frame, &mut observed, now);
        self.frames_processed += 1;
        Ok(report)
    }

    async fn gather(&self, frame: &Frame) -> Result<HashMap<Hand, Observed>, GatewayError> {
        let need_detection = self.trackers.iter().any(|t| t.needs_detection());
        let mut detections = if need_detection {
            self.gateway.detect_hands(frame).await?
        } else {
            Vec::new()
        };
        detections.sort_by(|a, b| b.score.total_cmp(&a.score));

        let active: Vec<_> = self
            .trackers
            .iter()
            .filter(|t| t.state().is_active())
            .filter_map(|t| Some((t.track_id()?, t.bbox()?)))
            .collect();

        // Detections matching a live track first, then live tracks on their
        // previous box, then new candidates
        let mut matched = Vec::new();
        let mut fresh = Vec::new();
        for detection in detections {
            match self.smoothing.associate(&detection.bbox, &active) {
                Some(id) if !matched.iter().any(|r: &Region| r.hand == Some(id.hand)) => {
                    matched.push(Region {
                        hand: Some(id.hand),
                        detection: Some(detection),
                        roi: detection.bbox,
                    });
                }
                Some(_) => {}
                None if detection.score >= self.config.detection.score_threshold => {
                    fresh.push(Region {
                        hand: None,
                        detection: Some(detection),
                        roi: detection.bbox,
                    });
                }
                None => {}
            }
        }
        let carried = active
            .iter()
            .filter(|(id, _)| !matched.iter().any(|r| r.hand == Some(id.hand)))
            .map(|(id, bbox)| Region {
                hand: Some(id.hand),
                detection: None,
                roi: *bbox,
            });
        let regions: Vec<Region> = matched.iter().cloned().chain(carried).chain(fresh).collect();

        let landmark_threshold = self.config.detection.landmark_score_for_palm_redetection_threshold;
        let mut observed: HashMap<Hand, Observed> = HashMap::new();
        for region in regions {
            if region.hand.is_some_and(|h| observed.contains_key(&h)) {
                continue;
            }
            let estimate = self.gateway.locate_landmarks(frame, &region.roi).await?;

            let Some(hand) = region
                .hand
                .or_else(|| estimate.as_ref().map(|e| Hand::from_handedness(e.handedness)))
            else {
                trace!(frame = frame.index, "Detection without landmarks, handedness unknown");
                continue;
            };
            if observed.contains_key(&hand) {
                continue;
            }

            let labels = match &estimate {
                Some(e) if self.config.detection.show_static_gestures && e.confidence >= landmark_threshold => {
                    let embedding = self.gateway.embed(e).await?;
                    Some(self.gateway.classify(&embedding).await?)
                }
                _ => None,
            };

            observed.insert(
                hand,
                Observed {
                    detection: region.detection,
                    estimate,
                    labels,
                },
            );
        }

        Ok(observed)
    }

    fn apply(&mut self, frame: &Frame, observed: &mut HashMap<Hand, Observed>, now: Duration) -> FrameReport {
        let landmark_threshold = self.config.detection.landmark_score_for_palm_redetection_threshold;
        // A configured but switched-off mode routes like `disabled`
        let mode = self.dispatcher.active_mode().unwrap_or(DISABLED_MODE).to_string();

        let mut views = Vec::with_capacity(self.trackers.len());
        let mut observations: Vec<GestureObservation> = Vec::new();
        let mut actions: Vec<ActionRequest> = Vec::new();

        for tracker in &mut self.trackers {
            let hand = tracker.hand();
            let seen = observed.remove(&hand).unwrap_or_default();
            let confidence = seen.estimate.as_ref().map(|e| e.confidence);

            let snap = tracker.update(seen.detection.as_ref(), confidence, now);

            let mut landmarks = None;
            if let (true, Some(id), Some(estimate)) = (snap.state.is_active(), snap.id, seen.estimate.as_ref()) {
                let raw_bbox = seen
                    .detection
                    .map(|d| d.bbox)
                    .unwrap_or_else(|| estimate.landmarks.bounds());
                let (bbox, smoothed) = self.smoothing.smooth(id, &raw_bbox, &estimate.landmarks);
                tracker.record_bbox(bbox);

                if estimate.confidence >= landmark_threshold {
                    if let Some(obs) = self.classifier.classify(
                        hand,
                        &smoothed,
                        seen.labels.as_ref(),
                        estimate.confidence,
                        now,
                    ) {
                        observations.push(obs);
                    }
                    actions.extend(self.control.update(&mode, hand, &smoothed, now));
                }
                landmarks = Some(smoothed);
            }

            if landmarks.is_none() {
                self.control.release(hand);
            }

            views.push(HandView {
                track: tracker.snapshot(),
                landmarks,
                landmark_confidence: confidence,
            });

            if snap.state == TrackState::Lost {
                if let Some(id) = tracker.take_lost() {
                    self.smoothing.forget(id);
                }
                self.classifier.reset_hand(hand);
            }
        }

        let events = self.debounce.evaluate(&observations, now);
        for event in &events {
            info!("✋ Gesture {} ({} hand)", event.gesture_id, event.hand);
            if let Some(action) = self.route_event(event, now) {
                actions.push(action);
            }
            if self.recent_events.len() == RECENT_EVENTS {
                self.recent_events.pop_front();
            }
            self.recent_events.push_back(event.clone());
        }

        let snapshot = PipelineSnapshot {
            frame_index: frame.index,
            ts: now,
            tracks: views,
            gestures: observations,
            active_mode: self.dispatcher.current_mode().to_string(),
            right_hand_mode: self.control.right_hand_mode(),
            last_events: self.recent_events.iter().cloned().collect(),
        };

        FrameReport {
            snapshot,
            events,
            actions,
        }
    }

    fn route_event(&mut self, event: &GestureEvent, now: Duration) -> Option<ActionRequest> {
        if self.is_pointer_toggle(event) {
            self.control.toggle_right_hand(now);
            return None;
        }

        match self.dispatcher.dispatch(event, now) {
            DispatchOutcome::Action(request) => {
                info!("🎯 {} → {} ({})", event.gesture_id, request.action, request.description);
                Some(request)
            }
            DispatchOutcome::Ignored(reason) => {
                debug!(gesture = %event.gesture_id, "Gesture ignored: {}", reason);
                None
            }
            DispatchOutcome::Throttled { remaining } => {
                debug!(
                    gesture = %event.gesture_id,
                    remaining_ms = remaining.as_millis() as u64,
                    "Action throttled"
                );
                None
            }
        }
    }

    /// Right-hand ILoveYou in an active browser mode
    fn is_pointer_toggle(&self, event: &GestureEvent) -> bool {
        if event.hand != Hand::Right || self.dispatcher.active_mode() != Some(BROWSER_MODE) {
            return false;
        }
        self
                .classifier
                .definition(&event.gesture_id)
                .and_then(|def| def.static_label(&event.gesture_id))
                .is_some_and(|label| label == POINTER_TOGGLE_LABEL)
    }
}
