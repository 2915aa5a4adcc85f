//! Debounce and cooldown engine
//!
//! Turns per-frame observations into gesture events. A gesture fires after
//! `gesture_stability_frames` identical frames, and only when both its own
//! cooldown and the global cooldown have elapsed. A stable hold stays armed:
//! it fires again each time its cooldowns clear, so a held pose repeats once
//! per cooldown interval.

use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

use crate::clock::secs;
use crate::config::AppConfig;
use crate::geometry::Hand;

use super::{GestureEvent, GestureObservation};

/// Mutable timer state, kept apart from the immutable definitions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeTimers {
    last_triggered: HashMap<String, Duration>,
    last_any: Option<Duration>,
}

impl RuntimeTimers {
    pub fn last_triggered(&self, gesture_id: &str) -> Option<Duration> {
        self.last_triggered.get(gesture_id).copied()
    }

    pub fn last_any(&self) -> Option<Duration> {
        self.last_any
    }

    /// Time left before `gesture_id` may fire again
    pub fn gesture_remaining(&self, gesture_id: &str, cooldown: Duration, now: Duration) -> Duration {
        remaining(self.last_triggered(gesture_id), cooldown, now)
    }

    pub fn global_remaining(&self, cooldown: Duration, now: Duration) -> Duration {
        remaining(self.last_any, cooldown, now)
    }

    pub fn record(&mut self, gesture_id: &str, now: Duration) {
        self.last_triggered.insert(gesture_id.to_string(), now);
        self.last_any = Some(now);
    }
}

fn remaining(last: Option<Duration>, cooldown: Duration, now: Duration) -> Duration {
    match last {
        Some(last) => cooldown.saturating_sub(now.saturating_sub(last)),
        None => Duration::ZERO,
    }
}

#[derive(Debug, Clone)]
struct Hold {
    gesture_id: String,
    frames: usize,
}

#[derive(Debug, Clone)]
struct DebounceSettings {
    enabled: bool,
    stability_frames: usize,
    global_cooldown: Duration,
    cooldowns: HashMap<String, Duration>,
}

impl From<&AppConfig> for DebounceSettings {
    fn from(config: &AppConfig) -> Self {
        let mapping = &config.gesture_mapping;
        Self {
            enabled: mapping.enable_gesture_mapping,
            stability_frames: mapping.gesture_stability_frames.max(1),
            global_cooldown: secs(mapping.global_cooldown),
            cooldowns: mapping
                .gesture_definitions
                .iter()
                .map(|(id, def)| (id.clone(), secs(def.cooldown)))
                .collect(),
        }
    }
}

/// Gesture events gated by stability and cooldowns
pub struct DebounceEngine {
    settings: DebounceSettings,
    holds: HashMap<Hand, Hold>,
    timers: RuntimeTimers,
}

impl DebounceEngine {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            settings: DebounceSettings::from(config),
            holds: HashMap::new(),
            timers: RuntimeTimers::default(),
        }
    }

    /// Apply new settings; timers and holds carry over
    pub fn reconfigure(&mut self, config: &AppConfig) {
        self.settings = DebounceSettings::from(config);
    }

    pub fn timers(&self) -> &RuntimeTimers {
        &self.timers
    }

    /// Consume one frame of observations (at most one per hand)
    ///
    /// Hands without an observation end their hold.
    pub fn evaluate(&mut self, observations: &[GestureObservation], now: Duration) -> Vec<GestureEvent> {
        let mut events = Vec::new();

        for hand in Hand::BOTH {
            let Some(obs) = observations.iter().find(|o| o.hand == hand) else {
                self.holds.remove(&hand);
                continue;
            };

            let hold = self
                .holds
                .entry(hand)
                .and_modify(|h| {
                    if h.gesture_id == obs.gesture_id {
                        h.frames = h.frames.saturating_add(1);
                    } else {
                        *h = Hold {
                            gesture_id: obs.gesture_id.clone(),
                            frames: 1,
                        };
                    }
                })
                .or_insert_with(|| Hold {
                    gesture_id: obs.gesture_id.clone(),
                    frames: 1,
                });

            if !self.settings.enabled || hold.frames < self.settings.stability_frames {
                continue;
            }

            let cooldown = self
                .settings
                .cooldowns
                .get(&hold.gesture_id)
                .copied()
                .unwrap_or_default();
            let gesture_wait = self.timers.gesture_remaining(&hold.gesture_id, cooldown, now);
            let global_wait = self.timers.global_remaining(self.settings.global_cooldown, now);
            if !gesture_wait.is_zero() || !global_wait.is_zero() {
                trace!(
                    hand = %hand,
                    gesture = %hold.gesture_id,
                    wait_ms = gesture_wait.max(global_wait).as_millis() as u64,
                    "Gesture armed, waiting for cooldown"
                );
                continue;
            }

            self.timers.record(&hold.gesture_id, now);
            events.push(GestureEvent {
                gesture_id: hold.gesture_id.clone(),
                hand,
                ts: now,
            });
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FRAME: Duration = Duration::from_millis(100);

    fn obs(hand: Hand, id: &str, ts: Duration) -> GestureObservation {
        GestureObservation {
            hand,
            gesture_id: id.to_string(),
            confidence: 0.9,
            ts,
        }
    }

    fn engine() -> DebounceEngine {
        DebounceEngine::new(&AppConfig::default())
    }

    #[test]
    fn test_fires_after_stability_frames() {
        let mut engine = engine();
        let mut fired = Vec::new();
        for i in 0..7 {
            let now = FRAME * i;
            let events = engine.evaluate(&[obs(Hand::Left, "left_index_bent", now)], now);
            fired.extend(events.into_iter().map(|e| (i, e.gesture_id)));
        }
        assert_eq!(fired, vec![(1, "left_index_bent".to_string())]);
    }

    #[test]
    fn test_held_gesture_repeats_each_cooldown() {
        let mut engine = engine();
        let mut fired_ms = Vec::new();
        // 2 s hold, 0.6 s cooldown
        for i in 0..=20u32 {
            let now = FRAME * i;
            if !engine.evaluate(&[obs(Hand::Left, "left_index_bent", now)], now).is_empty() {
                fired_ms.push(now.as_millis());
            }
        }
        assert_eq!(fired_ms, vec![100, 700, 1300, 1900]);
    }

    #[test]
    fn test_hold_break_rearms() {
        let mut engine = engine();
        let id = "right_index_bent";
        let mut count = 0;
        // hold 2 frames, release, hold again after the 0.6s cooldown
        let pattern = [true, true, false, false, false, false, false, true, true];
        for (i, held) in pattern.iter().enumerate() {
            let now = FRAME * i as u32;
            let frame: Vec<_> = if *held { vec![obs(Hand::Right, id, now)] } else { vec![] };
            count += engine.evaluate(&frame, now).len();
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn test_armed_hold_fires_when_cooldown_clears() {
        let mut engine = engine();
        let id = "right_index_bent";
        let mut fired_at = Vec::new();
        // 0-1 fire at 1; 2 released; 3.. held again, cooldown until 0.7
        for i in 0..12u32 {
            let now = FRAME * i;
            let frame = if i == 2 { vec![] } else { vec![obs(Hand::Right, id, now)] };
            if !engine.evaluate(&frame, now).is_empty() {
                fired_at.push(i);
            }
        }
        assert_eq!(fired_at, vec![1, 7]);
    }

    #[test]
    fn test_global_cooldown_between_hands() {
        let mut config = AppConfig::default();
        config.gesture_mapping.global_cooldown = 0.3;
        let mut engine = DebounceEngine::new(&config);

        let mut fired = Vec::new();
        for i in 0..6u32 {
            let now = FRAME * i;
            let frame = vec![
                obs(Hand::Left, "left_index_bent", now),
                obs(Hand::Right, "right_index_bent", now),
            ];
            for e in engine.evaluate(&frame, now) {
                fired.push((i, e.hand));
            }
        }
        assert_eq!(fired, vec![(1, Hand::Left), (4, Hand::Right)]);
    }

    #[test]
    fn test_mapping_disabled_emits_nothing() {
        let mut config = AppConfig::default();
        config.gesture_mapping.enable_gesture_mapping = false;
        let mut engine = DebounceEngine::new(&config);
        for i in 0..10u32 {
            let now = FRAME * i;
            assert!(engine.evaluate(&[obs(Hand::Left, "fist_gesture", now)], now).is_empty());
        }
        assert_eq!(engine.timers().last_any(), None);
    }

    fn gesture_ids() -> impl Strategy<Value = Option<&'static str>> {
        prop_oneof![
            Just(None),
            Just(Some("left_index_bent")),
            Just(Some("fist_gesture")),
            Just(Some("open_palm_gesture")),
        ]
    }

    proptest! {
        #[test]
        fn prop_cooldowns_and_stability_hold(
            frames in prop::collection::vec((gesture_ids(), gesture_ids(), 10u64..200), 1..200)
        ) {
            let config = AppConfig::default();
            let global = secs(config.gesture_mapping.global_cooldown);
            let cooldown = |id: &str| secs(config.gesture_mapping.gesture_definitions[id].cooldown);
            let stability = config.gesture_mapping.gesture_stability_frames;

            let mut engine = DebounceEngine::new(&config);
            let mut now = Duration::ZERO;
            let mut runs: HashMap<Hand, (Option<&str>, usize)> = HashMap::new();
            let mut events: Vec<GestureEvent> = Vec::new();
            let cleared = |events: &[GestureEvent], id: &str, now: Duration| {
                events.iter().all(|e| {
                    now - e.ts >= global && (e.gesture_id != id || now - e.ts >= cooldown(id))
                })
            };

            for (left, right, dt) in frames {
                now += Duration::from_millis(dt);
                let mut observed = Vec::new();
                for (hand, id) in [(Hand::Left, left), (Hand::Right, right)] {
                    let run = runs.entry(hand).or_insert((None, 0));
                    if run.0 == id { run.1 += 1 } else { *run = (id, 1) }
                    if let Some(id) = id {
                        observed.push(obs(hand, id, now));
                    }
                }

                let fired = engine.evaluate(&observed, now);
                for hand in Hand::BOTH {
                    let run = runs[&hand];
                    let event = fired.iter().find(|e| e.hand == hand);
                    // A stable hold whose cooldowns have cleared must fire
                    let due = match run.0 {
                        Some(id) => run.1 >= stability && cleared(&events, id, now),
                        None => false,
                    };
                    prop_assert_eq!(event.is_some(), due);
                    if let Some(event) = event {
                        prop_assert_eq!(run.0, Some(event.gesture_id.as_str()));
                        events.push(event.clone());
                    }
                }
            }

            for (i, a) in events.iter().enumerate() {
                for b in &events[i + 1..] {
                    prop_assert!(b.ts - a.ts >= global);
                    if a.gesture_id == b.gesture_id {
                        prop_assert!(b.ts - a.ts >= cooldown(&a.gesture_id));
                    }
                }
            }
        }
    }
}
