//! Continuous cursor and scroll control
//!
//! Runs every frame on the smoothed landmarks of each visible hand. Which
//! hand drives what is decided by [`ContinuousControl::route`]. The mode
//! passed in is the active mode; a switched-off mode routes as `disabled`.
//!
//! | mode          | hand  | control                                     |
//! |---------------|-------|---------------------------------------------|
//! | browser_mode  | right | cursor or scroll, toggled by right ILoveYou |
//! | browser_mode  | left  | none (gestures only)                        |
//! | any other     | any   | scroll if enabled and preferred, else cursor if enabled and preferred |

use std::time::Duration;
use tracing::{debug, info};

use crate::clock::secs;
use crate::config::{AppConfig, HandPreference, RightHandMode};
use crate::geometry::{joints, Hand, LandmarkSet};

use super::{ActionRequest, InputAction, BROWSER_MODE};

/// Vertical travel of the pinch before the scroll direction locks
pub const DIRECTION_LOCK_TRAVEL: f32 = 0.03;
/// Minimum spacing between scroll actions (10 per second)
pub const SCROLL_INTERVAL: Duration = Duration::from_millis(100);
/// Scroll amounts at or below this magnitude are dropped
pub const MIN_SCROLL_AMOUNT: i32 = 2;
/// Scroll units per unit of normalized travel at sensitivity 1
const SCROLL_SCALE: f32 = 80.0;

/// What a hand drives this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    None,
    Cursor,
    Scroll,
    /// Scroll while pinched, cursor otherwise
    ScrollOrCursor,
}

#[derive(Debug, Clone)]
struct ControlSettings {
    cursor_enabled: bool,
    cursor_smoothing: f32,
    cursor_hand: HandPreference,
    screen_width: f32,
    screen_height: f32,
    scroll_enabled: bool,
    scroll_sensitivity: f32,
    scroll_threshold: f32,
    scroll_hand: HandPreference,
    toggle_cooldown: Duration,
}

impl From<&AppConfig> for ControlSettings {
    fn from(config: &AppConfig) -> Self {
        let c = &config.control_system;
        Self {
            cursor_enabled: c.enable_cursor_control,
            cursor_smoothing: c.cursor_smoothing,
            cursor_hand: c.cursor_hand_preference,
            screen_width: c.screen_width as f32,
            screen_height: c.screen_height as f32,
            scroll_enabled: c.enable_scroll_control,
            scroll_sensitivity: c.scroll_sensitivity,
            scroll_threshold: c.scroll_threshold,
            scroll_hand: c.scroll_hand_preference,
            toggle_cooldown: secs(config.app_modes.browser_iloveyou_switch_cooldown),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Direction {
    Up,
    Down,
}

impl Direction {
    fn of(delta: f32) -> Self {
        if delta > 0.0 {
            Direction::Down
        } else {
            Direction::Up
        }
    }
}

#[derive(Debug, Clone)]
struct ScrollSession {
    hand: Hand,
    anchor_y: f32,
    locked: Option<Direction>,
}

/// Cursor/scroll state machine
pub struct ContinuousControl {
    settings: ControlSettings,
    cursor: Option<(f32, f32)>,
    cursor_hand: Option<Hand>,
    scroll: Option<ScrollSession>,
    last_scroll: Option<Duration>,
    right_hand_mode: RightHandMode,
    last_toggle: Option<Duration>,
}

impl ContinuousControl {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            settings: ControlSettings::from(config),
            cursor: None,
            cursor_hand: None,
            scroll: None,
            last_scroll: None,
            right_hand_mode: config.app_modes.browser_right_hand_mode,
            last_toggle: None,
        }
    }

    pub fn reconfigure(&mut self, config: &AppConfig) {
        self.settings = ControlSettings::from(config);
    }

    pub fn right_hand_mode(&self) -> RightHandMode {
        self.right_hand_mode
    }

    /// Flip the browser right-hand mode, respecting the toggle cooldown
    pub fn toggle_right_hand(&mut self, now: Duration) -> Option<RightHandMode> {
        if let Some(last) = self.last_toggle {
            if now.saturating_sub(last) < self.settings.toggle_cooldown {
                return None;
            }
        }
        self.right_hand_mode = self.right_hand_mode.toggled();
        self.last_toggle = Some(now);
        self.end_scroll(Hand::Right);
        info!("🤟 BROWSER: right hand mode → {:?}", self.right_hand_mode);
        Some(self.right_hand_mode)
    }

    /// Hand routing policy
    pub fn route(&self, mode: &str, hand: Hand) -> Route {
        if mode == BROWSER_MODE {
            return match (hand, self.right_hand_mode) {
                (Hand::Right, RightHandMode::Cursor) => Route::Cursor,
                (Hand::Right, RightHandMode::Scroll) => Route::Scroll,
                (Hand::Left, _) => Route::None,
            };
        }

        let s = &self.settings;
        let scroll = s.scroll_enabled && s.scroll_hand.allows(hand);
        let cursor = s.cursor_enabled && s.cursor_hand.allows(hand);
        match (scroll, cursor) {
            (true, true) => Route::ScrollOrCursor,
            (true, false) => Route::Scroll,
            (false, true) => Route::Cursor,
            (false, false) => Route::None,
        }
    }

    /// Process one hand's smoothed landmarks
    pub fn update(
        &mut self,
        mode: &str,
        hand: Hand,
        landmarks: &LandmarkSet,
        now: Duration,
    ) -> Vec<ActionRequest> {
        let route = self.route(mode, hand);
        let mut actions = Vec::new();

        let pinched = match route {
            Route::Scroll | Route::ScrollOrCursor => {
                let (pinched, action) = self.scroll(hand, landmarks, now);
                actions.extend(action);
                pinched
            }
            _ => {
                self.end_scroll(hand);
                false
            }
        };

        match route {
            Route::Cursor => actions.extend(self.cursor(hand, landmarks, now)),
            Route::ScrollOrCursor if !pinched => actions.extend(self.cursor(hand, landmarks, now)),
            _ => {}
        }

        actions
    }

    /// Hand left the frame
    pub fn release(&mut self, hand: Hand) {
        self.end_scroll(hand);
        if self.cursor_hand == Some(hand) {
            self.cursor = None;
            self.cursor_hand = None;
        }
    }

    fn cursor(&mut self, hand: Hand, landmarks: &LandmarkSet, now: Duration) -> Option<ActionRequest> {
        // Another hand already owns the cursor
        if self.cursor_hand.is_some_and(|h| h != hand) {
            return None;
        }

        let tip = landmarks.point(joints::INDEX_TIP);
        let target = (
            self.settings.screen_width * (1.0 - tip.x),
            self.settings.screen_height * tip.y,
        );
        let alpha = self.settings.cursor_smoothing;
        let (x, y) = match self.cursor {
            Some((px, py)) => (
                alpha * px + (1.0 - alpha) * target.0,
                alpha * py + (1.0 - alpha) * target.1,
            ),
            None => target,
        };
        self.cursor = Some((x, y));
        self.cursor_hand = Some(hand);

        Some(ActionRequest {
            gesture_id: None,
            hand,
            action: InputAction::MouseMove { x, y },
            description: "cursor".to_string(),
            ts: now,
        })
    }

    /// Returns whether the hand is pinched and the scroll action, if any
    fn scroll(
        &mut self,
        hand: Hand,
        landmarks: &LandmarkSet,
        now: Duration,
    ) -> (bool, Option<ActionRequest>) {
        let index_tip = landmarks.point(joints::INDEX_TIP);
        let middle_tip = landmarks.point(joints::MIDDLE_TIP);
        let distance = index_tip.distance_2d(middle_tip);
        let center_y = (index_tip.y + middle_tip.y) / 2.0;

        if distance >= self.settings.scroll_threshold {
            self.end_scroll(hand);
            return (false, None);
        }

        let Some(session) = self.scroll.as_mut() else {
            debug!("🔒 {} scroll start", hand);
            self.scroll = Some(ScrollSession {
                hand,
                anchor_y: center_y,
                locked: None,
            });
            return (true, None);
        };
        if session.hand != hand {
            return (false, None);
        }

        let delta = center_y - session.anchor_y;
        if session.locked.is_none() && delta.abs() > DIRECTION_LOCK_TRAVEL {
            session.locked = Some(Direction::of(delta));
            debug!("🎯 {} scroll direction locked: {:?}", hand, session.locked);
        }
        if session.locked != Some(Direction::of(delta)) {
            return (true, None);
        }

        let due = self
            .last_scroll
            .map_or(true, |last| now.saturating_sub(last) > SCROLL_INTERVAL);
        if !due {
            return (true, None);
        }

        let amount = (-delta * self.settings.scroll_sensitivity * SCROLL_SCALE) as i32;
        if amount.abs() <= MIN_SCROLL_AMOUNT {
            return (true, None);
        }
        self.last_scroll = Some(now);

        let action = ActionRequest {
            gesture_id: None,
            hand,
            action: InputAction::MouseScroll { amount },
            description: "scroll".to_string(),
            ts: now,
        };
        (true, Some(action))
    }

    fn end_scroll(&mut self, hand: Hand) {
        if self.scroll.as_ref().is_some_and(|s| s.hand == hand) {
            debug!("🔓 {} scroll end", hand);
            self.scroll = None;
        }
    }
}
