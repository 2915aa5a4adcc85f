//! Mode-based gesture → action dispatch
//!
//! Exactly one mode is current (or the `disabled` pseudo-mode). Each mode
//! maps gesture ids to action descriptors; the dispatcher applies per-action
//! cooldowns and throttles mode switches.

pub mod control;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::clock::secs;
use crate::config::{ActionKind, AppConfig, ModeConfig, MouseButton, DISABLED_MODE};
use crate::gesture::GestureEvent;
use crate::geometry::Hand;

pub use control::ContinuousControl;

/// Mode whose right hand drives the pointer while it is enabled
pub const BROWSER_MODE: &str = "browser_mode";

/// Input the injection service should perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputAction {
    /// Single key or hotkey chord, pressed in order and released in reverse
    KeyPress { keys: Vec<String> },
    MouseClick { button: MouseButton },
    /// Positive scrolls up
    MouseScroll { amount: i32 },
    /// Absolute screen position in pixels
    MouseMove { x: f32, y: f32 },
}

impl fmt::Display for InputAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputAction::KeyPress { keys } => write!(f, "key {}", keys.join("+")),
            InputAction::MouseClick { button } => write!(f, "click {:?}", button),
            InputAction::MouseScroll { amount } => write!(f, "scroll {:+}", amount),
            InputAction::MouseMove { x, y } => write!(f, "move ({:.0}, {:.0})", x, y),
        }
    }
}

impl From<&ActionKind> for InputAction {
    fn from(kind: &ActionKind) -> Self {
        match kind {
            ActionKind::KeyPress { key } => InputAction::KeyPress {
                keys: parse_keys(key),
            },
            ActionKind::MouseClick { button } => InputAction::MouseClick { button: *button },
            ActionKind::MouseScroll { amount } => InputAction::MouseScroll { amount: *amount },
        }
    }
}

/// Split a key or `+`-joined hotkey into individual keys
pub fn parse_keys(combo: &str) -> Vec<String> {
    combo
        .split('+')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Request sent to the input service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Gesture that triggered the action; None for continuous control
    pub gesture_id: Option<String>,
    pub hand: Hand,
    pub action: InputAction,
    #[serde(default)]
    pub description: String,
    pub ts: Duration,
}

/// Why a gesture event produced no action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Current mode is `disabled` and key control is off
    NoActiveMode,
    /// Current mode exists but is switched off
    ModeDisabled,
    /// Current mode has no action for the gesture
    Unmapped,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IgnoreReason::NoActiveMode => "no active mode",
            IgnoreReason::ModeDisabled => "mode disabled",
            IgnoreReason::Unmapped => "gesture not mapped in mode",
        };
        f.write_str(s)
    }
}

/// Result of dispatching one gesture event
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Action(ActionRequest),
    Ignored(IgnoreReason),
    Throttled { remaining: Duration },
}

/// Mode switch failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("mode switch throttled, {remaining:?} left")]
    Throttled { remaining: Duration },

    #[error("unknown mode '{0}'")]
    UnknownMode(String),
}

#[derive(Debug, Clone)]
struct KeyControl {
    enabled: bool,
    cooldown: Duration,
    /// gesture id → mapped key from the gesture definitions
    keys: HashMap<String, String>,
}

impl From<&AppConfig> for KeyControl {
    fn from(config: &AppConfig) -> Self {
        Self {
            enabled: config.control_system.enable_key_control,
            cooldown: secs(config.control_system.key_press_cooldown),
            keys: config
                .gesture_mapping
                .gesture_definitions
                .iter()
                .filter(|(_, def)| def.enabled)
                .map(|(id, def)| (id.clone(), def.mapped_key.clone()))
                .collect(),
        }
    }
}

/// Maps gesture events to actions for the current mode
pub struct ModeDispatcher {
    modes: BTreeMap<String, ModeConfig>,
    current: String,
    switch_cooldown: Duration,
    last_switch: Option<Duration>,
    /// Last action time per gesture id, independent of gesture cooldowns
    action_timers: HashMap<String, Duration>,
    key_control: KeyControl,
    key_timers: HashMap<String, Duration>,
}

impl ModeDispatcher {
    pub fn new(config: &AppConfig) -> Self {
        let app_modes = &config.app_modes;
        Self {
            modes: app_modes.modes.clone(),
            current: app_modes.current_mode.clone(),
            switch_cooldown: secs(app_modes.mode_switch_cooldown),
            last_switch: None,
            action_timers: HashMap::new(),
            key_control: KeyControl::from(config),
            key_timers: HashMap::new(),
        }
    }

    /// Take new mode tables, keeping the current mode when it still exists
    pub fn reconfigure(&mut self, config: &AppConfig) {
        let app_modes = &config.app_modes;
        let previous = std::mem::take(&mut self.modes);
        self.modes = app_modes.modes.clone();
        self.switch_cooldown = secs(app_modes.mode_switch_cooldown);
        self.key_control = KeyControl::from(config);

        if self.current == DISABLED_MODE {
            return;
        }
        match (previous.get(&self.current), self.modes.get_mut(&self.current)) {
            (Some(old), Some(new)) => new.enabled = old.enabled,
            (_, None) => {
                info!(
                    "🔄 Mode '{}' no longer defined, falling back to '{}'",
                    self.current, app_modes.current_mode
                );
                self.current = app_modes.current_mode.clone();
            }
            _ => {}
        }
    }

    pub fn current_mode(&self) -> &str {
        &self.current
    }

    /// Current mode key, if that mode exists and is switched on
    pub fn active_mode(&self) -> Option<&str> {
        self.modes
            .get(&self.current)
            .filter(|mode| mode.enabled)
            .map(|_| self.current.as_str())
    }

    pub fn mode(&self, key: &str) -> Option<&ModeConfig> {
        self.modes.get(key)
    }

    pub fn modes(&self) -> impl Iterator<Item = (&String, &ModeConfig)> {
        self.modes.iter()
    }

    /// Display name of the current mode
    pub fn current_mode_name(&self) -> &str {
        self.modes
            .get(&self.current)
            .map(|m| m.name.as_str())
            .unwrap_or("Disabled")
    }

    /// Switch to `target` (a mode key or `disabled`)
    pub fn switch_mode(&mut self, target: &str, now: Duration) -> Result<(), ModeError> {
        if target != DISABLED_MODE && !self.modes.contains_key(target) {
            return Err(ModeError::UnknownMode(target.to_string()));
        }

        if let Some(last) = self.last_switch {
            let elapsed = now.saturating_sub(last);
            if elapsed < self.switch_cooldown {
                return Err(ModeError::Throttled {
                    remaining: self.switch_cooldown - elapsed,
                });
            }
        }

        if let Some(previous) = self.modes.get_mut(&self.current) {
            previous.enabled = false;
        }
        if let Some(next) = self.modes.get_mut(target) {
            next.enabled = true;
        }
        self.current = target.to_string();
        self.last_switch = Some(now);

        info!("🔄 MODE SWITCH: {}", self.current_mode_name());
        Ok(())
    }

    /// Map one gesture event to an action request
    pub fn dispatch(&mut self, event: &GestureEvent, now: Duration) -> DispatchOutcome {
        if self.current == DISABLED_MODE {
            return self.dispatch_key_control(event, now);
        }

        let Some(mode) = self.modes.get(&self.current) else {
            return DispatchOutcome::Ignored(IgnoreReason::NoActiveMode);
        };
        if !mode.enabled {
            return DispatchOutcome::Ignored(IgnoreReason::ModeDisabled);
        }
        let Some(descriptor) = mode.gestures.get(&event.gesture_id) else {
            debug!(mode = %self.current, gesture = %event.gesture_id, "Gesture not mapped");
            return DispatchOutcome::Ignored(IgnoreReason::Unmapped);
        };

        let cooldown = secs(descriptor.cooldown);
        if let Some(remaining) = throttle(self.action_timers.get(&event.gesture_id), cooldown, now) {
            return DispatchOutcome::Throttled { remaining };
        }

        let request = ActionRequest {
            gesture_id: Some(event.gesture_id.clone()),
            hand: event.hand,
            action: InputAction::from(&descriptor.action),
            description: descriptor.description.clone(),
            ts: now,
        };
        self.action_timers.insert(event.gesture_id.clone(), now);
        DispatchOutcome::Action(request)
    }

    fn dispatch_key_control(&mut self, event: &GestureEvent, now: Duration) -> DispatchOutcome {
        if !self.key_control.enabled {
            return DispatchOutcome::Ignored(IgnoreReason::NoActiveMode);
        }
        let Some(key) = self.key_control.keys.get(&event.gesture_id) else {
            return DispatchOutcome::Ignored(IgnoreReason::Unmapped);
        };

        let cooldown = self.key_control.cooldown;
        if let Some(remaining) = throttle(self.key_timers.get(&event.gesture_id), cooldown, now) {
            return DispatchOutcome::Throttled { remaining };
        }

        let request = ActionRequest {
            gesture_id: Some(event.gesture_id.clone()),
            hand: event.hand,
            action: InputAction::KeyPress {
                keys: parse_keys(key),
            },
            description: format!("key control: {}", key),
            ts: now,
        };
        self.key_timers.insert(event.gesture_id.clone(), now);
        DispatchOutcome::Action(request)
    }
}

fn throttle(last: Option<&Duration>, cooldown: Duration, now: Duration) -> Option<Duration> {
    let elapsed = now.saturating_sub(*last?);
    (elapsed < cooldown).then(|| cooldown - elapsed)
}

#[cfg(test)]
mod tests;
