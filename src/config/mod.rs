//! Configuration management for Gesture GW
//!
//! Handles loading, validation, and hot-reloading of the JSON configuration
//! file. Every section and key is optional; missing keys fall back to the
//! defaults below. Runtime bookkeeping fields that older config files carry
//! (`last_triggered`, `gesture_timings`, `last_mode_switch`, ...) are accepted
//! and ignored: timers live in the pipeline, not in the config.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::fs;
use tracing::warn;

use crate::geometry::Hand;

pub use watcher::ConfigWatcher;

/// Name of the pseudo-mode in which no mode actions are produced
pub const DISABLED_MODE: &str = "disabled";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub smart_palm: SmartPalmConfig,
    #[serde(default)]
    pub control_system: ControlSystemConfig,
    #[serde(default)]
    pub gesture_mapping: GestureMappingConfig,
    #[serde(default)]
    pub app_modes: AppModesConfig,
}

/// Detection and smoothing parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DetectionConfig {
    /// Square input size of the palm detector (gateway concern)
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    /// Non-max suppression threshold (gateway concern)
    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f32,
    /// Landmark smoothing coefficient
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f32,
    #[serde(default = "default_iou_match_threshold")]
    pub iou_match_threshold: f32,
    /// Bounding box smoothing coefficient
    #[serde(default = "default_detection_smoothing_alpha")]
    pub detection_smoothing_alpha: f32,
    #[serde(default = "default_gesture_smoothing_frames")]
    pub gesture_smoothing_frames: usize,
    #[serde(default = "default_landmark_redetection_threshold")]
    pub landmark_score_for_palm_redetection_threshold: f32,
    #[serde(default)]
    pub always_run_palm_detection: bool,
    /// Legacy single bend threshold; the classifier reads `gesture_mapping.bent_threshold`
    #[serde(default = "default_bend_angle_threshold")]
    pub bend_angle_threshold: f32,
    #[serde(default = "default_true")]
    pub enable_finger_detection: bool,
    /// Whether the external static-gesture classifier runs at all
    #[serde(default = "default_true")]
    pub show_static_gestures: bool,
}

/// Smart palm detection state machine settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SmartPalmConfig {
    /// Seconds a track survives without confirmation
    #[serde(default = "default_grace_period")]
    pub grace_period_duration: f64,
    /// Frames between forced re-detections
    #[serde(default = "default_periodic_check_interval")]
    pub periodic_check_interval: u32,
    #[serde(default = "default_true")]
    pub state_transition_debug: bool,
}

/// Hand allowed to drive a continuous control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandPreference {
    Any,
    Left,
    Right,
}

impl HandPreference {
    pub fn allows(&self, hand: Hand) -> bool {
        match self {
            HandPreference::Any => true,
            HandPreference::Left => hand == Hand::Left,
            HandPreference::Right => hand == Hand::Right,
        }
    }
}

/// Cursor, scroll, and key control settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ControlSystemConfig {
    #[serde(default)]
    pub enable_cursor_control: bool,
    #[serde(default = "default_cursor_smoothing")]
    pub cursor_smoothing: f32,
    #[serde(default = "default_cursor_sensitivity")]
    pub cursor_sensitivity: f32,
    #[serde(default = "default_cursor_hand_preference")]
    pub cursor_hand_preference: HandPreference,
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,

    #[serde(default)]
    pub enable_scroll_control: bool,
    #[serde(default = "default_scroll_sensitivity")]
    pub scroll_sensitivity: f32,
    /// Max normalized distance between index and middle tips to engage scrolling
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold: f32,
    #[serde(default = "default_scroll_smoothing")]
    pub scroll_smoothing: f32,
    #[serde(default = "default_scroll_hand_preference")]
    pub scroll_hand_preference: HandPreference,

    #[serde(default)]
    pub enable_key_control: bool,
    #[serde(default = "default_key_press_cooldown")]
    pub key_press_cooldown: f64,
}

/// Fingers the finger-angle classifier monitors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Finger {
    Index,
    Middle,
}

/// Hand filter of a gesture definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandFilter {
    Any,
    Left,
    Right,
}

impl HandFilter {
    pub fn matches(&self, hand: Hand) -> bool {
        match self {
            HandFilter::Any => true,
            HandFilter::Left => hand == Hand::Left,
            HandFilter::Right => hand == Hand::Right,
        }
    }
}

/// How a gesture is detected
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "detection_type", rename_all = "snake_case")]
pub enum GestureDetection {
    /// Bend angles of the listed fingers (inferred from the id when empty)
    FingerAngle {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fingers: Vec<Finger>,
    },
    /// External classifier label held (inferred from the id when absent)
    MediapipeStatic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// External classifier label changing from `from` to `to`
    MediapipeTransition { from: String, to: String },
}

/// Static gesture definition
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GestureDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub detection: GestureDetection,
    #[serde(default = "default_hand_filter")]
    pub hand: HandFilter,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Key used by fallback key control when no mode is active
    #[serde(default = "default_mapped_key")]
    pub mapped_key: String,
    #[serde(default = "default_gesture_cooldown")]
    pub cooldown: f64,
}

impl GestureDefinition {
    /// Fingers this definition monitors, inferring from the id for older configs
    pub fn fingers(&self, id: &str) -> Vec<Finger> {
        match &self.detection {
            GestureDetection::FingerAngle { fingers } if !fingers.is_empty() => fingers.clone(),
            GestureDetection::FingerAngle { .. } => {
                if id.contains("index_middle") {
                    vec![Finger::Index, Finger::Middle]
                } else if id.contains("middle") {
                    vec![Finger::Middle]
                } else {
                    vec![Finger::Index]
                }
            }
            _ => Vec::new(),
        }
    }

    /// External label this static definition waits for
    pub fn static_label(&self, id: &str) -> Option<String> {
        match &self.detection {
            GestureDetection::MediapipeStatic { label: Some(label) } => Some(label.clone()),
            GestureDetection::MediapipeStatic { label: None } => match id {
                "fist_gesture" => Some("Closed_Fist".to_string()),
                "open_palm_gesture" => Some("Open_Palm".to_string()),
                "iloveyou_gesture" => Some("ILoveYou".to_string()),
                "thumbs_up_gesture" => Some("Thumb_Up".to_string()),
                "thumbs_down_gesture" => Some("Thumb_Down".to_string()),
                "victory_gesture" => Some("Victory".to_string()),
                "pointing_up_gesture" => Some("Pointing_Up".to_string()),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Gesture mapping system configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GestureMappingConfig {
    #[serde(default = "default_true")]
    pub enable_gesture_mapping: bool,
    #[serde(default = "default_global_cooldown")]
    pub global_cooldown: f64,
    /// Lower edge of the bent band (degrees); below it the finger is curled
    #[serde(default = "default_relaxed_threshold")]
    pub relaxed_threshold: f32,
    /// Upper edge of the bent band (degrees); above it the finger is extended
    #[serde(default = "default_bent_threshold")]
    pub bent_threshold: f32,
    #[serde(default = "default_true")]
    pub require_simultaneous_detection: bool,
    #[serde(default = "default_gesture_stability_frames")]
    pub gesture_stability_frames: usize,
    #[serde(default = "default_available_keys")]
    pub available_keys: Vec<String>,
    #[serde(default = "default_gesture_definitions")]
    pub gesture_definitions: BTreeMap<String, GestureDefinition>,
}

/// Mouse buttons accepted by click actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    Primary,
    Secondary,
}

/// Action bound to a gesture inside a mode
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    /// Single key or `+`-joined hotkey
    KeyPress { key: String },
    MouseClick { button: MouseButton },
    /// Scroll by a signed number of clicks (positive is up)
    MouseScroll { amount: i32 },
}

/// Action descriptor of a mode gesture
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ActionDescriptor {
    #[serde(flatten)]
    pub action: ActionKind,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_action_cooldown")]
    pub cooldown: f64,
}

/// Single application mode
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModeConfig {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub gestures: BTreeMap<String, ActionDescriptor>,
}

/// Right-hand behaviour in browser mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RightHandMode {
    Cursor,
    Scroll,
}

impl RightHandMode {
    pub fn toggled(self) -> Self {
        match self {
            RightHandMode::Cursor => RightHandMode::Scroll,
            RightHandMode::Scroll => RightHandMode::Cursor,
        }
    }
}

/// Application modes configuration
///
/// In the file, modes sit next to the scalar settings as `<key>_mode`
/// objects; [`RawAppModes`] handles that layout.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "RawAppModes", into = "RawAppModes")]
pub struct AppModesConfig {
    pub current_mode: String,
    pub mode_switch_cooldown: f64,
    pub debug_mode: bool,
    pub browser_right_hand_mode: RightHandMode,
    pub browser_iloveyou_switch_cooldown: f64,
    /// Startup `gesture_id → unix timestamp` from older configs, informational only
    pub gesture_timings: HashMap<String, f64>,
    pub modes: BTreeMap<String, ModeConfig>,
}

/// On-disk layout of the `app_modes` section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAppModes {
    #[serde(default = "default_current_mode")]
    current_mode: String,
    #[serde(default = "default_mode_switch_cooldown")]
    mode_switch_cooldown: f64,
    #[serde(default = "default_true")]
    debug_mode: bool,
    #[serde(default = "default_right_hand_mode")]
    browser_right_hand_mode: RightHandMode,
    #[serde(default = "default_iloveyou_cooldown")]
    browser_iloveyou_switch_cooldown: f64,
    #[serde(default)]
    gesture_timings: HashMap<String, f64>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

impl TryFrom<RawAppModes> for AppModesConfig {
    type Error = String;

    fn try_from(raw: RawAppModes) -> std::result::Result<Self, Self::Error> {
        let mut modes = BTreeMap::new();
        for (key, value) in raw.rest {
            // Runtime scalars like last_mode_switch are skipped
            if !value.is_object() {
                continue;
            }
            let mode: ModeConfig = serde_json::from_value(value)
                .map_err(|e| format!("invalid mode '{}': {}", key, e))?;
            modes.insert(key, mode);
        }
        if modes.is_empty() {
            modes = default_modes();
        }

        Ok(Self {
            current_mode: raw.current_mode,
            mode_switch_cooldown: raw.mode_switch_cooldown,
            debug_mode: raw.debug_mode,
            browser_right_hand_mode: raw.browser_right_hand_mode,
            browser_iloveyou_switch_cooldown: raw.browser_iloveyou_switch_cooldown,
            gesture_timings: raw.gesture_timings,
            modes,
        })
    }
}

impl From<AppModesConfig> for RawAppModes {
    fn from(cfg: AppModesConfig) -> Self {
        let rest = cfg
            .modes
            .into_iter()
            .filter_map(|(key, mode)| serde_json::to_value(mode).ok().map(|v| (key, v)))
            .collect();
        Self {
            current_mode: cfg.current_mode,
            mode_switch_cooldown: cfg.mode_switch_cooldown,
            debug_mode: cfg.debug_mode,
            browser_right_hand_mode: cfg.browser_right_hand_mode,
            browser_iloveyou_switch_cooldown: cfg.browser_iloveyou_switch_cooldown,
            gesture_timings: HashMap::new(),
            rest,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_json(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_json::from_str(contents).context("Failed to parse JSON config")?;

        config.validate()?;
        for warning in config.key_warnings() {
            warn!("{}", warning);
        }

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;

        fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        let d = &self.detection;
        check_unit("detection.score_threshold", d.score_threshold)?;
        check_unit("detection.nms_threshold", d.nms_threshold)?;
        check_unit("detection.iou_match_threshold", d.iou_match_threshold)?;
        check_unit(
            "detection.landmark_score_for_palm_redetection_threshold",
            d.landmark_score_for_palm_redetection_threshold,
        )?;
        check_alpha("detection.smoothing_alpha", d.smoothing_alpha)?;
        check_alpha("detection.detection_smoothing_alpha", d.detection_smoothing_alpha)?;
        if d.gesture_smoothing_frames == 0 {
            anyhow::bail!("detection.gesture_smoothing_frames must be at least 1");
        }
        if d.input_size == 0 {
            anyhow::bail!("detection.input_size must be positive");
        }
        check_angle("detection.bend_angle_threshold", d.bend_angle_threshold)?;

        let p = &self.smart_palm;
        check_seconds("smart_palm.grace_period_duration", p.grace_period_duration)?;
        if p.periodic_check_interval == 0 {
            anyhow::bail!("smart_palm.periodic_check_interval must be at least 1 frame");
        }

        let c = &self.control_system;
        check_alpha("control_system.cursor_smoothing", c.cursor_smoothing)?;
        check_alpha("control_system.scroll_smoothing", c.scroll_smoothing)?;
        if c.screen_width == 0 || c.screen_height == 0 {
            anyhow::bail!("Screen dimensions must be positive");
        }
        if !(c.scroll_threshold > 0.0) {
            anyhow::bail!(
                "control_system.scroll_threshold must be positive (got {})",
                c.scroll_threshold
            );
        }
        check_seconds("control_system.key_press_cooldown", c.key_press_cooldown)?;

        let g = &self.gesture_mapping;
        check_seconds("gesture_mapping.global_cooldown", g.global_cooldown)?;
        check_angle("gesture_mapping.relaxed_threshold", g.relaxed_threshold)?;
        check_angle("gesture_mapping.bent_threshold", g.bent_threshold)?;
        if g.relaxed_threshold >= g.bent_threshold {
            anyhow::bail!(
                "gesture_mapping.relaxed_threshold ({}) must be below bent_threshold ({})",
                g.relaxed_threshold,
                g.bent_threshold
            );
        }
        if g.gesture_stability_frames == 0 {
            anyhow::bail!("gesture_mapping.gesture_stability_frames must be at least 1");
        }
        for (id, def) in &g.gesture_definitions {
            check_seconds(&format!("gesture '{}' cooldown", id), def.cooldown)?;
            if let GestureDetection::MediapipeTransition { from, to } = &def.detection {
                if from == to {
                    anyhow::bail!("Transition gesture '{}' has identical from/to label '{}'", id, from);
                }
            }
        }

        let m = &self.app_modes;
        check_seconds("app_modes.mode_switch_cooldown", m.mode_switch_cooldown)?;
        check_seconds(
            "app_modes.browser_iloveyou_switch_cooldown",
            m.browser_iloveyou_switch_cooldown,
        )?;
        if m.current_mode != DISABLED_MODE && !m.modes.contains_key(&m.current_mode) {
            anyhow::bail!("app_modes.current_mode '{}' is not a defined mode", m.current_mode);
        }
        for (key, mode) in &m.modes {
            if key == DISABLED_MODE {
                anyhow::bail!("'{}' is reserved and cannot be used as a mode key", DISABLED_MODE);
            }
            for (gesture_id, action) in &mode.gestures {
                check_seconds(
                    &format!("mode '{}' gesture '{}' cooldown", key, gesture_id),
                    action.cooldown,
                )?;
            }
        }

        Ok(())
    }

    /// Keys referenced by mappings that are not in `available_keys`
    ///
    /// These are warnings, not errors: the input service may still know them.
    pub fn key_warnings(&self) -> Vec<String> {
        let known = &self.gesture_mapping.available_keys;
        let unknown = |combo: &str| {
            combo
                .split('+')
                .map(str::trim)
                .find(|k| !known.iter().any(|a| a == k))
                .map(str::to_string)
        };

        let mut warnings = Vec::new();
        for (id, def) in &self.gesture_mapping.gesture_definitions {
            if let Some(key) = unknown(&def.mapped_key) {
                warnings.push(format!(
                    "Gesture '{}' uses potentially unknown key '{}' in mapping '{}'",
                    id, key, def.mapped_key
                ));
            }
        }
        for mode in self.app_modes.modes.values() {
            for (id, descriptor) in &mode.gestures {
                if let ActionKind::KeyPress { key: combo } = &descriptor.action {
                    if let Some(key) = unknown(combo) {
                        warnings.push(format!(
                            "Mode '{}', gesture '{}' uses potentially unknown key '{}' in mapping '{}'",
                            mode.name, id, key, combo
                        ));
                    }
                }
            }
        }
        warnings
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        anyhow::bail!("{} must be between 0.0 and 1.0 (got {})", name, value);
    }
    Ok(())
}

fn check_alpha(name: &str, value: f32) -> Result<()> {
    if !(value > 0.0 && value < 1.0) {
        anyhow::bail!("{} must be strictly between 0.0 and 1.0 (got {})", name, value);
    }
    Ok(())
}

fn check_angle(name: &str, value: f32) -> Result<()> {
    if !(0.0..=180.0).contains(&value) {
        anyhow::bail!("{} must be between 0 and 180 degrees (got {})", name, value);
    }
    Ok(())
}

fn check_seconds(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        anyhow::bail!("{} must be a non-negative number of seconds (got {})", name, value);
    }
    Ok(())
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            input_size: default_input_size(),
            score_threshold: default_score_threshold(),
            nms_threshold: default_nms_threshold(),
            smoothing_alpha: default_smoothing_alpha(),
            iou_match_threshold: default_iou_match_threshold(),
            detection_smoothing_alpha: default_detection_smoothing_alpha(),
            gesture_smoothing_frames: default_gesture_smoothing_frames(),
            landmark_score_for_palm_redetection_threshold: default_landmark_redetection_threshold(),
            always_run_palm_detection: false,
            bend_angle_threshold: default_bend_angle_threshold(),
            enable_finger_detection: true,
            show_static_gestures: true,
        }
    }
}

impl Default for SmartPalmConfig {
    fn default() -> Self {
        Self {
            grace_period_duration: default_grace_period(),
            periodic_check_interval: default_periodic_check_interval(),
            state_transition_debug: true,
        }
    }
}

impl Default for ControlSystemConfig {
    fn default() -> Self {
        Self {
            enable_cursor_control: false,
            cursor_smoothing: default_cursor_smoothing(),
            cursor_sensitivity: default_cursor_sensitivity(),
            cursor_hand_preference: default_cursor_hand_preference(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            enable_scroll_control: false,
            scroll_sensitivity: default_scroll_sensitivity(),
            scroll_threshold: default_scroll_threshold(),
            scroll_smoothing: default_scroll_smoothing(),
            scroll_hand_preference: default_scroll_hand_preference(),
            enable_key_control: false,
            key_press_cooldown: default_key_press_cooldown(),
        }
    }
}

impl Default for GestureMappingConfig {
    fn default() -> Self {
        Self {
            enable_gesture_mapping: true,
            global_cooldown: default_global_cooldown(),
            relaxed_threshold: default_relaxed_threshold(),
            bent_threshold: default_bent_threshold(),
            require_simultaneous_detection: true,
            gesture_stability_frames: default_gesture_stability_frames(),
            available_keys: default_available_keys(),
            gesture_definitions: default_gesture_definitions(),
        }
    }
}

impl Default for AppModesConfig {
    fn default() -> Self {
        Self {
            current_mode: default_current_mode(),
            mode_switch_cooldown: default_mode_switch_cooldown(),
            debug_mode: true,
            browser_right_hand_mode: default_right_hand_mode(),
            browser_iloveyou_switch_cooldown: default_iloveyou_cooldown(),
            gesture_timings: HashMap::new(),
            modes: default_modes(),
        }
    }
}

fn finger_gesture(name: &str, hand: HandFilter, key: &str) -> GestureDefinition {
    GestureDefinition {
        name: name.to_string(),
        description: name.to_string(),
        detection: GestureDetection::FingerAngle { fingers: Vec::new() },
        hand,
        enabled: true,
        mapped_key: key.to_string(),
        cooldown: 0.6,
    }
}

fn static_gesture(name: &str, label: &str, key: &str, cooldown: f64) -> GestureDefinition {
    GestureDefinition {
        name: name.to_string(),
        description: name.to_string(),
        detection: GestureDetection::MediapipeStatic {
            label: Some(label.to_string()),
        },
        hand: HandFilter::Any,
        enabled: true,
        mapped_key: key.to_string(),
        cooldown,
    }
}

fn default_gesture_definitions() -> BTreeMap<String, GestureDefinition> {
    let mut defs = BTreeMap::new();
    defs.insert(
        "left_index_bent".to_string(),
        finger_gesture("Left Index Finger Bent", HandFilter::Left, "left"),
    );
    defs.insert(
        "right_index_bent".to_string(),
        finger_gesture("Right Index Finger Bent", HandFilter::Right, "right"),
    );
    defs.insert(
        "left_index_middle_bent".to_string(),
        finger_gesture("Left Index + Middle Bent", HandFilter::Left, "up"),
    );
    defs.insert(
        "right_index_middle_bent".to_string(),
        finger_gesture("Right Index + Middle Bent", HandFilter::Right, "down"),
    );
    defs.insert(
        "fist_gesture".to_string(),
        static_gesture("Closed Fist", "Closed_Fist", "space", 1.0),
    );
    defs.insert(
        "open_palm_gesture".to_string(),
        static_gesture("Open Palm", "Open_Palm", "escape", 1.0),
    );
    defs.insert(
        "iloveyou_gesture".to_string(),
        static_gesture("I Love You Sign", "ILoveYou", "ctrl+s", 1.5),
    );
    defs
}

fn key_press(key: &str, description: &str, cooldown: f64) -> ActionDescriptor {
    ActionDescriptor {
        action: ActionKind::KeyPress {
            key: key.to_string(),
        },
        description: description.to_string(),
        cooldown,
    }
}

fn click(button: MouseButton, description: &str, cooldown: f64) -> ActionDescriptor {
    ActionDescriptor {
        action: ActionKind::MouseClick { button },
        description: description.to_string(),
        cooldown,
    }
}

fn default_modes() -> BTreeMap<String, ModeConfig> {
    let mut modes = BTreeMap::new();

    let mut ppt = BTreeMap::new();
    ppt.insert("right_index_bent".to_string(), key_press("right", "Next slide", 0.8));
    ppt.insert("left_index_bent".to_string(), key_press("left", "Previous slide", 0.8));
    ppt.insert("fist_gesture".to_string(), key_press("f5", "Start slideshow", 2.0));
    modes.insert(
        "ppt_mode".to_string(),
        ModeConfig {
            name: "PowerPoint Mode".to_string(),
            enabled: false,
            gestures: ppt,
        },
    );

    let mut media = BTreeMap::new();
    media.insert("right_index_bent".to_string(), key_press("space", "Play/Pause", 0.6));
    media.insert(
        "right_index_middle_bent".to_string(),
        key_press("right", "Skip 10 secs forward", 0.3),
    );
    media.insert(
        "left_index_middle_bent".to_string(),
        key_press("left", "Skip 10 secs back", 0.3),
    );
    media.insert("left_index_bent".to_string(), key_press("m", "Mute", 0.8));
    media.insert("fist_gesture".to_string(), key_press("f", "Fullscreen", 1.5));
    modes.insert(
        "media_mode".to_string(),
        ModeConfig {
            name: "Media Player Mode".to_string(),
            enabled: false,
            gestures: media,
        },
    );

    let mut browser = BTreeMap::new();
    browser.insert("left_index_bent".to_string(), click(MouseButton::Left, "Left click", 0.4));
    browser.insert(
        "left_index_middle_bent".to_string(),
        click(MouseButton::Right, "Right click", 0.6),
    );
    modes.insert(
        "browser_mode".to_string(),
        ModeConfig {
            name: "Browser Mode".to_string(),
            enabled: false,
            gestures: browser,
        },
    );

    modes
}

fn default_available_keys() -> Vec<String> {
    let named = [
        "space", "enter", "tab", "escape", "backspace", "delete", "left", "right", "up", "down",
        "pageup", "pagedown", "home", "end", "insert", "ctrl", "alt", "shift", "win", "cmd",
        "command", "option",
    ];
    let letters = ('a'..='z').map(|c| c.to_string());
    let digits = ('0'..='9').map(|c| c.to_string());
    let function_keys = (1..=12).map(|n| format!("f{}", n));

    named
        .iter()
        .map(|k| k.to_string())
        .chain(letters)
        .chain(digits)
        .chain(function_keys)
        .collect()
}

// Default value functions
fn default_true() -> bool { true }
fn default_input_size() -> u32 { 192 }
fn default_score_threshold() -> f32 { 0.75 }
fn default_nms_threshold() -> f32 { 0.3 }
fn default_smoothing_alpha() -> f32 { 0.8 }
fn default_iou_match_threshold() -> f32 { 0.3 }
fn default_detection_smoothing_alpha() -> f32 { 0.7 }
fn default_gesture_smoothing_frames() -> usize { 6 }
fn default_landmark_redetection_threshold() -> f32 { 0.7 }
fn default_bend_angle_threshold() -> f32 { 160.0 }
fn default_grace_period() -> f64 { 0.5 }
fn default_periodic_check_interval() -> u32 { 30 }
fn default_cursor_smoothing() -> f32 { 0.7 }
fn default_cursor_sensitivity() -> f32 { 2.5 }
fn default_cursor_hand_preference() -> HandPreference { HandPreference::Right }
fn default_screen_width() -> u32 { 1920 }
fn default_screen_height() -> u32 { 1080 }
fn default_scroll_sensitivity() -> f32 { 6.0 }
fn default_scroll_threshold() -> f32 { 0.1 }
fn default_scroll_smoothing() -> f32 { 0.6 }
fn default_scroll_hand_preference() -> HandPreference { HandPreference::Any }
fn default_key_press_cooldown() -> f64 { 0.6 }
fn default_global_cooldown() -> f64 { 0.1 }
fn default_relaxed_threshold() -> f32 { 60.0 }
fn default_bent_threshold() -> f32 { 160.0 }
fn default_gesture_stability_frames() -> usize { 2 }
fn default_hand_filter() -> HandFilter { HandFilter::Any }
fn default_mapped_key() -> String { "space".to_string() }
fn default_gesture_cooldown() -> f64 { 0.6 }
fn default_action_cooldown() -> f64 { 0.8 }
fn default_current_mode() -> String { DISABLED_MODE.to_string() }
fn default_mode_switch_cooldown() -> f64 { 2.0 }
fn default_right_hand_mode() -> RightHandMode { RightHandMode::Cursor }
fn default_iloveyou_cooldown() -> f64 { 1.0 }

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.detection.score_threshold, 0.75);
        assert_eq!(config.smart_palm.periodic_check_interval, 30);
        assert_eq!(config.app_modes.current_mode, "disabled");
        assert_eq!(config.app_modes.modes.len(), 3);
        assert!(config.gesture_mapping.gesture_definitions.contains_key("left_index_bent"));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = AppConfig::from_json(r#"{ "detection": { "score_threshold": 0.5 } }"#).unwrap();
        assert_eq!(config.detection.score_threshold, 0.5);
        assert_eq!(config.detection.smoothing_alpha, 0.8);
        assert_eq!(config.detection.gesture_smoothing_frames, 6);
    }

    #[test]
    fn test_legacy_app_modes_layout() {
        let raw = json!({
            "app_modes": {
                "current_mode": "ppt_mode",
                "mode_switch_cooldown": 2.0,
                "last_mode_switch": 1700000000.0,
                "debug_mode": true,
                "gesture_timings": { "right_index_bent": 1700000000.5 },
                "browser_right_hand_mode": "scroll",
                "browser_iloveyou_switch_cooldown": 1.0,
                "browser_last_iloveyou_switch": 0.0,
                "ppt_mode": {
                    "name": "PowerPoint Mode",
                    "enabled": true,
                    "gestures": {
                        "right_index_bent": {
                            "action": "key_press", "key": "right", "button": null,
                            "description": "Next slide", "cooldown": 0.8
                        },
                        "left_index_bent": {
                            "action": "mouse_click", "key": null, "button": "left",
                            "description": "Click", "cooldown": 0.4
                        }
                    }
                }
            }
        });
        let config = AppConfig::from_json(&raw.to_string()).unwrap();
        let modes = &config.app_modes;
        assert_eq!(modes.current_mode, "ppt_mode");
        assert_eq!(modes.browser_right_hand_mode, RightHandMode::Scroll);
        assert_eq!(modes.modes.len(), 1);

        let ppt = &modes.modes["ppt_mode"];
        assert!(ppt.enabled);
        assert_eq!(
            ppt.gestures["right_index_bent"].action,
            ActionKind::KeyPress { key: "right".to_string() }
        );
        assert_eq!(
            ppt.gestures["left_index_bent"].action,
            ActionKind::MouseClick { button: MouseButton::Left }
        );
    }

    #[test]
    fn test_legacy_gesture_definition_layout() {
        let raw = json!({
            "gesture_mapping": {
                "gesture_definitions": {
                    "left_index_middle_bent": {
                        "name": "Left Index + Middle Bent",
                        "description": "Left hand index and middle fingers bent",
                        "detection_type": "finger_angle",
                        "hand": "left",
                        "enabled": true,
                        "mapped_key": "up",
                        "cooldown": 0.6,
                        "last_triggered": 0.0
                    },
                    "fist_gesture": {
                        "name": "Closed Fist",
                        "description": "closed fist",
                        "detection_type": "mediapipe_static",
                        "hand": "any",
                        "mapped_key": "space",
                        "cooldown": 1.0
                    },
                    "palm_to_fist": {
                        "detection_type": "mediapipe_transition",
                        "from": "Open_Palm",
                        "to": "Closed_Fist"
                    }
                }
            }
        });
        let config = AppConfig::from_json(&raw.to_string()).unwrap();
        let defs = &config.gesture_mapping.gesture_definitions;

        let both = &defs["left_index_middle_bent"];
        assert_eq!(both.hand, HandFilter::Left);
        assert_eq!(both.fingers("left_index_middle_bent"), vec![Finger::Index, Finger::Middle]);

        let fist = &defs["fist_gesture"];
        assert_eq!(fist.static_label("fist_gesture").as_deref(), Some("Closed_Fist"));

        let transition = &defs["palm_to_fist"];
        assert_eq!(transition.cooldown, 0.6);
        assert!(matches!(
            &transition.detection,
            GestureDetection::MediapipeTransition { from, to } if from == "Open_Palm" && to == "Closed_Fist"
        ));
    }

    #[test]
    fn test_rejects_alpha_out_of_range() {
        let err = AppConfig::from_json(r#"{ "detection": { "smoothing_alpha": 1.0 } }"#)
            .unwrap_err();
        assert!(format!("{:#}", err).contains("smoothing_alpha"));

        assert!(AppConfig::from_json(r#"{ "detection": { "detection_smoothing_alpha": 0.0 } }"#)
            .is_err());
    }

    #[test]
    fn test_rejects_negative_cooldowns() {
        assert!(AppConfig::from_json(r#"{ "gesture_mapping": { "global_cooldown": -0.1 } }"#)
            .is_err());
        assert!(AppConfig::from_json(r#"{ "app_modes": { "mode_switch_cooldown": -1 } }"#)
            .is_err());

        let raw = json!({
            "app_modes": {
                "x_mode": {
                    "name": "X",
                    "gestures": { "fist_gesture": { "action": "key_press", "key": "a", "cooldown": -2 } }
                }
            }
        });
        assert!(AppConfig::from_json(&raw.to_string()).is_err());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let raw = r#"{ "gesture_mapping": { "relaxed_threshold": 170, "bent_threshold": 160 } }"#;
        assert!(AppConfig::from_json(raw).is_err());
    }

    #[test]
    fn test_rejects_unknown_current_mode() {
        let err = AppConfig::from_json(r#"{ "app_modes": { "current_mode": "nope_mode" } }"#)
            .unwrap_err();
        assert!(format!("{:#}", err).contains("nope_mode"));
    }

    #[test]
    fn test_rejects_invalid_mouse_button() {
        let raw = json!({
            "app_modes": {
                "x_mode": {
                    "name": "X",
                    "gestures": { "fist_gesture": { "action": "mouse_click", "button": "fourth" } }
                }
            }
        });
        assert!(AppConfig::from_json(&raw.to_string()).is_err());
    }

    #[test]
    fn test_key_warnings_for_unknown_keys() {
        let mut config = AppConfig::default();
        config
            .gesture_mapping
            .gesture_definitions
            .get_mut("fist_gesture")
            .unwrap()
            .mapped_key = "ctrl+hyper".to_string();

        let warnings = config.key_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("hyper"));
        assert!(AppConfig::default().key_warnings().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip_through_file() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("gesture_config.json");

        let mut config = AppConfig::default();
        config.app_modes.current_mode = "media_mode".to_string();
        config.smart_palm.grace_period_duration = 0.8;
        config.save(&path).await?;

        let loaded = AppConfig::load(&path).await?;
        assert_eq!(loaded, config);
        Ok(())
    }
}
