//! Tests for the mode dispatcher

use super::*;
use crate::config::ActionDescriptor;
use proptest::prelude::*;

const SEC: Duration = Duration::from_secs(1);

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn event(id: &str, hand: Hand, ts: Duration) -> GestureEvent {
    GestureEvent {
        gesture_id: id.to_string(),
        hand,
        ts,
    }
}

fn dispatcher_in(mode: &str) -> ModeDispatcher {
    let mut dispatcher = ModeDispatcher::new(&AppConfig::default());
    dispatcher.switch_mode(mode, Duration::ZERO).unwrap();
    dispatcher
}

#[test]
fn test_starts_in_configured_mode() {
    let dispatcher = ModeDispatcher::new(&AppConfig::default());
    assert_eq!(dispatcher.current_mode(), "disabled");
    assert_eq!(dispatcher.current_mode_name(), "Disabled");
}

#[test]
fn test_switch_enables_new_and_disables_previous() {
    let mut dispatcher = dispatcher_in("ppt_mode");
    assert!(dispatcher.mode("ppt_mode").unwrap().enabled);

    dispatcher.switch_mode("media_mode", 3 * SEC).unwrap();
    assert!(!dispatcher.mode("ppt_mode").unwrap().enabled);
    assert!(dispatcher.mode("media_mode").unwrap().enabled);
    assert_eq!(dispatcher.current_mode_name(), "Media Player Mode");

    dispatcher.switch_mode("disabled", 6 * SEC).unwrap();
    assert!(!dispatcher.mode("media_mode").unwrap().enabled);
    assert_eq!(dispatcher.current_mode(), "disabled");
}

#[test]
fn test_switch_throttled_then_allowed() {
    let mut dispatcher = dispatcher_in("ppt_mode");

    let err = dispatcher.switch_mode("media_mode", ms(500)).unwrap_err();
    assert_eq!(err, ModeError::Throttled { remaining: ms(1500) });
    assert_eq!(dispatcher.current_mode(), "ppt_mode");

    dispatcher.switch_mode("media_mode", 2 * SEC).unwrap();
    assert_eq!(dispatcher.current_mode(), "media_mode");
}

#[test]
fn test_unknown_mode_is_not_throttled() {
    let mut dispatcher = dispatcher_in("ppt_mode");
    let err = dispatcher.switch_mode("games_mode", ms(100)).unwrap_err();
    assert_eq!(err, ModeError::UnknownMode("games_mode".to_string()));
    // A rejected switch does not reset the throttle window
    assert!(dispatcher.switch_mode("media_mode", 2 * SEC).is_ok());
}

#[test]
fn test_dispatch_key_press() {
    let mut dispatcher = dispatcher_in("ppt_mode");
    let outcome = dispatcher.dispatch(&event("right_index_bent", Hand::Right, SEC), SEC);

    let DispatchOutcome::Action(request) = outcome else {
        panic!("expected an action, got {:?}", outcome);
    };
    assert_eq!(request.gesture_id.as_deref(), Some("right_index_bent"));
    assert_eq!(
        request.action,
        InputAction::KeyPress {
            keys: vec!["right".to_string()]
        }
    );
    assert_eq!(request.description, "Next slide");
}

#[test]
fn test_action_cooldown_per_gesture() {
    let mut dispatcher = dispatcher_in("ppt_mode");
    let first = dispatcher.dispatch(&event("right_index_bent", Hand::Right, SEC), SEC);
    assert!(matches!(first, DispatchOutcome::Action(_)));

    // 0.8s action cooldown
    let second = dispatcher.dispatch(&event("right_index_bent", Hand::Right, ms(1500)), ms(1500));
    assert_eq!(second, DispatchOutcome::Throttled { remaining: ms(300) });

    // Other gestures are independent
    let other = dispatcher.dispatch(&event("left_index_bent", Hand::Left, ms(1500)), ms(1500));
    assert!(matches!(other, DispatchOutcome::Action(_)));

    let third = dispatcher.dispatch(&event("right_index_bent", Hand::Right, ms(1800)), ms(1800));
    assert!(matches!(third, DispatchOutcome::Action(_)));
}

#[test]
fn test_unmapped_and_disabled_ignored() {
    let mut dispatcher = dispatcher_in("ppt_mode");
    assert_eq!(
        dispatcher.dispatch(&event("open_palm_gesture", Hand::Left, SEC), SEC),
        DispatchOutcome::Ignored(IgnoreReason::Unmapped)
    );

    let mut idle = ModeDispatcher::new(&AppConfig::default());
    assert_eq!(
        idle.dispatch(&event("fist_gesture", Hand::Left, SEC), SEC),
        DispatchOutcome::Ignored(IgnoreReason::NoActiveMode)
    );
}

#[test]
fn test_configured_mode_switched_off() {
    let mut config = AppConfig::default();
    config.app_modes.current_mode = "media_mode".to_string();
    let mut dispatcher = ModeDispatcher::new(&config);
    assert_eq!(
        dispatcher.dispatch(&event("fist_gesture", Hand::Left, SEC), SEC),
        DispatchOutcome::Ignored(IgnoreReason::ModeDisabled)
    );
}

#[test]
fn test_browser_mode_dispatches_both_hands() {
    let mut config = AppConfig::default();
    let browser = config.app_modes.modes.get_mut(BROWSER_MODE).unwrap();
    browser.gestures.insert(
        "right_index_middle_bent".to_string(),
        ActionDescriptor {
            action: ActionKind::KeyPress {
                key: "pagedown".to_string(),
            },
            description: "Page down".to_string(),
            cooldown: 0.5,
        },
    );
    let mut dispatcher = ModeDispatcher::new(&config);
    dispatcher.switch_mode(BROWSER_MODE, Duration::ZERO).unwrap();

    let outcome = dispatcher.dispatch(&event("right_index_middle_bent", Hand::Right, SEC), SEC);
    let DispatchOutcome::Action(request) = outcome else {
        panic!("expected an action, got {:?}", outcome);
    };
    assert_eq!(request.hand, Hand::Right);
    assert_eq!(
        request.action,
        InputAction::KeyPress {
            keys: vec!["pagedown".to_string()]
        }
    );

    let outcome = dispatcher.dispatch(&event("left_index_middle_bent", Hand::Left, SEC), SEC);
    let DispatchOutcome::Action(request) = outcome else {
        panic!("expected an action, got {:?}", outcome);
    };
    assert_eq!(
        request.action,
        InputAction::MouseClick {
            button: MouseButton::Right
        }
    );
}

#[test]
fn test_active_mode_requires_enabled_mode() {
    let mut config = AppConfig::default();
    config.app_modes.current_mode = BROWSER_MODE.to_string();
    let mut dispatcher = ModeDispatcher::new(&config);
    assert_eq!(dispatcher.current_mode(), BROWSER_MODE);
    assert_eq!(dispatcher.active_mode(), None);

    dispatcher.switch_mode(BROWSER_MODE, Duration::ZERO).unwrap();
    assert_eq!(dispatcher.active_mode(), Some(BROWSER_MODE));

    let idle = ModeDispatcher::new(&AppConfig::default());
    assert_eq!(idle.active_mode(), None);
}

#[test]
fn test_fallback_key_control() {
    let mut config = AppConfig::default();
    config.control_system.enable_key_control = true;
    let mut dispatcher = ModeDispatcher::new(&config);

    let outcome = dispatcher.dispatch(&event("iloveyou_gesture", Hand::Right, SEC), SEC);
    let DispatchOutcome::Action(request) = outcome else {
        panic!("expected an action");
    };
    assert_eq!(
        request.action,
        InputAction::KeyPress {
            keys: vec!["ctrl".to_string(), "s".to_string()]
        }
    );

    // key_press_cooldown 0.6s
    assert_eq!(
        dispatcher.dispatch(&event("iloveyou_gesture", Hand::Right, ms(1200)), ms(1200)),
        DispatchOutcome::Throttled { remaining: ms(400) }
    );
}

#[test]
fn test_parse_keys() {
    assert_eq!(parse_keys("Ctrl + Shift+S"), vec!["ctrl", "shift", "s"]);
    assert_eq!(parse_keys("space"), vec!["space"]);
    assert!(parse_keys("").is_empty());
}

#[test]
fn test_reconfigure_keeps_current_mode() {
    let mut dispatcher = dispatcher_in("media_mode");
    let mut config = AppConfig::default();
    config
        .app_modes
        .modes
        .get_mut("media_mode")
        .unwrap()
        .gestures
        .remove("fist_gesture");
    dispatcher.reconfigure(&config);

    assert_eq!(dispatcher.current_mode(), "media_mode");
    assert!(dispatcher.mode("media_mode").unwrap().enabled);
    assert_eq!(
        dispatcher.dispatch(&event("fist_gesture", Hand::Left, SEC), SEC),
        DispatchOutcome::Ignored(IgnoreReason::Unmapped)
    );

    config.app_modes.modes.remove("media_mode");
    dispatcher.reconfigure(&config);
    assert_eq!(dispatcher.current_mode(), "disabled");
}

proptest! {
    #[test]
    fn prop_mode_switches_respect_cooldown(gaps in prop::collection::vec(0u64..4000, 1..40)) {
        let mut dispatcher = ModeDispatcher::new(&AppConfig::default());
        let targets = ["ppt_mode", "media_mode", "browser_mode", "disabled"];
        let cooldown = ms(2000);

        let mut now = Duration::ZERO;
        let mut accepted: Vec<Duration> = Vec::new();
        for (i, gap) in gaps.iter().enumerate() {
            now += ms(*gap);
            match dispatcher.switch_mode(targets[i % targets.len()], now) {
                Ok(()) => accepted.push(now),
                Err(ModeError::Throttled { remaining }) => {
                    prop_assert!(remaining > Duration::ZERO && remaining <= cooldown);
                }
                Err(e) => prop_assert!(false, "unexpected error {e}"),
            }
        }

        prop_assert!(!accepted.is_empty());
        for pair in accepted.windows(2) {
            prop_assert!(pair[1] - pair[0] >= cooldown);
        }
    }
}
