//! Retry, click and cancellation behavior of the action executor

use super::mock::{hit, Harness, InputEvent};
use crate::executor::{ActionOutcome, Step, RETRY_INTERVAL};
use crate::templates::TemplateKind;
use crate::types::{Key, MouseButton, Point};
use crate::AutomationError;

#[test]
fn test_missing_template_is_tried_max_retries_times() {
    let harness = Harness::new();
    let executor = harness.executor();
    let step = Step::click("save", TemplateKind::Save);

    let outcome = executor.execute(&step).unwrap();
    assert_eq!(outcome, ActionOutcome::NotFound);
    assert_eq!(harness.locator.attempts(TemplateKind::Save), 5);
    assert_eq!(harness.clock.sleeps_of(RETRY_INTERVAL), 4);

    // the count does not drift across calls
    let outcome = executor.execute(&step).unwrap();
    assert_eq!(outcome, ActionOutcome::NotFound);
    assert_eq!(harness.locator.attempts(TemplateKind::Save), 10);
    assert_eq!(harness.clock.sleeps_of(RETRY_INTERVAL), 8);
    assert!(harness.input.events().is_empty());
}

#[test]
fn test_click_moves_to_match_center() {
    let harness = Harness::new();
    harness.locator.script(TemplateKind::Audit, vec![None, Some(hit(640, 360))]);
    let executor = harness.executor();

    let outcome = executor
        .execute(&Step::click("audit", TemplateKind::Audit))
        .unwrap();

    assert_eq!(outcome, ActionOutcome::Clicked(hit(640, 360)));
    assert_eq!(harness.locator.attempts(TemplateKind::Audit), 2);
    assert_eq!(
        harness.input.events(),
        vec![
            InputEvent::Move(Point::new(640, 360)),
            InputEvent::Click(MouseButton::Left)
        ]
    );
}

#[test]
fn test_locate_only_issues_no_input() {
    let harness = Harness::new();
    harness.locator.show(TemplateKind::Warning, hit(10, 20));
    let executor = harness.executor();

    let outcome = executor
        .execute(&Step::locate("warning", TemplateKind::Warning))
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.found(), Some(hit(10, 20)));
    assert!(harness.input.events().is_empty());
}

#[test]
fn test_cancelled_before_call_makes_no_attempt() {
    let harness = Harness::new();
    harness.locator.show(TemplateKind::Save, hit(1, 1));
    harness.cancellation.cancel();

    let outcome = harness
        .executor()
        .execute(&Step::click("save", TemplateKind::Save))
        .unwrap();

    assert_eq!(outcome, ActionOutcome::Cancelled);
    assert_eq!(harness.locator.total_attempts(), 0);
    assert!(harness.input.events().is_empty());
}

#[test]
fn test_missing_window_skips_matching() {
    let harness = Harness::new();
    harness.locator.show(TemplateKind::Save, hit(1, 1));

    let outcome = harness
        .executor()
        .execute(&Step::click("save", TemplateKind::Save).in_window("Nowhere"))
        .unwrap();

    assert_eq!(outcome, ActionOutcome::WindowNotFound);
    assert_eq!(harness.locator.total_attempts(), 0);
}

#[test]
fn test_confidence_overrides_default_threshold() {
    let harness = Harness::new();
    harness.locator.show(TemplateKind::Yes, hit(5, 5));
    let executor = harness.executor();

    executor
        .locate_and_click(TemplateKind::Yes, None, Some(0.95), false)
        .unwrap();
    executor
        .locate_and_click(TemplateKind::Yes, None, None, false)
        .unwrap();

    assert_eq!(harness.locator.thresholds(), vec![0.95, 0.8]);
}

#[test]
fn test_step_confidence_is_passed_to_locator() {
    let harness = Harness::new();
    harness.locator.show(TemplateKind::Save, hit(40, 60));
    let executor = harness.executor();

    let outcome = executor
        .execute(&Step::click("save", TemplateKind::Save).with_confidence(0.9))
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(harness.locator.thresholds(), vec![0.9]);
}

#[test]
fn test_require_reports_failed_step() {
    let harness = Harness::new();
    let result = harness
        .executor()
        .require(&Step::click("confirm", TemplateKind::Confirm));

    match result {
        Err(AutomationError::StepFailed { step }) => assert_eq!(step, "confirm"),
        other => panic!("expected StepFailed, got {other:?}"),
    }
}

#[test]
fn test_paste_text_sets_clipboard_then_pastes() {
    let harness = Harness::new();
    harness.executor().paste_text("3601").unwrap();

    assert_eq!(
        harness.input.events(),
        vec![
            InputEvent::Clipboard("3601".to_string()),
            InputEvent::Chord(vec![Key::Control, Key::Letter('v')])
        ]
    );
}

#[test]
fn test_probe_is_a_single_attempt() {
    let harness = Harness::new();
    let found = harness.executor().probe(TemplateKind::ReceiptError1).unwrap();

    assert!(found.is_none());
    assert_eq!(harness.locator.attempts(TemplateKind::ReceiptError1), 1);
    assert!(harness.clock.sleeps().is_empty());
}
