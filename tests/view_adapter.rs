//! View Adapter behavior: registration retry, history, reentrancy guards,
//! session independence.

mod common;

use camwatch::camera_session::{CameraState, CLASSIFIER_ERROR_MARKER};
use camwatch::camera_view::{CameraView, LocalSurfaceProvider, HISTORY_LIMIT};
use camwatch::Error;
use common::*;
use std::sync::Arc;
use std::time::Duration;

fn local_view(classifier: Arc<ScriptedClassifier>) -> CameraView {
    let session = session(FakeDevice::ready(640, 480), classifier, RecordingReporter::new());
    CameraView::new(session, Arc::new(LocalSurfaceProvider::new()))
}

#[tokio::test(start_paused = true)]
async fn registration_succeeds_on_third_attempt() {
    let provider = FlakyProvider::new(2);
    let session = session(FakeDevice::ready(640, 480), ScriptedClassifier::new(), RecordingReporter::new());
    let view = CameraView::new(session.clone(), provider.clone());

    view.activate().await.unwrap();

    assert_eq!(provider.attempt_count(), 3);
    let state = view.state();
    assert!(state.registered);
    assert!(state.error_message.is_none());

    // Registered surfaces are usable by the session
    assert!(session.start(None).await);
}

#[tokio::test(start_paused = true)]
async fn registration_gives_up_after_five_attempts() {
    let provider = FlakyProvider::new(u32::MAX);
    let session = session(FakeDevice::ready(640, 480), ScriptedClassifier::new(), RecordingReporter::new());
    let view = CameraView::new(session, provider.clone());

    let err = view.activate().await.unwrap_err();

    assert!(matches!(err, Error::Surface(_)));
    assert_eq!(provider.attempt_count(), 5);
    assert_eq!(
        view.state().error_message.as_deref(),
        Some(err.user_message())
    );
}

#[tokio::test(start_paused = true)]
async fn failed_registration_leaves_running_session_alone() {
    let session = session(FakeDevice::ready(640, 480), ScriptedClassifier::new(), RecordingReporter::new());
    let first = CameraView::new(session.clone(), Arc::new(LocalSurfaceProvider::new()));
    first.activate().await.unwrap();
    assert_eq!(first.start().await.unwrap(), Some(true));

    let second = CameraView::new(session.clone(), FlakyProvider::new(u32::MAX));
    assert!(second.activate().await.is_err());

    assert!(session.is_active());
    assert!(session.has_stream().await);
}

#[tokio::test(start_paused = true)]
async fn history_keeps_ten_most_recent() {
    let classifier = ScriptedClassifier::new();
    for n in 1..=11 {
        classifier.push(clear(0.50 + n as f64 / 100.0));
    }
    let view = local_view(classifier);
    view.activate().await.unwrap();
    assert_eq!(view.start().await.unwrap(), Some(true));

    for _ in 0..11 {
        view.capture().await.unwrap().unwrap();
    }

    let history = view.state().history;
    assert_eq!(history.len(), HISTORY_LIMIT);
    // 11th capture first, 1st evicted
    assert_eq!(history.get(0).unwrap().confidence.to_string(), "61.00");
    assert_eq!(history.get(9).unwrap().confidence.to_string(), "52.00");
    assert!(history.iter().all(|e| e.label == "Clear"));
}

#[tokio::test(start_paused = true)]
async fn blurry_capture_labelled_not_clear() {
    let view = local_view(ScriptedClassifier::scripted(vec![blurry(0.7)]));
    view.activate().await.unwrap();
    view.start().await.unwrap();

    let entry = view.capture().await.unwrap().unwrap();
    assert_eq!(entry.label, "Not Clear");
    assert_eq!(entry.confidence.to_string(), "70.00");
}

#[tokio::test(start_paused = true)]
async fn duplicate_capture_is_dropped() {
    let classifier = ScriptedClassifier::slow(Duration::from_secs(1));
    let view = local_view(classifier.clone());
    view.activate().await.unwrap();
    view.start().await.unwrap();

    let (first, second) = tokio::join!(view.capture(), view.capture());

    assert!(first.unwrap().is_some());
    assert!(second.unwrap().is_none());
    assert_eq!(classifier.call_count(), 1);
    assert_eq!(view.state().history.len(), 1);
    assert!(!view.state().capturing);
}

#[tokio::test(start_paused = true)]
async fn duplicate_start_is_dropped() {
    let device = FakeDevice::slow(640, 480, Duration::from_millis(500));
    let session = session(device.clone(), ScriptedClassifier::new(), RecordingReporter::new());
    let view = CameraView::new(session, Arc::new(LocalSurfaceProvider::new()));
    view.activate().await.unwrap();

    let (first, second) = tokio::join!(view.start(), view.start());

    assert_eq!(first.unwrap(), Some(true));
    assert_eq!(second.unwrap(), None);
    assert_eq!(device.open_count(), 1);
    assert!(!view.state().starting);
}

#[tokio::test(start_paused = true)]
async fn view_mirrors_session_updates() {
    let session = session(FakeDevice::ready(640, 480), ScriptedClassifier::new(), RecordingReporter::new());
    let view = CameraView::new(session.clone(), Arc::new(LocalSurfaceProvider::new()));
    view.activate().await.unwrap();
    assert!(!view.state().status.is_active);

    // Started by someone else
    assert!(session.start(None).await);
    settle().await;
    assert!(view.state().status.is_active);

    // First automatic cycle
    tokio::time::sleep(Duration::from_millis(3100)).await;
    let status = view.state().status;
    assert_eq!(status.current_status, CameraState::Normal);
    assert_eq!(status.confidence.unwrap().to_string(), "97.00");
}

#[tokio::test(start_paused = true)]
async fn deactivate_keeps_session_running() {
    let session = session(FakeDevice::ready(640, 480), ScriptedClassifier::new(), RecordingReporter::new());
    let view = CameraView::new(session.clone(), Arc::new(LocalSurfaceProvider::new()));
    view.activate().await.unwrap();
    view.start().await.unwrap();
    settle().await;
    let subscribers = session.subscriber_count();

    view.deactivate();
    settle().await;
    assert!(session.is_active());
    assert_eq!(session.subscriber_count(), subscribers - 1);

    drop(view);
    assert!(session.is_active());
    assert!(session.has_stream().await);
}

#[tokio::test(start_paused = true)]
async fn stop_clears_history() {
    let view = local_view(ScriptedClassifier::new());
    view.activate().await.unwrap();
    view.start().await.unwrap();
    view.capture().await.unwrap();
    assert_eq!(view.state().history.len(), 1);

    view.stop().await;

    let state = view.state();
    assert!(state.history.is_empty());
    assert!(!state.status.is_active);
    assert_eq!(state.status.current_status, CameraState::Offline);
}

#[tokio::test(start_paused = true)]
async fn capture_failure_sets_error_message() {
    let view = local_view(ScriptedClassifier::scripted(vec![classifier_down()]));
    view.activate().await.unwrap();
    view.start().await.unwrap();

    let err = view.capture().await.unwrap_err();
    assert!(matches!(err, Error::Classifier(_)));

    let state = view.state();
    assert_eq!(state.error_message.as_deref(), Some(err.user_message()));
    assert!(state.history.is_empty());
    assert!(state.status.is_active);
    assert_eq!(state.status.last_prediction.as_deref(), Some(CLASSIFIER_ERROR_MARKER));

    view.clear_error();
    assert!(view.state().error_message.is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_start_sets_error_message() {
    let session = session(FakeDevice::denied(), ScriptedClassifier::new(), RecordingReporter::new());
    let view = CameraView::new(session, Arc::new(LocalSurfaceProvider::new()));
    view.activate().await.unwrap();

    assert_eq!(view.start().await.unwrap(), Some(false));
    assert!(view.state().error_message.is_some());
    assert_eq!(view.state().status.current_status, CameraState::Offline);
}
