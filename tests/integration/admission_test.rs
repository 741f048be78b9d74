//! Integration tests for admission and the session countdown.

mod helpers;

use std::time::Duration;

use tokio::time::Instant;

use labhub_core::error::ErrorKind;
use labhub_core::events::{CompletionReason, EventKind, MessageType, RemainingTime, TimeUnit};
use labhub_core::types::id::{LabId, UserId};
use labhub_database::SessionStore;
use labhub_entity::{Laboratory, SessionState};
use labhub_realtime::ChannelEmitter;

fn minutes(value: u64) -> EventKind {
    EventKind::message(
        MessageType::SessionWarning,
        RemainingTime {
            value,
            unit: TimeUnit::Minutes,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_five_minute_session_timeline() {
    let app = helpers::TestApp::new().await;
    let lab_id = app.create_lab(300, 1).await;

    let started = Instant::now();
    let mut client = app.join(lab_id);

    let mut events = Vec::new();
    loop {
        let event = client.next().await;
        let finished = event == EventKind::notice(MessageType::SessionFinished);
        events.push(event);
        if finished {
            break;
        }
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(300), "finished early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(301), "finished late: {elapsed:?}");

    let admission = (&mut client.handle).await.unwrap().unwrap().unwrap();
    assert!(!admission.queued);
    assert_eq!(admission.reason, CompletionReason::Expired);

    assert_eq!(events.len(), 22);
    assert_eq!(
        &events[..5],
        &[minutes(5), minutes(4), minutes(3), minutes(2), minutes(1)]
    );
    assert_eq!(
        events[5],
        EventKind::message(MessageType::SessionWarning, RemainingTime::seconds(15))
    );
    for (i, event) in events[6..21].iter().enumerate() {
        assert_eq!(
            *event,
            EventKind::message(
                MessageType::SessionEnding,
                RemainingTime::seconds(14 - i as u64)
            )
        );
    }
    assert_eq!(events[21], EventKind::notice(MessageType::SessionFinished));

    let session = app
        .sessions
        .find_session(admission.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.state, SessionState::Completed);
    assert_eq!(session.owner_id, client.user_id);
    let length = session.end_time - session.start_time;
    assert!((length - chrono::Duration::seconds(300)).num_seconds().abs() <= 1);
}

#[tokio::test(start_paused = true)]
async fn test_event_ids_increase() {
    let app = helpers::TestApp::new().await;
    let lab_id = app.create_lab(30, 1).await;

    let mut client = app.join(lab_id);
    let mut last = 0;
    while let Some(event) = client.stream.recv().await {
        assert!(event.id > last);
        last = event.id;
        if event.kind == EventKind::notice(MessageType::SessionFinished) {
            break;
        }
    }
    assert!(last > 0);
}

#[tokio::test(start_paused = true)]
async fn test_occupied_lab_queues_then_promotes() {
    let app = helpers::TestApp::new().await;
    let lab_id = app.create_lab(60, 1).await;

    let mut first = app.join(lab_id);
    assert_eq!(first.next().await, minutes(1));

    let mut second = app.join(lab_id);
    assert_eq!(second.next_position().await, 1);

    assert_eq!(second.next().await, EventKind::notice(MessageType::QueuePromoted));
    assert_eq!(second.next().await, minutes(1));

    let first_admission = first.handle.await.unwrap().unwrap().unwrap();
    assert_eq!(first_admission.reason, CompletionReason::Expired);

    let second_admission = second.handle.await.unwrap().unwrap().unwrap();
    assert!(second_admission.queued);
    assert_eq!(second_admission.reason, CompletionReason::Expired);

    let first_session = app
        .sessions
        .find_session(first_admission.session_id)
        .await
        .unwrap()
        .unwrap();
    let second_session = app
        .sessions
        .find_session(second_admission.session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(second_session.start_time >= first_session.end_time);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_mid_session_frees_slot() {
    let app = helpers::TestApp::new().await;
    let lab_id = app.create_lab(300, 1).await;
    let started = tokio::time::Instant::now();

    let mut owner = app.join(lab_id);
    owner.next().await;

    let mut waiter = app.join(lab_id);
    assert_eq!(waiter.next_position().await, 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    owner.emitter.disconnect();

    let admission = owner.handle.await.unwrap().unwrap().unwrap();
    assert_eq!(admission.reason, CompletionReason::Disconnected);

    assert_eq!(waiter.next().await, EventKind::notice(MessageType::QueuePromoted));
    assert!(started.elapsed() < Duration::from_secs(300));

    let session = app
        .sessions
        .find_session(admission.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.state, SessionState::Completed);
    assert!(session.end_time - session.start_time < chrono::Duration::seconds(300));
}

#[tokio::test(start_paused = true)]
async fn test_emitter_failure_before_first_event() {
    let app = helpers::TestApp::new().await;
    let lab_id = app.create_lab(300, 1).await;
    let user_id = UserId::new();

    let (emitter, stream) = ChannelEmitter::new(8);
    drop(stream);

    let admission = app
        .admission
        .admit(lab_id, user_id, emitter)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(admission.reason, CompletionReason::Expired);

    let session = app
        .sessions
        .find_session(admission.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.state, SessionState::Completed);
    assert_eq!(app.sessions.count_in_progress(lab_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_admission_rejects_unknown_or_unconfigured_lab() {
    let app = helpers::TestApp::new().await;

    let (emitter, mut stream) = ChannelEmitter::new(8);
    let err = app
        .admission
        .admit(LabId::new(), UserId::new(), emitter)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(stream.try_recv().is_none());

    let lab_id = LabId::new();
    app.labs
        .insert(Laboratory {
            id: lab_id,
            name: "Unscheduled bench".to_string(),
            duration_seconds: None,
            capacity: 1,
        })
        .await;
    let (emitter, mut stream) = ChannelEmitter::new(8);
    let err = app
        .admission
        .admit(lab_id, UserId::new(), emitter)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
    assert!(stream.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_capacity_allows_parallel_sessions() {
    let app = helpers::TestApp::new().await;
    let lab_id = app.create_lab(60, 2).await;

    let mut a = app.join(lab_id);
    assert_eq!(a.next().await, minutes(1));
    let mut b = app.join(lab_id);
    assert_eq!(b.next().await, minutes(1));
    let mut c = app.join(lab_id);
    assert_eq!(c.next_position().await, 1);

    assert_eq!(app.sessions.count_in_progress(lab_id).await.unwrap(), 2);
    assert_eq!(c.next().await, EventKind::notice(MessageType::QueuePromoted));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_client_disconnect_frees_slot() {
    let app = helpers::TestApp::new().await;
    let lab_id = app.create_lab(300, 1).await;

    // A client that never reads: the countdown fills its buffer and blocks.
    let (emitter, _stream) = ChannelEmitter::new(1);
    let stalled = {
        let admission = app.admission.clone();
        let emitter = emitter.clone();
        tokio::spawn(async move { admission.admit(lab_id, UserId::new(), emitter).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    let mut waiter = app.join(lab_id);
    assert_eq!(waiter.next_position().await, 1);

    tokio::time::sleep(Duration::from_secs(120)).await;
    emitter.disconnect();

    assert_eq!(waiter.next().await, EventKind::notice(MessageType::QueuePromoted));
    let admission = stalled.await.unwrap().unwrap().unwrap();
    assert_eq!(admission.reason, CompletionReason::Disconnected);

    let session = app
        .sessions
        .find_session(admission.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.state, SessionState::Completed);
}
