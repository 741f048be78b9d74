//! Integration tests for waiting-queue ordering, withdrawal, and promotion
//! after stale sessions are swept.

mod helpers;

use std::time::Duration;

use chrono::Utc;

use labhub_core::events::{EventKind, MessageType};
use labhub_core::types::id::UserId;
use labhub_database::{QueueStore, SessionStore};
use labhub_entity::{NewLabSession, SessionState};

#[tokio::test(start_paused = true)]
async fn test_waiters_are_served_in_arrival_order() {
    let app = helpers::TestApp::new().await;
    let lab_id = app.create_lab(30, 1).await;

    let mut owner = app.join(lab_id);
    owner.next().await;

    let mut u1 = app.join(lab_id);
    assert_eq!(u1.next_position().await, 1);
    let mut u2 = app.join(lab_id);
    assert_eq!(u2.next_position().await, 2);
    let mut u3 = app.join(lab_id);
    assert_eq!(u3.next_position().await, 3);

    assert_eq!(u1.next().await, EventKind::notice(MessageType::QueuePromoted));
    assert_eq!(u2.next_position().await, 1);
    assert_eq!(u3.next_position().await, 2);

    assert_eq!(u2.next().await, EventKind::notice(MessageType::QueuePromoted));
    assert_eq!(u3.next_position().await, 1);
    assert_eq!(u3.next().await, EventKind::notice(MessageType::QueuePromoted));

    for client in [owner, u1, u2, u3] {
        client.handle.await.unwrap().unwrap().unwrap();
    }

    let mut sessions = app.sessions.all().await;
    sessions.sort_by_key(|s| s.start_time);
    assert_eq!(sessions.len(), 4);
    assert!(sessions.iter().all(|s| s.state == SessionState::Completed));
    for pair in sessions.windows(2) {
        assert!(pair[1].start_time >= pair[0].end_time);
    }
}

#[tokio::test(start_paused = true)]
async fn test_waiter_leaving_refreshes_positions() {
    let app = helpers::TestApp::new().await;
    let lab_id = app.create_lab(60, 1).await;

    let mut owner = app.join(lab_id);
    owner.next().await;

    let mut u1 = app.join(lab_id);
    assert_eq!(u1.next_position().await, 1);
    let mut u2 = app.join(lab_id);
    assert_eq!(u2.next_position().await, 2);

    tokio::time::sleep(Duration::from_secs(5)).await;
    u1.emitter.disconnect();
    assert!(u1.handle.await.unwrap().unwrap().is_none());

    assert_eq!(u2.next_position().await, 1);
    assert_eq!(app.queue.queue_position(lab_id, u1.user_id).await.unwrap(), None);

    assert_eq!(u2.next().await, EventKind::notice(MessageType::QueuePromoted));
    assert!(app.queue.list_queued(lab_id).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_position_matches_queue_length_on_arrival() {
    let app = helpers::TestApp::new().await;
    let lab_id = app.create_lab(600, 1).await;

    let mut owner = app.join(lab_id);
    owner.next().await;

    let mut waiters = Vec::new();
    for expected in 1..=4u64 {
        let before = app.coordinator.waiting(lab_id).await.unwrap().len() as u64;
        let mut waiter = app.join(lab_id);
        assert_eq!(waiter.next_position().await, before + 1);
        assert_eq!(before + 1, expected);
        waiters.push(waiter);
    }
}

#[tokio::test(start_paused = true)]
async fn test_swept_session_promotes_waiter() {
    let app = helpers::TestApp::new().await;
    let lab_id = app.create_lab(60, 1).await;

    let now = Utc::now();
    app.sessions
        .create_session(NewLabSession {
            lab_id,
            owner_id: UserId::new(),
            start_time: now - chrono::Duration::minutes(30),
            end_time: now - chrono::Duration::minutes(29),
            state: SessionState::InProgress,
        })
        .await
        .unwrap();

    let mut waiter = app.join(lab_id);
    assert_eq!(waiter.next_position().await, 1);

    assert_eq!(app.sweeper.run_sweep().await.unwrap(), 1);
    assert_eq!(waiter.next().await, EventKind::notice(MessageType::QueuePromoted));
}
