//! Notification feed reconciliation against the in-memory backend, and its
//! convergence with the notification badge.

use serde_json::json;
use venered_link::{Backend, MemoryBackend, Operation, Table, TableQuery, FEED_WINDOW};

mod common;
use common::{eventually, notification_for, row_uuid, seed, session, settle};

#[tokio::test]
async fn test_insert_into_full_feed_prepends_and_truncates() {
    let memory = MemoryBackend::new();
    let session = session(&memory);
    let me = session.auth().user_id;
    let seeded = seed(
        &memory,
        Table::Notifications,
        (0..FEED_WINDOW).map(|_| notification_for(me, "like")).collect(),
    );
    let oldest = row_uuid(&seeded[0]);

    let feed = session.notification_feed();
    feed.start(session.realtime()).await.unwrap();
    assert_eq!(feed.len(), FEED_WINDOW);

    let inserted = memory
        .insert(Table::Notifications, vec![notification_for(me, "comment")])
        .await
        .unwrap();
    let newest = row_uuid(&inserted[0]);

    eventually("51st row prepended", || {
        feed.items().first().map(|i| i.id()) == Some(newest)
    })
    .await;
    let items = feed.items();
    assert_eq!(items.len(), FEED_WINDOW);
    assert!(items.iter().all(|i| i.id() != oldest));
}

#[tokio::test]
async fn test_insert_is_hydrated() {
    let memory = MemoryBackend::new();
    let session = session(&memory);
    let me = session.auth().user_id;
    let friend = uuid::Uuid::new_v4();
    let post = uuid::Uuid::new_v4();
    seed(
        &memory,
        Table::Profiles,
        vec![json!({"id": friend, "username": "bo", "full_name": "Bo Ruiz", "avatar_url": null})],
    );
    seed(
        &memory,
        Table::Posts,
        vec![json!({"id": post, "user_id": friend, "content": "sunset", "image_urls": ["https://i/1.png"]})],
    );

    let feed = session.notification_feed();
    feed.start(session.realtime()).await.unwrap();

    let mut row = notification_for(me, "like");
    row["related_user_id"] = json!(friend);
    row["related_post_id"] = json!(post);
    memory.insert(Table::Notifications, vec![row]).await.unwrap();

    eventually("hydrated insert", || feed.len() == 1).await;
    let item = &feed.items()[0];
    assert_eq!(item.related_user.as_ref().map(|u| u.display_name()), Some("Bo Ruiz"));
    assert_eq!(
        item.related_post.as_ref().map(|p| p.image_urls.clone()),
        Some(vec!["https://i/1.png".to_string()])
    );
}

#[tokio::test]
async fn test_update_patches_in_place_without_reordering() {
    let memory = MemoryBackend::new();
    let session = session(&memory);
    let me = session.auth().user_id;
    let rows = seed(
        &memory,
        Table::Notifications,
        vec![notification_for(me, "like"), notification_for(me, "follow"), notification_for(me, "comment")],
    );

    let feed = session.notification_feed();
    feed.start(session.realtime()).await.unwrap();
    let before: Vec<_> = feed.items().iter().map(|i| i.id()).collect();

    let oldest = row_uuid(&rows[0]);
    memory
        .update(
            &TableQuery::new(Table::Notifications).eq("id", oldest),
            json!({"read": true}),
        )
        .await
        .unwrap();

    eventually("oldest row read", || {
        feed.items().iter().any(|i| i.id() == oldest && i.is_read())
    })
    .await;
    let after: Vec<_> = feed.items().iter().map(|i| i.id()).collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_delete_drops_row() {
    let memory = MemoryBackend::new();
    let session = session(&memory);
    let me = session.auth().user_id;
    let rows = seed(
        &memory,
        Table::Notifications,
        vec![notification_for(me, "like"), notification_for(me, "follow")],
    );

    let feed = session.notification_feed();
    feed.start(session.realtime()).await.unwrap();
    assert_eq!(feed.len(), 2);

    let gone = row_uuid(&rows[1]);
    memory
        .delete(&TableQuery::new(Table::Notifications).eq("id", gone))
        .await
        .unwrap();
    eventually("row dropped", || feed.len() == 1).await;
    assert!(feed.items().iter().all(|i| i.id() != gone));
}

#[tokio::test]
async fn test_badge_and_feed_converge() {
    let memory = MemoryBackend::new();
    let session = session(&memory);
    let me = session.auth().user_id;

    let badge = session.unread_notifications();
    let feed = session.notification_feed();
    badge.start(session.realtime()).await.unwrap();
    feed.start(session.realtime()).await.unwrap();

    let inserted = memory
        .insert(
            Table::Notifications,
            vec![notification_for(me, "follow"), notification_for(me, "message")],
        )
        .await
        .unwrap();
    eventually("both saw the follow", || badge.count() == 1 && feed.unread_loaded() == 1).await;

    feed.mark_as_read(row_uuid(&inserted[0])).await.unwrap();
    assert_eq!(feed.unread_loaded(), 0);
    eventually("badge caught up", || badge.count() == 0).await;
    settle().await;
    assert_eq!(badge.count() as usize, feed.unread_loaded());
}

#[tokio::test]
async fn test_mark_all_through_badge() {
    let memory = MemoryBackend::new();
    let session = session(&memory);
    let me = session.auth().user_id;
    seed(
        &memory,
        Table::Notifications,
        vec![notification_for(me, "like"), notification_for(me, "comment")],
    );

    let badge = session.unread_notifications();
    let feed = session.notification_feed();
    badge.start(session.realtime()).await.unwrap();
    feed.start(session.realtime()).await.unwrap();
    assert_eq!(badge.count(), 2);

    feed.mark_all_as_read(&badge).await.unwrap();
    assert_eq!(badge.count(), 0);
    assert_eq!(feed.unread_loaded(), 0);
}

#[tokio::test]
async fn test_failed_mark_as_read_rolls_back() {
    let memory = MemoryBackend::new();
    let session = session(&memory);
    let me = session.auth().user_id;
    let rows = seed(&memory, Table::Notifications, vec![notification_for(me, "like")]);

    let feed = session.notification_feed();
    feed.load().await.unwrap();

    memory.fail_next(Operation::Update, 1);
    assert!(feed.mark_as_read(row_uuid(&rows[0])).await.is_err());
    assert_eq!(feed.unread_loaded(), 1);
    assert_eq!(feed.mutations().pending_count(), 0);
}

#[tokio::test]
async fn test_closed_feed_ignores_late_events() {
    let memory = MemoryBackend::new();
    let session = session(&memory);
    let me = session.auth().user_id;

    let feed = session.notification_feed();
    feed.start(session.realtime()).await.unwrap();
    feed.close();
    assert!(!feed.is_live());

    memory
        .insert(Table::Notifications, vec![notification_for(me, "like")])
        .await
        .unwrap();
    settle().await;
    assert!(feed.is_empty());
}
