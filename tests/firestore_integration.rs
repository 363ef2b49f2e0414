// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running
//! (FIRESTORE_EMULATOR_HOST set); they skip otherwise.

use std::sync::Arc;
use vayu_profile_sync::config::CreatedAtPolicy;
use vayu_profile_sync::db::{collections, DocumentStore, FieldValue, Fields};
use vayu_profile_sync::models::UserIdentity;
use vayu_profile_sync::services::{AuthStateChannel, AuthWatcher, ProfileUpserter};

mod common;
use common::{test_db, unique_uid};

#[tokio::test]
async fn test_new_profile_creation() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid("new");

    assert!(db.get_profile(&uid).await.unwrap().is_none());

    let upserter = ProfileUpserter::new(Arc::new(db.clone()), CreatedAtPolicy::Preserve);
    let identity = UserIdentity::new(uid.clone()).with_email("a@x.com");
    assert!(upserter.upsert(&identity).await.unwrap());

    let profile = db.get_profile(&uid).await.unwrap().expect("profile exists");
    assert_eq!(profile.uid, uid);
    assert_eq!(profile.email.as_deref(), Some("a@x.com"));
    assert_eq!(profile.display_name, None);
    assert_eq!(profile.photo_url, None);
    assert!(profile.created_at.is_some());
    assert!(profile.last_seen_at.is_some());

    println!("✓ New profile created and verified: uid={}", uid);
}

#[tokio::test]
async fn test_repeat_upsert_preserves_created_at() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid("repeat");
    let upserter = ProfileUpserter::new(Arc::new(db.clone()), CreatedAtPolicy::Preserve);

    upserter
        .upsert(&UserIdentity::new(uid.clone()).with_email("old@x.com"))
        .await
        .unwrap();
    let first = db.get_profile(&uid).await.unwrap().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    upserter
        .upsert(
            &UserIdentity::new(uid.clone())
                .with_email("new@x.com")
                .with_display_name("New Name"),
        )
        .await
        .unwrap();
    let second = db.get_profile(&uid).await.unwrap().unwrap();

    assert_eq!(second.email.as_deref(), Some("new@x.com"));
    assert_eq!(second.display_name.as_deref(), Some("New Name"));
    assert_eq!(second.created_at, first.created_at);
    assert!(second.last_seen_at > first.last_seen_at);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_first_sign_ins_stamp_created_at_once() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid("racing");
    let upserter = ProfileUpserter::new(Arc::new(db.clone()), CreatedAtPolicy::Preserve);

    let first = UserIdentity::new(uid.clone()).with_display_name("Tab One");
    let second = UserIdentity::new(uid.clone()).with_display_name("Tab Two");
    let (a, b) = tokio::join!(upserter.upsert(&first), upserter.upsert(&second));
    assert!(a.unwrap());
    assert!(b.unwrap());

    let after_race = db.get_profile(&uid).await.unwrap().expect("profile exists");
    assert!(after_race.created_at.is_some());

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    upserter.upsert(&first).await.unwrap();
    let later = db.get_profile(&uid).await.unwrap().unwrap();

    assert_eq!(later.created_at, after_race.created_at);
    assert!(later.created_at <= later.last_seen_at);
    assert!(later.last_seen_at > after_race.last_seen_at);
}

#[tokio::test]
async fn test_overwrite_policy_restamps_created_at() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid("overwrite");
    let upserter = ProfileUpserter::new(Arc::new(db.clone()), CreatedAtPolicy::Overwrite);

    upserter.upsert(&UserIdentity::new(uid.clone())).await.unwrap();
    let first = db.get_profile(&uid).await.unwrap().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    upserter.upsert(&UserIdentity::new(uid.clone())).await.unwrap();
    let second = db.get_profile(&uid).await.unwrap().unwrap();

    assert!(second.created_at > first.created_at);
}

#[tokio::test]
async fn test_merge_keeps_fields_written_elsewhere() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid("merge");

    let mut extra = Fields::new();
    extra.insert("plan".into(), FieldValue::String("pro".into()));
    db.merge_write(collections::USERS, &uid, extra).await.unwrap();

    let upserter = ProfileUpserter::new(Arc::new(db.clone()), CreatedAtPolicy::Preserve);
    upserter.upsert(&UserIdentity::new(uid.clone())).await.unwrap();

    #[derive(serde::Deserialize)]
    struct WithPlan {
        uid: String,
        plan: Option<String>,
    }

    let stored: WithPlan = db
        .get_document(collections::USERS, &uid)
        .await
        .unwrap()
        .expect("document exists");
    assert_eq!(stored.uid, uid);
    assert_eq!(stored.plan.as_deref(), Some("pro"));
}

#[tokio::test]
async fn test_watcher_writes_through_to_firestore() {
    require_emulator!();

    let db = test_db().await;
    let uid = unique_uid("watched");
    let channel = AuthStateChannel::new();
    let upserter = ProfileUpserter::new(Arc::new(db.clone()), CreatedAtPolicy::Preserve);
    let watcher = AuthWatcher::mount(&channel, upserter).unwrap();

    channel.publish(Some(UserIdentity::new(uid.clone()).with_display_name("Watched")));

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    let profile = loop {
        if let Some(profile) = db.get_profile(&uid).await.unwrap() {
            break profile;
        }
        assert!(tokio::time::Instant::now() < deadline, "profile never written");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    };

    assert_eq!(profile.display_name.as_deref(), Some("Watched"));
    watcher.unmount();
}
