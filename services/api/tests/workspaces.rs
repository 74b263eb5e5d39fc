mod common;

use std::time::Duration;

use common::{harness, send, settle};
use lumina_core::domain::SubjectRow;
use lumina_core::memory::Tables;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn idle_workspaces_are_evicted_and_reloaded_from_the_remote_store() {
    let dir = tempfile::tempdir().unwrap();
    let harness = harness(dir.path());
    let user = Uuid::new_v4();

    send(&harness.router, user, "POST", "/subjects", Some(json!({ "name": "History" }))).await;
    settle(&harness.router, user).await;
    assert_eq!(harness.state.loaded_workspaces(), 1);

    // Recently used workspaces stay.
    assert_eq!(harness.state.evict_idle(Duration::from_secs(3600)), 0);
    assert_eq!(harness.state.evict_idle(Duration::ZERO), 1);
    assert_eq!(harness.state.loaded_workspaces(), 0);

    // Another device changed the rows in the meantime.
    harness.remotes.store(user).seed(Tables {
        subjects: vec![SubjectRow {
            id: Uuid::new_v4(),
            name: "Geography".into(),
            color: "emerald".into(),
        }],
        ..Tables::default()
    });

    let workspace = settle(&harness.router, user).await;
    let subjects = workspace["subjects"].as_array().unwrap();
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0]["name"], "Geography");
}

#[tokio::test]
async fn workspaces_in_use_are_not_evicted() {
    let dir = tempfile::tempdir().unwrap();
    let harness = harness(dir.path());
    let user = Uuid::new_v4();

    let workspace = harness.state.workspace(user).await.unwrap();
    assert_eq!(harness.state.evict_idle(Duration::ZERO), 0);

    drop(workspace);
    assert_eq!(harness.state.evict_idle(Duration::ZERO), 1);
}

#[tokio::test]
async fn preferences_do_not_load_the_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let harness = harness(dir.path());
    let user = Uuid::new_v4();

    send(
        &harness.router,
        user,
        "PUT",
        "/preferences",
        Some(json!({ "darkMode": true, "compactView": false })),
    )
    .await;
    let (_, saved) = send(&harness.router, user, "GET", "/preferences", None).await;

    assert_eq!(saved["darkMode"], true);
    assert_eq!(harness.state.loaded_workspaces(), 0);
    assert!(dir
        .path()
        .join(user.to_string())
        .join("lumina_settings.json")
        .exists());
}
