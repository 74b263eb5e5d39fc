mod common;

use chrono::NaiveDate;
use common::{setup, CannedAssistant};
use lumina_core::domain::{FolderRow, NoteRow, SubjectRow};
use lumina_core::memory::Tables;
use lumina_core::{
    Always, Deletion, EntityId, EventKind, EventPatch, FolderPatch, Mutation, NotePatch,
    StoreError, SubjectPatch,
};
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn creating_a_subject_adds_exactly_one_empty_entry() {
    let (store, remote, alerts) = setup();

    let id = store.create_subject("History").await.unwrap();

    let subjects = store.subjects();
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].name, "History");
    assert!(subjects[0].folders.is_empty());
    assert_eq!(subjects[0].id, id);
    assert!(!id.is_provisional());
    assert_eq!(remote.tables().subjects.len(), 1);
    assert!(alerts.messages().is_empty());
}

#[tokio::test]
async fn staged_record_is_visible_then_reconciled_in_place() {
    let (store, _remote, _alerts) = setup();
    store.create_subject("Algebra").await.unwrap();

    let staged = store.stage_subject("Biology").unwrap();
    let temp = staged.id();
    store.create_subject("Chemistry").await.unwrap();

    let before = store.subjects();
    assert_eq!(before[1].id, temp);
    assert!(temp.is_provisional());

    let real = staged.commit().await.unwrap();

    let names: Vec<String> = store.subjects().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["Algebra", "Biology", "Chemistry"]);
    assert_eq!(store.subjects()[1].id, real);
    assert_eq!(store.resolve(temp), real);
    assert_eq!(store.subject(temp).unwrap().name, "Biology");
}

#[tokio::test]
async fn failed_create_removes_the_provisional_record_and_alerts() {
    let (store, remote, alerts) = setup();
    remote.fail_on("insert_subject");

    let err = store.create_subject("History").await.unwrap_err();

    assert!(matches!(err, StoreError::Remote(_)));
    assert!(store.subjects().is_empty());
    let messages = alerts.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Could not create subject"));
}

#[tokio::test]
async fn deleting_a_subject_cascades_through_local_state() {
    let (store, remote, _alerts) = setup();
    let subject = store.create_subject("Biology").await.unwrap();
    let other = store.create_subject("History").await.unwrap();
    let folder = store.create_folder(subject, "Cells").await.unwrap();
    let note = store.create_note(folder).await.unwrap();
    let event = store
        .create_event("Lab quiz", date(2024, 4, 2), EventKind::Exam, Some(subject))
        .await
        .unwrap();

    let outcome = store.delete_subject(subject, &Always(true)).await.unwrap();

    assert_eq!(outcome, Deletion::Deleted);
    assert_eq!(store.subjects().len(), 1);
    assert_eq!(store.subjects()[0].id, other);
    assert!(store.folder(folder).is_none());
    assert!(store.note(note).is_none());
    assert_eq!(store.event(event).unwrap().subject_id, None);
    assert!(remote.tables().notes.is_empty());
}

#[tokio::test]
async fn failed_delete_leaves_local_state_unchanged() {
    let (store, remote, alerts) = setup();
    store.create_subject("Algebra").await.unwrap();
    let subject = store.create_subject("Biology").await.unwrap();
    store.create_subject("Chemistry").await.unwrap();
    let folder = store.create_folder(subject, "Cells").await.unwrap();
    store.create_note(folder).await.unwrap();
    store
        .create_event("Lab quiz", date(2024, 4, 2), EventKind::Exam, Some(subject))
        .await
        .unwrap();
    let subjects_before = store.subjects();
    let events_before = store.events();

    remote.fail_on("delete_subject");
    let err = store.delete_subject(subject, &Always(true)).await.unwrap_err();

    assert!(matches!(err, StoreError::Remote(_)));
    assert_eq!(store.subjects(), subjects_before);
    assert_eq!(store.events(), events_before);
    assert_eq!(alerts.messages().len(), 1);
}

#[tokio::test]
async fn declined_delete_never_reaches_the_remote_store() {
    let (store, remote, _alerts) = setup();
    let subject = store.create_subject("History").await.unwrap();

    let outcome = store.delete_subject(subject, &Always(false)).await.unwrap();

    assert_eq!(outcome, Deletion::Declined);
    assert_eq!(store.subjects().len(), 1);
    assert!(!remote.calls().iter().any(|call| call == "delete_subject"));
}

#[tokio::test]
async fn update_before_create_resolves_reaches_the_real_row() {
    let (store, remote, _alerts) = setup();
    let subject = store.create_subject("Biology").await.unwrap();
    let folder = store.create_folder(subject, "Cells").await.unwrap();

    let gate = remote.hold_inserts();
    let staged = store.stage_note(folder).unwrap();
    let temp = staged.id();

    let (created, updated) = tokio::join!(staged.commit(), async {
        let outcome = store.update_note(temp, NotePatch::content("Mitochondria")).await;
        gate.notify_one();
        outcome
    });

    let real = created.unwrap();
    assert_eq!(updated.unwrap(), Mutation::Queued);
    let row = remote.note_row(real.confirmed().unwrap()).unwrap();
    assert_eq!(row.content, "Mitochondria");
    assert_eq!(store.note(temp).unwrap().content, "Mitochondria");
    assert_eq!(store.note(real).unwrap().id, real);
}

#[tokio::test]
async fn later_updates_through_the_temporary_id_target_the_real_row() {
    let (store, remote, _alerts) = setup();
    let subject = store.create_subject("Biology").await.unwrap();
    let folder = store.create_folder(subject, "Cells").await.unwrap();
    let staged = store.stage_note(folder).unwrap();
    let temp = staged.id();
    let real = staged.commit().await.unwrap();

    let outcome = store
        .update_note(temp, NotePatch::content("Ribosomes"))
        .await
        .unwrap();

    assert_eq!(outcome, Mutation::Applied);
    assert_eq!(remote.note_row(real.confirmed().unwrap()).unwrap().content, "Ribosomes");
}

#[tokio::test]
async fn delete_before_create_resolves_removes_the_remote_row() {
    let (store, remote, _alerts) = setup();
    let gate = remote.hold_inserts();
    let staged = store.stage_event("Revise", date(2024, 5, 1), EventKind::Study, None).unwrap();
    let temp = staged.id();

    let (created, deleted) = tokio::join!(staged.commit(), async {
        let outcome = store.delete_event(temp, &Always(true)).await;
        gate.notify_one();
        outcome
    });

    created.unwrap();
    assert_eq!(deleted.unwrap(), Deletion::Queued);
    assert!(store.events().is_empty());
    assert!(remote.tables().events.is_empty());
    assert!(remote.calls().iter().any(|call| call == "delete_event"));
}

#[tokio::test]
async fn failed_update_restores_previous_values() {
    let (store, remote, alerts) = setup();
    let subject = store.create_subject("History").await.unwrap();
    remote.fail_on("update_subject");

    let patch = SubjectPatch {
        name: Some("Ancient History".into()),
        color: Some("rose".into()),
    };
    let original = store.subject(subject).unwrap();
    let err = store.update_subject(subject, patch).await.unwrap_err();

    assert!(matches!(err, StoreError::Remote(_)));
    assert_eq!(store.subject(subject).unwrap(), original);
    assert!(alerts.messages()[0].starts_with("Could not update subject"));
}

#[tokio::test]
async fn event_updates_apply_locally_and_remotely() {
    let (store, remote, _alerts) = setup();
    let event = store
        .create_event("Essay", date(2024, 6, 1), EventKind::Deadline, None)
        .await
        .unwrap();

    let patch = EventPatch {
        date: Some(date(2024, 6, 3)),
        ..EventPatch::default()
    };
    store.update_event(event, patch).await.unwrap();

    assert_eq!(store.event(event).unwrap().date, date(2024, 6, 3));
    assert_eq!(remote.tables().events[0].date, date(2024, 6, 3));
}

#[tokio::test]
async fn children_cannot_be_created_under_a_provisional_parent() {
    let (store, _remote, _alerts) = setup();
    let staged = store.stage_subject("Physics").unwrap();

    let err = store.stage_folder(staged.id(), "Mechanics").err().unwrap();
    assert!(matches!(err, StoreError::ParentNotConfirmed { kind: "subject", .. }));

    staged.commit().await.unwrap();
}

#[tokio::test]
async fn blank_names_and_unknown_parents_are_rejected() {
    let (store, _remote, _alerts) = setup();
    assert!(matches!(store.stage_subject("   ").err(), Some(StoreError::Blank(_))));

    let missing = EntityId::Confirmed(Uuid::new_v4());
    assert!(matches!(
        store.stage_folder(missing, "Notes").err(),
        Some(StoreError::NotFound { kind: "subject", .. })
    ));
}

#[tokio::test]
async fn load_rebuilds_the_nested_workspace() {
    let (store, remote, _alerts) = setup();
    {
        let mut tables = Tables::default();
        let subject = SubjectRow {
            id: Uuid::new_v4(),
            name: "Computer Science 101".into(),
            color: "indigo".into(),
        };
        let folder = FolderRow {
            id: Uuid::new_v4(),
            subject_id: subject.id,
            name: "Lecture Notes".into(),
        };
        tables.notes.push(NoteRow {
            id: Uuid::new_v4(),
            folder_id: folder.id,
            title: "Data Structures Intro".into(),
            content: "Arrays and Linked Lists are fundamental...".into(),
            created_at: chrono::Utc::now(),
            summary: None,
        });
        tables.subjects.push(subject);
        tables.folders.push(folder);
        remote.memory.seed(tables);
    }

    store.load().await.unwrap();

    let subjects = store.subjects();
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].folders[0].notes[0].title, "Data Structures Intro");
    assert_eq!(store.search("lecture").len(), 1);
    assert!(store.search("history").is_empty());
}

#[tokio::test]
async fn summaries_are_saved_and_malformed_flashcards_become_empty() {
    let (store, remote, _alerts) = setup();
    let subject = store.create_subject("Biology").await.unwrap();
    let folder = store.create_folder(subject, "Cells").await.unwrap();
    let note = store.create_note(folder).await.unwrap();

    let assistant = CannedAssistant::replying("Cells make energy.");
    assert!(matches!(
        store.summarize_note(&assistant, note).await,
        Err(StoreError::EmptyNote(_))
    ));

    store
        .update_note(note, NotePatch::content("Mitochondria produce ATP."))
        .await
        .unwrap();
    let summary = store.summarize_note(&assistant, note).await.unwrap();
    assert_eq!(summary, "Cells make energy.");
    assert_eq!(store.note(note).unwrap().summary.as_deref(), Some("Cells make energy."));
    assert_eq!(
        remote.note_row(note.confirmed().unwrap()).unwrap().summary.as_deref(),
        Some("Cells make energy.")
    );

    let mut assistant = CannedAssistant::replying("ok");
    assistant.flashcards_raw = r#"[{"question":"What makes ATP?","answer":"Mitochondria"}]"#.into();
    assert_eq!(store.generate_flashcards(&assistant, note).await.unwrap().len(), 1);

    assistant.flashcards_raw = "not json at all".into();
    let cards = store.generate_flashcards(&assistant, note).await.unwrap();
    assert!(cards.is_empty());
    assert!(store.note(note).unwrap().flashcards.is_empty());
}

#[tokio::test]
async fn failed_child_creates_remove_their_provisional_records() {
    let (store, remote, alerts) = setup();
    let subject = store.create_subject("Biology").await.unwrap();
    let folder = store.create_folder(subject, "Cells").await.unwrap();
    remote.fail_on("insert_folder");
    remote.fail_on("insert_note");
    remote.fail_on("insert_event");

    assert!(store.create_folder(subject, "Genetics").await.is_err());
    assert!(store.create_note(folder).await.is_err());
    assert!(store
        .create_event("Lab quiz", date(2024, 4, 2), EventKind::Exam, Some(subject))
        .await
        .is_err());

    assert_eq!(store.subject(subject).unwrap().folders.len(), 1);
    assert!(store.folder(folder).unwrap().notes.is_empty());
    assert!(store.events().is_empty());
    let messages = alerts.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("Could not create folder"));
    assert!(messages[1].starts_with("Could not create note"));
    assert!(messages[2].starts_with("Could not create event"));
}

#[tokio::test]
async fn failed_child_deletes_restore_each_record_in_place() {
    let (store, remote, alerts) = setup();
    let subject = store.create_subject("Biology").await.unwrap();
    let cells = store.create_folder(subject, "Cells").await.unwrap();
    store.create_folder(subject, "Genetics").await.unwrap();
    let first_note = store.create_note(cells).await.unwrap();
    store.create_note(cells).await.unwrap();
    store
        .create_event("Reading", date(2024, 4, 1), EventKind::Study, None)
        .await
        .unwrap();
    let quiz = store
        .create_event("Lab quiz", date(2024, 4, 2), EventKind::Exam, Some(subject))
        .await
        .unwrap();
    store
        .create_event("Essay", date(2024, 4, 3), EventKind::Deadline, None)
        .await
        .unwrap();
    let subjects_before = store.subjects();
    let events_before = store.events();

    remote.fail_on("delete_folder");
    remote.fail_on("delete_note");
    remote.fail_on("delete_event");
    assert!(store.delete_folder(cells, &Always(true)).await.is_err());
    assert!(store.delete_note(first_note, &Always(true)).await.is_err());
    assert!(store.delete_event(quiz, &Always(true)).await.is_err());

    assert_eq!(store.subjects(), subjects_before);
    assert_eq!(store.events(), events_before);
    let messages = alerts.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("Could not delete folder"));
    assert!(messages[1].starts_with("Could not delete note"));
    assert!(messages[2].starts_with("Could not delete event"));
}

#[tokio::test]
async fn queued_update_is_dropped_when_the_create_fails() {
    let (store, remote, alerts) = setup();
    let subject = store.create_subject("Biology").await.unwrap();
    let folder = store.create_folder(subject, "Cells").await.unwrap();
    let gate = remote.hold_inserts();
    remote.fail_on("insert_note");
    let staged = store.stage_note(folder).unwrap();
    let temp = staged.id();

    let (created, updated) = tokio::join!(staged.commit(), async {
        let outcome = store.update_note(temp, NotePatch::content("Mitochondria")).await;
        gate.notify_one();
        outcome
    });

    assert!(created.is_err());
    assert_eq!(updated.unwrap(), Mutation::Queued);
    assert!(store.note(temp).is_none());
    assert!(store.folder(folder).unwrap().notes.is_empty());
    assert!(!remote.calls().iter().any(|call| call == "update_note"));
    assert_eq!(alerts.messages().len(), 1);
}

#[tokio::test]
async fn failed_replay_of_a_queued_update_restores_the_record() {
    let (store, remote, alerts) = setup();
    let subject = store.create_subject("Biology").await.unwrap();
    let folder = store.create_folder(subject, "Cells").await.unwrap();
    let gate = remote.hold_inserts();
    remote.fail_on("update_note");
    let staged = store.stage_note(folder).unwrap();
    let temp = staged.id();

    let (created, updated) = tokio::join!(staged.commit(), async {
        let outcome = store.update_note(temp, NotePatch::content("Mitochondria")).await;
        gate.notify_one();
        outcome
    });

    let real = created.unwrap();
    assert_eq!(updated.unwrap(), Mutation::Queued);
    assert_eq!(store.note(real).unwrap().content, "");
    assert_eq!(remote.note_row(real.confirmed().unwrap()).unwrap().content, "");
    let messages = alerts.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Could not update note"));
}

#[tokio::test]
async fn failed_replay_of_a_queued_delete_restores_the_record() {
    let (store, remote, alerts) = setup();
    let gate = remote.hold_inserts();
    remote.fail_on("delete_event");
    let staged = store.stage_event("Revise", date(2024, 5, 1), EventKind::Study, None).unwrap();
    let temp = staged.id();

    let (created, deleted) = tokio::join!(staged.commit(), async {
        let outcome = store.delete_event(temp, &Always(true)).await;
        gate.notify_one();
        outcome
    });

    let real = created.unwrap();
    assert_eq!(deleted.unwrap(), Deletion::Queued);
    assert_eq!(store.events().len(), 1);
    assert_eq!(store.event(temp).unwrap().id, real);
    assert_eq!(remote.tables().events.len(), 1);
    assert!(alerts.messages()[0].starts_with("Could not delete event"));
}

#[tokio::test]
async fn child_confirmed_while_its_parent_delete_fails_keeps_the_server_id() {
    let (store, remote, alerts) = setup();
    let subject = store.create_subject("Biology").await.unwrap();
    let staged = store.stage_folder(subject, "Cells").unwrap();
    let temp = staged.id();
    let gate = remote.hold_deletes();
    remote.fail_on("delete_subject");

    let (deleted, created) = tokio::join!(store.delete_subject(subject, &Always(true)), async {
        let created = staged.commit().await;
        gate.notify_one();
        created
    });

    assert!(deleted.is_err());
    let real = created.unwrap();
    let restored = store.subject(subject).unwrap();
    assert_eq!(restored.folders.len(), 1);
    assert_eq!(restored.folders[0].id, real);
    assert_eq!(store.folder(temp).unwrap().id, real);

    let renamed = FolderPatch {
        name: Some("Organelles".into()),
    };
    assert_eq!(store.update_folder(temp, renamed).await.unwrap(), Mutation::Applied);
    assert_eq!(remote.tables().folders[0].name, "Organelles");
    assert_eq!(alerts.messages().len(), 1);
}

#[tokio::test]
async fn child_create_failing_while_its_parent_delete_fails_is_not_restored() {
    let (store, remote, alerts) = setup();
    let subject = store.create_subject("Biology").await.unwrap();
    let staged = store.stage_folder(subject, "Cells").unwrap();
    let temp = staged.id();
    let gate = remote.hold_deletes();
    remote.fail_on("delete_subject");
    remote.fail_on("insert_folder");

    let (deleted, created) = tokio::join!(store.delete_subject(subject, &Always(true)), async {
        let created = staged.commit().await;
        gate.notify_one();
        created
    });

    assert!(deleted.is_err());
    assert!(created.is_err());
    assert!(store.subject(subject).unwrap().folders.is_empty());
    assert!(store.folder(temp).is_none());
    assert_eq!(alerts.messages().len(), 2);
}
