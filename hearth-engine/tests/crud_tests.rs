mod common;

use std::sync::Arc;

use common::{RecordingObserver, donor, donors_engine, engines, gift, record, sqlite_pool};
use hearth_db::{SqlitePool, StoreErrorCode};
use hearth_engine::{DeleteMode, EngineError, QueryOptions, RecordEngine};
use hearth_model::{DELETED_AT, EntityDescriptor, Filters};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

// ── Create & read ────────────────────────────────────────────────

#[tokio::test]
async fn create_then_find_round_trips_supplied_fields() {
    let engine = donors_engine().await;
    let data = record(json!({
        "name": "Amina",
        "email": "amina@example.org",
        "age": 34,
        "tags": ["zakat", {"fund": "waqf", "years": [2023, 2024]}],
        "active": false,
        "joined": "2024-01-15",
    }));

    let created = engine.create(data.clone()).await.unwrap();
    let id = created["id"].clone();
    let found = engine
        .find_by_id(id.clone(), &QueryOptions::default())
        .await
        .unwrap()
        .expect("record should exist");

    for (field, value) in &data {
        assert_eq!(&found[field], value, "field {field}");
    }
    assert_eq!(found, created);
}

#[tokio::test]
async fn create_generates_time_ordered_ids_and_timestamps() {
    let engine = donors_engine().await;
    let first = engine.create(donor("Amina", "a@example.org")).await.unwrap();
    let second = engine.create(donor("Bilal", "b@example.org")).await.unwrap();

    let a = first["id"].as_str().unwrap();
    let b = second["id"].as_str().unwrap();
    assert_eq!(uuid::Uuid::parse_str(a).unwrap().get_version_num(), 7);
    assert_ne!(a, b);

    assert!(first["created_at"].is_string());
    assert_eq!(first["created_at"], first["updated_at"]);
    assert_eq!(first[DELETED_AT], Value::Null);
}

#[tokio::test]
async fn create_keeps_caller_supplied_id() {
    let engine = donors_engine().await;
    let mut data = donor("Amina", "a@example.org");
    data.insert("id".into(), json!("donor-1"));
    let created = engine.create(data).await.unwrap();
    assert_eq!(created["id"], json!("donor-1"));
}

#[tokio::test]
async fn integer_keys_are_assigned_by_the_store() {
    let (donors, gifts) = engines().await;
    let amina = donors.create(donor("Amina", "a@example.org")).await.unwrap();

    let first = gifts.create(gift(&amina["id"], 25.5, "zakat")).await.unwrap();
    let second = gifts.create(gift(&amina["id"], 10.0, "sadaqah")).await.unwrap();
    assert_eq!(first["id"], json!(1));
    assert_eq!(second["id"], json!(2));
}

#[tokio::test]
async fn store_defaults_are_read_back() {
    let engine = donors_engine().await;
    let created = engine.create(donor("Amina", "a@example.org")).await.unwrap();
    // `active` defaults to 1 in the table and decodes as a boolean.
    assert_eq!(created["active"], json!(true));
}

#[tokio::test]
async fn find_by_id_returns_none_for_unknown_id() {
    let engine = donors_engine().await;
    let found = engine
        .find_by_id("missing", &QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(found, None);
}

#[tokio::test]
async fn find_by_id_is_served_from_cache() {
    let engine = donors_engine().await;
    let created = engine.create(donor("Amina", "a@example.org")).await.unwrap();

    engine
        .find_by_id(created["id"].clone(), &QueryOptions::default())
        .await
        .unwrap();
    let before = engine.cache().stats().hits;
    engine
        .find_by_id(created["id"].clone(), &QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(engine.cache().stats().hits, before + 1);

    engine
        .find_by_id(created["id"].clone(), &QueryOptions::uncached())
        .await
        .unwrap();
    assert_eq!(engine.cache().stats().hits, before + 1);
}

// ── Validation ───────────────────────────────────────────────────

#[tokio::test]
async fn create_reports_every_violation_at_once() {
    let engine = donors_engine().await;
    let data = record(json!({
        "name": "A name far longer than twenty characters",
        "age": "thirty",
    }));

    let err = engine.create(data).await.unwrap_err();
    let violations = err.violations();
    assert_eq!(violations.len(), 2, "{violations:?}");
    assert!(violations.iter().any(|m| m.starts_with("age: expected an integer")));
    assert!(violations.iter().any(|m| m.starts_with("name: exceeds maximum length of 20")));

    let count = engine.count(&Filters::new(), &QueryOptions::default()).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn null_in_required_column_is_rejected_on_create_only() {
    let engine = donors_engine().await;
    let err = engine
        .create(record(json!({ "name": null })))
        .await
        .unwrap_err();
    assert_eq!(err.violations(), ["name: cannot be null".to_string()]);

    let created = engine.create(donor("Amina", "a@example.org")).await.unwrap();
    let err = engine
        .update(created["id"].clone(), record(json!({ "age": 1.5 })), &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn validation_can_be_disabled() {
    let pool = sqlite_pool().await;
    let engine = RecordEngine::open(pool, EntityDescriptor::new("donors").with_validation(false))
        .await
        .unwrap();
    let created = engine
        .create(record(json!({ "name": "Amina", "age": "unknown" })))
        .await
        .unwrap();
    assert_eq!(created["age"], json!("unknown"));
}

#[tokio::test]
async fn unknown_fields_pass_validation() {
    let engine = donors_engine().await;
    let err = engine
        .create(record(json!({ "name": "Amina", "nickname": "Ami" })))
        .await
        .unwrap_err();
    // Not a validation failure: the store rejects the unknown column.
    assert!(matches!(err, EngineError::Store(_)));
}

#[tokio::test]
async fn duplicate_unique_value_surfaces_store_code() {
    let engine = donors_engine().await;
    engine.create(donor("Amina", "same@example.org")).await.unwrap();
    let err = engine
        .create(donor("Bilal", "same@example.org"))
        .await
        .unwrap_err();
    match err {
        EngineError::Store(store) => {
            assert_eq!(store.code, StoreErrorCode::DuplicateKey);
            assert!(store.sql.unwrap().starts_with("INSERT INTO donors"));
        }
        other => panic!("expected store error, got {other:?}"),
    }
}

// ── Update ───────────────────────────────────────────────────────

#[tokio::test]
async fn update_is_visible_through_the_cache() {
    let engine = donors_engine().await;
    let created = engine.create(donor("Amina", "a@example.org")).await.unwrap();
    let id = created["id"].clone();

    let cached = engine
        .find_by_id(id.clone(), &QueryOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached["name"], json!("Amina"));

    engine
        .update(id.clone(), record(json!({ "name": "Amina H." })), &QueryOptions::default())
        .await
        .unwrap();

    let fresh = engine
        .find_by_id(id, &QueryOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh["name"], json!("Amina H."));
}

#[tokio::test]
async fn update_stamps_updated_at_and_keeps_key() {
    let engine = donors_engine().await;
    let created = engine.create(donor("Amina", "a@example.org")).await.unwrap();
    let id = created["id"].clone();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let updated = engine
        .update(
            id.clone(),
            record(json!({ "id": "hijacked", "age": 40 })),
            &QueryOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(updated["id"], id);
    assert_eq!(updated["age"], json!(40));
    assert_eq!(updated["created_at"], created["created_at"]);
    assert_ne!(updated["updated_at"], created["updated_at"]);
}

#[tokio::test]
async fn update_of_missing_record_is_not_found() {
    let engine = donors_engine().await;
    let err = engine
        .update("missing", record(json!({ "age": 3 })), &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

// ── Delete & restore ─────────────────────────────────────────────

#[tokio::test]
async fn soft_delete_hides_until_restored() {
    let engine = donors_engine().await;
    let created = engine.create(donor("Amina", "a@example.org")).await.unwrap();
    let id = created["id"].clone();
    // Warm the identity cache.
    engine.find_by_id(id.clone(), &QueryOptions::default()).await.unwrap();

    engine.delete(id.clone(), DeleteMode::Soft).await.unwrap();

    let hidden = engine
        .find_by_id(id.clone(), &QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(hidden, None);

    let deleted = engine
        .find_by_id(id.clone(), &QueryOptions::including_deleted())
        .await
        .unwrap()
        .unwrap();
    assert!(deleted[DELETED_AT].is_string());

    let restored = engine.restore(id.clone()).await.unwrap();
    assert_eq!(restored[DELETED_AT], Value::Null);
    let visible = engine
        .find_by_id(id, &QueryOptions::default())
        .await
        .unwrap();
    assert!(visible.is_some());
}

#[tokio::test]
async fn soft_deleted_records_cannot_be_updated_by_default() {
    let engine = donors_engine().await;
    let created = engine.create(donor("Amina", "a@example.org")).await.unwrap();
    let id = created["id"].clone();
    engine.delete(id.clone(), DeleteMode::Soft).await.unwrap();

    let err = engine
        .update(id.clone(), record(json!({ "age": 5 })), &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let updated = engine
        .update(id, record(json!({ "age": 5 })), &QueryOptions::including_deleted())
        .await
        .unwrap();
    assert_eq!(updated["age"], json!(5));
    assert!(updated[DELETED_AT].is_string());
}

#[tokio::test]
async fn deleting_twice_is_not_found() {
    let engine = donors_engine().await;
    let created = engine.create(donor("Amina", "a@example.org")).await.unwrap();
    engine.delete(created["id"].clone(), DeleteMode::Soft).await.unwrap();
    let err = engine
        .delete(created["id"].clone(), DeleteMode::Soft)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn hard_delete_removes_the_row() {
    let engine = donors_engine().await;
    let created = engine.create(donor("Amina", "a@example.org")).await.unwrap();
    let id = created["id"].clone();

    let removed = engine.delete(id.clone(), DeleteMode::Hard).await.unwrap();
    assert_eq!(removed["name"], json!("Amina"));

    let found = engine
        .find_by_id(id, &QueryOptions::including_deleted())
        .await
        .unwrap();
    assert_eq!(found, None);
}

#[tokio::test]
async fn entities_without_soft_delete_always_hard_delete() {
    let (donors, gifts) = engines().await;
    let amina = donors.create(donor("Amina", "a@example.org")).await.unwrap();
    let g = gifts.create(gift(&amina["id"], 5.0, "zakat")).await.unwrap();

    gifts.delete(g["id"].clone(), DeleteMode::Soft).await.unwrap();
    let count = gifts.count(&Filters::new(), &QueryOptions::uncached()).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn restore_requires_soft_delete() {
    let (_, gifts) = engines().await;
    let err = gifts.restore(1).await.unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

// ── Upsert ───────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_creates_then_updates_by_conflict_key() {
    let engine = donors_engine().await;
    let first = engine
        .upsert(record(json!({ "name": "Amina", "email": "a@example.org" })), Some("email"))
        .await
        .unwrap();
    let second = engine
        .upsert(
            record(json!({ "name": "Amina H.", "email": "a@example.org" })),
            Some("email"),
        )
        .await
        .unwrap();

    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["name"], json!("Amina H."));
    let count = engine.count(&Filters::new(), &QueryOptions::default()).await.unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn upsert_updates_soft_deleted_match_by_key() {
    let engine = donors_engine().await;
    let mut data = donor("Amina", "a@example.org");
    data.insert("id".into(), json!("donor-1"));
    engine.create(data).await.unwrap();
    engine.delete("donor-1", DeleteMode::Soft).await.unwrap();

    let updated = engine
        .upsert(record(json!({ "id": "donor-1", "age": 41 })), None)
        .await
        .unwrap();
    assert_eq!(updated["age"], json!(41));
    assert_eq!(updated["name"], json!("Amina"));
}

// ── Observers ────────────────────────────────────────────────────

#[tokio::test]
async fn observers_see_each_write() {
    let observer = Arc::new(RecordingObserver::default());
    let pool: Arc<SqlitePool> = sqlite_pool().await;
    let engine = RecordEngine::open(pool, common::donors_descriptor())
        .await
        .unwrap()
        .with_observer(observer.clone());

    let created = engine.create(donor("Amina", "a@example.org")).await.unwrap();
    let id = created["id"].clone();
    engine
        .update(id.clone(), record(json!({ "name": "Amina H." })), &QueryOptions::default())
        .await
        .unwrap();
    engine.delete(id.clone(), DeleteMode::Soft).await.unwrap();
    engine.restore(id).await.unwrap();

    assert_eq!(
        observer.events(),
        vec![
            "create:Amina",
            "update:Amina->Amina H.",
            "delete:Amina H.:Soft",
            "update:Amina H.->Amina H.",
        ]
    );
}
