//! Behaviour every `LocalStateStore` implementation must share.

use boothsync_storage::{retire, EntityRecord, LocalStateStore};
use boothsync_types::{DeviceId, EntityKind, LocalId, NaturalKey};
use pretty_assertions::assert_eq;
use serde_json::json;

pub fn device() -> DeviceId {
    DeviceId::new("kiosk-test")
}

pub fn template(name: &str) -> EntityRecord {
    EntityRecord::new(EntityKind::Template, name, json!({"width": 1200, "height": 1800}), &device())
}

pub fn insert_assigns_ids_per_kind(store: &dyn LocalStateStore) {
    let t1 = store.upsert(template("A")).unwrap();
    let t2 = store.upsert(template("B")).unwrap();
    let e1 = store
        .upsert(EntityRecord::new(EntityKind::Event, "Gala", json!({}), &device()))
        .unwrap();
    assert_eq!(t1, LocalId::new(1));
    assert_eq!(t2, LocalId::new(2));
    assert_eq!(e1, LocalId::new(1));
    assert_eq!(store.list(EntityKind::Template).unwrap().len(), 2);
    assert_eq!(store.list(EntityKind::Event).unwrap().len(), 1);
    assert!(store.list(EntityKind::Setting).unwrap().is_empty());
}

pub fn upsert_replaces_existing(store: &dyn LocalStateStore) {
    let id = store.upsert(template("A")).unwrap();
    let mut record = store.get(EntityKind::Template, id).unwrap().unwrap();
    record.data = json!({"width": 600});
    record.touch(&device());
    store.upsert(record.clone()).unwrap();

    let stored = store.get(EntityKind::Template, id).unwrap().unwrap();
    assert_eq!(stored.data, json!({"width": 600}));
    assert_eq!(stored.version, 2);
    assert_eq!(store.list(EntityKind::Template).unwrap().len(), 1);
}

pub fn ids_are_never_reused(store: &dyn LocalStateStore) {
    let first = store.upsert(template("A")).unwrap();
    assert!(store.delete(EntityKind::Template, first).unwrap());
    let second = store.upsert(template("A")).unwrap();
    assert_ne!(first, second);
    assert!(!store.delete(EntityKind::Template, first).unwrap());
}

pub fn find_by_name_reports_duplicates(store: &dyn LocalStateStore) {
    store.upsert(template("Dup")).unwrap();
    store.upsert(template("Dup")).unwrap();
    store.upsert(template("Other")).unwrap();
    assert_eq!(store.find_by_name(EntityKind::Template, "Dup").unwrap().len(), 2);
    assert!(store.find_by_name(EntityKind::Event, "Dup").unwrap().is_empty());
}

pub fn record_roundtrips_all_fields(store: &dyn LocalStateStore) {
    let record = EntityRecord::new(EntityKind::Event, "Gala", json!({"title": "Gala night"}), &device())
        .with_reference(EntityKind::Template, "Classic", Some(LocalId::new(7)))
        .with_asset("overlay.png", vec![1, 2, 3]);
    let id = store.upsert(record.clone()).unwrap();
    let stored = store.get(EntityKind::Event, id).unwrap().unwrap();

    let mut expected = record;
    expected.id = Some(id);
    assert_eq!(stored, expected);
    assert_eq!(stored.content_hash().unwrap(), expected.content_hash().unwrap());
}

pub fn retire_leaves_tombstone(store: &dyn LocalStateStore) {
    let id = store.upsert(template("Old")).unwrap();
    let tombstone = retire(store, EntityKind::Template, id, &device()).unwrap().unwrap();
    assert_eq!(tombstone.key, NaturalKey::new(EntityKind::Template, "Old"));
    assert_eq!(tombstone.version, 2);
    assert!(store.get(EntityKind::Template, id).unwrap().is_none());
    assert_eq!(store.tombstones().unwrap(), vec![tombstone]);

    assert!(retire(store, EntityKind::Template, id, &device()).unwrap().is_none());
}

pub fn unnamed_tombstone_reads_back(store: &dyn LocalStateStore) {
    let id = store.upsert(template("")).unwrap();
    retire(store, EntityKind::Template, id, &device()).unwrap();
    let tombstones = store.tombstones().unwrap();
    assert_eq!(tombstones.len(), 1);
    assert_eq!(tombstones[0].key, NaturalKey::new(EntityKind::Template, ""));
}

pub fn plain_delete_leaves_no_tombstone(store: &dyn LocalStateStore) {
    let id = store.upsert(template("Wiped")).unwrap();
    store.delete(EntityKind::Template, id).unwrap();
    assert!(store.tombstones().unwrap().is_empty());
}

pub fn upsert_clears_tombstone(store: &dyn LocalStateStore) {
    let id = store.upsert(template("Back")).unwrap();
    retire(store, EntityKind::Template, id, &device()).unwrap();
    assert_eq!(store.tombstones().unwrap().len(), 1);
    store.upsert(template("Back")).unwrap();
    assert!(store.tombstones().unwrap().is_empty());
}

pub fn remove_tombstone(store: &dyn LocalStateStore) {
    let id = store.upsert(template("Gone")).unwrap();
    retire(store, EntityKind::Template, id, &device()).unwrap();
    let key = NaturalKey::new(EntityKind::Template, "Gone");
    assert!(store.remove_tombstone(&key).unwrap());
    assert!(!store.remove_tombstone(&key).unwrap());
}

pub fn manifest_slot(store: &dyn LocalStateStore) {
    assert!(store.load_manifest().unwrap().is_none());
    store.store_manifest("{\"globalVersion\":1}").unwrap();
    store.store_manifest("{\"globalVersion\":2}").unwrap();
    assert_eq!(store.load_manifest().unwrap().as_deref(), Some("{\"globalVersion\":2}"));
}
