mod common;

use boothsync_storage::SqliteStateStore;

fn store() -> SqliteStateStore {
    SqliteStateStore::open_in_memory().unwrap()
}

#[test]
fn insert_assigns_ids_per_kind() {
    common::insert_assigns_ids_per_kind(&store());
}

#[test]
fn upsert_replaces_existing() {
    common::upsert_replaces_existing(&store());
}

#[test]
fn ids_are_never_reused() {
    common::ids_are_never_reused(&store());
}

#[test]
fn find_by_name_reports_duplicates() {
    common::find_by_name_reports_duplicates(&store());
}

#[test]
fn record_roundtrips_all_fields() {
    common::record_roundtrips_all_fields(&store());
}

#[test]
fn retire_leaves_tombstone() {
    common::retire_leaves_tombstone(&store());
}

#[test]
fn unnamed_tombstone_reads_back() {
    common::unnamed_tombstone_reads_back(&store());
}

#[test]
fn plain_delete_leaves_no_tombstone() {
    common::plain_delete_leaves_no_tombstone(&store());
}

#[test]
fn upsert_clears_tombstone() {
    common::upsert_clears_tombstone(&store());
}

#[test]
fn remove_tombstone() {
    common::remove_tombstone(&store());
}

#[test]
fn manifest_slot() {
    common::manifest_slot(&store());
}

#[test]
fn data_survives_reopen() {
    use boothsync_storage::LocalStateStore;
    use boothsync_types::EntityKind;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kiosk.db");
    let id = {
        let store = SqliteStateStore::open(&path).unwrap();
        store.store_manifest("{}").unwrap();
        store.upsert(common::template("Persisted")).unwrap()
    };

    let store = SqliteStateStore::open(&path).unwrap();
    let record = store.get(EntityKind::Template, id).unwrap().unwrap();
    assert_eq!(record.name, "Persisted");
    assert_eq!(store.load_manifest().unwrap().as_deref(), Some("{}"));
    assert_ne!(store.upsert(common::template("Next")).unwrap(), id);
}

#[test]
fn negative_tombstone_version_is_rejected() {
    use boothsync_storage::{LocalStateStore, StorageError};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kiosk.db");
    drop(SqliteStateStore::open(&path).unwrap());
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "INSERT INTO tombstones (natural_key, version, deleted_at, deleted_by)
             VALUES ('template/Broken', -1, '2024-01-01T00:00:00+00:00', 'kiosk-test')",
            [],
        )
        .unwrap();
    }

    let store = SqliteStateStore::open(&path).unwrap();
    assert!(matches!(store.tombstones(), Err(StorageError::InvalidData(_))));
}
