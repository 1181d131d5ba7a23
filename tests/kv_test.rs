//! Key-value store persistence tests

use serde_json::json;
use utilkit::kv::KvStore;

#[test]
fn test_values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.db");

    {
        let store = KvStore::open(Some(&path)).unwrap();
        assert_eq!(store.put("name", "utilkit").unwrap(), None);
        assert_eq!(store.put("count", 3).unwrap(), None);
        assert_eq!(store.jput("config", &json!({"retries": 2, "hosts": ["a", "b"]})).unwrap(), None);
    }

    let store = KvStore::open(Some(&path)).unwrap();
    assert_eq!(store.get("name").unwrap().as_deref(), Some("utilkit"));
    assert_eq!(store.get_as::<u32>("count").unwrap(), Some(3));
    assert_eq!(
        store.jget("config").unwrap(),
        Some(json!({"retries": 2, "hosts": ["a", "b"]}))
    );
    assert_eq!(store.jget("name").unwrap(), None);
}

#[test]
fn test_text_and_json_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(Some(&dir.path().join("kv.db"))).unwrap();

    store.put("shared", "text").unwrap();
    store.jput("shared", &json!([1, 2])).unwrap();
    assert_eq!(store.get("shared").unwrap().as_deref(), Some("text"));
    assert_eq!(store.jget("shared").unwrap(), Some(json!([1, 2])));

    assert_eq!(store.put("shared", "new").unwrap().as_deref(), Some("text"));
    assert!(store.delete("shared").unwrap());
    assert!(!store.delete("shared").unwrap());
    assert_eq!(store.get("shared").unwrap(), None);
}

#[test]
fn test_ad_hoc_tables() {
    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(Some(&dir.path().join("kv.db"))).unwrap();

    store
        .execute("CREATE TABLE hosts (name TEXT, port INTEGER)", &[])
        .unwrap();
    store
        .execute("INSERT INTO hosts VALUES (?1, ?2)", &[&"alpha", &8080])
        .unwrap();

    let tables = store.tables().unwrap();
    assert!(tables.contains(&"hosts".to_string()));
    assert!(tables.contains(&"__cache__".to_string()));

    let rows = store.select_all("hosts").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("alpha"));
    assert_eq!(rows[0]["port"], json!(8080));

    store.dump(Some("hosts")).unwrap();
    assert!(store.query("DELETE FROM hosts", &[]).is_err());
}
