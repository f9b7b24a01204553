#![allow(dead_code)]

use identity_rekey::store::memory::{Column, TableSchema};
use identity_rekey::{Datastore, MemoryStore, RekeyError, Result, Row, Select, Update, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub const PREFIX: &str = "oc_";

pub const OLD: &str = "alice";
pub const NEW: &str = "5f0c5a2e-8d2b-4a4c-9f76-0c1a3e0d9b11";

/// Every governed table, prefixed, with the columns the rules touch plus
/// the uniqueness the real schema enforces on them.
pub fn owncloud_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    let tables: Vec<(&str, Vec<Column>)> = vec![
        (
            "accounts",
            vec![Column::new("id").unique(), Column::new("user_id").unique(), Column::new("lower_user_id")],
        ),
        (
            "activity",
            vec![
                Column::new("activity_id").unique(),
                Column::new("user"),
                Column::new("affecteduser"),
                Column::new("subjectparams"),
            ],
        ),
        ("authtoken", vec![Column::new("id").unique(), Column::new("uid")]),
        ("comments", vec![Column::new("id").unique(), Column::new("actor_id")]),
        ("comments_read_markers", vec![Column::new("user_id"), Column::new("object_id")]),
        (
            "ldap_user_mapping",
            vec![Column::new("owncloud_name").unique(), Column::new("directory_uuid").unique()],
        ),
        (
            "mounts",
            vec![Column::new("id").unique(), Column::new("user_id"), Column::new("mount_point")],
        ),
        ("preferences", vec![Column::new("userid"), Column::new("configkey")]),
        (
            "share",
            vec![
                Column::new("id").unique(),
                Column::new("share_with"),
                Column::new("uid_owner"),
                Column::new("uid_initiator"),
            ],
        ),
        ("storages", vec![Column::new("numeric_id").unique(), Column::new("id").unique()]),
        ("vcategory", vec![Column::new("id").unique(), Column::new("uid"), Column::new("category")]),
    ];

    for (name, columns) in tables {
        store
            .create_table(TableSchema::new(format!("{}{}", PREFIX, name), columns))
            .unwrap();
    }
    Arc::new(store)
}

pub fn t(name: &str) -> String {
    format!("{}{}", PREFIX, name)
}

pub fn put(store: &MemoryStore, table: &str, row: Row) {
    store.insert(&t(table), row).unwrap();
}

/// One of everything for `alice`, plus a few neighbours that must survive.
pub fn seed_alice(store: &MemoryStore) {
    use identity_rekey::row;

    put(store, "accounts", row([("id", Value::Integer(1)), ("user_id", OLD.into()), ("lower_user_id", OLD.into())]));
    put(store, "accounts", row([("id", Value::Integer(2)), ("user_id", "bob".into()), ("lower_user_id", "bob".into())]));

    put(store, "activity", row([
        ("activity_id", Value::Integer(1)),
        ("user", OLD.into()),
        ("affecteduser", OLD.into()),
        ("subjectparams", r#"[{"file":"a.txt"},"alice"]"#.into()),
    ]));
    put(store, "activity", row([
        ("activity_id", Value::Integer(2)),
        ("user", "bob".into()),
        ("affecteduser", "bob".into()),
        ("subjectparams", r#"["alice","bob"]"#.into()),
    ]));
    put(store, "activity", row([
        ("activity_id", Value::Integer(3)),
        ("user", "bob".into()),
        ("affecteduser", "bob".into()),
        ("subjectparams", r#"["malice","alice2"]"#.into()),
    ]));

    put(store, "authtoken", row([("id", Value::Integer(1)), ("uid", OLD.into())]));
    put(store, "authtoken", row([("id", Value::Integer(2)), ("uid", OLD.into())]));
    put(store, "comments", row([("id", Value::Integer(1)), ("actor_id", OLD.into())]));
    put(store, "comments_read_markers", row([("user_id", OLD), ("object_id", "12")]));
    put(store, "ldap_user_mapping", row([("owncloud_name", OLD), ("directory_uuid", NEW)]));

    put(store, "mounts", row([("id", Value::Integer(1)), ("user_id", OLD.into()), ("mount_point", "/alice/".into())]));
    put(store, "mounts", row([("id", Value::Integer(2)), ("user_id", OLD.into()), ("mount_point", "/alice/files/Shared/".into())]));
    put(store, "mounts", row([("id", Value::Integer(3)), ("user_id", "bob".into()), ("mount_point", "/bob/files/alice/".into())]));

    put(store, "preferences", row([("userid", OLD), ("configkey", "lang")]));

    put(store, "share", row([
        ("id", Value::Integer(1)),
        ("share_with", OLD.into()),
        ("uid_owner", "bob".into()),
        ("uid_initiator", OLD.into()),
    ]));
    put(store, "share", row([
        ("id", Value::Integer(2)),
        ("share_with", "bob".into()),
        ("uid_owner", OLD.into()),
        ("uid_initiator", OLD.into()),
    ]));
    put(store, "share", row([
        ("id", Value::Integer(3)),
        ("share_with", "carol".into()),
        ("uid_owner", "bob".into()),
        ("uid_initiator", "bob".into()),
    ]));

    put(store, "storages", row([("numeric_id", Value::Integer(1)), ("id", "home::alice".into())]));
    put(store, "storages", row([("numeric_id", Value::Integer(2)), ("id", "backup::alice".into())]));
    put(store, "vcategory", row([("id", Value::Integer(1)), ("uid", OLD.into()), ("category", "work".into())]));
}

/// Full contents of every table, for before/after comparisons.
pub fn snapshot(store: &MemoryStore) -> BTreeMap<String, Vec<Row>> {
    [
        "accounts", "activity", "authtoken", "comments", "comments_read_markers",
        "ldap_user_mapping", "mounts", "preferences", "share", "storages", "vcategory",
    ]
    .iter()
    .map(|name| (name.to_string(), store.rows(&t(name)).unwrap()))
    .collect()
}

pub fn column_values(store: &MemoryStore, table: &str, column: &str) -> Vec<Value> {
    store
        .rows(&t(table))
        .unwrap()
        .into_iter()
        .map(|r| r.get(column).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Wraps a store, records every update, and can be told to fail some.
pub struct RecordingStore {
    inner: Arc<dyn Datastore>,
    pub updates: Mutex<Vec<Update>>,
    fail_when: Box<dyn Fn(&Update) -> Option<RekeyError> + Send + Sync>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn Datastore>) -> Self {
        Self {
            inner,
            updates: Mutex::new(Vec::new()),
            fail_when: Box::new(|_| None),
        }
    }

    pub fn failing(
        inner: Arc<dyn Datastore>,
        fail_when: impl Fn(&Update) -> Option<RekeyError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            updates: Mutex::new(Vec::new()),
            fail_when: Box::new(fail_when),
        }
    }

    pub fn updates_of(&self, table: &str) -> Vec<Update> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.table == t(table))
            .cloned()
            .collect()
    }

    pub fn tables_in_order(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for u in self.updates.lock().unwrap().iter() {
            if out.last() != Some(&u.table) {
                out.push(u.table.clone());
            }
        }
        out
    }
}

impl Datastore for RecordingStore {
    fn select(&self, query: &Select) -> Result<Vec<Row>> {
        self.inner.select(query)
    }

    fn update(&self, statement: &Update) -> Result<u64> {
        self.updates.lock().unwrap().push(statement.clone());
        if let Some(err) = (self.fail_when)(statement) {
            return Err(err);
        }
        self.inner.update(statement)
    }
}
