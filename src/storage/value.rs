//! Value persistence
//!
//! `Value.valueType` holds the kind id of the stored variant; node
//! references are stored as row ids and resolved again on reload.

use super::base::{create_tables, delete_row, BaseStorage, Persistent};
use super::cache::IdentityCache;
use super::query::{execute, query_row};
use super::schema;
use super::transaction::{Mode, Transaction};
use super::Storage;
use crate::model::{AnyNode, Handle, Value, ValueRef};
use crate::storable::StorableKind;
use crate::variant::{Stored, ValueKind, Variant};
use crate::{Result, StorageError};
use rusqlite::types::Value as SqlValue;
use rusqlite::{named_params, Connection};
use tracing::warn;

pub struct ValueStorage {
    cache: IdentityCache<Value>,
}

impl ValueStorage {
    pub fn new() -> Self {
        Self {
            cache: IdentityCache::new(),
        }
    }

    fn persist(&self, root: &Storage, node: &ValueRef, insert: bool) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE | Mode::MODIFIED, Some(node.as_storable()))?;

        if let Some(value_type) = node.node_type() {
            if !value_type.meta().is_persisted() {
                root.save(&value_type, false)?;
            }
        }
        if insert {
            root.nodes.insert_node(root, node)?;
        } else {
            root.nodes.update_node(root, node)?;
        }

        let value = node.value();
        for target in value.nodes() {
            save_reference(root, &target)?;
        }

        let kind = value.kind().map(|k| k.id());
        let raw = value.to_sql()?;
        execute(
            root.connection()?,
            "ValueStorage::persist",
            r#"
            INSERT INTO Value (id, valueType, value) VALUES (:id, :valueType, :value)
            ON CONFLICT(id) DO UPDATE SET valueType = excluded.valueType, value = excluded.value
            "#,
            named_params! { ":id": node.id(), ":valueType": kind, ":value": raw },
        )?;

        txn.commit()
    }
}

/// Referenced nodes are saved in place, not as new versions; one already
/// being saved up the stack has its row id by now.
fn save_reference(root: &Storage, target: &AnyNode) -> Result<()> {
    let (saving, persisted) = {
        let object = target.as_storable();
        let object = object.borrow();
        (object.is_saving(), object.meta().is_persisted())
    };
    if saving && persisted {
        return Ok(());
    }
    root.save_any(target, false)
}

fn resolve_references(root: &Storage, owner: i64, list: bool, ids: Vec<i64>) -> Variant {
    let nodes: Vec<AnyNode> = ids
        .into_iter()
        .filter_map(|id| match root.load_any(id) {
            Ok(node) => Some(node),
            Err(e) => {
                warn!(value = owner, node = id, error = %e, "skipping unresolvable reference");
                None
            }
        })
        .collect();

    if list {
        Variant::NodeList(nodes)
    } else {
        nodes.into_iter().next().map(Variant::Node).unwrap_or_default()
    }
}

impl Default for ValueStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseStorage for ValueStorage {
    type Object = Value;

    fn kind(&self) -> StorableKind {
        StorableKind::Value
    }

    fn cache(&self) -> &IdentityCache<Value> {
        &self.cache
    }

    fn construct(&self) -> Value {
        Value::new(StorableKind::Value)
    }

    fn set_database(&self, conn: &Connection) -> Result<()> {
        create_tables(conn, &[schema::CREATE_VALUE_TABLE])
    }

    fn insert_node(&self, root: &Storage, node: &ValueRef) -> Result<()> {
        self.persist(root, node, true)
    }

    fn update_node(&self, root: &Storage, node: &ValueRef) -> Result<()> {
        self.persist(root, node, false)
    }

    fn reload_node(&self, root: &Storage, node: &ValueRef) -> Result<()> {
        let txn = Transaction::new(root, Mode::READ | Mode::MODIFIED, Some(node.as_storable()))?;
        let node_type = root.nodes.reload_node(root, node)?;

        let id = node.id();
        let row: Option<(Option<i32>, SqlValue)> = query_row(
            root.connection()?,
            "ValueStorage::reload_node",
            "SELECT valueType, value FROM Value WHERE id = :id",
            named_params! { ":id": id },
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let Some((kind, raw)) = row else {
            return Err(StorageError::NotFound { table: "Value", id });
        };

        let kind = kind.and_then(|raw_kind| {
            let kind = ValueKind::from_id(raw_kind);
            if kind.is_none() {
                warn!(value = id, kind = raw_kind, "unknown value kind, loading as null");
            }
            kind
        });
        let value = match Variant::from_sql(kind, raw)? {
            Stored::Ready(value) => value,
            Stored::Nodes { list, ids } => resolve_references(root, id, list, ids),
        };

        node.set_node_type(root.resolve(node_type));
        node.set_raw_value(value);

        txn.commit()
    }

    fn remove_node(&self, root: &Storage, id: i64) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE, None)?;
        delete_row(root.connection()?, "Value", id)?;
        root.nodes.remove_node(root, id)?;
        txn.commit()
    }
}

impl Persistent for Value {
    fn storage(root: &Storage, _kind: StorableKind) -> &dyn BaseStorage<Object = Value> {
        &root.values
    }

    fn unlink(node: &Handle<Value>) {
        for field in node.fields() {
            field.remove_value(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn test_scalars_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("novel.db");
        let date = NaiveDate::from_ymd_opt(1851, 10, 18).unwrap();
        let samples = vec![
            Variant::Bool(true),
            Variant::Int(-12),
            Variant::Double(2.5),
            Variant::from("Call me Ishmael."),
            Variant::Date(date),
            Variant::Null,
        ];

        let ids: Vec<i64> = {
            let storage = Storage::open(&path).unwrap();
            samples
                .iter()
                .map(|sample| {
                    let value = storage.value();
                    value.set_value(sample.clone()).unwrap();
                    storage.save(&value, false).unwrap();
                    value.id()
                })
                .collect()
        };

        let storage = Storage::open(&path).unwrap();
        for (id, sample) in ids.into_iter().zip(samples) {
            assert_eq!(storage.value_by_id(id).unwrap().value(), sample);
        }
    }

    #[test]
    fn test_references_resolve_to_live_nodes() {
        let storage = Storage::open_in_memory().unwrap();
        let target = storage.element();
        target.set_name("hero");

        let value = storage.value();
        value
            .set_value(Variant::Node(AnyNode::Element(target.clone())))
            .unwrap();
        storage.save(&value, false).unwrap();
        assert!(target.id() > 0);

        let id = value.id();
        storage.recycle(&value);
        let reloaded = storage.value_by_id(id).unwrap();
        match reloaded.value() {
            Variant::Node(AnyNode::Element(element)) => assert!(element.ptr_eq(&target)),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_dangling_reference_skipped() {
        let storage = Storage::open_in_memory().unwrap();
        let a = storage.element();
        let b = storage.element();
        let value = storage.value();
        value
            .set_value(Variant::NodeList(vec![a.clone().into(), b.clone().into()]))
            .unwrap();
        storage.save(&value, false).unwrap();

        storage.remove(&a).unwrap();
        let id = value.id();
        storage.recycle(&value);

        let reloaded = storage.value_by_id(id).unwrap();
        assert_eq!(reloaded.value(), Variant::NodeList(vec![b.into()]));
    }
}
