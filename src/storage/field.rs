//! Field persistence: own cardinality columns, ordered values, and the
//! ordered allowed value kinds.

use super::base::{
    create_tables, delete_row, resolve_children, save_children, BaseStorage, Persistent,
};
use super::cache::IdentityCache;
use super::join::{FIELD_ALLOWED_TYPES, FIELD_VALUES};
use super::query::{execute, query_row};
use super::schema;
use super::transaction::{Mode, Transaction};
use super::Storage;
use crate::model::{Field, FieldRef, Handle};
use crate::storable::StorableKind;
use crate::variant::ValueKind;
use crate::{Result, StorageError};
use rusqlite::{named_params, Connection};
use tracing::warn;

pub struct FieldStorage {
    cache: IdentityCache<Field>,
}

impl FieldStorage {
    pub fn new() -> Self {
        Self {
            cache: IdentityCache::new(),
        }
    }

    fn persist(&self, root: &Storage, node: &FieldRef, insert: bool) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE | Mode::MODIFIED, Some(node.as_storable()))?;

        if let Some(field_type) = node.node_type() {
            if !field_type.meta().is_persisted() {
                root.save(&field_type, false)?;
            }
        }
        if insert {
            root.nodes.insert_node(root, node)?;
        } else {
            root.nodes.update_node(root, node)?;
        }

        let values = node.values();
        save_children(&root.values, root, &values)?;

        let conn = root.connection()?;
        let id = node.id();
        let (min_occurs, max_occurs) = (node.own_min_occurs(), node.own_max_occurs());
        execute(
            conn,
            "FieldStorage::persist",
            r#"
            INSERT INTO Field (id, minOccurs, maxOccurs) VALUES (:id, :minOccurs, :maxOccurs)
            ON CONFLICT(id) DO UPDATE SET minOccurs = excluded.minOccurs, maxOccurs = excluded.maxOccurs
            "#,
            named_params! { ":id": id, ":minOccurs": min_occurs, ":maxOccurs": max_occurs },
        )?;

        let value_ids: Vec<i64> = values.iter().map(|v| v.id()).collect();
        FIELD_VALUES.rewrite(conn, id, &value_ids)?;
        let kinds: Vec<i64> = node
            .own_allowed_types()
            .iter()
            .map(|k| k.id() as i64)
            .collect();
        FIELD_ALLOWED_TYPES.rewrite(conn, id, &kinds)?;

        txn.commit()
    }
}

impl Default for FieldStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseStorage for FieldStorage {
    type Object = Field;

    fn kind(&self) -> StorableKind {
        StorableKind::Field
    }

    fn cache(&self) -> &IdentityCache<Field> {
        &self.cache
    }

    fn construct(&self) -> Field {
        Field::new(StorableKind::Field)
    }

    fn set_database(&self, conn: &Connection) -> Result<()> {
        create_tables(
            conn,
            &[
                schema::CREATE_FIELD_TABLE,
                schema::CREATE_FIELD_VALUES_TABLE,
                schema::CREATE_FIELD_ALLOWED_TYPES_TABLE,
            ],
        )
    }

    fn insert_node(&self, root: &Storage, node: &FieldRef) -> Result<()> {
        self.persist(root, node, true)
    }

    fn update_node(&self, root: &Storage, node: &FieldRef) -> Result<()> {
        self.persist(root, node, false)
    }

    fn reload_node(&self, root: &Storage, node: &FieldRef) -> Result<()> {
        let txn = Transaction::new(root, Mode::READ | Mode::MODIFIED, Some(node.as_storable()))?;
        let node_type = root.nodes.reload_node(root, node)?;

        let conn = root.connection()?;
        let id = node.id();
        let occurs: Option<(Option<i32>, Option<i32>)> = query_row(
            conn,
            "FieldStorage::reload_node",
            "SELECT minOccurs, maxOccurs FROM Field WHERE id = :id",
            named_params! { ":id": id },
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let Some((min_occurs, max_occurs)) = occurs else {
            return Err(StorageError::NotFound { table: "Field", id });
        };

        node.set_node_type(root.resolve(node_type));
        node.set_min_occurs(min_occurs);
        node.set_max_occurs(max_occurs);

        let kinds = FIELD_ALLOWED_TYPES
            .load(conn, id)?
            .into_iter()
            .filter_map(|raw| {
                let kind = ValueKind::from_id(raw as i32);
                if kind.is_none() {
                    warn!(field = id, kind = raw, "skipping unknown value kind");
                }
                kind
            })
            .collect();
        node.set_allowed_types(kinds);

        let values = resolve_children(&root.values, root, id, FIELD_VALUES.load(conn, id)?);
        node.set_values(values);

        txn.commit()
    }

    fn remove_node(&self, root: &Storage, id: i64) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE, None)?;
        let conn = root.connection()?;
        FIELD_VALUES.clear(conn, id)?;
        FIELD_ALLOWED_TYPES.clear(conn, id)?;
        delete_row(conn, "Field", id)?;
        root.nodes.remove_node(root, id)?;
        txn.commit()
    }

    fn is_dirty(&self, _root: &Storage, node: &FieldRef) -> bool {
        node.is_modified()
            || node
                .values()
                .iter()
                .any(|value| !value.meta().is_persisted() || value.is_modified())
    }
}

impl Persistent for Field {
    fn storage(root: &Storage, _kind: StorableKind) -> &dyn BaseStorage<Object = Field> {
        &root.fields
    }

    fn unlink(node: &Handle<Field>) {
        for element in node.elements() {
            element.remove_field(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::UNBOUNDED;
    use crate::variant::Variant;
    use tempfile::TempDir;

    #[test]
    fn test_constraints_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("novel.db");

        let id = {
            let storage = Storage::open(&path).unwrap();
            let field = storage.field();
            field.set_name("tags");
            field.set_min_occurs(Some(1));
            field.set_allowed_types(vec![ValueKind::String, ValueKind::Int]);
            storage.save(&field, false).unwrap();
            field.id()
        };

        let storage = Storage::open(&path).unwrap();
        let field = storage.field_by_id(id).unwrap();
        assert_eq!(field.own_min_occurs(), Some(1));
        assert_eq!(field.own_max_occurs(), None);
        assert_eq!(field.max_occurs(), UNBOUNDED);
        assert_eq!(field.allowed_types(), vec![ValueKind::String, ValueKind::Int]);
    }

    #[test]
    fn test_update_keeps_row() {
        let storage = Storage::open_in_memory().unwrap();
        let field = storage.field();
        field.set_name("title");
        storage.save(&field, false).unwrap();
        let id = field.id();

        field.set_label("Title");
        storage.save(&field, false).unwrap();
        assert_eq!(field.id(), id);

        let label: String = storage
            .connection()
            .unwrap()
            .query_row("SELECT label FROM Node WHERE id = ?1", [id], |row| row.get(0))
            .unwrap();
        assert_eq!(label, "Title");
    }

    #[test]
    fn test_changed_value_saved_through_parent() {
        let storage = Storage::open_in_memory().unwrap();
        let element = storage.element();
        let field = storage.field();
        let value = storage.value();
        value.set_value("first").unwrap();
        field.append_value(value.clone());
        element.append_field(field.clone());
        storage.save(&element, false).unwrap();
        let first_value = value.id();

        value.set_value("second").unwrap();
        storage.save(&element, false).unwrap();
        assert!(value.id() > first_value);
        assert!(!value.is_modified());

        let stored: Vec<i64> = FIELD_VALUES
            .load(storage.connection().unwrap(), field.id())
            .unwrap();
        assert_eq!(stored, vec![value.id()]);
        assert_eq!(
            storage.value_by_id(first_value).unwrap().value(),
            Variant::from("first")
        );
    }

    #[test]
    fn test_remove_unlinks_from_elements() {
        let storage = Storage::open_in_memory().unwrap();
        let element = storage.element();
        let field = storage.field();
        element.append_field(field.clone());
        storage.save(&element, false).unwrap();
        let id = field.id();

        storage.remove(&field).unwrap();
        assert!(element.fields().is_empty());
        assert!(matches!(storage.field_by_id(id), Err(StorageError::NotFound { .. })));
    }
}
