//! FieldType persistence: cardinality, ordered value types and the ordered
//! allowed value kinds.

use super::base::{
    create_tables, delete_row, resolve_children, save_children, BaseStorage, BaseTypeStorage,
    Persistent,
};
use super::cache::{IdentityCache, NameIndex};
use super::join::{FIELD_TYPE_ALLOWED_TYPES, FIELD_TYPE_VALUE_TYPES};
use super::query::{execute, query_row};
use super::schema;
use super::transaction::{Mode, Transaction};
use super::Storage;
use crate::model::{FieldType, FieldTypeRef, Handle};
use crate::storable::StorableKind;
use crate::variant::ValueKind;
use crate::{Result, StorageError};
use rusqlite::{named_params, Connection};
use tracing::warn;

pub struct FieldTypeStorage {
    cache: IdentityCache<FieldType>,
    names: NameIndex<FieldType>,
}

impl FieldTypeStorage {
    pub fn new() -> Self {
        Self {
            cache: IdentityCache::new(),
            names: NameIndex::new(),
        }
    }

    fn persist(&self, root: &Storage, node: &FieldTypeRef, insert: bool) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE | Mode::MODIFIED, Some(node.as_storable()))?;
        if insert {
            root.node_types.insert_node(root, node)?;
        } else {
            root.node_types.update_node(root, node)?;
        }

        let value_types = node.value_types();
        save_children(&root.value_types, root, &value_types)?;

        let conn = root.connection()?;
        let id = node.id();
        execute(
            conn,
            "FieldTypeStorage::persist",
            r#"
            INSERT INTO FieldType (id, minOccurs, maxOccurs) VALUES (:id, :minOccurs, :maxOccurs)
            ON CONFLICT(id) DO UPDATE SET minOccurs = excluded.minOccurs, maxOccurs = excluded.maxOccurs
            "#,
            named_params! {
                ":id": id,
                ":minOccurs": node.min_occurs(),
                ":maxOccurs": node.max_occurs(),
            },
        )?;

        let ids: Vec<i64> = value_types.iter().map(|vt| vt.id()).collect();
        FIELD_TYPE_VALUE_TYPES.rewrite(conn, id, &ids)?;
        let kinds: Vec<i64> = node.allowed_types().iter().map(|k| k.id() as i64).collect();
        FIELD_TYPE_ALLOWED_TYPES.rewrite(conn, id, &kinds)?;

        txn.commit()
    }
}

impl Default for FieldTypeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseStorage for FieldTypeStorage {
    type Object = FieldType;

    fn kind(&self) -> StorableKind {
        StorableKind::FieldType
    }

    fn cache(&self) -> &IdentityCache<FieldType> {
        &self.cache
    }

    fn construct(&self) -> FieldType {
        FieldType::new(StorableKind::FieldType)
    }

    fn set_database(&self, conn: &Connection) -> Result<()> {
        create_tables(
            conn,
            &[
                schema::CREATE_FIELD_TYPE_TABLE,
                schema::CREATE_FIELD_TYPE_VALUE_TYPES_TABLE,
                schema::CREATE_FIELD_TYPE_ALLOWED_TYPES_TABLE,
            ],
        )
    }

    fn insert_node(&self, root: &Storage, node: &FieldTypeRef) -> Result<()> {
        self.persist(root, node, true)
    }

    fn update_node(&self, root: &Storage, node: &FieldTypeRef) -> Result<()> {
        self.persist(root, node, false)
    }

    fn reload_node(&self, root: &Storage, node: &FieldTypeRef) -> Result<()> {
        let txn = Transaction::new(root, Mode::READ | Mode::MODIFIED, Some(node.as_storable()))?;
        root.node_types.reload_node(root, node)?;

        let conn = root.connection()?;
        let id = node.id();
        let occurs: Option<(i32, i32)> = query_row(
            conn,
            "FieldTypeStorage::reload_node",
            "SELECT minOccurs, maxOccurs FROM FieldType WHERE id = :id",
            named_params! { ":id": id },
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let Some((min_occurs, max_occurs)) = occurs else {
            return Err(StorageError::NotFound { table: "FieldType", id });
        };
        node.set_min_occurs(min_occurs);
        node.set_max_occurs(max_occurs);

        let kinds = FIELD_TYPE_ALLOWED_TYPES
            .load(conn, id)?
            .into_iter()
            .filter_map(|raw| {
                let kind = ValueKind::from_id(raw as i32);
                if kind.is_none() {
                    warn!(field_type = id, kind = raw, "skipping unknown value kind");
                }
                kind
            })
            .collect();
        node.set_allowed_types(kinds);

        let value_types = resolve_children(
            &root.value_types,
            root,
            id,
            FIELD_TYPE_VALUE_TYPES.load(conn, id)?,
        );
        node.set_value_types(value_types);

        txn.commit()
    }

    fn remove_node(&self, root: &Storage, id: i64) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE, None)?;
        let conn = root.connection()?;
        FIELD_TYPE_VALUE_TYPES.clear(conn, id)?;
        FIELD_TYPE_ALLOWED_TYPES.clear(conn, id)?;
        delete_row(conn, "FieldType", id)?;
        root.node_types.remove_node(root, id)?;
        txn.commit()
    }

    fn is_dirty(&self, _root: &Storage, node: &FieldTypeRef) -> bool {
        node.is_modified()
            || node
                .value_types()
                .iter()
                .any(|vt| !vt.meta().is_persisted() || vt.is_modified())
    }

    fn registered(&self, node: &FieldTypeRef) {
        self.names.insert(node);
    }

    fn recycled(&self, node: &FieldTypeRef) {
        self.names.remove(node);
    }
}

impl BaseTypeStorage for FieldTypeStorage {
    fn names(&self) -> &NameIndex<FieldType> {
        &self.names
    }
}

impl Persistent for FieldType {
    fn storage(root: &Storage, _kind: StorableKind) -> &dyn BaseStorage<Object = FieldType> {
        &root.field_types
    }

    fn unlink(node: &Handle<FieldType>) {
        for element_type in node.element_types() {
            element_type.remove_field_type(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::UNBOUNDED;
    use tempfile::TempDir;

    #[test]
    fn test_constraints_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("novel.db");

        {
            let storage = Storage::open(&path).unwrap();
            let title = storage.create_field_type("title").unwrap();
            title.set_min_occurs(1);
            title.set_max_occurs(1);
            title.set_allowed_types(vec![ValueKind::String, ValueKind::Int]);
            title.append_value_type(storage.create_value_type("text").unwrap());
            title.append_value_type(storage.create_value_type("number").unwrap());
            storage.save(&title, false).unwrap();

            storage.create_field_type("tags").unwrap();
        }

        let storage = Storage::open(&path).unwrap();
        let title = storage.field_type_by_name("title").unwrap();
        assert_eq!((title.min_occurs(), title.max_occurs()), (1, 1));
        assert_eq!(title.allowed_types(), vec![ValueKind::String, ValueKind::Int]);
        let value_types: Vec<String> = title.value_types().iter().map(|vt| vt.name()).collect();
        assert_eq!(value_types, vec!["text", "number"]);

        let tags = storage.field_type_by_name("tags").unwrap();
        assert_eq!(tags.max_occurs(), UNBOUNDED);
        assert!(!tags.is_modified());
    }

    #[test]
    fn test_remove_unlinks_from_element_types() {
        let storage = Storage::open_in_memory().unwrap();
        let story = storage.create_element_type("story").unwrap();
        let title = storage.create_field_type("title").unwrap();
        story.append_field_type(title.clone());
        storage.save(&story, false).unwrap();

        storage.remove(&title).unwrap();
        assert!(story.field_types().is_empty());
        assert!(storage.field_type_by_name("title").is_none());
        assert!(storage.create_field_type("title").is_ok());
    }
}
