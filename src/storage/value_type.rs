//! ValueType persistence

use super::base::{
    create_tables, delete_row, ensure_row, require_row, BaseStorage, BaseTypeStorage, Persistent,
};
use super::cache::{IdentityCache, NameIndex};
use super::schema;
use super::transaction::{Mode, Transaction};
use super::Storage;
use crate::model::{Handle, ValueType, ValueTypeRef};
use crate::storable::StorableKind;
use crate::Result;
use rusqlite::Connection;

pub struct ValueTypeStorage {
    cache: IdentityCache<ValueType>,
    names: NameIndex<ValueType>,
}

impl ValueTypeStorage {
    pub fn new() -> Self {
        Self {
            cache: IdentityCache::new(),
            names: NameIndex::new(),
        }
    }

    fn persist(&self, root: &Storage, node: &ValueTypeRef, insert: bool) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE | Mode::MODIFIED, Some(node.as_storable()))?;
        if insert {
            root.node_types.insert_node(root, node)?;
        } else {
            root.node_types.update_node(root, node)?;
        }
        ensure_row(root.connection()?, "ValueType", node.id())?;
        txn.commit()
    }
}

impl Default for ValueTypeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseStorage for ValueTypeStorage {
    type Object = ValueType;

    fn kind(&self) -> StorableKind {
        StorableKind::ValueType
    }

    fn cache(&self) -> &IdentityCache<ValueType> {
        &self.cache
    }

    fn construct(&self) -> ValueType {
        ValueType::new(StorableKind::ValueType)
    }

    fn set_database(&self, conn: &Connection) -> Result<()> {
        create_tables(conn, &[schema::CREATE_VALUE_TYPE_TABLE])
    }

    fn insert_node(&self, root: &Storage, node: &ValueTypeRef) -> Result<()> {
        self.persist(root, node, true)
    }

    fn update_node(&self, root: &Storage, node: &ValueTypeRef) -> Result<()> {
        self.persist(root, node, false)
    }

    fn reload_node(&self, root: &Storage, node: &ValueTypeRef) -> Result<()> {
        let txn = Transaction::new(root, Mode::READ | Mode::MODIFIED, Some(node.as_storable()))?;
        root.node_types.reload_node(root, node)?;
        require_row(root.connection()?, "ValueType", node.id())?;
        txn.commit()
    }

    fn remove_node(&self, root: &Storage, id: i64) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE, None)?;
        delete_row(root.connection()?, "ValueType", id)?;
        root.node_types.remove_node(root, id)?;
        txn.commit()
    }

    fn registered(&self, node: &ValueTypeRef) {
        self.names.insert(node);
    }

    fn recycled(&self, node: &ValueTypeRef) {
        self.names.remove(node);
    }
}

impl BaseTypeStorage for ValueTypeStorage {
    fn names(&self) -> &NameIndex<ValueType> {
        &self.names
    }
}

impl Persistent for ValueType {
    fn storage(root: &Storage, _kind: StorableKind) -> &dyn BaseStorage<Object = ValueType> {
        &root.value_types
    }

    fn unlink(node: &Handle<ValueType>) {
        for field_type in node.field_types() {
            field_type.remove_value_type(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;

    #[test]
    fn test_rename_updates_index() {
        let storage = Storage::open_in_memory().unwrap();
        let text = storage.create_value_type("text").unwrap();
        text.set_name("prose");
        storage.save(&text, false).unwrap();

        assert!(storage.value_type_by_name("text").is_none());
        assert_eq!(storage.value_type_by_name("prose"), Some(text));
        assert!(storage.create_value_type("text").is_ok());
    }

    #[test]
    fn test_cleared_name_rejected_on_save() {
        let storage = Storage::open_in_memory().unwrap();
        let text = storage.create_value_type("text").unwrap();
        text.set_name("");
        let err = storage.save(&text, false).unwrap_err();
        assert!(matches!(err, StorageError::Invariant { .. }));
        assert!(text.is_modified());
    }
}
