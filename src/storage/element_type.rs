//! ElementType and ProjectType persistence

use super::base::{
    create_tables, delete_row, ensure_row, require_row, resolve_children, save_children,
    BaseStorage, BaseTypeStorage, Persistent,
};
use super::cache::{IdentityCache, NameIndex};
use super::join::ELEMENT_TYPE_FIELD_TYPES;
use super::schema;
use super::transaction::{Mode, Transaction};
use super::Storage;
use crate::model::{ElementType, ElementTypeRef};
use crate::storable::StorableKind;
use crate::Result;
use rusqlite::Connection;

pub struct ElementTypeStorage {
    cache: IdentityCache<ElementType>,
    names: NameIndex<ElementType>,
}

impl ElementTypeStorage {
    pub fn new() -> Self {
        Self {
            cache: IdentityCache::new(),
            names: NameIndex::new(),
        }
    }

    fn persist(&self, root: &Storage, node: &ElementTypeRef, insert: bool) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE | Mode::MODIFIED, Some(node.as_storable()))?;
        if insert {
            root.node_types.insert_node(root, node)?;
        } else {
            root.node_types.update_node(root, node)?;
        }

        let field_types = node.field_types();
        save_children(&root.field_types, root, &field_types)?;

        let conn = root.connection()?;
        let id = node.id();
        ensure_row(conn, "ElementType", id)?;
        let ids: Vec<i64> = field_types.iter().map(|ft| ft.id()).collect();
        ELEMENT_TYPE_FIELD_TYPES.rewrite(conn, id, &ids)?;

        txn.commit()
    }
}

impl Default for ElementTypeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseStorage for ElementTypeStorage {
    type Object = ElementType;

    fn kind(&self) -> StorableKind {
        StorableKind::ElementType
    }

    fn cache(&self) -> &IdentityCache<ElementType> {
        &self.cache
    }

    fn construct(&self) -> ElementType {
        ElementType::new(StorableKind::ElementType)
    }

    fn set_database(&self, conn: &Connection) -> Result<()> {
        create_tables(
            conn,
            &[
                schema::CREATE_ELEMENT_TYPE_TABLE,
                schema::CREATE_ELEMENT_TYPE_FIELD_TYPES_TABLE,
            ],
        )
    }

    fn insert_node(&self, root: &Storage, node: &ElementTypeRef) -> Result<()> {
        self.persist(root, node, true)
    }

    fn update_node(&self, root: &Storage, node: &ElementTypeRef) -> Result<()> {
        self.persist(root, node, false)
    }

    fn reload_node(&self, root: &Storage, node: &ElementTypeRef) -> Result<()> {
        let txn = Transaction::new(root, Mode::READ | Mode::MODIFIED, Some(node.as_storable()))?;
        root.node_types.reload_node(root, node)?;

        let conn = root.connection()?;
        let id = node.id();
        require_row(conn, "ElementType", id)?;

        let field_types = resolve_children(
            &root.field_types,
            root,
            id,
            ELEMENT_TYPE_FIELD_TYPES.load(conn, id)?,
        );
        node.set_field_types(field_types);

        txn.commit()
    }

    fn remove_node(&self, root: &Storage, id: i64) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE, None)?;
        let conn = root.connection()?;
        ELEMENT_TYPE_FIELD_TYPES.clear(conn, id)?;
        delete_row(conn, "ElementType", id)?;
        root.node_types.remove_node(root, id)?;
        txn.commit()
    }

    fn is_dirty(&self, root: &Storage, node: &ElementTypeRef) -> bool {
        node.is_modified()
            || node.field_types().iter().any(|field_type| {
                !field_type.meta().is_persisted() || root.field_types.is_dirty(root, field_type)
            })
    }

    fn registered(&self, node: &ElementTypeRef) {
        self.names.insert(node);
    }

    fn recycled(&self, node: &ElementTypeRef) {
        self.names.remove(node);
    }
}

impl BaseTypeStorage for ElementTypeStorage {
    fn names(&self) -> &NameIndex<ElementType> {
        &self.names
    }
}

pub struct ProjectTypeStorage {
    cache: IdentityCache<ElementType>,
    names: NameIndex<ElementType>,
}

impl ProjectTypeStorage {
    pub fn new() -> Self {
        Self {
            cache: IdentityCache::new(),
            names: NameIndex::new(),
        }
    }

    fn persist(&self, root: &Storage, node: &ElementTypeRef, insert: bool) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE | Mode::MODIFIED, Some(node.as_storable()))?;
        if insert {
            root.element_types.insert_node(root, node)?;
        } else {
            root.element_types.update_node(root, node)?;
        }
        ensure_row(root.connection()?, "ProjectType", node.id())?;
        txn.commit()
    }
}

impl Default for ProjectTypeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseStorage for ProjectTypeStorage {
    type Object = ElementType;

    fn kind(&self) -> StorableKind {
        StorableKind::ProjectType
    }

    fn cache(&self) -> &IdentityCache<ElementType> {
        &self.cache
    }

    fn construct(&self) -> ElementType {
        ElementType::new(StorableKind::ProjectType)
    }

    fn set_database(&self, conn: &Connection) -> Result<()> {
        create_tables(conn, &[schema::CREATE_PROJECT_TYPE_TABLE])
    }

    fn insert_node(&self, root: &Storage, node: &ElementTypeRef) -> Result<()> {
        self.persist(root, node, true)
    }

    fn update_node(&self, root: &Storage, node: &ElementTypeRef) -> Result<()> {
        self.persist(root, node, false)
    }

    fn reload_node(&self, root: &Storage, node: &ElementTypeRef) -> Result<()> {
        let txn = Transaction::new(root, Mode::READ | Mode::MODIFIED, Some(node.as_storable()))?;
        root.element_types.reload_node(root, node)?;
        require_row(root.connection()?, "ProjectType", node.id())?;
        txn.commit()
    }

    fn remove_node(&self, root: &Storage, id: i64) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE, None)?;
        delete_row(root.connection()?, "ProjectType", id)?;
        root.element_types.remove_node(root, id)?;
        txn.commit()
    }

    fn is_dirty(&self, root: &Storage, node: &ElementTypeRef) -> bool {
        root.element_types.is_dirty(root, node)
    }

    fn registered(&self, node: &ElementTypeRef) {
        self.names.insert(node);
    }

    fn recycled(&self, node: &ElementTypeRef) {
        self.names.remove(node);
    }
}

impl BaseTypeStorage for ProjectTypeStorage {
    fn names(&self) -> &NameIndex<ElementType> {
        &self.names
    }
}

impl Persistent for ElementType {
    fn storage(root: &Storage, kind: StorableKind) -> &dyn BaseStorage<Object = ElementType> {
        match kind {
            StorableKind::ProjectType => &root.project_types,
            _ => &root.element_types,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;
    use tempfile::TempDir;

    #[test]
    fn test_name_uniqueness() {
        let storage = Storage::open_in_memory().unwrap();
        let story = storage.create_element_type("story").unwrap();
        let err = storage.create_element_type("story").unwrap_err();
        assert!(matches!(err, StorageError::NameTaken { .. }));
        assert_eq!(storage.element_type_by_name("story"), Some(story));

        let count: i64 = storage
            .connection()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM Node n JOIN ElementType t ON t.id = n.id WHERE n.name = 'story'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        assert!(matches!(
            storage.create_element_type(""),
            Err(StorageError::Invariant { .. })
        ));
    }

    #[test]
    fn test_project_types_have_their_own_names() {
        let storage = Storage::open_in_memory().unwrap();
        storage.create_element_type("novel").unwrap();
        let novel = storage.create_project_type("novel").unwrap();
        assert_eq!(novel.kind(), StorableKind::ProjectType);
        assert_eq!(storage.project_type_by_name("novel"), Some(novel));
    }

    #[test]
    fn test_field_type_order_and_names_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("novel.db");

        {
            let storage = Storage::open(&path).unwrap();
            let story = storage.create_element_type("story").unwrap();
            for name in ["title", "summary", "body"] {
                story.append_field_type(storage.create_field_type(name).unwrap());
            }
            storage.save(&story, false).unwrap();
        }

        let storage = Storage::open(&path).unwrap();
        let story = storage.element_type_by_name("story").unwrap();
        let names: Vec<String> = story.field_types().iter().map(|ft| ft.name()).collect();
        assert_eq!(names, vec!["title", "summary", "body"]);

        let body = storage.field_type_by_name("body").unwrap();
        assert_eq!(body.element_types(), vec![story]);
        assert!(storage.create_element_type("story").is_err());
    }
}
