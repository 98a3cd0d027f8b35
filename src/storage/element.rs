//! Element and Project persistence
//!
//! A project is an element with an extra `Project` row, so `ProjectStorage`
//! delegates everything but that row to `ElementStorage`.

use super::base::{
    create_tables, delete_row, ensure_row, require_row, resolve_children, save_children,
    BaseStorage, Persistent,
};
use super::cache::IdentityCache;
use super::join::ELEMENT_FIELDS;
use super::schema;
use super::transaction::{Mode, Transaction};
use super::Storage;
use crate::model::{Element, ElementRef};
use crate::storable::StorableKind;
use crate::Result;
use rusqlite::Connection;

pub struct ElementStorage {
    cache: IdentityCache<Element>,
}

impl ElementStorage {
    pub fn new() -> Self {
        Self {
            cache: IdentityCache::new(),
        }
    }

    fn persist(&self, root: &Storage, node: &ElementRef, insert: bool) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE | Mode::MODIFIED, Some(node.as_storable()))?;

        if let Some(element_type) = node.node_type() {
            if !element_type.meta().is_persisted() {
                root.save(&element_type, false)?;
            }
        }
        if insert {
            root.nodes.insert_node(root, node)?;
        } else {
            root.nodes.update_node(root, node)?;
        }

        let fields = node.fields();
        save_children(&root.fields, root, &fields)?;

        let conn = root.connection()?;
        let id = node.id();
        ensure_row(conn, "Element", id)?;
        let field_ids: Vec<i64> = fields.iter().map(|f| f.id()).collect();
        ELEMENT_FIELDS.rewrite(conn, id, &field_ids)?;

        txn.commit()
    }
}

impl Default for ElementStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseStorage for ElementStorage {
    type Object = Element;

    fn kind(&self) -> StorableKind {
        StorableKind::Element
    }

    fn cache(&self) -> &IdentityCache<Element> {
        &self.cache
    }

    fn construct(&self) -> Element {
        Element::new(StorableKind::Element)
    }

    fn set_database(&self, conn: &Connection) -> Result<()> {
        create_tables(
            conn,
            &[schema::CREATE_ELEMENT_TABLE, schema::CREATE_ELEMENT_FIELDS_TABLE],
        )
    }

    fn insert_node(&self, root: &Storage, node: &ElementRef) -> Result<()> {
        self.persist(root, node, true)
    }

    fn update_node(&self, root: &Storage, node: &ElementRef) -> Result<()> {
        self.persist(root, node, false)
    }

    fn reload_node(&self, root: &Storage, node: &ElementRef) -> Result<()> {
        let txn = Transaction::new(root, Mode::READ | Mode::MODIFIED, Some(node.as_storable()))?;
        let node_type = root.nodes.reload_node(root, node)?;

        let conn = root.connection()?;
        let id = node.id();
        require_row(conn, "Element", id)?;

        node.set_node_type(root.resolve(node_type));
        let fields = resolve_children(&root.fields, root, id, ELEMENT_FIELDS.load(conn, id)?);
        node.set_fields(fields);

        txn.commit()
    }

    fn remove_node(&self, root: &Storage, id: i64) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE, None)?;
        let conn = root.connection()?;
        ELEMENT_FIELDS.clear(conn, id)?;
        delete_row(conn, "Element", id)?;
        root.nodes.remove_node(root, id)?;
        txn.commit()
    }

    fn is_dirty(&self, root: &Storage, node: &ElementRef) -> bool {
        node.is_modified()
            || node.fields().iter().any(|field| {
                !field.meta().is_persisted() || root.fields.is_dirty(root, field)
            })
    }
}

pub struct ProjectStorage {
    cache: IdentityCache<Element>,
}

impl ProjectStorage {
    pub fn new() -> Self {
        Self {
            cache: IdentityCache::new(),
        }
    }

    fn persist(&self, root: &Storage, node: &ElementRef, insert: bool) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE | Mode::MODIFIED, Some(node.as_storable()))?;
        if insert {
            root.elements.insert_node(root, node)?;
        } else {
            root.elements.update_node(root, node)?;
        }
        ensure_row(root.connection()?, "Project", node.id())?;
        txn.commit()
    }
}

impl Default for ProjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseStorage for ProjectStorage {
    type Object = Element;

    fn kind(&self) -> StorableKind {
        StorableKind::Project
    }

    fn cache(&self) -> &IdentityCache<Element> {
        &self.cache
    }

    fn construct(&self) -> Element {
        Element::new(StorableKind::Project)
    }

    fn set_database(&self, conn: &Connection) -> Result<()> {
        create_tables(conn, &[schema::CREATE_PROJECT_TABLE])
    }

    fn insert_node(&self, root: &Storage, node: &ElementRef) -> Result<()> {
        self.persist(root, node, true)
    }

    fn update_node(&self, root: &Storage, node: &ElementRef) -> Result<()> {
        self.persist(root, node, false)
    }

    fn reload_node(&self, root: &Storage, node: &ElementRef) -> Result<()> {
        let txn = Transaction::new(root, Mode::READ | Mode::MODIFIED, Some(node.as_storable()))?;
        root.elements.reload_node(root, node)?;
        require_row(root.connection()?, "Project", node.id())?;
        txn.commit()
    }

    fn remove_node(&self, root: &Storage, id: i64) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE, None)?;
        delete_row(root.connection()?, "Project", id)?;
        root.elements.remove_node(root, id)?;
        txn.commit()
    }

    fn is_dirty(&self, root: &Storage, node: &ElementRef) -> bool {
        root.elements.is_dirty(root, node)
    }
}

impl Persistent for Element {
    fn storage(root: &Storage, kind: StorableKind) -> &dyn BaseStorage<Object = Element> {
        match kind {
            StorableKind::Project => &root.projects,
            _ => &root.elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;
    use tempfile::TempDir;

    fn chapter(storage: &Storage, names: &[&str]) -> ElementRef {
        let element = storage.element();
        element.set_name("chapter");
        for name in names {
            let field = storage.field();
            field.set_name(*name);
            element.append_field(field);
        }
        element
    }

    #[test]
    fn test_identity() {
        let storage = Storage::open_in_memory().unwrap();
        let element = chapter(&storage, &["title"]);
        storage.save(&element, false).unwrap();

        let a = storage.element_by_id(element.id()).unwrap();
        let b = storage.element_by_id(element.id()).unwrap();
        assert!(a.ptr_eq(&b));
        assert!(a.ptr_eq(&element));
    }

    #[test]
    fn test_field_order_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("novel.db");

        let id = {
            let storage = Storage::open(&path).unwrap();
            let element = chapter(&storage, &["f0", "f1", "f2"]);
            storage.save(&element, false).unwrap();
            assert!(!element.is_modified());
            element.id()
        };

        let storage = Storage::open(&path).unwrap();
        let element = storage.element_by_id(id).unwrap();
        let names: Vec<String> = element.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["f0", "f1", "f2"]);
        assert!(!element.is_modified());
        assert_eq!(element.fields()[1].elements(), vec![element.clone()]);
    }

    #[test]
    fn test_update_in_place_and_new_version() {
        let storage = Storage::open_in_memory().unwrap();
        let element = chapter(&storage, &["title"]);
        storage.save(&element, false).unwrap();
        let first = element.id();
        assert_eq!(element.version(), 1);

        element.set_label("Chapter One");
        storage.save(&element, false).unwrap();
        assert_eq!(element.id(), first);
        assert_eq!(element.version(), 1);

        storage.save(&element, true).unwrap();
        let second = element.id();
        storage.save(&element, true).unwrap();
        let third = element.id();
        assert!(first < second && second < third);
        assert_eq!(element.version(), 3);

        let versions: Vec<i64> = storage
            .connection()
            .unwrap()
            .prepare("SELECT version FROM Storable WHERE type = 1 ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(versions, vec![1, 2, 3]);

        assert!(storage.element_by_id(third).unwrap().ptr_eq(&element));
        let older = storage.element_by_id(first).unwrap();
        assert!(!older.ptr_eq(&element));
        assert_eq!(older.label(), "Chapter One");
    }

    #[test]
    fn test_unmodified_save_is_noop() {
        let storage = Storage::open_in_memory().unwrap();
        let element = chapter(&storage, &[]);
        storage.save(&element, false).unwrap();
        let stamped = element.meta().updated_at();

        storage.save(&element, false).unwrap();
        assert_eq!(element.meta().updated_at(), stamped);
    }

    #[test]
    fn test_failed_join_write_rolls_back() {
        let storage = Storage::open_in_memory().unwrap();
        let element = chapter(&storage, &["a", "b"]);
        storage.save(&element, false).unwrap();
        let before: Vec<i64> = element.fields().iter().map(|f| f.id()).collect();

        storage
            .connection()
            .unwrap()
            .execute_batch(
                r#"
                CREATE TRIGGER fail_second_field BEFORE INSERT ON Element_fields
                WHEN NEW."index" = 1
                BEGIN SELECT RAISE(ABORT, 'forced'); END;
                "#,
            )
            .unwrap();

        element.set_label("changed");
        let err = storage.save(&element, false).unwrap_err();
        assert!(matches!(err, StorageError::Query { .. }));
        assert!(element.is_modified());
        assert_eq!(storage.transaction_depth(), 0);

        let stored: Vec<i64> = storage
            .connection()
            .unwrap()
            .prepare(r#"SELECT field FROM Element_fields WHERE element = ?1 ORDER BY "index""#)
            .unwrap()
            .query_map([element.id()], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(stored, before);
    }

    #[test]
    fn test_recycle_reuses_object() {
        let storage = Storage::open_in_memory().unwrap();
        let element = chapter(&storage, &[]);
        storage.save(&element, false).unwrap();
        let id = element.id();

        storage.recycle(&element);
        let reused = storage.element();
        assert!(reused.ptr_eq(&element));
        assert_eq!(reused.id(), 0);
        assert_eq!(reused.name(), "");

        let reloaded = storage.element_by_id(id).unwrap();
        assert!(!reloaded.ptr_eq(&element));
        assert_eq!(reloaded.name(), "chapter");
    }

    #[test]
    fn test_project_row() {
        let storage = Storage::open_in_memory().unwrap();
        let project = storage.create_project("novel");
        assert!(project.is_project());
        storage.save(&project, false).unwrap();

        let loaded = storage.project_by_id(project.id()).unwrap();
        assert!(loaded.ptr_eq(&project));
        assert!(matches!(
            storage.element_by_id(project.id()),
            Err(StorageError::KindMismatch { .. })
        ));

        let id = project.id();
        storage.remove(&project).unwrap();
        assert_eq!(project.id(), 0);
        assert!(matches!(storage.kind_of(id), Err(StorageError::NotFound { .. })));
    }
}
