//! Storage Layer - SQLite-backed persistence
//!
//! Class-table inheritance over one connection:
//! - Storable(id, type, typeName, version, createdAt, updatedAt, createdBy, updatedBy)
//! - Node(id, name, label, info, icon, nodeType)
//! - one table per kind, keyed by the Storable id
//! - ordered join tables `<Parent>_<children>(index, parent, child)`
//!
//! `Storage` owns the connection, the transaction context and one kind
//! storage per kind. Kind storages reach each other through it.

pub mod base;
pub mod cache;
pub mod element;
pub mod element_type;
pub mod field;
pub mod field_type;
pub mod join;
pub mod node;
pub mod query;
pub mod schema;
pub mod transaction;
pub mod value;
pub mod value_type;

use crate::model::{
    AnyNode, ElementRef, ElementTypeRef, FieldRef, FieldTypeRef, Handle, ValueRef, ValueTypeRef,
};
use crate::storable::StorableKind;
use crate::{Result, StorageError};
use base::{create_tables, BaseStorage, BaseTypeStorage, Persistent};
use element::{ElementStorage, ProjectStorage};
use element_type::{ElementTypeStorage, ProjectTypeStorage};
use field::FieldStorage;
use field_type::FieldTypeStorage;
use node::{NodeStorage, NodeTypeStorage};
use query::{handle_error, invariant, query_map, query_row};
use rusqlite::{named_params, Connection};
use serde::Serialize;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use transaction::{Mode, Transaction, TxnContext};
use value::ValueStorage;
use value_type::ValueTypeStorage;

/// Name reported for databases without a file
const IN_MEMORY_NAME: &str = "untitled";

/// The composition root: one connection, one transaction context and the
/// ten kind storages.
pub struct Storage {
    conn: Option<Connection>,
    path: Option<PathBuf>,
    author: RefCell<String>,
    txn: TxnContext,
    project: RefCell<Option<ElementRef>>,

    pub(crate) nodes: NodeStorage,
    pub(crate) node_types: NodeTypeStorage,
    pub(crate) elements: ElementStorage,
    pub(crate) projects: ProjectStorage,
    pub(crate) fields: FieldStorage,
    pub(crate) values: ValueStorage,
    pub(crate) element_types: ElementTypeStorage,
    pub(crate) project_types: ProjectTypeStorage,
    pub(crate) field_types: FieldTypeStorage,
    pub(crate) value_types: ValueTypeStorage,
}

impl Storage {
    /// A storage with no database attached
    pub fn new() -> Self {
        Self {
            conn: None,
            path: None,
            author: RefCell::new(String::new()),
            txn: TxnContext::default(),
            project: RefCell::new(None),
            nodes: NodeStorage,
            node_types: NodeTypeStorage,
            elements: ElementStorage::new(),
            projects: ProjectStorage::new(),
            fields: FieldStorage::new(),
            values: ValueStorage::new(),
            element_types: ElementTypeStorage::new(),
            project_types: ProjectTypeStorage::new(),
            field_types: FieldTypeStorage::new(),
            value_types: ValueTypeStorage::new(),
        }
    }

    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let mut storage = Self::new();
        storage.open_database(path)?;
        Ok(storage)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let mut storage = Self::new();
        let conn = Connection::open_in_memory()
            .map_err(|e| handle_error("Storage::open_in_memory", ":memory:", &[], e))?;
        storage.set_database(conn, None)?;
        Ok(storage)
    }

    /// Attach the database at `path`, closing the current one first
    pub fn open_database(&mut self, path: &Path) -> Result<()> {
        if self.conn.is_some() {
            self.close_database()?;
        }
        let conn = Connection::open(path).map_err(|e| {
            handle_error("Storage::open_database", &path.display().to_string(), &[], e)
        })?;
        self.set_database(conn, Some(path.to_path_buf()))
    }

    /// Detach the database. Every cached object is dropped from the caches;
    /// handles still held elsewhere no longer map to any row.
    pub fn close_database(&mut self) -> Result<()> {
        if self.txn.depth() > 0 {
            return Err(invariant(
                "Storage::close_database",
                "a transaction is still open",
            ));
        }

        self.elements.cache().clear();
        self.projects.cache().clear();
        self.fields.cache().clear();
        self.values.cache().clear();
        self.element_types.cache().clear();
        self.element_types.names().clear();
        self.project_types.cache().clear();
        self.project_types.names().clear();
        self.field_types.cache().clear();
        self.field_types.names().clear();
        self.value_types.cache().clear();
        self.value_types.names().clear();
        self.project.replace(None);

        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                return Err(handle_error("Storage::close_database", "close", &[], e));
            }
            info!(database = %self.database_name(), "database closed");
        }
        self.path = None;
        Ok(())
    }

    /// Create the schema in dependency order, then load every schema node
    /// so the name indexes are complete.
    fn set_database(&mut self, conn: Connection, path: Option<PathBuf>) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON").map_err(|e| {
            handle_error("Storage::set_database", "PRAGMA foreign_keys = ON", &[], e)
        })?;

        self.nodes.set_database(&conn)?;
        self.node_types.set_database(&conn)?;
        self.value_types.set_database(&conn)?;
        self.field_types.set_database(&conn)?;
        self.element_types.set_database(&conn)?;
        self.project_types.set_database(&conn)?;
        self.values.set_database(&conn)?;
        self.fields.set_database(&conn)?;
        self.elements.set_database(&conn)?;
        self.projects.set_database(&conn)?;
        create_tables(&conn, schema::JOIN_INDEXES)?;

        self.conn = Some(conn);
        self.path = path;

        let root: &Storage = self;
        let value_types = root.value_types.load_all(root)?;
        let field_types = root.field_types.load_all(root)?;
        let element_types = root.element_types.load_all(root)?;
        let project_types = root.project_types.load_all(root)?;
        info!(
            database = %root.database_name(),
            value_types,
            field_types,
            element_types,
            project_types,
            "database opened"
        );
        Ok(())
    }

    pub fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(StorageError::NoDatabase)
    }

    pub(crate) fn txn(&self) -> &TxnContext {
        &self.txn
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// File stem of the database, used to name the root project
    pub fn database_name(&self) -> String {
        self.path
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| IN_MEMORY_NAME.to_string())
    }

    /// Author stamped into `createdBy`/`updatedBy`
    pub fn author(&self) -> String {
        self.author.borrow().clone()
    }

    pub fn set_author(&self, author: impl Into<String>) {
        self.author.replace(author.into());
    }

    /// Nesting depth of the open transaction; 0 when none is open
    pub fn transaction_depth(&self) -> u32 {
        self.txn.depth()
    }

    /// Open a transaction frame for batching several saves into one commit
    pub fn transaction(&self, mode: Mode) -> Result<Transaction<'_>> {
        Transaction::new(self, mode, None)
    }

    // ========== Generic Operations ==========

    /// Save `node` through the storage of its kind. With `new_version` the
    /// object is written to a new row with the next version number.
    pub fn save<T: Persistent>(&self, node: &Handle<T>, new_version: bool) -> Result<()> {
        T::storage(self, node.kind()).save_node(self, node, new_version)
    }

    pub fn save_version<T: Persistent>(&self, node: &Handle<T>) -> Result<()> {
        self.save(node, true)
    }

    pub fn save_any(&self, node: &AnyNode, new_version: bool) -> Result<()> {
        match node {
            AnyNode::Element(n) => self.save(n, new_version),
            AnyNode::Field(n) => self.save(n, new_version),
            AnyNode::Value(n) => self.save(n, new_version),
            AnyNode::ElementType(n) => self.save(n, new_version),
            AnyNode::FieldType(n) => self.save(n, new_version),
            AnyNode::ValueType(n) => self.save(n, new_version),
        }
    }

    /// Re-read `node` from its row, discarding unsaved changes
    pub fn reload<T: Persistent>(&self, node: &Handle<T>) -> Result<()> {
        let id = node.id();
        if id <= 0 {
            return Err(StorageError::InvalidRowId(id));
        }
        T::storage(self, node.kind()).reload_node(self, node)
    }

    /// Drop `node` from its cache and park it for reuse. The handle must not
    /// be used afterwards.
    pub fn recycle<T: Persistent>(&self, node: &Handle<T>) {
        self.forget_project(node.id());
        T::storage(self, node.kind()).recycle_node(node);
    }

    /// Delete the rows of `node`, detach it from its live parents and
    /// recycle it.
    pub fn remove<T: Persistent>(&self, node: &Handle<T>) -> Result<()> {
        let id = node.id();
        if id <= 0 {
            return Err(StorageError::InvalidRowId(id));
        }
        let kind = node.kind();
        let storage = T::storage(self, kind);
        storage.remove_node(self, id)?;

        T::unlink(node);
        self.forget_project(id);
        storage.recycle_node(node);
        debug!(%kind, id, "removed");
        Ok(())
    }

    fn forget_project(&self, id: i64) {
        let mut slot = self.project.borrow_mut();
        if id > 0 && slot.as_ref().is_some_and(|p| p.id() == id) {
            *slot = None;
        }
    }

    /// Kind tag stored for `id`
    pub fn kind_of(&self, id: i64) -> Result<StorableKind> {
        if id <= 0 {
            return Err(StorageError::InvalidRowId(id));
        }
        let raw: Option<i32> = query_row(
            self.connection()?,
            "Storage::kind_of",
            "SELECT type FROM Storable WHERE id = :id",
            named_params! { ":id": id },
            |row| row.get(0),
        )?;
        let raw = raw.ok_or(StorageError::NotFound { table: "Storable", id })?;
        StorableKind::from_id(raw).ok_or_else(|| {
            invariant("Storage::kind_of", format!("row {} has unknown kind {}", id, raw))
        })
    }

    /// The live object for `id`, whatever its kind
    pub fn load_any(&self, id: i64) -> Result<AnyNode> {
        Ok(match self.kind_of(id)? {
            StorableKind::Element => self.elements.node_by_id(self, id)?.into(),
            StorableKind::Project => self.projects.node_by_id(self, id)?.into(),
            StorableKind::Field => self.fields.node_by_id(self, id)?.into(),
            StorableKind::Value => self.values.node_by_id(self, id)?.into(),
            StorableKind::ElementType => self.element_types.node_by_id(self, id)?.into(),
            StorableKind::ProjectType => self.project_types.node_by_id(self, id)?.into(),
            StorableKind::FieldType => self.field_types.node_by_id(self, id)?.into(),
            StorableKind::ValueType => self.value_types.node_by_id(self, id)?.into(),
        })
    }

    /// Resolve a stored reference; failures are logged and give `None`
    pub(crate) fn resolve<T: Persistent>(&self, id: Option<i64>) -> Option<Handle<T>> {
        let id = id.filter(|id| *id > 0)?;
        let resolved = self
            .kind_of(id)
            .and_then(|kind| T::storage(self, kind).node_by_id(self, id));
        match resolved {
            Ok(node) => Some(node),
            Err(e) => {
                warn!(id, error = %e, "skipping unresolvable reference");
                None
            }
        }
    }

    // ========== Instances ==========

    pub fn element(&self) -> ElementRef {
        self.elements.node()
    }

    pub fn field(&self) -> FieldRef {
        self.fields.node()
    }

    pub fn value(&self) -> ValueRef {
        self.values.node()
    }

    pub fn element_by_id(&self, id: i64) -> Result<ElementRef> {
        self.elements.node_by_id(self, id)
    }

    pub fn field_by_id(&self, id: i64) -> Result<FieldRef> {
        self.fields.node_by_id(self, id)
    }

    pub fn value_by_id(&self, id: i64) -> Result<ValueRef> {
        self.values.node_by_id(self, id)
    }

    pub fn project_by_id(&self, id: i64) -> Result<ElementRef> {
        self.projects.node_by_id(self, id)
    }

    /// A new, unsaved project
    pub fn create_project(&self, name: &str) -> ElementRef {
        let project = self.projects.node();
        project.set_name(name);
        project
    }

    /// The root project: the most recent project row, created and saved
    /// under the database name when there is none.
    pub fn project(&self) -> Result<ElementRef> {
        if let Some(project) = self.project.borrow().as_ref() {
            return Ok(project.clone());
        }

        let latest: Option<Option<i64>> = query_row(
            self.connection()?,
            "Storage::project",
            "SELECT MAX(id) FROM Storable WHERE type = :type",
            named_params! { ":type": StorableKind::Project.id() },
            |row| row.get(0),
        )?;

        let project = match latest.flatten() {
            Some(id) => self.project_by_id(id)?,
            None => {
                let project = self.create_project(&self.database_name());
                if let Err(e) = self.save(&project, false) {
                    self.projects.recycle_node(&project);
                    return Err(e);
                }
                info!(id = project.id(), name = %project.name(), "created root project");
                project
            }
        };
        self.project.replace(Some(project.clone()));
        Ok(project)
    }

    // ========== Schema ==========

    pub fn create_element_type(&self, name: &str) -> Result<ElementTypeRef> {
        self.element_types.create_named(self, name)
    }

    pub fn create_project_type(&self, name: &str) -> Result<ElementTypeRef> {
        self.project_types.create_named(self, name)
    }

    pub fn create_field_type(&self, name: &str) -> Result<FieldTypeRef> {
        self.field_types.create_named(self, name)
    }

    pub fn create_value_type(&self, name: &str) -> Result<ValueTypeRef> {
        self.value_types.create_named(self, name)
    }

    pub fn element_type_by_id(&self, id: i64) -> Result<ElementTypeRef> {
        self.element_types.node_by_id(self, id)
    }

    pub fn project_type_by_id(&self, id: i64) -> Result<ElementTypeRef> {
        self.project_types.node_by_id(self, id)
    }

    pub fn field_type_by_id(&self, id: i64) -> Result<FieldTypeRef> {
        self.field_types.node_by_id(self, id)
    }

    pub fn value_type_by_id(&self, id: i64) -> Result<ValueTypeRef> {
        self.value_types.node_by_id(self, id)
    }

    pub fn element_type_by_name(&self, name: &str) -> Option<ElementTypeRef> {
        self.element_types.node_by_name(name)
    }

    pub fn project_type_by_name(&self, name: &str) -> Option<ElementTypeRef> {
        self.project_types.node_by_name(name)
    }

    pub fn field_type_by_name(&self, name: &str) -> Option<FieldTypeRef> {
        self.field_types.node_by_name(name)
    }

    pub fn value_type_by_name(&self, name: &str) -> Option<ValueTypeRef> {
        self.value_types.node_by_name(name)
    }

    /// Named element types, sorted by name
    pub fn all_element_types(&self) -> Vec<ElementTypeRef> {
        self.element_types.names().all()
    }

    pub fn all_project_types(&self) -> Vec<ElementTypeRef> {
        self.project_types.names().all()
    }

    pub fn all_field_types(&self) -> Vec<FieldTypeRef> {
        self.field_types.names().all()
    }

    pub fn all_value_types(&self) -> Vec<ValueTypeRef> {
        self.value_types.names().all()
    }

    // ========== Statistics ==========

    /// Row counts per kind
    pub fn stats(&self) -> Result<DbStats> {
        let counts: Vec<(i32, usize)> = query_map(
            self.connection()?,
            "Storage::stats",
            "SELECT type, COUNT(*) FROM Storable GROUP BY type",
            &[],
            |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)),
        )?;

        let mut stats = DbStats {
            database: self.database_name(),
            ..DbStats::default()
        };
        for (raw, count) in counts {
            match StorableKind::from_id(raw) {
                Some(StorableKind::Element) => stats.elements = count,
                Some(StorableKind::Project) => stats.projects = count,
                Some(StorableKind::Field) => stats.fields = count,
                Some(StorableKind::Value) => stats.values = count,
                Some(StorableKind::ElementType) => stats.element_types = count,
                Some(StorableKind::ProjectType) => stats.project_types = count,
                Some(StorableKind::FieldType) => stats.field_types = count,
                Some(StorableKind::ValueType) => stats.value_types = count,
                None => warn!(kind = raw, count, "rows with unknown kind"),
            }
        }
        Ok(stats)
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

/// Database statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct DbStats {
    pub database: String,
    pub projects: usize,
    pub elements: usize,
    pub fields: usize,
    pub values: usize,
    pub project_types: usize,
    pub element_types: usize,
    pub field_types: usize,
    pub value_types: usize,
}

impl DbStats {
    pub fn total(&self) -> usize {
        self.projects
            + self.elements
            + self.fields
            + self.values
            + self.project_types
            + self.element_types
            + self.field_types
            + self.value_types
    }

    /// (label, count) rows in display order
    pub fn rows(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("Projects", self.projects),
            ("Elements", self.elements),
            ("Fields", self.fields),
            ("Values", self.values),
            ("Project types", self.project_types),
            ("Element types", self.element_types),
            ("Field types", self.field_types),
            ("Value types", self.value_types),
        ]
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics ({}):", self.database)?;
        for (label, count) in self.rows() {
            writeln!(f, "  {}: {}", label, count)?;
        }
        write!(f, "  Total: {}", self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storable::Storable;
    use crate::variant::{ValueKind, Variant};
    use tempfile::TempDir;

    #[test]
    fn test_story_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("novel.db");

        {
            let storage = Storage::open(&path).unwrap();
            let story = storage.create_element_type("story").unwrap();
            let title = storage.create_field_type("title").unwrap();
            title.set_allowed_types(vec![ValueKind::String]);
            title.append_value_type(storage.create_value_type("value").unwrap());
            story.append_field_type(title.clone());
            storage.save(&story, false).unwrap();

            let element = storage.element();
            element.set_node_type(Some(story.clone()));
            let field = storage.field();
            field.set_name("title");
            field.set_node_type(Some(title.clone()));
            element.append_field(field.clone());
            for text in ["A", "B"] {
                let value = storage.value();
                field.append_value(value.clone());
                value.set_value(text).unwrap();
            }

            let project = storage.project().unwrap();
            let contents = storage.field();
            contents.set_name("contents");
            let reference = storage.value();
            reference
                .set_value(Variant::Node(AnyNode::Element(element.clone())))
                .unwrap();
            contents.append_value(reference);
            project.append_field(contents);
            storage.save(&project, false).unwrap();
            assert!(element.id() > 0);
        }

        let storage = Storage::open(&path).unwrap();
        let project = storage.project().unwrap();
        assert_eq!(project.name(), "novel");

        let contents = project.field("contents").unwrap();
        let element = match contents.values()[0].value() {
            Variant::Node(AnyNode::Element(element)) => element,
            other => panic!("unexpected value: {other:?}"),
        };
        assert_eq!(element.node_type().map(|t| t.name()), Some("story".to_string()));

        let title = element.field("title").unwrap();
        let texts: Vec<Variant> = title.values().iter().map(|v| v.value()).collect();
        assert_eq!(texts, vec![Variant::from("A"), Variant::from("B")]);
        assert_eq!(title.allowed_types(), vec![ValueKind::String]);
    }

    #[test]
    fn test_project_created_on_demand() {
        let storage = Storage::open_in_memory().unwrap();
        let project = storage.project().unwrap();
        assert!(project.is_project());
        assert_eq!(project.name(), IN_MEMORY_NAME);
        assert!(project.id() > 0);
        assert!(storage.project().unwrap().ptr_eq(&project));

        storage.remove(&project).unwrap();
        let replacement = storage.project().unwrap();
        assert!(replacement.id() > 0);
        assert_eq!(storage.stats().unwrap().projects, 1);
    }

    #[test]
    fn test_load_any_dispatches_on_kind() {
        let storage = Storage::open_in_memory().unwrap();
        let title = storage.create_field_type("title").unwrap();
        let field = storage.field();
        storage.save(&field, false).unwrap();

        match storage.load_any(title.id()).unwrap() {
            AnyNode::FieldType(loaded) => assert!(loaded.ptr_eq(&title)),
            other => panic!("unexpected node: {other:?}"),
        }
        assert_eq!(storage.kind_of(field.id()).unwrap(), StorableKind::Field);
        assert!(matches!(
            storage.load_any(9999),
            Err(StorageError::NotFound { table: "Storable", .. })
        ));
        assert!(matches!(storage.load_any(0), Err(StorageError::InvalidRowId(0))));
    }

    #[test]
    fn test_reload_discards_unsaved_changes() {
        let storage = Storage::open_in_memory().unwrap();
        let element = storage.element();
        element.set_name("draft");
        storage.save(&element, false).unwrap();

        element.set_name("edited");
        storage.reload(&element).unwrap();
        assert_eq!(element.name(), "draft");
        assert!(!element.is_modified());
    }

    #[test]
    fn test_batched_saves_commit_once() {
        let storage = Storage::open_in_memory().unwrap();
        let first = storage.element();
        let second = storage.element();
        {
            let txn = storage.transaction(Mode::WRITE).unwrap();
            storage.save(&first, false).unwrap();
            storage.save(&second, false).unwrap();
            assert_eq!(storage.transaction_depth(), 1);
            drop(txn);
        }
        assert_eq!(storage.transaction_depth(), 0);
        assert_eq!(storage.stats().unwrap().elements, 0);
        assert!(first.is_modified());
    }

    #[test]
    fn test_edit_after_load_in_batch_is_saved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("novel.db");
        let id = {
            let storage = Storage::open(&path).unwrap();
            let element = storage.element();
            element.set_name("draft");
            storage.save(&element, false).unwrap();
            element.id()
        };

        {
            let storage = Storage::open(&path).unwrap();
            let txn = storage.transaction(Mode::WRITE).unwrap();
            let element = storage.element_by_id(id).unwrap();
            assert!(!element.borrow().is_loading());
            element.set_name("final");
            assert!(element.is_modified());
            storage.save(&element, false).unwrap();
            txn.commit().unwrap();
            assert!(!element.is_modified());
        }

        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.element_by_id(id).unwrap().name(), "final");
    }

    #[test]
    fn test_child_edited_between_saves_in_batch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("novel.db");
        let id = {
            let storage = Storage::open(&path).unwrap();
            let element = storage.element();
            let field = storage.field();
            field.set_name("title");
            element.append_field(field.clone());

            let txn = storage.transaction(Mode::WRITE).unwrap();
            storage.save(&element, false).unwrap();
            assert!(!field.borrow().is_saving());
            field.set_label("Edited");
            storage.save(&element, false).unwrap();
            txn.commit().unwrap();
            assert!(!field.is_modified());
            element.id()
        };

        let storage = Storage::open(&path).unwrap();
        let element = storage.element_by_id(id).unwrap();
        assert_eq!(element.field("title").unwrap().label(), "Edited");
    }

    #[test]
    fn test_edit_after_last_save_stays_modified() {
        let storage = Storage::open_in_memory().unwrap();
        let element = storage.element();
        let field = storage.field();
        field.set_name("title");
        element.append_field(field.clone());

        let txn = storage.transaction(Mode::WRITE).unwrap();
        storage.save(&element, false).unwrap();
        field.set_label("Edited");
        txn.commit().unwrap();

        assert!(field.is_modified());
        assert!(!element.is_modified());
        storage.save(&element, false).unwrap();
        storage.reload(&field).unwrap();
        assert_eq!(field.label(), "Edited");
    }

    #[test]
    fn test_open_failure_reports_context() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("novel.db");
        match Storage::open(&path) {
            Err(StorageError::Query { context, sql, .. }) => {
                assert_eq!(context, "Storage::open_database");
                assert!(sql.ends_with("novel.db"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a database in a missing directory"),
        }
    }

    #[test]
    fn test_stats_and_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("draft.db");
        let mut storage = Storage::open(&path).unwrap();
        storage.create_element_type("chapter").unwrap();
        storage.create_field_type("title").unwrap();
        storage.save(&storage.element(), false).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.database, "draft");
        assert_eq!((stats.elements, stats.element_types, stats.field_types), (1, 1, 1));
        assert_eq!(stats.total(), 3);
        assert!(stats.to_string().contains("Element types: 1"));

        storage.close_database().unwrap();
        assert!(!storage.is_open());
        assert!(storage.element_type_by_name("chapter").is_none());
        assert!(matches!(storage.stats(), Err(StorageError::NoDatabase)));

        storage.open_database(&path).unwrap();
        assert!(storage.element_type_by_name("chapter").is_some());
    }
}
