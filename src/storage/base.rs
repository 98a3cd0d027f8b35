//! The contract every kind storage implements
//!
//! A kind storage persists one table on top of its base kind's tables and
//! owns the identity cache for its objects. The four primitives
//! (`insert_node`, `update_node`, `reload_node`, `remove_node`) delegate to
//! the base kind first; the provided methods build caching, loading and
//! saving on top of them.

use super::cache::{IdentityCache, NameIndex};
use super::query::{execute, invariant, query_map, query_row};
use super::Storage;
use crate::model::{Handle, Node};
use crate::storable::{Storable, StorableKind};
use crate::{Result, StorageError};
use rusqlite::{named_params, Connection};
use tracing::{debug, error, warn};

pub trait BaseStorage {
    type Object: Storable + 'static;

    fn kind(&self) -> StorableKind;

    fn cache(&self) -> &IdentityCache<Self::Object>;

    /// A fresh, never-persisted object of this kind
    fn construct(&self) -> Self::Object;

    /// Create this kind's tables and indexes
    fn set_database(&self, conn: &Connection) -> Result<()>;

    fn insert_node(&self, root: &Storage, node: &Handle<Self::Object>) -> Result<()>;

    fn update_node(&self, root: &Storage, node: &Handle<Self::Object>) -> Result<()>;

    fn reload_node(&self, root: &Storage, node: &Handle<Self::Object>) -> Result<()>;

    fn remove_node(&self, root: &Storage, id: i64) -> Result<()>;

    /// Whether a save would write anything: own changes, or changed owned children
    fn is_dirty(&self, _root: &Storage, node: &Handle<Self::Object>) -> bool {
        node.is_modified()
    }

    /// Called once the object is mapped under its current row id
    fn registered(&self, _node: &Handle<Self::Object>) {}

    /// Called before the object is parked in the pool
    fn recycled(&self, _node: &Handle<Self::Object>) {}

    /// A pooled object if one is available, else a fresh one
    fn node(&self) -> Handle<Self::Object> {
        let node = self
            .cache()
            .revive()
            .unwrap_or_else(|| Handle::new(self.construct()));
        self.cache().track(&node);
        node
    }

    /// The live object for `id`, loading it on a cache miss
    fn node_by_id(&self, root: &Storage, id: i64) -> Result<Handle<Self::Object>> {
        if id <= 0 {
            error!(kind = %self.kind(), id, "invalid row id");
            return Err(StorageError::InvalidRowId(id));
        }
        match self.cache().get(id) {
            Some(node) => Ok(node),
            None => self.load_node(root, id),
        }
    }

    /// Map a new object under `id`, then reload it. A failed reload recycles
    /// the object so no half-loaded entry stays in the cache.
    fn load_node(&self, root: &Storage, id: i64) -> Result<Handle<Self::Object>> {
        let node = self.node();
        node.borrow_mut().meta_mut().id = id;
        self.cache().register(&node);

        if let Err(e) = self.reload_node(root, &node) {
            self.recycle_node(&node);
            return Err(e);
        }
        self.registered(&node);
        debug!(kind = %self.kind(), id, "loaded");
        Ok(node)
    }

    /// Detach the object and park it for reuse. It must be treated as
    /// destroyed by the caller.
    fn recycle_node(&self, node: &Handle<Self::Object>) {
        self.recycled(node);
        self.cache().recycle(node);
    }

    /// Insert when never persisted or when `new_version` is set, update when
    /// there are unsaved changes, otherwise do nothing.
    fn save_node(
        &self,
        root: &Storage,
        node: &Handle<Self::Object>,
        new_version: bool,
    ) -> Result<()> {
        let persisted = node.borrow().meta().is_persisted();
        if persisted && !new_version && !self.is_dirty(root, node) {
            return Ok(());
        }

        if new_version || !persisted {
            self.insert_node(root, node)?;
        } else {
            self.update_node(root, node)?;
        }
        self.cache().register(node);
        self.registered(node);
        debug!(kind = %self.kind(), id = node.id(), new_version, "saved");
        Ok(())
    }
}

/// Schema kinds additionally keep a by-name index.
pub trait BaseTypeStorage: BaseStorage<Object: Node> {
    fn names(&self) -> &NameIndex<Self::Object>;

    fn node_by_name(&self, name: &str) -> Option<Handle<Self::Object>> {
        self.names().get(name)
    }

    /// Create and save a type named `name`; the name must be non-empty and
    /// not yet used by this kind.
    fn create_named(&self, root: &Storage, name: &str) -> Result<Handle<Self::Object>> {
        if name.is_empty() {
            return Err(invariant(
                "BaseTypeStorage::create_named",
                format!("{} without a name", self.kind()),
            ));
        }
        if self.node_by_name(name).is_some() {
            warn!(kind = %self.kind(), name, "name already taken");
            return Err(StorageError::NameTaken {
                kind: self.kind(),
                name: name.to_string(),
            });
        }

        let node = self.node();
        node.set_name(name);
        if let Err(e) = self.save_node(root, &node, false) {
            self.recycle_node(&node);
            return Err(e);
        }
        Ok(node)
    }

    /// Load every row of this kind, filling the name index
    fn load_all(&self, root: &Storage) -> Result<usize> {
        let ids: Vec<i64> = query_map(
            root.connection()?,
            "BaseTypeStorage::load_all",
            "SELECT id FROM Storable WHERE type = :type ORDER BY id",
            named_params! { ":type": self.kind().id() },
            |row| row.get(0),
        )?;

        let mut loaded = 0;
        for id in ids {
            match self.node_by_id(root, id) {
                Ok(_) => loaded += 1,
                Err(e) => warn!(kind = %self.kind(), id, error = %e, "skipping unloadable type"),
            }
        }
        Ok(loaded)
    }
}

/// Objects `Storage` can save, reload and remove generically.
pub trait Persistent: Storable + Sized + 'static {
    /// The storage responsible for objects tagged `kind`
    fn storage(root: &Storage, kind: StorableKind) -> &dyn BaseStorage<Object = Self>;

    /// Detach a removed object from its live parents
    fn unlink(_node: &Handle<Self>) {}
}

pub(crate) fn create_tables(conn: &Connection, statements: &[&str]) -> Result<()> {
    for sql in statements {
        conn.execute_batch(sql)
            .map_err(|e| super::query::handle_error("create_tables", sql, &[], e))?;
    }
    Ok(())
}

/// Save owned children that are new or changed, each as a new version.
/// Children already being saved further up the stack are skipped.
pub(crate) fn save_children<S>(
    storage: &S,
    root: &Storage,
    children: &[Handle<S::Object>],
) -> Result<()>
where
    S: BaseStorage + ?Sized,
{
    for child in children {
        let (saving, persisted) = {
            let child = child.borrow();
            (child.is_saving(), child.meta().is_persisted())
        };
        if saving {
            continue;
        }
        if !persisted || storage.is_dirty(root, child) {
            storage.save_node(root, child, true)?;
        }
    }
    Ok(())
}

/// Resolve child row ids through `storage`, skipping the ones that fail
pub(crate) fn resolve_children<S>(
    storage: &S,
    root: &Storage,
    parent: i64,
    ids: Vec<i64>,
) -> Vec<Handle<S::Object>>
where
    S: BaseStorage + ?Sized,
{
    ids.into_iter()
        .filter_map(|id| match storage.node_by_id(root, id) {
            Ok(child) => Some(child),
            Err(e) => {
                warn!(
                    parent,
                    child = id,
                    kind = %storage.kind(),
                    error = %e,
                    "skipping unresolvable child"
                );
                None
            }
        })
        .collect()
}

/// Fail with `NotFound` unless `table` has a row for `id`
pub(crate) fn require_row(conn: &Connection, table: &'static str, id: i64) -> Result<()> {
    let sql = format!("SELECT id FROM {} WHERE id = :id", table);
    let found: Option<i64> =
        query_row(conn, "require_row", &sql, named_params! { ":id": id }, |row| row.get(0))?;
    match found {
        Some(_) => Ok(()),
        None => Err(StorageError::NotFound { table, id }),
    }
}

/// `INSERT` the kind row for `id` if missing
pub(crate) fn ensure_row(conn: &Connection, table: &'static str, id: i64) -> Result<()> {
    let sql = format!("INSERT INTO {} (id) VALUES (:id) ON CONFLICT(id) DO NOTHING", table);
    execute(conn, "ensure_row", &sql, named_params! { ":id": id })?;
    Ok(())
}

pub(crate) fn delete_row(conn: &Connection, table: &'static str, id: i64) -> Result<()> {
    let sql = format!("DELETE FROM {} WHERE id = :id", table);
    execute(conn, "delete_row", &sql, named_params! { ":id": id })?;
    Ok(())
}
