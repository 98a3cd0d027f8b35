//! Base levels shared by every kind: the `Storable` and `Node` rows
//!
//! Neither level owns a cache; nothing is ever just a Node.

use super::base::create_tables;
use super::query::{execute, insert, invariant, query_row};
use super::schema;
use super::transaction::{Mode, Transaction};
use super::Storage;
use crate::model::schema::SchemaNode;
use crate::model::{Handle, Node, NodeData};
use crate::{Result, StorageError};
use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection};

/// Persists the `Storable` and `Node` rows of every kind.
#[derive(Debug, Default)]
pub struct NodeStorage;

struct NodeRow {
    kind: i32,
    type_name: String,
    version: i64,
    created_at: Option<String>,
    updated_at: Option<String>,
    created_by: Option<String>,
    updated_by: Option<String>,
    node_type: Option<i64>,
    data: NodeData,
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Row id written to `Node.nodeType`; an unsaved prototype is written as NULL
fn node_type_column<T: Node>(node: &T) -> Option<i64> {
    node.node_type_id().filter(|id| *id > 0)
}

impl NodeStorage {
    pub fn set_database(&self, conn: &Connection) -> Result<()> {
        create_tables(conn, &[schema::CREATE_STORABLE_TABLE, schema::CREATE_NODE_TABLE])?;
        create_tables(conn, schema::NODE_INDEXES)
    }

    /// Insert fresh `Storable` and `Node` rows, giving the object a new row
    /// id and the next version number.
    pub fn insert_node<T: Node + 'static>(&self, root: &Storage, node: &Handle<T>) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE, Some(node.as_storable()))?;
        let conn = root.connection()?;
        let now = Utc::now();
        let author = root.author();

        let (kind, version, created_at, created_by, node_type, data) = {
            let n = node.borrow();
            let meta = n.meta();
            let created_by = if meta.created_by.is_empty() {
                author.clone()
            } else {
                meta.created_by.clone()
            };
            (
                n.kind(),
                meta.version + 1,
                meta.created_at.unwrap_or(now),
                created_by,
                node_type_column(&*n),
                n.node().clone(),
            )
        };

        let id = insert(
            conn,
            "NodeStorage::insert_node",
            r#"
            INSERT INTO Storable (type, typeName, version, createdAt, updatedAt, createdBy, updatedBy)
            VALUES (:type, :typeName, :version, :createdAt, :updatedAt, :createdBy, :updatedBy)
            "#,
            named_params! {
                ":type": kind.id(),
                ":typeName": kind.as_str(),
                ":version": version,
                ":createdAt": created_at.to_rfc3339(),
                ":updatedAt": now.to_rfc3339(),
                ":createdBy": created_by,
                ":updatedBy": author,
            },
        )?;

        execute(
            conn,
            "NodeStorage::insert_node",
            r#"
            INSERT INTO Node (id, nodeType, name, label, info, icon)
            VALUES (:id, :nodeType, :name, :label, :info, :icon)
            "#,
            named_params! {
                ":id": id,
                ":nodeType": node_type,
                ":name": data.name,
                ":label": data.label,
                ":info": data.info,
                ":icon": data.icon,
            },
        )?;

        {
            let mut n = node.borrow_mut();
            let meta = n.meta_mut();
            meta.id = id;
            meta.version = version;
            meta.created_at = Some(created_at);
            meta.updated_at = Some(now);
            meta.created_by = created_by;
            meta.updated_by = author;
        }
        txn.commit()
    }

    /// Update the rows in place; the version is left alone.
    pub fn update_node<T: Node + 'static>(&self, root: &Storage, node: &Handle<T>) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE, Some(node.as_storable()))?;
        let conn = root.connection()?;
        let now = Utc::now();
        let author = root.author();

        let (id, node_type, data) = {
            let n = node.borrow();
            (n.id(), node_type_column(&*n), n.node().clone())
        };

        let changed = execute(
            conn,
            "NodeStorage::update_node",
            "UPDATE Storable SET updatedAt = :updatedAt, updatedBy = :updatedBy WHERE id = :id",
            named_params! {
                ":id": id,
                ":updatedAt": now.to_rfc3339(),
                ":updatedBy": author,
            },
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound { table: "Storable", id });
        }

        let changed = execute(
            conn,
            "NodeStorage::update_node",
            r#"
            UPDATE Node SET nodeType = :nodeType, name = :name, label = :label, info = :info, icon = :icon
            WHERE id = :id
            "#,
            named_params! {
                ":id": id,
                ":nodeType": node_type,
                ":name": data.name,
                ":label": data.label,
                ":info": data.info,
                ":icon": data.icon,
            },
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound { table: "Node", id });
        }

        {
            let mut n = node.borrow_mut();
            let meta = n.meta_mut();
            meta.updated_at = Some(now);
            meta.updated_by = author;
        }
        txn.commit()
    }

    /// Reload the shared columns and return the stored `nodeType` id.
    ///
    /// Fails with `KindMismatch` when the row belongs to another kind.
    pub fn reload_node<T: Node + 'static>(
        &self,
        root: &Storage,
        node: &Handle<T>,
    ) -> Result<Option<i64>> {
        let txn = Transaction::new(root, Mode::READ, Some(node.as_storable()))?;
        let conn = root.connection()?;
        let (id, expected) = {
            let n = node.borrow();
            (n.id(), n.kind())
        };

        let row = query_row(
            conn,
            "NodeStorage::reload_node",
            r#"
            SELECT s.type, s.typeName, s.version, s.createdAt, s.updatedAt, s.createdBy, s.updatedBy,
                   n.nodeType, n.name, n.label, n.info, n.icon
            FROM Storable s JOIN Node n ON n.id = s.id
            WHERE s.id = :id
            "#,
            named_params! { ":id": id },
            |row| {
                Ok(NodeRow {
                    kind: row.get(0)?,
                    type_name: row.get(1)?,
                    version: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                    created_by: row.get(5)?,
                    updated_by: row.get(6)?,
                    node_type: row.get(7)?,
                    data: NodeData {
                        name: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                        label: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                        info: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
                        icon: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                    },
                })
            },
        )?;

        let Some(row) = row else {
            return Err(StorageError::NotFound { table: "Node", id });
        };
        if row.kind != expected.id() {
            return Err(StorageError::KindMismatch {
                id,
                expected,
                found: row.type_name,
            });
        }

        {
            let mut n = node.borrow_mut();
            *n.node_mut() = row.data;
            let meta = n.meta_mut();
            meta.version = row.version;
            meta.created_at = parse_timestamp(row.created_at);
            meta.updated_at = parse_timestamp(row.updated_at);
            meta.created_by = row.created_by.unwrap_or_default();
            meta.updated_by = row.updated_by.unwrap_or_default();
        }
        txn.commit()?;
        Ok(row.node_type)
    }

    /// Delete the `Storable` row; every kind row cascades with it.
    pub fn remove_node(&self, root: &Storage, id: i64) -> Result<()> {
        let txn = Transaction::new(root, Mode::WRITE, None)?;
        let changed = execute(
            root.connection()?,
            "NodeStorage::remove_node",
            "DELETE FROM Storable WHERE id = :id",
            named_params! { ":id": id },
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound { table: "Storable", id });
        }
        txn.commit()
    }
}

/// Base level of the schema kinds: name invariant and meta type.
#[derive(Debug, Default)]
pub struct NodeTypeStorage;

impl NodeTypeStorage {
    /// Node types add no table of their own
    pub fn set_database(&self, _conn: &Connection) -> Result<()> {
        Ok(())
    }

    fn check_name<T: SchemaNode + 'static>(node: &Handle<T>) -> Result<()> {
        let n = node.borrow();
        if n.own_name().is_empty() {
            return Err(invariant(
                "NodeTypeStorage",
                format!("{} #{} has no name", n.kind(), n.id()),
            ));
        }
        Ok(())
    }

    pub fn insert_node<T: SchemaNode + 'static>(
        &self,
        root: &Storage,
        node: &Handle<T>,
    ) -> Result<()> {
        Self::check_name(node)?;
        root.nodes.insert_node(root, node)
    }

    pub fn update_node<T: SchemaNode + 'static>(
        &self,
        root: &Storage,
        node: &Handle<T>,
    ) -> Result<()> {
        Self::check_name(node)?;
        root.nodes.update_node(root, node)
    }

    pub fn reload_node<T: SchemaNode + 'static>(
        &self,
        root: &Storage,
        node: &Handle<T>,
    ) -> Result<()> {
        let meta_type = root.nodes.reload_node(root, node)?;
        node.borrow_mut().set_meta_type(meta_type);
        Ok(())
    }

    pub fn remove_node(&self, root: &Storage, id: i64) -> Result<()> {
        root.nodes.remove_node(root, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storable::StorableKind;
    use crate::storage::base::BaseStorage;

    #[test]
    fn test_insert_stamps_storable_row() {
        let storage = Storage::open_in_memory().unwrap();
        storage.set_author("ada");
        let element = storage.element();
        element.set_name("chapter");

        storage.nodes.insert_node(&storage, &element).unwrap();
        assert!(element.id() > 0);
        assert_eq!(element.version(), 1);
        assert_eq!(element.meta().created_by(), "ada");

        let (type_name, name): (String, String) = storage
            .connection()
            .unwrap()
            .query_row(
                "SELECT s.typeName, n.name FROM Storable s JOIN Node n ON n.id = s.id WHERE s.id = ?1",
                [element.id()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(type_name, "Element");
        assert_eq!(name, "chapter");
    }

    #[test]
    fn test_reload_rejects_other_kind() {
        let storage = Storage::open_in_memory().unwrap();
        let element = storage.element();
        storage.nodes.insert_node(&storage, &element).unwrap();

        let field = storage.field();
        field.borrow_mut().meta.id = element.id();
        let err = storage.nodes.reload_node(&storage, &field).unwrap_err();
        assert!(matches!(
            err,
            StorageError::KindMismatch { expected: StorableKind::Field, .. }
        ));
    }

    #[test]
    fn test_type_requires_name() {
        let storage = Storage::open_in_memory().unwrap();
        let unnamed = storage.element_types.node();
        let err = storage.node_types.insert_node(&storage, &unnamed).unwrap_err();
        assert!(matches!(err, StorageError::Invariant { .. }));
    }
}
