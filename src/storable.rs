//! Storable - the shared identity of every persisted object
//!
//! Every row in every kind table hangs off one row of the `Storable` table.
//! The kind tags form a closed set:
//! - Schema: `ElementType`, `FieldType`, `ValueType`, `ProjectType`
//! - Instances: `Element`, `Field`, `Value`, `Project`

use crate::{Result, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

/// Kind tag persisted in `Storable.type` / `Storable.typeName`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorableKind {
    Element,
    Field,
    Value,
    /// An element that is the aggregate root of a database
    Project,
    ElementType,
    FieldType,
    ValueType,
    /// An element type describing projects
    ProjectType,
}

impl StorableKind {
    /// Integer written to `Storable.type`
    pub fn id(&self) -> i32 {
        match self {
            StorableKind::Element => 1,
            StorableKind::Field => 2,
            StorableKind::Value => 3,
            StorableKind::Project => 4,
            StorableKind::ElementType => 11,
            StorableKind::FieldType => 12,
            StorableKind::ValueType => 13,
            StorableKind::ProjectType => 14,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::all().iter().copied().find(|kind| kind.id() == id)
    }

    /// Name written to `Storable.typeName`
    pub fn as_str(&self) -> &'static str {
        match self {
            StorableKind::Element => "Element",
            StorableKind::Field => "Field",
            StorableKind::Value => "Value",
            StorableKind::Project => "Project",
            StorableKind::ElementType => "ElementType",
            StorableKind::FieldType => "FieldType",
            StorableKind::ValueType => "ValueType",
            StorableKind::ProjectType => "ProjectType",
        }
    }

    pub fn all() -> &'static [StorableKind] {
        &[
            StorableKind::Element,
            StorableKind::Field,
            StorableKind::Value,
            StorableKind::Project,
            StorableKind::ElementType,
            StorableKind::FieldType,
            StorableKind::ValueType,
            StorableKind::ProjectType,
        ]
    }

    /// Whether this kind describes other nodes (schema) rather than holding data
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            StorableKind::ElementType
                | StorableKind::FieldType
                | StorableKind::ValueType
                | StorableKind::ProjectType
        )
    }
}

impl FromStr for StorableKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "element" => Ok(StorableKind::Element),
            "field" => Ok(StorableKind::Field),
            "value" => Ok(StorableKind::Value),
            "project" => Ok(StorableKind::Project),
            "elementtype" | "element-type" | "element_type" => Ok(StorableKind::ElementType),
            "fieldtype" | "field-type" | "field_type" => Ok(StorableKind::FieldType),
            "valuetype" | "value-type" | "value_type" => Ok(StorableKind::ValueType),
            "projecttype" | "project-type" | "project_type" => Ok(StorableKind::ProjectType),
            _ => Err(StorageError::Invariant {
                context: "StorableKind::from_str",
                message: format!("Unknown storable kind: {}", s),
            }),
        }
    }
}

impl std::fmt::Display for StorableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Columns of the `Storable` row plus the in-memory lifecycle flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorableMeta {
    /// Row id; 0 while never persisted
    pub(crate) id: i64,
    /// Bumped by every new-version save
    pub(crate) version: i64,
    pub(crate) created_at: Option<DateTime<Utc>>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
    pub(crate) created_by: String,
    pub(crate) updated_by: String,
    pub(crate) modified: bool,
    /// Count of accepted mutations, never reset by a save
    pub(crate) mutations: u64,
    pub(crate) loading: bool,
    pub(crate) saving: bool,
}

impl StorableMeta {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn updated_by(&self) -> &str {
        &self.updated_by
    }

    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }
}

/// Anything with a `Storable` row.
pub trait Storable {
    fn kind(&self) -> StorableKind;

    fn meta(&self) -> &StorableMeta;

    fn meta_mut(&mut self) -> &mut StorableMeta;

    /// Return to the freshly constructed state (used by the recycle pool)
    fn reset(&mut self);

    fn id(&self) -> i64 {
        self.meta().id
    }

    fn is_modified(&self) -> bool {
        self.meta().modified
    }

    fn is_loading(&self) -> bool {
        self.meta().loading
    }

    fn is_saving(&self) -> bool {
        self.meta().saving
    }

    /// Flag a mutation; ignored while the storage layer is loading the object
    fn mark_modified(&mut self) {
        let meta = self.meta_mut();
        if !meta.loading {
            meta.modified = true;
            meta.mutations += 1;
        }
    }
}

/// Type-erased shared object, as held by transactions
pub type StorableRef = Rc<RefCell<dyn Storable>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in StorableKind::all() {
            assert_eq!(StorableKind::from_id(kind.id()), Some(*kind));
            let parsed: StorableKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, *kind);
        }
    }

    #[test]
    fn test_kind_aliases() {
        assert_eq!(StorableKind::from_str("field-type").unwrap(), StorableKind::FieldType);
        assert_eq!(StorableKind::from_str("project_type").unwrap(), StorableKind::ProjectType);
        assert!(StorableKind::from_str("chapter").is_err());
    }

    #[test]
    fn test_type_kinds() {
        assert!(StorableKind::ProjectType.is_type());
        assert!(!StorableKind::Project.is_type());
    }
}
