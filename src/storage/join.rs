//! Ordered association tables
//!
//! Each association is stored as `(id, "index", <parent>, <child>)` rows and
//! rewritten wholesale on save: delete every row of the parent, then insert
//! one row per child with its position.

use super::query::{execute, query_map};
use crate::Result;
use rusqlite::{named_params, Connection};

#[derive(Debug, Clone, Copy)]
pub(crate) struct JoinTable {
    pub table: &'static str,
    pub parent: &'static str,
    pub child: &'static str,
}

pub(crate) const ELEMENT_FIELDS: JoinTable = JoinTable {
    table: "Element_fields",
    parent: "element",
    child: "field",
};

pub(crate) const FIELD_VALUES: JoinTable = JoinTable {
    table: "Field_values",
    parent: "field",
    child: "value",
};

pub(crate) const FIELD_ALLOWED_TYPES: JoinTable = JoinTable {
    table: "Field_allowedTypes",
    parent: "field",
    child: "type",
};

pub(crate) const ELEMENT_TYPE_FIELD_TYPES: JoinTable = JoinTable {
    table: "ElementType_fieldTypes",
    parent: "elementType",
    child: "fieldType",
};

pub(crate) const FIELD_TYPE_VALUE_TYPES: JoinTable = JoinTable {
    table: "FieldType_valueTypes",
    parent: "fieldType",
    child: "valueType",
};

pub(crate) const FIELD_TYPE_ALLOWED_TYPES: JoinTable = JoinTable {
    table: "FieldType_allowedTypes",
    parent: "fieldType",
    child: "type",
};

impl JoinTable {
    /// Replace the parent's rows with `children`, in order
    pub fn rewrite(&self, conn: &Connection, parent: i64, children: &[i64]) -> Result<()> {
        self.clear(conn, parent)?;

        let sql = format!(
            r#"INSERT INTO {} ("index", {}, {}) VALUES (:index, :parent, :child)"#,
            self.table, self.parent, self.child
        );
        for (index, child) in children.iter().enumerate() {
            let index = index as i64;
            execute(
                conn,
                "JoinTable::rewrite",
                &sql,
                named_params! { ":index": index, ":parent": parent, ":child": child },
            )?;
        }
        Ok(())
    }

    /// Child ids of `parent`, in stored order
    pub fn load(&self, conn: &Connection, parent: i64) -> Result<Vec<i64>> {
        let sql = format!(
            r#"SELECT {} FROM {} WHERE {} = :parent ORDER BY "index""#,
            self.child, self.table, self.parent
        );
        query_map(
            conn,
            "JoinTable::load",
            &sql,
            named_params! { ":parent": parent },
            |row| row.get(0),
        )
    }

    pub fn clear(&self, conn: &Connection, parent: i64) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE {} = :parent", self.table, self.parent);
        execute(conn, "JoinTable::clear", &sql, named_params! { ":parent": parent })?;
        Ok(())
    }
}
