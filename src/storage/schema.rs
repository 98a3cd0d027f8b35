//! Database schema definitions
//!
//! Class-table inheritance: every kind table keys on the id of its base
//! table, down to `Storable`, with `ON DELETE CASCADE` at each level.
//! Ordered associations live in join tables carrying an `index` column.

/// Root identity table; every row id in the database comes from here
pub const CREATE_STORABLE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS Storable (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type INTEGER NOT NULL,
    typeName TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    createdAt TEXT,
    updatedAt TEXT,
    createdBy TEXT,
    updatedBy TEXT
)
"#;

pub const CREATE_NODE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS Node (
    id INTEGER PRIMARY KEY REFERENCES Storable(id) ON DELETE CASCADE,
    nodeType INTEGER REFERENCES Storable(id) ON DELETE SET NULL,
    name TEXT,
    label TEXT,
    info TEXT,
    icon TEXT
)
"#;

pub const NODE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_Storable_type ON Storable(type)",
    "CREATE INDEX IF NOT EXISTS idx_Node_name ON Node(name)",
    "CREATE INDEX IF NOT EXISTS idx_Node_nodeType ON Node(nodeType)",
];

// ========== Instances ==========

pub const CREATE_ELEMENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS Element (
    id INTEGER PRIMARY KEY REFERENCES Node(id) ON DELETE CASCADE
)
"#;

pub const CREATE_ELEMENT_FIELDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS Element_fields (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    "index" INTEGER NOT NULL,
    element INTEGER NOT NULL REFERENCES Element(id) ON DELETE CASCADE,
    field INTEGER NOT NULL REFERENCES Field(id) ON DELETE CASCADE
)
"#;

pub const CREATE_FIELD_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS Field (
    id INTEGER PRIMARY KEY REFERENCES Node(id) ON DELETE CASCADE,
    minOccurs INTEGER,
    maxOccurs INTEGER
)
"#;

pub const CREATE_FIELD_VALUES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS Field_values (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    "index" INTEGER NOT NULL,
    field INTEGER NOT NULL REFERENCES Field(id) ON DELETE CASCADE,
    value INTEGER NOT NULL REFERENCES Value(id) ON DELETE CASCADE
)
"#;

/// Holds raw value-kind ids, not row ids
pub const CREATE_FIELD_ALLOWED_TYPES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS Field_allowedTypes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    "index" INTEGER NOT NULL,
    field INTEGER NOT NULL REFERENCES Field(id) ON DELETE CASCADE,
    type INTEGER NOT NULL
)
"#;

pub const CREATE_VALUE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS Value (
    id INTEGER PRIMARY KEY REFERENCES Node(id) ON DELETE CASCADE,
    valueType INTEGER,
    value
)
"#;

pub const CREATE_PROJECT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS Project (
    id INTEGER PRIMARY KEY REFERENCES Element(id) ON DELETE CASCADE
)
"#;

// ========== Schema ==========

pub const CREATE_ELEMENT_TYPE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ElementType (
    id INTEGER PRIMARY KEY REFERENCES Node(id) ON DELETE CASCADE
)
"#;

pub const CREATE_ELEMENT_TYPE_FIELD_TYPES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ElementType_fieldTypes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    "index" INTEGER NOT NULL,
    elementType INTEGER NOT NULL REFERENCES ElementType(id) ON DELETE CASCADE,
    fieldType INTEGER NOT NULL REFERENCES FieldType(id) ON DELETE CASCADE
)
"#;

pub const CREATE_FIELD_TYPE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS FieldType (
    id INTEGER PRIMARY KEY REFERENCES Node(id) ON DELETE CASCADE,
    minOccurs INTEGER NOT NULL DEFAULT 0,
    maxOccurs INTEGER NOT NULL DEFAULT -1
)
"#;

pub const CREATE_FIELD_TYPE_VALUE_TYPES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS FieldType_valueTypes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    "index" INTEGER NOT NULL,
    fieldType INTEGER NOT NULL REFERENCES FieldType(id) ON DELETE CASCADE,
    valueType INTEGER NOT NULL REFERENCES ValueType(id) ON DELETE CASCADE
)
"#;

/// Holds raw value-kind ids, not row ids
pub const CREATE_FIELD_TYPE_ALLOWED_TYPES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS FieldType_allowedTypes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    "index" INTEGER NOT NULL,
    fieldType INTEGER NOT NULL REFERENCES FieldType(id) ON DELETE CASCADE,
    type INTEGER NOT NULL
)
"#;

pub const CREATE_VALUE_TYPE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ValueType (
    id INTEGER PRIMARY KEY REFERENCES Node(id) ON DELETE CASCADE
)
"#;

pub const CREATE_PROJECT_TYPE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ProjectType (
    id INTEGER PRIMARY KEY REFERENCES ElementType(id) ON DELETE CASCADE
)
"#;

pub const JOIN_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_Element_fields_element ON Element_fields(element)",
    "CREATE INDEX IF NOT EXISTS idx_Field_values_field ON Field_values(field)",
    "CREATE INDEX IF NOT EXISTS idx_Field_allowedTypes_field ON Field_allowedTypes(field)",
    "CREATE INDEX IF NOT EXISTS idx_ElementType_fieldTypes_elementType ON ElementType_fieldTypes(elementType)",
    "CREATE INDEX IF NOT EXISTS idx_FieldType_valueTypes_fieldType ON FieldType_valueTypes(fieldType)",
    "CREATE INDEX IF NOT EXISTS idx_FieldType_allowedTypes_fieldType ON FieldType_allowedTypes(fieldType)",
];

