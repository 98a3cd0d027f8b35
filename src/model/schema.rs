//! Schema nodes - types describing the shape of instance nodes
//!
//! - `ElementType` owns an ordered list of field types. Project types are
//!   element types tagged `ProjectType`.
//! - `FieldType` owns an ordered list of value types, the ordered list of
//!   value kinds its values may hold, and a min/max cardinality.
//! - `ValueType` is a leaf shared by any number of field types.
//!
//! A type may itself be described by another type (its meta type), kept as
//! a raw row id.

use super::{
    link_back, storable_node, ElementTypeRef, FieldTypeRef, Handle, Node, NodeData,
    ValueTypeRef, WeakHandle,
};
use crate::storable::{Storable, StorableKind, StorableMeta};
use crate::variant::ValueKind;
use std::cell::Ref;

/// Unbounded `maxOccurs`
pub const UNBOUNDED: i32 = -1;

#[derive(Debug)]
pub struct ElementType {
    pub(crate) kind: StorableKind,
    pub(crate) meta: StorableMeta,
    pub(crate) node: NodeData,
    pub(crate) meta_type: Option<i64>,
    pub(crate) field_types: Vec<FieldTypeRef>,
}

impl ElementType {
    pub(crate) fn new(kind: StorableKind) -> Self {
        Self {
            kind,
            meta: StorableMeta::default(),
            node: NodeData::default(),
            meta_type: None,
            field_types: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct FieldType {
    pub(crate) kind: StorableKind,
    pub(crate) meta: StorableMeta,
    pub(crate) node: NodeData,
    pub(crate) meta_type: Option<i64>,
    pub(crate) min_occurs: i32,
    pub(crate) max_occurs: i32,
    pub(crate) value_types: Vec<ValueTypeRef>,
    pub(crate) allowed_types: Vec<ValueKind>,
    pub(crate) element_types: Vec<WeakHandle<ElementType>>,
}

impl FieldType {
    pub(crate) fn new(kind: StorableKind) -> Self {
        Self {
            kind,
            meta: StorableMeta::default(),
            node: NodeData::default(),
            meta_type: None,
            min_occurs: 0,
            max_occurs: UNBOUNDED,
            value_types: Vec::new(),
            allowed_types: Vec::new(),
            element_types: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct ValueType {
    pub(crate) kind: StorableKind,
    pub(crate) meta: StorableMeta,
    pub(crate) node: NodeData,
    pub(crate) meta_type: Option<i64>,
    pub(crate) field_types: Vec<WeakHandle<FieldType>>,
}

impl ValueType {
    pub(crate) fn new(kind: StorableKind) -> Self {
        Self {
            kind,
            meta: StorableMeta::default(),
            node: NodeData::default(),
            meta_type: None,
            field_types: Vec::new(),
        }
    }
}

storable_node!(ElementType);
storable_node!(FieldType);
storable_node!(ValueType);

macro_rules! schema_node {
    ($ty:ty) => {
        impl Node for $ty {
            fn node(&self) -> &NodeData {
                &self.node
            }

            fn node_mut(&mut self) -> &mut NodeData {
                &mut self.node
            }

            fn node_type_id(&self) -> Option<i64> {
                self.meta_type
            }

            fn prototype(&self) -> Option<Ref<'_, NodeData>> {
                None
            }
        }
    };
}

schema_node!(ElementType);
schema_node!(FieldType);
schema_node!(ValueType);

/// Meta-type access shared by all schema handles
pub trait SchemaNode: Node {
    fn meta_type(&self) -> Option<i64>;

    fn set_meta_type(&mut self, meta_type: Option<i64>);
}

macro_rules! schema_meta {
    ($ty:ty) => {
        impl SchemaNode for $ty {
            fn meta_type(&self) -> Option<i64> {
                self.meta_type
            }

            fn set_meta_type(&mut self, meta_type: Option<i64>) {
                if self.meta_type != meta_type {
                    self.meta_type = meta_type;
                    self.mark_modified();
                }
            }
        }
    };
}

schema_meta!(ElementType);
schema_meta!(FieldType);
schema_meta!(ValueType);

impl Handle<ElementType> {
    pub fn field_types(&self) -> Vec<FieldTypeRef> {
        self.borrow().field_types.clone()
    }

    /// Field type with the given name
    pub fn field_type(&self, name: &str) -> Option<FieldTypeRef> {
        self.field_types().into_iter().find(|ft| ft.name() == name)
    }

    pub fn set_field_types(&self, field_types: Vec<FieldTypeRef>) {
        {
            let mut this = self.borrow_mut();
            if this.field_types == field_types {
                return;
            }
            this.field_types = field_types.clone();
            this.mark_modified();
        }
        for field_type in &field_types {
            link_back(&mut field_type.borrow_mut().element_types, self);
        }
    }

    pub fn append_field_type(&self, field_type: FieldTypeRef) {
        let mut field_types = self.field_types();
        field_types.push(field_type);
        self.set_field_types(field_types);
    }

    /// Returns whether the field type was present
    pub fn remove_field_type(&self, field_type: &FieldTypeRef) -> bool {
        let mut field_types = self.field_types();
        let before = field_types.len();
        field_types.retain(|ft| ft != field_type);
        let removed = field_types.len() != before;
        if removed {
            self.set_field_types(field_types);
        }
        removed
    }

    pub fn meta_type(&self) -> Option<i64> {
        self.borrow().meta_type
    }

    pub fn set_meta_type(&self, meta_type: Option<i64>) {
        self.borrow_mut().set_meta_type(meta_type);
    }
}

impl Handle<FieldType> {
    pub fn value_types(&self) -> Vec<ValueTypeRef> {
        self.borrow().value_types.clone()
    }

    pub fn set_value_types(&self, value_types: Vec<ValueTypeRef>) {
        {
            let mut this = self.borrow_mut();
            if this.value_types == value_types {
                return;
            }
            this.value_types = value_types.clone();
            this.mark_modified();
        }
        for value_type in &value_types {
            link_back(&mut value_type.borrow_mut().field_types, self);
        }
    }

    pub fn append_value_type(&self, value_type: ValueTypeRef) {
        let mut value_types = self.value_types();
        value_types.push(value_type);
        self.set_value_types(value_types);
    }

    /// Returns whether the value type was present
    pub fn remove_value_type(&self, value_type: &ValueTypeRef) -> bool {
        let mut value_types = self.value_types();
        let before = value_types.len();
        value_types.retain(|vt| vt != value_type);
        let removed = value_types.len() != before;
        if removed {
            self.set_value_types(value_types);
        }
        removed
    }

    /// Value kinds values of this type may hold, in preference order
    pub fn allowed_types(&self) -> Vec<ValueKind> {
        self.borrow().allowed_types.clone()
    }

    pub fn set_allowed_types(&self, allowed_types: Vec<ValueKind>) {
        let mut this = self.borrow_mut();
        if this.allowed_types != allowed_types {
            this.allowed_types = allowed_types;
            this.mark_modified();
        }
    }

    pub fn min_occurs(&self) -> i32 {
        self.borrow().min_occurs
    }

    pub fn max_occurs(&self) -> i32 {
        self.borrow().max_occurs
    }

    pub fn set_min_occurs(&self, min_occurs: i32) {
        let mut this = self.borrow_mut();
        if this.min_occurs != min_occurs {
            this.min_occurs = min_occurs;
            this.mark_modified();
        }
    }

    /// `UNBOUNDED` lifts the upper limit
    pub fn set_max_occurs(&self, max_occurs: i32) {
        let mut this = self.borrow_mut();
        if this.max_occurs != max_occurs {
            this.max_occurs = max_occurs;
            this.mark_modified();
        }
    }

    /// Element types (and project types) currently listing this field type
    pub fn element_types(&self) -> Vec<ElementTypeRef> {
        let parents: Vec<_> = self.borrow().element_types.clone();
        parents
            .iter()
            .filter_map(WeakHandle::upgrade)
            .filter(|et| et.borrow().field_types.contains(self))
            .collect()
    }

    pub fn meta_type(&self) -> Option<i64> {
        self.borrow().meta_type
    }

    pub fn set_meta_type(&self, meta_type: Option<i64>) {
        self.borrow_mut().set_meta_type(meta_type);
    }
}

impl Handle<ValueType> {
    /// Field types currently listing this value type
    pub fn field_types(&self) -> Vec<FieldTypeRef> {
        let parents: Vec<_> = self.borrow().field_types.clone();
        parents
            .iter()
            .filter_map(WeakHandle::upgrade)
            .filter(|ft| ft.borrow().value_types.contains(self))
            .collect()
    }

    pub fn meta_type(&self) -> Option<i64> {
        self.borrow().meta_type
    }

    pub fn set_meta_type(&self, meta_type: Option<i64>) {
        self.borrow_mut().set_meta_type(meta_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named<T: Node>(inner: T, name: &str) -> Handle<T> {
        let handle = Handle::new(inner);
        handle.borrow_mut().node_mut().name = name.to_string();
        handle
    }

    #[test]
    fn test_field_type_tracks_element_types() {
        let story = named(ElementType::new(StorableKind::ElementType), "story");
        let scene = named(ElementType::new(StorableKind::ElementType), "scene");
        let title = named(FieldType::new(StorableKind::FieldType), "title");

        story.set_field_types(vec![title.clone()]);
        scene.set_field_types(vec![title.clone()]);
        assert_eq!(title.element_types(), vec![story.clone(), scene.clone()]);

        assert!(scene.remove_field_type(&title));
        assert_eq!(title.element_types(), vec![story]);
    }

    #[test]
    fn test_field_type_lookup_by_name() {
        let story = named(ElementType::new(StorableKind::ElementType), "story");
        let title = named(FieldType::new(StorableKind::FieldType), "title");
        let body = named(FieldType::new(StorableKind::FieldType), "body");
        story.set_field_types(vec![title, body.clone()]);

        assert_eq!(story.field_type("body"), Some(body));
        assert!(story.field_type("summary").is_none());
        assert!(story.is_modified());
    }

    #[test]
    fn test_value_type_tracks_field_types() {
        let title = named(FieldType::new(StorableKind::FieldType), "title");
        let text = named(ValueType::new(StorableKind::ValueType), "text");
        title.append_value_type(text.clone());
        assert_eq!(text.field_types(), vec![title]);
    }

    #[test]
    fn test_defaults() {
        let title = Handle::new(FieldType::new(StorableKind::FieldType));
        assert_eq!(title.min_occurs(), 0);
        assert_eq!(title.max_occurs(), UNBOUNDED);
        assert!(title.allowed_types().is_empty());
        assert!(!title.is_modified());
    }
}
