//! Field - an instance node owning an ordered list of values
//!
//! Cardinality and allowed value kinds can be set on the field itself; when
//! left unset they come from the field type.

use super::{
    link_back, storable_node, ElementRef, FieldTypeRef, Handle, Node, NodeData, ValueRef,
    WeakHandle,
};
use crate::model::Element;
use crate::model::schema::UNBOUNDED;
use crate::storable::{Storable, StorableKind, StorableMeta};
use crate::variant::ValueKind;
use std::cell::Ref;

#[derive(Debug)]
pub struct Field {
    pub(crate) kind: StorableKind,
    pub(crate) meta: StorableMeta,
    pub(crate) node: NodeData,
    pub(crate) node_type: Option<FieldTypeRef>,
    pub(crate) min_occurs: Option<i32>,
    pub(crate) max_occurs: Option<i32>,
    pub(crate) allowed_types: Vec<ValueKind>,
    pub(crate) values: Vec<ValueRef>,
    pub(crate) elements: Vec<WeakHandle<Element>>,
}

impl Field {
    pub(crate) fn new(kind: StorableKind) -> Self {
        Self {
            kind,
            meta: StorableMeta::default(),
            node: NodeData::default(),
            node_type: None,
            min_occurs: None,
            max_occurs: None,
            allowed_types: Vec::new(),
            values: Vec::new(),
            elements: Vec::new(),
        }
    }
}

storable_node!(Field);

impl Node for Field {
    fn node(&self) -> &NodeData {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeData {
        &mut self.node
    }

    fn node_type_id(&self) -> Option<i64> {
        self.node_type.as_ref().map(|t| t.id())
    }

    fn prototype(&self) -> Option<Ref<'_, NodeData>> {
        self.node_type
            .as_ref()
            .map(|t| Ref::map(t.borrow(), |t| &t.node))
    }
}

impl Handle<Field> {
    pub fn node_type(&self) -> Option<FieldTypeRef> {
        self.borrow().node_type.clone()
    }

    pub fn set_node_type(&self, node_type: Option<FieldTypeRef>) {
        let mut this = self.borrow_mut();
        if this.node_type != node_type {
            this.node_type = node_type;
            this.mark_modified();
        }
    }

    pub fn values(&self) -> Vec<ValueRef> {
        self.borrow().values.clone()
    }

    pub fn set_values(&self, values: Vec<ValueRef>) {
        {
            let mut this = self.borrow_mut();
            if this.values == values {
                return;
            }
            this.values = values.clone();
            this.mark_modified();
        }
        for value in &values {
            link_back(&mut value.borrow_mut().fields, self);
        }
    }

    pub fn append_value(&self, value: ValueRef) {
        let mut values = self.values();
        values.push(value);
        self.set_values(values);
    }

    /// Returns whether the value was present
    pub fn remove_value(&self, value: &ValueRef) -> bool {
        let mut values = self.values();
        let before = values.len();
        values.retain(|v| v != value);
        let removed = values.len() != before;
        if removed {
            self.set_values(values);
        }
        removed
    }

    /// Elements currently listing this field
    pub fn elements(&self) -> Vec<ElementRef> {
        let parents: Vec<_> = self.borrow().elements.clone();
        parents
            .iter()
            .filter_map(WeakHandle::upgrade)
            .filter(|e| e.borrow().fields.contains(self))
            .collect()
    }

    /// Effective minimum number of values
    pub fn min_occurs(&self) -> i32 {
        let this = self.borrow();
        this.min_occurs
            .or_else(|| this.node_type.as_ref().map(|t| t.min_occurs()))
            .unwrap_or(0)
    }

    /// Effective maximum number of values; `UNBOUNDED` when unlimited
    pub fn max_occurs(&self) -> i32 {
        let this = self.borrow();
        this.max_occurs
            .or_else(|| this.node_type.as_ref().map(|t| t.max_occurs()))
            .unwrap_or(UNBOUNDED)
    }

    pub fn own_min_occurs(&self) -> Option<i32> {
        self.borrow().min_occurs
    }

    pub fn own_max_occurs(&self) -> Option<i32> {
        self.borrow().max_occurs
    }

    /// `None` falls back to the field type
    pub fn set_min_occurs(&self, min_occurs: Option<i32>) {
        let mut this = self.borrow_mut();
        if this.min_occurs != min_occurs {
            this.min_occurs = min_occurs;
            this.mark_modified();
        }
    }

    /// `None` falls back to the field type
    pub fn set_max_occurs(&self, max_occurs: Option<i32>) {
        let mut this = self.borrow_mut();
        if this.max_occurs != max_occurs {
            this.max_occurs = max_occurs;
            this.mark_modified();
        }
    }

    /// Effective allowed value kinds, in preference order
    pub fn allowed_types(&self) -> Vec<ValueKind> {
        let this = self.borrow();
        if !this.allowed_types.is_empty() {
            return this.allowed_types.clone();
        }
        this.node_type
            .as_ref()
            .map(|t| t.allowed_types())
            .unwrap_or_default()
    }

    pub fn own_allowed_types(&self) -> Vec<ValueKind> {
        self.borrow().allowed_types.clone()
    }

    /// An empty list falls back to the field type
    pub fn set_allowed_types(&self, allowed_types: Vec<ValueKind>) {
        let mut this = self.borrow_mut();
        if this.allowed_types != allowed_types {
            this.allowed_types = allowed_types;
            this.mark_modified();
        }
    }

    /// Whether the number of values fits the effective cardinality
    pub fn occurs_satisfied(&self) -> bool {
        let count = self.borrow().values.len() as i64;
        let max = self.max_occurs();
        count >= self.min_occurs() as i64 && (max == UNBOUNDED || count <= max as i64)
    }
}
