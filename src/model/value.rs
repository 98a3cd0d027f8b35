//! Value - an instance node holding one typed `Variant`

use super::{link_back, storable_node, FieldRef, Handle, Node, NodeData, ValueTypeRef, WeakHandle};
use crate::model::Field;
use crate::storable::{Storable, StorableKind, StorableMeta};
use crate::variant::{ValueKind, Variant};
use crate::{Result, StorageError};
use std::cell::Ref;

#[derive(Debug)]
pub struct Value {
    pub(crate) kind: StorableKind,
    pub(crate) meta: StorableMeta,
    pub(crate) node: NodeData,
    pub(crate) node_type: Option<ValueTypeRef>,
    pub(crate) value: Variant,
    pub(crate) fields: Vec<WeakHandle<Field>>,
}

impl Value {
    pub(crate) fn new(kind: StorableKind) -> Self {
        Self {
            kind,
            meta: StorableMeta::default(),
            node: NodeData::default(),
            node_type: None,
            value: Variant::Null,
            fields: Vec::new(),
        }
    }
}

storable_node!(Value);

impl Node for Value {
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

impl Handle<Value> {
    pub fn node_type(&self) -> Option<ValueTypeRef> {
        self.borrow().node_type.clone()
    }

    pub fn set_node_type(&self, node_type: Option<ValueTypeRef>) {
        let mut this = self.borrow_mut();
        if this.node_type != node_type {
            this.node_type = node_type;
            this.mark_modified();
        }
    }

    pub fn value(&self) -> Variant {
        self.borrow().value.clone()
    }

    /// Fields currently listing this value
    pub fn fields(&self) -> Vec<FieldRef> {
        let parents: Vec<_> = self.borrow().fields.clone();
        parents
            .iter()
            .filter_map(WeakHandle::upgrade)
            .filter(|f| f.borrow().values.contains(self))
            .collect()
    }

    /// Value kinds accepted by the containing fields, in their stored order
    pub fn allowed_types(&self) -> Vec<ValueKind> {
        let mut allowed = Vec::new();
        for field in self.fields() {
            for kind in field.allowed_types() {
                if !allowed.contains(&kind) {
                    allowed.push(kind);
                }
            }
        }
        allowed
    }

    /// Store `value`, coerced to a kind this value may hold.
    ///
    /// The previous value's kind is tried first. Otherwise the allowed kinds
    /// of the containing fields are tried in stored order and the first one
    /// the value converts to wins. A value in no constrained field takes
    /// anything; `Null` always clears. On failure nothing changes.
    pub fn set_value(&self, value: impl Into<Variant>) -> Result<()> {
        let value = value.into();
        let previous = self.borrow().value.kind();

        let accepted = if value.is_null() {
            Some(Variant::Null)
        } else {
            previous.and_then(|kind| value.convert(kind)).or_else(|| {
                let allowed = self.allowed_types();
                if allowed.is_empty() {
                    Some(value.clone())
                } else {
                    allowed.iter().find_map(|kind| value.convert(*kind))
                }
            })
        };

        let Some(accepted) = accepted else {
            let allowed: Vec<&str> = self.allowed_types().iter().map(ValueKind::as_str).collect();
            return Err(StorageError::Conversion {
                value: format!("{:?}", value),
                allowed: allowed.join(", "),
            });
        };

        let mut this = self.borrow_mut();
        if this.value != accepted {
            this.value = accepted;
            this.mark_modified();
        }
        Ok(())
    }

    /// Store without coercion; used when loading rows
    pub(crate) fn set_raw_value(&self, value: Variant) {
        let mut this = self.borrow_mut();
        if this.value != value {
            this.value = value;
            this.mark_modified();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_allowing(kinds: Vec<ValueKind>) -> FieldRef {
        let field = Handle::new(Field::new(StorableKind::Field));
        field.set_allowed_types(kinds);
        field
    }

    fn value_in(field: &FieldRef) -> Handle<Value> {
        let value = Handle::new(Value::new(StorableKind::Value));
        field.append_value(value.clone());
        value
    }

    #[test]
    fn test_first_allowed_kind_wins() {
        let ints_first = field_allowing(vec![ValueKind::Int, ValueKind::String]);
        let value = value_in(&ints_first);
        value.set_value("7").unwrap();
        assert_eq!(value.value(), Variant::Int(7));

        let strings_first = field_allowing(vec![ValueKind::String, ValueKind::Int]);
        let value = value_in(&strings_first);
        value.set_value("7").unwrap();
        assert_eq!(value.value(), Variant::from("7"));
    }

    #[test]
    fn test_previous_kind_is_tried_first() {
        let field = field_allowing(vec![ValueKind::String, ValueKind::Int]);
        let value = value_in(&field);
        value.set_value(3).unwrap();
        assert_eq!(value.value(), Variant::from("3"));

        value.set_value(42).unwrap();
        assert_eq!(value.value(), Variant::from("42"));
    }

    #[test]
    fn test_rejected_value_leaves_state() {
        let field = field_allowing(vec![ValueKind::Int]);
        let value = value_in(&field);
        value.set_value(5).unwrap();
        value.borrow_mut().meta.modified = false;

        let err = value.set_value("five").unwrap_err();
        assert!(matches!(err, StorageError::Conversion { .. }));
        assert_eq!(value.value(), Variant::Int(5));
        assert!(!value.is_modified());
    }

    #[test]
    fn test_unconstrained_value_takes_anything() {
        let value = Handle::new(Value::new(StorableKind::Value));
        value.set_value(2.5).unwrap();
        assert_eq!(value.value(), Variant::Double(2.5));
        value.set_value(Variant::Null).unwrap();
        assert!(value.value().is_null());
    }
}
