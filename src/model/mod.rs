//! Object model - the in-memory side of the persisted graph
//!
//! Objects are shared through `Handle<T>`, a single-threaded reference
//! compared by identity: the identity caches hand out at most one handle per
//! row, so two handles are equal exactly when they denote the same row.
//!
//! Associations are ordered lists of strong handles from parent to child.
//! Children keep weak back-references to their parents; those are filtered
//! on read so a parent that dropped the child no longer shows up.

pub mod element;
pub mod field;
pub mod schema;
pub mod value;

pub use element::Element;
pub use field::Field;
pub use schema::{ElementType, FieldType, ValueType};
pub use value::Value;

use crate::storable::{Storable, StorableKind, StorableMeta, StorableRef};
use std::cell::{Ref, RefCell, RefMut};
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

pub type ElementRef = Handle<Element>;
pub type FieldRef = Handle<Field>;
pub type ValueRef = Handle<Value>;
pub type ElementTypeRef = Handle<ElementType>;
pub type FieldTypeRef = Handle<FieldType>;
pub type ValueTypeRef = Handle<ValueType>;

/// Shared reference to a live object.
pub struct Handle<T>(Rc<RefCell<T>>);

impl<T> Handle<T> {
    pub(crate) fn new(inner: T) -> Self {
        Self(Rc::new(RefCell::new(inner)))
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    pub(crate) fn try_borrow(&self) -> Option<Ref<'_, T>> {
        self.0.try_borrow().ok()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakHandle<T> {
        WeakHandle(Rc::downgrade(&self.0))
    }
}

impl<T: Storable + 'static> Handle<T> {
    pub fn id(&self) -> i64 {
        self.borrow().id()
    }

    pub fn kind(&self) -> StorableKind {
        self.borrow().kind()
    }

    pub fn version(&self) -> i64 {
        self.borrow().meta().version
    }

    pub fn is_modified(&self) -> bool {
        self.borrow().is_modified()
    }

    /// Copy of the storable columns and flags
    pub fn meta(&self) -> StorableMeta {
        self.borrow().meta().clone()
    }

    pub(crate) fn as_storable(&self) -> StorableRef {
        self.0.clone()
    }
}

impl<T: Node + 'static> Handle<T> {
    pub fn name(&self) -> String {
        self.borrow().name()
    }

    pub fn label(&self) -> String {
        self.borrow().label()
    }

    pub fn info(&self) -> String {
        self.borrow().info()
    }

    pub fn icon(&self) -> String {
        self.borrow().icon()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.borrow_mut().set_name(name.into());
    }

    pub fn set_label(&self, label: impl Into<String>) {
        self.borrow_mut().set_label(label.into());
    }

    pub fn set_info(&self, info: impl Into<String>) {
        self.borrow_mut().set_info(info.into());
    }

    pub fn set_icon(&self, icon: impl Into<String>) {
        self.borrow_mut().set_icon(icon.into());
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl<T: Storable> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.try_borrow() {
            Ok(inner) => write!(f, "{}#{}", inner.kind(), inner.id()),
            Err(_) => write!(f, "Handle(<borrowed>)"),
        }
    }
}

/// Non-owning back-reference.
pub struct WeakHandle<T>(Weak<RefCell<T>>);

impl<T> WeakHandle<T> {
    pub fn upgrade(&self) -> Option<Handle<T>> {
        self.0.upgrade().map(Handle)
    }

    /// Whether this points at the same object as `handle`
    pub fn is(&self, handle: &Handle<T>) -> bool {
        std::ptr::eq(self.0.as_ptr(), Rc::as_ptr(&handle.0))
    }

    pub fn is_dangling(&self) -> bool {
        self.0.strong_count() == 0
    }
}

impl<T> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> std::fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(weak)")
    }
}

/// Add `parent` to a back-reference list unless already present.
pub(crate) fn link_back<T>(parents: &mut Vec<WeakHandle<T>>, parent: &Handle<T>) {
    parents.retain(|p| !p.is_dangling());
    if !parents.iter().any(|p| p.is(parent)) {
        parents.push(parent.downgrade());
    }
}

/// Columns of the `Node` row shared by every node kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeData {
    pub(crate) name: String,
    pub(crate) label: String,
    pub(crate) info: String,
    pub(crate) icon: String,
}

/// A persisted node: schema or instance.
///
/// Instances are typed by a schema node (their prototype). Presentation
/// attributes left empty on the instance fall back to the prototype's.
pub trait Node: Storable {
    fn node(&self) -> &NodeData;

    fn node_mut(&mut self) -> &mut NodeData;

    /// Row id written to `Node.nodeType`
    fn node_type_id(&self) -> Option<i64>;

    /// Presentation attributes of the describing type, if any
    fn prototype(&self) -> Option<Ref<'_, NodeData>>;

    /// Own name, without prototype fallback
    fn own_name(&self) -> &str {
        &self.node().name
    }

    fn name(&self) -> String {
        self.inherited(|n| &n.name)
    }

    fn label(&self) -> String {
        self.inherited(|n| &n.label)
    }

    fn info(&self) -> String {
        self.inherited(|n| &n.info)
    }

    fn icon(&self) -> String {
        self.inherited(|n| &n.icon)
    }

    fn inherited(&self, pick: fn(&NodeData) -> &String) -> String {
        let own = pick(self.node());
        if !own.is_empty() {
            return own.clone();
        }
        self.prototype()
            .map(|proto| pick(&proto).clone())
            .unwrap_or_default()
    }

    fn set_name(&mut self, name: String) {
        if self.node().name != name {
            self.node_mut().name = name;
            self.mark_modified();
        }
    }

    fn set_label(&mut self, label: String) {
        if self.node().label != label {
            self.node_mut().label = label;
            self.mark_modified();
        }
    }

    fn set_info(&mut self, info: String) {
        if self.node().info != info {
            self.node_mut().info = info;
            self.mark_modified();
        }
    }

    fn set_icon(&mut self, icon: String) {
        if self.node().icon != icon {
            self.node_mut().icon = icon;
            self.mark_modified();
        }
    }
}

/// Implements `Storable` for a node struct with `kind` and `meta` fields.
macro_rules! storable_node {
    ($ty:ty) => {
        impl $crate::storable::Storable for $ty {
            fn kind(&self) -> $crate::storable::StorableKind {
                self.kind
            }

            fn meta(&self) -> &$crate::storable::StorableMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::storable::StorableMeta {
                &mut self.meta
            }

            fn reset(&mut self) {
                *self = Self::new(self.kind);
            }
        }
    };
}

pub(crate) use storable_node;

/// Any node handle, for references held in values and polymorphic loads.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum AnyNode {
    /// An element or a project
    Element(ElementRef),
    Field(FieldRef),
    Value(ValueRef),
    /// An element type or a project type
    ElementType(ElementTypeRef),
    FieldType(FieldTypeRef),
    ValueType(ValueTypeRef),
}

impl AnyNode {
    pub fn id(&self) -> i64 {
        match self {
            AnyNode::Element(n) => n.id(),
            AnyNode::Field(n) => n.id(),
            AnyNode::Value(n) => n.id(),
            AnyNode::ElementType(n) => n.id(),
            AnyNode::FieldType(n) => n.id(),
            AnyNode::ValueType(n) => n.id(),
        }
    }

    pub fn kind(&self) -> StorableKind {
        match self {
            AnyNode::Element(n) => n.kind(),
            AnyNode::Field(n) => n.kind(),
            AnyNode::Value(n) => n.kind(),
            AnyNode::ElementType(n) => n.kind(),
            AnyNode::FieldType(n) => n.kind(),
            AnyNode::ValueType(n) => n.kind(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            AnyNode::Element(n) => n.name(),
            AnyNode::Field(n) => n.name(),
            AnyNode::Value(n) => n.name(),
            AnyNode::ElementType(n) => n.name(),
            AnyNode::FieldType(n) => n.name(),
            AnyNode::ValueType(n) => n.name(),
        }
    }

    pub(crate) fn as_storable(&self) -> StorableRef {
        match self {
            AnyNode::Element(n) => n.as_storable(),
            AnyNode::Field(n) => n.as_storable(),
            AnyNode::Value(n) => n.as_storable(),
            AnyNode::ElementType(n) => n.as_storable(),
            AnyNode::FieldType(n) => n.as_storable(),
            AnyNode::ValueType(n) => n.as_storable(),
        }
    }

    pub fn as_element(&self) -> Option<&ElementRef> {
        match self {
            AnyNode::Element(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<&FieldRef> {
        match self {
            AnyNode::Field(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&ValueRef> {
        match self {
            AnyNode::Value(n) => Some(n),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AnyNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnyNode::Element(n) => std::fmt::Debug::fmt(n, f),
            AnyNode::Field(n) => std::fmt::Debug::fmt(n, f),
            AnyNode::Value(n) => std::fmt::Debug::fmt(n, f),
            AnyNode::ElementType(n) => std::fmt::Debug::fmt(n, f),
            AnyNode::FieldType(n) => std::fmt::Debug::fmt(n, f),
            AnyNode::ValueType(n) => std::fmt::Debug::fmt(n, f),
        }
    }
}

impl From<ElementRef> for AnyNode {
    fn from(value: ElementRef) -> Self {
        AnyNode::Element(value)
    }
}

impl From<FieldRef> for AnyNode {
    fn from(value: FieldRef) -> Self {
        AnyNode::Field(value)
    }
}

impl From<ValueRef> for AnyNode {
    fn from(value: ValueRef) -> Self {
        AnyNode::Value(value)
    }
}

impl From<ElementTypeRef> for AnyNode {
    fn from(value: ElementTypeRef) -> Self {
        AnyNode::ElementType(value)
    }
}

impl From<FieldTypeRef> for AnyNode {
    fn from(value: FieldTypeRef) -> Self {
        AnyNode::FieldType(value)
    }
}

impl From<ValueTypeRef> for AnyNode {
    fn from(value: ValueTypeRef) -> Self {
        AnyNode::ValueType(value)
    }
}
