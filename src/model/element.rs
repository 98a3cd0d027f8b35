//! Element - an instance node owning an ordered list of fields
//!
//! Projects are elements tagged `Project`; the storage layer gives them a
//! row in the `Project` table on top of their `Element` row.

use super::{link_back, storable_node, ElementTypeRef, FieldRef, Handle, Node, NodeData};
use crate::storable::{Storable, StorableKind, StorableMeta};
use std::cell::Ref;

#[derive(Debug)]
pub struct Element {
    pub(crate) kind: StorableKind,
    pub(crate) meta: StorableMeta,
    pub(crate) node: NodeData,
    pub(crate) node_type: Option<ElementTypeRef>,
    pub(crate) fields: Vec<FieldRef>,
}

impl Element {
    pub(crate) fn new(kind: StorableKind) -> Self {
        Self {
            kind,
            meta: StorableMeta::default(),
            node: NodeData::default(),
            node_type: None,
            fields: Vec::new(),
        }
    }
}

storable_node!(Element);

impl Node for Element {
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

impl Handle<Element> {
    pub fn is_project(&self) -> bool {
        self.kind() == StorableKind::Project
    }

    pub fn node_type(&self) -> Option<ElementTypeRef> {
        self.borrow().node_type.clone()
    }

    pub fn set_node_type(&self, node_type: Option<ElementTypeRef>) {
        let mut this = self.borrow_mut();
        if this.node_type != node_type {
            this.node_type = node_type;
            this.mark_modified();
        }
    }

    pub fn fields(&self) -> Vec<FieldRef> {
        self.borrow().fields.clone()
    }

    /// First field whose name (or field type name) is `name`
    pub fn field(&self, name: &str) -> Option<FieldRef> {
        self.fields().into_iter().find(|f| f.name() == name)
    }

    pub fn set_fields(&self, fields: Vec<FieldRef>) {
        {
            let mut this = self.borrow_mut();
            if this.fields == fields {
                return;
            }
            this.fields = fields.clone();
            this.mark_modified();
        }
        for field in &fields {
            link_back(&mut field.borrow_mut().elements, self);
        }
    }

    pub fn append_field(&self, field: FieldRef) {
        let mut fields = self.fields();
        fields.push(field);
        self.set_fields(fields);
    }

    /// Insert at `index`, clamped to the end of the list
    pub fn insert_field(&self, index: usize, field: FieldRef) {
        let mut fields = self.fields();
        let index = index.min(fields.len());
        fields.insert(index, field);
        self.set_fields(fields);
    }

    /// Returns whether the field was present
    pub fn remove_field(&self, field: &FieldRef) -> bool {
        let mut fields = self.fields();
        let before = fields.len();
        fields.retain(|f| f != field);
        let removed = fields.len() != before;
        if removed {
            self.set_fields(fields);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElementType, Field, FieldType};

    #[test]
    fn test_label_falls_back_to_type() {
        let story = Handle::new(ElementType::new(StorableKind::ElementType));
        story.set_name("story");
        story.set_label("Story");
        story.set_icon("book");

        let element = Handle::new(Element::new(StorableKind::Element));
        element.set_node_type(Some(story.clone()));
        assert_eq!(element.label(), "Story");
        assert_eq!(element.name(), "story");

        element.set_label("Chapter One");
        assert_eq!(element.label(), "Chapter One");
        assert_eq!(element.icon(), "book");
    }

    #[test]
    fn test_field_order_and_lookup() {
        let element = Handle::new(Element::new(StorableKind::Element));
        let title_type = Handle::new(FieldType::new(StorableKind::FieldType));
        title_type.set_name("title");

        let title = Handle::new(Field::new(StorableKind::Field));
        title.set_node_type(Some(title_type));
        let body = Handle::new(Field::new(StorableKind::Field));
        body.set_name("body");
        let notes = Handle::new(Field::new(StorableKind::Field));
        notes.set_name("notes");

        element.append_field(body.clone());
        element.append_field(notes.clone());
        element.insert_field(0, title.clone());

        assert_eq!(element.fields(), vec![title.clone(), body.clone(), notes.clone()]);
        assert_eq!(element.field("title"), Some(title));
        assert_eq!(notes.elements(), vec![element.clone()]);

        assert!(element.remove_field(&notes));
        assert!(notes.elements().is_empty());
        assert!(!element.remove_field(&notes));
    }

    #[test]
    fn test_setters_ignored_while_loading() {
        let element = Handle::new(Element::new(StorableKind::Element));
        element.borrow_mut().meta.loading = true;
        element.set_name("draft");
        assert!(!element.is_modified());

        element.borrow_mut().meta.loading = false;
        element.set_name("final");
        assert!(element.is_modified());
    }
}
