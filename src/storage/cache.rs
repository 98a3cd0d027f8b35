//! Per-kind identity map and recycle pool

use crate::model::{Handle, Node};
use crate::storable::Storable;
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::trace;

/// One live object per row id, plus never-persisted objects and a pool of
/// recycled ones awaiting reuse.
pub struct IdentityCache<T> {
    live: RefCell<HashMap<i64, Handle<T>>>,
    anonymous: RefCell<Vec<Handle<T>>>,
    pool: RefCell<Vec<Handle<T>>>,
}

impl<T: Storable + 'static> IdentityCache<T> {
    pub fn new() -> Self {
        Self {
            live: RefCell::new(HashMap::new()),
            anonymous: RefCell::new(Vec::new()),
            pool: RefCell::new(Vec::new()),
        }
    }

    /// Live object for `id`.
    ///
    /// An entry whose object no longer carries `id` (it was saved as a new
    /// version, or its insert was rolled back) is dropped here.
    pub fn get(&self, id: i64) -> Option<Handle<T>> {
        let mut live = self.live.borrow_mut();
        let handle = live.get(&id)?.clone();
        let current = handle.try_borrow().map(|node| node.id());
        match current {
            Some(current) if current != id => {
                trace!(id, current, "dropping stale cache entry");
                live.remove(&id);
                None
            }
            _ => Some(handle),
        }
    }

    /// Track a never-persisted object
    pub fn track(&self, node: &Handle<T>) {
        let mut anonymous = self.anonymous.borrow_mut();
        if !anonymous.contains(node) {
            anonymous.push(node.clone());
        }
    }

    /// Map the object's current row id to it
    pub fn register(&self, node: &Handle<T>) {
        let id = node.id();
        self.anonymous.borrow_mut().retain(|n| n != node);
        self.live.borrow_mut().insert(id, node.clone());
    }

    /// Pop a recycled object, if any
    pub fn revive(&self) -> Option<Handle<T>> {
        self.pool.borrow_mut().pop()
    }

    /// Detach `node`, reset it and park it in the pool
    pub fn recycle(&self, node: &Handle<T>) {
        self.live.borrow_mut().retain(|_, n| n != node);
        self.anonymous.borrow_mut().retain(|n| n != node);
        node.borrow_mut().reset();

        let mut pool = self.pool.borrow_mut();
        if !pool.contains(node) {
            pool.push(node.clone());
        }
    }

    pub fn contains(&self, node: &Handle<T>) -> bool {
        self.live.borrow().values().any(|n| n == node) || self.anonymous.borrow().contains(node)
    }

    /// Number of objects mapped by row id
    pub fn len(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.borrow().is_empty()
    }

    pub fn pooled(&self) -> usize {
        self.pool.borrow().len()
    }

    pub fn clear(&self) {
        self.live.borrow_mut().clear();
        self.anonymous.borrow_mut().clear();
        self.pool.borrow_mut().clear();
    }
}

impl<T: Storable + 'static> Default for IdentityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Name lookup for schema nodes of one kind
pub struct NameIndex<T> {
    names: RefCell<HashMap<String, Handle<T>>>,
}

impl<T: Node + 'static> NameIndex<T> {
    pub fn new() -> Self {
        Self {
            names: RefCell::new(HashMap::new()),
        }
    }

    /// Entries whose node was renamed since indexing are dropped here
    pub fn get(&self, name: &str) -> Option<Handle<T>> {
        let mut names = self.names.borrow_mut();
        let handle = names.get(name)?.clone();
        let current = handle.try_borrow().map(|node| node.own_name() == name);
        if current == Some(false) {
            names.remove(name);
            return None;
        }
        Some(handle)
    }

    pub fn insert(&self, node: &Handle<T>) {
        let name = node.borrow().own_name().to_string();
        if name.is_empty() {
            return;
        }
        let mut names = self.names.borrow_mut();
        names.retain(|_, n| n != node);
        names.insert(name, node.clone());
    }

    pub fn remove(&self, node: &Handle<T>) {
        self.names.borrow_mut().retain(|_, n| n != node);
    }

    /// Indexed nodes ordered by name
    pub fn all(&self) -> Vec<Handle<T>> {
        let names = self.names.borrow();
        let mut keys: Vec<&String> = names.keys().collect();
        keys.sort();
        keys.into_iter().map(|k| names[k].clone()).collect()
    }

    pub fn clear(&self) {
        self.names.borrow_mut().clear();
    }
}

impl<T: Node + 'static> Default for NameIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Element, ElementType};
    use crate::storable::StorableKind;

    fn element(id: i64) -> Handle<Element> {
        let handle = Handle::new(Element::new(StorableKind::Element));
        handle.borrow_mut().meta.id = id;
        handle
    }

    #[test]
    fn test_register_and_get() {
        let cache = IdentityCache::new();
        let node = element(0);
        cache.track(&node);
        assert!(cache.contains(&node));
        assert!(cache.is_empty());

        node.borrow_mut().meta.id = 7;
        cache.register(&node);
        assert_eq!(cache.get(7), Some(node.clone()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stale_entry_dropped() {
        let cache = IdentityCache::new();
        let node = element(7);
        cache.register(&node);

        node.borrow_mut().meta.id = 8;
        assert!(cache.get(7).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_recycle_and_revive() {
        let cache = IdentityCache::new();
        let node = element(7);
        node.set_name("draft");
        cache.register(&node);

        cache.recycle(&node);
        assert!(cache.get(7).is_none());
        assert_eq!(cache.pooled(), 1);

        let revived = cache.revive().unwrap();
        assert!(revived.ptr_eq(&node));
        assert_eq!(revived.id(), 0);
        assert_eq!(revived.name(), "");
        assert!(cache.revive().is_none());
    }

    #[test]
    fn test_name_index_follows_renames() {
        let index = NameIndex::new();
        let story = Handle::new(ElementType::new(StorableKind::ElementType));
        story.set_name("story");
        index.insert(&story);
        assert_eq!(index.get("story"), Some(story.clone()));

        story.set_name("tale");
        assert!(index.get("story").is_none());
        index.insert(&story);
        assert_eq!(index.all(), vec![story]);
    }
}
