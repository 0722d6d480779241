//! Hidden classes (shapes) stored in an index-addressed arena.
//!
//! A shape describes which properties an object has, with which attributes,
//! and at which slot their values live. Shapes form a transition tree: adding
//! a property to an object moves it from its current shape to a child shape.
//! Transitions are hash-consed on `(base, key, attributes)`, so objects that
//! gain the same properties in the same order share a shape.
//!
//! Nodes never hold references to each other, only `ShapeId`s, which keeps
//! the graph trivially shareable between realms of one engine.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::{Arc, OnceLock};

use crate::object::{ObjectObserver, PropertyAttributes, PropertyKey};

/// Index of a shape in its arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(u32);

impl ShapeId {
    /// Raw arena index
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Where a property lives in a shaped object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotInfo {
    /// Slot index in the object's value vector
    pub slot: u32,
    /// Property attributes
    pub attributes: PropertyAttributes,
}

/// A node of the transition tree
#[derive(Debug)]
pub struct ShapeNode {
    /// Shape this one transitioned from. `None` for roots.
    pub parent: Option<ShapeId>,
    /// Property added by the transition into this shape
    pub key: Option<PropertyKey>,
    /// Attributes of the added property
    pub attributes: PropertyAttributes,
    /// Root tag this shape descends from
    pub root: &'static str,
    /// Lookup table for every property of the shape (inherited + own)
    property_map: FxHashMap<PropertyKey, SlotInfo>,
    /// Keys in insertion order
    keys_ordered: Vec<PropertyKey>,
}

impl ShapeNode {
    /// Number of properties described by this shape
    pub fn property_count(&self) -> usize {
        self.keys_ordered.len()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> &[PropertyKey] {
        &self.keys_ordered
    }

    /// Slot and attributes of `key`
    pub fn lookup(&self, key: &PropertyKey) -> Option<SlotInfo> {
        self.property_map.get(key).copied()
    }
}

type TransitionKey = (ShapeId, PropertyKey, PropertyAttributes);

/// Arena of shape nodes with a hash-consed transition table.
///
/// Every object allocated against an arena reports structural changes to
/// the arena's observer, if one is installed.
pub struct ShapeArena {
    nodes: RwLock<Vec<Arc<ShapeNode>>>,
    transitions: RwLock<FxHashMap<TransitionKey, ShapeId>>,
    roots: RwLock<FxHashMap<&'static str, ShapeId>>,
    observer: OnceLock<Arc<dyn ObjectObserver>>,
}

/// Root tag for ordinary objects
pub const ORDINARY_ROOT: &str = "Object";

impl ShapeArena {
    /// Create an arena holding the ordinary root shape
    pub fn new() -> Arc<Self> {
        let arena = Self {
            nodes: RwLock::new(Vec::new()),
            transitions: RwLock::new(FxHashMap::default()),
            roots: RwLock::new(FxHashMap::default()),
            observer: OnceLock::new(),
        };
        arena.allocate_empty_shape(ORDINARY_ROOT);
        Arc::new(arena)
    }

    /// Install the observer. Returns `false` if one was already set.
    pub fn set_observer(&self, observer: Arc<dyn ObjectObserver>) -> bool {
        self.observer.set(observer).is_ok()
    }

    /// The installed observer
    #[inline]
    pub fn observer(&self) -> Option<&Arc<dyn ObjectObserver>> {
        self.observer.get()
    }

    /// The root shape for ordinary objects
    pub fn ordinary_root(&self) -> ShapeId {
        self.allocate_empty_shape(ORDINARY_ROOT)
    }

    /// Empty root shape for objects of the given kind.
    ///
    /// Roots are cached per tag, so repeated calls return the same id.
    pub fn allocate_empty_shape(&self, tag: &'static str) -> ShapeId {
        if let Some(id) = self.roots.read().get(tag) {
            return *id;
        }
        let mut roots = self.roots.write();
        if let Some(id) = roots.get(tag) {
            return *id;
        }
        let id = self.push(ShapeNode {
            parent: None,
            key: None,
            attributes: PropertyAttributes::default(),
            root: tag,
            property_map: FxHashMap::default(),
            keys_ordered: Vec::new(),
        });
        roots.insert(tag, id);
        id
    }

    /// Shape reached from `base` by adding `key` with `attributes`.
    ///
    /// Panics if `key` is already part of `base`; callers update existing
    /// properties in place or go through dictionary mode.
    pub fn transition(
        &self,
        base: ShapeId,
        key: PropertyKey,
        attributes: PropertyAttributes,
    ) -> ShapeId {
        let lookup = (base, key, attributes);
        if let Some(id) = self.transitions.read().get(&lookup) {
            return *id;
        }

        let mut transitions = self.transitions.write();
        if let Some(id) = transitions.get(&lookup) {
            return *id;
        }

        let (base, key, attributes) = lookup;
        let parent = self.node(base);
        if parent.property_map.contains_key(&key) {
            crate::invariant_violation!("shape transition re-adds existing key {key:?}");
        }

        let mut property_map = parent.property_map.clone();
        property_map.insert(
            key.clone(),
            SlotInfo {
                slot: parent.keys_ordered.len() as u32,
                attributes,
            },
        );
        let mut keys_ordered = parent.keys_ordered.clone();
        keys_ordered.push(key.clone());

        let id = self.push(ShapeNode {
            parent: Some(base),
            key: Some(key.clone()),
            attributes,
            root: parent.root,
            property_map,
            keys_ordered,
        });
        transitions.insert((base, key, attributes), id);
        id
    }

    /// Node for a shape id
    pub fn node(&self, id: ShapeId) -> Arc<ShapeNode> {
        match self.nodes.read().get(id.0 as usize) {
            Some(node) => node.clone(),
            None => crate::invariant_violation!("shape id {} out of range", id.0),
        }
    }

    /// Slot and attributes of `key` in shape `id`
    pub fn lookup(&self, id: ShapeId, key: &PropertyKey) -> Option<SlotInfo> {
        self.node(id).lookup(key)
    }

    /// Keys of shape `id` in insertion order
    pub fn own_keys(&self, id: ShapeId) -> Vec<PropertyKey> {
        self.node(id).keys_ordered.clone()
    }

    /// Total number of shapes in the arena
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether the arena has no shapes (never true after `new`)
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Number of distinct transitions recorded
    pub fn transition_count(&self) -> usize {
        self.transitions.read().len()
    }

    fn push(&self, node: ShapeNode) -> ShapeId {
        let mut nodes = self.nodes.write();
        let id = ShapeId(nodes.len() as u32);
        nodes.push(Arc::new(node));
        id
    }
}

impl std::fmt::Debug for ShapeArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeArena")
            .field("shapes", &self.len())
            .field("transitions", &self.transition_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_hash_consed() {
        let arena = ShapeArena::new();
        let root = arena.ordinary_root();
        let a1 = arena.transition(root, PropertyKey::from("x"), PropertyAttributes::data());
        let a2 = arena.transition(root, PropertyKey::from("x"), PropertyAttributes::data());
        assert_eq!(a1, a2);
        assert_eq!(arena.transition_count(), 1);
    }

    #[test]
    fn test_attributes_distinguish_transitions() {
        let arena = ShapeArena::new();
        let root = arena.ordinary_root();
        let a = arena.transition(root, PropertyKey::from("x"), PropertyAttributes::data());
        let b = arena.transition(root, PropertyKey::from("x"), PropertyAttributes::frozen());
        assert_ne!(a, b);
    }

    #[test]
    fn test_slots_and_key_order() {
        let arena = ShapeArena::new();
        let root = arena.ordinary_root();
        let s1 = arena.transition(root, PropertyKey::from("b"), PropertyAttributes::data());
        let s2 = arena.transition(s1, PropertyKey::from("a"), PropertyAttributes::data());
        assert_eq!(arena.lookup(s2, &PropertyKey::from("b")).unwrap().slot, 0);
        assert_eq!(arena.lookup(s2, &PropertyKey::from("a")).unwrap().slot, 1);
        assert_eq!(
            arena.own_keys(s2),
            vec![PropertyKey::from("b"), PropertyKey::from("a")]
        );
        assert_eq!(arena.node(s2).parent, Some(s1));
    }

    #[test]
    fn test_roots_per_tag() {
        let arena = ShapeArena::new();
        let arr = arena.allocate_empty_shape("Array");
        assert_eq!(arr, arena.allocate_empty_shape("Array"));
        assert_ne!(arr, arena.ordinary_root());
        let child =
            arena.transition(arr, PropertyKey::from("length"), PropertyAttributes::frozen());
        assert_eq!(arena.node(child).root, "Array");
    }

    #[test]
    #[should_panic(expected = "re-adds existing key")]
    fn test_duplicate_key_panics() {
        let arena = ShapeArena::new();
        let root = arena.ordinary_root();
        let s = arena.transition(root, PropertyKey::from("x"), PropertyAttributes::data());
        arena.transition(s, PropertyKey::from("x"), PropertyAttributes::frozen());
    }
}
