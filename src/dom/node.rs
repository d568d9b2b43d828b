//! In-memory browser-style DOM nodes.
//!
//! The core only needs a narrow mutation capability set from its output
//! medium: create a text leaf, create a tagged container, set a
//! property/attribute, splice ordered children. This module provides an
//! in-memory node tree with exactly that surface, plus the
//! instrumentation the test suite leans on:
//!
//! - **Identity**: a [`NodeRef`] is a cheap handle; two handles are the
//!   same node iff [`NodeRef::ptr_eq`] holds.
//! - **Connectedness**: a node is connected when it sits under a
//!   container created with [`NodeRef::container`]. Only mutations of
//!   connected nodes are recorded, mirroring an observer watching a
//!   live document subtree.
//! - **Mutation log**: a thread-local record of observable mutations,
//!   drained with [`take_mutations`].
//!
//! Redundant writes are suppressed: assigning a property, attribute, or
//! text value equal to the current one touches nothing and records
//! nothing.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::element::PropValue;

// =============================================================================
// Mutation Log
// =============================================================================

/// One observable mutation of a connected node.
#[derive(Clone, Debug)]
pub enum Mutation {
    /// A node was spliced into `parent`'s child list.
    Inserted { parent: NodeRef, node: NodeRef },
    /// A node was removed from `parent`'s child list.
    Removed { parent: NodeRef, node: NodeRef },
    /// A text node's value changed.
    CharacterData {
        node: NodeRef,
        old: String,
        new: String,
    },
    /// A property was assigned a new value.
    Property { node: NodeRef, name: String },
    /// An attribute was assigned a new value.
    Attribute { node: NodeRef, name: String },
}

thread_local! {
    static MUTATIONS: RefCell<Vec<Mutation>> = const { RefCell::new(Vec::new()) };
}

fn record(mutation: Mutation) {
    MUTATIONS.with(|log| log.borrow_mut().push(mutation));
}

/// Drain the mutation log.
pub fn take_mutations() -> Vec<Mutation> {
    MUTATIONS.with(|log| log.borrow_mut().drain(..).collect())
}

// =============================================================================
// Node Data
// =============================================================================

enum NodeData {
    Text(TextData),
    Element(ElementData),
}

struct TextData {
    value: String,
    connected: bool,
    parent: Option<Weak<RefCell<NodeData>>>,
}

struct ElementData {
    tag: String,
    props: IndexMap<String, PropValue>,
    attributes: IndexMap<String, String>,
    children: Vec<NodeRef>,
    connected: bool,
    parent: Option<Weak<RefCell<NodeData>>>,
}

impl NodeData {
    fn connected(&self) -> bool {
        match self {
            NodeData::Text(data) => data.connected,
            NodeData::Element(data) => data.connected,
        }
    }

    fn set_connected(&mut self, connected: bool) {
        match self {
            NodeData::Text(data) => data.connected = connected,
            NodeData::Element(data) => data.connected = connected,
        }
    }

    fn set_parent(&mut self, parent: Option<Weak<RefCell<NodeData>>>) {
        match self {
            NodeData::Text(data) => data.parent = parent,
            NodeData::Element(data) => data.parent = parent,
        }
    }

    fn parent(&self) -> Option<Weak<RefCell<NodeData>>> {
        match self {
            NodeData::Text(data) => data.parent.clone(),
            NodeData::Element(data) => data.parent.clone(),
        }
    }
}

// =============================================================================
// NodeRef
// =============================================================================

/// Handle to one DOM node. Clones share the node.
#[derive(Clone)]
pub struct NodeRef {
    inner: Rc<RefCell<NodeData>>,
}

/// Non-owning node handle, used by the root registry.
#[derive(Clone)]
pub struct WeakNodeRef {
    inner: Weak<RefCell<NodeData>>,
}

impl WeakNodeRef {
    pub fn upgrade(&self) -> Option<NodeRef> {
        self.inner.upgrade().map(|inner| NodeRef { inner })
    }
}

impl NodeRef {
    /// Create a detached element node.
    pub fn element(tag: &str) -> NodeRef {
        NodeRef {
            inner: Rc::new(RefCell::new(NodeData::Element(ElementData {
                tag: tag.to_string(),
                props: IndexMap::new(),
                attributes: IndexMap::new(),
                children: Vec::new(),
                connected: false,
                parent: None,
            }))),
        }
    }

    /// Create a detached text node.
    pub fn text(value: &str) -> NodeRef {
        NodeRef {
            inner: Rc::new(RefCell::new(NodeData::Text(TextData {
                value: value.to_string(),
                connected: false,
                parent: None,
            }))),
        }
    }

    /// Create a connected container element, the render target anchor.
    /// Everything attached under it counts as observable.
    pub fn container(tag: &str) -> NodeRef {
        let node = NodeRef::element(tag);
        node.inner.borrow_mut().set_connected(true);
        node
    }

    pub fn is_text(&self) -> bool {
        matches!(&*self.inner.borrow(), NodeData::Text(_))
    }

    /// Element tag, `None` for text nodes.
    pub fn tag(&self) -> Option<String> {
        match &*self.inner.borrow() {
            NodeData::Element(data) => Some(data.tag.clone()),
            NodeData::Text(_) => None,
        }
    }

    /// Text value, `None` for element nodes.
    pub fn text_value(&self) -> Option<String> {
        match &*self.inner.borrow() {
            NodeData::Text(data) => Some(data.value.clone()),
            NodeData::Element(_) => None,
        }
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stable identity key for registry maps.
    pub(crate) fn key(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn downgrade(&self) -> WeakNodeRef {
        WeakNodeRef {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.borrow().connected()
    }

    pub fn parent(&self) -> Option<NodeRef> {
        let weak = self.inner.borrow().parent()?;
        weak.upgrade().map(|inner| NodeRef { inner })
    }

    // -------------------------------------------------------------------------
    // Text mutation
    // -------------------------------------------------------------------------

    /// Update a text node's value in place. No-op on equal values and
    /// on element nodes.
    pub fn set_text(&self, value: &str) {
        let (old, connected) = {
            let mut data = self.inner.borrow_mut();
            match &mut *data {
                NodeData::Text(text) => {
                    if text.value == value {
                        return;
                    }
                    let old = std::mem::replace(&mut text.value, value.to_string());
                    (old, text.connected)
                }
                NodeData::Element(_) => return,
            }
        };
        if connected {
            record(Mutation::CharacterData {
                node: self.clone(),
                old,
                new: value.to_string(),
            });
        }
    }

    // -------------------------------------------------------------------------
    // Property / attribute mutation
    // -------------------------------------------------------------------------

    /// Assign a property. No-op when the value is unchanged.
    pub fn set_property(&self, name: &str, value: PropValue) {
        let connected = {
            let mut data = self.inner.borrow_mut();
            let NodeData::Element(el) = &mut *data else {
                return;
            };
            if el.props.get(name) == Some(&value) {
                return;
            }
            el.props.insert(name.to_string(), value);
            el.connected
        };
        if connected {
            record(Mutation::Property {
                node: self.clone(),
                name: name.to_string(),
            });
        }
    }

    /// Assign an attribute. No-op when the value is unchanged.
    pub fn set_attribute(&self, name: &str, value: &str) {
        let connected = {
            let mut data = self.inner.borrow_mut();
            let NodeData::Element(el) = &mut *data else {
                return;
            };
            if el.attributes.get(name).map(String::as_str) == Some(value) {
                return;
            }
            el.attributes.insert(name.to_string(), value.to_string());
            el.connected
        };
        if connected {
            record(Mutation::Attribute {
                node: self.clone(),
                name: name.to_string(),
            });
        }
    }

    pub fn property(&self, name: &str) -> Option<PropValue> {
        match &*self.inner.borrow() {
            NodeData::Element(el) => el.props.get(name).cloned(),
            NodeData::Text(_) => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        match &*self.inner.borrow() {
            NodeData::Element(el) => el.attributes.get(name).cloned(),
            NodeData::Text(_) => None,
        }
    }

    /// True when `name` is one of the standard property-like keys that
    /// assign as properties rather than attributes.
    pub fn has_property(&self, name: &str) -> bool {
        const PROPERTIES: &[&str] = &[
            "id", "title", "value", "checked", "disabled", "hidden", "lang", "dir",
        ];
        let has_builtin = PROPERTIES.contains(&name);
        has_builtin
            || match &*self.inner.borrow() {
                NodeData::Element(el) => el.props.contains_key(name),
                NodeData::Text(_) => false,
            }
    }

    // -------------------------------------------------------------------------
    // Child splicing
    // -------------------------------------------------------------------------

    pub fn child_count(&self) -> usize {
        match &*self.inner.borrow() {
            NodeData::Element(el) => el.children.len(),
            NodeData::Text(_) => 0,
        }
    }

    pub fn child_at(&self, index: usize) -> Option<NodeRef> {
        match &*self.inner.borrow() {
            NodeData::Element(el) => el.children.get(index).cloned(),
            NodeData::Text(_) => None,
        }
    }

    pub fn children(&self) -> Vec<NodeRef> {
        match &*self.inner.borrow() {
            NodeData::Element(el) => el.children.clone(),
            NodeData::Text(_) => Vec::new(),
        }
    }

    pub fn index_of(&self, child: &NodeRef) -> Option<usize> {
        match &*self.inner.borrow() {
            NodeData::Element(el) => el.children.iter().position(|c| c.ptr_eq(child)),
            NodeData::Text(_) => None,
        }
    }

    /// Splice `child` in at `index` (clamped to the end), detaching it
    /// from any previous parent first.
    pub fn insert_child(&self, index: usize, child: &NodeRef) {
        child.detach();
        let connected = {
            let mut data = self.inner.borrow_mut();
            let NodeData::Element(el) = &mut *data else {
                return;
            };
            let index = index.min(el.children.len());
            el.children.insert(index, child.clone());
            el.connected
        };
        child
            .inner
            .borrow_mut()
            .set_parent(Some(Rc::downgrade(&self.inner)));
        child.propagate_connected(connected);
        if connected {
            record(Mutation::Inserted {
                parent: self.clone(),
                node: child.clone(),
            });
        }
    }

    /// Append `child` at the end of the child list.
    pub fn append_child(&self, child: &NodeRef) {
        let end = self.child_count();
        self.insert_child(end, child);
    }

    /// Remove `child` from this node's child list.
    pub fn remove_child(&self, child: &NodeRef) {
        let connected = {
            let mut data = self.inner.borrow_mut();
            let NodeData::Element(el) = &mut *data else {
                return;
            };
            let Some(position) = el.children.iter().position(|c| c.ptr_eq(child)) else {
                return;
            };
            el.children.remove(position);
            el.connected
        };
        child.inner.borrow_mut().set_parent(None);
        child.propagate_connected(false);
        if connected {
            record(Mutation::Removed {
                parent: self.clone(),
                node: child.clone(),
            });
        }
    }

    /// Remove every child at `from` and after.
    pub fn truncate_children(&self, from: usize) {
        loop {
            let next = {
                let data = self.inner.borrow();
                let NodeData::Element(el) = &*data else {
                    return;
                };
                el.children.get(from).cloned()
            };
            match next {
                Some(child) => self.remove_child(&child),
                None => break,
            }
        }
    }

    fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    fn propagate_connected(&self, connected: bool) {
        {
            let mut data = self.inner.borrow_mut();
            if data.connected() == connected {
                return;
            }
            data.set_connected(connected);
        }
        for child in self.children() {
            child.propagate_connected(connected);
        }
    }

    // -------------------------------------------------------------------------
    // Serialization (for assertions and debugging)
    // -------------------------------------------------------------------------

    /// Serialize this node, tags and attributes included.
    pub fn to_html(&self) -> String {
        match &*self.inner.borrow() {
            NodeData::Text(text) => escape_text(&text.value),
            NodeData::Element(el) => {
                let mut out = String::new();
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.props {
                    out.push_str(&format!(
                        " {}=\"{}\"",
                        name.to_lowercase(),
                        escape_attr(&value.to_string())
                    ));
                }
                for (name, value) in &el.attributes {
                    if el.props.contains_key(name) {
                        continue;
                    }
                    out.push_str(&format!(" {}=\"{}\"", name, escape_attr(value)));
                }
                out.push('>');
                for child in &el.children {
                    out.push_str(&child.to_html());
                }
                out.push_str(&format!("</{}>", el.tag));
                out
            }
        }
    }

    /// Serialize only this node's children, the shape render tests
    /// assert against.
    pub fn inner_html(&self) -> String {
        self.children()
            .iter()
            .map(NodeRef::to_html)
            .collect::<Vec<_>>()
            .join("")
    }
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.inner.borrow() {
            NodeData::Text(text) => write!(f, "Text({:?})", text.value),
            NodeData::Element(el) => write!(f, "Element(<{}>, {} children)", el.tag, el.children.len()),
        }
    }
}

fn escape_text(value: &str) -> String {
    value.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_mutations_are_not_recorded() {
        let _ = take_mutations();
        let el = NodeRef::element("div");
        let text = NodeRef::text("hi");
        el.append_child(&text);
        el.set_property("id", "x".into());
        text.set_text("bye");
        assert!(take_mutations().is_empty(), "detached subtree is unobserved");
    }

    #[test]
    fn test_attaching_marks_subtree_connected_and_records_one_insert() {
        let _ = take_mutations();
        let body = NodeRef::container("body");
        let div = NodeRef::element("div");
        let text = NodeRef::text("hi");
        div.append_child(&text);

        body.append_child(&div);
        assert!(div.is_connected());
        assert!(text.is_connected());
        let records = take_mutations();
        assert_eq!(records.len(), 1);
        assert!(matches!(&records[0], Mutation::Inserted { node, .. } if node.ptr_eq(&div)));
    }

    #[test]
    fn test_connected_text_update_records_old_value() {
        let _ = take_mutations();
        let body = NodeRef::container("body");
        let text = NodeRef::text("Hello world");
        body.append_child(&text);
        let _ = take_mutations();

        text.set_text("Hi world");
        let records = take_mutations();
        assert_eq!(records.len(), 1);
        match &records[0] {
            Mutation::CharacterData { old, new, .. } => {
                assert_eq!(old, "Hello world");
                assert_eq!(new, "Hi world");
            }
            other => panic!("expected CharacterData, got {other:?}"),
        }
    }

    #[test]
    fn test_redundant_writes_are_suppressed() {
        let _ = take_mutations();
        let body = NodeRef::container("body");
        let div = NodeRef::element("div");
        body.append_child(&div);
        div.set_property("id", "x".into());
        let _ = take_mutations();

        div.set_property("id", "x".into());
        let text = NodeRef::text("t");
        div.append_child(&text);
        let _ = take_mutations();
        text.set_text("t");
        assert!(take_mutations().is_empty());
    }

    #[test]
    fn test_insert_moves_node_between_parents() {
        let a = NodeRef::element("div");
        let b = NodeRef::element("div");
        let child = NodeRef::text("x");
        a.append_child(&child);
        assert_eq!(a.child_count(), 1);

        b.append_child(&child);
        assert_eq!(a.child_count(), 0, "moved out of previous parent");
        assert_eq!(b.child_count(), 1);
        assert!(child.parent().unwrap().ptr_eq(&b));
    }

    #[test]
    fn test_html_serialization() {
        let div = NodeRef::element("div");
        div.set_property("id", "greeting".into());
        let h1 = NodeRef::element("h1");
        h1.append_child(&NodeRef::text("Hello world"));
        div.append_child(&h1);
        assert_eq!(div.to_html(), "<div id=\"greeting\"><h1>Hello world</h1></div>");

        let body = NodeRef::container("body");
        body.append_child(&div);
        assert_eq!(body.inner_html(), "<div id=\"greeting\"><h1>Hello world</h1></div>");
    }
}
