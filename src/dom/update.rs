//! Output diffing - property assignment and the child merge pass.
//!
//! Both passes mutate as little as possible: property/attribute writes
//! go through the node layer's redundant-write suppression, and the
//! child merge walks old and new lists once, left to right, updating
//! text in place and moving or inserting nodes only where identity
//! actually changed.

use tracing::trace;

use super::node::NodeRef;
use super::OutputNode;
use crate::element::Props;

/// Assign an element's props: property-like keys assign as properties,
/// everything else as lower-cased string attributes.
pub fn update_props(el: &NodeRef, props: &Props) {
    for (key, value) in props.values() {
        if el.has_property(key) {
            el.set_property(key, value.clone());
        } else {
            el.set_attribute(&key.to_lowercase(), &value.to_string());
        }
    }
}

/// Splice `children` into `el`'s child list with a single
/// left-to-right merge pass over the existing children.
///
/// Matching is positional:
/// - text over text updates the value in place,
/// - text over a non-text node inserts a fresh text node before it,
/// - a node with a different identity is inserted (moved, if already
///   attached) before the current old child,
/// - an identical node advances the cursor,
/// - old children past the end of the new list are removed.
///
/// An empty container takes the batched path: all new children are
/// appended in one go.
pub fn update_children(el: &NodeRef, children: &[OutputNode]) {
    if el.child_count() == 0 {
        trace!(count = children.len(), "appending children into empty container");
        for child in children {
            el.append_child(&materialize(child));
        }
        return;
    }

    // Index of the "current old child"; None once the walk has run off
    // the end of the existing list.
    let mut cursor = Some(0);
    for new_child in children {
        let Some(i) = cursor else {
            el.append_child(&materialize(new_child));
            continue;
        };
        let Some(old) = el.child_at(i) else {
            cursor = None;
            el.append_child(&materialize(new_child));
            continue;
        };
        match new_child {
            OutputNode::Text(value) => {
                if old.is_text() {
                    old.set_text(value);
                    cursor = advance(el, i);
                } else {
                    el.insert_child(i, &NodeRef::text(value));
                    // The old child shifted one slot right; keep
                    // pointing at it.
                    cursor = Some(i + 1);
                }
            }
            OutputNode::Node(node) => {
                if old.ptr_eq(node) {
                    cursor = advance(el, i);
                } else {
                    el.insert_child(i, node);
                    cursor = Some(i + 1);
                }
            }
        }
    }

    // Anything the cursor still points at (and after) is stale.
    if let Some(i) = cursor {
        el.truncate_children(i);
    }
}

fn advance(el: &NodeRef, i: usize) -> Option<usize> {
    if i + 1 < el.child_count() { Some(i + 1) } else { None }
}

fn materialize(child: &OutputNode) -> NodeRef {
    match child {
        OutputNode::Text(value) => NodeRef::text(value),
        OutputNode::Node(node) => node.clone(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::node::{take_mutations, Mutation};

    fn text(value: &str) -> OutputNode {
        OutputNode::Text(value.to_string())
    }

    #[test]
    fn test_empty_container_appends_all() {
        let el = NodeRef::element("div");
        let span = NodeRef::element("span");
        update_children(&el, &[text("a"), OutputNode::Node(span.clone())]);
        assert_eq!(el.child_count(), 2);
        assert_eq!(el.child_at(0).unwrap().text_value().unwrap(), "a");
        assert!(el.child_at(1).unwrap().ptr_eq(&span));
    }

    #[test]
    fn test_text_updates_in_place() {
        let _ = take_mutations();
        let el = NodeRef::container("div");
        update_children(&el, &[text("Hello world")]);
        let _ = take_mutations();

        update_children(&el, &[text("Hi world")]);
        assert_eq!(el.inner_html(), "Hi world");
        let records = take_mutations();
        assert_eq!(records.len(), 1, "one text value mutation, no splices");
        assert!(matches!(&records[0], Mutation::CharacterData { old, .. } if old == "Hello world"));
    }

    #[test]
    fn test_identical_children_touch_nothing() {
        let _ = take_mutations();
        let el = NodeRef::container("div");
        let span = NodeRef::element("span");
        update_children(&el, &[text("a"), OutputNode::Node(span.clone())]);
        let _ = take_mutations();

        update_children(&el, &[text("a"), OutputNode::Node(span)]);
        assert!(take_mutations().is_empty());
    }

    #[test]
    fn test_replacing_a_node_inserts_then_removes() {
        let _ = take_mutations();
        let el = NodeRef::container("div");
        let h1 = NodeRef::element("h1");
        update_children(&el, &[OutputNode::Node(h1)]);
        let _ = take_mutations();

        let h2 = NodeRef::element("h2");
        update_children(&el, &[OutputNode::Node(h2.clone())]);
        assert!(el.child_at(0).unwrap().ptr_eq(&h2));
        assert_eq!(el.child_count(), 1);
        let records = take_mutations();
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[0], Mutation::Inserted { .. }));
        assert!(matches!(&records[1], Mutation::Removed { .. }));
    }

    #[test]
    fn test_shrinking_removes_trailing_children() {
        let el = NodeRef::element("div");
        update_children(&el, &[text("a"), text("b"), text("c")]);
        update_children(&el, &[text("a")]);
        assert_eq!(el.child_count(), 1);
        assert_eq!(el.inner_html(), "a");
    }

    #[test]
    fn test_text_inserted_before_non_text_node() {
        let el = NodeRef::element("div");
        let span = NodeRef::element("span");
        update_children(&el, &[OutputNode::Node(span.clone())]);

        update_children(&el, &[text("lead"), OutputNode::Node(span.clone())]);
        assert_eq!(el.child_count(), 2);
        assert_eq!(el.child_at(0).unwrap().text_value().unwrap(), "lead");
        assert!(el.child_at(1).unwrap().ptr_eq(&span));
    }

    #[test]
    fn test_update_props_splits_properties_and_attributes() {
        let el = NodeRef::element("input");
        let props = Props::new().set("id", "name").set("dataRole", "field");
        update_props(&el, &props);
        assert_eq!(el.property("id").unwrap(), "name".into());
        assert_eq!(el.attribute("datarole").unwrap(), "field");
    }
}
