//! Output medium adapter - an in-memory browser-style DOM.
//!
//! The view layer depends only on this module's narrow capability set:
//! node creation, property/attribute assignment, and ordered child
//! splicing. Swapping the medium means swapping the intrinsic drivers
//! that call into it; the reconciliation core never touches nodes
//! directly.
//!
//! - [`node`] - node handles, connectedness, the mutation log
//! - [`update`] - prop assignment and the child-list merge pass

pub mod node;
pub mod update;

pub use node::{take_mutations, Mutation, NodeRef, WeakNodeRef};
pub use update::{update_children, update_props};

/// A renderable leaf as seen by parent views: either loose text that
/// has not (yet) been materialized into the medium, or a handle to a
/// node an intrinsic view owns.
#[derive(Clone, Debug)]
pub enum OutputNode {
    Text(String),
    Node(NodeRef),
}

impl PartialEq for OutputNode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (OutputNode::Text(a), OutputNode::Text(b)) => a == b,
            (OutputNode::Node(a), OutputNode::Node(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}
