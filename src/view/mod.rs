//! The view tree - persistent shadow nodes and their shared machinery.
//!
//! Views track one element's rendered identity across renders. Three
//! concrete kinds exist, one per module:
//!
//! - [`component`] - function-tagged views driving user logic
//! - [`intrinsic`] - string-tagged views owning one output node
//! - [`root`] - the per-container anchor, entry point of [`render`](crate::render)
//!
//! This module holds what they share: the child slot union
//! ([`ViewChild`]), the strong/weak handle enums used for dispatch and
//! commit propagation, the positional child reconciliation algorithm,
//! and node flattening.
//!
//! # Borrow discipline
//!
//! Every view lives in an `Rc<RefCell<_>>`. Commit propagation walks
//! *up* the tree while reconciliation walks *down*, so no borrow may be
//! held across a call that could re-enter another view: user component
//! code, child reconciliation, commit, or an await. Operations take
//! handles (`&Rc<RefCell<_>>`), borrow briefly to read or swap state,
//! and release before recursing. Iterators and drivers are taken out of
//! their cell while advancing and restored afterwards.

pub mod component;
pub mod intrinsic;
pub mod root;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures::future::{try_join_all, LocalBoxFuture};

use crate::dom::OutputNode;
use crate::element::{fmt_number, Child, Tag};
use crate::error::RenderResult;
use self::component::ComponentView;
use self::intrinsic::IntrinsicView;
use self::root::RootView;

/// Completion of an asynchronous subtree update. Resolves once every
/// pending descendant has settled (or the first error propagates).
pub type Pending = LocalBoxFuture<'static, RenderResult<()>>;

// =============================================================================
// Child Slots
// =============================================================================

/// One slot in a view's ordered child list. The index is the identity
/// slot: reconciliation matches old and new children positionally.
#[derive(Clone)]
pub(crate) enum ViewChild {
    /// A child that normalized away (bool, null, absent slot).
    Empty,
    /// A text leaf.
    Text(String),
    /// A live component view.
    Component(Rc<RefCell<ComponentView>>),
    /// A live intrinsic view.
    Intrinsic(Rc<RefCell<IntrinsicView>>),
}

impl ViewChild {
    fn is_view(&self) -> bool {
        matches!(self, ViewChild::Component(_) | ViewChild::Intrinsic(_))
    }
}

// =============================================================================
// View Handles
// =============================================================================

/// Owning handle to a concrete view, the dispatch point for the shared
/// algorithms.
#[derive(Clone)]
pub(crate) enum ViewRef {
    Component(Rc<RefCell<ComponentView>>),
    Intrinsic(Rc<RefCell<IntrinsicView>>),
    Root(Rc<RefCell<RootView>>),
}

impl ViewRef {
    pub(crate) fn downgrade(&self) -> ParentRef {
        match self {
            ViewRef::Component(view) => ParentRef::Component(Rc::downgrade(view)),
            ViewRef::Intrinsic(view) => ParentRef::Intrinsic(Rc::downgrade(view)),
            ViewRef::Root(view) => ParentRef::Root(Rc::downgrade(view)),
        }
    }

    /// Brief access to the view's child list. The borrow ends when the
    /// closure returns; callers must not re-enter views inside it.
    pub(crate) fn with_children<R>(&self, f: impl FnOnce(&mut Vec<ViewChild>) -> R) -> R {
        match self {
            ViewRef::Component(view) => f(&mut view.borrow_mut().children),
            ViewRef::Intrinsic(view) => f(&mut view.borrow_mut().children),
            ViewRef::Root(view) => f(&mut view.borrow_mut().children),
        }
    }
}

/// Non-owning back-reference to a parent view. Used only to propagate
/// commit upward; never for downward traversal, so ownership stays
/// strictly parent-to-child.
#[derive(Clone)]
pub(crate) enum ParentRef {
    Component(Weak<RefCell<ComponentView>>),
    Intrinsic(Weak<RefCell<IntrinsicView>>),
    Root(Weak<RefCell<RootView>>),
}

impl ParentRef {
    pub(crate) fn commit(&self) {
        match self {
            ParentRef::Component(view) => {
                if let Some(view) = view.upgrade() {
                    ComponentView::commit(&view);
                }
            }
            ParentRef::Intrinsic(view) => {
                if let Some(view) = view.upgrade() {
                    IntrinsicView::commit(&view);
                }
            }
            ParentRef::Root(view) => {
                if let Some(view) = view.upgrade() {
                    RootView::commit(&view);
                }
            }
        }
    }
}

// =============================================================================
// Child Reconciliation
// =============================================================================

/// Reconcile a view's child slots against a new child list.
///
/// Walks `0..max(old, new)` positionally. A slot is kept in place iff
/// both sides are views/elements with equal tags; otherwise the old
/// view (if any) is destroyed and the slot is rematerialized. Kept and
/// fresh views are then reconciled against their elements; any pending
/// descendants are joined into a single all-of completion.
pub(crate) fn reconcile_children(
    host: &ViewRef,
    incoming: Vec<Child>,
) -> RenderResult<Option<Pending>> {
    let existing = host.with_children(|children| children.len());
    let max = existing.max(incoming.len());
    let mut pendings: Vec<Pending> = Vec::new();

    for i in 0..max {
        let old = host
            .with_children(|children| children.get(i).cloned())
            .unwrap_or(ViewChild::Empty);
        let elem = incoming.get(i).cloned();

        let slot = if tags_match(&old, elem.as_ref()) {
            old
        } else {
            if old.is_view() {
                destroy_view_child(&old);
            }
            let fresh = materialize_child(elem.clone(), host.downgrade());
            host.with_children(|children| {
                while children.len() <= i {
                    children.push(ViewChild::Empty);
                }
                children[i] = fresh.clone();
            });
            fresh
        };

        if let Some(Child::Element(el)) = elem {
            let pending = match &slot {
                ViewChild::Component(view) => ComponentView::reconcile(view, &el)?,
                ViewChild::Intrinsic(view) => IntrinsicView::reconcile(view, &el)?,
                _ => None,
            };
            if let Some(pending) = pending {
                pendings.push(pending);
            }
        }
    }

    // The slot list tracks the most recent child list exactly.
    host.with_children(|children| children.truncate(incoming.len()));

    if pendings.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Box::pin(async move {
            try_join_all(pendings).await.map(|_| ())
        })))
    }
}

fn tags_match(old: &ViewChild, elem: Option<&Child>) -> bool {
    let Some(Child::Element(el)) = elem else {
        return false;
    };
    match (old, el.tag()) {
        (ViewChild::Component(view), Tag::Component(component)) => {
            view.borrow().component().ptr_eq(component)
        }
        (ViewChild::Intrinsic(view), Tag::Intrinsic(tag)) => view.borrow().tag() == tag,
        _ => false,
    }
}

/// Turn a raw child value into a view slot. Bools and nulls vanish,
/// numbers stringify, strings pass through, elements become views.
fn materialize_child(child: Option<Child>, parent: ParentRef) -> ViewChild {
    match child {
        None | Some(Child::None) | Some(Child::Bool(_)) => ViewChild::Empty,
        Some(Child::Text(text)) => ViewChild::Text(text),
        Some(Child::Number(value)) => ViewChild::Text(fmt_number(value)),
        Some(Child::Element(el)) => match el.tag() {
            Tag::Intrinsic(tag) => ViewChild::Intrinsic(IntrinsicView::new(tag.clone(), parent)),
            Tag::Component(component) => ViewChild::Component(ComponentView::new(
                component.clone(),
                el.props().clone(),
                parent,
            )),
        },
    }
}

pub(crate) fn destroy_view_child(child: &ViewChild) {
    match child {
        ViewChild::Component(view) => ComponentView::destroy(view),
        ViewChild::Intrinsic(view) => IntrinsicView::destroy(view),
        ViewChild::Empty | ViewChild::Text(_) => {}
    }
}

/// Destroy every child and empty the slot list. Used by every view's
/// destroy path; recursive and synchronous.
pub(crate) fn clear_children(host: &ViewRef) {
    let children = host.with_children(std::mem::take);
    for child in &children {
        destroy_view_child(child);
    }
}

// =============================================================================
// Node Flattening
// =============================================================================

/// Collapse child slots into the flat renderable leaf list.
///
/// Adjacent text leaves merge into one string (within a single pass
/// only; leaves produced by separate passes are not re-normalized).
/// Intrinsic children contribute their owned node once produced;
/// component children are transparent and contribute their flattened
/// subtree.
pub(crate) fn flatten_nodes(children: &[ViewChild]) -> Vec<OutputNode> {
    let mut nodes: Vec<OutputNode> = Vec::new();
    let mut buffer: Option<String> = None;

    for child in children {
        match child {
            ViewChild::Empty => {}
            ViewChild::Text(text) => match &mut buffer {
                Some(buf) => buf.push_str(text),
                None => buffer = Some(text.clone()),
            },
            ViewChild::Intrinsic(view) => {
                if let Some(text) = buffer.take() {
                    nodes.push(OutputNode::Text(text));
                }
                if let Some(node) = view.borrow().node_handle() {
                    nodes.push(OutputNode::Node(node));
                }
            }
            ViewChild::Component(view) => {
                if let Some(text) = buffer.take() {
                    nodes.push(OutputNode::Text(text));
                }
                let view = view.borrow();
                nodes.extend(flatten_nodes(view.children()));
            }
        }
    }

    if let Some(text) = buffer.take() {
        nodes.push(OutputNode::Text(text));
    }

    nodes
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn detached_parent() -> ParentRef {
        ParentRef::Root(Weak::new())
    }

    #[test]
    fn test_materialize_normalizes_scalars() {
        assert!(matches!(
            materialize_child(Some(Child::Bool(true)), detached_parent()),
            ViewChild::Empty
        ));
        assert!(matches!(
            materialize_child(Some(Child::None), detached_parent()),
            ViewChild::Empty
        ));
        assert!(matches!(
            materialize_child(None, detached_parent()),
            ViewChild::Empty
        ));
        assert!(matches!(
            materialize_child(Some(Child::Number(3.0)), detached_parent()),
            ViewChild::Text(text) if text == "3"
        ));
        assert!(matches!(
            materialize_child(Some(Child::Text("hi".into())), detached_parent()),
            ViewChild::Text(text) if text == "hi"
        ));
    }

    #[test]
    fn test_flatten_merges_adjacent_text() {
        let children = vec![
            ViewChild::Text("Hello ".into()),
            ViewChild::Empty,
            ViewChild::Text("world".into()),
        ];
        let nodes = flatten_nodes(&children);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0], OutputNode::Text("Hello world".into()));
    }

    #[test]
    fn test_flatten_of_empty_slots_is_empty() {
        let children = vec![ViewChild::Empty, ViewChild::Empty];
        assert!(flatten_nodes(&children).is_empty());
    }
}
