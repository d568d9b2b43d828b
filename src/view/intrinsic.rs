//! Intrinsic views - string-tagged nodes owning one output resource.
//!
//! An intrinsic view owns exactly one node of the output medium,
//! produced and kept up to date by a *driver*. Drivers are injectable
//! per tag through [`register_intrinsic`]; any tag without a custom
//! driver gets the default DOM driver, which lazily creates one element
//! and diffs props and children onto it on every advance.
//!
//! The driver reads its input through an [`IntrinsicController`]: an
//! infinite synchronous sequence of snapshots pairing the view's
//! current props with its flattened child nodes. One advance per
//! commit; the yielded node is what parent views see in their
//! flattened output.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::{
    clear_children, flatten_nodes, reconcile_children, ParentRef, Pending, ViewChild, ViewRef,
};
use crate::dom::{self, NodeRef, OutputNode};
use crate::element::{Element, Props, Tag};
use crate::error::{RenderError, RenderResult};

// =============================================================================
// Driver Protocol
// =============================================================================

/// One snapshot of an intrinsic view's input: current props plus the
/// flattened child nodes.
pub struct IntrinsicProps {
    pub props: Props,
    pub children: Vec<OutputNode>,
}

/// Produces and maintains the single output node of an intrinsic view.
///
/// `advance` runs once per commit and yields the current node (`None`
/// while nothing has been produced). `finish` is the explicit close
/// signal sent on destroy, before the driver is dropped.
pub trait IntrinsicDriver {
    fn advance(&mut self) -> Option<NodeRef>;

    fn finish(&mut self) {}
}

/// Shared driver constructor, keyed by tag in the registry.
pub type IntrinsicFactory = Rc<dyn Fn(IntrinsicController) -> Box<dyn IntrinsicDriver>>;

thread_local! {
    static INTRINSICS: RefCell<HashMap<String, IntrinsicFactory>> =
        RefCell::new(HashMap::new());
}

/// Install a custom driver factory for a tag. Later registrations
/// replace earlier ones; views created afterwards use the new factory.
pub fn register_intrinsic(
    tag: impl Into<String>,
    factory: impl Fn(IntrinsicController) -> Box<dyn IntrinsicDriver> + 'static,
) {
    let tag = tag.into();
    debug!(tag = %tag, "registering intrinsic driver");
    INTRINSICS.with(|registry| {
        registry.borrow_mut().insert(tag, Rc::new(factory));
    });
}

fn factory_for(tag: &str) -> IntrinsicFactory {
    INTRINSICS
        .with(|registry| registry.borrow().get(tag).cloned())
        .unwrap_or_else(|| Rc::new(|controller| Box::new(DomDriver::new(controller))))
}

// =============================================================================
// Intrinsic Controller
// =============================================================================

/// The driver's window into its view: tag plus the restartable
/// snapshot sequence. Holds the view weakly; once the view is gone the
/// sequence ends.
#[derive(Clone)]
pub struct IntrinsicController {
    view: Weak<RefCell<IntrinsicView>>,
}

impl IntrinsicController {
    pub fn tag(&self) -> Option<String> {
        let view = self.view.upgrade()?;
        let tag = view.borrow().tag.clone();
        Some(tag)
    }

    /// The current (props, flattened children) pair.
    pub fn snapshot(&self) -> Option<IntrinsicProps> {
        let view = self.view.upgrade()?;
        let view = view.borrow();
        Some(IntrinsicProps {
            props: view.props.clone(),
            children: flatten_nodes(&view.children),
        })
    }

    /// Infinite synchronous snapshot sequence; ends when the view is
    /// torn down.
    pub fn snapshots(&self) -> Snapshots {
        Snapshots {
            controller: self.clone(),
        }
    }
}

/// See [`IntrinsicController::snapshots`].
pub struct Snapshots {
    controller: IntrinsicController,
}

impl Iterator for Snapshots {
    type Item = IntrinsicProps;

    fn next(&mut self) -> Option<IntrinsicProps> {
        self.controller.snapshot()
    }
}

// =============================================================================
// Intrinsic View
// =============================================================================

pub(crate) struct IntrinsicView {
    tag: String,
    props: Props,
    parent: ParentRef,
    pub(crate) children: Vec<ViewChild>,
    node: Option<NodeRef>,
    driver: Option<Box<dyn IntrinsicDriver>>,
}

impl IntrinsicView {
    pub(crate) fn new(tag: String, parent: ParentRef) -> Rc<RefCell<IntrinsicView>> {
        Rc::new(RefCell::new(IntrinsicView {
            tag,
            props: Props::default(),
            parent,
            children: Vec::new(),
            node: None,
            driver: None,
        }))
    }

    pub(crate) fn tag(&self) -> &str {
        &self.tag
    }

    /// The owned output node, once a commit has produced it.
    pub(crate) fn node_handle(&self) -> Option<NodeRef> {
        self.node.clone()
    }

    /// Reconcile against a new element: tag must match, props are
    /// replaced, the props' children reconcile recursively, and the
    /// node commits - after any async descendant settles.
    pub(crate) fn reconcile(
        this: &Rc<RefCell<Self>>,
        elem: &Element,
    ) -> RenderResult<Option<Pending>> {
        {
            let mut view = this.borrow_mut();
            let matches = matches!(elem.tag(), Tag::Intrinsic(tag) if *tag == view.tag);
            if !matches {
                return Err(RenderError::TagMismatch {
                    expected: view.tag.clone(),
                    found: elem.tag().to_string(),
                });
            }
            view.props = elem.props().clone();
        }

        let children = elem.children().to_vec();
        let pending = reconcile_children(&ViewRef::Intrinsic(this.clone()), children)?;
        match pending {
            Some(pending) => {
                let target = this.clone();
                Ok(Some(Box::pin(async move {
                    pending.await?;
                    IntrinsicView::commit(&target);
                    Ok(())
                })))
            }
            None => {
                Self::commit(this);
                Ok(None)
            }
        }
    }

    /// Advance the driver once, building it on first commit.
    pub(crate) fn commit(this: &Rc<RefCell<Self>>) {
        if this.borrow().driver.is_none() {
            let tag = this.borrow().tag.clone();
            let factory = factory_for(&tag);
            let controller = IntrinsicController {
                view: Rc::downgrade(this),
            };
            let driver = factory(controller);
            this.borrow_mut().driver = Some(driver);
        }

        // Taken out while advancing; a re-entrant commit finds nothing
        // to do and the outer advance covers it.
        let Some(mut driver) = this.borrow_mut().driver.take() else {
            return;
        };
        let node = driver.advance();
        let mut view = this.borrow_mut();
        view.driver = Some(driver);
        view.node = node;
    }

    /// Close the driver, destroy descendants, drop the node.
    pub(crate) fn destroy(this: &Rc<RefCell<Self>>) {
        let driver = this.borrow_mut().driver.take();
        if let Some(mut driver) = driver {
            driver.finish();
        }
        clear_children(&ViewRef::Intrinsic(this.clone()));
        this.borrow_mut().node = None;
    }
}

// =============================================================================
// Default DOM Driver
// =============================================================================

/// Default driver for unregistered tags: one lazily created element,
/// props and children diffed onto it on every advance.
struct DomDriver {
    controller: IntrinsicController,
    el: Option<NodeRef>,
}

impl DomDriver {
    fn new(controller: IntrinsicController) -> Self {
        DomDriver {
            controller,
            el: None,
        }
    }
}

impl IntrinsicDriver for DomDriver {
    fn advance(&mut self) -> Option<NodeRef> {
        let snapshot = self.controller.snapshot()?;
        let tag = self.controller.tag()?;
        let el = self.el.get_or_insert_with(|| NodeRef::element(&tag));
        dom::update_props(el, &snapshot.props);
        dom::update_children(el, &snapshot.children);
        Some(el.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_commit_builds_node_lazily_and_reuses_it() {
        let view = IntrinsicView::new("div".into(), ParentRef::Root(Weak::new()));
        assert!(view.borrow().node_handle().is_none());

        view.borrow_mut().props = Props::new().set("id", "x");
        view.borrow_mut().children = vec![ViewChild::Text("hi".into())];
        IntrinsicView::commit(&view);

        let node = view.borrow().node_handle().unwrap();
        assert_eq!(node.to_html(), "<div id=\"x\">hi</div>");

        IntrinsicView::commit(&view);
        let again = view.borrow().node_handle().unwrap();
        assert!(node.ptr_eq(&again), "commit reuses the owned node");
    }

    #[test]
    fn test_custom_driver_is_used_and_closed() {
        struct CountingDriver {
            node: NodeRef,
            advances: Rc<Cell<u32>>,
            closed: Rc<Cell<bool>>,
        }

        impl IntrinsicDriver for CountingDriver {
            fn advance(&mut self) -> Option<NodeRef> {
                self.advances.set(self.advances.get() + 1);
                Some(self.node.clone())
            }

            fn finish(&mut self) {
                self.closed.set(true);
            }
        }

        let advances = Rc::new(Cell::new(0));
        let closed = Rc::new(Cell::new(false));
        let advances2 = advances.clone();
        let closed2 = closed.clone();
        register_intrinsic("custom-box", move |_controller| {
            Box::new(CountingDriver {
                node: NodeRef::element("custom-box"),
                advances: advances2.clone(),
                closed: closed2.clone(),
            })
        });

        let view = IntrinsicView::new("custom-box".into(), ParentRef::Root(Weak::new()));
        IntrinsicView::commit(&view);
        IntrinsicView::commit(&view);
        assert_eq!(advances.get(), 2, "one advance per commit");

        IntrinsicView::destroy(&view);
        assert!(closed.get(), "destroy sends the close signal");
        assert!(view.borrow().node_handle().is_none());
    }

    #[test]
    fn test_snapshots_sequence_is_restartable() {
        let view = IntrinsicView::new("div".into(), ParentRef::Root(Weak::new()));
        view.borrow_mut().props = Props::new().set("id", "a");
        let controller = IntrinsicController {
            view: Rc::downgrade(&view),
        };

        let first: Vec<IntrinsicProps> = controller.snapshots().take(2).collect();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].props.get("id"), Some(&"a".into()));

        view.borrow_mut().props = Props::new().set("id", "b");
        let next = controller.snapshots().next().unwrap();
        assert_eq!(next.props.get("id"), Some(&"b".into()));
    }

    #[test]
    fn test_snapshots_end_when_view_is_gone() {
        let view = IntrinsicView::new("div".into(), ParentRef::Root(Weak::new()));
        let controller = IntrinsicController {
            view: Rc::downgrade(&view),
        };
        drop(view);
        assert!(controller.snapshot().is_none());
        assert_eq!(controller.snapshots().count(), 0);
    }
}
