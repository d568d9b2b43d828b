//! Root views - anchoring trees to containers, and the render entry
//! point.
//!
//! One root view exists per container, held in a thread-local registry
//! keyed by node identity so repeated renders against the same
//! container reuse state and reconcile incrementally. The registry
//! holds containers weakly: dropping a container lets its entry be
//! purged on the next render call.
//!
//! [`render`] is the public entry point. A synchronous update path
//! commits before it returns; an asynchronous one hands back a pending
//! completion and the work itself runs on the scheduler, applied by
//! [`flush`](crate::schedule::flush).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::channel::oneshot;
use tracing::{debug, error};

use super::{clear_children, flatten_nodes, reconcile_children, Pending, ViewChild, ViewRef};
use crate::dom::{self, NodeRef, OutputNode, WeakNodeRef};
use crate::element::{Child, Element};
use crate::error::RenderResult;
use crate::schedule;

// =============================================================================
// Root View
// =============================================================================

pub(crate) struct RootView {
    container: WeakNodeRef,
    pub(crate) children: Vec<ViewChild>,
}

impl RootView {
    fn new(container: &NodeRef) -> Rc<RefCell<RootView>> {
        Rc::new(RefCell::new(RootView {
            container: container.downgrade(),
            children: Vec::new(),
        }))
    }

    /// Reconcile the root element as a one-item child list; commit
    /// after any asynchronous descendant settles.
    pub(crate) fn reconcile(
        this: &Rc<RefCell<Self>>,
        elem: Element,
    ) -> RenderResult<Option<Pending>> {
        let pending =
            reconcile_children(&ViewRef::Root(this.clone()), vec![Child::Element(elem)])?;
        match pending {
            Some(pending) => {
                let target = this.clone();
                Ok(Some(Box::pin(async move {
                    pending.await?;
                    RootView::commit(&target);
                    Ok(())
                })))
            }
            None => {
                Self::commit(this);
                Ok(None)
            }
        }
    }

    /// Splice the flattened tree into the container.
    pub(crate) fn commit(this: &Rc<RefCell<Self>>) {
        let (container, nodes) = {
            let view = this.borrow();
            (view.container.upgrade(), flatten_nodes(&view.children))
        };
        if let Some(container) = container {
            dom::update_children(&container, &nodes);
        }
    }

    /// Destroy all views. The container's existing children are left
    /// untouched; teardown is a view concern, not an output mutation.
    pub(crate) fn destroy(this: &Rc<RefCell<Self>>) {
        clear_children(&ViewRef::Root(this.clone()));
    }
}

// =============================================================================
// Registry
// =============================================================================

struct RootEntry {
    container: WeakNodeRef,
    view: Rc<RefCell<RootView>>,
}

thread_local! {
    static ROOTS: RefCell<HashMap<usize, RootEntry>> = RefCell::new(HashMap::new());
}

fn prune_roots() {
    ROOTS.with(|roots| {
        roots
            .borrow_mut()
            .retain(|_, entry| entry.container.upgrade().is_some())
    });
}

// =============================================================================
// Render Entry Point
// =============================================================================

/// Handle to a container's root view.
#[derive(Clone)]
pub struct RootHandle {
    view: Rc<RefCell<RootView>>,
}

impl RootHandle {
    /// The current flattened renderable output of the tree.
    pub fn nodes(&self) -> Vec<OutputNode> {
        flatten_nodes(&self.view.borrow().children)
    }
}

/// What a [`render`] call produced: the root handle, plus the pending
/// completion when the update path is asynchronous. The underlying
/// work is spawned on the scheduler - dropping `pending` does not
/// cancel anything, it only discards the notification.
pub struct RenderOutcome {
    pub root: RootHandle,
    pub pending: Option<Pending>,
}

impl RenderOutcome {
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Render an element tree into a container.
///
/// The first render against a container mounts a root view; later
/// renders reuse it and reconcile incrementally. Passing `None`
/// unmounts: the root view and all descendants are destroyed
/// recursively and the registry entry is evicted.
pub fn render(
    element: impl Into<Option<Element>>,
    container: &NodeRef,
) -> RenderResult<RenderOutcome> {
    prune_roots();
    let key = container.key();

    let Some(element) = element.into() else {
        debug!("unmounting container");
        let existing = ROOTS.with(|roots| roots.borrow_mut().remove(&key));
        let view = match existing {
            Some(entry) => {
                RootView::destroy(&entry.view);
                entry.view
            }
            None => RootView::new(container),
        };
        return Ok(RenderOutcome {
            root: RootHandle { view },
            pending: None,
        });
    };

    let existing = ROOTS.with(|roots| roots.borrow().get(&key).map(|entry| entry.view.clone()));
    let view = match existing {
        Some(view) => {
            debug!("updating mounted container");
            view
        }
        None => {
            debug!("mounting container");
            let view = RootView::new(container);
            ROOTS.with(|roots| {
                roots.borrow_mut().insert(
                    key,
                    RootEntry {
                        container: container.downgrade(),
                        view: view.clone(),
                    },
                )
            });
            view
        }
    };

    let pending = RootView::reconcile(&view, element)?.map(|pending| {
        let (tx, rx) = oneshot::channel::<RenderResult<()>>();
        schedule::spawn(async move {
            let result = pending.await;
            if let Err(err) = &result {
                error!("asynchronous render failed: {err}");
            }
            let _ = tx.send(result);
        });
        Box::pin(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Ok(()),
            }
        }) as Pending
    });

    Ok(RenderOutcome {
        root: RootHandle { view },
        pending,
    })
}

// =============================================================================
// Tests
// =============================================================================
