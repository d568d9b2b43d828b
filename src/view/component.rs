//! Component views - function-tagged nodes driving user logic.
//!
//! A component view owns one running invocation of its component. The
//! invocation state is a closed machine chosen exactly once, at
//! initialization:
//!
//! ```text
//! Uninitialized ──sync fn / generator──▶ Sync(iterator)
//!              └──async fn / async generator──▶ Async (iterator owned
//!                                               by the spawned pull loop)
//! ```
//!
//! Sync iterators advance inside `update`, with the previously rendered
//! output as resumption value. Async iterators are driven by a pull
//! loop task: await a result, reconcile, commit, feed the flattened
//! output back in, repeat until done. Updates arriving while a step is
//! in flight coalesce - they publish the newest props and share the
//! current step's completion instead of re-entering the iterator.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use futures::channel::oneshot;
use tracing::error;

use super::{
    clear_children, flatten_nodes, reconcile_children, ParentRef, Pending, ViewChild, ViewRef,
};
use crate::component::{
    AsyncFnIter, AsyncRenderIter, Component, ComponentKind, Controller, PropsStream, Publication,
    RenderIter, SyncFnIter,
};
use crate::element::{Child, Element, Props, Tag};
use crate::error::{RenderError, RenderResult};
use crate::schedule;

bitflags! {
    /// Packed component view state.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct ViewFlags: u8 {
        /// Cleared on destroy; gates the synchronous props sequence and
        /// keeps a destroyed view's iterator from ever being resumed.
        const MOUNTED = 1 << 0;
        /// The iterator reported done; the pull loop never restarts.
        const FINISHED = 1 << 1;
    }
}

/// The running invocation. `Sync(None)` is the transient
/// taken-for-advancement state; observing it from a re-entrant update
/// is an [`RenderError::InvalidState`].
enum Invocation {
    Uninitialized,
    Sync(Option<Box<dyn RenderIter>>),
    Async,
}

pub(crate) struct ComponentView {
    component: Component,
    props: Props,
    parent: ParentRef,
    pub(crate) children: Vec<ViewChild>,
    invocation: Invocation,
    flags: ViewFlags,
    /// Live subscriptions, pruned on publish once a subscriber detaches.
    publications: Vec<Weak<RefCell<Publication>>>,
    /// Props published while no subscription was live; the next
    /// subscription is seeded from here.
    undelivered: Option<Props>,
    /// Callers awaiting the in-flight async step.
    step_waiters: Vec<oneshot::Sender<RenderResult<()>>>,
}

impl ComponentView {
    pub(crate) fn new(
        component: Component,
        props: Props,
        parent: ParentRef,
    ) -> Rc<RefCell<ComponentView>> {
        Rc::new(RefCell::new(ComponentView {
            component,
            props,
            parent,
            children: Vec::new(),
            invocation: Invocation::Uninitialized,
            flags: ViewFlags::MOUNTED,
            publications: Vec::new(),
            undelivered: None,
            step_waiters: Vec::new(),
        }))
    }

    pub(crate) fn component(&self) -> &Component {
        &self.component
    }

    pub(crate) fn props(&self) -> &Props {
        &self.props
    }

    pub(crate) fn mounted(&self) -> bool {
        self.flags.contains(ViewFlags::MOUNTED)
    }

    pub(crate) fn children(&self) -> &[ViewChild] {
        &self.children
    }

    // -------------------------------------------------------------------------
    // Reconcile / Update
    // -------------------------------------------------------------------------

    /// Reconcile against a new element. The component identity must
    /// match; props are replaced and the update path runs.
    pub(crate) fn reconcile(
        this: &Rc<RefCell<Self>>,
        elem: &Element,
    ) -> RenderResult<Option<Pending>> {
        {
            let mut view = this.borrow_mut();
            let matches = match elem.tag() {
                Tag::Component(component) => component.ptr_eq(&view.component),
                Tag::Intrinsic(_) => false,
            };
            if !matches {
                return Err(RenderError::TagMismatch {
                    expected: view.component.name().to_string(),
                    found: elem.tag().to_string(),
                });
            }
            view.props = elem.props().clone();
        }
        Self::update(this)
    }

    /// Drive the invocation forward: initialize on first call, publish
    /// to a live async iterator, or advance a sync iterator.
    pub(crate) fn update(this: &Rc<RefCell<Self>>) -> RenderResult<Option<Pending>> {
        enum Advance {
            Initialize,
            Publish,
            Sync(Box<dyn RenderIter>),
            Invalid,
        }

        let advance = {
            let mut view = this.borrow_mut();
            match &mut view.invocation {
                Invocation::Uninitialized => Advance::Initialize,
                Invocation::Async => Advance::Publish,
                Invocation::Sync(iter) => match iter.take() {
                    Some(iter) => Advance::Sync(iter),
                    None => Advance::Invalid,
                },
            }
        };

        match advance {
            Advance::Initialize => Self::initialize(this),
            Advance::Publish => {
                Self::publish(this);
                Ok(Self::step_waiter(this))
            }
            Advance::Sync(iter) => Self::advance_sync(this, iter),
            Advance::Invalid => Err(RenderError::InvalidState),
        }
    }

    /// First update: run the component once and install the invocation
    /// variant its shape declares. The variant never changes afterwards.
    fn initialize(this: &Rc<RefCell<Self>>) -> RenderResult<Option<Pending>> {
        let controller = Controller::new(Rc::downgrade(this));
        let (component, props) = {
            let view = this.borrow();
            (view.component.clone(), view.props.clone())
        };

        match component.kind() {
            ComponentKind::Sync(f) => {
                let el = f(&controller, &props);
                this.borrow_mut().invocation =
                    Invocation::Sync(Some(Box::new(SyncFnIter::new(controller, f.clone()))));
                reconcile_children(&ViewRef::Component(this.clone()), vec![Child::Element(el)])
            }
            ComponentKind::Generator(f) => {
                let mut iter = f(controller, props);
                let first = iter.next(Vec::new());
                this.borrow_mut().invocation = Invocation::Sync(Some(iter));
                let children = match first {
                    Some(el) => vec![Child::Element(el)],
                    None => Vec::new(),
                };
                reconcile_children(&ViewRef::Component(this.clone()), children)
            }
            ComponentKind::Async(f) => {
                let first = f(controller.clone(), props);
                let iter = Box::new(AsyncFnIter::new(controller, f.clone(), first));
                this.borrow_mut().invocation = Invocation::Async;
                Ok(Some(Self::spawn_pull(this, iter)))
            }
            ComponentKind::AsyncGenerator(f) => {
                let iter = f(controller, props);
                this.borrow_mut().invocation = Invocation::Async;
                // The body has not subscribed yet; this parks the
                // current props for the subscription it is about to open.
                Self::publish(this);
                Ok(Some(Self::spawn_pull(this, iter)))
            }
        }
    }

    /// Advance a sync iterator with the previously rendered output.
    fn advance_sync(
        this: &Rc<RefCell<Self>>,
        mut iter: Box<dyn RenderIter>,
    ) -> RenderResult<Option<Pending>> {
        let rendered = flatten_nodes(&this.borrow().children);
        let result = iter.next(rendered);
        this.borrow_mut().invocation = Invocation::Sync(Some(iter));

        let children = match result {
            Some(el) => vec![Child::Element(el)],
            None => Vec::new(),
        };
        let pending = reconcile_children(&ViewRef::Component(this.clone()), children)?;
        if pending.is_some() {
            // Ancestors observe this update through the async child's
            // own commit once it settles.
            return Ok(pending);
        }
        Self::commit(this);
        Ok(None)
    }

    // -------------------------------------------------------------------------
    // Async pull loop
    // -------------------------------------------------------------------------

    /// Spawn the pull loop that owns the async iterator. Returns the
    /// first step's completion.
    fn spawn_pull(this: &Rc<RefCell<Self>>, mut iter: Box<dyn AsyncRenderIter>) -> Pending {
        let first_step = Self::step_waiter(this)
            .unwrap_or_else(|| Box::pin(async { Ok(()) }));
        let weak = Rc::downgrade(this);

        schedule::spawn(async move {
            let mut rendered = Vec::new();
            loop {
                let result = iter.next(rendered).await;
                let Some(view) = weak.upgrade() else { break };
                if !view.borrow().mounted() {
                    break;
                }
                let Some(el) = result else {
                    Self::finish(&view, Ok(()));
                    break;
                };

                let nested = match reconcile_children(
                    &ViewRef::Component(view.clone()),
                    vec![Child::Element(el)],
                ) {
                    Ok(nested) => nested,
                    Err(err) => {
                        Self::finish(&view, Err(err));
                        break;
                    }
                };
                if let Some(nested) = nested {
                    if let Err(err) = nested.await {
                        Self::finish(&view, Err(err));
                        break;
                    }
                    if !view.borrow().mounted() {
                        break;
                    }
                }

                Self::commit(&view);
                rendered = flatten_nodes(&view.borrow().children);
                Self::settle_step(&view, Ok(()));
            }
        });

        first_step
    }

    /// Completion of the current in-flight step. `None` once the
    /// iterator has finished - later updates have nothing to wait for.
    fn step_waiter(this: &Rc<RefCell<Self>>) -> Option<Pending> {
        let mut view = this.borrow_mut();
        if view.flags.contains(ViewFlags::FINISHED) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        view.step_waiters.push(tx);
        Some(Box::pin(async move {
            match rx.await {
                Ok(result) => result,
                // Sender dropped without a result: the view was torn
                // down; the subtree counts as settled.
                Err(_) => Ok(()),
            }
        }))
    }

    fn settle_step(this: &Rc<RefCell<Self>>, result: RenderResult<()>) {
        let waiters = std::mem::take(&mut this.borrow_mut().step_waiters);
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }

    fn finish(this: &Rc<RefCell<Self>>, result: RenderResult<()>) {
        this.borrow_mut().flags.insert(ViewFlags::FINISHED);
        if let Err(err) = &result {
            error!("async component step failed: {err}");
        }
        Self::settle_step(this, result);
    }

    // -------------------------------------------------------------------------
    // Publications
    // -------------------------------------------------------------------------

    /// Push the current props to every live subscription; with no
    /// subscriber, park them for the next one.
    fn publish(this: &Rc<RefCell<Self>>) {
        let mut view = this.borrow_mut();
        let props = view.props.clone();
        view.publications.retain(|p| p.strong_count() > 0);
        if view.publications.is_empty() {
            view.undelivered = Some(props);
            return;
        }
        for publication in &view.publications {
            if let Some(publication) = publication.upgrade() {
                publication.borrow_mut().push(props.clone());
            }
        }
    }

    pub(crate) fn subscribe(this: &Rc<RefCell<Self>>) -> PropsStream {
        let mut view = this.borrow_mut();
        if !view.flags.contains(ViewFlags::MOUNTED) {
            return PropsStream::finished();
        }
        let seed = view.undelivered.take();
        let (stream, weak) = PropsStream::new(seed);
        view.publications.push(weak);
        stream
    }

    // -------------------------------------------------------------------------
    // Commit / Destroy
    // -------------------------------------------------------------------------

    /// Components are transparent in the output medium: committing one
    /// forwards straight to its parent.
    pub(crate) fn commit(this: &Rc<RefCell<Self>>) {
        let parent = this.borrow().parent.clone();
        parent.commit();
    }

    /// Tear down: clear the mounted flag, destroy descendants, stop
    /// every live subscription, release step waiters as settled.
    pub(crate) fn destroy(this: &Rc<RefCell<Self>>) {
        let (publications, waiters) = {
            let mut view = this.borrow_mut();
            if !view.flags.contains(ViewFlags::MOUNTED) {
                return;
            }
            view.flags.remove(ViewFlags::MOUNTED);
            (
                std::mem::take(&mut view.publications),
                std::mem::take(&mut view.step_waiters),
            )
        };
        clear_children(&ViewRef::Component(this.clone()));
        for publication in publications {
            if let Some(publication) = publication.upgrade() {
                publication.borrow_mut().stop();
            }
        }
        drop(waiters);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::h;
    use futures::executor::block_on;
    use futures::StreamExt;

    fn test_view(props: Props) -> Rc<RefCell<ComponentView>> {
        let component = Component::sync_fn("Test", |_ctrl, _props| h("span", Props::new(), ()));
        ComponentView::new(component, props, ParentRef::Root(Weak::new()))
    }

    #[test]
    fn test_publish_without_subscribers_seeds_next_subscription() {
        let view = test_view(Props::new().set("n", "1"));
        ComponentView::publish(&view);

        let mut stream = ComponentView::subscribe(&view);
        let props = block_on(stream.next()).unwrap();
        assert_eq!(props.get("n"), Some(&"1".into()));
    }

    #[test]
    fn test_publish_reaches_live_subscription() {
        let view = test_view(Props::new().set("n", "1"));
        let mut stream = ComponentView::subscribe(&view);

        view.borrow_mut().props = Props::new().set("n", "2");
        ComponentView::publish(&view);
        let props = block_on(stream.next()).unwrap();
        assert_eq!(props.get("n"), Some(&"2".into()));
    }

    #[test]
    fn test_destroy_stops_subscriptions() {
        let view = test_view(Props::new());
        let mut stream = ComponentView::subscribe(&view);
        ComponentView::destroy(&view);
        assert!(block_on(stream.next()).is_none());
        assert!(!view.borrow().mounted());
    }

    #[test]
    fn test_subscribing_after_destroy_yields_finished_stream() {
        let view = test_view(Props::new());
        ComponentView::destroy(&view);
        let mut stream = ComponentView::subscribe(&view);
        assert!(block_on(stream.next()).is_none());
    }
}
