//! Components and the invocation protocol.
//!
//! A [`Component`] is user-supplied logic behind a function-valued tag.
//! Four shapes exist, declared by the constructor used to build the
//! component - the shape is classified exactly once, when the owning
//! view initializes, and never changes afterwards:
//!
//! - [`Component::sync_fn`] - plain function, re-invoked with the
//!   newest props on every update.
//! - [`Component::async_fn`] - function returning a future of an
//!   element; later updates re-invoke through the props subscription.
//! - [`Component::generator`] - factory returning a stateful
//!   [`RenderIter`], advanced once per update with the previously
//!   rendered output as resumption value.
//! - [`Component::async_generator`] - factory returning an
//!   [`AsyncRenderIter`], driven by a pull loop that overlaps safely
//!   with further updates.
//!
//! The [`Controller`] is the handle component logic receives: the
//! current props as a restartable synchronous sequence
//! ([`Controller::props_iter`]), a push-based asynchronous sequence
//! ([`Controller::subscribe`]), and an explicit
//! [`Controller::update`] to request re-invocation.

use std::cell::RefCell;
use std::fmt;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use futures::future::LocalBoxFuture;
use futures::Stream;
use futures::StreamExt;

use crate::dom::OutputNode;
use crate::element::{Element, Props};
use crate::error::RenderResult;
use crate::view::component::ComponentView;
use crate::view::Pending;

/// The flattened output a component's subtree produced on its previous
/// advance, fed back as the iterator resumption value.
pub type Rendered = Vec<OutputNode>;

// =============================================================================
// Iterator Protocol
// =============================================================================

/// A stateful synchronous component body.
///
/// `next` receives the output rendered by the previous advance and
/// yields the next element, or `None` once the body is done. A done
/// iterator stays done; its view renders empty from then on.
pub trait RenderIter {
    fn next(&mut self, rendered: Rendered) -> Option<Element>;
}

/// A stateful asynchronous component body.
///
/// Driven by the owning view's pull loop. Implementations typically
/// hold a [`PropsStream`] subscription and await the newest props
/// between yields.
pub trait AsyncRenderIter {
    fn next(&mut self, rendered: Rendered) -> LocalBoxFuture<'_, Option<Element>>;
}

// =============================================================================
// Component
// =============================================================================

type SyncFn = dyn Fn(&Controller, &Props) -> Element;
type AsyncFn = dyn Fn(Controller, Props) -> LocalBoxFuture<'static, Element>;
type GeneratorFn = dyn Fn(Controller, Props) -> Box<dyn RenderIter>;
type AsyncGeneratorFn = dyn Fn(Controller, Props) -> Box<dyn AsyncRenderIter>;

pub(crate) enum ComponentKind {
    Sync(Rc<SyncFn>),
    Async(Rc<AsyncFn>),
    Generator(Rc<GeneratorFn>),
    AsyncGenerator(Rc<AsyncGeneratorFn>),
}

/// User-supplied component logic with identity.
///
/// Cloning shares identity: two elements tagged with clones of the same
/// `Component` occupy the same node identity during reconciliation,
/// while two separately constructed components never do, even with
/// identical names and bodies.
#[derive(Clone)]
pub struct Component {
    name: Rc<str>,
    kind: Rc<ComponentKind>,
}

impl Component {
    /// Plain function component: `(controller, props) -> element`.
    pub fn sync_fn(
        name: impl Into<String>,
        f: impl Fn(&Controller, &Props) -> Element + 'static,
    ) -> Self {
        Self::with_kind(name, ComponentKind::Sync(Rc::new(f)))
    }

    /// Async function component: `(controller, props) -> future element`.
    pub fn async_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Controller, Props) -> Fut + 'static,
        Fut: Future<Output = Element> + 'static,
    {
        let f: Rc<AsyncFn> = Rc::new(move |controller, props| Box::pin(f(controller, props)));
        Self::with_kind(name, ComponentKind::Async(f))
    }

    /// Stateful component: the factory runs once per view lifetime and
    /// returns the iterator that is advanced on every update.
    pub fn generator(
        name: impl Into<String>,
        f: impl Fn(Controller, Props) -> Box<dyn RenderIter> + 'static,
    ) -> Self {
        Self::with_kind(name, ComponentKind::Generator(Rc::new(f)))
    }

    /// Stateful asynchronous component: the factory runs once and the
    /// returned iterator is driven by the view's pull loop.
    pub fn async_generator(
        name: impl Into<String>,
        f: impl Fn(Controller, Props) -> Box<dyn AsyncRenderIter> + 'static,
    ) -> Self {
        Self::with_kind(name, ComponentKind::AsyncGenerator(Rc::new(f)))
    }

    fn with_kind(name: impl Into<String>, kind: ComponentKind) -> Self {
        Component {
            name: Rc::from(name.into()),
            kind: Rc::new(kind),
        }
    }

    /// Display name, used in diagnostics and tag-mismatch errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity comparison; this is what tag equality means for
    /// component-tagged elements.
    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.kind, &other.kind)
    }

    pub(crate) fn kind(&self) -> &ComponentKind {
        &self.kind
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name)
    }
}

// =============================================================================
// Function Adapters
// =============================================================================

/// Single-step iterator over a plain function component: each advance
/// re-invokes the function with the newest props, while mounted.
pub(crate) struct SyncFnIter {
    controller: Controller,
    f: Rc<SyncFn>,
}

impl SyncFnIter {
    pub(crate) fn new(controller: Controller, f: Rc<SyncFn>) -> Self {
        SyncFnIter { controller, f }
    }
}

impl RenderIter for SyncFnIter {
    fn next(&mut self, _rendered: Rendered) -> Option<Element> {
        if !self.controller.mounted() {
            return None;
        }
        let props = self.controller.props()?;
        Some((self.f)(&self.controller, &props))
    }
}

/// Async iterator over an async function component. The first advance
/// awaits the future produced at initialization; every later advance
/// awaits the props subscription (opened lazily, after the first step
/// settles) and re-invokes the function.
pub(crate) struct AsyncFnIter {
    controller: Controller,
    f: Rc<AsyncFn>,
    first: Option<LocalBoxFuture<'static, Element>>,
    subscription: Option<PropsStream>,
}

impl AsyncFnIter {
    pub(crate) fn new(
        controller: Controller,
        f: Rc<AsyncFn>,
        first: LocalBoxFuture<'static, Element>,
    ) -> Self {
        AsyncFnIter {
            controller,
            f,
            first: Some(first),
            subscription: None,
        }
    }
}

impl AsyncRenderIter for AsyncFnIter {
    fn next(&mut self, _rendered: Rendered) -> LocalBoxFuture<'_, Option<Element>> {
        Box::pin(async move {
            if let Some(first) = self.first.take() {
                return Some(first.await);
            }
            if self.subscription.is_none() {
                self.subscription = Some(self.controller.subscribe());
            }
            let props = self.subscription.as_mut()?.next().await?;
            let f = self.f.clone();
            let controller = self.controller.clone();
            Some(f(controller, props).await)
        })
    }
}

// =============================================================================
// Props Stream (Publication)
// =============================================================================

/// Shared state of one live subscription: a depth-1 last-value-wins
/// buffer plus the stop signal.
pub(crate) struct Publication {
    slot: Option<Props>,
    closed: bool,
    waker: Option<Waker>,
}

impl Publication {
    pub(crate) fn push(&mut self, props: Props) {
        self.slot = Some(props);
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }

    pub(crate) fn stop(&mut self) {
        self.closed = true;
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// Push-based asynchronous props sequence.
///
/// Each subscriber sees only the newest props (slow consumers skip
/// intermediate values, never see a backlog) and completes when the
/// component is destroyed; a value buffered at stop time drains first.
pub struct PropsStream {
    state: Rc<RefCell<Publication>>,
}

impl PropsStream {
    pub(crate) fn new(seed: Option<Props>) -> (PropsStream, Weak<RefCell<Publication>>) {
        let state = Rc::new(RefCell::new(Publication {
            slot: seed,
            closed: false,
            waker: None,
        }));
        let weak = Rc::downgrade(&state);
        (PropsStream { state }, weak)
    }

    /// An already-finished sequence, handed out when the component is
    /// gone before the subscription opens.
    pub(crate) fn finished() -> PropsStream {
        let (stream, _) = PropsStream::new(None);
        stream.state.borrow_mut().closed = true;
        stream
    }
}

impl Stream for PropsStream {
    type Item = Props;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Props>> {
        let mut state = self.state.borrow_mut();
        if let Some(props) = state.slot.take() {
            return Poll::Ready(Some(props));
        }
        if state.closed {
            return Poll::Ready(None);
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Handle passed to component logic.
///
/// Holds its view weakly; once the view is destroyed (or dropped) every
/// sequence ends and [`update`](Controller::update) becomes a no-op.
#[derive(Clone)]
pub struct Controller {
    view: Weak<RefCell<ComponentView>>,
}

impl Controller {
    pub(crate) fn new(view: Weak<RefCell<ComponentView>>) -> Self {
        Controller { view }
    }

    /// Current props, `None` once the view is gone.
    pub fn props(&self) -> Option<Props> {
        let view = self.view.upgrade()?;
        let props = view.borrow().props().clone();
        Some(props)
    }

    /// Liveness flag, cleared when the view is destroyed.
    pub fn mounted(&self) -> bool {
        match self.view.upgrade() {
            Some(view) => view.borrow().mounted(),
            None => false,
        }
    }

    /// Restartable synchronous props sequence: yields the current props
    /// on every advance while mounted, then ends. Stateful generator
    /// bodies loop over this to observe successive updates.
    pub fn props_iter(&self) -> PropsIter {
        PropsIter {
            controller: self.clone(),
        }
    }

    /// Open a push-based subscription to prop updates. Buffered to the
    /// most recent value; completes on destroy.
    pub fn subscribe(&self) -> PropsStream {
        match self.view.upgrade() {
            Some(view) => ComponentView::subscribe(&view),
            None => PropsStream::finished(),
        }
    }

    /// Request a re-invocation of the component without new props (for
    /// example after local state changed). Returns the pending
    /// completion if the update path is asynchronous.
    pub fn update(&self) -> RenderResult<Option<Pending>> {
        match self.view.upgrade() {
            Some(view) => ComponentView::update(&view),
            None => Ok(None),
        }
    }
}

/// See [`Controller::props_iter`].
pub struct PropsIter {
    controller: Controller,
}

impl Iterator for PropsIter {
    type Item = Props;

    fn next(&mut self) -> Option<Props> {
        if !self.controller.mounted() {
            return None;
        }
        self.controller.props()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn props_with(key: &str, value: &str) -> Props {
        Props::new().set(key, value)
    }

    #[test]
    fn test_props_stream_keeps_only_newest_value() {
        let (mut stream, state) = PropsStream::new(None);
        let state = state.upgrade().unwrap();
        state.borrow_mut().push(props_with("n", "1"));
        state.borrow_mut().push(props_with("n", "2"));

        let received = block_on(stream.next()).unwrap();
        assert_eq!(received.get("n"), Some(&"2".into()));
    }

    #[test]
    fn test_props_stream_drains_buffer_before_ending() {
        let (mut stream, state) = PropsStream::new(None);
        let state = state.upgrade().unwrap();
        state.borrow_mut().push(props_with("n", "1"));
        state.borrow_mut().stop();

        assert!(block_on(stream.next()).is_some(), "buffered value first");
        assert!(block_on(stream.next()).is_none(), "then the end");
    }

    #[test]
    fn test_props_stream_seed_is_delivered() {
        let (mut stream, _state) = PropsStream::new(Some(props_with("n", "0")));
        let received = block_on(stream.next()).unwrap();
        assert_eq!(received.get("n"), Some(&"0".into()));
    }

    #[test]
    fn test_detached_controller_sequences_end() {
        let controller = Controller::new(Weak::new());
        assert!(!controller.mounted());
        assert!(controller.props().is_none());
        assert_eq!(controller.props_iter().count(), 0);
        let mut stream = controller.subscribe();
        assert!(block_on(stream.next()).is_none());
        assert!(controller.update().unwrap().is_none());
    }
}
