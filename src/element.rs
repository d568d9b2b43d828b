//! Elements - immutable tag + props descriptors.
//!
//! An [`Element`] is the lightweight value application code builds trees
//! out of: a tag (either an intrinsic string like `"div"` or a
//! [`Component`]) plus a frozen [`Props`] record. Elements carry no
//! render state; the persistent state lives in the view tree that
//! reconciles against them.
//!
//! Two elements occupy the same node identity across a render iff they
//! sit at the same child index and their tags are equal: string equality
//! for intrinsics, pointer identity for components.
//!
//! Construction goes through [`create_element`] (aliased as [`h`]),
//! which flattens arbitrarily nested child collections into the props
//! record:
//!
//! ```ignore
//! use trellis_ui::{h, Props};
//!
//! let tree = h(
//!     "div",
//!     Props::new().set("id", "greeting"),
//!     (h("h1", Props::new(), "Hello world"), "and more"),
//! );
//! ```

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::component::Component;

// =============================================================================
// Tag
// =============================================================================

/// The identity half of an element: an intrinsic tag name or a component.
#[derive(Clone)]
pub enum Tag {
    /// Directly renderable node, keyed into the intrinsic driver registry.
    Intrinsic(String),
    /// User-supplied component logic.
    Component(Component),
}

impl Tag {
    /// True for string-tagged (directly renderable) elements.
    pub fn is_intrinsic(&self) -> bool {
        matches!(self, Tag::Intrinsic(_))
    }

    /// True for component-tagged elements.
    pub fn is_component(&self) -> bool {
        matches!(self, Tag::Component(_))
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Tag::Intrinsic(a), Tag::Intrinsic(b)) => a == b,
            (Tag::Component(a), Tag::Component(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Intrinsic(name) => write!(f, "{name}"),
            Tag::Component(component) => write!(f, "{}", component.name()),
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Intrinsic(name) => write!(f, "Tag::Intrinsic({name:?})"),
            Tag::Component(component) => write!(f, "Tag::Component({:?})", component.name()),
        }
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Tag::Intrinsic(name.to_string())
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag::Intrinsic(name)
    }
}

impl From<Component> for Tag {
    fn from(component: Component) -> Self {
        Tag::Component(component)
    }
}

impl From<&Component> for Tag {
    fn from(component: &Component) -> Self {
        Tag::Component(component.clone())
    }
}

// =============================================================================
// Prop Values
// =============================================================================

/// Scalar prop value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Bool(value) => write!(f, "{value}"),
            PropValue::Number(value) => write!(f, "{}", fmt_number(*value)),
            PropValue::String(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Number(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Number(value as f64)
    }
}

impl From<u32> for PropValue {
    fn from(value: u32) -> Self {
        PropValue::Number(value as f64)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Number(value as f64)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::String(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::String(value)
    }
}

/// Text form of a numeric child or prop. Whole numbers drop the
/// fractional point (`3.0` renders as `"3"`).
pub(crate) fn fmt_number(value: f64) -> String {
    format!("{value}")
}

// =============================================================================
// Props
// =============================================================================

/// Frozen prop record attached to an element.
///
/// Insertion-ordered so attribute application is deterministic. The
/// normalized children collection lives inside the record, in a
/// dedicated slot. Cloning is cheap (shared allocation); the builder
/// methods copy-on-write before the record is shared.
#[derive(Clone, Default)]
pub struct Props {
    inner: Rc<PropsInner>,
}

#[derive(Clone, Default)]
struct PropsInner {
    values: IndexMap<String, PropValue>,
    children: Vec<Child>,
}

impl Props {
    /// Empty prop record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        Rc::make_mut(&mut self.inner)
            .values
            .insert(key.into(), value.into());
        self
    }

    /// Look up a single prop.
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.inner.values.get(key)
    }

    /// Iterate props in insertion order. Children are not included.
    pub fn values(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.inner.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The normalized children collection.
    pub fn children(&self) -> &[Child] {
        &self.inner.children
    }

    pub(crate) fn with_children(mut self, children: Vec<Child>) -> Self {
        Rc::make_mut(&mut self.inner).children = children;
        self
    }
}

impl PartialEq for Props {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.values == other.inner.values
                && self.inner.children == other.inner.children)
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("values", &self.inner.values)
            .field("children", &self.inner.children)
            .finish()
    }
}

// =============================================================================
// Children
// =============================================================================

/// Raw child value a component may return.
///
/// Normalization to view children happens during reconciliation: `Bool`
/// and `None` vanish, `Number` stringifies, `Text` passes through.
#[derive(Clone, Debug, PartialEq)]
pub enum Child {
    Element(Element),
    Text(String),
    Number(f64),
    Bool(bool),
    None,
}

impl From<Element> for Child {
    fn from(element: Element) -> Self {
        Child::Element(element)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(text.to_string())
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(text)
    }
}

impl From<f64> for Child {
    fn from(value: f64) -> Self {
        Child::Number(value)
    }
}

impl From<i32> for Child {
    fn from(value: i32) -> Self {
        Child::Number(value as f64)
    }
}

impl From<u32> for Child {
    fn from(value: u32) -> Self {
        Child::Number(value as f64)
    }
}

impl From<i64> for Child {
    fn from(value: i64) -> Self {
        Child::Number(value as f64)
    }
}

impl From<bool> for Child {
    fn from(value: bool) -> Self {
        Child::Bool(value)
    }
}

/// Nestable child collection accepted by the element factory.
///
/// Flattens to any depth, so `(a, (b, vec![c, d]))` and `[a, b, c, d]`
/// produce the same normalized list.
#[derive(Clone, Debug)]
pub enum Children {
    /// No children.
    Empty,
    /// A single child value.
    One(Child),
    /// A nested list, flattened recursively.
    Many(Vec<Children>),
}

impl Children {
    /// Flatten into the normalized child list.
    pub fn flatten(self) -> Vec<Child> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(self, out: &mut Vec<Child>) {
        match self {
            Children::Empty => {}
            Children::One(child) => out.push(child),
            Children::Many(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }
}

impl From<()> for Children {
    fn from(_: ()) -> Self {
        Children::Empty
    }
}

impl From<Child> for Children {
    fn from(child: Child) -> Self {
        Children::One(child)
    }
}

impl From<Element> for Children {
    fn from(element: Element) -> Self {
        Children::One(Child::Element(element))
    }
}

impl From<&str> for Children {
    fn from(text: &str) -> Self {
        Children::One(Child::Text(text.to_string()))
    }
}

impl From<String> for Children {
    fn from(text: String) -> Self {
        Children::One(Child::Text(text))
    }
}

impl From<f64> for Children {
    fn from(value: f64) -> Self {
        Children::One(Child::Number(value))
    }
}

impl From<i32> for Children {
    fn from(value: i32) -> Self {
        Children::One(Child::Number(value as f64))
    }
}

impl From<u32> for Children {
    fn from(value: u32) -> Self {
        Children::One(Child::Number(value as f64))
    }
}

impl From<i64> for Children {
    fn from(value: i64) -> Self {
        Children::One(Child::Number(value as f64))
    }
}

impl From<bool> for Children {
    fn from(value: bool) -> Self {
        Children::One(Child::Bool(value))
    }
}

impl<T> From<Vec<T>> for Children
where
    T: Into<Children>,
{
    fn from(items: Vec<T>) -> Self {
        Children::Many(items.into_iter().map(Into::into).collect())
    }
}

impl<T> From<Option<T>> for Children
where
    T: Into<Children>,
{
    fn from(item: Option<T>) -> Self {
        match item {
            Some(value) => value.into(),
            None => Children::Empty,
        }
    }
}

macro_rules! children_from_tuple {
    ($($ty:ident),+) => {
        impl<$($ty),+> From<($($ty,)+)> for Children
        where
            $($ty: Into<Children>,)+
        {
            #[allow(non_snake_case)]
            fn from(($($ty,)+): ($($ty,)+)) -> Self {
                Children::Many(vec![$($ty.into()),+])
            }
        }
    };
}

children_from_tuple!(A, B);
children_from_tuple!(A, B, C);
children_from_tuple!(A, B, C, D);
children_from_tuple!(A, B, C, D, E);
children_from_tuple!(A, B, C, D, E, F);
children_from_tuple!(A, B, C, D, E, F, G);
children_from_tuple!(A, B, C, D, E, F, G, H);

// =============================================================================
// Element
// =============================================================================

/// Immutable tag + props descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    tag: Tag,
    props: Props,
}

impl Element {
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    /// Shorthand for `props().children()`.
    pub fn children(&self) -> &[Child] {
        self.props.children()
    }
}

/// Assemble an element from a tag, props, and a nestable child
/// collection. The children are flattened to any depth and stored in
/// the props record's reserved children slot.
pub fn create_element(
    tag: impl Into<Tag>,
    props: Props,
    children: impl Into<Children>,
) -> Element {
    let children = children.into().flatten();
    Element {
        tag: tag.into(),
        props: props.with_children(children),
    }
}

/// Terse alias for [`create_element`].
pub use self::create_element as h;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::Controller;

    fn noop_component(name: &str) -> Component {
        Component::sync_fn(name, |_ctrl: &Controller, _props: &Props| {
            h("span", Props::new(), ())
        })
    }

    #[test]
    fn test_create_element_flattens_nested_children() {
        let el = h(
            "div",
            Props::new(),
            (
                "a",
                (h("span", Props::new(), ()), vec!["b", "c"]),
                3,
            ),
        );

        let children = el.children();
        assert_eq!(children.len(), 5);
        assert_eq!(children[0], Child::Text("a".to_string()));
        assert!(matches!(&children[1], Child::Element(e) if *e.tag() == Tag::from("span")));
        assert_eq!(children[2], Child::Text("b".to_string()));
        assert_eq!(children[3], Child::Text("c".to_string()));
        assert_eq!(children[4], Child::Number(3.0));
    }

    #[test]
    fn test_create_element_without_children() {
        let el = h("br", Props::new(), ());
        assert!(el.children().is_empty());
    }

    #[test]
    fn test_props_preserve_insertion_order() {
        let props = Props::new().set("id", "x").set("title", "y").set("a", 1);
        let keys: Vec<&str> = props.values().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["id", "title", "a"]);
    }

    #[test]
    fn test_intrinsic_tags_compare_by_name() {
        assert_eq!(Tag::from("div"), Tag::from("div"));
        assert_ne!(Tag::from("div"), Tag::from("span"));
    }

    #[test]
    fn test_component_tags_compare_by_identity() {
        let a = noop_component("A");
        let b = noop_component("A");
        assert_eq!(Tag::from(a.clone()), Tag::from(a.clone()));
        assert_ne!(Tag::from(a), Tag::from(b), "same name is not same identity");
    }

    #[test]
    fn test_number_formatting_drops_whole_fraction() {
        assert_eq!(fmt_number(3.0), "3");
        assert_eq!(fmt_number(0.5), "0.5");
        assert_eq!(PropValue::from(2).to_string(), "2");
    }
}
