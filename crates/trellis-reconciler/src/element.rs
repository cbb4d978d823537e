//! Declarative element descriptions.
//!
//! A [`Node`] is an immutable description of what a position in the tree
//! should look like. Descriptions are cheap to clone (everything is behind
//! `Rc`) and are rebuilt on every render; the reconciler diffs them against
//! the committed work nodes.
//!
//! # Example
//!
//! ```
//! use trellis_reconciler::{host, text};
//!
//! let list = host("ul")
//!     .attr("class", "items")
//!     .children((1..=3).map(|i| host("li").key(i.to_string()).child(i)))
//!     .build();
//! # let _ = (list, text("x"));
//! ```

use std::fmt;
use std::rc::Rc;

use crate::error::RenderError;
use crate::hooks::Hooks;

/// Explicit reconciliation key.
pub type Key = Rc<str>;

/// A host attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Element properties: ordered attributes plus the declared children.
#[derive(Debug, Clone, Default)]
pub struct Props {
    pub attrs: Rc<[(Rc<str>, PropValue)]>,
    pub children: Node,
}

impl Props {
    /// Props carrying only children.
    #[must_use]
    pub fn with_children(children: Node) -> Self {
        Self {
            attrs: Rc::from(Vec::new()),
            children,
        }
    }

    /// Look up an attribute by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.attrs
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }
}

/// Signature of a component's render function.
pub type RenderFn = dyn Fn(&Props, &mut Hooks<'_>) -> Result<Node, RenderError>;

/// A component type.
///
/// Identity is the shared render function: clones of one `Component` are
/// the same type, two `Component::new` calls with equal closures are not.
#[derive(Clone)]
pub struct Component {
    name: Rc<str>,
    render: Rc<RenderFn>,
}

impl Component {
    pub fn new<F>(name: &str, render: F) -> Self
    where
        F: Fn(&Props, &mut Hooks<'_>) -> Result<Node, RenderError> + 'static,
    {
        Self {
            name: name.into(),
            render: Rc::new(render),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn render(&self, props: &Props, hooks: &mut Hooks<'_>) -> Result<Node, RenderError> {
        (self.render)(props, hooks)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

/// What an element instantiates.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementType {
    /// A host node with the given tag.
    Host(Rc<str>),
    Component(Component),
    /// Groups children without a host node of its own.
    Fragment,
}

/// One declared element.
#[derive(Debug, Clone)]
pub struct Element {
    pub ty: ElementType,
    pub key: Option<Key>,
    pub props: Props,
}

/// A children value.
#[derive(Debug, Clone, Default)]
pub enum Node {
    Element(Rc<Element>),
    Text(Rc<str>),
    List(Rc<[Node]>),
    /// Renders nothing.
    #[default]
    Empty,
}

impl Node {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The element, if this is a single element.
    #[must_use]
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(el) => Some(el),
            _ => None,
        }
    }
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Self::Element(Rc::new(value))
    }
}

impl From<ElementBuilder> for Node {
    fn from(value: ElementBuilder) -> Self {
        value.build()
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Self::Text(value.into())
    }
}

impl From<Rc<str>> for Node {
    fn from(value: Rc<str>) -> Self {
        Self::Text(value)
    }
}

macro_rules! node_from_number {
    ($($t:ty),*) => {
        $(impl From<$t> for Node {
            fn from(value: $t) -> Self {
                Self::Text(value.to_string().into())
            }
        })*
    };
}

node_from_number!(i32, i64, u32, u64, usize);

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Self::List(value.into())
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

/// Builder returned by [`host`], [`component`] and [`fragment`].
#[derive(Debug, Clone)]
#[must_use]
pub struct ElementBuilder {
    ty: ElementType,
    key: Option<Key>,
    attrs: Vec<(Rc<str>, PropValue)>,
    children: Vec<Node>,
}

impl ElementBuilder {
    fn new(ty: ElementType) -> Self {
        Self {
            ty,
            key: None,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Finish the element. One child is stored as that child, several as a
    /// [`Node::List`].
    #[must_use]
    pub fn build(self) -> Node {
        let mut children = self.children;
        let children = match children.len() {
            0 => Node::Empty,
            1 => children.pop().unwrap_or_default(),
            _ => Node::List(children.into()),
        };
        Node::from(Element {
            ty: self.ty,
            key: self.key,
            props: Props {
                attrs: self.attrs.into(),
                children,
            },
        })
    }
}

/// Start a host element.
pub fn host(tag: &str) -> ElementBuilder {
    ElementBuilder::new(ElementType::Host(tag.into()))
}

/// Start a component element.
pub fn component(component: &Component) -> ElementBuilder {
    ElementBuilder::new(ElementType::Component(component.clone()))
}

/// Start a fragment element holding `children`.
pub fn fragment<I>(children: I) -> ElementBuilder
where
    I: IntoIterator,
    I::Item: Into<Node>,
{
    ElementBuilder::new(ElementType::Fragment).children(children)
}

/// A text node.
#[must_use]
pub fn text(content: impl Into<Rc<str>>) -> Node {
    Node::Text(content.into())
}

/// Effect dependency value, compared by identity.
///
/// Scalars and strings compare by value, floats bitwise with every NaN
/// equal to every other NaN, and [`Dep::Ref`] by pointer.
#[derive(Clone)]
pub enum Dep {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Ref(Rc<dyn std::any::Any>),
}

impl Dep {
    /// Identity comparison.
    #[must_use]
    pub fn same(&self, other: &Dep) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("Unit"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::Str(v) => write!(f, "Str({v:?})"),
            Self::Ref(v) => write!(f, "Ref({:p})", Rc::as_ptr(v)),
        }
    }
}

impl From<()> for Dep {
    fn from((): ()) -> Self {
        Self::Unit
    }
}

impl From<bool> for Dep {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Dep {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Dep {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for Dep {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Dep {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Dep {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for Dep {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}

impl From<Rc<str>> for Dep {
    fn from(value: Rc<str>) -> Self {
        Self::Str(value)
    }
}

/// Build an effect dependency list.
///
/// `deps![]` is an empty list (run once); `deps![a, b]` converts each
/// expression with `Dep::from`.
#[macro_export]
macro_rules! deps {
    () => {
        ::std::option::Option::Some(::std::vec::Vec::<$crate::Dep>::new())
    };
    ($($dep:expr),+ $(,)?) => {
        ::std::option::Option::Some(::std::vec![$($crate::Dep::from($dep)),+])
    };
}
