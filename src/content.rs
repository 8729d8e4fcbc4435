//! Renderable values and their conversion into markup.
//!
//! A [`Content`] is whatever may appear as the child of an element: trusted
//! markup, text that still needs escaping, numbers, nested lists and, most
//! importantly, pending computations that will only produce their markup
//! later.  Resolving a `Content` yields a [`Rendered`], which is either the
//! finished string or a single future standing in for the whole subtree.
//!
//! Resolution is synchronous for as long as possible.  Once a pending item
//! is met in a list, every remaining item is driven concurrently and the
//! results are concatenated in their original order, regardless of which
//! one settles first.

use std::{borrow::Cow, fmt, future::Future};

use futures::future::{self, BoxFuture, FutureExt};

use crate::error::RenderResult;

/// A future producing markup.
pub type PendingHtml = BoxFuture<'static, RenderResult<String>>;

/// A future producing more content, which may itself be pending.
pub type PendingContent = BoxFuture<'static, RenderResult<Content>>;

/// A renderable value.
#[derive(Default)]
pub enum Content {
    /// Renders nothing.
    #[default]
    Empty,
    /// Trusted markup, written verbatim.
    Html(Cow<'static, str>),
    /// Untrusted text, escaped when rendered.
    Text(String),
    Int(i64),
    Float(f64),
    /// Booleans render as nothing so that `cond && child` style
    /// expressions behave.
    Bool(bool),
    List(Vec<Content>),
    Pending(PendingContent),
}

impl Content {
    /// Untrusted text which will be escaped on render.
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text(text.into())
    }

    /// Trusted markup.
    pub fn html(html: impl Into<Cow<'static, str>>) -> Self {
        Content::Html(html.into())
    }

    /// Content produced by a future.
    pub fn pending<F, C>(fut: F) -> Self
    where
        F: Future<Output = RenderResult<C>> + Send + 'static,
        C: Into<Content>,
    {
        Content::Pending(fut.map(|result| result.map(Into::into)).boxed())
    }

    /// Whether rendering this would render nothing at all without
    /// resolving anything.
    pub fn is_empty(&self) -> bool {
        match self {
            Content::Empty | Content::Bool(_) => true,
            Content::Html(html) => html.is_empty(),
            Content::Text(text) => text.is_empty(),
            Content::List(items) => items.iter().all(Content::is_empty),
            Content::Int(_) | Content::Float(_) | Content::Pending(_) => false,
        }
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Empty => f.write_str("Empty"),
            Content::Html(html) => f.debug_tuple("Html").field(html).finish(),
            Content::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Content::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Content::Float(n) => f.debug_tuple("Float").field(n).finish(),
            Content::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Content::List(items) => f.debug_tuple("List").field(items).finish(),
            Content::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

impl From<&'static str> for Content {
    fn from(value: &'static str) -> Self {
        Content::Html(Cow::Borrowed(value))
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Html(Cow::Owned(value))
    }
}

impl From<i64> for Content {
    fn from(value: i64) -> Self {
        Content::Int(value)
    }
}

impl From<i32> for Content {
    fn from(value: i32) -> Self {
        Content::Int(value.into())
    }
}

impl From<f64> for Content {
    fn from(value: f64) -> Self {
        Content::Float(value)
    }
}

impl From<bool> for Content {
    fn from(value: bool) -> Self {
        Content::Bool(value)
    }
}

impl From<()> for Content {
    fn from(_: ()) -> Self {
        Content::Empty
    }
}

impl<T: Into<Content>> From<Option<T>> for Content {
    fn from(value: Option<T>) -> Self {
        value.map_or(Content::Empty, Into::into)
    }
}

impl<T: Into<Content>> From<Vec<T>> for Content {
    fn from(value: Vec<T>) -> Self {
        Content::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<Rendered> for Content {
    fn from(value: Rendered) -> Self {
        match value {
            Rendered::Ready(html) => Content::Html(Cow::Owned(html)),
            Rendered::Pending(pending) => {
                Content::Pending(pending.map(|result| result.map(Content::from)).boxed())
            }
        }
    }
}

impl<T: Into<Content>> FromIterator<T> for Content {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Content::List(iter.into_iter().map(Into::into).collect())
    }
}

/// The outcome of resolving some [`Content`].
pub enum Rendered {
    Ready(String),
    Pending(PendingHtml),
}

impl Rendered {
    pub fn is_ready(&self) -> bool {
        matches!(self, Rendered::Ready(_))
    }

    /// The finished markup, if nothing had to be awaited.
    pub fn ready(self) -> Option<String> {
        match self {
            Rendered::Ready(html) => Some(html),
            Rendered::Pending(_) => None,
        }
    }

    /// A future of the markup, immediately ready when nothing is pending.
    pub fn into_pending(self) -> PendingHtml {
        match self {
            Rendered::Ready(html) => future::ready(Ok(html)).boxed(),
            Rendered::Pending(pending) => pending,
        }
    }

    /// Transform the markup, now or once it is available.
    pub fn map<F>(self, f: F) -> Rendered
    where
        F: FnOnce(String) -> String + Send + 'static,
    {
        match self {
            Rendered::Ready(html) => Rendered::Ready(f(html)),
            Rendered::Pending(pending) => {
                Rendered::Pending(pending.map(|result| result.map(f)).boxed())
            }
        }
    }
}

impl fmt::Debug for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rendered::Ready(html) => f.debug_tuple("Ready").field(html).finish(),
            Rendered::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Resolve a single value.
pub fn resolve_one(content: Content) -> Rendered {
    match content {
        Content::Empty | Content::Bool(_) => Rendered::Ready(String::new()),
        Content::Html(html) => Rendered::Ready(html.into_owned()),
        Content::Text(text) => Rendered::Ready(escape(&text).into_owned()),
        Content::Int(n) => Rendered::Ready(n.to_string()),
        Content::Float(n) => Rendered::Ready(n.to_string()),
        Content::List(items) => resolve_many(items),
        Content::Pending(pending) => Rendered::Pending(
            async move {
                let content = pending.await?;
                resolve_one(content).into_pending().await
            }
            .boxed(),
        ),
    }
}

/// Resolve a sequence of values, concatenating them in order.
///
/// Everything up to the first pending item is rendered right away; from
/// there on all remaining items are awaited together.
pub fn resolve_many<I>(contents: I) -> Rendered
where
    I: IntoIterator<Item = Content>,
{
    let mut html = String::new();
    let mut contents = contents.into_iter();

    while let Some(content) = contents.next() {
        match resolve_one(content) {
            Rendered::Ready(chunk) => html.push_str(&chunk),
            Rendered::Pending(first) => {
                let rest = std::iter::once(first)
                    .chain(contents.map(|content| resolve_one(content).into_pending()))
                    .collect::<Vec<_>>();
                return Rendered::Pending(
                    async move {
                        for chunk in future::try_join_all(rest).await? {
                            html.push_str(&chunk);
                        }
                        Ok(html)
                    }
                    .boxed(),
                );
            }
        }
    }

    Rendered::Ready(html)
}

/// Escape text for use in element content or a quoted attribute value.
///
/// `>` is left alone as it can only close a tag that was opened by a `<`.
pub fn escape(text: &str) -> Cow<'_, str> {
    let needs_escape = |c: char| matches!(c, '&' | '<' | '"' | '\'' | '\u{A0}');
    let Some(first) = text.find(needs_escape) else {
        return Cow::Borrowed(text);
    };

    let mut escaped = String::with_capacity(text.len() + 16);
    escaped.push_str(&text[..first]);
    for c in text[first..].chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            '\u{A0}' => escaped.push_str("&#160;"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
