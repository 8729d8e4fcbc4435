use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    content::Rendered,
    error::RenderResult,
    registry::{RecordKey, Registry},
    suspense::SuspenseProps,
};

/// Identifies one in-flight streaming render.
///
/// Ids are either handed out by the [`Registry`] counter, in which case
/// they are always [`RequestId::Number`], or supplied by the application
/// which may use whatever it already identifies requests with.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    Name(Arc<str>),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::Name(name) => f.write_str(name),
        }
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        RequestId::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::Name(value.into())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId::Name(value.into())
    }
}

/// The handle a render factory receives.
///
/// It carries the id of the request being streamed along with the
/// registry that owns its record, so that deferred blocks created
/// anywhere in the tree find their way back to the right output.  A
/// handle stays bound to its own render: once that render is torn down,
/// a later render reusing the id is out of its reach.
#[derive(Clone, Debug)]
pub struct Request {
    key: RecordKey,
    registry: Registry,
}

impl Request {
    pub(crate) fn new(key: RecordKey, registry: Registry) -> Self {
        Self { key, registry }
    }

    pub fn id(&self) -> &RequestId {
        &self.key.id
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether the record for this request is still registered, i.e. the
    /// output has not yet been closed.
    pub fn is_streaming(&self) -> bool {
        self.registry.holds(&self.key)
    }

    /// Render a deferred block scoped to this request.
    ///
    /// The request id of `props` is filled in if it was left unset.
    pub fn suspense(&self, props: SuspenseProps) -> RenderResult<Rendered> {
        if props.request_id.as_ref().is_some_and(|id| *id != self.key.id) {
            return self.registry.suspense(props);
        }
        let props = props.request_id(self.key.id.clone());
        self.registry.defer(props, Some(self.key.generation))
    }
}
