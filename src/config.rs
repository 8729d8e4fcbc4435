use serde::{Deserialize, Serialize};

/// Settings shared by every request of a [`Registry`](crate::Registry).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspenseConfig {
    /// Send [`SUSPENSE_SCRIPT`](crate::script::SUSPENSE_SCRIPT) right
    /// before the first patch of every request.
    ///
    /// Disable this when the page already loads the script itself, e.g.
    /// from its `<head>`; patches will not apply otherwise.
    pub auto_script: bool,
}

impl Default for SuspenseConfig {
    fn default() -> Self {
        Self { auto_script: true }
    }
}
