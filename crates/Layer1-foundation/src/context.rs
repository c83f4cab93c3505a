//! Call context carrying the active namespace
//!
//! Every path and socket address keel derives is namespace-scoped. The
//! context travels explicitly through the call chain; an unset namespace is
//! a hard error at the first derivation site, never a silent default.

use crate::error::{Error, Result};

/// Per-call context
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Active namespace, if resolved
    namespace: Option<String>,
}

impl Context {
    /// Context with no namespace set
    pub fn new() -> Self {
        Self::default()
    }

    /// Context scoped to a namespace
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
        }
    }

    /// Active namespace, or None
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Active namespace, or `Error::NamespaceRequired`
    pub fn namespace_required(&self) -> Result<&str> {
        self.namespace.as_deref().ok_or(Error::NamespaceRequired)
    }
}
