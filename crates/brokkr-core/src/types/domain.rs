//! Registry domains
//!
//! A domain is an isolation namespace for scan results. Folders marked
//! shared land in the global domain and are visible to every registry
//! sharing the store; everything else stays private to the registry that
//! scanned it. A folder's domain is sticky once established.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Isolation namespace assigned per scanned folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    /// Shared across all host processes using this store
    Global,
    /// Private to a single registry instance
    Private(u32),
}

impl Domain {
    /// True for the shared, registry-wide domain
    pub fn is_global(&self) -> bool {
        matches!(self, Domain::Global)
    }

    /// Whether results in this domain are visible to a registry running
    /// under `other`. Global results are visible everywhere; private
    /// results only within their own domain.
    pub fn visible_to(&self, other: Domain) -> bool {
        match self {
            Domain::Global => true,
            Domain::Private(id) => matches!(other, Domain::Private(o) if o == *id),
        }
    }
}

impl Default for Domain {
    fn default() -> Self {
        Domain::Global
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Global => write!(f, "global"),
            Domain::Private(id) => write!(f, "private-{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility() {
        assert!(Domain::Global.visible_to(Domain::Private(1)));
        assert!(Domain::Private(1).visible_to(Domain::Private(1)));
        assert!(!Domain::Private(1).visible_to(Domain::Private(2)));
        assert!(Domain::Global.visible_to(Domain::Global));
    }
}
