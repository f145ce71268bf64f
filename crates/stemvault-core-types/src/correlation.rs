//! Correlation types for request tracking
//!
//! A request id follows one repository operation (commit, restore, merge)
//! across the engine, store and logging layers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! correlation_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered id (UUIDv7)
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Wrap an id received from a caller
            pub fn from_string(s: String) -> Self {
                Self(s)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

correlation_id!(
    /// Identifier for a single repository operation
    RequestId
);

correlation_id!(
    /// Identifier propagated from an upstream caller (HTTP gateway, job runner)
    TraceId
);

/// Context carried through one project-scoped operation
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub request_id: RequestId,
    pub trace_id: Option<TraceId>,
    pub project_id: Option<String>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new(),
            trace_id: None,
            project_id: None,
        }
    }

    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::new()
        }
    }

    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
