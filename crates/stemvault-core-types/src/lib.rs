//! Core types shared across the stemvault facilities
//!
//! - **Correlation types**: `RequestId`, `TraceId`, `OperationContext`
//! - **Schema constants**: canonical field keys and event names used by the
//!   logging macros and by error reporting

pub mod correlation;
pub mod schema;

pub use correlation::{OperationContext, RequestId, TraceId};
