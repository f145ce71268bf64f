//! Canonical keys and event names of the structured log stream
//!
//! The lifecycle macros emit these names as literal field identifiers; the
//! constants exist so consumers (log capture, dashboards, tests) match on
//! the same strings.

pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REVISION: &str = "revision";

pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
