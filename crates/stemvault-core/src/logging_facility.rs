//! Structured logging
//!
//! `init` installs the process subscriber for a [`Profile`]; the
//! `log_op_*` macros emit lifecycle events with canonical field names; and
//! `test_capture` records events in memory so tests can assert on them.

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
