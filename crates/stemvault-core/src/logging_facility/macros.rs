//! Operation lifecycle macros
//!
//! Every public repository or engine operation brackets its work with
//! `log_op_start!` and exactly one of `log_op_end!` / `log_op_error!`.
//! Extra `tracing` fields may follow the required arguments.

/// Emit the `start` event of `op`
///
/// ```
/// # use stemvault_core::log_op_start;
/// log_op_start!("commit");
/// log_op_start!("commit", project_id = "42");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START
            $(, $($field)*)?
        )
    };
}

/// Emit the `end` event of `op` with its duration
///
/// ```
/// # use stemvault_core::log_op_end;
/// log_op_end!("commit", duration_ms = 42);
/// log_op_end!("commit", duration_ms = 42, revision = "abcd");
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration
            $(, $($field)*)?
        )
    };
}

/// Emit the `end_error` event of `op`, classifying the error by kind and code.
/// `$err` is anything convertible into `ExError`.
///
/// ```
/// # use stemvault_core::log_op_error;
/// # use stemvault_core::errors::VaultError;
/// let err = VaultError::RevisionNotFound { revision: "abc".to_string() };
/// log_op_error!("restore", err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {{
        let failure: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?failure.kind(),
            err_code = failure.code(),
            err_message = failure.message()
            $(, $($field)*)?
        )
    }};
}
