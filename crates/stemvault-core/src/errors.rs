use stemvault_core_types::{RequestId, TraceId};
use thiserror::Error;

/// Result type alias using the canonical error facility
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code usable by callers (HTTP gateway,
/// CLI exit reporting, tests) without string matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Snapshot input
    /// Snapshot is not valid JSON, lacks a required track field, or carries a
    /// value that cannot be coerced
    Validation,

    // Repository
    /// Unknown revision, missing artifact, or uninitialized repository
    NotFound,
    /// A restore or merge cannot be applied cleanly to the working tree
    Conflict,
    /// Repository initialization failed on the filesystem
    Init,
    /// Staging or recording a commit failed
    Commit,
    /// HEAD moved between computing and recording a commit
    Concurrency,

    // External parser
    ParseTimeout,
    ParserFailure,

    // Diff
    DeterminismViolation,

    // Integration/IO
    Io,
    Serialization,
    Persistence,
    Config,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Validation => "ERR_VALIDATION",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Conflict => "ERR_CONFLICT",
            ExErrorKind::Init => "ERR_INIT",
            ExErrorKind::Commit => "ERR_COMMIT",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::ParseTimeout => "ERR_PARSE_TIMEOUT",
            ExErrorKind::ParserFailure => "ERR_PARSER_FAILURE",
            ExErrorKind::DeterminismViolation => "ERR_DETERMINISM_VIOLATION",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries a classification for programmatic handling plus optional context
/// (operation, entity, revision, project) for debugging.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    revision: Option<String>,
    project_id: Option<String>,
    request_id: Option<RequestId>,
    trace_id: Option<TraceId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            revision: None,
            project_id: None,
            request_id: None,
            trace_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity context (track id, file path, ...)
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add revision context
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Add project context
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(project_id) = &self.project_id {
            write!(f, " (project: {})", project_id)?;
        }
        if let Some(revision) = &self.revision {
            write!(f, " (revision: {})", revision)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity: {})", entity_id)?;
        }
        if let Some(source) = &self.source {
            write!(f, " caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain error taxonomy for snapshot and repository operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VaultError {
    // ===== Snapshot Errors =====
    /// Snapshot document cannot be read as JSON or has the wrong shape
    #[error("Malformed snapshot: {reason}")]
    MalformedSnapshot { reason: String },

    /// A track is missing one of `id`, `name`, `type`
    #[error("Track at index {track_index} is missing required field `{field}`")]
    MissingTrackField { track_index: usize, field: String },

    /// A field exists but its value cannot be coerced to the expected type
    #[error("Track {track_id}: field `{field}` has invalid value {value}")]
    InvalidFieldValue {
        track_id: String,
        field: String,
        value: String,
    },

    /// Two tracks in one snapshot share an id
    #[error("Duplicate track id in snapshot: {track_id}")]
    DuplicateTrackId { track_id: String },

    // ===== Repository Errors =====
    #[error("Repository not initialized at {path}")]
    RepositoryNotInitialized { path: String },

    #[error("Revision not found: {revision}")]
    RevisionNotFound { revision: String },

    #[error("No diff artifact recorded for revision {revision}")]
    DiffArtifactNotFound { revision: String },

    /// Working tree has uncommitted edits on a path the restore must rewrite
    #[error("Restore conflicts with uncommitted changes to {path}")]
    RestoreConflict { path: String },

    #[error("Failed to initialize repository at {path}: {reason}")]
    InitFailed { path: String, reason: String },

    /// Copying the working tree into the blob store failed
    #[error("Failed to stage {path}: {reason}")]
    StageFailed { path: String, reason: String },

    // ===== Parser Errors =====
    #[error("Project parser exceeded {timeout_secs}s")]
    ParseTimeout { timeout_secs: u64 },

    #[error("Project parser failed: {reason}")]
    ParserFailed { reason: String },

    // ===== Serialization =====
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

/// Conversion from the domain taxonomy to the canonical error facility
impl From<VaultError> for ExError {
    fn from(err: VaultError) -> Self {
        let message = err.to_string();
        match err {
            VaultError::MalformedSnapshot { .. } => {
                ExError::new(ExErrorKind::Validation).with_message(message)
            }
            VaultError::MissingTrackField { track_index, .. } => {
                ExError::new(ExErrorKind::Validation)
                    .with_entity_id(format!("tracks[{}]", track_index))
                    .with_message(message)
            }
            VaultError::InvalidFieldValue { track_id, .. }
            | VaultError::DuplicateTrackId { track_id } => ExError::new(ExErrorKind::Validation)
                .with_entity_id(track_id)
                .with_message(message),

            VaultError::RepositoryNotInitialized { path } => ExError::new(ExErrorKind::NotFound)
                .with_entity_id(path)
                .with_message(message),
            VaultError::RevisionNotFound { revision }
            | VaultError::DiffArtifactNotFound { revision } => {
                ExError::new(ExErrorKind::NotFound)
                    .with_revision(revision)
                    .with_message(message)
            }
            VaultError::RestoreConflict { path } => ExError::new(ExErrorKind::Conflict)
                .with_entity_id(path)
                .with_message(message),
            VaultError::InitFailed { path, .. } => ExError::new(ExErrorKind::Init)
                .with_entity_id(path)
                .with_message(message),
            VaultError::StageFailed { path, .. } => ExError::new(ExErrorKind::Commit)
                .with_entity_id(path)
                .with_message(message),

            VaultError::ParseTimeout { .. } => {
                ExError::new(ExErrorKind::ParseTimeout).with_message(message)
            }
            VaultError::ParserFailed { .. } => {
                ExError::new(ExErrorKind::ParserFailure).with_message(message)
            }

            VaultError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Serialization {
            message: err.to_string(),
        }
    }
}
