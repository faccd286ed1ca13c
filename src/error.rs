use thiserror::Error;

/// Failure taxonomy shared by every job kind.
///
/// An unreliable OCR read is not an error; it is a successful outcome
/// carrying `Validation::is_reliable == false`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("device {device} is busy (held by {holder})")]
    Busy { device: String, holder: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),
    #[error("screenshot capture failed: {0}")]
    CaptureFailure(String),
    #[error("failed to decode artifact: {0}")]
    DecodeFailure(String),
    #[error("extraction failed: {0}")]
    ExtractionFailure(String),
    #[error("{0}")]
    Unhandled(String),
}

impl JobError {
    /// Short machine-readable tag, used in persisted rows and event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Busy { .. } => "busy",
            JobError::NotFound(_) => "not_found",
            JobError::UnknownTaskKind(_) => "unknown_task_kind",
            JobError::CaptureFailure(_) => "capture_failure",
            JobError::DecodeFailure(_) => "decode_failure",
            JobError::ExtractionFailure(_) => "extraction_failure",
            JobError::Unhandled(_) => "unhandled",
        }
    }

    /// Recover a typed error from an `anyhow` chain, falling back to `Unhandled`
    /// with the whole chain rendered as the message.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<JobError>() {
            Some(job_err) => job_err.clone(),
            None => JobError::Unhandled(format!("{err:#}")),
        }
    }
}
