use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::extraction::ExtractionError;
use crate::generation::GenerationError;
use crate::tasks::TaskStoreFull;

/// Failures surfaced by the summarisation service and its HTTP layer.
#[derive(Debug, Error)]
pub enum SummariseError {
    /// Malformed or out-of-range request field, rejected before any work
    #[error("{0}")]
    Validation(String),
    #[error("Failed to extract content from URL: {0}")]
    ExtractionFailed(String),
    #[error("Insufficient content extracted from URL ({found} characters, need at least {required})")]
    InsufficientContent { found: usize, required: usize },
    #[error("Summarisation failed: {0}")]
    GenerationFailed(String),
    /// No capacity left for background work
    #[error("{0}")]
    Unavailable(String),
    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl SummariseError {
    pub fn status(&self) -> Status {
        match self {
            SummariseError::Validation(_) | SummariseError::InsufficientContent { .. } => {
                Status::UnprocessableEntity
            }
            SummariseError::ExtractionFailed(_) => Status::BadGateway,
            SummariseError::Unavailable(_) => Status::ServiceUnavailable,
            SummariseError::GenerationFailed(_) | SummariseError::Internal(_) => {
                Status::InternalServerError
            }
        }
    }
}

impl From<ExtractionError> for SummariseError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::InvalidUrl { .. } => SummariseError::Validation(e.to_string()),
            other => SummariseError::ExtractionFailed(other.to_string()),
        }
    }
}

impl From<GenerationError> for SummariseError {
    fn from(e: GenerationError) -> Self {
        SummariseError::GenerationFailed(e.to_string())
    }
}

impl From<TaskStoreFull> for SummariseError {
    fn from(e: TaskStoreFull) -> Self {
        SummariseError::Unavailable(e.to_string())
    }
}

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>) -> Json<Self> {
        Json(Self {
            detail: detail.into(),
        })
    }
}

impl<'r> Responder<'r, 'static> for SummariseError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if let SummariseError::Internal(ref e) = self {
            // full chain goes to the log only
            error!(error = ?e, "internal error while handling {}", req.uri());
        }
        (status, ErrorBody::new(self.to_string())).respond_to(req)
    }
}
