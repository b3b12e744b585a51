use thiserror::Error;

use crate::store::ViewId;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("malformed view markup: {0}")]
    Parse(String),

    #[error("element matching spec could not be located in view architecture: {spec}")]
    TargetNotFound { spec: String },

    #[error("invalid specification position: {position}")]
    InvalidPosition { position: String },

    #[error("invalid move specification: {reason}")]
    InvalidMove { reason: String },

    #[error("invalid specification: {reason}")]
    InvalidSpec { reason: String },

    #[error("inheritance cycle or mode violation for view {view:?}")]
    Cycle { view: ViewId },

    #[error("view {view} is invalid: {message}")]
    Validation {
        view: String,
        message: String,
        /// Serialized offending XML fragment, for diagnostics.
        context: String,
    },

    #[error("view not found: {0:?}")]
    NotFound(ViewId),
}

pub type Result<T> = std::result::Result<T, ViewError>;
