//! Error types shared by the scoring engine and the ingestion boundary.

use thiserror::Error;

// ---

/// Errors surfaced to callers of the engine or the HTTP gateway.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    // ---
    #[error("Unknown asset type: {0}")]
    UnknownAssetType(String),

    #[error("Invalid reading: {0}")]
    InvalidReading(String),

    #[error("Unknown sensor parameter: {0}")]
    UnknownParameter(String),

    #[error("Unknown variant: {0}")]
    UnknownVariant(String),
}

/// Reasons a statistical fit could not be produced.
///
/// These never leave an engine stage. Each stage turns them into a skipped
/// parameter or a `None` signal so a scoring pass always completes.
#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    // ---
    #[error("insufficient data: need {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("degenerate input: zero variance")]
    Degenerate,
}
