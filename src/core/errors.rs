//! Core error types for the book OCR pipeline.
//!
//! `OcrError` distinguishes the failure classes the pipeline reacts to
//! differently: fatal configuration problems abort the run, per-page errors
//! are caught at the page boundary, and recognizer resource exhaustion is
//! downgraded to an empty-but-successful page result.

use thiserror::Error;

/// Errors that can occur in the book OCR pipeline.
#[derive(Debug, Error)]
pub enum OcrError {
    /// Error occurred while loading or decoding an image.
    #[error("image load")]
    ImageLoad(#[from] image::ImageError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("json")]
    Json(#[from] serde_json::Error),

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem. Aborts the run.
    #[error("configuration: {message}")]
    Config {
        /// A message describing the configuration error.
        message: String,
    },

    /// A page was rejected by the quality gate before recognition.
    #[error("page {page_num} rejected by quality gate (blur_score={blur_score:.1})")]
    QualityRejected {
        /// The rejected page number.
        page_num: u32,
        /// Variance of the Laplacian response; low means flat or blurry.
        blur_score: f64,
    },

    /// A recognition backend ran out of device or memory resources.
    ///
    /// The orchestrator downgrades this to an empty successful page result
    /// rather than marking the page failed.
    #[error("backend '{backend}' exhausted resources: {context}")]
    ResourceExhausted {
        /// Name of the backend that reported exhaustion.
        backend: String,
        /// Additional context about the exhaustion.
        context: String,
    },

    /// A recognition backend failed for any other reason.
    #[error("backend '{backend}' failed: {context}")]
    Recognition {
        /// Name of the failing backend.
        backend: String,
        /// Additional context about the failure.
        context: String,
        /// The underlying error, when one is available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The external layout model failed.
    #[error("layout analysis failed: {context}")]
    Layout {
        /// Additional context about the failure.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl OcrError {
    /// Creates an invalid-input error from a message.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a configuration error from a message.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a configuration error with context and details.
    pub fn config_error_detailed(context: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Config {
            message: format!("{}: {}", context.into(), details.into()),
        }
    }

    /// Creates a recognition error without an underlying source.
    pub fn recognition(backend: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Recognition {
            backend: backend.into(),
            context: context.into(),
            source: None,
        }
    }

    /// Wraps an error reported by a recognition backend.
    pub fn recognition_with_source(
        backend: impl Into<String>,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Recognition {
            backend: backend.into(),
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a resource-exhaustion error.
    pub fn resource_exhausted(backend: impl Into<String>, context: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            backend: backend.into(),
            context: context.into(),
        }
    }

    /// Returns true when this error is a recognizer resource-exhaustion
    /// signal, which the orchestrator treats as an empty success.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }
}
