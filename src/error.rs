//! Error types for the conversion pipeline.

use thiserror::Error;

/// Failures while turning a rendered surface into PDF pages.
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// The sink refused to open a page.
    #[error("could not allocate page {page}: {reason}")]
    PageAllocation { page: usize, reason: String },

    #[error("image could not be embedded: {0}")]
    Image(String),

    #[error("surface failed to draw: {0}")]
    Draw(String),

    /// The conversion was abandoned (deadline elapsed) between two pages.
    #[error("assembly cancelled")]
    Cancelled,
}

/// A comprehensive error type for one HTML → PDF conversion.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("HTML content cannot be empty.")]
    Input,

    #[error(
        "PDF generation timed out after {secs} seconds. This might be caused by large images, \
         complex loop in scripts, or resource loading issues."
    )]
    Timeout { secs: f64 },

    /// The renderer adapter reported a load / navigation failure.
    #[error("{0}")]
    Render(String),

    #[error("{0}")]
    Assembly(#[from] AssemblyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The assembly worker panicked or was torn down.
    #[error("{0}")]
    Worker(String),
}

impl ConvertError {
    /// Message reported to callers through [`crate::pipeline::ConversionResult`].
    ///
    /// Input, timeout, renderer and assembly errors carry their own text and
    /// are reported verbatim. Unexpected failures (I/O, a crashed worker)
    /// are prefixed with `Conversion failed:`.
    pub fn user_message(&self) -> String {
        match self {
            ConvertError::Io(_) | ConvertError::Worker(_) => format!("Conversion failed: {self}"),
            _ => self.to_string(),
        }
    }
}
