//! Error taxonomy for one document's compression run.
//!
//! Every variant is recoverable at document granularity: the engine turns it
//! into a failed [`CompressionOutcome`](crate::CompressionOutcome) and the batch
//! driver moves on to the next file.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Invalid parameter {name}={value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: u32,
        reason: &'static str,
    },

    #[error("Source file does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Output path is the source file itself: {}", .0.display())]
    DestinationIsSource(PathBuf),

    #[error("ERROR: Poppler (pdftoppm) is not installed!\n\n{remediation}\n\nOriginal error: {detail}")]
    ToolUnavailable { remediation: String, detail: String },

    #[error("Failed to convert PDF pages to images: {detail}\n\n{tool_status}")]
    RasterizationError { detail: String, tool_status: String },

    #[error("PDF has no pages: {}", .0.display())]
    EmptyDocument(PathBuf),

    #[error("Failed to encode page {page}: {detail}")]
    EncodingFailure { page: usize, detail: String },

    #[error("Failed to assemble output PDF: {0}")]
    AssemblyFailure(String),

    #[error("Output file was not created: {}", .0.display())]
    OutputNotCreated(PathBuf),

    #[error("Output file is empty: {}", .0.display())]
    OutputEmpty(PathBuf),

    #[error(
        "Compressed file ({compressed:.2} MB) is not smaller than the original ({original:.2} MB). \
         The PDF is probably already well compressed; keep the original file."
    )]
    SizeRegression { original: f64, compressed: f64 },

    #[error("I/O error during {op} on {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl CompressError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompressError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Whether a partially written output file should be removed for this failure.
    pub(crate) fn discards_output(&self) -> bool {
        matches!(
            self,
            CompressError::AssemblyFailure(_)
                | CompressError::OutputEmpty(_)
                | CompressError::SizeRegression { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_regression_message_recommends_keeping_original() {
        let err = CompressError::SizeRegression {
            original: 1.0,
            compressed: 1.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("keep the original"));
        assert!(msg.contains("1.50 MB"));
        assert!(err.discards_output());
    }

    #[test]
    fn missing_source_keeps_nothing_to_discard() {
        let err = CompressError::SourceNotFound(PathBuf::from("/nope.pdf"));
        assert!(err.to_string().contains("/nope.pdf"));
        assert!(!err.discards_output());
    }

    #[test]
    fn destination_clash_never_discards_the_file() {
        let err = CompressError::DestinationIsSource(PathBuf::from("/scans/a.pdf"));
        assert!(err.to_string().contains("/scans/a.pdf"));
        assert!(!err.discards_output());
    }
}
