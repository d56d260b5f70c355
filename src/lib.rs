//! Scanned PDF compressor
//!
//! Renders every page of a PDF to a bitmap, re-encodes each page as JPEG and
//! packs the pages into a new PDF. Output that is not smaller than the input
//! is rejected and deleted.
//!
//! The [`advisor`] picks DPI and quality in auto mode, [`engine`] runs one
//! document and [`batch`] walks a directory tree.

pub mod advisor;
pub mod assemble;
pub mod batch;
pub mod encode;
pub mod engine;
pub mod error;
pub mod observer;
pub mod rasterize;

use std::path::PathBuf;

pub use batch::{compress_collection, compress_documents, discover_documents};
pub use engine::Compressor;
pub use error::CompressError;
pub use observer::{CompressionObserver, JobState, NoopObserver, ProgressBoard};
pub use rasterize::{PopplerRasterizer, Rasterizer, ToolStatus};

/// Sentinel for "let the advisor decide".
pub const AUTO: u32 = 0;
pub const MIN_DPI: u32 = 100;
pub const MAX_DPI: u32 = 200;
pub const MIN_QUALITY: u8 = 60;
pub const MAX_QUALITY: u8 = 95;

/// Engine settings that are not per document.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory containing `pdftoppm`, if not on PATH
    pub poppler_path: Option<PathBuf>,
    /// Parent of the per-document scratch directories (system temp dir if unset)
    pub work_dir: Option<PathBuf>,
    /// Flate-compress page content streams in the output
    pub compress_streams: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poppler_path: None,
            work_dir: None,
            compress_streams: true,
        }
    }
}

/// One document to compress.
#[derive(Debug, Clone)]
pub struct CompressionRequest {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    /// 0 = auto, else 100..=200
    pub target_dpi: u32,
    /// 0 = auto, else 60..=95
    pub target_quality: u8,
}

impl CompressionRequest {
    /// Build a request, rejecting out-of-range DPI or quality.
    pub fn new(
        source_path: impl Into<PathBuf>,
        destination_path: impl Into<PathBuf>,
        target_dpi: u32,
        target_quality: u8,
    ) -> Result<Self, CompressError> {
        validate_parameters(target_dpi, target_quality)?;
        Ok(Self {
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            target_dpi,
            target_quality,
        })
    }

    pub fn validate(&self) -> Result<(), CompressError> {
        validate_parameters(self.target_dpi, self.target_quality)
    }

    /// File name used in progress events.
    pub fn display_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }
}

/// Check DPI and quality against their bounds; `0` is always accepted.
pub fn validate_parameters(dpi: u32, quality: u8) -> Result<(), CompressError> {
    if dpi != AUTO && !(MIN_DPI..=MAX_DPI).contains(&dpi) {
        return Err(CompressError::InvalidParameter {
            name: "dpi",
            value: dpi,
            reason: "must be between 100 and 200, or 0 for auto",
        });
    }
    if quality as u32 != AUTO && !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
        return Err(CompressError::InvalidParameter {
            name: "quality",
            value: quality as u32,
            reason: "must be between 60 and 95, or 0 for auto",
        });
    }
    Ok(())
}

/// Result of one document's run. Never an error: failures are carried in
/// `message` with `success == false`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOutcome {
    pub success: bool,
    pub message: String,
    pub original_size_bytes: u64,
    pub compressed_size_bytes: Option<u64>,
    pub ratio_percent: Option<f64>,
}

impl CompressionOutcome {
    pub(crate) fn failed(original_size_bytes: u64, error: &CompressError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            original_size_bytes,
            compressed_size_bytes: None,
            ratio_percent: None,
        }
    }

    pub(crate) fn succeeded(original_size_bytes: u64, compressed_size_bytes: u64) -> Self {
        let ratio = compression_ratio(original_size_bytes, compressed_size_bytes);
        Self {
            success: true,
            message: format!(
                "Compressed successfully: {:.2} MB -> {:.2} MB ({:.1}% smaller)",
                megabytes(original_size_bytes),
                megabytes(compressed_size_bytes),
                ratio
            ),
            original_size_bytes,
            compressed_size_bytes: Some(compressed_size_bytes),
            ratio_percent: Some(ratio),
        }
    }
}

/// `(1 - compressed / original) * 100`, rounded to one decimal.
pub fn compression_ratio(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let ratio = (1.0 - compressed as f64 / original as f64) * 100.0;
    (ratio * 10.0).round() / 10.0
}

/// Bytes to binary megabytes.
pub fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// One line of a [`BatchReport`].
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub filename: String,
    pub success: bool,
    pub message: String,
}

/// Per-file results of a batch, in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub success_count: usize,
    pub failed_count: usize,
    pub per_file: Vec<FileReport>,
}

impl BatchReport {
    pub fn record(&mut self, filename: impl Into<String>, outcome: &CompressionOutcome) {
        if outcome.success {
            self.success_count += 1;
        } else {
            self.failed_count += 1;
        }
        self.per_file.push(FileReport {
            filename: filename.into(),
            success: outcome.success,
            message: outcome.message.clone(),
        });
    }

    pub fn total(&self) -> usize {
        self.success_count + self.failed_count
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.per_file.iter().filter(|f| !f.success)
    }
}
