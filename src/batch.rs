//! Batch Driver: compress every PDF under a directory tree.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::assemble::PageAssembler;
use crate::engine::Compressor;
use crate::error::CompressError;
use crate::observer::CompressionObserver;
use crate::rasterize::{Rasterizer, ToolStatus};
use crate::{BatchReport, CompressionOutcome, CompressionRequest};

/// Extension of the documents picked up by discovery (any case).
pub const DOCUMENT_EXTENSION: &str = "pdf";
/// Name of the default output directory inside the batch root.
pub const DEFAULT_OUTPUT_DIR: &str = "compressed";

const LISTED_FILES: usize = 10;
const RULE: &str = "============================================================";

/// Recursively find PDFs under `root`, sorted by path within each directory.
///
/// Anything inside `exclude` (typically the output directory) is skipped.
pub fn discover_documents(root: &Path, exclude: Option<&Path>) -> Vec<PathBuf> {
    let exclude = exclude.and_then(|p| p.canonicalize().ok());
    let mut seen = HashSet::new();

    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            match (&exclude, entry.path().canonicalize()) {
                (Some(excluded), Ok(dir)) => &dir != excluded,
                _ => true,
            }
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_document_extension(entry.path()))
        .map(|entry| entry.into_path())
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

fn has_document_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Compress every document under `root` into `destination` (default
/// `root/compressed`), one at a time, in discovery order.
///
/// Output files are named after the source basename only, so documents with
/// the same name in different subdirectories overwrite each other. A failure
/// of any kind, including a panic, is recorded against that document and the
/// batch continues.
pub fn compress_collection<R: Rasterizer, A: PageAssembler>(
    compressor: &Compressor<R, A>,
    root: &Path,
    destination: Option<&Path>,
    dpi: u32,
    quality: u8,
    observer: &dyn CompressionObserver,
) -> BatchReport {
    if !root.is_dir() {
        observer.log(&format!("Directory does not exist: {}", root.display()));
        return BatchReport::default();
    }

    let output_dir = destination
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.join(DEFAULT_OUTPUT_DIR));

    log_tool_status(&compressor.rasterizer().tool_status(), observer);
    observer.log(&format!("Searching for PDF files in: {}", root.display()));
    let documents = discover_documents(root, Some(&output_dir));

    process_documents(compressor, root, &documents, &output_dir, dpi, quality, observer)
}

/// Compress an already discovered list of documents under `root` into
/// `output_dir`, with the same per-file isolation and transcript as
/// [`compress_collection`].
pub fn compress_documents<R: Rasterizer, A: PageAssembler>(
    compressor: &Compressor<R, A>,
    root: &Path,
    documents: &[PathBuf],
    output_dir: &Path,
    dpi: u32,
    quality: u8,
    observer: &dyn CompressionObserver,
) -> BatchReport {
    log_tool_status(&compressor.rasterizer().tool_status(), observer);
    process_documents(compressor, root, documents, output_dir, dpi, quality, observer)
}

fn process_documents<R: Rasterizer, A: PageAssembler>(
    compressor: &Compressor<R, A>,
    root: &Path,
    documents: &[PathBuf],
    output_dir: &Path,
    dpi: u32,
    quality: u8,
    observer: &dyn CompressionObserver,
) -> BatchReport {
    let mut report = BatchReport::default();

    observer.log(&format!("Found {} PDF files:", documents.len()));
    for doc in documents.iter().take(LISTED_FILES) {
        let parent = doc.parent().unwrap_or(root);
        observer.log(&format!("  - {} ({})", file_name(doc), parent.display()));
    }
    if documents.len() > LISTED_FILES {
        observer.log(&format!("  ... and {} more", documents.len() - LISTED_FILES));
    }

    if documents.is_empty() {
        observer.log(&format!("No PDF files found in: {}", root.display()));
        return report;
    }

    warn_on_basename_collisions(documents, observer);

    if let Err(e) = fs::create_dir_all(output_dir) {
        let err = CompressError::io("create output directory", output_dir, e);
        observer.log(&format!("✗ {}", err));
        return report;
    }
    observer.log(&format!("Output directory: {}", output_dir.display()));

    let total = documents.len();
    for (index, source) in documents.iter().enumerate() {
        let name = file_name(source);
        let target = output_dir.join(&name);

        observer.log("");
        observer.log(&format!("[{}/{}] Processing: {}", index + 1, total, name));
        observer.log(&format!("  Input: {}", source.display()));
        observer.log(&format!("  Output: {}", target.display()));

        let outcome = compress_one(compressor, source, &target, dpi, quality, observer);
        if outcome.success {
            observer.log(&format!("✓ {}", outcome.message));
        } else {
            observer.log(&format!("✗ ERROR: {}", outcome.message));
        }
        report.record(name, &outcome);
    }

    observer.log("");
    observer.log(&format!(
        "Finished: {} succeeded, {} failed, {} total",
        report.success_count,
        report.failed_count,
        report.total()
    ));
    log::info!(
        "Batch {}: {} succeeded, {} failed",
        root.display(),
        report.success_count,
        report.failed_count
    );

    report
}

fn compress_one<R: Rasterizer, A: PageAssembler>(
    compressor: &Compressor<R, A>,
    source: &Path,
    target: &Path,
    dpi: u32,
    quality: u8,
    observer: &dyn CompressionObserver,
) -> CompressionOutcome {
    let request = match CompressionRequest::new(source, target, dpi, quality) {
        Ok(request) => request,
        Err(err) => return CompressionOutcome::failed(0, &err),
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        compressor.compress_document(&request, observer)
    }));

    result.unwrap_or_else(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        let err = CompressError::Unexpected(format!("while processing {}: {}", source.display(), detail));
        log::error!("{}", err);
        let original = fs::metadata(source).map(|m| m.len()).unwrap_or(0);
        CompressionOutcome::failed(original, &err)
    })
}

fn log_tool_status(status: &ToolStatus, observer: &dyn CompressionObserver) {
    match status {
        ToolStatus::Local(dir) => {
            observer.log(&format!("✓ Poppler is installed (local): {}", dir.display()))
        }
        ToolStatus::OnPath => observer.log("✓ Poppler is installed (on PATH)"),
        ToolStatus::Missing => {
            observer.log("✗ CRITICAL: Poppler is not installed!");
            observer.log(RULE);
            for line in status.message().lines() {
                observer.log(line);
            }
            observer.log(RULE);
            observer.log("Compression will not work without Poppler!");
            observer.log("");
        }
    }
}

fn warn_on_basename_collisions(documents: &[PathBuf], observer: &dyn CompressionObserver) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for doc in documents {
        *counts.entry(file_name(doc)).or_default() += 1;
    }
    let mut dupes: Vec<_> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
    dupes.sort();
    for (name, n) in dupes {
        let line = format!("⚠ {} files are named {}; later ones overwrite earlier output", n, name);
        log::warn!("{}", line);
        observer.log(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, b"%PDF-1.4").expect("write");
    }

    #[test]
    fn discovery_is_recursive_case_insensitive_and_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("b.pdf"));
        touch(&root.join("A.PDF"));
        touch(&root.join("notes.txt"));
        touch(&root.join("sub/c.Pdf"));
        touch(&root.join("sub/deeper/d.pdf"));

        let found: Vec<_> = discover_documents(root, None)
            .iter()
            .map(|p| p.strip_prefix(root).expect("under root").to_path_buf())
            .collect();

        assert_eq!(
            found,
            vec![
                PathBuf::from("A.PDF"),
                PathBuf::from("b.pdf"),
                PathBuf::from("sub/c.Pdf"),
                PathBuf::from("sub/deeper/d.pdf"),
            ]
        );
    }

    #[test]
    fn discovery_skips_output_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("scan.pdf"));
        touch(&root.join("compressed/scan.pdf"));

        let found = discover_documents(root, Some(&root.join("compressed")));
        assert_eq!(found, vec![root.join("scan.pdf")]);

        // a missing exclude directory excludes nothing
        let found = discover_documents(root, Some(&root.join("elsewhere")));
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn missing_root_discovers_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(discover_documents(&dir.path().join("missing"), None).is_empty());
    }
}
