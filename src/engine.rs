//! Page Compression Engine: one document from source PDF to checked output.

use std::fs;
use std::path::Path;

use crate::advisor::resolve_auto_parameters;
use crate::assemble::{LopdfAssembler, PageAssembler};
use crate::encode::encode_page;
use crate::error::CompressError;
use crate::observer::CompressionObserver;
use crate::rasterize::{PopplerRasterizer, Rasterizer};
use crate::{megabytes, CompressionOutcome, CompressionRequest, EngineConfig, AUTO};

/// Progress checkpoints reported to observers.
pub mod checkpoint {
    pub const START: u8 = 0;
    pub const ESTIMATING: u8 = 5;
    pub const RASTERIZING: u8 = 10;
    pub const RASTERIZED: u8 = 30;
    pub const ENCODED: u8 = 80;
    pub const ASSEMBLING: u8 = 85;
    pub const DONE: u8 = 100;
}

/// Runs the rasterize, encode, assemble and size-check pipeline.
pub struct Compressor<R = PopplerRasterizer, A = LopdfAssembler> {
    rasterizer: R,
    assembler: A,
}

impl Compressor {
    /// Compressor backed by `pdftoppm` and `lopdf`.
    pub fn new(config: &EngineConfig) -> Self {
        Compressor {
            rasterizer: PopplerRasterizer::new(config),
            assembler: LopdfAssembler {
                compress_streams: config.compress_streams,
            },
        }
    }
}

impl<R: Rasterizer, A: PageAssembler> Compressor<R, A> {
    pub fn with_parts(rasterizer: R, assembler: A) -> Self {
        Compressor {
            rasterizer,
            assembler,
        }
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    /// Compress one document.
    ///
    /// Always returns an outcome. On failure the destination is left absent
    /// unless the failure happened before assembly started, and no scratch
    /// files survive either way.
    pub fn compress_document(
        &self,
        request: &CompressionRequest,
        observer: &dyn CompressionObserver,
    ) -> CompressionOutcome {
        let name = request.display_name();
        let original_size = fs::metadata(&request.source_path)
            .map(|m| m.len())
            .unwrap_or(0);

        match self.run(request, &name, observer) {
            Ok((original, compressed)) => {
                let outcome = CompressionOutcome::succeeded(original, compressed);
                log::info!("{}: {}", name, outcome.message);
                outcome
            }
            Err(err) => {
                if err.discards_output() {
                    remove_output(&request.destination_path);
                }
                log::warn!("{}: {}", name, err);
                CompressionOutcome::failed(original_size, &err)
            }
        }
    }

    fn run(
        &self,
        request: &CompressionRequest,
        name: &str,
        observer: &dyn CompressionObserver,
    ) -> Result<(u64, u64), CompressError> {
        let source = request.source_path.as_path();
        let destination = request.destination_path.as_path();

        observer.progress(name, checkpoint::START);
        request.validate()?;

        // Step 1: Source must exist
        if !source.exists() {
            return Err(CompressError::SourceNotFound(source.to_path_buf()));
        }
        let original_size = file_size(source)?;
        if is_same_file(source, destination) {
            return Err(CompressError::DestinationIsSource(source.to_path_buf()));
        }

        // Step 2: Resolve auto parameters
        if request.target_dpi == AUTO {
            observer.progress(name, checkpoint::ESTIMATING);
        }
        let (dpi, quality) = resolve_auto_parameters(
            &self.rasterizer,
            source,
            request.target_dpi,
            request.target_quality,
        );
        log::info!("{}: rendering at {} DPI, JPEG quality {}", name, dpi, quality);

        // Step 3: Rasterize
        observer.progress(name, checkpoint::RASTERIZING);
        let raster = self.rasterizer.rasterize(source, dpi, None)?;
        if raster.is_empty() {
            return Err(CompressError::EmptyDocument(source.to_path_buf()));
        }
        observer.progress(name, checkpoint::RASTERIZED);

        // Step 4: Re-encode each page; bitmaps are dropped as soon as encoded
        let total = raster.len();
        let mut encoded = Vec::with_capacity(total);
        for (index, page) in raster.into_iter().enumerate() {
            let page = page?;
            let jpeg = encode_page(&page, quality, index + 1)?;
            log::debug!(
                "{}: page {}/{} {}x{} -> {} bytes",
                name,
                index + 1,
                total,
                jpeg.width,
                jpeg.height,
                jpeg.jpeg.len()
            );
            encoded.push(jpeg);
            observer.progress(name, encode_progress(index, total));
        }

        // Step 5: Assemble
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| CompressError::io("create output directory", parent, e))?;
        }
        observer.progress(name, checkpoint::ASSEMBLING);
        self.assembler.assemble(encoded, dpi, destination)?;
        observer.progress(name, checkpoint::DONE);

        // Step 6: Post-conditions
        if !destination.exists() {
            return Err(CompressError::OutputNotCreated(destination.to_path_buf()));
        }
        let compressed_size = file_size(destination)?;
        if compressed_size == 0 {
            return Err(CompressError::OutputEmpty(destination.to_path_buf()));
        }
        if compressed_size >= original_size {
            return Err(CompressError::SizeRegression {
                original: megabytes(original_size),
                compressed: megabytes(compressed_size),
            });
        }

        Ok((original_size, compressed_size))
    }
}

/// Progress after encoding page `index` of `total`: 30% to 80% linearly.
pub fn encode_progress(index: usize, total: usize) -> u8 {
    let span = (checkpoint::ENCODED - checkpoint::RASTERIZED) as f64;
    let done = (index + 1) as f64 / total.max(1) as f64;
    checkpoint::RASTERIZED + (done * span).round_ties_even() as u8
}

fn file_size(path: &Path) -> Result<u64, CompressError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| CompressError::io("read file size", path, e))
}

/// Whether `destination` resolves to the existing `source` file. A
/// destination that does not exist yet cannot be the source.
fn is_same_file(source: &Path, destination: &Path) -> bool {
    match (source.canonicalize(), destination.canonicalize()) {
        (Ok(source), Ok(destination)) => source == destination,
        _ => false,
    }
}

fn remove_output(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Could not remove rejected output {}: {}", path.display(), e);
        }
    }
}
