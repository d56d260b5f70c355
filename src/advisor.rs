//! Resolution Advisor: picks output DPI and JPEG quality for auto mode.

use std::path::Path;

use crate::rasterize::{PageRange, Rasterizer};

/// DPI used to render the probe page.
pub const REFERENCE_DPI: u32 = 200;
/// Page width assumed for every document (A4).
pub const ASSUMED_PAGE_WIDTH_INCHES: f64 = 8.3;
/// Estimate returned when the probe page cannot be rendered.
pub const FALLBACK_SOURCE_DPI: u32 = 150;

pub const AUTO_DPI_CEILING: u32 = 150;
pub const AUTO_DPI_FLOOR: u32 = 100;
pub const AUTO_QUALITY: u8 = 85;

const MIN_ESTIMATE: f64 = 72.0;
const MAX_ESTIMATE: f64 = 600.0;

/// Estimate the native scan resolution from the width of the first page.
///
/// Never fails: any rendering problem yields [`FALLBACK_SOURCE_DPI`].
pub fn estimate_source_dpi(rasterizer: &dyn Rasterizer, pdf: &Path) -> u32 {
    match first_page_width(rasterizer, pdf) {
        Some(width) => dpi_from_width(width),
        None => {
            log::debug!(
                "Could not render probe page of {}, assuming {} DPI",
                pdf.display(),
                FALLBACK_SOURCE_DPI
            );
            FALLBACK_SOURCE_DPI
        }
    }
}

fn first_page_width(rasterizer: &dyn Rasterizer, pdf: &Path) -> Option<u32> {
    let doc = rasterizer
        .rasterize(pdf, REFERENCE_DPI, Some(PageRange::first_page()))
        .ok()?;
    let page = doc.into_iter().next()?.ok()?;
    Some(page.width())
}

/// Pixel width over the assumed page width, clamped to 72..=600 and then
/// rounded to the nearest multiple of 50 (ties to even).
pub fn dpi_from_width(width_px: u32) -> u32 {
    let raw = (width_px as f64 / ASSUMED_PAGE_WIDTH_INCHES).clamp(MIN_ESTIMATE, MAX_ESTIMATE);
    ((raw / 50.0).round_ties_even() * 50.0) as u32
}

/// Replace auto sentinels (`0`) with concrete values.
///
/// Auto DPI follows the source resolution but stays within 100..=150; auto
/// quality is always 85. Non-zero values pass through untouched.
pub fn resolve_auto_parameters(
    rasterizer: &dyn Rasterizer,
    pdf: &Path,
    dpi: u32,
    quality: u8,
) -> (u32, u8) {
    let dpi = if dpi == 0 {
        clamp_auto_dpi(estimate_source_dpi(rasterizer, pdf))
    } else {
        dpi
    };
    let quality = if quality == 0 { AUTO_QUALITY } else { quality };
    (dpi, quality)
}

/// Auto DPI for an already estimated source resolution.
pub fn clamp_auto_dpi(estimated: u32) -> u32 {
    estimated.clamp(AUTO_DPI_FLOOR, AUTO_DPI_CEILING)
}
