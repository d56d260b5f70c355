//! Page rasterization through Poppler's `pdftoppm`.
//!
//! The tool is located once when a [`PopplerRasterizer`] is built. When a
//! conversion fails the availability probe is run again so the error can tell
//! "not installed" apart from "failed on this input".

use image::DynamicImage;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use wait_timeout::ChildExt;

use crate::error::CompressError;
use crate::EngineConfig;

/// One rendered page held in memory.
pub type RasterPage = DynamicImage;

#[cfg(windows)]
const PDFTOPPM: &str = "pdftoppm.exe";
#[cfg(not(windows))]
const PDFTOPPM: &str = "pdftoppm";

/// Longest wait for `pdftoppm -v` before the tool is treated as missing.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Inclusive, 1-based page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub first: u32,
    pub last: u32,
}

impl PageRange {
    pub fn first_page() -> Self {
        PageRange { first: 1, last: 1 }
    }
}

/// Renders PDF pages to bitmaps.
pub trait Rasterizer {
    /// Render `pages` (all pages when `None`) of `pdf` at `dpi`, in page order.
    fn rasterize(
        &self,
        pdf: &Path,
        dpi: u32,
        pages: Option<PageRange>,
    ) -> Result<RasterizedDocument, CompressError>;

    /// Probe the environment for the rendering tool right now.
    fn tool_status(&self) -> ToolStatus;
}

/// Where the rendering tool was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    /// Found in a bundled or hinted directory.
    Local(PathBuf),
    /// Found on `PATH`.
    OnPath,
    Missing,
}

impl ToolStatus {
    /// Look for `pdftoppm`: hinted directory, bundled copies next to the
    /// executable, then `PATH`.
    pub fn probe(hint: Option<&Path>) -> Self {
        if let Some(dir) = find_local(hint) {
            return ToolStatus::Local(dir);
        }

        let mut cmd = Command::new(PDFTOPPM);
        cmd.arg("-v");
        match output_within(cmd, PROBE_TIMEOUT) {
            Some(out) => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                let stderr = String::from_utf8_lossy(&out.stderr);
                if out.status.success() || stdout.contains("pdftoppm") || stderr.contains("pdftoppm")
                {
                    ToolStatus::OnPath
                } else {
                    ToolStatus::Missing
                }
            }
            None => ToolStatus::Missing,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, ToolStatus::Missing)
    }

    /// Human readable status; for a missing tool this is the install guide.
    pub fn message(&self) -> String {
        match self {
            ToolStatus::Local(dir) => format!("Poppler found locally: {}", dir.display()),
            ToolStatus::OnPath => "Poppler is installed and available on PATH".to_string(),
            ToolStatus::Missing => remediation_text().to_string(),
        }
    }

    fn program(&self) -> PathBuf {
        match self {
            ToolStatus::Local(dir) => dir.join(PDFTOPPM),
            _ => PathBuf::from(PDFTOPPM),
        }
    }
}

/// Run `cmd` to completion, giving up (and killing it) after `timeout`.
/// `None` when it could not be started or did not finish in time.
///
/// Output is read after exit, so this is only for commands that print little.
fn output_within(mut cmd: Command, timeout: Duration) -> Option<Output> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .ok()?;

    match child.wait_timeout(timeout) {
        Ok(Some(status)) => {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            if let Some(mut pipe) = child.stdout.take() {
                let _ = pipe.read_to_end(&mut stdout);
            }
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_end(&mut stderr);
            }
            Some(Output {
                status,
                stdout,
                stderr,
            })
        }
        Ok(None) => {
            log::warn!("{:?} did not finish within {:?}, killing it", cmd, timeout);
            let _ = child.kill();
            let _ = child.wait();
            None
        }
        Err(e) => {
            log::debug!("waiting for {:?} failed: {}", cmd, e);
            let _ = child.kill();
            let _ = child.wait();
            None
        }
    }
}

fn find_local(hint: Option<&Path>) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(hint) = hint {
        candidates.push(hint.to_path_buf());
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join("poppler").join("Library").join("bin"));
        candidates.push(exe_dir.join("poppler").join("bin"));
        candidates.push(exe_dir.join("..").join("poppler").join("Library").join("bin"));
    }

    candidates
        .into_iter()
        .find(|dir| dir.join(PDFTOPPM).is_file())
}

fn remediation_text() -> &'static str {
    if cfg!(windows) {
        "Poppler is NOT installed!\n\n\
         INSTALLING POPPLER ON WINDOWS:\n\
         1. Download Poppler from https://github.com/oschwartz10612/poppler-windows/releases/\n\
         2. Extract the ZIP archive (e.g. to C:\\poppler)\n\
         3. OPTION A - add it to PATH:\n\
         \x20  - open 'Environment Variables'\n\
         \x20  - edit 'Path' under system variables\n\
         \x20  - add the poppler\\Library\\bin directory, e.g. C:\\poppler\\Library\\bin\n\
         \x20  - restart the application\n\
         3. OPTION B - local copy:\n\
         \x20  - extract poppler next to the executable as poppler\\Library\\bin\n\
         \x20  - or pass --poppler-path / set POPPLER_PATH"
    } else {
        "Poppler is NOT installed!\n\n\
         Linux: sudo apt-get install poppler-utils\n\
         macOS: brew install poppler"
    }
}

/// Rendered pages of one document.
///
/// Pages rendered by an external tool stay on disk in a private scratch
/// directory and are decoded one at a time; the directory is removed when this
/// value (or the iterator made from it) is dropped.
pub struct RasterizedDocument {
    scratch: Option<TempDir>,
    pages: Vec<PageSource>,
}

enum PageSource {
    File(PathBuf),
    Memory(RasterPage),
}

impl RasterizedDocument {
    /// Wrap bitmaps that are already in memory.
    pub fn from_images(images: Vec<RasterPage>) -> Self {
        RasterizedDocument {
            scratch: None,
            pages: images.into_iter().map(PageSource::Memory).collect(),
        }
    }

    /// Take ownership of `scratch` and the page files inside it, in page order.
    pub fn from_scratch(scratch: TempDir, files: Vec<PathBuf>) -> Self {
        RasterizedDocument {
            scratch: Some(scratch),
            pages: files.into_iter().map(PageSource::File).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Scratch directory backing the pages, if any.
    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }
}

impl IntoIterator for RasterizedDocument {
    type Item = Result<RasterPage, CompressError>;
    type IntoIter = Pages;

    fn into_iter(self) -> Pages {
        Pages {
            _scratch: self.scratch,
            pages: self.pages.into_iter(),
        }
    }
}

/// Decodes pages in order, deleting each rendered file once loaded.
pub struct Pages {
    _scratch: Option<TempDir>,
    pages: std::vec::IntoIter<PageSource>,
}

impl Iterator for Pages {
    type Item = Result<RasterPage, CompressError>;

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.pages.next()?;
        Some(match source {
            PageSource::Memory(img) => Ok(img),
            PageSource::File(path) => {
                let decoded = image::open(&path).map_err(|e| CompressError::RasterizationError {
                    detail: format!("could not read rendered page {}: {}", path.display(), e),
                    tool_status: "pdftoppm produced an unreadable page image".to_string(),
                });
                let _ = fs::remove_file(&path);
                decoded
            }
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pages.size_hint()
    }
}

/// `pdftoppm` driver.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    status: ToolStatus,
    hint: Option<PathBuf>,
    work_dir: Option<PathBuf>,
}

impl PopplerRasterizer {
    /// Locate the tool once and log where it was found.
    pub fn new(config: &EngineConfig) -> Self {
        let status = ToolStatus::probe(config.poppler_path.as_deref());
        match &status {
            ToolStatus::Local(dir) => log::info!("Using bundled pdftoppm from {}", dir.display()),
            ToolStatus::OnPath => log::info!("Using pdftoppm from PATH"),
            ToolStatus::Missing => log::warn!("pdftoppm not found; rasterization will fail"),
        }
        PopplerRasterizer {
            status,
            hint: config.poppler_path.clone(),
            work_dir: config.work_dir.clone(),
        }
    }

    /// Status resolved at construction.
    pub fn startup_status(&self) -> &ToolStatus {
        &self.status
    }

    fn scratch_dir(&self) -> Result<TempDir, CompressError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("scan-squeeze-");
        match &self.work_dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|e| CompressError::io("create work dir", dir, e))?;
                builder
                    .tempdir_in(dir)
                    .map_err(|e| CompressError::io("create scratch dir", dir, e))
            }
            None => builder
                .tempdir()
                .map_err(|e| CompressError::io("create scratch dir", std::env::temp_dir(), e)),
        }
    }

    fn failure(&self, detail: String) -> CompressError {
        let status = self.tool_status();
        if status.is_available() {
            CompressError::RasterizationError {
                detail,
                tool_status: status.message(),
            }
        } else {
            CompressError::ToolUnavailable {
                remediation: status.message(),
                detail,
            }
        }
    }
}

impl Rasterizer for PopplerRasterizer {
    fn rasterize(
        &self,
        pdf: &Path,
        dpi: u32,
        pages: Option<PageRange>,
    ) -> Result<RasterizedDocument, CompressError> {
        let scratch = self.scratch_dir()?;
        let prefix = scratch.path().join("page");

        let mut cmd = Command::new(self.status.program());
        cmd.arg("-r").arg(dpi.to_string()).arg("-png");
        if let Some(range) = pages {
            cmd.arg("-f")
                .arg(range.first.to_string())
                .arg("-l")
                .arg(range.last.to_string());
        }
        cmd.arg(pdf).arg(&prefix);

        log::debug!("Running {:?}", cmd);
        let output = cmd.output().map_err(|e| self.failure(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                format!("pdftoppm exited with {}", output.status)
            } else {
                stderr
            };
            return Err(self.failure(detail));
        }

        let files = collect_page_files(scratch.path())?;
        Ok(RasterizedDocument::from_scratch(scratch, files))
    }

    fn tool_status(&self) -> ToolStatus {
        ToolStatus::probe(self.hint.as_deref())
    }
}

/// Rendered page files in page order. `pdftoppm` zero-pads the page number
/// to the width of the page count, so order by the parsed number.
fn collect_page_files(dir: &Path) -> Result<Vec<PathBuf>, CompressError> {
    let entries = fs::read_dir(dir).map_err(|e| CompressError::io("list rendered pages", dir, e))?;

    let mut numbered: Vec<(u32, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CompressError::io("list rendered pages", dir, e))?;
        let path = entry.path();
        if let Some(number) = page_number(&path) {
            numbered.push((number, path));
        }
    }
    numbered.sort_by_key(|(n, _)| *n);
    Ok(numbered.into_iter().map(|(_, p)| p).collect())
}

fn page_number(path: &Path) -> Option<u32> {
    let is_png = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("png"))
        .unwrap_or(false);
    if !is_png {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit('-').next()?.parse().ok()
}
