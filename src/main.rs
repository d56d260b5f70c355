//! Scanned PDF compressor CLI
//!
//! Command-line interface for compressing one PDF or a whole directory tree.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scan_squeeze::batch::{discover_documents, DEFAULT_OUTPUT_DIR};
use scan_squeeze::{
    compress_documents, validate_parameters, CompressionObserver, CompressionRequest, Compressor,
    EngineConfig, Rasterizer, ToolStatus,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Batches above this size ask for confirmation.
const LARGE_BATCH: usize = 100;

/// Shrink scanned PDFs by re-encoding every page as JPEG
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing pdftoppm, if it is not on PATH
    #[arg(long, env = "POPPLER_PATH", global = true)]
    poppler_path: Option<PathBuf>,

    /// Directory for temporary page images
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress a single PDF
    Compress {
        /// Input PDF file path
        input: PathBuf,

        /// Output PDF file path (default: <input>_compressed.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Render DPI, 100-200 (0 = auto)
        #[arg(short, long, default_value = "0")]
        dpi: u32,

        /// JPEG quality, 60-95 (0 = auto)
        #[arg(short, long, default_value = "0")]
        quality: u8,
    },

    /// Compress every PDF under a directory
    Batch {
        /// Directory to search recursively
        input_dir: PathBuf,

        /// Output directory (default: <input_dir>/compressed)
        output_dir: Option<PathBuf>,

        /// Render DPI, 100-200 (0 = auto)
        #[arg(short, long, default_value = "0")]
        dpi: u32,

        /// JPEG quality, 60-95 (0 = auto)
        #[arg(short, long, default_value = "0")]
        quality: u8,

        /// Do not ask for confirmation on large batches
        #[arg(short, long)]
        yes: bool,
    },

    /// Report whether pdftoppm can be found
    Check,
}

/// Prints the transcript to stdout and, optionally, progress to stderr.
struct ConsoleObserver {
    show_progress: bool,
}

impl CompressionObserver for ConsoleObserver {
    fn progress(&self, filename: &str, percent: u8) {
        if self.show_progress {
            eprint!("\r{}: {:>3}%", filename, percent);
            if percent == 100 {
                eprintln!();
            }
            let _ = io::stderr().flush();
        }
    }

    fn log(&self, line: &str) {
        println!("{}", line);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .parse_default_env()
        .init();

    let config = EngineConfig {
        poppler_path: args.poppler_path.clone(),
        work_dir: args.work_dir.clone(),
        ..EngineConfig::default()
    };

    match args.command {
        Command::Compress {
            input,
            output,
            dpi,
            quality,
        } => run_compress(&config, input, output, dpi, quality),
        Command::Batch {
            input_dir,
            output_dir,
            dpi,
            quality,
            yes,
        } => run_batch(&config, &input_dir, output_dir.as_deref(), dpi, quality, yes),
        Command::Check => run_check(&config),
    }
}

fn run_compress(
    config: &EngineConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    dpi: u32,
    quality: u8,
) -> Result<()> {
    let output = output.unwrap_or_else(|| default_output(&input));
    let request = CompressionRequest::new(&input, &output, dpi, quality)
        .context("Invalid compression parameters")?;

    let compressor = Compressor::new(config);
    let outcome = compressor.compress_document(&request, &ConsoleObserver { show_progress: true });

    if !outcome.success {
        anyhow::bail!("{}", outcome.message);
    }
    println!("{}", outcome.message);
    println!("Output saved to: {}", output.display());
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_compressed.pdf", stem))
}

fn run_batch(
    config: &EngineConfig,
    input_dir: &Path,
    output_dir: Option<&Path>,
    dpi: u32,
    quality: u8,
    yes: bool,
) -> Result<()> {
    validate_parameters(dpi, quality).context("Invalid compression parameters")?;
    if !input_dir.is_dir() {
        anyhow::bail!("Directory does not exist: {}", input_dir.display());
    }
    let resolved_output = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input_dir.join(DEFAULT_OUTPUT_DIR));

    println!("============================================================");
    println!("PDF BATCH COMPRESSOR");
    println!("============================================================");
    println!("Input directory: {}", input_dir.display());
    println!("Output directory: {}", resolved_output.display());
    println!("Mode: {}", describe_mode(dpi, quality));
    println!("============================================================");
    println!();

    let documents = discover_documents(input_dir, Some(&resolved_output));
    let count = documents.len();
    println!("Found {} PDF files", count);
    if count == 0 {
        println!("WARNING: no PDF files found!");
        return Ok(());
    }

    if count > LARGE_BATCH && !yes && !confirm_large_batch(count)? {
        println!("Cancelled by user");
        return Ok(());
    }

    println!();
    println!("Starting compression...");
    println!();

    let compressor = Compressor::new(config);
    let report = compress_documents(
        &compressor,
        input_dir,
        &documents,
        &resolved_output,
        dpi,
        quality,
        &ConsoleObserver {
            show_progress: false,
        },
    );

    println!();
    println!("============================================================");
    println!("COMPRESSION FINISHED");
    println!("============================================================");
    println!("Processed: {}", report.total());
    println!("Succeeded: {}", report.success_count);
    println!("Failed: {}", report.failed_count);

    if report.failed_count > 0 {
        println!();
        println!("FAILED FILES:");
        for file in report.failures() {
            println!("   - {}", file.filename);
            println!("     {}", file.message);
        }
    }

    println!();
    println!("Output directory: {}", resolved_output.display());
    println!("============================================================");
    Ok(())
}

fn describe_mode(dpi: u32, quality: u8) -> String {
    match (dpi, quality) {
        (0, 0) => "Auto (DPI 100-150, quality 85) - tuned for legibility".to_string(),
        (0, q) => format!("Auto DPI, quality {}", q),
        (d, 0) => format!("DPI {}, auto quality", d),
        (d, q) => format!("DPI {}, quality {}", d, q),
    }
}

fn confirm_large_batch(count: usize) -> Result<bool> {
    println!("WARNING: found {} files!", count);
    println!(
        "   Estimated time: {:.0}-{:.0} minutes",
        count as f64 * 0.5,
        count as f64 * 2.0
    );
    print!("\n   Continue? (yes/no): ");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "yes" | "y"))
}

fn run_check(config: &EngineConfig) -> Result<()> {
    let compressor = Compressor::new(config);
    let status = compressor.rasterizer().tool_status();
    println!("{}", status.message());
    if status == ToolStatus::Missing {
        std::process::exit(1);
    }
    Ok(())
}
