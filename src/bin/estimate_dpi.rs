use lopdf::Document;
use scan_squeeze::advisor::{clamp_auto_dpi, estimate_source_dpi, AUTO_QUALITY};
use scan_squeeze::{EngineConfig, PopplerRasterizer};
use std::path::PathBuf;

fn main() {
    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("usage: estimate-dpi <file.pdf>");
        std::process::exit(2);
    };

    match Document::load(&path) {
        Ok(doc) => println!("Pages: {}", doc.get_pages().len()),
        Err(e) => println!("Error loading PDF: {:?}", e),
    }

    let rasterizer = PopplerRasterizer::new(&EngineConfig::default());
    println!("Tool: {}", rasterizer.startup_status().message());

    let estimate = estimate_source_dpi(&rasterizer, &path);
    println!("Estimated source DPI: {}", estimate);
    println!(
        "Auto parameters: {} DPI, quality {}",
        clamp_auto_dpi(estimate),
        AUTO_QUALITY
    );
}
