//! Compile command implementation for cslt CLI.
//!
//! Compiles a sketch and packages it as a precompiled library.

use std::path::Path;
use std::time::Instant;

use cslt_core::{Pipeline, PipelineConfig};

use crate::colors;

/// Result type for CLI operations.
pub type CliResult = anyhow::Result<()>;

/// Compile the sketch at `sketch_path` for `fqbn` into a precompiled library.
pub fn execute(sketch_path: &str, fqbn: &str) -> CliResult {
    let start = Instant::now();
    let path = Path::new(sketch_path);

    let pipeline = Pipeline::new(PipelineConfig::from_env());
    tracing::debug!("compile called with {:?}", pipeline.config());

    let layout = pipeline.run(path, fqbn)?;

    println!(
        "\n{}Built{} precompiled library {}{}{}",
        colors::GREEN,
        colors::RESET,
        colors::CYAN,
        layout.library_dir.display(),
        colors::RESET
    );
    println!(
        "{}Archive:{} {}",
        colors::BOLD,
        colors::RESET,
        layout.archive.display()
    );
    println!(
        "{}Instructions:{} {}",
        colors::BOLD,
        colors::RESET,
        layout.readme.display()
    );
    println!(
        "{}Time:{} {:.2}s",
        colors::DIM,
        colors::RESET,
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
