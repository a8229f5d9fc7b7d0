//! cslt CLI - turn Arduino sketches into precompiled libraries.

mod colors;
mod compile;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cslt")]
#[command(about = "Compiles Arduino sketches into precompiled libraries")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a sketch producing a precompiled library
    ///
    /// The library is written to ./sketch-dist:
    ///   libsketch/library.properties
    ///   libsketch/extras/result.json
    ///   libsketch/src/<mcu>/libsketch.a
    ///   libsketch/src/libsketch.h
    ///   sketch/sketch.ino   (entry stub to recompile against the library)
    ///   README.md           (core and libraries needed to rebuild)
    #[command(verbatim_doc_comment)]
    #[command(after_help = "Example: cslt compile -b arduino:samd:mkrwifi1010 sketch/sketch.ino")]
    Compile {
        /// Path to the sketch (.ino file or sketch directory)
        sketch: String,

        /// Fully Qualified Board Name, e.g.: arduino:avr:uno
        #[arg(short = 'b', long)]
        fqbn: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format cslt-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<cslt_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Compile { sketch, fqbn } => {
            compile::execute(&sketch, &fqbn).map_err(format_error)?;
        }
    }

    Ok(())
}
