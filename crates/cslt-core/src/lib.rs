//! Turn compiled Arduino sketches into precompiled libraries.
//!
//! This crate provides:
//! - Object file path extraction from compiler invocation lines
//! - Decoding of `arduino-cli compile --format json` results
//! - Sketch patching so the compiled sketch can be relinked behind a stub
//! - Assembly of the precompiled library package
//!
//! # Architecture
//!
//! ```text
//! sketch.ino ──► SketchPatcher ──► arduino-cli compile ──► CompileOutputParser ──► CompileResult
//!                     │                                                                 │
//!                     └──────────── restore ◄───────────────────────────────────────────┤
//!                                                                                       ▼
//!                                                             LibraryAssembler ──► sketch-dist/
//! ```

pub mod assemble;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod patch;
pub mod pipeline;
pub mod resolve;
pub mod sketch;
pub mod toolchain;

pub use assemble::{LibraryAssembler, LibraryPackageLayout};
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use extract::extract_object_path;
pub use output::{BuildOutput, CompileOutputParser, CompileResult, LibraryInfo, PlatformInfo};
pub use patch::{SketchPatch, SketchPatcher, SubstituteFile};
pub use pipeline::Pipeline;
pub use resolve::{BuildPathResolver, CorePlatformResolver, McuResolver, TextResolver};
pub use toolchain::{ArduinoCli, Archiver, GccAr, check_cli_version};
