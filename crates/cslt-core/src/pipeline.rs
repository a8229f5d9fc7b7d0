//! Pipeline driver: sketch in, precompiled library out.

use std::path::Path;

use crate::assemble::{LibraryAssembler, LibraryPackageLayout};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::output::{CompileOutputParser, CompileResult};
use crate::patch::{SketchPatcher, SubstituteFile};
use crate::sketch::{locate_entry_file, sketch_name};
use crate::toolchain::{ArduinoCli, GccAr, check_cli_version};

/// Runs one sketch through compile, extraction and assembly.
///
/// Stages run strictly in sequence. Only one pipeline may target a given
/// sketch and output root at a time.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline with the given configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build the precompiled library for the sketch at `sketch_path`.
    ///
    /// Once the sketch is patched it is restored before this returns, on
    /// success and on compile or parse failure alike. A failed restore is
    /// logged and does not replace the primary outcome.
    pub fn run(&self, sketch_path: &Path, fqbn: &str) -> Result<LibraryPackageLayout> {
        let cli = ArduinoCli::locate(&self.config.compile_tool)?;
        check_cli_version(&cli.version()?, &self.config.incompatible_cli_version)?;

        let archiver = GccAr::locate(&self.config.archiver)?;
        tracing::info!("{}", archiver.version_line()?);

        let ino = locate_entry_file(sketch_path)?;
        let name = sketch_name(&ino)?;
        let sketch_dir = ino.parent().unwrap_or(Path::new("."));

        let substitute = SubstituteFile::create(sketch_dir)?;
        let patch = match SketchPatcher::patch(&ino) {
            Ok(patch) => patch,
            Err(e) => {
                substitute.remove();
                return Err(e);
            }
        };

        let built = Self::build(&cli, fqbn, &ino);

        substitute.remove();
        if let Err(e) = patch.restore() {
            tracing::warn!("{}", e.with_hint());
        }

        let result = built?;
        tracing::debug!(
            "{} object files for {} on {}",
            result.object_files.len(),
            name,
            result.build_mcu
        );

        LibraryAssembler::new(&self.config.output_dir, &self.config.producer, archiver)
            .assemble(&name, fqbn, &result)
    }

    /// Compile, decode the result and resolve the target MCU.
    fn build(cli: &ArduinoCli, fqbn: &str, ino: &Path) -> Result<CompileResult> {
        let raw = cli.compile(fqbn, ino)?;
        let output = CompileOutputParser::parse(&raw)?;
        let properties = cli.show_properties(fqbn, ino)?;
        output.with_mcu_from(&properties)
    }
}
