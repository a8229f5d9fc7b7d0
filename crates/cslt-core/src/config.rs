//! Pipeline configuration.

use std::path::PathBuf;

use semver::Version;

/// Environment variable overriding the compile tool executable.
pub const ARDUINO_CLI_ENV: &str = "CSLT_ARDUINO_CLI";

/// Environment variable overriding the archiver executable.
pub const ARCHIVER_ENV: &str = "CSLT_ARCHIVER";

/// Environment variable overriding the package output directory.
pub const OUTPUT_DIR_ENV: &str = "CSLT_OUTPUT_DIR";

/// Highest compile tool release that is known not to work.
pub const INCOMPATIBLE_CLI_VERSION: Version = Version::new(0, 20, 2);

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Compile tool executable (name looked up in PATH, or a path)
    pub compile_tool: String,

    /// Archiver executable (name looked up in PATH, or a path)
    pub archiver: String,

    /// Root directory of the produced package (`sketch-dist/`)
    pub output_dir: PathBuf,

    /// Tool name recorded in the package metadata
    pub producer: String,

    /// Compile tool releases at or below this version are rejected
    pub incompatible_cli_version: Version,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            compile_tool: "arduino-cli".to_string(),
            archiver: "gcc-ar".to_string(),
            output_dir: PathBuf::from("sketch-dist"),
            producer: "cslt".to_string(),
            incompatible_cli_version: INCOMPATIBLE_CLI_VERSION,
        }
    }
}

impl PipelineConfig {
    /// Default configuration with overrides from the environment.
    ///
    /// Reads `CSLT_ARDUINO_CLI`, `CSLT_ARCHIVER` and `CSLT_OUTPUT_DIR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(tool) = non_empty(ARDUINO_CLI_ENV) {
            config.compile_tool = tool;
        }
        if let Some(archiver) = non_empty(ARCHIVER_ENV) {
            config.archiver = archiver;
        }
        if let Some(dir) = non_empty(OUTPUT_DIR_ENV) {
            config.output_dir = PathBuf::from(dir);
        }
        config
    }
}
