//! Error types for cslt-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for cslt-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning a sketch into a precompiled library.
///
/// Every variant is fatal for the run that produced it. Components only
/// report; the caller decides whether to log and exit.
#[derive(Debug, Error)]
pub enum Error {
    /// A required external executable is not installed.
    #[error("required tool `{tool}` not found: {message}")]
    ToolMissing { tool: String, message: String },

    /// An external executable could not be spawned or exited with failure.
    #[error("`{command}` failed: {message}")]
    ToolFailed { command: String, message: String },

    /// The installed compile tool is too old.
    #[error("please use a version > {minimum} of arduino-cli, installed version: {found}")]
    VersionIncompatible { found: String, minimum: String },

    /// The sketch path is missing or unusable.
    #[error("invalid sketch path: {0}")]
    InputInvalid(String),

    /// A sketch directory holds more than one `.ino` file.
    #[error(
        "invalid sketch path: {} contains multiple .ino files:\n{}",
        dir.display(),
        list_paths(candidates)
    )]
    AmbiguousSketch { dir: PathBuf, candidates: Vec<PathBuf> },

    /// The build tool produced output that could not be decoded.
    #[error("malformed build output: {0}")]
    MalformedOutput(String),

    /// The build tool reported an unsuccessful compile.
    #[error("sketch compile was not successful: {message}")]
    CompileFailed { message: String },

    /// The build directory holds no sketch object files.
    #[error("no sketch object files found in {}", dir.display())]
    EmptyBuildOutput { dir: PathBuf },

    /// The introspection output does not name the target MCU.
    #[error("cannot find \"build.mcu\" in arduino-cli output")]
    McuNotFound,

    /// IO error on a specific file.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The patched sketch could not be put back to its original content.
    #[error("could not restore {}: {source}", path.display())]
    RestoreFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write part of the library package.
    #[error("failed to assemble library at {}: {message}", path.display())]
    Assembly { path: PathBuf, message: String },
}

impl Error {
    /// Attach a path to an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Render the error together with a recovery hint, when one applies.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Self::ToolMissing { tool, .. } => Some(format!(
                "before running this tool be sure to have `{tool}` installed in your $PATH"
            )),
            Self::VersionIncompatible { .. } => {
                Some("upgrade arduino-cli, or point CSLT_ARDUINO_CLI at a newer build".to_string())
            }
            Self::AmbiguousSketch { .. } => Some(
                "use the path of the .ino file containing the setup() and loop() functions"
                    .to_string(),
            ),
            Self::RestoreFailed { path, .. } => Some(format!(
                "{} is still patched, replace `_setup()`/`_loop()` with `setup()`/`loop()` before retrying",
                path.display()
            )),
            _ => None,
        };

        match hint {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}

fn list_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
