//! External tool invocation.
//!
//! Wraps the compile tool (`arduino-cli`) and the archiver (`gcc-ar`). Every
//! invocation is synchronous and captures its output in full.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use semver::Version;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Find an executable by name in PATH, or accept an explicit path.
fn locate(tool: &str) -> Result<PathBuf> {
    which::which(tool).map_err(|e| Error::ToolMissing {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Render a command line for logs and error messages.
fn command_line<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

/// Run `program` to completion, capturing stdout and stderr.
fn run<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> Result<(String, Output)> {
    let line = command_line(program, args);
    tracing::info!("running: {}", line);

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::ToolFailed {
            command: line.clone(),
            message: e.to_string(),
        })?;

    Ok((line, output))
}

fn failure(command: String, output: &Output) -> Error {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = if stderr.trim().is_empty() { stdout } else { stderr };
    Error::ToolFailed {
        command,
        message: format!("{} ({})", detail.trim(), output.status),
    }
}

/// `arduino-cli version --format json` output.
#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "VersionString")]
    version_string: String,
}

/// The arduino-cli compile tool.
#[derive(Debug, Clone)]
pub struct ArduinoCli {
    path: PathBuf,
}

impl ArduinoCli {
    /// Locate the compile tool.
    pub fn locate(tool: &str) -> Result<Self> {
        Ok(Self {
            path: locate(tool)?,
        })
    }

    /// Query the installed version string.
    pub fn version(&self) -> Result<String> {
        let (line, output) = run(&self.path, &["version", "--format", "json"])?;
        if !output.status.success() {
            return Err(failure(line, &output));
        }

        let info: VersionInfo = serde_json::from_slice(&output.stdout).map_err(|e| {
            Error::MalformedOutput(format!("cannot read version from `{line}`: {e}"))
        })?;
        Ok(info.version_string)
    }

    /// Compile the sketch with verbose, structured output.
    ///
    /// Returns the raw JSON result. A failing compile still prints a JSON
    /// result naming the error, so a non-zero exit is only treated as a tool
    /// failure when nothing was printed.
    pub fn compile(&self, fqbn: &str, ino: &Path) -> Result<Vec<u8>> {
        let args = [
            OsStr::new("compile"),
            OsStr::new("-b"),
            OsStr::new(fqbn),
            ino.as_os_str(),
            OsStr::new("-v"),
            OsStr::new("--format"),
            OsStr::new("json"),
        ];
        let (line, output) = run(&self.path, &args)?;

        if !output.status.success() && output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(failure(line, &output));
        }
        Ok(output.stdout)
    }

    /// Print the board properties for the sketch without compiling.
    ///
    /// JSON output is unreliable with `--show-properties` on some tool
    /// versions (arduino/arduino-cli#1628), so the text form is used.
    pub fn show_properties(&self, fqbn: &str, ino: &Path) -> Result<String> {
        let args = [
            OsStr::new("compile"),
            OsStr::new("-b"),
            OsStr::new(fqbn),
            ino.as_os_str(),
            OsStr::new("--show-properties"),
        ];
        let (line, output) = run(&self.path, &args)?;
        if !output.status.success() {
            return Err(failure(line, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Reject compile tool versions at or below `incompatible`.
///
/// The default threshold is [`crate::config::INCOMPATIBLE_CLI_VERSION`].
/// Version strings that are not semver (`git-snapshot`, `nightly-<date>`,
/// `test-<hash>-git-snapshot`) come from non-stable builds and skip the check.
pub fn check_cli_version(version: &str, incompatible: &Version) -> Result<()> {
    tracing::info!("arduino-cli version: {}", version);

    let Ok(found) = Version::parse(version.trim()) else {
        tracing::debug!("non-stable arduino-cli build {}, skipping version check", version);
        return Ok(());
    };

    if found <= *incompatible {
        return Err(Error::VersionIncompatible {
            found: found.to_string(),
            minimum: incompatible.to_string(),
        });
    }
    Ok(())
}

/// Combines object files into a static archive.
pub trait Archiver {
    /// Create `archive` from `objects`, returning the tool's captured output.
    fn archive(&self, archive: &Path, objects: &[PathBuf]) -> Result<String>;
}

/// The `gcc-ar` archiver.
#[derive(Debug, Clone)]
pub struct GccAr {
    path: PathBuf,
}

impl GccAr {
    /// Locate the archiver.
    pub fn locate(tool: &str) -> Result<Self> {
        Ok(Self {
            path: locate(tool)?,
        })
    }

    /// First line of `gcc-ar --version`.
    pub fn version_line(&self) -> Result<String> {
        let (line, output) = run(&self.path, &["--version"])?;
        if !output.status.success() {
            return Err(failure(line, &output));
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined.lines().next().unwrap_or_default().to_string())
    }
}

impl Archiver for GccAr {
    fn archive(&self, archive: &Path, objects: &[PathBuf]) -> Result<String> {
        let mut args = vec![OsStr::new("rcs"), archive.as_os_str()];
        args.extend(objects.iter().map(|o| o.as_os_str()));

        let (line, output) = run(&self.path, &args)?;
        if !output.status.success() {
            return Err(failure(line, &output));
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }
}
