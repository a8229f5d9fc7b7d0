//! Resolvers for values only available in the build tool's free-text output.
//!
//! The textual formats are not a stable contract of arduino-cli, so each
//! value is resolved behind [`TextResolver`] and can be swapped out when the
//! tool changes its output.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::extract::extract_object_path;
use crate::output::PlatformInfo;

/// Key in the `--show-properties` output naming the target microcontroller.
pub const MCU_PROPERTY: &str = "build.mcu";

/// Resolve a single value from raw tool output.
pub trait TextResolver {
    /// Resolved value.
    type Output;

    /// Scan `text` and return the value, or fail if it is absent.
    fn resolve(&self, text: &str) -> Result<Self::Output>;
}

/// Resolves `build.mcu` from `key=value` property lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct McuResolver;

impl TextResolver for McuResolver {
    type Output = String;

    fn resolve(&self, text: &str) -> Result<String> {
        text.lines()
            .filter_map(|line| line.split_once('='))
            .find(|(key, _)| key.trim() == MCU_PROPERTY)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or(Error::McuNotFound)
    }
}

/// Resolves the build directory from the verbose compiler log.
///
/// The sketch unit is compiled to `<build>/sketch/<name>.ino.cpp.o`, so the
/// build directory is two levels above the extracted object file.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuildPathResolver;

impl TextResolver for BuildPathResolver {
    type Output = PathBuf;

    fn resolve(&self, text: &str) -> Result<PathBuf> {
        text.lines()
            .filter_map(extract_object_path)
            .find_map(|object| Path::new(object).parent()?.parent().map(Path::to_path_buf))
            .ok_or_else(|| {
                Error::MalformedOutput(
                    "build path missing and no sketch object file in compiler output".to_string(),
                )
            })
    }
}

/// Resolves the core platform from the `Using core` line of the verbose log.
///
/// ```text
/// Using core 'arduino' from platform in folder: /home/u/.arduino15/packages/arduino/hardware/samd/1.8.12
/// ```
///
/// yields `{ id: "arduino:samd", version: "1.8.12" }`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CorePlatformResolver;

const USING_CORE: &str = "Using core";
const PLATFORM_FOLDER: &str = "from platform in folder:";

impl TextResolver for CorePlatformResolver {
    type Output = PlatformInfo;

    fn resolve(&self, text: &str) -> Result<PlatformInfo> {
        let folder = text
            .lines()
            .filter(|line| line.contains(USING_CORE))
            .find_map(|line| line.split_once(PLATFORM_FOLDER))
            .map(|(_, folder)| folder.trim().trim_matches('"'))
            .ok_or_else(|| {
                Error::MalformedOutput("build platform missing from compile output".to_string())
            })?;

        platform_from_folder(Path::new(folder)).ok_or_else(|| {
            Error::MalformedOutput(format!("unrecognized platform folder: {folder}"))
        })
    }
}

/// Map `.../<vendor>/hardware/<arch>/<version>` to a platform.
fn platform_from_folder(folder: &Path) -> Option<PlatformInfo> {
    let parts: Vec<&str> = folder
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    let hardware = parts.iter().rposition(|part| *part == "hardware")?;
    let vendor = parts.get(hardware.checked_sub(1)?)?;
    let arch = parts.get(hardware + 1)?;
    let version = parts.get(hardware + 2)?;

    Some(PlatformInfo {
        id: format!("{vendor}:{arch}"),
        version: (*version).to_string(),
    })
}
