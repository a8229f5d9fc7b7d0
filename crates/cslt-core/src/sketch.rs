//! Locating the sketch entry file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Extension of Arduino sketch files.
pub const SKETCH_EXTENSION: &str = "ino";

/// Resolve the `.ino` file holding `setup()` and `loop()`.
///
/// `path` is either the `.ino` file itself or a sketch directory containing
/// exactly one `.ino` file.
pub fn locate_entry_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(Error::InputInvalid(format!(
            "the path {} does not exist",
            path.display()
        )));
    }

    let ino = if has_sketch_extension(path) {
        path.to_path_buf()
    } else {
        let entries = fs::read_dir(path).map_err(|e| Error::io(path, e))?;
        let mut candidates = Vec::new();
        for entry in entries {
            let candidate = entry.map_err(|e| Error::io(path, e))?.path();
            if candidate.is_file() && has_sketch_extension(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates.sort();

        match candidates.len() {
            0 => {
                return Err(Error::InputInvalid(format!(
                    "{} does not contain an .ino file",
                    path.display()
                )));
            }
            1 => candidates.remove(0),
            _ => {
                return Err(Error::AmbiguousSketch {
                    dir: path.to_path_buf(),
                    candidates,
                });
            }
        }
    };

    tracing::info!("the ino file path is {}", ino.display());
    Ok(ino)
}

/// Library name derived from the sketch file, e.g. `blink` for `blink.ino`.
pub fn sketch_name(ino: &Path) -> Result<String> {
    ino.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::InputInvalid(format!("cannot derive a sketch name from {}", ino.display()))
        })
}

fn has_sketch_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SKETCH_EXTENSION)
}
