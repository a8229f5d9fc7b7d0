//! Sketch patching and the synthetic substitute entry file.
//!
//! The sketch's `setup()` and `loop()` are renamed to `_setup()` and
//! `_loop()` for the duration of the compile. A generated `main.cpp` next to
//! the sketch provides the real entry points and forwards to the renamed
//! ones, so the compiled sketch can later be linked as a library behind a
//! different entry stub.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File name of the synthetic substitute translation unit.
pub const SUBSTITUTE_FILE_NAME: &str = "main.cpp";

/// Renamed entry points, as they appear after patching.
pub const RENAMED_SETUP: &str = "_setup()";
pub const RENAMED_LOOP: &str = "_loop()";

/// Declaration rewrites applied to the sketch. Exact, case- and
/// whitespace-sensitive matches.
const REWRITES: [(&str, &str); 2] = [
    ("void setup()", "void _setup()"),
    ("void loop()", "void _loop()"),
];

const SUBSTITUTE_SOURCE: &str = r#"#include "Arduino.h"
void _setup();
void _loop();

void setup() {
_setup();
}

void loop() {
_loop();
}
"#;

/// Original content of a patched sketch, owned until it is restored.
#[derive(Debug)]
#[must_use = "a patched sketch must be restored"]
pub struct SketchPatch {
    path: PathBuf,
    original: Vec<u8>,
}

impl SketchPatch {
    /// Path of the patched sketch.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content of the sketch before patching.
    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// Overwrite the sketch with its original content.
    ///
    /// Runs regardless of what the file currently holds.
    pub fn restore(self) -> Result<()> {
        if let Err(source) = fs::write(&self.path, &self.original) {
            return Err(Error::RestoreFailed {
                path: self.path,
                source,
            });
        }
        tracing::info!("restored {}", self.path.display());
        Ok(())
    }
}

/// Renames the sketch entry points in place.
pub struct SketchPatcher;

impl SketchPatcher {
    /// Rename `setup()`/`loop()` in the sketch at `path`.
    ///
    /// If the sketch already contains the renamed identifiers it is left
    /// untouched and its current content is recorded as the original.
    pub fn patch(path: &Path) -> Result<SketchPatch> {
        let original = fs::read(path).map_err(|e| Error::io(path, e))?;

        if is_patched(&original) {
            tracing::warn!("already patched {}, skipping", path.display());
        } else {
            let patched = REWRITES
                .iter()
                .fold(original.clone(), |content, (from, to)| {
                    replace_all(&content, from.as_bytes(), to.as_bytes())
                });
            fs::write(path, patched).map_err(|e| Error::io(path, e))?;
            tracing::info!("replaced setup() and loop() functions in {}", path.display());
        }

        Ok(SketchPatch {
            path: path.to_path_buf(),
            original,
        })
    }
}

fn is_patched(content: &[u8]) -> bool {
    contains(content, RENAMED_SETUP.as_bytes()) || contains(content, RENAMED_LOOP.as_bytes())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Replace every non-overlapping occurrence of `from` with `to`.
fn replace_all(haystack: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while !rest.is_empty() {
        if rest.starts_with(from) {
            out.extend_from_slice(to);
            rest = &rest[from.len()..];
        } else {
            out.push(rest[0]);
            rest = &rest[1..];
        }
    }
    out
}

/// The generated `main.cpp` placed next to the sketch for one compile.
#[derive(Debug)]
pub struct SubstituteFile {
    path: PathBuf,
}

impl SubstituteFile {
    /// Write the substitute file into `sketch_dir`.
    ///
    /// An existing file of the same name belongs to the sketch and is never
    /// overwritten.
    pub fn create(sketch_dir: &Path) -> Result<Self> {
        let path = sketch_dir.join(SUBSTITUTE_FILE_NAME);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::InputInvalid(format!(
                    "{} already exists; rename it, the build needs that name for the generated entry point",
                    path.display()
                )),
                _ => Error::io(&path, e),
            })?;
        file.write_all(SUBSTITUTE_SOURCE.as_bytes())
            .map_err(|e| Error::io(&path, e))?;
        tracing::info!("created {}", path.display());
        Ok(Self { path })
    }

    /// Path of the substitute file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the substitute file. Failure is logged, not returned.
    pub fn remove(self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::info!("removed {}", self.path.display()),
            Err(e) => tracing::warn!("could not remove {}: {}", self.path.display(), e),
        }
    }
}
