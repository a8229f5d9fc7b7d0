//! Decoding of the build tool's structured compile result.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::patch::SUBSTITUTE_FILE_NAME;
use crate::resolve::{BuildPathResolver, CorePlatformResolver, McuResolver, TextResolver};

/// Extension of compiled object files.
pub const OBJECT_EXTENSION: &str = "o";

/// Hardware-support package used for the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub id: String,
    pub version: String,
}

/// Library linked into the sketch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub name: String,
    pub version: String,

    /// Headers the library makes available, in the tool's reporting order
    #[serde(
        rename = "provides_includes",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub provided_includes: Vec<String>,
}

/// Normalized result of one successful compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileResult {
    pub success: bool,
    pub compiler_error: String,

    /// Link-ready sketch object files, never empty
    pub object_files: Vec<PathBuf>,

    pub core_platform: PlatformInfo,
    pub used_libraries: Vec<LibraryInfo>,

    /// Target microcontroller, e.g. `cortex-m0plus`
    pub build_mcu: String,
}

/// Package manifest written to `extras/result.json`.
#[derive(Debug, Serialize)]
pub struct Manifest<'a> {
    #[serde(rename = "coreInfo")]
    pub core_info: &'a PlatformInfo,

    #[serde(rename = "libsInfo")]
    pub libs_info: &'a [LibraryInfo],
}

impl CompileResult {
    /// Manifest view of the platform and library metadata.
    pub fn manifest(&self) -> Manifest<'_> {
        Manifest {
            core_info: &self.core_platform,
            libs_info: &self.used_libraries,
        }
    }
}

/// `arduino-cli compile --format json` output.
#[derive(Debug, Deserialize)]
struct RawCompileOutput {
    #[serde(default)]
    compiler_out: Option<String>,
    #[serde(default)]
    compiler_err: Option<String>,
    success: bool,
    #[serde(default)]
    builder_result: Option<RawBuilderResult>,
}

#[derive(Debug, Deserialize)]
struct RawBuilderResult {
    #[serde(default)]
    build_path: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    used_libraries: Vec<LibraryInfo>,
    #[serde(default)]
    build_platform: Option<PlatformInfo>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decoded compile output still missing the target MCU.
///
/// The MCU comes from a separate `--show-properties` invocation; call
/// [`BuildOutput::with_mcu_from`] with its output to get a [`CompileResult`].
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub build_path: PathBuf,
    pub object_files: Vec<PathBuf>,
    pub core_platform: PlatformInfo,
    pub used_libraries: Vec<LibraryInfo>,
    compiler_error: String,
}

impl BuildOutput {
    /// Resolve the target MCU from the introspection output.
    pub fn with_mcu_from(self, properties: &str) -> Result<CompileResult> {
        let build_mcu = McuResolver.resolve(properties)?;
        Ok(CompileResult {
            success: true,
            compiler_error: self.compiler_error,
            object_files: self.object_files,
            core_platform: self.core_platform,
            used_libraries: self.used_libraries,
            build_mcu,
        })
    }
}

/// Parser for the build tool's JSON compile result.
pub struct CompileOutputParser;

impl CompileOutputParser {
    /// Decode the compile result and locate the sketch object files on disk.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedOutput`] if the output is not a compile result
    /// - [`Error::CompileFailed`] if the tool reports an unsuccessful compile
    /// - [`Error::EmptyBuildOutput`] if no sketch object files exist
    pub fn parse(raw_output: &[u8]) -> Result<BuildOutput> {
        let decoded: RawCompileOutput = serde_json::from_slice(raw_output)
            .map_err(|e| Error::MalformedOutput(e.to_string()))?;

        let compiler_error = decoded.compiler_err.unwrap_or_default();
        if !decoded.success {
            return Err(Error::CompileFailed {
                message: compiler_error,
            });
        }

        let compiler_out = decoded.compiler_out.unwrap_or_default();
        let builder = decoded.builder_result.ok_or_else(|| {
            Error::MalformedOutput("builder_result missing from compile output".to_string())
        })?;

        let build_path = match builder.build_path.filter(|p| !p.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => {
                tracing::debug!("build_path not reported, scanning compiler output");
                BuildPathResolver.resolve(&compiler_out)?
            }
        };

        let core_platform = match builder.build_platform {
            Some(platform) => platform,
            None => {
                tracing::debug!("build_platform not reported, scanning compiler output");
                CorePlatformResolver.resolve(&compiler_out)?
            }
        };

        let object_files = sketch_object_files(&build_path.join("sketch"))?;

        Ok(BuildOutput {
            build_path,
            object_files,
            core_platform,
            used_libraries: builder.used_libraries,
            compiler_error,
        })
    }
}

/// List link-ready object files in the sketch build directory, sorted by name.
///
/// Units compiled from the synthetic substitute file are left out. A missing
/// directory means nothing was compiled there.
fn sketch_object_files(sketch_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(sketch_dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::EmptyBuildOutput {
            dir: sketch_dir.to_path_buf(),
        },
        _ => Error::io(sketch_dir, e),
    })?;

    let mut objects = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(sketch_dir, e))?.path();
        let is_object = path.extension().is_some_and(|ext| ext == OBJECT_EXTENSION);
        if is_object && !is_substitute_unit(&path) {
            objects.push(path);
        }
    }

    if objects.is_empty() {
        return Err(Error::EmptyBuildOutput {
            dir: sketch_dir.to_path_buf(),
        });
    }

    objects.sort();
    Ok(objects)
}

/// Whether `path` was compiled from the synthetic substitute file.
pub fn is_substitute_unit(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(SUBSTITUTE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build_dir_with(files: &[&str]) -> TempDir {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let sketch = temp.path().join("sketch");
        fs::create_dir_all(&sketch).unwrap();
        for file in files {
            fs::write(sketch.join(file), b"\x7fELF").unwrap();
        }
        temp
    }

    fn success_json(build_path: &Path) -> String {
        serde_json::json!({
            "compiler_out": "",
            "compiler_err": "",
            "success": true,
            "builder_result": {
                "build_path": build_path,
                "used_libraries": [
                    { "name": "MKRWAN", "version": "1.2.0", "provides_includes": ["MKRWAN.h"] },
                    { "name": "Wire", "version": "1.0", "provides_includes": null }
                ],
                "build_platform": { "id": "arduino:samd", "version": "1.8.12" }
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_success() {
        let build = build_dir_with(&[
            "blink.ino.cpp.o",
            "blink.ino.cpp.d",
            "helper.cpp.o",
            "main.cpp.o",
            "main.cpp.d",
        ]);

        let output = CompileOutputParser::parse(success_json(build.path()).as_bytes()).unwrap();

        let names: Vec<_> = output
            .object_files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["blink.ino.cpp.o", "helper.cpp.o"]);

        assert_eq!(output.core_platform.id, "arduino:samd");
        assert_eq!(output.used_libraries.len(), 2);
        assert_eq!(output.used_libraries[0].provided_includes, ["MKRWAN.h"]);
        assert!(output.used_libraries[1].provided_includes.is_empty());
    }

    #[test]
    fn test_with_mcu() {
        let build = build_dir_with(&["blink.ino.cpp.o"]);
        let result = CompileOutputParser::parse(success_json(build.path()).as_bytes())
            .unwrap()
            .with_mcu_from("build.mcu=cortex-m0plus\n")
            .unwrap();

        assert!(result.success);
        assert_eq!(result.build_mcu, "cortex-m0plus");
        assert_eq!(result.object_files.len(), 1);
    }

    #[test]
    fn test_compile_failed_carries_message() {
        let json = r#"{"compiler_out":"","compiler_err":"syntax error","success":false,"builder_result":null}"#;
        let err = CompileOutputParser::parse(json.as_bytes()).unwrap_err();
        match err {
            Error::CompileFailed { message } => assert_eq!(message, "syntax error"),
            other => panic!("expected CompileFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_output() {
        let err = CompileOutputParser::parse(b"Error: unknown flag --format").unwrap_err();
        assert!(matches!(err, Error::MalformedOutput(_)));
    }

    #[test]
    fn test_empty_build_output() {
        let build = build_dir_with(&["main.cpp.o", "blink.ino.cpp.d"]);
        let err = CompileOutputParser::parse(success_json(build.path()).as_bytes()).unwrap_err();
        assert!(matches!(err, Error::EmptyBuildOutput { .. }));
    }

    #[test]
    fn test_missing_sketch_dir() {
        let temp = TempDir::new().unwrap();
        let err = CompileOutputParser::parse(success_json(temp.path()).as_bytes()).unwrap_err();
        match err {
            Error::EmptyBuildOutput { dir } => assert_eq!(dir, temp.path().join("sketch")),
            other => panic!("expected EmptyBuildOutput, got {other:?}"),
        }
    }

    #[test]
    fn test_fallbacks_from_compiler_out() {
        let build = build_dir_with(&["blink.ino.cpp.o"]);
        let sketch_dir = build.path().join("sketch");
        let compiler_out = format!(
            "Using core 'arduino' from platform in folder: /home/u/.arduino15/packages/arduino/hardware/avr/1.8.5\n\
             avr-g++ -c \"{dir}/blink.ino.cpp\" -o \"{dir}/blink.ino.cpp.o\"\n",
            dir = sketch_dir.display()
        );
        let json = serde_json::json!({
            "compiler_out": compiler_out,
            "success": true,
            "builder_result": { "used_libraries": null }
        })
        .to_string();

        let output = CompileOutputParser::parse(json.as_bytes()).unwrap();
        assert_eq!(output.build_path, build.path().to_path_buf());
        assert_eq!(output.core_platform.id, "arduino:avr");
        assert_eq!(output.core_platform.version, "1.8.5");
        assert!(output.used_libraries.is_empty());
    }

    #[test]
    fn test_manifest_keys() {
        let result = CompileResult {
            success: true,
            compiler_error: String::new(),
            object_files: vec![PathBuf::from("blink.ino.cpp.o")],
            core_platform: PlatformInfo {
                id: "arduino:samd".to_string(),
                version: "1.8.12".to_string(),
            },
            used_libraries: vec![LibraryInfo {
                name: "MKRWAN".to_string(),
                version: "1.2.0".to_string(),
                provided_includes: vec!["MKRWAN.h".to_string()],
            }],
            build_mcu: "cortex-m0plus".to_string(),
        };

        let value = serde_json::to_value(result.manifest()).unwrap();
        assert_eq!(value["coreInfo"]["id"], "arduino:samd");
        assert_eq!(value["libsInfo"][0]["provides_includes"][0], "MKRWAN.h");
    }
}
