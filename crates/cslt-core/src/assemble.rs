//! Precompiled library assembly.
//!
//! Produces the following layout under the output root:
//!
//! ```text
//! sketch-dist/
//! ├── README.md               # how to rebuild against the library
//! ├── libblink/
//! │   ├── extras/result.json  # core and library manifest
//! │   ├── library.properties
//! │   └── src/
//! │       ├── cortex-m0plus/
//! │       │   └── libblink.a
//! │       └── libblink.h
//! └── blink/
//!     └── blink.ino           # relinkable entry stub
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::error::{Error, Result};
use crate::output::{CompileResult, is_substitute_unit};
use crate::toolchain::Archiver;

/// Paths written by [`LibraryAssembler::assemble`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPackageLayout {
    pub root: PathBuf,
    pub library_dir: PathBuf,
    pub properties: PathBuf,
    pub mcu_dir: PathBuf,
    pub header: PathBuf,
    pub archive: PathBuf,
    pub extras_dir: PathBuf,
    pub manifest: PathBuf,
    pub sketch_dir: PathBuf,
    pub sketch: PathBuf,
    pub readme: PathBuf,
}

impl LibraryPackageLayout {
    /// Compute the layout for library `name` targeting `mcu` under `root`.
    pub fn new(root: &Path, name: &str, mcu: &str) -> Self {
        let lib_name = format!("lib{name}");
        let library_dir = root.join(&lib_name);
        let src_dir = library_dir.join("src");
        let mcu_dir = src_dir.join(mcu);
        let extras_dir = library_dir.join("extras");
        let sketch_dir = root.join(name);

        Self {
            root: root.to_path_buf(),
            properties: library_dir.join("library.properties"),
            header: src_dir.join(format!("{lib_name}.h")),
            archive: mcu_dir.join(format!("{lib_name}.a")),
            manifest: extras_dir.join("result.json"),
            sketch: sketch_dir.join(format!("{name}.ino")),
            readme: root.join("README.md"),
            library_dir,
            mcu_dir,
            extras_dir,
            sketch_dir,
        }
    }
}

/// Builds the precompiled library package from a compile result.
///
/// The assembler owns its output root: any previous content is destroyed.
/// Two assemblies targeting the same root must not run concurrently.
pub struct LibraryAssembler<A> {
    root: PathBuf,
    producer: String,
    archiver: A,
}

impl<A: Archiver> LibraryAssembler<A> {
    /// Create an assembler writing to `root`.
    ///
    /// `producer` is named in the library metadata as the generating tool.
    pub fn new(root: impl Into<PathBuf>, producer: impl Into<String>, archiver: A) -> Self {
        Self {
            root: root.into(),
            producer: producer.into(),
            archiver,
        }
    }

    /// Write the package for sketch `name` compiled for `fqbn`.
    ///
    /// Each step is fatal on error; a partially written package is left in
    /// place.
    pub fn assemble(
        &self,
        name: &str,
        fqbn: &str,
        result: &CompileResult,
    ) -> Result<LibraryPackageLayout> {
        let layout = LibraryPackageLayout::new(&self.root, name, &result.build_mcu);

        recreate_dir(&layout.root)?;
        for dir in [&layout.mcu_dir, &layout.extras_dir, &layout.sketch_dir] {
            fs::create_dir_all(dir).map_err(|e| assembly_io(dir, e))?;
        }

        write_file(&layout.properties, &library_properties(name, &self.producer))?;
        write_file(&layout.header, &library_header(result))?;
        write_file(&layout.sketch, &sketch_stub(name))?;
        write_file(&layout.readme, &readme(&layout, fqbn, result))?;
        self.create_archive(&layout.archive, &result.object_files)?;

        let manifest = manifest_json(result).map_err(|e| {
            Error::Assembly {
                path: layout.manifest.clone(),
                message: format!("error serializing json: {e}"),
            }
        })?;
        write_file(&layout.manifest, &manifest)?;

        Ok(layout)
    }

    fn create_archive(&self, archive: &Path, objects: &[PathBuf]) -> Result<()> {
        let objects: Vec<PathBuf> = objects
            .iter()
            .filter(|object| !is_substitute_unit(object))
            .cloned()
            .collect();

        if objects.is_empty() {
            return Err(Error::Assembly {
                path: archive.to_path_buf(),
                message: "no object files to archive".to_string(),
            });
        }

        let output = self
            .archiver
            .archive(archive, &objects)
            .map_err(|e| Error::Assembly {
                path: archive.to_path_buf(),
                message: e.to_string(),
            })?;

        if output.trim().is_empty() {
            tracing::info!("created {}", archive.display());
        } else {
            tracing::info!("{}", output.trim_end());
        }
        Ok(())
    }
}

/// Manifest document, indented by one space per level.
fn manifest_json(result: &CompileResult) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b" "));
    result.manifest().serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn assembly_io(path: &Path, e: std::io::Error) -> Error {
    Error::Assembly {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| assembly_io(dir, e))?;
        tracing::warn!("removed {}", dir.display());
    }
    fs::create_dir_all(dir).map_err(|e| assembly_io(dir, e))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| assembly_io(path, e))?;
    tracing::info!("created {}", path.display());
    Ok(())
}

fn library_properties(name: &str, producer: &str) -> String {
    format!(
        "name={name}\n\
         author=TODO\n\
         maintainer=TODO\n\
         sentence=This technically is not a library but a precompiled sketch. The result is produced using {producer}\n\
         paragraph=\n\
         url=https://github.com/arduino/arduino-cslt\n\
         version=1.0.0\n\
         precompiled=true\n"
    )
}

/// Includes of every used library, in reporting order and without
/// deduplication, followed by the renamed entry points.
fn library_header(result: &CompileResult) -> String {
    let includes: Vec<String> = result
        .used_libraries
        .iter()
        .flat_map(|lib| lib.provided_includes.iter())
        .map(|include| format!("#include \"{include}\""))
        .collect();

    format!("{}\nvoid _setup();\nvoid _loop();\n", includes.join("\n"))
}

fn sketch_stub(name: &str) -> String {
    format!(
        "#include <lib{name}.h>\n\
         void setup() {{\n  _setup();\n}}\n\
         void loop() {{\n  _loop();\n}}\n"
    )
}

/// Path of `path` relative to the directory holding the package root.
fn display_relative(layout: &LibraryPackageLayout, path: &Path) -> String {
    let base = layout.root.parent().unwrap_or(Path::new(""));
    path.strip_prefix(base).unwrap_or(path).display().to_string()
}

fn readme(layout: &LibraryPackageLayout, fqbn: &str, result: &CompileResult) -> String {
    let core = &result.core_platform;
    let mut install = vec![format!(
        "`arduino-cli core install {}@{}`",
        core.id, core.version
    )];

    if !result.used_libraries.is_empty() {
        let libs: Vec<String> = result
            .used_libraries
            .iter()
            .map(|lib| format!("{}@{}", lib.name, lib.version))
            .collect();
        install.push(format!("`arduino-cli lib install {}`", libs.join(" ")));
    }

    let compile = format!(
        "`arduino-cli compile -b {} {} --library {}`",
        fqbn,
        display_relative(layout, &layout.sketch),
        display_relative(layout, &layout.library_dir)
    );

    format!(
        "This package contains firmware code loaded in your product.\n\
         The firmware contains additional code licensed with LGPL clause; in order to re-compile the entire firmware bundle, please execute the following.\n\
         \n\
         ## Install core and libraries\n\
         {}\n\
         \n\
         ## Compile\n\
         {}\n",
        install.join("\n"),
        compile
    )
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::output::{LibraryInfo, PlatformInfo};
    use tempfile::TempDir;

    /// Archiver that concatenates object names into the archive file.
    #[derive(Default)]
    struct RecordingArchiver {
        calls: RefCell<Vec<Vec<PathBuf>>>,
    }

    impl Archiver for &RecordingArchiver {
        fn archive(&self, archive: &Path, objects: &[PathBuf]) -> Result<String> {
            self.calls.borrow_mut().push(objects.to_vec());
            let listing: Vec<String> = objects.iter().map(|o| o.display().to_string()).collect();
            fs::write(archive, listing.join("\n")).map_err(|e| Error::io(archive, e))?;
            Ok(String::new())
        }
    }

    /// Archiver that reports progress on its output, like `ar` creating a new archive.
    struct ChattyArchiver;

    impl Archiver for ChattyArchiver {
        fn archive(&self, archive: &Path, _objects: &[PathBuf]) -> Result<String> {
            fs::write(archive, "!<arch>\n").map_err(|e| Error::io(archive, e))?;
            Ok(format!("ar: creating {}\n", archive.display()))
        }
    }

    struct FailingArchiver;

    impl Archiver for FailingArchiver {
        fn archive(&self, _archive: &Path, _objects: &[PathBuf]) -> Result<String> {
            Err(Error::ToolFailed {
                command: "gcc-ar rcs".to_string(),
                message: "plugin needed to handle lto object".to_string(),
            })
        }
    }

    fn compile_result(libraries: Vec<LibraryInfo>) -> CompileResult {
        CompileResult {
            success: true,
            compiler_error: String::new(),
            object_files: vec![
                PathBuf::from("/tmp/b/sketch/blink.ino.cpp.o"),
                PathBuf::from("/tmp/b/sketch/main.cpp.o"),
                PathBuf::from("/tmp/b/sketch/helper.cpp.o"),
            ],
            core_platform: PlatformInfo {
                id: "arduino:samd".to_string(),
                version: "1.8.12".to_string(),
            },
            used_libraries: libraries,
            build_mcu: "cortex-m0plus".to_string(),
        }
    }

    fn mkrwan() -> LibraryInfo {
        LibraryInfo {
            name: "MKRWAN".to_string(),
            version: "1.2.0".to_string(),
            provided_includes: vec!["MKRWAN.h".to_string()],
        }
    }

    #[test]
    fn test_layout_paths() {
        let layout = LibraryPackageLayout::new(Path::new("out/sketch-dist"), "blink", "atmega328p");
        assert_eq!(layout.properties, Path::new("out/sketch-dist/libblink/library.properties"));
        assert_eq!(layout.header, Path::new("out/sketch-dist/libblink/src/libblink.h"));
        assert_eq!(
            layout.archive,
            Path::new("out/sketch-dist/libblink/src/atmega328p/libblink.a")
        );
        assert_eq!(layout.manifest, Path::new("out/sketch-dist/libblink/extras/result.json"));
        assert_eq!(layout.sketch, Path::new("out/sketch-dist/blink/blink.ino"));
        assert_eq!(layout.readme, Path::new("out/sketch-dist/README.md"));
    }

    #[test]
    fn test_assemble_writes_package() {
        let temp = TempDir::new().unwrap();
        let archiver = RecordingArchiver::default();
        let assembler = LibraryAssembler::new(temp.path().join("sketch-dist"), "cslt", &archiver);

        let layout = assembler
            .assemble("blink", "arduino:samd:mkrwan1310", &compile_result(vec![mkrwan()]))
            .unwrap();

        let header = fs::read_to_string(&layout.header).unwrap();
        assert!(header.starts_with("#include \"MKRWAN.h\"\nvoid _setup();\nvoid _loop();"));

        let properties = fs::read_to_string(&layout.properties).unwrap();
        assert!(properties.starts_with("name=blink\n"));
        assert!(properties.contains("produced using cslt"));
        assert!(properties.contains("precompiled=true"));

        let stub = fs::read_to_string(&layout.sketch).unwrap();
        assert!(stub.starts_with("#include <libblink.h>\n"));
        assert!(stub.contains("void setup() {\n  _setup();\n}"));

        let readme = fs::read_to_string(&layout.readme).unwrap();
        assert!(readme.contains("`arduino-cli core install arduino:samd@1.8.12`"));
        assert!(readme.contains("`arduino-cli lib install MKRWAN@1.2.0`"));
        assert!(readme.contains(
            "`arduino-cli compile -b arduino:samd:mkrwan1310 sketch-dist/blink/blink.ino --library sketch-dist/libblink`"
        ));

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&layout.manifest).unwrap()).unwrap();
        assert_eq!(manifest["coreInfo"]["version"], "1.8.12");
        assert_eq!(manifest["libsInfo"][0]["name"], "MKRWAN");

        assert!(layout.archive.exists());
        let calls = archiver.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].iter().all(|o| !o.ends_with("main.cpp.o")));
        assert_eq!(calls[0].len(), 2);
    }

    #[test]
    fn test_header_keeps_order_and_duplicates() {
        let wire = LibraryInfo {
            name: "Wire".to_string(),
            version: "1.0".to_string(),
            provided_includes: vec!["Wire.h".to_string(), "MKRWAN.h".to_string()],
        };
        let no_headers = LibraryInfo {
            name: "Empty".to_string(),
            version: "0.1.0".to_string(),
            provided_includes: vec![],
        };

        let header = library_header(&compile_result(vec![mkrwan(), no_headers, wire]));
        assert_eq!(
            header,
            "#include \"MKRWAN.h\"\n#include \"Wire.h\"\n#include \"MKRWAN.h\"\nvoid _setup();\nvoid _loop();\n"
        );
    }

    #[test]
    fn test_readme_without_libraries() {
        let layout = LibraryPackageLayout::new(Path::new("/work/sketch-dist"), "blink", "avr");
        let readme = readme(&layout, "arduino:avr:uno", &compile_result(vec![]));
        assert!(!readme.contains("lib install"));
        assert!(readme.contains("`arduino-cli compile -b arduino:avr:uno sketch-dist/blink/blink.ino --library sketch-dist/libblink`"));
    }

    #[test]
    fn test_assemble_is_deterministic_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("sketch-dist");
        let archiver = RecordingArchiver::default();
        let assembler = LibraryAssembler::new(&root, "cslt", &archiver);
        let result = compile_result(vec![mkrwan()]);

        let first = assembler.assemble("blink", "arduino:samd:mkrwan1310", &result).unwrap();
        let snapshot: Vec<Vec<u8>> = [&first.properties, &first.header, &first.manifest, &first.sketch, &first.readme]
            .iter()
            .map(|p| fs::read(p).unwrap())
            .collect();

        let stale = root.join("stale.txt");
        fs::write(&stale, "left over").unwrap();

        let second = assembler.assemble("blink", "arduino:samd:mkrwan1310", &result).unwrap();
        assert_eq!(first, second);
        assert!(!stale.exists());

        let again: Vec<Vec<u8>> = [&second.properties, &second.header, &second.manifest, &second.sketch, &second.readme]
            .iter()
            .map(|p| fs::read(p).unwrap())
            .collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn test_manifest_uses_single_space_indent() {
        let temp = TempDir::new().unwrap();
        let archiver = RecordingArchiver::default();
        let assembler = LibraryAssembler::new(temp.path().join("sketch-dist"), "cslt", &archiver);

        let layout = assembler
            .assemble("blink", "arduino:samd:mkrwan1310", &compile_result(vec![mkrwan()]))
            .unwrap();

        let manifest = fs::read_to_string(&layout.manifest).unwrap();
        assert_eq!(
            manifest,
            "{\n \"coreInfo\": {\n  \"id\": \"arduino:samd\",\n  \"version\": \"1.8.12\"\n },\n \"libsInfo\": [\n  {\n   \"name\": \"MKRWAN\",\n   \"version\": \"1.2.0\",\n   \"provides_includes\": [\n    \"MKRWAN.h\"\n   ]\n  }\n ]\n}"
        );
    }

    #[test]
    fn test_archiver_output_does_not_fail_assembly() {
        let temp = TempDir::new().unwrap();
        let assembler = LibraryAssembler::new(temp.path().join("sketch-dist"), "cslt", ChattyArchiver);

        let layout = assembler
            .assemble("blink", "arduino:samd:mkrwan1310", &compile_result(vec![]))
            .unwrap();

        assert_eq!(fs::read_to_string(&layout.archive).unwrap(), "!<arch>\n");
        assert!(layout.manifest.exists());
    }

    #[test]
    fn test_archiver_failure_is_assembly_error() {
        let temp = TempDir::new().unwrap();
        let assembler = LibraryAssembler::new(temp.path().join("sketch-dist"), "cslt", FailingArchiver);

        let err = assembler
            .assemble("blink", "arduino:samd:mkrwan1310", &compile_result(vec![]))
            .unwrap_err();
        match err {
            Error::Assembly { path, message } => {
                assert!(path.ends_with("libblink.a"));
                assert!(message.contains("plugin needed"));
            }
            other => panic!("expected Assembly, got {other:?}"),
        }
    }
}
