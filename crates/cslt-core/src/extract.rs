//! Object file path extraction from compiler invocation lines.
//!
//! The verbose build log contains lines such as
//!
//! ```text
//! arm-none-eabi-g++ -c ... "/tmp/build/sketch/my sketch.ino.cpp" -o "/tmp/build/sketch/my sketch.ino.cpp.o"
//! ```
//!
//! Paths may be bare, quoted with interior spaces, or quoted with escaped
//! quotes inside. Splitting on whitespace or matching with a regex gets one of
//! those wrong, so the path is recovered by scanning for matching boundaries.

/// Suffix of the object file compiled from the sketch's primary `.ino` file.
pub const SKETCH_OBJECT_SUFFIX: &str = ".ino.cpp.o";

/// Extract the sketch object file path from one compiler invocation line.
///
/// The character following the suffix (or a space at end of line) is the
/// closing boundary. The opening boundary is the nearest earlier occurrence of
/// the same character that is not escaped with a backslash. A bare path at the
/// very start of the line has no opening boundary and starts at offset 0.
///
/// Returns `None` when the line holds no sketch object file.
pub fn extract_object_path(line: &str) -> Option<&str> {
    let suffix_start = line.find(SKETCH_OBJECT_SUFFIX)?;
    let end = suffix_start + SKETCH_OBJECT_SUFFIX.len();
    let boundary = line[end..].chars().next().unwrap_or(' ');

    let mut search_end = suffix_start;
    let start = loop {
        match line[..search_end].rfind(boundary) {
            Some(pos) if line[..pos].ends_with('\\') => search_end = pos,
            Some(pos) => break pos + boundary.len_utf8(),
            None => break 0,
        }
    };

    Some(&line[start..end])
}
