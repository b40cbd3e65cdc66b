//! File-format detection.
//!
//! Formats are identified by file extension only; no file content is
//! inspected. Everything here is a pure function over a closed enum, so
//! the lookup is safely callable from any thread.

use std::fmt;
use std::path::Path;

/// The file formats the built-in readers understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// ASCII STL (`.stl`).
    Stl,
    /// Wavefront OBJ (`.obj`).
    Obj,
    /// ASCII PLY (`.ply`).
    Ply,
    /// Anything else. No built-in reader accepts this.
    Unknown,
}

impl FileFormat {
    /// Map a file extension (without the dot, case-insensitive) to a format.
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "stl" => Self::Stl,
            "obj" => Self::Obj,
            "ply" => Self::Ply,
            _ => Self::Unknown,
        }
    }

    /// Detect the format from a file path's extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|extension| extension.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// The canonical extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Stl => "stl",
            Self::Obj => "obj",
            Self::Ply => "ply",
            Self::Unknown => "",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stl => "STL",
            Self::Obj => "OBJ",
            Self::Ply => "PLY",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_case_insensitive() {
        assert_eq!(FileFormat::from_extension("stl"), FileFormat::Stl);
        assert_eq!(FileFormat::from_extension("STL"), FileFormat::Stl);
        assert_eq!(FileFormat::from_extension("Obj"), FileFormat::Obj);
        assert_eq!(FileFormat::from_extension("PLY"), FileFormat::Ply);
        assert_eq!(FileFormat::from_extension("step"), FileFormat::Unknown);
    }

    #[test]
    fn from_path_uses_the_extension() {
        assert_eq!(FileFormat::from_path("models/cube.stl"), FileFormat::Stl);
        assert_eq!(FileFormat::from_path("models/cube.tar.OBJ"), FileFormat::Obj);
        assert_eq!(FileFormat::from_path("models/cube"), FileFormat::Unknown);
        assert_eq!(FileFormat::from_path("models/cube.dae"), FileFormat::Unknown);
    }

    #[test]
    fn canonical_extension_round_trips() {
        for format in [FileFormat::Stl, FileFormat::Obj, FileFormat::Ply] {
            assert_eq!(FileFormat::from_extension(format.extension()), format);
        }
    }
}
