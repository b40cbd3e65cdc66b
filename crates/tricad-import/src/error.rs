//! Error types for mesh import.
//!
//! The taxonomy is closed and every variant is fatal: nothing is caught
//! and retried internally, and a failed read leaves no partial result.
//! Each diagnostic names the component it came from and, where available,
//! the 1-based line number and the file path.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::format::FileFormat;

/// Errors that can occur while reading a mesh file.
#[derive(Error, Debug)]
pub enum ImportError {
    /// The file could not be opened or read.
    #[error("{origin}: the file '{}' could not be read: {source}", path.display())]
    FileNotFound {
        /// Component that attempted the read.
        origin: String,
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The character stream does not match the grammar at the current
    /// position, or a grammar closed a mismatched start/end item pair.
    #[error("{origin} error on line {line}: {message}")]
    Lexer {
        /// Component that raised the diagnostic.
        origin: String,
        /// 1-based line number of the offending construct.
        line: usize,
        /// What was expected at that position.
        message: String,
    },

    /// The token tree lexed cleanly but is semantically invalid: wrong
    /// child counts, counts that contradict a declared header, or indices
    /// that resolve to nothing.
    #[error("{origin} error{}: {message}", line.map(|l| format!(" on line {l}")).unwrap_or_default())]
    Parser {
        /// Component that raised the diagnostic.
        origin: String,
        /// 1-based line number, when one is attributable.
        line: Option<usize>,
        /// What was invalid.
        message: String,
    },

    /// A reader was asked to read a format it does not support.
    #[error("{origin}: cannot read {format} files: '{}'", path.display())]
    ReaderCantRead {
        /// Component that was asked.
        origin: String,
        /// The unsupported format.
        format: FileFormat,
        /// The file that was offered.
        path: PathBuf,
    },

    /// A mesh lookup by index or name found nothing.
    #[error("{origin}: no mesh found for {query}")]
    MeshNotFound {
        /// Component that performed the lookup.
        origin: String,
        /// The index or name that was looked up.
        query: String,
    },
}

impl ImportError {
    /// Create a file-read error.
    pub fn file_not_found(
        origin: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::FileNotFound {
            origin: origin.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a lexer error.
    pub fn lexer(origin: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Lexer {
            origin: origin.into(),
            line,
            message: message.into(),
        }
    }

    /// Create a parser error.
    pub fn parser(
        origin: impl Into<String>,
        line: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self::Parser {
            origin: origin.into(),
            line,
            message: message.into(),
        }
    }

    /// Create an unsupported-format error.
    pub fn reader_cant_read(
        origin: impl Into<String>,
        format: FileFormat,
        path: impl AsRef<Path>,
    ) -> Self {
        Self::ReaderCantRead {
            origin: origin.into(),
            format,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a failed-lookup error.
    pub fn mesh_not_found(origin: impl Into<String>, query: impl Into<String>) -> Self {
        Self::MeshNotFound {
            origin: origin.into(),
            query: query.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_origin_and_line() {
        let error = ImportError::lexer("Lexer", 12, "STL files start with 'solid'.");
        assert_eq!(
            error.to_string(),
            "Lexer error on line 12: STL files start with 'solid'."
        );
    }

    #[test]
    fn parser_line_is_optional() {
        let with = ImportError::parser("StlReader", Some(3), "The mesh appears to be empty.");
        assert_eq!(
            with.to_string(),
            "StlReader error on line 3: The mesh appears to be empty."
        );

        let without = ImportError::parser("PlyReader", None, "The header appears to be empty.");
        assert_eq!(
            without.to_string(),
            "PlyReader error: The header appears to be empty."
        );
    }

    #[test]
    fn reader_cant_read_names_the_format() {
        let error = ImportError::reader_cant_read("BuiltInReader", FileFormat::Unknown, "a.dae");
        assert!(error.to_string().contains("unknown"));
        assert!(error.to_string().contains("a.dae"));
    }
}
