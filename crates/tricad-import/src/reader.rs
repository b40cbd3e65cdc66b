//! The reader abstraction over the built-in format readers.
//!
//! [`Reader`] is the capability contract every format implementation
//! satisfies; [`BuiltInReader`] is the closed union over the three
//! formats, so callers that dispatch on [`FileFormat`] keep exhaustiveness
//! checking. Readers are single use: one instance reads one file.

use std::path::Path;

use tricad_mesh::Mesh;

use crate::error::ImportError;
use crate::format::FileFormat;
use crate::lexer::Item;
use crate::obj::ObjReader;
use crate::ply::PlyReader;
use crate::stl::StlReader;

/// Capability contract and mesh lookups shared by all format readers.
pub trait Reader {
    /// Identifying name, used as the origin in diagnostics.
    fn name(&self) -> &'static str;

    /// Whether this reader understands `format`. Pure; no I/O.
    fn can_read(&self, format: FileFormat) -> bool;

    /// Parse a complete in-memory file and populate the mesh collection.
    /// A second call on the same reader is rejected.
    fn read_bytes(&mut self, data: &[u8]) -> Result<(), ImportError>;

    /// The meshes produced by the read, in file order.
    fn meshes(&self) -> &[Mesh];

    /// Read the file at `path`.
    fn read(&mut self, path: &Path) -> Result<(), ImportError> {
        let data = std::fs::read(path)
            .map_err(|source| ImportError::file_not_found(self.name(), path, source))?;
        self.read_bytes(&data)
    }

    /// The first mesh, if any were produced.
    fn first_mesh(&self) -> Option<&Mesh> {
        self.meshes().first()
    }

    /// The mesh at `index`, in file order.
    fn mesh_at(&self, index: usize) -> Result<&Mesh, ImportError> {
        self.meshes()
            .get(index)
            .ok_or_else(|| ImportError::mesh_not_found(self.name(), format!("index {index}")))
    }

    /// The first mesh called `name`; with `exact` false, the first mesh
    /// whose name contains `name`.
    fn mesh_named(&self, name: &str, exact: bool) -> Result<&Mesh, ImportError> {
        self.meshes()
            .iter()
            .find(|mesh| {
                if exact {
                    mesh.name() == name
                } else {
                    mesh.name().contains(name)
                }
            })
            .ok_or_else(|| ImportError::mesh_not_found(self.name(), format!("name '{name}'")))
    }
}

/// The closed set of built-in readers, one per supported format.
#[derive(Debug)]
pub enum BuiltInReader {
    /// ASCII STL.
    Stl(StlReader),
    /// Wavefront OBJ.
    Obj(ObjReader),
    /// ASCII PLY.
    Ply(PlyReader),
}

impl BuiltInReader {
    /// The reader for `format`, or `None` for a format no built-in reader
    /// accepts.
    pub fn for_format(format: FileFormat) -> Option<Self> {
        match format {
            FileFormat::Stl => Some(Self::Stl(StlReader::new())),
            FileFormat::Obj => Some(Self::Obj(ObjReader::new())),
            FileFormat::Ply => Some(Self::Ply(PlyReader::new())),
            FileFormat::Unknown => None,
        }
    }

    fn inner(&self) -> &dyn Reader {
        match self {
            Self::Stl(reader) => reader,
            Self::Obj(reader) => reader,
            Self::Ply(reader) => reader,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Reader {
        match self {
            Self::Stl(reader) => reader,
            Self::Obj(reader) => reader,
            Self::Ply(reader) => reader,
        }
    }
}

impl Reader for BuiltInReader {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn can_read(&self, format: FileFormat) -> bool {
        self.inner().can_read(format)
    }

    fn read_bytes(&mut self, data: &[u8]) -> Result<(), ImportError> {
        self.inner_mut().read_bytes(data)
    }

    fn meshes(&self) -> &[Mesh] {
        self.inner().meshes()
    }
}

/// Detect the format of `path` from its extension, build the matching
/// reader, and read the file with it.
///
/// An extension no built-in reader accepts is a configuration error and is
/// rejected before any I/O happens.
pub fn read_file(path: impl AsRef<Path>) -> Result<BuiltInReader, ImportError> {
    let path = path.as_ref();
    let format = FileFormat::from_path(path);
    let mut reader = BuiltInReader::for_format(format)
        .ok_or_else(|| ImportError::reader_cant_read("read_file", format, path))?;
    reader.read(path)?;
    Ok(reader)
}

/// Reject the second read on a single-use reader, marking the first.
pub(crate) fn guard_single_use(origin: &str, consumed: &mut bool) -> Result<(), ImportError> {
    if *consumed {
        return Err(ImportError::parser(
            origin,
            None,
            "mesh readers are single use; this reader has already read a file",
        ));
    }
    *consumed = true;
    Ok(())
}

/// Parse a Number item's captured text as a coordinate.
pub(crate) fn parse_f64(origin: &str, item: &Item) -> Result<f64, ImportError> {
    item.value.parse().map_err(|_| {
        ImportError::parser(
            origin,
            Some(item.line),
            format!("'{}' is not a valid number.", item.value),
        )
    })
}

/// Parse a Number item's captured text as an index.
pub(crate) fn parse_i64(origin: &str, item: &Item) -> Result<i64, ImportError> {
    item.value.parse().map_err(|_| {
        ImportError::parser(
            origin,
            Some(item.line),
            format!("'{}' is not a valid index.", item.value),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SOLIDS: &str = "\
solid lid
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
endsolid lid
solid base_plate
  facet normal 0 0 -1
    outer loop
      vertex 0 0 0
      vertex 0 1 0
      vertex 1 0 0
    endloop
  endfacet
endsolid base_plate
";

    fn loaded() -> BuiltInReader {
        let mut reader = BuiltInReader::for_format(FileFormat::Stl).unwrap();
        reader.read_bytes(TWO_SOLIDS.as_bytes()).unwrap();
        reader
    }

    #[test]
    fn lookup_by_index() {
        let reader = loaded();
        assert_eq!(reader.mesh_at(0).unwrap().name(), "lid");
        assert_eq!(reader.mesh_at(1).unwrap().name(), "base_plate");

        let error = reader.mesh_at(5).unwrap_err();
        match error {
            ImportError::MeshNotFound { query, .. } => assert_eq!(query, "index 5"),
            other => panic!("expected MeshNotFound, got {other}"),
        }
    }

    #[test]
    fn lookup_by_name() {
        let reader = loaded();
        assert_eq!(reader.mesh_named("lid", true).unwrap().name(), "lid");
        // Exact lookup does not match substrings.
        assert!(reader.mesh_named("base", true).is_err());
        // Substring lookup does.
        assert_eq!(
            reader.mesh_named("base", false).unwrap().name(),
            "base_plate"
        );

        let error = reader.mesh_named("missing", false).unwrap_err();
        assert!(matches!(error, ImportError::MeshNotFound { .. }));
    }

    #[test]
    fn first_mesh_and_full_collection() {
        let reader = loaded();
        assert_eq!(reader.first_mesh().unwrap().name(), "lid");

        // Lookups never mutate: two reads of the collection are equal.
        assert_eq!(reader.meshes(), reader.meshes());
        assert_eq!(reader.meshes().len(), 2);
    }

    #[test]
    fn capability_checks_are_exact() {
        let stl = BuiltInReader::for_format(FileFormat::Stl).unwrap();
        assert!(stl.can_read(FileFormat::Stl));
        assert!(!stl.can_read(FileFormat::Obj));
        assert!(!stl.can_read(FileFormat::Unknown));

        let ply = BuiltInReader::for_format(FileFormat::Ply).unwrap();
        assert!(ply.can_read(FileFormat::Ply));
        assert!(!ply.can_read(FileFormat::Stl));

        assert!(BuiltInReader::for_format(FileFormat::Unknown).is_none());
    }

    #[test]
    fn unknown_extension_is_rejected_before_any_io() {
        let error = read_file("model.dae").unwrap_err();
        match error {
            ImportError::ReaderCantRead { format, .. } => {
                assert_eq!(format, FileFormat::Unknown);
            }
            other => panic!("expected ReaderCantRead, got {other}"),
        }
    }

    #[test]
    fn missing_file_is_reported_with_its_path() {
        let error = read_file("does/not/exist.stl").unwrap_err();
        match error {
            ImportError::FileNotFound { path, .. } => {
                assert!(path.ends_with("exist.stl"));
            }
            other => panic!("expected FileNotFound, got {other}"),
        }
    }

    #[test]
    fn read_file_round_trip() {
        let path = std::env::temp_dir().join("tricad_reader_round_trip.stl");
        std::fs::write(&path, TWO_SOLIDS).unwrap();

        let reader = read_file(&path).unwrap();
        assert_eq!(reader.meshes().len(), 2);
        assert!(reader.can_read(FileFormat::Stl));

        std::fs::remove_file(&path).ok();
    }
}
