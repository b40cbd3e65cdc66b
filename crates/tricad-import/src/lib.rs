#![warn(missing_docs)]

//! ASCII CAD mesh import for tricad.
//!
//! Reads triangulated surface meshes from ASCII STL, Wavefront OBJ and
//! PLY files into [`tricad_mesh::Mesh`] values. Each format is parsed by
//! its own grammar over a shared backtracking lexer; the resulting meshes
//! can then be checked for watertightness and handed to whatever builds
//! solids out of them.
//!
//! # Example
//!
//! ```no_run
//! use tricad_import::{read_file, Reader};
//!
//! let reader = read_file("model.stl").unwrap();
//! for mesh in reader.meshes() {
//!     println!("{}: {} triangles", mesh.name(), mesh.triangles().len());
//! }
//! ```

mod error;
mod format;
mod lexer;
mod obj;
mod ply;
mod reader;
mod stl;

pub use error::ImportError;
pub use format::FileFormat;
pub use obj::ObjReader;
pub use ply::PlyReader;
pub use reader::{read_file, BuiltInReader, Reader};
pub use stl::StlReader;
