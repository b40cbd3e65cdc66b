#![warn(missing_docs)]

//! Triangle mesh model for tricad.
//!
//! A [`Mesh`] is a named, ordered collection of triangular facets with
//! absolute corner coordinates, as produced by the file readers in
//! `tricad-import`. The one piece of geometry logic that lives here is
//! [`Mesh::is_watertight`], which decides whether a mesh bounds a solid:
//! every edge of a closed two-manifold surface is shared by exactly two
//! triangles.

use std::collections::HashMap;

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A single triangular facet with absolute corner coordinates.
///
/// The corner order defines the winding, and with it the direction of the
/// outward normal.
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    corners: [Point3; 3],
}

impl Triangle {
    /// Create a triangle from its three corners.
    pub fn new(a: Point3, b: Point3, c: Point3) -> Self {
        Self { corners: [a, b, c] }
    }

    /// The three corners in winding order.
    pub fn corners(&self) -> &[Point3; 3] {
        &self.corners
    }

    /// First corner.
    pub fn a(&self) -> Point3 {
        self.corners[0]
    }

    /// Second corner.
    pub fn b(&self) -> Point3 {
        self.corners[1]
    }

    /// Third corner.
    pub fn c(&self) -> Point3 {
        self.corners[2]
    }
}

/// A named triangle mesh.
///
/// `points` holds the distinct vertices for formats that index into a
/// vertex table (PLY); it is empty for formats whose triangles carry their
/// own coordinates (STL, OBJ). Readers produce a mesh once, after which it
/// is a read-only value.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    name: String,
    points: Vec<Point3>,
    triangles: Vec<Triangle>,
}

impl Mesh {
    /// Create a mesh from a vertex table and its triangles.
    pub fn new(points: Vec<Point3>, triangles: Vec<Triangle>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points,
            triangles,
        }
    }

    /// Create a mesh whose triangles carry their own coordinates.
    pub fn from_triangles(triangles: Vec<Triangle>, name: impl Into<String>) -> Self {
        Self::new(Vec::new(), triangles, name)
    }

    /// The mesh name, captured from the source file. May be empty.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The vertex table. Empty when triangles carry their own coordinates.
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// The triangles, in source-file order.
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Check that the mesh is a closed two-manifold surface.
    ///
    /// Corners are identified by exact coordinate equality (no tolerance),
    /// so vertices that are meant to coincide must be bit-for-bit equal.
    /// Each undirected edge is counted across all triangles; the mesh is
    /// watertight iff every edge is used by exactly two triangles. An edge
    /// used once is a hole, three or more uses is a non-manifold fin.
    pub fn is_watertight(&self) -> bool {
        let mut point_index: HashMap<[u64; 3], usize> = HashMap::new();
        for point in &self.points {
            let next = point_index.len();
            point_index.entry(point_key(point)).or_insert(next);
        }

        let mut edge_use: HashMap<(usize, usize), u32> = HashMap::new();
        for triangle in &self.triangles {
            let [a, b, c] = triangle.corners.map(|corner| {
                let next = point_index.len();
                *point_index.entry(point_key(&corner)).or_insert(next)
            });

            for (u, v) in [(a, b), (b, c), (c, a)] {
                if u == v {
                    continue;
                }
                *edge_use.entry((u.min(v), u.max(v))).or_insert(0) += 1;
            }
        }

        edge_use.values().all(|&count| count == 2)
    }
}

/// Hashable key for exact coordinate equality. `-0.0` and `0.0` collapse to
/// the same key so that they compare equal, as `==` on the raw values would.
fn point_key(point: &Point3) -> [u64; 3] {
    let bits = |v: f64| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() };
    [bits(point.x), bits(point.y), bits(point.z)]
}
