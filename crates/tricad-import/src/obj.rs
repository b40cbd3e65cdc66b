//! Wavefront OBJ import.
//!
//! Only the geometry subset is read: `o <name>` starts a new object,
//! `v x y z` declares a vertex, and `f i j k [l]` declares a triangle or
//! quad by 1-based indices into the vertex list accumulated across the
//! whole file (the common OBJ convention — indices are not per-object).
//! Texture and normal suffixes on face indices (`1/2/3`) are consumed and
//! discarded, and every other line (comments, groups, materials, normals)
//! is ignored. Quads are split along the fixed diagonal into `(a, b, c)`
//! and `(a, c, d)`.

use tricad_mesh::{Mesh, Point3, Triangle};

use crate::error::ImportError;
use crate::format::FileFormat;
use crate::lexer::{Grammar, Item, ItemTree, Lexer, Token};
use crate::reader::{guard_single_use, parse_f64, parse_i64, Reader};

/// Reader for Wavefront OBJ files.
#[derive(Debug, Default)]
pub struct ObjReader {
    meshes: Vec<Mesh>,
    consumed: bool,
}

impl ObjReader {
    /// Create an empty reader. Each instance reads at most one file.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reader for ObjReader {
    fn name(&self) -> &'static str {
        "ObjReader"
    }

    fn can_read(&self, format: FileFormat) -> bool {
        format == FileFormat::Obj
    }

    fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    fn read_bytes(&mut self, data: &[u8]) -> Result<(), ImportError> {
        guard_single_use(self.name(), &mut self.consumed)?;

        let mut lexer = Lexer::new(data);
        let tree = lexer.run(ObjState::StartSolid, 0)?;

        if tree.root_items().all(|solid| solid.children.is_empty()) {
            return Err(ImportError::parser(
                self.name(),
                None,
                "The OBJ file appears to be empty.",
            ));
        }

        // Vertex indices resolve against all vertices seen so far in the
        // file, so the list carries across objects.
        let mut vertices: Vec<Point3> = Vec::new();

        for solid in tree.root_items() {
            if solid.children.is_empty() {
                continue;
            }

            let mesh = parse_object(&tree, solid, &mut vertices)?;

            // Only keep objects that carry faces; OBJ files commonly hold
            // non-mesh objects (curves, reference points).
            if mesh.triangles().is_empty() {
                continue;
            }
            self.meshes.push(mesh);
        }

        Ok(())
    }
}

const ORIGIN: &str = "ObjReader";

fn parse_object(
    tree: &ItemTree,
    solid: &Item,
    vertices: &mut Vec<Point3>,
) -> Result<Mesh, ImportError> {
    // The object name, when one was given.
    let mut name = String::new();
    if let Some(&first) = solid.children.first() {
        let item = &tree[first];
        if item.token == Token::Word {
            name = item.value.clone();
        }
    }

    // Vertices first: faces later in this object may reference them.
    for &child in &solid.children {
        let item = &tree[child];
        if item.token != Token::Vertex {
            continue;
        }
        if item.children.is_empty() {
            return Err(ImportError::parser(
                ORIGIN,
                Some(item.line),
                "The vertex appears to be empty.",
            ));
        }
        vertices.push(parse_vertex(tree, item)?);
    }

    let mut triangles = Vec::new();
    for &child in &solid.children {
        let item = &tree[child];
        if item.token != Token::Facet {
            continue;
        }
        if item.children.is_empty() {
            return Err(ImportError::parser(
                ORIGIN,
                Some(item.line),
                "The facet appears to be empty.",
            ));
        }
        parse_facet(tree, item, vertices, &mut triangles)?;
    }

    Ok(Mesh::from_triangles(triangles, name))
}

fn parse_vertex(tree: &ItemTree, vertex: &Item) -> Result<Point3, ImportError> {
    let mut numbers = Vec::new();
    for &child in &vertex.children {
        numbers.push(parse_f64(ORIGIN, &tree[child])?);
    }

    if numbers.len() != 3 {
        return Err(ImportError::parser(
            ORIGIN,
            Some(vertex.line),
            "Three vectors in OBJ files require exactly 3 numbers.",
        ));
    }
    Ok(Point3::new(numbers[0], numbers[1], numbers[2]))
}

fn parse_facet(
    tree: &ItemTree,
    facet: &Item,
    vertices: &[Point3],
    triangles: &mut Vec<Triangle>,
) -> Result<(), ImportError> {
    let mut indices = Vec::new();
    for &child in &facet.children {
        indices.push(parse_i64(ORIGIN, &tree[child])?);
    }

    if indices.len() < 3 {
        return Err(ImportError::parser(
            ORIGIN,
            Some(facet.line),
            "Facets in OBJ files require at least 3 indices.",
        ));
    }

    let corner = |index: i64| resolve(vertices, index, facet.line);

    triangles.push(Triangle::new(
        corner(indices[0])?,
        corner(indices[1])?,
        corner(indices[2])?,
    ));

    // The upper triangle of a quad.
    if indices.len() == 4 {
        triangles.push(Triangle::new(
            corner(indices[0])?,
            corner(indices[2])?,
            corner(indices[3])?,
        ));
    }

    Ok(())
}

/// Resolve a 1-based face index against the accumulated vertex list.
fn resolve(vertices: &[Point3], index: i64, line: usize) -> Result<Point3, ImportError> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i >= 1 && i <= vertices.len())
        .map(|i| vertices[i - 1])
        .ok_or_else(|| {
            ImportError::parser(
                ORIGIN,
                Some(line),
                format!("The facet index {index} does not match any vertex declared so far."),
            )
        })
}

#[derive(Debug, Clone, Copy)]
enum ObjState {
    StartSolid,
    EndSolid,
    Object,
    Vertex,
    Facet,
    Ignore,
}

impl Grammar for ObjState {
    fn step(self, lexer: &mut Lexer<'_>) -> Option<Self> {
        match self {
            ObjState::StartSolid => start_solid(lexer),
            ObjState::EndSolid => end_solid(lexer),
            ObjState::Object => object(lexer),
            ObjState::Vertex => vertex(lexer),
            ObjState::Facet => facet(lexer),
            ObjState::Ignore => ignore(lexer),
        }
    }
}

fn start_solid(lx: &mut Lexer<'_>) -> Option<ObjState> {
    // Everything before the first `o` tag belongs to an anonymous object.
    lx.start_of_a(Token::Solid);

    if lx.test_state(ObjState::Object) {
        return Some(ObjState::Object);
    }
    if lx.test_state(ObjState::Vertex) {
        return Some(ObjState::Vertex);
    }
    if lx.test_state(ObjState::Ignore) {
        return Some(ObjState::Ignore);
    }
    lx.error("Invalid element tag.")
}

fn end_solid(lx: &mut Lexer<'_>) -> Option<ObjState> {
    // Reached with input remaining only when no state matched the current
    // line; the last probe's diagnostic explains why.
    if lx.next().is_some() {
        return lx.last_error();
    }

    lx.end_of_a(Token::Solid);
    None
}

fn object(lx: &mut Lexer<'_>) -> Option<ObjState> {
    lx.skip_line_breaks();
    if !lx.match_exactly("o ") {
        return lx.error("An object is indicated by the tag 'o'.");
    }

    lx.end_of_a(Token::Solid);

    lx.skip_white_space();
    lx.start_of_a(Token::Solid);

    // The object name.
    lx.many_characters();
    lx.this_is_a(Token::Word);

    lx.skip_white_space();

    if lx.test_state(ObjState::Vertex) {
        return Some(ObjState::Vertex);
    }
    if lx.test_state(ObjState::Facet) {
        return Some(ObjState::Facet);
    }
    if lx.test_state(ObjState::Object) {
        return Some(ObjState::Object);
    }
    if lx.test_state(ObjState::Ignore) {
        return Some(ObjState::Ignore);
    }
    Some(ObjState::EndSolid)
}

fn vertex(lx: &mut Lexer<'_>) -> Option<ObjState> {
    lx.skip_line_breaks();
    if !lx.match_exactly("v ") {
        return lx.error("A vertex is indicated by the tag 'v'.");
    }

    lx.skip_white_space();
    lx.start_of_a(Token::Vertex);

    // Expect three numbers separated by white space.
    if !lx.number() {
        return lx.error("First number in three vector not found.");
    }
    lx.this_is_a(Token::Number);
    lx.skip_white_space();

    if !lx.number() {
        return lx.error("Second number in three vector not found.");
    }
    lx.this_is_a(Token::Number);
    lx.skip_white_space();

    if !lx.number() {
        return lx.error("Third number in three vector not found.");
    }
    lx.this_is_a(Token::Number);

    lx.end_of_a(Token::Vertex);

    // Anything further on the line (vertex colors) is discarded.
    lx.skip_line();

    if lx.test_state(ObjState::Vertex) {
        return Some(ObjState::Vertex);
    }
    if lx.test_state(ObjState::Object) {
        return Some(ObjState::Object);
    }
    if lx.test_state(ObjState::Facet) {
        return Some(ObjState::Facet);
    }
    if lx.test_state(ObjState::Ignore) {
        return Some(ObjState::Ignore);
    }
    Some(ObjState::EndSolid)
}

fn facet(lx: &mut Lexer<'_>) -> Option<ObjState> {
    lx.skip_line_breaks();
    if !lx.match_exactly("f ") {
        return lx.error("A facet is indicated by the tag 'f'.");
    }

    lx.skip_white_space();
    lx.start_of_a(Token::Facet);

    // Three or four indices separated by white space; the texture and
    // normal indices after each `/` are consumed and discarded.
    if !lx.number() {
        return lx.error("First number in three vector not found.");
    }
    lx.this_is_a(Token::Number);
    discard_index_suffix(lx);
    lx.skip_white_space();

    if !lx.number() {
        return lx.error("Second number in three vector not found.");
    }
    lx.this_is_a(Token::Number);
    discard_index_suffix(lx);
    lx.skip_white_space();

    if !lx.number() {
        return lx.error("Third number in three vector not found.");
    }
    lx.this_is_a(Token::Number);
    discard_index_suffix(lx);
    lx.skip_white_space();

    // Might be a quad rather than a tri.
    if lx.number() {
        lx.this_is_a(Token::Number);
    }

    lx.end_of_a(Token::Facet);

    lx.skip_line();

    if lx.test_state(ObjState::Facet) {
        return Some(ObjState::Facet);
    }
    if lx.test_state(ObjState::Vertex) {
        return Some(ObjState::Vertex);
    }
    if lx.test_state(ObjState::Object) {
        return Some(ObjState::Object);
    }
    if lx.test_state(ObjState::Ignore) {
        return Some(ObjState::Ignore);
    }
    Some(ObjState::EndSolid)
}

fn discard_index_suffix(lx: &mut Lexer<'_>) {
    lx.one_of("/");
    lx.number();
    lx.one_of("/");
    lx.number();
}

fn ignore(lx: &mut Lexer<'_>) -> Option<ObjState> {
    if !lx.skip_line() {
        return Some(ObjState::EndSolid);
    }

    if lx.test_state(ObjState::Object) {
        return Some(ObjState::Object);
    }
    if lx.test_state(ObjState::Vertex) {
        return Some(ObjState::Vertex);
    }
    if lx.test_state(ObjState::Facet) {
        return Some(ObjState::Facet);
    }
    if lx.test_state(ObjState::Ignore) {
        return Some(ObjState::Ignore);
    }
    Some(ObjState::EndSolid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn read(input: &str) -> Result<ObjReader, ImportError> {
        let mut reader = ObjReader::new();
        reader.read_bytes(input.as_bytes())?;
        Ok(reader)
    }

    const QUAD: &str = "\
o sheet
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4
";

    #[test]
    fn quads_split_along_the_fixed_diagonal() {
        let reader = read(QUAD).unwrap();
        let mesh = &reader.meshes()[0];
        assert_eq!(mesh.name(), "sheet");
        assert_eq!(mesh.triangles().len(), 2);

        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(1.0, 1.0, 0.0);
        let d = Point3::new(0.0, 1.0, 0.0);

        let lower = &mesh.triangles()[0];
        assert_eq!((lower.a(), lower.b(), lower.c()), (a, b, c));
        let upper = &mesh.triangles()[1];
        assert_eq!((upper.a(), upper.b(), upper.c()), (a, c, d));
    }

    #[test]
    fn indices_accumulate_across_objects() {
        let input = "\
o base
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
o roof
v 0 0 1
f 1 2 4
";
        let reader = read(input).unwrap();
        assert_eq!(reader.meshes().len(), 2);

        // The second object's face references vertices 1 and 2 from the
        // first object and its own vertex 4.
        let roof = &reader.meshes()[1];
        assert_eq!(roof.name(), "roof");
        let triangle = &roof.triangles()[0];
        assert_relative_eq!(triangle.a().x, 0.0);
        assert_relative_eq!(triangle.b().x, 1.0);
        assert_relative_eq!(triangle.c().z, 1.0);
    }

    #[test]
    fn index_suffixes_are_discarded() {
        let input = "\
v 0 0 0
v 1 0 0
v 0 1 0
f 1/10/20 2/11/21 3//22
";
        let reader = read(input).unwrap();
        let mesh = &reader.meshes()[0];
        assert_eq!(mesh.name(), "");
        assert_eq!(mesh.triangles().len(), 1);
        assert_relative_eq!(mesh.triangles()[0].c().y, 1.0);
    }

    #[test]
    fn unknown_lines_are_ignored() {
        let input = "\
# a comment
mtllib scene.mtl
o thing
v 0 0 0
v 1 0 0
v 0 1 0
vn 0 0 1
vt 0.5 0.5
g group1
usemtl steel
f 1 2 3
s off
";
        let reader = read(input).unwrap();
        assert_eq!(reader.meshes().len(), 1);
        assert_eq!(reader.meshes()[0].triangles().len(), 1);
    }

    #[test]
    fn objects_without_faces_are_dropped() {
        let input = "\
o points_only
v 0 0 0
v 1 0 0
o real
v 0 1 0
f 1 2 3
";
        let reader = read(input).unwrap();
        assert_eq!(reader.meshes().len(), 1);
        assert_eq!(reader.meshes()[0].name(), "real");
    }

    #[test]
    fn empty_file_is_a_parser_error() {
        let error = read("").unwrap_err();
        match error {
            ImportError::Parser { message, .. } => {
                assert!(message.contains("appears to be empty"), "{message}");
            }
            other => panic!("expected a parser error, got {other}"),
        }
    }

    #[test]
    fn comment_only_file_is_a_parser_error() {
        let error = read("# nothing here\n").unwrap_err();
        assert!(matches!(error, ImportError::Parser { .. }));
    }

    #[test]
    fn out_of_range_index_is_reported_with_the_line() {
        let input = "\
v 0 0 0
v 1 0 0
f 1 2 9
";
        let error = read(input).unwrap_err();
        match error {
            ImportError::Parser { line, message, .. } => {
                assert_eq!(line, Some(3));
                assert!(message.contains("9"), "{message}");
            }
            other => panic!("expected a parser error, got {other}"),
        }
    }

    #[test]
    fn negative_indices_are_rejected() {
        let input = "\
v 0 0 0
v 1 0 0
v 0 1 0
f -1 -2 -3
";
        let error = read(input).unwrap_err();
        assert!(matches!(error, ImportError::Parser { .. }));
    }

    #[test]
    fn cube_obj_is_watertight() {
        let input = "\
o cube
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
v 0 0 1
v 1 0 1
v 1 1 1
v 0 1 1
f 1 2 3 4
f 5 6 7 8
f 1 2 6 5
f 2 3 7 6
f 3 4 8 7
f 4 1 5 8
";
        let reader = read(input).unwrap();
        let mesh = &reader.meshes()[0];
        assert_eq!(mesh.triangles().len(), 12);
        assert!(mesh.is_watertight());
    }
}
