//! ASCII STL import.
//!
//! The grammar is line-oriented with case-sensitive keywords: a `solid
//! <name>` block holds `facet normal` / `outer loop` / three `vertex`
//! lines / `endloop` / `endfacet` groups and ends with `endsolid`.
//! Consecutive `solid` blocks at the top level each become a separate
//! mesh, which covers the non-standard multi-solid files some exporters
//! write.

use tricad_mesh::{Mesh, Point3, Triangle};

use crate::error::ImportError;
use crate::format::FileFormat;
use crate::lexer::{Grammar, Item, ItemTree, Lexer, Token};
use crate::reader::{guard_single_use, parse_f64, Reader};

/// Reader for ASCII STL files.
#[derive(Debug, Default)]
pub struct StlReader {
    meshes: Vec<Mesh>,
    consumed: bool,
}

impl StlReader {
    /// Create an empty reader. Each instance reads at most one file.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reader for StlReader {
    fn name(&self) -> &'static str {
        "StlReader"
    }

    fn can_read(&self, format: FileFormat) -> bool {
        format == FileFormat::Stl
    }

    fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    fn read_bytes(&mut self, data: &[u8]) -> Result<(), ImportError> {
        guard_single_use(self.name(), &mut self.consumed)?;

        let mut lexer = Lexer::new(data);
        let tree = lexer.run(StlState::StartSolid, 0)?;

        if tree.root_items().next().is_none() {
            return Err(ImportError::parser(
                self.name(),
                None,
                "The STL file appears to be empty.",
            ));
        }

        for solid in tree.root_items() {
            if solid.children.is_empty() {
                return Err(ImportError::parser(
                    self.name(),
                    Some(solid.line),
                    "The mesh appears to be empty.",
                ));
            }
            let triangles = parse_solid(&tree, solid)?;
            self.meshes
                .push(Mesh::from_triangles(triangles, solid.value.clone()));
        }

        Ok(())
    }
}

const ORIGIN: &str = "StlReader";

fn parse_solid(tree: &ItemTree, solid: &Item) -> Result<Vec<Triangle>, ImportError> {
    let mut triangles = Vec::new();
    for &child in &solid.children {
        let facet = &tree[child];
        if facet.children.is_empty() {
            return Err(ImportError::parser(
                ORIGIN,
                Some(facet.line),
                "The facet appears to be empty.",
            ));
        }
        triangles.push(parse_facet(tree, facet)?);
    }
    Ok(triangles)
}

fn parse_facet(tree: &ItemTree, facet: &Item) -> Result<Triangle, ImportError> {
    let mut triangles = Vec::new();
    for &child in &facet.children {
        let item = &tree[child];
        if item.token == Token::Vertices {
            triangles.push(parse_vertices(tree, item)?);
        }
    }

    if triangles.len() != 1 {
        return Err(ImportError::parser(
            ORIGIN,
            Some(facet.line),
            "STL files expect exactly 1 triangle per facet.",
        ));
    }
    Ok(triangles.remove(0))
}

fn parse_vertices(tree: &ItemTree, vertices: &Item) -> Result<Triangle, ImportError> {
    let mut corners = Vec::new();
    for &child in &vertices.children {
        let item = &tree[child];
        if item.token == Token::ThreeVector {
            corners.push(parse_three_vector(tree, item)?);
        }
    }

    if corners.len() != 3 {
        return Err(ImportError::parser(
            ORIGIN,
            Some(vertices.line),
            "STL files expect exactly 3 vertices for a triangular facet.",
        ));
    }
    Ok(Triangle::new(corners[0], corners[1], corners[2]))
}

fn parse_three_vector(tree: &ItemTree, vector: &Item) -> Result<Point3, ImportError> {
    let mut numbers = Vec::new();
    for &child in &vector.children {
        let item = &tree[child];
        if item.token == Token::Number {
            numbers.push(parse_f64(ORIGIN, item)?);
        }
    }

    if numbers.len() != 3 {
        return Err(ImportError::parser(
            ORIGIN,
            Some(vector.line),
            "Three vectors in STL files require exactly 3 numbers.",
        ));
    }
    Ok(Point3::new(numbers[0], numbers[1], numbers[2]))
}

#[derive(Debug, Clone, Copy)]
enum StlState {
    StartSolid,
    EndSolid,
    StartFacet,
    EndFacet,
    StartVertices,
    EndVertices,
    Vertex,
    ThreeVector,
}

impl Grammar for StlState {
    fn step(self, lexer: &mut Lexer<'_>) -> Option<Self> {
        match self {
            StlState::StartSolid => start_solid(lexer),
            StlState::EndSolid => end_solid(lexer),
            StlState::StartFacet => start_facet(lexer),
            StlState::EndFacet => end_facet(lexer),
            StlState::StartVertices => start_vertices(lexer),
            StlState::EndVertices => end_vertices(lexer),
            StlState::Vertex => vertex(lexer),
            StlState::ThreeVector => three_vector(lexer),
        }
    }
}

fn start_solid(lx: &mut Lexer<'_>) -> Option<StlState> {
    if !lx.match_exactly("solid") {
        return lx.error("STL files start with 'solid'.");
    }
    lx.skip_white_space();

    // The name of the solid, captured as the Solid item's value.
    lx.many_characters();
    lx.start_of_a(Token::Solid);

    lx.skip_line_break();
    Some(StlState::StartFacet)
}

fn end_solid(lx: &mut Lexer<'_>) -> Option<StlState> {
    lx.skip_white_space();
    if !lx.match_exactly("endsolid") {
        return lx.error("STL files end with 'endsolid'.");
    }

    // The solid name may be repeated after the tag.
    lx.skip_line();
    lx.end_of_a(Token::Solid);
    lx.skip_line_breaks();

    // Non-standard multi-solid files carry further solids.
    if lx.test_state(StlState::StartSolid) {
        return Some(StlState::StartSolid);
    }
    None
}

fn start_facet(lx: &mut Lexer<'_>) -> Option<StlState> {
    lx.skip_white_space();
    if !lx.match_exactly("facet normal") {
        return lx.error("Facets are indicated by the tag 'facet normal'.");
    }
    lx.skip_white_space();

    lx.start_of_a(Token::Facet);

    // The facet normal is next.
    Some(StlState::ThreeVector)
}

fn end_facet(lx: &mut Lexer<'_>) -> Option<StlState> {
    lx.skip_white_space();
    if !lx.match_exactly("endfacet") {
        return lx.error("The end of a facet is indicated by the tag 'endfacet'.");
    }
    lx.skip_white_space();
    lx.skip_line_break();

    lx.end_of_a(Token::Facet);

    // Another facet could be next.
    if lx.test_state(StlState::StartFacet) {
        return Some(StlState::StartFacet);
    }
    // Otherwise we must be at the end of the solid.
    Some(StlState::EndSolid)
}

fn start_vertices(lx: &mut Lexer<'_>) -> Option<StlState> {
    lx.skip_white_space();
    if !lx.match_exactly("outer loop") {
        return lx.error("The start of the vertices is indicated by the tag 'outer loop'.");
    }
    lx.skip_white_space();
    lx.skip_line_break();

    lx.start_of_a(Token::Vertices);
    Some(StlState::Vertex)
}

fn end_vertices(lx: &mut Lexer<'_>) -> Option<StlState> {
    lx.skip_white_space();
    if !lx.match_exactly("endloop") {
        return lx.error("The end of the vertices is indicated by the tag 'endloop'.");
    }
    lx.skip_white_space();
    lx.skip_line_break();

    lx.end_of_a(Token::Vertices);
    Some(StlState::EndFacet)
}

fn vertex(lx: &mut Lexer<'_>) -> Option<StlState> {
    lx.skip_white_space();
    if !lx.match_exactly("vertex") {
        return lx.error("A vertex is indicated by the tag 'vertex'.");
    }
    lx.skip_white_space();
    Some(StlState::ThreeVector)
}

fn three_vector(lx: &mut Lexer<'_>) -> Option<StlState> {
    lx.skip_white_space();
    lx.start_of_a(Token::ThreeVector);

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
    lx.end_of_a(Token::ThreeVector);

    lx.skip_white_space();
    if !lx.skip_line_break() {
        return lx.error("Expecting a new line at the end of a three vector.");
    }

    // After a three vector, either a vertex list opens (this was a facet
    // normal), another vertex follows, or the vertex list ends.
    if lx.test_state(StlState::StartVertices) {
        return Some(StlState::StartVertices);
    }
    if lx.test_state(StlState::Vertex) {
        return Some(StlState::Vertex);
    }
    Some(StlState::EndVertices)
}
