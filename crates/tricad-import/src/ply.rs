//! ASCII PLY import.
//!
//! Reading is two-phase. The header is lexed and parsed in full first:
//! `element vertex N` / `element face N` give the record counts, and the
//! property declarations give the column offsets of the `x`/`y`/`z`
//! coordinates within a vertex record and of the index list within a face
//! record. The lexer is then re-run in two line-bounded passes over a
//! generic "numbers on a line" record grammar — the body grammar knows
//! nothing about property semantics, the builder applies the offsets the
//! header resolved. Reordering the property declarations therefore moves
//! the columns without changing the resulting coordinates.
//!
//! Only triangular faces are read: a face record is `[count, i, j, k, ...]`
//! and the builder takes exactly the three indices after the count,
//! whatever corner count the record declares.

use tricad_mesh::{Mesh, Point3, Triangle};

use crate::error::ImportError;
use crate::format::FileFormat;
use crate::lexer::{Grammar, Item, ItemTree, Lexer, Token};
use crate::reader::{guard_single_use, parse_f64, parse_i64, Reader};

/// Reader for ASCII PLY files.
#[derive(Debug, Default)]
pub struct PlyReader {
    meshes: Vec<Mesh>,
    consumed: bool,
}

impl PlyReader {
    /// Create an empty reader. Each instance reads at most one file.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reader for PlyReader {
    fn name(&self) -> &'static str {
        "PlyReader"
    }

    fn can_read(&self, format: FileFormat) -> bool {
        format == FileFormat::Ply
    }

    fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    fn read_bytes(&mut self, data: &[u8]) -> Result<(), ImportError> {
        guard_single_use(self.name(), &mut self.consumed)?;

        let mut lexer = Lexer::new(data);

        let header_tree = lexer.run(PlyHeaderState::StartHeader, 0)?;
        if header_tree.root_items().next().is_none() {
            return Err(ImportError::parser(
                self.name(),
                None,
                "The header appears to be empty.",
            ));
        }
        let header = parse_header(&header_tree)?;

        let vertex_tree = lexer.run(PlyRecordState::Vertex, header.vertex_count)?;
        let vertex_records = vertex_tree.root_items().count();
        if vertex_records == 0 {
            return Err(ImportError::parser(
                self.name(),
                None,
                "The PLY file appears to have no vertices.",
            ));
        }
        if vertex_records != header.vertex_count {
            return Err(ImportError::parser(
                self.name(),
                None,
                "The PLY file appears to be missing vertices.",
            ));
        }

        let facet_tree = lexer.run(PlyRecordState::Facet, header.facet_count)?;
        let facet_records = facet_tree.root_items().count();
        if facet_records == 0 {
            return Err(ImportError::parser(
                self.name(),
                None,
                "The PLY file appears to have no facets.",
            ));
        }
        if facet_records != header.facet_count {
            return Err(ImportError::parser(
                self.name(),
                None,
                "The PLY file appears to be missing facets.",
            ));
        }

        self.meshes
            .push(parse_mesh(&header, &vertex_tree, &facet_tree)?);
        Ok(())
    }
}

const ORIGIN: &str = "PlyReader";

/// Counts and column offsets resolved from the header.
#[derive(Debug)]
struct PlyHeader {
    vertex_count: usize,
    facet_count: usize,
    x_index: usize,
    y_index: usize,
    z_index: usize,
    /// Offset of the vertex-index-list property within a face record.
    facet_index: usize,
}

fn parse_header(tree: &ItemTree) -> Result<PlyHeader, ImportError> {
    let headers: Vec<&Item> = tree.root_items().collect();
    if headers.len() != 1 {
        return Err(ImportError::parser(
            ORIGIN,
            Some(1),
            "The header appears to be invalid or missing.",
        ));
    }

    let mut vertex_count = 0;
    let mut facet_count = 0;
    let mut x_index = None;
    let mut y_index = None;
    let mut z_index = None;
    let mut facet_index = None;

    for &element_id in &headers[0].children {
        let element = &tree[element_id];
        if element.token != Token::Element {
            continue;
        }
        if element.children.len() < 2 {
            return Err(ImportError::parser(
                ORIGIN,
                Some(element.line),
                "Invalid element information in header. \
                 Expecting 'vertex' or 'face' and a number.",
            ));
        }

        let label = &tree[element.children[0]];
        let count = &tree[element.children[1]];
        if label.token != Token::Word || count.token != Token::Number {
            continue;
        }

        match label.value.as_str() {
            "vertex" => {
                vertex_count = parse_count(count)?;
                // The property positions give the coordinate columns.
                for (offset, property) in properties(tree, element) {
                    match property {
                        "x" => x_index = Some(offset),
                        "y" => y_index = Some(offset),
                        "z" => z_index = Some(offset),
                        _ => {}
                    }
                }
            }
            "face" => {
                facet_count = parse_count(count)?;
                for (offset, property) in properties(tree, element) {
                    if property == "uchar int vertex_indices" {
                        facet_index = Some(offset);
                    }
                }
            }
            _ => {}
        }
    }

    if vertex_count == 0 {
        return Err(ImportError::parser(
            ORIGIN,
            None,
            "The number of vertices was not found in the header.",
        ));
    }
    if facet_count == 0 {
        return Err(ImportError::parser(
            ORIGIN,
            None,
            "The number of faces was not found in the header.",
        ));
    }
    let (Some(x_index), Some(y_index), Some(z_index)) = (x_index, y_index, z_index) else {
        return Err(ImportError::parser(
            ORIGIN,
            None,
            "The vertex x, y, z indices were not found in the header.",
        ));
    };

    Ok(PlyHeader {
        vertex_count,
        facet_count,
        x_index,
        y_index,
        z_index,
        facet_index: facet_index.unwrap_or(0),
    })
}

/// The element's property descriptions, as `(column offset, description)`.
/// The description is everything after the `property` keyword's first word,
/// e.g. `x` for `property float x`.
fn properties<'t>(
    tree: &'t ItemTree,
    element: &'t Item,
) -> impl Iterator<Item = (usize, &'t str)> {
    element.children[2..]
        .iter()
        .enumerate()
        .filter_map(move |(offset, &id)| {
            let property = &tree[id];
            if property.token != Token::Property || property.children.len() < 2 {
                return None;
            }
            let description = &tree[property.children[1]];
            if description.token != Token::Word {
                return None;
            }
            Some((offset, description.value.as_str()))
        })
}

fn parse_count(item: &Item) -> Result<usize, ImportError> {
    item.value.parse().map_err(|_| {
        ImportError::parser(
            ORIGIN,
            Some(item.line),
            format!("'{}' is not a valid element count.", item.value),
        )
    })
}

fn parse_mesh(
    header: &PlyHeader,
    vertex_tree: &ItemTree,
    facet_tree: &ItemTree,
) -> Result<Mesh, ImportError> {
    let mut points = Vec::new();
    for record in vertex_tree.root_items() {
        if record.token != Token::Vertex {
            continue;
        }
        if record.children.is_empty() {
            return Err(ImportError::parser(
                ORIGIN,
                Some(record.line),
                "The vertex appears to be empty.",
            ));
        }
        points.push(parse_vertex(header, vertex_tree, record)?);
    }

    let mut triangles = Vec::new();
    for record in facet_tree.root_items() {
        if record.token != Token::Facet {
            continue;
        }
        if record.children.is_empty() {
            return Err(ImportError::parser(
                ORIGIN,
                Some(record.line),
                "The facet appears to be empty.",
            ));
        }
        triangles.push(parse_facet(header, facet_tree, &points, record)?);
    }

    // PLY files carry no mesh name.
    Ok(Mesh::new(points, triangles, ""))
}

fn parse_vertex(
    header: &PlyHeader,
    tree: &ItemTree,
    record: &Item,
) -> Result<Point3, ImportError> {
    let mut numbers = Vec::new();
    for &child in &record.children {
        numbers.push(parse_f64(ORIGIN, &tree[child])?);
    }

    let highest = header.x_index.max(header.y_index).max(header.z_index);
    if numbers.len() < 3 || numbers.len() <= highest {
        return Err(ImportError::parser(
            ORIGIN,
            Some(record.line),
            "Vertices in PLY files require at least 3 numbers.",
        ));
    }

    Ok(Point3::new(
        numbers[header.x_index],
        numbers[header.y_index],
        numbers[header.z_index],
    ))
}

fn parse_facet(
    header: &PlyHeader,
    tree: &ItemTree,
    points: &[Point3],
    record: &Item,
) -> Result<Triangle, ImportError> {
    let mut indices = Vec::new();
    for &child in &record.children {
        indices.push(parse_i64(ORIGIN, &tree[child])?);
    }

    // The count column plus three corner indices.
    if indices.len() < 4 || indices.len() <= 3 + header.facet_index {
        return Err(ImportError::parser(
            ORIGIN,
            Some(record.line),
            "Facets in PLY files require 3 indices.",
        ));
    }

    let corner = |index: i64| -> Result<Point3, ImportError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| points.get(i).copied())
            .ok_or_else(|| {
                ImportError::parser(
                    ORIGIN,
                    Some(record.line),
                    format!("The facet index {index} does not match any vertex."),
                )
            })
    };

    Ok(Triangle::new(
        corner(indices[1 + header.facet_index])?,
        corner(indices[2 + header.facet_index])?,
        corner(indices[3 + header.facet_index])?,
    ))
}

#[derive(Debug, Clone, Copy)]
enum PlyHeaderState {
    StartHeader,
    EndHeader,
    Element,
    Property,
    Ignore,
}

impl Grammar for PlyHeaderState {
    fn step(self, lexer: &mut Lexer<'_>) -> Option<Self> {
        match self {
            PlyHeaderState::StartHeader => start_header(lexer),
            PlyHeaderState::EndHeader => end_header(lexer),
            PlyHeaderState::Element => element(lexer),
            PlyHeaderState::Property => property(lexer),
            PlyHeaderState::Ignore => ignore(lexer),
        }
    }
}

fn start_header(lx: &mut Lexer<'_>) -> Option<PlyHeaderState> {
    if !lx.match_exactly("ply") {
        return lx.error("PLY files start with 'ply'.");
    }

    lx.start_of_a(Token::Header);
    lx.skip_line();

    if lx.test_state(PlyHeaderState::Element) {
        return Some(PlyHeaderState::Element);
    }
    if lx.test_state(PlyHeaderState::Ignore) {
        return Some(PlyHeaderState::Ignore);
    }
    lx.error("Invalid header tag.")
}

fn end_header(lx: &mut Lexer<'_>) -> Option<PlyHeaderState> {
    if !lx.match_exactly("end_header") {
        return lx.error("PLY file headers end with 'end_header'.");
    }

    // The last element block may still be open.
    lx.maybe_end_of_a(Token::Element);
    lx.end_of_a(Token::Header);

    // The line break stays pending; the record passes pick it up.
    None
}

fn element(lx: &mut Lexer<'_>) -> Option<PlyHeaderState> {
    if !lx.match_exactly("element ") {
        return lx.error("An element is indicated by the tag 'element'.");
    }

    // Close the previous element block, if any.
    lx.maybe_end_of_a(Token::Element);

    lx.skip_white_space();
    lx.start_of_a(Token::Element);

    // Expecting a label and a count.
    if !lx.many_characters() {
        return lx.error("Element type not found.");
    }
    lx.this_is_a(Token::Word);
    lx.skip_white_space();

    if !lx.number() {
        return lx.error("Element count not found.");
    }
    lx.this_is_a(Token::Number);
    lx.skip_line();

    if lx.test_state(PlyHeaderState::Property) {
        return Some(PlyHeaderState::Property);
    }
    if lx.test_state(PlyHeaderState::Ignore) {
        return Some(PlyHeaderState::Ignore);
    }
    Some(PlyHeaderState::EndHeader)
}

fn property(lx: &mut Lexer<'_>) -> Option<PlyHeaderState> {
    if !lx.match_exactly("property ") {
        return lx.error("A property is indicated by the tag 'property'.");
    }

    lx.skip_white_space();
    lx.start_of_a(Token::Property);

    // The type, then everything else on the line: `float x` or
    // `list uchar int vertex_indices`.
    if !lx.many_characters() {
        return lx.error("Property type not found.");
    }
    lx.this_is_a(Token::Word);
    lx.skip_white_space();

    lx.rest_of_line();
    lx.this_is_a(Token::Word);

    lx.end_of_a(Token::Property);
    lx.skip_line_break();

    if lx.test_state(PlyHeaderState::Property) {
        return Some(PlyHeaderState::Property);
    }
    if lx.test_state(PlyHeaderState::Element) {
        return Some(PlyHeaderState::Element);
    }
    if lx.test_state(PlyHeaderState::EndHeader) {
        return Some(PlyHeaderState::EndHeader);
    }
    if lx.test_state(PlyHeaderState::Ignore) {
        return Some(PlyHeaderState::Ignore);
    }
    Some(PlyHeaderState::EndHeader)
}

fn ignore(lx: &mut Lexer<'_>) -> Option<PlyHeaderState> {
    if !lx.skip_line() {
        return Some(PlyHeaderState::EndHeader);
    }

    if lx.test_state(PlyHeaderState::Element) {
        return Some(PlyHeaderState::Element);
    }
    if lx.test_state(PlyHeaderState::Property) {
        return Some(PlyHeaderState::Property);
    }
    if lx.test_state(PlyHeaderState::EndHeader) {
        return Some(PlyHeaderState::EndHeader);
    }
    Some(PlyHeaderState::Ignore)
}

/// The body grammar: every record is just numbers on a line, tagged as a
/// vertex or facet by which pass is running.
#[derive(Debug, Clone, Copy)]
enum PlyRecordState {
    Vertex,
    Facet,
}

impl Grammar for PlyRecordState {
    fn step(self, lexer: &mut Lexer<'_>) -> Option<Self> {
        match self {
            PlyRecordState::Vertex => record(lexer, Token::Vertex, self),
            PlyRecordState::Facet => record(lexer, Token::Facet, self),
        }
    }
}

fn record(lx: &mut Lexer<'_>, token: Token, state: PlyRecordState) -> Option<PlyRecordState> {
    if lx.at_end_of_input() {
        return None;
    }

    lx.skip_line_breaks();
    lx.skip_white_space();
    lx.skip_line_breaks();

    lx.start_of_a(token);

    // Up to 32 numbers per record.
    let mut read = 0;
    while read < 32 {
        if lx.at_end_of_line() {
            break;
        }
        lx.skip_white_space();

        if !lx.number() {
            return match token {
                Token::Facet => lx.error("Expecting only numbers in the facet specification."),
                _ => lx.error("Expecting only numbers in the vertex specification."),
            };
        }
        lx.this_is_a(Token::Number);
        lx.skip_white_space();

        read += 1;
    }

    lx.end_of_a(token);
    lx.skip_line();

    if lx.test_state(state) {
        return Some(state);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn read(input: &str) -> Result<PlyReader, ImportError> {
        let mut reader = PlyReader::new();
        reader.read_bytes(input.as_bytes())?;
        Ok(reader)
    }

    const TETRAHEDRON: &str = "\
ply
format ascii 1.0
comment made by hand
element vertex 4
property float x
property float y
property float z
element face 4
property list uchar int vertex_indices
end_header
0 0 0
1 0 0
0 1 0
0 0 1
3 0 1 2
3 0 1 3
3 0 2 3
3 1 2 3
";

    #[test]
    fn reads_vertices_and_facets() {
        let reader = read(TETRAHEDRON).unwrap();
        assert_eq!(reader.meshes().len(), 1);

        let mesh = &reader.meshes()[0];
        assert_eq!(mesh.name(), "");
        assert_eq!(mesh.points().len(), 4);
        assert_eq!(mesh.triangles().len(), 4);

        // Face records index the vertex table.
        let first = &mesh.triangles()[0];
        assert_relative_eq!(first.a().x, 0.0);
        assert_relative_eq!(first.b().x, 1.0);
        assert_relative_eq!(first.c().y, 1.0);

        assert!(mesh.is_watertight());
    }

    #[test]
    fn property_order_decides_the_columns() {
        // Swap the x and y property declarations: the same record columns
        // must now land in swapped coordinates.
        let swapped = TETRAHEDRON
            .replace("property float x\nproperty float y", "property float y\nproperty float x");
        let straight = read(TETRAHEDRON).unwrap();
        let reader = read(&swapped).unwrap();

        let point = reader.meshes()[0].points()[1];
        assert_relative_eq!(point.x, 0.0);
        assert_relative_eq!(point.y, 1.0);

        // The reordering must not disturb the untouched column.
        assert_relative_eq!(point.z, straight.meshes()[0].points()[1].z);
    }

    #[test]
    fn extra_vertex_properties_are_skipped_by_offset() {
        let input = "\
ply
element vertex 3
property float nx
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
9 0 0 0
9 1 0 0
9 0 1 0
3 0 1 2
";
        let reader = read(input).unwrap();
        let mesh = &reader.meshes()[0];
        assert_relative_eq!(mesh.points()[1].x, 1.0);
        assert_relative_eq!(mesh.points()[2].y, 1.0);
    }

    #[test]
    fn quad_faces_contribute_only_their_first_triangle() {
        let input = "\
ply
element vertex 4
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
0 0 0
1 0 0
1 1 0
0 1 0
4 0 1 2 3
";
        let reader = read(input).unwrap();
        let mesh = &reader.meshes()[0];
        assert_eq!(mesh.triangles().len(), 1);
        let triangle = &mesh.triangles()[0];
        assert_relative_eq!(triangle.c().y, 1.0);
    }

    #[test]
    fn zero_vertex_count_is_reported() {
        let input = "\
ply
element vertex 0
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
";
        let error = read(input).unwrap_err();
        match error {
            ImportError::Parser { message, .. } => {
                assert!(
                    message.contains("number of vertices was not found"),
                    "{message}"
                );
            }
            other => panic!("expected a parser error, got {other}"),
        }
    }

    #[test]
    fn missing_coordinate_properties_are_reported() {
        let input = "\
ply
element vertex 3
property float x
property float y
element face 1
property list uchar int vertex_indices
end_header
";
        let error = read(input).unwrap_err();
        match error {
            ImportError::Parser { message, .. } => {
                assert!(message.contains("x, y, z indices"), "{message}");
            }
            other => panic!("expected a parser error, got {other}"),
        }
    }

    #[test]
    fn missing_records_are_reported() {
        let input = "\
ply
element vertex 4
property float x
property float y
property float z
element face 4
property list uchar int vertex_indices
end_header
0 0 0
1 0 0
0 1 0
";
        let error = read(input).unwrap_err();
        match error {
            ImportError::Parser { message, .. } => {
                assert!(message.contains("missing vertices"), "{message}");
            }
            other => panic!("expected a parser error, got {other}"),
        }
    }

    #[test]
    fn files_without_a_trailing_newline_are_accepted() {
        let input = TETRAHEDRON.trim_end();
        let reader = read(input).unwrap();
        assert_eq!(reader.meshes()[0].triangles().len(), 4);
    }

    #[test]
    fn missing_header_tag_is_a_lexer_error() {
        let error = read("solid nope\n").unwrap_err();
        match error {
            ImportError::Lexer { line, message, .. } => {
                assert_eq!(line, 1);
                assert!(message.contains("'ply'"), "{message}");
            }
            other => panic!("expected a lexer error, got {other}"),
        }
    }

    #[test]
    fn out_of_range_face_index_is_reported() {
        let input = "\
ply
element vertex 3
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
0 0 0
1 0 0
0 1 0
3 0 1 7
";
        let error = read(input).unwrap_err();
        match error {
            ImportError::Parser { line, message, .. } => {
                assert_eq!(line, Some(12));
                assert!(message.contains("7"), "{message}");
            }
            other => panic!("expected a parser error, got {other}"),
        }
    }
}
