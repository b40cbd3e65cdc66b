//! Backtracking character-level lexer shared by the STL, OBJ and PLY
//! grammars.
//!
//! The lexer walks an in-memory buffer one character at a time and knows
//! nothing about any file format. A grammar is an enum of states driven by
//! [`Lexer::run`]; each state consumes input through the primitives here
//! and emits [`Item`]s into a tree. Two mechanisms keep the grammars free
//! of hand-written bookkeeping:
//!
//! - every failing match ([`Lexer::match_exactly`], the numeric literals)
//!   restores the cursor, so states compose without save/restore noise;
//! - [`Lexer::test_state`] runs a state speculatively ("dry run"): item
//!   emission is suppressed, the cursor snapshot is restored afterwards,
//!   and only the accepted-or-not verdict escapes. Grammars use it to pick
//!   between branches with arbitrary lookahead.

use crate::error::ImportError;

const DIGITS: &str = "0123456789";
const WORD_CHARACTERS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-.";

/// The kinds of item the three grammars emit, plus the shared internal
/// markers (`Parent` for the synthetic tree root, `Error` for recorded
/// diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Synthetic root of an item tree.
    Parent,
    /// A recorded diagnostic.
    Error,
    /// A numeric literal.
    Number,
    /// A bare word (names, property types).
    Word,
    /// An STL `solid` block or an OBJ object.
    Solid,
    /// A facet record.
    Facet,
    /// The vertex list of an STL facet (`outer loop` .. `endloop`).
    Vertices,
    /// Three numbers on a line (STL normals and vertices).
    ThreeVector,
    /// A vertex record.
    Vertex,
    /// The PLY header block.
    Header,
    /// A PLY `element` declaration.
    Element,
    /// A PLY `property` declaration.
    Property,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Token::Parent => "Parent",
            Token::Error => "Error",
            Token::Number => "Number",
            Token::Word => "Word",
            Token::Solid => "Solid",
            Token::Facet => "Facet",
            Token::Vertices => "Vertices",
            Token::ThreeVector => "ThreeVector",
            Token::Vertex => "Vertex",
            Token::Header => "Header",
            Token::Element => "Element",
            Token::Property => "Property",
        };
        f.write_str(name)
    }
}

/// Index of an [`Item`] within its [`ItemTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemId(usize);

/// One matched span in the item tree.
#[derive(Debug, Clone)]
pub struct Item {
    /// What the span was matched as.
    pub token: Token,
    /// Byte offset of the start of the captured span (reserved for richer
    /// diagnostics).
    #[allow(dead_code)]
    pub position: usize,
    /// 1-based line number of the captured span.
    pub line: usize,
    /// The captured text.
    pub value: String,
    /// Diagnostic text, set only on `Error` items (reserved for richer
    /// diagnostics).
    #[allow(dead_code)]
    pub error: String,
    /// The owning item; `None` only for the synthetic root.
    pub parent: Option<ItemId>,
    /// Child items, in emission order.
    pub children: Vec<ItemId>,
}

/// The parse tree of one lexer run, stored as an arena so that child lists
/// and parent back-references can coexist without ownership cycles.
///
/// The tree is append-only while a run is in progress and immutable once
/// [`Lexer::run`] returns it.
#[derive(Debug)]
pub struct ItemTree {
    items: Vec<Item>,
}

impl ItemTree {
    /// The synthetic root item.
    pub const ROOT: ItemId = ItemId(0);

    fn new() -> Self {
        Self {
            items: vec![Item {
                token: Token::Parent,
                position: 0,
                line: 1,
                value: String::new(),
                error: String::new(),
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    fn append_child(&mut self, parent: ItemId, mut item: Item) -> ItemId {
        let id = ItemId(self.items.len());
        item.parent = Some(parent);
        self.items.push(item);
        self.items[parent.0].children.push(id);
        id
    }

    /// The top-level items of the run, in emission order.
    pub fn root_items(&self) -> impl Iterator<Item = &Item> {
        self[Self::ROOT].children.iter().map(|&id| &self[id])
    }
}

impl std::ops::Index<ItemId> for ItemTree {
    type Output = Item;

    fn index(&self, id: ItemId) -> &Item {
        &self.items[id.0]
    }
}

/// A grammar state machine: each state consumes input and names its
/// successor, or returns `None` when the run is complete (or a diagnostic
/// was recorded via [`Lexer::error`]).
///
/// States must route every effect on the item tree through the emission
/// primitives, which self-suppress under dry run; with that, a state is
/// automatically safe to probe with [`Lexer::test_state`].
pub trait Grammar: Copy {
    /// Run this state once against the lexer.
    fn step(self, lexer: &mut Lexer<'_>) -> Option<Self>;
}

/// Snapshot of the cursor fields, taken before any speculative work and
/// restored on failure.
#[derive(Clone, Copy)]
struct Cursor {
    position: usize,
    start: usize,
    line: usize,
}

/// The character-cursor state machine.
pub struct Lexer<'a> {
    input: &'a [u8],
    position: usize,
    /// Start of the pending (not yet committed or emitted) span.
    start: usize,
    /// 1-based; incremented whenever a line break is consumed.
    line: usize,
    /// Dry-run depth. Non-zero suppresses item emission and diagnostics.
    dry_run: u32,
    tree: ItemTree,
    /// The currently open parent item.
    open: ItemId,
    /// Most recent diagnostic, including those suppressed by dry run.
    last_diagnostic: Option<(usize, String)>,
    /// Whether the state currently being probed recorded a diagnostic.
    state_errored: bool,
    /// The diagnostic that aborts the current run.
    fatal: Option<ImportError>,
}

impl<'a> Lexer<'a> {
    const ORIGIN: &'static str = "Lexer";

    /// Create a lexer over a complete in-memory file.
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            position: 0,
            start: 0,
            line: 1,
            dry_run: 0,
            tree: ItemTree::new(),
            open: ItemTree::ROOT,
            last_diagnostic: None,
            state_errored: false,
            fatal: None,
        }
    }

    /// Drive `initial` until a state returns `None`, then hand back the
    /// finished item tree.
    ///
    /// With `line_limit > 0` the run also stops once the current line
    /// exceeds `start_line + line_limit`; the PLY reader uses this to read
    /// exactly the record counts its header declared. Cursor state persists
    /// across calls, so one lexer can run several grammars over consecutive
    /// sections of the same buffer. Each call builds a fresh tree.
    pub fn run<G: Grammar>(
        &mut self,
        initial: G,
        line_limit: usize,
    ) -> Result<ItemTree, ImportError> {
        self.tree = ItemTree::new();
        self.open = ItemTree::ROOT;
        self.fatal = None;

        let start_line = self.line;
        let mut state = Some(initial);
        while let Some(current) = state {
            if line_limit > 0 && self.line > start_line + line_limit {
                break;
            }
            state = current.step(self);
            if self.fatal.is_some() {
                break;
            }
        }

        match self.fatal.take() {
            Some(error) => Err(error),
            None => Ok(std::mem::replace(&mut self.tree, ItemTree::new())),
        }
    }

    fn cursor(&self) -> Cursor {
        Cursor {
            position: self.position,
            start: self.start,
            line: self.line,
        }
    }

    fn restore(&mut self, cursor: Cursor) {
        self.position = cursor.position;
        self.start = cursor.start;
        self.line = cursor.line;
    }

    /// Consume and return the next character, or `None` at end of input.
    pub fn next(&mut self) -> Option<char> {
        let byte = *self.input.get(self.position)?;
        self.position += 1;
        if byte == b'\n' {
            self.line += 1;
        }
        Some(byte as char)
    }

    /// Look at the next character without consuming it.
    pub fn peek(&self) -> Option<char> {
        self.input.get(self.position).map(|&byte| byte as char)
    }

    /// True once the whole input has been consumed.
    pub fn at_end_of_input(&self) -> bool {
        self.position >= self.input.len()
    }

    /// True when the cursor sits on a line break or at end of input.
    pub fn at_end_of_line(&self) -> bool {
        matches!(self.peek(), None | Some('\n') | Some('\r'))
    }

    /// Commit the pending span as consumed without emitting an item.
    pub fn skip(&mut self) {
        self.start = self.position;
    }

    fn pending_value(&self) -> String {
        String::from_utf8_lossy(&self.input[self.start..self.position]).into_owned()
    }

    /// Consume one character if it is in `set`.
    pub fn one_of(&mut self, set: &str) -> bool {
        match self.peek() {
            Some(c) if set.contains(c) => {
                self.next();
                true
            }
            _ => false,
        }
    }

    /// Greedily consume characters from `set`; false (and nothing consumed)
    /// on zero matches.
    pub fn many_of(&mut self, set: &str) -> bool {
        let mut any = false;
        while self.one_of(set) {
            any = true;
        }
        any
    }

    /// Consume `literal` in full, or restore the cursor and return false.
    pub fn match_exactly(&mut self, literal: &str) -> bool {
        let before = self.cursor();
        for expected in literal.chars() {
            if self.next() != Some(expected) {
                self.restore(before);
                return false;
            }
        }
        true
    }

    /// Consume characters until `literal` would match, leaving the cursor
    /// just before it. False when the input ends first.
    pub fn until(&mut self, literal: &str) -> bool {
        while !self.at_end_of_input() {
            let probe = self.cursor();
            if self.match_exactly(literal) {
                self.restore(probe);
                return true;
            }
            self.next();
        }
        false
    }

    /// Consume a run of digits.
    pub fn many_digits(&mut self) -> bool {
        self.many_of(DIGITS)
    }

    /// Consume a run of word characters (letters, digits, `_`, `-`, `.`),
    /// the charset of names and property types.
    pub fn many_characters(&mut self) -> bool {
        self.many_of(WORD_CHARACTERS)
    }

    /// Consume an integer literal: optional sign, then one or more digits.
    pub fn integer(&mut self) -> bool {
        let before = self.cursor();
        self.one_of("+-");
        if !self.many_digits() {
            self.restore(before);
            return false;
        }
        true
    }

    /// Consume a float literal: optional sign, digits, `.`, digits. Both
    /// digit runs are mandatory, so `1.` and `.5` are rejected.
    pub fn float(&mut self) -> bool {
        let before = self.cursor();
        self.one_of("+-");
        if !self.many_digits() || !self.one_of(".") || !self.many_digits() {
            self.restore(before);
            return false;
        }
        true
    }

    /// Consume a number: a float or integer, optionally followed by an
    /// exponent. An `e`/`E` not followed by a valid exponent is left
    /// unconsumed and the base match still succeeds.
    pub fn number(&mut self) -> bool {
        if !self.float() && !self.integer() {
            return false;
        }
        let before_exponent = self.cursor();
        if self.one_of("eE") && !self.float() && !self.integer() {
            self.restore(before_exponent);
        }
        true
    }

    /// Consume and commit a run of spaces, tabs and carriage returns.
    pub fn skip_white_space(&mut self) -> bool {
        if !self.many_of(" \t\r") {
            return false;
        }
        self.skip();
        true
    }

    /// Consume and commit a single line break (`\n`, tolerating a
    /// preceding `\r`).
    pub fn skip_line_break(&mut self) -> bool {
        let before = self.cursor();
        self.one_of("\r");
        if !self.one_of("\n") {
            self.restore(before);
            return false;
        }
        self.skip();
        true
    }

    /// Consume and commit one or more line breaks.
    pub fn skip_line_breaks(&mut self) -> bool {
        if !self.skip_line_break() {
            return false;
        }
        while self.skip_line_break() {}
        true
    }

    /// Consume and commit the rest of the current line including its line
    /// break. False when already at end of input.
    pub fn skip_line(&mut self) -> bool {
        if self.at_end_of_input() {
            return false;
        }
        self.until("\n");
        self.skip_line_break();
        self.skip();
        true
    }

    /// Consume the rest of the current line, leaving the line break
    /// pending. The consumed text stays in the pending span.
    pub fn rest_of_line(&mut self) -> bool {
        let mut any = false;
        while !self.at_end_of_line() {
            self.next();
            any = true;
        }
        any
    }

    /// True while a [`Lexer::test_state`] probe is in progress.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run > 0
    }

    /// Emit the pending span as a leaf item under the open parent and
    /// commit it. Returns `None` in dry run.
    pub fn this_is_a(&mut self, token: Token) -> Option<ItemId> {
        if self.is_dry_run() {
            return None;
        }
        let item = Item {
            token,
            position: self.start,
            line: self.line,
            value: self.pending_value(),
            error: String::new(),
            parent: None,
            children: Vec::new(),
        };
        self.skip();
        Some(self.tree.append_child(self.open, item))
    }

    /// Emit like [`Lexer::this_is_a`], then make the new item the open
    /// parent: subsequent emissions become its children.
    pub fn start_of_a(&mut self, token: Token) -> Option<ItemId> {
        let id = self.this_is_a(token)?;
        self.open = id;
        Some(id)
    }

    /// Close the open parent, restoring its own parent as open. Closing an
    /// item of a different kind than `token` is a grammar bug and records
    /// a fatal lexer diagnostic.
    pub fn end_of_a(&mut self, token: Token) {
        if self.is_dry_run() {
            return;
        }
        let open = &self.tree[self.open];
        if open.token != token {
            let message = format!(
                "expected to close a {token} item, but a {} item is open",
                open.token
            );
            self.record_diagnostic(message);
            return;
        }
        self.open = open.parent.unwrap_or(ItemTree::ROOT);
    }

    /// Close the open parent only if it is a `token` item; no-op otherwise.
    /// Used where a block may or may not still be open, such as consecutive
    /// `element` blocks in a PLY header.
    pub fn maybe_end_of_a(&mut self, token: Token) -> bool {
        if self.is_dry_run() || self.open == ItemTree::ROOT {
            return false;
        }
        let open = &self.tree[self.open];
        if open.token != token {
            return false;
        }
        self.open = open.parent.unwrap_or(ItemTree::ROOT);
        true
    }

    /// Record a line-tagged diagnostic and return the terminal signal for
    /// the calling state. In dry run only the last-diagnostic slot is
    /// updated, so a failed probe costs nothing.
    pub fn error<S>(&mut self, message: impl Into<String>) -> Option<S> {
        let message = message.into();
        self.last_diagnostic = Some((self.line, message.clone()));
        self.state_errored = true;
        if !self.is_dry_run() {
            self.record_diagnostic(message);
        }
        None
    }

    /// Re-raise the most recent diagnostic, including one recorded during a
    /// dry run. Used when every candidate branch has been probed and
    /// rejected, so the best explanation of the failure is the last probe's.
    pub fn last_error<S>(&mut self) -> Option<S> {
        match self.last_diagnostic.clone() {
            Some((line, message)) => {
                self.state_errored = true;
                if !self.is_dry_run() {
                    self.record_diagnostic_at(line, message);
                }
                None
            }
            None => self.error("the input does not match any recognized construct"),
        }
    }

    fn record_diagnostic(&mut self, message: String) {
        self.record_diagnostic_at(self.line, message);
    }

    fn record_diagnostic_at(&mut self, line: usize, message: String) {
        let item = Item {
            token: Token::Error,
            position: self.position,
            line,
            value: String::new(),
            error: message.clone(),
            parent: None,
            children: Vec::new(),
        };
        self.tree.append_child(ItemTree::ROOT, item);
        if self.fatal.is_none() {
            self.fatal = Some(ImportError::lexer(Self::ORIGIN, line, message));
        }
    }

    /// Probe `state` in dry-run mode: no items are emitted, the cursor is
    /// fully restored, and the return value reports whether the state
    /// accepted the input — it either yielded a continuation or completed
    /// without recording a diagnostic. The latter lets grammars probe
    /// closing states such as the PLY `end_header`, which accept by
    /// terminating. This is the engine's only lookahead mechanism; dry run
    /// nests, so probed states may probe further, and a nested probe's
    /// verdict never leaks into the outer one.
    pub fn test_state<G: Grammar>(&mut self, state: G) -> bool {
        let before = self.cursor();
        let errored_before = self.state_errored;
        self.dry_run += 1;
        self.state_errored = false;
        let next = state.step(self);
        let accepted = next.is_some() || !self.state_errored;
        self.state_errored = errored_before;
        self.dry_run -= 1;
        self.restore(before);
        accepted
    }
}
