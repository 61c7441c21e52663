use crate::errors::{Diagnostic, Error, ErrorClass};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::post::{self, Options};
use crate::tree::{Metatype, NodeId, NodeKind, Tree};
use crate::{Context, Outcome};

/// Result of one attempt to parse the next entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Parsed {
    /// An entry was parsed and postprocessed; the node is allocated in the
    /// tree but not yet linked into its entry chain.
    Entry(NodeId),
    /// A malformed entry was reported and abandoned; the lexer has been
    /// resynchronized to the next `@`.
    Skipped,
    Eof,
}

/// Marker that a syntax diagnostic was already reported and the lexer
/// resynchronized; the current entry is lost but parsing can go on.
struct Recovery;

/// One-token lookahead over the lexer.
struct Cursor<'a> {
    lexer: &'a mut Lexer,
    peeked: Option<Token>,
}

impl Cursor<'_> {
    fn next(&mut self, ctx: &mut Context) -> Token {
        match self.peeked.take() {
            Some(tok) => tok,
            None => self.lexer.next_token(ctx),
        }
    }

    fn peek(&mut self, ctx: &mut Context) -> &TokenKind {
        if self.peeked.is_none() {
            let tok = self.lexer.next_token(ctx);
            self.peeked = Some(tok);
        }
        match self.peeked.as_ref() {
            Some(tok) => &tok.kind,
            None => unreachable!("lookahead was just filled"),
        }
    }

    fn syntax_error(&mut self, ctx: &mut Context, tok: &Token, expected: &str) -> Recovery {
        ctx.report(Diagnostic::new(
            ErrorClass::Syntax,
            format!("syntax error: found {}, expected {}", tok.kind, expected),
            self.lexer.source(),
            Some(tok.line),
            Some(tok.column),
        ));
        log::debug!("giving up on current entry, resynchronizing at next `@`");
        self.peeked = None;
        self.lexer.resync();
        Recovery
    }
}

/// Parse the next entry from the token stream into `tree` and run entry
/// postprocessing on it. Regular entries use the caller's `options`;
/// macro definitions always use [`Options::MACRO`]; comment and preamble
/// entries use the option sets configured on the context.
///
/// The returned entry node is not linked into `tree`'s entry chain; the
/// caller decides whether it becomes the first entry or a sibling.
pub(crate) fn parse_next(
    lexer: &mut Lexer,
    ctx: &mut Context,
    tree: &mut Tree,
    options: Options,
) -> Result<Parsed, Error> {
    let mut cur = Cursor { lexer, peeked: None };
    let tok = cur.next(ctx);
    match tok.kind {
        TokenKind::Eof => Ok(Parsed::Eof),
        TokenKind::At => match parse_entry(&mut cur, ctx, tree, &tok) {
            Ok(entry) => {
                let effective = match tree.entry_metatype(entry) {
                    Metatype::MacroDef => Options::MACRO,
                    Metatype::Regular => options,
                    mt => ctx.string_options(mt),
                };
                post::postprocess_entry(tree, ctx, entry, effective)?;
                Ok(Parsed::Entry(entry))
            }
            Err(Recovery) => Ok(Parsed::Skipped),
        },
        _ => {
            cur.syntax_error(ctx, &tok, "`@`");
            Ok(Parsed::Skipped)
        }
    }
}

fn parse_entry(
    cur: &mut Cursor<'_>,
    ctx: &mut Context,
    tree: &mut Tree,
    at: &Token,
) -> Result<NodeId, Recovery> {
    let tok = cur.next(ctx);
    let type_name = match tok.kind {
        TokenKind::Name(s) => s,
        _ => return Err(cur.syntax_error(ctx, &tok, "an entry type")),
    };
    let metatype = if type_name.eq_ignore_ascii_case("comment") {
        Metatype::Comment
    } else if type_name.eq_ignore_ascii_case("preamble") {
        Metatype::Preamble
    } else if type_name.eq_ignore_ascii_case("string") {
        Metatype::MacroDef
    } else {
        Metatype::Regular
    };
    let entry = tree.alloc(
        NodeKind::Entry,
        metatype,
        type_name.to_ascii_lowercase(),
        at.line,
        at.column,
    );

    let open = cur.next(ctx);
    if open.kind != TokenKind::EntryOpen {
        return Err(cur.syntax_error(ctx, &open, "`{` or `(`"));
    }

    match metatype {
        Metatype::Comment | Metatype::Preamble => {
            parse_value_chain(cur, ctx, tree, entry)?;
            let close = cur.next(ctx);
            if close.kind != TokenKind::EntryClose {
                return Err(cur.syntax_error(ctx, &close, "`#` or end of entry"));
            }
        }
        Metatype::MacroDef => {
            // Macro names keep their case as written.
            parse_field_list(cur, ctx, tree, entry, None, false)?;
        }
        Metatype::Regular => parse_regular_body(cur, ctx, tree, entry)?,
        Metatype::Unknown => {}
    }
    Ok(entry)
}

/// Body of a regular entry: an optional citation key, then fields. A
/// leading name followed by `=` is the first field of a keyless entry; a
/// leading name or number followed by `,` or the closer is the key.
fn parse_regular_body(
    cur: &mut Cursor<'_>,
    ctx: &mut Context,
    tree: &mut Tree,
    entry: NodeId,
) -> Result<(), Recovery> {
    let tok = cur.next(ctx);
    let (text, is_name) = match tok.kind {
        TokenKind::EntryClose => return Ok(()),
        TokenKind::Name(ref s) => (s.clone(), true),
        TokenKind::Number(ref s) => (s.clone(), false),
        _ => return Err(cur.syntax_error(ctx, &tok, "a citation key or field name")),
    };

    match cur.peek(ctx) {
        TokenKind::Comma => {
            let key = tree.alloc(NodeKind::Key, Metatype::Unknown, text, tok.line, tok.column);
            let mut prev = None;
            attach(tree, entry, &mut prev, key);
            cur.next(ctx);
            parse_field_list(cur, ctx, tree, entry, prev, true)
        }
        TokenKind::EntryClose => {
            let key = tree.alloc(NodeKind::Key, Metatype::Unknown, text, tok.line, tok.column);
            let mut prev = None;
            attach(tree, entry, &mut prev, key);
            cur.next(ctx);
            Ok(())
        }
        TokenKind::Equals if is_name => {
            cur.next(ctx);
            let field = tree.alloc(
                NodeKind::Field,
                Metatype::Unknown,
                text.to_ascii_lowercase(),
                tok.line,
                tok.column,
            );
            let mut prev = None;
            attach(tree, entry, &mut prev, field);
            match finish_field(cur, ctx, tree, field)? {
                Sep::Done => Ok(()),
                Sep::More => parse_field_list(cur, ctx, tree, entry, prev, true),
            }
        }
        _ => {
            let tok = cur.next(ctx);
            Err(cur.syntax_error(ctx, &tok, "`,`, `=`, or end of entry"))
        }
    }
}

/// Parse `name = value` assignments until the entry closer. A trailing
/// comma before the closer is tolerated.
fn parse_field_list(
    cur: &mut Cursor<'_>,
    ctx: &mut Context,
    tree: &mut Tree,
    entry: NodeId,
    mut prev: Option<NodeId>,
    lowercase: bool,
) -> Result<(), Recovery> {
    loop {
        let tok = cur.next(ctx);
        let name = match tok.kind {
            TokenKind::EntryClose => return Ok(()),
            TokenKind::Name(s) => {
                if lowercase {
                    s.to_ascii_lowercase()
                } else {
                    s
                }
            }
            _ => return Err(cur.syntax_error(ctx, &tok, "a field name or end of entry")),
        };
        let field = tree.alloc(NodeKind::Field, Metatype::Unknown, name, tok.line, tok.column);
        attach(tree, entry, &mut prev, field);

        let eq = cur.next(ctx);
        if eq.kind != TokenKind::Equals {
            return Err(cur.syntax_error(ctx, &eq, "`=`"));
        }
        match finish_field(cur, ctx, tree, field)? {
            Sep::Done => return Ok(()),
            Sep::More => {}
        }
    }
}

enum Sep {
    More,
    Done,
}

fn finish_field(
    cur: &mut Cursor<'_>,
    ctx: &mut Context,
    tree: &mut Tree,
    field: NodeId,
) -> Result<Sep, Recovery> {
    parse_value_chain(cur, ctx, tree, field)?;
    let sep = cur.next(ctx);
    match sep.kind {
        TokenKind::Comma => Ok(Sep::More),
        TokenKind::EntryClose => Ok(Sep::Done),
        _ => Err(cur.syntax_error(ctx, &sep, "`,` or end of entry")),
    }
}

/// Parse one or more `#`-joined value parts as children of `head`.
fn parse_value_chain(
    cur: &mut Cursor<'_>,
    ctx: &mut Context,
    tree: &mut Tree,
    head: NodeId,
) -> Result<(), Recovery> {
    let mut prev: Option<NodeId> = None;
    loop {
        let tok = cur.next(ctx);
        let node = match tok.kind {
            TokenKind::Delimited(text) => {
                tree.alloc(NodeKind::String, Metatype::Unknown, text, tok.line, tok.column)
            }
            TokenKind::Number(text) => {
                tree.alloc(NodeKind::Number, Metatype::Unknown, text, tok.line, tok.column)
            }
            TokenKind::Name(text) => {
                tree.alloc(NodeKind::Macro, Metatype::Unknown, text, tok.line, tok.column)
            }
            _ => {
                return Err(cur.syntax_error(
                    ctx,
                    &tok,
                    "a value (string, number, or macro name)",
                ))
            }
        };
        attach(tree, head, &mut prev, node);
        if *cur.peek(ctx) == TokenKind::Hash {
            cur.next(ctx);
        } else {
            return Ok(());
        }
    }
}

fn attach(tree: &mut Tree, parent: NodeId, prev: &mut Option<NodeId>, node: NodeId) {
    match *prev {
        None => tree.node_mut(parent).child = Some(node),
        Some(p) => tree.node_mut(p).next = Some(node),
    }
    *prev = Some(node);
}

/// Iterator over the entries of one input text. Each `next` call parses
/// and postprocesses one entry into its own tree; macro definitions seen
/// along the way accumulate in the context as usual.
pub struct Entries<'a> {
    ctx: &'a mut Context,
    lexer: Lexer,
    options: Options,
    finished: bool,
}

impl<'a> Entries<'a> {
    pub(crate) fn new(
        ctx: &'a mut Context,
        text: &str,
        source: Option<&str>,
        options: Options,
    ) -> Entries<'a> {
        Entries {
            ctx,
            lexer: Lexer::new(text, source, 1),
            options,
            finished: false,
        }
    }
}

impl Iterator for Entries<'_> {
    type Item = Result<Outcome, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let mut tree = Tree::new(self.lexer.source().map(str::to_owned));
        match parse_next(&mut self.lexer, self.ctx, &mut tree, self.options) {
            Ok(Parsed::Entry(id)) => {
                tree.first = Some(id);
                let classes = self.ctx.take_classes();
                Some(Ok(Outcome {
                    tree: Some(tree),
                    ok: !classes.is_failure(),
                    classes,
                }))
            }
            Ok(Parsed::Skipped) => {
                let classes = self.ctx.take_classes();
                Some(Ok(Outcome {
                    tree: None,
                    ok: false,
                    classes,
                }))
            }
            Ok(Parsed::Eof) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
