use bitflags::bitflags;

use crate::errors::{Diagnostic, Error, ErrorClass};
use crate::tree::{Metatype, NodeId, NodeKind, Tree};
use crate::Context;

bitflags! {
    /// Postprocessing options. The four content flags are independent and
    /// combinable; `NO_STORE` is an orthogonal modifier that turns a
    /// processing pass into a pure query.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Options: u16 {
        /// Strip exactly the outermost delimiter pair from quoted and
        /// braced strings, leaving inner braces intact.
        const DELETE_QUOTES = 1 << 0;
        /// Replace macro references by their stored expansion text;
        /// undefined macros expand to the empty string with a content
        /// diagnostic.
        const EXPAND_MACROS = 1 << 1;
        /// Concatenate all value parts of a `#`-joined chain into one
        /// string, with no inserted separator.
        const PASTE_STRINGS = 1 << 2;
        /// Collapse each whitespace run to one space and trim leading and
        /// trailing whitespace, within each node only.
        const COLLAPSE_WHITESPACE = 1 << 3;
        /// Compute the result without writing it back into the tree.
        const NO_STORE = 1 << 4;

        /// All four content flags.
        const FULL = Self::DELETE_QUOTES.bits()
            | Self::EXPAND_MACROS.bits()
            | Self::PASTE_STRINGS.bits()
            | Self::COLLAPSE_WHITESPACE.bits();
        /// The fixed set applied to macro-definition values before they
        /// are installed in the macro table.
        const MACRO = Self::DELETE_QUOTES.bits()
            | Self::EXPAND_MACROS.bits()
            | Self::PASTE_STRINGS.bits();
        /// Delimiter stripping only.
        const MINIMAL = Self::DELETE_QUOTES.bits();
    }
}

impl Options {
    /// Just the content flags, ignoring the `NO_STORE` modifier.
    pub fn content_flags(self) -> Options {
        self & Options::FULL
    }
}

/// Collapse interior whitespace runs to single spaces and trim the ends.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    out
}

/// Strip exactly one outermost delimiter pair, if present. A runaway
/// string's partial text has no delimiters and passes through unchanged.
fn strip_delimiters(s: &str) -> &str {
    let stripped = s
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .or_else(|| s.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')));
    stripped.unwrap_or(s)
}

/// Normalize one value node's text under `options`. Expansion runs before
/// delimiter stripping, and stripping before collapsing, so whitespace
/// just inside the delimiters is trimmed away.
fn process_node(tree: &Tree, ctx: &mut Context, id: NodeId, options: Options) -> String {
    let node = tree.node(id);
    match node.kind {
        NodeKind::Macro if options.contains(Options::EXPAND_MACROS) => {
            match ctx.macros().lookup(&node.text) {
                // Stored expansions are already fully normalized.
                Some(text) => text.to_owned(),
                None => {
                    let diag = Diagnostic::new(
                        ErrorClass::Content,
                        format!("undefined macro \"{}\"", node.text),
                        tree.source(),
                        Some(node.line),
                        Some(node.column),
                    );
                    ctx.report(diag);
                    String::new()
                }
            }
        }
        // Digit runs contribute their text verbatim regardless of flags.
        NodeKind::Number => node.text.clone(),
        NodeKind::String => {
            let mut text = if options.contains(Options::DELETE_QUOTES) {
                strip_delimiters(&node.text).to_owned()
            } else {
                node.text.clone()
            };
            if options.contains(Options::COLLAPSE_WHITESPACE) {
                text = collapse_whitespace(&text);
            }
            text
        }
        _ => node.text.clone(),
    }
}

fn process_parts(
    tree: &Tree,
    ctx: &mut Context,
    head: NodeId,
    options: Options,
) -> Vec<(NodeId, String)> {
    let mut parts = Vec::new();
    let mut cur = Some(head);
    while let Some(id) = cur {
        parts.push((id, process_node(tree, ctx, id, options)));
        cur = tree.node(id).next;
    }
    parts
}

fn chain_result(parts: &[(NodeId, String)], options: Options) -> String {
    if options.contains(Options::PASTE_STRINGS) {
        parts.iter().map(|(_, text)| text.as_str()).collect()
    } else {
        // Without pasting, the result covers the head node only.
        parts.first().map(|(_, text)| text.clone()).unwrap_or_default()
    }
}

/// Pure query over a value chain: no tree mutation, safe to repeat with
/// any option set.
pub(crate) fn process_chain_pure(
    tree: &Tree,
    ctx: &mut Context,
    head: NodeId,
    options: Options,
) -> String {
    let parts = process_parts(tree, ctx, head, options);
    chain_result(&parts, options)
}

pub(crate) fn process_field_pure(
    tree: &Tree,
    ctx: &mut Context,
    field: NodeId,
    options: Options,
) -> String {
    match tree.node(field).child {
        Some(head) => process_chain_pure(tree, ctx, head, options),
        None => String::new(),
    }
}

/// Normalize the value chain starting at `head` and return the resulting
/// text. With `mutate` set (and `NO_STORE` clear), the normalized text is
/// written back into the nodes: expanded macro references become plain
/// string nodes, and a pasted chain collapses into its head node. A node
/// stored under one option set must not be reprocessed under an
/// incompatible one; use a pure query when in doubt.
pub fn postprocess_value(
    tree: &mut Tree,
    ctx: &mut Context,
    head: NodeId,
    options: Options,
    mutate: bool,
) -> String {
    let parts = process_parts(tree, ctx, head, options);
    let result = chain_result(&parts, options);
    if mutate && !options.contains(Options::NO_STORE) {
        if options.contains(Options::PASTE_STRINGS) {
            let node = tree.node_mut(head);
            node.text = result.clone();
            node.kind = NodeKind::String;
            node.next = None;
        } else {
            for (id, text) in parts {
                let node = tree.node_mut(id);
                if node.kind == NodeKind::Macro && options.contains(Options::EXPAND_MACROS) {
                    node.kind = NodeKind::String;
                }
                node.text = text;
            }
        }
    }
    result
}

/// Normalize one field's value chain; see [`postprocess_value`].
pub fn postprocess_field(
    tree: &mut Tree,
    ctx: &mut Context,
    field: NodeId,
    options: Options,
    mutate: bool,
) -> String {
    match tree.node(field).child {
        Some(head) => postprocess_value(tree, ctx, head, options, mutate),
        None => String::new(),
    }
}

/// Normalize a whole entry in one pass: every field plus the citation key
/// for regular entries, the single value chain for comment and preamble
/// entries, and table installation for macro definitions (which always use
/// the fixed [`Options::MACRO`] set).
///
/// A macro-definition value that is not a single unquoted string node
/// after processing violates a library invariant and fails fast.
pub fn postprocess_entry(
    tree: &mut Tree,
    ctx: &mut Context,
    entry: NodeId,
    options: Options,
) -> Result<(), Error> {
    match tree.entry_metatype(entry) {
        Metatype::MacroDef => {
            let mut cur = tree.node(entry).child;
            while let Some(field) = cur {
                cur = tree.node(field).next;
                let name = tree.node(field).text.clone();
                let text = postprocess_field(tree, ctx, field, Options::MACRO, true);
                check_macro_value(tree, field)?;
                let (line, column) = tree.position(field);
                let source = tree.source().map(str::to_owned);
                ctx.define_macro(&name, text, source.as_deref(), Some(line), Some(column));
            }
        }
        Metatype::Comment | Metatype::Preamble => {
            if !options.content_flags().is_empty() {
                let mutate = !options.contains(Options::NO_STORE);
                if let Some(head) = tree.node(entry).child {
                    postprocess_value(tree, ctx, head, options, mutate);
                }
            }
        }
        Metatype::Regular => {
            if !options.content_flags().is_empty() {
                let mutate = !options.contains(Options::NO_STORE);
                if mutate && options.contains(Options::COLLAPSE_WHITESPACE) {
                    if let Some(first) = tree.node(entry).child {
                        if tree.node(first).kind == NodeKind::Key {
                            let key = collapse_whitespace(&tree.node(first).text);
                            tree.node_mut(first).text = key;
                        }
                    }
                }
                let mut prev = None;
                while let Some((field, _)) = tree.next_field(entry, prev) {
                    postprocess_field(tree, ctx, field, options, mutate);
                    prev = Some(field);
                }
            }
        }
        Metatype::Unknown => {}
    }
    Ok(())
}

/// After MACRO processing a definition's value must be a single string
/// node with its delimiters gone; anything else is a library defect.
fn check_macro_value(tree: &Tree, field: NodeId) -> Result<(), Error> {
    let ok = match tree.node(field).child {
        Some(value) => {
            let v = tree.node(value);
            v.next.is_none()
                && v.kind == NodeKind::String
                && !v.text.starts_with('"')
                && !v.text.starts_with('{')
                && !v.text.ends_with('"')
                && !v.text.ends_with('}')
        }
        None => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::Internal(
            "macro value was not correctly preprocessed".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Collector;

    fn chain_tree(values: &[(NodeKind, &str)]) -> (Tree, NodeId, NodeId) {
        let mut t = Tree::new(Some("test.bib".to_string()));
        let field = t.alloc(NodeKind::Field, Metatype::Unknown, "title".into(), 1, 1);
        let mut prev: Option<NodeId> = None;
        let mut head = None;
        for (kind, text) in values {
            let id = t.alloc(*kind, Metatype::Unknown, (*text).to_string(), 1, 1);
            match prev {
                None => {
                    t.node_mut(field).child = Some(id);
                    head = Some(id);
                }
                Some(p) => t.node_mut(p).next = Some(id),
            }
            prev = Some(id);
        }
        let head = head.expect("at least one value");
        (t, field, head)
    }

    #[test]
    fn collapse_trims_and_merges_runs() {
        assert_eq!(collapse_whitespace("  a \t b \n c  "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
        assert_eq!(collapse_whitespace(" \t "), "");
    }

    #[test]
    fn delete_quotes_leaves_inner_braces() {
        let (mut t, field, _) = chain_tree(&[(NodeKind::String, "{a {b} c}")]);
        let mut ctx = Context::new();
        let text = postprocess_field(&mut t, &mut ctx, field, Options::MINIMAL, false);
        assert_eq!(text, "a {b} c");
    }

    #[test]
    fn partial_runaway_text_is_not_stripped() {
        let (mut t, field, _) = chain_tree(&[(NodeKind::String, "never closed")]);
        let mut ctx = Context::new();
        let text = postprocess_field(&mut t, &mut ctx, field, Options::FULL, false);
        assert_eq!(text, "never closed");
    }

    #[test]
    fn paste_joins_without_separator() {
        let (mut t, field, _) = chain_tree(&[
            (NodeKind::String, "{Selected Papers on }"),
            (NodeKind::String, "\"Computer Science\""),
        ]);
        let mut ctx = Context::new();
        let text = postprocess_field(&mut t, &mut ctx, field, Options::FULL, false);
        assert_eq!(text, "Selected Papers onComputer Science");
    }

    #[test]
    fn numbers_pass_through_verbatim() {
        let (mut t, field, _) = chain_tree(&[(NodeKind::Number, "1997")]);
        let mut ctx = Context::new();
        let text = postprocess_field(&mut t, &mut ctx, field, Options::FULL, false);
        assert_eq!(text, "1997");
    }

    #[test]
    fn undefined_macro_degrades_to_empty_with_diagnostic() {
        let collector = Collector::new();
        let mut ctx = Context::with_sink(Box::new(collector.clone()));
        let (mut t, field, _) = chain_tree(&[
            (NodeKind::String, "{before-}"),
            (NodeKind::Macro, "nosuch"),
        ]);
        let text = postprocess_field(&mut t, &mut ctx, field, Options::FULL, false);
        assert_eq!(text, "before-");
        assert_eq!(collector.count(ErrorClass::Content), 1);
        assert!(collector.diagnostics()[0].message.contains("nosuch"));
    }

    #[test]
    fn defined_macro_expands_to_stored_text() {
        let mut ctx = Context::new();
        ctx.define_macro("tcs", "Theor. Comput. Sci.".to_string(), None, None, None);
        let (mut t, field, _) = chain_tree(&[(NodeKind::Macro, "tcs")]);
        let text = postprocess_field(&mut t, &mut ctx, field, Options::FULL, false);
        assert_eq!(text, "Theor. Comput. Sci.");
    }

    #[test]
    fn mutating_paste_collapses_chain_to_head() {
        let (mut t, field, head) = chain_tree(&[
            (NodeKind::String, "{a}"),
            (NodeKind::String, "{b}"),
        ]);
        let mut ctx = Context::new();
        let text = postprocess_field(&mut t, &mut ctx, field, Options::FULL, true);
        assert_eq!(text, "ab");
        assert_eq!(t.text(head), "ab");
        assert_eq!(t.kind(head), NodeKind::String);
        assert!(t.next_value(field, Some(head)).is_none());
    }

    #[test]
    fn pure_query_is_idempotent_and_leaves_tree_alone() {
        let (mut t, field, head) = chain_tree(&[
            (NodeKind::String, "{ spaced   out }"),
            (NodeKind::Number, "3"),
        ]);
        let mut ctx = Context::new();
        let a = postprocess_field(&mut t, &mut ctx, field, Options::FULL, false);
        let b = postprocess_field(&mut t, &mut ctx, field, Options::FULL, false);
        assert_eq!(a, b);
        assert_eq!(a, "spaced out3");
        assert_eq!(t.text(head), "{ spaced   out }");
    }

    #[test]
    fn no_store_overrides_mutate() {
        let (mut t, field, head) = chain_tree(&[(NodeKind::String, "{x}")]);
        let mut ctx = Context::new();
        let opts = Options::FULL | Options::NO_STORE;
        let text = postprocess_field(&mut t, &mut ctx, field, opts, true);
        assert_eq!(text, "x");
        assert_eq!(t.text(head), "{x}");
    }
}
