use crate::post;
use crate::post::Options;
use crate::Context;

/// Index of a node in a [`Tree`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// What a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// One `@type(...)` record; its text is the (lowercased) entry type.
    Entry,
    /// The citation key of a regular entry.
    Key,
    /// A `name = value` assignment; its text is the field or macro name.
    Field,
    /// A delimited string literal; its text keeps the outermost delimiters
    /// until postprocessing strips them.
    String,
    /// A bare digit run.
    Number,
    /// An undelimited name in value position, resolved against the macro
    /// table.
    Macro,
}

/// Classification of an entry, selected by its type keyword. Meaningful
/// only on [`NodeKind::Entry`] nodes and fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Metatype {
    Unknown,
    Regular,
    Comment,
    Preamble,
    MacroDef,
}

impl Metatype {
    pub(crate) fn index(self) -> usize {
        match self {
            Metatype::Unknown => 0,
            Metatype::Regular => 1,
            Metatype::Comment => 2,
            Metatype::Preamble => 3,
            Metatype::MacroDef => 4,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) metatype: Metatype,
    pub(crate) text: String,
    pub(crate) line: u32,
    pub(crate) column: u32,
    pub(crate) next: Option<NodeId>,
    pub(crate) child: Option<NodeId>,
}

/// The parse tree for one entry or one file of entries.
///
/// Nodes live in an index-addressed arena owned by the tree; sibling and
/// child relations are indices into it. Dropping the tree releases every
/// node and its text at once. Entries form a sibling chain from
/// [`Tree::next_entry`]; a regular entry's children are an optional key
/// node followed by field nodes, and each field's children are the
/// `#`-joined value parts in order.
#[derive(Debug)]
pub struct Tree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) first: Option<NodeId>,
    pub(crate) source: Option<String>,
}

impl Tree {
    pub(crate) fn new(source: Option<String>) -> Tree {
        Tree {
            nodes: Vec::new(),
            first: None,
            source,
        }
    }

    pub(crate) fn alloc(
        &mut self,
        kind: NodeKind,
        metatype: Metatype,
        text: String,
        line: u32,
        column: u32,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            metatype,
            text,
            line,
            column,
            next: None,
            child: None,
        });
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Name of the source this tree was parsed from, if known.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// The node's kind.
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    /// The node's raw text, exactly as stored (delimiters intact for
    /// string nodes that have not been postprocessed in place).
    pub fn text(&self, id: NodeId) -> &str {
        &self.node(id).text
    }

    /// Source position (line, column) of the node, 1-based.
    pub fn position(&self, id: NodeId) -> (u32, u32) {
        let n = self.node(id);
        (n.line, n.column)
    }

    /// First entry of the tree, or `None` for an empty tree.
    pub fn first_entry(&self) -> Option<NodeId> {
        self.first
    }

    /// Walk the entry chain: `None` for `prev` yields the first entry,
    /// otherwise the entry following `prev`.
    pub fn next_entry(&self, prev: Option<NodeId>) -> Option<NodeId> {
        match prev {
            None => self.first,
            Some(p) => {
                if self.node(p).kind != NodeKind::Entry {
                    return None;
                }
                self.node(p).next
            }
        }
    }

    /// The entry's metatype, or `Unknown` if the node is not an entry.
    pub fn entry_metatype(&self, entry: NodeId) -> Metatype {
        let n = self.node(entry);
        if n.kind != NodeKind::Entry {
            return Metatype::Unknown;
        }
        n.metatype
    }

    /// The entry's (lowercased) type name.
    pub fn entry_type(&self, entry: NodeId) -> Option<&str> {
        let n = self.node(entry);
        if n.kind != NodeKind::Entry {
            return None;
        }
        Some(&n.text)
    }

    /// The citation key of a regular entry, if it has one.
    pub fn entry_key(&self, entry: NodeId) -> Option<&str> {
        let n = self.node(entry);
        if n.kind != NodeKind::Entry || n.metatype != Metatype::Regular {
            return None;
        }
        let child = n.child?;
        if self.node(child).kind != NodeKind::Key {
            return None;
        }
        Some(&self.node(child).text)
    }

    /// Walk an entry's fields: `None` for `prev` yields the first field
    /// (skipping the key node of a regular entry), otherwise the field
    /// after `prev`. Also walks the assignments of a macro-definition
    /// entry. Returns the field node and its name.
    pub fn next_field(&self, entry: NodeId, prev: Option<NodeId>) -> Option<(NodeId, &str)> {
        let e = self.node(entry);
        if e.kind != NodeKind::Entry {
            return None;
        }
        if e.metatype != Metatype::Regular && e.metatype != Metatype::MacroDef {
            return None;
        }
        let field = match prev {
            None => {
                let mut first = e.child?;
                if e.metatype == Metatype::Regular && self.node(first).kind == NodeKind::Key {
                    first = self.node(first).next?;
                }
                first
            }
            Some(p) => self.node(p).next?,
        };
        Some((field, self.node(field).text.as_str()))
    }

    /// Walk a value chain. `head` is either a field node or a comment or
    /// preamble entry; `None` for `prev` yields the first value part.
    /// Returns the value node, its kind, and its raw text.
    pub fn next_value(
        &self,
        head: NodeId,
        prev: Option<NodeId>,
    ) -> Option<(NodeId, NodeKind, &str)> {
        let h = self.node(head);
        let valid = h.kind == NodeKind::Field
            || (h.kind == NodeKind::Entry
                && (h.metatype == Metatype::Comment || h.metatype == Metatype::Preamble));
        if !valid {
            return None;
        }
        let value = match prev {
            None => h.child?,
            Some(p) => self.node(p).next?,
        };
        let v = self.node(value);
        Some((value, v.kind, v.text.as_str()))
    }

    /// Fully normalized text of a field (or of a comment/preamble entry):
    /// the FULL option set applied as a pure query, leaving the tree
    /// untouched. Returns `None` for any other node kind.
    pub fn get_text(&self, ctx: &mut Context, node: NodeId) -> Option<String> {
        let n = self.node(node);
        match n.kind {
            NodeKind::Field => Some(post::process_field_pure(self, ctx, node, Options::FULL)),
            NodeKind::Entry
                if n.metatype == Metatype::Comment || n.metatype == Metatype::Preamble =>
            {
                let head = n.child?;
                Some(post::process_chain_pure(self, ctx, head, Options::FULL))
            }
            _ => None,
        }
    }
}
