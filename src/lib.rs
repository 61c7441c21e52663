//! A BibTeX parsing library.
//!
//! Input text is parsed into an annotated tree per entry: regular entries
//! carry an optional citation key and a list of fields, each field a chain
//! of `#`-joined value parts. Postprocessing normalizes those parts under
//! a caller-chosen [`Options`] set (delimiter stripping, macro expansion,
//! string pasting, whitespace collapsing), and the [`names`] module splits
//! author lists and individual names following the BibTeX conventions.
//!
//! All state lives in a [`Context`]: the macro table accumulated from
//! `@string` entries and the sink that receives diagnostics. Problems in
//! the input are reported through the sink and degrade gracefully; a
//! malformed entry is skipped and parsing resumes at the next `@`.
//!
//! ```
//! use bibtree::{Context, Options};
//!
//! let mut ctx = Context::new();
//! let outcome = ctx.parse_file_str(
//!     "@article{knuth84, title = {Literate Programming}}",
//!     Some("refs.bib"),
//!     Options::FULL,
//! )?;
//! assert!(outcome.ok);
//!
//! let tree = outcome.tree.expect("parse produced a tree");
//! let entry = tree.first_entry().expect("one entry");
//! assert_eq!(tree.entry_type(entry), Some("article"));
//! assert_eq!(tree.entry_key(entry), Some("knuth84"));
//! let (title, name) = tree.next_field(entry, None).expect("one field");
//! assert_eq!(name, "title");
//! let (_, _, text) = tree.next_value(title, None).expect("one value");
//! assert_eq!(text, "Literate Programming");
//! # Ok::<(), bibtree::Error>(())
//! ```

mod errors;
mod lexer;
mod macros;
pub mod names;
mod parser;
mod post;
mod tree;

use std::fs;
use std::path::Path;

pub use errors::{
    ClassSet, Collector, Diagnostic, DiagnosticSink, Error, ErrorClass, LogSink,
};
pub use macros::MacroTable;
pub use names::{split_list, split_name, Name, StringList};
pub use parser::Entries;
pub use post::{postprocess_entry, postprocess_field, postprocess_value, Options};
pub use tree::{Metatype, NodeId, NodeKind, Tree};

use lexer::Lexer;
use parser::Parsed;

/// All mutable parsing state: the macro table, the diagnostic sink, the
/// severity classes seen since the last parse call, and the option sets
/// applied to comment and preamble values. One context is single-threaded;
/// independent contexts are fully isolated and can run on separate
/// threads.
pub struct Context {
    macros: MacroTable,
    sink: Box<dyn DiagnosticSink>,
    seen: ClassSet,
    string_opts: [Options; 5],
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

impl Context {
    /// A fresh context reporting through the `log` facade.
    pub fn new() -> Context {
        Context::with_sink(Box::new(LogSink))
    }

    /// A fresh context reporting to the given sink (commonly a
    /// [`Collector`] clone).
    pub fn with_sink(sink: Box<dyn DiagnosticSink>) -> Context {
        let mut string_opts = [Options::empty(); 5];
        string_opts[Metatype::MacroDef.index()] = Options::MACRO;
        Context {
            macros: MacroTable::new(),
            sink,
            seen: ClassSet::default(),
            string_opts,
        }
    }

    /// Forget all accumulated macros and pending severity classes.
    pub fn reset(&mut self) {
        self.macros.clear();
        self.seen = ClassSet::default();
    }

    /// The macro table accumulated so far.
    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    /// Install a macro definition, reporting a content warning if it
    /// overrides an earlier one. The text should already be fully
    /// normalized; the parser guarantees this for definitions coming from
    /// `@string` entries.
    pub fn define_macro(
        &mut self,
        name: &str,
        text: String,
        source: Option<&str>,
        line: Option<u32>,
        column: Option<u32>,
    ) {
        if self.macros.is_defined(name) {
            self.report(Diagnostic::new(
                ErrorClass::Content,
                format!("overriding existing definition of macro \"{}\"", name),
                source,
                line,
                column,
            ));
        }
        log::debug!("defining macro \"{}\"", name);
        self.macros.define(name, text);
    }

    /// Configure the option set applied to the values of comment or
    /// preamble entries as they are parsed. Macro-definition values always
    /// use [`Options::MACRO`] regardless of this setting, and regular
    /// entries use the options passed to the parse call.
    pub fn set_string_options(&mut self, metatype: Metatype, options: Options) {
        self.string_opts[metatype.index()] = options;
    }

    pub(crate) fn string_options(&self, metatype: Metatype) -> Options {
        self.string_opts[metatype.index()]
    }

    pub(crate) fn report(&mut self, diag: Diagnostic) {
        self.seen |= diag.class.as_set();
        self.sink.report(&diag);
    }

    pub(crate) fn take_classes(&mut self) -> ClassSet {
        std::mem::take(&mut self.seen)
    }

    /// Parse the first entry of `text`, which starts at `start_line` of
    /// `source` (both for diagnostics only). On end of input the outcome
    /// has no tree and `ok` is true; a skipped malformed entry also
    /// yields no tree, with `ok` false and the syntax class set.
    pub fn parse_entry(
        &mut self,
        text: &str,
        source: Option<&str>,
        start_line: u32,
        options: Options,
    ) -> Result<Outcome, Error> {
        let mut lexer = Lexer::new(text, source, start_line);
        let mut tree = Tree::new(source.map(str::to_owned));
        let parsed = parser::parse_next(&mut lexer, self, &mut tree, options)?;
        let classes = self.take_classes();
        let tree = match parsed {
            Parsed::Entry(id) => {
                tree.first = Some(id);
                Some(tree)
            }
            Parsed::Skipped | Parsed::Eof => None,
        };
        Ok(Outcome {
            tree,
            ok: !classes.is_failure(),
            classes,
        })
    }

    /// Parse every entry of `text` into one tree, skipping malformed
    /// entries. The outcome's classes cover the whole run.
    pub fn parse_file_str(
        &mut self,
        text: &str,
        source: Option<&str>,
        options: Options,
    ) -> Result<Outcome, Error> {
        let mut lexer = Lexer::new(text, source, 1);
        let mut tree = Tree::new(source.map(str::to_owned));
        let mut last: Option<NodeId> = None;
        loop {
            match parser::parse_next(&mut lexer, self, &mut tree, options)? {
                Parsed::Entry(id) => {
                    match last {
                        None => tree.first = Some(id),
                        Some(p) => tree.node_mut(p).next = Some(id),
                    }
                    last = Some(id);
                }
                Parsed::Skipped => {}
                Parsed::Eof => break,
            }
        }
        let classes = self.take_classes();
        Ok(Outcome {
            tree: Some(tree),
            ok: !classes.is_failure(),
            classes,
        })
    }

    /// Read and parse a whole `.bib` file.
    pub fn parse_file(
        &mut self,
        path: impl AsRef<Path>,
        options: Options,
    ) -> Result<Outcome, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let source = path.to_string_lossy().into_owned();
        self.parse_file_str(&text, Some(&source), options)
    }

    /// Iterate over the entries of `text`, one outcome (and one tree) per
    /// entry.
    pub fn entries<'a>(
        &'a mut self,
        text: &str,
        source: Option<&str>,
        options: Options,
    ) -> Entries<'a> {
        Entries::new(self, text, source, options)
    }
}

/// What one parse call produced: the tree (absent at end of input or when
/// the sole entry was skipped), an overall verdict, and the set of
/// severity classes reported along the way.
#[derive(Debug)]
pub struct Outcome {
    pub tree: Option<Tree>,
    pub ok: bool,
    pub classes: ClassSet,
}
