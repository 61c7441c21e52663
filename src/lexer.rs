use std::fmt;

use crate::errors::{Diagnostic, ErrorClass};
use crate::Context;

/// One lexical unit of a `.bib` source. For the entry
///
/// ```tex
/// @Book{works:4,
///   author = {Shakespeare, William},
/// }
/// ```
///
/// the lexer emits: At, Name("Book"), EntryOpen, Name("works:4"), Comma,
/// Name("author"), Equals, Delimited("{Shakespeare, William}"), Comma,
/// EntryClose. Tokens are the data contract between lexer and parser and
/// are not externally visible.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    At,
    Name(String),
    Number(String),
    EntryOpen,
    EntryClose,
    Equals,
    Hash,
    Comma,
    /// A quoted or braced string, outermost delimiters included. A runaway
    /// string carries only the partial text after the opening delimiter.
    Delimited(String),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At => f.write_str("`@`"),
            Self::Name(s) => write!(f, "name `{}`", s),
            Self::Number(s) => write!(f, "number `{}`", s),
            Self::EntryOpen => f.write_str("entry opener"),
            Self::EntryClose => f.write_str("entry closer"),
            Self::Equals => f.write_str("`=`"),
            Self::Hash => f.write_str("`#`"),
            Self::Comma => f.write_str("`,`"),
            Self::Delimited(_) => f.write_str("string"),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) line: u32,
    pub(crate) column: u32,
}

/// Converts raw text into a token stream obeying BibTeX's quoting, bracing
/// and junk-skipping rules. Text outside any `@...` construct is skipped
/// silently; whitespace between tokens is insignificant; strings are
/// consumed whole, with brace depth tracked so delimiters are only
/// recognized at depth zero.
pub(crate) struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    source: Option<String>,
    in_entry: bool,
    body_open: bool,
    closer: char,
}

impl Lexer {
    pub(crate) fn new(text: &str, source: Option<&str>, start_line: u32) -> Lexer {
        Lexer {
            chars: text.chars().collect(),
            pos: 0,
            line: start_line,
            column: 1,
            source: source.map(str::to_owned),
            in_entry: false,
            body_open: false,
            closer: '}',
        }
    }

    pub(crate) fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn report(&self, ctx: &mut Context, class: ErrorClass, line: u32, column: u32, msg: String) {
        ctx.report(Diagnostic::new(
            class,
            msg,
            self.source.as_deref(),
            Some(line),
            Some(column),
        ));
    }

    /// Abandon the current entry after a syntax violation: drop back to the
    /// top level, where the next call will skip forward to the next `@`.
    pub(crate) fn resync(&mut self) {
        self.in_entry = false;
        self.body_open = false;
    }

    pub(crate) fn next_token(&mut self, ctx: &mut Context) -> Token {
        loop {
            if !self.in_entry {
                // Top-level junk is skipped silently, not an error.
                loop {
                    match self.peek() {
                        None => return self.token(TokenKind::Eof),
                        Some('@') => break,
                        Some(_) => {
                            self.bump();
                        }
                    }
                }
                let tok = self.token(TokenKind::At);
                self.bump();
                self.in_entry = true;
                self.body_open = false;
                return tok;
            }

            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                self.bump();
            }
            let (line, column) = (self.line, self.column);
            let c = match self.peek() {
                None => return self.token(TokenKind::Eof),
                Some(c) => c,
            };

            if !self.body_open {
                match c {
                    '{' => {
                        self.bump();
                        self.body_open = true;
                        self.closer = '}';
                        return Token { kind: TokenKind::EntryOpen, line, column };
                    }
                    '(' => {
                        self.bump();
                        self.body_open = true;
                        self.closer = ')';
                        return Token { kind: TokenKind::EntryOpen, line, column };
                    }
                    c if is_name_start(c) => {
                        let name = self.scan_name();
                        return Token { kind: TokenKind::Name(name), line, column };
                    }
                    c => {
                        self.report(
                            ctx,
                            ErrorClass::LexError,
                            line,
                            column,
                            format!("invalid character {:?} in entry header", c),
                        );
                        self.bump();
                    }
                }
                continue;
            }

            match c {
                c if c == self.closer => {
                    self.bump();
                    self.in_entry = false;
                    self.body_open = false;
                    return Token { kind: TokenKind::EntryClose, line, column };
                }
                '{' | '"' => {
                    let kind = self.scan_string(ctx, c);
                    return Token { kind, line, column };
                }
                '=' => {
                    self.bump();
                    return Token { kind: TokenKind::Equals, line, column };
                }
                '#' => {
                    self.bump();
                    return Token { kind: TokenKind::Hash, line, column };
                }
                ',' => {
                    self.bump();
                    return Token { kind: TokenKind::Comma, line, column };
                }
                c if c.is_ascii_digit() => {
                    let mut digits = String::new();
                    while matches!(self.peek(), Some(d) if d.is_ascii_digit()) {
                        if let Some(d) = self.bump() {
                            digits.push(d);
                        }
                    }
                    return Token { kind: TokenKind::Number(digits), line, column };
                }
                c if is_name_start(c) => {
                    let name = self.scan_name();
                    return Token { kind: TokenKind::Name(name), line, column };
                }
                c => {
                    self.report(
                        ctx,
                        ErrorClass::LexError,
                        line,
                        column,
                        format!("invalid character {:?} in entry", c),
                    );
                    self.bump();
                }
            }
        }
    }

    fn token(&self, kind: TokenKind) -> Token {
        Token { kind, line: self.line, column: self.column }
    }

    fn scan_name(&mut self) -> String {
        let mut name = String::new();
        while matches!(self.peek(), Some(c) if is_name_char(c)) {
            if let Some(c) = self.bump() {
                name.push(c);
            }
        }
        name
    }

    /// Consume a quoted or braced string, delimiters included. Brace depth
    /// is tracked relative to the string's start; the terminator is only
    /// recognized at depth zero, and every other character (including the
    /// opposing quote character) is literal while depth is positive.
    /// Newlines become single spaces.
    fn scan_string(&mut self, ctx: &mut Context, open: char) -> TokenKind {
        let (start_line, start_column) = (self.line, self.column);
        let mut text = String::new();
        text.push(open);
        self.bump();
        let mut depth: u32 = 0;
        loop {
            let c = match self.bump() {
                Some(c) => c,
                None => {
                    self.report(
                        ctx,
                        ErrorClass::LexError,
                        start_line,
                        start_column,
                        format!("runaway string, started at line {}", start_line),
                    );
                    // Partial token: everything after the opening delimiter.
                    text.remove(0);
                    return TokenKind::Delimited(text);
                }
            };
            match c {
                '{' => {
                    depth += 1;
                    text.push(c);
                }
                '}' => {
                    if open == '{' && depth == 0 {
                        text.push(c);
                        return TokenKind::Delimited(text);
                    }
                    if depth == 0 {
                        self.report(
                            ctx,
                            ErrorClass::LexWarn,
                            self.line,
                            self.column,
                            "unbalanced brace in string".to_string(),
                        );
                    } else {
                        depth -= 1;
                    }
                    text.push(c);
                }
                '"' if open == '"' && depth == 0 => {
                    text.push(c);
                    return TokenKind::Delimited(text);
                }
                '\n' => text.push(' '),
                c => text.push(c),
            }
        }
    }
}

fn is_name_start(c: char) -> bool {
    !c.is_ascii_digit() && is_name_char(c)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || "!$&*+-./:;<>?[]^_`|~".contains(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_tokens(src: &str) -> Vec<TokenKind> {
        let mut ctx = Context::new();
        let mut lexer = Lexer::new(src, Some("test.bib"), 1);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token(&mut ctx);
            let done = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn tokens_for_simple_entry() {
        let toks = collect_tokens("@book{tolkien1937, author = {J. R. R. Tolkien}}");
        assert_eq!(
            toks,
            vec![
                TokenKind::At,
                TokenKind::Name("book".to_string()),
                TokenKind::EntryOpen,
                TokenKind::Name("tolkien1937".to_string()),
                TokenKind::Comma,
                TokenKind::Name("author".to_string()),
                TokenKind::Equals,
                TokenKind::Delimited("{J. R. R. Tolkien}".to_string()),
                TokenKind::EntryClose,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn junk_between_entries_is_skipped() {
        let toks = collect_tokens("leading junk @misc{x} trailing junk");
        assert_eq!(toks[0], TokenKind::At);
        assert_eq!(toks[1], TokenKind::Name("misc".to_string()));
        assert_eq!(toks.last(), Some(&TokenKind::Eof));
    }

    #[test]
    fn nested_braces_stay_inside_one_token() {
        let toks = collect_tokens("@misc{k, t = {a {b {c}} d}}");
        assert!(toks.contains(&TokenKind::Delimited("{a {b {c}} d}".to_string())));
    }

    #[test]
    fn quoted_string_protects_braces_and_closer() {
        let toks = collect_tokens("@misc(k, t = \"a {)} b\")");
        assert!(toks.contains(&TokenKind::Delimited("\"a {)} b\"".to_string())));
        assert!(toks.contains(&TokenKind::EntryClose));
    }

    #[test]
    fn hash_and_number_tokens() {
        let toks = collect_tokens("@misc{k, y = 1997 # jan}");
        assert!(toks.contains(&TokenKind::Number("1997".to_string())));
        assert!(toks.contains(&TokenKind::Hash));
        assert!(toks.contains(&TokenKind::Name("jan".to_string())));
    }

    #[test]
    fn runaway_string_yields_partial_token_and_lex_error() {
        let collector = crate::errors::Collector::new();
        let mut ctx = Context::with_sink(Box::new(collector.clone()));
        let mut lexer = Lexer::new("@misc{k, t = {never closed", Some("test.bib"), 1);
        let mut last = None;
        loop {
            let tok = lexer.next_token(&mut ctx);
            if tok.kind == TokenKind::Eof {
                break;
            }
            last = Some(tok.kind);
        }
        assert_eq!(last, Some(TokenKind::Delimited("never closed".to_string())));
        assert_eq!(collector.count(ErrorClass::LexError), 1);
    }

    #[test]
    fn newline_inside_string_becomes_space() {
        let toks = collect_tokens("@misc{k, t = {two\nlines}}");
        assert!(toks.contains(&TokenKind::Delimited("{two lines}".to_string())));
    }
}
