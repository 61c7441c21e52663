use std::cell::RefCell;
use std::fmt;
use std::io;
use std::rc::Rc;

use bitflags::bitflags;

/// Severity of a diagnostic, ordered from least to most severe.
///
/// The first four classes never stop processing: the offending value
/// degrades (for example, an undefined macro expands to the empty string)
/// and parsing continues. `LexError` and `Syntax` abandon the current entry
/// and resynchronize at the next `@`. `Fatal` aborts the current parse call,
/// and `Internal` signals a violated library invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorClass {
    Notify,
    Content,
    Structural,
    LexWarn,
    LexError,
    Syntax,
    Fatal,
    Internal,
}

impl ErrorClass {
    /// The corresponding single-class [`ClassSet`].
    pub fn as_set(self) -> ClassSet {
        match self {
            Self::Notify => ClassSet::NOTIFY,
            Self::Content => ClassSet::CONTENT,
            Self::Structural => ClassSet::STRUCTURAL,
            Self::LexWarn => ClassSet::LEX_WARN,
            Self::LexError => ClassSet::LEX_ERROR,
            Self::Syntax => ClassSet::SYNTAX,
            Self::Fatal => ClassSet::FATAL,
            Self::Internal => ClassSet::INTERNAL,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Notify => "notification",
            Self::Content | Self::Structural | Self::LexWarn => "warning",
            Self::LexError | Self::Syntax => "error",
            Self::Fatal => "fatal error",
            Self::Internal => "internal error",
        })
    }
}

bitflags! {
    /// The set of severity classes that occurred during one parse call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClassSet: u8 {
        const NOTIFY     = 1 << 0;
        const CONTENT    = 1 << 1;
        const STRUCTURAL = 1 << 2;
        const LEX_WARN   = 1 << 3;
        const LEX_ERROR  = 1 << 4;
        const SYNTAX     = 1 << 5;
        const FATAL      = 1 << 6;
        const INTERNAL   = 1 << 7;
    }
}

impl ClassSet {
    /// True if any class severe enough to lose an entry (or the whole
    /// parse) occurred.
    pub fn is_failure(self) -> bool {
        self.intersects(Self::LEX_ERROR | Self::SYNTAX | Self::FATAL | Self::INTERNAL)
    }
}

/// One reported problem: a severity class, a message, and an optional
/// source position.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    pub class: ErrorClass,
    pub message: String,
    pub source: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl Diagnostic {
    pub(crate) fn new(
        class: ErrorClass,
        message: String,
        source: Option<&str>,
        line: Option<u32>,
        column: Option<u32>,
    ) -> Diagnostic {
        Diagnostic {
            class,
            message,
            source: source.map(str::to_owned),
            line,
            column,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{}, ", source)?;
        }
        if let Some(line) = self.line {
            write!(f, "line {}", line)?;
            if let Some(column) = self.column {
                write!(f, ", column {}", column)?;
            }
            write!(f, ": ")?;
        }
        write!(f, "{}: {}", self.class, self.message)
    }
}

/// Receiver for diagnostics produced while parsing, postprocessing, or
/// splitting names. The library never aggregates counts itself; it only
/// hands each diagnostic to the sink installed in the [`Context`].
///
/// [`Context`]: crate::Context
pub trait DiagnosticSink {
    fn report(&mut self, diag: &Diagnostic);
}

/// Default sink: routes diagnostics through the `log` facade at a level
/// matching the severity class.
#[derive(Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, diag: &Diagnostic) {
        match diag.class {
            ErrorClass::Notify => log::info!("{}", diag),
            ErrorClass::Content | ErrorClass::Structural | ErrorClass::LexWarn => {
                log::warn!("{}", diag)
            }
            _ => log::error!("{}", diag),
        }
    }
}

/// A sink that stores every diagnostic for later inspection. Clones share
/// the same underlying store, so a caller can keep one clone and hand the
/// other to [`Context::with_sink`].
///
/// [`Context::with_sink`]: crate::Context::with_sink
#[derive(Debug, Clone, Default)]
pub struct Collector {
    inner: Rc<RefCell<Vec<Diagnostic>>>,
}

impl Collector {
    pub fn new() -> Collector {
        Collector::default()
    }

    /// All diagnostics reported so far, in order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.borrow().clone()
    }

    /// Number of diagnostics of the given class.
    pub fn count(&self, class: ErrorClass) -> usize {
        self.inner.borrow().iter().filter(|d| d.class == class).count()
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }
}

impl DiagnosticSink for Collector {
    fn report(&mut self, diag: &Diagnostic) {
        self.inner.borrow_mut().push(diag.clone());
    }
}

/// Hard failure of a parse call. Everything recoverable goes to the
/// diagnostic sink instead; `Err` is reserved for conditions that abort the
/// whole call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A problem severe enough to abandon the whole parse call.
    #[error("fatal: {0}")]
    Fatal(String),
    /// A violated library invariant; always a defect, never user data.
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}
