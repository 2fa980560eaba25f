use crate::tokens::TokenId;
use codespan_reporting::diagnostic::{self, Label};
use codespan_reporting::files::{Files, SimpleFiles};
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use std::fmt;

/// Byte range in the analyzed source, used for diagnostics rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Lex-time error.
#[derive(Debug, Clone)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum LexErrorKind {
    InvalidCharacter(char),
    UnterminatedBlockComment,
    UnmatchedClosingBracket(String),
    UnclosedBracket(String),
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LexErrorKind::InvalidCharacter(c) => write!(f, "unexpected character: '{c}'"),
            LexErrorKind::UnterminatedBlockComment => write!(f, "unterminated block comment"),
            LexErrorKind::UnmatchedClosingBracket(s) => {
                write!(f, "unmatched closing bracket '{s}'")
            }
            LexErrorKind::UnclosedBracket(s) => write!(f, "unclosed bracket '{s}'"),
        }
    }
}

// ── Simplification errors ───────────────────────────────────

/// Non-recoverable failure inside the template pass. Carries the token at
/// which the failure was observed so callers can point at the source.
#[derive(Debug, Clone)]
pub struct SimplifyError {
    pub kind: SimplifyErrorKind,
    pub token: TokenId,
}

#[derive(Debug, Clone)]
pub enum SimplifyErrorKind {
    Arithmetic(crate::mathlib::MathError),
}

impl SimplifyError {
    pub fn arithmetic(err: crate::mathlib::MathError, token: TokenId) -> Self {
        Self {
            kind: SimplifyErrorKind::Arithmetic(err),
            token,
        }
    }
}

impl fmt::Display for SimplifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SimplifyErrorKind::Arithmetic(err) => write!(f, "{err}"),
        }
    }
}

// ── Error sink ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Debug => write!(f, "debug"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One reported event. The callstack is a list of `(file_index, line)`
/// pairs, innermost location first.
#[derive(Debug, Clone)]
pub struct ErrorMessage {
    pub callstack: Vec<(u32, u32)>,
    pub severity: Severity,
    pub id: String,
    pub message: String,
    pub inconclusive: bool,
}

/// Receives events emitted by the simplification core.
pub trait ErrorSink {
    fn report(&mut self, msg: ErrorMessage);
}

/// Sink that buffers every message, for tests and batch callers.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub messages: Vec<ErrorMessage>,
}

impl ErrorSink for CollectingSink {
    fn report(&mut self, msg: ErrorMessage) {
        self.messages.push(msg);
    }
}

// ── Reporter ────────────────────────────────────────────────

/// Renders diagnostics to stderr.
pub struct ErrorReporter {
    files: SimpleFiles<String, String>,
    file_id: usize,
}

impl ErrorReporter {
    pub fn new(filename: String, source: String) -> Self {
        let mut files = SimpleFiles::new();
        let file_id = files.add(filename, source);
        Self { files, file_id }
    }

    pub fn report_lex_error(&self, err: &LexError) {
        let diag = diagnostic::Diagnostic::error()
            .with_message(err.to_string())
            .with_labels(vec![Label::primary(
                self.file_id,
                err.span.start..err.span.end,
            )]);
        self.emit(&diag);
    }

    /// Render a core event. Lines in the callstack become labels covering
    /// the whole source line (generated tokens keep their origin line).
    pub fn report_message(&self, msg: &ErrorMessage) {
        let mut labels = Vec::new();
        for &(_file, line) in &msg.callstack {
            if line == 0 {
                continue;
            }
            if let Ok(range) = self.files.line_range(self.file_id, line as usize - 1) {
                labels.push(Label::primary(self.file_id, range));
            }
        }
        let diag = match msg.severity {
            Severity::Error => diagnostic::Diagnostic::error(),
            Severity::Warning => diagnostic::Diagnostic::warning(),
            Severity::Debug => diagnostic::Diagnostic::note(),
        }
        .with_message(format!("[{}] {}", msg.id, msg.message))
        .with_labels(labels);
        self.emit(&diag);
    }

    fn emit(&self, diag: &diagnostic::Diagnostic<usize>) {
        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();
        let _ = term::emit(&mut writer.lock(), &config, &self.files, diag);
    }
}
