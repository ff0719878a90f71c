use logos::Span;
use std::fmt;

//===----------------------------------------------------------------------===//
// Error
//===----------------------------------------------------------------------===//

/// A condition raised during evaluation. Conditions never travel through the
/// host call stack; they travel up the continuation parent chain and either
/// reach a handler barrier or abort the current top-level evaluation.
#[derive(Debug, Clone)]
pub enum Error {
    UnboundIdentifier(String),
    ArityMismatch { expected: String, got: usize },
    TypeMismatch { expected: &'static str, found: String },
    MalformedForm { form: &'static str, reason: String },
    HostInterop(String),
}

impl Error {
    /// Short symbolic tag, used when a condition is handed to a scheme-level
    /// handler as data.
    pub fn tag(&self) -> &'static str {
        match self {
            Error::UnboundIdentifier(_) => "unbound-identifier",
            Error::ArityMismatch { .. } => "arity-mismatch",
            Error::TypeMismatch { .. } => "type-mismatch",
            Error::MalformedForm { .. } => "malformed-form",
            Error::HostInterop(_) => "host-error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnboundIdentifier(name) => {
                write!(f, "Unbound identifier: {}", name)
            }
            Error::ArityMismatch { expected, got } => {
                write!(f, "Arity mismatch: expected {}, got {}", expected, got)
            }
            Error::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {}, got {}", expected, found)
            }
            Error::MalformedForm { form, reason } => {
                write!(f, "Malformed {} form: {}", form, reason)
            }
            Error::HostInterop(msg) => write!(f, "Host error: {}", msg),
        }
    }
}

//===----------------------------------------------------------------------===//
// Unhandled
//===----------------------------------------------------------------------===//

/// A condition that reached the root of the continuation chain without
/// finding a handler. Carries the rendering of the continuation it was
/// raised in, innermost expression first, for diagnostics only.
#[derive(Debug, Clone)]
pub struct Unhandled {
    pub error: Error,
    pub trace: Vec<String>,
}

impl fmt::Display for Unhandled {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Unhandled condition: {}", self.error)?;
        for exp in &self.trace {
            write!(f, "\n  in {}", exp)?;
        }
        Ok(())
    }
}

//===----------------------------------------------------------------------===//
// ReadError
//===----------------------------------------------------------------------===//

/// Errors produced by the reader collaborator. These happen before any
/// continuation exists, so they are ordinary host results.
#[derive(Debug, Clone)]
pub enum ReadError {
    UnexpectedEof { expected: String },
    UnexpectedToken { found: String, expected: String },
    UnterminatedString,
    InvalidCharacter { text: String },
    StrayDot,
    InvalidToken { text: String },
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadError::UnexpectedEof { expected } => {
                write!(f, "Unexpected end of input: expected {}", expected)
            }
            ReadError::UnexpectedToken { found, expected } => {
                write!(f, "Unexpected token: {} (expected: {})", found, expected)
            }
            ReadError::UnterminatedString => write!(f, "Unterminated string"),
            ReadError::InvalidCharacter { text } => {
                write!(f, "Invalid character literal: {}", text)
            }
            ReadError::StrayDot => write!(f, "Dot outside of a pair tail"),
            ReadError::InvalidToken { text } => write!(f, "Invalid token: {}", text),
        }
    }
}

//===----------------------------------------------------------------------===//
// SourceError
//===----------------------------------------------------------------------===//

/// A reader error together with the span it covers and the original source,
/// so it can be rendered with a caret line.
#[derive(Debug, Clone)]
pub struct SourceError {
    pub error: ReadError,
    pub span: Span,
    pub source: String,
}

impl SourceError {
    pub fn format_error(&self) -> String {
        let start = self.span.start.min(self.source.len());
        let line_start =
            self.source[..start].rfind('\n').map(|pos| pos + 1).unwrap_or(0);
        let line_end = self.source[start..]
            .find('\n')
            .map(|pos| start + pos)
            .unwrap_or(self.source.len());

        let line_number = self.source[..start].matches('\n').count() + 1;
        let column = start - line_start + 1;

        let line_content = &self.source[line_start..line_end];
        let underline =
            " ".repeat(column - 1) + &"^".repeat(self.span.len().max(1));

        format!(
            "Read error at {}:{}\n{}\n{}\n{}",
            line_number, column, line_content, underline, self.error
        )
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.format_error())
    }
}
