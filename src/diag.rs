//! Diagnostic locations, severities, and the accumulating sink shared by
//! the parser, encoder, and decoder.

use serde::Serialize;
use std::fmt;

/// Where a diagnostic points: a spot in source text, or a byte PC in a
/// binary, or nowhere in particular.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Loc {
    /// 1-based line/column plus absolute byte offset in the source text.
    Text { line: u32, col: u32, offset: u32 },
    /// Byte offset of an instruction in a binary.
    Pc(u32),
    None,
}

impl Loc {
    pub fn text(line: u32, col: u32, offset: u32) -> Self {
        Loc::Text { line, col, offset }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loc::Text { line, col, .. } => write!(f, "{}:{}", line, col),
            Loc::Pc(pc) => write!(f, "PC {:#x}", pc),
            Loc::None => write!(f, "<unknown>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub loc: Loc,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", self.loc, sev, self.message)
    }
}

/// Raised when the accumulated error count crosses the configured cap and
/// the current pass must stop.
#[derive(Debug, thiserror::Error)]
#[error("too many errors ({0}), giving up")]
pub struct TooManyErrors(pub usize);

/// Accumulates diagnostics; the sole cancellation mechanism is the
/// hard-error cap.
#[derive(Debug)]
pub struct DiagSink {
    diags: Vec<Diagnostic>,
    errors: usize,
    max_errors: usize,
}

pub const DEFAULT_MAX_ERRORS: usize = 10;

impl DiagSink {
    pub fn new(max_errors: usize) -> Self {
        DiagSink { diags: Vec::new(), errors: 0, max_errors }
    }

    pub fn warn(&mut self, loc: Loc, message: impl Into<String>) {
        self.diags.push(Diagnostic { severity: Severity::Warning, loc, message: message.into() });
    }

    pub fn error(&mut self, loc: Loc, message: impl Into<String>) -> Result<(), TooManyErrors> {
        self.diags.push(Diagnostic { severity: Severity::Error, loc, message: message.into() });
        self.errors += 1;
        if self.errors >= self.max_errors {
            Err(TooManyErrors(self.errors))
        } else {
            Ok(())
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diags
    }

    pub fn diags(&self) -> &[Diagnostic] {
        &self.diags
    }
}

impl Default for DiagSink {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ERRORS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_cap_trips() {
        let mut sink = DiagSink::new(2);
        assert!(sink.error(Loc::None, "one").is_ok());
        assert!(sink.error(Loc::Pc(8), "two").is_err());
        assert_eq!(sink.error_count(), 2);
        assert_eq!(sink.diags().len(), 2);
    }

    #[test]
    fn warnings_do_not_count() {
        let mut sink = DiagSink::new(1);
        sink.warn(Loc::text(3, 1, 40), "meh");
        assert!(!sink.has_errors());
        assert_eq!(format!("{}", &sink.diags()[0]), "3:1: warning: meh");
    }
}
