//! Deduplicating diagnostic accumulation

use std::collections::HashSet;

use crate::{Diagnostic, ErrorCode, Position, Severity};

type DedupKey = (String, usize, usize, String);

/// Accumulates diagnostics for one file, dropping exact repeats.
///
/// Two diagnostics are the same issue when they share path, line, column and
/// message. The collector is an explicit value: resolution functions take it
/// by `&mut` and the analyzer hands its contents back with the result.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticCollector {
    path: String,
    diagnostics: Vec<Diagnostic>,
    seen: HashSet<DedupKey>,
}

impl DiagnosticCollector {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            diagnostics: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Path stamped on diagnostics that do not carry one
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Record a diagnostic. Returns false when it was a duplicate.
    pub fn push(&mut self, mut diag: Diagnostic) -> bool {
        if diag.path.is_empty() {
            diag.path = self.path.clone();
        }
        let key = (
            diag.path.clone(),
            diag.line,
            diag.column,
            diag.message.clone(),
        );
        if !self.seen.insert(key) {
            return false;
        }
        self.diagnostics.push(diag);
        true
    }

    pub fn error(&mut self, code: ErrorCode, position: Position, message: impl Into<String>) {
        self.push(Diagnostic::error(code, message).with_position(position));
    }

    pub fn warning(&mut self, code: ErrorCode, position: Position, message: impl Into<String>) {
        self.push(Diagnostic::warning(code, message).with_position(position));
    }

    pub fn extend(&mut self, diags: impl IntoIterator<Item = Diagnostic>) {
        for diag in diags {
            self.push(diag);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SQL0100, SQL0101, SQL0103};

    #[test]
    fn test_dedup_by_location_and_message() {
        let mut diags = DiagnosticCollector::new("q.sql");
        let pos = Position::new(1, 8);

        diags.error(SQL0100, pos, "unknown table or alias 'orders'");
        diags.error(SQL0100, pos, "unknown table or alias 'orders'");
        // Same message at another position is a separate issue.
        diags.error(SQL0100, Position::new(1, 20), "unknown table or alias 'orders'");
        // Same position, different message.
        diags.error(SQL0101, pos, "unknown column 'id'");

        assert_eq!(diags.len(), 3);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_path_is_stamped() {
        let mut diags = DiagnosticCollector::new("queries/users.sql");
        diags.warning(SQL0103, Position::START, "aggregate has no alias");

        let out = diags.into_diagnostics();
        assert_eq!(out[0].path, "queries/users.sql");
        assert_eq!(out[0].severity, Severity::Warning);
    }

    #[test]
    fn test_warnings_only_has_no_errors() {
        let mut diags = DiagnosticCollector::new("q.sql");
        diags.warning(SQL0103, Position::START, "aggregate has no alias");
        assert!(!diags.has_errors());
        assert!(!diags.is_empty());
    }
}
