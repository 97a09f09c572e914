//! Diagnostics
//!
//! Collects warnings and errors while building the IR and generating artifacts.
//! Nothing here aborts a run: the driver decides what an error means.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Input shape ===
    /// A keyword has an unexpected shape; the fragment was replaced by `any`
    MalformedSchema,
    /// `$ref` target has no entry in the definitions table
    UnresolvedReference,
    /// `items` given in tuple form; only the first entry is used
    TupleItems,
    /// `type` is an array; the field is typed `any`
    TypeUnion,

    // === Translation ===
    /// Lookaround, backreference or other pattern feature the target engine lacks
    UnsupportedRegexConstruct,
    /// `format` value not in the registry
    UnknownFormat,

    // === Naming ===
    /// Two schemas sanitized to the same name
    NameCollision,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnresolvedReference => "E001",
            Self::MalformedSchema => "W001",
            Self::UnsupportedRegexConstruct => "W002",
            Self::NameCollision => "W003",
            Self::TupleItems => "W004",
            Self::UnknownFormat => "I001",
            Self::TypeUnion => "I002",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::UnresolvedReference => Severity::Error,

            Self::MalformedSchema
            | Self::UnsupportedRegexConstruct
            | Self::NameCollision
            | Self::TupleItems => Severity::Warning,

            Self::UnknownFormat | Self::TypeUnion => Severity::Info,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Schema name the diagnostic is attached to
    pub schema: String,
    pub code: DiagnosticCode,
    pub message: String,
    /// Additional context (original pattern, keyword path, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(schema: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.schema
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of diagnostics from one generation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic item; an identical item is recorded once
    pub fn push(&mut self, item: DiagnosticItem) {
        if self.items.contains(&item) {
            return;
        }
        match item.severity() {
            Severity::Error => tracing::error!(schema = %item.schema, code = %item.code, "{}", item.message),
            Severity::Warning => tracing::warn!(schema = %item.schema, code = %item.code, "{}", item.message),
            Severity::Info => tracing::debug!(schema = %item.schema, code = %item.code, "{}", item.message),
        }
        self.items.push(item);
    }

    /// Add a diagnostic with the code's own severity
    pub fn report(
        &mut self,
        schema: impl Into<String>,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) {
        self.push(DiagnosticItem::new(schema, code, message));
    }

    /// Add diagnostic for a fragment replaced by `any`
    pub fn malformed(&mut self, schema: impl Into<String>, keyword: &str, reason: impl Into<String>) {
        self.push(
            DiagnosticItem::new(schema, DiagnosticCode::MalformedSchema, reason)
                .with_context(format!("keyword: {}", keyword)),
        );
    }

    /// Add diagnostic for unresolved ref
    pub fn unresolved_ref(&mut self, schema: impl Into<String>, ref_target: &str) {
        self.push(DiagnosticItem::new(
            schema,
            DiagnosticCode::UnresolvedReference,
            format!("$ref target '{}' not found in definitions table", ref_target),
        ));
    }

    /// Add diagnostic for an artifact dropped because one it uses was not generated
    pub fn dependency_failed(&mut self, schema: impl Into<String>, dependency: &str) {
        self.push(DiagnosticItem::new(
            schema,
            DiagnosticCode::UnresolvedReference,
            format!("depends on '{}', which was not generated", dependency),
        ));
    }

    /// Add diagnostic for a sanitized-name collision
    pub fn name_collision(&mut self, requested: &str, assigned: &str) {
        self.push(
            DiagnosticItem::new(
                assigned,
                DiagnosticCode::NameCollision,
                format!("Name '{}' already taken, using '{}'", requested, assigned),
            ),
        );
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    /// Get all errors
    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    /// Get all warnings
    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    /// Items carrying the given code
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(move |i| i.code == code)
    }

    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Merge another Diagnostics into this one
    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Format all diagnostics for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if self.has_errors() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        } else if self.warning_count() > 0 {
            output.push_str(&format!("\n{} warning(s)\n", self.warning_count()));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl IntoIterator for Diagnostics {
    type Item = DiagnosticItem;
    type IntoIter = std::vec::IntoIter<DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticItem;
    type IntoIter = std::slice::Iter<'a, DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_severity() {
        assert_eq!(DiagnosticCode::UnresolvedReference.severity(), Severity::Error);
        assert_eq!(DiagnosticCode::MalformedSchema.severity(), Severity::Warning);
        assert_eq!(DiagnosticCode::UnknownFormat.severity(), Severity::Info);
    }

    #[test]
    fn test_diagnostics_collection() {
        let mut diags = Diagnostics::new();
        diags.unresolved_ref("Pet", "#/definitions/Owner");
        diags.malformed("Pet_tags", "items", "items must be an object or array");
        diags.report("Pet_id", DiagnosticCode::TypeUnion, "type array collapsed to any");

        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        assert_eq!(diags.len(), 3);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_format_all_summary() {
        let mut diags = Diagnostics::new();
        diags.name_collision("PetOwner", "PetOwner2");

        let text = diags.format_all();
        assert!(text.contains("[W003] warning"));
        assert!(text.contains("1 warning(s)"));
    }

    #[test]
    fn test_identical_items_recorded_once() {
        let mut diags = Diagnostics::new();
        diags.unresolved_ref("Pet", "#/definitions/Owner");
        diags.unresolved_ref("Pet", "#/definitions/Owner");
        diags.unresolved_ref("Shop", "#/definitions/Owner");
        assert_eq!(diags.len(), 2);
    }
}
