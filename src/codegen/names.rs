//! Identifier Sanitizer
//!
//! Pure string transforms for everything that ends up as a KCL identifier:
//! schema names (`PascalCase`), attribute names (sanitized, keyword-escaped)
//! and helper lambda names (`is_valid_snake_case`).
//!
//! [`NameRegistry`] hands out unique schema names for one generation run and
//! resolves collisions by numeric suffix.

use std::collections::BTreeSet;

use super::config::is_reserved;

/// Placeholder for properties whose name sanitizes to nothing
pub const PROPERTY_PLACEHOLDER: &str = "property";

/// Placeholder for schemas whose name sanitizes to nothing
pub const SCHEMA_PLACEHOLDER: &str = "Schema";

/// Sanitize a JSON property name into a KCL attribute name.
///
/// Characters outside `[A-Za-z0-9_]` become `_`, a leading digit gets a `_`
/// prefix, and reserved words get a trailing `_`.
pub fn sanitize_property(name: &str) -> String {
    if name.is_empty() {
        return PROPERTY_PLACEHOLDER.to_string();
    }

    let mut result: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }

    if is_reserved(&result) {
        result.push('_');
    }

    result
}

/// Format an arbitrary name as a `PascalCase` schema name.
///
/// Splits on whitespace, `-`, `_` and `@`, upper-cases the first character of
/// each segment and keeps the rest as written, so names that are already
/// `PascalCase` pass through unchanged.
pub fn format_schema_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());

    for segment in name.split(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | '@')) {
        let mut chars = segment.chars().filter(|c| c.is_ascii_alphanumeric());
        if let Some(first) = chars.next() {
            result.push(first.to_ascii_uppercase());
            result.extend(chars);
        }
    }

    if result.is_empty() {
        return SCHEMA_PLACEHOLDER.to_string();
    }

    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert_str(0, SCHEMA_PLACEHOLDER);
    }

    result
}

/// Convert a `PascalCase` or mixed name to `snake_case`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut result = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !result.is_empty() && !result.ends_with('_') {
                result.push('_');
            }
            continue;
        }

        if i > 0 && !result.is_empty() && !result.ends_with('_') {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let boundary = (c.is_ascii_uppercase()
                && (prev.is_ascii_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_ascii_uppercase() && next_is_lower)))
                || (c.is_ascii_digit() && prev.is_ascii_alphabetic());
            if boundary {
                result.push('_');
            }
        }

        result.push(c.to_ascii_lowercase());
    }

    let trimmed = result.trim_end_matches('_');
    if trimmed.is_empty() {
        "schema".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Name of the boolean helper lambda validating values against `schema_name`
pub fn helper_name(schema_name: &str) -> String {
    format!("is_valid_{}", to_snake_case(schema_name))
}

// =============================================================================
// Name Registry
// =============================================================================

/// Outcome of claiming a schema name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedName {
    /// The unique name handed out
    pub name: String,
    /// Whether a suffix was needed
    pub disambiguated: bool,
}

/// Per-run registry of schema names in use.
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    taken: BTreeSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format `requested` and reserve it, appending `2`, `3`, ... until unique.
    pub fn claim(&mut self, requested: &str) -> ClaimedName {
        let base = format_schema_name(requested);
        if self.taken.insert(base.clone()) {
            return ClaimedName {
                name: base,
                disambiguated: false,
            };
        }

        let mut counter = 2usize;
        loop {
            let candidate = format!("{}{}", base, counter);
            if self.taken.insert(candidate.clone()) {
                return ClaimedName {
                    name: candidate,
                    disambiguated: true,
                };
            }
            counter += 1;
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }
}
