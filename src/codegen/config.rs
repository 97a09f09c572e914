//! Render Profile
//!
//! Language tokens used when rendering types and predicates as KCL text.
//! Classification (node kinds, artifact forms) is profile-free; only
//! emission reads from here.

use serde::{Deserialize, Serialize};

/// KCL rendering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderProfile {
    /// Type tokens for JSON scalars
    pub types: TypeMappings,

    /// Appended to identifiers that collide with a reserved word
    pub keyword_escape: String,

    /// One indentation level
    pub indent: String,

    /// Tolerance for float `multipleOf` checks
    pub float_epsilon: f64,
}

/// Type tokens for JSON scalar types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeMappings {
    pub string: String,
    pub integer: String,
    pub number: String,
    pub boolean: String,
    pub null: String,
    /// Unknown/any type
    pub any: String,
}

impl Default for RenderProfile {
    fn default() -> Self {
        Self::kcl()
    }
}

impl RenderProfile {
    /// The KCL profile
    pub fn kcl() -> Self {
        Self {
            types: TypeMappings {
                string: "str".to_string(),
                integer: "int".to_string(),
                number: "float".to_string(),
                boolean: "bool".to_string(),
                null: "None".to_string(),
                any: "any".to_string(),
            },
            keyword_escape: "_".to_string(),
            indent: "    ".to_string(),
            float_epsilon: 1e-10,
        }
    }

    /// Escape a keyword if needed
    pub fn escape_keyword(&self, name: &str) -> String {
        if is_reserved(name) {
            format!("{}{}", name, self.keyword_escape)
        } else {
            name.to_string()
        }
    }

    /// List type: `[T]`
    pub fn wrap_array(&self, type_str: &str) -> String {
        format!("[{}]", type_str)
    }

    /// String-keyed map type: `{str:T}`
    pub fn wrap_map(&self, value_type: &str) -> String {
        format!("{{{}:{}}}", self.types.string, value_type)
    }

    /// Indentation for the given nesting level
    pub fn indent(&self, level: usize) -> String {
        self.indent.repeat(level)
    }
}

// =============================================================================
// Keywords
// =============================================================================

/// KCL keywords and literal tokens that cannot be used as attribute names
pub const KCL_KEYWORDS: &[&str] = &[
    "True", "False", "None", "Undefined", "all", "any", "and", "as", "assert",
    "check", "elif", "else", "filter", "final", "for", "if", "import", "in",
    "is", "lambda", "map", "mixin", "not", "or", "protocol", "relaxed", "rule",
    "schema", "type",
];

/// Whether `name` is reserved in KCL
pub fn is_reserved(name: &str) -> bool {
    KCL_KEYWORDS.contains(&name)
}
