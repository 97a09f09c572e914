//! Schema IR
//!
//! The typed tree built from raw JSON Schema maps. Every consumer matches on
//! [`NodeKind`] exhaustively; keywords not lifted into typed fields stay
//! reachable through [`SchemaNode::raw`].
//!
//! Ownership is strictly parent → child. Nodes are shared only by name: a
//! `$ref` or a detected self-embedding becomes a [`NodeKind::Reference`],
//! never an alias of another node.

pub mod builder;
pub mod diagnostics;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use builder::TreeBuilder;
pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};

// =============================================================================
// Constraint keywords
// =============================================================================

/// Validation keywords copied verbatim from the raw schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Keyword {
    Minimum,
    Maximum,
    ExclusiveMinimum,
    ExclusiveMaximum,
    MultipleOf,
    MinLength,
    MaxLength,
    Pattern,
    MinItems,
    MaxItems,
    UniqueItems,
    MinProperties,
    MaxProperties,
    Enum,
    Const,
}

impl Keyword {
    pub const ALL: [Keyword; 15] = [
        Self::Minimum,
        Self::Maximum,
        Self::ExclusiveMinimum,
        Self::ExclusiveMaximum,
        Self::MultipleOf,
        Self::MinLength,
        Self::MaxLength,
        Self::Pattern,
        Self::MinItems,
        Self::MaxItems,
        Self::UniqueItems,
        Self::MinProperties,
        Self::MaxProperties,
        Self::Enum,
        Self::Const,
    ];

    /// JSON Schema spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::ExclusiveMinimum => "exclusiveMinimum",
            Self::ExclusiveMaximum => "exclusiveMaximum",
            Self::MultipleOf => "multipleOf",
            Self::MinLength => "minLength",
            Self::MaxLength => "maxLength",
            Self::Pattern => "pattern",
            Self::MinItems => "minItems",
            Self::MaxItems => "maxItems",
            Self::UniqueItems => "uniqueItems",
            Self::MinProperties => "minProperties",
            Self::MaxProperties => "maxProperties",
            Self::Enum => "enum",
            Self::Const => "const",
        }
    }

    /// Check the literal has the shape the keyword requires
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        let ok = match self {
            Self::Minimum | Self::Maximum => value.is_number(),
            // Draft 4 uses booleans, later drafts numbers
            Self::ExclusiveMinimum | Self::ExclusiveMaximum => value.is_number() || value.is_boolean(),
            Self::MultipleOf => value.as_f64().is_some_and(|m| m > 0.0),
            Self::MinLength
            | Self::MaxLength
            | Self::MinItems
            | Self::MaxItems
            | Self::MinProperties
            | Self::MaxProperties => value.is_u64(),
            Self::Pattern => value.is_string(),
            Self::UniqueItems => value.is_boolean(),
            Self::Enum => value.is_array(),
            Self::Const => true,
        };

        if ok {
            Ok(())
        } else {
            Err(format!("'{}' has an invalid value: {}", self.as_str(), value))
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Constraint keyword → literal
pub type Constraints = BTreeMap<Keyword, Value>;

// =============================================================================
// Node kinds
// =============================================================================

/// What a `Reference` points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    /// A `$ref` string, resolved against the definitions table at generation time
    Pointer(String),
    /// An ancestor on the build stack (self-embedding without `$ref`)
    Ancestor(String),
}

impl fmt::Display for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pointer(p) => write!(f, "{}", p),
            Self::Ancestor(name) => write!(f, "<ancestor {}>", name),
        }
    }
}

/// `additionalProperties` of an object
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AdditionalProperties {
    /// Absent or `true`
    #[default]
    Allowed,
    /// `false`
    Forbidden,
    /// A schema every undeclared property must satisfy
    Schema(Box<SchemaNode>),
}

/// Closed set of IR node shapes
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Object {
        properties: BTreeMap<String, SchemaNode>,
        /// Keyed by the original, untranslated pattern
        pattern_properties: BTreeMap<String, SchemaNode>,
        required: BTreeSet<String>,
        additional: AdditionalProperties,
    },
    Array {
        items: Option<Box<SchemaNode>>,
    },
    String {
        format: Option<String>,
    },
    Number,
    Integer,
    Boolean,
    Null,
    AllOf(Vec<SchemaNode>),
    AnyOf(Vec<SchemaNode>),
    OneOf(Vec<SchemaNode>),
    Not(Box<SchemaNode>),
    If {
        condition: Box<SchemaNode>,
        /// A `Then` node, when `then` is present
        then_branch: Option<Box<SchemaNode>>,
        /// An `Else` node, when `else` is present
        else_branch: Option<Box<SchemaNode>>,
    },
    Then(Box<SchemaNode>),
    Else(Box<SchemaNode>),
    Reference {
        target: RefTarget,
    },
    /// Unconstrained: boolean schema `true`, or a malformed fragment
    Any,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Object { .. } => "object",
            Self::Array { .. } => "array",
            Self::String { .. } => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Null => "null",
            Self::AllOf(_) => "allOf",
            Self::AnyOf(_) => "anyOf",
            Self::OneOf(_) => "oneOf",
            Self::Not(_) => "not",
            Self::If { .. } => "if",
            Self::Then(_) => "then",
            Self::Else(_) => "else",
            Self::Reference { .. } => "reference",
            Self::Any => "any",
        }
    }
}

// =============================================================================
// SchemaNode
// =============================================================================

/// One IR node
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    /// Unique within a generation run
    pub schema_name: String,
    /// The original input map
    pub raw: Map<String, Value>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub default: Option<Value>,
    pub constraints: Constraints,
    /// `type` was an array; only its first entry shaped this node
    pub type_union: bool,
    /// A `type` keyword was present
    pub declared_type: bool,
    pub kind: NodeKind,
}

impl SchemaNode {
    pub fn new(schema_name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            schema_name: schema_name.into(),
            raw: Map::new(),
            title: None,
            description: None,
            default: None,
            constraints: Constraints::new(),
            type_union: false,
            declared_type: false,
            kind,
        }
    }

    /// The unconstrained node
    pub fn any(schema_name: impl Into<String>) -> Self {
        Self::new(schema_name, NodeKind::Any)
    }

    pub fn with_raw(mut self, raw: &Map<String, Value>) -> Self {
        self.raw = raw.clone();
        self
    }

    pub fn constraint(&self, keyword: Keyword) -> Option<&Value> {
        self.constraints.get(&keyword)
    }

    pub fn is_composition(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::AllOf(_)
                | NodeKind::AnyOf(_)
                | NodeKind::OneOf(_)
                | NodeKind::Not(_)
                | NodeKind::If { .. }
                | NodeKind::Then(_)
                | NodeKind::Else(_)
        )
    }

    /// Objects that declare structure of their own
    pub fn has_declared_members(&self) -> bool {
        match &self.kind {
            NodeKind::Object {
                properties,
                pattern_properties,
                ..
            } => !properties.is_empty() || !pattern_properties.is_empty(),
            _ => false,
        }
    }

    /// Direct children in declaration order
    pub fn children(&self) -> Vec<&SchemaNode> {
        match &self.kind {
            NodeKind::Object {
                properties,
                pattern_properties,
                additional,
                ..
            } => {
                let mut out: Vec<&SchemaNode> = properties.values().collect();
                out.extend(pattern_properties.values());
                if let AdditionalProperties::Schema(node) = additional {
                    out.push(node);
                }
                out
            }
            NodeKind::Array { items } => items.iter().map(|b| b.as_ref()).collect(),
            NodeKind::AllOf(subs) | NodeKind::AnyOf(subs) | NodeKind::OneOf(subs) => subs.iter().collect(),
            NodeKind::Not(sub) | NodeKind::Then(sub) | NodeKind::Else(sub) => vec![sub.as_ref()],
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut out = vec![condition.as_ref()];
                out.extend(then_branch.as_deref());
                out.extend(else_branch.as_deref());
                out
            }
            NodeKind::String { .. }
            | NodeKind::Number
            | NodeKind::Integer
            | NodeKind::Boolean
            | NodeKind::Null
            | NodeKind::Reference { .. }
            | NodeKind::Any => Vec::new(),
        }
    }

    /// Total node count of this subtree
    pub fn node_count(&self) -> usize {
        1 + self.children().into_iter().map(SchemaNode::node_count).sum::<usize>()
    }

    /// Visit this subtree depth-first, parents before children
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a SchemaNode)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}
