//! Type Resolver
//!
//! Maps IR nodes to the attribute types written into schemas and aliases.
//! Resolution is pure; everything it needs to know about other artifacts
//! comes through [`TypeScope`].

use super::config::RenderProfile;
use super::formats;
use crate::error::{GenError, Result};
use crate::ir::{AdditionalProperties, NodeKind, RefTarget, SchemaNode};

/// A resolved attribute type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Any,
    Str,
    Int,
    Float,
    Bool,
    Null,
    List(Box<TypeExpr>),
    /// String-keyed dict
    Map(Box<TypeExpr>),
    /// A generated artifact
    Named(String),
}

impl TypeExpr {
    pub fn render(&self, profile: &RenderProfile) -> String {
        match self {
            Self::Any => profile.types.any.clone(),
            Self::Str => profile.types.string.clone(),
            Self::Int => profile.types.integer.clone(),
            Self::Float => profile.types.number.clone(),
            Self::Bool => profile.types.boolean.clone(),
            Self::Null => profile.types.null.clone(),
            Self::List(inner) => profile.wrap_array(&inner.render(profile)),
            Self::Map(inner) => profile.wrap_map(&inner.render(profile)),
            Self::Named(name) => name.clone(),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

/// What the resolver may ask about the rest of the run
pub trait TypeScope {
    /// Artifact name a `$ref` target resolves to
    fn reference_name(&self, target: &RefTarget) -> Option<String>;

    /// Whether the node has been emitted as an artifact of its own
    fn is_artifact(&self, node: &SchemaNode) -> bool;

    /// Artifact name of a generated format validator
    fn format_artifact(&self, format: &str) -> Option<String>;
}

/// Resolve the attribute type for `node`.
pub fn resolve(node: &SchemaNode, scope: &impl TypeScope) -> Result<TypeExpr> {
    // References carry no `type`, so they never collide with the union rule
    if node.type_union {
        return Ok(TypeExpr::Any);
    }

    let resolved = match &node.kind {
        NodeKind::Reference { target } => scope
            .reference_name(target)
            .map(TypeExpr::Named)
            .ok_or_else(|| GenError::UnresolvedReference {
                schema: node.schema_name.clone(),
                target: target.to_string(),
            })?,
        NodeKind::String { format } => format
            .as_deref()
            .filter(|f| formats::lookup(f).is_some())
            .and_then(|f| scope.format_artifact(f))
            .map(TypeExpr::Named)
            .unwrap_or(TypeExpr::Str),
        NodeKind::Integer => TypeExpr::Int,
        NodeKind::Number => TypeExpr::Float,
        NodeKind::Boolean => TypeExpr::Bool,
        NodeKind::Null => TypeExpr::Null,
        NodeKind::Array { items } => {
            let inner = match items {
                Some(items) => resolve(items, scope)?,
                None => TypeExpr::Any,
            };
            TypeExpr::List(Box::new(inner))
        }
        NodeKind::Object { additional, .. } => {
            if scope.is_artifact(node) {
                TypeExpr::Named(node.schema_name.clone())
            } else if !node.declared_type && matches!(additional, AdditionalProperties::Allowed) {
                // `{}` and metadata-only fragments constrain nothing
                TypeExpr::Any
            } else {
                let values = match additional {
                    AdditionalProperties::Schema(child) => resolve(child, scope)?,
                    _ => TypeExpr::Any,
                };
                TypeExpr::Map(Box::new(values))
            }
        }
        NodeKind::AllOf(_)
        | NodeKind::AnyOf(_)
        | NodeKind::OneOf(_)
        | NodeKind::Not(_)
        | NodeKind::If { .. }
        | NodeKind::Then(_)
        | NodeKind::Else(_) => {
            if scope.is_artifact(node) {
                TypeExpr::Named(node.schema_name.clone())
            } else {
                TypeExpr::Any
            }
        }
        NodeKind::Any => TypeExpr::Any,
    };

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[derive(Default)]
    struct FixedScope {
        artifacts: BTreeSet<String>,
        refs: Vec<(String, String)>,
        formats: Vec<(String, String)>,
    }

    impl TypeScope for FixedScope {
        fn reference_name(&self, target: &RefTarget) -> Option<String> {
            let target = target.to_string();
            self.refs.iter().find(|(p, _)| *p == target).map(|(_, n)| n.clone())
        }

        fn is_artifact(&self, node: &SchemaNode) -> bool {
            self.artifacts.contains(&node.schema_name)
        }

        fn format_artifact(&self, format: &str) -> Option<String> {
            self.formats.iter().find(|(f, _)| f == format).map(|(_, n)| n.clone())
        }
    }

    fn render(node: &SchemaNode, scope: &FixedScope) -> String {
        resolve(node, scope).unwrap().render(&RenderProfile::kcl())
    }

    fn object(name: &str, declared: bool, additional: AdditionalProperties) -> SchemaNode {
        let mut node = SchemaNode::new(
            name,
            NodeKind::Object {
                properties: Default::default(),
                pattern_properties: Default::default(),
                required: Default::default(),
                additional,
            },
        );
        node.declared_type = declared;
        node
    }

    #[test]
    fn test_scalars_and_lists() {
        let scope = FixedScope::default();
        assert_eq!(render(&SchemaNode::new("A", NodeKind::Integer), &scope), "int");
        assert_eq!(render(&SchemaNode::new("A", NodeKind::Number), &scope), "float");
        assert_eq!(render(&SchemaNode::new("A", NodeKind::Null), &scope), "None");

        let list = SchemaNode::new(
            "Tags",
            NodeKind::Array {
                items: Some(Box::new(SchemaNode::new("TagsItems", NodeKind::String { format: None }))),
            },
        );
        assert_eq!(render(&list, &scope), "[str]");
        assert_eq!(render(&SchemaNode::new("L", NodeKind::Array { items: None }), &scope), "[any]");
    }

    #[test]
    fn test_reference_and_unresolved() {
        let scope = FixedScope {
            refs: vec![("#/definitions/Pet".into(), "Pet".into())],
            ..Default::default()
        };
        let good = SchemaNode::new(
            "OwnerPet",
            NodeKind::Reference {
                target: RefTarget::Pointer("#/definitions/Pet".into()),
            },
        );
        assert_eq!(render(&good, &scope), "Pet");

        let bad = SchemaNode::new(
            "OwnerCat",
            NodeKind::Reference {
                target: RefTarget::Pointer("#/definitions/Cat".into()),
            },
        );
        match resolve(&bad, &scope) {
            Err(GenError::UnresolvedReference { schema, target }) => {
                assert_eq!(schema, "OwnerCat");
                assert_eq!(target, "#/definitions/Cat");
            }
            other => panic!("Expected UnresolvedReference, got {:?}", other),
        }
    }

    #[test]
    fn test_type_union_is_any() {
        let mut node = SchemaNode::new("Nick", NodeKind::String { format: None });
        node.type_union = true;
        assert_eq!(render(&node, &FixedScope::default()), "any");
    }

    #[test]
    fn test_formats_use_validator_artifact() {
        let scope = FixedScope {
            formats: vec![("email".into(), "EmailValidator".into())],
            ..Default::default()
        };
        let email = SchemaNode::new("E", NodeKind::String { format: Some("email".into()) });
        let unknown = SchemaNode::new("U", NodeKind::String { format: Some("x-custom".into()) });
        assert_eq!(render(&email, &scope), "EmailValidator");
        assert_eq!(render(&unknown, &scope), "str");
    }

    #[test]
    fn test_objects() {
        let mut scope = FixedScope::default();
        scope.artifacts.insert("Pet".into());

        assert_eq!(render(&object("Pet", true, AdditionalProperties::Allowed), &scope), "Pet");
        assert_eq!(render(&object("Bag", true, AdditionalProperties::Allowed), &scope), "{str:any}");
        assert_eq!(render(&object("Blank", false, AdditionalProperties::Allowed), &scope), "any");

        let counts = object(
            "Counts",
            true,
            AdditionalProperties::Schema(Box::new(SchemaNode::new("CountsAdditional", NodeKind::Integer))),
        );
        assert_eq!(render(&counts, &scope), "{str:int}");
    }

    #[test]
    fn test_composition_types() {
        let mut scope = FixedScope::default();
        let one_of = SchemaNode::new("Value", NodeKind::OneOf(vec![SchemaNode::any("ValueOneOf0")]));
        assert_eq!(render(&one_of, &scope), "any");

        scope.artifacts.insert("Value".into());
        assert_eq!(render(&one_of, &scope), "Value");
    }
}
