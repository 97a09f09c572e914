//! Composition Handler
//!
//! Structural analysis of composition nodes for the schema form:
//! which compositions describe objects, which attributes an `allOf` merges
//! into one schema, and which sub-schemas still need a whole-instance check
//! because the merged attributes cannot express them.

use std::collections::{BTreeMap, BTreeSet};

use super::definitions::SchemaArena;
use crate::ir::{AdditionalProperties, NodeKind, SchemaNode};

/// One attribute of a flattened `allOf`
#[derive(Debug, Clone, PartialEq)]
pub struct FlatField<'n> {
    /// Declaring property schema; `None` for names only listed in `required`
    pub node: Option<&'n SchemaNode>,
    pub required: bool,
}

/// The attributes an `allOf` merges, plus the sub-schemas left over
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flattened<'n> {
    pub fields: BTreeMap<String, FlatField<'n>>,
    /// Sub-schemas the attributes do not fully capture; each is checked
    /// against the whole instance
    pub residual: Vec<&'n SchemaNode>,
}

/// Merge the object-like sub-schemas of an `allOf`.
///
/// Local references and nested `allOf`s are followed. The first declaration
/// of a property wins its attribute type; `required` sets are unioned.
pub fn flatten_all_of<'n>(node: &'n SchemaNode, arena: &'n SchemaArena) -> Flattened<'n> {
    let mut flat = Flattened::default();
    let mut seen = BTreeSet::new();
    seen.insert(node.schema_name.clone());

    if let NodeKind::AllOf(subs) = &node.kind {
        for sub in subs {
            merge(sub, sub, arena, &mut seen, &mut flat);
        }
    } else {
        merge(node, node, arena, &mut seen, &mut flat);
    }
    flat
}

/// `origin` is the node as written in the `allOf`, `sub` what it resolves to
fn merge<'n>(
    origin: &'n SchemaNode,
    sub: &'n SchemaNode,
    arena: &'n SchemaArena,
    seen: &mut BTreeSet<String>,
    flat: &mut Flattened<'n>,
) {
    match &sub.kind {
        NodeKind::Reference { target } => match arena.target(target) {
            Some(resolved) if seen.insert(resolved.schema_name.clone()) => {
                merge(origin, resolved, arena, seen, flat);
            }
            // Already merged through another path
            Some(_) => {}
            None => push_residual(flat, origin),
        },
        NodeKind::AllOf(subs) => {
            for nested in subs {
                let nested_origin = if std::ptr::eq(origin, sub) { nested } else { origin };
                merge(nested_origin, nested, arena, seen, flat);
            }
        }
        NodeKind::Object {
            properties,
            pattern_properties,
            required,
            additional,
        } => {
            let mut captured = sub.constraints.is_empty()
                && pattern_properties.is_empty()
                && matches!(additional, AdditionalProperties::Allowed);

            for (key, child) in properties {
                match flat.fields.get_mut(key) {
                    Some(field) if field.node.is_some() => captured = false,
                    Some(field) => field.node = Some(child),
                    None => {
                        flat.fields.insert(
                            key.clone(),
                            FlatField {
                                node: Some(child),
                                required: false,
                            },
                        );
                    }
                }
            }
            for key in required {
                flat.fields
                    .entry(key.clone())
                    .or_insert(FlatField {
                        node: None,
                        required: false,
                    })
                    .required = true;
            }

            if !captured {
                push_residual(flat, origin);
            }
        }
        _ => push_residual(flat, origin),
    }
}

fn push_residual<'n>(flat: &mut Flattened<'n>, node: &'n SchemaNode) {
    if !flat.residual.iter().any(|r| std::ptr::eq(*r, node)) {
        flat.residual.push(node);
    }
}

/// Whether every value `node` accepts is an object, looking through
/// references and compositions.
///
/// `allOf` needs one object member; `anyOf`/`oneOf` and conditionals need
/// every branch to be one, or a non-object value could match.
pub fn is_object_like(node: &SchemaNode, arena: &SchemaArena) -> bool {
    let mut visiting = BTreeSet::new();
    object_like(node, arena, &mut visiting)
}

fn object_like(node: &SchemaNode, arena: &SchemaArena, visiting: &mut BTreeSet<String>) -> bool {
    match &node.kind {
        NodeKind::Object { .. } => true,
        NodeKind::Reference { target } => match arena.target(target) {
            Some(resolved) if visiting.insert(resolved.schema_name.clone()) => {
                let result = object_like(resolved, arena, visiting);
                visiting.remove(&resolved.schema_name);
                result
            }
            _ => false,
        },
        NodeKind::AllOf(subs) => subs.iter().any(|sub| object_like(sub, arena, visiting)),
        NodeKind::AnyOf(subs) | NodeKind::OneOf(subs) => {
            !subs.is_empty() && subs.iter().all(|sub| object_like(sub, arena, visiting))
        }
        NodeKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            object_like(condition, arena, visiting)
                && then_branch.as_deref().map_or(true, |b| object_like(b, arena, visiting))
                && else_branch.as_deref().map_or(true, |b| object_like(b, arena, visiting))
        }
        NodeKind::Then(inner) | NodeKind::Else(inner) => object_like(inner, arena, visiting),
        NodeKind::Not(_)
        | NodeKind::Array { .. }
        | NodeKind::String { .. }
        | NodeKind::Number
        | NodeKind::Integer
        | NodeKind::Boolean
        | NodeKind::Null
        | NodeKind::Any => false,
    }
}

/// Every property name any branch of `node` may declare
pub fn branch_property_names(node: &SchemaNode, arena: &SchemaArena) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut seen = BTreeSet::new();
    collect_names(node, arena, &mut seen, &mut names);
    names
}

fn collect_names(node: &SchemaNode, arena: &SchemaArena, seen: &mut BTreeSet<String>, out: &mut BTreeSet<String>) {
    match &node.kind {
        NodeKind::Object {
            properties, required, ..
        } => {
            out.extend(properties.keys().cloned());
            out.extend(required.iter().cloned());
        }
        NodeKind::Reference { target } => {
            if let Some(resolved) = arena.target(target) {
                if seen.insert(resolved.schema_name.clone()) {
                    collect_names(resolved, arena, seen, out);
                }
            }
        }
        other => {
            for child in composition_children(other) {
                collect_names(child, arena, seen, out);
            }
        }
    }
}

fn composition_children(kind: &NodeKind) -> Vec<&SchemaNode> {
    match kind {
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
        _ => Vec::new(),
    }
}
