//! Schema Tree Builder
//!
//! Turns raw schema maps into [`SchemaNode`] trees. Checks run in a fixed
//! order: `$ref`, then composition keywords, then `type`. A fragment with an
//! unexpected shape becomes an `Any` node plus a diagnostic; only a
//! top-level input that is not a schema at all is an error.
//!
//! `$ref` is never followed here. The only remaining cycle risk is a raw map
//! that embeds itself, which is caught by tracking the identity of every map
//! on the recursion stack.

use serde_json::{Map, Value};

use super::diagnostics::{DiagnosticCode, Diagnostics};
use super::{AdditionalProperties, Keyword, NodeKind, RefTarget, SchemaNode};
use crate::codegen::names::{sanitize_property, NameRegistry};
use crate::error::{GenError, Result};

/// Composition keywords in the order they are checked
const COMPOSITION_KEYWORDS: [&str; 5] = ["allOf", "anyOf", "oneOf", "not", "if"];

/// Keywords that give a schema structure beyond metadata
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "type", "properties", "patternProperties", "additionalProperties", "required", "items",
    "format", "allOf", "anyOf", "oneOf", "not", "if", "minimum", "maximum", "exclusiveMinimum",
    "exclusiveMaximum", "multipleOf", "minLength", "maxLength", "pattern", "minItems",
    "maxItems", "uniqueItems", "minProperties", "maxProperties", "enum", "const",
];

/// Builds IR trees for one generation run.
pub struct TreeBuilder<'a> {
    names: &'a mut NameRegistry,
    diagnostics: &'a mut Diagnostics,
    max_depth: usize,
    /// Identity of each raw map on the current recursion stack, with its node name
    in_progress: Vec<(usize, String)>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(names: &'a mut NameRegistry, diagnostics: &'a mut Diagnostics, max_depth: usize) -> Self {
        Self {
            names,
            diagnostics,
            max_depth,
            in_progress: Vec::new(),
        }
    }

    /// Build `raw`, claiming `name` (suffixed if already taken).
    pub fn build(&mut self, raw: &Value, name: &str) -> Result<SchemaNode> {
        Self::check_top_level(raw, name)?;
        let name = self.claim(name);
        Ok(self.build_node(raw, name, 0))
    }

    /// Build `raw` under a name the caller already reserved in the registry.
    pub fn build_claimed(&mut self, raw: &Value, name: String) -> Result<SchemaNode> {
        Self::check_top_level(raw, &name)?;
        Ok(self.build_node(raw, name, 0))
    }

    fn check_top_level(raw: &Value, name: &str) -> Result<()> {
        match raw {
            Value::Object(_) | Value::Bool(_) => Ok(()),
            other => Err(GenError::MalformedSchema {
                schema: name.to_string(),
                reason: format!("expected a schema object, found {}", json_type_name(other)),
            }),
        }
    }

    fn claim(&mut self, candidate: &str) -> String {
        let claimed = self.names.claim(candidate);
        if claimed.disambiguated {
            self.diagnostics.name_collision(candidate, &claimed.name);
        }
        claimed.name
    }

    fn child(&mut self, raw: &Value, candidate: &str, depth: usize) -> SchemaNode {
        let name = self.claim(candidate);
        self.build_node(raw, name, depth + 1)
    }

    fn build_node(&mut self, raw: &Value, name: String, depth: usize) -> SchemaNode {
        if depth > self.max_depth {
            self.diagnostics.malformed(
                &name,
                "<depth>",
                format!("nesting exceeds the maximum depth of {}", self.max_depth),
            );
            return SchemaNode::any(name);
        }

        let map = match raw {
            Value::Object(map) => map,
            Value::Bool(true) => return SchemaNode::any(name),
            Value::Bool(false) => {
                let inner = self.claim(&format!("{}_not", name));
                return SchemaNode::new(name, NodeKind::Not(Box::new(SchemaNode::any(inner))));
            }
            other => {
                self.diagnostics.malformed(
                    &name,
                    "<schema>",
                    format!("expected a schema object, found {}", json_type_name(other)),
                );
                return SchemaNode::any(name);
            }
        };

        let identity = map as *const Map<String, Value> as usize;
        if let Some((_, ancestor)) = self.in_progress.iter().find(|(id, _)| *id == identity) {
            tracing::debug!(schema = %name, ancestor = %ancestor, "self-embedding detected");
            let target = RefTarget::Ancestor(ancestor.clone());
            return SchemaNode::new(name, NodeKind::Reference { target }).with_raw(map);
        }

        self.in_progress.push((identity, name.clone()));
        let node = self.build_map(map, name, depth);
        self.in_progress.pop();
        node
    }

    fn build_map(&mut self, map: &Map<String, Value>, name: String, depth: usize) -> SchemaNode {
        match self.build_kind(map, &name, depth) {
            Ok(built) => {
                let mut node = SchemaNode::new(name, built.kind).with_raw(map);
                node.title = map.get("title").and_then(Value::as_str).map(str::to_string);
                node.description = map.get("description").and_then(Value::as_str).map(str::to_string);
                node.default = map.get("default").cloned();
                node.type_union = built.type_union;
                node.declared_type = built.declared_type;
                if built.typed {
                    node.constraints = built.constraints;
                }
                node
            }
            Err(malformed) => {
                self.diagnostics.malformed(&name, malformed.keyword, malformed.reason);
                SchemaNode::any(name).with_raw(map)
            }
        }
    }

    fn build_kind(&mut self, map: &Map<String, Value>, name: &str, depth: usize) -> BuildResult<BuiltKind> {
        if let Some(target) = map.get("$ref") {
            let target = target
                .as_str()
                .ok_or_else(|| Malformed::new("$ref", "$ref must be a string"))?;
            return Ok(BuiltKind::untyped(NodeKind::Reference {
                target: RefTarget::Pointer(target.to_string()),
            }));
        }

        if let Some(keyword) = COMPOSITION_KEYWORDS.into_iter().find(|k| map.contains_key(*k)) {
            return self.build_composition(map, name, keyword, depth);
        }

        self.build_typed(map, name, depth)
    }

    // =========================================================================
    // Composition
    // =========================================================================

    fn build_composition(
        &mut self,
        map: &Map<String, Value>,
        name: &str,
        keyword: &str,
        depth: usize,
    ) -> BuildResult<BuiltKind> {
        let kind = self.composition_kind(map, name, keyword, depth)?;

        if !has_structural_siblings(map, keyword) {
            return Ok(BuiltKind::untyped(kind));
        }

        // Sibling keywords apply alongside the composition: build them as
        // their own sub-schema and require both.
        let mut base_map = map.clone();
        for consumed in consumed_keywords(keyword) {
            base_map.remove(*consumed);
        }
        let base = self.child(&Value::Object(base_map), &format!("{}_base", name), depth);

        let subs = match kind {
            NodeKind::AllOf(mut subs) => {
                subs.insert(0, base);
                subs
            }
            other => {
                let comp_name = self.claim(&format!("{}_composition", name));
                vec![base, SchemaNode::new(comp_name, other)]
            }
        };
        Ok(BuiltKind::untyped(NodeKind::AllOf(subs)))
    }

    fn composition_kind(
        &mut self,
        map: &Map<String, Value>,
        name: &str,
        keyword: &str,
        depth: usize,
    ) -> BuildResult<NodeKind> {
        match keyword {
            "allOf" | "anyOf" | "oneOf" => {
                let entries = map
                    .get(keyword)
                    .and_then(Value::as_array)
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| Malformed::new(keyword, format!("{} must be a non-empty array", keyword)))?;
                let kind_name = snake_keyword(keyword);
                let subs: Vec<SchemaNode> = entries
                    .iter()
                    .enumerate()
                    .map(|(i, entry)| self.child(entry, &format!("{}_{}_{}", name, kind_name, i), depth))
                    .collect();
                Ok(match keyword {
                    "allOf" => NodeKind::AllOf(subs),
                    "anyOf" => NodeKind::AnyOf(subs),
                    _ => NodeKind::OneOf(subs),
                })
            }
            "not" => {
                let raw = map.get("not").ok_or_else(|| Malformed::new("not", "missing not"))?;
                let sub = self.child(raw, &format!("{}_not", name), depth);
                Ok(NodeKind::Not(Box::new(sub)))
            }
            _ => {
                let raw = map.get("if").ok_or_else(|| Malformed::new("if", "missing if"))?;
                let condition = self.child(raw, &format!("{}_if", name), depth);
                let then_branch = map
                    .get("then")
                    .map(|raw| Box::new(self.branch(raw, name, "then", depth)));
                let else_branch = map
                    .get("else")
                    .map(|raw| Box::new(self.branch(raw, name, "else", depth)));
                Ok(NodeKind::If {
                    condition: Box::new(condition),
                    then_branch,
                    else_branch,
                })
            }
        }
    }

    /// `then`/`else` wrapper node holding exactly one child
    fn branch(&mut self, raw: &Value, name: &str, which: &str, depth: usize) -> SchemaNode {
        let wrapper_name = self.claim(&format!("{}_{}", name, which));
        let inner = self.child(raw, &format!("{}_{}_0", name, which), depth + 1);
        let kind = if which == "then" {
            NodeKind::Then(Box::new(inner))
        } else {
            NodeKind::Else(Box::new(inner))
        };
        SchemaNode::new(wrapper_name, kind)
    }

    // =========================================================================
    // Typed nodes
    // =========================================================================

    fn build_typed(&mut self, map: &Map<String, Value>, name: &str, depth: usize) -> BuildResult<BuiltKind> {
        let (type_name, type_union, declared_type) = match map.get("type") {
            None => (infer_type(map), false, false),
            Some(Value::String(t)) => (t.as_str(), false, true),
            Some(Value::Array(types)) => {
                let first = types
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| Malformed::new("type", "type array must hold type names"))?;
                if types.len() > 1 {
                    self.diagnostics.report(
                        name,
                        DiagnosticCode::TypeUnion,
                        format!("type {} collapsed to any", Value::Array(types.clone())),
                    );
                }
                (first, types.len() > 1, true)
            }
            Some(other) => {
                return Err(Malformed::new("type", format!("type must be a string or array, found {}", other)));
            }
        };

        let mut constraints = super::Constraints::new();
        for keyword in Keyword::ALL {
            if let Some(value) = map.get(keyword.as_str()) {
                keyword.validate(value).map_err(|reason| Malformed::new(keyword.as_str(), reason))?;
                constraints.insert(keyword, value.clone());
            }
        }

        let kind = match type_name {
            "object" => self.build_object(map, name, depth)?,
            "array" => self.build_array(map, name, depth)?,
            "string" => NodeKind::String {
                format: match map.get("format") {
                    None => None,
                    Some(Value::String(f)) => Some(f.clone()),
                    Some(_) => return Err(Malformed::new("format", "format must be a string")),
                },
            },
            "number" => NodeKind::Number,
            "integer" => NodeKind::Integer,
            "boolean" => NodeKind::Boolean,
            "null" => NodeKind::Null,
            other => return Err(Malformed::new("type", format!("unknown type '{}'", other))),
        };

        Ok(BuiltKind {
            kind,
            constraints,
            type_union,
            declared_type,
            typed: true,
        })
    }

    fn build_object(&mut self, map: &Map<String, Value>, name: &str, depth: usize) -> BuildResult<NodeKind> {
        let mut properties = std::collections::BTreeMap::new();
        if let Some(raw) = map.get("properties") {
            let entries = raw
                .as_object()
                .ok_or_else(|| Malformed::new("properties", "properties must be an object"))?;
            for (prop, sub) in entries {
                let child = self.child(sub, &format!("{}_{}", name, prop), depth);
                properties.insert(prop.clone(), child);
            }
        }

        let mut pattern_properties = std::collections::BTreeMap::new();
        if let Some(raw) = map.get("patternProperties") {
            let entries = raw
                .as_object()
                .ok_or_else(|| Malformed::new("patternProperties", "patternProperties must be an object"))?;
            for (pattern, sub) in entries {
                let candidate = format!("{}_pattern_{}", name, sanitize_property(pattern));
                let child = self.child(sub, &candidate, depth);
                pattern_properties.insert(pattern.clone(), child);
            }
        }

        let required = match map.get("required") {
            None => Default::default(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|n| n.as_str().map(str::to_string))
                .collect::<Option<_>>()
                .ok_or_else(|| Malformed::new("required", "required must list property names"))?,
            // Draft 3 style `required: true` on a property is handled by the parent
            Some(Value::Bool(_)) => Default::default(),
            Some(_) => return Err(Malformed::new("required", "required must be an array")),
        };

        let additional = match map.get("additionalProperties") {
            None | Some(Value::Bool(true)) => AdditionalProperties::Allowed,
            Some(Value::Bool(false)) => AdditionalProperties::Forbidden,
            Some(sub @ Value::Object(_)) => {
                let child = self.child(sub, &format!("{}_additional", name), depth);
                AdditionalProperties::Schema(Box::new(child))
            }
            Some(_) => {
                return Err(Malformed::new(
                    "additionalProperties",
                    "additionalProperties must be a boolean or a schema",
                ))
            }
        };

        Ok(NodeKind::Object {
            properties,
            pattern_properties,
            required,
            additional,
        })
    }

    fn build_array(&mut self, map: &Map<String, Value>, name: &str, depth: usize) -> BuildResult<NodeKind> {
        let items = match map.get("items") {
            None => None,
            Some(sub @ (Value::Object(_) | Value::Bool(_))) => {
                Some(Box::new(self.child(sub, &format!("{}_items", name), depth)))
            }
            Some(Value::Array(tuple)) => {
                self.diagnostics.report(
                    name,
                    DiagnosticCode::TupleItems,
                    format!("tuple-form items with {} entries; only the first is used", tuple.len()),
                );
                tuple
                    .first()
                    .map(|first| Box::new(self.child(first, &format!("{}_items", name), depth)))
            }
            Some(_) => return Err(Malformed::new("items", "items must be an object or an array")),
        };
        Ok(NodeKind::Array { items })
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct BuiltKind {
    kind: NodeKind,
    constraints: super::Constraints,
    type_union: bool,
    declared_type: bool,
    /// Constraints only attach to typed nodes
    typed: bool,
}

impl BuiltKind {
    fn untyped(kind: NodeKind) -> Self {
        Self {
            kind,
            constraints: Default::default(),
            type_union: false,
            declared_type: false,
            typed: false,
        }
    }
}

/// Outcome of building one fragment; a malformed fragment degrades to `Any`
type BuildResult<T> = std::result::Result<T, Malformed>;

struct Malformed {
    keyword: &'static str,
    reason: String,
}

impl Malformed {
    fn new(keyword: &str, reason: impl Into<String>) -> Self {
        Self {
            keyword: static_keyword(keyword),
            reason: reason.into(),
        }
    }
}

fn static_keyword(keyword: &str) -> &'static str {
    STRUCTURAL_KEYWORDS
        .iter()
        .chain(["$ref", "then", "else"].iter())
        .find(|k| **k == keyword)
        .copied()
        .unwrap_or("<schema>")
}

/// Keywords a composition node consumes from its map
fn consumed_keywords(keyword: &str) -> &'static [&'static str] {
    match keyword {
        "allOf" => &["allOf"],
        "anyOf" => &["anyOf"],
        "oneOf" => &["oneOf"],
        "not" => &["not"],
        _ => &["if", "then", "else"],
    }
}

fn has_structural_siblings(map: &Map<String, Value>, keyword: &str) -> bool {
    let consumed = consumed_keywords(keyword);
    map.keys()
        .any(|k| STRUCTURAL_KEYWORDS.contains(&k.as_str()) && !consumed.contains(&k.as_str()))
}

fn snake_keyword(keyword: &str) -> &'static str {
    match keyword {
        "allOf" => "all_of",
        "anyOf" => "any_of",
        "oneOf" => "one_of",
        "not" => "not",
        _ => "if",
    }
}

/// Type implied by the keywords present when `type` is absent
fn infer_type(map: &Map<String, Value>) -> &'static str {
    let has = |keys: &[&str]| keys.iter().any(|k| map.contains_key(*k));

    if has(&["properties", "patternProperties", "additionalProperties", "required", "minProperties", "maxProperties"]) {
        "object"
    } else if has(&["items", "minItems", "maxItems", "uniqueItems"]) {
        "array"
    } else if has(&["minLength", "maxLength", "pattern", "format"]) {
        "string"
    } else if has(&["minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum", "multipleOf"]) {
        "number"
    } else {
        "object"
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(raw: Value, name: &str) -> (SchemaNode, Diagnostics) {
        let mut names = NameRegistry::new();
        let mut diagnostics = Diagnostics::new();
        let node = TreeBuilder::new(&mut names, &mut diagnostics, 32)
            .build(&raw, name)
            .unwrap();
        (node, diagnostics)
    }

    #[test]
    fn test_object_properties_and_required() {
        let (node, diags) = build(
            json!({
                "type": "object",
                "title": "Pet",
                "required": ["name"],
                "properties": {
                    "name": {"type": "string", "minLength": 1},
                    "tags": {"type": "array", "items": {"type": "string"}}
                }
            }),
            "pet",
        );
        assert!(diags.is_empty());
        assert_eq!(node.schema_name, "Pet");
        assert_eq!(node.title.as_deref(), Some("Pet"));

        match &node.kind {
            NodeKind::Object { properties, required, .. } => {
                assert!(required.contains("name"));
                let name = &properties["name"];
                assert_eq!(name.schema_name, "PetName");
                assert_eq!(name.constraint(Keyword::MinLength), Some(&json!(1)));

                match &properties["tags"].kind {
                    NodeKind::Array { items: Some(items) } => assert_eq!(items.schema_name, "PetTagsItems"),
                    other => panic!("Expected Array, got {:?}", other),
                }
            }
            other => panic!("Expected Object, got {:?}", other),
        }
    }

    #[test]
    fn test_ref_is_not_followed() {
        let (node, _) = build(json!({"$ref": "#/definitions/Pet", "type": "string"}), "owner");
        match node.kind {
            NodeKind::Reference { target } => assert_eq!(target, RefTarget::Pointer("#/definitions/Pet".into())),
            other => panic!("Expected Reference, got {:?}", other),
        }
    }

    #[test]
    fn test_composition_child_names() {
        let (node, _) = build(json!({"oneOf": [{"type": "string"}, {"type": "integer"}]}), "value");
        match &node.kind {
            NodeKind::OneOf(subs) => {
                let names: Vec<_> = subs.iter().map(|s| s.schema_name.as_str()).collect();
                assert_eq!(names, vec!["ValueOneOf0", "ValueOneOf1"]);
            }
            other => panic!("Expected OneOf, got {:?}", other),
        }
    }

    #[test]
    fn test_composition_with_sibling_keywords() {
        let (node, _) = build(
            json!({
                "type": "object",
                "properties": {"x": {"type": "integer"}, "y": {"type": "integer"}},
                "oneOf": [{"required": ["x"]}, {"required": ["y"]}]
            }),
            "point",
        );
        match &node.kind {
            NodeKind::AllOf(subs) => {
                assert_eq!(subs.len(), 2);
                assert_eq!(subs[0].schema_name, "PointBase");
                assert!(subs[0].has_declared_members());
                match &subs[1].kind {
                    NodeKind::OneOf(branches) => assert_eq!(branches[1].schema_name, "PointOneOf1"),
                    other => panic!("Expected OneOf, got {:?}", other),
                }
            }
            other => panic!("Expected AllOf, got {:?}", other),
        }
    }

    #[test]
    fn test_if_then_else_siblings() {
        let (node, _) = build(
            json!({
                "if": {"properties": {"kind": {"const": "a"}}},
                "then": {"required": ["a"]},
                "else": {"not": {"required": ["a"]}}
            }),
            "doc",
        );
        match &node.kind {
            NodeKind::If { condition, then_branch, else_branch } => {
                assert_eq!(condition.schema_name, "DocIf");
                let then_branch = then_branch.as_ref().unwrap();
                assert!(matches!(then_branch.kind, NodeKind::Then(_)));
                assert!(matches!(else_branch.as_ref().unwrap().kind, NodeKind::Else(_)));
            }
            other => panic!("Expected If, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_items_becomes_any() {
        let (node, diags) = build(
            json!({
                "type": "object",
                "properties": {
                    "bad": {"type": "array", "items": 42},
                    "good": {"type": "integer"}
                }
            }),
            "root",
        );
        match &node.kind {
            NodeKind::Object { properties, .. } => {
                assert_eq!(properties["bad"].kind, NodeKind::Any);
                assert_eq!(properties["good"].kind, NodeKind::Integer);
            }
            other => panic!("Expected Object, got {:?}", other),
        }
        assert_eq!(diags.with_code(DiagnosticCode::MalformedSchema).count(), 1);
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_type_union_uses_first_entry() {
        let (node, diags) = build(json!({"type": ["string", "null"], "maxLength": 3}), "nick");
        assert!(matches!(node.kind, NodeKind::String { .. }));
        assert!(node.type_union);
        assert_eq!(diags.with_code(DiagnosticCode::TypeUnion).count(), 1);
    }

    #[test]
    fn test_boolean_schemas() {
        let (node, _) = build(json!({"properties": {"open": true, "closed": false}}), "flags");
        match &node.kind {
            NodeKind::Object { properties, .. } => {
                assert_eq!(properties["open"].kind, NodeKind::Any);
                assert!(matches!(properties["closed"].kind, NodeKind::Not(_)));
            }
            other => panic!("Expected Object, got {:?}", other),
        }
    }

    #[test]
    fn test_sanitized_name_collision_is_suffixed() {
        let (node, diags) = build(
            json!({"properties": {"a-b": {"type": "object", "properties": {}}, "a_b": {"type": "string"}}}),
            "root",
        );
        match &node.kind {
            NodeKind::Object { properties, .. } => {
                assert_eq!(properties["a-b"].schema_name, "RootAB");
                assert_eq!(properties["a_b"].schema_name, "RootAB2");
            }
            other => panic!("Expected Object, got {:?}", other),
        }
        assert_eq!(diags.with_code(DiagnosticCode::NameCollision).count(), 1);
    }

    #[test]
    fn test_depth_limit() {
        let mut raw = json!({"type": "string"});
        for _ in 0..10 {
            raw = json!({"type": "array", "items": raw});
        }
        let mut names = NameRegistry::new();
        let mut diagnostics = Diagnostics::new();
        let node = TreeBuilder::new(&mut names, &mut diagnostics, 4).build(&raw, "deep").unwrap();

        assert!(node.node_count() <= 6);
        assert_eq!(diagnostics.with_code(DiagnosticCode::MalformedSchema).count(), 1);
    }

    #[test]
    fn test_non_schema_top_level_is_error() {
        let mut names = NameRegistry::new();
        let mut diagnostics = Diagnostics::new();
        let err = TreeBuilder::new(&mut names, &mut diagnostics, 8)
            .build(&json!([1, 2]), "list")
            .unwrap_err();
        assert!(matches!(err, GenError::MalformedSchema { .. }));
    }

    #[test]
    fn test_inferred_types() {
        let (node, _) = build(json!({"pattern": "^a"}), "code");
        assert!(matches!(node.kind, NodeKind::String { format: None }));
        assert!(!node.declared_type);

        let (node, _) = build(json!({"required": ["x"]}), "branch");
        assert!(matches!(node.kind, NodeKind::Object { .. }));
    }
}
