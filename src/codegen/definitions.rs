//! Definitions table and schema arena
//!
//! [`DefinitionTable`] indexes the named schemas of an input document
//! (`definitions`, `$defs`, `components.schemas`). Once built, every
//! top-level IR node lives in the [`SchemaArena`], which is also where local
//! `$ref` pointers are resolved to artifact names.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::ir::{RefTarget, SchemaNode};

/// Containers that hold named definitions, as JSON pointer prefixes
const DEFINITION_CONTAINERS: [(&[&str], &str); 3] = [
    (&["definitions"], "#/definitions/"),
    (&["$defs"], "#/$defs/"),
    (&["components", "schemas"], "#/components/schemas/"),
];

/// Keywords that make a document root a schema in its own right
const ROOT_SCHEMA_KEYWORDS: &[&str] = &[
    "type", "properties", "patternProperties", "additionalProperties", "required", "items",
    "$ref", "allOf", "anyOf", "oneOf", "not", "if", "enum", "const", "format", "pattern",
];

/// One named definition of the input document
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    /// Key under its container
    pub key: String,
    /// Local pointer other schemas use to reference it
    pub pointer: String,
    pub raw: Value,
}

/// Named definitions of one document, in container then key order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionTable {
    entries: Vec<Definition>,
}

impl DefinitionTable {
    pub fn from_document(document: &Value) -> Self {
        let mut entries = Vec::new();

        for (path, prefix) in DEFINITION_CONTAINERS {
            let container = path
                .iter()
                .try_fold(document, |value, key| value.get(*key))
                .and_then(Value::as_object);

            if let Some(container) = container {
                let mut keys: Vec<&String> = container.keys().collect();
                keys.sort();
                for key in keys {
                    entries.push(Definition {
                        key: key.clone(),
                        pointer: format!("{}{}", prefix, escape_pointer_segment(key)),
                        raw: container[key.as_str()].clone(),
                    });
                }
            }
        }

        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether the document root describes an instance (beyond holding definitions)
pub fn is_root_schema(document: &Value) -> bool {
    match document {
        Value::Object(map) => ROOT_SCHEMA_KEYWORDS.iter().any(|k| map.contains_key(*k)),
        Value::Bool(_) => true,
        _ => false,
    }
}

/// RFC 6901 escaping for one pointer segment
pub fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

// =============================================================================
// Arena
// =============================================================================

/// Top-level IR nodes of a run, addressable by name and by local pointer
#[derive(Debug, Default)]
pub struct SchemaArena {
    nodes: BTreeMap<String, SchemaNode>,
    pointers: BTreeMap<String, String>,
    /// Names in generation order
    order: Vec<String>,
}

impl SchemaArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level node reachable through `pointers`
    pub fn insert(&mut self, node: SchemaNode, pointers: impl IntoIterator<Item = String>) {
        let name = node.schema_name.clone();
        for pointer in pointers {
            self.pointers.insert(pointer, name.clone());
        }
        self.order.push(name.clone());
        self.nodes.insert(name, node);
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.nodes.get(name)
    }

    /// Artifact name for a reference target
    pub fn resolve<'s>(&'s self, target: &'s RefTarget) -> Option<&'s str> {
        match target {
            RefTarget::Pointer(pointer) => self
                .pointers
                .get(pointer.as_str())
                .or_else(|| self.pointers.get(&percent_decode(pointer)))
                .map(String::as_str),
            RefTarget::Ancestor(name) => Some(name.as_str()),
        }
    }

    /// The top-level node a reference points at, when it is one
    pub fn target(&self, target: &RefTarget) -> Option<&SchemaNode> {
        self.resolve(target).and_then(|name| self.nodes.get(name))
    }

    /// Top-level nodes in generation order
    pub fn iter(&self) -> impl Iterator<Item = &SchemaNode> {
        self.order.iter().filter_map(|name| self.nodes.get(name))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Decode `%XX` escapes in a URI fragment; invalid escapes are kept verbatim
fn percent_decode(pointer: &str) -> String {
    let bytes = pointer.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeKind;
    use serde_json::json;

    #[test]
    fn test_table_collects_all_containers() {
        let doc = json!({
            "definitions": {"b": {"type": "string"}, "a": {"type": "integer"}},
            "$defs": {"c": true},
            "components": {"schemas": {"Pet/Shop": {"type": "object"}}}
        });
        let table = DefinitionTable::from_document(&doc);
        let pointers: Vec<_> = table.iter().map(|d| d.pointer.as_str()).collect();
        assert_eq!(
            pointers,
            vec![
                "#/definitions/a",
                "#/definitions/b",
                "#/$defs/c",
                "#/components/schemas/Pet~1Shop"
            ]
        );
    }

    #[test]
    fn test_root_schema_detection() {
        assert!(is_root_schema(&json!({"type": "object"})));
        assert!(is_root_schema(&json!({"$ref": "#/definitions/a", "definitions": {}})));
        assert!(!is_root_schema(&json!({"openapi": "3.0.0", "components": {}})));
        assert!(!is_root_schema(&json!({"$schema": "x", "definitions": {}})));
    }

    #[test]
    fn test_arena_resolution() {
        let mut arena = SchemaArena::new();
        arena.insert(
            SchemaNode::new("PetShop", NodeKind::Any),
            vec!["#/definitions/Pet Shop".to_string()],
        );
        arena.insert(SchemaNode::new("Root", NodeKind::Any), vec!["#".to_string()]);

        let pointer = |p: &str| RefTarget::Pointer(p.to_string());
        assert_eq!(arena.resolve(&pointer("#/definitions/Pet Shop")), Some("PetShop"));
        assert_eq!(arena.resolve(&pointer("#/definitions/Pet%20Shop")), Some("PetShop"));
        assert_eq!(arena.resolve(&pointer("#")), Some("Root"));
        assert_eq!(arena.resolve(&pointer("#/definitions/Missing")), None);
        assert_eq!(arena.resolve(&RefTarget::Ancestor("Node".into())), Some("Node"));

        let names: Vec<_> = arena.iter().map(|n| n.schema_name.as_str()).collect();
        assert_eq!(names, vec!["PetShop", "Root"]);
    }
}
