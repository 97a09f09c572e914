//! Code Generation
//!
//! Compiles one schema document into KCL artifacts.
//!
//! Architecture:
//! - `ir::TreeBuilder` turns the root schema and every named definition into
//!   an IR tree; the trees live in a [`SchemaArena`] keyed by name and pointer.
//! - [`generator::Generator`] walks each tree bottom-up, classifies nodes and
//!   builds declarations; predicates are `predicate::Expr` trees.
//! - [`kcl`] renders declarations as text. Emitters never read raw schema JSON.
//!
//! Everything a run accumulates lives in one [`GenerationContext`].

pub mod composition;
pub mod config;
pub mod constraints;
pub mod definitions;
pub mod formats;
pub mod generator;
pub mod kcl;
pub mod names;
pub mod predicate;
pub mod regex;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::checksum::Checksum;
use crate::error::{GenError, Result};
use crate::ir::{Diagnostics, TreeBuilder};

use self::config::RenderProfile;
use self::constraints::HelperRegistry;
use self::definitions::{is_root_schema, DefinitionTable, SchemaArena};
use self::generator::Generator;
use self::names::NameRegistry;

/// Default bound on schema nesting
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default name for the document root schema
pub const DEFAULT_ROOT_NAME: &str = "Schema";

// =============================================================================
// Artifacts
// =============================================================================

/// One generated schema, alias or format validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub name: String,
    /// Helpers and declaration, without imports
    pub content: String,
    /// KCL modules the content needs (`regex`, `math`, `json`, `net`)
    pub required_imports: BTreeSet<String>,
}

impl GeneratedArtifact {
    pub fn checksum(&self) -> Checksum {
        Checksum::from_str(&self.content)
    }
}

/// Artifacts of one run, unique by name, in generation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    artifacts: Vec<GeneratedArtifact>,
    index: BTreeMap<String, usize>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact; returns false and keeps the first when the name exists
    pub fn insert(&mut self, artifact: GeneratedArtifact) -> bool {
        if self.index.contains_key(&artifact.name) {
            return false;
        }
        self.index.insert(artifact.name.clone(), self.artifacts.len());
        self.artifacts.push(artifact);
        true
    }

    pub fn get(&self, name: &str) -> Option<&GeneratedArtifact> {
        self.index.get(name).map(|&i| &self.artifacts[i])
    }

    pub fn remove(&mut self, name: &str) -> Option<GeneratedArtifact> {
        let position = self.index.remove(name)?;
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(self.artifacts.remove(position))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneratedArtifact> {
        self.artifacts.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl IntoIterator for ArtifactSet {
    type Item = GeneratedArtifact;
    type IntoIter = std::vec::IntoIter<GeneratedArtifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.into_iter()
    }
}

// =============================================================================
// Generated Output
// =============================================================================

/// Output from one generation run
#[derive(Debug, Clone)]
pub struct GeneratedOutput {
    pub artifacts: ArtifactSet,
    /// Everything reported while building and generating
    pub diagnostics: Diagnostics,
    /// Every helper defined in the run, for evaluating generated predicates
    pub(crate) helpers: HelperRegistry,
}

impl GeneratedOutput {
    /// The artifacts, or the diagnostics when any error was reported
    pub fn into_result(self) -> Result<ArtifactSet> {
        if self.diagnostics.has_errors() {
            Err(GenError::Generation(self.diagnostics))
        } else {
            Ok(self.artifacts)
        }
    }
}

// =============================================================================
// Generation Context
// =============================================================================

/// Options for one run
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    /// Name of the artifact for the document root
    pub root_name: String,
    pub max_depth: usize,
    /// Write docstrings and alias comments
    pub emit_docs: bool,
    pub profile: RenderProfile,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            root_name: DEFAULT_ROOT_NAME.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            emit_docs: true,
            profile: RenderProfile::kcl(),
        }
    }
}

/// Helpers an artifact brings and the ones it calls from elsewhere
#[derive(Debug, Clone, Default)]
struct ArtifactLinks {
    defines: Vec<String>,
    calls: BTreeSet<String>,
}

/// Per-run state, passed explicitly through building and generation
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub names: NameRegistry,
    pub diagnostics: Diagnostics,
    pub artifacts: ArtifactSet,
    pub helpers: HelperRegistry,
    /// Format name → validator artifact name
    pub formats: BTreeMap<String, String>,
    pub profile: RenderProfile,
    pub emit_docs: bool,
    links: BTreeMap<String, ArtifactLinks>,
}

impl GenerationContext {
    pub fn new(options: &GenerateOptions) -> Self {
        Self {
            names: NameRegistry::new(),
            diagnostics: Diagnostics::new(),
            artifacts: ArtifactSet::new(),
            helpers: HelperRegistry::new(),
            formats: BTreeMap::new(),
            profile: options.profile.clone(),
            emit_docs: options.emit_docs,
            links: BTreeMap::new(),
        }
    }

    /// Drop every artifact that calls a helper no longer defined.
    ///
    /// A dropped artifact takes its helpers with it, so this repeats until
    /// nothing else depends on a dropped artifact.
    fn prune_dangling(&mut self) {
        loop {
            let dangling: Vec<(String, String)> = self
                .artifacts
                .iter()
                .filter_map(|artifact| {
                    let links = self.links.get(&artifact.name)?;
                    let missing = links.calls.iter().find(|helper| !self.helpers.contains(helper))?;
                    Some((artifact.name.clone(), missing.clone()))
                })
                .collect();
            if dangling.is_empty() {
                return;
            }

            for (name, missing) in dangling {
                let dependency = self.helpers.owner_of(&missing).unwrap_or(missing.as_str()).to_string();
                self.artifacts.remove(&name);
                if let Some(links) = self.links.remove(&name) {
                    self.helpers.remove(&links.defines);
                }
                self.diagnostics.dependency_failed(&name, &dependency);
                tracing::debug!(artifact = %name, dependency = %dependency, "Dropped artifact with failed dependency");
            }
        }
    }

    /// Reserve a top-level name, reporting a collision
    fn claim(&mut self, requested: &str) -> String {
        let claimed = self.names.claim(requested);
        if claimed.disambiguated {
            self.diagnostics.name_collision(requested, &claimed.name);
        }
        claimed.name
    }

    fn into_output(self) -> GeneratedOutput {
        GeneratedOutput {
            artifacts: self.artifacts,
            diagnostics: self.diagnostics,
            helpers: self.helpers,
        }
    }
}

impl Default for GenerationContext {
    fn default() -> Self {
        Self::new(&GenerateOptions::default())
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Compile a schema document: named definitions first, then the root.
///
/// Unresolved references and other errors are collected in the returned
/// diagnostics; only input that holds no schema at all fails outright.
pub fn generate_document(document: &Value, options: &GenerateOptions) -> Result<GeneratedOutput> {
    let mut ctx = GenerationContext::new(options);
    let table = DefinitionTable::from_document(document);
    let root_is_schema = is_root_schema(document);

    if !root_is_schema && table.is_empty() {
        return Err(GenError::MalformedSchema {
            schema: options.root_name.clone(),
            reason: "document holds neither a schema nor named definitions".to_string(),
        });
    }

    // Top-level names are claimed before any nested name
    let root_name = root_is_schema.then(|| ctx.claim(&options.root_name));
    let definition_names: Vec<String> = table.iter().map(|def| ctx.claim(&def.key)).collect();

    let mut arena = SchemaArena::new();
    for (def, name) in table.iter().zip(definition_names) {
        let built = TreeBuilder::new(&mut ctx.names, &mut ctx.diagnostics, options.max_depth).build_claimed(&def.raw, name);
        match built {
            Ok(node) => arena.insert(node, [def.pointer.clone()]),
            Err(GenError::MalformedSchema { schema, reason }) => {
                ctx.diagnostics.malformed(schema, &def.pointer, reason);
            }
            Err(other) => return Err(other),
        }
    }
    if let Some(name) = root_name {
        let node = TreeBuilder::new(&mut ctx.names, &mut ctx.diagnostics, options.max_depth).build_claimed(document, name)?;
        arena.insert(node, ["#".to_string()]);
    }
    tracing::debug!(definitions = table.len(), trees = arena.len(), "Built schema trees");

    for node in arena.iter() {
        Generator::new(&arena, &mut ctx).generate(node)?;
    }
    ctx.prune_dangling();

    tracing::info!(
        artifacts = ctx.artifacts.len(),
        helpers = ctx.helpers.len(),
        errors = ctx.diagnostics.error_count(),
        warnings = ctx.diagnostics.warning_count(),
        "Generated KCL artifacts"
    );

    Ok(ctx.into_output())
}

#[cfg(test)]
mod tests {
    use super::predicate::eval;
    use super::*;
    use crate::ir::DiagnosticCode;
    use serde_json::json;

    fn run(document: Value) -> GeneratedOutput {
        generate_document(&document, &GenerateOptions::default()).unwrap()
    }

    fn accepts(output: &GeneratedOutput, helper: &str, instance: Value) -> bool {
        eval::call(&output.helpers.clone().into_map(), helper, &instance)
    }

    #[test]
    fn test_self_reference_yields_one_artifact() {
        let output = run(json!({
            "definitions": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "value": {"type": "integer"},
                        "next": {"$ref": "#/definitions/Node"}
                    }
                }
            }
        }));
        assert_eq!(output.artifacts.names(), vec!["Node"]);
        let node = output.artifacts.get("Node").unwrap();
        assert!(node.content.contains("    next?: Node\n"));

        assert!(accepts(&output, "is_valid_node", json!({"value": 1, "next": {"value": 2}})));
        assert!(!accepts(&output, "is_valid_node", json!({"value": 1, "next": {"value": "two"}})));
    }

    #[test]
    fn test_root_self_reference() {
        let output = run(json!({
            "type": "object",
            "properties": {"children": {"type": "array", "items": {"$ref": "#"}}}
        }));
        assert_eq!(output.artifacts.names(), vec!["Schema"]);
        assert!(output.artifacts.get("Schema").unwrap().content.contains("    children?: [Schema]\n"));
        assert!(accepts(&output, "is_valid_schema", json!({"children": [{"children": []}]})));
        assert!(!accepts(&output, "is_valid_schema", json!({"children": [5]})));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let document = json!({
            "components": {"schemas": {
                "Pet": {"type": "object", "required": ["name"], "properties": {
                    "name": {"type": "string", "pattern": "^\\w+$"},
                    "kind": {"oneOf": [{"const": "cat"}, {"const": "dog"}]},
                    "owner": {"type": "object", "properties": {"email": {"type": "string", "format": "email"}}}
                }},
                "Shelter": {"type": "object", "properties": {"pets": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}}}}
            }}
        });
        let first = run(document.clone());
        let second = run(document);
        assert_eq!(first.artifacts, second.artifacts);
        assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn test_one_of_is_exclusive() {
        let output = run(json!({
            "oneOf": [
                {"type": "object", "required": ["a"]},
                {"type": "object", "required": ["b"]}
            ]
        }));
        assert!(accepts(&output, "is_valid_schema", json!({"a": 1})));
        assert!(accepts(&output, "is_valid_schema", json!({"b": 1})));
        assert!(!accepts(&output, "is_valid_schema", json!({"a": 1, "b": 1})));
        assert!(!accepts(&output, "is_valid_schema", json!({})));
    }

    #[test]
    fn test_definitions_claim_names_before_nested_schemas() {
        let output = run(json!({
            "definitions": {
                "Pet": {"type": "object", "properties": {"tag": {"type": "object", "properties": {"x": {"type": "string"}}}}},
                "PetTag": {"type": "string"}
            }
        }));
        assert!(output.artifacts.get("PetTag").unwrap().content.contains("type PetTag = str"));
        assert!(output.artifacts.contains("PetTag2"));
        assert_eq!(output.diagnostics.with_code(DiagnosticCode::NameCollision).count(), 1);
    }

    #[test]
    fn test_unresolved_reference_fails_the_run() {
        let output = run(json!({
            "definitions": {
                "Owner": {"type": "object", "properties": {"pet": {"$ref": "#/definitions/Pet"}}},
                "Tag": {"type": "string"}
            }
        }));
        assert!(output.artifacts.contains("Tag"));
        assert!(!output.artifacts.contains("Owner"));
        match output.into_result() {
            Err(GenError::Generation(diagnostics)) => assert_eq!(diagnostics.error_count(), 1),
            other => panic!("Expected Generation error, got {:?}", other),
        }
    }

    #[test]
    fn test_dependents_of_failed_artifacts_are_dropped() {
        let output = run(json!({
            "definitions": {
                "Adopter": {"type": "object", "properties": {"owner": {"$ref": "#/definitions/Owner"}}},
                "Owner": {"type": "object", "properties": {"pet": {"$ref": "#/definitions/Missing"}}},
                "Shelter": {"type": "object", "properties": {"owner": {"$ref": "#/definitions/Owner"}}},
                "Tag": {"type": "string"}
            }
        }));
        assert_eq!(output.artifacts.names(), vec!["Tag"]);
        assert_eq!(output.diagnostics.error_count(), 3);
        for dependent in ["Adopter", "Shelter"] {
            let item = output.diagnostics.errors().find(|item| item.schema == dependent).unwrap();
            assert!(item.message.contains("'Owner'"));
        }
        assert!(!output.helpers.contains("is_valid_adopter"));
        assert!(!output.helpers.contains("is_valid_shelter"));
    }

    #[test]
    fn test_helper_names_stay_distinct() {
        let output = run(json!({
            "definitions": {
                "HTTPServer": {"type": "string", "minLength": 5},
                "HttpServer": {"type": "integer"},
                "Ref": {"type": "object", "properties": {"port": {"$ref": "#/definitions/HttpServer"}}}
            }
        }));
        assert!(output.artifacts.get("HTTPServer").unwrap().content.contains("is_valid_http_server = lambda"));
        assert!(output.artifacts.get("HttpServer").unwrap().content.contains("is_valid_http_server_2 = lambda"));
        assert!(accepts(&output, "is_valid_ref", json!({"port": 8080})));
        assert!(!accepts(&output, "is_valid_ref", json!({"port": "web01"})));
        assert_eq!(output.diagnostics.with_code(DiagnosticCode::NameCollision).count(), 1);
    }

    #[test]
    fn test_mixed_one_of_is_alias() {
        let output = run(json!({
            "definitions": {
                "Cat": {"type": "object", "properties": {"meow": {"type": "boolean"}}},
                "Owner": {"type": "object", "properties": {"pet": {"$ref": "#/definitions/Pet"}}},
                "Pet": {"oneOf": [{"$ref": "#/definitions/Cat"}, {"type": "string"}]}
            }
        }));
        let pet = &output.artifacts.get("Pet").unwrap().content;
        assert!(pet.contains("type Pet = any\n"));
        assert!(!pet.contains("schema Pet"));
        assert!(pet.contains("is_valid_pet = lambda v: any -> bool {"));
        assert!(output.artifacts.get("Owner").unwrap().content.contains("    pet?: Pet\n"));

        assert!(accepts(&output, "is_valid_owner", json!({"pet": "tabby"})));
        assert!(accepts(&output, "is_valid_owner", json!({"pet": {"meow": true}})));
        assert!(!accepts(&output, "is_valid_owner", json!({"pet": 3})));
    }

    #[test]
    fn test_non_schema_documents_are_rejected() {
        let options = GenerateOptions::default();
        assert!(matches!(
            generate_document(&json!(42), &options),
            Err(GenError::MalformedSchema { .. })
        ));
        assert!(matches!(
            generate_document(&json!({"openapi": "3.0.0", "info": {}}), &options),
            Err(GenError::MalformedSchema { .. })
        ));
    }

    #[test]
    fn test_malformed_definition_is_skipped() {
        let output = run(json!({"definitions": {"Bad": 5, "Good": {"type": "integer"}}}));
        assert!(output.artifacts.contains("Good"));
        assert!(!output.artifacts.contains("Bad"));
        assert_eq!(output.diagnostics.with_code(DiagnosticCode::MalformedSchema).count(), 1);
    }

    #[test]
    fn test_artifact_imports() {
        let output = run(json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "pattern": "^[A-Z]{3}$"},
                "ratio": {"type": "number", "multipleOf": 0.25},
                "tags": {"type": "array", "uniqueItems": true}
            }
        }));
        let imports: Vec<_> = output.artifacts.get("Schema").unwrap().required_imports.iter().cloned().collect();
        assert_eq!(imports, vec!["json", "math", "regex"]);
    }

    #[test]
    fn test_predicates_agree_with_jsonschema() {
        let schema = json!({
            "type": "object",
            "required": ["id"],
            "additionalProperties": false,
            "properties": {
                "id": {"type": "integer", "minimum": 1},
                "name": {"type": "string", "minLength": 2, "pattern": "^[a-z]+$"},
                "tags": {"type": "array", "items": {"type": "string"}, "uniqueItems": true, "maxItems": 3},
                "score": {"type": "number", "multipleOf": 0.5, "exclusiveMaximum": 10},
                "kind": {"enum": ["a", "b"]}
            }
        });
        let output = run(schema.clone());
        let reference = jsonschema::JSONSchema::compile(&schema).unwrap();

        let instances = [
            json!({"id": 1}),
            json!({}),
            json!({"id": 0}),
            json!({"id": "1"}),
            json!({"id": 1, "name": "ab"}),
            json!({"id": 1, "name": "a"}),
            json!({"id": 1, "name": "AB"}),
            json!({"id": 1, "tags": ["x", "y"]}),
            json!({"id": 1, "tags": ["x", "x"]}),
            json!({"id": 1, "tags": ["x", "y", "z", "w"]}),
            json!({"id": 1, "tags": [1]}),
            json!({"id": 1, "score": 2.5}),
            json!({"id": 1, "score": 3}),
            json!({"id": 1, "score": 2.3}),
            json!({"id": 1, "score": 10}),
            json!({"id": 1, "kind": "b"}),
            json!({"id": 1, "kind": "c"}),
            json!({"id": 1, "extra": true}),
            json!([1]),
            json!("id"),
        ];
        for instance in instances {
            assert_eq!(
                accepts(&output, "is_valid_schema", instance.clone()),
                reference.is_valid(&instance),
                "disagreement on {}",
                instance
            );
        }
    }
}
