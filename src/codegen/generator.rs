//! Artifact Generator
//!
//! Walks one top-level IR tree bottom-up and turns every node that earns a
//! name into a declaration for the emitter. Helpers are shared across the
//! run; an artifact carries the helpers first defined while building it.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::composition::{branch_property_names, flatten_all_of, is_object_like};
use super::config::RenderProfile;
use super::constraints::{Check, PredicateBuilder, HELPER_PARAM};
use super::definitions::SchemaArena;
use super::formats::{self, FormatSpec};
use super::kcl::{self, AliasDecl, Declaration, FieldDecl, IndexSignature, SchemaDecl};
use super::names::{helper_name, sanitize_property};
use super::predicate::{Expr, Helper, JsonType};
use super::types::{resolve, TypeExpr, TypeScope};
use super::{ArtifactLinks, GeneratedArtifact, GenerationContext};
use crate::error::{GenError, Result};
use crate::ir::{AdditionalProperties, DiagnosticCode, DiagnosticItem, NodeKind, RefTarget, SchemaNode};

/// How a node is written out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactForm {
    /// `schema Name:` with attributes and a check block
    Schema,
    /// `type Name = T`
    Alias,
}

/// Whether `node` becomes an artifact of its own, and in which form.
///
/// Depends only on the node and the arena, never on what was generated before.
pub fn classify(node: &SchemaNode, arena: &SchemaArena, top_level: bool) -> Option<ArtifactForm> {
    if top_level {
        return Some(match node.kind {
            NodeKind::Reference { .. } => ArtifactForm::Alias,
            _ if is_object_like(node, arena) => ArtifactForm::Schema,
            _ => ArtifactForm::Alias,
        });
    }

    match &node.kind {
        NodeKind::Object { .. } if node.has_declared_members() || node.title.is_some() => Some(ArtifactForm::Schema),
        NodeKind::AllOf(_) if is_object_like(node, arena) => Some(ArtifactForm::Schema),
        _ => None,
    }
}

/// [`TypeScope`] over the arena and the format validators claimed so far
struct ArtifactScope<'s> {
    arena: &'s SchemaArena,
    formats: &'s BTreeMap<String, String>,
}

impl TypeScope for ArtifactScope<'_> {
    fn reference_name(&self, target: &RefTarget) -> Option<String> {
        self.arena.resolve(target).map(str::to_string)
    }

    fn is_artifact(&self, node: &SchemaNode) -> bool {
        classify(node, self.arena, false).is_some()
    }

    fn format_artifact(&self, format: &str) -> Option<String> {
        self.formats.get(format).cloned()
    }
}

pub struct Generator<'a> {
    arena: &'a SchemaArena,
    ctx: &'a mut GenerationContext,
}

impl<'a> Generator<'a> {
    pub fn new(arena: &'a SchemaArena, ctx: &'a mut GenerationContext) -> Self {
        Self { arena, ctx }
    }

    /// Generate every artifact of one top-level tree, children first
    pub fn generate(&mut self, root: &SchemaNode) -> Result<()> {
        self.visit(root, true)
    }

    fn visit(&mut self, node: &SchemaNode, top_level: bool) -> Result<()> {
        for child in node.children() {
            self.visit(child, false)?;
        }

        if let NodeKind::String { format: Some(format) } = &node.kind {
            self.ensure_format(node, format);
        }

        if let Some(form) = classify(node, self.arena, top_level) {
            self.emit(node, form)?;
        }
        Ok(())
    }

    // =========================================================================
    // Format validators
    // =========================================================================

    fn ensure_format(&mut self, node: &SchemaNode, format: &str) {
        match formats::lookup(format) {
            None => self.ctx.diagnostics.push(
                DiagnosticItem::new(
                    &node.schema_name,
                    DiagnosticCode::UnknownFormat,
                    format!("Unknown format '{}', validated as a plain string", format),
                )
                .with_context(format!("format: {}", format)),
            ),
            Some(spec) if self.ctx.formats.contains_key(spec.name) => {}
            Some(spec) => self.emit_format(spec),
        }
    }

    fn emit_format(&mut self, spec: &'static FormatSpec) {
        let claimed = self.ctx.names.claim(spec.artifact_name);
        if claimed.disambiguated {
            self.ctx.diagnostics.name_collision(spec.artifact_name, &claimed.name);
        }
        let name = claimed.name;
        self.ctx.formats.insert(spec.name.to_string(), name.clone());

        let helper = self.ctx.helpers.reserve(&name);
        if helper.disambiguated {
            self.ctx.diagnostics.name_collision(&helper_name(&name), &helper.name);
        }

        let mark = self.ctx.helpers.mark();
        let subject = Expr::var(HELPER_PARAM);
        self.ctx.helpers.insert(Helper {
            name: helper.name,
            param: HELPER_PARAM.to_string(),
            body: Expr::or([
                Expr::not(Expr::TypeIs(Box::new(subject.clone()), vec![JsonType::String])),
                Expr::Format {
                    value: Box::new(subject),
                    spec,
                },
            ]),
        });

        let decl = Declaration::Alias(AliasDecl {
            name: name.clone(),
            description: Some(spec.description.to_string()),
            type_text: self.ctx.profile.types.string.clone(),
        });
        self.finish(name, mark, decl);
    }

    // =========================================================================
    // Schema and alias artifacts
    // =========================================================================

    fn emit(&mut self, node: &SchemaNode, form: ArtifactForm) -> Result<()> {
        if self.ctx.artifacts.contains(&node.schema_name) {
            return Ok(());
        }

        let mark = self.ctx.helpers.mark();
        match self.declaration(node, form) {
            Ok(decl) => {
                self.finish(node.schema_name.clone(), mark, decl);
                Ok(())
            }
            Err(GenError::UnresolvedReference { schema, target }) => {
                // Drop the half-built helpers; the rest of the run goes on
                self.ctx.helpers.truncate(mark);
                self.ctx.diagnostics.unresolved_ref(schema, &target);
                tracing::debug!(artifact = %node.schema_name, "Skipped artifact with unresolved reference");
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    fn finish(&mut self, name: String, mark: usize, decl: Declaration) {
        let helpers = self.ctx.helpers.since(mark);

        let mut required_imports: BTreeSet<String> =
            helpers.iter().flat_map(|h| h.imports()).map(str::to_string).collect();
        required_imports.extend(decl.imports().into_iter().map(str::to_string));

        let defines: Vec<String> = helpers.iter().map(|h| h.name.clone()).collect();
        let mut calls: BTreeSet<String> = helpers.iter().flat_map(|h| h.body.calls()).collect();
        if let Declaration::Schema(schema) = &decl {
            calls.extend(schema.checks.iter().flat_map(|check| check.expr.calls()));
        }
        calls.retain(|helper| !defines.contains(helper));

        let content = kcl::emit_artifact(&helpers, &decl, &self.ctx.profile, self.ctx.emit_docs);
        tracing::debug!(artifact = %name, helpers = helpers.len(), "Generated artifact");

        self.ctx.links.insert(name.clone(), ArtifactLinks { defines, calls });

        self.ctx.artifacts.insert(GeneratedArtifact {
            name,
            content,
            required_imports,
        });
    }

    fn declaration(&mut self, node: &SchemaNode, form: ArtifactForm) -> Result<Declaration> {
        let arena = self.arena;
        let ctx = &mut *self.ctx;
        let scope = ArtifactScope {
            arena,
            formats: &ctx.formats,
        };
        let profile = &ctx.profile;
        let mut predicates = PredicateBuilder::new(arena, &mut ctx.helpers, &mut ctx.diagnostics, &ctx.formats, profile);

        predicates.ensure_helper(node)?;

        let decl = match form {
            ArtifactForm::Alias => Declaration::Alias(AliasDecl {
                name: node.schema_name.clone(),
                description: describe(node),
                type_text: resolve(node, &scope)?.render(profile),
            }),
            ArtifactForm::Schema => {
                let mut builder = SchemaBuilder {
                    arena,
                    scope: &scope,
                    predicates: &mut predicates,
                    profile,
                    fields: Vec::new(),
                    pairs: Vec::new(),
                    checks: Vec::new(),
                };
                Declaration::Schema(builder.build(node)?)
            }
        };
        Ok(decl)
    }
}

// =============================================================================
// Schema form
// =============================================================================

/// Accumulates the attributes and check lines of one `schema` block
struct SchemaBuilder<'b, 'p> {
    arena: &'b SchemaArena,
    scope: &'b ArtifactScope<'b>,
    predicates: &'b mut PredicateBuilder<'p>,
    profile: &'b RenderProfile,
    fields: Vec<FieldDecl>,
    /// `(json key, attribute)` for every declared attribute
    pairs: Vec<(String, String)>,
    checks: Vec<Check>,
}

impl SchemaBuilder<'_, '_> {
    fn build(&mut self, node: &SchemaNode) -> Result<SchemaDecl> {
        let index_signature = match &node.kind {
            NodeKind::Object {
                properties,
                pattern_properties,
                required,
                additional,
            } => {
                for (key, child) in properties {
                    self.property(key, Some(child), required.contains(key))?;
                }
                for key in required.iter().filter(|k| !properties.contains_key(*k)) {
                    self.property(key, None, true)?;
                }

                let whole = self.self_dict();
                self.checks
                    .extend(self.predicates.keyword_checks(node, &whole, &node.schema_name));
                self.index_signature(node, pattern_properties, additional)?
            }
            NodeKind::AllOf(_) => {
                let flat = flatten_all_of(node, self.arena);
                for (key, field) in &flat.fields {
                    self.property(key, field.node, field.required)?;
                }

                let whole = self.self_dict();
                for sub in &flat.residual {
                    let call = self.predicates.branch_call(sub, &whole)?;
                    self.checks.push(Check::new(
                        call,
                        format!("{} must satisfy {}", node.schema_name, sub.schema_name),
                    ));
                }
                Some(self.open_signature())
            }
            _ => {
                for key in branch_property_names(node, self.arena) {
                    self.property(&key, None, false)?;
                }

                let whole = self.self_dict();
                let expr = self.predicates.node_predicate(node, &whole)?;
                if !expr.is_true() {
                    self.checks.push(Check::new(
                        expr,
                        format!("{} must satisfy its {} composition", node.schema_name, node.kind.name()),
                    ));
                }
                Some(self.open_signature())
            }
        };

        Ok(SchemaDecl {
            name: node.schema_name.clone(),
            description: describe(node),
            fields: std::mem::take(&mut self.fields),
            index_signature,
            checks: std::mem::take(&mut self.checks),
        })
    }

    /// One attribute; `child` is `None` for names known only from `required`
    /// or from composition branches
    fn property(&mut self, key: &str, child: Option<&SchemaNode>, required: bool) -> Result<()> {
        let attr = self.unique_attr(key);
        let optional = !required;

        let (type_expr, default, description) = match child {
            Some(child) => {
                let type_expr = resolve(child, self.scope)?;
                let named = matches!(type_expr, TypeExpr::Named(_));
                let checks = self
                    .predicates
                    .field_checks(child, &Expr::var(attr.clone()), key, optional, named)?;
                self.checks.extend(checks);
                (type_expr, child.default.clone(), describe(child))
            }
            None => (TypeExpr::Any, None, None),
        };

        self.pairs.push((key.to_string(), attr.clone()));
        self.fields.push(FieldDecl {
            attr,
            type_text: type_expr.render(self.profile),
            optional,
            default,
            description,
        });
        Ok(())
    }

    /// Sanitized attribute name, suffixed when two keys sanitize alike
    fn unique_attr(&self, key: &str) -> String {
        let base = sanitize_property(key);
        let taken = |name: &str| self.fields.iter().any(|f| f.attr == name);
        if !taken(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or(base)
    }

    fn self_dict(&self) -> Expr {
        Expr::SelfDict(self.pairs.clone())
    }

    fn open_signature(&self) -> IndexSignature {
        IndexSignature::Open {
            value_type: self.profile.types.any.clone(),
        }
    }

    fn index_signature(
        &mut self,
        node: &SchemaNode,
        pattern_properties: &BTreeMap<String, SchemaNode>,
        additional: &AdditionalProperties,
    ) -> Result<Option<IndexSignature>> {
        let signature = match additional {
            AdditionalProperties::Forbidden if pattern_properties.is_empty() => None,
            AdditionalProperties::Forbidden => {
                let key = self.key_name();
                let key_expr = Expr::var(key.clone());

                let mut allowed = Vec::new();
                if !self.pairs.is_empty() {
                    let declared = self.pairs.iter().map(|(k, _)| Value::String(k.clone())).collect();
                    allowed.push(Expr::In(Box::new(key_expr.clone()), declared));
                }
                for pattern in pattern_properties.keys() {
                    allowed.push(self.predicates.pattern_match(&node.schema_name, &key_expr, pattern));
                }
                self.checks.push(Check::new(
                    Expr::or(allowed),
                    format!("{} allows only declared or pattern-matching keys", node.schema_name),
                ));

                Some(IndexSignature::Keyed {
                    key,
                    value_type: self.profile.types.any.clone(),
                })
            }
            AdditionalProperties::Schema(child) if pattern_properties.is_empty() => {
                let value_type = resolve(child, self.scope)?.render(self.profile);
                // Declared attributes must fit the index signature's value type
                if self.fields.iter().all(|f| f.type_text == value_type) {
                    Some(IndexSignature::Open { value_type })
                } else {
                    Some(self.open_signature())
                }
            }
            _ => Some(self.open_signature()),
        };
        Ok(signature)
    }

    /// Index signature key name that does not shadow an attribute
    fn key_name(&self) -> String {
        let mut key = "key".to_string();
        while self.fields.iter().any(|f| f.attr == key) {
            key.push('_');
        }
        key
    }
}

fn describe(node: &SchemaNode) -> Option<String> {
    node.description.clone().or_else(|| node.title.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::predicate::eval;
    use crate::ir::TreeBuilder;
    use serde_json::json;

    fn arena_of(defs: &[(&str, Value)], ctx: &mut GenerationContext) -> SchemaArena {
        let mut arena = SchemaArena::new();
        for (name, raw) in defs {
            let node = TreeBuilder::new(&mut ctx.names, &mut ctx.diagnostics, 32)
                .build(raw, name)
                .unwrap();
            arena.insert(node, vec![format!("#/definitions/{}", name)]);
        }
        arena
    }

    fn generate(defs: &[(&str, Value)]) -> GenerationContext {
        let mut ctx = GenerationContext::default();
        let arena = arena_of(defs, &mut ctx);
        for node in arena.iter() {
            Generator::new(&arena, &mut ctx).generate(node).unwrap();
        }
        ctx
    }

    fn content<'c>(ctx: &'c GenerationContext, name: &str) -> &'c str {
        &ctx.artifacts.get(name).unwrap().content
    }

    #[test]
    fn test_classification_is_order_free() {
        let mut ctx = GenerationContext::default();
        let arena = arena_of(
            &[
                (
                    "Owner",
                    json!({"type": "object", "properties": {
                        "address": {"type": "object", "properties": {"city": {"type": "string"}}},
                        "extra": {"type": "object"},
                        "tags": {"type": "array", "items": {"type": "string"}}
                    }}),
                ),
                ("Tags", json!({"type": "array"})),
            ],
            &mut ctx,
        );
        let owner = arena.get("Owner").unwrap();
        assert_eq!(classify(owner, &arena, true), Some(ArtifactForm::Schema));
        assert_eq!(classify(arena.get("Tags").unwrap(), &arena, true), Some(ArtifactForm::Alias));

        let children = owner.children();
        let forms: Vec<_> = children.iter().map(|c| classify(c, &arena, false)).collect();
        assert_eq!(forms, vec![Some(ArtifactForm::Schema), None, None]);
    }

    #[test]
    fn test_object_schema_form() {
        let ctx = generate(&[(
            "Pet",
            json!({
                "type": "object",
                "description": "A pet.",
                "required": ["name", "id"],
                "properties": {
                    "name": {"type": "string", "minLength": 1},
                    "tag": {"type": "string", "default": "none"},
                    "type": {"type": "string", "enum": ["cat", "dog"]}
                }
            }),
        )]);
        let text = content(&ctx, "Pet");
        assert!(text.contains("is_valid_pet = lambda v: any -> bool {"));
        assert!(text.contains("schema Pet:"));
        assert!(text.contains("    name: str\n"));
        assert!(text.contains("    tag?: str = \"none\"\n"));
        assert!(text.contains("    type_?: str\n"));
        assert!(text.contains("    id: any\n"));
        assert!(text.contains("    [...str]: any\n"));
        assert!(text.contains("len(name) >= 1, \"name must be at least 1 characters long\""));
        assert!(text.contains("type_ == None or type_ in [\"cat\", \"dog\"]"));
    }

    #[test]
    fn test_closed_schema_and_keyed_signature() {
        let ctx = generate(&[
            (
                "Closed",
                json!({"type": "object", "additionalProperties": false, "properties": {"a": {"type": "integer"}}}),
            ),
            (
                "Labels",
                json!({
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {"key": {"type": "string"}},
                    "patternProperties": {"^x-": {"type": "string"}}
                }),
            ),
        ]);
        assert!(!content(&ctx, "Closed").contains("[...str]"));

        let labels = content(&ctx, "Labels");
        assert!(labels.contains("    [key_: str]: any\n"));
        assert!(labels.contains("key_ in [\"key\"] or regex.search(key_, r\"^x-\")"));
        assert!(ctx.artifacts.get("Labels").unwrap().required_imports.contains("regex"));
    }

    #[test]
    fn test_nested_object_becomes_schema() {
        let ctx = generate(&[(
            "Owner",
            json!({"type": "object", "properties": {
                "address": {"type": "object", "properties": {"city": {"type": "string"}}}
            }}),
        )]);
        assert!(content(&ctx, "Owner").contains("    address?: OwnerAddress\n"));
        assert!(content(&ctx, "OwnerAddress").contains("    city?: str\n"));
        assert_eq!(ctx.artifacts.names(), vec!["OwnerAddress", "Owner"]);
    }

    #[test]
    fn test_check_block_agrees_with_helper() {
        let mut ctx = GenerationContext::default();
        let arena = arena_of(
            &[(
                "Pet",
                json!({
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string", "minLength": 1},
                        "type": {"type": "string", "enum": ["cat", "dog"]}
                    }
                }),
            )],
            &mut ctx,
        );
        let node = arena.get("Pet").unwrap();
        let decl = Generator::new(&arena, &mut ctx)
            .declaration(node, ArtifactForm::Schema)
            .unwrap();
        let Declaration::Schema(schema) = decl else {
            panic!("Expected a schema declaration");
        };

        let helpers = ctx.helpers.clone().into_map();
        let attrs = vec![
            ("name".to_string(), "name".to_string()),
            ("type".to_string(), "type_".to_string()),
        ];
        for instance in [
            json!({"name": "Rex", "type": "cat"}),
            json!({"name": "Rex"}),
            json!({"name": "", "type": "cat"}),
            json!({"name": "Rex", "type": "cow"}),
        ] {
            let env = eval::Env::new(&helpers).bind_attributes(&instance, &attrs);
            let checks_hold = schema.checks.iter().all(|check| eval::holds(&check.expr, &env));
            assert_eq!(checks_hold, eval::call(&helpers, "is_valid_pet", &instance), "{}", instance);
        }
    }

    #[test]
    fn test_alias_form() {
        let ctx = generate(&[("Tags", json!({"type": "array", "items": {"type": "string"}, "minItems": 1}))]);
        let text = content(&ctx, "Tags");
        assert!(text.contains("type Tags = [str]"));
        assert!(text.contains("is_valid_tags = lambda v: any -> bool {"));
    }

    #[test]
    fn test_format_validator_generated_once() {
        let ctx = generate(&[
            ("A", json!({"type": "object", "properties": {"mail": {"type": "string", "format": "email"}}})),
            ("B", json!({"type": "string", "format": "email"})),
        ]);
        let validator = content(&ctx, "EmailValidator");
        assert!(validator.contains("type EmailValidator = str"));
        assert!(content(&ctx, "A").contains("    mail?: EmailValidator\n"));
        assert!(content(&ctx, "A").contains("is_valid_email_validator(mail)"));
        assert!(content(&ctx, "B").contains("type B = EmailValidator"));
        assert_eq!(ctx.artifacts.names().iter().filter(|n| n.ends_with("Validator")).count(), 1);
    }

    #[test]
    fn test_unknown_format_is_info() {
        let ctx = generate(&[("Code", json!({"type": "string", "format": "x-code"}))]);
        assert_eq!(ctx.diagnostics.with_code(DiagnosticCode::UnknownFormat).count(), 1);
        assert!(content(&ctx, "Code").contains("type Code = str"));
    }

    #[test]
    fn test_all_of_flattens_into_one_schema() {
        let ctx = generate(&[
            (
                "Base",
                json!({"type": "object", "required": ["id"], "properties": {"id": {"type": "integer"}}}),
            ),
            (
                "Pet",
                json!({"allOf": [
                    {"$ref": "#/definitions/Base"},
                    {"type": "object", "properties": {"name": {"type": "string"}}, "minProperties": 1}
                ]}),
            ),
        ]);
        let text = content(&ctx, "Pet");
        assert!(text.contains("    id: int\n"));
        assert!(text.contains("    name?: str\n"));
        assert!(text.contains("is_valid_pet_all_of_1({_k: _v for _k, _v in {\"id\": id, \"name\": name} if _v != None})"));
    }

    #[test]
    fn test_one_of_schema_form() {
        let ctx = generate(&[
            ("Cat", json!({"type": "object", "required": ["meow"], "properties": {"meow": {"type": "boolean"}}})),
            ("Dog", json!({"type": "object", "required": ["bark"], "properties": {"bark": {"type": "boolean"}}})),
            ("Pet", json!({"oneOf": [{"$ref": "#/definitions/Cat"}, {"$ref": "#/definitions/Dog"}]})),
        ]);
        let text = content(&ctx, "Pet");
        assert!(text.contains("    bark?: any\n"));
        assert!(text.contains("    meow?: any\n"));
        assert!(text.contains("is_valid_cat("));
        assert!(text.contains("must satisfy its oneOf composition"));
    }

    #[test]
    fn test_unresolved_reference_skips_artifact() {
        let ctx = generate(&[
            ("Owner", json!({"type": "object", "properties": {"pet": {"$ref": "#/definitions/Missing"}}})),
            ("Ok", json!({"type": "string"})),
        ]);
        assert!(ctx.artifacts.get("Owner").is_none());
        assert!(ctx.artifacts.get("Ok").is_some());
        assert!(ctx.diagnostics.has_errors());
        assert!(!ctx.helpers.contains("is_valid_owner"));
    }
}
