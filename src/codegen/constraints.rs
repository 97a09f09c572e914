//! Constraint → predicate translation
//!
//! [`PredicateBuilder`] turns IR nodes into [`Expr`] trees at two depths:
//!
//! - `node_predicate`: the full predicate a value must satisfy, used as the
//!   body of `is_valid_<name>` helpers. Composition branches get a helper of
//!   their own and are called by name.
//! - `field_checks`: the per-keyword lines of a schema `check:` block. Types
//!   are already enforced by the attribute annotation there, so only the
//!   keyword constraints (and anything the annotation cannot express) remain.

use std::collections::BTreeMap;

use serde_json::Value;

use super::config::RenderProfile;
use super::definitions::SchemaArena;
use super::names::{helper_name, ClaimedName};
use super::predicate::{CmpOp, Expr, Helper, JsonType};
use super::regex::translate_pattern;
use crate::error::{GenError, Result};
use crate::ir::{AdditionalProperties, DiagnosticCode, DiagnosticItem, Diagnostics, Keyword, NodeKind, SchemaNode};

/// Parameter name of every helper lambda
pub const HELPER_PARAM: &str = "v";

/// One `check:` line
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub expr: Expr,
    pub message: String,
}

impl Check {
    pub fn new(expr: Expr, message: impl Into<String>) -> Self {
        Self {
            expr,
            message: message.into(),
        }
    }
}

// =============================================================================
// Helper registry
// =============================================================================

/// Every helper lambda defined in a run, in definition order.
///
/// Helper names are global: a helper is defined once, by the first artifact
/// that needs it, and every later artifact calls it by name. Each schema
/// name is bound to its helper name on first use, so two schemas whose
/// names snake-case alike still get distinct helpers.
#[derive(Debug, Clone, Default)]
pub struct HelperRegistry {
    helpers: BTreeMap<String, Helper>,
    order: Vec<String>,
    /// Schema name → helper name
    reserved: BTreeMap<String, String>,
    /// Helper name → schema name
    owners: BTreeMap<String, String>,
}

impl HelperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Helper name for `schema`, reserving `is_valid_<snake>` (then `_2`, `_3`, ...) on first use
    pub fn reserve(&mut self, schema: &str) -> ClaimedName {
        if let Some(name) = self.reserved.get(schema) {
            return ClaimedName {
                name: name.clone(),
                disambiguated: false,
            };
        }

        let base = helper_name(schema);
        let mut name = base.clone();
        let mut counter = 2usize;
        while self.owners.contains_key(&name) {
            name = format!("{}_{}", base, counter);
            counter += 1;
        }

        self.reserved.insert(schema.to_string(), name.clone());
        self.owners.insert(name.clone(), schema.to_string());
        ClaimedName {
            disambiguated: name != base,
            name,
        }
    }

    /// The helper reserved for `schema`, when it is also defined
    pub fn defined_for(&self, schema: &str) -> Option<&str> {
        self.reserved
            .get(schema)
            .filter(|name| self.helpers.contains_key(name.as_str()))
            .map(String::as_str)
    }

    /// Schema a helper name was reserved for
    pub fn owner_of(&self, helper: &str) -> Option<&str> {
        self.owners.get(helper).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Helper> {
        self.helpers.get(name)
    }

    pub fn insert(&mut self, helper: Helper) {
        if !self.helpers.contains_key(&helper.name) {
            self.order.push(helper.name.clone());
            self.helpers.insert(helper.name.clone(), helper);
        }
    }

    /// Number of helpers defined so far; a mark for [`Self::since`] and [`Self::truncate`]
    pub fn mark(&self) -> usize {
        self.order.len()
    }

    /// Helpers defined after `mark`, in definition order
    pub fn since(&self, mark: usize) -> Vec<&Helper> {
        self.order[mark.min(self.order.len())..]
            .iter()
            .filter_map(|name| self.helpers.get(name))
            .collect()
    }

    /// Forget helpers defined after `mark`
    pub fn truncate(&mut self, mark: usize) {
        for name in self.order.drain(mark.min(self.order.len())..) {
            self.helpers.remove(&name);
        }
    }

    /// Forget the named helpers
    pub fn remove(&mut self, names: &[String]) {
        self.order.retain(|name| !names.contains(name));
        for name in names {
            self.helpers.remove(name);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, Helper> {
        self.helpers
    }
}

// =============================================================================
// Predicate builder
// =============================================================================

pub struct PredicateBuilder<'a> {
    arena: &'a SchemaArena,
    helpers: &'a mut HelperRegistry,
    diagnostics: &'a mut Diagnostics,
    /// Format name → validator artifact name
    formats: &'a BTreeMap<String, String>,
    profile: &'a RenderProfile,
    /// Nesting of quantifiers, for unique loop variable names
    loop_depth: usize,
}

impl<'a> PredicateBuilder<'a> {
    pub fn new(
        arena: &'a SchemaArena,
        helpers: &'a mut HelperRegistry,
        diagnostics: &'a mut Diagnostics,
        formats: &'a BTreeMap<String, String>,
        profile: &'a RenderProfile,
    ) -> Self {
        Self {
            arena,
            helpers,
            diagnostics,
            formats,
            profile,
            loop_depth: 0,
        }
    }

    /// Define `is_valid_<name>` for `node` unless it already exists.
    ///
    /// Children that need helpers of their own are defined first.
    pub fn ensure_helper(&mut self, node: &SchemaNode) -> Result<String> {
        let name = self.helper_for(&node.schema_name);
        if self.helpers.contains(&name) {
            return Ok(name);
        }

        let saved_depth = std::mem::replace(&mut self.loop_depth, 0);
        let body = self.node_predicate(node, &Expr::var(HELPER_PARAM));
        self.loop_depth = saved_depth;

        self.helpers.insert(Helper {
            name: name.clone(),
            param: HELPER_PARAM.to_string(),
            body: body?,
        });
        Ok(name)
    }

    /// Reserved helper name for `schema`, reporting a snake-case collision once
    pub fn helper_for(&mut self, schema: &str) -> String {
        let claimed = self.helpers.reserve(schema);
        if claimed.disambiguated {
            self.diagnostics.name_collision(&helper_name(schema), &claimed.name);
        }
        claimed.name
    }

    /// Full predicate for `subject` against `node`
    pub fn node_predicate(&mut self, node: &SchemaNode, subject: &Expr) -> Result<Expr> {
        let expr = match &node.kind {
            NodeKind::Reference { target } => {
                let arena = self.arena;
                let target_name = arena.resolve(target).ok_or_else(|| GenError::UnresolvedReference {
                    schema: node.schema_name.clone(),
                    target: target.to_string(),
                })?;
                Expr::call(self.helper_for(target_name), subject)
            }
            NodeKind::AllOf(subs) => {
                let mut terms = Vec::with_capacity(subs.len());
                for sub in subs {
                    terms.push(self.child_predicate(sub, subject)?);
                }
                Expr::and(terms)
            }
            NodeKind::AnyOf(subs) => Expr::or(self.branch_calls(subs, subject)?),
            NodeKind::OneOf(subs) => {
                let mut calls = self.branch_calls(subs, subject)?;
                if calls.len() == 1 {
                    calls.remove(0)
                } else {
                    Expr::ExactlyOne(calls)
                }
            }
            NodeKind::Not(sub) => {
                let call = self.branch_call(sub, subject)?;
                Expr::not(call)
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.branch_call(condition, subject)?;
                let mut terms = Vec::new();
                if let Some(then_branch) = then_branch {
                    let then_call = self.branch_call(unwrap_branch(then_branch), subject)?;
                    terms.push(Expr::or([Expr::not(condition.clone()), then_call]));
                }
                if let Some(else_branch) = else_branch {
                    let else_call = self.branch_call(unwrap_branch(else_branch), subject)?;
                    terms.push(Expr::or([condition, else_call]));
                }
                Expr::and(terms)
            }
            NodeKind::Then(inner) | NodeKind::Else(inner) => self.child_predicate(inner, subject)?,
            NodeKind::Any => Expr::Bool(true),
            NodeKind::Object { .. }
            | NodeKind::Array { .. }
            | NodeKind::String { .. }
            | NodeKind::Number
            | NodeKind::Integer
            | NodeKind::Boolean
            | NodeKind::Null => self.typed_predicate(node, subject)?,
        };
        Ok(expr)
    }

    /// Predicate for a nested node: a call when it already has a helper, else inline
    pub fn child_predicate(&mut self, node: &SchemaNode, subject: &Expr) -> Result<Expr> {
        if let Some(name) = self.helpers.defined_for(&node.schema_name) {
            return Ok(Expr::call(name, subject));
        }
        self.node_predicate(node, subject)
    }

    pub fn branch_call(&mut self, node: &SchemaNode, subject: &Expr) -> Result<Expr> {
        // A bare reference already names a helper
        if let NodeKind::Reference { .. } = node.kind {
            return self.node_predicate(node, subject);
        }
        let helper = self.ensure_helper(node)?;
        Ok(Expr::call(helper, subject))
    }

    fn branch_calls(&mut self, subs: &[SchemaNode], subject: &Expr) -> Result<Vec<Expr>> {
        subs.iter().map(|sub| self.branch_call(sub, subject)).collect()
    }

    fn typed_predicate(&mut self, node: &SchemaNode, subject: &Expr) -> Result<Expr> {
        let primary = primary_type(&node.kind);

        let mut typed_terms: Vec<Expr> = self
            .keyword_checks(node, subject, &node.schema_name)
            .into_iter()
            .filter(|check| !is_value_keyword_check(check))
            .map(|check| check.expr)
            .collect();
        typed_terms.extend(self.structure_terms(node, subject)?);
        let typed_body = Expr::and(typed_terms);

        let value_terms = self.value_checks(node, subject, &node.schema_name);

        let type_union = declared_types(node);
        let shaped = if let Some(types) = type_union {
            // `type: [..]` accepts any listed type; keywords bind only the first
            let mut allowed: Vec<JsonType> = types.iter().copied().filter(|t| *t != JsonType::Null).collect();
            allowed.dedup();
            let mut accepts = Vec::new();
            if !allowed.is_empty() {
                accepts.push(Expr::TypeIs(Box::new(subject.clone()), allowed));
            }
            if types.contains(&JsonType::Null) {
                accepts.push(subject.is_none());
            }
            Expr::and([
                Expr::or(accepts),
                guard(subject, primary, typed_body),
            ])
        } else if node.declared_type {
            let type_check = match primary {
                JsonType::Null => subject.is_none(),
                other => Expr::TypeIs(Box::new(subject.clone()), vec![other]),
            };
            Expr::and([type_check, typed_body])
        } else {
            guard(subject, primary, typed_body)
        };

        Ok(Expr::and([shaped, Expr::and(value_terms.into_iter().map(|c| c.expr))]))
    }

    /// Items, properties and the dynamic key pass
    fn structure_terms(&mut self, node: &SchemaNode, subject: &Expr) -> Result<Vec<Expr>> {
        let mut terms = Vec::new();
        match &node.kind {
            NodeKind::Array { items: Some(items) } => {
                let var = format!("item{}", self.loop_depth);
                self.loop_depth += 1;
                let body = self.child_predicate(items, &Expr::var(var.clone()));
                self.loop_depth -= 1;
                let body = body?;
                if !body.is_true() {
                    terms.push(Expr::AllItems {
                        list: Box::new(subject.clone()),
                        var,
                        body: Box::new(body),
                    });
                }
            }
            NodeKind::Object {
                properties,
                pattern_properties,
                required,
                additional,
            } => {
                for name in required {
                    terms.push(Expr::not(subject.field(name.clone()).is_none()));
                }
                for (name, child) in properties {
                    let field = subject.field(name.clone());
                    let check = self.child_predicate(child, &field)?;
                    terms.push(Expr::when_present(&field, check));
                }
                if !pattern_properties.is_empty() || !matches!(additional, AdditionalProperties::Allowed) {
                    let declared: Vec<&String> = properties.keys().collect();
                    terms.push(self.entries_pass(node, subject, &declared, pattern_properties, additional)?);
                }
            }
            _ => {}
        }
        Ok(terms)
    }

    /// `all key, val in subject { ... }` over pattern and additional properties
    fn entries_pass(
        &mut self,
        node: &SchemaNode,
        subject: &Expr,
        declared: &[&String],
        pattern_properties: &BTreeMap<String, SchemaNode>,
        additional: &AdditionalProperties,
    ) -> Result<Expr> {
        let key = format!("key{}", self.loop_depth);
        let val = format!("val{}", self.loop_depth);
        self.loop_depth += 1;
        let body = self.entries_body(node, &key, &val, declared, pattern_properties, additional);
        self.loop_depth -= 1;

        Ok(Expr::AllEntries {
            map: Box::new(subject.clone()),
            key,
            value: val,
            body: Box::new(body?),
        })
    }

    fn entries_body(
        &mut self,
        node: &SchemaNode,
        key: &str,
        val: &str,
        declared: &[&String],
        pattern_properties: &BTreeMap<String, SchemaNode>,
        additional: &AdditionalProperties,
    ) -> Result<Expr> {
        let key_expr = Expr::var(key);
        let val_expr = Expr::var(val);
        let mut terms = Vec::new();

        let mut matchers = Vec::new();
        for (pattern, child) in pattern_properties {
            let matches = self.pattern_match(&node.schema_name, &key_expr, pattern);
            let check = self.child_predicate(child, &val_expr)?;
            if !check.is_true() {
                terms.push(Expr::or([Expr::not(matches.clone()), check]));
            }
            matchers.push(matches);
        }

        let extra = match additional {
            AdditionalProperties::Allowed => None,
            AdditionalProperties::Forbidden => Some(Expr::Bool(false)),
            AdditionalProperties::Schema(child) => Some(self.child_predicate(child, &val_expr)?),
        };

        if let Some(extra) = extra {
            let mut known = Vec::new();
            if !declared.is_empty() {
                let names = declared.iter().map(|n| Value::String((*n).clone())).collect();
                known.push(Expr::In(Box::new(key_expr.clone()), names));
            }
            known.extend(matchers);
            known.push(extra);
            terms.push(Expr::or(known));
        }

        Ok(Expr::and(terms))
    }

    pub fn pattern_match(&mut self, schema: &str, subject: &Expr, pattern: &str) -> Expr {
        let translated = translate_pattern(pattern);
        for warning in &translated.warnings {
            self.diagnostics.push(
                DiagnosticItem::new(schema, DiagnosticCode::UnsupportedRegexConstruct, warning.clone())
                    .with_context(format!("pattern: {}", pattern)),
            );
        }
        Expr::Matches {
            value: Box::new(subject.clone()),
            dialect: translated.dialect,
            literal: translated.literal,
        }
    }

    // =========================================================================
    // Keyword checks
    // =========================================================================

    /// One check per constraint keyword present on `node`
    pub fn keyword_checks(&mut self, node: &SchemaNode, subject: &Expr, label: &str) -> Vec<Check> {
        let mut checks = Vec::new();
        let get = |keyword: Keyword| node.constraint(keyword);

        match &node.kind {
            NodeKind::String { format } => {
                if let Some(n) = get(Keyword::MinLength) {
                    checks.push(Check::new(
                        Expr::compare(subject.len_of(), CmpOp::Ge, Expr::Literal(n.clone())),
                        format!("{} must be at least {} characters long", label, n),
                    ));
                }
                if let Some(n) = get(Keyword::MaxLength) {
                    checks.push(Check::new(
                        Expr::compare(subject.len_of(), CmpOp::Le, Expr::Literal(n.clone())),
                        format!("{} must be at most {} characters long", label, n),
                    ));
                }
                if let Some(pattern) = get(Keyword::Pattern).and_then(Value::as_str) {
                    let matches = self.pattern_match(&node.schema_name, subject, pattern);
                    checks.push(Check::new(matches, format!("{} must match pattern {}", label, pattern)));
                }
                let formats = self.formats;
                if let Some((format, artifact)) = format.as_deref().and_then(|f| formats.get_key_value(f)) {
                    checks.push(Check::new(
                        Expr::call(self.helper_for(artifact), subject),
                        format!("{} must be a valid {}", label, format),
                    ));
                }
            }
            NodeKind::Number | NodeKind::Integer => {
                checks.extend(self.range_checks(node, subject, label));
                if let Some(divisor) = get(Keyword::MultipleOf) {
                    let integral = matches!(node.kind, NodeKind::Integer) && divisor.is_u64();
                    checks.push(Check::new(
                        Expr::MultipleOf {
                            value: Box::new(subject.clone()),
                            divisor: divisor.clone(),
                            integral,
                            epsilon: self.profile.float_epsilon,
                        },
                        format!("{} must be a multiple of {}", label, divisor),
                    ));
                }
            }
            NodeKind::Array { .. } => {
                if let Some(n) = get(Keyword::MinItems) {
                    checks.push(Check::new(
                        Expr::compare(subject.len_of(), CmpOp::Ge, Expr::Literal(n.clone())),
                        format!("{} must have at least {} items", label, n),
                    ));
                }
                if let Some(n) = get(Keyword::MaxItems) {
                    checks.push(Check::new(
                        Expr::compare(subject.len_of(), CmpOp::Le, Expr::Literal(n.clone())),
                        format!("{} must have at most {} items", label, n),
                    ));
                }
                if get(Keyword::UniqueItems) == Some(&Value::Bool(true)) {
                    checks.push(Check::new(
                        Expr::Unique(Box::new(subject.clone())),
                        format!("{} items must be unique", label),
                    ));
                }
            }
            NodeKind::Object { .. } => {
                if let Some(n) = get(Keyword::MinProperties) {
                    checks.push(Check::new(
                        Expr::compare(subject.len_of(), CmpOp::Ge, Expr::Literal(n.clone())),
                        format!("{} must have at least {} properties", label, n),
                    ));
                }
                if let Some(n) = get(Keyword::MaxProperties) {
                    checks.push(Check::new(
                        Expr::compare(subject.len_of(), CmpOp::Le, Expr::Literal(n.clone())),
                        format!("{} must have at most {} properties", label, n),
                    ));
                }
            }
            _ => {}
        }

        checks.extend(self.value_checks(node, subject, label));
        checks
    }

    /// `enum` and `const`, which apply whatever the value's type
    fn value_checks(&self, node: &SchemaNode, subject: &Expr, label: &str) -> Vec<Check> {
        let mut checks = Vec::new();
        if let Some(Value::Array(options)) = node.constraint(Keyword::Enum) {
            checks.push(Check::new(
                Expr::In(Box::new(subject.clone()), options.clone()),
                format!("{} must be one of {}", label, Value::Array(options.clone())),
            ));
        }
        if let Some(expected) = node.constraint(Keyword::Const) {
            checks.push(Check::new(
                Expr::Equals(Box::new(subject.clone()), expected.clone()),
                format!("{} must equal {}", label, expected),
            ));
        }
        checks
    }

    fn range_checks(&self, node: &SchemaNode, subject: &Expr, label: &str) -> Vec<Check> {
        let mut checks = Vec::new();
        let bound = |op: CmpOp, value: &Value, word: &str| {
            Check::new(
                Expr::compare(subject.clone(), op, Expr::Literal(value.clone())),
                format!("{} must be {} {}", label, word, value),
            )
        };

        let exclusive_min = node.constraint(Keyword::ExclusiveMinimum);
        let exclusive_max = node.constraint(Keyword::ExclusiveMaximum);

        if let Some(min) = node.constraint(Keyword::Minimum) {
            if exclusive_min == Some(&Value::Bool(true)) {
                checks.push(bound(CmpOp::Gt, min, "greater than"));
            } else {
                checks.push(bound(CmpOp::Ge, min, "at least"));
            }
        }
        if let Some(max) = node.constraint(Keyword::Maximum) {
            if exclusive_max == Some(&Value::Bool(true)) {
                checks.push(bound(CmpOp::Lt, max, "less than"));
            } else {
                checks.push(bound(CmpOp::Le, max, "at most"));
            }
        }
        if let Some(min) = exclusive_min.filter(|v| v.is_number()) {
            checks.push(bound(CmpOp::Gt, min, "greater than"));
        }
        if let Some(max) = exclusive_max.filter(|v| v.is_number()) {
            checks.push(bound(CmpOp::Lt, max, "less than"));
        }
        checks
    }

    // =========================================================================
    // Check-block lines for attributes
    // =========================================================================

    /// Lines checking attribute `attr` against its property schema.
    ///
    /// `named` is set when the attribute is typed as a generated schema,
    /// which validates itself on instantiation.
    pub fn field_checks(
        &mut self,
        child: &SchemaNode,
        attr: &Expr,
        label: &str,
        optional: bool,
        named: bool,
    ) -> Result<Vec<Check>> {
        let guard_optional = |expr: Expr| if optional { Expr::when_present(attr, expr) } else { expr };

        let shallow = !child.type_union
            && child.declared_type
            && matches!(
                child.kind,
                NodeKind::String { .. } | NodeKind::Number | NodeKind::Integer | NodeKind::Boolean | NodeKind::Null
            );

        if shallow {
            return Ok(self
                .keyword_checks(child, attr, label)
                .into_iter()
                .map(|check| Check::new(guard_optional(check.expr), check.message))
                .collect());
        }

        if named && matches!(child.kind, NodeKind::Object { .. } | NodeKind::AllOf(_)) {
            return Ok(Vec::new());
        }

        let expr = self.child_predicate(child, attr)?;
        if expr.is_true() {
            return Ok(Vec::new());
        }
        Ok(vec![Check::new(
            guard_optional(expr),
            format!("{} must satisfy {}", label, child.schema_name),
        )])
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn primary_type(kind: &NodeKind) -> JsonType {
    match kind {
        NodeKind::String { .. } => JsonType::String,
        NodeKind::Number => JsonType::Number,
        NodeKind::Integer => JsonType::Integer,
        NodeKind::Boolean => JsonType::Boolean,
        NodeKind::Null => JsonType::Null,
        NodeKind::Array { .. } => JsonType::Array,
        _ => JsonType::Object,
    }
}

/// Types listed in a `type` array, when the node had one
fn declared_types(node: &SchemaNode) -> Option<Vec<JsonType>> {
    if !node.type_union {
        return None;
    }
    node.raw.get("type").and_then(Value::as_array).map(|types| {
        types
            .iter()
            .filter_map(Value::as_str)
            .filter_map(JsonType::from_name)
            .collect()
    })
}

/// `body` applies only when `subject` has the `primary` type
fn guard(subject: &Expr, primary: JsonType, body: Expr) -> Expr {
    if body.is_true() {
        return body;
    }
    let is_type = match primary {
        JsonType::Null => subject.is_none(),
        other => Expr::TypeIs(Box::new(subject.clone()), vec![other]),
    };
    Expr::or([Expr::not(is_type), body])
}

fn is_value_keyword_check(check: &Check) -> bool {
    matches!(check.expr, Expr::In(..) | Expr::Equals(..))
}

/// The single child of a `Then`/`Else` wrapper
fn unwrap_branch(node: &SchemaNode) -> &SchemaNode {
    match &node.kind {
        NodeKind::Then(inner) | NodeKind::Else(inner) => inner,
        _ => node,
    }
}
