//! KCL Emitter
//!
//! Renders artifact declarations as KCL source text. Declarations arrive
//! fully resolved (names, attribute types, check expressions), so nothing
//! here looks at the IR or the raw schema.

use serde_json::Value;

use super::config::RenderProfile;
use super::constraints::Check;
use super::predicate::{render_literal, string_literal, Helper};

/// One attribute line of a `schema` block
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub attr: String,
    pub type_text: String,
    pub optional: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
}

/// Extra-key policy of a `schema` block
#[derive(Debug, Clone, PartialEq)]
pub enum IndexSignature {
    /// `[...str]: T`
    Open { value_type: String },
    /// `[key: str]: T`, the key name visible to the check block
    Keyed { key: String, value_type: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDecl {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDecl>,
    /// `None` closes the schema to undeclared attributes
    pub index_signature: Option<IndexSignature>,
    pub checks: Vec<Check>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasDecl {
    pub name: String,
    pub description: Option<String>,
    pub type_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Schema(SchemaDecl),
    Alias(AliasDecl),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Self::Schema(decl) => &decl.name,
            Self::Alias(decl) => &decl.name,
        }
    }

    /// KCL modules the check block needs
    pub fn imports(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if let Self::Schema(decl) = self {
            for check in &decl.checks {
                out.extend(check.expr.imports());
            }
        }
        out
    }
}

/// Artifact body: helpers in definition order, then the declaration.
///
/// Imports are not written here; the file writer adds them once per file.
pub fn emit_artifact(helpers: &[&Helper], decl: &Declaration, profile: &RenderProfile, emit_docs: bool) -> String {
    let mut output = String::new();

    for helper in helpers {
        emit_helper(&mut output, helper, profile);
        output.push('\n');
    }

    match decl {
        Declaration::Schema(schema) => emit_schema(&mut output, schema, profile, emit_docs),
        Declaration::Alias(alias) => emit_alias(&mut output, alias, emit_docs),
    }

    output
}

// =============================================================================
// Helper Emission
// =============================================================================

fn emit_helper(output: &mut String, helper: &Helper, profile: &RenderProfile) {
    output.push_str(&format!(
        "{} = lambda {}: {} -> {} {{\n",
        helper.name, helper.param, profile.types.any, profile.types.boolean
    ));
    output.push_str(&format!("{}{}\n", profile.indent(1), helper.body.render()));
    output.push_str("}\n");
}

// =============================================================================
// Schema Emission
// =============================================================================

fn emit_schema(output: &mut String, decl: &SchemaDecl, profile: &RenderProfile, emit_docs: bool) {
    let indent = profile.indent(1);
    output.push_str(&format!("schema {}:\n", decl.name));

    let body_empty = decl.fields.is_empty() && decl.index_signature.is_none() && decl.checks.is_empty();
    if emit_docs || body_empty {
        emit_schema_doc(output, decl, &indent, emit_docs);
    }

    let mut members = Vec::new();
    for field in &decl.fields {
        members.push(field_line(field));
    }
    match &decl.index_signature {
        Some(IndexSignature::Open { value_type }) => members.push(format!("[...{}]: {}", profile.types.string, value_type)),
        Some(IndexSignature::Keyed { key, value_type }) => {
            members.push(format!("[{}: {}]: {}", key, profile.types.string, value_type))
        }
        None => {}
    }
    for member in &members {
        output.push_str(&format!("{}{}\n", indent, member));
    }

    if !decl.checks.is_empty() {
        if !members.is_empty() {
            output.push('\n');
        }
        output.push_str(&format!("{}check:\n", indent));
        let nested = profile.indent(2);
        for check in &decl.checks {
            output.push_str(&format!(
                "{}{}, {}\n",
                nested,
                check.expr.render(),
                string_literal(&check.message)
            ));
        }
    }
}

fn field_line(field: &FieldDecl) -> String {
    let mut line = field.attr.clone();
    if field.optional {
        line.push('?');
    }
    line.push_str(&format!(": {}", field.type_text));
    if let Some(default) = &field.default {
        line.push_str(&format!(" = {}", render_literal(default)));
    }
    line
}

/// Docstring in the numpy layout KCL's doc tooling reads
fn emit_schema_doc(output: &mut String, decl: &SchemaDecl, indent: &str, with_attributes: bool) {
    output.push_str(&format!("{}\"\"\"\n", indent));
    let summary = decl.description.as_deref().unwrap_or(&decl.name);
    for line in summary.lines() {
        push_doc_line(output, indent, line);
    }

    if with_attributes && !decl.fields.is_empty() {
        output.push('\n');
        push_doc_line(output, indent, "Attributes");
        push_doc_line(output, indent, "----------");
        for field in &decl.fields {
            let requirement = if field.optional { "optional" } else { "required" };
            let mut header = format!("{} : {}, {}", field.attr, field.type_text, requirement);
            if let Some(default) = &field.default {
                header.push_str(&format!(", default is {}", render_literal(default)));
            }
            push_doc_line(output, indent, &header);
            if let Some(description) = &field.description {
                for line in description.lines() {
                    push_doc_line(output, indent, &format!("    {}", line));
                }
            }
        }
    }

    output.push_str(&format!("{}\"\"\"\n\n", indent));
}

fn push_doc_line(output: &mut String, indent: &str, line: &str) {
    let line = escape_doc(line);
    let line = line.trim_end();
    if line.is_empty() {
        output.push('\n');
    } else {
        output.push_str(&format!("{}{}\n", indent, line));
    }
}

fn escape_doc(text: &str) -> String {
    text.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"")
}

// =============================================================================
// Alias Emission
// =============================================================================

fn emit_alias(output: &mut String, decl: &AliasDecl, emit_docs: bool) {
    if emit_docs {
        if let Some(description) = &decl.description {
            for line in description.lines() {
                let line = line.trim_end();
                if line.is_empty() {
                    output.push_str("#\n");
                } else {
                    output.push_str(&format!("# {}\n", line));
                }
            }
        }
    }
    output.push_str(&format!("type {} = {}\n", decl.name, decl.type_text));
}
