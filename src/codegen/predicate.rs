//! Predicate Expressions
//!
//! Validation logic is assembled as an [`Expr`] tree and rendered to KCL
//! text at the very end. Composition helpers call each other by name, so a
//! `oneOf` branch re-runs its sub-schema's full predicate rather than a
//! stand-in constant.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde_json::Value;

use super::formats::FormatSpec;

/// JSON value categories a predicate can test for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JsonType {
    String,
    Integer,
    Number,
    Boolean,
    Null,
    Array,
    Object,
}

impl JsonType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    fn render_check(&self, subject: &str) -> String {
        match self {
            Self::String => format!("typeof({}) == \"str\"", subject),
            // JSON Schema counts `2.0` as an integer
            Self::Integer => format!("typeof({s}) in [\"int\", \"float\"] and int({s}) == {s}", s = subject),
            Self::Number => format!("typeof({}) in [\"int\", \"float\"]", subject),
            Self::Boolean => format!("typeof({}) == \"bool\"", subject),
            Self::Null => format!("{} == None", subject),
            Self::Array => format!("typeof({}) == \"list\"", subject),
            // Schema instances report their schema name, so test by exclusion
            Self::Object => format!(
                "{} != None and typeof({}) not in [\"bool\", \"int\", \"float\", \"str\", \"list\"]",
                subject, subject
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

/// A value or boolean expression in the emitted language
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // === Operands ===
    Var(String),
    /// `base?.key`, or `base?["key"]` for keys that are not identifiers
    Field(Box<Expr>, String),
    /// The current schema instance as a plain dict: `(json key, attribute)` pairs
    SelfDict(Vec<(String, String)>),
    Len(Box<Expr>),
    Literal(Value),

    // === Predicates ===
    Bool(bool),
    IsNone(Box<Expr>),
    TypeIs(Box<Expr>, Vec<JsonType>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    MultipleOf {
        value: Box<Expr>,
        divisor: Value,
        /// Both sides are integers, so exact modulo is safe
        integral: bool,
        epsilon: f64,
    },
    /// Unanchored regex search
    Matches {
        value: Box<Expr>,
        /// Pattern text in the target dialect
        dialect: String,
        /// The same pattern as a string literal
        literal: String,
    },
    Format {
        value: Box<Expr>,
        spec: &'static FormatSpec,
    },
    In(Box<Expr>, Vec<Value>),
    Equals(Box<Expr>, Value),
    Unique(Box<Expr>),
    Call {
        helper: String,
        arg: Box<Expr>,
    },
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    ExactlyOne(Vec<Expr>),
    AllItems {
        list: Box<Expr>,
        var: String,
        body: Box<Expr>,
    },
    AllEntries {
        map: Box<Expr>,
        key: String,
        value: String,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    pub fn field(&self, key: impl Into<String>) -> Self {
        Self::Field(Box::new(self.clone()), key.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn is_none(&self) -> Self {
        Self::IsNone(Box::new(self.clone()))
    }

    pub fn len_of(&self) -> Self {
        Self::Len(Box::new(self.clone()))
    }

    pub fn compare(lhs: Expr, op: CmpOp, rhs: Expr) -> Self {
        Self::Compare(Box::new(lhs), op, Box::new(rhs))
    }

    pub fn call(helper: impl Into<String>, arg: &Expr) -> Self {
        Self::Call {
            helper: helper.into(),
            arg: Box::new(arg.clone()),
        }
    }

    /// Negation, folding constants and double negation
    pub fn not(expr: Expr) -> Self {
        match expr {
            Self::Bool(b) => Self::Bool(!b),
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Conjunction, flattening nested `And` and folding constants
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Self {
        let mut terms = Vec::new();
        for expr in exprs {
            match expr {
                Self::Bool(true) => {}
                Self::Bool(false) => return Self::Bool(false),
                Self::And(inner) => terms.extend(inner),
                other => terms.push(other),
            }
        }
        match terms.len() {
            0 => Self::Bool(true),
            1 => terms.remove(0),
            _ => Self::And(terms),
        }
    }

    /// Disjunction, flattening nested `Or` and folding constants
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Self {
        let mut terms = Vec::new();
        for expr in exprs {
            match expr {
                Self::Bool(false) => {}
                Self::Bool(true) => return Self::Bool(true),
                Self::Or(inner) => terms.extend(inner),
                other => terms.push(other),
            }
        }
        match terms.len() {
            0 => Self::Bool(false),
            1 => terms.remove(0),
            _ => Self::Or(terms),
        }
    }

    /// `subject == None or body`
    pub fn when_present(subject: &Expr, body: Expr) -> Self {
        match body {
            Self::Bool(true) => Self::Bool(true),
            body => Self::or([subject.is_none(), body]),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    /// KCL modules the rendered expression needs
    pub fn imports(&self) -> BTreeSet<&'static str> {
        let mut out = BTreeSet::new();
        self.collect_imports(&mut out);
        out
    }

    fn collect_imports(&self, out: &mut BTreeSet<&'static str>) {
        match self {
            Self::Matches { .. } => {
                out.insert("regex");
            }
            Self::MultipleOf { integral: false, .. } => {
                out.insert("math");
            }
            Self::Unique(_) => {
                out.insert("json");
            }
            Self::Format { spec, .. } => out.extend(spec.imports.iter().copied()),
            _ => {}
        }
        for operand in self.operands() {
            operand.collect_imports(out);
        }
    }

    /// Names of every helper the expression calls
    pub fn calls(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_calls(&mut out);
        out
    }

    fn collect_calls(&self, out: &mut BTreeSet<String>) {
        if let Self::Call { helper, .. } = self {
            out.insert(helper.clone());
        }
        for operand in self.operands() {
            operand.collect_calls(out);
        }
    }

    /// Direct sub-expressions
    fn operands(&self) -> Vec<&Expr> {
        match self {
            Self::Var(_) | Self::SelfDict(_) | Self::Literal(_) | Self::Bool(_) => Vec::new(),
            Self::Field(inner, _)
            | Self::Len(inner)
            | Self::IsNone(inner)
            | Self::TypeIs(inner, _)
            | Self::In(inner, _)
            | Self::Equals(inner, _)
            | Self::Unique(inner)
            | Self::Not(inner) => vec![inner.as_ref()],
            Self::MultipleOf { value, .. } | Self::Matches { value, .. } | Self::Format { value, .. } => {
                vec![value.as_ref()]
            }
            Self::Call { arg, .. } => vec![arg.as_ref()],
            Self::Compare(lhs, _, rhs) => vec![lhs.as_ref(), rhs.as_ref()],
            Self::And(terms) | Self::Or(terms) | Self::ExactlyOne(terms) => terms.iter().collect(),
            Self::AllItems { list, body, .. } => vec![list.as_ref(), body.as_ref()],
            Self::AllEntries { map, body, .. } => vec![map.as_ref(), body.as_ref()],
        }
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Binding strength; lower binds looser
    fn precedence(&self) -> u8 {
        match self {
            Self::Or(_) => 1,
            Self::And(_) | Self::AllItems { .. } | Self::AllEntries { .. } | Self::Format { .. } => 2,
            Self::TypeIs(_, types)
                if types.len() > 1 || types.contains(&JsonType::Object) || types.contains(&JsonType::Integer) =>
            {
                2
            }
            Self::Not(_) => 3,
            Self::IsNone(_)
            | Self::TypeIs(..)
            | Self::Compare(..)
            | Self::MultipleOf { .. }
            | Self::In(..)
            | Self::Equals(..)
            | Self::Unique(_)
            | Self::ExactlyOne(_) => 4,
            Self::Var(_)
            | Self::Field(..)
            | Self::SelfDict(_)
            | Self::Len(_)
            | Self::Literal(_)
            | Self::Bool(_)
            | Self::Matches { .. }
            | Self::Call { .. } => 5,
        }
    }

    fn render_operand(&self, loosest: u8) -> String {
        if self.precedence() <= loosest {
            format!("({})", self.render())
        } else {
            self.render()
        }
    }

    /// KCL source text
    pub fn render(&self) -> String {
        match self {
            Self::Var(name) => name.clone(),
            Self::Field(base, key) => {
                if is_identifier(key) {
                    format!("{}?.{}", base.render(), key)
                } else {
                    format!("{}?[{}]", base.render(), string_literal(key))
                }
            }
            Self::SelfDict(pairs) => {
                let mut entries = String::new();
                for (i, (key, attr)) in pairs.iter().enumerate() {
                    if i > 0 {
                        entries.push_str(", ");
                    }
                    let _ = write!(entries, "{}: {}", string_literal(key), attr);
                }
                format!("{{_k: _v for _k, _v in {{{}}} if _v != None}}", entries)
            }
            Self::Len(inner) => format!("len({})", inner.render()),
            Self::Literal(value) => render_literal(value),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::IsNone(inner) => format!("{} == None", inner.render()),
            Self::TypeIs(inner, types) => {
                let subject = inner.render();
                let checks: Vec<String> = types.iter().map(|t| t.render_check(&subject)).collect();
                match checks.len() {
                    0 => "False".to_string(),
                    1 => checks.into_iter().collect(),
                    _ => checks
                        .iter()
                        .map(|c| format!("({})", c))
                        .collect::<Vec<_>>()
                        .join(" or "),
                }
            }
            Self::Compare(lhs, op, rhs) => format!("{} {} {}", lhs.render(), op.as_str(), rhs.render()),
            Self::MultipleOf {
                value,
                divisor,
                integral,
                epsilon,
            } => {
                let value = value.render();
                let divisor = render_literal(divisor);
                if *integral {
                    format!("{} % {} == 0", value, divisor)
                } else {
                    format!(
                        "abs({v} / {m} - math.floor({v} / {m} + 0.5)) < {e:e}",
                        v = value,
                        m = divisor,
                        e = epsilon
                    )
                }
            }
            Self::Matches { value, literal, .. } => format!("regex.search({}, {})", value.render(), literal),
            Self::Format { value, spec } => spec.predicate(&value.render()),
            Self::In(inner, options) => format!(
                "{} in {}",
                inner.render(),
                render_literal(&Value::Array(options.clone()))
            ),
            Self::Equals(inner, expected) => format!("{} == {}", inner.render(), render_literal(expected)),
            Self::Unique(inner) => {
                let list = inner.render();
                format!(
                    "len({{json.encode(_i, sort_keys=True): None for _i in {l}}}) == len({l})",
                    l = list
                )
            }
            Self::Call { helper, arg } => format!("{}({})", helper, arg.render()),
            Self::Not(inner) => format!("not {}", inner.render_operand(3)),
            Self::And(terms) => terms
                .iter()
                .map(|t| t.render_operand(2))
                .collect::<Vec<_>>()
                .join(" and "),
            Self::Or(terms) => terms
                .iter()
                .map(|t| t.render_operand(2))
                .collect::<Vec<_>>()
                .join(" or "),
            Self::ExactlyOne(terms) => {
                let terms: Vec<String> = terms.iter().map(Expr::render).collect();
                format!("len([_ok for _ok in [{}] if _ok]) == 1", terms.join(", "))
            }
            Self::AllItems { list, var, body } => {
                format!("all {} in {} {{ {} }}", var, list.render(), body.render())
            }
            Self::AllEntries { map, key, value, body } => {
                format!("all {}, {} in {} {{ {} }}", key, value, map.render(), body.render())
            }
        }
    }
}

/// A boolean helper lambda, `name = lambda param: any -> bool { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct Helper {
    pub name: String,
    pub param: String,
    pub body: Expr,
}

impl Helper {
    pub fn imports(&self) -> BTreeSet<&'static str> {
        self.body.imports()
    }
}

/// Render a JSON literal as KCL
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => string_literal(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(render_literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", string_literal(k), render_literal(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

/// Double-quoted KCL string literal
pub fn string_literal(s: &str) -> String {
    // JSON escaping is a subset KCL accepts; `{` needs no escape outside f-strings
    Value::String(s.to_string()).to_string()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !super::config::is_reserved(name)
}

// =============================================================================
// Test evaluator
// =============================================================================

/// Evaluates expressions over JSON instances the way the emitted KCL would,
/// so tests can check generated semantics without a KCL runtime.
#[cfg(test)]
pub(crate) mod eval {
    use std::collections::BTreeMap;

    use serde_json::{Map, Value};

    use super::{CmpOp, Expr, Helper, JsonType};

    pub struct Env<'a> {
        vars: BTreeMap<String, Value>,
        helpers: &'a BTreeMap<String, Helper>,
    }

    impl<'a> Env<'a> {
        pub fn new(helpers: &'a BTreeMap<String, Helper>) -> Self {
            Self {
                vars: BTreeMap::new(),
                helpers,
            }
        }

        pub fn bind(&self, name: &str, value: Value) -> Self {
            let mut vars = self.vars.clone();
            vars.insert(name.to_string(), value);
            Self {
                vars,
                helpers: self.helpers,
            }
        }

        /// Bind every key of an object as a variable, as attributes are in a check block
        pub fn bind_attributes(&self, instance: &Value, attrs: &[(String, String)]) -> Self {
            let mut vars = self.vars.clone();
            for (key, attr) in attrs {
                let value = instance.get(key).cloned().unwrap_or(Value::Null);
                vars.insert(attr.clone(), value);
            }
            Self {
                vars,
                helpers: self.helpers,
            }
        }
    }

    /// Call a helper by name on `instance`
    pub fn call(helpers: &BTreeMap<String, Helper>, name: &str, instance: &Value) -> bool {
        let helper = helpers
            .get(name)
            .unwrap_or_else(|| panic!("no helper named {}", name));
        let env = Env::new(helpers).bind(&helper.param, instance.clone());
        holds(&helper.body, &env)
    }

    pub fn value_of(expr: &Expr, env: &Env<'_>) -> Value {
        match expr {
            Expr::Var(name) => env.vars.get(name).cloned().unwrap_or(Value::Null),
            Expr::Field(base, key) => match value_of(base, env) {
                Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            },
            Expr::SelfDict(pairs) => {
                let mut map = Map::new();
                for (key, attr) in pairs {
                    let value = env.vars.get(attr).cloned().unwrap_or(Value::Null);
                    if !value.is_null() {
                        map.insert(key.clone(), value);
                    }
                }
                Value::Object(map)
            }
            Expr::Len(inner) => match value_of(inner, env) {
                Value::String(s) => Value::from(s.chars().count()),
                Value::Array(items) => Value::from(items.len()),
                Value::Object(map) => Value::from(map.len()),
                _ => Value::Null,
            },
            Expr::Literal(value) => value.clone(),
            other => Value::Bool(holds(other, env)),
        }
    }

    pub fn holds(expr: &Expr, env: &Env<'_>) -> bool {
        match expr {
            Expr::Bool(b) => *b,
            Expr::IsNone(inner) => value_of(inner, env).is_null(),
            Expr::TypeIs(inner, types) => {
                let value = value_of(inner, env);
                types.iter().any(|t| type_matches(*t, &value))
            }
            Expr::Compare(lhs, op, rhs) => compare(&value_of(lhs, env), *op, &value_of(rhs, env)),
            Expr::MultipleOf {
                value,
                divisor,
                integral,
                epsilon,
            } => {
                let value = value_of(value, env);
                if *integral {
                    match (integral_value(&value), divisor.as_i64()) {
                        (Some(v), Some(m)) => v % m == 0,
                        _ => false,
                    }
                } else {
                    match (value.as_f64(), divisor.as_f64()) {
                        (Some(v), Some(m)) => (v / m - (v / m + 0.5).floor()).abs() < *epsilon,
                        _ => false,
                    }
                }
            }
            Expr::Matches { value, dialect, .. } => match value_of(value, env) {
                Value::String(s) => regex::Regex::new(dialect).map(|r| r.is_match(&s)).unwrap_or(false),
                _ => false,
            },
            Expr::Format { .. } => true,
            Expr::In(inner, options) => {
                let value = value_of(inner, env);
                options.iter().any(|o| json_eq(o, &value))
            }
            Expr::Equals(inner, expected) => json_eq(&value_of(inner, env), expected),
            Expr::Unique(inner) => match value_of(inner, env) {
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .all(|(i, a)| items[i + 1..].iter().all(|b| !json_eq(a, b))),
                _ => false,
            },
            Expr::Call { helper, arg } => {
                let helper_def = env
                    .helpers
                    .get(helper)
                    .unwrap_or_else(|| panic!("call to undefined helper {}", helper));
                let inner = Env::new(env.helpers).bind(&helper_def.param, value_of(arg, env));
                holds(&helper_def.body, &inner)
            }
            Expr::Not(inner) => !holds(inner, env),
            Expr::And(terms) => terms.iter().all(|t| holds(t, env)),
            Expr::Or(terms) => terms.iter().any(|t| holds(t, env)),
            Expr::ExactlyOne(terms) => terms.iter().filter(|t| holds(t, env)).count() == 1,
            Expr::AllItems { list, var, body } => match value_of(list, env) {
                Value::Array(items) => items.into_iter().all(|item| holds(body, &env.bind(var, item))),
                _ => true,
            },
            Expr::AllEntries { map, key, value, body } => match value_of(map, env) {
                Value::Object(entries) => entries.into_iter().all(|(k, v)| {
                    let scoped = env.bind(key, Value::String(k)).bind(value, v);
                    holds(body, &scoped)
                }),
                _ => true,
            },
            operand => match value_of(operand, env) {
                Value::Bool(b) => b,
                other => panic!("operand {:?} is not boolean: {}", operand, other),
            },
        }
    }

    fn type_matches(t: JsonType, value: &Value) -> bool {
        match t {
            JsonType::String => value.is_string(),
            JsonType::Integer => value.as_f64().is_some_and(|n| n.fract() == 0.0),
            JsonType::Number => value.is_number(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Null => value.is_null(),
            JsonType::Array => value.is_array(),
            JsonType::Object => value.is_object(),
        }
    }

    /// Integer value of `2` or `2.0`
    fn integral_value(value: &Value) -> Option<i64> {
        value
            .as_i64()
            .or_else(|| value.as_f64().filter(|n| n.fract() == 0.0).map(|n| n as i64))
    }

    fn compare(lhs: &Value, op: CmpOp, rhs: &Value) -> bool {
        match op {
            CmpOp::Eq => json_eq(lhs, rhs),
            CmpOp::Ne => !json_eq(lhs, rhs),
            _ => match (lhs.as_f64(), rhs.as_f64()) {
                (Some(l), Some(r)) => match op {
                    CmpOp::Lt => l < r,
                    CmpOp::Le => l <= r,
                    CmpOp::Gt => l > r,
                    _ => l >= r,
                },
                _ => false,
            },
        }
    }

    fn json_eq(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
            (Value::Array(x), Value::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(p, q)| json_eq(p, q)),
            (Value::Object(x), Value::Object(y)) => {
                x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| json_eq(v, w)))
            }
            _ => a == b,
        }
    }
}
