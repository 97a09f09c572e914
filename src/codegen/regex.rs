//! Regex Dialect Translator
//!
//! JSON Schema patterns are ECMA-262 regular expressions. KCL's `regex`
//! module follows the RE2 family: no lookaround, no backreferences, Go-style
//! named groups and `\x{...}` code points. [`translate_pattern`] rewrites
//! what has an equivalent and flags what does not. It never fails; the worst
//! case is a weaker pattern plus warnings.

use std::fmt::Write as _;

/// Result of translating one pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedPattern {
    /// The pattern in the target dialect (unescaped)
    pub dialect: String,
    /// The pattern as a KCL string literal, ready to splice into a predicate
    pub literal: String,
    /// Lossy rewrites and untranslatable constructs
    pub warnings: Vec<String>,
}

impl TranslatedPattern {
    pub fn is_lossless(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Translate `pattern` and return it as an embeddable KCL string literal.
pub fn translate(pattern: &str) -> String {
    translate_pattern(pattern).literal
}

/// Translate `pattern`, keeping the dialect text and any warnings.
pub fn translate_pattern(pattern: &str) -> TranslatedPattern {
    let mut scanner = Scanner::new(pattern);
    scanner.run();

    let Scanner {
        out: dialect,
        mut warnings,
        ..
    } = scanner;

    if let Err(e) = regex::Regex::new(&dialect) {
        warnings.push(format!("translated pattern does not compile: {}", e));
    }

    let literal = embed_literal(&dialect);
    TranslatedPattern {
        dialect,
        literal,
        warnings,
    }
}

/// Quote a pattern as a KCL string literal.
///
/// Raw strings (`r"..."`) are used whenever the pattern allows it so the
/// backslashes stay readable.
pub fn embed_literal(pattern: &str) -> String {
    let raw_safe = !pattern.contains('"')
        && !pattern.contains('\n')
        && !pattern.contains('\r')
        && !ends_with_odd_backslashes(pattern);
    if raw_safe {
        return format!("r\"{}\"", pattern);
    }

    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('"');
    for c in pattern.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn ends_with_odd_backslashes(s: &str) -> bool {
    s.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

// =============================================================================
// Unicode categories
// =============================================================================

/// ECMA long category names and their one/two-letter codes
const CATEGORY_NAMES: &[(&str, &str)] = &[
    ("Letter", "L"),
    ("Cased_Letter", "LC"),
    ("Uppercase_Letter", "Lu"),
    ("Lowercase_Letter", "Ll"),
    ("Titlecase_Letter", "Lt"),
    ("Modifier_Letter", "Lm"),
    ("Other_Letter", "Lo"),
    ("Number", "N"),
    ("Decimal_Number", "Nd"),
    ("digit", "Nd"),
    ("Letter_Number", "Nl"),
    ("Other_Number", "No"),
    ("Punctuation", "P"),
    ("punct", "P"),
    ("Symbol", "S"),
    ("Math_Symbol", "Sm"),
    ("Currency_Symbol", "Sc"),
    ("Mark", "M"),
    ("Combining_Mark", "M"),
    ("Nonspacing_Mark", "Mn"),
    ("Spacing_Mark", "Mc"),
    ("Separator", "Z"),
    ("Space_Separator", "Zs"),
    ("Other", "C"),
    ("Control", "Cc"),
];

const PROPERTY_PREFIXES: &[&str] = &["General_Category=", "gc=", "Script=", "sc=", "Script_Extensions=", "scx="];

fn translate_category(name: &str) -> String {
    let stripped = PROPERTY_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name);

    CATEGORY_NAMES
        .iter()
        .find(|(long, _)| *long == stripped)
        .map(|(_, short)| short.to_string())
        .unwrap_or_else(|| stripped.to_string())
}

// =============================================================================
// Scanner
// =============================================================================

const DIGIT_BODY: &str = "0-9";
const WORD_BODY: &str = "0-9A-Za-z_";

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    in_class: bool,
    out: String,
    warnings: Vec<String>,
}

impl Scanner {
    fn new(pattern: &str) -> Self {
        Self {
            chars: pattern.chars().collect(),
            pos: 0,
            in_class: false,
            out: String::with_capacity(pattern.len() + 16),
            warnings: Vec::new(),
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek(i) == Some(c))
    }

    fn run(&mut self) {
        while let Some(c) = self.peek(0) {
            match c {
                '\\' => self.escape(),
                '[' if !self.in_class => {
                    self.in_class = true;
                    self.out.push('[');
                    self.pos += 1;
                    // A leading `]` or `^]` is literal inside the class
                    if self.peek(0) == Some('^') {
                        self.out.push('^');
                        self.pos += 1;
                    }
                    if self.peek(0) == Some(']') {
                        self.out.push_str("\\]");
                        self.pos += 1;
                    }
                }
                ']' if self.in_class => {
                    self.in_class = false;
                    self.out.push(']');
                    self.pos += 1;
                }
                '(' if !self.in_class && self.peek(1) == Some('?') => self.group_prefix(),
                other => {
                    self.out.push(other);
                    self.pos += 1;
                }
            }
        }
    }

    fn group_prefix(&mut self) {
        let lookaround = ["(?=", "(?!", "(?<=", "(?<!"]
            .into_iter()
            .find(|prefix| self.starts_with(prefix));

        if let Some(prefix) = lookaround {
            let start = self.pos;
            let end = self.matching_paren(start);
            let removed: String = self.chars[start..end].iter().collect();
            let kind = match prefix {
                "(?=" => "lookahead",
                "(?!" => "negative lookahead",
                "(?<=" => "lookbehind",
                _ => "negative lookbehind",
            };
            self.warnings
                .push(format!("{} '{}' is not supported and was removed", kind, removed));
            self.pos = end;
            return;
        }

        if self.starts_with("(?<") {
            // Named group: (?<name> -> (?P<name>
            self.out.push_str("(?P<");
            self.pos += 3;
            return;
        }

        self.out.push_str("(?");
        self.pos += 2;
    }

    /// Index one past the `)` closing the group opened at `start`.
    fn matching_paren(&self, start: usize) -> usize {
        let mut depth = 0usize;
        let mut in_class = false;
        let mut i = start;
        while i < self.chars.len() {
            match self.chars[i] {
                '\\' => i += 1,
                '[' if !in_class => in_class = true,
                ']' if in_class => in_class = false,
                '(' if !in_class => depth += 1,
                ')' if !in_class => {
                    depth -= 1;
                    if depth == 0 {
                        return i + 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        self.chars.len()
    }

    fn escape(&mut self) {
        let Some(next) = self.peek(1) else {
            // Trailing backslash: escape it so the pattern stays valid
            self.out.push_str("\\\\");
            self.pos += 1;
            return;
        };

        match next {
            'd' => self.shorthand(DIGIT_BODY, false),
            'D' => self.shorthand(DIGIT_BODY, true),
            'w' => self.shorthand(WORD_BODY, false),
            'W' => self.shorthand(WORD_BODY, true),
            'p' | 'P' if self.peek(2) == Some('{') => self.category(next),
            'u' => self.unicode_escape(),
            '/' => {
                self.out.push('/');
                self.pos += 2;
            }
            '1'..='9' if !self.in_class => {
                self.warnings
                    .push(format!("backreference '\\{}' is not supported by the target engine", next));
                self.out.push('\\');
                self.out.push(next);
                self.pos += 2;
            }
            'k' if self.peek(2) == Some('<') => {
                self.warnings
                    .push("named backreference is not supported by the target engine".to_string());
                self.out.push_str("\\k");
                self.pos += 2;
            }
            other => {
                self.out.push('\\');
                self.out.push(other);
                self.pos += 2;
            }
        }
    }

    fn shorthand(&mut self, body: &str, negated: bool) {
        if self.in_class {
            if negated {
                // No bracket-free negation inside a class; keep the escape
                let letter = if body == DIGIT_BODY { 'D' } else { 'W' };
                self.out.push('\\');
                self.out.push(letter);
            } else {
                self.out.push_str(body);
            }
        } else if negated {
            let _ = write!(self.out, "[^{}]", body);
        } else {
            let _ = write!(self.out, "[{}]", body);
        }
        self.pos += 2;
    }

    fn category(&mut self, letter: char) {
        let name_start = self.pos + 3;
        let Some(close) = self.chars[name_start..].iter().position(|&c| c == '}') else {
            self.out.push('\\');
            self.out.push(letter);
            self.pos += 2;
            return;
        };

        let name: String = self.chars[name_start..name_start + close].iter().collect();
        let _ = write!(self.out, "\\{}{{{}}}", letter, translate_category(&name));
        self.pos = name_start + close + 1;
    }

    fn unicode_escape(&mut self) {
        // \u{XXXXX}
        if self.peek(2) == Some('{') {
            let start = self.pos + 3;
            if let Some(close) = self.chars[start..].iter().position(|&c| c == '}') {
                let hex: String = self.chars[start..start + close].iter().collect();
                let _ = write!(self.out, "\\x{{{}}}", hex);
                self.pos = start + close + 1;
                return;
            }
        }

        // \uXXXX
        let hex: String = (2..6).filter_map(|i| self.peek(i)).collect();
        if hex.len() == 4 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            let _ = write!(self.out, "\\x{{{}}}", hex);
            self.pos += 6;
        } else {
            self.out.push('u');
            self.pos += 2;
        }
    }
}
