//! Format Validator Registry
//!
//! Static catalog of JSON Schema `format` values and the KCL predicate each
//! one compiles to. Templates use `{value}` as the placeholder for the value
//! expression. Every format used in a run becomes one dedicated artifact
//! (`type EmailValidator = str` plus its helper lambda) that properties
//! reference by name.
//!
//! Unknown formats have no entry; format validation is advisory in JSON
//! Schema, so they never fail generation.

/// Placeholder substituted with the checked value expression
pub const VALUE_PLACEHOLDER: &str = "{value}";

/// One registered format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    /// JSON Schema format name
    pub name: &'static str,
    /// Name of the dedicated validator artifact
    pub artifact_name: &'static str,
    pub description: &'static str,
    /// KCL boolean expression over `{value}`
    pub template: &'static str,
    /// KCL modules the template calls into
    pub imports: &'static [&'static str],
}

impl FormatSpec {
    /// Render the predicate for a concrete value expression
    pub fn predicate(&self, value_expr: &str) -> String {
        self.template.replace(VALUE_PLACEHOLDER, value_expr)
    }
}

/// Look up a format by name
pub fn lookup(format: &str) -> Option<&'static FormatSpec> {
    FORMATS.iter().find(|spec| spec.name == format)
}

/// Every registered format
pub fn all() -> &'static [FormatSpec] {
    FORMATS
}

const REGEX: &[&str] = &["regex"];
const NET: &[&str] = &["net"];

static FORMATS: &[FormatSpec] = &[
    FormatSpec {
        name: "date",
        artifact_name: "DateValidator",
        description: "RFC 3339 full-date (YYYY-MM-DD)",
        template: r#"regex.match({value}, r"^[0-9]{4}-(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "date-time",
        artifact_name: "DateTimeValidator",
        description: "RFC 3339 date-time with offset",
        template: r#"regex.match({value}, r"^[0-9]{4}-(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])[Tt ]([01][0-9]|2[0-3]):[0-5][0-9]:([0-5][0-9]|60)(\.[0-9]+)?([Zz]|[+-]([01][0-9]|2[0-3]):[0-5][0-9])$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "time",
        artifact_name: "TimeValidator",
        description: "RFC 3339 full-time, offset optional",
        template: r#"regex.match({value}, r"^([01][0-9]|2[0-3]):[0-5][0-9]:([0-5][0-9]|60)(\.[0-9]+)?([Zz]|[+-]([01][0-9]|2[0-3]):[0-5][0-9])?$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "duration",
        artifact_name: "DurationValidator",
        description: "ISO 8601 duration (P3Y6M4DT12H30M5S, P2W)",
        template: r#"regex.match({value}, r"^P([0-9]+W|([0-9]+Y)?([0-9]+M)?([0-9]+D)?(T([0-9]+H)?([0-9]+M)?([0-9]+(\.[0-9]+)?S)?)?)$") and {value} != "P" and not regex.match({value}, r"T$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "email",
        artifact_name: "EmailValidator",
        description: "RFC 5321 mailbox, ASCII only",
        template: r#"regex.match({value}, r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "idn-email",
        artifact_name: "IdnEmailValidator",
        description: "RFC 6531 internationalized mailbox",
        template: r#"regex.match({value}, r"^[^@\s]+@[^@\s]+$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "hostname",
        artifact_name: "HostnameValidator",
        description: "RFC 1123 host name, labels up to 63 characters",
        template: r#"len({value}) <= 253 and regex.match({value}, r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.?$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "idn-hostname",
        artifact_name: "IdnHostnameValidator",
        description: "RFC 5890 internationalized host name",
        template: r#"len({value}) <= 253 and regex.match({value}, r"^[\p{L}\p{N}]([\p{L}\p{N}\p{M}-]{0,61}[\p{L}\p{N}])?(\.[\p{L}\p{N}]([\p{L}\p{N}\p{M}-]{0,61}[\p{L}\p{N}])?)*$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "ipv4",
        artifact_name: "Ipv4Validator",
        description: "Dotted-quad IPv4 address",
        template: "net.is_IPv4({value})",
        imports: NET,
    },
    FormatSpec {
        name: "ipv6",
        artifact_name: "Ipv6Validator",
        description: "RFC 4291 IPv6 address",
        template: "net.is_IP({value}) and not net.is_IPv4({value})",
        imports: NET,
    },
    FormatSpec {
        name: "uri",
        artifact_name: "UriValidator",
        description: "RFC 3986 absolute URI",
        template: r#"regex.match({value}, r"^[A-Za-z][A-Za-z0-9+.-]*:[^\s]*$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "uri-reference",
        artifact_name: "UriReferenceValidator",
        description: "RFC 3986 URI or relative reference",
        template: r#"regex.match({value}, r"^[^\s]*$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "iri",
        artifact_name: "IriValidator",
        description: "RFC 3987 absolute IRI",
        template: r#"regex.match({value}, r"^\p{L}[\p{L}\p{N}+.-]*:[^\s]*$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "iri-reference",
        artifact_name: "IriReferenceValidator",
        description: "RFC 3987 IRI or relative reference",
        template: r#"regex.match({value}, r"^[^\s]*$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "json-pointer",
        artifact_name: "JsonPointerValidator",
        description: "RFC 6901 JSON Pointer",
        template: r#"regex.match({value}, r"^(/([^~/]|~[01])*)*$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "relative-json-pointer",
        artifact_name: "RelativeJsonPointerValidator",
        description: "Relative JSON Pointer",
        template: r#"regex.match({value}, r"^(0|[1-9][0-9]*)(#|(/([^~/]|~[01])*)*)$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "uuid",
        artifact_name: "UuidValidator",
        description: "RFC 4122 UUID",
        template: r#"regex.match({value}, r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "regex",
        artifact_name: "RegexValidator",
        description: "Regular expression the target engine accepts",
        template: "regex.compile({value})",
        imports: REGEX,
    },
    FormatSpec {
        name: "byte",
        artifact_name: "ByteValidator",
        description: "Base64-encoded data (OpenAPI)",
        template: r#"regex.match({value}, r"^([A-Za-z0-9+/]{4})*([A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$")"#,
        imports: REGEX,
    },
    FormatSpec {
        name: "uri-template",
        artifact_name: "UriTemplateValidator",
        description: "RFC 6570 URI template",
        template: r#"regex.match({value}, r"^([^{}\s]|\{[^{}\s]+\})*$")"#,
        imports: REGEX,
    },
];
