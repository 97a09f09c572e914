//! KCL Schema Generator
//!
//! Compiles JSON Schema and OpenAPI schema documents into KCL: one `schema`
//! or `type` declaration per named schema, with the document's constraints
//! carried into `check:` blocks and `is_valid_*` helper lambdas.
//!
//! ## Features
//!
//! - **Full constraint coverage**: ranges, lengths, patterns, formats, enums,
//!   uniqueness, property counts, pattern and additional properties
//! - **Compositions**: `allOf` flattening, `anyOf`/`oneOf`/`not`/`if` helpers
//!   that re-evaluate their branches
//! - **Self-referential schemas**: cycles become references by name
//! - **Diagnostics**: unresolved references, malformed fragments and lossy
//!   regex translations are collected, never silently dropped
//!
//! ## Pipeline
//!
//! ```text
//! document ─► DefinitionTable ─► TreeBuilder ─► SchemaArena
//!                                                    │
//!          ArtifactSet ◄─ kcl emitter ◄─ Generator ◄─┘
//! ```
//!
//! ```
//! use kcl_schema_gen::{generate_document, GenerateOptions};
//! use serde_json::json;
//!
//! let document = json!({
//!     "type": "object",
//!     "required": ["name"],
//!     "properties": {"name": {"type": "string", "minLength": 1}}
//! });
//! let output = generate_document(&document, &GenerateOptions::default()).unwrap();
//! let schema = output.artifacts.get("Schema").unwrap();
//! assert!(schema.content.contains("schema Schema:"));
//! ```

pub mod checksum;
pub mod codegen;
pub mod config;
pub mod error;
pub mod ir;
pub mod loader;
pub mod writer;

pub use checksum::Checksum;
pub use codegen::{generate_document, ArtifactSet, GenerateOptions, GeneratedArtifact, GeneratedOutput};
pub use config::GeneratorConfig;
pub use error::{GenError, Result};
pub use ir::{DiagnosticCode, Diagnostics, SchemaNode};
