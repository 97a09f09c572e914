//! Configuration for the generator
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (kclgen.toml, .kclgen.toml, config/kclgen.toml)
//! - The user config directory
//! - Environment variables (KCLGEN__*)
//!
//! ## Example config file (kclgen.toml):
//! ```toml
//! [generation]
//! root_name = "Config"
//! max_depth = 64
//! emit_docs = true
//!
//! [output]
//! dir = "schemas"
//! extension = "k"
//! header = true
//!
//! [render]
//! indent = "    "
//! float_epsilon = 1e-10
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codegen::config::RenderProfile;
use crate::codegen::{GenerateOptions, DEFAULT_MAX_DEPTH, DEFAULT_ROOT_NAME};

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// KCL tokens and layout
    #[serde(default)]
    pub render: RenderProfile,
}

/// Compiler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Artifact name for a document whose root is itself a schema
    #[serde(default = "default_root_name")]
    pub root_name: String,

    /// Nesting depth past which fragments become `any`
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Write schema docstrings and alias comments
    #[serde(default = "default_true")]
    pub emit_docs: bool,
}

/// Where and how artifact files are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory; the CLI falls back to the working directory
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// File extension, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Prepend the "generated, do not edit" banner
    #[serde(default = "default_true")]
    pub header: bool,
}

fn default_root_name() -> String {
    DEFAULT_ROOT_NAME.to_string()
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_extension() -> String {
    "k".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            root_name: default_root_name(),
            max_depth: default_max_depth(),
            emit_docs: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            extension: default_extension(),
            header: true,
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, with `config_path` as a required extra layer
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["kclgen.toml", ".kclgen.toml", "config/kclgen.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "kcl", "kclgen") {
            let user_config = dirs.config_dir().join("kclgen.toml");
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("KCLGEN")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration as TOML
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Options for one generation run
    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            root_name: self.generation.root_name.clone(),
            max_depth: self.generation.max_depth,
            emit_docs: self.generation.emit_docs,
            profile: self.render.clone(),
        }
    }

    /// Output directory (resolves relative paths)
    pub fn output_dir(&self) -> PathBuf {
        let dir = self.output.dir.clone().unwrap_or_else(|| PathBuf::from("."));
        if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir().unwrap_or_default().join(dir)
        }
    }
}
