//! KCL Schema Generator CLI
//!
//! Compiles JSON Schema / OpenAPI documents into KCL schemas.
//!
//! Usage:
//!   kclgen generate schemas/ --out kcl/
//!   kclgen diff schemas/pet.json --out kcl/
//!   kclgen init-config kclgen.toml

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kcl_schema_gen::codegen::{generate_document, DEFAULT_ROOT_NAME};
use kcl_schema_gen::writer::{diff_artifacts, write_artifacts, FileChange};
use kcl_schema_gen::{loader, GeneratedOutput, GeneratorConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kclgen")]
#[command(about = "Compile JSON Schema documents into KCL schemas with inline validation")]
struct Cli {
    /// Extra config file layered over the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate KCL files
    Generate {
        #[command(flatten)]
        input: InputArgs,

        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what `generate` would change, without writing
    Diff {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Write the effective configuration to a file
    InitConfig {
        #[arg(default_value = "kclgen.toml")]
        path: PathBuf,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// Schema document, or a directory searched for .json/.yaml/.yml files
    input: PathBuf,

    /// Output directory (overrides [output].dir)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Artifact name for a document's root schema (default: file stem)
    #[arg(long)]
    root_name: Option<String>,

    /// Skip docstrings and alias comments
    #[arg(long)]
    no_docs: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Ok(false) when any document reported errors
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = GeneratorConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Generate { input, json } => {
            apply_overrides(&mut config, &input);
            let mut clean = true;
            for job in jobs(&input, &config)? {
                let output = compile(&job, &config)?;
                print_diagnostics(&job.path, &output, json)?;
                if output.diagnostics.has_errors() {
                    eprintln!("{}: not written, generation reported errors", job.path.display());
                    clean = false;
                    continue;
                }
                let report = write_artifacts(&output.artifacts, &job.out_dir, &config.output)?;
                println!(
                    "{}: {} written, {} unchanged -> {}",
                    job.path.display(),
                    report.written.len(),
                    report.unchanged.len(),
                    job.out_dir.display()
                );
            }
            Ok(clean)
        }
        Commands::Diff { input } => {
            apply_overrides(&mut config, &input);
            let mut clean = true;
            for job in jobs(&input, &config)? {
                let output = compile(&job, &config)?;
                print_diagnostics(&job.path, &output, false)?;
                clean &= !output.diagnostics.has_errors();

                for diff in diff_artifacts(&output.artifacts, &job.out_dir, &config.output)? {
                    match diff.change {
                        FileChange::Unchanged => {}
                        FileChange::Added => println!("added    {}", diff.path.display()),
                        FileChange::Modified { lines } => {
                            println!("modified {}", diff.path.display());
                            for line in lines {
                                println!("    {}", line);
                            }
                        }
                    }
                }
            }
            Ok(clean)
        }
        Commands::InitConfig { path } => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            config.save(&path).with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
            Ok(true)
        }
    }
}

fn apply_overrides(config: &mut GeneratorConfig, input: &InputArgs) {
    if let Some(out) = &input.out {
        config.output.dir = Some(out.clone());
    }
    if let Some(root_name) = &input.root_name {
        config.generation.root_name = root_name.clone();
    }
    if input.no_docs {
        config.generation.emit_docs = false;
    }
}

/// One input document and where its artifacts go
struct Job {
    path: PathBuf,
    root_name: String,
    out_dir: PathBuf,
}

fn jobs(input: &InputArgs, config: &GeneratorConfig) -> anyhow::Result<Vec<Job>> {
    let paths = loader::discover(&input.input);
    if paths.is_empty() {
        bail!("no schema documents found at {}", input.input.display());
    }

    let base = config.output_dir();
    // Several documents each get a subdirectory, so their names cannot clash
    let nested = paths.len() > 1;
    let configured_root = config.generation.root_name != DEFAULT_ROOT_NAME;

    Ok(paths
        .into_iter()
        .map(|path| {
            let stem = loader::root_name_for(&path).unwrap_or_else(|| DEFAULT_ROOT_NAME.to_string());
            let root_name = if configured_root {
                config.generation.root_name.clone()
            } else {
                stem.clone()
            };
            let out_dir = if nested { base.join(&stem) } else { base.clone() };
            Job {
                path,
                root_name,
                out_dir,
            }
        })
        .collect())
}

fn compile(job: &Job, config: &GeneratorConfig) -> anyhow::Result<GeneratedOutput> {
    let document = loader::load_document(&job.path).with_context(|| format!("reading {}", job.path.display()))?;
    let mut options = config.generate_options();
    options.root_name = job.root_name.clone();

    let output = generate_document(&document, &options).with_context(|| format!("compiling {}", job.path.display()))?;
    tracing::info!(
        file = %job.path.display(),
        artifacts = output.artifacts.len(),
        "Compiled document"
    );
    Ok(output)
}

fn print_diagnostics(path: &Path, output: &GeneratedOutput, json: bool) -> anyhow::Result<()> {
    if output.diagnostics.is_empty() {
        return Ok(());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&output.diagnostics)?);
    } else {
        eprintln!("{}:\n{}", path.display(), output.diagnostics);
    }
    Ok(())
}
