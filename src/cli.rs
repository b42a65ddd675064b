//! Minimal CLI: schema + JSON documents → decode | describe | check
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;

use json_wire::schema::SchemaFile;
use json_wire::Registry;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// decode JSON documents against declared object types, or inspect the declarations
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// decode documents and print their re-encoded wire form, one per line
    Decode(DecodeOut),
    /// print the field table of one object type
    Describe(DescribeOut),
    /// list fields that refer to unregistered types
    Check(CheckOut),
}

#[derive(Args, Debug, Clone)]
struct SchemaSettings {
    /// JSON schema declaration file
    #[arg(long, short)]
    schema: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /result/0)
    #[arg(long)]
    json_pointer: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct DecodeOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// object type every document is decoded as
    #[arg(long = "type", short = 't')]
    type_name: String,

    /// output .ndjson file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// override the schema's nesting limit
    #[arg(long)]
    max_depth: Option<usize>,

    /// override the schema's node limit
    #[arg(long)]
    max_nodes: Option<usize>,

    /// also print non-fatal diagnostics per document
    #[arg(long)]
    diagnostics: bool,
}

#[derive(clap::Parser, Debug)]
struct DescribeOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// object type to describe
    #[arg(long = "type", short = 't')]
    type_name: String,
}

#[derive(clap::Parser, Debug)]
struct CheckOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,
}

struct Document {
    source: String,
    value: serde_json::Value,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl SchemaSettings {
    fn load(&self, max_depth: Option<usize>, max_nodes: Option<usize>) -> Result<Registry> {
        let bytes = std::fs::read(&self.schema)
            .with_context(|| format!("failed to read schema file {}", self.schema.display()))?;
        let mut file = SchemaFile::from_slice(&bytes)
            .with_context(|| format!("invalid schema file {}", self.schema.display()))?;
        if max_depth.is_some() || max_nodes.is_some() {
            let mut limits = file.limits.unwrap_or_default();
            limits.max_depth = max_depth.unwrap_or(limits.max_depth);
            limits.max_nodes = max_nodes.unwrap_or(limits.max_nodes);
            file.limits = Some(limits);
        }
        Ok(file.into_registry()?)
    }
}

impl InputSettings {
    fn load_documents(&self) -> Result<Vec<Document>> {
        let source_paths = resolve_file_path_patterns(&self.input)
            .map_err(|error| anyhow!("failed to resolve input file paths: {error}"))?;
        let mut out = Vec::new();
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file {source_path_str}"))?;
            if self.ndjson {
                for (i, line) in source.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let label = format!("{source_path_str}:{}", i + 1);
                    let value = serde_json::from_str(line)
                        .with_context(|| format!("failed to parse JSON ({label})"))?;
                    out.push(self.select(label, value)?);
                }
            } else {
                let value = serde_json::from_str(&source)
                    .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
                out.push(self.select(source_path_str, value)?);
            }
        }
        Ok(out)
    }

    fn select(&self, source: String, value: serde_json::Value) -> Result<Document> {
        match self.json_pointer.as_deref() {
            None => Ok(Document { source, value }),
            Some(ptr) => {
                let value = value
                    .pointer(ptr)
                    .cloned()
                    .ok_or_else(|| anyhow!("JSON pointer {ptr} selects nothing in {source}"))?;
                Ok(Document { source, value })
            }
        }
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> Result<ExitCode> {
        match &self.cmd {
            Command::Decode(target) => {
                let registry = target.schema_settings.load(target.max_depth, target.max_nodes)?;
                registry.resolve(&target.type_name)?;
                let documents = target.input_settings.load_documents()?;
                decode_documents(&registry, target, &documents)
            }
            Command::Describe(target) => {
                let registry = target.schema_settings.load(None, None)?;
                let ty = registry.resolve(&target.type_name)?;
                println!("{}", ty.name().bold());
                println!("  {:<28} {:<28} {:<40} {}", "wire", "attribute", "type", "required");
                for field in ty.fields() {
                    println!(
                        "  {:<28} {:<28} {:<40} {}",
                        field.wire_name,
                        field.attr_name,
                        field.ty.to_string(),
                        if field.required { "yes" } else { "no" }
                    );
                }
                Ok(ExitCode::SUCCESS)
            }
            Command::Check(target) => {
                let registry = target.schema_settings.load(None, None)?;
                let dangling = registry.dangling_refs();
                if dangling.is_empty() {
                    eprintln!("✅ {} types, no dangling references", registry.names().count());
                    return Ok(ExitCode::SUCCESS);
                }
                for d in &dangling {
                    eprintln!(
                        "{} {}.{} refers to unregistered `{}`",
                        "⚠".yellow(),
                        d.type_name,
                        d.field,
                        d.target
                    );
                }
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn decode_documents(registry: &Registry, target: &DecodeOut, documents: &[Document]) -> Result<ExitCode> {
    let results: Vec<_> = documents
        .par_iter()
        .map(|doc| {
            let decoded = match &doc.value {
                serde_json::Value::Object(map) => registry.decode_with_report(&target.type_name, map),
                other => registry.decode_value(&target.type_name, other).map(|instance| {
                    json_wire::Decoded { instance, diagnostics: Vec::new() }
                }),
            };
            (doc, decoded)
        })
        .collect();

    let mut lines = String::new();
    let mut failed = 0usize;
    for (doc, result) in &results {
        match result {
            Ok(decoded) => {
                lines.push_str(&decoded.instance.to_json_string()?);
                lines.push('\n');
                if target.diagnostics {
                    for d in &decoded.diagnostics {
                        eprintln!("{} {}: {d}", "⚠".yellow(), doc.source);
                    }
                }
            }
            Err(error) => {
                failed += 1;
                eprintln!("{} {}: {error}", "❌ failed".red(), doc.source);
            }
        }
    }

    if let Some(out) = target.out.as_ref() {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(out, &lines).with_context(|| format!("failed to write {}", out.display()))?;
    } else {
        print!("{lines}");
    }

    let ok = results.len() - failed;
    eprintln!("{} {ok} decoded, {failed} failed", if failed == 0 { "✅".green() } else { "❌".red() });
    Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            // Treat as a glob pattern
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                match entry {
                    Ok(p) => {
                        matched_any = true;
                        out.push(p);
                    }
                    Err(e) => return Err(Box::new(e)),
                }
            }
            if !matched_any {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
                return Err(format!("glob pattern matched no files: {pattern}").into());
            }
        } else {
            // Treat as a literal path
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
