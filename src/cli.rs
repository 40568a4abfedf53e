//! Minimal CLI: check | encode | validate-schema | bootstrap
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

use hoshi::{Checker, DEFAULT_MAX_DEPTH, DecodeError, EncodeError, Schema};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// check JSON documents against hoshi schemas, and encode values through them
#[derive(Parser, Debug)]
#[command(name = "hoshi", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// decode each input document through a schema and report conformance
    Check(CheckOut),
    /// type-check one value and print its wire text
    Encode(EncodeOut),
    /// check schema documents against the schema of schemas
    ValidateSchema(ValidateSchemaOut),
    /// print the self-describing bootstrap terms
    Bootstrap(BootstrapOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug, Clone, Copy)]
struct GuardSettings {
    /// recursion guard for `let`/`ref` cycles, applied to schemas and documents
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

#[derive(clap::Parser, Debug)]
struct CheckOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// schema document (.json)
    #[arg(long)]
    schema: PathBuf,

    #[command(flatten)]
    guard: GuardSettings,

    /// write a JSON report of every verdict to this file
    #[arg(long)]
    diagnostics_out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct EncodeOut {
    /// schema document (.json)
    #[arg(long)]
    schema: PathBuf,

    /// value to encode (.json)
    #[arg(long, short)]
    input: PathBuf,

    #[command(flatten)]
    guard: GuardSettings,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct ValidateSchemaOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    guard: GuardSettings,
}

#[derive(clap::Parser, Debug)]
struct BootstrapOut {
    /// which bootstrap term to print
    #[arg(long, value_enum, default_value_t = Which::Schema)]
    which: Which,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Which {
    /// the schema of schemas
    Schema,
    /// the type of type terms
    Type,
    /// the type of any JSON value
    Data,
}

/// One document read from the inputs.
struct Document {
    source: String,
    text: String,
}

#[derive(Serialize)]
struct Report<'a> {
    generated_at: String,
    schema: String,
    checked: usize,
    failed: usize,
    results: Vec<ReportEntry<'a>>,
}

#[derive(Serialize)]
struct ReportEntry<'a> {
    input: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a DecodeError>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load_documents(&self) -> Result<Vec<Document>> {
        let source_paths = resolve_file_path_patterns(&self.input)
            .context("failed to resolve input file paths")?;
        let mut out = Vec::new();
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file ({source_path_str})"))?;
            if self.ndjson {
                for (ix, line) in source.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let line_source = format!("{source_path_str}:{}", ix + 1);
                    out.push(self.select(line_source, line.to_string())?);
                }
            } else {
                out.push(self.select(source_path_str, source)?);
            }
        }
        Ok(out)
    }

    /// Apply `--json-pointer`. Unparseable text is passed through untouched so
    /// that decoding reports it.
    fn select(&self, source: String, text: String) -> Result<Document> {
        let Some(pointer) = self.json_pointer.as_ref() else {
            return Ok(Document { source, text });
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            return Ok(Document { source, text });
        };
        let node = value
            .pointer(pointer)
            .ok_or_else(|| anyhow!("JSON pointer {pointer} selects nothing in {source}"))?;
        let text = serde_json::to_string(node)?;
        Ok(Document { source, text })
    }
}

impl GuardSettings {
    fn checker(&self) -> Checker {
        Checker::with_max_depth(self.max_depth)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }
    pub fn run(&self) -> Result<ExitCode> {
        let all_ok = match &self.cmd {
            Command::Check(target) => run_check(target)?,
            Command::Encode(target) => run_encode(target)?,
            Command::ValidateSchema(target) => run_validate_schema(target)?,
            Command::Bootstrap(target) => {
                run_bootstrap(target)?;
                true
            }
        };
        Ok(if all_ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }
}

fn run_check(target: &CheckOut) -> Result<bool> {
    let checker = target.guard.checker();
    let schema = load_schema(&target.schema, checker)?;
    let dec = hoshi::decoder(&schema)?.with_checker(checker);
    let documents = target.input_settings.load_documents()?;
    tracing::info!(documents = documents.len(), schema = %target.schema.display(), "checking");

    let verdicts = documents
        .par_iter()
        .map(|doc| dec.decode(&doc.text).map(|_| ()))
        .collect::<Vec<_>>();

    for (doc, verdict) in documents.iter().zip(&verdicts) {
        match verdict {
            Ok(()) => println!("{} {}", "ok".green(), doc.source),
            Err(error) => {
                println!("{} {}", "fail".red().bold(), doc.source);
                print_indented(&render_decode_error(error));
            }
        }
    }

    let failed = verdicts.iter().filter(|v| v.is_err()).count();
    if let Some(out) = target.diagnostics_out.as_ref() {
        let report = Report {
            generated_at: chrono::Utc::now().to_rfc3339(),
            schema: target.schema.to_string_lossy().to_string(),
            checked: documents.len(),
            failed,
            results: documents
                .iter()
                .zip(&verdicts)
                .map(|(doc, verdict)| ReportEntry {
                    input: &doc.source,
                    ok: verdict.is_ok(),
                    error: verdict.as_ref().err(),
                })
                .collect(),
        };
        write_output(Some(out.as_path()), &serde_json::to_string_pretty(&report)?)?;
    }
    eprintln!("{} checked, {} failed", documents.len(), failed);
    Ok(failed == 0)
}

fn run_encode(target: &EncodeOut) -> Result<bool> {
    let checker = target.guard.checker();
    let schema = load_schema(&target.schema, checker)?;
    let enc = hoshi::encoder(&schema)?.with_checker(checker);
    let source = std::fs::read_to_string(&target.input)
        .with_context(|| format!("failed to read {}", target.input.display()))?;
    let value = serde_json::from_str::<Value>(&source)
        .with_context(|| format!("failed to parse JSON source file ({})", target.input.display()))?;
    match enc.encode(&value) {
        Ok(text) => {
            write_output(target.out.as_deref(), &text)?;
            Ok(true)
        }
        Err(EncodeError::Type(error)) => {
            println!("{} {}", "fail".red().bold(), target.input.display());
            print_indented(&error.render());
            Ok(false)
        }
        Err(error) => Err(error.into()),
    }
}

fn run_validate_schema(target: &ValidateSchemaOut) -> Result<bool> {
    let documents = target.input_settings.load_documents()?;
    let mut all_ok = true;
    for doc in &documents {
        match hoshi::parse_schema_with(&doc.text, target.guard.checker()) {
            Ok(_) => println!("{} {}", "ok".green(), doc.source),
            Err(hoshi::SchemaError::Decode(error)) => {
                all_ok = false;
                println!("{} {}", "fail".red().bold(), doc.source);
                print_indented(&render_decode_error(&error));
            }
            Err(error) => {
                all_ok = false;
                println!("{} {}", "fail".red().bold(), doc.source);
                print_indented(&format!("{error}\n"));
            }
        }
    }
    Ok(all_ok)
}

fn run_bootstrap(target: &BootstrapOut) -> Result<()> {
    let value = match target.which {
        Which::Schema => hoshi::schema_as_data(&hoshi::json_schema(None))?,
        Which::Type => hoshi::type_as_data(hoshi::type_type())?,
        Which::Data => hoshi::type_as_data(hoshi::data_type())?,
    };
    write_output(target.out.as_deref(), &serde_json::to_string_pretty(&value)?)
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn load_schema(path: &Path, checker: Checker) -> Result<Schema> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file ({})", path.display()))?;
    hoshi::parse_schema_with(&source, checker)
        .with_context(|| format!("invalid schema file ({})", path.display()))
}

fn render_decode_error(error: &DecodeError) -> String {
    match error {
        DecodeError::Type(error) => error.render(),
        DecodeError::Malformed { reason, .. } => format!("invalid JSON: {reason}\n"),
    }
}

fn print_indented(rendered: &str) {
    for line in rendered.lines() {
        println!("    {line}");
    }
}

fn write_output(out: Option<&Path>, contents: &str) -> Result<()> {
    let Some(out) = out else {
        println!("{contents}");
        return Ok(());
    };
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(out, contents).with_context(|| format!("failed to write {}", out.display()))
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
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
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_paths_pass_through() {
        let paths = resolve_file_path_patterns(["a.json", "dir/b.json"]).unwrap();
        assert_eq!(paths, [PathBuf::from("a.json"), PathBuf::from("dir/b.json")]);
    }

    #[test]
    fn json_pointer_selects_subnode() {
        let settings = InputSettings {
            ndjson: false,
            json_pointer: Some("/payload/0".into()),
            input: Vec::new(),
        };
        let doc = settings.select("x".into(), r#"{"payload": [{"a": 1}]}"#.into()).unwrap();
        assert_eq!(doc.text, r#"{"a":1}"#);

        let doc = settings.select("x".into(), "not json".into()).unwrap();
        assert_eq!(doc.text, "not json");

        assert!(settings.select("x".into(), "{}".into()).is_err());
    }

    #[test]
    fn cli_parses() {
        let cli = CommandLineInterface::try_parse_from([
            "hoshi", "check", "--schema", "s.json", "-i", "a.json", "b.json", "--ndjson",
        ])
        .unwrap();
        let Command::Check(target) = &cli.cmd else { panic!("{cli:?}") };
        assert_eq!(target.input_settings.input, ["a.json", "b.json"]);
        assert!(target.input_settings.ndjson);
        assert_eq!(target.guard.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn max_depth_reaches_every_subcommand() {
        let cli = CommandLineInterface::try_parse_from([
            "hoshi", "validate-schema", "-i", "s.json", "--max-depth", "8",
        ])
        .unwrap();
        let Command::ValidateSchema(target) = &cli.cmd else { panic!("{cli:?}") };
        assert_eq!(target.guard.max_depth, 8);

        let cli = CommandLineInterface::try_parse_from([
            "hoshi", "encode", "--schema", "s.json", "-i", "v.json", "--max-depth", "9",
        ])
        .unwrap();
        let Command::Encode(target) = &cli.cmd else { panic!("{cli:?}") };
        assert_eq!(target.guard.max_depth, 9);
    }

    #[test]
    fn max_depth_guards_schema_loading() {
        let t = (0..30).fold(hoshi::Type::int(), |inner, _| hoshi::Type::list(inner));
        let name = format!("hoshi-deep-schema-{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, serde_json::to_string(&Schema::json(t)).unwrap()).unwrap();

        let cli = CommandLineInterface::try_parse_from([
            "hoshi",
            "check",
            "--schema",
            path.to_str().unwrap(),
            "-i",
            "a.json",
            "--max-depth",
            "16",
        ])
        .unwrap();
        let Command::Check(target) = &cli.cmd else { panic!("{cli:?}") };
        let shallow = load_schema(&target.schema, target.guard.checker());
        let deep = load_schema(&path, Checker::default());
        std::fs::remove_file(&path).unwrap();

        let err = shallow.unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<hoshi::SchemaError>(),
                Some(hoshi::SchemaError::Decode(DecodeError::Type(e))) if e.is_fatal()
            ),
            "{err:#}"
        );
        assert!(deep.is_ok());
    }
}
