//! Runs every fixture under `fixtures/` through the decoder.
//!
//! A fixture names a schema document plus wire texts that must be accepted
//! and texts that must be rejected. Optional first argument: a regex filter
//! on fixture names.
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use hoshi::path_de::from_str_with_path;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Fixture {
    name: String,
    schema: Value,
    #[serde(default)]
    accept: Vec<String>,
    #[serde(default)]
    reject: Vec<String>,
}

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn load_fixture(path: &Path) -> Result<Fixture> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    from_str_with_path::<Fixture>(&src).with_context(|| format!("in {}", path.display()))
}

/// Returns the number of failed expectations.
fn run_fixture(fixture: &Fixture) -> Result<usize> {
    let schema = hoshi::parse_schema(&fixture.schema.to_string())
        .with_context(|| format!("fixture `{}` has an invalid schema", fixture.name))?;
    let dec = hoshi::decoder(&schema)?;
    let mut failures = 0;

    for text in &fixture.accept {
        if let Err(error) = dec.decode(text) {
            failures += 1;
            eprintln!("❌ {}: expected accept for {text}", fixture.name);
            eprintln!("{error}");
        }
    }
    for text in &fixture.reject {
        if let Ok(decoded) = dec.decode(text) {
            failures += 1;
            eprintln!("❌ {}: expected reject, decoded {}", fixture.name, decoded.term);
        }
    }
    if failures == 0 {
        eprintln!(
            "✅ {} ({} accepted, {} rejected)",
            fixture.name,
            fixture.accept.len(),
            fixture.reject.len()
        );
    }
    Ok(failures)
}

fn run() -> Result<usize> {
    let filter = std::env::args()
        .nth(1)
        .map(|pattern| Regex::new(&pattern))
        .transpose()
        .context("invalid filter pattern")?;

    let mut paths = std::fs::read_dir(fixtures_dir())
        .context("failed to list fixtures")?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|p| p.extension().is_some_and(|ext| ext == "json"));
    paths.sort();

    let mut failures = 0;
    for path in paths {
        let fixture = load_fixture(&path)?;
        if filter.as_ref().is_some_and(|rx| !rx.is_match(&fixture.name)) {
            continue;
        }
        failures += run_fixture(&fixture)?;
    }
    Ok(failures)
}

fn main() -> ExitCode {
    match run() {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failures) => {
            eprintln!("{failures} expectation(s) failed");
            ExitCode::FAILURE
        }
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
