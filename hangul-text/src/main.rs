use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use hangul_text::GrammarMatcher;

#[derive(Parser, Debug)]
#[command(
    name = "hangul_text",
    version,
    about = "Print sentence count, Hangul vocabulary runs and grammar examples as JSON"
)]
struct Cli {
    /// Extracted page text; omit or pass '-' to read stdin
    input: Option<PathBuf>,

    /// File of grammar patterns, one regex per line, tried in order
    #[arg(long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Print the report on a single line
    #[arg(long, default_value_t = false)]
    compact: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let text = match cli.input.as_deref() {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let matcher = match &cli.rules {
        Some(path) => load_rules(path)?,
        None => GrammarMatcher::with_default_rules(),
    };
    let report = hangul_text::analyze(&text, &matcher);
    let json = if cli.compact {
        serde_json::to_string(&report)
    } else {
        serde_json::to_string_pretty(&report)
    }
    .context("failed to serialize report")?;
    println!("{json}");
    Ok(())
}

/// Blank lines and lines starting with `#` are ignored.
fn load_rules(path: &Path) -> Result<GrammarMatcher> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read rules from {}", path.display()))?;
    let patterns = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));
    GrammarMatcher::new(patterns).with_context(|| format!("invalid rule in {}", path.display()))
}
