use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use wordsift::config::DEFAULT_DEDUPE_BATCH_SIZE;
use wordsift::{BatchDispatcher, EnrichmentArgs, EnrichmentRecord, Pipeline, ResponseMode};

#[derive(Parser, Debug)]
#[command(
    name = "wordsift-dedupe",
    about = "Collapse a Korean word list to one representative per canonical form"
)]
struct DedupeCli {
    /// Word list with one word per line
    input: PathBuf,

    /// Output JSONL (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Follow up with an LLM lemmatize pass
    #[arg(long, default_value_t = false)]
    llm: bool,

    /// Words per lemmatize batch
    #[arg(long, env = "WORDSIFT_DEDUPE_BATCH_SIZE", default_value_t = DEFAULT_DEDUPE_BATCH_SIZE)]
    batch_size: usize,

    #[command(flatten)]
    enrichment: EnrichmentArgs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
    let cli = DedupeCli::parse();

    let words = load_words(&cli.input)?;
    let pipeline = Pipeline::new(None);
    let clusters = pipeline.cluster(words.iter().map(String::as_str));
    for cluster in clusters.iter().filter(|cluster| cluster.members().len() > 1) {
        debug!(
            key = cluster.key(),
            representative = cluster.representative(),
            members = ?cluster.members(),
            "merged variants"
        );
    }
    let representatives: Vec<String> = clusters
        .representatives()
        .into_iter()
        .map(|item| item.text)
        .collect();
    info!(
        words = words.len(),
        unique = representatives.len(),
        normalizer = pipeline.normalizer_label(),
        "deduplicated word list"
    );

    let records = if cli.llm {
        let enricher = cli
            .enrichment
            .build_enricher()
            .context("failed to configure enrichment")?;
        let config = cli
            .enrichment
            .build_config(ResponseMode::Lemmatize, cli.batch_size.max(1));
        BatchDispatcher::new(enricher, config)?.process_all(&representatives)
    } else {
        representatives
            .iter()
            .map(|word| EnrichmentRecord::unenriched(word.as_str(), pipeline.normalizer_label()))
            .collect()
    };

    match &cli.output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("failed to create {:?}", path))?;
            write_records(BufWriter::new(file), &records)?;
        }
        None => write_records(io::stdout().lock(), &records)?,
    }
    Ok(())
}

fn load_words(path: &PathBuf) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let reader = BufReader::new(file);
    let mut words = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", line_no + 1))?;
        let word = line.trim();
        if !word.is_empty() {
            words.push(word.to_string());
        }
    }
    Ok(words)
}

fn write_records<W: Write>(mut writer: W, records: &[EnrichmentRecord]) -> Result<()> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
