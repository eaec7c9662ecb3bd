use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wordsift::config::{DEFAULT_BATCH_SIZE, DEFAULT_DEDUPE_BATCH_SIZE};
use wordsift::{
    BatchDispatcher, EnrichmentArgs, EnrichmentRecord, OpenAiEnricher, Pacer, Pipeline,
    ResponseMode, UNENRICHED_MODEL,
};

/// Page separator inside input files.
const PAGE_BREAK: char = '\u{c}';

#[derive(Parser, Debug)]
#[command(
    name = "wordsift",
    about = "Extract, deduplicate and enrich Korean vocabulary and grammar"
)]
struct Cli {
    /// Text files with extracted page text; form feeds separate pages
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output JSONL containing one record per vocabulary or grammar item
    #[arg(short, long, env = "WORDSIFT_OUTPUT", default_value = "wordsift.jsonl")]
    output: PathBuf,

    /// Items per analysis batch; grammar batches use half
    #[arg(long, env = "WORDSIFT_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Write records without calling the enrichment service
    #[arg(long, default_value_t = false)]
    skip_enrichment: bool,

    /// Keep only the first N vocabulary items
    #[arg(long, env = "WORDSIFT_LIMIT")]
    limit: Option<usize>,

    /// Run an LLM lemmatize pass over the vocabulary before analysis
    #[arg(long, default_value_t = false)]
    dedupe_batch: bool,

    /// Words per lemmatize batch
    #[arg(long, env = "WORDSIFT_DEDUPE_BATCH_SIZE", default_value_t = DEFAULT_DEDUPE_BATCH_SIZE)]
    dedupe_batch_size: usize,

    /// Seconds before undispatched batches are cancelled (0 = no limit)
    #[arg(long, env = "WORDSIFT_DURATION", default_value_t = 0)]
    duration_secs: u64,

    #[command(flatten)]
    enrichment: EnrichmentArgs,
}

#[derive(Serialize)]
struct OutputRow<'a> {
    section: &'static str,
    #[serde(flatten)]
    record: &'a EnrichmentRecord,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let pages = load_pages(&cli.inputs)?;
    info!(files = cli.inputs.len(), pages = pages.len(), "loaded input");
    let pipeline = Pipeline::new(None);
    let extraction = pipeline.extract_pages(&pages);

    let mut vocabulary: Vec<String> = extraction
        .vocabulary
        .into_iter()
        .map(|item| item.text)
        .collect();
    if let Some(limit) = cli.limit {
        vocabulary.truncate(limit);
        info!(limit, "vocabulary limited");
    }
    let grammar: Vec<String> = extraction
        .grammar
        .iter()
        .map(|example| example.prompt_item())
        .collect();

    let (vocab_records, grammar_records) = if cli.skip_enrichment {
        (
            unenriched(&vocabulary),
            unenriched(&grammar),
        )
    } else {
        enrich(&cli, vocabulary, &grammar)?
    };

    let output =
        File::create(&cli.output).with_context(|| format!("failed to create {:?}", cli.output))?;
    let mut writer = BufWriter::new(output);
    write_rows(&mut writer, "vocabulary", &vocab_records)?;
    write_rows(&mut writer, "grammar", &grammar_records)?;
    writer.flush()?;
    info!(
        vocabulary = vocab_records.len(),
        grammar = grammar_records.len(),
        output = %cli.output.display(),
        "wrote records"
    );
    Ok(())
}

fn load_pages(paths: &[PathBuf]) -> Result<Vec<String>> {
    let mut pages = Vec::new();
    for path in paths {
        let text =
            fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?;
        pages.extend(
            text.split(PAGE_BREAK)
                .filter(|page| !page.trim().is_empty())
                .map(str::to_string),
        );
    }
    Ok(pages)
}

fn unenriched(items: &[String]) -> Vec<EnrichmentRecord> {
    items
        .iter()
        .map(|item| EnrichmentRecord::unenriched(item.as_str(), UNENRICHED_MODEL))
        .collect()
}

fn enrich(
    cli: &Cli,
    mut vocabulary: Vec<String>,
    grammar: &[String],
) -> Result<(Vec<EnrichmentRecord>, Vec<EnrichmentRecord>)> {
    let enricher = cli
        .enrichment
        .build_enricher()
        .context("failed to configure enrichment")?;
    let cancel = stop_flag(cli.duration_secs);
    let pacer = cli.enrichment.build_pacer();
    info!(delay = ?pacer.delay(), "pacing enrichment requests");

    if cli.dedupe_batch {
        vocabulary = lemmatize(cli, &enricher, &pacer, &vocabulary, &cancel)?;
    }

    let config = cli
        .enrichment
        .build_config(ResponseMode::Analyze, cli.batch_size.max(1));
    let dispatcher = BatchDispatcher::new(&enricher, config)?.with_pacer(Arc::clone(&pacer));
    let vocab_report = dispatcher.dispatch(&vocabulary, &cancel);

    let grammar_config = cli
        .enrichment
        .build_config(ResponseMode::Analyze, (cli.batch_size / 2).max(1));
    let dispatcher =
        BatchDispatcher::new(&enricher, grammar_config)?.with_pacer(Arc::clone(&pacer));
    let grammar_report = dispatcher.dispatch(grammar, &cancel);

    let failed = vocab_report.fallback_batches() + grammar_report.fallback_batches();
    if failed > 0 {
        warn!(failed, "some batches fell back to unenriched items");
    }
    Ok((vocab_report.records, grammar_report.records))
}

fn lemmatize(
    cli: &Cli,
    enricher: &OpenAiEnricher,
    pacer: &Arc<Pacer>,
    vocabulary: &[String],
    cancel: &AtomicBool,
) -> Result<Vec<String>> {
    let config = cli
        .enrichment
        .build_config(ResponseMode::Lemmatize, cli.dedupe_batch_size.max(1));
    let dispatcher = BatchDispatcher::new(enricher, config)?.with_pacer(Arc::clone(pacer));
    let report = dispatcher.dispatch(vocabulary, cancel);
    let words: Vec<String> = report.records.into_iter().map(|record| record.item).collect();
    info!(
        before = vocabulary.len(),
        after = words.len(),
        "lemmatize pass complete"
    );
    Ok(words)
}

fn stop_flag(duration_secs: u64) -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    if duration_secs > 0 {
        let timer = Arc::clone(&flag);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(duration_secs));
            warn!(duration_secs, "run duration elapsed; cancelling remaining batches");
            timer.store(true, Ordering::SeqCst);
        });
    }
    flag
}

fn write_rows<W: Write>(
    writer: &mut W,
    section: &'static str,
    records: &[EnrichmentRecord],
) -> Result<()> {
    for record in records {
        serde_json::to_writer(&mut *writer, &OutputRow { section, record })?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
