//! Batched, paced enrichment with bounded retries and per-item fallback.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::config::EnrichmentConfig;
use crate::enricher::Enricher;
use crate::error::{Error, Result};
use crate::records::EnrichmentRecord;
use crate::response::{ParsedResponse, ResponseValidator};

/// Lifecycle of one batch.
///
/// `Pending -> InFlight -> {Success, Retry, FailedFallback}`, `Retry -> InFlight`.
/// Batches never dispatched because the run was cancelled end as `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Queued, not yet sent.
    Pending,
    /// Request outstanding.
    InFlight,
    /// Last attempt failed; waiting to resend.
    Retry,
    /// Reply validated; records carry enrichment.
    Success,
    /// Attempts exhausted; records carry the original items flagged as errors.
    FailedFallback,
    /// Never dispatched; records carry the original items flagged as errors.
    Cancelled,
}

/// Final outcome of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Position of the batch in the partition.
    pub id: usize,
    /// Terminal state.
    pub state: BatchState,
    /// Attempts made; zero for cancelled batches.
    pub attempts: usize,
    /// Number of input items in the batch.
    pub size: usize,
    /// Records produced for the batch.
    pub records: Vec<EnrichmentRecord>,
}

/// Per-batch line of a [`DispatchReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    /// Position of the batch in the partition.
    pub id: usize,
    /// Terminal state.
    pub state: BatchState,
    /// Attempts made.
    pub attempts: usize,
    /// Number of input items in the batch.
    pub size: usize,
}

/// Merged records plus per-batch outcomes, ordered by batch id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Deduplicated records in item order.
    pub records: Vec<EnrichmentRecord>,
    /// One entry per batch.
    pub batches: Vec<BatchSummary>,
}

impl DispatchReport {
    /// Batches whose items fell back, including cancelled ones.
    pub fn fallback_batches(&self) -> usize {
        self.batches
            .iter()
            .filter(|batch| {
                matches!(batch.state, BatchState::FailedFallback | BatchState::Cancelled)
            })
            .count()
    }
}

struct Batch {
    id: usize,
    items: Vec<String>,
}

/// Sends canonical items through an [`Enricher`] in fixed-size batches.
///
/// Every attempt, retries included, passes through the dispatcher's [`Pacer`],
/// so spacing holds across `dispatch` calls and across dispatchers sharing one.
pub struct BatchDispatcher<E> {
    enricher: E,
    config: EnrichmentConfig,
    pacer: Arc<Pacer>,
}

impl<E: Enricher> BatchDispatcher<E> {
    /// Validates `config` up front; nothing is sent if it is unusable.
    pub fn new(enricher: E, config: EnrichmentConfig) -> Result<Self> {
        config.validate()?;
        let pacer = Arc::new(Pacer::new(config.delay()));
        Ok(Self {
            enricher,
            config,
            pacer,
        })
    }

    /// Paces requests through `pacer`, typically one shared with other passes.
    pub fn with_pacer(mut self, pacer: Arc<Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Configuration this dispatcher runs under.
    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Enriches every item; the result is sorted and unique by item.
    pub fn process_all(&self, items: &[String]) -> Vec<EnrichmentRecord> {
        self.dispatch(items, &AtomicBool::new(false)).records
    }

    /// Enriches every item, checking `cancel` before each batch is dispatched.
    pub fn dispatch(&self, items: &[String], cancel: &AtomicBool) -> DispatchReport {
        let batches: Vec<Batch> = items
            .chunks(self.config.batch_size())
            .enumerate()
            .map(|(id, chunk)| Batch {
                id,
                items: chunk.to_vec(),
            })
            .collect();
        info!(
            items = items.len(),
            batches = batches.len(),
            batch_size = self.config.batch_size(),
            workers = self.config.concurrency(),
            "dispatching enrichment"
        );
        let mut results = if self.config.concurrency() <= 1 || batches.len() <= 1 {
            self.run_sequential(&batches, cancel)
        } else {
            self.run_concurrent(&batches, cancel)
        };
        results.sort_by_key(|result| result.id);
        let report = merge(results);
        info!(
            records = report.records.len(),
            fallback_batches = report.fallback_batches(),
            "enrichment complete"
        );
        report
    }

    fn run_sequential(&self, batches: &[Batch], cancel: &AtomicBool) -> Vec<BatchResult> {
        let mut results = Vec::with_capacity(batches.len());
        for batch in batches {
            if cancel.load(Ordering::SeqCst) {
                results.push(self.cancelled(batch));
                continue;
            }
            results.push(self.run_batch(batch, cancel));
        }
        results
    }

    fn run_concurrent(&self, batches: &[Batch], cancel: &AtomicBool) -> Vec<BatchResult> {
        let workers = self.config.concurrency().min(batches.len());
        let (task_tx, task_rx) = bounded::<&Batch>(workers * 2);
        let (result_tx, result_rx) = bounded::<BatchResult>(workers * 2);

        thread::scope(|scope| {
            for worker_id in 0..workers {
                let worker_rx = task_rx.clone();
                let worker_tx = result_tx.clone();
                scope.spawn(move || self.worker_loop(worker_id, worker_rx, worker_tx, cancel));
            }
            drop(task_rx);
            drop(result_tx);

            scope.spawn(move || {
                for batch in batches {
                    if task_tx.send(batch).is_err() {
                        break;
                    }
                }
            });

            result_rx.iter().collect()
        })
    }

    fn worker_loop(
        &self,
        worker_id: usize,
        receiver: Receiver<&Batch>,
        sender: Sender<BatchResult>,
        cancel: &AtomicBool,
    ) {
        for batch in receiver.iter() {
            let result = if cancel.load(Ordering::SeqCst) {
                self.cancelled(batch)
            } else {
                debug!(worker = worker_id, batch = batch.id, "worker picked up batch");
                self.run_batch(batch, cancel)
            };
            if sender.send(result).is_err() {
                break;
            }
        }
    }

    fn run_batch(&self, batch: &Batch, cancel: &AtomicBool) -> BatchResult {
        let validator = ResponseValidator::expecting(self.config.mode(), batch.items.len());
        let mut attempts = 0usize;
        loop {
            self.pacer.wait();
            // The deadline may pass while waiting for a slot.
            if attempts == 0 && cancel.load(Ordering::SeqCst) {
                return self.cancelled(batch);
            }
            attempts += 1;
            debug!(
                batch = batch.id,
                attempt = attempts,
                items = batch.items.len(),
                state = ?BatchState::InFlight,
                "sending batch"
            );
            let outcome = self
                .enricher
                .submit(&batch.items, self.config.system_prompt())
                .and_then(|raw| validator.validate(&raw));
            match outcome {
                Ok(parsed) => {
                    debug!(batch = batch.id, attempts, state = ?BatchState::Success, "batch enriched");
                    return BatchResult {
                        id: batch.id,
                        state: BatchState::Success,
                        attempts,
                        size: batch.items.len(),
                        records: self.records_for(batch, parsed),
                    };
                }
                Err(err) if err.is_retryable() && attempts <= self.config.max_retries() => {
                    warn!(
                        batch = batch.id,
                        attempt = attempts,
                        max_retries = self.config.max_retries(),
                        state = ?BatchState::Retry,
                        error = %err,
                        "batch failed; retrying"
                    );
                    if !self.config.retry_delay().is_zero() {
                        thread::sleep(self.config.retry_delay());
                    }
                }
                Err(err) => {
                    let failure = Error::EnrichmentFailed {
                        attempts,
                        last_error: err.to_string(),
                    };
                    error!(
                        batch = batch.id,
                        state = ?BatchState::FailedFallback,
                        error = %failure,
                        "falling back to original items"
                    );
                    return self.fallback(
                        batch,
                        BatchState::FailedFallback,
                        attempts,
                        &failure.to_string(),
                    );
                }
            }
        }
    }

    fn records_for(&self, batch: &Batch, parsed: ParsedResponse) -> Vec<EnrichmentRecord> {
        let model = self.config.model();
        match parsed {
            ParsedResponse::Items(words) => {
                if lemmatize_shrank(&batch.items, words.len()) {
                    warn!(
                        batch = batch.id,
                        sent = batch.items.len(),
                        returned = words.len(),
                        "lemmatize reply dropped most of the batch"
                    );
                }
                words
                    .into_iter()
                    .map(|word| EnrichmentRecord::enriched(word, String::new(), model))
                    .collect()
            }
            ParsedResponse::Analyses(entries) => batch
                .items
                .iter()
                .zip(entries)
                .map(|(item, entry)| EnrichmentRecord::enriched(item.as_str(), entry.analysis, model))
                .collect(),
        }
    }

    fn cancelled(&self, batch: &Batch) -> BatchResult {
        debug!(batch = batch.id, state = ?BatchState::Cancelled, "batch not dispatched");
        self.fallback(batch, BatchState::Cancelled, 0, "cancelled")
    }

    fn fallback(&self, batch: &Batch, state: BatchState, attempts: usize, reason: &str) -> BatchResult {
        BatchResult {
            id: batch.id,
            state,
            attempts,
            size: batch.items.len(),
            records: batch
                .items
                .iter()
                .map(|item| EnrichmentRecord::failed(item.as_str(), self.config.model(), reason))
                .collect(),
        }
    }
}

/// Spaces request start times at least `delay` apart across workers,
/// `dispatch` calls and every dispatcher holding the same instance.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl Pacer {
    /// A pacer that has not yet started any request.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_start: Mutex::new(None),
        }
    }

    /// Minimum spacing between request starts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Blocks until `delay` has passed since the previous start, then records
    /// a new start.
    pub fn wait(&self) {
        let mut last = self.last_start.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.delay {
                thread::sleep(self.delay - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

/// True when a lemmatize reply holds fewer than half as many words as the
/// batch had distinct items, more loss than merging inflections explains.
fn lemmatize_shrank(items: &[String], returned: usize) -> bool {
    let distinct: BTreeSet<&str> = items.iter().map(|item| item.trim()).collect();
    returned * 2 < distinct.len()
}

/// Merges batch results keyed by trimmed item. A successful record replaces
/// an error record for the same item; otherwise the first one wins.
fn merge(results: Vec<BatchResult>) -> DispatchReport {
    let mut merged: BTreeMap<String, EnrichmentRecord> = BTreeMap::new();
    let mut batches = Vec::with_capacity(results.len());
    for result in results {
        batches.push(BatchSummary {
            id: result.id,
            state: result.state,
            attempts: result.attempts,
            size: result.size,
        });
        for record in result.records {
            match merged.entry(record.item.trim().to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(mut slot) => {
                    if slot.get().error && !record.error {
                        slot.insert(record);
                    }
                }
            }
        }
    }
    DispatchReport {
        records: merged.into_values().collect(),
        batches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResponseMode;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    /// Answers analysis batches with one string per item.
    struct EchoEnricher;

    impl Enricher for EchoEnricher {
        fn submit(&self, batch: &[String], _system_prompt: &str) -> Result<String> {
            let analyses: Vec<String> = batch.iter().map(|item| format!("about {item}")).collect();
            Ok(serde_json::to_string(&analyses).expect("encode"))
        }
    }

    /// Fails the first `failures` calls, then echoes.
    struct FlakyEnricher {
        failures: usize,
        calls: AtomicUsize,
    }

    impl Enricher for FlakyEnricher {
        fn submit(&self, batch: &[String], prompt: &str) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(Error::Transport("connection reset".into()));
            }
            EchoEnricher.submit(batch, prompt)
        }
    }

    struct MisconfiguredEnricher {
        calls: AtomicUsize,
    }

    impl Enricher for MisconfiguredEnricher {
        fn submit(&self, _batch: &[String], _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Configuration("no credentials".into()))
        }
    }

    fn config() -> EnrichmentConfig {
        EnrichmentConfig::new("test-model", ResponseMode::Analyze)
            .with_batch_size(2)
            .with_delay(Duration::ZERO)
            .with_retry_delay(Duration::ZERO)
    }

    fn items(words: &[&str]) -> Vec<String> {
        words.iter().map(|word| word.to_string()).collect()
    }

    #[test]
    fn rejects_invalid_config_before_work() {
        let result = BatchDispatcher::new(EchoEnricher, config().with_batch_size(0));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn analyses_map_to_inputs_by_index() {
        let dispatcher = BatchDispatcher::new(EchoEnricher, config()).expect("valid");
        let records = dispatcher.process_all(&items(&["나무", "가족", "다리"]));
        assert_eq!(
            records,
            vec![
                EnrichmentRecord::enriched("가족", "about 가족", "test-model"),
                EnrichmentRecord::enriched("나무", "about 나무", "test-model"),
                EnrichmentRecord::enriched("다리", "about 다리", "test-model"),
            ]
        );
    }

    #[test]
    fn retries_until_success() {
        let enricher = FlakyEnricher {
            failures: 2,
            calls: AtomicUsize::new(0),
        };
        let dispatcher = BatchDispatcher::new(&enricher, config()).expect("valid");
        let report = dispatcher.dispatch(&items(&["사과"]), &AtomicBool::new(false));
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.batches[0].state, BatchState::Success);
        assert_eq!(report.batches[0].attempts, 3);
        assert!(!report.records[0].error);
    }

    #[test]
    fn exhausted_retries_fall_back() {
        let enricher = FlakyEnricher {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let dispatcher =
            BatchDispatcher::new(&enricher, config().with_max_retries(1)).expect("valid");
        let report = dispatcher.dispatch(&items(&["사과"]), &AtomicBool::new(false));
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.batches[0].state, BatchState::FailedFallback);
        assert_eq!(
            report.records[0].analysis,
            "Error: enrichment failed after 2 attempt(s): enrichment transport error: connection reset"
        );
    }

    #[test]
    fn non_retryable_errors_fall_back_immediately() {
        let enricher = MisconfiguredEnricher {
            calls: AtomicUsize::new(0),
        };
        let dispatcher = BatchDispatcher::new(&enricher, config()).expect("valid");
        let records = dispatcher.process_all(&items(&["사과", "포도"]));
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
        assert!(records.iter().all(|record| record.error));
    }

    #[test]
    fn success_replaces_earlier_error_for_same_item() {
        let enricher = FlakyEnricher {
            failures: 1,
            calls: AtomicUsize::new(0),
        };
        let config = config().with_batch_size(1).with_max_retries(0);
        let dispatcher = BatchDispatcher::new(&enricher, config).expect("valid");
        let report = dispatcher.dispatch(&items(&["사과", "포도", " 사과"]), &AtomicBool::new(false));
        assert_eq!(report.batches[0].state, BatchState::FailedFallback);
        assert_eq!(report.records.len(), 2);
        assert!(report.records.iter().all(|record| !record.error));
    }

    #[test]
    fn preset_cancel_dispatches_nothing() {
        let enricher = FlakyEnricher {
            failures: 0,
            calls: AtomicUsize::new(0),
        };
        let dispatcher = BatchDispatcher::new(&enricher, config()).expect("valid");
        let report = dispatcher.dispatch(&items(&["a", "b", "c"]), &AtomicBool::new(true));
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.fallback_batches(), 2);
        assert!(report
            .batches
            .iter()
            .all(|batch| batch.state == BatchState::Cancelled && batch.attempts == 0));
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records[0].analysis, "Error: cancelled");
    }

    #[test]
    fn concurrent_workers_cover_every_batch() {
        let enricher = FlakyEnricher {
            failures: 0,
            calls: AtomicUsize::new(0),
        };
        let words: Vec<String> = (0..9).map(|idx| format!("단어{idx}")).collect();
        let dispatcher =
            BatchDispatcher::new(&enricher, config().with_concurrency(3)).expect("valid");
        let report = dispatcher.dispatch(&words, &AtomicBool::new(false));
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 5);
        let ids: Vec<usize> = report.batches.iter().map(|batch| batch.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(report.batches.iter().map(|batch| batch.size).sum::<usize>(), 9);
        assert_eq!(report.records.len(), 9);
    }

    #[test]
    fn lemmatize_shrink_ignores_duplicates() {
        let batch = items(&["사과", "사과 ", "포도", "배"]);
        assert!(!lemmatize_shrank(&batch, 2));
        assert!(lemmatize_shrank(&batch, 1));
        assert!(!lemmatize_shrank(&items(&["먹어요", "먹었다"]), 1));
    }

    #[test]
    fn deadline_during_pacing_cancels_batch() {
        let enricher = FlakyEnricher {
            failures: 0,
            calls: AtomicUsize::new(0),
        };
        let config = config().with_batch_size(1).with_delay(Duration::from_millis(80));
        let dispatcher = BatchDispatcher::new(&enricher, config).expect("valid");
        let cancel = AtomicBool::new(false);
        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(30));
                cancel.store(true, Ordering::SeqCst);
            });
            let report = dispatcher.dispatch(&items(&["사과", "포도"]), &cancel);
            let states: Vec<BatchState> = report.batches.iter().map(|batch| batch.state).collect();
            assert_eq!(states, vec![BatchState::Success, BatchState::Cancelled]);
        });
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retries_wait_for_the_pacer() {
        let enricher = FlakyEnricher {
            failures: 1,
            calls: AtomicUsize::new(0),
        };
        let config = config().with_delay(Duration::from_millis(40));
        let dispatcher = BatchDispatcher::new(&enricher, config).expect("valid");
        let started = Instant::now();
        let report = dispatcher.dispatch(&items(&["사과"]), &AtomicBool::new(false));
        assert_eq!(report.batches[0].attempts, 2);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn pacer_spaces_consecutive_starts() {
        let pacer = Pacer::new(Duration::from_millis(30));
        let started = Instant::now();
        pacer.wait();
        pacer.wait();
        pacer.wait();
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
