use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use wordsift::{
    BatchDispatcher, BatchState, Enricher, EnrichmentConfig, EnrichmentRecord, Error, Pacer,
    ResponseMode, Result,
};

/// Records every batch it sees and replies with a scripted answer.
struct ScriptedEnricher<F> {
    reply: F,
    calls: Mutex<Vec<(Instant, Vec<String>)>>,
}

impl<F> ScriptedEnricher<F>
where
    F: Fn(&[String]) -> Result<String> + Send + Sync,
{
    fn new(reply: F) -> Self {
        Self {
            reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn batches(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|(_, batch)| batch.clone())
            .collect()
    }

    fn starts(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }
}

impl<F> Enricher for ScriptedEnricher<F>
where
    F: Fn(&[String]) -> Result<String> + Send + Sync,
{
    fn submit(&self, batch: &[String], _system_prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((Instant::now(), batch.to_vec()));
        (self.reply)(batch)
    }
}

fn items(words: &[&str]) -> Vec<String> {
    words.iter().map(|word| word.to_string()).collect()
}

fn fast(mode: ResponseMode, batch_size: usize) -> EnrichmentConfig {
    EnrichmentConfig::new("test-model", mode)
        .with_batch_size(batch_size)
        .with_delay(Duration::ZERO)
        .with_retry_delay(Duration::ZERO)
}

#[test]
fn total_failure_keeps_every_item() {
    let enricher = ScriptedEnricher::new(|_: &[String]| Err(Error::Transport("service down".into())));
    let config = fast(ResponseMode::Analyze, 2).with_max_retries(0);
    let dispatcher = BatchDispatcher::new(&enricher, config).expect("valid config");

    let report = dispatcher.dispatch(&items(&["a", "b", "c", "d", "e"]), &AtomicBool::new(false));

    assert_eq!(
        enricher.batches(),
        vec![items(&["a", "b"]), items(&["c", "d"]), items(&["e"])]
    );
    let returned: Vec<&str> = report.records.iter().map(|r| r.item.as_str()).collect();
    assert_eq!(returned, vec!["a", "b", "c", "d", "e"]);
    assert!(report.records.iter().all(|record| record.error));
    assert!(report
        .records
        .iter()
        .all(|record| record.analysis.starts_with("Error: ")));
    assert!(report
        .batches
        .iter()
        .all(|batch| batch.state == BatchState::FailedFallback));
}

#[test]
fn retries_are_bounded_per_batch() {
    let enricher = ScriptedEnricher::new(|_: &[String]| Err(Error::Transport("timeout".into())));
    let config = fast(ResponseMode::Analyze, 2).with_max_retries(3);
    let dispatcher = BatchDispatcher::new(&enricher, config).expect("valid config");

    let report = dispatcher.dispatch(&items(&["a", "b", "c"]), &AtomicBool::new(false));

    assert_eq!(enricher.batches().len(), 8);
    assert!(report.batches.iter().all(|batch| batch.attempts == 4));
}

#[test]
fn issues_one_call_per_batch() {
    for (count, batch_size) in [(0usize, 3usize), (1, 3), (6, 3), (7, 3), (10, 1), (4, 10)] {
        let enricher = ScriptedEnricher::new(|batch: &[String]| {
            Ok(serde_json::to_string(&batch.iter().map(|i| format!("{i}!")).collect::<Vec<_>>())
                .expect("encode"))
        });
        let words: Vec<String> = (0..count).map(|idx| format!("word{idx:02}")).collect();
        let dispatcher =
            BatchDispatcher::new(&enricher, fast(ResponseMode::Analyze, batch_size).with_max_retries(0))
                .expect("valid config");

        let report = dispatcher.dispatch(&words, &AtomicBool::new(false));

        assert_eq!(enricher.batches().len(), count.div_ceil(batch_size));
        assert!(enricher.batches().iter().all(|batch| batch.len() <= batch_size));
        assert_eq!(report.batches.iter().map(|batch| batch.size).sum::<usize>(), count);
        assert_eq!(report.records.len(), count);
    }
}

#[test]
fn wrapped_replies_are_recovered() {
    let enricher = ScriptedEnricher::new(|_: &[String]| {
        Ok("Sure! Here are the base forms:\n```json\n[\"먹다\", \"학교\"]\n```\nLet me know.".into())
    });
    let config = fast(ResponseMode::Lemmatize, 10).with_max_retries(0);
    let dispatcher = BatchDispatcher::new(&enricher, config).expect("valid config");

    let records = dispatcher.process_all(&items(&["먹었어요", "학교에서"]));

    assert_eq!(
        records,
        vec![
            EnrichmentRecord::enriched("먹다", "", "test-model"),
            EnrichmentRecord::enriched("학교", "", "test-model"),
        ]
    );
}

#[test]
fn malformed_replies_are_retried() {
    let attempts = AtomicUsize::new(0);
    let enricher = ScriptedEnricher::new(|batch: &[String]| {
        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok("I'm sorry, I can't help with that.".into())
        } else {
            Ok(serde_json::to_string(batch).expect("encode"))
        }
    });
    let dispatcher =
        BatchDispatcher::new(&enricher, fast(ResponseMode::Analyze, 5)).expect("valid config");

    let report = dispatcher.dispatch(&items(&["사과", "포도"]), &AtomicBool::new(false));

    assert_eq!(report.batches[0].state, BatchState::Success);
    assert_eq!(report.batches[0].attempts, 2);
    assert!(report.records.iter().all(|record| !record.error));
}

#[test]
fn lemmatize_output_is_sorted_and_unique() {
    let enricher = ScriptedEnricher::new(|batch: &[String]| {
        let stems: Vec<&str> = batch
            .iter()
            .map(|word| if word.starts_with('먹') { "먹다" } else { "가다" })
            .collect();
        Ok(serde_json::to_string(&stems).expect("encode"))
    });
    let dispatcher =
        BatchDispatcher::new(&enricher, fast(ResponseMode::Lemmatize, 2)).expect("valid config");

    let records = dispatcher.process_all(&items(&["먹어요", "갔다", "먹었다", "가요"]));
    let words: Vec<&str> = records.iter().map(|record| record.item.as_str()).collect();

    assert_eq!(words, vec!["가다", "먹다"]);
}

#[test]
fn sequential_batches_are_paced() {
    let enricher = ScriptedEnricher::new(|batch: &[String]| {
        Ok(serde_json::to_string(batch).expect("encode"))
    });
    let config = fast(ResponseMode::Analyze, 1).with_delay(Duration::from_millis(40));
    let dispatcher = BatchDispatcher::new(&enricher, config).expect("valid config");

    dispatcher.process_all(&items(&["가", "나", "다"]));

    let starts = enricher.starts();
    assert_eq!(starts.len(), 3);
    for pair in starts.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(40));
    }
}

#[test]
fn concurrent_batches_are_paced() {
    let enricher = ScriptedEnricher::new(|batch: &[String]| {
        Ok(serde_json::to_string(batch).expect("encode"))
    });
    let config = fast(ResponseMode::Analyze, 1)
        .with_delay(Duration::from_millis(30))
        .with_concurrency(4);
    let dispatcher = BatchDispatcher::new(&enricher, config).expect("valid config");

    let records = dispatcher.process_all(&items(&["가", "나", "다", "라", "마"]));

    assert_eq!(records.len(), 5);
    let mut starts = enricher.starts();
    starts.sort();
    for pair in starts.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(25));
    }
}

#[test]
fn pacing_carries_across_dispatch_calls() {
    let enricher = ScriptedEnricher::new(|batch: &[String]| {
        Ok(serde_json::to_string(batch).expect("encode"))
    });
    let config = fast(ResponseMode::Analyze, 10).with_delay(Duration::from_millis(60));
    let dispatcher = BatchDispatcher::new(&enricher, config).expect("valid config");

    dispatcher.process_all(&items(&["가"]));
    dispatcher.process_all(&items(&["나"]));

    let starts = enricher.starts();
    assert_eq!(starts.len(), 2);
    assert!(starts[1].duration_since(starts[0]) >= Duration::from_millis(60));
}

#[test]
fn dispatchers_sharing_a_pacer_stay_spaced() {
    let enricher = ScriptedEnricher::new(|batch: &[String]| {
        Ok(serde_json::to_string(batch).expect("encode"))
    });
    let pacer = Arc::new(Pacer::new(Duration::from_millis(60)));
    let vocabulary = BatchDispatcher::new(&enricher, fast(ResponseMode::Analyze, 10))
        .expect("valid config")
        .with_pacer(Arc::clone(&pacer));
    let grammar = BatchDispatcher::new(&enricher, fast(ResponseMode::Analyze, 5))
        .expect("valid config")
        .with_pacer(Arc::clone(&pacer));

    vocabulary.process_all(&items(&["가족"]));
    grammar.process_all(&items(&["문법: 지만\n예문: 좋지만 비싸요."]));

    let starts = enricher.starts();
    assert_eq!(starts.len(), 2);
    assert!(starts[1].duration_since(starts[0]) >= Duration::from_millis(60));
}

#[test]
fn cancelled_runs_still_emit_every_item() {
    let cancel = AtomicBool::new(false);
    let enricher = ScriptedEnricher::new(|batch: &[String]| {
        cancel.store(true, Ordering::SeqCst);
        Ok(serde_json::to_string(batch).expect("encode"))
    });
    let dispatcher =
        BatchDispatcher::new(&enricher, fast(ResponseMode::Analyze, 2)).expect("valid config");

    let report = dispatcher.dispatch(&items(&["a", "b", "c", "d", "e"]), &cancel);

    assert_eq!(enricher.batches().len(), 1);
    let states: Vec<BatchState> = report.batches.iter().map(|batch| batch.state).collect();
    assert_eq!(
        states,
        vec![BatchState::Success, BatchState::Cancelled, BatchState::Cancelled]
    );
    assert_eq!(report.records.len(), 5);
    assert_eq!(report.records.iter().filter(|record| record.error).count(), 3);
}
