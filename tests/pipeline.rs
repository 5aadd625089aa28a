use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use feedsift::config::Config;
use feedsift::error::{FetchError, OracleError};
use feedsift::models::{Item, RawJudgment, RelevanceLabel};
use feedsift::oracle::{DisabledOracle, KeywordOracle, RelevanceOracle};
use feedsift::pipeline::{Pipeline, PipelineOptions};
use feedsift::scheduler::{CancelHandle, CancelToken, ScheduleOptions, Scheduler};
use feedsift::sources::Source;
use feedsift::store::memory::InMemoryStore;
use feedsift::store::sqlite::SqliteStore;
use feedsift::store::{ItemStore, QueryLedger};

struct StaticSource {
    name: String,
    items: Result<Vec<Item>, String>,
    delay: Duration,
}

impl StaticSource {
    fn ok(name: &str, items: Vec<Item>) -> Self {
        Self {
            name: name.to_string(),
            items: Ok(items),
            delay: Duration::ZERO,
        }
    }

    fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Err("connection refused".to_string()),
            delay: Duration::ZERO,
        }
    }

    fn slow(name: &str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::ok(name, Vec::new())
        }
    }
}

#[async_trait]
impl Source for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        "https://example.invalid/rss"
    }

    async fn consume(&self) -> Result<Vec<Item>, FetchError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.items.clone().map_err(FetchError::Parse)
    }
}

/// Oracle answering from a fixed script, in call order.
struct ScriptedOracle {
    answers: Vec<Result<RawJudgment, String>>,
    next: AtomicUsize,
    delay: Duration,
}

impl ScriptedOracle {
    fn new(answers: Vec<Result<RawJudgment, String>>) -> Self {
        Self {
            answers,
            next: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl RelevanceOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn evaluate(&self, _content: &str, _query: &str) -> Result<RawJudgment, OracleError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        match self.answers.get(i % self.answers.len()) {
            Some(Ok(raw)) => Ok(raw.clone()),
            Some(Err(msg)) => Err(OracleError::Request(msg.clone())),
            None => Err(OracleError::Request("no answer scripted".to_string())),
        }
    }
}

fn item(source: &str, id: &str, title: &str, content: &str) -> Item {
    let mut item = Item::new(source, Some(id), &format!("https://{}/{}", source, id), title);
    item.content = content.to_string();
    item
}

fn options() -> PipelineOptions {
    PipelineOptions {
        source_delay: Duration::ZERO,
        ..PipelineOptions::default()
    }
}

fn pipeline<S>(store: Arc<S>, oracle: Arc<dyn RelevanceOracle>, options: PipelineOptions) -> Pipeline
where
    S: ItemStore + QueryLedger + 'static,
{
    Pipeline::new(store.clone(), store, oracle, options)
}

async fn sqlite_store(tmp: &TempDir) -> Arc<SqliteStore> {
    let config = Config::minimal(tmp.path().join("sift.sqlite"));
    Arc::new(SqliteStore::open(&config).await.unwrap())
}

#[tokio::test]
async fn test_end_to_end_two_sources_one_query() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let query = store.add_query("rust compiler release").await.unwrap();

    let a = item("Source A", "a-1", "Rust compiler release", "The new rust compiler release is out.");
    let b = item("Source B", "b-1", "Gardening", "Tomatoes need sun.");
    let sources: Vec<Box<dyn Source>> = vec![
        Box::new(StaticSource::ok("Source A", vec![a.clone()])),
        Box::new(StaticSource::ok("Source B", vec![b])),
    ];

    let p = pipeline(store.clone(), Arc::new(KeywordOracle::new(false)), options());
    let stats = p.run(&sources, &CancelToken::never()).await;

    assert_eq!(stats.total_sources, 2);
    assert_eq!(stats.total_items, 2);
    assert_eq!(stats.total_stored, 2);
    assert_eq!(stats.total_evaluated, 2);
    assert_eq!(stats.total_records_stored, 2);
    assert_eq!(stats.total_resolved, 1);
    assert_eq!(stats.failed_sources, 0);
    assert!(!stats.cancelled);

    let db = store.stats().await.unwrap();
    assert_eq!(db.item_count, 2);
    assert_eq!(db.record_count, 2);
    assert_eq!(db.source_count, 2);

    let resolved = store
        .list_queries()
        .await
        .unwrap()
        .into_iter()
        .find(|q| q.id == query.id)
        .unwrap();
    assert_eq!(resolved.resolved_by_item_identity(), Some(a.identity.as_str()));

    let hits = store
        .relevant_items("rust compiler release", 50, 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0.identity, "a-1");
}

#[tokio::test]
async fn test_second_run_stores_nothing_new() {
    let store = Arc::new(InMemoryStore::new());
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StaticSource::ok(
        "A",
        vec![item("A", "1", "t", "c"), item("A", "2", "t", "c")],
    ))];
    let p = pipeline(store.clone(), Arc::new(KeywordOracle::new(false)), options());

    let first = p.run(&sources, &CancelToken::never()).await;
    let second = p.run(&sources, &CancelToken::never()).await;
    assert_eq!(first.total_stored, 2);
    assert_eq!(second.total_items, 2);
    assert_eq!(second.total_stored, 0);
    assert_eq!(store.stats().await.unwrap().item_count, 2);
}

#[tokio::test]
async fn test_failing_source_is_isolated() {
    let store = Arc::new(InMemoryStore::new());
    let sources: Vec<Box<dyn Source>> = vec![
        Box::new(StaticSource::failing("A")),
        Box::new(StaticSource::ok(
            "B",
            vec![item("B", "1", "t", "c"), item("B", "2", "t", "c")],
        )),
    ];
    let p = pipeline(store.clone(), Arc::new(KeywordOracle::new(false)), options());
    let stats = p.run(&sources, &CancelToken::never()).await;

    assert_eq!(stats.failed_sources, 1);
    let a = &stats.per_source[0];
    assert_eq!(a.source, "A");
    assert!(a.error.as_deref().unwrap().contains("connection refused"));
    let b = &stats.per_source[1];
    assert!(b.error.is_none());
    assert_eq!(b.items_stored, 2);
    assert_eq!(store.stats().await.unwrap().item_count, 2);

    // Only the successful source is recorded as consumed.
    let known = store.list_sources().await.unwrap();
    assert_eq!(known.len(), 1);
    assert_eq!(known[0].name, "B");
}

#[tokio::test]
async fn test_first_matching_item_wins() {
    let store = Arc::new(InMemoryStore::new());
    store.add_query("rust").await.unwrap();

    let items: Vec<Item> = (1..=4)
        .map(|i| item("A", &format!("m-{}", i), "Rust", "rust everywhere"))
        .collect();
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StaticSource::ok("A", items))];
    let p = pipeline(store.clone(), Arc::new(KeywordOracle::new(false)), options());
    let stats = p.run(&sources, &CancelToken::never()).await;

    // Every pair is still judged and recorded; only one resolution succeeds.
    assert_eq!(stats.total_evaluated, 4);
    assert_eq!(stats.total_records_stored, 4);
    assert_eq!(stats.total_resolved, 1);
    let q = &store.list_queries().await.unwrap()[0];
    assert_eq!(q.resolved_by_item_identity(), Some("m-1"));

    // Resolved queries are not evaluated again.
    let more: Vec<Box<dyn Source>> = vec![Box::new(StaticSource::ok(
        "B",
        vec![item("B", "late", "Rust", "rust")],
    ))];
    let again = p.run(&more, &CancelToken::never()).await;
    assert_eq!(again.total_evaluated, 0);
    assert_eq!(again.total_resolved, 0);
}

#[tokio::test]
async fn test_score_floor_is_inclusive() {
    let store = Arc::new(InMemoryStore::new());
    store.add_query("below").await.unwrap();
    store.add_query("at").await.unwrap();

    let oracle = ScriptedOracle::new(vec![
        Ok(RawJudgment::Text("Relevance Score: 49\nRelevance: Partially".to_string())),
        Ok(RawJudgment::Text("Relevance Score: 50\nRelevance: Yes".to_string())),
    ]);
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StaticSource::ok(
        "A",
        vec![item("A", "1", "t", "c")],
    ))];
    let p = pipeline(store.clone(), Arc::new(oracle), options());
    let stats = p.run(&sources, &CancelToken::never()).await;

    assert_eq!(stats.total_resolved, 1);
    let open: Vec<String> = store
        .list_open()
        .await
        .unwrap()
        .into_iter()
        .map(|q| q.text)
        .collect();
    assert_eq!(open, vec!["below".to_string()]);
}

#[tokio::test]
async fn test_boolean_judgment_resolves() {
    let store = Arc::new(InMemoryStore::new());
    store.add_query("did it happen").await.unwrap();
    let oracle = ScriptedOracle::new(vec![
        Ok(RawJudgment::Match(false)),
        Ok(RawJudgment::Match(true)),
    ]);
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StaticSource::ok(
        "A",
        vec![item("A", "no", "t", "c"), item("A", "yes", "t", "c")],
    ))];
    let p = pipeline(store.clone(), Arc::new(oracle), options());
    p.run(&sources, &CancelToken::never()).await;

    let q = &store.list_queries().await.unwrap()[0];
    assert_eq!(q.resolved_by_item_identity(), Some("yes"));
}

#[tokio::test]
async fn test_negative_answers_never_resolve_at_zero_floor() {
    let store = Arc::new(InMemoryStore::new());
    store.add_query("q").await.unwrap();
    let oracle = ScriptedOracle::new(vec![
        Ok(RawJudgment::Match(false)),
        Ok(RawJudgment::Text("I am not sure what you mean.".to_string())),
        Ok(RawJudgment::Text("Relevance Score: 0\nRelevance: No".to_string())),
    ]);
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StaticSource::ok(
        "A",
        vec![
            item("A", "bool-no", "t", "c"),
            item("A", "garbage", "t", "c"),
            item("A", "zero", "t", "c"),
        ],
    ))];
    let options = PipelineOptions {
        min_relevance_score: 0,
        ..options()
    };
    let p = pipeline(store.clone(), Arc::new(oracle), options);
    let stats = p.run(&sources, &CancelToken::never()).await;

    assert_eq!(stats.total_evaluated, 3);
    assert_eq!(stats.total_resolved, 0);
    let q = &store.list_queries().await.unwrap()[0];
    assert!(q.is_open());
}

#[tokio::test]
async fn test_keyword_oracle_ignores_field_labels() {
    let store = Arc::new(InMemoryStore::new());
    store.add_query("content moderation").await.unwrap();
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StaticSource::ok(
        "A",
        vec![item("A", "garden", "Gardening", "Tomatoes need sun.")],
    ))];
    let p = pipeline(store.clone(), Arc::new(KeywordOracle::new(false)), options());
    let stats = p.run(&sources, &CancelToken::never()).await;

    assert_eq!(stats.total_evaluated, 1);
    assert_eq!(stats.total_resolved, 0);
    assert_eq!(store.list_open().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_oracle_error_becomes_error_record() {
    let store = Arc::new(InMemoryStore::new());
    store.add_query("q").await.unwrap();
    let oracle = ScriptedOracle::new(vec![
        Err("model unavailable".to_string()),
        Ok(RawJudgment::Text("Relevance Score: 10\nRelevance: No".to_string())),
    ]);
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StaticSource::ok(
        "A",
        vec![item("A", "1", "t", "c"), item("A", "2", "t", "c")],
    ))];
    let p = pipeline(store.clone(), Arc::new(oracle), options());
    let stats = p.run(&sources, &CancelToken::never()).await;

    assert_eq!(stats.failed_sources, 0);
    assert_eq!(stats.total_evaluated, 2);
    assert_eq!(stats.total_records_stored, 2);
    assert_eq!(stats.per_source[0].judgment_errors, 1);
    assert_eq!(stats.total_resolved, 0);

    let records = store.relevant_items("q", 0, 10).await.unwrap();
    let error = records
        .iter()
        .find(|(_, r)| r.label == RelevanceLabel::Error)
        .unwrap();
    assert_eq!(error.0.identity, "1");
    assert!(error.1.raw_response.contains("model unavailable"));
}

#[tokio::test]
async fn test_disabled_oracle_records_errors_only() {
    let store = Arc::new(InMemoryStore::new());
    store.add_query("q").await.unwrap();
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StaticSource::ok(
        "A",
        vec![item("A", "1", "t", "c")],
    ))];
    let p = pipeline(store.clone(), Arc::new(DisabledOracle), options());
    let stats = p.run(&sources, &CancelToken::never()).await;
    assert_eq!(stats.total_records_stored, 1);
    assert_eq!(stats.total_resolved, 0);
    assert_eq!(store.list_open().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_oracle_timeout_is_per_pair() {
    let store = Arc::new(InMemoryStore::new());
    store.add_query("q").await.unwrap();
    let mut oracle = ScriptedOracle::new(vec![Ok(RawJudgment::Match(true))]);
    oracle.delay = Duration::from_secs(5);
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StaticSource::ok(
        "A",
        vec![item("A", "1", "t", "c")],
    ))];
    let p = pipeline(
        store.clone(),
        Arc::new(oracle),
        PipelineOptions {
            oracle_timeout: Duration::from_millis(50),
            ..options()
        },
    );
    let stats = p.run(&sources, &CancelToken::never()).await;

    assert_eq!(stats.failed_sources, 0);
    assert_eq!(stats.per_source[0].judgment_errors, 1);
    let records = store.relevant_items("q", 0, 10).await.unwrap();
    assert_eq!(records[0].1.label, RelevanceLabel::Error);
    assert!(records[0].1.raw_response.contains("timed out"));
    assert_eq!(store.list_open().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_fetch_timeout_fails_only_that_source() {
    let store = Arc::new(InMemoryStore::new());
    let sources: Vec<Box<dyn Source>> = vec![
        Box::new(StaticSource::slow("Slow", Duration::from_secs(5))),
        Box::new(StaticSource::ok("Fast", vec![item("Fast", "1", "t", "c")])),
    ];
    let p = pipeline(
        store.clone(),
        Arc::new(KeywordOracle::new(false)),
        PipelineOptions {
            fetch_timeout: Duration::from_millis(50),
            ..options()
        },
    );
    let stats = p.run(&sources, &CancelToken::never()).await;

    assert_eq!(stats.failed_sources, 1);
    assert!(stats.per_source[0]
        .error
        .as_deref()
        .unwrap()
        .contains("timed out"));
    assert_eq!(stats.per_source[1].items_stored, 1);
}

#[tokio::test]
async fn test_cancelled_before_run() {
    let store = Arc::new(InMemoryStore::new());
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StaticSource::ok(
        "A",
        vec![item("A", "1", "t", "c")],
    ))];
    let handle = CancelHandle::new();
    handle.cancel();

    let p = pipeline(store.clone(), Arc::new(KeywordOracle::new(false)), options());
    let stats = p.run(&sources, &handle.token()).await;

    assert!(stats.cancelled);
    assert_eq!(stats.total_sources, 0);
    assert_eq!(store.stats().await.unwrap().item_count, 0);
}

#[tokio::test]
async fn test_cancel_during_source_delay() {
    let store = Arc::new(InMemoryStore::new());
    let sources: Vec<Box<dyn Source>> = vec![
        Box::new(StaticSource::ok("A", vec![item("A", "1", "t", "c")])),
        Box::new(StaticSource::ok("B", vec![item("B", "1", "t", "c")])),
    ];
    let p = pipeline(
        store.clone(),
        Arc::new(KeywordOracle::new(false)),
        PipelineOptions {
            source_delay: Duration::from_secs(60),
            ..options()
        },
    );

    let handle = CancelHandle::new();
    let token = handle.token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });

    let stats = tokio::time::timeout(Duration::from_secs(5), p.run(&sources, &token))
        .await
        .unwrap();
    assert!(stats.cancelled);
    assert_eq!(stats.total_sources, 1);
    assert_eq!(store.stats().await.unwrap().item_count, 1);
}

#[tokio::test]
async fn test_scheduler_stops_at_max_runs() {
    let store = Arc::new(InMemoryStore::new());
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StaticSource::ok(
        "A",
        vec![item("A", "1", "t", "c")],
    ))];
    let p = pipeline(store.clone(), Arc::new(KeywordOracle::new(false)), options());
    let scheduler = Scheduler::new(
        p,
        sources,
        ScheduleOptions {
            interval: Duration::from_millis(10),
            max_runs: Some(3),
            cleanup_enabled: true,
            cleanup_days: 30,
        },
    );

    let mut seen = Vec::new();
    let summary = scheduler
        .run(&CancelToken::never(), |run, stats| {
            seen.push((run, stats.total_stored))
        })
        .await;

    assert_eq!(summary.runs_completed, 3);
    assert!(!summary.cancelled);
    assert_eq!(seen, vec![(1, 1), (2, 0), (3, 0)]);
}

#[tokio::test]
async fn test_scheduler_cleanup_removes_stale_items() {
    let store = Arc::new(InMemoryStore::new());
    let mut stale = item("Old", "old", "t", "c");
    stale.fetched_at = chrono::Utc::now() - chrono::Duration::days(40);
    store.store_items(&[stale]).await.unwrap();

    let p = pipeline(store.clone(), Arc::new(KeywordOracle::new(false)), options());
    let scheduler = Scheduler::new(
        p,
        Vec::new(),
        ScheduleOptions {
            interval: Duration::from_millis(10),
            max_runs: Some(1),
            cleanup_enabled: true,
            cleanup_days: 30,
        },
    );
    let summary = scheduler.run(&CancelToken::never(), |_, _| {}).await;

    assert_eq!(summary.items_removed, 1);
    assert_eq!(store.stats().await.unwrap().item_count, 0);
}

#[tokio::test]
async fn test_scheduler_cancel_interrupts_sleep() {
    let store = Arc::new(InMemoryStore::new());
    let p = pipeline(store, Arc::new(KeywordOracle::new(false)), options());
    let scheduler = Scheduler::new(
        p,
        Vec::new(),
        ScheduleOptions {
            interval: Duration::from_secs(3600),
            max_runs: None,
            cleanup_enabled: false,
            cleanup_days: 30,
        },
    );

    let handle = CancelHandle::new();
    let token = handle.token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        scheduler.run(&token, |_, _| {}),
    )
    .await
    .unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.runs_completed, 1);
}
