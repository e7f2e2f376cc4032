use std::collections::VecDeque;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinSet};
use tracing::dispatcher::{self, Dispatch};
use tracing::instrument::WithSubscriber;
use tracing::{error, info};

use crate::error::ScrapeError;
use crate::fetch::PageFetcher;
use crate::parser::PageExtractor;
use crate::table::{FieldSchema, Record, ResultSet, WorkItem};

pub const DEFAULT_MAX_WORKERS: usize = 50;

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Upper bound on concurrent fetch+extract pipelines.
    pub max_workers: usize,
    pub show_progress: bool,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            show_progress: false,
        }
    }
}

/// A ticker that was dropped from the batch.
#[derive(Debug, Clone)]
pub struct Failure {
    pub id: String,
    pub url: String,
    pub error: String,
}

/// Everything the batch produced, returned once every item is settled.
#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub results: ResultSet,
    pub failures: Vec<Failure>,
    /// Number of workers spawned (0 for an empty batch).
    pub workers: usize,
}

enum Outcome {
    Scraped(Record),
    Failed(Failure),
}

/// Shared state handed to every worker.
struct Pipeline {
    queue: Mutex<VecDeque<WorkItem>>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn PageExtractor>,
    schema: Arc<FieldSchema>,
}

/// Scrape every item with a bounded pool of workers and collect the
/// results. Per-item failures are logged and reported, never fatal.
/// Returns only after every item has succeeded or failed.
pub async fn run(
    items: Vec<WorkItem>,
    opts: &ScrapeOptions,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn PageExtractor>,
    schema: Arc<FieldSchema>,
) -> ScrapeReport {
    let total = items.len();
    if total == 0 {
        info!("No tickers to scrape");
        return ScrapeReport::default();
    }

    let workers = opts.max_workers.max(1).min(total);
    let pipeline = Arc::new(Pipeline {
        queue: Mutex::new(VecDeque::from(items)),
        fetcher,
        extractor,
        schema,
    });
    let pb = progress_bar(total, opts.show_progress);

    // Channel: workers send outcomes, this task is the only writer of the ResultSet
    let (tx, mut rx) = mpsc::channel::<Outcome>(workers * 2);

    info!("Scraping {} tickers with {} workers", total, workers);
    let mut set = JoinSet::new();
    for _ in 0..workers {
        let pipeline = Arc::clone(&pipeline);
        let tx = tx.clone();
        set.spawn(work(pipeline, tx).with_current_subscriber());
    }

    // Drop our copy of tx so rx closes when all workers exit
    drop(tx);

    let mut results = ResultSet::new();
    let mut failures = Vec::new();
    while let Some(outcome) = rx.recv().await {
        match outcome {
            Outcome::Scraped(record) => {
                results.insert(record);
            }
            Outcome::Failed(failure) => failures.push(failure),
        }
        pb.inc(1);
    }

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            error!("Worker aborted: {}", e);
        }
    }

    pb.finish_and_clear();
    info!(
        "All workers closed: {} scraped, {} failed, {} total",
        results.len(),
        failures.len(),
        total
    );

    ScrapeReport {
        results,
        failures,
        workers,
    }
}

async fn work(pipeline: Arc<Pipeline>, tx: mpsc::Sender<Outcome>) {
    loop {
        let next = pipeline.queue.lock().await.pop_front();
        let Some(item) = next else { break };

        // Own task per item so a panic settles the item instead of the worker
        let task = tokio::spawn(scrape_one(Arc::clone(&pipeline), item.clone()).with_current_subscriber());
        let result = match task.await {
            Ok(r) => r,
            Err(e) => Err(aborted(&item.id, e)),
        };

        let outcome = match result {
            Ok(record) => Outcome::Scraped(record),
            Err(e) => {
                error!(ticker = %item.id, "Ticker not scraped: {}", e);
                Outcome::Failed(Failure {
                    id: item.id,
                    url: item.url,
                    error: e.to_string(),
                })
            }
        };

        if tx.send(outcome).await.is_err() {
            break;
        }
    }
}

async fn scrape_one(pipeline: Arc<Pipeline>, item: WorkItem) -> Result<Record, ScrapeError> {
    let body = pipeline.fetcher.fetch(&item.url).await?;

    // HTML parsing is CPU-bound; keep it off the runtime threads
    let dispatch = dispatcher::get_default(Dispatch::clone);
    let id = item.id.clone();
    let parsed = tokio::task::spawn_blocking(move || {
        dispatcher::with_default(&dispatch, || {
            pipeline.extractor.extract(&item.id, &body, &pipeline.schema)
        })
    })
    .await
    .map_err(|e| aborted(&id, e))?;
    Ok(parsed?)
}

fn aborted(id: &str, e: JoinError) -> ScrapeError {
    let reason = if e.is_panic() {
        let payload = e.into_panic();
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string())
    } else {
        e.to_string()
    };
    ScrapeError::Aborted {
        id: id.to_string(),
        reason,
    }
}

fn progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

// ── Tests ──
