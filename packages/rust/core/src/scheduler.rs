//! Recurring-job scheduler driving the five pipeline stages.
//!
//! Each stage runs on its own `tokio::time::interval` loop inside one
//! spawned task, so a stage can never overlap itself — a tick that fires
//! while the previous body is still awaiting an external call is simply
//! skipped (`MissedTickBehavior::Skip`), never queued. Different stages run
//! concurrently; their eligibility predicates are disjoint on the stage
//! marker, so they never race on the same item.
//!
//! Shutdown is a watch signal: no new ticks fire after it, in-flight
//! external calls are allowed to finish, and `SchedulerHandle::shutdown`
//! joins every job task.

use std::sync::Arc;
use std::time::Duration;

use feedloom_fetch::ContentFetcher;
use feedloom_shared::{AppConfig, FeedloomError, Result};
use feedloom_speech::{SpeechSynthesizer, Voice};
use feedloom_storage::Store;
use feedloom_textgen::Gateway;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::aggregate::{self, AggregateSummary};
use crate::resolver::{self, ResolveSummary};
use crate::{enrich, fetch, narrate};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime knobs shared by every stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model id for enrichment and aggregation completions.
    pub model: String,
    /// Narration voice.
    pub voice: Voice,
    pub fetch_batch: u32,
    pub enrich_batch: u32,
    pub narrate_batch: u32,
    pub max_fetch_attempts: u32,
    pub max_narrate_attempts: u32,
    pub resolve_cooldown: Duration,
    pub aggregation_window: Duration,
}

impl PipelineConfig {
    /// Build from the loaded application config.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let voice: Voice = config.speech.voice.parse().map_err(|e| {
            FeedloomError::config(format!("[speech] voice: {e}"))
        })?;

        Ok(Self {
            model: config.textgen.model.clone(),
            voice,
            fetch_batch: config.defaults.fetch_batch as u32,
            enrich_batch: config.defaults.enrich_batch as u32,
            narrate_batch: config.defaults.narrate_batch as u32,
            max_fetch_attempts: config.defaults.max_fetch_attempts,
            max_narrate_attempts: config.defaults.max_narrate_attempts,
            resolve_cooldown: Duration::from_secs(config.defaults.resolve_cooldown_secs),
            aggregation_window: Duration::from_secs(config.defaults.aggregation_window_secs),
        })
    }
}

/// Tick periods for the five recurring jobs.
#[derive(Debug, Clone)]
pub struct StageIntervals {
    pub resolve: Duration,
    pub fetch: Duration,
    pub enrich: Duration,
    pub aggregate: Duration,
    pub narrate: Duration,
}

impl StageIntervals {
    /// Build from the loaded application config.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            resolve: Duration::from_secs(config.scheduler.resolve_interval_secs),
            fetch: Duration::from_secs(config.scheduler.fetch_interval_secs),
            enrich: Duration::from_secs(config.scheduler.enrich_interval_secs),
            aggregate: Duration::from_secs(config.scheduler.aggregate_interval_secs),
            narrate: Duration::from_secs(config.scheduler.narrate_interval_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The assembled pipeline: one store handle plus the external capabilities,
/// passed explicitly into every stage. Also the home of the manual one-shot
/// triggers mirrored by the CLI.
pub struct Pipeline<F, S>
where
    F: ContentFetcher + 'static,
    S: SpeechSynthesizer + 'static,
{
    store: Arc<Store>,
    fetcher: Arc<F>,
    synth: Arc<S>,
    gateway: Arc<Gateway>,
    http: reqwest::Client,
    config: PipelineConfig,
}

impl<F, S> Pipeline<F, S>
where
    F: ContentFetcher + 'static,
    S: SpeechSynthesizer + 'static,
{
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        store: Arc<Store>,
        fetcher: F,
        synth: S,
        gateway: Gateway,
        config: PipelineConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            fetcher: Arc::new(fetcher),
            synth: Arc::new(synth),
            gateway: Arc::new(gateway),
            http: feedloom_feeds::build_client()?,
            config,
        })
    }

    /// Resolve all due feeds once.
    pub async fn resolve_once(&self) -> Result<ResolveSummary> {
        resolver::resolve_feeds(&self.store, &self.http, self.config.resolve_cooldown).await
    }

    /// Fetch one batch of items once. `limit` overrides the configured batch.
    pub async fn fetch_once(&self, limit: Option<u32>) -> Result<usize> {
        fetch::run_fetch(
            &self.store,
            &*self.fetcher,
            limit.unwrap_or(self.config.fetch_batch),
            self.config.max_fetch_attempts,
        )
        .await
    }

    /// Enrich one batch of items once. `limit` overrides the configured batch.
    pub async fn enrich_once(&self, limit: Option<u32>) -> Result<()> {
        enrich::run_enrich(
            &self.store,
            &self.gateway,
            &self.config.model,
            limit.unwrap_or(self.config.enrich_batch),
        )
        .await
    }

    /// Run one aggregation pass.
    pub async fn aggregate_once(&self) -> Result<AggregateSummary> {
        aggregate::run_aggregate(
            &self.store,
            &self.gateway,
            &self.config.model,
            self.config.aggregation_window,
        )
        .await
    }

    /// Narrate one batch of aggregates once. `limit` overrides the batch.
    pub async fn narrate_once(&self, limit: Option<u32>) -> Result<usize> {
        narrate::run_narrate(
            &self.store,
            &*self.synth,
            self.config.voice,
            limit.unwrap_or(self.config.narrate_batch),
            self.config.max_narrate_attempts,
            self.config.aggregation_window,
        )
        .await
    }

    /// Spawn the five recurring jobs. The returned handle stops them.
    pub fn start(self: Arc<Self>, intervals: &StageIntervals) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(5);

        let pipeline = Arc::clone(&self);
        tasks.push(spawn_job("resolve", intervals.resolve, shutdown_rx.clone(), move || {
            let p = Arc::clone(&pipeline);
            async move { p.resolve_once().await.map(|_| ()) }
        }));

        let pipeline = Arc::clone(&self);
        tasks.push(spawn_job("fetch", intervals.fetch, shutdown_rx.clone(), move || {
            let p = Arc::clone(&pipeline);
            async move { p.fetch_once(None).await.map(|_| ()) }
        }));

        let pipeline = Arc::clone(&self);
        tasks.push(spawn_job("enrich", intervals.enrich, shutdown_rx.clone(), move || {
            let p = Arc::clone(&pipeline);
            async move { p.enrich_once(None).await }
        }));

        let pipeline = Arc::clone(&self);
        tasks.push(spawn_job(
            "aggregate",
            intervals.aggregate,
            shutdown_rx.clone(),
            move || {
                let p = Arc::clone(&pipeline);
                async move { p.aggregate_once().await.map(|_| ()) }
            },
        ));

        let pipeline = Arc::clone(&self);
        tasks.push(spawn_job("narrate", intervals.narrate, shutdown_rx, move || {
            let p = Arc::clone(&pipeline);
            async move { p.narrate_once(None).await.map(|_| ()) }
        }));

        SchedulerHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

// ---------------------------------------------------------------------------
// Job runner
// ---------------------------------------------------------------------------

/// Spawn one recurring job loop.
///
/// The job body runs inline in the loop, so a job never overlaps itself.
/// A tick that raises is logged at the runner boundary and never
/// deregisters the job.
fn spawn_job<J, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut job: J,
) -> JoinHandle<()>
where
    J: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(job = name, period_ms = period.as_millis() as u64, "pipeline job started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = job().await {
                        warn!(job = name, error = %e, "job tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!(job = name, "pipeline job stopping");
                    break;
                }
            }
        }
    })
}

/// Handle over the running job set.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal shutdown and wait for every job loop to exit. In-flight ticks
    /// finish; no new ticks fire.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedloom_shared::{Feed, FeedKind, Item, StageMarker};
    use uuid::Uuid;

    async fn test_store() -> Arc<Store> {
        let tmp = std::env::temp_dir().join(format!("fl_sched_{}.db", Uuid::now_v7()));
        Arc::new(Store::open(&tmp).await.expect("open test db"))
    }

    struct OkFetcher;

    impl ContentFetcher for OkFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            Ok(format!("# fetched {url}\n"))
        }
    }

    struct OkSynth;

    impl SpeechSynthesizer for OkSynth {
        async fn synthesize(&self, _text: &str, _voice: Voice, _seed: u32) -> Result<String> {
            Ok("/audio/test.mp3".into())
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            model: "gpt-4o-mini".into(),
            voice: Voice::ZhFemale,
            fetch_batch: 5,
            enrich_batch: 5,
            narrate_batch: 5,
            max_fetch_attempts: 3,
            max_narrate_attempts: 3,
            resolve_cooldown: Duration::from_secs(3600),
            aggregation_window: Duration::from_secs(3600),
        }
    }

    fn fast_intervals() -> StageIntervals {
        StageIntervals {
            resolve: Duration::from_millis(20),
            fetch: Duration::from_millis(20),
            enrich: Duration::from_millis(20),
            aggregate: Duration::from_millis(20),
            narrate: Duration::from_millis(20),
        }
    }

    fn test_pipeline(store: Arc<Store>) -> Arc<Pipeline<OkFetcher, OkSynth>> {
        // Gateway pointed at a closed port: enrichment ticks fail softly.
        let gateway = Gateway::new("http://127.0.0.1:1/v1", "t")
            .unwrap()
            .with_retry(1, 1);
        Arc::new(
            Pipeline::new(store, OkFetcher, OkSynth, gateway, fast_config()).expect("pipeline"),
        )
    }

    #[tokio::test]
    async fn scheduled_fetch_processes_pending_items() {
        let store = test_store().await;
        let feed = Feed::new("https://example.com/feed.xml", FeedKind::Rss);
        let item = Item::from_feed_entry(&feed.id, "https://example.com/a", "A", None);
        store.insert_item(&item).await.unwrap();

        let pipeline = test_pipeline(store.clone());
        let handle = pipeline.start(&fast_intervals());

        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.shutdown().await;

        let item = store.get_item(&item.id).await.unwrap().unwrap();
        assert!(item.is_active);
        assert_eq!(item.stage, StageMarker::Fetched);
    }

    #[tokio::test]
    async fn shutdown_stops_new_ticks() {
        let store = test_store().await;
        let pipeline = test_pipeline(store.clone());
        let handle = pipeline.start(&fast_intervals());

        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.shutdown().await;

        // Work inserted after shutdown is never picked up.
        let feed = Feed::new("https://example.com/feed.xml", FeedKind::Rss);
        let item = Item::from_feed_entry(&feed.id, "https://example.com/late", "Late", None);
        store.insert_item(&item).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let item = store.get_item(&item.id).await.unwrap().unwrap();
        assert!(!item.is_active);
        assert_eq!(item.stage, StageMarker::Unset);
    }

    #[tokio::test]
    async fn failing_tick_does_not_kill_the_job_loop() {
        let store = test_store().await;
        let pipeline = test_pipeline(store.clone());
        // Enrichment hits the unreachable gateway every tick and fails
        // softly; the fetch loop keeps running alongside it.
        let handle = pipeline.start(&fast_intervals());

        tokio::time::sleep(Duration::from_millis(100)).await;

        let feed = Feed::new("https://example.com/feed.xml", FeedKind::Rss);
        let item = Item::from_feed_entry(&feed.id, "https://example.com/a", "A", None);
        store.insert_item(&item).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.shutdown().await;

        let item = store.get_item(&item.id).await.unwrap().unwrap();
        assert!(item.is_active);
    }

    #[test]
    fn pipeline_config_rejects_invalid_voice() {
        let mut config = AppConfig::default();
        config.speech.voice = "not-a-voice".into();
        assert!(PipelineConfig::from_app_config(&config).is_err());
    }

    #[test]
    fn stage_intervals_from_config() {
        let config = AppConfig::default();
        let intervals = StageIntervals::from_app_config(&config);
        assert_eq!(intervals.resolve, Duration::from_secs(10));
        assert_eq!(intervals.narrate, Duration::from_secs(50));
    }
}
