//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::info;

use feedloom_core::{Pipeline, PipelineConfig, StageIntervals};
use feedloom_fetch::HttpContentFetcher;
use feedloom_shared::{
    AppConfig, Feed, FeedKind, Item, ItemId, expand_home, init_config, load_config,
    validate_api_key,
};
use feedloom_speech::{HttpSpeechClient, SpeechSynthesizer, Voice};
use feedloom_storage::Store;
use feedloom_textgen::Gateway;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Feedloom — turn feeds into enriched, narrated article collections.
#[derive(Parser)]
#[command(
    name = "feedloom",
    version,
    about = "Ingest feeds, enrich items with an LLM, aggregate by tag, and narrate to audio.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start the pipeline scheduler and run until interrupted.
    Run,

    /// Resolve all due feeds once.
    Resolve,

    /// Fetch one batch of pending items.
    Fetch {
        /// Max items to fetch this pass.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Enrich one batch of fetched items.
    Enrich {
        /// Max items to enrich this pass.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Run one tag-aggregation pass.
    Aggregate,

    /// Narrate one batch of aggregates.
    Narrate {
        /// Max aggregates to narrate this pass.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Feed registry management.
    Feeds {
        #[command(subcommand)]
        action: FeedsAction,
    },

    /// Item corpus inspection and manual registration.
    Items {
        #[command(subcommand)]
        action: ItemsAction,
    },

    /// Synthesize speech for arbitrary text.
    Speak {
        /// Text to render.
        text: String,

        /// Voice token (e.g. zh-female, en-male).
        #[arg(long)]
        voice: Option<String>,
    },

    /// Run one ad-hoc completion against the configured text service.
    Complete {
        /// User text to send.
        text: String,

        /// System prompt.
        #[arg(long, default_value = "")]
        system: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Feed subcommands.
#[derive(Subcommand)]
pub(crate) enum FeedsAction {
    /// Register a new feed.
    Add {
        /// Feed URL.
        url: String,

        /// Feed kind: rss or single-url.
        #[arg(long, default_value = "rss")]
        kind: String,

        /// Display title (backfilled from the document when empty).
        #[arg(long, default_value = "")]
        title: String,

        /// Description (backfilled from the document when empty).
        #[arg(long, default_value = "")]
        description: String,

        /// Comma-separated tags.
        #[arg(long, default_value = "")]
        tags: String,
    },

    /// List registered feeds.
    List,

    /// Fetch and print a feed document's entries without registering it.
    Preview {
        /// Feed document URL.
        url: String,
    },
}

/// Item subcommands.
#[derive(Subcommand)]
pub(crate) enum ItemsAction {
    /// List items, newest first.
    List {
        #[arg(long, default_value = "20")]
        limit: u32,

        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Save an item directly into the corpus (already-fetched content).
    Add {
        /// Item title.
        #[arg(long)]
        title: String,

        /// Raw content.
        #[arg(long)]
        content: String,

        /// Source URL (optional).
        #[arg(long, default_value = "")]
        url: String,

        /// Comma-separated tags.
        #[arg(long, default_value = "")]
        tags: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "feedloom=info",
        1 => "feedloom=debug",
        _ => "feedloom=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run => cmd_run().await,
        Command::Resolve => cmd_resolve().await,
        Command::Fetch { limit } => cmd_fetch(limit).await,
        Command::Enrich { limit } => cmd_enrich(limit).await,
        Command::Aggregate => cmd_aggregate().await,
        Command::Narrate { limit } => cmd_narrate(limit).await,
        Command::Feeds { action } => match action {
            FeedsAction::Add {
                url,
                kind,
                title,
                description,
                tags,
            } => cmd_feeds_add(&url, &kind, &title, &description, &tags).await,
            FeedsAction::List => cmd_feeds_list().await,
            FeedsAction::Preview { url } => cmd_feeds_preview(&url).await,
        },
        Command::Items { action } => match action {
            ItemsAction::List { limit, offset } => cmd_items_list(limit, offset).await,
            ItemsAction::Add {
                title,
                content,
                url,
                tags,
            } => cmd_items_add(&title, &content, &url, &tags).await,
        },
        Command::Speak { text, voice } => cmd_speak(&text, voice.as_deref()).await,
        Command::Complete { text, system } => cmd_complete(&text, &system).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring helpers
// ---------------------------------------------------------------------------

type ProdPipeline = Pipeline<HttpContentFetcher, HttpSpeechClient>;

/// Open the corpus store configured in `[defaults] db_path`.
async fn open_store(config: &AppConfig) -> Result<Arc<Store>> {
    let db_path = expand_home(&config.defaults.db_path);
    Ok(Arc::new(Store::open(&db_path).await?))
}

/// Assemble the full production pipeline from config.
async fn build_pipeline(config: &AppConfig) -> Result<Arc<ProdPipeline>> {
    let store = open_store(config).await?;
    let fetcher = HttpContentFetcher::new()?;
    let synth = HttpSpeechClient::new(config.speech.endpoint.clone())?;
    let gateway = Gateway::from_config(&config.textgen)?;
    let pipeline_config = PipelineConfig::from_app_config(config)?;

    Ok(Arc::new(Pipeline::new(
        store,
        fetcher,
        synth,
        gateway,
        pipeline_config,
    )?))
}

/// Split a comma-separated tag list into trimmed, non-empty tags.
fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run() -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;

    let pipeline = build_pipeline(&config).await?;
    let intervals = StageIntervals::from_app_config(&config);

    info!("starting pipeline scheduler");
    let handle = pipeline.start(&intervals);

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    handle.shutdown().await;

    Ok(())
}

async fn cmd_resolve() -> Result<()> {
    let config = load_config()?;
    let pipeline = build_pipeline(&config).await?;
    let summary = pipeline.resolve_once().await?;
    println!(
        "resolved {} feed(s), {} failed, {} new item(s)",
        summary.feeds_resolved, summary.feeds_failed, summary.items_inserted
    );
    Ok(())
}

async fn cmd_fetch(limit: Option<u32>) -> Result<()> {
    let config = load_config()?;
    let pipeline = build_pipeline(&config).await?;
    let updated = pipeline.fetch_once(limit).await?;
    println!("fetched content for {updated} item(s)");
    Ok(())
}

async fn cmd_enrich(limit: Option<u32>) -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;
    let pipeline = build_pipeline(&config).await?;
    pipeline.enrich_once(limit).await?;
    println!("enrichment pass complete");
    Ok(())
}

async fn cmd_aggregate() -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;
    let pipeline = build_pipeline(&config).await?;
    let summary = pipeline.aggregate_once().await?;
    println!(
        "processed {} tag(s), created {} aggregate(s), advanced {} item(s)",
        summary.tags_processed, summary.aggregates_created, summary.items_advanced
    );
    Ok(())
}

async fn cmd_narrate(limit: Option<u32>) -> Result<()> {
    let config = load_config()?;
    let pipeline = build_pipeline(&config).await?;
    let rendered = pipeline.narrate_once(limit).await?;
    println!("narrated {rendered} aggregate(s)");
    Ok(())
}

async fn cmd_feeds_add(
    url: &str,
    kind: &str,
    title: &str,
    description: &str,
    tags: &str,
) -> Result<()> {
    let kind: FeedKind = kind.parse().map_err(|e: String| eyre!(e))?;

    let config = load_config()?;
    let store = open_store(&config).await?;

    if store.get_feed_by_url(url).await?.is_some() {
        return Err(eyre!("feed URL already registered: {url}"));
    }

    let mut feed = Feed::new(url, kind);
    feed.title = title.to_string();
    feed.description = description.to_string();
    feed.tags = parse_tags(tags);
    store.insert_feed(&feed).await?;

    println!("registered feed {} ({url})", feed.id);
    Ok(())
}

async fn cmd_feeds_list() -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config).await?;

    let feeds = store.list_feeds().await?;
    if feeds.is_empty() {
        println!("no feeds registered");
        return Ok(());
    }

    for feed in feeds {
        let resolved = feed
            .last_resolved_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".into());
        println!(
            "{}  [{}]  {}  (last resolved: {resolved})",
            feed.id,
            feed.kind.as_str(),
            feed.url
        );
    }
    Ok(())
}

async fn cmd_feeds_preview(url: &str) -> Result<()> {
    let client = feedloom_feeds::build_client()?;
    let body = feedloom_feeds::fetch_feed_document(&client, url).await?;
    let parsed = feedloom_feeds::parse_feed_document(&body)?;

    println!("# {}", parsed.meta.title);
    if !parsed.meta.description.is_empty() {
        println!("{}", parsed.meta.description);
    }
    println!();
    for entry in &parsed.entries {
        println!("- {} <{}>", entry.title, entry.link);
    }
    println!("\n{} entr(ies)", parsed.entries.len());
    Ok(())
}

async fn cmd_items_list(limit: u32, offset: u32) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config).await?;

    let items = store.list_items(limit, offset).await?;
    if items.is_empty() {
        println!("no items");
        return Ok(());
    }

    for item in items {
        println!(
            "{}  [{:>12}]  [{}]  {}",
            item.id,
            item.stage.as_str(),
            item.kind.as_str(),
            if item.title.is_empty() { &item.url } else { &item.title }
        );
    }
    Ok(())
}

async fn cmd_items_add(title: &str, content: &str, url: &str, tags: &str) -> Result<()> {
    let config = load_config()?;
    let store = open_store(&config).await?;

    if !url.is_empty() && store.get_item_by_url(url).await?.is_some() {
        return Err(eyre!("item URL already in the corpus: {url}"));
    }

    // A manually saved item arrives with its content in hand, so it skips
    // the fetch stage entirely.
    let now = chrono::Utc::now();
    let item = Item {
        id: ItemId::new(),
        feed_ref: String::new(),
        url: url.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        ai_content: String::new(),
        ai_summary: String::new(),
        tags: parse_tags(tags),
        cover: String::new(),
        audio: String::new(),
        published_at: Some(now),
        kind: feedloom_shared::ItemKind::Original,
        is_active: true,
        stage: feedloom_shared::StageMarker::Fetched,
        fetch_attempts: 0,
        narrate_attempts: 0,
        created_at: now,
        updated_at: now,
    };
    store.insert_item(&item).await?;

    println!("saved item {}", item.id);
    Ok(())
}

async fn cmd_speak(text: &str, voice: Option<&str>) -> Result<()> {
    let config = load_config()?;

    let voice: Voice = voice
        .unwrap_or(&config.speech.voice)
        .parse()
        .map_err(|e| eyre!("{e}"))?;

    let synth = HttpSpeechClient::new(config.speech.endpoint.clone())?;
    let audio = synth.synthesize(text, voice, 0).await?;
    println!("{audio}");
    Ok(())
}

async fn cmd_complete(text: &str, system: &str) -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;

    let gateway = Gateway::from_config(&config.textgen)?;
    let completion = gateway.complete(&config.textgen.model, text, system).await;

    if completion.is_success() {
        println!("{}", completion.answer);
        println!("\n({} ms)", completion.elapsed_ms);
        Ok(())
    } else {
        Err(eyre!(
            "completion failed (status {}): {}",
            completion.status_code,
            completion.error.unwrap_or_default()
        ))
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
