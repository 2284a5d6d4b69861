use anyhow::Context;
use ci_search::{
    api::{build_router, AppState},
    config::Config,
    jobs::{FileJobSource, JobIndex},
    search::{
        FarmLookup, FsArtifactSource, LayoutResolver, ScanEngine, SearchService, StaticFarmLookup,
    },
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ci-search", version)]
#[command(about = "Search CI build logs, test results, bugs and issues", long_about = None)]
struct Args {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<String>,

    /// Listen address
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding the artifact corpus
    #[arg(long)]
    artifacts_root: Option<PathBuf>,
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("ci_search={},tower_http=info", config.observability.log_level).into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let loaded = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            eprintln!("Using default configuration");
            Config::embedded().context("built-in configuration is invalid")?
        }
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.http_port = port;
    }
    if let Some(root) = args.artifacts_root {
        config.artifacts.root = root;
    }

    init_tracing(&config);
    tracing::info!("Starting {} v{}", config.observability.service_name, env!("CARGO_PKG_VERSION"));

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = ci_search::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        }
    } else {
        tracing::info!("Prometheus metrics disabled in configuration");
    }

    let shutdown = CancellationToken::new();

    // Job listing, which also attributes result URLs to build farms
    let jobs = match &config.jobs.path {
        Some(path) => {
            let index = Arc::new(JobIndex::new(Arc::new(FileJobSource::new(path))));
            match index.refresh().await {
                Ok(count) => tracing::info!(jobs = count, path = %path.display(), "Loaded job list"),
                Err(e) => tracing::warn!(error = %e, path = %path.display(), "Initial job list load failed"),
            }
            index.clone().start_refresh(
                Duration::from_secs(config.jobs.refresh_secs.max(1)),
                shutdown.child_token(),
            );
            Some(index)
        }
        None => {
            tracing::info!("No job list configured; /jobs is unavailable");
            None
        }
    };
    let farms: Arc<dyn FarmLookup> = match &jobs {
        Some(index) => index.clone() as Arc<dyn FarmLookup>,
        None => Arc::new(StaticFarmLookup::default()),
    };

    let source = Arc::new(FsArtifactSource::new(&config.artifacts.root));
    let resolver = Arc::new(LayoutResolver::new(
        config.artifacts.job_uri_prefix.clone(),
        config.artifacts.bug_uri_prefix.clone(),
        config.artifacts.issue_uri_prefix.clone(),
    ));
    let engine = ScanEngine::new(source, config.search.workers, config.search.queue_depth);
    let search = Arc::new(SearchService::new(
        engine,
        resolver,
        farms,
        config.search.max_age,
    ));
    tracing::info!(
        root = %config.artifacts.root.display(),
        workers = config.search.workers,
        max_age = %ci_search::search::duration::format_duration(config.search.max_age),
        "Search service initialized"
    );

    let mut app_state = AppState::new(
        search,
        Duration::from_secs(config.server.request_timeout_secs),
    )
    .with_shutdown(shutdown.clone());
    if let Some(index) = jobs {
        app_state = app_state.with_jobs(index);
    }
    let app = build_router(app_state);

    // Start HTTP server
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind {http_addr}"))?;
    tracing::info!("HTTP server listening on http://{}", http_addr);

    let signal = shutdown.clone();
    axum::serve(http_listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
            signal.cancel();
        })
        .await
        .context("HTTP server error")?;

    tracing::info!("Shutting down gracefully...");
    Ok(())
}
