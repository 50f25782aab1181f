// Main entry point - Dependency injection and subcommand dispatch
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use counterbase::application::crawler::Crawler;
use counterbase::application::ports::{LatestPointQuerier, Submitter};
use counterbase::infrastructure::config::{load_settings, private_domain_credentials, Settings};
use counterbase::infrastructure::directory_loader::StaticDirectory;
use counterbase::infrastructure::ecocounter::{self, EcoCounterFetcher};
use counterbase::infrastructure::halifax_transit::{self, HalifaxTransit};
use counterbase::infrastructure::query_client::QueryClient;
use counterbase::infrastructure::sqlite_store::SqliteStore;
use counterbase::infrastructure::submit_client::SubmitClient;
use counterbase::presentation::app_state::AppState;
use counterbase::presentation::router::build_router;
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "counterbase", about = "Harvests counter data into a common store")]
struct Cli {
    /// Configuration file; defaults to config/counterbase.* when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Logging verbosity (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the submit API
    Api {
        /// Listen address for the HTTP server
        #[arg(long)]
        addr: Option<String>,
    },
    /// Run one crawl pass over every active counter
    Crawler {
        /// Directory URL (file:// or http(s)://)
        #[arg(long)]
        directory_url: Option<String>,
        /// Submit endpoint URL, or sqlite: for the local database
        #[arg(long)]
        submit_url: Option<String>,
        /// Query endpoint URL, or sqlite: for the local database
        #[arg(long)]
        query_url: Option<String>,
        /// Comma-separated domains for ecocounter://private sources; each needs
        /// ECO_VISIO_<DOMAIN>_{USERNAME,PASSWORD,USER_ID,DOMAIN_ID} set
        #[arg(long, value_delimiter = ',')]
        eco_counter_private_domains: Vec<String>,
    },
    /// Print discovered counters as directory JSON
    Discover {
        /// List an EcoCounter public page's counters instead of transit routes
        #[arg(long)]
        eco_counter_page: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Api { addr } => {
            if let Some(addr) = addr {
                settings.listen_addr = addr;
            }
            run_api(&settings).await
        }
        Command::Crawler {
            directory_url,
            submit_url,
            query_url,
            eco_counter_private_domains,
        } => {
            settings.directory_url = directory_url.or(settings.directory_url);
            settings.submit_url = submit_url.or(settings.submit_url);
            settings.query_url = query_url.or(settings.query_url);
            if !eco_counter_private_domains.is_empty() {
                settings.eco_counter_private_domains = eco_counter_private_domains;
            }
            run_crawler(&settings).await
        }
        Command::Discover { eco_counter_page } => {
            let counters = match eco_counter_page {
                Some(page) => EcoCounterFetcher::default().counters(&page).await?,
                None => HalifaxTransit::default().counters().await?,
            };
            serde_json::to_writer(std::io::stdout().lock(), &counters)?;
            println!();
            Ok(())
        }
    }
}

async fn run_api(settings: &Settings) -> anyhow::Result<()> {
    let store = SqliteStore::open(&settings.database)?;
    let state = Arc::new(AppState {
        submitter: Arc::new(store),
    });

    let addr: SocketAddr = settings
        .listen_addr
        .parse()
        .with_context(|| format!("parsing listen address {:?}", settings.listen_addr))?;
    tracing::info!("starting submit api on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

async fn run_crawler(settings: &Settings) -> anyhow::Result<()> {
    let client = reqwest::Client::new();

    let directory_url = settings
        .directory_url
        .as_deref()
        .context("need --directory-url")?;
    let directory = StaticDirectory::load(&client, directory_url).await?;

    let submit_url = settings.submit_url.as_deref().context("need --submit-url")?;
    let query_url = settings.query_url.as_deref().context("need --query-url")?;

    let mut store = None;
    let mut local_store = || -> anyhow::Result<SqliteStore> {
        if let Some(store) = &store {
            return Ok(SqliteStore::clone(store));
        }
        let opened = SqliteStore::open(&settings.database)?;
        store = Some(opened.clone());
        Ok(opened)
    };

    let submitter: Arc<dyn Submitter> = match sink_kind(submit_url, "--submit-url")? {
        SinkKind::Http => Arc::new(SubmitClient::new(client.clone(), submit_url.to_string())),
        SinkKind::Sqlite => Arc::new(local_store()?),
    };
    let querier: Arc<dyn LatestPointQuerier> = match sink_kind(query_url, "--query-url")? {
        SinkKind::Http => Arc::new(QueryClient::new(client.clone(), query_url.to_string())),
        SinkKind::Sqlite => Arc::new(local_store()?),
    };

    let mut crawler = Crawler::new(Arc::new(directory), querier, submitter);

    let mut eco = EcoCounterFetcher::new(client.clone(), ecocounter::DEFAULT_BASE_URL);
    for creds in private_domain_credentials(&settings.eco_counter_private_domains, |k| {
        std::env::var(k).ok()
    }) {
        eco.add_private_domain(creds);
    }
    crawler.add_fetcher(ecocounter::SCHEME, Arc::new(eco));
    crawler.add_fetcher(
        halifax_transit::SCHEME,
        Arc::new(HalifaxTransit::new(client, halifax_transit::DEFAULT_DATASET_URL)),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling crawl");
            on_signal.cancel();
        }
    });

    crawler.run(&cancel).await?;
    Ok(())
}

enum SinkKind {
    Http,
    Sqlite,
}

fn sink_kind(url: &str, flag: &str) -> anyhow::Result<SinkKind> {
    let parsed = Url::parse(url).with_context(|| format!("parsing {}", flag))?;
    match parsed.scheme() {
        "http" | "https" => Ok(SinkKind::Http),
        "sqlite" => Ok(SinkKind::Sqlite),
        other => anyhow::bail!("bad {}: unsupported scheme {:?}", flag, other),
    }
}
