use std::{
    net::{IpAddr, SocketAddr},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use angmon_core::ConfigReconciler;
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use clap::{Parser, Subcommand};
use confique::Config;
use tokio::{
    net::TcpListener,
    signal,
    sync::{Mutex, RwLock},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{agent::AgentClient, poller::StatsFeed};

mod agent;
mod check;
mod http_util;
mod poller;
mod route;
#[cfg(test)]
mod testing;

#[derive(Debug, Parser)]
#[command(name = "angmon-dashboard")]
struct Cli {
    #[arg(short, long, value_name = "FILE", help = "Path to config file")]
    config_path: Option<String>,
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the dashboard API and the stats poller
    Serve,

    /// Fetch one snapshot, print its health and exit non-zero when critical
    Check,
}

#[derive(Config, Debug)]
struct Conf {
    /// Port to listen on
    #[config(env = "ANGMON_PORT", default = 8080)]
    port: u16,

    /// Bind address
    #[config(env = "ANGMON_ADDRESS", default = "127.0.0.1")]
    address: IpAddr,

    /// Agent address as host:port
    #[config(env = "ANGMON_AGENT_ADDR", default = "127.0.0.1:9090")]
    agent_addr: String,

    /// Talk to the agent over https
    #[config(env = "ANGMON_AGENT_TLS", default = false)]
    agent_tls: bool,

    /// Prefer IPv6 when resolving the agent address
    #[config(env = "ANGMON_PREFER_IPV6", default = false)]
    prefer_ipv6: bool,

    /// Seconds between two stats polls
    #[config(env = "ANGMON_POLL_INTERVAL_SECS", default = 10)]
    poll_interval_secs: u64,

    /// Seconds before an agent request is abandoned
    #[config(env = "ANGMON_REQUEST_TIMEOUT_SECS", default = 5)]
    request_timeout_secs: u64,
}

fn config(path: &str) -> anyhow::Result<Conf> {
    Conf::builder()
        .env()
        .file(path)
        .load()
        .map_err(|e| e.into())
}

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    pub agent: AgentClient,
    pub stats: Arc<RwLock<StatsFeed>>,
    // separate from `stats` so polling never waits on an edit
    pub reconciler: Arc<Mutex<ConfigReconciler>>,
}

impl AppState {
    fn new(agent: AgentClient) -> Self {
        Self {
            agent,
            stats: Arc::new(RwLock::new(StatsFeed::default())),
            reconciler: Arc::new(Mutex::new(ConfigReconciler::default())),
        }
    }
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(route::health))
        .nest(
            "/api/v1",
            Router::new()
                .route("/overview", get(route::overview))
                .route("/config", get(route::config::show))
                .route("/config/edits", post(route::config::edit))
                .route("/config/partitions", post(route::config::add_partition))
                .route(
                    "/config/partitions/{index}",
                    delete(route::config::remove_partition),
                )
                .route(
                    "/config/partitions/{index}/toggle",
                    post(route::config::toggle_partition),
                )
                .route(
                    "/config/partitions/{index}/threshold",
                    put(route::config::set_threshold),
                )
                .route("/config/refresh", post(route::config::refresh))
                .route("/config/save", post(route::config::save)),
        )
        .layer((
            TraceLayer::new_for_http(),
            // Prevent requests to hang forever
            TimeoutLayer::new(Duration::from_secs(60)),
        ))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    trace!("using command line arguments {:?}", cli);

    let config = config(&cli.config_path.unwrap_or("config.toml".to_owned()))?;
    trace!("using config {:?}", config);

    let agent = AgentClient::new(
        config.agent_addr.clone(),
        config.agent_tls,
        config.prefer_ipv6,
        Duration::from_secs(config.request_timeout_secs),
    );

    match cli.commands {
        Commands::Serve => serve(&config, agent).await?,
        Commands::Check => {
            if check::check(&agent).await? {
                return Ok(ExitCode::from(2));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn serve(config: &Conf, agent: AgentClient) -> anyhow::Result<()> {
    let addr = SocketAddr::from((config.address, config.port));
    info!("listening on {addr}, agent at {}", config.agent_addr);
    let listener = TcpListener::bind(addr).await?;

    let state = AppState::new(agent);
    let shutdown_token = CancellationToken::new();
    let tracker = TaskTracker::new();

    tracker.spawn(poller::poll_stats(
        state.agent.clone(),
        state.stats.clone(),
        Duration::from_secs(config.poll_interval_secs),
        shutdown_token.child_token(),
    ));
    tracker.spawn({
        let state = state.clone();
        async move {
            if let Err(e) = route::config::reload(&state).await {
                warn!("initial configuration load failed, using defaults: {e}");
            }
        }
    });

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(shutdown_token))
        .await?;

    tracker.close();
    trace!("waiting for {} background tasks", tracker.len());
    tracker.wait().await;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                #[cfg(debug_assertions)]
                let default_log_level = format!(
                    "{}=debug,angmon_core=debug,tower_http=debug",
                    env!("CARGO_CRATE_NAME")
                )
                .into();

                #[cfg(not(debug_assertions))]
                let default_log_level = format!(
                    "{}=info,angmon_core=info,tower_http=info",
                    env!("CARGO_CRATE_NAME")
                )
                .into();

                default_log_level
            }),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();
}

async fn shutdown_signal(token: CancellationToken) {
    let _shutdown_guard = token.drop_guard();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
