use anyhow::{Context, Result};
use axum::{Router, routing::get};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod auth;
mod cli;
mod config;
mod directory;
mod handlers;
mod metrics;
mod models;
mod store;
mod ws;

#[cfg(test)]
mod test_helpers;

use crate::config::{BoardSyncConfig, HubConfig, ServerConfig, ServerOverrides};
use crate::directory::{BoardDirectory, IdentityResolver, MemoryDirectory};
use crate::metrics::ServerMetrics;
use crate::store::BoardStore;
use crate::ws::{RoomRegistry, SessionContext};

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "board-sync")]
#[command(about = "Real-time sync server for shared whiteboards")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom config directory (defaults to ~/.config/board-sync)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync server in the foreground (default)
    Serve(ServeArgs),

    /// Print a board's objects and follow its changes
    Watch(WatchArgs),

    /// Print the effective configuration
    Config,
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Port for the web server (overrides [server].port)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Host to bind to (overrides [server].host)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// URL prefix to mount every route under, e.g. /sync
    #[arg(long)]
    base_path: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Parser)]
struct WatchArgs {
    /// Board to follow
    board_id: String,

    /// Bearer token of a board member
    #[arg(short, long, env = "BOARD_TOKEN")]
    token: String,

    /// Server URL including any base path
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,
}

#[derive(Clone)]
pub(crate) struct AppState {
    /// Board membership and broadcast fan-out
    pub registry: RoomRegistry,
    /// Authoritative objects, one partition per board
    pub store: Arc<BoardStore>,
    pub identity: Arc<dyn IdentityResolver>,
    pub boards: Arc<dyn BoardDirectory>,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
    pub hub: HubConfig,
    /// Fired on shutdown; stops the registry
    pub cancel: CancellationToken,
}

impl AppState {
    /// Build the state and start the registry that belongs to it.
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        boards: Arc<dyn BoardDirectory>,
        hub: HubConfig,
    ) -> (Self, JoinHandle<()>) {
        let metrics = Arc::new(ServerMetrics::new());
        let cancel = CancellationToken::new();
        let (registry, registry_task) =
            RoomRegistry::spawn(hub.command_capacity, metrics.clone(), cancel.clone());

        let state = Self {
            registry,
            store: Arc::new(BoardStore::new()),
            identity,
            boards,
            metrics,
            hub,
            cancel,
        };
        (state, registry_task)
    }

    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            outbound_capacity: self.hub.outbound_queue_capacity,
            close_grace: self.hub.close_grace,
        }
    }
}

/// All routes, mounted under `base_path` when it is non-empty.
pub(crate) fn build_router(state: AppState, base_path: &str) -> Router {
    let routes = Router::new()
        .route(
            "/ws/board/{board_id}",
            get(handlers::board_websocket_handler),
        )
        .route(
            "/api/boards/{board_id}/objects",
            get(handlers::board_objects_handler),
        )
        .route(
            "/api/boards/{board_id}/objects/{object_id}",
            get(handlers::board_object_handler),
        )
        // Health endpoints
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler));

    let app = if base_path.is_empty() {
        routes
    } else {
        Router::new().nest(base_path, routes)
    };

    app.layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Watch(args)) => {
            init_tracing(false);
            cli::watch_command(&args.url, &args.board_id, &args.token).await
        }
        Some(Commands::Config) => {
            let config = BoardSyncConfig::new(cli.config_dir)?;
            cli::config_command(&config.load()?)
        }
        Some(Commands::Serve(args)) => run_server(args, cli.config_dir).await,
        None => run_server(ServeArgs::default(), cli.config_dir).await,
    }
}

fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "board_sync=debug,tower_http=debug,info"
    } else {
        "board_sync=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

async fn run_server(args: ServeArgs, config_dir: Option<PathBuf>) -> Result<()> {
    init_tracing(args.debug);

    info!("Starting board sync server");

    let config = BoardSyncConfig::new(config_dir)?;
    let mut file_config = config.load()?;
    ServerOverrides {
        host: args.host,
        port: args.port,
        base_path: args.base_path,
    }
    .apply(&mut file_config.server);

    let server_config = ServerConfig::from_file(&file_config.server);
    let hub_config = HubConfig::from_file(&file_config.hub);

    let directory = Arc::new(MemoryDirectory::from_seeds(
        &file_config.users,
        &file_config.boards,
    ));
    if directory.user_count() == 0 {
        warn!(
            "No users configured; add [[users]] to {} to allow connections",
            config.config_toml_path().display()
        );
    }
    info!(
        "Directory: {} users, {} boards",
        directory.user_count(),
        directory.board_count()
    );
    info!(
        "Hub config: outbound_queue={}, command_queue={}, close_grace={}ms",
        hub_config.outbound_queue_capacity,
        hub_config.command_capacity,
        hub_config.close_grace.as_millis()
    );

    let (app_state, registry_task) =
        AppState::new(directory.clone(), directory, hub_config);
    let cancel = app_state.cancel.clone();

    let app = build_router(app_state, &server_config.base_path);

    let addr = server_config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    let base = &server_config.base_path;
    info!("Board sync listening on http://{}{}", actual_addr, base);
    info!("Endpoints:");
    info!("  GET {}/ws/board/:board_id            - Board WebSocket", base);
    info!("  GET {}/api/boards/:board_id/objects  - Board snapshot", base);
    info!("  GET {}/health                        - Health check", base);

    // Create shutdown signal handler
    let shutdown_cancel = cancel.clone();
    let shutdown_signal = async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received shutdown signal, closing board sessions...");
        // Stopping the registry closes every session's outbound queue
        shutdown_cancel.cancel();
    };

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    cancel.cancel();
    if let Err(e) = registry_task.await {
        warn!("Room registry ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    server_result
}
