#![cfg_attr(not(test), deny(clippy::panic))]

use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use wsnet2::config::{self, Role};
use wsnet2::lobby::http::LobbyState;
use wsnet2::lobby::LobbyService;
use wsnet2::logging;
use wsnet2::metrics::ServerMetrics;
use wsnet2::protocol::types::{Host, HostStatus};
use wsnet2::rate_limit::AppRateLimiter;
use wsnet2::repository::http::GameState;
use wsnet2::repository::Repository;
use wsnet2::store::{HostKind, HostStore, InMemoryStore, RoomStore};

/// wsnet2 -- realtime multiplayer room service (lobby dispatch + per-room game host)
#[derive(Parser, Debug)]
#[command(name = "wsnet2")]
#[command(about = "A realtime multiplayer room service: lobby dispatch and per-room game hosting")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    /// Useful for debugging configuration loading from multiple sources.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = Arc::new(config::load());

    if cli.print_config {
        let json = serde_json::to_string_pretty(&*cfg)
            .map_err(|e| anyhow::anyhow!("failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config_security(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Role: {:?}", cfg.role);
                println!("  Host id: {}", cfg.host_id);
                println!("  Apps configured: {}", cfg.apps.len());
                println!("  Max room number: {}", cfg.lobby.max_room_num);
                println!("  Room history capacity: {}", cfg.room.history_capacity);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    logging::init_with_config(&cfg.logging);

    let port = cfg.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, role = ?cfg.role, host_id = cfg.host_id, "starting wsnet2");

    let room_store: Arc<dyn RoomStore> = Arc::new(InMemoryStore::new());
    let host_store: Arc<dyn HostStore> = Arc::new(InMemoryStore::new());
    let metrics = Arc::new(ServerMetrics::new());
    let rate_limiter = Arc::new(AppRateLimiter::new(cfg.rate_limit.clone()));
    rate_limiter.clone().start_cleanup_task();

    let cancel = CancellationToken::new();
    let app_registry = Arc::new(wsnet2::repository::http::build_app_registry(&cfg.apps));

    let mut router = Router::new().route("/metrics", get(metrics_handler)).with_state(metrics.clone());

    if matches!(cfg.role, Role::Lobby | Role::All) {
        let lobby = Arc::new(LobbyService::new(
            room_store.clone(),
            host_store.clone(),
            rate_limiter.clone(),
            metrics.clone(),
            cfg.lobby.clone(),
        ));
        let lobby_state = Arc::new(LobbyState { service: lobby });
        router = router.merge(wsnet2::lobby::http::router(lobby_state));
    }

    if matches!(cfg.role, Role::Game | Role::Hub | Role::All) {
        let host_kind = if matches!(cfg.role, Role::Hub) { HostKind::Hub } else { HostKind::Game };
        let repo = Arc::new(Repository::new(
            cfg.host_id,
            room_store.clone(),
            cfg.lobby.retry_count,
            cfg.lobby.max_room_num,
            cfg.room.to_room_config(),
            cancel.clone(),
        ));
        let game_state = Arc::new(GameState {
            repo: repo.clone(),
            apps: app_registry.clone(),
            join_deadline: Duration::from_secs(cfg.lobby.create_join_deadline_secs),
            send_queue_capacity: cfg.room.send_queue_capacity,
        });
        router = router.merge(wsnet2::repository::http::router(game_state));

        spawn_heartbeat_upkeep(host_store.clone(), host_kind, cfg.clone());
    }

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let router = router.layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "wsnet2 listening");
    axum::serve(listener, router.into_make_service()).await?;

    Ok(())
}

async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<Arc<ServerMetrics>>,
) -> Json<wsnet2::metrics::MetricsSnapshot> {
    Json(metrics.snapshot().await)
}

/// Periodically upserts this process's own liveness row into the host store so its
/// own (or a peer lobby's) `HostCache` can discover it. In a real multi-process
/// deployment this heartbeat would target a shared external store; here, within the
/// `All`-role single-binary demo, it's the same `InMemoryStore` the lobby reads from.
fn spawn_heartbeat_upkeep(
    host_store: Arc<dyn HostStore>,
    kind: HostKind,
    cfg: Arc<wsnet2::config::Config>,
) {
    let host = Host {
        host_id: cfg.host_id,
        hostname: if cfg.hostname.is_empty() { "127.0.0.1".to_string() } else { cfg.hostname.clone() },
        public_name: if cfg.public_name.is_empty() { "wsnet2".to_string() } else { cfg.public_name.clone() },
        http_port: cfg.port,
        status: HostStatus::Live,
        heartbeat: chrono::Utc::now(),
    };
    let interval = Duration::from_secs(cfg.heartbeat_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let mut beat = host.clone();
            beat.heartbeat = chrono::Utc::now();
            if let Err(err) = host_store.upsert_heartbeat(kind, beat).await {
                tracing::warn!(%err, "failed to upsert host heartbeat");
            }
        }
    });
}

#[cfg(test)]
mod cli_tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn default_has_no_flags_set() {
        let cli = Cli::try_parse_from(["wsnet2"]).unwrap();
        assert!(!cli.validate_config);
        assert!(!cli.print_config);
    }

    #[test]
    fn validate_config_long_flag() {
        let cli = Cli::try_parse_from(["wsnet2", "--validate-config"]).unwrap();
        assert!(cli.validate_config);
    }

    #[test]
    fn validate_config_short_flag() {
        let cli = Cli::try_parse_from(["wsnet2", "-c"]).unwrap();
        assert!(cli.validate_config);
    }

    #[test]
    fn print_config_flag() {
        let cli = Cli::try_parse_from(["wsnet2", "--print-config"]).unwrap();
        assert!(cli.print_config);
    }

    #[test]
    fn validate_and_print_config_conflict() {
        let result = Cli::try_parse_from(["wsnet2", "--validate-config", "--print-config"]);
        assert!(result.is_err());
    }

    #[test]
    fn help_mentions_both_flags() {
        let result = Cli::try_parse_from(["wsnet2", "--help"]);
        let err = result.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("--validate-config"));
        assert!(text.contains("--print-config"));
    }
}
