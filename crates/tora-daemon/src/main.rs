//! tora-daemon entry point.
//!
//! Loads config, builds both store clients and the engine, starts the HTTP
//! status surface, then hands control to the scheduler loop until ctrl-c.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};

use tora_config::secrets::resolve_secrets;
use tora_config::{ArchivistSettings, UnusedKeyPolicy};
use tora_daemon::bootstrap::{build_engine, resolve_ocr_bot};
use tora_daemon::scheduler::{run_noop, Scheduler};
use tora_daemon::{routes, state};

#[derive(Parser, Debug)]
#[command(name = "tora-daemon", version, about = "Keeps the moderation queue and Blossom in sync")]
struct Args {
    /// Config layers, merged in order (later wins).
    #[arg(long = "config", num_args = 1.., default_value = "config/base.yaml")]
    config: Vec<String>,

    /// Sync the debug subreddit instead of the production one.
    #[arg(long)]
    debug: bool,

    /// Run the loop but take no action.
    #[arg(long)]
    noop: bool,

    /// Run cycles back to back, ignoring the cycle interval.
    #[arg(long)]
    clear_the_queue: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();
    let args = Args::parse();

    let loaded = tora_config::load_layered_yaml(args.config.as_slice()).context("load config")?;
    let unused = tora_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for pointer in &unused.unused_leaf_pointers {
        warn!(pointer = %pointer, "config key is not used");
    }
    let settings = ArchivistSettings::from_config_json(&loaded.config_json)?;

    let noop = args.noop || settings.features.noop;
    let drain = args.clear_the_queue || settings.features.clear_the_queue;
    let subreddit = settings.reddit.effective_subreddit(args.debug).to_string();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_hash = %loaded.config_hash,
        subreddit = %subreddit,
        debug = args.debug,
        noop,
        drain,
        "tora-daemon starting"
    );

    let secrets = resolve_secrets(&loaded.config_json, !noop)?;
    let engine = Arc::new(build_engine(&settings, &secrets, &subreddit, noop)?);

    let flags = state::StartupFlags {
        drain,
        noop,
        debug: args.debug,
        subreddit: Some(subreddit),
        config_hash: Some(loaded.config_hash.clone()),
    };
    let shared = Arc::new(state::AppState::new(flags, engine.stop_handle()));
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    spawn_shutdown_listener(Arc::clone(&shared));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8898)));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("tora-daemon listening on http://{}", addr);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "http server crashed");
        }
    });

    if noop {
        run_noop(shared).await;
    } else {
        let ocr_bot = if settings.features.archive_completed {
            resolve_ocr_bot(engine.remote(), &settings.blossom.ocr_bot_username).await?
        } else {
            None
        };
        let scheduler = Scheduler::new(
            engine,
            shared,
            settings.schedule.clone(),
            settings.features,
            ocr_bot,
        );
        scheduler.run(None).await;
    }

    info!("user triggered shutdown; shutting down");
    Ok(())
}

/// First ctrl-c finishes the current item, then stops; the second kills.
fn spawn_shutdown_listener(shared: Arc<state::AppState>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("user triggered command line shutdown; will terminate after current item");
        shared.control.request_stop();
        shared.publish_log("WARN", "shutdown requested");

        if tokio::signal::ctrl_c().await.is_ok() {
            error!("user pressed ctrl-c twice; killing");
            std::process::exit(1);
        }
    });
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("TORA_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
