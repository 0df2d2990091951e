// This is the entry point of the blog comment service.
//
// **Architecture Overview:**
// - `core/` = Business logic (no HTTP, no SQL)
// - `infra/` = Implementations of core traits (SQLite, in-memory, reCAPTCHA)
// - `web/` = HTTP adapter (axum routes, status and header mapping)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the rate-limit sweeper
// 4. Serve HTTP until Ctrl+C / SIGTERM

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with several mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "web/web_layer.rs"]
mod web;

mod config;

use crate::config::{AppConfig, DatabaseConfig};
use crate::core::captcha::HumanVerifier;
use crate::core::comments::{CommentService, CommentStore};
use crate::core::rate_limit::RateLimiter;
use crate::infra::captcha::{DisabledVerifier, RecaptchaClient};
use crate::infra::comments::{InMemoryCommentStore, SqliteCommentStore};
use crate::web::AppState;
use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Post registered when running without a database, so the API is usable locally.
const DEMO_POST_ID: i64 = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    match config.database.clone() {
        DatabaseConfig::InMemory => {
            tracing::warn!("Using the in-memory comment store; comments are lost on restart");
            let store = InMemoryCommentStore::new();
            store.add_content_item(DEMO_POST_ID);
            run(config, store).await
        }
        DatabaseConfig::Sqlite(url) => {
            let store = SqliteCommentStore::new(&url)
                .await
                .with_context(|| format!("Failed to open comment database at {url}"))?;
            tracing::info!(database = %url, "Comment database ready");
            run(config, store).await
        }
    }
}

async fn run<S: CommentStore + 'static>(config: AppConfig, store: S) -> anyhow::Result<()> {
    let limiter = Arc::new(RateLimiter::new());
    let sweeper = Arc::clone(&limiter).spawn_sweeper(config.sweep_interval);

    let verifier: Arc<dyn HumanVerifier> = match config.recaptcha_secret.clone() {
        Some(secret) => Arc::new(RecaptchaClient::new(secret)?),
        None => {
            tracing::info!("RECAPTCHA_SECRET not set, human verification disabled");
            Arc::new(DisabledVerifier)
        }
    };

    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set, moderation routes will reject every request");
    }

    let comments = CommentService::new(store, limiter, config.comment_policy.clone());
    let state = Arc::new(AppState {
        comments,
        verifier,
        recaptcha_min_score: config.recaptcha_min_score,
        admin_token: config.admin_token.clone(),
    });

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(address = %config.bind_addr, "Comment service listening");

    let served = axum::serve(listener, web::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    tracing::info!("Comment service stopped");

    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received terminate signal, shutting down"),
    }
}
