//! advisord - knowledge sync and agent daemon for financial advisors

use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advisor_core::{connect_crm, OAuthTokens, Source, UserId};
use advisor_daemon::{
    app::{self, App, AppSettings, Connectors},
    config::{redact, Args, Command},
    scheduler::{spawn_event_logger, spawn_poll_loop},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "advisord={lvl},advisor_daemon={lvl},advisor_sync={lvl},advisor_agent={lvl},advisor_core={lvl},info",
            lvl = log_level
        )
        .into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let command = args.command();

    info!("======================================");
    info!("  advisord - Advisor Knowledge Agent");
    info!("======================================");
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Command: {}", command_name(&command));
    if !args.dev_mode {
        info!("MongoDB: {} / {}", args.mongodb_uri, args.mongodb_db);
        info!("Vector index: {}", args.vector_index);
    }
    info!("Chat model: {} @ {}", args.llm.llm_model, args.llm.llm_base_url);
    info!("Chat API key: {}", redact(args.llm.llm_api_key.as_deref()));
    info!(
        "Embeddings: {} ({} dims), key {}",
        args.embedding.embedding_model,
        args.embedding.embedding_dimensions,
        redact(args.embedding.embedding_api_key.as_deref())
    );
    info!("Google OAuth: {}", redact(args.oauth.google_client_id.as_deref()));
    info!("HubSpot OAuth: {}", redact(args.oauth.hubspot_client_id.as_deref()));
    info!(
        "Fetch window: {} days, {} records per source",
        args.max_fetch_days, args.max_fetch_records
    );
    info!("======================================");

    let (stores, embedder) = match app::open_backends(&args).await {
        Ok(backends) => backends,
        Err(e) => {
            error!("Storage initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    let connectors = Connectors::from_oauth(&args.oauth);
    if connectors.mailbox.is_none() {
        warn!("Google OAuth not configured; mailbox and calendar sync disabled");
    }
    if connectors.crm.is_none() {
        warn!("HubSpot OAuth not configured; CRM sync disabled");
    }

    let backend = app::chat_backend(&args);
    if backend.is_available().await {
        info!("Chat model endpoint reachable");
    } else {
        warn!("Chat model endpoint {} is not reachable; answers and reactions will fail", args.llm.llm_base_url);
    }

    let app = App::build(
        stores,
        embedder,
        backend,
        connectors,
        AppSettings::from_args(&args),
    );

    match command {
        Command::Serve => serve(app, Duration::from_secs(args.poll_interval_secs)).await,
        Command::Sync { user, source } => sync(app, UserId::new(user), source).await,
        Command::Ask { user, message } => {
            let answer = app
                .ask
                .ask(&UserId::new(user), &message, &[])
                .await
                .context("ask failed")?;
            println!("{}", answer);
            Ok(())
        }
        Command::LoginGoogle {
            email,
            access_token,
            refresh_token,
            expires_in,
        } => {
            let tokens = tokens(access_token, refresh_token, expires_in);
            let user = app
                .stores
                .users
                .upsert_google(&email, tokens)
                .await
                .context("storing Google tokens failed")?;
            info!(user_id = %user.id, email = %user.email, "Google account linked");
            println!("{}", user.id);
            Ok(())
        }
        Command::ConnectCrm {
            user,
            access_token,
            refresh_token,
            expires_in,
        } => {
            let tokens = tokens(access_token, refresh_token, expires_in);
            connect_crm(app.stores.users.as_ref(), &UserId::new(user), tokens)
                .await
                .context("storing HubSpot tokens failed")?;
            Ok(())
        }
    }
}

async fn serve(mut app: App, poll_every: Duration) -> anyhow::Result<()> {
    // A previous process may have died mid-sync and left latches set.
    let swept = app
        .orchestrator
        .sweep_zombie_locks()
        .await
        .context("clearing stale sync flags failed")?;
    if swept > 0 {
        warn!(users = swept, "Cleared sync flags left by a previous run");
    }

    let worker = app
        .reactions
        .take()
        .ok_or_else(|| anyhow!("reaction worker already taken"))?;
    let reactions = tokio::spawn(worker.run());
    let events = spawn_event_logger(app.orchestrator.subscribe());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = spawn_poll_loop(app.orchestrator.clone(), poll_every, shutdown_rx);
    info!(interval_secs = poll_every.as_secs(), "advisord running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C failed")?;
    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    poller.await.context("poll loop panicked")?;

    // Dropping the last orchestrator closes the reaction queue; the worker
    // drains what is left and stops.
    drop(app);
    let stats = reactions.await.context("reaction worker panicked")?;
    info!(
        processed = stats.processed,
        acted = stats.acted,
        failed = stats.failed,
        "Reaction worker stopped"
    );
    events.abort();
    Ok(())
}

async fn sync(mut app: App, user_id: UserId, source: Option<String>) -> anyhow::Result<()> {
    let source = source
        .map(|s| s.parse::<Source>().map_err(|e| anyhow!(e)))
        .transpose()?;

    let reactions = app.reactions.take().map(|worker| tokio::spawn(worker.run()));

    let report = match source {
        Some(source) => app
            .orchestrator
            .sync_source(&user_id, source)
            .await
            .context("sync failed")?,
        None => Some(app.orchestrator.sync_all(&user_id).await.context("sync failed")?),
    };
    match report {
        Some(report) => println!(
            "fetched {} stored {} skipped {} failed {}",
            report.fetched, report.stored, report.skipped, report.failed
        ),
        None => println!("sync already running for {}", user_id),
    }

    drop(app);
    if let Some(reactions) = reactions {
        let stats = reactions.await.context("reaction worker panicked")?;
        info!(processed = stats.processed, acted = stats.acted, "Reactions finished");
    }
    Ok(())
}

fn tokens(access_token: String, refresh_token: Option<String>, expires_in: Option<i64>) -> OAuthTokens {
    let mut tokens = OAuthTokens::new(access_token);
    if let Some(refresh) = refresh_token {
        tokens = tokens.with_refresh_token(refresh);
    }
    if let Some(secs) = expires_in {
        tokens = tokens.with_expiry(Utc::now() + chrono::Duration::seconds(secs));
    }
    tokens
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Serve => "serve",
        Command::Sync { .. } => "sync",
        Command::Ask { .. } => "ask",
        Command::LoginGoogle { .. } => "login-google",
        Command::ConnectCrm { .. } => "connect-crm",
    }
}
