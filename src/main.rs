use std::sync::Arc;

use anyhow::Context;

use leave_bot::commands::CommandService;
use leave_bot::config::BotConfig;
use leave_bot::directory::{self, DirectoryCache};
use leave_bot::members::MemberStore;
use leave_bot::routes::{AppState, COMMANDS_ROUTE, slack_routes};
use leave_bot::slack::{ChannelLister, SlackApiClient};
use leave_bot::store::JsonFile;
use leave_bot::subscriptions::SubscriptionManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::load().context("Failed to load configuration")?;

    eprintln!("🏖  Leave Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Data dir: {}", config.data_dir.display());
    eprintln!("   Commands: http://0.0.0.0:{}{}", config.port, COMMANDS_ROUTE);
    eprintln!("   Events:   http://0.0.0.0:{}{}", config.port, config.events_route);

    // ── Slack client ────────────────────────────────────────────────────
    let slack = Arc::new(
        SlackApiClient::new(config.bot_token.clone(), config.http_timeout)
            .context("Failed to create Slack client")?,
    );

    // ── Stores ──────────────────────────────────────────────────────────
    let directory = Arc::new(
        DirectoryCache::open(JsonFile::new(config.directory_path()), config.page_size).await,
    );
    let members = Arc::new(MemberStore::new(JsonFile::new(config.members_path())));
    let subscriptions = Arc::new(SubscriptionManager::new(
        Arc::clone(&directory),
        members,
    ));

    let commands = Arc::new(CommandService::new(
        subscriptions,
        slack.clone(),
        slack.clone(),
        slack.clone(),
    ));

    // ── Directory refresh ───────────────────────────────────────────────
    match commands.refresh_directory().await {
        Ok(count) => eprintln!("   Channels: {count}"),
        Err(e) => {
            tracing::warn!(error = %e, "Startup directory refresh failed, serving persisted mapping");
        }
    }

    let lister: Arc<dyn ChannelLister> = slack.clone();
    let _refresh_handle = directory::spawn_refresh_task(
        Arc::clone(&directory),
        lister,
        config.directory_refresh_interval,
    );

    // ── HTTP server ─────────────────────────────────────────────────────
    let state = AppState {
        commands,
        signing_secret: config.signing_secret.clone(),
        command_prefix: config.command_prefix.clone(),
    };
    let app = slack_routes(state, &config.events_route);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Leave bot listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    tracing::info!("Shutting down");
    Ok(())
}
