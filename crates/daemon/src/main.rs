use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use markpanel_core::model::Provider;
use markpanel_daemon::{api, config::DaemonConfig, db::Db};
use markpanel_llm::{ProviderSettings, Schedule};
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "markpanel-daemon", version, about = "Trademark analysis panel daemon")]
struct Cli {
    /// Where the HTTP API will listen, e.g. 127.0.0.1:8080
    #[arg(long, env = "MARKPANEL_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// SurrealKV directory for the embedded case store.
    #[arg(long, env = "MARKPANEL_DB_DIR", default_value = ".markpanel/db")]
    db_dir: PathBuf,

    /// Keep cases in memory only (nothing survives a restart).
    #[arg(long, default_value_t = false)]
    in_memory: bool,

    /// Public origin used in case links, e.g. https://panel.example.com
    #[arg(long, env = "MARKPANEL_BASE_URL", default_value = "http://localhost:3000")]
    base_url: String,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,
    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    deepseek_api_key: Option<String>,
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Override the Anthropic endpoint (proxies, test doubles).
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    anthropic_base_url: Option<String>,
    #[arg(long, env = "DEEPSEEK_BASE_URL")]
    deepseek_base_url: Option<String>,
    #[arg(long, env = "GEMINI_BASE_URL")]
    gemini_base_url: Option<String>,
    #[arg(long, env = "OPENAI_BASE_URL")]
    openai_base_url: Option<String>,

    /// Ceiling for one provider call, streamed body included.
    #[arg(long, env = "MARKPANEL_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,

    /// `concurrent` or `sequential`.
    #[arg(long, env = "MARKPANEL_SCHEDULE", default_value_t = Schedule::Concurrent)]
    schedule: Schedule,

    /// Log filter, e.g. `info` or `markpanel_llm=debug,info`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log: String,
}

impl Cli {
    fn into_config(self) -> DaemonConfig {
        let mut providers = BTreeMap::new();
        for (provider, key, base_url) in [
            (Provider::Anthropic, self.anthropic_api_key, self.anthropic_base_url),
            (Provider::DeepSeek, self.deepseek_api_key, self.deepseek_base_url),
            (Provider::Gemini, self.gemini_api_key, self.gemini_base_url),
            (Provider::OpenAi, self.openai_api_key, self.openai_base_url),
        ] {
            let settings = ProviderSettings::default_for(provider)
                .with_api_key(key)
                .with_base_url(base_url);
            providers.insert(provider, settings);
        }

        let db_url = if self.in_memory {
            "mem://".to_string()
        } else {
            format!("surrealkv://{}", self.db_dir.display())
        };

        DaemonConfig {
            db_url,
            public_base_url: self.base_url,
            providers,
            call_timeout: Duration::from_secs(self.timeout_secs),
            schedule: self.schedule,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let listen = cli.listen;
    let config = cli.into_config();
    info!(
        db = %config.db_url,
        base_url = %config.public_base_url,
        schedule = %config.schedule,
        timeout = ?config.call_timeout,
        "starting markpanel daemon"
    );

    let db = Db::connect(&config.db_url).await?;
    db.bootstrap_schema().await?;

    let state = api::AppState::from_config(db, config)?;
    let runs = state.runs.clone();

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!("listening on http://{}", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runs.cancel_all();
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
