mod app;
mod cli;
mod config;
mod error;
mod history;
mod paths;
mod profile;
mod provider;
mod session;
mod spinner;

use anyhow::Context;
use clap::Parser;
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with streamed replies.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let config_dir = paths::config_dir()?;
    let cfg = config::Config::load_optional(paths::config_path(&config_dir))?;
    tracing::debug!(?config_dir, ?cfg, "resolved config");

    let mut store = profile::ProfileStore::open(paths::profiles_path(&config_dir))?;

    match args.cmd {
        Some(cli::Command::Add) => app::cmd_add(&mut store, cfg.as_ref()),
        Some(cli::Command::Switch { name }) => app::cmd_switch(&mut store, name),
        Some(cli::Command::Edit { name }) => app::cmd_edit(&mut store, cfg.as_ref(), name),
        Some(cli::Command::Delete { name }) => app::cmd_delete(&mut store, name),
        Some(cli::Command::DeleteAll) => app::cmd_delete_all(&mut store),
        Some(cli::Command::List) => app::cmd_list(&store),
        Some(cli::Command::Info) => app::cmd_info(&config_dir, &store),
        Some(cli::Command::Chat { max }) => chat(&mut store, cfg.as_ref(), max).await,
        None => chat(&mut store, cfg.as_ref(), None).await,
    }
}

async fn chat(
    store: &mut profile::ProfileStore,
    cfg: Option<&config::Config>,
    max: Option<u32>,
) -> anyhow::Result<()> {
    let connect_timeout = cfg
        .and_then(|c| c.connect_timeout_secs)
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(connect_timeout))
        .build()
        .context("failed to build HTTP client")?;

    app::cmd_chat(&http, store, cfg, max).await
}
