use agenthub::config::AppConfig;
use agenthub::events::EventBus;
use agenthub::main_module::server::run_server;
use agenthub::shared::state::AppState;
use agenthub::store::EntityStore;
use anyhow::Context;
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    let store = EntityStore::open(&config.data_dir)
        .with_context(|| format!("opening store at {}", config.data_dir.display()))?;
    info!("agenthub starting on {}", config.bind_addr());

    let state = AppState {
        config,
        store: Arc::new(store),
        events: Arc::new(EventBus::new()),
    };

    run_server(state).await?;
    Ok(())
}
