use std::env;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use xero_export::AppState;
use xero_export::api::start_webserver;
use xero_export::config::{CONFIG_FILE, load_config};

fn initialize_standard_tracing() {
    let default_directives = "xero_export=info,hyper=warn,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    initialize_standard_tracing();

    // Fail fast on a broken config; requests re-read it anyway.
    let config = load_config()?;
    tracing::info!(
        api_url = %config.api_url,
        output = %config.files_path,
        cwd = ?env::current_dir().ok(),
        "configuration loaded"
    );

    let state = AppState::new(CONFIG_FILE)?;
    start_webserver(state).await?;
    Ok(())
}
