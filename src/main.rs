use std::sync::Arc;

use anyhow::Error;
use tracing_subscriber::EnvFilter;

use testcase_serve::api::server::create_router;
use testcase_serve::config::ServerConfig;
use testcase_serve::llm::loader;
use testcase_serve::AppState;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env()?;
    tracing::info!("Starting with {:?}", config);

    let load_config = config.clone();
    let loaded = tokio::task::spawn_blocking(move || loader::load(&load_config)).await??;
    tracing::info!(
        "Model {} loaded on {:?}, eos tokens {:?}",
        config.model_id,
        loaded.device,
        loaded.eos_token_ids
    );

    let state = Arc::new(AppState::new(
        Box::new(loaded.model),
        loaded.tokenizer,
        config.model_id.clone(),
        config.profile,
        loaded.eos_token_ids,
    ));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!("Serving {} profile on http://{}", config.profile, config.bind_address());
    axum::serve(listener, app).await?;

    Ok(())
}
