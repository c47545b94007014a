use std::env;

use anyhow::Context;
use messages2chat::config::{ConfigSeed, Settings};
use messages2chat::server::build_router;
use messages2chat::store::open_store;
use messages2chat::util::{init_tracing, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let config_arg = args
        .iter()
        .find(|a| a.starts_with("--config="))
        .and_then(|a| a.strip_prefix("--config="))
        .map(|s| s.to_string());

    let settings = Settings::from_env();
    let store =
        open_store(settings.store_path.as_deref()).context("Failed to open config store")?;

    if let Some(path) = config_arg {
        tracing::info!("Seeding config store from: {}", path);
        match ConfigSeed::load_from_file(&path) {
            Ok(seed) => match seed.apply(store.as_ref()).await {
                Ok(n) => tracing::info!("Seeded {} config keys", n),
                Err(e) => tracing::error!("Failed to write config seed: {}", e),
            },
            Err(e) => {
                tracing::error!("Failed to load config seed: {:#}", e);
                tracing::warn!("Continuing with the existing store contents");
            }
        }
    } else {
        let bin = args.first().map(String::as_str).unwrap_or("messages2chat");
        tracing::info!("Usage: {} [--config=config.json]", bin);
    }

    if settings.admin_key.is_none() {
        tracing::info!("ADMIN_KEY not set; /admin/config is disabled");
    }

    let addr = settings.bind_addr.clone();
    let app = build_router(AppState::new(settings, store));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("messages2chat listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .await
        .context("Server error")?;
    Ok(())
}
