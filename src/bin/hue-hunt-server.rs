//! Leaderboard server process.

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    let config = hue_hunt::config::ServerConfig::from_env();
    hue_hunt::server::run(config).await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
