use std::path::Path;

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt::SubscriberBuilder, prelude::*};

use crate::config::Config;

/// One-shot host bootstrap: tracing, `.env` files, validated config.
///
/// Meant to be called once by the embedding shell before it constructs any
/// sessions. Respects RUST_LOG if set, defaults to info for this crate and
/// warn for noisy deps.
pub fn init() -> crate::Result<Config> {
    init_tracing();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting lesson gate");

    if Path::new(".env.local").exists() {
        dotenvy::from_filename(".env.local")?;
    } else if Path::new(".env").exists() {
        dotenvy::from_filename(".env")?;
    };
    let config = Config::load();
    match config.validate() {
        Ok(_) => {}
        Err(e) => {
            return Err(anyhow::anyhow!(e));
        }
    }
    Ok(config)
}

/// Install the subscriber; harmless if the host already installed one.
pub fn init_tracing() {
    let default_filter = format!("{}=info,reqwest=warn,h2=warn", env!("CARGO_PKG_NAME"));
    let env_filter = std::env::var("RUST_LOG").unwrap_or(default_filter);
    let _ = SubscriberBuilder::default()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .with_level(true)
        .pretty()
        .finish()
        .with(ErrorLayer::default())
        .try_init();
}
