use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default tracing subscriber
///
/// Reads `RUST_LOG` (after `.env` is loaded) and falls back to `info`.
/// Returns an error if a global subscriber is already set.
pub fn init() -> Result<(), String> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| format!("Failed to install tracing subscriber: {}", e))
}
