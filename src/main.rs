use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;
use turnstile::{server, AdmissionGate, Config};

const DEFAULT_CONFIG_PATH: &str = "./Turnstile.yml";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());

    let config = Config::load_from_file(&config_path)
        .and_then(|c| c.into_runtime())
        .unwrap_or_else(|e| {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        });

    let gate = AdmissionGate::new(&config.rate_limit, config.identity_header.clone())
        .unwrap_or_else(|e| {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        });
    let gate = Arc::new(gate);

    let sweeper = gate.start_sweeper();

    let listener = server::bind(config.listen).await.unwrap_or_else(|e| {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    });

    info!(
        listen = %config.listen,
        active = config.rate_limit.active,
        "turnstile listening"
    );

    server::serve(listener, Arc::clone(&gate), server::shutdown_signal()).await;

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
        info!("sweeper stopped");
    }
}
