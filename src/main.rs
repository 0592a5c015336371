//! Sotto - realtime voice-conversation copilot
//!
//! Headless entry point. The realtime transport is provided by the
//! embedding platform; this binary wires the core to the stdio loopback
//! transport, which reads server events as JSON lines from stdin and
//! writes client events to stdout. Pass `--loopback` to skip the backend
//! token endpoint and use a fixed local credential.

use sotto::config::Config;
use sotto::runtime::{AppEvent, Runtime};
use sotto::session::stdio::{NullMediaSource, StaticTokenProvider, StdioConnector};
use sotto::session::token::TokenClient;
use sotto::session::TokenProvider;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; stdout is reserved for outbound channel events
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sotto=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Sotto");
    let config = Config::load_or_default()?;

    let loopback = std::env::args().any(|arg| arg == "--loopback");
    let tokens: Arc<dyn TokenProvider> = if loopback {
        Arc::new(StaticTokenProvider("loopback".to_string()))
    } else {
        Arc::new(TokenClient::new(config.api.base_url.clone()))
    };

    let (runtime, handle) = Runtime::new(
        config,
        tokens,
        Arc::new(NullMediaSource),
        Arc::new(StdioConnector),
    );

    // Relay UI notifications to the log
    let events = handle.events();
    std::thread::spawn(move || {
        while let Ok(event) = events.recv() {
            match event {
                AppEvent::StateChanged => tracing::debug!("State changed"),
                AppEvent::Error(message) => tracing::warn!("{}", message),
                AppEvent::Shutdown => break,
            }
        }
    });

    handle.start_session()?;
    let runner = tokio::spawn(runtime.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    handle.shutdown()?;
    runner.await?;
    Ok(())
}
