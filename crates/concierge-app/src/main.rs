//! Concierge application binary - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Install the tracing subscriber
//! 3. Build the backend gateway (HTTP, or in-memory with --offline)
//! 4. Wire the session engine, report query and voice input around one draft
//! 5. Run the terminal shell until stdin closes

mod cli;
mod render;
mod repl;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use concierge_chat::{ReportQuery, SessionEngine};
use concierge_core::{ConciergeConfig, DraftText};
use concierge_gateway::{BackendGateway, HttpGateway, MockGateway};
use concierge_voice::{FixedProbe, PermissionStatus, TranscriptionSource, VoiceInput};

use cli::CliArgs;
use repl::Shell;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let loaded = ConciergeConfig::load(&config_file);
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => ConciergeConfig::default(),
    };
    config.backend.base_url = args.resolve_base_url(&config.backend.base_url);
    config.backend.api_token = args.resolve_token(&config.backend.api_token);
    config.general.log_level = args.resolve_log_level(&config.general.log_level);

    // Tracing. Logs go to stderr so they do not interleave with the shell.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Concierge v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::info!(
            path = %config_file.display(),
            error = %e,
            "No usable configuration file; using defaults"
        ),
    }
    config.validate()?;

    // Gateway.
    let gateway: Arc<dyn BackendGateway> = if args.offline {
        tracing::info!("Offline mode: using the in-memory backend");
        Arc::new(MockGateway::storefront())
    } else {
        tracing::info!(base_url = %config.backend.base_url, "Using storefront backend");
        Arc::new(HttpGateway::new(&config.backend)?)
    };

    // Session, reports and voice share one outbound draft.
    let draft = DraftText::new();
    let engine = SessionEngine::new(Arc::clone(&gateway), config.chat.clone(), draft.clone());
    let reports = ReportQuery::new(gateway, draft.clone(), engine.events());

    // A terminal has no speech recognizer; the microphone reports unsupported.
    let recognizer = None;
    let source = TranscriptionSource::new(
        recognizer,
        FixedProbe::new(PermissionStatus::Unavailable),
        config.voice.language.clone(),
    );
    let voice = if config.voice.enabled {
        Some(VoiceInput::new(source, draft).with_events(engine.events()))
    } else {
        tracing::debug!("Voice input disabled in config");
        None
    };

    // Event log.
    let mut events = engine.events().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!(event = event.event_name(), "Session event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    Shell::new(engine, reports, voice).run().await?;
    tracing::info!("Concierge stopped");
    Ok(())
}
