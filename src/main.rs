use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod content;
mod error;
mod quiz;
mod sessions;
mod state;
mod web;

use crate::config::load_settings;
use crate::content::HttpContentSource;
use crate::error::Result as AppResult;
use crate::quiz::GeminiGenerator;
use crate::sessions::{SessionDeps, SessionManagerHandle};
use crate::state::AppState;
use crate::web::run_server;

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=info,tower_http=debug", env!("CARGO_PKG_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_settings = load_settings()?;
    tracing::info!("Configuration loaded: {:?}", app_settings);

    let generator = GeminiGenerator::new(app_settings.generator.clone())?;
    let content_source = HttpContentSource::new(&app_settings.content)?;
    tracing::info!(
        generator.model = %app_settings.generator.model,
        content.max_chars = app_settings.content.max_chars,
        "Quiz collaborators initialized"
    );

    let deps = SessionDeps::new(generator, content_source, &app_settings);
    let session_manager = SessionManagerHandle::spawn(app_settings.sessions.channel_capacity, deps);

    let app_state = AppState {
        sessions: session_manager,
    };

    run_server(app_state, app_settings.server).await?;

    Ok(())
}
