// SPDX-License-Identifier: GPL-3.0-or-later
use lingocast_config::AppConfig;

pub mod engine;
pub mod error;
pub mod session;

pub use engine::Engine;
pub use error::{ApplicationError, Result};
pub use session::{LatestGate, Resolution, Session, Ticket};

use tracing::info;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Build the engine for this configuration and wrap it in a session.
    pub async fn start(self) -> Result<Session> {
        let engine = Engine::open(self.config).await?;
        info!(target: "application", "application state initialized");
        Ok(Session::new(std::sync::Arc::new(engine)))
    }
}
