pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod storage;
pub mod utils;

pub use db::DbPool;

use anyhow::{Context, Result};
use config::Config;
use std::sync::Arc;

use crate::auth::Authenticator;
use crate::chat::{OpenAiGenerator, TextGenerator};
use crate::storage::UploadStore;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub auth: Authenticator,
    pub uploads: UploadStore,
    pub generator: Arc<dyn TextGenerator>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DbPool,
        auth: Authenticator,
        uploads: UploadStore,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            config,
            db,
            auth,
            uploads,
            generator,
        }
    }

    /// Build the state the server runs with: authenticator, upload store and
    /// generator all derived from `config`.
    pub fn from_config(config: Config, db: DbPool) -> Result<Self> {
        let auth = Authenticator::from_config(&config.auth)
            .context("Failed to initialize authentication")?;
        let uploads = UploadStore::new(&config.uploads.dir, config.uploads.max_file_bytes);
        let generator = OpenAiGenerator::new(&config.chat)
            .context("Failed to initialize chat client")?;

        if !generator.is_configured() {
            tracing::warn!("OPENAI_API_KEY not set; chat requests will fail");
        }

        Ok(Self::new(config, db, auth, uploads, Arc::new(generator)))
    }
}
