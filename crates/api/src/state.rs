use std::sync::Arc;

use anyhow::Context;
use farbound_domain::ports::guest::GuestRepository;
use farbound_domain::ports::message::MessageRepository;
use farbound_infra::config::AppConfig;
use farbound_infra::db::{DbConfig, SurrealAdapter};
use farbound_infra::repositories::{
    InMemoryGuestRepository, InMemoryMessageRepository, SurrealGuestRepository,
    SurrealMessageRepository, surreal_client,
};

use crate::relay::ChatRelay;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub message_repo: Arc<dyn MessageRepository>,
    pub guest_repo: Arc<dyn GuestRepository>,
    pub relay: ChatRelay,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let relay = ChatRelay::new(config.relay_channel_capacity);

        if config.data_backend.eq_ignore_ascii_case("surreal") {
            let db_config = DbConfig::from_app_config(&config);
            SurrealAdapter::new(db_config.clone())
                .health_check()
                .await
                .context("surreal backend unavailable")?;

            // Both repositories ride the same connection.
            let client = surreal_client(&db_config)
                .await
                .context("surreal connect failed")?;

            return Ok(Self {
                config,
                message_repo: Arc::new(SurrealMessageRepository::with_client(client.clone())),
                guest_repo: Arc::new(SurrealGuestRepository::with_client(client)),
                relay,
            });
        }

        tracing::info!(backend = %config.data_backend, "using in-memory repositories");
        Ok(Self {
            config,
            message_repo: Arc::new(InMemoryMessageRepository::new()),
            guest_repo: Arc::new(InMemoryGuestRepository::new()),
            relay,
        })
    }

    #[cfg(test)]
    pub fn with_repositories(
        config: AppConfig,
        message_repo: Arc<dyn MessageRepository>,
        guest_repo: Arc<dyn GuestRepository>,
    ) -> Self {
        let relay = ChatRelay::new(config.relay_channel_capacity);
        Self {
            config,
            message_repo,
            guest_repo,
            relay,
        }
    }
}
