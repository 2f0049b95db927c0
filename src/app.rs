//! Application wiring: every shared dependency is constructed once here
//! and injected explicitly, so tests can substitute fakes at any seam.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::{
    cache::InMemoryGeocodeCache,
    clients::{
        GeocodeProvider, GoogleClient, GoogleConfig, NominatimClient, NominatimConfig,
    },
    config::Config,
    pipeline::{BatchScheduler, BatchSettings, PipelineOrchestrator},
    queue::{GeocodeJobQueue, QueueSettings},
    resolver::{GeocodeResolver, ResolverConfig},
};

pub struct ComponentRegistry {
    config: Arc<Config>,
    queue: Arc<GeocodeJobQueue>,
}

impl ComponentRegistry {
    /// Build all shared components and start the queue workers.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns an error when artifact directories cannot be created or
    /// an HTTP client fails to build.
    pub fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        fs::create_dir_all(config.upload_dir()).with_context(|| {
            format!("failed to create upload dir {}", config.upload_dir().display())
        })?;
        fs::create_dir_all(config.processed_dir()).with_context(|| {
            format!(
                "failed to create processed dir {}",
                config.processed_dir().display()
            )
        })?;

        let cache = Arc::new(InMemoryGeocodeCache::new(config.cache_ttl()));

        let primary: Arc<dyn GeocodeProvider> = Arc::new(NominatimClient::new(NominatimConfig {
            base_url: config.nominatim_base_url().to_string(),
            user_agent: config.nominatim_user_agent().to_string(),
            connect_timeout: config.connect_timeout(),
            total_timeout: config.primary_timeout(),
        })?);

        let secondary: Option<Arc<dyn GeocodeProvider>> = match config.google_api_key() {
            Some(key) => Some(Arc::new(GoogleClient::new(GoogleConfig {
                base_url: config.google_base_url().to_string(),
                api_key: key.to_string(),
                connect_timeout: config.connect_timeout(),
                total_timeout: config.secondary_timeout(),
            })?)),
            None => {
                info!("no GOOGLE_API_KEY configured, secondary provider disabled");
                None
            }
        };

        let resolver = Arc::new(GeocodeResolver::new(
            cache,
            primary,
            secondary,
            ResolverConfig {
                primary_timeout: config.primary_timeout(),
                secondary_timeout: config.secondary_timeout(),
            },
        ));

        let scheduler = BatchScheduler::new(
            resolver,
            BatchSettings {
                batch_size: config.batch_size().get(),
                worker_count: config.worker_count().get(),
                primary_pace: config.primary_pace(),
                secondary_pace: config.secondary_pace(),
            },
        );

        let orchestrator = Arc::new(PipelineOrchestrator::new(
            scheduler,
            config.address_column().to_string(),
        ));

        let queue = Arc::new(GeocodeJobQueue::new(
            orchestrator,
            QueueSettings {
                upload_dir: config.upload_dir().clone(),
                processed_dir: config.processed_dir().clone(),
                address_column: config.address_column().to_string(),
                poll_interval: config.queue_poll_interval(),
                job_concurrency: config.job_concurrency().get(),
            },
        ));

        Ok(Self { config, queue })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn queue(&self) -> Arc<GeocodeJobQueue> {
        Arc::clone(&self.queue)
    }
}
