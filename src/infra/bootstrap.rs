//! Wiring of settings and content into the public and admin HTTP states.

use std::sync::Arc;

use tracing::info;

use crate::application::pipeline::{Collaborators, PipelineConfig, RequestPipeline};
use crate::application::publish::PublishService;
use crate::cache::{CacheConfig, MemoryStore, ResponseCache, TtlPolicy};
use crate::config::{ContentSettings, Settings};
use crate::infra::content::{ContentArchive, ContentSummary, InMemoryContent};
use crate::infra::error::InfraError;
use crate::infra::http::{AdminState, HttpState};

pub struct ApplicationContext {
    pub http: HttpState,
    pub admin: AdminState,
    pub summary: ContentSummary,
}

fn pipeline_config(cache: &CacheConfig, content: &ContentSettings) -> PipelineConfig {
    PipelineConfig {
        cache_enabled: cache.enabled,
        language_prefix: content.language_prefix,
        append_slash: content.append_slash,
        login_url: content.login_url.clone(),
        default_xframe_options: content.default_xframe_options,
        timezone_aware: cache.timezone_aware,
    }
}

/// Read the configured content file and build the application around it.
pub async fn load_application(settings: &Settings) -> Result<ApplicationContext, InfraError> {
    let archive = ContentArchive::load(&settings.content.file)
        .await
        .map_err(|err| {
            InfraError::content(format!(
                "failed to load {}: {err}",
                settings.content.file.display()
            ))
        })?;
    build_application(settings, archive)
}

pub fn build_application(
    settings: &Settings,
    archive: ContentArchive,
) -> Result<ApplicationContext, InfraError> {
    let (sites, content) = InMemoryContent::from_archive(archive)?;
    let sites = Arc::new(sites);
    let content = Arc::new(content);
    let summary = content.summary();

    let cache_config = CacheConfig::from(&settings.cache);
    let store = Arc::new(MemoryStore::new(cache_config.capacity_non_zero()));
    let cache = ResponseCache::new(store, cache_config.namespace.clone());
    let ttl = TtlPolicy::new(cache_config.ttl());

    let pipeline = RequestPipeline::new(
        Collaborators {
            sites,
            tree: content.clone(),
            contents: content.clone(),
            permissions: content.clone(),
            renderer: content.clone(),
        },
        cache.clone(),
        ttl,
        pipeline_config(&cache_config, &settings.content),
    );
    let publish = PublishService::new(content, cache.clone());

    info!(
        sites = summary.sites,
        pages = summary.pages,
        cache_enabled = cache_config.enabled,
        namespace = %cache_config.namespace,
        "application context ready"
    );

    Ok(ApplicationContext {
        http: HttpState {
            pipeline: Arc::new(pipeline),
        },
        admin: AdminState {
            publish: Arc::new(publish),
            cache,
        },
        summary,
    })
}
