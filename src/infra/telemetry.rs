use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "trellis_page_cache_hit_total",
            Unit::Count,
            "Total number of page cache hits."
        );
        describe_counter!(
            "trellis_page_cache_miss_total",
            Unit::Count,
            "Total number of page cache misses, stale epochs and expired entries included."
        );
        describe_counter!(
            "trellis_page_cache_write_total",
            Unit::Count,
            "Total number of rendered pages stored in the cache."
        );
        describe_counter!(
            "trellis_page_cache_evict_total",
            Unit::Count,
            "Total number of page cache evictions due to capacity."
        );
        describe_counter!(
            "trellis_page_cache_store_error_total",
            Unit::Count,
            "Total number of cache store failures treated as misses."
        );
        describe_counter!(
            "trellis_cache_epoch_bump_total",
            Unit::Count,
            "Total number of namespace invalidations."
        );
        describe_histogram!(
            "trellis_page_render_ms",
            Unit::Milliseconds,
            "Page rendering latency in milliseconds."
        );
    });
}
