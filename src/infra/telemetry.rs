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
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
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

/// Registers descriptions for every metric the crate emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "agora_cache_hit_total",
            Unit::Count,
            "Cache reads answered from the cache, by key family."
        );
        describe_counter!(
            "agora_cache_miss_total",
            Unit::Count,
            "Cache reads that found no usable entry, by key family."
        );
        describe_counter!(
            "agora_cache_error_total",
            Unit::Count,
            "Cache backend failures and timeouts, by key family and operation."
        );
        describe_counter!(
            "agora_cache_invalidated_keys_total",
            Unit::Count,
            "Cache entries removed by write-path invalidation, by mutation."
        );
        describe_counter!(
            "agora_cache_invalidation_failures_total",
            Unit::Count,
            "Invalidation steps that failed, by mutation."
        );
        describe_histogram!(
            "agora_feed_assemble_ms",
            Unit::Milliseconds,
            "Feed assembly latency from the repository in milliseconds."
        );
    });
}
