use std::collections::HashSet;
use std::sync::Arc;

use agora::application::pagination::PageWindow;
use agora::application::services::Services;
use agora::cache::{CacheConfig, CacheKey, CoherentCache, Lookup};
use agora::domain::password::PasswordHash;
use agora::domain::views::PostSnapshot;
use agora::infra::memory::InMemoryRepositories;
use metrics_util::debugging::DebuggingRecorder;

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let cache = CoherentCache::in_memory(CacheConfig::default());
    let services = Services::new(Arc::new(InMemoryRepositories::new()), cache.clone());
    let author = services
        .users
        .register("metrics", "metrics@example.com", PasswordHash::from_hash("hash"))
        .await
        .expect("registration succeeds")
        .id();

    // miss then hit on the same window
    let window = PageWindow::new(Some(10), None);
    services.feed.feed(author, window).await.expect("first read");
    services.feed.feed(author, window).await.expect("second read");

    // post creation invalidates the author's feed windows
    services
        .posts
        .create_post(author, "counted")
        .await
        .expect("post created");

    // a closed backend turns reads into errors
    cache.close().await;
    let lookup = cache.get::<PostSnapshot>(&CacheKey::User(author)).await;
    assert!(matches!(lookup, Lookup::Error(_)));

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "agora_cache_hit_total",
        "agora_cache_miss_total",
        "agora_cache_error_total",
        "agora_cache_invalidated_keys_total",
        "agora_feed_assemble_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
