mod common;

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use metrics_util::debugging::DebuggingRecorder;
use serial_test::serial;
use trellis::application::pipeline::PageRequest;
use trellis::cache::{MemoryStore, ResponseCache};
use trellis::domain::entities::SiteId;

#[tokio::test]
#[serial]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Miss, write, hit and render latency through the pipeline.
    let app = common::application(true);
    let pipeline = &app.http.pipeline;
    pipeline.serve(&PageRequest::get(SiteId(1), "/en/contact/")).await;
    pipeline.serve(&PageRequest::get(SiteId(1), "/en/contact/")).await;

    // Epoch bump.
    app.admin.publish.invalidate().await;

    // Capacity eviction on a one-entry store.
    let cache = ResponseCache::new(
        Arc::new(MemoryStore::new(NonZeroUsize::new(1).expect("non-zero"))),
        "evict",
    );
    cache.put("a", Bytes::from_static(b"a"), Vec::new(), 60).await;
    cache.put("b", Bytes::from_static(b"b"), Vec::new(), 60).await;

    let keys: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, _)| key.key().name().to_string())
        .collect();

    for expected in [
        "trellis_page_cache_miss_total",
        "trellis_page_cache_write_total",
        "trellis_page_cache_hit_total",
        "trellis_cache_epoch_bump_total",
        "trellis_page_cache_evict_total",
        "trellis_page_render_ms",
    ] {
        assert!(keys.contains(expected), "missing metric {expected}");
    }
}
