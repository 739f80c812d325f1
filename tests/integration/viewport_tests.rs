//! Viewport state machine: settling, idempotence, supersession, degradation.

use std::sync::Arc;
use std::time::Duration;

use tilescope::{
    build_overview, RectF, ResampleDecoder, TileKey, TileOrigin, TiledViewport, TilingConfig,
    ViewportPhase,
};

use super::test_utils::{
    gradient_source, CountingDecoder, FailingDecoder, FlakyAllocDecoder, SlowDecoder,
};

async fn settle(viewport: &TiledViewport) {
    tokio::time::timeout(Duration::from_secs(30), viewport.wait_settled())
        .await
        .expect("viewport did not settle");
}

fn no_margin() -> TilingConfig {
    TilingConfig {
        prefetch_margin: 0,
        ..TilingConfig::default()
    }
}

#[tokio::test]
async fn test_starts_idle_and_settles_after_first_viewport() {
    let viewport = TiledViewport::new(
        gradient_source(1024, 1024),
        Arc::new(ResampleDecoder::new()),
        no_margin(),
    )
    .unwrap();

    assert_eq!(viewport.phase().await, ViewportPhase::Idle);
    assert!(viewport.drawable_tiles().await.is_empty());

    viewport
        .on_viewport_changed(RectF::new(0.0, 0.0, 512.0, 512.0), 0)
        .await;
    settle(&viewport).await;

    assert_eq!(viewport.phase().await, ViewportPhase::Settled);
    let drawables = viewport.drawable_tiles().await;
    assert_eq!(drawables.len(), 4);
    assert!(drawables.iter().all(|d| !d.is_fallback()));
}

#[tokio::test]
async fn test_identical_viewport_dispatches_no_new_renders() {
    let decoder = Arc::new(CountingDecoder::new());
    let viewport = TiledViewport::new(gradient_source(2048, 2048), decoder.clone(), no_margin())
        .unwrap();
    let rect = RectF::new(0.0, 0.0, 768.0, 768.0);

    viewport.on_viewport_changed(rect, 0).await;
    settle(&viewport).await;
    let decodes_after_first = decoder.calls();
    assert_eq!(decodes_after_first, 9); // 3x3 tiles

    viewport.on_viewport_changed(rect, 0).await;
    settle(&viewport).await;

    assert_eq!(decoder.calls(), decodes_after_first);
    assert_eq!(viewport.stats().await.renders_dispatched, 9);
}

#[tokio::test]
async fn test_level_past_coarsest_is_clamped() {
    let viewport = TiledViewport::new(
        gradient_source(1024, 1024),
        Arc::new(ResampleDecoder::new()),
        no_margin(),
    )
    .unwrap();
    let coarsest = viewport.pyramid().coarsest_level();

    viewport
        .on_viewport_changed(RectF::new(0.0, 0.0, 256.0, 256.0), 99)
        .await;
    settle(&viewport).await;

    assert_eq!(viewport.viewport().await.unwrap().level, coarsest);
}

#[tokio::test]
async fn test_offscreen_viewport_settles_empty() {
    let viewport = TiledViewport::new(
        gradient_source(1024, 1024),
        Arc::new(ResampleDecoder::new()),
        no_margin(),
    )
    .unwrap();

    viewport
        .on_viewport_changed(RectF::new(5000.0, 5000.0, 512.0, 512.0), 0)
        .await;
    settle(&viewport).await;

    assert!(viewport.drawable_tiles().await.is_empty());
    assert_eq!(viewport.cache_stats().await.0, 0);
}

#[tokio::test]
async fn test_superseded_renders_never_draw_stale() {
    // Level-1 renders (downsample 2) sleep long enough for the viewport to
    // move on; level-0 renders are fast.
    let decoder = Arc::new(SlowDecoder::new(Duration::from_millis(200), 2));
    let viewport =
        TiledViewport::new(gradient_source(2048, 2048), decoder, no_margin()).unwrap();

    // Kick off slow coarse renders, then supersede them immediately.
    viewport
        .on_viewport_changed(RectF::new(0.0, 0.0, 512.0, 512.0), 1)
        .await;
    viewport
        .on_viewport_changed(RectF::new(1024.0, 1024.0, 512.0, 512.0), 0)
        .await;
    settle(&viewport).await;

    // The second generation settled while the first is still rendering.
    let drawables = viewport.drawable_tiles().await;
    assert_eq!(drawables.len(), 4);
    for drawable in &drawables {
        match drawable.origin {
            TileOrigin::Exact(key) => assert_eq!(key.level, 0),
            other => panic!("stale drawable {other:?}"),
        }
    }

    // Let the superseded renders finish: they land in the cache (eviction-
    // eligible, never drawn), and the next reconciliation clears them out.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let resident = viewport.resident_tiles().await;
    assert!(resident.iter().any(|k| k.level == 1), "superseded results discarded");

    viewport
        .on_viewport_changed(RectF::new(1024.0, 1024.0, 512.0, 512.0), 0)
        .await;
    settle(&viewport).await;
    assert!(viewport.resident_tiles().await.iter().all(|k| k.level == 0));
}

#[tokio::test]
async fn test_failed_renders_fall_back_to_coarser_resident_tiles() {
    // Coarse renders are slow and succeed; level-0 renders fail fast.
    let decoder = Arc::new(
        SlowDecoder::new(Duration::from_millis(150), 2).failing_below(2),
    );
    let viewport =
        TiledViewport::new(gradient_source(1024, 1024), decoder, no_margin()).unwrap();

    // Request the level-1 view of the top-left quadrant, then switch to the
    // level-0 view of the same region before the coarse renders finish.
    viewport
        .on_viewport_changed(RectF::new(0.0, 0.0, 256.0, 256.0), 1)
        .await;
    viewport
        .on_viewport_changed(RectF::new(0.0, 0.0, 512.0, 512.0), 0)
        .await;
    settle(&viewport).await;

    // Every level-0 render failed for this generation.
    let failed = viewport.failed_tiles().await;
    assert_eq!(failed.len(), 4);
    assert!(failed.iter().all(|k| k.level == 0));

    // Once the coarse render lands (superseded but cached), it stands in
    // for all four missing level-0 tiles.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let drawables = viewport.drawable_tiles().await;
    assert_eq!(drawables.len(), 1);
    match drawables[0].origin {
        TileOrigin::Fallback(key) => {
            assert_eq!(key, TileKey::new(1, 0, 0));
        }
        other => panic!("expected a fallback, got {other:?}"),
    }
    // The coarse tile's footprint doubles when mapped into level-0 space.
    assert_eq!(drawables[0].dest, RectF::new(0.0, 0.0, 512.0, 512.0));
}

#[tokio::test]
async fn test_failed_keys_are_retried_on_the_next_viewport_change() {
    let decoder = Arc::new(FailingDecoder::new(2));
    let viewport =
        TiledViewport::new(gradient_source(1024, 1024), decoder, no_margin()).unwrap();
    let rect = RectF::new(0.0, 0.0, 512.0, 512.0);

    viewport.on_viewport_changed(rect, 0).await;
    settle(&viewport).await;
    assert_eq!(viewport.failed_tiles().await.len(), 4);
    let first_failures = viewport.stats().await.renders_failed;

    // Re-requiring the same keys dispatches fresh attempts.
    viewport.on_viewport_changed(rect, 0).await;
    settle(&viewport).await;
    assert!(viewport.stats().await.renders_failed > first_failures);
}

#[tokio::test]
async fn test_allocation_failure_gets_one_retry() {
    let decoder = Arc::new(FlakyAllocDecoder::new());
    let viewport =
        TiledViewport::new(gradient_source(1024, 1024), decoder, no_margin()).unwrap();

    viewport
        .on_viewport_changed(RectF::new(0.0, 0.0, 512.0, 512.0), 0)
        .await;
    settle(&viewport).await;

    // Every tile failed its first decode, got retried, and came back.
    assert!(viewport.failed_tiles().await.is_empty());
    assert_eq!(viewport.cache_stats().await.0, 4);
    let stats = viewport.stats().await;
    assert_eq!(stats.renders_dispatched, 8);
    assert_eq!(stats.renders_failed, 0);
    assert!(viewport.drawable_tiles().await.iter().all(|d| !d.is_fallback()));
}

#[tokio::test]
async fn test_cache_pressure_drops_one_of_five_required() {
    // Room for four tiles, five required: the generation still settles,
    // with exactly one key degraded.
    let config = TilingConfig {
        prefetch_margin: 0,
        max_tiles: 4,
        ..TilingConfig::default()
    };
    let viewport = TiledViewport::new(
        gradient_source(2048, 2048),
        Arc::new(ResampleDecoder::new()),
        config,
    )
    .unwrap();

    // One row of five tiles.
    viewport
        .on_viewport_changed(RectF::new(0.0, 0.0, 1280.0, 256.0), 0)
        .await;
    settle(&viewport).await;

    assert_eq!(viewport.cache_stats().await.0, 4);
    assert_eq!(viewport.failed_tiles().await.len(), 1);
    let drawables = viewport.drawable_tiles().await;
    assert_eq!(drawables.iter().filter(|d| !d.is_fallback()).count(), 4);
}

#[tokio::test]
async fn test_backdrop_is_painted_first() {
    let source = gradient_source(1024, 1024);
    let decoder = Arc::new(ResampleDecoder::new());
    let viewport = TiledViewport::new(source.clone(), decoder.clone(), no_margin()).unwrap();

    let backdrop = build_overview(&source, decoder.as_ref(), 128).unwrap();
    viewport.set_backdrop(backdrop).await;

    viewport
        .on_viewport_changed(RectF::new(0.0, 0.0, 512.0, 512.0), 0)
        .await;
    settle(&viewport).await;

    let drawables = viewport.drawable_tiles().await;
    assert_eq!(drawables[0].origin, TileOrigin::Backdrop);
    // The backdrop spans the whole level-0 logical space.
    assert_eq!(drawables[0].dest, RectF::new(0.0, 0.0, 1024.0, 1024.0));
    assert_eq!(drawables.len(), 5);
}
