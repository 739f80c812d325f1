//! Grid coverage and required-set behavior, exercised through real renders.

use std::sync::Arc;
use std::time::Duration;

use tilescope::{
    Pyramid, RectF, ResampleDecoder, TileKey, TileOrigin, TileRenderer, TiledViewport,
    TilingConfig,
};

use super::test_utils::gradient_source;

fn renderer(width: u32, height: u32, tile_edge: u32) -> TileRenderer {
    let source = gradient_source(width, height);
    let pyramid = Arc::new(Pyramid::new(width, height, tile_edge).unwrap());
    TileRenderer::new(source, Arc::new(ResampleDecoder::new()), pyramid)
}

#[test]
fn test_every_grid_cell_renders_and_tiles_the_level() {
    let renderer = renderer(520, 390, 128);
    let pyramid = renderer.pyramid().clone();

    for info in pyramid.levels() {
        let mut area = 0u64;
        for row in 0..info.tiles_y {
            for col in 0..info.tiles_x {
                let tile = renderer.render(TileKey::new(info.level, col, row)).unwrap();
                // The bitmap matches the clipped destination exactly.
                assert_eq!(tile.pixels.width() as f64, tile.dest.width);
                assert_eq!(tile.pixels.height() as f64, tile.dest.height);
                assert!(tile.dest.right() <= info.width as f64);
                assert!(tile.dest.bottom() <= info.height as f64);
                area += tile.pixels.width() as u64 * tile.pixels.height() as u64;
            }
        }
        assert_eq!(
            area,
            info.width as u64 * info.height as u64,
            "level {} grid leaves gaps or overlaps",
            info.level
        );
    }
}

#[test]
fn test_rendering_a_key_twice_is_pixel_identical() {
    let renderer = renderer(1024, 768, 256);

    for key in [TileKey::new(0, 3, 2), TileKey::new(1, 1, 1), TileKey::new(2, 0, 0)] {
        let a = renderer.render(key).unwrap();
        let b = renderer.render(key).unwrap();
        assert_eq!(a.pixels.data(), b.pixels.data(), "key {key} not deterministic");
    }
}

#[tokio::test]
async fn test_quadrant_viewport_resolves_the_four_corner_tiles() {
    let config = TilingConfig {
        prefetch_margin: 0,
        ..TilingConfig::default()
    };
    let viewport = TiledViewport::new(
        gradient_source(4096, 4096),
        Arc::new(ResampleDecoder::new()),
        config,
    )
    .unwrap();

    // 4096/256 = 16x16 grid at level 0; the top-left 512px square needs
    // exactly the 2x2 corner keys.
    assert_eq!(viewport.pyramid().grid_size(0), Some((16, 16)));

    viewport
        .on_viewport_changed(RectF::new(0.0, 0.0, 512.0, 512.0), 0)
        .await;
    tokio::time::timeout(Duration::from_secs(30), viewport.wait_settled())
        .await
        .expect("viewport did not settle");

    let drawables = viewport.drawable_tiles().await;
    let mut keys: Vec<TileKey> = drawables
        .iter()
        .map(|d| match d.origin {
            TileOrigin::Exact(key) => key,
            other => panic!("expected only exact tiles, got {other:?}"),
        })
        .collect();
    keys.sort();

    assert_eq!(
        keys,
        vec![
            TileKey::new(0, 0, 0),
            TileKey::new(0, 0, 1),
            TileKey::new(0, 1, 0),
            TileKey::new(0, 1, 1),
        ]
    );

    // Placement rectangles line up with the grid.
    for drawable in &drawables {
        assert_eq!(drawable.dest.width, 256.0);
        assert_eq!(drawable.dest.x % 256.0, 0.0);
    }
}

#[tokio::test]
async fn test_prefetch_margin_adds_one_ring() {
    let config = TilingConfig {
        prefetch_margin: 1,
        ..TilingConfig::default()
    };
    let viewport = TiledViewport::new(
        gradient_source(4096, 4096),
        Arc::new(ResampleDecoder::new()),
        config,
    )
    .unwrap();

    viewport
        .on_viewport_changed(RectF::new(1024.0, 1024.0, 512.0, 512.0), 0)
        .await;
    tokio::time::timeout(Duration::from_secs(30), viewport.wait_settled())
        .await
        .expect("viewport did not settle");

    // 2x2 visible plus a full ring on every side.
    let (resident, _) = viewport.cache_stats().await;
    assert_eq!(resident, 16);
}
