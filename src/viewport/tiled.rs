//! The tiled viewport state machine.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, trace, warn};

use crate::config::TilingConfig;
use crate::error::{RenderError, SourceError};
use crate::geometry::RectF;
use crate::pyramid::{Pyramid, TileKey};
use crate::source::{PixelBuffer, RegionDecoder, SourceImage};
use crate::tile::{Tile, TileCache, TileRenderer};

use super::{DrawableTile, TileOrigin, Viewport, ViewportPhase, ViewportStats};

// =============================================================================
// Internal state
// =============================================================================

/// Result of one worker render, reported back to the apply task.
struct RenderOutcome {
    key: TileKey,
    generation: u64,
    result: Result<Tile, RenderError>,
}

struct ViewState {
    viewport: Option<Viewport>,
    phase: ViewportPhase,
    generation: u64,
    required: HashSet<TileKey>,
    /// Keys with a render in flight, across generations.
    pending: HashSet<TileKey>,
    /// Keys that failed permanently for the current generation.
    failed: HashSet<TileKey>,
    /// Keys already given their one post-eviction retry this generation.
    retried: HashSet<TileKey>,
    stats: ViewportStats,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            viewport: None,
            phase: ViewportPhase::Idle,
            generation: 0,
            required: HashSet::new(),
            pending: HashSet::new(),
            failed: HashSet::new(),
            retried: HashSet::new(),
            stats: ViewportStats::default(),
        }
    }
}

impl ViewState {
    /// Whether any in-flight render still matters to the current viewport.
    fn waiting_on_required(&self) -> bool {
        self.pending.iter().any(|k| self.required.contains(k))
    }
}

// =============================================================================
// TiledViewport
// =============================================================================

/// Owns the viewport-to-tiles mapping and drives renderer and cache.
///
/// The surface collaborator calls [`TiledViewport::on_viewport_changed`] on
/// every scroll or zoom event (cheap, safe at gesture frequency) and reads
/// [`TiledViewport::drawable_tiles`] whenever it wants to composite. Tile
/// rendering happens on the blocking worker pool; a single apply task folds
/// completions back into the cache, re-checking the *current* required set
/// so superseded results never cause a stale draw.
pub struct TiledViewport {
    pyramid: Arc<Pyramid>,
    renderer: TileRenderer,
    cache: Arc<TileCache>,
    prefetch_margin: u32,
    state: Arc<RwLock<ViewState>>,
    settle: Arc<Notify>,
    outcome_tx: mpsc::UnboundedSender<RenderOutcome>,
    backdrop: RwLock<Option<PixelBuffer>>,
}

impl TiledViewport {
    /// Create a viewport over `source` using the given decode capability.
    ///
    /// Spawns the apply task on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SourceError`] if the source dimensions or tile edge are unusable.
    /// This is the session-start validity gate; nothing after construction
    /// is fatal.
    pub fn new(
        source: Arc<SourceImage>,
        decoder: Arc<dyn RegionDecoder>,
        config: TilingConfig,
    ) -> Result<Self, SourceError> {
        let pyramid = Arc::new(Pyramid::new(
            source.width(),
            source.height(),
            config.tile_edge,
        )?);
        let cache = Arc::new(TileCache::with_budget(config.max_bytes, config.max_tiles));
        let renderer = TileRenderer::new(source, decoder, pyramid.clone());
        let state = Arc::new(RwLock::new(ViewState::default()));
        let settle = Arc::new(Notify::new());

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        tokio::spawn(apply_loop(
            outcome_rx,
            state.clone(),
            cache.clone(),
            settle.clone(),
            renderer.clone(),
            outcome_tx.downgrade(),
        ));

        Ok(Self {
            pyramid,
            renderer,
            cache,
            prefetch_margin: config.prefetch_margin,
            state,
            settle,
            outcome_tx,
            backdrop: RwLock::new(None),
        })
    }

    /// The pyramid geometry for this session.
    pub fn pyramid(&self) -> &Arc<Pyramid> {
        &self.pyramid
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> ViewportPhase {
        self.state.read().await.phase
    }

    /// The most recent viewport, if any.
    pub async fn viewport(&self) -> Option<Viewport> {
        self.state.read().await.viewport
    }

    /// Counters accumulated so far.
    pub async fn stats(&self) -> ViewportStats {
        self.state.read().await.stats
    }

    /// Resident tile count and bytes, for introspection.
    pub async fn cache_stats(&self) -> (usize, usize) {
        (self.cache.len().await, self.cache.resident_bytes().await)
    }

    /// Keys of all resident tiles.
    pub async fn resident_tiles(&self) -> Vec<TileKey> {
        self.cache.resident_keys().await
    }

    /// Keys marked unresolvable for the current generation, sorted.
    ///
    /// Cleared on every viewport change; a key that is re-required later
    /// gets a fresh render attempt.
    pub async fn failed_tiles(&self) -> Vec<TileKey> {
        let state = self.state.read().await;
        let mut keys: Vec<TileKey> = state.failed.iter().copied().collect();
        keys.sort();
        keys
    }

    /// Install a whole-image backdrop drawn beneath the tiles.
    ///
    /// Typically the overview rendition; see [`crate::overview`].
    pub async fn set_backdrop(&self, pixels: PixelBuffer) {
        *self.backdrop.write().await = Some(pixels);
    }

    /// Remove the backdrop.
    pub async fn clear_backdrop(&self) {
        *self.backdrop.write().await = None;
    }

    /// Notify the viewport that the visible rectangle or zoom level changed.
    ///
    /// Recomputes the required set, dispatches renders for misses, and
    /// applies visibility eviction. Never blocks on rendering; safe to call
    /// every frame during a gesture. A level past the coarsest is clamped.
    pub async fn on_viewport_changed(&self, rect: RectF, level: u32) {
        let level = level.min(self.pyramid.coarsest_level());
        let required = self.pyramid.required_tiles(rect, level, self.prefetch_margin);

        let mut state = self.state.write().await;
        state.generation += 1;
        state.viewport = Some(Viewport::new(rect, level));
        state.required = required;
        state.failed.clear();
        state.retried.clear();
        state.stats.reconciliations += 1;

        let required_keys: Vec<TileKey> = state.required.iter().copied().collect();
        let mut to_render: Vec<TileKey> = Vec::new();
        let mut hits = 0u64;
        for key in required_keys {
            if self.cache.contains(key).await {
                hits += 1;
            } else if !state.pending.contains(&key) {
                state.pending.insert(key);
                to_render.push(key);
            }
        }
        state.stats.cache_hits += hits;
        state.stats.renders_dispatched += to_render.len() as u64;

        self.cache.retain(&state.required).await;
        state.stats.tiles_evicted += self.cache.evict_ineligible().await as u64;

        state.phase = if state.waiting_on_required() {
            ViewportPhase::Reconciling
        } else {
            ViewportPhase::Settled
        };
        debug!(
            generation = state.generation,
            level,
            required = state.required.len(),
            dispatched = to_render.len(),
            phase = ?state.phase,
            "viewport changed"
        );
        if state.phase == ViewportPhase::Settled {
            self.settle.notify_waiters();
        }

        let generation = state.generation;
        drop(state);
        for key in to_render {
            self.dispatch(key, generation);
        }
    }

    /// The current best-known set of bitmaps to composite, in paint order:
    /// backdrop, then coarse fallbacks for missing or failed tiles, then
    /// exact tiles.
    ///
    /// Recomputed fresh on every call; re-query after each reconciliation.
    pub async fn drawable_tiles(&self) -> Vec<DrawableTile> {
        let state = self.state.read().await;
        let Some(viewport) = state.viewport else {
            return Vec::new();
        };
        let level = viewport.level;

        let mut required: Vec<TileKey> = state.required.iter().copied().collect();
        required.sort();

        let mut exact = Vec::with_capacity(required.len());
        let mut fallbacks: BTreeMap<TileKey, Arc<Tile>> = BTreeMap::new();
        for key in required {
            if let Some(tile) = self.cache.get(key).await {
                exact.push(DrawableTile::exact(&tile));
            } else if let Some((ancestor, tile)) = self.coarser_resident(key).await {
                fallbacks.entry(ancestor).or_insert(tile);
            }
        }
        drop(state);

        let mut out = Vec::with_capacity(exact.len() + fallbacks.len() + 1);
        if let Some(pixels) = self.backdrop.read().await.clone() {
            if let Some(info) = self.pyramid.level(level) {
                out.push(DrawableTile {
                    pixels,
                    dest: RectF::new(0.0, 0.0, info.width as f64, info.height as f64),
                    origin: TileOrigin::Backdrop,
                });
            }
        }
        // Coarsest fallbacks first so finer bitmaps paint over them.
        for (key, tile) in fallbacks.iter().rev() {
            let factor = (1u64 << (key.level - level)) as f64;
            out.push(DrawableTile {
                pixels: tile.pixels.clone(),
                dest: tile.dest.scaled(factor),
                origin: TileOrigin::Fallback(*key),
            });
        }
        out.extend(exact);
        out
    }

    /// Wait until the current viewport generation settles.
    pub async fn wait_settled(&self) {
        loop {
            let notified = self.settle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state.read().await.phase == ViewportPhase::Settled {
                return;
            }
            notified.await;
        }
    }

    fn dispatch(&self, key: TileKey, generation: u64) {
        trace!(%key, generation, "dispatching render");
        spawn_render(
            self.renderer.clone(),
            self.outcome_tx.clone(),
            key,
            generation,
        );
    }

    /// Nearest coarser resident tile covering `key`'s region, if any.
    async fn coarser_resident(&self, key: TileKey) -> Option<(TileKey, Arc<Tile>)> {
        let coarsest = self.pyramid.coarsest_level();
        for up in 1..=coarsest.saturating_sub(key.level) {
            let ancestor = key.ancestor(up);
            if let Some(tile) = self.cache.get(ancestor).await {
                return Some((ancestor, tile));
            }
        }
        None
    }
}

/// Run one render on the blocking pool and report its outcome.
fn spawn_render(
    renderer: TileRenderer,
    tx: mpsc::UnboundedSender<RenderOutcome>,
    key: TileKey,
    generation: u64,
) {
    tokio::task::spawn_blocking(move || {
        let result = renderer.render(key);
        // The viewport may be gone by the time a render finishes.
        let _ = tx.send(RenderOutcome {
            key,
            generation,
            result,
        });
    });
}

// =============================================================================
// Apply task
// =============================================================================

/// Folds render completions into the cache and settles the state machine.
///
/// Results are applied regardless of generation: a superseded render still
/// lands in the cache (cheap to keep, immediately eviction-eligible), but
/// only keys in the *current* required set can mark the generation failed
/// or drawable. Exits when the owning viewport and all in-flight renders
/// are gone.
async fn apply_loop(
    mut rx: mpsc::UnboundedReceiver<RenderOutcome>,
    state: Arc<RwLock<ViewState>>,
    cache: Arc<TileCache>,
    settle: Arc<Notify>,
    renderer: TileRenderer,
    retry_tx: mpsc::WeakUnboundedSender<RenderOutcome>,
) {
    while let Some(outcome) = rx.recv().await {
        let mut st = state.write().await;
        st.pending.remove(&outcome.key);
        let still_required = st.required.contains(&outcome.key);

        match outcome.result {
            Ok(tile) => {
                st.stats.renders_completed += 1;
                let tile = Arc::new(tile);
                if let Err(first) = cache.put(outcome.key, tile.clone()).await {
                    // Allocation pressure: free everything non-required and
                    // retry once.
                    debug!(key = %outcome.key, error = %first, "cache full, evicting and retrying");
                    st.stats.tiles_evicted += cache.evict_ineligible().await as u64;
                    if let Err(err) = cache.put(outcome.key, tile).await {
                        st.stats.renders_failed += 1;
                        if still_required {
                            warn!(key = %outcome.key, error = %err, "tile dropped, will draw fallback");
                            st.failed.insert(outcome.key);
                        }
                    }
                } else if !still_required {
                    trace!(
                        key = %outcome.key,
                        generation = outcome.generation,
                        "superseded render cached"
                    );
                }
            }
            Err(err) => {
                // Out-of-memory while materializing the pixel buffer: free
                // everything non-required and give the key one more attempt.
                let retry = matches!(err, RenderError::Allocation { .. })
                    && still_required
                    && st.retried.insert(outcome.key);
                if retry {
                    debug!(key = %outcome.key, error = %err, "allocation failed, evicting and retrying");
                    st.stats.tiles_evicted += cache.evict_ineligible().await as u64;
                    if let Some(tx) = retry_tx.upgrade() {
                        st.pending.insert(outcome.key);
                        st.stats.renders_dispatched += 1;
                        spawn_render(renderer.clone(), tx, outcome.key, outcome.generation);
                    }
                } else {
                    st.stats.renders_failed += 1;
                    if still_required {
                        warn!(key = %outcome.key, error = %err, "render failed, will draw fallback");
                        st.failed.insert(outcome.key);
                    } else {
                        debug!(key = %outcome.key, error = %err, "superseded render failed, ignoring");
                    }
                }
            }
        }

        if st.phase == ViewportPhase::Reconciling && !st.waiting_on_required() {
            st.phase = ViewportPhase::Settled;
            debug!(generation = st.generation, "viewport settled");
            settle.notify_waiters();
        }
    }
}
