use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::{bail, Context, Result};
use image::RgbaImage;

use crate::blend::Blending;
use crate::brush::{tile_board_to_clip, Brush, PenSample};
use crate::canvas::{Canvas, CanvasSize, LayerId};
use crate::coords::{Affine2, ColorRgba, Rect, Viewport};
use crate::store::{TileAddress, TileStore};
use crate::tiling::{TileDelta, TileId, TileTracker};

use super::common::{read_textures, TILE_FORMAT};
use super::compositor::{CompositeFrame, CompositeLayer, TileCompositor};
use super::tile_content::TileContent;
use super::{RenderCtx, RenderTarget};

/// Renderer options that are not part of the canvas document.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Color around a bounded canvas.
    pub view_background: ColorRgba,
    /// Draw tiles that fall outside a bounded canvas.
    pub show_overflow: bool,
    /// Longest thumbnail edge in pixels.
    pub thumbnail_edge: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            view_background: ColorRgba::new(0.5, 0.5, 0.5, 1.0),
            show_overflow: false,
            thumbnail_edge: 1024,
        }
    }
}

/// Observable state of one tile view.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TileResidency {
    /// Visible, nothing on the GPU.
    Absent,
    /// GPU texture mirrors the store.
    Loaded,
    /// Pinned by the open draw bracket.
    Drawing,
}

/// A flushed tile, as returned by [`CanvasRenderer::end_draw`].
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TouchedTile {
    pub layer: LayerId,
    pub address: TileAddress,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
struct TileKey {
    slot: u32,
    id: TileId,
}

enum TileState {
    Absent,
    Loaded(TileContent),
    Drawing(TileContent),
}

impl TileState {
    fn content(&self) -> Option<&TileContent> {
        match self {
            TileState::Absent => None,
            TileState::Loaded(c) | TileState::Drawing(c) => Some(c),
        }
    }

    fn residency(&self) -> TileResidency {
        match self {
            TileState::Absent => TileResidency::Absent,
            TileState::Loaded(_) => TileResidency::Loaded,
            TileState::Drawing(_) => TileResidency::Drawing,
        }
    }
}

struct TileView {
    frame: i32,
    state: TileState,
}

struct LayerView {
    id: LayerId,
    slot: u32,
}

/// GPU tile cache for one canvas.
///
/// Keeps one tile view per `(layer, visible tile)` and streams tile content
/// between the layer stores and GPU textures as the viewport moves. Strokes
/// are drawn straight into the tile textures inside a `begin_draw` /
/// `end_draw` bracket, and every touched tile is written back to its store
/// when the bracket closes.
pub struct CanvasRenderer {
    config: RendererConfig,
    compositor: TileCompositor,
    tracker: TileTracker,

    layers: Vec<LayerView>,
    next_slot: u32,
    tiles: HashMap<TileKey, TileView>,
    frame: i32,

    bracket: Option<BTreeSet<TileKey>>,
}

impl CanvasRenderer {
    pub fn new(device: &wgpu::Device, canvas: &Canvas, config: RendererConfig) -> Result<Self> {
        let compositor = TileCompositor::new(device, canvas.tile_size())
            .context("failed to create tile compositor")?;

        Ok(Self {
            config,
            compositor,
            tracker: TileTracker::new(),
            layers: Vec::new(),
            next_slot: 0,
            tiles: HashMap::new(),
            frame: canvas.current_frame(),
            bracket: None,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RendererConfig {
        &mut self.config
    }

    pub fn tile_size(&self) -> u32 {
        self.compositor.tile_size()
    }

    pub fn visible_tiles(&self) -> &HashSet<TileId> {
        self.tracker.visible()
    }

    /// State of a tile view, or `None` when the renderer holds no view for it.
    pub fn residency(&self, layer: &LayerId, id: TileId) -> Option<TileResidency> {
        let slot = self.slot_of(layer)?;
        self.tiles
            .get(&TileKey { slot, id })
            .map(|view| view.state.residency())
    }

    pub fn is_drawing(&self) -> bool {
        self.bracket.is_some()
    }

    /// Brings layer views, the current frame and the visible tile set in
    /// line with `canvas` seen through `world_to_clip`.
    ///
    /// Returns the visible-set change; empty when the transform is degenerate.
    pub fn update(&mut self, ctx: &RenderCtx<'_>, canvas: &Canvas, world_to_clip: Affine2) -> TileDelta {
        self.reconcile_layers(ctx, canvas);

        if canvas.current_frame() != self.frame {
            self.frame = canvas.current_frame();
            self.reload_frame(ctx, canvas);
        }

        let Some(clip_to_world) = world_to_clip.invert() else {
            return TileDelta::default();
        };

        let delta = self.tracker.update(
            clip_to_world,
            self.tile_size() as f32,
            canvas.tile_bounds(),
        );

        for &id in &delta.exited {
            for slot in self.layers.iter().map(|l| l.slot).collect::<Vec<_>>() {
                self.exit_tile(TileKey { slot, id });
            }
        }

        for &id in &delta.entered {
            for view in &self.layers {
                let Some(layer) = canvas.layer(&view.id) else { continue };
                let key = TileKey { slot: view.slot, id };
                if self.tiles.contains_key(&key) {
                    continue;
                }
                let state = load_state(ctx, &self.compositor, layer.store(), id.address(self.frame));
                self.tiles.insert(key, TileView { frame: self.frame, state });
            }
        }

        delta
    }

    /// Reads the GPU copy of a resident tile. `None` when the tile has no
    /// texture.
    pub fn read_tile(&self, ctx: &RenderCtx<'_>, layer: &LayerId, id: TileId) -> Result<Option<Vec<u8>>> {
        let Some(slot) = self.slot_of(layer) else {
            return Ok(None);
        };
        match self.tiles.get(&TileKey { slot, id }).and_then(|v| v.state.content()) {
            Some(content) => content.read_back(ctx.device, ctx.queue).map(Some),
            None => Ok(None),
        }
    }

    /// Opens a draw bracket. Calling it while a bracket is open does nothing.
    pub fn begin_draw(&mut self) {
        if self.bracket.is_none() {
            log::debug!("draw bracket opened");
            self.bracket = Some(BTreeSet::new());
        }
    }

    /// Draws `samples` with `brush` into every view of `layer` that the
    /// stroke's bounding box overlaps. Opens a bracket if none is open.
    pub fn draw_stroke(
        &mut self,
        ctx: &RenderCtx<'_>,
        layer: &LayerId,
        samples: &[PenSample],
        color: ColorRgba,
        brush: &mut dyn Brush,
    ) {
        let Some(bounds) = brush.bounding_box(samples) else {
            return;
        };
        let Some(slot) = self.slot_of(layer) else {
            log::warn!("draw on unknown layer {layer}");
            return;
        };

        self.begin_draw();

        let ts = self.tile_size() as f32;
        let mut ids: Vec<TileId> = self
            .tiles
            .keys()
            .filter(|k| k.slot == slot && k.id.world_rect(ts).overlaps(bounds))
            .map(|k| k.id)
            .collect();
        ids.sort();

        let tile_ctx = ctx.retarget(TILE_FORMAT, Viewport::new(ts, ts));

        for id in ids {
            let key = TileKey { slot, id };
            if let Some(bracket) = self.bracket.as_mut() {
                bracket.insert(key);
            }

            let Some(content) = self.pin(ctx.device, key) else { continue };

            let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tessel stroke encoder"),
            });
            {
                let mut target = RenderTarget::new(&mut encoder, content.view());
                brush.draw(
                    &tile_ctx,
                    &mut target,
                    samples,
                    tile_board_to_clip(ts, id.x, id.y),
                    color,
                    Blending::StraightSourceOver,
                );
            }
            ctx.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Closes the bracket: reads every touched tile back, stores it, and
    /// releases the ones that left the viewport meanwhile.
    ///
    /// Returns the flushed tiles. Without an open bracket this is a no-op.
    pub fn end_draw(&mut self, ctx: &RenderCtx<'_>, canvas: &mut Canvas) -> Result<Vec<TouchedTile>> {
        let Some(bracket) = self.bracket.take() else {
            log::warn!("end_draw without an open draw bracket");
            return Ok(Vec::new());
        };

        let mut pending: Vec<(TileKey, i32)> = Vec::with_capacity(bracket.len());
        let mut textures: Vec<&wgpu::Texture> = Vec::with_capacity(bracket.len());
        for key in &bracket {
            let Some(view) = self.tiles.get(key) else { continue };
            let Some(content) = view.state.content() else { continue };
            pending.push((*key, view.frame));
            textures.push(content.texture());
        }

        let ts = self.tile_size();
        let readback = read_textures(ctx.device, ctx.queue, &textures, ts, ts);
        drop(textures);

        let mut flushed = Vec::with_capacity(pending.len());
        let mut failures = 0usize;

        match readback {
            Ok(pixels) => {
                for ((key, frame), bytes) in pending.iter().zip(pixels) {
                    let Some(layer_id) = self.layer_id(key.slot).cloned() else { continue };
                    let Some(layer) = canvas.layer_mut(&layer_id) else {
                        log::warn!("layer {layer_id} vanished before its tiles were flushed");
                        continue;
                    };

                    let address = key.id.address(*frame);
                    match layer.store_mut().store_tile(address, &bytes) {
                        Ok(()) => flushed.push(TouchedTile { layer: layer_id, address }),
                        Err(e) => {
                            log::error!("failed to store tile {address:?} of {layer_id}: {e}");
                            failures += 1;
                        }
                    }
                }
            }
            Err(e) => {
                log::error!("tile readback failed: {e:#}");
                failures = pending.len();
            }
        }

        for (key, _) in &pending {
            self.unpin(ctx, canvas, *key);
        }

        log::debug!("draw bracket closed, {} tiles flushed", flushed.len());

        if failures > 0 {
            bail!("{failures} of {} touched tiles could not be flushed", pending.len());
        }
        Ok(flushed)
    }

    /// Draws the canvas into `target` (clearing it first).
    pub fn render(
        &mut self,
        ctx: &RenderCtx<'_>,
        target: &mut RenderTarget<'_>,
        canvas: &Canvas,
        world_to_clip: Affine2,
    ) {
        let frame = self.composite_frame(canvas, world_to_clip);

        let mut by_slot: HashMap<u32, Vec<(TileId, &TileContent)>> = HashMap::new();
        for (key, view) in &self.tiles {
            if let Some(content) = view.state.content() {
                by_slot.entry(key.slot).or_default().push((key.id, content));
            }
        }

        let layers = composite_layers(&self.layers, canvas, by_slot);
        self.compositor.draw(ctx, target, &frame, &layers);
    }

    /// Renders the canvas offscreen into a `width`×`height` RGBA image.
    ///
    /// Tiles outside the current viewport are loaded from their stores for
    /// the duration of the capture.
    pub fn capture_rgba(
        &mut self,
        ctx: &RenderCtx<'_>,
        canvas: &Canvas,
        world_to_clip: Affine2,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage> {
        let width = width.max(1);
        let height = height.max(1);
        let frame = self.composite_frame(canvas, world_to_clip);

        let clip_to_world = world_to_clip
            .invert()
            .context("capture transform is not invertible")?;
        let mut area = TileTracker::new();
        let ids = area
            .update(clip_to_world, self.tile_size() as f32, canvas.tile_bounds())
            .entered;

        let mut transient: HashMap<TileKey, TileContent> = HashMap::new();
        for view in &self.layers {
            let Some(layer) = canvas.layer(&view.id) else { continue };
            for &id in &ids {
                let key = TileKey { slot: view.slot, id };
                if self.tiles.contains_key(&key) {
                    continue;
                }
                if let TileState::Loaded(content) =
                    load_state(ctx, &self.compositor, layer.store(), id.address(self.frame))
                {
                    transient.insert(key, content);
                }
            }
        }

        let wanted: HashSet<TileId> = ids.into_iter().collect();
        let mut by_slot: HashMap<u32, Vec<(TileId, &TileContent)>> = HashMap::new();
        let resident = self
            .tiles
            .iter()
            .filter_map(|(key, view)| view.state.content().map(|c| (key, c)));
        for (key, content) in resident.chain(transient.iter()) {
            if wanted.contains(&key.id) {
                by_slot.entry(key.slot).or_default().push((key.id, content));
            }
        }
        let layers = composite_layers(&self.layers, canvas, by_slot);

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tessel capture texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TILE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let capture_ctx = ctx.retarget(TILE_FORMAT, Viewport::new(width as f32, height as f32));
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tessel capture encoder"),
        });
        {
            let mut target = RenderTarget::new(&mut encoder, &view);
            self.compositor.draw(&capture_ctx, &mut target, &frame, &layers);
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let pixels = read_textures(ctx.device, ctx.queue, &[&texture], width, height)?
            .pop()
            .unwrap_or_default();

        RgbaImage::from_raw(width, height, pixels).context("capture produced a short buffer")
    }

    /// Captures a thumbnail: the whole canvas when bounded, otherwise the
    /// current view (`world_to_clip`) at `thumbnail_edge`².
    pub fn capture_thumbnail(
        &mut self,
        ctx: &RenderCtx<'_>,
        canvas: &Canvas,
        world_to_clip: Affine2,
    ) -> Result<RgbaImage> {
        let (width, height) = thumbnail_size(canvas.canvas_size(), self.config.thumbnail_edge);
        let transform = match canvas.canvas_size() {
            Some(size) => Affine2::scale(2.0 / size.width as f32, -2.0 / size.height as f32),
            None => world_to_clip,
        };
        self.capture_rgba(ctx, canvas, transform, width, height)
    }

    fn composite_frame(&self, canvas: &Canvas, world_to_clip: Affine2) -> CompositeFrame {
        match canvas.canvas_size() {
            Some(size) => {
                let (w, h) = (size.width as f32, size.height as f32);
                let rect = Rect::new(-w / 2.0, -h / 2.0, w, h);
                CompositeFrame {
                    world_to_clip,
                    clear: self.config.view_background,
                    backdrop: Some((rect, canvas.background())),
                    clip: (!self.config.show_overflow).then_some(rect),
                }
            }
            None => CompositeFrame {
                world_to_clip,
                clear: canvas.background(),
                backdrop: None,
                clip: None,
            },
        }
    }

    fn slot_of(&self, layer: &LayerId) -> Option<u32> {
        self.layers.iter().find(|v| &v.id == layer).map(|v| v.slot)
    }

    fn layer_id(&self, slot: u32) -> Option<&LayerId> {
        self.layers.iter().find(|v| v.slot == slot).map(|v| &v.id)
    }

    fn reconcile_layers(&mut self, ctx: &RenderCtx<'_>, canvas: &Canvas) {
        let mut previous = std::mem::take(&mut self.layers);
        let mut added = Vec::new();

        for layer in canvas.layers() {
            match previous.iter().position(|v| v.id == *layer.id()) {
                Some(i) => self.layers.push(previous.swap_remove(i)),
                None => {
                    let slot = self.next_slot;
                    self.next_slot += 1;
                    log::debug!("layer {} attached to slot {slot}", layer.id());
                    self.layers.push(LayerView { id: layer.id().clone(), slot });
                    added.push(slot);
                }
            }
        }

        for removed in previous {
            self.release_layer(removed);
        }

        // New layers start from the tiles the tracker already knows about.
        for slot in added {
            let Some(layer) = self.layer_id(slot).and_then(|id| canvas.layer(id)) else { continue };
            for &id in self.tracker.visible() {
                let state = load_state(ctx, &self.compositor, layer.store(), id.address(self.frame));
                self.tiles.insert(TileKey { slot, id }, TileView { frame: self.frame, state });
            }
        }
    }

    fn release_layer(&mut self, view: LayerView) {
        let slot = view.slot;
        if let Some(bracket) = self.bracket.as_mut() {
            let before = bracket.len();
            bracket.retain(|k| k.slot != slot);
            if bracket.len() != before {
                log::warn!(
                    "layer {} removed during an open draw bracket; {} touched tiles dropped",
                    view.id,
                    before - bracket.len()
                );
            }
        }

        self.tiles.retain(|k, _| k.slot != slot);
        log::debug!("layer {} detached from slot {slot}", view.id);
    }

    fn reload_frame(&mut self, ctx: &RenderCtx<'_>, canvas: &Canvas) {
        let frame = self.frame;
        for (key, view) in self.tiles.iter_mut() {
            if matches!(view.state, TileState::Drawing(_)) {
                log::debug!("tile {:?} is being drawn; it reloads for frame {frame} after the flush", key.id);
                continue;
            }
            let Some(layer) = self
                .layers
                .iter()
                .find(|v| v.slot == key.slot)
                .and_then(|v| canvas.layer(&v.id))
            else {
                continue;
            };

            view.state = load_state(ctx, &self.compositor, layer.store(), key.id.address(frame));
            view.frame = frame;
        }
        log::debug!("tiles reloaded for frame {frame}");
    }

    fn exit_tile(&mut self, key: TileKey) {
        match self.tiles.get(&key).map(|v| v.state.residency()) {
            Some(TileResidency::Drawing) | None => {}
            Some(_) => {
                if let Some(view) = self.tiles.remove(&key) {
                    if view.state.content().is_some() {
                        log::trace!("evicted tile {:?} (slot {})", key.id, key.slot);
                    }
                }
            }
        }
    }

    /// Moves a view into `Drawing`, allocating content for unpainted tiles.
    fn pin(&mut self, device: &wgpu::Device, key: TileKey) -> Option<&TileContent> {
        let view = self.tiles.get_mut(&key)?;
        view.state = match std::mem::replace(&mut view.state, TileState::Absent) {
            TileState::Absent => TileState::Drawing(self.compositor.create_tile(device)),
            TileState::Loaded(c) | TileState::Drawing(c) => TileState::Drawing(c),
        };
        view.state.content()
    }

    /// Leaves `Drawing`: back to `Loaded` while visible, released otherwise.
    /// A view drawn across a frame change is reloaded for the current frame.
    fn unpin(&mut self, ctx: &RenderCtx<'_>, canvas: &Canvas, key: TileKey) {
        if !self.tracker.is_visible(key.id) {
            self.tiles.remove(&key);
            log::trace!("released off-screen tile {:?} after flush", key.id);
            return;
        }

        let frame = self.frame;
        let store = self
            .layer_id(key.slot)
            .and_then(|id| canvas.layer(id))
            .map(|layer| layer.store());
        let Some(view) = self.tiles.get_mut(&key) else { return };

        if view.frame != frame {
            if let Some(store) = store {
                view.state = load_state(ctx, &self.compositor, store, key.id.address(frame));
                view.frame = frame;
                log::trace!("reloaded tile {:?} for frame {frame} after flush", key.id);
                return;
            }
        }

        view.state = match std::mem::replace(&mut view.state, TileState::Absent) {
            TileState::Drawing(c) | TileState::Loaded(c) => TileState::Loaded(c),
            TileState::Absent => TileState::Absent,
        };
    }
}

impl std::fmt::Debug for CanvasRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasRenderer")
            .field("tile_size", &self.tile_size())
            .field("layers", &self.layers.len())
            .field("tiles", &self.tiles.len())
            .field("drawing", &self.is_drawing())
            .finish()
    }
}

fn load_state(
    ctx: &RenderCtx<'_>,
    compositor: &TileCompositor,
    store: &dyn TileStore,
    address: TileAddress,
) -> TileState {
    if !store.is_tile_present(address) {
        return TileState::Absent;
    }

    let mut pixels = vec![0u8; store.bytes_per_tile()];
    match store.load_tile(address, &mut pixels) {
        Ok(true) => {
            let content = compositor.create_tile(ctx.device);
            content.upload(ctx.queue, &pixels);
            log::trace!("loaded tile {address:?}");
            TileState::Loaded(content)
        }
        Ok(false) => TileState::Absent,
        Err(e) => {
            log::error!("failed to load tile {address:?}: {e}");
            TileState::Absent
        }
    }
}

fn composite_layers<'a>(
    views: &[LayerView],
    canvas: &Canvas,
    mut by_slot: HashMap<u32, Vec<(TileId, &'a TileContent)>>,
) -> Vec<CompositeLayer<'a>> {
    views
        .iter()
        .filter_map(|view| {
            let layer = canvas.layer(&view.id)?;
            let mut tiles = by_slot.remove(&view.slot)?;
            tiles.sort_by_key(|(id, _)| *id);
            Some(CompositeLayer {
                blending: layer.blending(),
                opacity: layer.opacity(),
                tiles,
            })
        })
        .collect()
}

/// Thumbnail dimensions: the canvas scaled so its longest edge is `edge`,
/// or `edge`² for unbounded canvases.
pub fn thumbnail_size(canvas_size: Option<CanvasSize>, edge: u32) -> (u32, u32) {
    let Some(size) = canvas_size else {
        return (edge, edge);
    };

    let (w, h) = (u64::from(size.width.max(1)), u64::from(size.height.max(1)));
    let edge64 = u64::from(edge);
    let (tw, th) = if w > h {
        (edge64, h * edge64 / w)
    } else {
        (w * edge64 / h, edge64)
    };

    (tw.max(1) as u32, th.max(1) as u32)
}
