use anyhow::{Context, Result};

use crate::brush::{Brush, PenSample};
use crate::canvas::{Canvas, ViewState};
use crate::coords::{Affine2, ColorRgba, Vec2, Viewport};
use crate::library::Library;
use crate::render::{CanvasRenderer, RenderCtx, RenderTarget, RendererConfig, TouchedTile};

/// Outcome of a finished stroke.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrokeReport {
    pub touched: Vec<TouchedTile>,
    pub thumbnail_size: Option<(u32, u32)>,
}

/// One canvas opened for drawing.
///
/// The view lives here while navigating and is written to the canvas
/// document only when a stroke finishes or the session closes.
pub struct CanvasSession {
    library: Box<dyn Library>,
    canvas_id: String,
    canvas: Canvas,
    renderer: CanvasRenderer,
    brush: Box<dyn Brush>,

    color: ColorRgba,
    last_sample: Option<PenSample>,
    view: ViewState,
    viewport: Viewport,
}

impl CanvasSession {
    /// Loads `canvas_id` from `library` and builds its renderer.
    pub fn open(
        ctx: &RenderCtx<'_>,
        library: Box<dyn Library>,
        canvas_id: impl Into<String>,
        brush: Box<dyn Brush>,
        config: RendererConfig,
    ) -> Result<Self> {
        let canvas_id = canvas_id.into();
        let canvas = library
            .load_canvas(&canvas_id)
            .with_context(|| format!("failed to load canvas {canvas_id}"))?;
        let renderer = CanvasRenderer::new(ctx.device, &canvas, config)?;

        if canvas.selected_layer().is_none() {
            log::warn!("canvas {canvas_id} has no selected layer; strokes will be ignored");
        }

        let mut session = Self {
            library,
            canvas_id,
            view: canvas.view(),
            canvas,
            renderer,
            brush,
            color: ColorRgba::black(),
            last_sample: None,
            viewport: ctx.viewport,
        };
        session.refresh(ctx);

        log::info!("opened canvas {}", session.canvas_id);
        Ok(session)
    }

    pub fn canvas_id(&self) -> &str {
        &self.canvas_id
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn renderer(&self) -> &CanvasRenderer {
        &self.renderer
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn color(&self) -> ColorRgba {
        self.color
    }

    /// Paint color, straight alpha.
    pub fn set_color(&mut self, color: ColorRgba) {
        self.color = color;
    }

    pub fn world_to_clip(&self) -> Affine2 {
        self.view.world_to_clip(self.viewport)
    }

    /// Adopts a new target size and re-tracks visible tiles.
    pub fn resize(&mut self, ctx: &RenderCtx<'_>, viewport: Viewport) {
        self.viewport = viewport;
        self.refresh(ctx);
    }

    /// Applies an incremental pan/zoom/rotation.
    pub fn navigate(&mut self, ctx: &RenderCtx<'_>, pan: Vec2, scale: f32, rotation: f32) {
        let next = self.view.navigated(pan, scale, rotation);
        if next.canvas_to_view().invert().is_none() {
            log::debug!("ignoring degenerate navigation (zoom {})", next.zoom);
            return;
        }
        self.view = next;
        self.refresh(ctx);
    }

    /// Feeds one pen sample into the current stroke.
    ///
    /// Each call draws the segment from the previous sample. A `finished`
    /// sample closes the stroke: touched tiles are flushed, the view is
    /// persisted and a new thumbnail is sent to the library.
    pub fn pen_input(
        &mut self,
        ctx: &RenderCtx<'_>,
        sample: PenSample,
        finished: bool,
    ) -> Result<Option<StrokeReport>> {
        let runs = segment(self.last_sample, sample, finished);
        self.last_sample = Some(sample);

        match self.canvas.selected_layer().map(|l| l.id().clone()) {
            Some(layer) => {
                for samples in &runs {
                    self.renderer
                        .draw_stroke(ctx, &layer, samples, self.color, self.brush.as_mut());
                }
            }
            None => log::warn!("pen input without a selected layer"),
        }

        if !finished {
            return Ok(None);
        }

        self.last_sample = None;
        self.finish_stroke(ctx).map(Some)
    }

    /// Draws the canvas into `target`.
    pub fn render(&mut self, ctx: &RenderCtx<'_>, target: &mut RenderTarget<'_>) {
        let world_to_clip = self.world_to_clip();
        self.renderer.render(ctx, target, &self.canvas, world_to_clip);
    }

    /// Finishes an open stroke and persists the view.
    pub fn close(&mut self, ctx: &RenderCtx<'_>) -> Result<()> {
        if self.renderer.is_drawing() {
            self.last_sample = None;
            self.finish_stroke(ctx)?;
        }
        self.canvas
            .set_view(self.view)
            .context("failed to persist view state")?;
        log::info!("closed canvas {}", self.canvas_id);
        Ok(())
    }

    fn finish_stroke(&mut self, ctx: &RenderCtx<'_>) -> Result<StrokeReport> {
        if !self.renderer.is_drawing() {
            return Ok(StrokeReport::default());
        }

        let touched = self.renderer.end_draw(ctx, &mut self.canvas)?;

        self.canvas
            .set_view(self.view)
            .context("failed to persist view state")?;

        let thumbnail = self
            .renderer
            .capture_thumbnail(ctx, &self.canvas, self.world_to_clip())
            .context("failed to capture thumbnail")?;
        self.library
            .put_thumbnail(&self.canvas_id, &thumbnail)
            .with_context(|| format!("failed to store thumbnail of {}", self.canvas_id))?;

        log::debug!("stroke finished, {} tiles touched", touched.len());
        Ok(StrokeReport {
            touched,
            thumbnail_size: Some(thumbnail.dimensions()),
        })
    }

    fn refresh(&mut self, ctx: &RenderCtx<'_>) {
        if !self.viewport.is_valid() {
            return;
        }
        let world_to_clip = self.world_to_clip();
        self.renderer.update(ctx, &self.canvas, world_to_clip);
    }
}

/// Sample runs to draw for `current`: the segment from the previous sample,
/// or the sample alone at stroke start.
///
/// Resampling leaves a segment's end point to the next segment, so the last
/// sample of a finished stroke is stamped as a run of its own.
fn segment(last: Option<PenSample>, current: PenSample, finished: bool) -> Vec<Vec<PenSample>> {
    match last {
        Some(last) if finished && last.position() != current.position() => {
            vec![vec![last, current], vec![current]]
        }
        Some(last) => vec![vec![last, current]],
        None => vec![vec![current]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stroke_start_draws_single_sample() {
        let s = PenSample::new(1.0, 2.0, 0.5);
        assert_eq!(segment(None, s, false), vec![vec![s]]);
        assert_eq!(segment(None, s, true), vec![vec![s]]);
    }

    #[test]
    fn later_samples_draw_from_previous() {
        let a = PenSample::new(0.0, 0.0, 1.0);
        let b = PenSample::new(3.0, 0.0, 1.0);
        assert_eq!(segment(Some(a), b, false), vec![vec![a, b]]);
    }

    #[test]
    fn finishing_sample_is_stamped_with_its_own_pressure() {
        let a = PenSample::new(0.0, 0.0, 1.0);
        let b = PenSample::new(3.0, 0.0, 0.25);
        assert_eq!(segment(Some(a), b, true), vec![vec![a, b], vec![b]]);

        // Lifting in place: the point was already stamped.
        let c = PenSample::new(3.0, 0.0, 0.5);
        assert_eq!(segment(Some(b), c, true), vec![vec![b, c]]);
    }
}
