use std::sync::mpsc::{self, Receiver};
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};

use crate::brush::RoundBrush;
use crate::canvas::ViewState;
use crate::device::Gpu;
use crate::library::Library;
use crate::render::{RenderTarget, RendererConfig};
use crate::session::CanvasSession;
use crate::time::FrameClock;

use super::{RenderCommand, RenderQueue};

/// What the render thread opens once it owns the GPU.
pub struct SessionSource {
    pub library: Box<dyn Library>,
    pub canvas_id: String,
    pub renderer: RendererConfig,
}

/// Handle to the render thread. Dropping it shuts the thread down.
pub struct RenderThread {
    queue: RenderQueue,
    initial_view: ViewState,
    handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    /// Moves `gpu` to a new thread and opens the canvas there.
    ///
    /// Returns once the session is open, or with its construction error.
    pub fn spawn(gpu: Gpu, source: SessionSource) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<ViewState>>(1);

        let handle = std::thread::Builder::new()
            .name("tessel-render".to_string())
            .spawn(move || {
                let mut gpu = gpu;
                let session = open_session(&gpu, source);
                let session = match session {
                    Ok(session) => {
                        let _ = ready_tx.send(Ok(session.view()));
                        session
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run(&mut gpu, session, receiver);
            })
            .context("failed to spawn render thread")?;

        let initial_view = ready_rx
            .recv()
            .map_err(|_| anyhow!("render thread exited during startup"))??;

        Ok(Self {
            queue: RenderQueue::new(sender),
            initial_view,
            handle: Some(handle),
        })
    }

    /// View state of the canvas when it was opened.
    pub fn initial_view(&self) -> ViewState {
        self.initial_view
    }

    pub fn queue(&self) -> &RenderQueue {
        &self.queue
    }

    pub fn send(&self, command: RenderCommand) -> bool {
        self.queue.send(command)
    }

    /// Sends `Shutdown` and waits for the thread to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else { return };
        self.queue.send(RenderCommand::Shutdown);
        if handle.join().is_err() {
            log::error!("render thread panicked");
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_session(gpu: &Gpu, source: SessionSource) -> Result<CanvasSession> {
    let ctx = gpu.render_ctx();
    let brush = RoundBrush::new(ctx.device).context("failed to create brush")?;
    CanvasSession::open(
        &ctx,
        source.library,
        source.canvas_id,
        Box::new(brush),
        source.renderer,
    )
}

/// Serial command loop. Ends on `Shutdown`, a closed queue or a fatal surface error.
fn run(gpu: &mut Gpu, mut session: CanvasSession, receiver: Receiver<RenderCommand>) {
    let mut clock = FrameClock::new();

    while let Ok(command) = receiver.recv() {
        match command {
            RenderCommand::Resize(size) => {
                gpu.resize(size);
                session.resize(&gpu.render_ctx(), gpu.viewport());
                clock.reset();
            }
            RenderCommand::Navigate { pan, scale, rotation } => {
                session.navigate(&gpu.render_ctx(), pan, scale, rotation);
            }
            RenderCommand::Pen { sample, finished } => {
                match session.pen_input(&gpu.render_ctx(), sample, finished) {
                    Ok(Some(report)) => {
                        log::debug!("stroke flushed {} tiles", report.touched.len());
                    }
                    Ok(None) => {}
                    Err(e) => log::error!("pen input failed: {e:#}"),
                }
            }
            RenderCommand::SetColor(color) => session.set_color(color),
            RenderCommand::Redraw => {
                if !render_frame(gpu, &mut session) {
                    log::error!("fatal surface error, stopping render thread");
                    break;
                }
                let time = clock.tick();
                log::trace!("frame {} in {:.2} ms", time.frame_index, time.dt * 1000.0);
            }
            RenderCommand::Shutdown => break,
        }
    }

    if let Err(e) = session.close(&gpu.render_ctx()) {
        log::error!("failed to close canvas: {e:#}");
    }
    log::debug!("render thread stopped");
}

/// Renders one surface frame. Returns false on a fatal surface error.
fn render_frame(gpu: &mut Gpu, session: &mut CanvasSession) -> bool {
    let size = gpu.size();
    if size.width == 0 || size.height == 0 {
        return true;
    }

    match gpu.begin_frame() {
        Ok(mut frame) => {
            {
                let ctx = gpu.render_ctx();
                let mut target = RenderTarget::new(&mut frame.encoder, &frame.view);
                session.render(&ctx, &mut target);
            }
            gpu.submit(frame);
            true
        }
        Err(e) => gpu.handle_surface_error(e).keeps_rendering(),
    }
}
