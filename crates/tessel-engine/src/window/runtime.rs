use std::sync::Arc;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::canvas::ViewState;
use crate::coords::{ColorRgba, Vec2, Viewport};
use crate::device::{Gpu, GpuInit};
use crate::input::platform::winit::{PointerTranslator, WindowInput};
use crate::input::{InputMapper, MapperAction};
use crate::library::Library;
use crate::render::RendererConfig;
use crate::runtime::{RenderCommand, RenderThread, SessionSource};

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub gpu: GpuInit,
    pub renderer: RendererConfig,
    /// Whether a single finger paints (otherwise it pans).
    pub touch_drawing: bool,
    pub color: ColorRgba,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "tessel".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            gpu: GpuInit::default(),
            renderer: RendererConfig::default(),
            touch_drawing: true,
            color: ColorRgba::black(),
        }
    }
}

/// Entry point for the studio window.
pub struct Runtime;

impl Runtime {
    /// Opens `canvas_id` from `library` in a window and runs until it closes.
    pub fn run(config: RuntimeConfig, library: Box<dyn Library>, canvas_id: String) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let source = SessionSource {
            library,
            canvas_id,
            renderer: config.renderer.clone(),
        };
        let mut state = AppState::new(config, source);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        state.failure.map_or(Ok(()), Err)
    }
}

/// The UI thread keeps its own copy of the view so the mapper can convert
/// pointer positions without asking the render thread.
struct WindowEntry {
    window: Arc<Window>,
    render: RenderThread,
    mapper: InputMapper,
    translator: PointerTranslator,
    view: ViewState,
    viewport: Viewport,
}

struct AppState {
    config: RuntimeConfig,
    source: Option<SessionSource>,
    entry: Option<WindowEntry>,
    failure: Option<anyhow::Error>,
}

impl AppState {
    fn new(config: RuntimeConfig, source: SessionSource) -> Self {
        Self {
            config,
            source: Some(source),
            entry: None,
            failure: None,
        }
    }

    fn create_window_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let source = self
            .source
            .take()
            .context("canvas session was already started")?;

        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let gpu = pollster::block_on(Gpu::new(Arc::clone(&window), self.config.gpu.clone()))
            .context("GPU initialization failed for window")?;
        let viewport = gpu.viewport();

        let render = RenderThread::spawn(gpu, source)?;
        let view = render.initial_view();
        render.send(RenderCommand::SetColor(self.config.color));

        self.entry = Some(WindowEntry {
            window,
            render,
            mapper: InputMapper::new(self.config.touch_drawing),
            translator: PointerTranslator::new(),
            view,
            viewport,
        });
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.failure = Some(error);
        self.close(event_loop);
    }

    fn close(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(entry) = self.entry.take() {
            entry.render.shutdown();
        }
        event_loop.exit();
    }
}

impl WindowEntry {
    fn handle_input(&mut self, input: WindowInput) {
        match input {
            WindowInput::Pointer(event) => {
                let actions = self.mapper.handle(event, &self.view, self.viewport);
                for action in actions {
                    self.apply(action);
                }
            }
            WindowInput::Zoom(scale) => self.apply(MapperAction::Navigate {
                pan: Vec2::zero(),
                scale,
                rotation: 0.0,
            }),
            WindowInput::FocusLost => {
                let actions = self.mapper.reset(&self.view, self.viewport);
                for action in actions {
                    self.apply(action);
                }
            }
        }
    }

    fn apply(&mut self, action: MapperAction) {
        match action {
            // winit delivers pointer events unbatched already.
            MapperAction::RequestUncoalesced => {}
            MapperAction::Navigate { pan, scale, rotation } => {
                let next = self.view.navigated(pan, scale, rotation);
                if next.canvas_to_view().invert().is_none() {
                    return;
                }
                self.view = next;
                self.render.send(RenderCommand::Navigate { pan, scale, rotation });
                self.window.request_redraw();
            }
            MapperAction::Paint { sample, finished } => {
                self.render.send(RenderCommand::Pen { sample, finished });
                self.window.request_redraw();
            }
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() {
            return;
        }

        if let Err(e) = self.create_window_entry(event_loop) {
            self.fail(event_loop, e.context("failed to open canvas window"));
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(entry) = &self.entry {
            entry.window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(entry) = self.entry.as_mut() else { return };
        if entry.window.id() != window_id {
            return;
        }

        if let Some(input) = entry.translator.translate(&event) {
            entry.handle_input(input);
            return;
        }

        match event {
            WindowEvent::CloseRequested => self.close(event_loop),

            WindowEvent::Resized(size) => {
                entry.viewport = Viewport::new(size.width as f32, size.height as f32);
                entry.render.send(RenderCommand::Resize(size));
                entry.window.request_redraw();
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                let size = entry.window.inner_size();
                entry.viewport = Viewport::new(size.width as f32, size.height as f32);
                entry.render.send(RenderCommand::Resize(size));
                entry.window.request_redraw();
            }

            WindowEvent::RedrawRequested => {
                if !entry.render.send(RenderCommand::Redraw) {
                    self.fail(event_loop, anyhow::anyhow!("render thread stopped"));
                }
            }

            _ => {}
        }
    }
}
