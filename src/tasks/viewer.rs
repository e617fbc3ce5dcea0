mod screen;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use config_model::ScreenMessageConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Fullscreen, Window, WindowAttributes},
};

pub use screen::GpuScreen;

use crate::config::ScreenOptions;
use crate::display::state::{DisplayLoop, DisplayParts, Wake};

#[derive(Debug)]
enum ViewerEvent {
    Cancelled,
}

struct ViewerApp {
    options: ScreenOptions,
    placeholder: ScreenMessageConfig,
    cancel: CancellationToken,
    parts: Option<DisplayParts>,
    display: Option<DisplayLoop<GpuScreen>>,
}

impl ViewerApp {
    fn new(
        options: ScreenOptions,
        placeholder: ScreenMessageConfig,
        parts: DisplayParts,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            options,
            placeholder,
            cancel,
            parts: Some(parts),
            display: None,
        }
    }

    fn window_attributes(&self) -> WindowAttributes {
        let mut attrs = WindowAttributes::default().with_title("LeanFrame");
        if self.options.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        } else if let (Some(width), Some(height)) = (self.options.width, self.options.height) {
            attrs = attrs.with_inner_size(PhysicalSize::new(width, height));
        }
        attrs
    }

    fn init_display(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = event_loop
            .create_window(self.window_attributes())
            .context("failed to create viewer window")?;
        let window = Arc::new(window);
        if self.options.cursor_hidden {
            window.set_cursor_visible(false);
        }
        let screen = GpuScreen::new(window.clone(), &self.placeholder)?;
        let parts = self
            .parts
            .take()
            .context("display loop was already started")?;
        self.display = Some(DisplayLoop::new(screen, parts));
        window.request_redraw();
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop, reason: &str) {
        info!(reason, "viewer shutting down");
        self.cancel.cancel();
        event_loop.exit();
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }
        if self.display.is_none() {
            if let Err(err) = self.init_display(event_loop) {
                error!(error = ?err, "failed to initialize viewer");
                self.shutdown(event_loop, "init failed");
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(display) = self.display.as_mut() else {
            return;
        };
        if display.screen().window().id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop, "window closed"),
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                let quit = match &event.logical_key {
                    Key::Named(NamedKey::Escape) => true,
                    Key::Character(ch) => ch.as_str().eq_ignore_ascii_case("q"),
                    _ => false,
                };
                if quit {
                    self.shutdown(event_loop, "quit key");
                }
            }
            WindowEvent::Resized(new_size) => display.screen_mut().resize(new_size),
            WindowEvent::ScaleFactorChanged {
                mut inner_size_writer,
                ..
            } => {
                let size = display.screen().window().inner_size();
                let _ = inner_size_writer.request_inner_size(size);
                display.screen_mut().resize(size);
            }
            WindowEvent::RedrawRequested => display.screen_mut().redraw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(display) = self.display.as_mut() else {
            return;
        };
        match display.tick(Instant::now()) {
            Wake::Exit => event_loop.exit(),
            Wake::NextFrame => event_loop.set_control_flow(ControlFlow::Poll),
            Wake::At(deadline) => event_loop.set_control_flow(ControlFlow::WaitUntil(deadline)),
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Cancelled => {
                info!("viewer received cancellation event");
                event_loop.exit();
            }
        }
    }
}

/// Run the display loop in a window on the calling thread until quit or cancellation.
pub fn run_windowed(
    options: ScreenOptions,
    placeholder: ScreenMessageConfig,
    parts: DisplayParts,
    cancel: CancellationToken,
) -> Result<()> {
    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(ViewerEvent::Cancelled);
        })
    };

    let mut app = ViewerApp::new(options, placeholder, parts, cancel);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();

    run_result.context("viewer event loop failed")
}
