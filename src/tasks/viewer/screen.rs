use std::sync::Arc;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use config_model::ScreenMessageConfig;
use tracing::{debug, error, info, warn};
use wgpu::SurfaceError;
use winit::dpi::PhysicalSize;
use winit::window::{Fullscreen, Window};

use crate::display::placeholder::PlaceholderPainter;
use crate::display::screen::Screen;
use crate::processing::layout::CanvasSize;
use crate::render::cache::Surface;

const CROSSFADE_SHADER: &str = r#"
struct Fade {
    alpha: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

@group(0) @binding(0) var from_tex: texture_2d<f32>;
@group(0) @binding(1) var to_tex: texture_2d<f32>;
@group(0) @binding(2) var frame_sampler: sampler;
@group(0) @binding(3) var<uniform> fade: Fade;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs(@builtin(vertex_index) index: u32) -> VertexOut {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOut;
    out.position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs(in: VertexOut) -> @location(0) vec4<f32> {
    let a = textureSample(from_tex, frame_sampler, in.uv);
    let b = textureSample(to_tex, frame_sampler, in.uv);
    return mix(a, b, fade.alpha);
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FadeUniform {
    alpha: f32,
    _pad: [f32; 3],
}

/// One frame texture and the surface last uploaded into it.
struct FrameSlot {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
    uploaded: Option<Arc<Surface>>,
}

impl FrameSlot {
    fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size: (width, height),
            uploaded: None,
        }
    }

    /// Upload `frame` unless it is already resident. Returns true when the
    /// texture had to be recreated, which invalidates the bind group.
    fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        frame: &Arc<Surface>,
    ) -> bool {
        if self
            .uploaded
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, frame))
        {
            return false;
        }
        let recreated = self.size != (frame.width, frame.height);
        if recreated {
            *self = Self::new(device, label, frame.width, frame.height);
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * frame.width),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
        self.uploaded = Some(Arc::clone(frame));
        recreated
    }
}

/// Fullscreen wgpu output: two frame textures mixed by a uniform alpha.
pub struct GpuScreen {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    from: FrameSlot,
    to: FrameSlot,
    alpha: f32,
    painter: PlaceholderPainter,
    fullscreen: Option<Fullscreen>,
}

impl GpuScreen {
    pub fn new(window: Arc<Window>, placeholder: &ScreenMessageConfig) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let caps = surface.get_capabilities(&adapter);
        // Frames are blended in encoded space, like every other 8-bit blend here.
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| !fmt.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no texture formats")?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("viewer-device"),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .context("failed to acquire GPU device")?;

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            "viewer surface configured",
        );

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("crossfade-bgl"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline = create_pipeline(&device, &bind_group_layout, format);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("crossfade-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("crossfade-uniform"),
            size: std::mem::size_of::<FadeUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let from = FrameSlot::new(&device, "frame-from", config.width, config.height);
        let to = FrameSlot::new(&device, "frame-to", config.width, config.height);
        let bind_group = create_bind_group(
            &device,
            &bind_group_layout,
            &from,
            &to,
            &sampler,
            &uniform_buffer,
        );

        let fullscreen = window.fullscreen();
        Ok(Self {
            window,
            surface,
            config,
            device,
            queue,
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            bind_group,
            from,
            to,
            alpha: 1.0,
            painter: PlaceholderPainter::new(placeholder),
            fullscreen,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.config.width = new_size.width.max(1);
        self.config.height = new_size.height.max(1);
        self.surface.configure(&self.device, &self.config);
        debug!(
            width = self.config.width,
            height = self.config.height,
            "viewer surface resized",
        );
        self.redraw();
    }

    /// Present the current textures again, e.g. after the window was exposed.
    pub fn redraw(&mut self) {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Outdated) | Err(SurfaceError::Lost) => {
                info!("viewer surface lost; reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return;
            }
            Err(SurfaceError::OutOfMemory) => {
                error!("viewer surface out of memory; skipping frame");
                return;
            }
            Err(SurfaceError::Timeout) => {
                warn!("viewer surface acquisition timed out");
                return;
            }
            Err(SurfaceError::Other) => {
                warn!("viewer surface reported an unknown error; reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return;
            }
        };

        self.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&FadeUniform {
                alpha: self.alpha,
                _pad: [0.0; 3],
            }),
        );

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("viewer-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("crossfade-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();
    }

    fn load(&mut self, from: Option<&Arc<Surface>>, to: &Arc<Surface>) {
        let mut rebind = self.to.upload(&self.device, &self.queue, "frame-to", to);
        if let Some(from) = from {
            rebind |= self
                .from
                .upload(&self.device, &self.queue, "frame-from", from);
        }
        if rebind {
            self.bind_group = create_bind_group(
                &self.device,
                &self.bind_group_layout,
                &self.from,
                &self.to,
                &self.sampler,
                &self.uniform_buffer,
            );
        }
    }
}

impl Screen for GpuScreen {
    fn canvas_size(&self) -> CanvasSize {
        CanvasSize::new(self.config.width, self.config.height)
    }

    fn show(&mut self, frame: &Arc<Surface>) {
        self.load(None, frame);
        self.alpha = 1.0;
        self.redraw();
    }

    fn blend(&mut self, from: &Arc<Surface>, to: &Arc<Surface>, alpha: u8) {
        self.load(Some(from), to);
        self.alpha = f32::from(alpha) / 255.0;
        self.redraw();
    }

    fn show_placeholder(&mut self, message: &str) {
        let frame = Arc::new(self.painter.paint(message, self.canvas_size()));
        self.show(&frame);
    }

    fn release(&mut self) {
        debug!("handing the display to the external player");
        self.window.set_fullscreen(None);
        self.window.set_minimized(true);
    }

    fn restore(&mut self) {
        self.window.set_minimized(false);
        self.window.set_fullscreen(self.fullscreen.clone());
        self.window.focus_window();
        debug!("display reclaimed from the external player");
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    from: &FrameSlot,
    to: &FrameSlot,
    sampler: &wgpu::Sampler,
    uniform: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("crossfade-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&from.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&to.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: uniform.as_entire_binding(),
            },
        ],
    })
}

fn create_pipeline(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("crossfade-shader"),
        source: wgpu::ShaderSource::Wgsl(CROSSFADE_SHADER.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("crossfade-pipeline-layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("crossfade-pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
