use std::collections::HashMap;

use image::RgbaImage;
use log::{debug, info, warn};
use wgpu::util::DeviceExt;

use super::backend::{Frame, RenderBackend};
use super::error::RenderError;
use super::shaders::{ProgramRecipe, ShaderStage, ShaderVariant, VertexAttribute};
use super::texture::{check_texture_size, TextureId};
use crate::geometry::{MeshData, Vertex};
use crate::scene::PrimitiveKind;

/// Backend drawing through wgpu onto a window surface or a WebGL2 canvas.
pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: DepthBuffer,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    modules: HashMap<(ShaderVariant, ShaderStage), wgpu::ShaderModule>,
    pipelines: HashMap<ShaderVariant, wgpu::RenderPipeline>,
    meshes: HashMap<PrimitiveKind, MeshBuffers>,
    textures: HashMap<TextureId, GpuTexture>,
}

impl WgpuBackend {
    /// Creates the device and configures `target` for presentation.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::ContextCreation(
                "render target has zero area".to_string(),
            ));
        }

        #[cfg(target_arch = "wasm32")]
        let backends = wgpu::Backends::GL;
        #[cfg(not(target_arch = "wasm32"))]
        let backends = wgpu::Backends::PRIMARY;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance
            .create_surface(target)
            .map_err(|err| RenderError::ContextCreation(err.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| {
                RenderError::ContextCreation(format!("failed to acquire GPU adapter: {err}"))
            })?;
        info!("using adapter {}", adapter.get_info().name);

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("shade-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                .using_resolution(adapter.limits()),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .map_err(|err| {
                RenderError::ContextCreation(format!("failed to create GPU device: {err}"))
            })?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| {
                RenderError::ContextCreation("surface reports no supported formats".to_string())
            })?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, width, height);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform-bind-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("image-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth,
            uniform_layout,
            texture_layout,
            sampler,
            modules: HashMap::new(),
            pipelines: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
        })
    }

    /// Runs `create` inside a validation error scope and returns its error, if any.
    fn validated<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<String>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error.map(|err| err.to_string()))
    }

    fn upload_levels(&self, texture: &wgpu::Texture, mip_chain: &[RgbaImage]) {
        for (level, image) in mip_chain.iter().enumerate() {
            let (width, height) = image.dimensions();
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                image.as_raw(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    /// Allocates and fills a texture inside a validation scope.
    fn build_texture(
        &self,
        texture: TextureId,
        mip_chain: &[RgbaImage],
    ) -> Result<GpuTexture, RenderError> {
        if let Some(base) = mip_chain.first() {
            let max = self.device.limits().max_texture_dimension_2d;
            check_texture_size(texture, base.dimensions(), max)?;
        }
        let (gpu_texture, error) = self.validated(|_| {
            let gpu_texture = self.allocate_texture(texture, mip_chain);
            self.upload_levels(&gpu_texture.texture, mip_chain);
            gpu_texture
        });
        match error {
            Some(log) => Err(RenderError::TextureUpload {
                texture: texture.0,
                log,
            }),
            None => Ok(gpu_texture),
        }
    }

    fn allocate_texture(&self, texture: TextureId, mip_chain: &[RgbaImage]) -> GpuTexture {
        let (width, height) = mip_chain
            .first()
            .map(RgbaImage::dimensions)
            .unwrap_or((1, 1));
        let levels = mip_chain.len().max(1) as u32;
        let label = format!("texture-{}", texture.0);
        let gpu_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&label),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        GpuTexture {
            texture: gpu_texture,
            bind_group,
            size: (width, height),
            levels,
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn compile_stage(
        &mut self,
        variant: ShaderVariant,
        stage: ShaderStage,
        source: &str,
    ) -> Result<(), RenderError> {
        let label = format!("{variant}-{}", stage.extension());
        let (module, error) = self.validated(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        self.modules.insert((variant, stage), module);
        match error {
            Some(log) => Err(RenderError::ShaderCompile {
                variant,
                stage,
                log,
            }),
            None => Ok(()),
        }
    }

    fn link_program(
        &mut self,
        variant: ShaderVariant,
        recipe: &ProgramRecipe,
    ) -> Result<(), RenderError> {
        self.pipelines.remove(&variant);
        let (Some(vertex), Some(fragment)) = (
            self.modules.get(&(variant, ShaderStage::Vertex)),
            self.modules.get(&(variant, ShaderStage::Fragment)),
        ) else {
            return Err(RenderError::ShaderLink {
                variant,
                log: "both stages must be compiled before linking".to_string(),
            });
        };

        let mut bind_group_layouts = vec![&self.uniform_layout];
        if recipe.is_textured() {
            bind_group_layouts.push(&self.texture_layout);
        }
        let attributes: Vec<wgpu::VertexAttribute> = recipe
            .attributes
            .iter()
            .map(|attribute| wgpu::VertexAttribute {
                format: vertex_format(*attribute),
                offset: attribute.offset(),
                shader_location: attribute.location(),
            })
            .collect();
        let label = format!("{variant}-pipeline");
        let format = self.config.format;

        let (pipeline, error) = self.validated(|device| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&label),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: Some(ShaderStage::Vertex.entry_point()),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DepthBuffer::FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: fragment,
                    entry_point: Some(ShaderStage::Fragment.entry_point()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        });

        if let Some(log) = error {
            return Err(RenderError::ShaderLink { variant, log });
        }
        self.pipelines.insert(variant, pipeline);
        Ok(())
    }

    fn has_program(&self, variant: ShaderVariant) -> bool {
        self.pipelines.contains_key(&variant)
    }

    fn upload_mesh(&mut self, kind: PrimitiveKind, mesh: &MeshData) -> Result<(), RenderError> {
        self.meshes
            .insert(kind, MeshBuffers::from_mesh(&self.device, mesh, kind.name()));
        Ok(())
    }

    fn create_texture(
        &mut self,
        texture: TextureId,
        level0: &RgbaImage,
    ) -> Result<(), RenderError> {
        let gpu_texture = self.build_texture(texture, std::slice::from_ref(level0))?;
        self.textures.insert(texture, gpu_texture);
        Ok(())
    }

    fn write_texture(
        &mut self,
        texture: TextureId,
        mip_chain: &[RgbaImage],
    ) -> Result<(), RenderError> {
        let current = self
            .textures
            .get(&texture)
            .ok_or(RenderError::UnknownTexture(texture.0))?;
        let size = mip_chain
            .first()
            .map(RgbaImage::dimensions)
            .unwrap_or((1, 1));
        if current.size == size && current.levels == mip_chain.len() as u32 {
            let ((), error) = self.validated(|_| self.upload_levels(&current.texture, mip_chain));
            return match error {
                Some(log) => Err(RenderError::TextureUpload {
                    texture: texture.0,
                    log,
                }),
                None => Ok(()),
            };
        }
        // The handle stays the same; only the GPU object behind it is replaced.
        debug!("reallocating texture {texture} at {}x{}", size.0, size.1);
        let gpu_texture = self.build_texture(texture, mip_chain)?;
        self.textures.insert(texture, gpu_texture);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, width, height);
    }

    fn submit(&mut self, frame: &Frame) -> Result<(), RenderError> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("Surface timeout; skipping frame");
                return Ok(());
            }
            Err(err) => return Err(RenderError::Surface(err.to_string())),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        let uniform_groups: Vec<wgpu::BindGroup> = frame
            .draws
            .iter()
            .map(|draw| {
                let buffer = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("draw-uniforms"),
                        contents: draw.uniforms.as_bytes(),
                        usage: wgpu::BufferUsages::UNIFORM,
                    });
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("draw-bind-group"),
                    layout: &self.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        let [r, g, b, a] = frame.clear_color.map(f64::from);
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for (draw, uniforms) in frame.draws.iter().zip(&uniform_groups) {
            let (Some(pipeline), Some(mesh)) = (
                self.pipelines.get(&draw.variant),
                self.meshes.get(&draw.primitive),
            ) else {
                continue;
            };
            if draw.variant.recipe().is_textured() {
                let Some(texture) = draw
                    .texture
                    .and_then(|binding| self.textures.get(&binding.texture))
                else {
                    warn!("skipping {} draw without a bound texture", draw.variant);
                    continue;
                };
                pass.set_bind_group(1, &texture.bind_group, &[]);
            }
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, uniforms, &[]);
            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..draw.index_count.min(mesh.index_count), 0, 0..1);
        }

        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn vertex_format(attribute: VertexAttribute) -> wgpu::VertexFormat {
    match attribute.components() {
        2 => wgpu::VertexFormat::Float32x2,
        _ => wgpu::VertexFormat::Float32x3,
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    size: (u32, u32),
    levels: u32,
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.face_index_count(),
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
