//! wgpu capture host
//!
//! Runs capture stages against a wgpu render target. Blits are fullscreen
//! triangles that `textureLoad` the selected slice and rectangle of the
//! target into a BGRA8 surface; readbacks copy the surface into a mappable
//! staging buffer with 256-byte aligned rows and complete once `map_async`
//! resolves during [`WgpuHost::poll`]. Nothing in this module waits on the GPU.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;

use crate::error::{CaptureError, CaptureResult, ReadbackError};
use crate::format::{PixelFormat, CANONICAL_BYTES_PER_PIXEL, CANONICAL_FORMAT};
use crate::pipeline::{
    BlitOperation, CaptureHost, CaptureStage, ReadbackCallback, ReadbackData, StageCommands,
    StageId, SurfaceDescriptor, SurfaceHandle, TriggerPoint,
};
use crate::source::SourceDescriptor;

const BLIT_SHADER: &str = r#"
struct BlitParams {
    scale_offset: vec4<f32>,
    layer: vec4<u32>,
};

@group(0) @binding(0) var source: texture_2d_array<f32>;
@group(0) @binding(1) var<uniform> params: BlitParams;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * vec2<f32>(2.0, -2.0) + vec2<f32>(-1.0, 1.0), 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let size = vec2<i32>(textureDimensions(source));
    let uv = in.uv * params.scale_offset.xy + params.scale_offset.zw;
    let texel = clamp(vec2<i32>(floor(uv * vec2<f32>(size))), vec2<i32>(0), size - vec2<i32>(1));
    return textureLoad(source, texel, i32(params.layer.x), 0);
}
"#;

/// Uniform block of the blit shader
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BlitParams {
    scale_offset: [f32; 4],
    layer: [u32; 4],
}

impl BlitParams {
    fn from_blit(blit: &BlitOperation) -> Self {
        Self {
            scale_offset: [blit.scale.x, blit.scale.y, blit.offset.x, blit.offset.y],
            layer: [blit.source_slice.unwrap_or(0), 0, 0, 0],
        }
    }
}

fn convert_pixel_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        PixelFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        PixelFormat::Rgb10a2Unorm => wgpu::TextureFormat::Rgb10a2Unorm,
        PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

fn padded_row_bytes(width: u32) -> u32 {
    let unpadded = width * CANONICAL_BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Render target the host owns for the current output.
struct RenderTarget {
    texture: wgpu::Texture,
    /// Array view with any sRGB encoding stripped, so blits copy bytes unchanged
    view: wgpu::TextureView,
    format: PixelFormat,
    width: u32,
    height: u32,
    layers: u32,
}

struct WgpuSurface {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    params: wgpu::Buffer,
    width: u32,
    height: u32,
}

struct StagingBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

/// A copy recorded into the current encoder, waiting for submission.
struct RecordedCopy {
    /// Error to report instead of mapping when no copy was recorded
    staging: Result<StagingBuffer, ReadbackError>,
    width: u32,
    height: u32,
    row_pitch: u32,
    callback: ReadbackCallback,
}

/// A submitted copy whose staging buffer is being mapped.
struct MappingCopy {
    copy: RecordedCopy,
    status: Arc<Mutex<Option<Result<(), wgpu::BufferAsyncError>>>>,
}

struct BlitPipeline {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
}

impl BlitPipeline {
    fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Capture Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(BLIT_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Capture Blit Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Capture Blit Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Capture Blit Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: convert_pixel_format(CANONICAL_FORMAT),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Self {
            bind_group_layout,
            pipeline,
        }
    }
}

/// Records stage commands into a wgpu command encoder.
struct WgpuCommands<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    encoder: &'a mut wgpu::CommandEncoder,
    blit: &'a BlitPipeline,
    target: Option<&'a RenderTarget>,
    surfaces: &'a HashMap<u64, WgpuSurface>,
    staging: &'a mut Vec<StagingBuffer>,
    recorded: &'a mut Vec<RecordedCopy>,
    /// Surfaces whose last blit this frame was rejected
    unwritten: HashSet<u64>,
}

impl WgpuCommands<'_> {
    fn take_staging(&mut self, size: u64) -> StagingBuffer {
        if let Some(index) = self.staging.iter().position(|s| s.size == size) {
            return self.staging.swap_remove(index);
        }
        log::trace!("WgpuHost: allocating {} byte staging buffer", size);
        StagingBuffer {
            buffer: self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Capture Staging Buffer"),
                size,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            }),
            size,
        }
    }

    /// Record the blit pass. Returns `false` if the blit cannot run.
    fn encode_blit(&mut self, blit: &BlitOperation) -> bool {
        let surfaces = self.surfaces;
        let Some(surface) = surfaces.get(&blit.destination.raw()) else {
            log::warn!("WgpuHost: blit into unknown surface {:?}", blit.destination);
            return false;
        };
        let Some(target) = self.target else {
            log::warn!("WgpuHost: blit without a render target");
            return false;
        };
        if blit.source_slice.unwrap_or(0) >= target.layers {
            log::warn!(
                "WgpuHost: blit slice {:?} out of range for {} layers",
                blit.source_slice,
                target.layers
            );
            return false;
        }

        self.queue.write_buffer(
            &surface.params,
            0,
            bytemuck::bytes_of(&BlitParams::from_blit(blit)),
        );

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Capture Blit Bind Group"),
            layout: &self.blit.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: surface.params.as_entire_binding(),
                },
            ],
        });

        let load = if blit.discard_destination {
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
        } else {
            wgpu::LoadOp::Load
        };

        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Capture Blit Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &surface.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.blit.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
        true
    }
}

impl StageCommands for WgpuCommands<'_> {
    fn blit(&mut self, blit: &BlitOperation) {
        if self.encode_blit(blit) {
            self.unwritten.remove(&blit.destination.raw());
        } else {
            self.unwritten.insert(blit.destination.raw());
        }
    }

    fn readback(&mut self, surface: SurfaceHandle, format: PixelFormat, on_complete: ReadbackCallback) {
        let surfaces = self.surfaces;
        let Some(source) = surfaces.get(&surface.raw()) else {
            log::warn!("WgpuHost: readback of unknown surface {:?}", surface);
            self.recorded.push(RecordedCopy {
                staging: Err(ReadbackError::MapFailed("surface no longer exists".to_string())),
                width: 0,
                height: 0,
                row_pitch: 0,
                callback: on_complete,
            });
            return;
        };
        if self.unwritten.contains(&surface.raw()) {
            log::trace!("WgpuHost: surface {:?} was not written this frame", surface);
            self.recorded.push(RecordedCopy {
                staging: Err(ReadbackError::MapFailed(
                    "blit into the surface was rejected".to_string(),
                )),
                width: source.width,
                height: source.height,
                row_pitch: 0,
                callback: on_complete,
            });
            return;
        }
        if format != CANONICAL_FORMAT {
            log::warn!("WgpuHost: readback format {:?} is not supported, using {:?}", format, CANONICAL_FORMAT);
        }

        let (width, height) = (source.width, source.height);
        let row_pitch = padded_row_bytes(width);
        let staging = self.take_staging(row_pitch as u64 * height as u64);

        self.encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &source.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging.buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(row_pitch),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        self.recorded.push(RecordedCopy {
            staging: Ok(staging),
            width,
            height,
            row_pitch,
            callback: on_complete,
        });
    }
}

/// [`CaptureHost`] backed by a wgpu device.
///
/// Per frame: encode stages with [`run_stages`](Self::run_stages) or
/// [`encode_frame`](Self::encode_frame), submit the encoder, call
/// [`after_submit`](Self::after_submit), and call [`poll`](Self::poll) to
/// deliver completed readbacks.
pub struct WgpuHost {
    device: wgpu::Device,
    queue: wgpu::Queue,
    output: Option<SourceDescriptor>,
    target: Option<RenderTarget>,
    blit: BlitPipeline,
    stages: BTreeMap<TriggerPoint, Vec<(StageId, Box<dyn CaptureStage>)>>,
    surfaces: HashMap<u64, WgpuSurface>,
    staging: Vec<StagingBuffer>,
    recorded: Vec<RecordedCopy>,
    mapping: VecDeque<MappingCopy>,
    next_stage_id: u64,
    next_surface_id: u64,
}

impl WgpuHost {
    /// Wrap an existing device, allocating a render target for `output`.
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        output: Option<SourceDescriptor>,
    ) -> Self {
        let blit = BlitPipeline::new(&device);
        let mut host = Self {
            device,
            queue,
            output: None,
            target: None,
            blit,
            stages: BTreeMap::new(),
            surfaces: HashMap::new(),
            staging: Vec::new(),
            recorded: Vec::new(),
            mapping: VecDeque::new(),
            next_stage_id: 1,
            next_surface_id: 1,
        };
        host.set_output(output);
        host
    }

    /// Create a device without a window.
    pub async fn new_async(output: Option<SourceDescriptor>) -> CaptureResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| CaptureError::Backend("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "WgpuHost: selected GPU {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Capture Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        Ok(Self::from_device(device, queue, output))
    }

    /// Blocking wrapper around [`new_async`](Self::new_async).
    pub fn new_headless(output: Option<SourceDescriptor>) -> CaptureResult<Self> {
        pollster::block_on(Self::new_async(output))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Render target for the current output, for the renderer to draw into.
    pub fn target_texture(&self) -> Option<&wgpu::Texture> {
        self.target.as_ref().map(|target| &target.texture)
    }

    /// Replace the output description, reallocating the render target if needed.
    pub fn set_output(&mut self, output: Option<SourceDescriptor>) {
        let reuse = match (&output, &self.target) {
            (Some(desc), Some(target)) => {
                let size = desc.target_size();
                target.width == size.x
                    && target.height == size.y
                    && target.layers == desc.target_layers()
                    && target.format == desc.target_format()
            }
            _ => false,
        };
        if !reuse {
            self.target = output.as_ref().and_then(|desc| self.create_target(desc));
        }
        self.output = output;
    }

    fn create_target(&self, desc: &SourceDescriptor) -> Option<RenderTarget> {
        let size = desc.target_size();
        if size.x == 0 || size.y == 0 {
            return None;
        }
        let layers = desc.target_layers();
        let format = convert_pixel_format(desc.target_format());
        let view_format = format.remove_srgb_suffix();
        let view_formats = if view_format != format {
            vec![view_format]
        } else {
            Vec::new()
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Capture Render Target"),
            size: wgpu::Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &view_formats,
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Capture Render Target View"),
            format: Some(view_format),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        Some(RenderTarget {
            texture,
            view,
            format: desc.target_format(),
            width: size.x,
            height: size.y,
            layers,
        })
    }

    /// Upload native-format texels into one layer of the render target.
    pub fn write_target_layer(&self, layer: u32, bytes: &[u8]) {
        let Some(target) = &self.target else {
            return;
        };
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(target.width * target.format.bytes_per_pixel()),
                rows_per_image: Some(target.height),
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Encode the stages installed at `trigger`.
    pub fn run_stages(&mut self, trigger: TriggerPoint, encoder: &mut wgpu::CommandEncoder) {
        let Some(installed) = self.stages.get_mut(&trigger) else {
            return;
        };

        let mut commands = WgpuCommands {
            device: &self.device,
            queue: &self.queue,
            encoder,
            blit: &self.blit,
            target: self.target.as_ref(),
            surfaces: &self.surfaces,
            staging: &mut self.staging,
            recorded: &mut self.recorded,
            unwritten: HashSet::new(),
        };

        for (_, stage) in installed.iter_mut() {
            log::trace!("WgpuHost: running '{}' at {}", stage.name(), trigger.name());
            stage.execute(&mut commands);
        }
    }

    /// Encode every installed stage, in trigger order.
    pub fn encode_frame(&mut self, encoder: &mut wgpu::CommandEncoder) {
        for trigger in TriggerPoint::ALL {
            self.run_stages(trigger, encoder);
        }
    }

    /// Start mapping the staging buffers of copies submitted since the last call.
    ///
    /// Must be called after the encoder that recorded them was submitted.
    pub fn after_submit(&mut self) {
        for copy in self.recorded.drain(..) {
            let status = Arc::new(Mutex::new(None));
            if let Ok(staging) = &copy.staging {
                let status = status.clone();
                staging
                    .buffer
                    .slice(..staging.size)
                    .map_async(wgpu::MapMode::Read, move |result| {
                        *status.lock() = Some(result);
                    });
            }
            self.mapping.push_back(MappingCopy { copy, status });
        }
    }

    /// Encode, submit and start mapping one frame's worth of stages.
    pub fn submit_frame(&mut self) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Capture Frame Encoder"),
            });
        self.encode_frame(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));
        self.after_submit();
    }

    /// Deliver finished readbacks in submission order without blocking.
    ///
    /// Returns the number of callbacks invoked.
    pub fn poll(&mut self) -> usize {
        let _ = self.device.poll(wgpu::Maintain::Poll);

        let mut delivered = 0;
        loop {
            let ready = match self.mapping.front() {
                Some(front) => front.copy.staging.is_err() || front.status.lock().is_some(),
                None => false,
            };
            if !ready {
                break;
            }
            let Some(MappingCopy { copy, status }) = self.mapping.pop_front() else {
                break;
            };
            let status = status.lock().take();
            self.deliver(copy, status);
            delivered += 1;
        }
        delivered
    }

    fn deliver(&mut self, copy: RecordedCopy, status: Option<Result<(), wgpu::BufferAsyncError>>) {
        let RecordedCopy {
            staging,
            width,
            height,
            row_pitch,
            callback,
        } = copy;

        let staging = match staging {
            Ok(staging) => staging,
            Err(err) => {
                callback(Err(err));
                return;
            }
        };

        match status {
            Some(Ok(())) => {
                {
                    let view = staging.buffer.slice(..staging.size).get_mapped_range();
                    callback(Ok(ReadbackData::new(&view, width, height, row_pitch)));
                }
                staging.buffer.unmap();
            }
            Some(Err(err)) => {
                log::trace!("WgpuHost: map failed: {}", err);
                callback(Err(ReadbackError::MapFailed(err.to_string())));
            }
            None => callback(Err(ReadbackError::Cancelled)),
        }
        self.staging.push(staging);
    }

    /// Readbacks submitted and not yet delivered.
    pub fn pending_readbacks(&self) -> usize {
        self.recorded.len() + self.mapping.len()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }
}

impl CaptureHost for WgpuHost {
    fn output(&self) -> Option<SourceDescriptor> {
        self.output.clone()
    }

    fn install_stage(
        &mut self,
        trigger: TriggerPoint,
        stage: Box<dyn CaptureStage>,
    ) -> CaptureResult<StageId> {
        let id = StageId::new(self.next_stage_id);
        self.next_stage_id += 1;
        self.stages.entry(trigger).or_default().push((id, stage));
        Ok(id)
    }

    fn uninstall_stage(&mut self, stage: StageId) {
        for installed in self.stages.values_mut() {
            installed.retain(|(id, _)| *id != stage);
        }
        self.stages.retain(|_, installed| !installed.is_empty());
    }

    fn create_surface(&mut self, desc: &SurfaceDescriptor) -> CaptureResult<SurfaceHandle> {
        if desc.format != CANONICAL_FORMAT {
            return Err(CaptureError::Backend(format!(
                "readback surfaces must be {:?}, got {:?}",
                CANONICAL_FORMAT, desc.format
            )));
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(CaptureError::Backend(format!(
                "cannot create a {}x{} surface (limit {})",
                desc.width, desc.height, max
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert_pixel_format(desc.format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let params = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Blit Params"),
            size: std::mem::size_of::<BlitParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let id = self.next_surface_id;
        self.next_surface_id += 1;
        self.surfaces.insert(
            id,
            WgpuSurface {
                texture,
                view,
                params,
                width: desc.width,
                height: desc.height,
            },
        );
        Ok(SurfaceHandle::new(id))
    }

    fn destroy_surface(&mut self, surface: SurfaceHandle) {
        if let Some(surface) = self.surfaces.remove(&surface.raw()) {
            surface.texture.destroy();
            surface.params.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_padding() {
        assert_eq!(padded_row_bytes(1), 256);
        assert_eq!(padded_row_bytes(64), 256);
        assert_eq!(padded_row_bytes(65), 512);
        assert_eq!(padded_row_bytes(1920), 7680);
    }

    #[test]
    fn test_blit_params_layout() {
        let mut blit = BlitOperation::full(SurfaceHandle::new(1));
        blit.scale = glam::Vec2::new(0.5, 1.0);
        blit.source_slice = Some(1);
        let params = BlitParams::from_blit(&blit);
        assert_eq!(params.scale_offset, [0.5, 1.0, 0.0, 0.0]);
        assert_eq!(params.layer[0], 1);
        assert_eq!(std::mem::size_of::<BlitParams>(), 32);
    }
}
