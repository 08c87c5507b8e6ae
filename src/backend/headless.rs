//! Headless CPU host
//!
//! Reference [`CaptureHost`] that keeps its render target in host memory.
//! Stages run when [`HeadlessHost::render_frame`] is called; readbacks are
//! snapshotted at submission like a GPU copy would be, and stay pending until
//! the caller completes or fails them. This makes every asynchronous ordering
//! the capture pipeline must tolerate reproducible from a test.

use std::collections::{BTreeMap, HashMap, VecDeque};

use glam::Vec2;

use crate::error::{CaptureError, CaptureResult, ReadbackError};
use crate::format::{PixelFormat, CANONICAL_BYTES_PER_PIXEL, CANONICAL_FORMAT};
use crate::pipeline::{
    BlitOperation, CaptureHost, CaptureStage, ReadbackCallback, ReadbackData, StageCommands,
    StageId, SurfaceDescriptor, SurfaceHandle, TriggerPoint,
};
use crate::source::SourceDescriptor;

/// Render target storage, one image per array layer in the output's native format.
#[derive(Debug, Clone)]
struct RenderTarget {
    width: u32,
    height: u32,
    layers: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl RenderTarget {
    fn for_output(output: Option<&SourceDescriptor>) -> Self {
        let (size, layers, format) = match output {
            Some(desc) => (desc.target_size(), desc.target_layers(), desc.target_format()),
            None => (glam::UVec2::ZERO, 1, CANONICAL_FORMAT),
        };
        let len = size.x as usize * size.y as usize * layers as usize * format.bytes_per_pixel() as usize;
        Self {
            width: size.x,
            height: size.y,
            layers,
            format,
            data: vec![0; len],
        }
    }

    fn matches(&self, output: &SourceDescriptor) -> bool {
        let size = output.target_size();
        self.width == size.x
            && self.height == size.y
            && self.layers == output.target_layers()
            && self.format == output.target_format()
    }

    fn layer_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel() as usize
    }

    fn texel_offset(&self, layer: u32, x: u32, y: u32) -> usize {
        let bpp = self.format.bytes_per_pixel() as usize;
        layer as usize * self.layer_len() + (y as usize * self.width as usize + x as usize) * bpp
    }

    fn texel(&self, layer: u32, x: u32, y: u32) -> &[u8] {
        let offset = self.texel_offset(layer, x, y);
        &self.data[offset..offset + self.format.bytes_per_pixel() as usize]
    }
}

/// Intermediate surface, always stored as canonical B,G,R,A.
#[derive(Debug)]
struct Surface {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

struct PendingReadback {
    width: u32,
    height: u32,
    row_pitch: u32,
    bytes: Vec<u8>,
    callback: ReadbackCallback,
}

/// Stage command recorder that executes commands immediately on the CPU.
struct HeadlessCommands<'a> {
    target: &'a RenderTarget,
    surfaces: &'a mut HashMap<u64, Surface>,
    pending: &'a mut VecDeque<PendingReadback>,
    staging: &'a mut Vec<Vec<u8>>,
    row_alignment: u32,
    blits: &'a mut u64,
}

impl StageCommands for HeadlessCommands<'_> {
    fn blit(&mut self, blit: &BlitOperation) {
        let Some(surface) = self.surfaces.get_mut(&blit.destination.raw()) else {
            log::warn!("HeadlessHost: blit into unknown surface {:?}", blit.destination);
            return;
        };
        *self.blits += 1;

        let target = self.target;
        if target.width == 0 || target.height == 0 {
            surface.data.fill(0);
            return;
        }

        let layer = blit.source_slice.unwrap_or(0).min(target.layers - 1);
        let bpp = CANONICAL_BYTES_PER_PIXEL as usize;
        for y in 0..surface.height {
            for x in 0..surface.width {
                let uv = Vec2::new(
                    (x as f32 + 0.5) / surface.width as f32,
                    (y as f32 + 0.5) / surface.height as f32,
                );
                let src = blit.source_uv(uv) * Vec2::new(target.width as f32, target.height as f32);
                let sx = (src.x.max(0.0) as u32).min(target.width - 1);
                let sy = (src.y.max(0.0) as u32).min(target.height - 1);

                let bgra = target.format.texel_to_bgra(target.texel(layer, sx, sy));
                let offset = (y as usize * surface.width as usize + x as usize) * bpp;
                surface.data[offset..offset + bpp].copy_from_slice(&bgra);
            }
        }
    }

    fn readback(&mut self, surface: SurfaceHandle, format: PixelFormat, on_complete: ReadbackCallback) {
        let Some(source) = self.surfaces.get(&surface.raw()) else {
            log::warn!("HeadlessHost: readback of unknown surface {:?}", surface);
            self.pending.push_back(PendingReadback {
                width: 0,
                height: 0,
                row_pitch: 0,
                bytes: Vec::new(),
                callback: on_complete,
            });
            return;
        };

        if format != source.format {
            log::warn!(
                "HeadlessHost: readback format {:?} does not match surface format {:?}",
                format,
                source.format
            );
        }

        let row_bytes = source.width * CANONICAL_BYTES_PER_PIXEL;
        let row_pitch = align_to(row_bytes, self.row_alignment);
        let mut bytes = self.staging.pop().unwrap_or_default();
        bytes.clear();
        bytes.resize(row_pitch as usize * source.height as usize, 0);

        for (row, out) in bytes.chunks_exact_mut(row_pitch as usize).enumerate() {
            let start = row * row_bytes as usize;
            out[..row_bytes as usize].copy_from_slice(&source.data[start..start + row_bytes as usize]);
        }

        self.pending.push_back(PendingReadback {
            width: source.width,
            height: source.height,
            row_pitch,
            bytes,
            callback: on_complete,
        });
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

/// CPU implementation of [`CaptureHost`].
pub struct HeadlessHost {
    output: Option<SourceDescriptor>,
    target: RenderTarget,
    stages: BTreeMap<TriggerPoint, Vec<(StageId, Box<dyn CaptureStage>)>>,
    surfaces: HashMap<u64, Surface>,
    pending: VecDeque<PendingReadback>,
    staging: Vec<Vec<u8>>,
    next_stage_id: u64,
    next_surface_id: u64,
    row_alignment: u32,
    fail_next: usize,
    truncate_next: bool,
    frames: u64,
    blits: u64,
}

impl HeadlessHost {
    /// Host rendering `output`, with a zero-filled render target.
    pub fn new(output: SourceDescriptor) -> Self {
        Self::with_output(Some(output))
    }

    /// Host with no capture source.
    pub fn without_output() -> Self {
        Self::with_output(None)
    }

    fn with_output(output: Option<SourceDescriptor>) -> Self {
        let target = RenderTarget::for_output(output.as_ref());
        Self {
            output,
            target,
            stages: BTreeMap::new(),
            surfaces: HashMap::new(),
            pending: VecDeque::new(),
            staging: Vec::new(),
            next_stage_id: 1,
            next_surface_id: 1,
            row_alignment: CANONICAL_BYTES_PER_PIXEL,
            fail_next: 0,
            truncate_next: false,
            frames: 0,
            blits: 0,
        }
    }

    /// Pad readback rows to a multiple of `alignment` bytes.
    pub fn with_row_alignment(mut self, alignment: u32) -> Self {
        self.row_alignment = alignment.max(1);
        self
    }

    /// Replace the output description.
    ///
    /// The render target is reallocated (and cleared) if its size, layer
    /// count or format changes.
    pub fn set_output(&mut self, output: Option<SourceDescriptor>) {
        let keep = match (&output, &self.output) {
            (Some(new), Some(_)) => self.target.matches(new),
            _ => false,
        };
        if !keep {
            self.target = RenderTarget::for_output(output.as_ref());
        }
        self.output = output;
    }

    pub fn target_width(&self) -> u32 {
        self.target.width
    }

    pub fn target_height(&self) -> u32 {
        self.target.height
    }

    pub fn target_format(&self) -> PixelFormat {
        self.target.format
    }

    /// Overwrite one layer of the render target with native-format texels.
    pub fn write_layer(&mut self, layer: u32, bytes: &[u8]) {
        let len = self.target.layer_len();
        assert!(layer < self.target.layers, "layer {layer} out of range");
        assert_eq!(bytes.len(), len, "layer data must be {len} bytes");
        let start = layer as usize * len;
        self.target.data[start..start + len].copy_from_slice(bytes);
    }

    /// Set one native-format texel of the render target.
    pub fn set_texel(&mut self, layer: u32, x: u32, y: u32, texel: &[u8]) {
        let offset = self.target.texel_offset(layer, x, y);
        let bpp = self.target.format.bytes_per_pixel() as usize;
        self.target.data[offset..offset + bpp].copy_from_slice(&texel[..bpp]);
    }

    /// Fill a rectangle of one layer with a native-format texel.
    pub fn fill_rect(&mut self, layer: u32, x: u32, y: u32, width: u32, height: u32, texel: &[u8]) {
        let x_end = (x + width).min(self.target.width);
        let y_end = (y + height).min(self.target.height);
        for ty in y..y_end {
            for tx in x..x_end {
                self.set_texel(layer, tx, ty, texel);
            }
        }
    }

    /// Fill a whole layer with a native-format texel.
    pub fn fill_layer(&mut self, layer: u32, texel: &[u8]) {
        let (width, height) = (self.target.width, self.target.height);
        self.fill_rect(layer, 0, 0, width, height, texel);
    }

    /// Run every installed stage once, in trigger order.
    pub fn render_frame(&mut self) {
        let Self {
            target,
            stages,
            surfaces,
            pending,
            staging,
            row_alignment,
            blits,
            ..
        } = &mut *self;

        let mut commands = HeadlessCommands {
            target,
            surfaces,
            pending,
            staging,
            row_alignment: *row_alignment,
            blits,
        };

        for (trigger, installed) in stages.iter_mut() {
            for (_, stage) in installed.iter_mut() {
                log::trace!("HeadlessHost: running '{}' at {}", stage.name(), trigger.name());
                stage.execute(&mut commands);
            }
        }
        self.frames += 1;
    }

    /// Deliver every pending readback in submission order.
    pub fn complete_readbacks(&mut self) -> usize {
        let mut delivered = 0;
        while self.complete_next() {
            delivered += 1;
        }
        delivered
    }

    /// Deliver the oldest pending readback. Returns `false` if none is pending.
    pub fn complete_next(&mut self) -> bool {
        let Some(readback) = self.pending.pop_front() else {
            return false;
        };
        let PendingReadback {
            width,
            height,
            row_pitch,
            mut bytes,
            callback,
        } = readback;

        if self.fail_next > 0 {
            self.fail_next -= 1;
            callback(Err(ReadbackError::DeviceLost));
        } else if width == 0 || height == 0 {
            callback(Err(ReadbackError::MapFailed("surface no longer exists".to_string())));
        } else {
            if self.truncate_next {
                self.truncate_next = false;
                bytes.pop();
            }
            callback(Ok(ReadbackData::new(&bytes, width, height, row_pitch)));
        }

        self.staging.push(bytes);
        true
    }

    /// Make the next `count` completions report a device loss.
    pub fn fail_next_readbacks(&mut self, count: usize) {
        self.fail_next += count;
    }

    /// Deliver the next successful readback one byte short.
    pub fn truncate_next_readback(&mut self) {
        self.truncate_next = true;
    }

    /// Forget pending readbacks without completing them.
    pub fn drop_pending(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn pending_readbacks(&self) -> usize {
        self.pending.len()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    /// Names of installed stages, in execution order.
    pub fn stage_names(&self) -> Vec<String> {
        self.stages
            .values()
            .flat_map(|installed| installed.iter().map(|(_, stage)| stage.name().to_string()))
            .collect()
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Blits executed so far.
    pub fn blits(&self) -> u64 {
        self.blits
    }
}

impl CaptureHost for HeadlessHost {
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
        log::trace!("HeadlessHost: installing '{}' at {}", stage.name(), trigger.name());
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
        if desc.width == 0 || desc.height == 0 {
            return Err(CaptureError::Backend(format!(
                "cannot create a {}x{} surface",
                desc.width, desc.height
            )));
        }
        if desc.format != CANONICAL_FORMAT {
            return Err(CaptureError::Backend(format!(
                "headless surfaces must be {:?}, got {:?}",
                CANONICAL_FORMAT, desc.format
            )));
        }

        let id = self.next_surface_id;
        self.next_surface_id += 1;
        self.surfaces.insert(
            id,
            Surface {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                data: vec![0; desc.width as usize * desc.height as usize * CANONICAL_BYTES_PER_PIXEL as usize],
            },
        );
        Ok(SurfaceHandle::new(id))
    }

    fn destroy_surface(&mut self, surface: SurfaceHandle) {
        self.surfaces.remove(&surface.raw());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ReadbackResult;
    use crate::source::StereoMode;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Stage that blits a fixed operation and records what it read back.
    struct RecordingStage {
        blit: BlitOperation,
        received: Arc<Mutex<Vec<Result<(Vec<u8>, u32), ReadbackError>>>>,
    }

    impl CaptureStage for RecordingStage {
        fn name(&self) -> &str {
            "recorder"
        }

        fn execute(&mut self, commands: &mut dyn StageCommands) {
            commands.blit(&self.blit);
            let received = self.received.clone();
            commands.readback(
                self.blit.destination,
                CANONICAL_FORMAT,
                Box::new(move |result: ReadbackResult<'_>| {
                    received
                        .lock()
                        .push(result.map(|data| (data.bytes().to_vec(), data.row_pitch())));
                }),
            );
        }
    }

    type Received = Arc<Mutex<Vec<Result<(Vec<u8>, u32), ReadbackError>>>>;

    fn install_recorder(host: &mut HeadlessHost, width: u32, height: u32, blit: impl FnOnce(SurfaceHandle) -> BlitOperation) -> Received {
        let surface = host
            .create_surface(&SurfaceDescriptor {
                label: None,
                width,
                height,
                format: CANONICAL_FORMAT,
            })
            .unwrap();
        let received = Received::default();
        host.install_stage(
            TriggerPoint::AfterRendering,
            Box::new(RecordingStage {
                blit: blit(surface),
                received: received.clone(),
            }),
        )
        .unwrap();
        received
    }

    #[test]
    fn test_readback_is_deferred() {
        let mut host = HeadlessHost::new(SourceDescriptor::mono(2, 1));
        host.write_layer(0, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let received = install_recorder(&mut host, 2, 1, BlitOperation::full);

        host.render_frame();
        assert!(received.lock().is_empty());
        assert_eq!(host.pending_readbacks(), 1);

        assert_eq!(host.complete_readbacks(), 1);
        let received = received.lock();
        assert_eq!(received[0], Ok((vec![1, 2, 3, 4, 5, 6, 7, 8], 8)));
    }

    #[test]
    fn test_native_format_is_converted() {
        let source =
            SourceDescriptor::stereo(StereoMode::MultiPass, 1, 1, PixelFormat::Rgba8Unorm);
        let mut host = HeadlessHost::new(source);
        host.fill_layer(0, &[10, 20, 30, 40]);
        let received = install_recorder(&mut host, 1, 1, BlitOperation::full);

        host.render_frame();
        host.complete_readbacks();
        assert_eq!(received.lock()[0], Ok((vec![30, 20, 10, 40], 4)));
    }

    #[test]
    fn test_blit_honors_scale_and_offset() {
        let source = SourceDescriptor::stereo(StereoMode::SinglePass, 2, 1, CANONICAL_FORMAT);
        let mut host = HeadlessHost::new(source);
        host.fill_rect(0, 0, 0, 2, 1, &[1, 1, 1, 255]);
        host.fill_rect(0, 2, 0, 2, 1, &[2, 2, 2, 255]);

        let right = install_recorder(&mut host, 2, 1, |surface| BlitOperation {
            scale: Vec2::new(0.5, 1.0),
            offset: Vec2::new(0.5, 0.0),
            ..BlitOperation::full(surface)
        });

        host.render_frame();
        host.complete_readbacks();
        assert_eq!(right.lock()[0], Ok((vec![2, 2, 2, 255, 2, 2, 2, 255], 8)));
    }

    #[test]
    fn test_blit_reads_source_slice() {
        let source = SourceDescriptor::stereo(
            StereoMode::SinglePassInstanced,
            1,
            1,
            CANONICAL_FORMAT,
        );
        let mut host = HeadlessHost::new(source);
        host.fill_layer(0, &[1, 1, 1, 1]);
        host.fill_layer(1, &[2, 2, 2, 2]);

        let second = install_recorder(&mut host, 1, 1, |surface| BlitOperation {
            source_slice: Some(1),
            ..BlitOperation::full(surface)
        });

        host.render_frame();
        host.complete_readbacks();
        assert_eq!(second.lock()[0], Ok((vec![2, 2, 2, 2], 4)));
    }

    #[test]
    fn test_row_alignment_pads_rows() {
        let mut host = HeadlessHost::new(SourceDescriptor::mono(1, 2)).with_row_alignment(16);
        host.write_layer(0, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let received = install_recorder(&mut host, 1, 2, BlitOperation::full);

        host.render_frame();
        host.complete_readbacks();
        let received = received.lock();
        let (bytes, pitch) = received[0].as_ref().unwrap();
        assert_eq!(*pitch, 16);
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);
        assert_eq!(&bytes[16..20], &[5, 6, 7, 8]);
    }

    #[test]
    fn test_failures_and_drops() {
        let mut host = HeadlessHost::new(SourceDescriptor::mono(1, 1));
        let received = install_recorder(&mut host, 1, 1, BlitOperation::full);

        host.render_frame();
        host.render_frame();
        host.render_frame();
        host.fail_next_readbacks(1);
        assert!(host.complete_next());
        assert_eq!(host.drop_pending(), 2);
        assert!(!host.complete_next());

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], Err(ReadbackError::DeviceLost));
    }

    #[test]
    fn test_stages_run_in_trigger_order() {
        struct Named(&'static str, Arc<Mutex<Vec<&'static str>>>);

        impl CaptureStage for Named {
            fn name(&self) -> &str {
                self.0
            }

            fn execute(&mut self, _commands: &mut dyn StageCommands) {
                self.1.lock().push(self.0);
            }
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut host = HeadlessHost::new(SourceDescriptor::mono(1, 1));
        host.install_stage(TriggerPoint::AfterRendering, Box::new(Named("last", order.clone())))
            .unwrap();
        let first = host
            .install_stage(TriggerPoint::BeforeRendering, Box::new(Named("first", order.clone())))
            .unwrap();
        host.install_stage(TriggerPoint::AfterOpaque, Box::new(Named("middle", order.clone())))
            .unwrap();

        host.render_frame();
        assert_eq!(*order.lock(), vec!["first", "middle", "last"]);
        assert_eq!(host.stage_names(), vec!["first", "middle", "last"]);

        host.uninstall_stage(first);
        host.uninstall_stage(first);
        assert_eq!(host.stage_count(), 2);
    }

    #[test]
    fn test_zero_sized_surface_is_rejected() {
        let mut host = HeadlessHost::new(SourceDescriptor::mono(1, 1));
        let result = host.create_surface(&SurfaceDescriptor {
            label: None,
            width: 0,
            height: 4,
            format: CANONICAL_FORMAT,
        });
        assert!(matches!(result, Err(CaptureError::Backend(_))));
    }
}
