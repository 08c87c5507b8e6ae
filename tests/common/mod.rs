//! Common utilities for capture integration tests.
//!
//! Shared setup for driving a [`FrameCapture`] through the headless host.

#![allow(dead_code)]

use render_capture::{
    CaptureConfig, FrameCapture, FrameDescriptor, FrameSink, HeadlessHost, SourceDescriptor,
};

/// Install a test logger once per process.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic BGRA byte pattern for a `width × height` frame.
///
/// Different seeds give different patterns, so frames can be told apart.
pub fn generate_test_pattern(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let len = width as usize * height as usize * 4;
    (0..len)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(seed as u32 * 17) as u8)
        .collect()
}

/// Headless host plus an activated capture of its mono output.
pub struct TestContext {
    pub host: HeadlessHost,
    pub capture: FrameCapture,
}

impl TestContext {
    pub fn new(source: SourceDescriptor, config: CaptureConfig) -> Self {
        init_logging();
        let mut host = HeadlessHost::new(source);
        let mut capture = FrameCapture::new(config);
        capture
            .activate(&mut host)
            .expect("capture should activate on a valid source");
        Self { host, capture }
    }

    pub fn mono(width: u32, height: u32) -> Self {
        Self::new(SourceDescriptor::mono(width, height), CaptureConfig::default())
    }

    /// Render one frame showing `pattern` and leave its readback pending.
    pub fn render_pattern(&mut self, pattern: &[u8]) {
        self.host.write_layer(0, pattern);
        self.host.render_frame();
    }

    /// Render one frame showing `pattern` and complete every pending readback.
    pub fn render_and_complete(&mut self, pattern: &[u8]) -> usize {
        self.render_pattern(pattern);
        self.host.complete_readbacks()
    }
}

/// Owned copy of a dispatched frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub sequence: u64,
}

impl CapturedFrame {
    pub fn from_descriptor(frame: &FrameDescriptor<'_>) -> Self {
        Self {
            bytes: frame.bytes.to_vec(),
            width: frame.width,
            height: frame.height,
            stride: frame.stride,
            sequence: frame.sequence,
        }
    }
}

/// Sink that keeps a copy of everything it receives.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub frames: Vec<CapturedFrame>,
}

impl FrameSink for CollectingSink {
    fn on_frame(&mut self, frame: &FrameDescriptor<'_>) {
        self.frames.push(CapturedFrame::from_descriptor(frame));
    }
}
