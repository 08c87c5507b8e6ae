//! Capture loopback demo
//!
//! Drives a headless host through a number of frames with a moving test
//! pattern, completes readbacks with a configurable delay, and pulls frames
//! on a separate consumer thread at its own cadence. Prints capture
//! statistics at the end.
//!
//! ```bash
//! cargo run --example capture_loopback -- --frames 240 --stereo side-by-side --latency 2
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use render_capture::{
    CameraEyes, CaptureConfig, FrameCapture, FrameDescriptor, HeadlessHost, PixelFormat,
    SourceDescriptor, StereoMode, TriggerPoint,
};

/// Output layout rendered by the demo host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Layout {
    Mono,
    SideBySide,
    Instanced,
    MultiPassLeft,
}

#[derive(Debug, Parser)]
#[command(name = "capture_loopback", about = "Capture frames from a headless renderer")]
struct Args {
    /// Output (or per-eye) width in pixels
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Output (or per-eye) height in pixels
    #[arg(long, default_value_t = 360)]
    height: u32,

    /// Frames to render
    #[arg(long, default_value_t = 120)]
    frames: u32,

    /// Output layout
    #[arg(long, value_enum, default_value_t = Layout::Mono)]
    stereo: Layout,

    /// Frame buffers in the capture pool
    #[arg(long, default_value_t = 3)]
    pool: usize,

    /// Readbacks allowed in flight
    #[arg(long, default_value_t = 3)]
    max_in_flight: usize,

    /// Frames a readback takes to complete
    #[arg(long, default_value_t = 1)]
    latency: usize,

    /// Fail every Nth readback (0 disables)
    #[arg(long, default_value_t = 0)]
    fail_every: u32,

    /// Consumer pull interval in milliseconds
    #[arg(long, default_value_t = 4)]
    consumer_interval_ms: u64,
}

fn source_for(args: &Args) -> SourceDescriptor {
    match args.stereo {
        Layout::Mono => SourceDescriptor::mono(args.width, args.height),
        Layout::SideBySide => SourceDescriptor::stereo(
            StereoMode::SinglePass,
            args.width,
            args.height,
            PixelFormat::Rgba8Unorm,
        ),
        Layout::Instanced => SourceDescriptor::stereo(
            StereoMode::SinglePassInstanced,
            args.width,
            args.height,
            PixelFormat::Rgba8Unorm,
        ),
        Layout::MultiPassLeft => SourceDescriptor::stereo(
            StereoMode::MultiPass,
            args.width,
            args.height,
            PixelFormat::Rgba8Unorm,
        )
        .with_camera_eyes(CameraEyes::Left),
    }
}

/// Paint a vertical bar that moves one step per frame.
fn paint_frame(host: &mut HeadlessHost, source: &SourceDescriptor, frame: u32) {
    let layers = source.target_layers();
    let (width, height) = (host.target_width(), host.target_height());
    let bar_width = (width / 16).max(1);
    let bar_x = (frame * bar_width) % width.max(1);

    let (background, bar): ([u8; 4], [u8; 4]) = if source.native_format == PixelFormat::Rgba8Unorm {
        ([20, 20, 60, 255], [240, 200, 40, 255])
    } else {
        ([60, 20, 20, 255], [40, 200, 240, 255])
    };

    for layer in 0..layers {
        host.fill_layer(layer, &background);
        host.fill_rect(layer, bar_x, 0, bar_width, height, &bar);
    }
}

/// Column of the brightest pixel in the first row, used to track the bar.
fn bar_position(frame: &FrameDescriptor<'_>) -> Option<usize> {
    frame.pixels()[..frame.width as usize]
        .iter()
        .position(|px| px[1] >= 200)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let source = source_for(&args);
    let mut host = HeadlessHost::new(source.clone());
    let config = CaptureConfig::default()
        .with_trigger(TriggerPoint::AfterRendering)
        .with_pool_capacity(args.pool)
        .with_max_in_flight(args.max_in_flight)
        .with_label("Loopback");

    let mut capture = FrameCapture::new(config);
    if let Err(err) = capture.activate(&mut host) {
        log::error!("Failed to start capture: {}", err);
        std::process::exit(1);
    }

    let dispatch = capture.dispatcher();
    let done = Arc::new(AtomicBool::new(false));
    let interval = Duration::from_millis(args.consumer_interval_ms);

    let consumer = {
        let done = done.clone();
        std::thread::spawn(move || {
            let mut received = 0u64;
            let mut last_sequence = None;
            loop {
                let finished = done.load(Ordering::Acquire);
                let pulled = dispatch.request_frame(|frame| {
                    log::debug!(
                        "Consumer: frame {} {}x{} bar at {:?}",
                        frame.sequence,
                        frame.width,
                        frame.height,
                        bar_position(frame)
                    );
                    frame.sequence
                });
                match pulled {
                    Some(sequence) => {
                        if let Some(last) = last_sequence {
                            assert!(sequence > last, "frames delivered out of order");
                        }
                        last_sequence = Some(sequence);
                        received += 1;
                    }
                    None if finished => break,
                    None => {}
                }
                std::thread::sleep(interval);
            }
            received
        })
    };

    for frame in 0..args.frames {
        paint_frame(&mut host, &source, frame);
        if args.fail_every > 0 && frame % args.fail_every == args.fail_every - 1 {
            host.fail_next_readbacks(1);
        }
        host.render_frame();

        while host.pending_readbacks() > args.latency {
            host.complete_next();
        }
        if let Err(err) = capture.update(&mut host) {
            log::error!("Capture update failed: {}", err);
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    host.complete_readbacks();
    done.store(true, Ordering::Release);

    let received = consumer.join().unwrap_or_else(|_| {
        log::error!("Consumer thread panicked");
        0
    });
    capture.deactivate(&mut host);

    let stats = capture.stats();
    log::info!("Capture finished: {:?}", stats);
    println!(
        "rendered {} frames, submitted {}, completed {}, failed {}, dropped {}, skipped {}, consumer received {}",
        host.frames(),
        stats.submitted,
        stats.completed,
        stats.failed,
        stats.dropped,
        stats.skipped,
        received
    );
}
