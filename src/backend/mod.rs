//! Capture host implementations
//!
//! Provides the renderer-side hosts that run capture stages.

pub mod headless;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use headless::HeadlessHost;
#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuHost;
