//! Host pipeline integration
//!
//! The capture core never talks to a GPU API directly. A host renderer
//! implements [`CaptureHost`] to accept capture stages at named trigger
//! points, and exposes [`StageCommands`] to those stages while it records a
//! frame. Readbacks complete later through boxed callbacks.

pub mod host;
pub mod stage;

pub use host::*;
pub use stage::*;
