//! SideBySide Media Engine
//!
//! The engine side of the compose pipeline:
//! - [`Workspace`]: the named byte store inputs are staged into
//! - [`EngineHandle`]: lazy, once-only engine initialization and execution
//! - [`FfmpegEngine`]: the system ffmpeg as the engine
//!
//! ```text
//! stage blobs ──► Workspace ◄── read output
//!                     │
//! Invocation ──► EngineHandle ──► Engine::run ──► progress (0..=100)
//! ```

pub mod engine;
pub mod ffmpeg;
pub mod progress;
pub mod workspace;

pub use engine::*;
pub use ffmpeg::{FfmpegEngine, FfmpegLoader};
pub use workspace::{DirWorkspace, MemoryWorkspace, Workspace};
