//! Rendering API abstractions
//!
//! Narrow seams between the frame orchestrator and the pieces it drives:
//! the GPU backend, the presentable swap chain and the platform window.

pub mod backend;

pub use backend::{ClearSettings, FrameBackend, PresentTarget, SurfaceWindow, SwapChainStatus};
