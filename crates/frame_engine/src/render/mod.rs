//! # Rendering
//!
//! Frame orchestration over a Vulkan backend.
//!
//! ## Architecture
//!
//! - **Renderer**: acquire, record and present one frame at a time, recreating the swap chain when it goes stale
//! - **API traits**: [`FrameBackend`], [`PresentTarget`] and [`SurfaceWindow`] separate orchestration from Vulkan calls
//! - **Frame slots**: which fences, semaphores and uniforms belong to the frame being recorded
//! - **Vulkan backend**: device, swap chain, sync objects, buffers, descriptors
//! - **Systems**: per-content draw recording against [`FrameInfo`]

// Public modules for application use
pub mod api;
pub mod frame_info;
pub mod frame_slots;
pub mod model;
pub mod pipeline;
pub mod renderer;
pub mod systems;
pub mod uniforms;

/// Vulkan implementation of the backend traits
pub mod vulkan;

pub use api::{ClearSettings, FrameBackend, PresentTarget, SurfaceWindow, SwapChainStatus};
pub use frame_info::{DrawContent, DrawItem, FrameInfo, GlobalUbo, PointLightUbo, MAX_LIGHTS};
pub use frame_slots::{FrameSlot, InFlightTracker, PerFrame, MAX_FRAMES_IN_FLIGHT};
pub use model::{Model, ModelBuilder, Vertex};
pub use renderer::Renderer;
pub use systems::{PointLightSystem, SimpleRenderSystem};
pub use uniforms::GlobalUniforms;
