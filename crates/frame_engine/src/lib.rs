//! # Frame Engine
//!
//! Frame rendering and presentation core built on Vulkan.
//!
//! ## Features
//!
//! - **Swap chain lifecycle**: creation, resize-driven recreation, format drift checks
//! - **Frames in flight**: fence/semaphore sets per frame slot, image aliasing protection
//! - **Pipeline state**: by-value pipeline configuration and compiled graphics pipelines
//! - **Per-frame uniforms**: persistently mapped uniform buffers with one descriptor set per slot
//! - **Render systems**: draw glue for meshes and point-light billboards
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use frame_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let mut window = Window::new(&config.window_title, config.window_width, config.window_height)?;
//!     let device = Rc::new(Device::new(&mut window, &config.application_name, config.validation_enabled())?);
//!     let backend = VulkanBackend::new(Rc::clone(&device), config.acquire_timeout_ns);
//!     let mut renderer = Renderer::new(backend, &mut window, config.clear_settings())?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         if let Some(command_buffer) = renderer.begin_frame(&mut window)? {
//!             renderer.begin_swap_chain_render_pass(command_buffer);
//!             renderer.end_swap_chain_render_pass(command_buffer);
//!             renderer.end_frame(&mut window)?;
//!         }
//!     }
//!     device.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, RendererConfig, ShaderPaths},
        foundation::transform::Transform,
        render::{
            ClearSettings, DrawContent, DrawItem, FrameBackend, FrameInfo, FrameSlot,
            GlobalUbo, GlobalUniforms, Model, ModelBuilder, PointLightSystem, PresentTarget,
            Renderer, SimpleRenderSystem, SurfaceWindow, SwapChainStatus, Vertex,
            MAX_FRAMES_IN_FLIGHT, MAX_LIGHTS,
        },
        render::vulkan::{Device, SwapChain, VulkanBackend, VulkanError, VulkanResult, Window},
    };
}
