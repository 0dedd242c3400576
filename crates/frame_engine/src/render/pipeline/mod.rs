//! Graphics pipeline configuration and creation

pub mod graphics_pipeline;
pub mod pipeline_config;

pub use graphics_pipeline::{GraphicsPipeline, PipelineLayout};
pub use pipeline_config::{ColorBlendState, CullMode, PipelineConfig, ViewportMode};
