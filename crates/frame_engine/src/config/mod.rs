//! Configuration system

pub use serde::{Deserialize, Serialize};

use std::path::PathBuf;

use crate::render::ClearSettings;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Vertex and fragment SPIR-V paths for one render system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderPaths {
    /// Compiled vertex shader
    pub vertex: PathBuf,
    /// Compiled fragment shader
    pub fragment: PathBuf,
}

impl ShaderPaths {
    /// Create a pair of shader paths
    pub fn new(vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

/// Renderer and window configuration
///
/// Every field has a default, so a config file only needs to name the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan instance
    pub application_name: String,
    /// Window title
    pub window_title: String,
    /// Initial window width in pixels
    pub window_width: u32,
    /// Initial window height in pixels
    pub window_height: u32,
    /// Color attachment clear value (RGBA)
    pub clear_color: [f32; 4],
    /// Depth attachment clear value
    pub clear_depth: f32,
    /// Bounded wait used for image acquisition and fence waits, in nanoseconds
    pub acquire_timeout_ns: u64,
    /// Force validation layers on or off; unset follows the build profile
    pub enable_validation: Option<bool>,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Shaders for the mesh render system
    pub simple_shaders: ShaderPaths,
    /// Shaders for the point light billboard system
    pub point_light_shaders: ShaderPaths,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Frame Engine Viewer".to_string(),
            window_title: "Frame Engine".to_string(),
            window_width: 800,
            window_height: 600,
            clear_color: [0.01, 0.01, 0.01, 1.0],
            clear_depth: 1.0,
            acquire_timeout_ns: 1_000_000_000,
            enable_validation: None,
            log_level: "info".to_string(),
            simple_shaders: ShaderPaths::new(
                "target/shaders/simple.vert.spv",
                "target/shaders/simple.frag.spv",
            ),
            point_light_shaders: ShaderPaths::new(
                "target/shaders/point_light.vert.spv",
                "target/shaders/point_light.frag.spv",
            ),
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Set the window title
    pub fn with_window_title(mut self, title: impl Into<String>) -> Self {
        self.window_title = title.into();
        self
    }

    /// Set the initial window size
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }

    /// Set the clear color
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Force validation layers on or off
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the acquire/fence timeout
    pub fn with_acquire_timeout_ns(mut self, timeout: u64) -> Self {
        self.acquire_timeout_ns = timeout;
        self
    }

    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Clear values for the swap chain render pass
    pub fn clear_settings(&self) -> ClearSettings {
        ClearSettings {
            color: self.clear_color,
            depth: self.clear_depth,
        }
    }

    /// Parsed log level, falling back to `Info` for unknown names
    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RendererConfig = toml::from_str(
            r#"
            window_width = 1280
            clear_color = [0.1, 0.2, 0.3, 1.0]

            [simple_shaders]
            vertex = "shaders/a.spv"
            fragment = "shaders/b.spv"
            "#,
        )
        .unwrap();

        assert_eq!(config.window_width, 1280);
        assert_eq!(config.window_height, 600);
        assert_eq!(config.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(config.simple_shaders.vertex, PathBuf::from("shaders/a.spv"));
        assert_eq!(config.acquire_timeout_ns, 1_000_000_000);
    }

    #[test]
    fn test_ron_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!("frame_engine_config_{}.ron", std::process::id()));
        let path = path.to_str().unwrap();
        let config = RendererConfig::default()
            .with_window_title("ron test")
            .with_validation(false);

        config.save_to_file(path).unwrap();
        let loaded = RendererConfig::load_from_file(path).unwrap();
        std::fs::remove_file(path).ok();

        assert_eq!(loaded, config);
        assert!(!loaded.validation_enabled());
    }

    #[test]
    fn test_unsupported_extension() {
        let result = RendererConfig::default().save_to_file("renderer.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_log_level_falls_back_to_info() {
        let mut config = RendererConfig::default();
        config.log_level = "chatty".to_string();
        assert_eq!(config.log_level_filter(), log::LevelFilter::Info);
        config.log_level = "debug".to_string();
        assert_eq!(config.log_level_filter(), log::LevelFilter::Debug);
    }
}
