use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ScopeError, ScopeResult};

/// File name looked up in the working directory by [`ScopeConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "scenescope.toml";

/// Duration assigned to every animation group when nothing else is configured.
pub const DEFAULT_ANIMATION_DURATION: f64 = 1.5;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Length of one `play(...)` group on the virtual clock, in seconds.
    pub animation_duration: f64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            animation_duration: DEFAULT_ANIMATION_DURATION,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerateConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    /// Where the generated script is written.
    pub script_path: String,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            model: "qwen/qwen3-coder:free".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            script_path: "generated_manim_animation.py".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub program: String,
    pub quality: String, // "l" | "m" | "h" | "p" | "k"
    pub media_root: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            program: "manim".to_string(),
            quality: "m".to_string(),
            media_root: "media/videos".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ScopeConfig {
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub generate: GenerateConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

impl ScopeConfig {
    pub fn from_toml_str(contents: &str, origin: &Path) -> ScopeResult<Self> {
        let config: ScopeConfig =
            toml::from_str(contents).map_err(|e| ScopeError::config(e.to_string(), origin))?;
        config.check(origin)?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> ScopeResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents, path)
    }

    pub fn save_to_file(&self, path: &Path) -> ScopeResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ScopeError::config(e.to_string(), path))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load `scenescope.toml` from `dir` if it exists, otherwise fall back to defaults.
    pub fn discover(dir: &Path) -> ScopeResult<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    fn check(&self, origin: &Path) -> ScopeResult<()> {
        let duration = self.extract.animation_duration;
        if !(duration.is_finite() && duration > 0.0) {
            return Err(ScopeError::config(
                format!("extract.animation_duration must be positive, got {duration}"),
                origin,
            ));
        }
        Ok(())
    }
}
