//! Viewer configuration
//!
//! TOML-based settings for geometry filtering, suggestion presentation and
//! rendering. Every field has a default, so an empty file is a valid
//! configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::geometry::GeometryLimits;
use crate::suggestions::{
    LeaderboardOptions, SortMode, DEFAULT_FALLBACK_PREFIX_LEN, DEFAULT_LEADERBOARD_SIZE,
    DEFAULT_VISIBLE_PER_LINE,
};

/// Main configuration structure loaded from TOML files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Line box rejection thresholds
    pub geometry: GeometryLimits,
    /// Suggestion list and leaderboard settings
    pub suggestions: SuggestionConfig,
    /// Raster settings
    pub render: RenderConfig,
}

impl ViewerConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the TOML is malformed
    ///
    /// # Example
    ///
    /// ```no_run
    /// use folio_core::config::ViewerConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = ViewerConfig::from_file("folio.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Example
    ///
    /// ```
    /// use folio_core::config::ViewerConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let toml = r#"
    ///     [geometry]
    ///     max_line_height = 0.3
    ///
    ///     [suggestions]
    ///     visible_per_line = 3
    /// "#;
    /// let config = ViewerConfig::from_str(toml)?;
    /// assert_eq!(config.suggestions.leaderboard_size, 10);
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let r = &self.render;
        if !(r.min_zoom > 0.0 && r.min_zoom <= r.max_zoom) {
            anyhow::bail!(
                "render.min_zoom ({}) must be positive and not above render.max_zoom ({})",
                r.min_zoom,
                r.max_zoom
            );
        }
        if !(r.device_pixel_ratio > 0.0) {
            anyhow::bail!("render.device_pixel_ratio must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    /// Suggestions shown per line before "show all" (default: 5)
    pub visible_per_line: usize,
    /// Leaderboard rows (default: 10)
    pub leaderboard_size: usize,
    /// Author id characters used in placeholder names (default: 8)
    pub fallback_id_prefix_len: usize,
    /// Initial sort mode for every line (default: top)
    pub default_sort: SortMode,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            visible_per_line: DEFAULT_VISIBLE_PER_LINE,
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
            fallback_id_prefix_len: DEFAULT_FALLBACK_PREFIX_LEN,
            default_sort: SortMode::Top,
        }
    }
}

impl SuggestionConfig {
    pub fn leaderboard_options(&self) -> LeaderboardOptions {
        LeaderboardOptions {
            limit: self.leaderboard_size,
            fallback_prefix_len: self.fallback_id_prefix_len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Device pixels per CSS pixel (default: 1.0)
    pub device_pixel_ratio: f64,
    /// Smallest zoom factor (default: 0.25)
    pub min_zoom: f64,
    /// Largest zoom factor (default: 4.0)
    pub max_zoom: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            device_pixel_ratio: 1.0,
            min_zoom: 0.25,
            max_zoom: 4.0,
        }
    }
}

impl RenderConfig {
    /// Clamp a zoom factor into `[min_zoom, max_zoom]`; non-finite input
    /// falls back to 1.0. An inverted range resolves to `max_zoom`.
    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        let zoom = if zoom.is_finite() { zoom } else { 1.0 };
        // f64::clamp panics on an inverted or NaN range
        zoom.max(self.min_zoom).min(self.max_zoom)
    }
}
