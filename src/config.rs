use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the image-save-meta CLI.
///
/// Holds the output root that relative output paths resolve against, and the
/// default [`SaveOptions`] used when a flag is not given on the command line.
///
/// # Loading
///
/// ```rust,no_run
/// use image_save_meta::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.save_options.extension = "webp".into();
/// config.save_options.embed_generation_params = false;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory for relative output paths.
    pub output_root: PathBuf,
    /// Defaults for every save.
    pub save_options: SaveOptions,
}

/// What to do when the target filename already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteMode {
    /// Number files and never overwrite.
    #[default]
    Never,
    /// Use the pattern itself as the filename, overwriting any previous file.
    PrefixAsFilename,
}

/// Options for one save call.
///
/// # Example
///
/// ```rust
/// use image_save_meta::config::SaveOptions;
///
/// let options = SaveOptions {
///     output_path: "portraits".into(),
///     filename_pattern: "test_%counter%".into(),
///     custom_metadata: r#"{"author":"Alice"}"#.into(),
///     embed_generation_params: false,
///     ..SaveOptions::default()
/// };
/// assert_eq!(options.extension, "png");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Output directory, relative to the output root unless absolute.
    /// Tokens such as `[time(%Y-%m-%d)]` are expanded. `""`, `"none"` and `"."`
    /// mean the output root itself.
    pub output_path: String,
    /// Filename pattern. May contain tokens and a `%counter%` placeholder.
    pub filename_pattern: String,
    /// Separator between pattern and counter when the pattern has no `%counter%`.
    pub filename_delimiter: String,
    /// Zero-padding width of the counter (1-9).
    pub number_padding: u8,
    /// Put the counter before the pattern instead of after it.
    pub number_first: bool,
    /// `png`, `webp`, `jpg` or `jpeg`.
    pub extension: String,
    /// Resolution recorded in PNG and JPEG files (1-2400).
    pub dpi: u32,
    /// JPEG and lossy WebP quality (1-100).
    pub quality: u8,
    /// Spend more time on PNG compression.
    pub optimize: bool,
    /// Write lossless WebP instead of lossy WebP at `quality`.
    pub lossless_webp: bool,
    pub overwrite_mode: OverwriteMode,
    /// Embed the prompt and workflow passed as generation parameters.
    pub embed_generation_params: bool,
    /// Report preview entries (filename + subfolder) for each saved file.
    pub show_previews: bool,
    /// Free-form JSON object merged over the generation parameters.
    pub custom_metadata: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            save_options: SaveOptions::default(),
        }
    }
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            output_path: "[time(%Y-%m-%d)]".to_string(),
            filename_pattern: "ComfyUI".to_string(),
            filename_delimiter: "_".to_string(),
            number_padding: 5,
            number_first: false,
            extension: "png".to_string(),
            dpi: 300,
            quality: 100,
            optimize: true,
            lossless_webp: false,
            overwrite_mode: OverwriteMode::Never,
            embed_generation_params: true,
            show_previews: true,
            custom_metadata: "{}".to_string(),
        }
    }
}

impl SaveOptions {
    /// Check the numeric ranges. Padding is checked by the filename resolver.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::SaveError;

        if !(1..=2400).contains(&self.dpi) {
            return Err(SaveError::InvalidOption(format!(
                "dpi must be between 1 and 2400, got {}",
                self.dpi
            )));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(SaveError::InvalidOption(format!(
                "quality must be between 1 and 100, got {}",
                self.quality
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Resolve the config file path: `config.json` next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.output_root, PathBuf::from("output"));
        assert_eq!(config.save_options.number_padding, 5);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.save_options.extension = "webp".to_string();
        config.save_options.overwrite_mode = OverwriteMode::PrefixAsFilename;
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.save_options.extension, "webp");
        assert_eq!(loaded.save_options.overwrite_mode, OverwriteMode::PrefixAsFilename);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"save_options": {"filename_pattern": "shot", "overwrite_mode": "prefix_as_filename"}}"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.save_options.filename_pattern, "shot");
        assert_eq!(config.save_options.dpi, 300);
        assert_eq!(config.output_root, PathBuf::from("output"));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn validate_ranges() {
        let mut options = SaveOptions::default();
        assert!(options.validate().is_ok());
        options.quality = 0;
        assert!(options.validate().is_err());
        options.quality = 90;
        options.dpi = 5000;
        assert!(options.validate().is_err());
    }
}
