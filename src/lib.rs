//! # image-save-meta
//!
//! Save image batches as PNG, WebP or JPEG with custom key/value metadata and
//! generation parameters (prompt, workflow) embedded in the file's native
//! metadata container.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use image_save_meta::config::SaveOptions;
//! use image_save_meta::metadata::{read_metadata, GenerationParams};
//! use image_save_meta::pipeline::ImageSaver;
//! use image_save_meta::tensor::ImageTensor;
//! use serde_json::json;
//!
//! fn main() -> anyhow::Result<()> {
//!     // One 64x64 mid-grey RGB image
//!     let batch = vec![ImageTensor::filled(64, 64, 3, 0.5)?];
//!
//!     let options = SaveOptions {
//!         output_path: "renders".into(),
//!         filename_pattern: "test_%counter%".into(),
//!         extension: "png".into(),
//!         custom_metadata: r#"{"author":"Alice"}"#.into(),
//!         ..SaveOptions::default()
//!     };
//!     let params = GenerationParams {
//!         prompt: Some(json!({"6": {"inputs": {"text": "a lighthouse at dusk"}}})),
//!         ..GenerationParams::default()
//!     };
//!
//!     let saver = ImageSaver::new("output");
//!     let output = saver.save_images(&batch, &options, Some(&params))?;
//!
//!     for path in &output.files {
//!         let embedded = read_metadata(path)?;
//!         println!("{}: {} entries", path.display(), embedded.record.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Metadata container |
//! |--------|--------------------|
//! | PNG (`.png`) | One `tEXt` chunk per entry (`iTXt` for non-Latin-1 text) |
//! | WebP (`.webp`) | EXIF: `UserComment` JSON, prompt in `Make`, workflow in `ImageDescription` |
//! | JPEG (`.jpg`, `.jpeg`) | Same EXIF layout as WebP |
//!
//! ## Filenames
//!
//! Output paths and filename patterns accept `[time]`, `[time(%Y-%m-%d)]`,
//! `[hostname]`, `[user]` and `%date%`. A `%counter%` placeholder receives a
//! zero-padded counter that continues after the highest number already in the
//! target directory; without it the counter is appended after the delimiter.
//!
//! ## Modules
//!
//! - [`config`] — Save options and config file loading/saving
//! - [`error`] — Error type for save calls
//! - [`metadata`] — Metadata records, embedding and reading back
//! - [`naming`] — Counter templates and collision-free filenames
//! - [`pipeline`] — The save handler and format dispatch
//! - [`tensor`] — Image batch representation
//! - [`tokens`] — Placeholder expansion for paths and patterns

pub mod config;
pub mod error;
pub mod metadata;
pub mod naming;
pub mod pipeline;
pub mod tensor;
pub mod tokens;
