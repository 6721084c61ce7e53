use image::DynamicImage;
use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{OverwriteMode, SaveOptions};
use crate::error::{Result, SaveError};
use crate::metadata::{self, GenerationParams, MetadataRecord};
use crate::naming::{self, CounterTemplate};
use crate::tensor::ImageTensor;
use crate::tokens::TextTokens;

/// The container strategy for an output file, chosen by extension.
///
/// - **Text chunks**: PNG stores each metadata entry as its own `tEXt`/`iTXt` chunk.
/// - **EXIF**: WebP and JPEG store the record in EXIF tags.
///
/// # Example
///
/// ```rust
/// use image_save_meta::pipeline::OutputFormat;
///
/// assert_eq!(OutputFormat::from_extension("PNG").unwrap(), OutputFormat::Png);
/// assert_eq!(OutputFormat::from_extension(".jpeg").unwrap(), OutputFormat::Jpeg);
/// assert!(OutputFormat::from_extension("gif").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// PNG, metadata in text chunks
    Png,
    /// WebP, metadata in EXIF (RIFF `EXIF` chunk)
    WebP,
    /// JPEG, metadata in EXIF (APP1 segment)
    Jpeg,
}

impl OutputFormat {
    /// Parse a user-facing extension selector (case-insensitive, leading dot optional).
    pub fn from_extension(ext: &str) -> Result<Self> {
        let normalized = normalize_extension(ext);
        match normalized.as_str() {
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            _ => Err(SaveError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Determine the format from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::from_extension(ext).ok()
    }

    /// Whether metadata goes into EXIF rather than text chunks.
    pub fn uses_exif(&self) -> bool {
        matches!(self, Self::WebP | Self::Jpeg)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// A saved file as the host would list it in a preview panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewEntry {
    pub filename: String,
    /// Directory of the file relative to the output root, `""` for the root
    /// itself or for files outside it.
    pub subfolder: String,
}

/// The result of a save call.
///
/// `images` is the input batch, handed back so callers can chain further
/// processing on the same images.
#[derive(Debug)]
pub struct SaveOutput<'a> {
    pub images: &'a [ImageTensor],
    /// Absolute paths of the written files, in batch order.
    pub files: Vec<PathBuf>,
    /// One entry per written file when previews are enabled.
    pub previews: Vec<PreviewEntry>,
}

/// Writes image batches under an output root.
///
/// # Example
///
/// ```rust,no_run
/// use image_save_meta::config::SaveOptions;
/// use image_save_meta::pipeline::ImageSaver;
/// use image_save_meta::tensor::ImageTensor;
///
/// # fn main() -> Result<(), image_save_meta::error::SaveError> {
/// let saver = ImageSaver::new("output");
/// let batch = vec![ImageTensor::filled(64, 64, 3, 0.5)?];
/// let options = SaveOptions {
///     filename_pattern: "test_%counter%".into(),
///     custom_metadata: r#"{"author":"Alice"}"#.into(),
///     embed_generation_params: false,
///     ..SaveOptions::default()
/// };
///
/// let output = saver.save_images(&batch, &options, None)?;
/// println!("Wrote {}", output.files[0].display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ImageSaver {
    output_root: PathBuf,
    tokens: TextTokens,
}

impl ImageSaver {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            tokens: TextTokens::new(),
        }
    }

    /// Replace the token expander (fixed host/user names, mostly for tests).
    pub fn with_tokens(mut self, tokens: TextTokens) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Save every image of `images` and report the written paths.
    ///
    /// Options, extension, custom metadata and PNG text entries are all validated
    /// before anything touches the filesystem, so those errors never leave a
    /// file behind. After that, the first failure stops the batch; files
    /// already written are kept.
    ///
    /// `params` is embedded only when `options.embed_generation_params` is set.
    pub fn save_images<'a>(
        &self,
        images: &'a [ImageTensor],
        options: &SaveOptions,
        params: Option<&GenerationParams>,
    ) -> Result<SaveOutput<'a>> {
        options.validate()?;
        let format = OutputFormat::from_extension(&options.extension)?;
        let extension = normalize_extension(&options.extension);

        let custom = MetadataRecord::parse_custom(&options.custom_metadata)?;
        let params = params.filter(|_| options.embed_generation_params);
        let record = MetadataRecord::merged(params, custom);
        if format == OutputFormat::Png {
            metadata::validate_png_text(&record)?;
        }

        let pattern = self.tokens.expand(&options.filename_pattern);
        let template = CounterTemplate::new(
            &pattern,
            &options.filename_delimiter,
            options.number_padding,
            options.number_first,
        )?;

        let output_dir = self.resolve_output_dir(&options.output_path);
        if !output_dir.exists() {
            log::warn!(
                "The path `{}` doesn't exist! Creating directory.",
                output_dir.display()
            );
            std::fs::create_dir_all(&output_dir).map_err(|e| SaveError::io(&output_dir, e))?;
        }

        let mut counter = template.next_counter(&output_dir)?;
        let mut files = Vec::with_capacity(images.len());
        let mut previews = Vec::new();

        for (i, tensor) in images.iter().enumerate() {
            let target = match options.overwrite_mode {
                OverwriteMode::PrefixAsFilename => {
                    output_dir.join(naming::fixed_file_name(&pattern, &extension))
                }
                OverwriteMode::Never => {
                    template.resolve_free_path(&output_dir, &mut counter, &extension)
                }
            };
            let target = std::path::absolute(&target).map_err(|e| SaveError::io(&target, e))?;

            log::debug!(
                "[{}/{}] Encoding {}x{} image as {format:?}",
                i + 1,
                images.len(),
                tensor.width(),
                tensor.height()
            );
            let encoded = encode_image(&tensor.to_dynamic_image(), format, options)?;
            let dpi = (format == OutputFormat::Png).then_some(options.dpi);
            let bytes = metadata::embed_metadata(encoded, format, &record, params, dpi)?;

            std::fs::write(&target, &bytes).map_err(|e| SaveError::io(&target, e))?;
            log::info!("Image file saved to: {}", target.display());

            if options.show_previews {
                previews.push(self.preview_entry(&target));
            }
            files.push(target);

            if options.overwrite_mode == OverwriteMode::Never {
                counter += 1;
            }
        }

        Ok(SaveOutput {
            images,
            files,
            previews,
        })
    }

    /// Expand tokens in `output_path` and anchor relative results at the output root.
    pub fn resolve_output_dir(&self, output_path: &str) -> PathBuf {
        let trimmed = output_path.trim();
        if matches!(trimmed, "" | "none" | ".") {
            return self.output_root.clone();
        }
        let expanded = PathBuf::from(self.tokens.expand(trimmed));
        if expanded.is_absolute() {
            expanded
        } else {
            self.output_root.join(expanded)
        }
    }

    fn preview_entry(&self, file: &Path) -> PreviewEntry {
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let root = std::path::absolute(&self.output_root).unwrap_or_else(|_| self.output_root.clone());
        let subfolder = file
            .parent()
            .and_then(|dir| dir.strip_prefix(&root).ok())
            .map(|rel| rel.to_string_lossy().into_owned())
            .unwrap_or_default();
        PreviewEntry {
            filename,
            subfolder,
        }
    }
}

/// Encode one image with the format's encoder.
fn encode_image(img: &DynamicImage, format: OutputFormat, options: &SaveOptions) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Png => {
            let compression = if options.optimize {
                CompressionType::Best
            } else {
                CompressionType::Default
            };
            let encoder = PngEncoder::new_with_quality(&mut buf, compression, FilterType::Adaptive);
            img.write_with_encoder(encoder)?;
        }
        OutputFormat::WebP => {
            let img = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            if options.lossless_webp {
                img.write_with_encoder(WebPEncoder::new_lossless(&mut buf))?;
            } else {
                let encoder = webp::Encoder::from_image(&img)
                    .map_err(|e| SaveError::WebPEncode(e.to_string()))?;
                let memory = encoder
                    .encode_simple(false, options.quality as f32)
                    .map_err(|e| SaveError::WebPEncode(format!("{e:?}")))?;
                buf.extend_from_slice(&memory);
            }
        }
        OutputFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, options.quality);
            encoder.set_pixel_density(PixelDensity::dpi(options.dpi as u16));
            let img = match img {
                DynamicImage::ImageLuma8(_) => img.clone(),
                _ => DynamicImage::ImageRgb8(img.to_rgb8()),
            };
            img.write_with_encoder(encoder)?;
        }
    }
    Ok(buf)
}
