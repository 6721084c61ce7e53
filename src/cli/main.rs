use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use image_save_meta::config::{self, OverwriteMode};
use image_save_meta::metadata::{self, GenerationParams};
use image_save_meta::pipeline::ImageSaver;
use image_save_meta::tensor::ImageTensor;

#[derive(Parser, Debug)]
#[command(
    name = "image-save-meta",
    version,
    about = "Save images as PNG, WebP or JPEG with custom metadata and generation parameters embedded"
)]
struct Cli {
    /// Images to save (any format the decoder understands), or files to inspect with --show-metadata
    #[arg(value_name = "IMAGE")]
    inputs: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Print the metadata embedded in the given files and exit
    #[arg(long = "show-metadata")]
    show_metadata: bool,

    /// Base directory for relative output paths
    #[arg(long, value_name = "DIR")]
    output_root: Option<PathBuf>,

    /// Output directory, relative to the output root; supports [time(...)] tokens
    #[arg(short, long, value_name = "PATH")]
    output_path: Option<String>,

    /// Filename pattern; `%counter%` marks where the counter goes
    #[arg(short, long, value_name = "PATTERN")]
    pattern: Option<String>,

    /// Delimiter between pattern and counter
    #[arg(long, value_name = "TEXT")]
    delimiter: Option<String>,

    /// Counter zero-padding width (1-9)
    #[arg(long, value_name = "N")]
    padding: Option<u8>,

    /// Put the counter before the pattern
    #[arg(long)]
    number_first: bool,

    /// Output format: png, webp, jpg or jpeg
    #[arg(short, long, value_name = "EXT")]
    extension: Option<String>,

    /// Resolution stored in PNG/JPEG files
    #[arg(long, value_name = "DPI")]
    dpi: Option<u32>,

    /// JPEG and lossy WebP quality (1-100)
    #[arg(short, long, value_name = "Q")]
    quality: Option<u8>,

    /// Use default PNG compression instead of best
    #[arg(long)]
    no_optimize: bool,

    /// Write lossless WebP
    #[arg(long)]
    lossless_webp: bool,

    /// Use the pattern as the filename and overwrite it
    #[arg(long)]
    overwrite: bool,

    /// Custom metadata as a JSON object, e.g. '{"author":"Alice"}'
    #[arg(short, long, value_name = "JSON")]
    metadata: Option<String>,

    /// JSON file with the generation prompt
    #[arg(long, value_name = "FILE")]
    prompt_file: Option<PathBuf>,

    /// JSON file with the workflow
    #[arg(long, value_name = "FILE")]
    workflow_file: Option<PathBuf>,

    /// Do not embed prompt/workflow
    #[arg(long)]
    no_embed_params: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.inputs.is_empty() {
        anyhow::bail!("No input images specified. Use --help for usage.");
    }

    // Handle --show-metadata
    if cli.show_metadata {
        for path in &cli.inputs {
            print_metadata(path, cli.json)?;
        }
        return Ok(());
    }

    // Load config and apply CLI overrides
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(root) = &cli.output_root {
        config.output_root = root.clone();
    }
    let options = &mut config.save_options;
    if let Some(v) = &cli.output_path {
        options.output_path = v.clone();
    }
    if let Some(v) = &cli.pattern {
        options.filename_pattern = v.clone();
    }
    if let Some(v) = &cli.delimiter {
        options.filename_delimiter = v.clone();
    }
    if let Some(v) = cli.padding {
        options.number_padding = v;
    }
    if let Some(v) = &cli.extension {
        options.extension = v.clone();
    }
    if let Some(v) = cli.dpi {
        options.dpi = v;
    }
    if let Some(v) = cli.quality {
        options.quality = v;
    }
    if let Some(v) = &cli.metadata {
        options.custom_metadata = v.clone();
    }
    options.number_first |= cli.number_first;
    options.lossless_webp |= cli.lossless_webp;
    if cli.no_optimize {
        options.optimize = false;
    }
    if cli.overwrite {
        options.overwrite_mode = OverwriteMode::PrefixAsFilename;
    }
    if cli.no_embed_params {
        options.embed_generation_params = false;
    }

    // Decode inputs
    let mut batch = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        let img = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?;
        batch.push(ImageTensor::from(&img));
    }
    log::info!("Loaded {} image(s)", batch.len());

    let params = load_generation_params(cli.prompt_file.as_deref(), cli.workflow_file.as_deref())?;

    let saver = ImageSaver::new(config.output_root.clone());
    let output = saver.save_images(&batch, &config.save_options, params.as_ref())?;

    if cli.json {
        let json = serde_json::json!({
            "files": output
                .files
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>(),
            "previews": output.previews,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    }

    log::info!("Done: {} file(s) written", output.files.len());
    Ok(())
}

/// Build generation parameters from the optional prompt and workflow files.
fn load_generation_params(
    prompt_file: Option<&Path>,
    workflow_file: Option<&Path>,
) -> Result<Option<GenerationParams>> {
    let mut params = GenerationParams::default();
    if let Some(path) = prompt_file {
        params.prompt = Some(read_json(path)?);
    }
    if let Some(path) = workflow_file {
        params.extra.insert("workflow".to_string(), read_json(path)?);
    }
    Ok((!params.is_empty()).then_some(params))
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

// ANSI color codes
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

/// Print embedded metadata for a file.
fn print_metadata(path: &Path, json: bool) -> Result<()> {
    let data = metadata::read_metadata(path)
        .with_context(|| format!("Failed to read metadata from {}", path.display()))?;

    if json {
        let value = serde_json::json!({
            "path": path.display().to_string(),
            "metadata": data.record,
            "exif": data.exif.as_ref().map(|e| serde_json::json!({
                "make": e.make,
                "image_description": e.image_description,
                "user_comment": e.user_comment,
            })),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    if let Some(exif) = &data.exif {
        let fields = [
            ("Make", exif.make.as_deref()),
            ("ImageDescription", exif.image_description.as_deref()),
        ];
        if fields.iter().any(|(_, v)| v.is_some()) {
            println!("  {BOLD}EXIF{RESET}");
            println!("  {DIM}{}{RESET}", "─".repeat(70));
            for (tag, val) in &fields {
                if let Some(v) = val {
                    print_row(tag, v);
                }
            }
            println!();
        }
    }

    if data.record.is_empty() {
        println!("  {DIM}(no embedded metadata found){RESET}");
        println!();
        return Ok(());
    }

    println!("  {BOLD}Metadata{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    for (key, value) in data.record.iter() {
        print_row(key, &value.as_text());
    }
    println!();

    Ok(())
}

/// Print a single row in the metadata table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
