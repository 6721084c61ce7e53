//! Metadata records and their embedding into image containers.
//!
//! - [`MetadataRecord`] — merged key/value metadata for one save call
//! - [`embed_metadata`] — write a record into encoded PNG/WebP/JPEG bytes
//! - [`read_metadata`] — read it back from a saved file
//!
//! PNG stores one `tEXt` (or `iTXt` for non-Latin-1 text) chunk per entry.
//! WebP and JPEG store the record as a JSON object in the EXIF `UserComment`
//! tag, with the prompt and workflow in `Make` / `ImageDescription`.

mod reader;
mod record;
mod writer;

pub use reader::{EmbeddedExif, EmbeddedMetadata, read_metadata, read_metadata_from_bytes};
pub use record::{GenerationParams, MetadataRecord, MetadataValue, PROMPT_KEY};
pub use writer::{build_exif, embed_metadata, validate_png_text};
