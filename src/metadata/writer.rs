use img_parts::png::{Png, PngChunk};
use img_parts::{Bytes, ImageEXIF};
use img_parts::jpeg::Jpeg;
use img_parts::webp::WebP;
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;

use super::record::{GenerationParams, MetadataRecord};
use crate::error::{Result, SaveError};
use crate::pipeline::OutputFormat;

// little_exif as_u8_vec(JPEG) returns: [APP1 marker 2B][length 2B][Exif\0\0 6B][TIFF data]
// img-parts set_exif() expects just the TIFF data (after Exif\0\0)
const JPEG_EXIF_OVERHEAD: usize = 10; // 2 + 2 + 6

// APP1 length field (u16) covers itself (2) and the Exif\0\0 header (6)
const MAX_JPEG_TIFF_LEN: usize = u16::MAX as usize - 2 - 6;

pub(crate) const USER_COMMENT_ASCII: &[u8] = b"ASCII\0\0\0";
pub(crate) const PROMPT_PREFIX: &str = "Prompt:";
pub(crate) const WORKFLOW_PREFIX: &str = "Workflow:";

const CHUNK_TEXT: [u8; 4] = *b"tEXt";
const CHUNK_ITXT: [u8; 4] = *b"iTXt";
const CHUNK_PHYS: [u8; 4] = *b"pHYs";
const CHUNK_IDAT: [u8; 4] = *b"IDAT";

const INCH_IN_METRES: f64 = 0.0254;

/// Check that every entry can be stored as PNG text.
///
/// Keys must be 1-79 Latin-1 characters with no leading, trailing or
/// consecutive spaces. Values must not contain NUL.
pub fn validate_png_text(record: &MetadataRecord) -> Result<()> {
    for (key, value) in record.iter() {
        let valid = (1..=79).contains(&key.chars().count())
            && key.chars().all(|c| matches!(c as u32, 0x20..=0x7E | 0xA1..=0xFF))
            && !key.starts_with(' ')
            && !key.ends_with(' ')
            && !key.contains("  ");
        if !valid {
            return Err(SaveError::InvalidKeyword(key.to_string()));
        }
        if value.as_text().contains('\0') {
            return Err(SaveError::InvalidValue(key.to_string()));
        }
    }
    Ok(())
}

/// Embed metadata into an encoded image in the container its format uses.
///
/// - PNG gets one text chunk per record entry and, when `dpi` is set, a `pHYs` chunk.
/// - WebP and JPEG get an EXIF block (see [`build_exif`]).
pub fn embed_metadata(
    encoded: Vec<u8>,
    format: OutputFormat,
    record: &MetadataRecord,
    params: Option<&GenerationParams>,
    dpi: Option<u32>,
) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Png => embed_png(encoded, record, dpi),
        OutputFormat::WebP | OutputFormat::Jpeg => {
            let Some(tiff) = build_exif(record, params) else {
                log::debug!("No metadata to embed, leaving EXIF empty");
                return Ok(encoded);
            };
            if format == OutputFormat::WebP {
                embed_webp_exif(encoded, tiff)
            } else {
                embed_jpeg_exif(encoded, tiff)
            }
        }
    }
}

/// Insert text chunks (and optionally `pHYs`) before the first `IDAT`.
fn embed_png(encoded: Vec<u8>, record: &MetadataRecord, dpi: Option<u32>) -> Result<Vec<u8>> {
    validate_png_text(record)?;

    let mut png = Png::from_bytes(Bytes::from(encoded))
        .map_err(|e| SaveError::Container(format!("Failed to parse encoded PNG: {e}")))?;

    let mut new_chunks = Vec::with_capacity(record.len() + 1);
    if let Some(dpi) = dpi {
        new_chunks.push(PngChunk::new(CHUNK_PHYS, Bytes::from(phys_contents(dpi))));
    }
    for (key, value) in record.iter() {
        let text = value.as_text();
        let chunk = if let Some(latin1) = encode_latin1(&text) {
            PngChunk::new(CHUNK_TEXT, Bytes::from(text_chunk(key, &latin1)))
        } else {
            PngChunk::new(CHUNK_ITXT, Bytes::from(itxt_chunk(key, &text)))
        };
        log::debug!("  Text chunk: {key} ({} bytes)", text.len());
        new_chunks.push(chunk);
    }

    let chunks = png.chunks_mut();
    if dpi.is_some() {
        chunks.retain(|c| c.kind() != CHUNK_PHYS);
    }
    let insert_at = chunks
        .iter()
        .position(|c| c.kind() == CHUNK_IDAT)
        .unwrap_or(chunks.len().saturating_sub(1));
    for (offset, chunk) in new_chunks.into_iter().enumerate() {
        chunks.insert(insert_at + offset, chunk);
    }

    Ok(png.encoder().bytes().to_vec())
}

/// `pHYs` body: pixels per metre on both axes, unit = metre.
fn phys_contents(dpi: u32) -> Vec<u8> {
    let ppm = (dpi as f64 / INCH_IN_METRES).round() as u32;
    let mut bytes = Vec::with_capacity(9);
    bytes.extend_from_slice(&ppm.to_be_bytes());
    bytes.extend_from_slice(&ppm.to_be_bytes());
    bytes.push(1);
    bytes
}

/// Latin-1 bytes of `s`, or `None` if it has characters outside Latin-1.
fn encode_latin1(s: &str) -> Option<Vec<u8>> {
    s.chars()
        .map(|c| u8::try_from(c as u32).ok())
        .collect()
}

/// tEXt: keyword\0text
fn text_chunk(key: &str, latin1_text: &[u8]) -> Vec<u8> {
    let mut data = encode_latin1(key).unwrap_or_default();
    data.push(0);
    data.extend_from_slice(latin1_text);
    data
}

/// iTXt, uncompressed: keyword\0 flag method language\0 translated\0 text
fn itxt_chunk(key: &str, text: &str) -> Vec<u8> {
    let mut data = encode_latin1(key).unwrap_or_default();
    data.extend_from_slice(&[0, 0, 0]);
    data.push(0); // empty language tag
    data.push(0); // empty translated keyword
    data.extend_from_slice(text.as_bytes());
    data
}

/// Build the EXIF TIFF block for the EXIF-carrying formats.
///
/// - `UserComment` holds the full record as a JSON object.
/// - With generation parameters, `Make` holds `Prompt:<json>` and
///   `ImageDescription` holds `Workflow:<json...>`.
///
/// Returns `None` when there is nothing to write.
pub fn build_exif(record: &MetadataRecord, params: Option<&GenerationParams>) -> Option<Vec<u8>> {
    let params = params.filter(|p| !p.is_empty());
    if record.is_empty() && params.is_none() {
        return None;
    }

    let mut metadata = Metadata::new();

    if let Some(params) = params {
        if let Some(prompt) = params.prompt_json() {
            metadata.set_tag(ExifTag::Make(format!("{PROMPT_PREFIX}{}", ascii_escape(&prompt))));
        }
        let workflow = ascii_escape(&params.extra_json());
        metadata.set_tag(ExifTag::ImageDescription(format!("{WORKFLOW_PREFIX}{workflow}")));
    }

    if !record.is_empty() {
        let json = serde_json::to_string(record).unwrap_or_default();
        let mut comment = USER_COMMENT_ASCII.to_vec();
        comment.extend_from_slice(ascii_escape(&json).as_bytes());
        metadata.set_tag(ExifTag::UserComment(comment));
    }

    let exif_bytes = metadata.as_u8_vec(FileExtension::JPEG);
    if exif_bytes.len() > JPEG_EXIF_OVERHEAD {
        Some(exif_bytes[JPEG_EXIF_OVERHEAD..].to_vec())
    } else {
        None
    }
}

/// Escape every non-ASCII character of JSON text as `\uXXXX`, so the result is
/// pure ASCII and still parses to the same value.
pub(crate) fn ascii_escape(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

fn embed_webp_exif(encoded: Vec<u8>, tiff: Vec<u8>) -> Result<Vec<u8>> {
    let mut webp = WebP::from_bytes(Bytes::from(encoded))
        .map_err(|e| SaveError::Container(format!("Failed to parse encoded WebP: {e}")))?;
    webp.set_exif(Some(Bytes::from(tiff)));
    Ok(webp.encoder().bytes().to_vec())
}

fn embed_jpeg_exif(encoded: Vec<u8>, tiff: Vec<u8>) -> Result<Vec<u8>> {
    if tiff.len() > MAX_JPEG_TIFF_LEN {
        return Err(SaveError::Container(format!(
            "EXIF block is {} bytes, JPEG allows at most {MAX_JPEG_TIFF_LEN}; use PNG or WebP for large workflows",
            tiff.len()
        )));
    }
    let mut jpeg = Jpeg::from_bytes(Bytes::from(encoded))
        .map_err(|e| SaveError::Container(format!("Failed to parse encoded JPEG: {e}")))?;
    jpeg.set_exif(Some(Bytes::from(tiff)));
    Ok(jpeg.encoder().bytes().to_vec())
}
