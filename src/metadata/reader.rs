use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::webp::WebP;
use img_parts::{Bytes, ImageEXIF};
use std::path::Path;

use super::record::{MetadataRecord, MetadataValue};
use crate::error::{Result, SaveError};
use crate::pipeline::OutputFormat;

const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
const TAG_MAKE: u16 = 0x010F;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_USER_COMMENT: u16 = 0x9286;

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const USER_COMMENT_HEADER_LEN: usize = 8;

/// The EXIF strings this crate writes, as found in a file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedExif {
    pub make: Option<String>,
    pub image_description: Option<String>,
    pub user_comment: Option<String>,
}

/// Metadata read back from a saved image.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedMetadata {
    /// Text chunks (PNG) or the `UserComment` JSON object (WebP/JPEG).
    pub record: MetadataRecord,
    /// Raw EXIF strings, for the EXIF-carrying formats.
    pub exif: Option<EmbeddedExif>,
}

/// Read embedded metadata from an image file, choosing the container by extension.
pub fn read_metadata(path: &Path) -> Result<EmbeddedMetadata> {
    let format = OutputFormat::from_path(path).ok_or_else(|| {
        SaveError::UnsupportedFormat(
            path.extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
    })?;
    let bytes = std::fs::read(path).map_err(|e| SaveError::io(path, e))?;
    read_metadata_from_bytes(bytes, format)
}

/// Read embedded metadata from encoded image bytes.
pub fn read_metadata_from_bytes(bytes: Vec<u8>, format: OutputFormat) -> Result<EmbeddedMetadata> {
    let bytes = Bytes::from(bytes);
    match format {
        OutputFormat::Png => {
            let png = Png::from_bytes(bytes)
                .map_err(|e| SaveError::Container(format!("Failed to parse PNG: {e}")))?;
            Ok(EmbeddedMetadata {
                record: read_text_chunks(&png),
                exif: None,
            })
        }
        OutputFormat::WebP => {
            let webp = WebP::from_bytes(bytes)
                .map_err(|e| SaveError::Container(format!("Failed to parse WebP: {e}")))?;
            exif_metadata(webp.exif())
        }
        OutputFormat::Jpeg => {
            let jpeg = Jpeg::from_bytes(bytes)
                .map_err(|e| SaveError::Container(format!("Failed to parse JPEG: {e}")))?;
            exif_metadata(jpeg.exif())
        }
    }
}

fn read_text_chunks(png: &Png) -> MetadataRecord {
    let mut record = MetadataRecord::new();
    for chunk in png.chunks() {
        let parsed = match &chunk.kind() {
            b"tEXt" => parse_text_chunk(chunk.contents()),
            b"iTXt" => parse_itxt_chunk(chunk.contents()),
            _ => continue,
        };
        if let Some((key, value)) = parsed {
            record.insert(key, value);
        }
    }
    record
}

/// tEXt: keyword\0text, both Latin-1.
fn parse_text_chunk(data: &[u8]) -> Option<(String, String)> {
    let nul = data.iter().position(|&b| b == 0)?;
    Some((decode_latin1(&data[..nul]), decode_latin1(&data[nul + 1..])))
}

/// iTXt: keyword\0 flag method language\0 translated\0 text
fn parse_itxt_chunk(data: &[u8]) -> Option<(String, String)> {
    let nul = data.iter().position(|&b| b == 0)?;
    let key = decode_latin1(&data[..nul]);
    let rest = data.get(nul + 1..)?;
    let (&compressed, rest) = rest.split_first()?;
    let rest = rest.get(1..)?; // compression method
    if compressed != 0 {
        log::debug!("Skipping compressed iTXt chunk `{key}`");
        return None;
    }
    let lang_end = rest.iter().position(|&b| b == 0)?;
    let rest = &rest[lang_end + 1..];
    let translated_end = rest.iter().position(|&b| b == 0)?;
    let text = String::from_utf8_lossy(&rest[translated_end + 1..]).into_owned();
    Some((key, text))
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn exif_metadata(exif: Option<Bytes>) -> Result<EmbeddedMetadata> {
    let Some(exif) = exif else {
        return Ok(EmbeddedMetadata::default());
    };
    let tiff = exif.strip_prefix(EXIF_PREFIX).unwrap_or(&exif[..]);
    let fields = parse_tiff(tiff)?;

    let record = match fields.user_comment.as_deref() {
        Some(comment) => match serde_json::from_str::<MetadataRecord>(comment) {
            Ok(record) => record,
            Err(e) => {
                log::debug!("UserComment is not a metadata object ({e}), keeping it as `comment`");
                let mut record = MetadataRecord::new();
                record.insert("comment", MetadataValue::from(comment));
                record
            }
        },
        None => MetadataRecord::new(),
    };

    Ok(EmbeddedMetadata {
        record,
        exif: Some(fields),
    })
}

/// Byte-order aware view over raw TIFF data.
struct TiffView<'a> {
    data: &'a [u8],
    big_endian: bool,
}

impl<'a> TiffView<'a> {
    fn u16_at(&self, offset: usize) -> Result<u16> {
        let b = self.bytes_at(offset, 2)?;
        Ok(if self.big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        })
    }

    fn u32_at(&self, offset: usize) -> Result<u32> {
        let b = self.bytes_at(offset, 4)?;
        Ok(if self.big_endian {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    }

    fn bytes_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| SaveError::Container("EXIF data truncated".to_string()))
    }

    /// Entries of the IFD at `offset` as `(tag, entry offset)`.
    fn ifd_entries(&self, offset: usize) -> Result<Vec<(u16, usize)>> {
        let count = self.u16_at(offset)? as usize;
        (0..count)
            .map(|i| {
                let entry = offset + 2 + i * 12;
                Ok((self.u16_at(entry)?, entry))
            })
            .collect()
    }

    /// Raw value bytes of the entry at `entry`.
    fn value_bytes(&self, entry: usize) -> Result<&'a [u8]> {
        let format = self.u16_at(entry + 2)?;
        let count = self.u32_at(entry + 4)? as usize;
        let unit = match format {
            1 | 2 | 6 | 7 => 1,
            3 | 8 => 2,
            4 | 9 | 11 => 4,
            _ => 8,
        };
        let len = count
            .checked_mul(unit)
            .ok_or_else(|| SaveError::Container("EXIF entry too large".to_string()))?;
        if len <= 4 {
            self.bytes_at(entry + 8, len)
        } else {
            self.bytes_at(self.u32_at(entry + 8)? as usize, len)
        }
    }
}

/// Pull `Make`, `ImageDescription` (IFD0) and `UserComment` (ExifIFD) out of TIFF data.
fn parse_tiff(data: &[u8]) -> Result<EmbeddedExif> {
    let big_endian = match data.get(0..2) {
        Some(b"MM") => true,
        Some(b"II") => false,
        _ => return Err(SaveError::Container("Invalid TIFF byte order".to_string())),
    };
    let view = TiffView { data, big_endian };

    let mut fields = EmbeddedExif::default();
    let ifd0 = view.u32_at(4)? as usize;
    let mut exif_ifd = None;

    for (tag, entry) in view.ifd_entries(ifd0)? {
        match tag {
            TAG_MAKE => fields.make = Some(ascii_value(view.value_bytes(entry)?)),
            TAG_IMAGE_DESCRIPTION => {
                fields.image_description = Some(ascii_value(view.value_bytes(entry)?))
            }
            TAG_EXIF_IFD => exif_ifd = Some(view.u32_at(entry + 8)? as usize),
            _ => {}
        }
    }

    if let Some(offset) = exif_ifd {
        for (tag, entry) in view.ifd_entries(offset)? {
            if tag == TAG_USER_COMMENT {
                fields.user_comment = Some(user_comment_value(view.value_bytes(entry)?, big_endian));
            }
        }
    }

    Ok(fields)
}

fn ascii_value(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

/// UserComment: 8-byte character code, then the text.
fn user_comment_value(bytes: &[u8], big_endian: bool) -> String {
    if bytes.len() < USER_COMMENT_HEADER_LEN {
        return ascii_value(bytes);
    }
    let (header, text) = bytes.split_at(USER_COMMENT_HEADER_LEN);
    if header == b"UNICODE\0" {
        let units: Vec<u16> = text
            .chunks_exact(2)
            .map(|c| {
                if big_endian {
                    u16::from_be_bytes([c[0], c[1]])
                } else {
                    u16::from_le_bytes([c[0], c[1]])
                }
            })
            .collect();
        String::from_utf16_lossy(&units)
            .trim_end_matches('\0')
            .to_string()
    } else {
        ascii_value(text)
    }
}
