use image_save_meta::config::SaveOptions;
use image_save_meta::error::SaveError;
use image_save_meta::metadata::{GenerationParams, MetadataRecord, read_metadata};
use image_save_meta::pipeline::ImageSaver;
use image_save_meta::tensor::ImageTensor;
use img_parts::png::Png;
use img_parts::Bytes;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn options(pattern: &str, ext: &str, custom: &str) -> SaveOptions {
    SaveOptions {
        output_path: String::new(),
        filename_pattern: pattern.to_string(),
        extension: ext.to_string(),
        custom_metadata: custom.to_string(),
        embed_generation_params: false,
        ..SaveOptions::default()
    }
}

fn image_64() -> Vec<ImageTensor> {
    vec![ImageTensor::filled(64, 64, 3, 0.5).unwrap()]
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Raw (kind, contents) pairs of every text chunk in a PNG file.
fn text_chunks(path: &Path) -> Vec<(String, Vec<u8>)> {
    let png = Png::from_bytes(Bytes::from(fs::read(path).unwrap())).unwrap();
    png.chunks()
        .iter()
        .filter(|c| &c.kind() == b"tEXt" || &c.kind() == b"iTXt")
        .map(|c| {
            (
                String::from_utf8_lossy(&c.kind()).into_owned(),
                c.contents().to_vec(),
            )
        })
        .collect()
}

#[test]
fn single_png_with_author() {
    let dir = TempDir::new().unwrap();
    let saver = ImageSaver::new(dir.path());
    let images = image_64();

    let out = saver
        .save_images(&images, &options("test_%counter%", "png", r#"{"author":"Alice"}"#), None)
        .unwrap();

    assert_eq!(out.files.len(), 1);
    assert_eq!(out.files[0].file_name().unwrap(), "test_00001.png");
    assert_eq!(
        text_chunks(&out.files[0]),
        vec![("tEXt".to_string(), b"author\0Alice".to_vec())]
    );

    let decoded = image::open(&out.files[0]).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 64));
}

#[test]
fn repeated_invocations_increment_the_counter() {
    let dir = TempDir::new().unwrap();
    let saver = ImageSaver::new(dir.path());
    let images = image_64();
    let opts = options("test_%counter%", "png", r#"{"author":"Alice"}"#);

    let first = saver.save_images(&images, &opts, None).unwrap();
    let second = saver.save_images(&images, &opts, None).unwrap();

    assert_eq!(first.files[0].file_name().unwrap(), "test_00001.png");
    assert_eq!(second.files[0].file_name().unwrap(), "test_00002.png");
    assert_eq!(file_names(dir.path()), ["test_00001.png", "test_00002.png"]);
}

#[test]
fn resolved_paths_never_collide_with_existing_files() {
    let dir = TempDir::new().unwrap();
    for name in ["shot_00001.png", "shot_00002.webp", "shot_00005.png", "shot_x.png"] {
        fs::write(dir.path().join(name), b"taken").unwrap();
    }
    let before: Vec<PathBuf> = file_names(dir.path())
        .iter()
        .map(|n| std::path::absolute(dir.path().join(n)).unwrap())
        .collect();

    let images: Vec<_> = (0..3)
        .map(|_| ImageTensor::filled(4, 4, 3, 0.1).unwrap())
        .collect();
    let out = ImageSaver::new(dir.path())
        .save_images(&images, &options("shot", "png", "{}"), None)
        .unwrap();

    for file in &out.files {
        assert!(!before.contains(file), "{} overwrote an existing file", file.display());
    }
    let names: Vec<_> = out
        .files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["shot_00006.png", "shot_00007.png", "shot_00008.png"]);
    for original in ["shot_00001.png", "shot_00002.webp", "shot_00005.png"] {
        assert_eq!(fs::read(dir.path().join(original)).unwrap(), b"taken");
    }
}

#[test]
fn unsupported_extensions_fail_without_writing() {
    let dir = TempDir::new().unwrap();
    let saver = ImageSaver::new(dir.path());
    let images = image_64();

    for ext in ["gif", "tiff", "bmp", "exr"] {
        let err = saver
            .save_images(&images, &options("x", ext, r#"{"a":"b"}"#), None)
            .unwrap_err();
        assert!(matches!(err, SaveError::UnsupportedFormat(_)), "{ext}: {err}");
    }
    assert!(file_names(dir.path()).is_empty());
}

#[test]
fn malformed_json_fails_without_writing() {
    let dir = TempDir::new().unwrap();
    let err = ImageSaver::new(dir.path())
        .save_images(&image_64(), &options("x", "png", r#"{"author": }"#), None)
        .unwrap_err();

    assert!(matches!(err, SaveError::InvalidMetadata(_)));
    assert!(file_names(dir.path()).is_empty());
}

#[test]
fn png_round_trip_matches_merged_record() {
    let dir = TempDir::new().unwrap();
    let custom = r#"{"author":"Alice","steps":30,"cfg":6.5,"upscaled":false,"city":"Zürich","title":"夜の海","tags":["sea","night"]}"#;
    let mut opts = options("rt", "png", custom);
    opts.embed_generation_params = true;
    let params = GenerationParams {
        prompt: Some(json!({"3": {"class_type": "KSampler", "inputs": {"seed": 42}}})),
        extra: serde_json::Map::from_iter([("workflow".to_string(), json!({"links": []}))]),
    };

    let images = image_64();
    let out = ImageSaver::new(dir.path())
        .save_images(&images, &opts, Some(&params))
        .unwrap();
    let read_back = read_metadata(&out.files[0]).unwrap().record;

    let expected = MetadataRecord::merged(Some(&params), MetadataRecord::parse_custom(custom).unwrap());
    assert_eq!(read_back.text_entries(), expected.text_entries());

    let kinds: BTreeMap<String, String> = text_chunks(&out.files[0])
        .into_iter()
        .map(|(kind, data)| {
            let key_end = data.iter().position(|&b| b == 0).unwrap();
            (String::from_utf8_lossy(&data[..key_end]).into_owned(), kind)
        })
        .collect();
    assert_eq!(kinds["title"], "iTXt");
    assert_eq!(kinds["city"], "tEXt");
}

#[test]
fn webp_round_trip_matches_merged_record() {
    let dir = TempDir::new().unwrap();
    let custom = r#"{"author":"Alice","steps":30,"cfg":6.5,"upscaled":false,"title":"夜の海"}"#;
    let mut opts = options("rt", "webp", custom);
    opts.embed_generation_params = true;
    let params = GenerationParams {
        prompt: Some(json!("a quiet harbour")),
        extra: serde_json::Map::new(),
    };

    let images = image_64();
    let out = ImageSaver::new(dir.path())
        .save_images(&images, &opts, Some(&params))
        .unwrap();
    assert_eq!(out.files[0].file_name().unwrap(), "rt_00001.webp");

    let meta = read_metadata(&out.files[0]).unwrap();
    let expected = MetadataRecord::merged(Some(&params), MetadataRecord::parse_custom(custom).unwrap());
    assert_eq!(meta.record, expected);
    assert_eq!(
        meta.exif.unwrap().make.as_deref(),
        Some(r#"Prompt:"a quiet harbour""#)
    );

    let decoded = image::open(&out.files[0]).unwrap();
    assert_eq!(decoded.width(), 64);
}

#[test]
fn user_metadata_overrides_generation_params() {
    let dir = TempDir::new().unwrap();
    let mut opts = options("ov", "png", r#"{"prompt":"mine"}"#);
    opts.embed_generation_params = true;
    let params = GenerationParams {
        prompt: Some(json!({"1": {}})),
        extra: serde_json::Map::new(),
    };

    let images = image_64();
    let out = ImageSaver::new(dir.path())
        .save_images(&images, &opts, Some(&params))
        .unwrap();
    let record = read_metadata(&out.files[0]).unwrap().record;
    assert_eq!(record.get("prompt").unwrap().as_text(), "mine");
    assert_eq!(text_chunks(&out.files[0]).len(), 1);
}

#[test]
fn counter_first_with_custom_delimiter() {
    let dir = TempDir::new().unwrap();
    let mut opts = options("render", "jpeg", "{}");
    opts.filename_delimiter = "-".to_string();
    opts.number_first = true;
    opts.number_padding = 3;

    let images: Vec<_> = (0..2)
        .map(|_| ImageTensor::filled(16, 16, 4, 0.9).unwrap())
        .collect();
    ImageSaver::new(dir.path()).save_images(&images, &opts, None).unwrap();

    assert_eq!(file_names(dir.path()), ["001-render.jpeg", "002-render.jpeg"]);
}
