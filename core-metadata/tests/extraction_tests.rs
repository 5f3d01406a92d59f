//! Integration tests for photo metadata extraction

use bridge_traits::{FixedClock, SystemClock};
use chrono::{TimeZone, Utc};
use core_metadata::{ExifData, ExtractionOptions, MetadataExtractor};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

#[test]
fn test_dated_filename_without_exif() {
    let extractor = MetadataExtractor::new(Arc::new(SystemClock));
    let info = extractor.extract("2024-01-15_sunset_120views.jpg", None);

    assert_eq!(info.title, "sunset");
    assert_eq!(
        info.date_taken,
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
    );
    assert_eq!(info.views, Some(120));
}

#[test]
fn test_exif_payload_from_generator_json() {
    let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let extractor = MetadataExtractor::new(Arc::new(FixedClock(now)));
    let exif = ExifData::from_json(json!({
        "Keywords": ["Harbor", "Boats"],
        "HierarchicalSubject": "Places|Norway",
        "DateTimeOriginal": "2022:08:10 05:12:44",
        "ISO": 200,
    }))
    .unwrap();

    let manifest = extractor.build_manifest(
        "norway/IMG_2041.HEIC",
        Some(&exif),
        None,
        None,
        BTreeMap::new(),
    );

    assert_eq!(manifest.photo_id, "IMG_2041");
    assert_eq!(manifest.title, "IMG 2041");
    assert_eq!(
        manifest.date_taken,
        Utc.with_ymd_and_hms(2022, 8, 10, 5, 12, 44).unwrap()
    );
    let tags: Vec<_> = manifest.tags.iter().map(String::as_str).collect();
    assert_eq!(tags, vec!["Boats", "Harbor", "Norway", "Places"]);
}

#[test]
fn test_wall_clock_fallback_is_the_only_impure_input() {
    let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let a = MetadataExtractor::new(Arc::new(FixedClock(now)))
        .with_options(ExtractionOptions {
            directory_tags: true,
            digest_suffix_length: 6,
        });
    let b = MetadataExtractor::new(Arc::new(FixedClock(now)))
        .with_options(a.options());

    let key = "misc/untitled.png";
    assert_eq!(a.extract(key, None), b.extract(key, None));
    assert_eq!(a.extract(key, None).date_taken, now);
    assert_eq!(a.photo_id(key), b.photo_id(key));
}
