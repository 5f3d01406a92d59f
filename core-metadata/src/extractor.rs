//! Photo Metadata Extraction
//!
//! Derives title, capture date, tags and view count from a storage key and an
//! optional EXIF payload.
//!
//! ## Precedence
//!
//! - **Tags**: the union of EXIF `Subject`, `Keywords` and
//!   `HierarchicalSubject`; directory segments only when enabled and EXIF has
//!   none
//! - **Date taken**: EXIF `DateTimeOriginal`, then a `YYYY-MM-DD` in the file
//!   name, then the clock
//! - **Title**: the file name with date and view-count markers removed
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::MetadataExtractor;
//!
//! let extractor = MetadataExtractor::new(Arc::new(SystemClock));
//! let info = extractor.extract("2024/2024-01-15_sunset_120views.jpg", None);
//! assert_eq!(info.title, "sunset");
//! assert_eq!(info.views, Some(120));
//! ```

use bridge_traits::Clock;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use core_library::AssetManifest;
use core_runtime::config::ProcessingConfig;
use core_runtime::logging::TaggedLogger;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};

use crate::exif::ExifData;

static FILENAME_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").unwrap());
static TITLE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}[_-]?").unwrap());
static VIEWS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)views?").unwrap());
static TITLE_VIEWS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[_-]?\d+views?").unwrap());
static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[_-]+").unwrap());

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Knobs that change extraction output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOptions {
    /// Use directory segments as tags when EXIF provides none.
    pub directory_tags: bool,
    /// Hex chars of SHA-256(key) appended to photo ids; 0 disables.
    pub digest_suffix_length: usize,
}

impl From<&ProcessingConfig> for ExtractionOptions {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            directory_tags: config.directory_tags,
            digest_suffix_length: config.digest_suffix_length,
        }
    }
}

/// Manifest fields derived from one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedInfo {
    pub title: String,
    pub date_taken: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    pub description: String,
    /// Parsed so it can be stripped from the title; not part of the manifest.
    pub views: Option<u64>,
}

/// Stateless extractor; the clock is the only source of non-determinism.
pub struct MetadataExtractor {
    clock: Arc<dyn Clock>,
    options: ExtractionOptions,
    logger: TaggedLogger,
}

impl MetadataExtractor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            options: ExtractionOptions::default(),
            logger: TaggedLogger::component("Image"),
        }
    }

    pub fn with_options(mut self, options: ExtractionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_logger(mut self, logger: TaggedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn options(&self) -> ExtractionOptions {
        self.options
    }

    /// Extract manifest fields for `key`.
    pub fn extract(&self, key: &str, exif: Option<&ExifData>) -> ExtractedInfo {
        let key = key.replace('\\', "/");
        let (directory, file_stem) = split_key(&key);

        let mut tags = exif.map(exif_tags).unwrap_or_default();
        if !tags.is_empty() {
            self.logger
                .debug(format_args!("{}: tags from EXIF [{}]", key, join(&tags)));
        } else if self.options.directory_tags {
            tags = directory
                .split('/')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        let date_taken = exif
            .and_then(|e| e.date_time_original.as_deref())
            .and_then(|raw| {
                let parsed = parse_exif_date(raw);
                if parsed.is_none() {
                    self.logger
                        .warn(format_args!("{}: unparseable DateTimeOriginal '{}'", key, raw));
                }
                parsed
            })
            .or_else(|| filename_date(file_stem))
            .unwrap_or_else(|| self.clock.now());

        let views = VIEWS
            .captures(file_stem)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok());

        let title = clean_title(file_stem);

        self.logger
            .debug(format_args!("{}: extracted title \"{}\"", key, title));

        ExtractedInfo {
            title,
            date_taken,
            tags,
            description: String::new(),
            views,
        }
    }

    pub fn photo_id(&self, key: &str) -> String {
        photo_id(key, self.options.digest_suffix_length)
    }

    /// Full manifest for `key`: extracted fields plus the processing outputs.
    pub fn build_manifest(
        &self,
        key: &str,
        exif: Option<&ExifData>,
        digest: Option<String>,
        live_photo_key: Option<String>,
        artifacts: BTreeMap<String, String>,
    ) -> AssetManifest {
        let info = self.extract(key, exif);
        AssetManifest {
            photo_id: self.photo_id(key),
            title: info.title,
            date_taken: info.date_taken,
            tags: info.tags,
            description: info.description,
            live_photo_key,
            digest,
            artifacts,
        }
    }
}

/// Basename without extension, plus `-` and the first `suffix_length` hex
/// chars of SHA-256(key) when `suffix_length > 0`.
pub fn photo_id(key: &str, suffix_length: usize) -> String {
    let key = key.replace('\\', "/");
    let (_, stem) = split_key(&key);
    if suffix_length == 0 {
        return stem.to_string();
    }
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    let len = suffix_length.min(digest.len());
    format!("{}-{}", stem, &digest[..len])
}

/// `(directory, file stem)` of a `/`-separated key.
fn split_key(key: &str) -> (&str, &str) {
    let (directory, file_name) = match key.rfind('/') {
        Some(idx) => (&key[..idx], &key[idx + 1..]),
        None => ("", key),
    };
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    (directory, stem)
}

fn exif_tags(exif: &ExifData) -> BTreeSet<String> {
    exif.tag_sources()
        .flat_map(|source| source.tokens())
        .filter(|t| !t.trim().is_empty())
        .collect()
}

fn parse_exif_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, EXIF_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn filename_date(stem: &str) -> Option<DateTime<Utc>> {
    let matched = FILENAME_DATE.captures(stem)?.get(1)?;
    let date = NaiveDate::parse_from_str(matched.as_str(), "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn clean_title(stem: &str) -> String {
    let without_date = TITLE_DATE.replace_all(stem, "");
    let without_views = TITLE_VIEWS.replace_all(&without_date, "");
    let spaced = SEPARATORS.replace_all(&without_views, " ");
    let title = spaced.trim();
    if title.is_empty() {
        stem.to_string()
    } else {
        title.to_string()
    }
}

fn join(tags: &BTreeSet<String>) -> String {
    tags.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::ExifText;
    use bridge_traits::FixedClock;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 8, 0, 0).unwrap()
    }

    fn extractor() -> MetadataExtractor {
        MetadataExtractor::new(Arc::new(FixedClock(fixed_now())))
    }

    fn tags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_filename_convention() {
        let info = extractor().extract("2024-01-15_sunset_120views.jpg", None);

        assert_eq!(info.title, "sunset");
        assert_eq!(
            info.date_taken,
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(info.views, Some(120));
        assert!(info.tags.is_empty());
        assert_eq!(info.description, "");
    }

    #[test]
    fn test_title_collapses_separators() {
        let info = extractor().extract("trips/city__night-lights-3VIEWS.png", None);
        assert_eq!(info.title, "city night lights");
        assert_eq!(info.views, Some(3));
        assert_eq!(info.date_taken, fixed_now());
    }

    #[test]
    fn test_title_falls_back_to_stem() {
        let info = extractor().extract("2024-01-15.jpg", None);
        assert_eq!(info.title, "2024-01-15");

        let info = extractor().extract("dir/_-_.jpg", None);
        assert_eq!(info.title, "_-_");
    }

    #[test]
    fn test_exif_tags_override_directory_tags() {
        let exif = ExifData {
            subject: Some(ExifText::Many(vec!["beach".into(), "".into()])),
            keywords: Some(ExifText::One("sunset; beach|travel, ".into())),
            hierarchical_subject: Some(ExifText::One("places|coast".into())),
            ..Default::default()
        };
        let extractor = extractor().with_options(ExtractionOptions {
            directory_tags: true,
            digest_suffix_length: 0,
        });

        let info = extractor.extract("albums/summer/a.jpg", Some(&exif));
        assert_eq!(
            info.tags,
            tags(&["beach", "coast", "places", "sunset", "travel"])
        );
    }

    #[test]
    fn test_directory_tags_are_opt_in() {
        let key = "albums/summer/a.jpg";
        assert!(extractor().extract(key, None).tags.is_empty());

        let extractor = extractor().with_options(ExtractionOptions {
            directory_tags: true,
            digest_suffix_length: 0,
        });
        assert_eq!(
            extractor.extract(key, None).tags,
            tags(&["albums", "summer"])
        );
    }

    #[test]
    fn test_exif_date_precedence() {
        let exif = ExifData {
            date_time_original: Some("2023:07:04 18:30:00".into()),
            ..Default::default()
        };
        let info = extractor().extract("2024-01-15_x.jpg", Some(&exif));
        assert_eq!(
            info.date_taken,
            Utc.with_ymd_and_hms(2023, 7, 4, 18, 30, 0).unwrap()
        );

        let exif = ExifData {
            date_time_original: Some("2023-07-04T18:30:00+02:00".into()),
            ..Default::default()
        };
        let info = extractor().extract("x.jpg", Some(&exif));
        assert_eq!(
            info.date_taken,
            Utc.with_ymd_and_hms(2023, 7, 4, 16, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_unparseable_exif_date_falls_back_to_filename() {
        let exif = ExifData {
            date_time_original: Some("not a date".into()),
            ..Default::default()
        };
        let info = extractor().extract("2024-01-15_x.jpg", Some(&exif));
        assert_eq!(
            info.date_taken,
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_calendar_date_uses_clock() {
        let info = extractor().extract("2024-13-45_x.jpg", None);
        assert_eq!(info.date_taken, fixed_now());
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let extractor = extractor();
        let key = r"trips\2024-02-03_harbor_7views.heic";
        assert_eq!(extractor.extract(key, None), extractor.extract(key, None));
        assert_eq!(extractor.extract(key, None).title, "harbor");
    }

    #[test]
    fn test_photo_id() {
        assert_eq!(photo_id("2024/sunset.jpg", 0), "sunset");
        assert_eq!(photo_id(".hidden", 0), ".hidden");

        let id = photo_id("2024/sunset.jpg", 8);
        assert!(id.starts_with("sunset-"));
        assert_eq!(id.len(), "sunset-".len() + 8);
        assert_ne!(id, photo_id("2025/sunset.jpg", 8));
        assert_eq!(photo_id("a.jpg", 200).len(), "a-".len() + 64);
    }

    #[test]
    fn test_build_manifest() {
        let extractor = extractor().with_options(ExtractionOptions {
            directory_tags: false,
            digest_suffix_length: 4,
        });
        let manifest = extractor.build_manifest(
            "2024-01-15_sunset.jpg",
            None,
            Some("ff".repeat(32)),
            Some("2024-01-15_sunset.mov".into()),
            BTreeMap::from([("thumbnail".to_string(), "thumbs/sunset.webp".to_string())]),
        );

        assert!(manifest.photo_id.starts_with("2024-01-15_sunset-"));
        assert_eq!(manifest.title, "sunset");
        assert_eq!(manifest.live_photo_key.as_deref(), Some("2024-01-15_sunset.mov"));
        assert_eq!(manifest.artifacts["thumbnail"], "thumbs/sunset.webp");
        assert!(manifest.validate().is_ok());
    }
}
