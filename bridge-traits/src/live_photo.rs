//! Live-photo pairing.
//!
//! A live photo is a still image and a short motion clip sharing a directory
//! and a basename (`IMG_0001.HEIC` + `IMG_0001.MOV`). Pairing is pure and
//! deterministic: given the same listing it always produces the same map.

use std::collections::{BTreeMap, HashMap};

use crate::storage::{is_image_key, is_motion_key, StorageObject};

enum Slot {
    Still,
    Motion,
}

#[derive(Default)]
struct Group<'a> {
    still: Option<&'a StorageObject>,
    motion: Option<&'a StorageObject>,
}

/// Split a key into `(directory, lower-cased basename without extension)`.
fn group_key(key: &str) -> (&str, String) {
    let (dir, name) = key.rsplit_once('/').unwrap_or(("", key));
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    (dir, stem.to_lowercase())
}

fn keep_smallest<'a>(slot: &mut Option<&'a StorageObject>, candidate: &'a StorageObject) {
    match slot {
        Some(existing) if existing.key <= candidate.key => {}
        _ => *slot = Some(candidate),
    }
}

/// Pair stills with motion clips, treating the built-in image extensions as
/// stills.
pub fn detect_live_photos(objects: &[StorageObject]) -> HashMap<String, StorageObject> {
    detect_live_photos_with(objects, &is_image_key)
}

/// Pair stills with motion clips.
///
/// `is_still` decides which keys count as stills; motion clips are always
/// the [`MOTION_EXTENSIONS`](crate::storage::MOTION_EXTENSIONS) keys.
/// Returns a map from still key to the paired motion object. Within one
/// directory/basename group the lexicographically smallest still is paired
/// with the lexicographically smallest motion clip; every other key in the
/// group stays unpaired, so no still or clip appears in more than one pair.
pub fn detect_live_photos_with(
    objects: &[StorageObject],
    is_still: &dyn Fn(&str) -> bool,
) -> HashMap<String, StorageObject> {
    let mut groups: BTreeMap<(&str, String), Group<'_>> = BTreeMap::new();

    for object in objects {
        let slot = if is_motion_key(&object.key) {
            Slot::Motion
        } else if is_still(&object.key) {
            Slot::Still
        } else {
            continue;
        };
        let group = groups.entry(group_key(&object.key)).or_default();
        match slot {
            Slot::Still => keep_smallest(&mut group.still, object),
            Slot::Motion => keep_smallest(&mut group.motion, object),
        }
    }

    groups
        .into_values()
        .filter_map(|g| match (g.still, g.motion) {
            (Some(still), Some(motion)) => Some((still.key.clone(), motion.clone())),
            _ => None,
        })
        .collect()
}
