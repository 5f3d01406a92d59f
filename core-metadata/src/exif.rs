//! EXIF payload handed over by the artifact generator
//!
//! Only the fields the extractor reads are modelled; everything else in the
//! payload is kept verbatim in `extra` so it can be forwarded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// A text-ish EXIF field: either a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExifText {
    One(String),
    Many(Vec<String>),
}

impl ExifText {
    /// Tag tokens: lists are taken verbatim, strings split on `;`, `,` or `|`.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            ExifText::Many(values) => values.clone(),
            ExifText::One(value) => value
                .split([';', ',', '|'])
                .map(|t| t.trim().to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExifData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<ExifText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<ExifText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchical_subject: Option<ExifText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time_original: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ExifData {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Tag sources in precedence order.
    pub fn tag_sources(&self) -> impl Iterator<Item = &ExifText> {
        [&self.subject, &self.keywords, &self.hierarchical_subject]
            .into_iter()
            .flatten()
    }
}
