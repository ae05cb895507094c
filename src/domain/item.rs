//! Catalog item record and duplicate-review structures

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Extraction map keys produced by the field-extraction collaborator.
pub const FIELD_NAME: &str = "name";
pub const FIELD_AUTHOR: &str = "author";
pub const FIELD_LICENSE: &str = "license";

/// The record persisted for one discovered catalog item.
///
/// `url` is the business key: for a given `url` at most one record may exist
/// in the store. `scraped_at` participates only in the legacy composite
/// address used for deletions, never in identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CatalogItem {
    pub url: String,
    pub name: String,
    pub author: String,
    pub license: String,
    /// Which listing run produced this item (e.g. "latest").
    pub collection: String,
    /// Optional finer grouping derived from listing page content,
    /// e.g. a "03/2024" period label.
    pub sub_collection: Option<String>,
    /// Host component of `url`; derived, not independently settable.
    pub source: String,
    pub scraped_at: DateTime<Utc>,
}

impl CatalogItem {
    /// Assemble a record from an extraction map plus provenance labels.
    ///
    /// Missing extraction fields come through as empty strings; a record is
    /// never rejected for an absent descriptive field. The license value is
    /// truncated at the first newline because some detail pages append
    /// usage notes below the license name.
    pub fn from_extracted(
        url: &str,
        fields: &HashMap<String, String>,
        collection: &str,
        sub_collection: Option<&str>,
    ) -> Self {
        let field = |key: &str| fields.get(key).map(String::as_str).unwrap_or("").trim().to_string();

        let license = field(FIELD_LICENSE);
        let license = license.split('\n').next().unwrap_or("").trim().to_string();

        Self {
            url: url.to_string(),
            name: field(FIELD_NAME),
            author: field(FIELD_AUTHOR),
            license,
            collection: collection.to_string(),
            sub_collection: sub_collection.map(str::to_string),
            source: derive_source(url),
            scraped_at: Utc::now(),
        }
    }
}

/// Host component of the item URL, empty when the URL does not parse.
fn derive_source(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Outcome of a conditional store write.
///
/// `AlreadyExists` is the expected resolution of a check-then-write race
/// between concurrent crawlers; callers count it, they do not treat it as a
/// failure and they must not retry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// A set of stored records sharing one business key.
///
/// Members are ordered by `scraped_at` ascending so an operator can identify
/// the earliest ("original") record during review.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub business_key: String,
    pub members: Vec<CatalogItem>,
}

impl DuplicateGroup {
    /// Human-readable labels for operator review, one per member.
    pub fn member_labels(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|item| format!("{} (scraped at {})", item.name, item.scraped_at.to_rfc3339()))
            .collect()
    }
}
