//! Selector-driven HTML parsing for listing and detail pages
//!
//! Selectors ship as configuration so the markup rules for a target site
//! can be swapped without touching the pipeline. Each field carries a list
//! of fallback selectors tried in order; extraction is best-effort per
//! field and never fails an item for one missing selector.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::domain::item::{FIELD_AUTHOR, FIELD_LICENSE, FIELD_NAME};

/// CSS selector configuration for one target site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSelectors {
    /// Anchors pointing at item detail pages on a listing page.
    pub listing_links: Vec<String>,
    /// Optional listing section container; when present, candidates inherit
    /// the period label extracted from their section's heading.
    pub listing_section: Option<String>,
    /// Headings (inside a section) carrying a "Month Year" period text.
    pub section_heading: Vec<String>,
    pub name: Vec<String>,
    pub author: Vec<String>,
    pub license: Vec<String>,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            listing_links: vec!["div.crea-group a".into()],
            listing_section: None,
            section_heading: vec!["h2".into()],
            name: vec![".t0".into()],
            author: vec![".card__title--secondary".into()],
            license: vec![r".link--strong.ml-0\.25".into()],
        }
    }
}

/// One discovered item link, with the grouping label of the listing section
/// it appeared under.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingCandidate {
    pub url: String,
    pub group_label: Option<String>,
}

/// Parsed content of one listing page.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub candidates: Vec<ListingCandidate>,
}

/// Parser for listing pages: candidate links plus per-section period labels.
pub struct ListingParser {
    link_selectors: Vec<Selector>,
    section_selector: Option<Selector>,
    heading_selectors: Vec<Selector>,
    year_pattern: Regex,
}

impl ListingParser {
    pub fn new(selectors: &SiteSelectors) -> Result<Self> {
        let section_selector = match &selectors.listing_section {
            Some(raw) => Some(
                Selector::parse(raw)
                    .map_err(|e| anyhow!("invalid section selector '{raw}': {e}"))?,
            ),
            None => None,
        };

        Ok(Self {
            link_selectors: compile_selectors(&selectors.listing_links)?,
            section_selector,
            heading_selectors: compile_selectors(&selectors.section_heading)?,
            year_pattern: Regex::new(r"\b(19|20)\d{2}\b")?,
        })
    }

    /// Extract candidate item URLs from listing page markup. Hrefs are
    /// absolutized against `base`; anything that does not resolve is skipped.
    pub fn parse(&self, html: &str, base: &Url) -> ListingPage {
        let document = Html::parse_document(html);
        let mut candidates = Vec::new();

        match &self.section_selector {
            Some(section_selector) => {
                for section in document.select(section_selector) {
                    let label = self.section_label(section);
                    self.collect_links(section, base, label.as_deref(), &mut candidates);
                }
            }
            None => {
                self.collect_links(document.root_element(), base, None, &mut candidates);
            }
        }

        ListingPage { candidates }
    }

    fn collect_links(
        &self,
        scope: ElementRef<'_>,
        base: &Url,
        label: Option<&str>,
        out: &mut Vec<ListingCandidate>,
    ) {
        let before = out.len();
        for selector in &self.link_selectors {
            for anchor in scope.select(selector) {
                let Some(href) = anchor.value().attr("href") else { continue };
                match base.join(href) {
                    Ok(resolved) => out.push(ListingCandidate {
                        url: resolved.to_string(),
                        group_label: label.map(str::to_string),
                    }),
                    Err(e) => debug!("skipping unresolvable href '{href}': {e}"),
                }
            }
            if out.len() > before {
                // First selector that matched anything wins for this scope.
                break;
            }
        }
    }

    fn section_label(&self, section: ElementRef<'_>) -> Option<String> {
        for selector in &self.heading_selectors {
            if let Some(heading) = section.select(selector).next() {
                let text: String = heading.text().collect();
                if let Some(label) = extract_period(&self.year_pattern, &text) {
                    return Some(label);
                }
            }
        }
        None
    }
}

/// Field-extraction collaborator: raw page content to a field-name map.
/// Absent fields map to empty strings, never to an error.
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, html: &str) -> HashMap<String, String>;
}

/// Selector-based extractor for detail pages.
pub struct DetailExtractor {
    name_selectors: Vec<Selector>,
    author_selectors: Vec<Selector>,
    license_selectors: Vec<Selector>,
}

impl DetailExtractor {
    pub fn new(selectors: &SiteSelectors) -> Result<Self> {
        Ok(Self {
            name_selectors: compile_selectors(&selectors.name)?,
            author_selectors: compile_selectors(&selectors.author)?,
            license_selectors: compile_selectors(&selectors.license)?,
        })
    }

    fn first_text(document: &Html, selectors: &[Selector]) -> String {
        for selector in selectors {
            if let Some(element) = document.select(selector).next() {
                let text: String = element.text().collect();
                let text = text.trim();
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
        String::new()
    }
}

impl FieldExtractor for DetailExtractor {
    fn extract(&self, html: &str) -> HashMap<String, String> {
        let document = Html::parse_document(html);
        let mut fields = HashMap::new();
        fields.insert(FIELD_NAME.to_string(), Self::first_text(&document, &self.name_selectors));
        fields
            .insert(FIELD_AUTHOR.to_string(), Self::first_text(&document, &self.author_selectors));
        fields.insert(
            FIELD_LICENSE.to_string(),
            Self::first_text(&document, &self.license_selectors),
        );
        fields
    }
}

/// Compile fallback selector lists; at least one entry must compile.
fn compile_selectors(raw: &[String]) -> Result<Vec<Selector>> {
    let mut selectors = Vec::new();
    let mut errors = Vec::new();

    for raw_selector in raw {
        match Selector::parse(raw_selector) {
            Ok(selector) => selectors.push(selector),
            Err(e) => {
                warn!("failed to compile selector '{raw_selector}': {e}");
                errors.push(format!("'{raw_selector}': {e}"));
            }
        }
    }

    if selectors.is_empty() && !raw.is_empty() {
        return Err(anyhow!("no valid selectors compiled: {}", errors.join(", ")));
    }
    Ok(selectors)
}

const MONTHS: [(&str, &str); 12] = [
    ("january", "01"),
    ("february", "02"),
    ("march", "03"),
    ("april", "04"),
    ("may", "05"),
    ("june", "06"),
    ("july", "07"),
    ("august", "08"),
    ("september", "09"),
    ("october", "10"),
    ("november", "11"),
    ("december", "12"),
];

/// Normalize a "Best files of March 2024" style heading to "03/2024".
fn extract_period(year_pattern: &Regex, text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let month = MONTHS.iter().find(|(name, _)| lower.contains(name))?.1;
    let year = year_pattern.find(&lower)?.as_str();
    Some(format!("{month}/{year}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://catalog.example").unwrap()
    }

    #[test]
    fn listing_links_are_absolutized() {
        let selectors = SiteSelectors::default();
        let parser = ListingParser::new(&selectors).unwrap();
        let html = r#"
            <div class="crea-group">
                <a href="/en/model/benchy">Benchy</a>
                <a href="https://other.example/model/2">Two</a>
            </div>
        "#;

        let page = parser.parse(html, &base());
        let urls: Vec<_> = page.candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://catalog.example/en/model/benchy", "https://other.example/model/2"]
        );
        assert!(page.candidates.iter().all(|c| c.group_label.is_none()));
    }

    #[test]
    fn sections_assign_period_labels_to_their_candidates() {
        let selectors = SiteSelectors {
            listing_links: vec!["a.item".into()],
            listing_section: Some("section".into()),
            section_heading: vec!["h2".into()],
            ..SiteSelectors::default()
        };
        let parser = ListingParser::new(&selectors).unwrap();
        let html = r#"
            <section>
                <h2>Best files of March 2024</h2>
                <a class="item" href="/m/1">one</a>
            </section>
            <section>
                <h2>Top picks December 2023</h2>
                <a class="item" href="/m/2">two</a>
            </section>
            <section>
                <h2>No period here</h2>
                <a class="item" href="/m/3">three</a>
            </section>
        "#;

        let page = parser.parse(html, &base());
        let labels: Vec<_> = page.candidates.iter().map(|c| c.group_label.clone()).collect();
        assert_eq!(
            labels,
            vec![Some("03/2024".to_string()), Some("12/2023".to_string()), None]
        );
    }

    #[test]
    fn detail_extraction_degrades_per_field() {
        let extractor = DetailExtractor::new(&SiteSelectors::default()).unwrap();
        // Author markup absent entirely.
        let html = r#"
            <h1 class="t0">Cute Benchy</h1>
            <a class="link--strong ml-0.25">CC BY-NC</a>
        "#;

        let fields = extractor.extract(html);
        assert_eq!(fields[FIELD_NAME], "Cute Benchy");
        assert_eq!(fields[FIELD_AUTHOR], "");
        assert_eq!(fields[FIELD_LICENSE], "CC BY-NC");
    }

    #[test]
    fn extract_period_handles_case_and_position() {
        let re = Regex::new(r"\b(19|20)\d{2}\b").unwrap();
        assert_eq!(extract_period(&re, "BEST OF JANUARY 2025"), Some("01/2025".into()));
        assert_eq!(extract_period(&re, "May flowers, 1999"), Some("05/1999".into()));
        assert_eq!(extract_period(&re, "March without a year"), None);
        assert_eq!(extract_period(&re, "2024 but no month"), None);
    }

    #[test]
    fn invalid_selector_lists_are_rejected() {
        let selectors = SiteSelectors {
            listing_links: vec![":::nonsense".into()],
            ..SiteSelectors::default()
        };
        assert!(ListingParser::new(&selectors).is_err());
    }
}
