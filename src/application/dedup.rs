//! Post-hoc duplicate reconciliation
//!
//! The ingest path's conditional insert keeps new stores free of
//! duplicates; this tool exists for records written before that invariant
//! was enforced, and for duplicates introduced out of band. The scanner
//! reads the whole store and groups by business key; the resolver deletes
//! exactly what the operator (or the keep-earliest batch policy) selects.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::domain::item::DuplicateGroup;
use crate::infrastructure::errors::StoreError;
use crate::infrastructure::repository::ItemRepository;

const SCAN_PAGE_SIZE: i64 = 500;

/// Reads the entire store (paged internally) and yields groups of records
/// sharing a business key, duplicates only.
pub struct DuplicateScanner {
    repo: ItemRepository,
    page_size: i64,
}

impl DuplicateScanner {
    pub fn new(repo: ItemRepository) -> Self {
        Self { repo, page_size: SCAN_PAGE_SIZE }
    }

    /// Scanner with a custom internal page size; grouping must not depend
    /// on where page boundaries fall.
    pub fn with_page_size(repo: ItemRepository, page_size: i64) -> Self {
        Self { repo, page_size }
    }

    /// Groups of two or more records per url, members ordered by
    /// `scraped_at` ascending, groups ordered by key.
    pub async fn scan(&self) -> Result<Vec<DuplicateGroup>, StoreError> {
        let mut by_key: BTreeMap<String, Vec<_>> = BTreeMap::new();
        let mut offset = 0;

        loop {
            let page = self.repo.scan_page(self.page_size, offset).await?;
            let fetched = page.len() as i64;
            for item in page {
                by_key.entry(item.url.clone()).or_default().push(item);
            }
            if fetched < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        let groups = by_key
            .into_iter()
            .filter(|(_, members)| members.len() >= 2)
            .map(|(business_key, mut members)| {
                members.sort_by_key(|item| item.scraped_at);
                DuplicateGroup { business_key, members }
            })
            .collect();
        Ok(groups)
    }
}

/// Operator selection seam. Implementations return zero-based indices of the
/// members to delete; an empty selection leaves the group untouched.
pub trait OperatorPrompt {
    fn select(&mut self, business_key: &str, labels: &[String]) -> Result<Vec<usize>>;
}

/// Interactive prompt on stdin: comma-separated one-based indices, empty
/// line keeps the whole group.
pub struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn select(&mut self, business_key: &str, labels: &[String]) -> Result<Vec<usize>> {
        let stdin = std::io::stdin();
        let mut out = std::io::stdout();

        writeln!(out, "\nDuplicates for {business_key}:")?;
        for (index, label) in labels.iter().enumerate() {
            writeln!(out, "  [{}] {label}", index + 1)?;
        }

        loop {
            write!(out, "members to delete (comma-separated, empty keeps all): ")?;
            out.flush()?;

            let mut line = String::new();
            let bytes = stdin.lock().read_line(&mut line).context("failed to read selection")?;
            let line = line.trim();
            if bytes == 0 || line.is_empty() {
                return Ok(Vec::new());
            }

            let parsed: std::result::Result<Vec<usize>, _> =
                line.split(',').map(|token| token.trim().parse::<usize>()).collect();
            match parsed {
                Ok(indices) if indices.iter().all(|&i| (1..=labels.len()).contains(&i)) => {
                    return Ok(indices.into_iter().map(|i| i - 1).collect());
                }
                _ => writeln!(out, "enter numbers between 1 and {}", labels.len())?,
            }
        }
    }
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub groups_reviewed: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Deletes operator-selected duplicate records by their composite address.
pub struct DuplicateResolver<P: OperatorPrompt> {
    repo: ItemRepository,
    prompt: P,
}

impl<P: OperatorPrompt> DuplicateResolver<P> {
    pub fn new(repo: ItemRepository, prompt: P) -> Self {
        Self { repo, prompt }
    }

    /// Walk every group, collect a selection and delete it. A failed
    /// deletion is reported per item and never aborts the remaining work;
    /// deleting an already-absent record counts as success.
    pub async fn resolve(&mut self, groups: &[DuplicateGroup]) -> Result<ResolutionReport> {
        let mut report = ResolutionReport::default();

        for group in groups {
            report.groups_reviewed += 1;
            let labels = group.member_labels();
            let selection = self.prompt.select(&group.business_key, &labels)?;

            for member in selection.into_iter().filter_map(|index| group.members.get(index)) {
                match self.repo.delete(&member.url, member.scraped_at).await {
                    Ok(()) => {
                        info!("deleted {} scraped at {}", member.url, member.scraped_at);
                        report.deleted += 1;
                    }
                    Err(err) => {
                        error!("failed to delete {} ({}): {err}", member.url, member.scraped_at);
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Batch policy: keep the earliest record of every group, delete the rest.
/// No prompt involved; the deletion contract is the same as the interactive
/// path.
pub async fn keep_earliest(
    repo: &ItemRepository,
    groups: &[DuplicateGroup],
) -> ResolutionReport {
    let mut report = ResolutionReport::default();

    for group in groups {
        report.groups_reviewed += 1;
        for member in group.members.iter().skip(1) {
            match repo.delete(&member.url, member.scraped_at).await {
                Ok(()) => {
                    info!("deleted {} scraped at {}", member.url, member.scraped_at);
                    report.deleted += 1;
                }
                Err(err) => {
                    error!("failed to delete {} ({}): {err}", member.url, member.scraped_at);
                    report.failed += 1;
                }
            }
        }
    }

    report
}
