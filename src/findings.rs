//! Append-only record of what was inspected and removed, with its JSON report and CSV table.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field;
use crate::model::{Bookmark, Classification, FindingKind, Location, Reference};

const NOT_AVAILABLE: &str = "N/A";

const TABLE_HEADER: [&str; 4] = ["display_text", "classification", "target", "page"];

/// Which inspected references become findings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPolicy {
    /// Ghosts and orphan bookmarks only.
    #[default]
    Removed,
    /// Every inspected reference with its classification, plus orphan bookmarks.
    All,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub display_text: String,
    pub kind: FindingKind,
    pub target: String,
    #[serde(flatten)]
    pub location: Location,
}

#[derive(Debug, Default)]
pub struct FindingRecorder {
    policy: ReportPolicy,
    findings: Vec<Finding>,
}

impl FindingRecorder {
    pub fn new(policy: ReportPolicy) -> Self {
        Self {
            policy,
            findings: Vec::new(),
        }
    }

    /// Appends unconditionally. No deduplication.
    pub fn record(
        &mut self,
        display_text: &str,
        kind: FindingKind,
        target: String,
        location: Location,
    ) -> &Finding {
        let display_text = match display_text.trim() {
            "" => NOT_AVAILABLE.to_string(),
            t => t.to_string(),
        };
        let idx = self.findings.len();
        self.findings.push(Finding {
            display_text,
            kind,
            target,
            location,
        });
        &self.findings[idx]
    }

    /// Records an inspected reference when the policy wants it.
    pub fn record_reference(
        &mut self,
        reference: &Reference,
        classification: Classification,
    ) -> Option<&Finding> {
        if classification != Classification::Ghost && self.policy != ReportPolicy::All {
            return None;
        }
        Some(self.record(
            &reference.resolved_text,
            classification.into(),
            reference_target(reference),
            reference.location,
        ))
    }

    pub fn record_bookmark(&mut self, bookmark: &Bookmark) -> &Finding {
        self.record(
            &bookmark.text,
            FindingKind::OrphanBookmark,
            bookmark.name.clone(),
            bookmark.location,
        )
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn count(&self, kind: FindingKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn into_findings(self) -> Vec<Finding> {
        self.findings
    }
}

/// Anchor, REF target or URL; the page when the reference names nothing.
pub fn reference_target(reference: &Reference) -> String {
    if let Some(t) = reference.target() {
        return t;
    }
    if field::keyword(&reference.code) == "HYPERLINK" {
        if let Some(url) = field::tokens(&reference.code).into_iter().nth(1) {
            if !url.starts_with('\\') && !url.is_empty() {
                return url;
            }
        }
    }
    format!("page {}", reference.location.page)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub references: usize,
    pub valid_internal: usize,
    pub external: usize,
    pub cross_reference: usize,
    pub ghosts: usize,
    pub exempt: usize,
    pub skipped_before_start_page: usize,
    pub removed_ghosts: usize,
    pub removed_orphans: usize,
    pub repaired_markers: usize,
}

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub document: String,
    pub output: Option<String>,
    pub generated_at: String,
    pub policy: ReportPolicy,
    pub start_page: u32,
    pub page_count: u32,
    pub text_sha256: String,
    pub summary: &'a Summary,
    pub rows: &'a [Finding],
}

pub fn write_report(path: &Path, report: &Report<'_>) -> Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(|e| Error::save(path, e))?;
    fs::write(path, json).map_err(|e| Error::save(path, e))
}

#[derive(Serialize)]
struct TableRow<'a> {
    display_text: &'a str,
    classification: FindingKind,
    target: &'a str,
    page: u32,
}

/// One CSV row per finding in discovery order. The header is written even when there are none.
pub fn write_table(path: &Path, rows: &[Finding]) -> Result<()> {
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| Error::save(path, e))?;
    w.write_record(TABLE_HEADER).map_err(|e| Error::save(path, e))?;
    for f in rows {
        w.serialize(TableRow {
            display_text: &f.display_text,
            classification: f.kind,
            target: &f.target,
            page: f.location.page,
        })
        .map_err(|e| Error::save(path, e))?;
    }
    w.flush().map_err(|e| Error::save(path, e))
}
