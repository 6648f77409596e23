mod output;

use std::path::{Path, PathBuf};

use crate::access::DocumentAccess;
use crate::anchors::AnchorIndex;
use crate::classify::Classifier;
use crate::config::AppConfig;
use crate::docx::DocxDocument;
use crate::error::{Error, Result};
use crate::findings::{write_report, write_table, Finding, FindingRecorder, Report, Summary};
use crate::model::{AnchorKind, Classification};
use crate::prompt;
use crate::reconcile::Reconciler;
use crate::runlog::RunLog;

pub use output::output_docx_path;

/// Where classification starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartPage {
    #[default]
    First,
    Page(u32),
    /// Prompt once the page count is known.
    Ask,
}

#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub config: AppConfig,
    pub start_page: StartPage,
    pub dry_run: bool,
    /// Mirror the log on stderr.
    pub echo: bool,
}

#[derive(Debug)]
pub struct ProcessOutcome {
    pub summary: Summary,
    pub findings: Vec<Finding>,
    pub text_sha256: String,
}

#[derive(Debug)]
pub struct RunSummary {
    pub input: PathBuf,
    /// `None` on a dry run.
    pub output: Option<PathBuf>,
    pub report: PathBuf,
    pub table: PathBuf,
    pub log: PathBuf,
    pub summary: Summary,
}

/// Artifacts of a run that got as far as writing them.
struct Written {
    output: Option<PathBuf>,
    report: PathBuf,
    table: PathBuf,
    summary: Summary,
}

/// Index, classify and reconcile one open document. References on pages
/// before `start_page` are left alone.
pub fn process_document(
    doc: &mut dyn DocumentAccess,
    cfg: &AppConfig,
    start_page: u32,
    log: &RunLog,
) -> Result<ProcessOutcome> {
    let mut index = AnchorIndex::build(doc, cfg.scan.text_anchors);
    log.info(format!(
        "anchor index: {} entries ({} bookmarks, {} headings, {} styled runs)",
        index.len(),
        index.count_of(AnchorKind::Bookmark),
        index.count_of(AnchorKind::Heading),
        index.count_of(AnchorKind::StyledText)
    ));
    if index.is_empty() {
        log.warn("no anchors found; internal links and cross-references cannot resolve");
    }

    let classifier = Classifier::new(&cfg.scan.exempt_fields, log);
    let mut recorder = FindingRecorder::new(cfg.scan.report);
    let mut summary = Summary::default();
    let mut classified = Vec::new();

    let references = doc.references();
    let total = references.len();
    for (i, reference) in references.into_iter().enumerate() {
        log.progress("Classify", i + 1, total);
        if reference.location.page < start_page {
            summary.skipped_before_start_page += 1;
            continue;
        }
        summary.references += 1;
        if classifier.is_exempt(&reference) {
            summary.exempt += 1;
            log.info(format!("exempt {:?} at {}", reference.code, reference.location));
            continue;
        }

        let verdict = classifier.classify(&reference, &index, doc.field_refresh());
        match verdict.classification {
            Classification::ValidInternal => summary.valid_internal += 1,
            Classification::External => summary.external += 1,
            Classification::CrossReference => summary.cross_reference += 1,
            Classification::Ghost => summary.ghosts += 1,
        }
        log.info(format!(
            "{} ({}): {:?} {:?} at {}",
            verdict.classification,
            verdict.rule,
            reference.resolved_text.trim(),
            reference.code,
            reference.location
        ));
        recorder.record_reference(&reference, verdict.classification);
        classified.push((reference, verdict.classification));
    }

    let reconciler = Reconciler::new(
        cfg.reconcile.ghost_action(),
        &cfg.reconcile.preserve_bookmarks,
        log,
    );
    let outcome = reconciler.reconcile(doc, &classified, &mut index, &mut recorder)?;
    summary.removed_ghosts = outcome.removed_ghosts;
    summary.removed_orphans = outcome.removed_orphans;
    summary.repaired_markers =
        outcome.repair.dropped_ends.len() + outcome.repair.closed_starts.len();
    log.info(format!(
        "removed {} ghost reference(s) and {} orphan bookmark(s)",
        summary.removed_ghosts, summary.removed_orphans
    ));

    Ok(ProcessOutcome {
        summary,
        findings: recorder.into_findings(),
        text_sha256: outcome.text_sha256,
    })
}

/// Full run: pick paths, open the log, clean the document, write outputs.
///
/// The log file is the first artifact; a fatal error after it is opened is
/// logged and no report or document is written.
pub fn run(
    input: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    opts: &RunOptions,
) -> Result<RunSummary> {
    let input = match input {
        Some(p) => p,
        None => prompt::ask_path("Input .docx")?,
    };
    let out_dir = match out_dir {
        Some(p) => p,
        None => prompt::ask_path("Output folder")?,
    };
    std::fs::create_dir_all(&out_dir).map_err(|e| Error::save(&out_dir, e))?;

    let log_path = out_dir.join(&opts.config.output.log_name);
    let log = RunLog::open(&log_path, opts.echo)?;
    log.info(format!("input: {}", input.display()));

    let result = run_logged(&input, &out_dir, opts, &log);
    match &result {
        Ok(written) => match &written.output {
            Some(out) => log.info(format!("saved {}", out.display())),
            None => log.info("dry run: document not saved"),
        },
        Err(e) => log.error(format!("run aborted: {e}")),
    }
    log.close()?;

    let written = result?;
    Ok(RunSummary {
        input,
        output: written.output,
        report: written.report,
        table: written.table,
        log: log_path,
        summary: written.summary,
    })
}

fn run_logged(input: &Path, out_dir: &Path, opts: &RunOptions, log: &RunLog) -> Result<Written> {
    let mut doc = DocxDocument::open(input)?;
    let result = process_open_document(&mut doc, input, out_dir, opts, log);
    // released on every path, including failures above
    if let Err(e) = doc.close() {
        log.warn(format!("close {}: {e}", input.display()));
    }
    result
}

fn process_open_document(
    doc: &mut dyn DocumentAccess,
    input: &Path,
    out_dir: &Path,
    opts: &RunOptions,
    log: &RunLog,
) -> Result<Written> {
    let page_count = doc.page_count();
    let start_page = match opts.start_page {
        StartPage::First => 1,
        StartPage::Page(n) => prompt::check_start_page(n, page_count)?,
        StartPage::Ask => prompt::ask_start_page(page_count)?,
    };
    log.info(format!("pages: {page_count}, starting at page {start_page}"));

    let outcome = process_document(doc, &opts.config, start_page, log)?;

    let now = chrono::Local::now();
    let output = if opts.dry_run {
        None
    } else {
        let path = output_docx_path(
            input,
            out_dir,
            opts.config.output.name_style,
            now.naive_local(),
        );
        doc.save_as(&path)?;
        Some(path)
    };

    let report_path = out_dir.join(&opts.config.output.report_name);
    let report = Report {
        document: input.display().to_string(),
        output: output.as_ref().map(|p| p.display().to_string()),
        generated_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        policy: opts.config.scan.report,
        start_page,
        page_count,
        text_sha256: outcome.text_sha256,
        summary: &outcome.summary,
        rows: &outcome.findings,
    };
    write_report(&report_path, &report)?;
    let table_path = out_dir.join(&opts.config.output.table_name);
    write_table(&table_path, &outcome.findings)?;
    log.info(format!(
        "report: {} row(s) -> {}, {}",
        outcome.findings.len(),
        report_path.display(),
        table_path.display()
    ));

    Ok(Written {
        output,
        report: report_path,
        table: table_path,
        summary: outcome.summary,
    })
}
