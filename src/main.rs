use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use ghostref::config::{init_default_config, resolve_config, ActionKind};
use ghostref::findings::ReportPolicy;
use ghostref::pipeline::{run, RunOptions, StartPage};

#[derive(Parser, Debug)]
#[command(name = "ghostref")]
#[command(
    about = "Remove broken internal links and unreferenced bookmarks from .docx files, keeping the text",
    long_about = None
)]
struct Args {
    /// Input .docx (prompted when omitted)
    #[arg(value_name = "DOCX")]
    input: Option<PathBuf>,

    /// Directory for the cleaned document, report and log (prompted when omitted)
    #[arg(short, long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Config file path (default: search for ghostref.toml upwards, or set GHOSTREF_CONFIG)
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Write a default ghostref.toml into the current directory, then exit
    #[arg(long)]
    init_config: bool,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long, requires = "init_config")]
    force: bool,

    /// Highlight unwrapped ghost text for review instead of stripping link formatting
    #[arg(long)]
    highlight: bool,

    /// Treat headings and bold/italic/underlined text as valid targets
    #[arg(long)]
    text_anchors: bool,

    /// Report every inspected reference, not only removals
    #[arg(long)]
    report_all: bool,

    /// Skip references before this 1-based page
    #[arg(long, value_name = "N", conflicts_with = "ask_start_page")]
    start_page: Option<u32>,

    /// Prompt for the start page once the page count is known
    #[arg(long)]
    ask_start_page: bool,

    /// Classify and report without writing the cleaned document
    #[arg(long)]
    dry_run: bool,

    /// Do not mirror the log on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init_config {
        let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let (mut config, cfg_path) = resolve_config(args.config.as_deref()).context("load config")?;
    if let Some(p) = cfg_path.as_ref() {
        if !args.quiet {
            eprintln!("Config: {}", p.display());
        }
    }
    if args.highlight {
        config.reconcile.action = ActionKind::Highlight;
    }
    if args.text_anchors {
        config.scan.text_anchors = true;
    }
    if args.report_all {
        config.scan.report = ReportPolicy::All;
    }

    let start_page = match (args.start_page, args.ask_start_page) {
        (Some(n), _) => StartPage::Page(n),
        (None, true) => StartPage::Ask,
        (None, false) => StartPage::First,
    };
    let opts = RunOptions {
        config,
        start_page,
        dry_run: args.dry_run,
        echo: !args.quiet,
    };

    let done = run(args.input, args.out_dir, &opts).context("clean document")?;
    let s = &done.summary;
    eprintln!(
        "{} reference(s) checked: {} valid, {} external, {} cross-reference, {} ghost; removed {} ghost(s), {} orphan bookmark(s)",
        s.references,
        s.valid_internal,
        s.external,
        s.cross_reference,
        s.ghosts,
        s.removed_ghosts,
        s.removed_orphans
    );
    match done.output.as_ref() {
        Some(p) => eprintln!("Output: {}", p.display()),
        None => eprintln!("Dry run: no document written"),
    }
    eprintln!("Report: {}", done.report.display());
    eprintln!("Table: {}", done.table.display());
    eprintln!("Log: {}", done.log.display());
    Ok(())
}
