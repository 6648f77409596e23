use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::findings::ReportPolicy;
use crate::model::GhostAction;

pub const CONFIG_FILE_NAME: &str = "ghostref.toml";
pub const CONFIG_ENV_VAR: &str = "GHOSTREF_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub reconcile: ReconcileSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ScanSection {
    /// Also treat headings and bold/italic/underlined text as reference targets.
    #[serde(default)]
    pub text_anchors: bool,
    #[serde(default)]
    pub report: ReportPolicy,
    /// Field keywords (e.g. `TOC`, `PAGE`) that are never classified or stripped.
    #[serde(default)]
    pub exempt_fields: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    #[default]
    Strip,
    Highlight,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReconcileSection {
    #[serde(default)]
    pub action: ActionKind,
    #[serde(default = "default_highlight_color")]
    pub highlight_color: String,
    /// Bookmark names (`*` wildcards, case-insensitive) kept even when unreferenced.
    #[serde(default)]
    pub preserve_bookmarks: Vec<String>,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            action: ActionKind::default(),
            highlight_color: default_highlight_color(),
            preserve_bookmarks: Vec::new(),
        }
    }
}

impl ReconcileSection {
    pub fn ghost_action(&self) -> GhostAction {
        match self.action {
            ActionKind::Strip => GhostAction::Strip,
            ActionKind::Highlight => GhostAction::Highlight {
                color: self.highlight_color.clone(),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameStyle {
    /// `<stem>_MOD_<YYYYMMDD>.docx`
    #[default]
    Date,
    /// `<stem>_processed_<YYYYMMDD_HHMMSS>.docx`
    Timestamp,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OutputSection {
    #[serde(default)]
    pub name_style: NameStyle,
    #[serde(default = "default_report_name")]
    pub report_name: String,
    /// One row per finding, for spreadsheets.
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default = "default_log_name")]
    pub log_name: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            name_style: NameStyle::default(),
            report_name: default_report_name(),
            table_name: default_table_name(),
            log_name: default_log_name(),
        }
    }
}

fn default_highlight_color() -> String {
    "yellow".to_string()
}

fn default_report_name() -> String {
    "ghost_references.json".to_string()
}

fn default_table_name() -> String {
    "ghost_references.csv".to_string()
}

fn default_log_name() -> String {
    "process_log.txt".to_string()
}

/// Word's `w:highlight` accepts only this fixed palette.
const HIGHLIGHT_COLORS: &[&str] = &[
    "black",
    "blue",
    "cyan",
    "darkBlue",
    "darkCyan",
    "darkGray",
    "darkGreen",
    "darkMagenta",
    "darkRed",
    "darkYellow",
    "green",
    "lightGray",
    "magenta",
    "red",
    "white",
    "yellow",
];

impl AppConfig {
    pub fn validate(&mut self) -> Result<()> {
        let color = self.reconcile.highlight_color.trim();
        let Some(canonical) = HIGHLIGHT_COLORS.iter().find(|c| c.eq_ignore_ascii_case(color)) else {
            return Err(Error::Config(format!(
                "highlight_color {color:?} is not one of: {}",
                HIGHLIGHT_COLORS.join(", ")
            )));
        };
        self.reconcile.highlight_color = canonical.to_string();
        for name in [
            &self.output.report_name,
            &self.output.table_name,
            &self.output.log_name,
        ] {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(Error::Config(format!(
                    "output file name {name:?} must be a bare file name"
                )));
            }
        }
        Ok(())
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

/// Current directory first, then the executable's directory, both searched upwards.
pub fn find_default_config() -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, CONFIG_FILE_NAME, 8) {
            return Some(p);
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, CONFIG_FILE_NAME, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
    let mut cfg: AppConfig =
        toml::from_str(&text).map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Explicit path, then `GHOSTREF_CONFIG`, then the upward search. Returns
/// defaults when nothing is found; an explicit path that is missing is an error.
pub fn resolve_config(explicit: Option<&Path>) -> Result<(AppConfig, Option<PathBuf>)> {
    if let Some(p) = explicit {
        return Ok((load_config(p)?, Some(p.to_path_buf())));
    }
    let found = std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .filter(|p| p.is_file())
        .or_else(find_default_config);
    match found {
        Some(p) => Ok((load_config(&p)?, Some(p))),
        None => Ok((AppConfig::default(), None)),
    }
}

pub const DEFAULT_CONFIG_TOML: &str = r#"# ghostref configuration. Command-line flags override these values.

[scan]
# Treat heading paragraphs and bold/italic/underlined text as valid targets too.
text_anchors = false
# "removed": report ghosts and orphan bookmarks; "all": report every inspected reference.
report = "removed"
# Field keywords never classified or stripped, e.g. ["TOC", "PAGE", "NUMPAGES"].
# Unrecognized fields are treated as ghosts unless listed here.
exempt_fields = []

[reconcile]
# "strip": unwrap and remove link color/underline; "highlight": unwrap and mark for review.
action = "strip"
highlight_color = "yellow"
# Bookmarks kept even when nothing references them ("*" wildcards), e.g. ["_Toc*", "_GoBack"].
preserve_bookmarks = []

[output]
# "date": <name>_MOD_<YYYYMMDD>.docx; "timestamp": <name>_processed_<YYYYMMDD_HHMMSS>.docx
name_style = "date"
report_name = "ghost_references.json"
table_name = "ghost_references.csv"
log_name = "process_log.txt"
"#;

/// Writes `ghostref.toml` into `dir`; an existing file is kept unless `force`.
pub fn init_default_config(dir: &Path, force: bool) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| Error::save(dir, e))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML).map_err(|e| Error::save(&cfg_path, e))?;
    Ok(cfg_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert!(!cfg.scan.text_anchors);
        assert_eq!(cfg.scan.report, ReportPolicy::Removed);
        assert_eq!(cfg.reconcile.ghost_action(), GhostAction::Strip);
        assert_eq!(cfg.output.name_style, NameStyle::Date);
        assert_eq!(cfg.output.report_name, "ghost_references.json");
        assert_eq!(cfg.output.table_name, "ghost_references.csv");
        assert_eq!(cfg.output.log_name, "process_log.txt");
    }

    #[test]
    fn default_file_parses_to_defaults() {
        let mut cfg: AppConfig = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.reconcile.highlight_color, "yellow");
        assert!(cfg.scan.exempt_fields.is_empty());
        assert!(cfg.reconcile.preserve_bookmarks.is_empty());
    }

    #[test]
    fn sections_override() {
        let mut cfg: AppConfig = toml::from_str(
            r#"
[scan]
report = "all"
exempt_fields = ["TOC"]
[reconcile]
action = "highlight"
highlight_color = "BRIGHTGREEN"
[output]
name_style = "timestamp"
"#,
        )
        .unwrap();
        assert_eq!(cfg.scan.report, ReportPolicy::All);
        assert_eq!(cfg.output.name_style, NameStyle::Timestamp);
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));

        cfg.reconcile.highlight_color = "DarkRed".to_string();
        cfg.validate().unwrap();
        assert_eq!(
            cfg.reconcile.ghost_action(),
            GhostAction::Highlight {
                color: "darkRed".to_string()
            }
        );
    }

    #[test]
    fn report_name_must_be_a_file_name() {
        let mut cfg = AppConfig::default();
        cfg.output.report_name = "../escape.json".to_string();
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
        let mut cfg = AppConfig::default();
        cfg.output.table_name = "out\\rows.csv".to_string();
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn init_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_default_config(dir.path(), false).unwrap();
        assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));

        std::fs::write(&path, "[scan]\ntext_anchors = true\n").unwrap();
        // kept without force
        init_default_config(dir.path(), false).unwrap();
        assert!(load_config(&path).unwrap().scan.text_anchors);
        init_default_config(dir.path(), true).unwrap();
        assert!(!load_config(&path).unwrap().scan.text_anchors);

        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_file_upwards(&nested, CONFIG_FILE_NAME, 3), Some(path.clone()));
        assert_eq!(find_file_upwards(&nested, CONFIG_FILE_NAME, 1), None);

        let (cfg, used) = resolve_config(Some(&path)).unwrap();
        assert_eq!(used, Some(path));
        assert!(!cfg.scan.text_anchors);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[scan]\nreport = \"sometimes\"\n").unwrap();
        assert!(matches!(load_config(&path), Err(Error::Config(_))));
        assert!(matches!(
            load_config(&dir.path().join("missing.toml")),
            Err(Error::Config(_))
        ));
    }
}
