use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::config::NameStyle;

/// `<stem>_MOD_<YYYYMMDD>.docx` or `<stem>_processed_<YYYYMMDD_HHMMSS>.docx` inside `out_dir`.
pub fn output_docx_path(
    input: &Path,
    out_dir: &Path,
    style: NameStyle,
    now: NaiveDateTime,
) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    let name = match style {
        NameStyle::Date => format!("{stem}_MOD_{}.docx", now.format("%Y%m%d")),
        NameStyle::Timestamp => format!("{stem}_processed_{}.docx", now.format("%Y%m%d_%H%M%S")),
    };
    out_dir.join(name)
}
