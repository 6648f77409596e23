//! Field instruction parsing (`HYPERLINK`, `REF`, `SEQ`, ...).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::FieldKind;

static ABSOLUTE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\b[a-z][a-z0-9+.\-]*://\S|\bmailto:\S)").expect("absolute url regex")
});

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)"|(\S+)"#).expect("field token regex"));

/// Splits an instruction into tokens, honoring double quotes.
pub fn tokens(code: &str) -> Vec<String> {
    TOKEN_RE
        .captures_iter(code)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Upper-cased first token of the instruction.
pub fn keyword(code: &str) -> String {
    code.split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase()
}

pub fn kind_of(code: &str) -> FieldKind {
    match keyword(code).as_str() {
        "HYPERLINK" => FieldKind::Hyperlink,
        "REF" | "PAGEREF" | "NOTEREF" => FieldKind::CrossReference,
        "SEQ" => FieldKind::Sequence,
        _ => FieldKind::Other,
    }
}

pub fn is_ref_family(code: &str) -> bool {
    matches!(keyword(code).as_str(), "REF" | "PAGEREF" | "NOTEREF")
}

/// Bookmark name a `REF`/`PAGEREF`/`NOTEREF` instruction points at.
pub fn ref_target(code: &str) -> Option<String> {
    if !is_ref_family(code) {
        return None;
    }
    tokens(code)
        .into_iter()
        .skip(1)
        .find(|t| !t.starts_with('\\'))
        .filter(|t| !t.is_empty())
}

/// Local target of `HYPERLINK \l "name"`.
pub fn hyperlink_local_target(code: &str) -> Option<String> {
    if keyword(code) != "HYPERLINK" {
        return None;
    }
    let toks = tokens(code);
    let pos = toks.iter().position(|t| t.eq_ignore_ascii_case("\\l"))?;
    toks.get(pos + 1).filter(|t| !t.is_empty()).cloned()
}

pub fn has_absolute_url(code: &str) -> bool {
    ABSOLUTE_URL_RE.is_match(code)
}

/// Instruction equivalent of a `w:hyperlink` element.
pub fn hyperlink_code(url: Option<&str>, anchor: Option<&str>) -> String {
    let mut code = String::from("HYPERLINK");
    if let Some(u) = url {
        code.push_str(&format!(" \"{u}\""));
    }
    if let Some(a) = anchor.filter(|a| !a.is_empty()) {
        code.push_str(&format!(" \\l \"{a}\""));
    }
    code
}
