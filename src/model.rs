use std::fmt;

use serde::{Deserialize, Serialize};

/// Field type resolved once at the adapter boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Hyperlink,
    CrossReference,
    Sequence,
    Other,
}

/// Structural position: 0-based body paragraph index and 1-based approximate page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub paragraph: usize,
    pub page: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} paragraph {}", self.page, self.paragraph)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    Bookmark,
    StyledText,
    Heading,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Anchor {
    pub name: String,
    pub kind: AnchorKind,
    pub location: Location,
}

/// A formal named target. `handle` is opaque to everything but the adapter that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bookmark {
    pub handle: usize,
    pub name: String,
    pub id: String,
    pub location: Location,
    /// Text covered by the bookmark, falling back to its paragraph text.
    pub text: String,
}

/// A hyperlink or field instance as seen through the adapter.
///
/// Handles are only valid for the enumeration that produced them; any
/// structural mutation requires a fresh enumeration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub handle: usize,
    pub field_kind: FieldKind,
    pub code: String,
    pub resolved_text: String,
    pub target_anchor: Option<String>,
    pub location: Location,
}

impl Reference {
    /// Target named by the reference: the hyperlink anchor or the REF-family target token.
    pub fn target(&self) -> Option<String> {
        if let Some(a) = self.target_anchor.as_deref().map(str::trim) {
            if !a.is_empty() {
                return Some(a.to_string());
            }
        }
        match self.field_kind {
            FieldKind::CrossReference => crate::field::ref_target(&self.code),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    ValidInternal,
    External,
    CrossReference,
    Ghost,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::ValidInternal => "valid-internal",
            Classification::External => "external",
            Classification::CrossReference => "cross-reference",
            Classification::Ghost => "ghost",
        };
        f.write_str(s)
    }
}

/// What a finding row reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    ValidInternal,
    External,
    CrossReference,
    Ghost,
    OrphanBookmark,
}

impl From<Classification> for FindingKind {
    fn from(c: Classification) -> Self {
        match c {
            Classification::ValidInternal => FindingKind::ValidInternal,
            Classification::External => FindingKind::External,
            Classification::CrossReference => FindingKind::CrossReference,
            Classification::Ghost => FindingKind::Ghost,
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingKind::ValidInternal => Classification::ValidInternal.fmt(f),
            FindingKind::External => Classification::External.fmt(f),
            FindingKind::CrossReference => Classification::CrossReference.fmt(f),
            FindingKind::Ghost => Classification::Ghost.fmt(f),
            FindingKind::OrphanBookmark => f.write_str("orphan-bookmark"),
        }
    }
}

/// How ghost wrappers are removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GhostAction {
    /// Unwrap and drop link color/underline from the freed runs.
    Strip,
    /// Unwrap and mark the freed runs with a highlight for human review.
    Highlight { color: String },
}
