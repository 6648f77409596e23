//! The narrow surface the core needs from a document host.

use std::path::Path;

use crate::error::Result;
use crate::model::{Anchor, Bookmark, GhostAction, Reference};

/// Result of forcing a field to recompute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Unchanged,
    Changed { before: String, after: String },
}

/// Bookmark markers fixed by [`DocumentAccess::repair_unpaired_bookmarks`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnpairedRepair {
    /// Ids of end markers removed because no start carries them.
    pub dropped_ends: Vec<String>,
    /// Names of bookmarks that received a collapsed end marker.
    pub closed_starts: Vec<String>,
}

impl UnpairedRepair {
    pub fn is_empty(&self) -> bool {
        self.dropped_ends.is_empty() && self.closed_starts.is_empty()
    }
}

/// Live recompute of a field. Only hosts with a running layout engine provide it.
pub trait FieldRefresh {
    fn refresh(&mut self, reference: &Reference) -> Result<RefreshOutcome>;
}

/// Document Access Adapter.
///
/// Enumerations are finite and reflect the current state; handles inside the
/// returned values become stale after any mutating call.
pub trait DocumentAccess {
    fn bookmarks(&self) -> Vec<Bookmark>;

    fn references(&self) -> Vec<Reference>;

    /// Informal anchors: heading paragraphs and emphasised runs outside links.
    fn text_anchors(&self) -> Vec<Anchor>;

    fn page_count(&self) -> u32;

    /// Concatenated displayed text, used to prove reconciliation kept every character.
    fn visible_text(&self) -> String;

    /// Removes the wrappers of all given references in one pass.
    fn strip_wrappers(&mut self, references: &[Reference], action: &GhostAction) -> Result<()>;

    /// Removes each bookmark's start marker together with its paired end marker.
    fn remove_bookmarks(&mut self, bookmarks: &[Bookmark]) -> Result<()>;

    /// Drops end markers without a start and closes starts that lost their end.
    fn repair_unpaired_bookmarks(&mut self) -> Result<UnpairedRepair>;

    fn field_refresh(&mut self) -> Option<&mut dyn FieldRefresh> {
        None
    }

    fn save_as(&mut self, path: &Path) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
