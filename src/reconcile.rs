//! Ghost removal and orphan-bookmark sweep.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::access::{DocumentAccess, UnpairedRepair};
use crate::anchors::AnchorIndex;
use crate::error::{Error, Result};
use crate::field;
use crate::findings::FindingRecorder;
use crate::model::{Bookmark, Classification, GhostAction, Reference};
use crate::runlog::RunLog;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub removed_ghosts: usize,
    pub removed_orphans: usize,
    pub repair: UnpairedRepair,
    /// Digest of the displayed text, identical before and after.
    pub text_sha256: String,
}

pub fn text_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();
    if !pattern.contains('*') {
        return pattern == text;
    }
    let segs: Vec<&str> = pattern.split('*').collect();
    let first = segs[0];
    let last = segs[segs.len() - 1];
    if text.len() < first.len() + last.len() || !text.starts_with(first) || !text.ends_with(last) {
        return false;
    }
    let mut rest = &text[first.len()..text.len() - last.len()];
    for seg in &segs[1..segs.len() - 1] {
        if seg.is_empty() {
            continue;
        }
        match rest.find(seg) {
            Some(pos) => rest = &rest[pos + seg.len()..],
            None => return false,
        }
    }
    true
}

pub struct Reconciler<'a> {
    action: GhostAction,
    preserve_bookmarks: Vec<String>,
    log: &'a RunLog,
}

impl<'a> Reconciler<'a> {
    pub fn new(action: GhostAction, preserve_bookmarks: &[String], log: &'a RunLog) -> Self {
        Self {
            action,
            preserve_bookmarks: preserve_bookmarks
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            log,
        }
    }

    fn preserved(&self, name: &str) -> bool {
        self.preserve_bookmarks.iter().any(|p| wildcard_match(p, name))
    }

    /// Strips every ghost, then sweeps bookmarks no remaining reference targets.
    ///
    /// Orphans are computed from a fresh enumeration taken after the ghosts
    /// are gone, so a bookmark only targeted by a ghost goes in the same pass.
    pub fn reconcile(
        &self,
        doc: &mut dyn DocumentAccess,
        classified: &[(Reference, Classification)],
        index: &mut AnchorIndex,
        recorder: &mut FindingRecorder,
    ) -> Result<ReconcileOutcome> {
        let before = doc.visible_text();

        let ghosts: Vec<Reference> = classified
            .iter()
            .filter(|(_, c)| *c == Classification::Ghost)
            .map(|(r, _)| r.clone())
            .collect();
        if !ghosts.is_empty() {
            doc.strip_wrappers(&ghosts, &self.action)?;
            for g in &ghosts {
                self.log.info(format!(
                    "removed ghost {:?} ({}) at {}",
                    g.resolved_text.trim(),
                    g.code,
                    g.location
                ));
            }
        }

        let keep = referenced_targets(&doc.references());
        let orphans: Vec<Bookmark> = doc
            .bookmarks()
            .into_iter()
            .filter(|b| !keep.contains(&b.name.trim().to_lowercase()))
            .filter(|b| {
                let preserved = self.preserved(&b.name);
                if preserved {
                    self.log.info(format!("kept unreferenced bookmark {:?} (preserved)", b.name));
                }
                !preserved
            })
            .collect();
        doc.remove_bookmarks(&orphans)?;
        for b in &orphans {
            index.remove_bookmark(&b.name);
            recorder.record_bookmark(b);
            self.log.info(format!("removed orphan bookmark {:?} at {}", b.name, b.location));
        }

        let repair = doc.repair_unpaired_bookmarks()?;
        for id in &repair.dropped_ends {
            self.log.warn(format!("dropped bookmark end without start (id {id})"));
        }
        for name in &repair.closed_starts {
            self.log.warn(format!("closed bookmark {name:?} that had no end marker"));
        }

        let after = doc.visible_text();
        let (before_sha, after_sha) = (text_digest(&before), text_digest(&after));
        if before_sha != after_sha {
            return Err(Error::TextAltered {
                part: "document body".to_string(),
                before: before_sha,
                after: after_sha,
            });
        }

        Ok(ReconcileOutcome {
            removed_ghosts: ghosts.len(),
            removed_orphans: orphans.len(),
            repair,
            text_sha256: after_sha,
        })
    }
}

/// Lower-cased names still targeted: hyperlink anchors, REF targets and REF result text.
fn referenced_targets(references: &[Reference]) -> HashSet<String> {
    let mut keep = HashSet::new();
    for r in references {
        if let Some(t) = r.target() {
            keep.insert(t.trim().to_lowercase());
        }
        if field::is_ref_family(&r.code) {
            let text = r.resolved_text.trim().to_lowercase();
            if !text.is_empty() {
                keep.insert(text);
            }
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::access::{FieldRefresh, RefreshOutcome};
    use crate::classify::Classifier;
    use crate::docx::DocxDocument;
    use crate::findings::ReportPolicy;
    use crate::model::{Anchor, FieldKind, FindingKind, Location};

    fn run_pass(doc: &mut dyn DocumentAccess, log: &RunLog) -> (ReconcileOutcome, FindingRecorder) {
        pass_with(doc, log, false, GhostAction::Strip)
    }

    fn pass_with(
        doc: &mut dyn DocumentAccess,
        log: &RunLog,
        text_anchors: bool,
        action: GhostAction,
    ) -> (ReconcileOutcome, FindingRecorder) {
        let mut index = AnchorIndex::build(doc, text_anchors);
        let classifier = Classifier::new(&[], log);
        let refs = doc.references();
        let mut classified = Vec::new();
        for r in refs {
            let v = classifier.classify(&r, &index, doc.field_refresh());
            classified.push((r, v.classification));
        }
        let mut recorder = FindingRecorder::new(ReportPolicy::Removed);
        let out = Reconciler::new(action, &[], log)
            .reconcile(doc, &classified, &mut index, &mut recorder)
            .unwrap();
        (out, recorder)
    }

    fn highlight() -> GhostAction {
        GhostAction::Highlight {
            color: "yellow".to_string(),
        }
    }

    fn xml(doc: &DocxDocument) -> String {
        String::from_utf8(doc.document_xml().unwrap()).unwrap()
    }

    const MIXED: &str = r#"<w:p><w:bookmarkStart w:id="1" w:name="sec1"/><w:r><w:t>Section 1</w:t></w:r><w:bookmarkEnd w:id="1"/></w:p>
<w:p><w:bookmarkStart w:id="2" w:name="figA"/><w:r><w:t>Figure A</w:t></w:r><w:bookmarkEnd w:id="2"/></w:p>
<w:p><w:bookmarkStart w:id="3" w:name="only_ghost"/><w:r><w:t>Lonely</w:t></w:r><w:bookmarkEnd w:id="3"/></w:p>
<w:p><w:hyperlink w:anchor="sec1"><w:r><w:rPr><w:color w:val="0000FF"/><w:u w:val="single"/></w:rPr><w:t>Go to 1</w:t></w:r></w:hyperlink></w:p>
<w:p><w:hyperlink w:anchor="sec9"><w:r><w:rPr><w:b/><w:color w:val="0000FF"/><w:u w:val="single"/></w:rPr><w:t>See Section 9</w:t></w:r></w:hyperlink></w:p>
<w:p><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText> HYPERLINK \l "only_ghost_typo" </w:instrText></w:r><w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>typo link</w:t></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>
<w:p><w:fldSimple w:instr=" HYPERLINK &quot;https://example.com&quot; "><w:r><w:t>site</w:t></w:r></w:fldSimple><w:fldSimple w:instr=" SEQ Figure \* ARABIC "><w:r><w:t>1</w:t></w:r></w:fldSimple></w:p>"#;

    #[test]
    fn ghosts_are_unwrapped_and_orphans_swept() {
        let log = RunLog::capturing();
        let mut doc = DocxDocument::from_body(MIXED).unwrap();
        let before = doc.visible_text();
        let (out, rec) = run_pass(&mut doc, &log);

        assert_eq!(out.removed_ghosts, 2);
        // neither figA nor only_ghost is the target of a surviving reference
        assert_eq!(out.removed_orphans, 2);
        assert_eq!(out.text_sha256, text_digest(&before));
        assert_eq!(doc.visible_text(), before);

        let names: Vec<String> = doc.bookmarks().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["sec1".to_string()]);
        let s = xml(&doc);
        assert!(!s.contains("figA"));
        assert!(!s.contains("w:anchor=\"sec9\""));
        assert!(s.contains(r#"<w:r><w:rPr><w:b/></w:rPr><w:t>See Section 9</w:t></w:r>"#));
        assert!(s.contains("w:anchor=\"sec1\""));
        assert!(s.contains("https://example.com"));
        assert!(s.contains("SEQ Figure"));

        assert_eq!(rec.count(FindingKind::Ghost), 0);
        assert_eq!(rec.count(FindingKind::OrphanBookmark), 2);
        assert!(log.lines().iter().any(|l| l.contains("removed ghost \"See Section 9\"")));
    }

    /// Bold text run straight into a ghost link, plus REF fields matched by result text.
    const EMPHASIS: &str = r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Key Term</w:t></w:r><w:hyperlink w:anchor="gone"><w:r><w:rPr><w:b/><w:u w:val="single"/></w:rPr><w:t>X</w:t></w:r></w:hyperlink></w:p>
<w:p><w:r><w:rPr><w:i/></w:rPr><w:t>Glossary</w:t></w:r><w:r><w:t> and </w:t></w:r><w:hyperlink w:anchor="lost"><w:r><w:rPr><w:u w:val="single"/></w:rPr><w:t>Y</w:t></w:r></w:hyperlink><w:r><w:rPr><w:b/></w:rPr><w:t>Z</w:t></w:r></w:p>
<w:p><w:fldSimple w:instr=" REF _Missing \h "><w:r><w:t>Key Term</w:t></w:r></w:fldSimple><w:fldSimple w:instr=" REF _Gone \h "><w:r><w:t>Glossary</w:t></w:r></w:fldSimple></w:p>"#;

    #[test]
    fn second_pass_changes_nothing() {
        let log = RunLog::disabled();
        for body in [MIXED, EMPHASIS] {
            for text_anchors in [false, true] {
                for action in [GhostAction::Strip, highlight()] {
                    let mut doc = DocxDocument::from_body(body).unwrap();
                    pass_with(&mut doc, &log, text_anchors, action.clone());
                    let once = xml(&doc);
                    let (out, rec) = pass_with(&mut doc, &log, text_anchors, action.clone());
                    let case = format!("text_anchors={text_anchors} action={action:?}");
                    assert_eq!(out.removed_ghosts, 0, "{case}");
                    assert_eq!(out.removed_orphans, 0, "{case}");
                    assert!(out.repair.is_empty(), "{case}");
                    assert!(rec.is_empty(), "{case}");
                    assert_eq!(xml(&doc), once, "{case}");
                }
            }
        }
    }

    #[test]
    fn emphasis_next_to_a_ghost_link_is_one_anchor() {
        let log = RunLog::disabled();
        let mut doc = DocxDocument::from_body(EMPHASIS).unwrap();
        let index = AnchorIndex::build(&doc, true);
        assert!(index.contains("key termx"));
        assert!(!index.contains("key term"));

        let (out, _) = pass_with(&mut doc, &log, true, GhostAction::Strip);
        // both links plus the REF whose text matches no anchor
        assert_eq!(out.removed_ghosts, 3);
        let left: Vec<String> = doc.references().into_iter().map(|r| r.code).collect();
        assert_eq!(left, vec!["REF _Gone \\h".to_string()]);
        assert!(AnchorIndex::build(&doc, true).contains("key termx"));
    }

    #[test]
    fn valid_link_inside_a_ghost_field_keeps_its_formatting() {
        let log = RunLog::disabled();
        let mut doc = DocxDocument::from_body(
            r#"<w:p><w:bookmarkStart w:id="1" w:name="sec1"/><w:r><w:t>Section 1</w:t></w:r><w:bookmarkEnd w:id="1"/></w:p>
<w:p><w:fldSimple w:instr=" TOC \o &quot;1-3&quot; "><w:hyperlink w:anchor="sec1"><w:r><w:rPr><w:color w:val="0000FF"/><w:u/></w:rPr><w:t>Go</w:t></w:r></w:hyperlink></w:fldSimple></w:p>"#,
        )
        .unwrap();
        let (out, _) = run_pass(&mut doc, &log);
        assert_eq!(out.removed_ghosts, 1);
        assert_eq!(out.removed_orphans, 0);
        let s = xml(&doc);
        assert!(!s.contains("w:fldSimple"));
        assert!(s.contains(
            r#"<w:hyperlink w:anchor="sec1"><w:r><w:rPr><w:color w:val="0000FF"/><w:u/></w:rPr><w:t>Go</w:t></w:r></w:hyperlink>"#
        ));
    }

    #[test]
    fn no_unpaired_markers_survive() {
        let log = RunLog::disabled();
        let mut doc = DocxDocument::from_body(
            r#"<w:p><w:bookmarkEnd w:id="9"/><w:bookmarkStart w:id="4" w:name="kept"/><w:r><w:t>a</w:t></w:r><w:bookmarkStart w:id="5" w:name="dangling"/><w:r><w:t>b</w:t></w:r></w:p>
<w:p><w:fldSimple w:instr=" REF kept \h "><w:r><w:t>a</w:t></w:r></w:fldSimple></w:p>"#,
        )
        .unwrap();
        let (out, _) = run_pass(&mut doc, &log);
        assert_eq!(out.removed_orphans, 1);
        assert_eq!(out.repair.dropped_ends, vec!["9".to_string()]);
        assert_eq!(out.repair.closed_starts, vec!["kept".to_string()]);

        let s = xml(&doc);
        assert_eq!(s.matches("w:bookmarkStart").count(), 1);
        assert_eq!(s.matches("w:bookmarkEnd").count(), 1);
        assert!(s.contains(
            r#"<w:bookmarkStart w:id="4" w:name="kept"/><w:bookmarkEnd w:id="4"/>"#
        ));
    }

    #[test]
    fn preserved_bookmarks_survive_the_sweep() {
        let log = RunLog::disabled();
        let mut doc = DocxDocument::from_body(
            r#"<w:p><w:bookmarkStart w:id="0" w:name="_GoBack"/><w:bookmarkEnd w:id="0"/><w:bookmarkStart w:id="1" w:name="_Toc123"/><w:r><w:t>x</w:t></w:r><w:bookmarkEnd w:id="1"/></w:p>"#,
        )
        .unwrap();
        let mut index = AnchorIndex::build(&doc, false);
        let mut rec = FindingRecorder::default();
        let out = Reconciler::new(GhostAction::Strip, &["_toc*".to_string()], &log)
            .reconcile(&mut doc, &[], &mut index, &mut rec)
            .unwrap();
        assert_eq!(out.removed_orphans, 1);
        assert!(index.contains("_Toc123"));
        assert!(!index.contains("_GoBack"));
    }

    #[test]
    fn highlight_action_marks_freed_runs() {
        let log = RunLog::disabled();
        let mut doc = DocxDocument::from_body(
            r#"<w:p><w:hyperlink w:anchor="gone"><w:r><w:rPr><w:u w:val="single"/></w:rPr><w:t>old link</w:t></w:r></w:hyperlink></w:p>"#,
        )
        .unwrap();
        let refs = doc.references();
        let classified = vec![(refs[0].clone(), Classification::Ghost)];
        let mut index = AnchorIndex::default();
        let mut rec = FindingRecorder::default();
        let action = GhostAction::Highlight {
            color: "yellow".to_string(),
        };
        Reconciler::new(action, &[], &log)
            .reconcile(&mut doc, &classified, &mut index, &mut rec)
            .unwrap();
        assert!(xml(&doc).contains(
            r#"<w:r><w:rPr><w:highlight w:val="yellow"/><w:u w:val="single"/></w:rPr><w:t>old link</w:t></w:r>"#
        ));
    }

    #[test]
    fn highlight_action_on_complex_fields() {
        let log = RunLog::disabled();
        let mut doc = DocxDocument::from_body(MIXED).unwrap();
        let (out, _) = pass_with(&mut doc, &log, false, highlight());
        assert_eq!(out.removed_ghosts, 2);
        let s = xml(&doc);
        assert!(!s.contains("only_ghost_typo"));
        assert!(s.contains(
            r#"<w:r><w:rPr><w:highlight w:val="yellow"/></w:rPr><w:t>typo link</w:t></w:r>"#
        ));
        assert!(s.contains(
            r#"<w:rPr><w:b/><w:color w:val="0000FF"/><w:highlight w:val="yellow"/><w:u w:val="single"/></w:rPr><w:t>See Section 9</w:t>"#
        ));
        // the surviving link and fields are untouched
        assert_eq!(s.matches("w:highlight").count(), 2);
    }

    #[test]
    fn wildcard_patterns() {
        assert!(wildcard_match("_Toc*", "_toc4711"));
        assert!(wildcard_match("*keep*", "do_KEEP_this"));
        assert!(wildcard_match("a*c", "abc"));
        assert!(!wildcard_match("a*c", "abd"));
        assert!(!wildcard_match("ab*b", "ab"));
        assert!(wildcard_match("exact", "EXACT"));
    }

    /// In-memory host with a live field engine.
    struct LiveDocument {
        bookmarks: Vec<Bookmark>,
        references: Vec<Reference>,
        text: String,
        engine: CountingRefresh,
    }

    struct CountingRefresh {
        calls: usize,
    }

    impl FieldRefresh for CountingRefresh {
        fn refresh(&mut self, r: &Reference) -> Result<RefreshOutcome> {
            self.calls += 1;
            if r.code.starts_with("DOCPROPERTY") {
                return Ok(RefreshOutcome::Changed {
                    before: r.resolved_text.clone(),
                    after: "Quarterly".to_string(),
                });
            }
            Ok(RefreshOutcome::Unchanged)
        }
    }

    impl DocumentAccess for LiveDocument {
        fn bookmarks(&self) -> Vec<Bookmark> {
            self.bookmarks.clone()
        }
        fn references(&self) -> Vec<Reference> {
            self.references.clone()
        }
        fn text_anchors(&self) -> Vec<Anchor> {
            Vec::new()
        }
        fn page_count(&self) -> u32 {
            1
        }
        fn visible_text(&self) -> String {
            self.text.clone()
        }
        fn strip_wrappers(&mut self, references: &[Reference], _: &GhostAction) -> Result<()> {
            self.references.retain(|r| !references.iter().any(|g| g.handle == r.handle));
            Ok(())
        }
        fn remove_bookmarks(&mut self, bookmarks: &[Bookmark]) -> Result<()> {
            self.bookmarks.retain(|b| !bookmarks.iter().any(|o| o.handle == b.handle));
            Ok(())
        }
        fn repair_unpaired_bookmarks(&mut self) -> Result<UnpairedRepair> {
            Ok(UnpairedRepair::default())
        }
        fn field_refresh(&mut self) -> Option<&mut dyn FieldRefresh> {
            Some(&mut self.engine as &mut dyn FieldRefresh)
        }
        fn save_as(&mut self, _: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn live_ref(handle: usize, code: &str, anchor: Option<&str>) -> Reference {
        Reference {
            handle,
            field_kind: crate::field::kind_of(code),
            code: code.to_string(),
            resolved_text: "text".to_string(),
            target_anchor: anchor.map(str::to_string),
            location: Location { paragraph: handle, page: 1 },
        }
    }

    #[test]
    fn core_runs_against_a_live_host() {
        let log = RunLog::disabled();
        let mut doc = LiveDocument {
            bookmarks: vec![Bookmark {
                handle: 0,
                name: "target".to_string(),
                id: "0".to_string(),
                location: Location::default(),
                text: String::new(),
            }],
            references: vec![
                live_ref(1, "DOCPROPERTY Title", None),
                live_ref(2, "HYPERLINK \\l \"target\"", Some("target")),
                live_ref(3, "PAGE", None),
            ],
            text: "unchanged".to_string(),
            engine: CountingRefresh { calls: 0 },
        };
        let (out, _) = run_pass(&mut doc, &log);
        // only PAGE is unrecognized and unchanged by refresh
        assert_eq!(out.removed_ghosts, 1);
        assert_eq!(out.removed_orphans, 0);
        assert_eq!(doc.references.len(), 2);
        assert_eq!(doc.references[0].field_kind, FieldKind::Other);
        assert_eq!(doc.engine.calls, 2);
    }

    #[test]
    fn altered_text_aborts() {
        struct Lossy(LiveDocument);
        impl DocumentAccess for Lossy {
            fn bookmarks(&self) -> Vec<Bookmark> {
                self.0.bookmarks()
            }
            fn references(&self) -> Vec<Reference> {
                self.0.references()
            }
            fn text_anchors(&self) -> Vec<Anchor> {
                Vec::new()
            }
            fn page_count(&self) -> u32 {
                1
            }
            fn visible_text(&self) -> String {
                self.0.visible_text()
            }
            fn strip_wrappers(&mut self, references: &[Reference], a: &GhostAction) -> Result<()> {
                self.0.text.pop();
                self.0.strip_wrappers(references, a)
            }
            fn remove_bookmarks(&mut self, bookmarks: &[Bookmark]) -> Result<()> {
                self.0.remove_bookmarks(bookmarks)
            }
            fn repair_unpaired_bookmarks(&mut self) -> Result<UnpairedRepair> {
                Ok(UnpairedRepair::default())
            }
            fn save_as(&mut self, _: &Path) -> Result<()> {
                Ok(())
            }
        }

        let log = RunLog::disabled();
        let mut doc = Lossy(LiveDocument {
            bookmarks: Vec::new(),
            references: vec![live_ref(1, "PAGE", None)],
            text: "abc".to_string(),
            engine: CountingRefresh { calls: 0 },
        });
        let classified = vec![(doc.references()[0].clone(), Classification::Ghost)];
        let err = Reconciler::new(GhostAction::Strip, &[], &log)
            .reconcile(
                &mut doc,
                &classified,
                &mut AnchorIndex::default(),
                &mut FindingRecorder::default(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::TextAltered { .. }));
    }
}
