pub mod edit;
pub mod package;
pub mod rels;
pub mod scan;
pub mod xml;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::access::{DocumentAccess, UnpairedRepair};
use crate::error::{Error, Result};
use crate::model::{Anchor, Bookmark, GhostAction, Reference};

use self::package::DocxPackage;
use self::rels::{rels_path_for, Relationships};
use self::scan::{scan, Scan, Wrapper};
use self::xml::{parse_xml_part, write_xml_part, XmlPart};

const DEFAULT_MAIN_PART: &str = "word/document.xml";
const PACKAGE_RELS: &str = "_rels/.rels";

/// A `.docx` body held as an event stream, rescanned after every edit.
pub struct DocxDocument {
    package: Option<DocxPackage>,
    part: XmlPart,
    rels: Relationships,
    scan: Scan,
}

impl DocxDocument {
    pub fn open(path: &Path) -> Result<Self> {
        let package = DocxPackage::read(path)?;
        let part_name = match package.entry(PACKAGE_RELS) {
            Some(ent) => Relationships::parse(PACKAGE_RELS, &ent.data)?
                .main_document()
                .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string()),
            None => DEFAULT_MAIN_PART.to_string(),
        };
        let body = package
            .entry(&part_name)
            .ok_or_else(|| Error::open(path, format!("missing {part_name}")))?;
        let part = parse_xml_part(&part_name, &body.data)?;

        let rels_name = rels_path_for(&part_name);
        let rels = match package.entry(&rels_name) {
            Some(ent) => Relationships::parse(&rels_name, &ent.data)?,
            None => Relationships::default(),
        };

        let scan = scan(&part.events, &rels);
        Ok(Self {
            package: Some(package),
            part,
            rels,
            scan,
        })
    }

    /// A document built from a bare body part, without a package to save into.
    pub fn from_document_xml(xml: &[u8], rels: Option<&[u8]>) -> Result<Self> {
        let part = parse_xml_part(DEFAULT_MAIN_PART, xml)?;
        let rels = match rels {
            Some(bytes) => Relationships::parse(&rels_path_for(DEFAULT_MAIN_PART), bytes)?,
            None => Relationships::default(),
        };
        let scan = scan(&part.events, &rels);
        Ok(Self {
            package: None,
            part,
            rels,
            scan,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_body(body: &str) -> Result<Self> {
        Self::from_document_xml(wrap_body(body).as_bytes(), None)
    }

    pub fn part_name(&self) -> &str {
        &self.part.name
    }

    /// Serialized body part in its current state.
    pub fn document_xml(&self) -> Result<Vec<u8>> {
        write_xml_part(&self.part)
    }

    fn replace_events(&mut self, events: Vec<xml::XmlEvent>) {
        self.part.events = events;
        self.scan = scan(&self.part.events, &self.rels);
    }

    fn wrapper_of(&self, reference: &Reference) -> Result<Wrapper> {
        self.scan.wrappers.get(&reference.handle).copied().ok_or_else(|| {
            Error::parse(
                &self.part.name,
                format!("stale reference handle {} ({})", reference.handle, reference.code),
            )
        })
    }
}

#[cfg(test)]
pub(crate) fn wrap_body(body: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            "<w:body>{}</w:body></w:document>"
        ),
        body
    )
}

/// Writes a minimal package around `body` for tests elsewhere in the crate.
#[cfg(test)]
pub(crate) fn write_test_docx(path: &Path, body: &str, rels: Option<&str>) {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let f = std::fs::File::create(path).unwrap();
    let mut zw = zip::ZipWriter::new(f);
    let opts = SimpleFileOptions::default();
    zw.start_file("[Content_Types].xml", opts).unwrap();
    zw.write_all(br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
        .unwrap();
    zw.start_file("_rels/.rels", opts).unwrap();
    zw.write_all(br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#)
        .unwrap();
    zw.start_file("word/document.xml", opts).unwrap();
    zw.write_all(wrap_body(body).as_bytes()).unwrap();
    if let Some(rels) = rels {
        zw.start_file("word/_rels/document.xml.rels", opts).unwrap();
        zw.write_all(rels.as_bytes()).unwrap();
    }
    zw.finish().unwrap();
}

impl DocumentAccess for DocxDocument {
    fn bookmarks(&self) -> Vec<Bookmark> {
        self.scan.bookmarks.clone()
    }

    fn references(&self) -> Vec<Reference> {
        self.scan.references.clone()
    }

    fn text_anchors(&self) -> Vec<Anchor> {
        self.scan.text_anchors.clone()
    }

    fn page_count(&self) -> u32 {
        self.scan.page_count
    }

    fn visible_text(&self) -> String {
        self.scan.visible_text.clone()
    }

    fn strip_wrappers(&mut self, references: &[Reference], action: &GhostAction) -> Result<()> {
        if references.is_empty() {
            return Ok(());
        }
        let wrappers = references
            .iter()
            .map(|r| self.wrapper_of(r))
            .collect::<Result<Vec<_>>>()?;
        let all: Vec<Wrapper> = self.scan.wrappers.values().copied().collect();
        let events = edit::strip_wrappers(&self.part.events, &wrappers, &all, action);
        self.replace_events(events);
        Ok(())
    }

    fn remove_bookmarks(&mut self, bookmarks: &[Bookmark]) -> Result<()> {
        if bookmarks.is_empty() {
            return Ok(());
        }
        let mut starts = Vec::with_capacity(bookmarks.len());
        let mut ids = HashSet::new();
        for bm in bookmarks {
            let live = self
                .scan
                .bookmarks
                .iter()
                .any(|b| b.handle == bm.handle && b.name == bm.name);
            if !live {
                return Err(Error::parse(
                    &self.part.name,
                    format!("stale bookmark handle {} ({})", bm.handle, bm.name),
                ));
            }
            starts.push(bm.handle);
            ids.insert(bm.id.as_str());
        }
        // ids are only unique among live bookmarks, so ends shared with a kept start stay
        let kept_ids: HashSet<&str> = self
            .scan
            .bookmarks
            .iter()
            .filter(|b| !starts.contains(&b.handle))
            .map(|b| b.id.as_str())
            .collect();
        let ends: Vec<usize> = self
            .scan
            .bookmark_ends
            .iter()
            .filter(|e| ids.contains(e.id.as_str()) && !kept_ids.contains(e.id.as_str()))
            .map(|e| e.index)
            .collect();
        let events = edit::remove_bookmark_markers(&self.part.events, &starts, &ends);
        self.replace_events(events);
        Ok(())
    }

    fn repair_unpaired_bookmarks(&mut self) -> Result<UnpairedRepair> {
        let start_ids: HashSet<&str> = self.scan.bookmarks.iter().map(|b| b.id.as_str()).collect();
        let end_ids: HashSet<&str> = self
            .scan
            .bookmark_ends
            .iter()
            .map(|e| e.id.as_str())
            .collect();

        let mut repair = UnpairedRepair::default();
        let mut dropped = Vec::new();
        for e in &self.scan.bookmark_ends {
            if !start_ids.contains(e.id.as_str()) {
                dropped.push(e.index);
                repair.dropped_ends.push(e.id.clone());
            }
        }
        let mut closing: HashMap<usize, String> = HashMap::new();
        for b in &self.scan.bookmarks {
            if !end_ids.contains(b.id.as_str()) {
                closing.insert(b.handle, b.id.clone());
                repair.closed_starts.push(b.name.clone());
            }
        }
        if repair.is_empty() {
            return Ok(repair);
        }

        let mut events = edit::remove_bookmark_markers(&self.part.events, &[], &dropped);
        if !closing.is_empty() {
            // dropped markers all sit elsewhere, so only indices past them shift
            let shifted: Vec<(usize, String)> = closing
                .into_iter()
                .map(|(i, id)| (i - dropped.iter().filter(|&&d| d < i).count(), id))
                .collect();
            events = edit::close_bookmarks(&events, &shifted);
        }
        self.replace_events(events);
        Ok(repair)
    }

    fn save_as(&mut self, path: &Path) -> Result<()> {
        let Some(package) = self.package.as_ref() else {
            return Err(Error::save(path, "document has no package to write into"));
        };
        let mut replacements = HashMap::new();
        replacements.insert(self.part.name.clone(), write_xml_part(&self.part)?);
        package.write_with_replacements(path, &replacements)
    }

    fn close(&mut self) -> Result<()> {
        self.package = None;
        Ok(())
    }
}
