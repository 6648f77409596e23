use std::collections::HashMap;

use crate::docx::xml::{attr_text, parse_xml_part, XmlEvent};
use crate::error::Result;

const OFFICE_DOCUMENT_TYPE_SUFFIX: &str = "/officeDocument";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub rel_type: String,
    pub target: String,
}

#[derive(Clone, Debug, Default)]
pub struct Relationships {
    by_id: HashMap<String, Relationship>,
}

impl Relationships {
    pub fn parse(name: &str, xml: &[u8]) -> Result<Self> {
        let part = parse_xml_part(name, xml)?;
        let mut by_id = HashMap::new();
        for ev in &part.events {
            let (XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs }) = ev else {
                continue;
            };
            if name != "Relationship" {
                continue;
            }
            let Some(id) = attr_text(attrs, "Id") else {
                continue;
            };
            let rel = Relationship {
                rel_type: attr_text(attrs, "Type").unwrap_or_default(),
                target: attr_text(attrs, "Target").unwrap_or_default(),
            };
            by_id.entry(id).or_insert(rel);
        }
        Ok(Self { by_id })
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.by_id.get(id)
    }

    /// Target of the package-level `officeDocument` relationship, without a leading slash.
    pub fn main_document(&self) -> Option<String> {
        self.by_id
            .values()
            .find(|r| r.rel_type.ends_with(OFFICE_DOCUMENT_TYPE_SUFFIX))
            .map(|r| r.target.trim_start_matches('/').to_string())
    }
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`.
pub fn rels_path_for(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}
