//! Single pass over `word/document.xml` events collecting everything the core asks for.

use std::collections::HashMap;

use crate::docx::rels::Relationships;
use crate::docx::xml::{attr_text, find_attr, XmlEvent};
use crate::field;
use crate::model::{Anchor, AnchorKind, Bookmark, FieldKind, Location, Reference};

/// Where a reference's wrapper lives in the event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wrapper {
    /// `w:hyperlink` or `w:fldSimple`; `end == start` for an empty element.
    Element { start: usize, end: usize },
    /// `w:fldChar` begin / separate / end markers.
    Complex {
        begin: usize,
        separate: Option<usize>,
        end: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookmarkEnd {
    pub index: usize,
    pub id: String,
}

#[derive(Clone, Debug, Default)]
pub struct Scan {
    pub bookmarks: Vec<Bookmark>,
    pub bookmark_ends: Vec<BookmarkEnd>,
    pub references: Vec<Reference>,
    pub wrappers: HashMap<usize, Wrapper>,
    pub text_anchors: Vec<Anchor>,
    pub page_count: u32,
    pub paragraphs: usize,
    pub visible_text: String,
}

struct ParaState {
    index: usize,
    style: Option<String>,
    outline: bool,
    text: String,
    emphasis: String,
}

struct RunState {
    bold_or_italic: bool,
    underlined: bool,
    highlighted: bool,
    linked: bool,
    text: String,
}

impl RunState {
    /// Underline inside a link or on highlighted text is decoration, not emphasis.
    fn emphasised(&self) -> bool {
        self.bold_or_italic || (self.underlined && !self.linked && !self.highlighted)
    }
}

struct OpenElem {
    start: usize,
    depth: usize,
    kind: FieldKind,
    code: String,
    target: Option<String>,
    location: Location,
    text: String,
}

struct OpenField {
    begin: usize,
    separate: Option<usize>,
    instr: String,
    location: Location,
    text: String,
}

struct Walker<'a> {
    rels: &'a Relationships,
    rendered_breaks: bool,
    stack: Vec<String>,
    page: u32,
    next_para: usize,
    paras: Vec<ParaState>,
    para_texts: Vec<String>,
    runs: Vec<RunState>,
    elems: Vec<OpenElem>,
    fields: Vec<OpenField>,
    open_bookmarks: Vec<(String, usize)>,
    out: Scan,
}

pub fn scan(events: &[XmlEvent], rels: &Relationships) -> Scan {
    let rendered_breaks = events.iter().any(|e| e.is_element("w:lastRenderedPageBreak"));
    let mut w = Walker {
        rels,
        rendered_breaks,
        stack: Vec::new(),
        page: 1,
        next_para: 0,
        paras: Vec::new(),
        para_texts: Vec::new(),
        runs: Vec::new(),
        elems: Vec::new(),
        fields: Vec::new(),
        open_bookmarks: Vec::new(),
        out: Scan::default(),
    };

    for (i, ev) in events.iter().enumerate() {
        match ev {
            XmlEvent::Start { name, attrs } => {
                w.open(i, name, attrs);
                w.stack.push(name.clone());
            }
            XmlEvent::Empty { name, attrs } => {
                w.open(i, name, attrs);
                w.stack.push(name.clone());
                w.stack.pop();
                w.close(i, name);
            }
            XmlEvent::End { name } => {
                w.stack.pop();
                w.close(i, name);
            }
            XmlEvent::Text { text } => match w.stack.last().map(|s| s.as_str()) {
                Some("w:t") => w.display(text),
                Some("w:instrText") => {
                    if let Some(f) = w.fields.last_mut() {
                        if f.separate.is_none() {
                            f.instr.push_str(text);
                        }
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
    w.finish()
}

fn toggle_on(attrs: &[(String, String)]) -> bool {
    !matches!(
        find_attr(attrs, "w:val").map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("0") | Some("false") | Some("off") | Some("none")
    )
}

fn is_heading_style(style: &str) -> bool {
    let lower = style.trim().to_ascii_lowercase();
    if lower == "title" {
        return true;
    }
    lower.starts_with("heading") && lower.chars().any(|c| c.is_ascii_digit())
}

impl Walker<'_> {
    fn location(&self) -> Location {
        let paragraph = self
            .paras
            .last()
            .map(|p| p.index)
            .unwrap_or_else(|| self.next_para.saturating_sub(1));
        Location {
            paragraph,
            page: self.page,
        }
    }

    fn parent(&self) -> &str {
        self.stack.last().map(|s| s.as_str()).unwrap_or("")
    }

    fn grandparent(&self) -> &str {
        let n = self.stack.len();
        if n < 2 {
            return "";
        }
        self.stack[n - 2].as_str()
    }

    fn in_link(&self) -> bool {
        !self.elems.is_empty() || !self.fields.is_empty()
    }

    /// Text is displayed unless some enclosing complex field is still in its instruction part.
    fn displayed(&self) -> bool {
        self.fields.iter().all(|f| f.separate.is_some())
    }

    fn open(&mut self, i: usize, name: &str, attrs: &[(String, String)]) {
        match name {
            "w:p" => {
                let index = self.next_para;
                self.next_para += 1;
                self.paras.push(ParaState {
                    index,
                    style: None,
                    outline: false,
                    text: String::new(),
                    emphasis: String::new(),
                });
            }
            "w:pStyle" if self.parent() == "w:pPr" && self.grandparent() == "w:p" => {
                if let (Some(p), Some(v)) = (self.paras.last_mut(), attr_text(attrs, "w:val")) {
                    p.style = Some(v);
                }
            }
            "w:outlineLvl" if self.parent() == "w:pPr" && self.grandparent() == "w:p" => {
                let lvl = find_attr(attrs, "w:val").and_then(|v| v.trim().parse::<u32>().ok());
                if let (Some(p), Some(lvl)) = (self.paras.last_mut(), lvl) {
                    p.outline = lvl < 9;
                }
            }
            "w:pageBreakBefore" if !self.rendered_breaks && self.parent() == "w:pPr" => {
                let first = self.paras.last().map(|p| p.index == 0).unwrap_or(true);
                if toggle_on(attrs) && !first {
                    self.page += 1;
                }
            }
            "w:lastRenderedPageBreak" if self.rendered_breaks => {
                self.page += 1;
            }
            "w:r" => {
                let linked = self.in_link();
                self.runs.push(RunState {
                    bold_or_italic: false,
                    underlined: false,
                    highlighted: false,
                    linked,
                    text: String::new(),
                });
            }
            "w:b" | "w:i" | "w:u" | "w:highlight"
                if self.parent() == "w:rPr" && self.grandparent() == "w:r" =>
            {
                let on = toggle_on(attrs);
                if let Some(r) = self.runs.last_mut() {
                    match name {
                        "w:u" => r.underlined |= on,
                        "w:highlight" => r.highlighted |= on,
                        _ => r.bold_or_italic |= on,
                    }
                }
            }
            "w:tab" if self.parent() == "w:r" => self.display("\t"),
            "w:cr" if self.parent() == "w:r" => self.display("\n"),
            "w:br" if self.parent() == "w:r" => {
                let page_break = find_attr(attrs, "w:type") == Some("page");
                if page_break && !self.rendered_breaks {
                    self.page += 1;
                }
                self.display("\n");
            }
            "w:hyperlink" => {
                let anchor = attr_text(attrs, "w:anchor").filter(|a| !a.trim().is_empty());
                let url = attr_text(attrs, "r:id")
                    .and_then(|id| self.rels.get(&id))
                    .map(|r| r.target.clone());
                let (depth, location) = (self.stack.len(), self.location());
                self.elems.push(OpenElem {
                    start: i,
                    depth,
                    kind: FieldKind::Hyperlink,
                    code: field::hyperlink_code(url.as_deref(), anchor.as_deref()),
                    target: anchor,
                    location,
                    text: String::new(),
                });
            }
            "w:fldSimple" => {
                let code = attr_text(attrs, "w:instr").unwrap_or_default().trim().to_string();
                let kind = field::kind_of(&code);
                let target = match kind {
                    FieldKind::Hyperlink => field::hyperlink_local_target(&code),
                    _ => None,
                };
                let (depth, location) = (self.stack.len(), self.location());
                self.elems.push(OpenElem {
                    start: i,
                    depth,
                    kind,
                    code,
                    target,
                    location,
                    text: String::new(),
                });
            }
            "w:fldChar" => self.field_char(i, attrs),
            "w:bookmarkStart" => {
                let id = find_attr(attrs, "w:id").unwrap_or("").to_string();
                let name = attr_text(attrs, "w:name").unwrap_or_default();
                let location = self.location();
                self.out.bookmarks.push(Bookmark {
                    handle: i,
                    name,
                    id: id.clone(),
                    location,
                    text: String::new(),
                });
                self.open_bookmarks.push((id, self.out.bookmarks.len() - 1));
            }
            "w:bookmarkEnd" => {
                let id = find_attr(attrs, "w:id").unwrap_or("").to_string();
                self.open_bookmarks.retain(|(open, _)| *open != id);
                self.out.bookmark_ends.push(BookmarkEnd { index: i, id });
            }
            _ => {}
        }
    }

    fn field_char(&mut self, i: usize, attrs: &[(String, String)]) {
        match find_attr(attrs, "w:fldCharType") {
            Some("begin") => {
                let location = self.location();
                self.fields.push(OpenField {
                    begin: i,
                    separate: None,
                    instr: String::new(),
                    location,
                    text: String::new(),
                });
            }
            Some("separate") => {
                if let Some(f) = self.fields.last_mut() {
                    f.separate.get_or_insert(i);
                }
            }
            Some("end") => {
                let Some(f) = self.fields.pop() else {
                    return;
                };
                let code = f.instr.trim().to_string();
                let kind = field::kind_of(&code);
                let target_anchor = match kind {
                    FieldKind::Hyperlink => field::hyperlink_local_target(&code),
                    _ => None,
                };
                self.out.wrappers.insert(
                    f.begin,
                    Wrapper::Complex {
                        begin: f.begin,
                        separate: f.separate,
                        end: i,
                    },
                );
                self.out.references.push(Reference {
                    handle: f.begin,
                    field_kind: kind,
                    code,
                    resolved_text: f.text,
                    target_anchor,
                    location: f.location,
                });
            }
            _ => {}
        }
    }

    fn close(&mut self, i: usize, name: &str) {
        match name {
            "w:p" => {
                self.flush_emphasis();
                let Some(p) = self.paras.pop() else {
                    return;
                };
                let heading = p.outline || p.style.as_deref().is_some_and(is_heading_style);
                let trimmed = p.text.trim();
                if heading && !trimmed.is_empty() {
                    self.out.text_anchors.push(Anchor {
                        name: trimmed.to_string(),
                        kind: AnchorKind::Heading,
                        location: Location {
                            paragraph: p.index,
                            page: self.page,
                        },
                    });
                }
                if self.para_texts.len() <= p.index {
                    self.para_texts.resize(p.index + 1, String::new());
                }
                self.para_texts[p.index] = p.text;
                self.out.visible_text.push('\n');
            }
            "w:r" => {
                let Some(r) = self.runs.pop() else {
                    return;
                };
                // wrapper boundaries never split a span
                if r.emphasised() {
                    if let Some(p) = self.paras.last_mut() {
                        p.emphasis.push_str(&r.text);
                    }
                } else if !r.text.trim().is_empty() {
                    self.flush_emphasis();
                }
            }
            "w:hyperlink" | "w:fldSimple" => {
                // the element may have been opened at a shallower stack depth only
                let depth = self.stack.len();
                let Some(pos) = self.elems.iter().rposition(|e| e.depth == depth) else {
                    return;
                };
                let e = self.elems.remove(pos);
                self.out.wrappers.insert(
                    e.start,
                    Wrapper::Element {
                        start: e.start,
                        end: i,
                    },
                );
                self.out.references.push(Reference {
                    handle: e.start,
                    field_kind: e.kind,
                    code: e.code,
                    resolved_text: e.text,
                    target_anchor: e.target,
                    location: e.location,
                });
            }
            _ => {}
        }
    }

    fn display(&mut self, text: &str) {
        let displayed = self.displayed();
        // result text of nested fields belongs to every field whose result region encloses it
        for f in self.fields.iter_mut().rev() {
            if f.separate.is_none() {
                break;
            }
            f.text.push_str(text);
        }
        if !displayed {
            return;
        }
        self.out.visible_text.push_str(text);
        for e in self.elems.iter_mut() {
            e.text.push_str(text);
        }
        if let Some(p) = self.paras.last_mut() {
            p.text.push_str(text);
        }
        if let Some(r) = self.runs.last_mut() {
            r.text.push_str(text);
        }
        for (_, idx) in &self.open_bookmarks {
            if let Some(bm) = self.out.bookmarks.get_mut(*idx) {
                bm.text.push_str(text);
            }
        }
    }

    fn flush_emphasis(&mut self) {
        let location = self.location();
        let Some(p) = self.paras.last_mut() else {
            return;
        };
        let text = std::mem::take(&mut p.emphasis);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        self.out.text_anchors.push(Anchor {
            name: trimmed.to_string(),
            kind: AnchorKind::StyledText,
            location,
        });
    }

    fn finish(mut self) -> Scan {
        for bm in self.out.bookmarks.iter_mut() {
            if bm.text.trim().is_empty() {
                bm.text = self
                    .para_texts
                    .get(bm.location.paragraph)
                    .cloned()
                    .unwrap_or_default();
            }
            bm.text = bm.text.trim().to_string();
        }
        self.out.references.sort_by_key(|r| r.handle);
        self.out.page_count = self.page;
        self.out.paragraphs = self.next_para;
        self.out
    }
}
