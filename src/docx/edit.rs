//! Structural edits on an event stream.
//!
//! Every edit is planned against the original indices and applied in one
//! rebuild, so wrappers and bookmarks removed in the same pass never
//! invalidate each other's positions. Only whole elements are dropped, which
//! keeps the stream balanced.

use std::collections::{BTreeMap, HashSet};

use crate::docx::scan::Wrapper;
use crate::docx::xml::{find_attr, XmlEvent};
use crate::model::GhostAction;

const LINK_COLOR: &str = "0000FF";

/// `w:rPr` children that the schema orders after `w:highlight`.
const AFTER_HIGHLIGHT: &[&str] = &[
    "w:u",
    "w:effect",
    "w:bdr",
    "w:shd",
    "w:fitText",
    "w:vertAlign",
    "w:rtl",
    "w:cs",
    "w:em",
    "w:lang",
    "w:eastAsianLayout",
    "w:specVanish",
    "w:oMath",
    "w:rPrChange",
];

/// Matching end index and parent of every event.
pub struct Spans {
    end: Vec<usize>,
    parent: Vec<Option<usize>>,
}

impl Spans {
    pub fn build(events: &[XmlEvent]) -> Self {
        let mut end: Vec<usize> = (0..events.len()).collect();
        let mut parent: Vec<Option<usize>> = vec![None; events.len()];
        let mut stack: Vec<usize> = Vec::new();
        for (i, ev) in events.iter().enumerate() {
            match ev {
                XmlEvent::Start { .. } => {
                    parent[i] = stack.last().copied();
                    stack.push(i);
                }
                XmlEvent::End { .. } => {
                    if let Some(s) = stack.pop() {
                        end[s] = i;
                    }
                    parent[i] = stack.last().copied();
                }
                _ => parent[i] = stack.last().copied(),
            }
        }
        let last = events.len().saturating_sub(1);
        for s in stack {
            end[s] = last;
        }
        Self { end, parent }
    }

    pub fn end(&self, i: usize) -> usize {
        self.end[i]
    }

    pub fn children(&self, i: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut j = i + 1;
        while j < self.end[i] {
            if self.parent[j] == Some(i) {
                out.push(j);
            }
            j = self.end[j] + 1;
        }
        out
    }

    /// Innermost ancestor (or self) named `name`.
    pub fn enclosing(&self, events: &[XmlEvent], i: usize, name: &str) -> Option<usize> {
        let mut cur = Some(i);
        while let Some(c) = cur {
            if events[c].is_element(name) {
                return Some(c);
            }
            cur = self.parent[c];
        }
        None
    }
}

#[derive(Default)]
struct Plan {
    drop: HashSet<usize>,
    inserts: BTreeMap<usize, Vec<XmlEvent>>,
}

impl Plan {
    fn drop_element(&mut self, spans: &Spans, i: usize) {
        self.drop.extend(i..=spans.end(i));
    }

    fn insert_before(&mut self, i: usize, events: Vec<XmlEvent>) {
        self.inserts.entry(i).or_default().extend(events);
    }

    fn apply(mut self, events: &[XmlEvent]) -> Vec<XmlEvent> {
        let mut out = Vec::with_capacity(events.len());
        for (i, ev) in events.iter().enumerate() {
            if let Some(ins) = self.inserts.remove(&i) {
                out.extend(ins);
            }
            if !self.drop.contains(&i) {
                out.push(ev.clone());
            }
        }
        for (_, ins) in self.inserts {
            out.extend(ins);
        }
        out
    }
}

fn run_starts_in(events: &[XmlEvent], from: usize, to: usize) -> Vec<usize> {
    (from..to.min(events.len()))
        .filter(|&j| events[j].is_element("w:r"))
        .collect()
}

/// True when everything but the run properties of `run` is planned for removal.
fn run_left_empty(events: &[XmlEvent], spans: &Spans, plan: &Plan, run: usize) -> bool {
    spans.children(run).into_iter().all(|c| {
        plan.drop.contains(&c)
            || events[c].is_element("w:rPr")
            || matches!(&events[c], XmlEvent::Text { text } if text.trim().is_empty())
    })
}

fn unwrap_complex(
    events: &[XmlEvent],
    spans: &Spans,
    plan: &mut Plan,
    begin: usize,
    separate: Option<usize>,
    end: usize,
) -> Vec<usize> {
    let instr_end = separate.unwrap_or(end);
    let markers: Vec<usize> = [Some(begin), separate, Some(end)].into_iter().flatten().collect();
    for &m in &markers {
        plan.drop_element(spans, m);
    }
    // instruction runs, including any field nested inside the instruction
    for r in run_starts_in(events, begin + 1, instr_end) {
        if spans.end(r) < instr_end {
            plan.drop_element(spans, r);
        }
    }
    for j in begin..instr_end {
        if events[j].is_element("w:instrText") || events[j].is_element("w:delInstrText") {
            plan.drop_element(spans, j);
        }
    }
    for &m in &markers {
        if let Some(run) = spans.enclosing(events, m, "w:r") {
            if run_left_empty(events, spans, plan, run) {
                plan.drop_element(spans, run);
            }
        }
    }
    let Some(s) = separate else {
        return Vec::new();
    };
    let mut result_runs: Vec<usize> = spans.enclosing(events, s, "w:r").into_iter().collect();
    result_runs.extend(run_starts_in(events, s + 1, end));
    result_runs
}

/// Event range a wrapper covers, markers included.
fn bounds(w: &Wrapper) -> (usize, usize) {
    match *w {
        Wrapper::Element { start, end } => (start, end),
        Wrapper::Complex { begin, end, .. } => (begin, end),
    }
}

/// Where a run sits for wrapper membership: its first field marker if it holds one.
fn run_position(events: &[XmlEvent], spans: &Spans, run: usize) -> usize {
    (run + 1..spans.end(run))
        .find(|&j| events[j].is_element("w:fldChar"))
        .unwrap_or(run)
}

/// Opening index of the innermost wrapper covering `pos`.
fn innermost(all: &[Wrapper], pos: usize) -> Option<usize> {
    all.iter()
        .map(bounds)
        .filter(|&(open, close)| open <= pos && pos <= close)
        .map(|(open, _)| open)
        .max()
}

fn strip_link_decoration(events: &[XmlEvent], spans: &Spans, plan: &mut Plan, run: usize) {
    let Some(rpr) = spans.children(run).into_iter().find(|&c| events[c].is_element("w:rPr")) else {
        return;
    };
    for c in spans.children(rpr) {
        let is_link_color = events[c].is_element("w:color")
            && find_attr(events[c].attrs(), "w:val")
                .is_some_and(|v| v.eq_ignore_ascii_case(LINK_COLOR));
        if is_link_color || events[c].is_element("w:u") {
            plan.drop_element(spans, c);
        }
    }
}

fn add_highlight(events: &[XmlEvent], spans: &Spans, plan: &mut Plan, run: usize, color: &str) {
    let highlight = XmlEvent::empty("w:highlight", &[("w:val", color)]);
    if matches!(events[run], XmlEvent::Empty { .. }) {
        return;
    }
    let rpr = spans.children(run).into_iter().find(|&c| events[c].is_element("w:rPr"));
    match rpr {
        None => plan.insert_before(
            run + 1,
            vec![XmlEvent::start("w:rPr"), highlight, XmlEvent::end("w:rPr")],
        ),
        Some(rpr) if matches!(events[rpr], XmlEvent::Empty { .. }) => {
            plan.drop_element(spans, rpr);
            plan.insert_before(
                rpr,
                vec![
                    XmlEvent::Start {
                        name: "w:rPr".to_string(),
                        attrs: events[rpr].attrs().to_vec(),
                    },
                    highlight,
                    XmlEvent::end("w:rPr"),
                ],
            );
        }
        Some(rpr) => {
            let children = spans.children(rpr);
            for &c in &children {
                if events[c].is_element("w:highlight") {
                    plan.drop_element(spans, c);
                }
            }
            let at = children
                .iter()
                .copied()
                .find(|&c| {
                    events[c]
                        .element_name()
                        .is_some_and(|n| AFTER_HIGHLIGHT.contains(&n))
                })
                .unwrap_or_else(|| spans.end(rpr));
            plan.insert_before(at, vec![highlight]);
        }
    }
}

/// Removes the given wrappers, keeping their displayed runs in place.
///
/// `all` lists every wrapper in the part. A run is freed, and loses or gains
/// decoration, only when the wrapper being removed is its innermost one;
/// runs of a nested wrapper that stays are left as they are.
pub fn strip_wrappers(
    events: &[XmlEvent],
    wrappers: &[Wrapper],
    all: &[Wrapper],
    action: &GhostAction,
) -> Vec<XmlEvent> {
    let spans = Spans::build(events);
    let mut plan = Plan::default();
    let mut freed: Vec<usize> = Vec::new();

    for w in wrappers {
        let candidates = match *w {
            Wrapper::Element { start, end } => {
                plan.drop.insert(start);
                plan.drop.insert(end);
                run_starts_in(events, start + 1, end)
            }
            Wrapper::Complex {
                begin,
                separate,
                end,
            } => unwrap_complex(events, &spans, &mut plan, begin, separate, end),
        };
        let own = bounds(w).0;
        freed.extend(
            candidates
                .into_iter()
                .filter(|&r| innermost(all, run_position(events, &spans, r)) == Some(own)),
        );
    }

    let mut seen = HashSet::new();
    for run in freed {
        if plan.drop.contains(&run) || !seen.insert(run) {
            continue;
        }
        match action {
            GhostAction::Strip => strip_link_decoration(events, &spans, &mut plan, run),
            GhostAction::Highlight { color } => {
                add_highlight(events, &spans, &mut plan, run, color)
            }
        }
    }

    plan.apply(events)
}

/// Drops bookmark starts and every end marker carrying one of `end_ids`.
pub fn remove_bookmark_markers(
    events: &[XmlEvent],
    starts: &[usize],
    ends: &[usize],
) -> Vec<XmlEvent> {
    let spans = Spans::build(events);
    let mut plan = Plan::default();
    for &i in starts.iter().chain(ends) {
        plan.drop_element(&spans, i);
    }
    plan.apply(events)
}

/// Adds a collapsed `w:bookmarkEnd` right after each `(start index, id)`.
pub fn close_bookmarks(events: &[XmlEvent], starts: &[(usize, String)]) -> Vec<XmlEvent> {
    let spans = Spans::build(events);
    let mut plan = Plan::default();
    for (i, id) in starts {
        plan.insert_before(
            spans.end(*i) + 1,
            vec![XmlEvent::empty("w:bookmarkEnd", &[("w:id", id.as_str())])],
        );
    }
    plan.apply(events)
}
