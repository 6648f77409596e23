//! Reference classification. First matching rule wins.

use std::fmt;

use crate::access::{FieldRefresh, RefreshOutcome};
use crate::anchors::AnchorIndex;
use crate::error::Error;
use crate::field;
use crate::model::{Classification, FieldKind, Reference};
use crate::runlog::RunLog;

/// The rule that produced a classification, kept for the decision log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rule {
    AnchorPresent,
    ExternalUrl,
    RefTargetPresent,
    Sequence,
    LiveRefresh,
    MissingTarget,
    Unrecognized,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rule::AnchorPresent => "target anchor present",
            Rule::ExternalUrl => "absolute url",
            Rule::RefTargetPresent => "ref target present",
            Rule::Sequence => "sequence field",
            Rule::LiveRefresh => "refresh changed result",
            Rule::MissingTarget => "missing target",
            Rule::Unrecognized => "unrecognized pattern",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub classification: Classification,
    pub rule: Rule,
}

impl Verdict {
    fn new(classification: Classification, rule: Rule) -> Self {
        Self {
            classification,
            rule,
        }
    }
}

pub struct Classifier<'a> {
    exempt_fields: Vec<String>,
    log: &'a RunLog,
}

impl<'a> Classifier<'a> {
    pub fn new(exempt_fields: &[String], log: &'a RunLog) -> Self {
        Self {
            exempt_fields: exempt_fields
                .iter()
                .map(|k| k.trim().to_ascii_uppercase())
                .filter(|k| !k.is_empty())
                .collect(),
            log,
        }
    }

    /// Fields whose keyword the operator asked to leave alone.
    pub fn is_exempt(&self, reference: &Reference) -> bool {
        let kw = field::keyword(&reference.code);
        !kw.is_empty() && self.exempt_fields.iter().any(|k| *k == kw)
    }

    pub fn classify(
        &self,
        reference: &Reference,
        index: &AnchorIndex,
        refresh: Option<&mut dyn FieldRefresh>,
    ) -> Verdict {
        let anchor = reference
            .target_anchor
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());

        if reference.field_kind == FieldKind::Hyperlink {
            if let Some(a) = anchor {
                if index.contains(a) {
                    return Verdict::new(Classification::ValidInternal, Rule::AnchorPresent);
                }
            }
        }

        if field::keyword(&reference.code) == "HYPERLINK"
            && field::has_absolute_url(&reference.code)
        {
            return Verdict::new(Classification::External, Rule::ExternalUrl);
        }

        match reference.field_kind {
            FieldKind::Sequence => {
                return Verdict::new(Classification::CrossReference, Rule::Sequence);
            }
            FieldKind::CrossReference => {
                let target_known =
                    field::ref_target(&reference.code).is_some_and(|t| index.contains(&t));
                if target_known || index.contains(&reference.resolved_text) {
                    return Verdict::new(Classification::CrossReference, Rule::RefTargetPresent);
                }
            }
            FieldKind::Hyperlink | FieldKind::Other => {}
        }

        if let Some(live) = refresh {
            match live.refresh(reference) {
                Ok(RefreshOutcome::Changed { before, after }) => {
                    self.log.info(format!(
                        "refresh changed {:?}: {before:?} -> {after:?}",
                        reference.code
                    ));
                    return Verdict::new(Classification::CrossReference, Rule::LiveRefresh);
                }
                Ok(RefreshOutcome::Unchanged) => {}
                Err(err) => self.log.warn(recovered(reference, err).to_string()),
            }
        }

        if anchor.is_some() {
            return Verdict::new(Classification::Ghost, Rule::MissingTarget);
        }
        Verdict::new(Classification::Ghost, Rule::Unrecognized)
    }
}

/// Any refresh failure is reported as a recoverable classification error.
fn recovered(reference: &Reference, err: Error) -> Error {
    if err.is_recoverable() {
        return err;
    }
    Error::Classification {
        code: reference.code.clone(),
        reason: err.to_string(),
    }
}
