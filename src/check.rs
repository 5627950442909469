//! Consistency checks over the curated tables.
//!
//! Nothing here is fatal. Each problem becomes a [`Finding`] that the CLI
//! logs as a warning so curators can fix the tables by hand.

use std::collections::HashSet;
use std::fmt;

use crate::compile::bracket_count;
use crate::identifier::{Classification, IdentifierTable, Speaker, valuify};
use crate::meta::MetaStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// Braces in raw text would be read as name tokens
    BraceInRawText { raw_text: String },
    AnnotationCount {
        raw_text: String,
        tokens: usize,
        ids: usize,
    },
    NeedsReview { raw_text: String },
    /// Same id twice in one annotated speaker; the quote cannot compile
    /// unless both names are written identically
    DuplicateId { raw_text: String, id: String },
    /// Not a fixed point of `valuify`, e.g. `voice--on-phone`
    MalformedId { raw_text: String, id: String },
    Unclassified { id: String },
    UnreferencedMeta { id: String },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BraceInRawText { raw_text } => {
                write!(f, "Character `{raw_text}` contains a bracket in its raw text.")
            }
            Self::AnnotationCount { raw_text, tokens, ids } => write!(
                f,
                "Annotated `{raw_text}` has {tokens} bracketed names but {ids} character ids."
            ),
            Self::NeedsReview { raw_text } => {
                write!(f, "`{raw_text}` is no longer produced by any transcript.")
            }
            Self::DuplicateId { raw_text, id } => {
                write!(f, "Annotated `{raw_text}` lists `{id}` more than once.")
            }
            Self::MalformedId { raw_text, id } => {
                write!(f, "Character id `{id}` on `{raw_text}` does not look like a slug.")
            }
            Self::Unclassified { id } => write!(f, "`{id}` is unclassified."),
            Self::UnreferencedMeta { id } => {
                write!(f, "Meta entry `{id}` is not referenced by any identifier.")
            }
        }
    }
}

/// Run every check. Findings come out grouped by check, in table order.
pub fn check_tables(identifiers: &IdentifierTable, meta: Option<&MetaStore>) -> Vec<Finding> {
    let mut findings = Vec::new();

    tracing::debug!("Checking raw text for issues.");
    for record in &identifiers.records {
        if record.raw_text.contains(['{', '}']) {
            findings.push(Finding::BraceInRawText {
                raw_text: record.raw_text.clone(),
            });
        }
    }

    tracing::debug!("Checking annotated text for issues.");
    for record in &identifiers.records {
        if let Speaker::Annotated {
            annotated_text,
            characters,
        } = &record.speaker
        {
            let mut seen = HashSet::new();
            for character in characters {
                if !seen.insert(character.id.as_str()) {
                    findings.push(Finding::DuplicateId {
                        raw_text: record.raw_text.clone(),
                        id: character.id.clone(),
                    });
                }
            }

            let tokens = bracket_count(annotated_text);
            if tokens != characters.len() {
                findings.push(Finding::AnnotationCount {
                    raw_text: record.raw_text.clone(),
                    tokens,
                    ids: characters.len(),
                });
            }
        }
    }

    for record in identifiers.records.iter().filter(|r| r.needs_review) {
        findings.push(Finding::NeedsReview {
            raw_text: record.raw_text.clone(),
        });
    }

    let mut referenced: HashSet<&str> = HashSet::new();
    let mut unclassified: Vec<&str> = Vec::new();
    for record in &identifiers.records {
        for character in record.speaker.characters() {
            if character.id.is_empty() || character.id.contains("--") || valuify(&character.id) != character.id {
                findings.push(Finding::MalformedId {
                    raw_text: record.raw_text.clone(),
                    id: character.id.clone(),
                });
            }
            if !referenced.insert(character.id.as_str()) {
                continue;
            }
            let class = meta.map_or(character.class, |m| m.class_of(character));
            if class == Classification::Unclassified {
                unclassified.push(&character.id);
            }
        }
    }
    findings.extend(unclassified.into_iter().map(|id| Finding::Unclassified { id: id.to_string() }));

    if let Some(meta) = meta {
        for (id, _) in meta.iter() {
            if !referenced.contains(id) {
                findings.push(Finding::UnreferencedMeta { id: id.to_string() });
            }
        }
    }

    findings
}
