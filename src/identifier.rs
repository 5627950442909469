//! Character identifiers for canonical speakers.
//!
//! A canonical speaker string may name one character ("Woman #4") or several
//! ("Jim, Dwight, and Andy"). Each speaker gets a record listing the slug ids
//! of the characters it refers to. Multi-character speakers also keep an
//! annotated copy of their text with every name wrapped in braces, which the
//! compiler later turns into a placeholder template.
//!
//! The table is curated by hand after it is first generated, so rebuilding
//! it merges against the previous file instead of overwriting it.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store;

// ── Splitting ──────────────────────────────────────────────────────
//
// Real data:
//   Jim, Dwight, and Andy      → Jim | Dwight | Andy
//   Michael & Dwight           → Michael | Dwight
//   Pam and Roy                → Pam | Roy
//   Kevin/Oscar                → Kevin | Oscar
//   Woman #4                   → (single, background)

// Comma, ampersand, "and"-conjunction, slash, tried in that order at each
// position. A comma swallows a following "and" so the Oxford comma does not
// leave "and Andy" behind as a name.
static RE_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*,\s*(?:and\s+)?|\s*&\s*|\s+and,?(?:\s+|$)|\s*[\\/]\s*").unwrap()
});

// A fragment counts as a name only if it opens with two word characters
static RE_NAME_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w{2,}").unwrap());

static RE_BACKGROUND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\d").unwrap());

// ── Slugs ──────────────────────────────────────────────────────────

static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static RE_NUMBERED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\d+").unwrap());
static RE_ORDINAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:st|nd|rd|th)").unwrap());
static RE_PUNCT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[.\[\],;'"]"#).unwrap());

/// Simplify a character name into a slug-like identifier.
///
/// ```text
/// Woman #4           -> woman
/// Woman From Buffalo -> woman-from-buffalo
/// Edward R. Meow     -> edward-r-meow
/// ```
pub fn valuify(value: &str) -> String {
    let mut current = valuify_pass(value);
    // Stripping can expose another strippable pattern ("#.4"); settle it here
    loop {
        let next = valuify_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn valuify_pass(value: &str) -> String {
    let value = value.to_lowercase();
    let value = RE_WHITESPACE.replace_all(value.trim(), "-");
    let value = RE_NUMBERED.replace_all(&value, "");
    let value = RE_ORDINAL.replace_all(&value, "");
    let value = RE_PUNCT.replace_all(&value, "");
    value.trim_matches('-').to_string()
}

// ── Records ────────────────────────────────────────────────────────

/// How a character is treated in headline statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Main,
    Recurring,
    Background,
    /// Narration, crowd noise and other non-character speakers
    Meta,
    #[default]
    Unclassified,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Self::Main,
        Self::Recurring,
        Self::Background,
        Self::Meta,
        Self::Unclassified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Recurring => "recurring",
            Self::Background => "background",
            Self::Meta => "meta",
            Self::Unclassified => "unclassified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Counted in per-episode appearance stats.
    pub fn is_headline(&self) -> bool {
        matches!(self, Self::Main | Self::Recurring)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRef {
    pub id: String,
    #[serde(rename = "type", default)]
    pub class: Classification,
}

impl CharacterRef {
    fn new(id: String, class: Classification) -> Self {
        Self { id, class }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Speaker {
    Single {
        character: CharacterRef,
    },
    /// Several characters credited together
    Annotated {
        /// Display text with each name wrapped in braces: "{Jim} and {Pam}"
        annotated_text: String,
        characters: Vec<CharacterRef>,
    },
}

impl Speaker {
    pub fn characters(&self) -> &[CharacterRef] {
        match self {
            Speaker::Single { character } => std::slice::from_ref(character),
            Speaker::Annotated { characters, .. } => characters,
        }
    }

    pub fn characters_mut(&mut self) -> &mut [CharacterRef] {
        match self {
            Speaker::Single { character } => std::slice::from_mut(character),
            Speaker::Annotated { characters, .. } => characters,
        }
    }
}

/// Identifier record for one canonical speaker string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerIdentifier {
    pub raw_text: String,
    #[serde(flatten)]
    pub speaker: Speaker,
    /// Kept from an earlier run but no longer produced by the transcripts
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_review: bool,
}

impl SpeakerIdentifier {
    pub fn is_annotated(&self) -> bool {
        matches!(self.speaker, Speaker::Annotated { .. })
    }
}

/// Build a fresh identifier record for a canonical speaker string.
pub fn identify(raw: &str) -> SpeakerIdentifier {
    let mut names = Vec::new();
    let mut annotated = String::with_capacity(raw.len() + 8);
    let mut last = 0;

    let mut push_fragment = |fragment: &str, out: &mut String| {
        if RE_NAME_FRAGMENT.is_match(fragment) {
            names.push(fragment.to_string());
            out.push('{');
            out.push_str(fragment);
            out.push('}');
        } else {
            out.push_str(fragment);
        }
    };

    for m in RE_SPLIT.find_iter(raw) {
        push_fragment(&raw[last..m.start()], &mut annotated);
        annotated.push_str(m.as_str());
        last = m.end();
    }
    push_fragment(&raw[last..], &mut annotated);

    let speaker = if names.len() > 1 {
        Speaker::Annotated {
            annotated_text: annotated,
            characters: names
                .iter()
                .map(|n| CharacterRef::new(valuify(n), Classification::Unclassified))
                .collect(),
        }
    } else {
        let class = if RE_BACKGROUND.is_match(raw) {
            Classification::Background
        } else {
            Classification::Unclassified
        };
        Speaker::Single {
            character: CharacterRef::new(valuify(raw), class),
        }
    };

    let mut seen = HashSet::new();
    for character in speaker.characters() {
        if character.id.is_empty() {
            tracing::warn!("Speaker `{raw}` has no usable name; its character id is empty.");
        } else if !seen.insert(character.id.as_str()) {
            tracing::warn!("Speaker `{raw}` names `{}` more than once.", character.id);
        }
    }

    SpeakerIdentifier {
        raw_text: raw.to_string(),
        speaker,
        needs_review: false,
    }
}

// ── Table ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierTable {
    pub records: Vec<SpeakerIdentifier>,
}

/// Counts from an incremental rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    pub preserved: usize,
    pub added: usize,
    pub unseen: usize,
}

impl IdentifierTable {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            records: store::read_json(path)?,
        })
    }

    /// `None` if the table has never been written.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        store::write_json(path, &self.records)
    }

    /// Records keyed by their canonical speaker text.
    pub fn by_raw_text(&self) -> HashMap<&str, &SpeakerIdentifier> {
        self.records.iter().map(|r| (r.raw_text.as_str(), r)).collect()
    }

    /// Rebuild against the current canonical speaker list.
    ///
    /// Prior records still in use come first, unchanged and in their prior
    /// order. New speakers follow in list order. Prior records no longer in
    /// use are kept at the end and flagged for review.
    pub fn rebuild(prior: Option<&IdentifierTable>, canonical: &[String]) -> (Self, RebuildSummary) {
        let current: HashSet<&str> = canonical.iter().map(String::as_str).collect();
        let mut summary = RebuildSummary::default();
        let mut records = Vec::with_capacity(canonical.len());
        let mut emitted: HashSet<String> = HashSet::new();
        let mut unseen = Vec::new();

        for record in prior.map(|p| p.records.as_slice()).unwrap_or_default() {
            if !emitted.insert(record.raw_text.clone()) {
                tracing::warn!("Duplicate identifier record `{}` dropped.", record.raw_text);
                continue;
            }
            if current.contains(record.raw_text.as_str()) {
                let mut record = record.clone();
                record.needs_review = false;
                records.push(record);
                summary.preserved += 1;
            } else {
                unseen.push(record);
            }
        }

        for name in canonical {
            if emitted.insert(name.clone()) {
                if prior.is_some() {
                    tracing::debug!("New speaker: `{name}`");
                }
                records.push(identify(name));
                summary.added += 1;
            }
        }

        for record in unseen {
            tracing::debug!("Character preserved but not seen: `{}`", record.raw_text);
            let mut record = record.clone();
            record.needs_review = true;
            records.push(record);
            summary.unseen += 1;
        }

        (Self { records }, summary)
    }
}
