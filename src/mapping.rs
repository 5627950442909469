//! Speaker mapping table and alias resolution.
//!
//! The mapping table sends every raw speaker string seen in a transcript to
//! a display string. Curators collapse typos and aliases by pointing one
//! entry's destination at another entry's source, so lookups follow the
//! chain until an entry maps to itself or the chain leaves the table.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::parser::Scene;
use crate::store;

/// One row of `speaker_mapping.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub source: String,
    pub destination: String,
    /// Occurrences when the table was seeded
    #[serde(default)]
    pub count: u64,
}

// ── Frequency count ──────────────────────────────────────────────────

/// Raw speaker frequencies in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct SpeakerCounts {
    counts: IndexMap<String, u64>,
}

impl SpeakerCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, speaker: &str) {
        *self.counts.entry(speaker.to_string()).or_insert(0) += 1;
    }

    pub fn add_scenes(&mut self, scenes: &[Scene]) {
        for quote in scenes.iter().flat_map(|s| &s.quotes) {
            self.add(&quote.speaker);
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn speakers(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    /// Identity mappings, most frequent first. Ties keep first-seen order.
    pub fn seed_entries(&self) -> Vec<MappingEntry> {
        let mut entries: Vec<MappingEntry> = self
            .counts
            .iter()
            .map(|(speaker, &count)| MappingEntry {
                source: speaker.clone(),
                destination: speaker.clone(),
                count,
            })
            .collect();
        entries.sort_by_key(|e| std::cmp::Reverse(e.count));
        entries
    }
}

// ── Mapping table ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SpeakerMapping {
    map: IndexMap<String, String>,
    max_hops: Option<usize>,
}

impl SpeakerMapping {
    /// Build from table rows. A source listed twice keeps its last destination.
    pub fn from_entries(entries: impl IntoIterator<Item = MappingEntry>) -> Self {
        let mut map = IndexMap::new();
        for entry in entries {
            if map.contains_key(&entry.source) {
                tracing::warn!("Key Source `{}` overwritten.", entry.source);
            }
            map.insert(entry.source, entry.destination);
        }
        Self { map, max_hops: None }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let entries: Vec<MappingEntry> = store::read_json(path)?;
        let mapping = Self::from_entries(entries);
        tracing::debug!("{} speaker mappings parsed.", mapping.len());
        Ok(mapping)
    }

    /// Override the hop bound. Defaults to the number of entries, which is
    /// the longest chain possible without revisiting a source.
    pub fn with_max_hops(mut self, max_hops: Option<usize>) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, source: &str) -> Option<&str> {
        self.map.get(source).map(String::as_str)
    }

    /// Follow `s := mapping[s]` from a raw speaker to its canonical string.
    ///
    /// The raw speaker itself must be in the table. The chain ends at an
    /// entry mapping to itself or at a destination with no entry of its own.
    pub fn resolve(&self, raw: &str) -> Result<String> {
        if !self.map.contains_key(raw) {
            return Err(PipelineError::Resolution {
                speaker: raw.to_string(),
            });
        }

        let limit = self.max_hops.unwrap_or(self.map.len());
        let mut chain = vec![raw.to_string()];
        let mut current = raw;

        for _ in 0..=limit {
            match self.map.get(current) {
                None => return Ok(current.to_string()),
                Some(next) if next == current => return Ok(current.to_string()),
                Some(next) => {
                    current = next.as_str();
                    chain.push(next.clone());
                }
            }
        }

        Err(PipelineError::Cycle {
            speaker: raw.to_string(),
            hops: limit,
            chain,
        })
    }

    /// Canonical speakers for every observed raw speaker, de-duplicated in
    /// first-seen order. Speakers that fail to resolve are returned separately.
    pub fn canonical_speakers<'a>(
        &self,
        speakers: impl IntoIterator<Item = &'a str>,
    ) -> (Vec<String>, Vec<PipelineError>) {
        let mut seen = indexmap::IndexSet::new();
        let mut errors = Vec::new();
        for speaker in speakers {
            match self.resolve(speaker) {
                Ok(canonical) => {
                    seen.insert(canonical);
                }
                Err(e) => errors.push(e),
            }
        }
        (seen.into_iter().collect(), errors)
    }
}

// ── Marked merge ─────────────────────────────────────────────────────

/// A tally that remembers whether it absorbed duplicates.
///
/// Negative values mark merged totals; the display form appends `*` so
/// curators know the number needs a second look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkedCount(pub i64);

impl MarkedCount {
    pub fn is_merged(&self) -> bool {
        self.0 < 0
    }

    pub fn total(&self) -> u64 {
        self.0.unsigned_abs()
    }
}

impl fmt::Display for MarkedCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_merged() {
            write!(f, "{}*", self.total())
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Sum values of identical keys, keeping first-seen key order.
///
/// The first occurrence keeps its value; a repeat flips the running value
/// negative and subtracts the new one.
pub fn marked_merge<K, I>(items: I) -> IndexMap<K, MarkedCount>
where
    K: std::hash::Hash + Eq,
    I: IntoIterator<Item = (K, i64)>,
{
    let mut merged: IndexMap<K, MarkedCount> = IndexMap::new();
    for (key, value) in items {
        match merged.get_mut(&key) {
            Some(running) => {
                if running.0 > 0 {
                    running.0 = -running.0;
                }
                running.0 -= value;
            }
            None => {
                merged.insert(key, MarkedCount(value));
            }
        }
    }
    merged
}
