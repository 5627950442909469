//! Character classification table (`truth/meta.json`).
//!
//! Maps each character id to how it is treated in headline statistics. The
//! file is seeded from the identifier table and then curated by hand, so
//! updates only touch entries that are new or that the identifier table has
//! an explicit opinion about.

use std::path::Path;

use indexmap::IndexMap;

use crate::error::Result;
use crate::identifier::{CharacterRef, Classification, IdentifierTable};
use crate::store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaStore {
    classes: IndexMap<String, Classification>,
}

/// What an update from the identifier table changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetaSummary {
    pub added: usize,
    pub overwritten: usize,
    pub preserved: usize,
}

impl MetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a hand-edited table. Values that are not a known classification
    /// are reported and read as unclassified.
    pub fn load(path: &Path) -> Result<Self> {
        let raw: IndexMap<String, String> = store::read_json(path)?;
        let mut classes = IndexMap::with_capacity(raw.len());
        for (id, value) in raw {
            let class = Classification::parse(&value).unwrap_or_else(|| {
                tracing::warn!("Unknown classification `{value}` for `{id}` in {}", path.display());
                Classification::Unclassified
            });
            classes.insert(id, class);
        }
        Ok(Self { classes })
    }

    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        store::write_json(path, &self.classes)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Classification> {
        self.classes.get(id).copied()
    }

    pub fn insert(&mut self, id: impl Into<String>, class: Classification) {
        self.classes.insert(id.into(), class);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Classification)> {
        self.classes.iter().map(|(id, c)| (id.as_str(), *c))
    }

    /// Classification for a character reference, preferring this table over
    /// the reference's own tag.
    pub fn class_of(&self, character: &CharacterRef) -> Classification {
        self.get(&character.id).unwrap_or(character.class)
    }

    /// Merge in every character the identifier table mentions.
    ///
    /// An entry is written when the id is new or the identifier carries a
    /// classification other than `unclassified`. Anything else keeps its
    /// curated value.
    pub fn update_from(&mut self, table: &IdentifierTable) -> MetaSummary {
        let mut summary = MetaSummary::default();
        for character in table.records.iter().flat_map(|r| r.speaker.characters()) {
            match self.classes.get_mut(&character.id) {
                None => {
                    self.classes.insert(character.id.clone(), character.class);
                    summary.added += 1;
                }
                Some(existing) if character.class != Classification::Unclassified => {
                    if *existing != character.class {
                        tracing::debug!(
                            "`{}`: {} -> {}",
                            character.id,
                            existing.as_str(),
                            character.class.as_str()
                        );
                        summary.overwritten += 1;
                    }
                    *existing = character.class;
                }
                Some(_) => summary.preserved += 1,
            }
        }
        summary
    }

    /// Push classifications back into the identifier table. Returns how many
    /// character references are still unclassified afterwards.
    pub fn apply_to(&self, table: &mut IdentifierTable) -> usize {
        let mut unclassified = 0;
        for record in &mut table.records {
            for character in record.speaker.characters_mut() {
                if let Some(class) = self.get(&character.id) {
                    character.class = class;
                }
                if character.class == Classification::Unclassified {
                    unclassified += 1;
                }
            }
        }
        unclassified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::identify;

    fn table(names: &[&str]) -> IdentifierTable {
        IdentifierTable {
            records: names.iter().map(|n| identify(n)).collect(),
        }
    }

    #[test]
    fn test_update_seeds_new_ids() {
        let mut meta = MetaStore::new();
        let summary = meta.update_from(&table(&["Jim and Pam", "Woman #4"]));
        assert_eq!(summary.added, 3);
        assert_eq!(meta.get("jim"), Some(Classification::Unclassified));
        assert_eq!(meta.get("woman"), Some(Classification::Background));
        let order: Vec<&str> = meta.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec!["jim", "pam", "woman"]);
    }

    #[test]
    fn test_update_preserves_curated_values() {
        let mut meta = MetaStore::new();
        meta.insert("jim", Classification::Main);
        let summary = meta.update_from(&table(&["Jim"]));
        assert_eq!(summary.preserved, 1);
        assert_eq!(meta.get("jim"), Some(Classification::Main));
    }

    #[test]
    fn test_update_takes_classified_identifier_tag() {
        let mut meta = MetaStore::new();
        meta.insert("woman", Classification::Unclassified);
        let summary = meta.update_from(&table(&["Woman #2"]));
        assert_eq!(summary.overwritten, 1);
        assert_eq!(meta.get("woman"), Some(Classification::Background));
    }

    #[test]
    fn test_apply_to_counts_remaining() {
        let mut ids = table(&["Jim", "Pam", "Woman #1"]);
        let mut meta = MetaStore::new();
        meta.insert("jim", Classification::Main);
        let remaining = meta.apply_to(&mut ids);
        assert_eq!(remaining, 1);
        assert_eq!(ids.records[0].speaker.characters()[0].class, Classification::Main);
    }

    #[test]
    fn test_load_tolerates_unknown_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        std::fs::write(&path, r#"{"jim": "main", "kevin": "supporting"}"#).unwrap();
        let meta = MetaStore::load(&path).unwrap();
        assert_eq!(meta.get("jim"), Some(Classification::Main));
        assert_eq!(meta.get("kevin"), Some(Classification::Unclassified));
    }

    #[test]
    fn test_class_of_falls_back_to_tag() {
        let meta = MetaStore::new();
        let record = identify("Guy #3");
        let character = &record.speaker.characters()[0];
        assert_eq!(meta.class_of(character), Classification::Background);
    }
}
