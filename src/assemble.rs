//! Final dataset assembly.
//!
//! Compiled episodes are merged with the static episode and character
//! descriptions into the nested season → episode → scene → quote layout the
//! presentation layer reads, plus a season grid of headers, per-character
//! rollups and a flat quote list for search.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use quote_types::{
    CharacterDescription, CharacterRollup, EpisodeCharacter, EpisodeData, EpisodeDescription, EpisodeHeader,
    QuoteEntry, SceneEntry, SearchQuote, SeasonGrid,
};

use crate::compile::{CompiledEpisode, CompiledQuote, CompiledScene, CompiledSpeaker};
use crate::error::{PipelineError, Result};

/// `episode_descriptions.json`: indexed `[season - 1][episode - 1]`.
pub type EpisodeDescriptions = Vec<Vec<EpisodeDescription>>;

/// `character_descriptions.json`: character id → description.
pub type CharacterDescriptions = IndexMap<String, CharacterDescription>;

/// Quote counts per main or recurring character, most frequent first.
/// Ties keep first-seen order.
pub fn count_appearances(scenes: &[CompiledScene]) -> IndexMap<String, u64> {
    let mut counts: IndexMap<String, u64> = IndexMap::new();
    let characters = scenes
        .iter()
        .flat_map(|s| &s.quotes)
        .flat_map(|q| q.resolved.characters());
    for character in characters.filter(|c| c.class.is_headline()) {
        *counts.entry(character.id.clone()).or_insert(0) += 1;
    }
    counts.sort_by(|_, a, _, b| b.cmp(a));
    counts
}

/// Display name for a character id with no static description.
pub fn placeholder_name(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => format!("\"{}{}\"", first.to_uppercase(), chars.as_str()),
        None => "\"\"".to_string(),
    }
}

fn quote_entry(quote: &CompiledQuote) -> QuoteEntry {
    let (speaker, is_annotated, character, characters) = match &quote.resolved {
        CompiledSpeaker::Single { character } => (quote.speaker.clone(), false, Some(character.id.clone()), None),
        CompiledSpeaker::Annotated { template, .. } => (
            template.template.clone(),
            true,
            None,
            Some(template.fragments.clone()),
        ),
    };
    QuoteEntry {
        speaker,
        text: quote.text.clone(),
        is_annotated,
        character,
        characters,
        deleted: quote.deleted,
        newpeat: quote.newpeat,
    }
}

pub struct Assembler<'a> {
    episodes: &'a EpisodeDescriptions,
    characters: &'a CharacterDescriptions,
}

impl<'a> Assembler<'a> {
    pub fn new(episodes: &'a EpisodeDescriptions, characters: &'a CharacterDescriptions) -> Self {
        Self { episodes, characters }
    }

    fn describe(&self, season: u32, episode: u32) -> Option<&'a EpisodeDescription> {
        let s = usize::try_from(season).ok()?.checked_sub(1)?;
        let e = usize::try_from(episode).ok()?.checked_sub(1)?;
        self.episodes.get(s)?.get(e)
    }

    fn name_of(&self, id: &str) -> String {
        match self.characters.get(id) {
            Some(description) => description.name.clone(),
            None => placeholder_name(id),
        }
    }

    /// Build one episode's dataset.
    pub fn episode(&self, compiled: &CompiledEpisode) -> Result<EpisodeData> {
        let description =
            self.describe(compiled.season, compiled.episode)
                .ok_or(PipelineError::MissingDescription {
                    season: compiled.season,
                    episode: compiled.episode,
                })?;

        let characters = count_appearances(&compiled.scenes)
            .into_iter()
            .map(|(id, appearances)| {
                let name = self.name_of(&id);
                (id, EpisodeCharacter { name, appearances })
            })
            .collect();

        let scenes = compiled
            .scenes
            .iter()
            .map(|scene| SceneEntry {
                deleted: scene.deleted,
                newpeat: scene.newpeat,
                quotes: scene.quotes.iter().map(quote_entry).collect(),
            })
            .collect();

        Ok(EpisodeData {
            header: EpisodeHeader {
                title: description.title.clone(),
                description: description.description.clone(),
                season_number: compiled.season,
                episode_number: compiled.episode,
                characters,
            },
            scenes,
        })
    }

    /// Counted character ids with no static description, sorted.
    pub fn undescribed(&self, episodes: &[EpisodeData]) -> BTreeSet<String> {
        episodes
            .iter()
            .flat_map(|e| e.header.characters.keys())
            .filter(|id| !self.characters.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Season × episode grid sized by the episode descriptions. Slots with
    /// no built episode stay empty.
    pub fn grid<T: Clone>(&self, episodes: &[EpisodeData], pick: impl Fn(&EpisodeData) -> T) -> SeasonGrid<T> {
        let mut grid: SeasonGrid<T> = self.episodes.iter().map(|s| vec![None; s.len()]).collect();
        for data in episodes {
            let (s, e) = (data.header.season_number as usize, data.header.episode_number as usize);
            if let Some(slot) = grid
                .get_mut(s.wrapping_sub(1))
                .and_then(|season| season.get_mut(e.wrapping_sub(1)))
            {
                *slot = Some(pick(data));
            }
        }
        grid
    }

    /// Every described character with its corpus-wide quote total.
    pub fn rollups(&self, episodes: &[EpisodeData]) -> IndexMap<String, CharacterRollup> {
        let mut totals: IndexMap<&str, u64> = IndexMap::new();
        for (id, stats) in episodes.iter().flat_map(|e| &e.header.characters) {
            *totals.entry(id.as_str()).or_insert(0) += stats.appearances;
        }

        self.characters
            .iter()
            .map(|(id, description)| {
                let rollup = CharacterRollup {
                    description: description.clone(),
                    appearances: totals.get(id.as_str()).copied().unwrap_or(0),
                };
                (id.clone(), rollup)
            })
            .collect()
    }
}

/// Flatten every quote in season/episode order.
pub fn search_index(episodes: &[EpisodeData]) -> Vec<SearchQuote> {
    let mut sorted: Vec<&EpisodeData> = episodes.iter().collect();
    sorted.sort_by_key(|e| (e.header.season_number, e.header.episode_number));

    let mut out = Vec::new();
    for episode in sorted {
        let mut episode_quote = 0;
        for (scene_index, scene) in episode.scenes.iter().enumerate() {
            for (quote_index, quote) in scene.quotes.iter().enumerate() {
                episode_quote += 1;
                let characters = match (&quote.character, &quote.characters) {
                    (Some(id), _) => vec![id.clone()],
                    (None, Some(map)) => map.keys().cloned().collect(),
                    (None, None) => Vec::new(),
                };
                out.push(SearchQuote {
                    position: out.len(),
                    season: episode.header.season_number,
                    episode: episode.header.episode_number,
                    scene: scene_index + 1,
                    quote: quote_index + 1,
                    episode_quote,
                    speaker: quote.speaker.clone(),
                    text: quote.text.clone(),
                    characters,
                    deleted: quote.deleted,
                    newpeat: quote.newpeat,
                });
            }
        }
    }
    out
}
