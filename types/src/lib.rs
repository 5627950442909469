//! Output records consumed by the presentation layer.
//!
//! Everything here is written by the `build` stage and read back by the
//! web/API side, so field names use the camelCase the front end expects.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ── Static descriptions supplied upstream ────────────────────────────────

/// Title and synopsis for one episode, as listed in `episode_descriptions.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeDescription {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Static description of a character. Only `name` is required; everything
/// else is carried through verbatim into the rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterDescription {
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Episode dataset ──────────────────────────────────────────────────────

/// Headline stats for a character within one episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeCharacter {
    pub name: String,
    pub appearances: u64,
}

/// A single line of dialogue as rendered by the UI.
///
/// Annotated quotes carry a speaker template such as
/// `"{jim}, {dwight}, and {andy}"` plus the literal text each placeholder
/// stands for; plain quotes carry one `character` id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteEntry {
    pub speaker: String,
    pub text: String,
    pub is_annotated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub newpeat: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub newpeat: bool,
    pub quotes: Vec<QuoteEntry>,
}

/// Episode header: everything but the scenes. This is what `episodes.json`
/// lists for the season/episode browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeHeader {
    pub title: String,
    pub description: String,
    pub season_number: u32,
    pub episode_number: u32,
    pub characters: IndexMap<String, EpisodeCharacter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeData {
    #[serde(flatten)]
    pub header: EpisodeHeader,
    pub scenes: Vec<SceneEntry>,
}

/// Season-major grid; a `None` slot is an episode that failed to build.
pub type SeasonGrid<T> = Vec<Vec<Option<T>>>;

// ── Character rollup ─────────────────────────────────────────────────────

/// Static description merged with corpus-wide appearance totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterRollup {
    #[serde(flatten)]
    pub description: CharacterDescription,
    pub appearances: u64,
}

// ── Search index ─────────────────────────────────────────────────────────

/// One quote in the flattened whole-corpus listing.
///
/// `position` is the absolute 0-based index across the corpus; `scene` and
/// `quote` are 1-based within their episode and scene, `episodeQuote` is the
/// 1-based index within the episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuote {
    pub position: usize,
    pub season: u32,
    pub episode: u32,
    pub scene: usize,
    pub quote: usize,
    pub episode_quote: usize,
    pub speaker: String,
    pub text: String,
    pub characters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub newpeat: bool,
}
