//! Join parsed scenes with the curated tables.
//!
//! Every quote's raw speaker is resolved through the mapping, looked up in
//! the identifier table and classified from the meta table. Multi-character
//! speakers additionally get a template where each name is replaced by a
//! `{character_id}` placeholder, plus the literal text each placeholder
//! stands for in this quote.

use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::identifier::{CharacterRef, IdentifierTable, Speaker, SpeakerIdentifier};
use crate::mapping::SpeakerMapping;
use crate::meta::MetaStore;
use crate::parser::{Quote, Scene};

static RE_BRACED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(?P<name>[^}]+)\}").unwrap());

// ── Speaker templates ──────────────────────────────────────────────

/// Number of `{name}` tokens in an annotated text.
pub fn bracket_count(annotated_text: &str) -> usize {
    RE_BRACED.find_iter(annotated_text).count()
}

/// Annotated text with the braces removed: "{Jim} and {Pam}" → "Jim and Pam".
pub fn display_text(annotated_text: &str) -> String {
    RE_BRACED.replace_all(annotated_text, "$name").into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerTemplate {
    /// "{jim}, {dwight}, and {andy}"
    pub template: String,
    /// character id → literal name text, in template order
    pub fragments: IndexMap<String, String>,
}

impl SpeakerTemplate {
    /// Substitute every placeholder with its literal fragment.
    pub fn render(&self) -> String {
        let mut out = self.template.clone();
        for (id, literal) in &self.fragments {
            out = out.replace(&format!("{{{id}}}"), literal);
        }
        out
    }
}

/// Replace each bracketed name, in order, with the matching character id.
pub fn build_template(annotated_text: &str, ids: &[&str]) -> Result<SpeakerTemplate> {
    let tokens = bracket_count(annotated_text);
    if tokens != ids.len() {
        return Err(PipelineError::AnnotationMismatch {
            text: annotated_text.to_string(),
            tokens,
            ids: ids.len(),
        });
    }

    let mut template = String::with_capacity(annotated_text.len());
    let mut fragments = IndexMap::with_capacity(ids.len());
    let mut last = 0;

    for (caps, id) in RE_BRACED.captures_iter(annotated_text).zip(ids) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.name("name")) else {
            continue;
        };
        template.push_str(&annotated_text[last..whole.start()]);
        template.push('{');
        template.push_str(id);
        template.push('}');
        // One literal per id; a second, different literal could not render back
        let literal = fragments
            .entry(id.to_string())
            .or_insert_with(|| name.as_str().to_string());
        if *literal != name.as_str() {
            return Err(PipelineError::DuplicateCharacter {
                text: annotated_text.to_string(),
                id: id.to_string(),
            });
        }
        last = whole.end();
    }
    template.push_str(&annotated_text[last..]);

    Ok(SpeakerTemplate { template, fragments })
}

// ── Compiled records ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompiledSpeaker {
    Single {
        character: CharacterRef,
    },
    Annotated {
        #[serde(flatten)]
        template: SpeakerTemplate,
        characters: Vec<CharacterRef>,
    },
}

impl CompiledSpeaker {
    pub fn characters(&self) -> &[CharacterRef] {
        match self {
            Self::Single { character } => std::slice::from_ref(character),
            Self::Annotated { characters, .. } => characters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledQuote {
    /// Canonical display text of the speaker
    pub speaker: String,
    pub text: String,
    #[serde(flatten)]
    pub resolved: CompiledSpeaker,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub newpeat: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledScene {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub newpeat: bool,
    pub quotes: Vec<CompiledQuote>,
}

/// `compile/<season>-<episode>.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledEpisode {
    pub season: u32,
    pub episode: u32,
    pub scenes: Vec<CompiledScene>,
}

// ── Compiler ───────────────────────────────────────────────────────

pub struct Compiler<'a> {
    mapping: &'a SpeakerMapping,
    identifiers: HashMap<&'a str, &'a SpeakerIdentifier>,
    meta: &'a MetaStore,
}

impl<'a> Compiler<'a> {
    pub fn new(mapping: &'a SpeakerMapping, identifiers: &'a IdentifierTable, meta: &'a MetaStore) -> Self {
        Self {
            mapping,
            identifiers: identifiers.by_raw_text(),
            meta,
        }
    }

    fn classify(&self, character: &CharacterRef) -> CharacterRef {
        CharacterRef {
            id: character.id.clone(),
            class: self.meta.class_of(character),
        }
    }

    pub fn compile_quote(&self, quote: &Quote, scene: &Scene) -> Result<CompiledQuote> {
        let canonical = self.mapping.resolve(&quote.speaker)?;
        let record = self
            .identifiers
            .get(canonical.as_str())
            .ok_or_else(|| PipelineError::MissingIdentifier {
                speaker: canonical.clone(),
            })?;

        let resolved = match &record.speaker {
            Speaker::Single { character } => CompiledSpeaker::Single {
                character: self.classify(character),
            },
            Speaker::Annotated {
                annotated_text,
                characters,
            } => {
                let ids: Vec<&str> = characters.iter().map(|c| c.id.as_str()).collect();
                CompiledSpeaker::Annotated {
                    template: build_template(annotated_text, &ids)?,
                    characters: characters.iter().map(|c| self.classify(c)).collect(),
                }
            }
        };

        Ok(CompiledQuote {
            speaker: canonical,
            text: quote.text.clone(),
            resolved,
            deleted: scene.deleted,
            newpeat: scene.newpeat,
        })
    }

    /// Compile every scene of one episode. The first failing quote fails the
    /// episode, with its scene index and the last quote that compiled.
    pub fn compile_scenes(&self, scenes: &[Scene]) -> Result<Vec<CompiledScene>> {
        let mut compiled = Vec::with_capacity(scenes.len());
        let mut last_quote: Option<String> = None;

        for (index, scene) in scenes.iter().enumerate() {
            let mut quotes = Vec::with_capacity(scene.quotes.len());
            for quote in &scene.quotes {
                let q = self
                    .compile_quote(quote, scene)
                    .map_err(|e| e.at_scene(index + 1, last_quote.as_deref()))?;
                last_quote = Some(format!("{}|{}", quote.speaker, quote.text));
                quotes.push(q);
            }
            compiled.push(CompiledScene {
                deleted: scene.deleted,
                newpeat: scene.newpeat,
                quotes,
            });
        }

        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::{Classification, identify};
    use crate::mapping::MappingEntry;
    use crate::parser::parse_transcript;

    fn tables(pairs: &[(&str, &str)], canonical: &[&str]) -> (SpeakerMapping, IdentifierTable) {
        let mapping = SpeakerMapping::from_entries(pairs.iter().map(|(s, d)| MappingEntry {
            source: s.to_string(),
            destination: d.to_string(),
            count: 1,
        }));
        let ids = IdentifierTable {
            records: canonical.iter().map(|c| identify(c)).collect(),
        };
        (mapping, ids)
    }

    #[test]
    fn test_template_round_trip() {
        let annotated = "{Jim}, {Dwight}, and {Andy}";
        let t = build_template(annotated, &["jim", "dwight", "andy"]).unwrap();
        assert_eq!(t.template, "{jim}, {dwight}, and {andy}");
        assert_eq!(t.fragments["dwight"], "Dwight");
        assert_eq!(t.render(), display_text(annotated));
        assert_eq!(t.render(), "Jim, Dwight, and Andy");
    }

    #[test]
    fn test_template_mismatch() {
        let err = build_template("{Jim} and {Pam}", &["jim"]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::AnnotationMismatch { tokens: 2, ids: 1, .. }
        ));
    }

    #[test]
    fn test_repeated_id_with_different_text_is_rejected() {
        let record = identify("Woman #1 and Woman #2");
        let Speaker::Annotated {
            annotated_text,
            characters,
        } = &record.speaker
        else {
            panic!("should be annotated");
        };
        let ids: Vec<&str> = characters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["woman", "woman"]);

        let err = build_template(annotated_text, &ids).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateCharacter { ref id, .. } if id == "woman"));
    }

    #[test]
    fn test_repeated_id_with_same_text_round_trips() {
        let t = build_template("{Jim} and {Jim}", &["jim", "jim"]).unwrap();
        assert_eq!(t.template, "{jim} and {jim}");
        assert_eq!(t.render(), "Jim and Jim");
    }

    #[test]
    fn test_identifier_output_round_trips() {
        for raw in ["Jim and Pam", "Michael & Dwight & Jim", "Kevin/Oscar", "Jim, Dwight, and Andy"] {
            let record = identify(raw);
            let Speaker::Annotated {
                annotated_text,
                characters,
            } = &record.speaker
            else {
                panic!("{raw} should be annotated");
            };
            let ids: Vec<&str> = characters.iter().map(|c| c.id.as_str()).collect();
            let t = build_template(annotated_text, &ids).unwrap();
            assert_eq!(t.render(), raw);
        }
    }

    #[test]
    fn test_compile_propagates_scene_flags_and_meta() {
        let (mapping, ids) = tables(
            &[("Jim", "Jim"), ("Jimmy", "Jim"), ("Jim and Pam", "Jim and Pam")],
            &["Jim", "Jim and Pam"],
        );
        let mut meta = MetaStore::new();
        meta.insert("jim", Classification::Main);
        let compiler = Compiler::new(&mapping, &ids, &meta);

        let scenes = parse_transcript("!2\n!newpeat\nJimmy|Hey.\nJim and Pam|Hi!").unwrap();
        let compiled = compiler.compile_scenes(&scenes).unwrap();
        let quotes = &compiled[0].quotes;

        assert_eq!(quotes[0].speaker, "Jim");
        assert_eq!(quotes[0].deleted, Some(2));
        assert!(quotes[1].newpeat);
        assert_eq!(quotes[0].resolved.characters()[0].class, Classification::Main);
        match &quotes[1].resolved {
            CompiledSpeaker::Annotated { template, characters } => {
                assert_eq!(template.template, "{jim} and {pam}");
                assert_eq!(characters[0].class, Classification::Main);
                assert_eq!(characters[1].class, Classification::Unclassified);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_compile_unmapped_speaker_reports_location() {
        let (mapping, ids) = tables(&[("Jim", "Jim")], &["Jim"]);
        let meta = MetaStore::new();
        let compiler = Compiler::new(&mapping, &ids, &meta);

        let scenes = parse_transcript("Jim|One.\n-\nJim|Two.\nToby|Three.").unwrap();
        let err = compiler.compile_scenes(&scenes).unwrap_err();
        assert!(err.is_resolution());
        let message = err.to_string();
        assert!(message.contains("scene 2"), "{message}");
        assert!(message.contains("Jim|Two."), "{message}");
    }

    #[test]
    fn test_compile_missing_identifier() {
        let (mapping, ids) = tables(&[("Jim", "Jim")], &[]);
        let meta = MetaStore::new();
        let compiler = Compiler::new(&mapping, &ids, &meta);
        let scenes = parse_transcript("Jim|One.").unwrap();
        let err = compiler.compile_scenes(&scenes).unwrap_err();
        assert!(matches!(err.root(), PipelineError::MissingIdentifier { .. }));
    }

    #[test]
    fn test_compiled_quote_json_shape() {
        let (mapping, ids) = tables(&[("Jim and Pam", "Jim and Pam")], &["Jim and Pam"]);
        let meta = MetaStore::new();
        let compiler = Compiler::new(&mapping, &ids, &meta);
        let scenes = parse_transcript("Jim and Pam|Hi.").unwrap();
        let compiled = compiler.compile_scenes(&scenes).unwrap();

        let json = serde_json::to_value(&compiled[0].quotes[0]).unwrap();
        assert_eq!(json["kind"], "annotated");
        assert_eq!(json["template"], "{jim} and {pam}");
        assert_eq!(json["fragments"]["pam"], "Pam");

        let back: CompiledQuote = serde_json::from_value(json).unwrap();
        assert_eq!(back, compiled[0].quotes[0]);
    }
}
