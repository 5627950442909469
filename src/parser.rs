use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::clean::clean_string;
use crate::error::{Location, PipelineError, Result};

// ── Raw transcript format ──────────────────────────────────────────
//
// Real data example:
//     Michael|All right Jim. Your quarterlies look very good.
//     Jim|Oh, I told you. I couldn't close it. So...
//     -
//     !2
//     !newpeat
//     Dwight|Bears. Beets. Battlestar Galactica.
//
// Blocks are separated by a line holding only "-". A block may open with
// marker lines: "!<n>" puts the scene in deleted-footage group n, "!newpeat"
// marks it as an alternate take. Markers are never emitted as quotes.

static RE_DELETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^!\s*(?P<group>\d+)$").unwrap());

static RE_NEWPEAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^!\s*newpeat$").unwrap());

/// Minimum length, in characters, of a speaker or text field.
const MIN_FIELD_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub speaker: String,
    pub text: String,
}

/// A contiguous block of dialogue. Quote order is significant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Deleted-footage group id, if the scene was cut from the aired episode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u32>,
    /// Alternate take of another scene
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub newpeat: bool,
    pub quotes: Vec<Quote>,
}

/// Parse one raw transcript into scenes.
///
/// Any malformed line fails the whole file; the error carries the 1-based
/// scene index and the last quote parsed before it.
pub fn parse_transcript(content: &str) -> Result<Vec<Scene>> {
    let mut scenes = Vec::new();
    let mut last_quote: Option<String> = None;
    let mut last_group: Option<u32> = None;

    for (index, block) in split_blocks(content).into_iter().enumerate() {
        let scene_no = index + 1;
        let fail = |reason: String, last: &Option<String>| PipelineError::Parse {
            reason,
            at: Location {
                scene: scene_no,
                last_quote: last.clone(),
            },
        };

        let mut scene = Scene::default();
        let mut lines = block.into_iter().peekable();

        // Leading markers, in any order
        while let Some(line) = lines.peek() {
            if let Some(caps) = RE_DELETED.captures(line) {
                let group: u32 = caps["group"]
                    .parse()
                    .map_err(|_| fail(format!("deleted group id out of range: `{line}`"), &last_quote))?;
                if let Some(prev) = last_group
                    && group < prev
                {
                    return Err(fail(
                        format!("deleted group {group} follows group {prev}"),
                        &last_quote,
                    ));
                }
                last_group = Some(group);
                scene.deleted = Some(group);
            } else if RE_NEWPEAT.is_match(line) {
                scene.newpeat = true;
            } else {
                break;
            }
            lines.next();
        }

        for line in lines {
            let quote = parse_quote_line(line).map_err(|reason| fail(reason, &last_quote))?;
            last_quote = Some(format!("{}|{}", quote.speaker, quote.text));
            scene.quotes.push(quote);
        }

        if scene.quotes.is_empty() && scene.deleted.is_none() && !scene.newpeat {
            continue;
        }
        scenes.push(scene);
    }

    Ok(scenes)
}

/// Split into blocks of non-blank, trimmed lines.
fn split_blocks(content: &str) -> Vec<Vec<&str>> {
    let mut blocks = vec![Vec::new()];
    for line in content.lines() {
        let line = line.trim();
        if line == "-" {
            blocks.push(Vec::new());
        } else if !line.is_empty()
            && let Some(current) = blocks.last_mut()
        {
            current.push(line);
        }
    }
    blocks
}

fn parse_quote_line(line: &str) -> std::result::Result<Quote, String> {
    let (speaker, text) = line
        .split_once('|')
        .ok_or_else(|| format!("expected `speaker|text`, got `{line}`"))?;

    let speaker = clean_string(speaker).trim().to_string();
    let text = clean_string(text).trim().to_string();

    if speaker.chars().count() < MIN_FIELD_CHARS {
        return Err(format!("speaker text had less than two characters: `{line}`"));
    }
    if text.chars().count() < MIN_FIELD_CHARS {
        return Err(format!("quote text had less than two characters: `{line}`"));
    }

    Ok(Quote { speaker, text })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(speaker: &str, text: &str) -> Quote {
        Quote {
            speaker: speaker.into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_two_scenes() {
        let scenes = parse_transcript("Jim|Hi.\n-\nDwight|Bears.").unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].quotes, vec![q("Jim", "Hi.")]);
        assert_eq!(scenes[1].quotes, vec![q("Dwight", "Bears.")]);
        assert_eq!(scenes[0].deleted, None);
    }

    #[test]
    fn test_deleted_marker_consumed() {
        let scenes = parse_transcript("!3\nJim|Hi.\nPam|Hey.").unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].deleted, Some(3));
        assert_eq!(scenes[0].quotes.len(), 2);
        assert_eq!(scenes[0].quotes[0], q("Jim", "Hi."));
    }

    #[test]
    fn test_deleted_and_newpeat_are_independent() {
        let raw = "!1\nJim|Cut.\n-\n!newpeat\nJim|Again.\n-\n!2\n!newpeat\nJim|Both.\n-\nJim|Neither.";
        let scenes = parse_transcript(raw).unwrap();
        let flags: Vec<(Option<u32>, bool)> =
            scenes.iter().map(|s| (s.deleted, s.newpeat)).collect();
        assert_eq!(
            flags,
            vec![(Some(1), false), (None, true), (Some(2), true), (None, false)]
        );
    }

    #[test]
    fn test_text_split_on_first_pipe_only() {
        let scenes = parse_transcript("Jim|a|b").unwrap();
        assert_eq!(scenes[0].quotes[0], q("Jim", "a|b"));
    }

    #[test]
    fn test_blank_lines_and_trailing_separator() {
        let scenes = parse_transcript("\nJim|Hi.\n\n-\n").unwrap();
        assert_eq!(scenes.len(), 1);
    }

    #[test]
    fn test_short_speaker_fails_with_location() {
        let err = parse_transcript("Jim|Hi.\n-\nPam|Hello.\nJ|Nope.").unwrap_err();
        match err {
            PipelineError::Parse { at, .. } => {
                assert_eq!(at.scene, 2);
                assert_eq!(at.last_quote.as_deref(), Some("Pam|Hello."));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_short_text_fails() {
        assert!(parse_transcript("Jim|.").is_err());
    }

    #[test]
    fn test_missing_pipe_fails() {
        assert!(parse_transcript("Jim says hi").is_err());
    }

    #[test]
    fn test_marker_after_quote_is_an_error() {
        assert!(parse_transcript("Jim|Hi.\n!3").is_err());
    }

    #[test]
    fn test_decreasing_deleted_group_fails() {
        assert!(parse_transcript("!2\nJim|Hi.\n-\n!1\nPam|Hey.").is_err());
        assert!(parse_transcript("!1\nJim|Hi.\n-\n!1\nPam|Hey.\n-\n!2\nAndy|Yo.").is_ok());
    }

    #[test]
    fn test_fields_are_folded() {
        let scenes = parse_transcript("Michael’s Mom|It’s fine.").unwrap();
        assert_eq!(scenes[0].quotes[0], q("Michael's Mom", "It's fine."));
    }
}
