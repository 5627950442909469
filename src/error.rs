use std::path::PathBuf;

use thiserror::Error;

/// Where in an episode a failure happened, for reproducing it by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// 1-based scene index within the episode.
    pub scene: usize,
    /// Last quote line that was handled successfully before the failure.
    pub last_quote: Option<String>,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scene {}", self.scene)?;
        if let Some(q) = &self.last_quote {
            write!(f, ", last quote \"{q}\"")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed transcript ({at}): {reason}")]
    Parse { reason: String, at: Location },

    #[error("speaker `{speaker}` has no mapping entry")]
    Resolution { speaker: String },

    #[error("speaker `{speaker}` did not reach a fixed point within {hops} hops: {}", chain.join(" -> "))]
    Cycle {
        speaker: String,
        hops: usize,
        chain: Vec<String>,
    },

    #[error("canonical speaker `{speaker}` has no identifier record")]
    MissingIdentifier { speaker: String },

    #[error("annotated speaker `{text}` has {tokens} bracketed names but {ids} character ids")]
    AnnotationMismatch {
        text: String,
        tokens: usize,
        ids: usize,
    },

    #[error("annotated speaker `{text}` names `{id}` twice with different text")]
    DuplicateCharacter { text: String, id: String },

    #[error("no description for season {season} episode {episode}")]
    MissingDescription { season: u32, episode: u32 },

    #[error("{context}")]
    InEpisode {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl PipelineError {
    /// Wrap an error with the scene position it occurred at.
    pub fn at_scene(self, scene: usize, last_quote: Option<&str>) -> Self {
        let at = Location {
            scene,
            last_quote: last_quote.map(str::to_string),
        };
        PipelineError::InEpisode {
            context: format!("failed at {at}"),
            source: Box::new(self),
        }
    }

    pub fn in_episode(self, season: u32, episode: u32) -> Self {
        PipelineError::InEpisode {
            context: format!("season {season} episode {episode}"),
            source: Box::new(self),
        }
    }

    /// Resolution failures cover both missing entries and cycles.
    pub fn is_resolution(&self) -> bool {
        match self {
            Self::Resolution { .. } | Self::Cycle { .. } => true,
            Self::InEpisode { source, .. } => source.is_resolution(),
            _ => false,
        }
    }

    /// Innermost error, skipping location wrappers.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::InEpisode { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
