//! Pipeline configuration.
//!
//! Sources (highest priority first):
//! 1. Command line / `QUOTE_DATA_DIR` (the data directory itself)
//! 2. `normalize.yaml` inside the data directory
//! 3. Defaults matching the stock directory layout
//!
//! Relative paths in the config file are resolved against the data directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, Result};

pub const CONFIG_FILE_NAME: &str = "normalize.yaml";

/// Raw config file schema (matches the YAML structure).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Raw `<season>-<episode>.txt` transcripts
    pub raw_dir: String,
    /// Parsed episodes, speaker mapping, canonical list and meta table
    pub truth_dir: String,
    /// Speaker identifier table
    pub characters_dir: String,
    pub compile_dir: String,
    pub build_dir: String,
    pub episode_descriptions: String,
    pub character_descriptions: String,
    /// Override for the alias-chain hop bound (defaults to the table size)
    pub max_alias_hops: Option<usize>,
    pub similarity_cutoff: f64,
    /// Parse and compile files on the rayon pool
    pub parallel: bool,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            raw_dir: "raw".into(),
            truth_dir: "truth".into(),
            characters_dir: "characters".into(),
            compile_dir: "compile".into(),
            build_dir: "build".into(),
            episode_descriptions: "episode_descriptions.json".into(),
            character_descriptions: "character_descriptions.json".into(),
            max_alias_hops: None,
            similarity_cutoff: 0.6,
            parallel: true,
        }
    }
}

/// Configuration with every path resolved against the data directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub raw_dir: PathBuf,
    pub truth_dir: PathBuf,
    pub episodes_dir: PathBuf,
    pub characters_dir: PathBuf,
    pub compile_dir: PathBuf,
    pub build_dir: PathBuf,
    pub speaker_mapping: PathBuf,
    pub canonical_list: PathBuf,
    pub identifiers: PathBuf,
    pub meta: PathBuf,
    pub episode_descriptions: PathBuf,
    pub character_descriptions: PathBuf,
    pub max_alias_hops: Option<usize>,
    pub similarity_cutoff: f64,
    pub parallel: bool,
    /// Path to the config file, if one was found
    pub config_file: Option<PathBuf>,
}

impl Config {
    /// Load `normalize.yaml` from `data_dir` if present, else use defaults.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, data_dir.display());
            return Ok(Self::resolve(data_dir, ConfigFile::default(), None));
        }

        let content = std::fs::read_to_string(&path).map_err(|source| PipelineError::Io {
            path: path.clone(),
            source,
        })?;
        let file: ConfigFile = serde_yaml::from_str(&content).map_err(|source| {
            PipelineError::Yaml {
                path: path.clone(),
                source,
            }
        })?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(Self::resolve(data_dir, file, Some(path)))
    }

    /// Default layout rooted at `data_dir`.
    pub fn with_defaults(data_dir: &Path) -> Self {
        Self::resolve(data_dir, ConfigFile::default(), None)
    }

    fn resolve(data_dir: &Path, file: ConfigFile, config_file: Option<PathBuf>) -> Self {
        let join = |p: &str| {
            let p = Path::new(p);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                data_dir.join(p)
            }
        };

        let truth_dir = join(&file.truth_dir);
        let characters_dir = join(&file.characters_dir);

        Self {
            data_dir: data_dir.to_path_buf(),
            raw_dir: join(&file.raw_dir),
            episodes_dir: truth_dir.join("episodes"),
            speaker_mapping: truth_dir.join("speaker_mapping.json"),
            canonical_list: truth_dir.join("characters.json"),
            meta: truth_dir.join("meta.json"),
            identifiers: characters_dir.join("identifiers.json"),
            truth_dir,
            characters_dir,
            compile_dir: join(&file.compile_dir),
            build_dir: join(&file.build_dir),
            episode_descriptions: join(&file.episode_descriptions),
            character_descriptions: join(&file.character_descriptions),
            max_alias_hops: file.max_alias_hops,
            similarity_cutoff: file.similarity_cutoff.clamp(0.0, 1.0),
            parallel: file.parallel,
            config_file,
        }
    }
}
