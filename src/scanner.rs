use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};

static RE_EPISODE_STEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<season>\d+)-(?P<episode>\d+)$").unwrap());

/// One per-episode artifact discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeFile {
    pub season: u32,
    pub episode: u32,
    /// File stem as found, e.g. "3-07"; later stages reuse it for their outputs
    pub stem: String,
    pub path: PathBuf,
}

impl EpisodeFile {
    /// Path for this episode's artifact in another stage directory.
    pub fn sibling_in(&self, dir: &Path, extension: &str) -> PathBuf {
        dir.join(format!("{}.{extension}", self.stem))
    }
}

/// Parse "3-07" → (3, 7).
pub fn parse_episode_stem(stem: &str) -> Option<(u32, u32)> {
    let caps = RE_EPISODE_STEM.captures(stem)?;
    let season = caps["season"].parse().ok()?;
    let episode = caps["episode"].parse().ok()?;
    Some((season, episode))
}

/// Discover `<season>-<episode>.<extension>` files directly inside `dir`,
/// sorted by season then episode.
///
/// Anything else in the directory is skipped with a debug log.
pub fn scan_episodes(dir: &Path, extension: &str) -> Result<Vec<EpisodeFile>> {
    if !dir.is_dir() {
        return Err(PipelineError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "directory not found"),
        });
    }

    let mut results = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path().to_path_buf();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        let Some((season, episode)) = parse_episode_stem(stem) else {
            tracing::debug!("Ignoring {}: not a <season>-<episode> file", path.display());
            continue;
        };

        results.push(EpisodeFile {
            season,
            episode,
            stem: stem.to_string(),
            path,
        });
    }

    // "1-2" and "1-02" name the same episode; keep the first stem only
    results.sort_by(|a, b| (a.season, a.episode, &a.stem).cmp(&(b.season, b.episode, &b.stem)));
    results.dedup_by(|later, kept| {
        let duplicate = (later.season, later.episode) == (kept.season, kept.episode);
        if duplicate {
            tracing::warn!(
                "Ignoring {}: season {} episode {} is already {}",
                later.path.display(),
                later.season,
                later.episode,
                kept.path.display()
            );
        }
        duplicate
    });
    Ok(results)
}
